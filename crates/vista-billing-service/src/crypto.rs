//! Webhook signature primitives.
//!
//! Provider webhooks are authenticated with HMAC-SHA256 over the exact raw
//! request bytes. The helpers here work on bytes rather than re-serialized
//! JSON for that reason: any reformatting of the payload would change the
//! digest.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute HMAC-SHA256 over `message` and return the hex-encoded digest.
///
/// # Panics
///
/// Never panics in practice: HMAC-SHA256 accepts keys of any size per
/// RFC 2104, so `new_from_slice` only fails if the Hmac implementation is
/// broken.
#[must_use]
pub fn hmac_sha256_hex(secret: &[u8], message: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret).expect("HMAC-SHA256 accepts any key size");
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time string comparison for signature checks.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

/// A parsed provider signature header.
///
/// Format: `t=<timestamp>,v1=<sig>[,v1=<sig>...]`. Multiple `v1` candidates
/// appear during secret rotation; verification passes if any matches.
#[derive(Debug)]
pub struct SignatureHeader {
    /// The timestamp the provider signed over.
    pub timestamp: String,

    /// Hex-encoded signature candidates.
    pub candidates: Vec<String>,
}

impl SignatureHeader {
    /// Parse a signature header, returning `None` if the timestamp or all
    /// signatures are missing.
    #[must_use]
    pub fn parse(header: &str) -> Option<Self> {
        let mut timestamp = None;
        let mut candidates = Vec::new();

        for part in header.split(',') {
            let mut kv = part.splitn(2, '=');
            match (kv.next(), kv.next()) {
                (Some("t"), Some(ts)) => timestamp = Some(ts.to_string()),
                (Some("v1"), Some(sig)) => candidates.push(sig.to_string()),
                _ => {}
            }
        }

        match (timestamp, candidates.is_empty()) {
            (Some(timestamp), false) => Some(Self {
                timestamp,
                candidates,
            }),
            _ => None,
        }
    }

    /// Verify this header against the raw payload bytes and secret.
    #[must_use]
    pub fn verify(&self, payload: &[u8], secret: &str) -> bool {
        let mut signed = self.timestamp.as_bytes().to_vec();
        signed.push(b'.');
        signed.extend_from_slice(payload);

        let expected = hmac_sha256_hex(secret.as_bytes(), &signed);
        self.candidates
            .iter()
            .any(|candidate| constant_time_eq(&expected, candidate))
    }
}
