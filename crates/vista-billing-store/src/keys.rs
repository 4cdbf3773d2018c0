//! Key encoding utilities for `RocksDB`.

use vista_billing_core::{CustomerId, EntryId, EntryKind};

/// One-byte tags keeping idempotency keys compact and unambiguous.
const fn kind_tag(kind: EntryKind) -> u8 {
    match kind {
        EntryKind::MonthlyGrant => 1,
        EntryKind::Topup => 2,
        EntryKind::Spend => 3,
        EntryKind::Refund => 4,
    }
}

/// Ledger entry key: `customer_id (16 bytes) || entry_id (16 bytes)`.
///
/// ULIDs are time-ordered, so a customer's prefix range iterates their
/// entries chronologically.
#[must_use]
pub fn ledger_key(customer_id: &CustomerId, entry_id: &EntryId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(customer_id.as_bytes());
    key.extend_from_slice(&entry_id.to_bytes());
    key
}

/// Prefix covering all ledger entries for a customer.
#[must_use]
pub fn ledger_prefix(customer_id: &CustomerId) -> Vec<u8> {
    customer_id.as_bytes().to_vec()
}

/// Idempotency key: `customer_id (16 bytes) || kind tag (1 byte) || external_id`.
#[must_use]
pub fn idempotency_key(customer_id: &CustomerId, kind: EntryKind, external_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(17 + external_id.len());
    key.extend_from_slice(customer_id.as_bytes());
    key.push(kind_tag(kind));
    key.extend_from_slice(external_id.as_bytes());
    key
}

/// Subscription state key for a customer.
#[must_use]
pub fn subscription_key(customer_id: &CustomerId) -> Vec<u8> {
    customer_id.as_bytes().to_vec()
}

/// Provider customer mapping key.
#[must_use]
pub fn provider_customer_key(provider_customer_id: &str) -> Vec<u8> {
    provider_customer_id.as_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_key_format() {
        let customer = CustomerId::generate();
        let entry = EntryId::generate();
        let key = ledger_key(&customer, &entry);

        assert_eq!(key.len(), 32);
        assert_eq!(&key[..16], customer.as_bytes());
        assert_eq!(&key[16..], entry.to_bytes());
        assert!(key.starts_with(&ledger_prefix(&customer)));
    }

    #[test]
    fn idempotency_keys_distinguish_kinds() {
        let customer = CustomerId::generate();
        let spend = idempotency_key(&customer, EntryKind::Spend, "job_1");
        let refund = idempotency_key(&customer, EntryKind::Refund, "job_1");

        // Same external id, different kind: spend and refund coexist.
        assert_ne!(spend, refund);
    }

    #[test]
    fn idempotency_keys_distinguish_customers() {
        let a = CustomerId::generate();
        let b = CustomerId::generate();
        assert_ne!(
            idempotency_key(&a, EntryKind::Topup, "cs_1"),
            idempotency_key(&b, EntryKind::Topup, "cs_1")
        );
    }
}
