//! Ledger entry types.
//!
//! Every balance change is an immutable `LedgerEntry`. Entries are never
//! updated or deleted; the tuple `(customer_id, kind, external_id)` is unique
//! and is the idempotency key for the whole reconciliation pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CustomerId, EntryId};

/// An immutable, signed balance fact.
///
/// `external_id` ties the entry to the real-world event that caused it: the
/// provider invoice id for monthly grants, the checkout session id for
/// top-ups, and the generation job id for spend/refund pairs. Re-processing
/// the same event can never double-apply because the `(customer_id, kind,
/// external_id)` tuple is enforced unique at the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique entry ID (ULID for time-ordering).
    pub id: EntryId,

    /// The customer whose balance is affected.
    pub customer_id: CustomerId,

    /// Token delta. Positive = grant/refund, negative = spend.
    pub delta: i64,

    /// What caused this entry.
    pub kind: EntryKind,

    /// Identifier of the external fact this entry records.
    pub external_id: String,

    /// Human-readable description.
    pub reason: String,

    /// When the entry was created.
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Create a monthly subscription grant entry.
    ///
    /// `external_id` is the provider invoice id.
    #[must_use]
    pub fn monthly_grant(
        customer_id: CustomerId,
        tokens: i64,
        invoice_id: impl Into<String>,
        plan_id: &str,
    ) -> Self {
        Self {
            id: EntryId::generate(),
            customer_id,
            delta: tokens.abs(),
            kind: EntryKind::MonthlyGrant,
            external_id: invoice_id.into(),
            reason: format!("Monthly {plan_id} plan token grant"),
            created_at: Utc::now(),
        }
    }

    /// Create a one-time top-up entry.
    ///
    /// `external_id` is the provider checkout session id.
    #[must_use]
    pub fn topup(customer_id: CustomerId, tokens: i64, session_id: impl Into<String>) -> Self {
        Self {
            id: EntryId::generate(),
            customer_id,
            delta: tokens.abs(),
            kind: EntryKind::Topup,
            external_id: session_id.into(),
            reason: format!("One-time purchase of {} tokens", tokens.abs()),
            created_at: Utc::now(),
        }
    }

    /// Create a spend entry for a generation job.
    ///
    /// The delta is always negative; `external_id` is the job id so a
    /// retried request with the same job cannot spend twice.
    #[must_use]
    pub fn spend(
        customer_id: CustomerId,
        cost: i64,
        job_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: EntryId::generate(),
            customer_id,
            delta: -cost.abs(),
            kind: EntryKind::Spend,
            external_id: job_id.into(),
            reason: reason.into(),
            created_at: Utc::now(),
        }
    }

    /// Create a refund entry compensating a failed generation job.
    ///
    /// Keyed by the same job id as the spend it reverses, so a retried
    /// failure path cannot refund twice.
    #[must_use]
    pub fn refund(
        customer_id: CustomerId,
        tokens: i64,
        job_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: EntryId::generate(),
            customer_id,
            delta: tokens.abs(),
            kind: EntryKind::Refund,
            external_id: job_id.into(),
            reason: reason.into(),
            created_at: Utc::now(),
        }
    }
}

/// What caused a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Subscription renewal grant (one per paid invoice).
    MonthlyGrant,

    /// One-time token pack purchase.
    Topup,

    /// Tokens reserved for a generation job.
    Spend,

    /// Compensation for a failed generation job.
    Refund,
}

impl EntryKind {
    /// Stable string form used in logs and API responses.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MonthlyGrant => "monthly_grant",
            Self::Topup => "topup",
            Self::Spend => "spend",
            Self::Refund => "refund",
        }
    }

    /// Whether entries of this kind add tokens.
    #[must_use]
    pub const fn is_credit(&self) -> bool {
        matches!(self, Self::MonthlyGrant | Self::Topup | Self::Refund)
    }
}
