//! `RocksDB` storage layer for the vista billing ledger.
//!
//! The ledger is append-only: balance-affecting facts are written once and
//! never mutated, and a customer's balance is always derived by summing
//! their entries. The `(customer, kind, external_id)` uniqueness invariant
//! is enforced here and is the idempotency backbone for webhook replay and
//! spend retries.
//!
//! # Column families
//!
//! - `ledger`: entries, keyed `customer_id (16) || entry_id (16)` so a
//!   prefix scan yields one customer's entries in time order
//! - `ledger_keys`: idempotency tuples, keyed
//!   `customer_id || kind || external_id`, value = entry id
//! - `subscriptions`: one projected state row per customer
//! - `customers_by_provider`: provider customer id -> customer id mapping
//!
//! # Example
//!
//! ```no_run
//! use vista_billing_store::{RocksStore, Store};
//! use vista_billing_core::{CustomerId, LedgerEntry};
//!
//! let store = RocksStore::open("/tmp/vista-billing-db").unwrap();
//! let customer = CustomerId::generate();
//!
//! let grant = LedgerEntry::topup(customer, 100, "cs_123");
//! let outcome = store.append(&grant).unwrap();
//! assert!(outcome.applied);
//! assert_eq!(store.balance_of(&customer).unwrap(), 100);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;

use vista_billing_core::{CustomerId, EntryKind, LedgerEntry, SubscriptionState};

/// Result of an idempotent ledger append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOutcome {
    /// Whether a new entry was written. `false` means the idempotency tuple
    /// already existed and nothing changed.
    pub applied: bool,

    /// The customer's balance after the call.
    pub balance: i64,
}

/// Result of a spend reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpendOutcome {
    /// Whether the tokens are reserved. A retried job id that was already
    /// spent also reports `true` (the reservation holds), with no new entry.
    pub success: bool,

    /// Balance after a successful spend, or the unchanged balance that was
    /// insufficient.
    pub balance: i64,
}

/// Result of a refund.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefundOutcome {
    /// Whether a refund entry was written now. `false` means the job was
    /// already refunded.
    pub refunded: bool,

    /// The customer's balance after the call.
    pub balance: i64,
}

/// The storage trait defining all ledger and projection operations.
///
/// Implementations must linearize mutations per customer: two concurrent
/// `try_spend` calls for one customer may not both pass the balance check,
/// while calls for different customers proceed independently.
pub trait Store: Send + Sync {
    // =========================================================================
    // Ledger Operations
    // =========================================================================

    /// Append a ledger entry if its `(customer, kind, external_id)` tuple
    /// has not been seen before.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails. A duplicate tuple
    /// is not an error: the call reports `applied: false` and changes
    /// nothing.
    fn append(&self, entry: &LedgerEntry) -> Result<AppendOutcome>;

    /// Compute a customer's balance by summing all of their entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn balance_of(&self, customer_id: &CustomerId) -> Result<i64>;

    /// List a customer's entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn entries_for(
        &self,
        customer_id: &CustomerId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>>;

    /// Look up the entry recorded for an idempotency tuple, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn find_entry(
        &self,
        customer_id: &CustomerId,
        kind: EntryKind,
        external_id: &str,
    ) -> Result<Option<LedgerEntry>>;

    // =========================================================================
    // Spend / Refund
    // =========================================================================

    /// Atomically check the balance and reserve `cost` tokens for `job_id`.
    ///
    /// Within one per-customer critical section: an existing spend entry for
    /// `job_id` short-circuits to success (idempotent retry); otherwise the
    /// balance is computed and the spend entry appended only if
    /// `balance >= cost`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails. Insufficient
    /// balance is not an error; it is `SpendOutcome { success: false, .. }`.
    fn try_spend(
        &self,
        customer_id: &CustomerId,
        cost: i64,
        job_id: &str,
        reason: &str,
    ) -> Result<SpendOutcome>;

    /// Refund the spend recorded for `job_id`, restoring its exact cost.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::SpendNotFound` if no spend entry exists for the
    /// job; an amount is never guessed. An already-refunded job reports
    /// `refunded: false` and changes nothing.
    fn refund(&self, customer_id: &CustomerId, job_id: &str, reason: &str)
        -> Result<RefundOutcome>;

    // =========================================================================
    // Subscription Projection
    // =========================================================================

    /// Insert or replace the projected subscription state for a customer.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn upsert_subscription(&self, state: &SubscriptionState) -> Result<()>;

    /// Get the projected subscription state for a customer.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_subscription(&self, customer_id: &CustomerId) -> Result<Option<SubscriptionState>>;

    // =========================================================================
    // Customer Mapping
    // =========================================================================

    /// Record the provider customer id -> customer mapping, written at
    /// checkout time.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_customer_mapping(
        &self,
        provider_customer_id: &str,
        customer_id: &CustomerId,
    ) -> Result<()>;

    /// Resolve a provider customer id to the customer it was recorded for.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn customer_for_provider(&self, provider_customer_id: &str) -> Result<Option<CustomerId>>;
}
