//! `RocksDB` storage implementation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode, Options,
    WriteBatch,
};

use vista_billing_core::{CustomerId, EntryId, EntryKind, LedgerEntry, SubscriptionState};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{AppendOutcome, RefundOutcome, SpendOutcome, Store};

/// RocksDB-backed storage implementation.
///
/// Mutations are serialized per customer through a lock stripe so that the
/// check-then-append in `try_spend` (and the duplicate check in `append`)
/// runs as one critical section; customers never contend with each other.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<rocksdb::MultiThreaded>>,
    customer_locks: Mutex<HashMap<CustomerId, Arc<Mutex<()>>>>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            customer_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Get the lock serializing mutations for one customer.
    fn customer_lock(&self, customer_id: &CustomerId) -> Arc<Mutex<()>> {
        // A poisoned map only means another thread panicked while holding
        // it; the map contents are still valid.
        let mut locks = self
            .customer_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            locks
                .entry(*customer_id)
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Look up the entry id that claimed an idempotency tuple.
    fn claimed_entry_id(
        &self,
        customer_id: &CustomerId,
        kind: EntryKind,
        external_id: &str,
    ) -> Result<Option<EntryId>> {
        let cf_keys = self.cf(cf::LEDGER_KEYS)?;
        let key = keys::idempotency_key(customer_id, kind, external_id);

        let value = self
            .db
            .get_cf(&cf_keys, key)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        match value {
            Some(bytes) => {
                let raw: [u8; 16] = bytes.as_slice().try_into().map_err(|_| {
                    StoreError::Serialization("idempotency value is not 16 bytes".into())
                })?;
                Ok(Some(EntryId::from_bytes(raw)))
            }
            None => Ok(None),
        }
    }

    /// Read one entry by its ledger key.
    fn entry_by_id(
        &self,
        customer_id: &CustomerId,
        entry_id: &EntryId,
    ) -> Result<Option<LedgerEntry>> {
        let cf_ledger = self.cf(cf::LEDGER)?;
        let key = keys::ledger_key(customer_id, entry_id);

        self.db
            .get_cf(&cf_ledger, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    /// Sum all entry deltas for a customer via a prefix scan.
    fn sum_entries(&self, customer_id: &CustomerId) -> Result<i64> {
        let cf_ledger = self.cf(cf::LEDGER)?;
        let prefix = keys::ledger_prefix(customer_id);

        let iter = self
            .db
            .iterator_cf(&cf_ledger, IteratorMode::From(&prefix, Direction::Forward));

        let mut balance = 0i64;
        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            let entry: LedgerEntry = Self::deserialize(&value)?;
            balance += entry.delta;
        }

        Ok(balance)
    }

    /// Write an entry and its idempotency claim atomically.
    ///
    /// Caller must hold the customer lock and have verified the tuple is
    /// unclaimed.
    fn write_entry(&self, entry: &LedgerEntry) -> Result<()> {
        let cf_ledger = self.cf(cf::LEDGER)?;
        let cf_keys = self.cf(cf::LEDGER_KEYS)?;

        let ledger_key = keys::ledger_key(&entry.customer_id, &entry.id);
        let idem_key = keys::idempotency_key(&entry.customer_id, entry.kind, &entry.external_id);
        let value = Self::serialize(entry)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_ledger, &ledger_key, &value);
        batch.put_cf(&cf_keys, &idem_key, entry.id.to_bytes());

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Ledger Operations
    // =========================================================================

    fn append(&self, entry: &LedgerEntry) -> Result<AppendOutcome> {
        let lock = self.customer_lock(&entry.customer_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        if self
            .claimed_entry_id(&entry.customer_id, entry.kind, &entry.external_id)?
            .is_some()
        {
            tracing::debug!(
                customer_id = %entry.customer_id,
                kind = entry.kind.as_str(),
                external_id = %entry.external_id,
                "Duplicate ledger entry suppressed"
            );
            return Ok(AppendOutcome {
                applied: false,
                balance: self.sum_entries(&entry.customer_id)?,
            });
        }

        let balance_before = self.sum_entries(&entry.customer_id)?;
        self.write_entry(entry)?;

        Ok(AppendOutcome {
            applied: true,
            balance: balance_before + entry.delta,
        })
    }

    fn balance_of(&self, customer_id: &CustomerId) -> Result<i64> {
        self.sum_entries(customer_id)
    }

    fn entries_for(
        &self,
        customer_id: &CustomerId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>> {
        let cf_ledger = self.cf(cf::LEDGER)?;
        let prefix = keys::ledger_prefix(customer_id);

        let iter = self
            .db
            .iterator_cf(&cf_ledger, IteratorMode::From(&prefix, Direction::Forward));

        // Keys iterate oldest-first (ULIDs are time-ordered); collect and
        // reverse for a newest-first listing.
        let mut entries = Vec::new();
        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            entries.push(Self::deserialize(&value)?);
        }
        entries.reverse();

        Ok(entries.into_iter().skip(offset).take(limit).collect())
    }

    fn find_entry(
        &self,
        customer_id: &CustomerId,
        kind: EntryKind,
        external_id: &str,
    ) -> Result<Option<LedgerEntry>> {
        match self.claimed_entry_id(customer_id, kind, external_id)? {
            Some(entry_id) => self.entry_by_id(customer_id, &entry_id),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Spend / Refund
    // =========================================================================

    fn try_spend(
        &self,
        customer_id: &CustomerId,
        cost: i64,
        job_id: &str,
        reason: &str,
    ) -> Result<SpendOutcome> {
        let lock = self.customer_lock(customer_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        // A retried job that already spent holds its reservation; nothing
        // is appended and the current balance is reported.
        if self
            .claimed_entry_id(customer_id, EntryKind::Spend, job_id)?
            .is_some()
        {
            tracing::debug!(
                customer_id = %customer_id,
                job_id = %job_id,
                "Spend already recorded for job, holding reservation"
            );
            return Ok(SpendOutcome {
                success: true,
                balance: self.sum_entries(customer_id)?,
            });
        }

        let cost = cost.abs();
        let balance = self.sum_entries(customer_id)?;
        if balance < cost {
            return Ok(SpendOutcome {
                success: false,
                balance,
            });
        }

        let entry = LedgerEntry::spend(*customer_id, cost, job_id, reason);
        self.write_entry(&entry)?;

        Ok(SpendOutcome {
            success: true,
            balance: balance - cost,
        })
    }

    fn refund(
        &self,
        customer_id: &CustomerId,
        job_id: &str,
        reason: &str,
    ) -> Result<RefundOutcome> {
        let lock = self.customer_lock(customer_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        // The refund amount comes from the recorded spend, never the caller.
        let spend = self
            .claimed_entry_id(customer_id, EntryKind::Spend, job_id)?
            .map(|id| self.entry_by_id(customer_id, &id))
            .transpose()?
            .flatten()
            .ok_or_else(|| StoreError::SpendNotFound {
                job_id: job_id.to_string(),
            })?;

        if self
            .claimed_entry_id(customer_id, EntryKind::Refund, job_id)?
            .is_some()
        {
            return Ok(RefundOutcome {
                refunded: false,
                balance: self.sum_entries(customer_id)?,
            });
        }

        let tokens = -spend.delta;
        let balance_before = self.sum_entries(customer_id)?;
        let entry = LedgerEntry::refund(*customer_id, tokens, job_id, reason);
        self.write_entry(&entry)?;

        Ok(RefundOutcome {
            refunded: true,
            balance: balance_before + tokens,
        })
    }

    // =========================================================================
    // Subscription Projection
    // =========================================================================

    fn upsert_subscription(&self, state: &SubscriptionState) -> Result<()> {
        let cf_subs = self.cf(cf::SUBSCRIPTIONS)?;
        let key = keys::subscription_key(&state.customer_id);
        let value = Self::serialize(state)?;

        self.db
            .put_cf(&cf_subs, key, value)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn get_subscription(&self, customer_id: &CustomerId) -> Result<Option<SubscriptionState>> {
        let cf_subs = self.cf(cf::SUBSCRIPTIONS)?;
        let key = keys::subscription_key(customer_id);

        self.db
            .get_cf(&cf_subs, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    // =========================================================================
    // Customer Mapping
    // =========================================================================

    fn put_customer_mapping(
        &self,
        provider_customer_id: &str,
        customer_id: &CustomerId,
    ) -> Result<()> {
        let cf_map = self.cf(cf::CUSTOMERS_BY_PROVIDER)?;
        let key = keys::provider_customer_key(provider_customer_id);

        self.db
            .put_cf(&cf_map, key, customer_id.as_bytes())
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn customer_for_provider(&self, provider_customer_id: &str) -> Result<Option<CustomerId>> {
        let cf_map = self.cf(cf::CUSTOMERS_BY_PROVIDER)?;
        let key = keys::provider_customer_key(provider_customer_id);

        let value = self
            .db
            .get_cf(&cf_map, key)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        match value {
            Some(bytes) => {
                let raw: [u8; 16] = bytes.as_slice().try_into().map_err(|_| {
                    StoreError::Serialization("customer mapping value is not 16 bytes".into())
                })?;
                Ok(Some(CustomerId::from_bytes(raw)))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use vista_billing_core::SubscriptionStatus;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn fund(store: &RocksStore, customer: CustomerId, tokens: i64) {
        let grant = LedgerEntry::topup(customer, tokens, format!("cs_fund_{tokens}"));
        assert!(store.append(&grant).unwrap().applied);
    }

    #[test]
    fn balance_is_sum_of_entries() {
        let (store, _dir) = create_test_store();
        let customer = CustomerId::generate();

        assert_eq!(store.balance_of(&customer).unwrap(), 0);

        store
            .append(&LedgerEntry::monthly_grant(customer, 100, "in_1", "standard"))
            .unwrap();
        store
            .append(&LedgerEntry::topup(customer, 50, "cs_1"))
            .unwrap();
        store.try_spend(&customer, 30, "job_1", "render").unwrap();

        assert_eq!(store.balance_of(&customer).unwrap(), 120);
    }

    #[test]
    fn duplicate_grant_applies_once() {
        let (store, _dir) = create_test_store();
        let customer = CustomerId::generate();

        let first = store
            .append(&LedgerEntry::monthly_grant(customer, 100, "in_1", "standard"))
            .unwrap();
        assert!(first.applied);
        assert_eq!(first.balance, 100);

        // Same invoice re-delivered: distinct entry id, same tuple.
        let replay = store
            .append(&LedgerEntry::monthly_grant(customer, 100, "in_1", "standard"))
            .unwrap();
        assert!(!replay.applied);
        assert_eq!(replay.balance, 100);

        assert_eq!(store.entries_for(&customer, 10, 0).unwrap().len(), 1);
    }

    #[test]
    fn spend_reduces_balance() {
        let (store, _dir) = create_test_store();
        let customer = CustomerId::generate();
        fund(&store, customer, 10);

        let outcome = store.try_spend(&customer, 2, "job_a", "render").unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.balance, 8);
        assert_eq!(store.balance_of(&customer).unwrap(), 8);
    }

    #[test]
    fn spend_retry_is_idempotent() {
        let (store, _dir) = create_test_store();
        let customer = CustomerId::generate();
        fund(&store, customer, 10);

        store.try_spend(&customer, 2, "job_a", "render").unwrap();

        // Retrying the same job holds the reservation without re-spending.
        let retry = store.try_spend(&customer, 2, "job_a", "render").unwrap();
        assert!(retry.success);
        assert_eq!(retry.balance, 8);
        assert_eq!(store.balance_of(&customer).unwrap(), 8);
    }

    #[test]
    fn insufficient_balance_appends_nothing() {
        let (store, _dir) = create_test_store();
        let customer = CustomerId::generate();
        fund(&store, customer, 5);

        let outcome = store.try_spend(&customer, 100, "job_a", "render").unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.balance, 5);

        assert_eq!(store.balance_of(&customer).unwrap(), 5);
        assert!(store
            .find_entry(&customer, EntryKind::Spend, "job_a")
            .unwrap()
            .is_none());
    }

    #[test]
    fn refund_restores_exact_cost() {
        let (store, _dir) = create_test_store();
        let customer = CustomerId::generate();
        fund(&store, customer, 10);

        store.try_spend(&customer, 3, "job_a", "render").unwrap();
        assert_eq!(store.balance_of(&customer).unwrap(), 7);

        let refund = store
            .refund(&customer, "job_a", "generation failed")
            .unwrap();
        assert!(refund.refunded);
        assert_eq!(refund.balance, 10);
    }

    #[test]
    fn refund_retry_cannot_double_refund() {
        let (store, _dir) = create_test_store();
        let customer = CustomerId::generate();
        fund(&store, customer, 10);

        store.try_spend(&customer, 3, "job_a", "render").unwrap();
        store
            .refund(&customer, "job_a", "generation failed")
            .unwrap();

        let retry = store
            .refund(&customer, "job_a", "generation failed")
            .unwrap();
        assert!(!retry.refunded);
        assert_eq!(retry.balance, 10);
        assert_eq!(store.balance_of(&customer).unwrap(), 10);
    }

    #[test]
    fn refund_without_spend_is_refused() {
        let (store, _dir) = create_test_store();
        let customer = CustomerId::generate();
        fund(&store, customer, 10);

        let result = store.refund(&customer, "job_missing", "oops");
        assert!(matches!(result, Err(StoreError::SpendNotFound { .. })));
        assert_eq!(store.balance_of(&customer).unwrap(), 10);
    }

    #[test]
    fn concurrent_spends_never_overdraw() {
        let (store, _dir) = create_test_store();
        let store = std::sync::Arc::new(store);
        let customer = CustomerId::generate();
        fund(&store, customer, 10);

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let store = std::sync::Arc::clone(&store);
                std::thread::spawn(move || {
                    store
                        .try_spend(&customer, 2, &format!("job_{i}"), "render")
                        .unwrap()
                        .success
                })
            })
            .collect();

        let successes = handles
            .into_iter()
            .filter(|h| h.join().unwrap())
            .count() as i64;

        // Ten tokens cover at most five two-token spends.
        assert_eq!(successes, 5);
        assert_eq!(store.balance_of(&customer).unwrap(), 0);
    }

    #[test]
    fn customers_are_independent() {
        let (store, _dir) = create_test_store();
        let a = CustomerId::generate();
        let b = CustomerId::generate();
        fund(&store, a, 10);
        fund(&store, b, 3);

        store.try_spend(&a, 4, "job_a", "render").unwrap();

        assert_eq!(store.balance_of(&a).unwrap(), 6);
        assert_eq!(store.balance_of(&b).unwrap(), 3);
    }

    #[test]
    fn entries_list_newest_first_with_pagination() {
        let (store, _dir) = create_test_store();
        let customer = CustomerId::generate();

        store
            .append(&LedgerEntry::topup(customer, 100, "cs_1"))
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        store
            .append(&LedgerEntry::topup(customer, 50, "cs_2"))
            .unwrap();

        let newest = store.entries_for(&customer, 1, 0).unwrap();
        assert_eq!(newest[0].external_id, "cs_2");

        let older = store.entries_for(&customer, 1, 1).unwrap();
        assert_eq!(older[0].external_id, "cs_1");
    }

    #[test]
    fn subscription_upsert_roundtrip() {
        let (store, _dir) = create_test_store();
        let customer = CustomerId::generate();

        let mut state = SubscriptionState::linked(customer, "cus_1", "sub_1");
        store.upsert_subscription(&state).unwrap();

        let read = store.get_subscription(&customer).unwrap().unwrap();
        assert_eq!(read.status, SubscriptionStatus::Incomplete);

        state.status = SubscriptionStatus::Active;
        state.plan_id = Some("pro".into());
        store.upsert_subscription(&state).unwrap();

        let read = store.get_subscription(&customer).unwrap().unwrap();
        assert_eq!(read.status, SubscriptionStatus::Active);
        assert_eq!(read.plan_id.as_deref(), Some("pro"));
    }

    #[test]
    fn customer_mapping_roundtrip() {
        let (store, _dir) = create_test_store();
        let customer = CustomerId::generate();

        assert!(store.customer_for_provider("cus_1").unwrap().is_none());

        store.put_customer_mapping("cus_1", &customer).unwrap();
        assert_eq!(
            store.customer_for_provider("cus_1").unwrap(),
            Some(customer)
        );
    }
}
