//! Database schema definitions and column families.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Ledger entries, keyed by `customer_id (16 bytes) || entry_id (16 bytes)`.
    pub const LEDGER: &str = "ledger";

    /// Idempotency tuples, keyed by `customer_id || kind || external_id`.
    /// Value is the 16-byte entry id of the entry that claimed the tuple.
    pub const LEDGER_KEYS: &str = "ledger_keys";

    /// Projected subscription state, keyed by `customer_id`.
    pub const SUBSCRIPTIONS: &str = "subscriptions";

    /// Mapping from provider customer id to `customer_id`.
    pub const CUSTOMERS_BY_PROVIDER: &str = "customers_by_provider";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::LEDGER,
        cf::LEDGER_KEYS,
        cf::SUBSCRIPTIONS,
        cf::CUSTOMERS_BY_PROVIDER,
    ]
}
