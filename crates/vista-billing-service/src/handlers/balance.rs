//! Balance, ledger history and subscription read endpoints.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use vista_billing_core::{CustomerId, LedgerEntry, SubscriptionState};
use vista_billing_store::Store;

use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// Balance response.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// The customer queried.
    pub customer_id: String,

    /// Current token balance (sum of all ledger entries).
    pub balance: i64,
}

/// Get a customer's current balance.
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path(customer_id): Path<String>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let customer_id = parse_customer(&customer_id)?;
    let balance = state.store.balance_of(&customer_id)?;

    Ok(Json(BalanceResponse {
        customer_id: customer_id.to_string(),
        balance,
    }))
}

/// Pagination for ledger listings.
#[derive(Debug, Deserialize)]
pub struct LedgerQuery {
    /// Maximum entries to return.
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Entries to skip.
    #[serde(default)]
    pub offset: usize,
}

const fn default_limit() -> usize {
    50
}

/// Ledger listing response.
#[derive(Debug, Serialize)]
pub struct LedgerResponse {
    /// Entries, newest first.
    pub entries: Vec<LedgerEntry>,
}

/// List a customer's ledger entries, newest first.
pub async fn list_ledger(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path(customer_id): Path<String>,
    Query(query): Query<LedgerQuery>,
) -> Result<Json<LedgerResponse>, ApiError> {
    let customer_id = parse_customer(&customer_id)?;
    let limit = query.limit.min(500);
    let entries = state.store.entries_for(&customer_id, limit, query.offset)?;

    Ok(Json(LedgerResponse { entries }))
}

/// Get a customer's projected subscription state.
pub async fn get_subscription(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path(customer_id): Path<String>,
) -> Result<Json<SubscriptionState>, ApiError> {
    let customer_id = parse_customer(&customer_id)?;

    state
        .store
        .get_subscription(&customer_id)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no subscription for customer {customer_id}")))
}

fn parse_customer(raw: &str) -> Result<CustomerId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid customer_id: {raw}")))
}
