//! Spend reservation and refund RPCs.
//!
//! Called by the generation pipeline: tokens are reserved before the
//! expensive compositor call and refunded if that call fails. The caller
//! computes the cost from its request parameters before invoking spend, and
//! uses the job id as the idempotency key so retried requests cannot
//! double-charge or double-refund.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use vista_billing_core::CustomerId;
use vista_billing_store::{Store, StoreError};

use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// Spend reservation request.
#[derive(Debug, Deserialize)]
pub struct SpendRequest {
    /// The customer being charged.
    pub customer_id: String,

    /// Token cost, strictly positive.
    pub cost: i64,

    /// Generation job id; idempotency key for retries.
    pub job_id: String,

    /// Human-readable description for the ledger.
    #[serde(default)]
    pub reason: String,
}

/// Spend reservation response.
#[derive(Debug, Serialize)]
pub struct SpendResponse {
    /// Whether the tokens are reserved. `false` means insufficient balance:
    /// the caller must surface that condition and must not start the
    /// generation call.
    pub success: bool,

    /// Balance after a successful reservation, or the unchanged
    /// insufficient balance.
    pub balance: i64,
}

/// Reserve tokens for a generation job.
pub async fn spend(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Json(body): Json<SpendRequest>,
) -> Result<Json<SpendResponse>, ApiError> {
    let customer_id = parse_customer(&body.customer_id)?;

    if body.cost <= 0 {
        return Err(ApiError::BadRequest(format!(
            "cost must be positive, got {}",
            body.cost
        )));
    }
    if body.job_id.is_empty() {
        return Err(ApiError::BadRequest("job_id must not be empty".into()));
    }

    let outcome = state
        .store
        .try_spend(&customer_id, body.cost, &body.job_id, &body.reason)?;

    if outcome.success {
        tracing::info!(
            service = %auth.service_name,
            customer_id = %customer_id,
            job_id = %body.job_id,
            cost = body.cost,
            balance = outcome.balance,
            "Tokens reserved"
        );
    } else {
        tracing::info!(
            service = %auth.service_name,
            customer_id = %customer_id,
            job_id = %body.job_id,
            cost = body.cost,
            balance = outcome.balance,
            "Insufficient balance for reservation"
        );
    }

    Ok(Json(SpendResponse {
        success: outcome.success,
        balance: outcome.balance,
    }))
}

/// Refund request.
#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    /// The customer to restore tokens to.
    pub customer_id: String,

    /// The generation job whose spend is reversed.
    pub job_id: String,

    /// Human-readable description for the ledger.
    #[serde(default)]
    pub reason: String,
}

/// Refund response.
#[derive(Debug, Serialize)]
pub struct RefundResponse {
    /// Whether a refund entry was written now (`false` = already refunded).
    pub refunded: bool,

    /// Balance after the call.
    pub balance: i64,
}

/// Refund the spend recorded for a failed generation job.
pub async fn refund(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Json(body): Json<RefundRequest>,
) -> Result<Json<RefundResponse>, ApiError> {
    let customer_id = parse_customer(&body.customer_id)?;

    let outcome = state
        .store
        .refund(&customer_id, &body.job_id, &body.reason)
        .map_err(|err| {
            if matches!(err, StoreError::SpendNotFound { .. }) {
                tracing::warn!(
                    service = %auth.service_name,
                    customer_id = %customer_id,
                    job_id = %body.job_id,
                    "Refund requested for a job with no recorded spend"
                );
            }
            ApiError::from(err)
        })?;

    tracing::info!(
        service = %auth.service_name,
        customer_id = %customer_id,
        job_id = %body.job_id,
        refunded = outcome.refunded,
        balance = outcome.balance,
        "Refund processed"
    );

    Ok(Json(RefundResponse {
        refunded: outcome.refunded,
        balance: outcome.balance,
    }))
}

fn parse_customer(raw: &str) -> Result<CustomerId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid customer_id: {raw}")))
}
