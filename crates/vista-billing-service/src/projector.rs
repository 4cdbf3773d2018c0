//! Subscription state projection.
//!
//! The projector keeps one `SubscriptionState` row per customer consistent
//! with the provider, despite webhook deliveries arriving duplicated or out
//! of order. On any lifecycle event it re-fetches the current subscription
//! object and upserts all fields from that snapshot; it never applies
//! deltas from event payloads. Repeated upserts of current truth converge
//! regardless of arrival order.

use std::collections::HashMap;

use chrono::DateTime;

use vista_billing_core::{CustomerId, SubscriptionState, SubscriptionStatus};
use vista_billing_store::Store;

use crate::error::ApiError;
use crate::state::AppState;
use crate::stripe::Subscription;

/// Re-fetch a subscription from the provider and project it.
///
/// Events that cannot be attributed to a customer are logged and ignored:
/// funds and state are never attributed by guesswork, and the provider's
/// redelivery converges once the checkout linkage lands.
pub async fn sync_subscription(state: &AppState, subscription_id: &str) -> Result<(), ApiError> {
    let Some(stripe) = &state.stripe else {
        return Err(ApiError::Internal(
            "provider client not configured; cannot re-fetch subscription".into(),
        ));
    };

    let sub = stripe.get_subscription(subscription_id).await?;

    let Some(customer_id) = resolve_customer(state, &sub.customer, &sub.metadata)? else {
        tracing::warn!(
            subscription_id = %sub.id,
            provider_customer_id = %sub.customer,
            "No customer mapping for subscription event, ignoring"
        );
        return Ok(());
    };

    project(state, customer_id, &sub)
}

/// Resolve the customer a provider object belongs to.
///
/// The mapping recorded at checkout time is primary; metadata is only a
/// fallback because some event shapes omit it. A metadata hit heals the
/// stored mapping for subsequent events.
pub fn resolve_customer(
    state: &AppState,
    provider_customer_id: &str,
    metadata: &HashMap<String, String>,
) -> Result<Option<CustomerId>, ApiError> {
    if let Some(customer_id) = state.store.customer_for_provider(provider_customer_id)? {
        return Ok(Some(customer_id));
    }

    if let Some(raw) = metadata.get("customer_id") {
        match raw.parse::<CustomerId>() {
            Ok(customer_id) => {
                state
                    .store
                    .put_customer_mapping(provider_customer_id, &customer_id)?;
                tracing::info!(
                    provider_customer_id = %provider_customer_id,
                    customer_id = %customer_id,
                    "Recovered customer mapping from subscription metadata"
                );
                return Ok(Some(customer_id));
            }
            Err(_) => {
                tracing::warn!(
                    provider_customer_id = %provider_customer_id,
                    metadata_customer_id = %raw,
                    "Subscription metadata customer_id is not a valid id"
                );
            }
        }
    }

    Ok(None)
}

/// Upsert the full state row from a freshly fetched subscription.
pub fn project(
    state: &AppState,
    customer_id: CustomerId,
    sub: &Subscription,
) -> Result<(), ApiError> {
    let Some(status) = SubscriptionStatus::from_provider(&sub.status) else {
        tracing::warn!(
            subscription_id = %sub.id,
            status = %sub.status,
            "Unrecognized subscription status, skipping update"
        );
        return Ok(());
    };

    let existing = state.store.get_subscription(&customer_id)?;

    // An unmapped price must not erase a previously resolved plan.
    let plan_id = match sub.price_id() {
        Some(price_id) => match state.catalog.plan_for_price(price_id) {
            Some(plan) => Some(plan.plan_id.clone()),
            None => {
                tracing::warn!(
                    subscription_id = %sub.id,
                    price_id = %price_id,
                    "Subscription price has no catalog plan"
                );
                existing.as_ref().and_then(|s| s.plan_id.clone())
            }
        },
        None => existing.as_ref().and_then(|s| s.plan_id.clone()),
    };

    let current_period_end = sub
        .current_period_end
        .and_then(|ts| DateTime::from_timestamp(ts, 0));

    let row = SubscriptionState {
        customer_id,
        provider_customer_id: sub.customer.clone(),
        provider_subscription_id: sub.id.clone(),
        status,
        plan_id,
        current_period_end,
        updated_at: chrono::Utc::now(),
    };
    state.store.upsert_subscription(&row)?;

    tracing::info!(
        customer_id = %customer_id,
        subscription_id = %sub.id,
        status = %status.as_str(),
        "Subscription state projected"
    );

    Ok(())
}
