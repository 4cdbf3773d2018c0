//! Stripe webhook handler and event router.
//!
//! Every branch is idempotent, so a `200` always means "processed or safely
//! ignored" and any non-`200` leans on the provider's automatic redelivery
//! instead of bespoke retry logic.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;

use vista_billing_core::{CustomerId, GrantKind, LedgerEntry, SubscriptionState, SubscriptionStatus};
use vista_billing_store::Store;

use crate::crypto::SignatureHeader;
use crate::error::ApiError;
use crate::projector;
use crate::state::AppState;
use crate::stripe::StripeEvent;

/// Webhook acknowledgement.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Whether the event was received.
    pub received: bool,
}

/// Handle Stripe webhooks.
///
/// The body is taken as the raw string: the signature is computed over the
/// exact bytes the provider sent, so the payload must not be re-serialized
/// before verification.
pub async fn stripe_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookResponse>, ApiError> {
    if let Some(secret) = &state.config.stripe_webhook_secret {
        let signature = headers
            .get("stripe-signature")
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::InvalidSignature)?;

        let header = SignatureHeader::parse(signature).ok_or(ApiError::InvalidSignature)?;
        if !header.verify(body.as_bytes(), secret) {
            tracing::warn!("Invalid Stripe webhook signature");
            return Err(ApiError::InvalidSignature);
        }
    } else {
        tracing::warn!("Stripe webhook secret not configured - skipping signature verification");
    }

    let event: StripeEvent =
        serde_json::from_str(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    tracing::info!(
        event_type = %event.event_type,
        event_id = %event.id,
        "Received Stripe webhook"
    );

    match event.event_type.as_str() {
        "checkout.session.completed" => {
            handle_checkout_completed(&state, &event.data.object).await?;
        }
        "customer.subscription.created"
        | "customer.subscription.updated"
        | "customer.subscription.deleted" => {
            handle_subscription_event(&state, &event.data.object).await?;
        }
        "invoice.paid" => {
            handle_invoice_paid(&state, &event.data.object).await?;
        }
        "invoice.payment_failed" => {
            handle_invoice_payment_failed(&state, &event.data.object)?;
        }
        _ => {
            // Unknown types are acknowledged for forward-compatibility.
            tracing::debug!(event_type = %event.event_type, "Unhandled Stripe event");
        }
    }

    Ok(Json(WebhookResponse { received: true }))
}

/// Route a completed checkout session by its mode.
async fn handle_checkout_completed(
    state: &AppState,
    data: &serde_json::Value,
) -> Result<(), ApiError> {
    let session_id = data.get("id").and_then(|v| v.as_str()).unwrap_or("unknown");
    let mode = data
        .get("mode")
        .and_then(|v| v.as_str())
        .unwrap_or("payment");
    let payment_status = data
        .get("payment_status")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");

    // The customer id travels through checkout as the client reference.
    let customer_ref = data
        .get("client_reference_id")
        .and_then(|v| v.as_str())
        .or_else(|| {
            data.get("metadata")
                .and_then(|m| m.get("customer_id"))
                .and_then(|v| v.as_str())
        });

    let Some(customer_id) = customer_ref.and_then(|raw| raw.parse::<CustomerId>().ok()) else {
        tracing::warn!(
            session_id = %session_id,
            client_reference_id = ?customer_ref,
            "Checkout session has no attributable customer, ignoring"
        );
        return Ok(());
    };

    let provider_customer_id = data.get("customer").and_then(|v| v.as_str());

    if mode == "subscription" {
        handle_subscription_checkout(state, data, session_id, customer_id, provider_customer_id)
    } else {
        handle_topup_checkout(
            state,
            session_id,
            payment_status,
            customer_id,
            provider_customer_id,
        )
        .await
    }
}

/// Record the checkout-time linkage: provider customer mapping plus a
/// minimal subscription row. Status details arrive via later subscription
/// events; a replayed checkout must not regress a row the projector has
/// already filled in.
fn handle_subscription_checkout(
    state: &AppState,
    data: &serde_json::Value,
    session_id: &str,
    customer_id: CustomerId,
    provider_customer_id: Option<&str>,
) -> Result<(), ApiError> {
    if let Some(provider_customer_id) = provider_customer_id {
        state
            .store
            .put_customer_mapping(provider_customer_id, &customer_id)?;
    }

    let subscription_id = data.get("subscription").and_then(|v| v.as_str());

    let row = match state.store.get_subscription(&customer_id)? {
        Some(mut existing) => {
            if let Some(provider_customer_id) = provider_customer_id {
                existing.provider_customer_id = provider_customer_id.to_string();
            }
            if let Some(subscription_id) = subscription_id {
                existing.provider_subscription_id = subscription_id.to_string();
            }
            existing.updated_at = chrono::Utc::now();
            existing
        }
        None => SubscriptionState::linked(
            customer_id,
            provider_customer_id.unwrap_or_default(),
            subscription_id.unwrap_or_default(),
        ),
    };
    state.store.upsert_subscription(&row)?;

    tracing::info!(
        session_id = %session_id,
        customer_id = %customer_id,
        subscription_id = ?subscription_id,
        "Subscription checkout linked"
    );

    Ok(())
}

/// Grant a one-time token pack from a paid checkout session.
async fn handle_topup_checkout(
    state: &AppState,
    session_id: &str,
    payment_status: &str,
    customer_id: CustomerId,
    provider_customer_id: Option<&str>,
) -> Result<(), ApiError> {
    if payment_status != "paid" {
        tracing::info!(
            session_id = %session_id,
            payment_status = %payment_status,
            "Checkout session not paid yet, skipping"
        );
        return Ok(());
    }

    if let Some(provider_customer_id) = provider_customer_id {
        state
            .store
            .put_customer_mapping(provider_customer_id, &customer_id)?;
    }

    // The completed event does not embed line items; retrieve them to learn
    // which price was purchased.
    let Some(stripe) = &state.stripe else {
        return Err(ApiError::Internal(
            "provider client not configured; cannot resolve checkout line items".into(),
        ));
    };
    let line_items = stripe.get_session_line_items(session_id).await?;

    let Some(price_id) = line_items.first().map(|item| item.price.id.as_str()) else {
        tracing::warn!(session_id = %session_id, "Checkout session has no line items, ignoring");
        return Ok(());
    };

    match state.catalog.resolve_grant(price_id) {
        Some(grant) if grant.kind == GrantKind::Topup => {
            let entry = LedgerEntry::topup(customer_id, grant.tokens, session_id);
            let outcome = state.store.append(&entry)?;
            if outcome.applied {
                tracing::info!(
                    customer_id = %customer_id,
                    session_id = %session_id,
                    tokens = grant.tokens,
                    balance = outcome.balance,
                    "Top-up tokens granted"
                );
            } else {
                tracing::debug!(
                    customer_id = %customer_id,
                    session_id = %session_id,
                    "Top-up already granted for this session"
                );
            }
        }
        Some(_) => {
            tracing::warn!(
                session_id = %session_id,
                price_id = %price_id,
                "Subscription price on a one-time checkout, ignoring grant"
            );
        }
        None => {
            tracing::warn!(
                session_id = %session_id,
                price_id = %price_id,
                "No catalog mapping for price, ignoring grant"
            );
        }
    }

    Ok(())
}

/// Delegate subscription lifecycle events to the projector.
///
/// Only the subscription id is taken from the payload; all field truth
/// comes from the re-fetch.
async fn handle_subscription_event(
    state: &AppState,
    data: &serde_json::Value,
) -> Result<(), ApiError> {
    let Some(subscription_id) = data.get("id").and_then(|v| v.as_str()) else {
        tracing::warn!("Subscription event without an id, ignoring");
        return Ok(());
    };

    projector::sync_subscription(state, subscription_id).await
}

/// Grant monthly plan tokens for a paid invoice, then refresh the projected
/// state from the same subscription fetch.
async fn handle_invoice_paid(state: &AppState, data: &serde_json::Value) -> Result<(), ApiError> {
    let invoice_id = data.get("id").and_then(|v| v.as_str()).unwrap_or("unknown");

    let Some(subscription_id) = data.get("subscription").and_then(|v| v.as_str()) else {
        tracing::debug!(invoice_id = %invoice_id, "Invoice without a subscription, ignoring");
        return Ok(());
    };

    let Some(stripe) = &state.stripe else {
        return Err(ApiError::Internal(
            "provider client not configured; cannot re-fetch subscription".into(),
        ));
    };
    let sub = stripe.get_subscription(subscription_id).await?;

    let Some(customer_id) = projector::resolve_customer(state, &sub.customer, &sub.metadata)?
    else {
        tracing::warn!(
            invoice_id = %invoice_id,
            provider_customer_id = %sub.customer,
            "No customer mapping for paid invoice, ignoring"
        );
        return Ok(());
    };

    match sub.price_id().map(|p| (p, state.catalog.resolve_grant(p))) {
        Some((price_id, Some(grant))) => match grant.kind {
            GrantKind::Plan { plan_id } => {
                let entry =
                    LedgerEntry::monthly_grant(customer_id, grant.tokens, invoice_id, &plan_id);
                let outcome = state.store.append(&entry)?;
                if outcome.applied {
                    tracing::info!(
                        customer_id = %customer_id,
                        invoice_id = %invoice_id,
                        plan_id = %plan_id,
                        tokens = grant.tokens,
                        balance = outcome.balance,
                        "Monthly plan tokens granted"
                    );
                } else {
                    tracing::debug!(
                        customer_id = %customer_id,
                        invoice_id = %invoice_id,
                        "Grant already applied for this invoice"
                    );
                }
            }
            GrantKind::Topup => {
                tracing::warn!(
                    invoice_id = %invoice_id,
                    price_id = %price_id,
                    "Top-up price on a subscription invoice, ignoring grant"
                );
            }
        },
        Some((price_id, None)) => {
            tracing::warn!(
                invoice_id = %invoice_id,
                price_id = %price_id,
                "No catalog mapping for invoice price, ignoring grant"
            );
        }
        None => {
            tracing::warn!(
                invoice_id = %invoice_id,
                subscription_id = %subscription_id,
                "Subscription has no price, ignoring grant"
            );
        }
    }

    projector::project(state, customer_id, &sub)
}

/// Mark the customer past due. No ledger change: failed payments affect
/// status, never balances.
fn handle_invoice_payment_failed(
    state: &AppState,
    data: &serde_json::Value,
) -> Result<(), ApiError> {
    let invoice_id = data.get("id").and_then(|v| v.as_str()).unwrap_or("unknown");

    let Some(provider_customer_id) = data.get("customer").and_then(|v| v.as_str()) else {
        tracing::warn!(invoice_id = %invoice_id, "Failed invoice without a customer, ignoring");
        return Ok(());
    };

    let Some(customer_id) = state.store.customer_for_provider(provider_customer_id)? else {
        tracing::warn!(
            invoice_id = %invoice_id,
            provider_customer_id = %provider_customer_id,
            "No customer mapping for failed invoice, ignoring"
        );
        return Ok(());
    };

    let Some(mut row) = state.store.get_subscription(&customer_id)? else {
        tracing::warn!(
            invoice_id = %invoice_id,
            customer_id = %customer_id,
            "Failed invoice for customer without subscription state, ignoring"
        );
        return Ok(());
    };

    row.status = SubscriptionStatus::PastDue;
    row.updated_at = chrono::Utc::now();
    state.store.upsert_subscription(&row)?;

    tracing::warn!(
        invoice_id = %invoice_id,
        customer_id = %customer_id,
        "Invoice payment failed, subscription marked past due"
    );

    Ok(())
}
