//! Stripe wire types.
//!
//! Only the fields this service consumes are modeled. Event payloads are
//! kept as raw `serde_json::Value`: payload snapshots are untrusted (they
//! may be stale or partial), so handlers pull only identifiers from them and
//! re-fetch the typed objects below when they need field truth.

use std::collections::HashMap;

use serde::Deserialize;

/// A webhook event envelope.
#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    /// Event ID (`evt_...`).
    pub id: String,

    /// Event type (e.g. `invoice.paid`).
    #[serde(rename = "type")]
    pub event_type: String,

    /// Event data container.
    pub data: StripeEventData,
}

/// Event data container.
#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    /// The event's object snapshot, untyped.
    pub object: serde_json::Value,
}

/// A subscription object as returned by a direct fetch.
#[derive(Debug, Clone, Deserialize)]
pub struct Subscription {
    /// Subscription ID (`sub_...`).
    pub id: String,

    /// Provider customer ID (`cus_...`).
    pub customer: String,

    /// Provider lifecycle status string.
    pub status: String,

    /// End of the current billing period, epoch seconds.
    #[serde(default)]
    pub current_period_end: Option<i64>,

    /// Subscription items (the priced lines).
    #[serde(default)]
    pub items: SubscriptionItems,

    /// Free-form metadata set at checkout time.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Subscription {
    /// The price id of the first subscription item, if any.
    #[must_use]
    pub fn price_id(&self) -> Option<&str> {
        self.items.data.first().map(|item| item.price.id.as_str())
    }
}

/// Subscription item list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionItems {
    /// The items.
    #[serde(default)]
    pub data: Vec<SubscriptionItem>,
}

/// A single subscription item.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionItem {
    /// The price this item bills.
    pub price: Price,
}

/// A price reference.
#[derive(Debug, Clone, Deserialize)]
pub struct Price {
    /// Price ID (`price_...`).
    pub id: String,
}

/// Checkout session line item list, from
/// `GET /checkout/sessions/{id}/line_items`.
#[derive(Debug, Deserialize)]
pub struct SessionLineItems {
    /// The line items.
    #[serde(default)]
    pub data: Vec<SessionLineItem>,
}

/// A single checkout line item.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionLineItem {
    /// The price purchased.
    pub price: Price,
}

/// Stripe API error response.
#[derive(Debug, Deserialize)]
pub struct StripeErrorResponse {
    /// The error body.
    pub error: StripeErrorBody,
}

/// Stripe API error body.
#[derive(Debug, Deserialize)]
pub struct StripeErrorBody {
    /// Error type.
    #[serde(rename = "type")]
    pub error_type: String,

    /// Error message.
    #[serde(default)]
    pub message: String,

    /// Error code.
    #[serde(default)]
    pub code: Option<String>,
}
