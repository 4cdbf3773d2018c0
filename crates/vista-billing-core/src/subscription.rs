//! Subscription state types.
//!
//! One `SubscriptionState` row per customer, written only by the projector.
//! Fields always come from a freshly fetched provider subscription object,
//! never from an event payload snapshot, so repeated upserts converge no
//! matter how events are ordered or duplicated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::CustomerId;

/// Current subscription state for a customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionState {
    /// The customer this row belongs to.
    pub customer_id: CustomerId,

    /// Payment-provider customer id (`cus_...`).
    pub provider_customer_id: String,

    /// Payment-provider subscription id (`sub_...`).
    pub provider_subscription_id: String,

    /// Current lifecycle status.
    pub status: SubscriptionStatus,

    /// Catalog plan id, once the subscription's price has been resolved.
    pub plan_id: Option<String>,

    /// End of the current billing period.
    pub current_period_end: Option<DateTime<Utc>>,

    /// When this row was last written.
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionState {
    /// Minimal linkage row written at checkout time, before the first
    /// subscription event arrives.
    #[must_use]
    pub fn linked(
        customer_id: CustomerId,
        provider_customer_id: impl Into<String>,
        provider_subscription_id: impl Into<String>,
    ) -> Self {
        Self {
            customer_id,
            provider_customer_id: provider_customer_id.into(),
            provider_subscription_id: provider_subscription_id.into(),
            status: SubscriptionStatus::Incomplete,
            plan_id: None,
            current_period_end: None,
            updated_at: Utc::now(),
        }
    }
}

/// Subscription lifecycle status.
///
/// Canceled rows are kept for audit history, never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Checkout finished but the subscription is not yet confirmed paid.
    Incomplete,

    /// Subscription is active.
    Active,

    /// In a trial period.
    Trialing,

    /// A renewal payment failed; the provider is retrying.
    PastDue,

    /// Subscription has ended.
    Canceled,
}

impl SubscriptionStatus {
    /// Map a provider status string onto our lifecycle.
    ///
    /// Returns `None` for strings we do not recognize; callers log and skip
    /// the update rather than guessing, and convergence comes from the next
    /// delivery.
    #[must_use]
    pub fn from_provider(status: &str) -> Option<Self> {
        match status {
            "incomplete" => Some(Self::Incomplete),
            "active" => Some(Self::Active),
            "trialing" => Some(Self::Trialing),
            "past_due" | "unpaid" => Some(Self::PastDue),
            "canceled" | "incomplete_expired" => Some(Self::Canceled),
            _ => None,
        }
    }

    /// Stable string form used in logs and API responses.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Incomplete => "incomplete",
            Self::Active => "active",
            Self::Trialing => "trialing",
            Self::PastDue => "past_due",
            Self::Canceled => "canceled",
        }
    }
}
