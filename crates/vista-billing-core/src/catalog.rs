//! Plan and top-up catalog.
//!
//! Slowly-changing reference data mapping provider price ids to token grant
//! sizes. Provisioned out-of-band (config file or defaults) and read-only
//! from the ledger's perspective. An unmapped price never grants anything.

use serde::{Deserialize, Serialize};

/// Standard plan monthly token allowance.
pub const STANDARD_PLAN_TOKENS: i64 = 500;

/// Pro plan monthly token allowance.
pub const PRO_PLAN_TOKENS: i64 = 2000;

/// A subscription plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Our plan id (e.g. "standard").
    pub plan_id: String,

    /// Provider price id (`price_...`) this plan bills against.
    pub provider_price_id: String,

    /// Tokens granted on every paid invoice.
    pub monthly_tokens: i64,
}

/// A one-time token pack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopupPack {
    /// Provider price id (`price_...`) this pack sells under.
    pub provider_price_id: String,

    /// Tokens granted per purchase.
    pub tokens: i64,

    /// Inactive packs stop resolving but keep their history.
    pub active: bool,
}

/// The price catalog: plans plus top-up packs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    /// Subscription plans.
    pub plans: Vec<Plan>,

    /// One-time token packs.
    pub topups: Vec<TopupPack>,
}

/// The grant a provider price resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    /// Tokens to credit.
    pub tokens: i64,

    /// Whether the price is a plan or a top-up pack.
    pub kind: GrantKind,
}

/// Which side of the catalog a price resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantKind {
    /// Subscription plan price.
    Plan {
        /// The matching plan id.
        plan_id: String,
    },

    /// One-time top-up price.
    Topup,
}

impl Catalog {
    /// Resolve a provider price id to a token grant.
    ///
    /// Pure lookup; `None` means the price is unmapped (or an inactive
    /// pack) and the caller must treat the grant as a no-op.
    #[must_use]
    pub fn resolve_grant(&self, provider_price_id: &str) -> Option<Grant> {
        if let Some(plan) = self
            .plans
            .iter()
            .find(|p| p.provider_price_id == provider_price_id)
        {
            return Some(Grant {
                tokens: plan.monthly_tokens,
                kind: GrantKind::Plan {
                    plan_id: plan.plan_id.clone(),
                },
            });
        }

        self.topups
            .iter()
            .find(|t| t.active && t.provider_price_id == provider_price_id)
            .map(|t| Grant {
                tokens: t.tokens,
                kind: GrantKind::Topup,
            })
    }

    /// Look up the plan for a provider price id.
    #[must_use]
    pub fn plan_for_price(&self, provider_price_id: &str) -> Option<&Plan> {
        self.plans
            .iter()
            .find(|p| p.provider_price_id == provider_price_id)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            plans: vec![
                Plan {
                    plan_id: "standard".into(),
                    provider_price_id: "price_standard_monthly".into(),
                    monthly_tokens: STANDARD_PLAN_TOKENS,
                },
                Plan {
                    plan_id: "pro".into(),
                    provider_price_id: "price_pro_monthly".into(),
                    monthly_tokens: PRO_PLAN_TOKENS,
                },
            ],
            topups: vec![
                TopupPack {
                    provider_price_id: "price_pack_100".into(),
                    tokens: 100,
                    active: true,
                },
                TopupPack {
                    provider_price_id: "price_pack_550".into(),
                    tokens: 550,
                    active: true,
                },
            ],
        }
    }
}
