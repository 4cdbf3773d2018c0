//! Application state.

use std::sync::Arc;

use vista_billing_core::Catalog;
use vista_billing_store::RocksStore;

use crate::config::ServiceConfig;
use crate::stripe::StripeClient;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<RocksStore>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// The plan/top-up price catalog.
    pub catalog: Arc<Catalog>,

    /// Stripe client for subscription re-fetch and line-item lookups
    /// (optional).
    pub stripe: Option<Arc<StripeClient>>,
}

impl AppState {
    /// Create a new application state, building the Stripe client from the
    /// configuration if an API key is present.
    #[must_use]
    pub fn new(store: Arc<RocksStore>, config: ServiceConfig, catalog: Catalog) -> Self {
        let stripe = config.stripe_api_key.as_ref().and_then(|key| {
            match StripeClient::new(key) {
                Ok(client) => {
                    tracing::info!("Stripe integration enabled");
                    Some(Arc::new(client))
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to create Stripe client");
                    None
                }
            }
        });

        if stripe.is_none() {
            tracing::warn!(
                "Stripe not configured - subscription re-fetch and line-item lookups disabled"
            );
        }

        Self {
            store,
            config,
            catalog: Arc::new(catalog),
            stripe,
        }
    }

    /// Replace the Stripe client (integration tests inject a mock-backed
    /// client here).
    #[must_use]
    pub fn with_stripe(mut self, client: StripeClient) -> Self {
        self.stripe = Some(Arc::new(client));
        self
    }
}
