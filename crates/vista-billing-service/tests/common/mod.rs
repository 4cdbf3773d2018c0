//! Common test utilities for vista-billing integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use tempfile::TempDir;

use vista_billing_core::{Catalog, CustomerId, LedgerEntry};
use vista_billing_service::crypto::hmac_sha256_hex;
use vista_billing_service::{create_router, AppState, ServiceConfig, StripeClient};
use vista_billing_store::{RocksStore, Store};

/// Webhook signing secret used by every harness.
pub const WEBHOOK_SECRET: &str = "whsec_test";

/// Service API key used by every harness.
pub const SERVICE_API_KEY: &str = "test-service-key";

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Direct store handle for seeding and asserting on state.
    pub store: Arc<RocksStore>,
    /// Temporary directory for the database (kept alive for test duration).
    pub _temp_dir: TempDir,
    /// A test customer ID.
    pub customer_id: CustomerId,
}

impl TestHarness {
    /// Harness without a provider client; webhook branches needing a
    /// re-fetch will fail with 5xx.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Harness whose Stripe client points at a wiremock server.
    pub fn with_stripe(base_url: &str) -> Self {
        Self::build(Some(base_url))
    }

    fn build(stripe_base_url: Option<&str>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = Arc::new(RocksStore::open(temp_dir.path()).expect("Failed to open store"));

        let config = ServiceConfig {
            data_dir: temp_dir.path().to_string_lossy().to_string(),
            service_api_key: Some(SERVICE_API_KEY.to_string()),
            stripe_webhook_secret: Some(WEBHOOK_SECRET.to_string()),
            ..ServiceConfig::default()
        };

        let mut state = AppState::new(Arc::clone(&store), config, Catalog::default());
        if let Some(base_url) = stripe_base_url {
            let client = StripeClient::new("sk_test_xxx")
                .expect("Failed to build Stripe client")
                .with_base_url(base_url);
            state = state.with_stripe(client);
        }

        let router: Router = create_router(state);
        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            store,
            _temp_dir: temp_dir,
            customer_id: CustomerId::generate(),
        }
    }

    /// Compute a valid `stripe-signature` header for a payload.
    pub fn sign(&self, payload: &str) -> String {
        let timestamp = "1712345678";
        let signature = hmac_sha256_hex(
            WEBHOOK_SECRET.as_bytes(),
            format!("{timestamp}.{payload}").as_bytes(),
        );
        format!("t={timestamp},v1={signature}")
    }

    /// Deliver a signed webhook payload.
    pub async fn deliver(&self, payload: &str) -> axum_test::TestResponse {
        self.server
            .post("/webhooks/stripe")
            .add_header("stripe-signature", self.sign(payload))
            .text(payload.to_string())
            .await
    }

    /// Seed the ledger with a top-up grant.
    pub fn fund(&self, tokens: i64) {
        let grant = LedgerEntry::topup(self.customer_id, tokens, format!("cs_seed_{tokens}"));
        assert!(self.store.append(&grant).expect("seed grant").applied);
    }

    /// Current balance straight from the store.
    pub fn balance(&self) -> i64 {
        self.store.balance_of(&self.customer_id).expect("balance")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
