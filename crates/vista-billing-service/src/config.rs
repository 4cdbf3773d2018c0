//! Service configuration.

use std::path::Path;

use serde::Deserialize;

use vista_billing_core::Catalog;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to the `RocksDB` data directory (default: "/data/vista-billing").
    pub data_dir: String,

    /// Service API key for service-to-service auth.
    pub service_api_key: Option<String>,

    /// Stripe API key (optional; without it subscription re-fetch and
    /// line-item lookups are disabled).
    pub stripe_api_key: Option<String>,

    /// Stripe webhook signing secret (optional; without it signature
    /// verification is skipped, development mode only).
    pub stripe_webhook_secret: Option<String>,

    /// Path to the plan/top-up catalog JSON file (optional; the built-in
    /// catalog is used when unset).
    pub catalog_path: Option<String>,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,
}

/// Stripe secrets file structure.
#[derive(Debug, Deserialize)]
struct StripeSecrets {
    api_key: String,
    #[serde(default)]
    webhook_secret: Option<String>,
}

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    #[must_use]
    pub fn from_env() -> Self {
        // Secrets file takes precedence over env vars.
        let (stripe_api_key, stripe_webhook_secret) = load_stripe_secrets();

        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "/data/vista-billing".into()),
            service_api_key: std::env::var("SERVICE_API_KEY").ok(),
            stripe_api_key,
            stripe_webhook_secret,
            catalog_path: std::env::var("CATALOG_PATH").ok(),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: std::env::var("MAX_BODY_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1024 * 1024), // 1MB
            request_timeout_seconds: std::env::var("REQUEST_TIMEOUT_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        }
    }

    /// Load the price catalog from `catalog_path`, or the built-in defaults
    /// when no path is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured catalog file is missing or invalid;
    /// the service must not start with a half-loaded catalog.
    pub fn load_catalog(&self) -> Result<Catalog, std::io::Error> {
        match &self.catalog_path {
            Some(path) => {
                let catalog = load_json_file::<Catalog>(path)?;
                tracing::info!(
                    path = %path,
                    plans = catalog.plans.len(),
                    topups = catalog.topups.len(),
                    "Loaded price catalog"
                );
                Ok(catalog)
            }
            None => {
                tracing::info!("CATALOG_PATH not set, using built-in catalog");
                Ok(Catalog::default())
            }
        }
    }
}

/// Load Stripe secrets from file or environment.
fn load_stripe_secrets() -> (Option<String>, Option<String>) {
    let secret_paths = [".secrets/stripe.json", "../.secrets/stripe.json"];

    for path in &secret_paths {
        if let Ok(secrets) = load_json_file::<StripeSecrets>(path) {
            tracing::info!(path = %path, "Loaded Stripe secrets from file");
            return (Some(secrets.api_key), secrets.webhook_secret);
        }
    }

    tracing::debug!("Stripe secrets file not found, using environment variables");
    (
        std::env::var("STRIPE_API_KEY").ok(),
        std::env::var("STRIPE_WEBHOOK_SECRET").ok(),
    )
}

/// Load and parse a JSON file.
fn load_json_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("file not found: {}", path.display()),
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/vista-billing".into(),
            service_api_key: None,
            stripe_api_key: None,
            stripe_webhook_secret: None,
            catalog_path: None,
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_when_no_path() {
        let config = ServiceConfig::default();
        let catalog = config.load_catalog().unwrap();
        assert!(!catalog.plans.is_empty());
    }

    #[test]
    fn missing_catalog_file_is_an_error() {
        let config = ServiceConfig {
            catalog_path: Some("/nonexistent/catalog.json".into()),
            ..ServiceConfig::default()
        };
        assert!(config.load_catalog().is_err());
    }

    #[test]
    fn catalog_loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(
            &path,
            r#"{"plans": [{"plan_id": "solo", "provider_price_id": "price_x", "monthly_tokens": 50}], "topups": []}"#,
        )
        .unwrap();

        let config = ServiceConfig {
            catalog_path: Some(path.to_string_lossy().to_string()),
            ..ServiceConfig::default()
        };
        let catalog = config.load_catalog().unwrap();
        assert_eq!(catalog.plans[0].plan_id, "solo");
    }
}
