//! Stripe API client.
//!
//! Used for the pull side of reconciliation: re-fetching the authoritative
//! subscription object on lifecycle events and retrieving checkout session
//! line items, the two provider calls the webhook handlers depend on.

use std::time::Duration;

use reqwest::Client;

use super::types::{SessionLineItem, SessionLineItems, StripeErrorResponse, Subscription};

/// Error type for Stripe operations.
#[derive(Debug, thiserror::Error)]
pub enum StripeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Stripe API returned an error.
    #[error("Stripe API error: {error_type} - {message}")]
    Api {
        /// Error type.
        error_type: String,
        /// Error message.
        message: String,
        /// Error code.
        code: Option<String>,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Stripe API client.
#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl StripeClient {
    /// Stripe API base URL.
    const DEFAULT_BASE_URL: &'static str = "https://api.stripe.com/v1";

    /// Create a new Stripe client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_key: impl Into<String>) -> Result<Self, StripeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(StripeError::Http)?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: Self::DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Override the API base URL (integration tests point this at a mock).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Fetch the current subscription object.
    ///
    /// This is the authoritative snapshot the projector trusts instead of
    /// event payloads.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success API response.
    pub async fn get_subscription(&self, subscription_id: &str) -> Result<Subscription, StripeError> {
        let response = self
            .client
            .get(format!("{}/subscriptions/{}", self.base_url, subscription_id))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Fetch the line items of a checkout session.
    ///
    /// Completed-checkout events do not embed line items; they must be
    /// retrieved to learn which price was purchased.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success API response.
    pub async fn get_session_line_items(
        &self,
        session_id: &str,
    ) -> Result<Vec<SessionLineItem>, StripeError> {
        let response = self
            .client
            .get(format!(
                "{}/checkout/sessions/{}/line_items",
                self.base_url, session_id
            ))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .send()
            .await?;

        let items: SessionLineItems = Self::handle_response(response).await?;
        Ok(items.data)
    }

    /// Handle an API response, mapping non-success bodies to typed errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, StripeError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        match response.json::<StripeErrorResponse>().await {
            Ok(body) => Err(StripeError::Api {
                error_type: body.error.error_type,
                message: body.error.message,
                code: body.error.code,
            }),
            Err(_) => Err(StripeError::Api {
                error_type: "unknown".to_string(),
                message: format!("HTTP {status}"),
                code: None,
            }),
        }
    }
}
