//! Vista Billing HTTP API Service.
//!
//! This crate provides the HTTP surface of the billing ledger:
//!
//! - Stripe webhook ingestion (signature-verified event router)
//! - Subscription state projection (re-fetch-then-upsert)
//! - Spend reservation and refund RPCs for the generation pipeline
//! - Balance and ledger history reads
//!
//! All endpoints except `/health` and the webhook use service API key
//! authentication; end-user auth belongs to the application in front of
//! this service.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers need async for routing consistency

pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod projector;
pub mod routes;
pub mod state;
pub mod stripe;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
pub use stripe::{StripeClient, StripeError};
