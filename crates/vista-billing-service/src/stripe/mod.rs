//! Payment-provider API client and wire types.

pub mod client;
pub mod types;

pub use client::{StripeClient, StripeError};
pub use types::{SessionLineItem, StripeEvent, Subscription};
