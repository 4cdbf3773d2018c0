//! Core types for the vista billing ledger.
//!
//! This crate provides the domain types shared by the store and the HTTP
//! service:
//!
//! - **Identifiers**: `CustomerId`, `EntryId`
//! - **Ledger**: `LedgerEntry`, `EntryKind`
//! - **Subscriptions**: `SubscriptionState`, `SubscriptionStatus`
//! - **Catalog**: `Plan`, `TopupPack`, `Catalog`, `Grant`
//!
//! # Token Unit
//!
//! Balances are counted in generation tokens, stored as `i64`. Every balance
//! change is an immutable `LedgerEntry` with a signed delta; a customer's
//! balance is the sum of their entries, never a stored column.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod catalog;
pub mod ids;
pub mod ledger;
pub mod subscription;

pub use catalog::{Catalog, Grant, GrantKind, Plan, TopupPack};
pub use ids::{CustomerId, EntryId, IdError};
pub use ledger::{EntryKind, LedgerEntry};
pub use subscription::{SubscriptionState, SubscriptionStatus};
