//! Core types and trait definitions for the Watchdesk portal core.
//!
//! This crate is deliberately free of I/O. It defines the domain model
//! (profiles, test records, warning records), the error taxonomy, and the
//! two external-collaborator traits — [`store::PortalStore`] for the hosted
//! document store and [`identity::IdentityProvider`] for the auth provider.
//! All other crates depend on it; it depends on nothing proprietary.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod error;
pub mod identity;
pub mod instant;
pub mod model;
pub mod store;

pub use error::{AuthError, Error, RegistrationError, Result};
