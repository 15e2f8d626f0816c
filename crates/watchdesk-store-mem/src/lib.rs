//! In-memory reference backend for Watchdesk.
//!
//! Implements both collaborator traits — [`watchdesk_core::store::PortalStore`]
//! and [`watchdesk_core::identity::IdentityProvider`] — with real
//! subscription delivery over channels, store-assigned timestamps, and
//! atomic bounded batch deletes. Faithful to the hosted store's observable
//! behavior, including the one final delivery a subscription may receive
//! after cancellation is requested.
//!
//! Primarily the test backend for `watchdesk-sync`; also useful as an
//! executable description of the store contract.

pub mod error;
pub mod identity;
pub mod store;


pub use error::{Error, Result};
pub use identity::MemoryIdentity;
pub use store::MemoryStore;
