//! Data-synchronization and role-scoped aggregation core of the Watchdesk
//! compliance portal.
//!
//! The moving parts, leaf-first:
//!
//! - [`session::SessionState`] — the single authoritative in-memory record
//!   of who is signed in and what they may do.
//! - [`mirror::RecordMirror`] — a live, owner-scoped local copy of the
//!   session subject's test and warning records, kept current by store
//!   subscriptions. Writes go to the store and come back via subscription;
//!   nothing else mutates the snapshot.
//! - [`stats`] — pure, deterministic computations over record slices.
//! - [`aggregate::ManagerAggregator`] — cross-user statistics for
//!   manager-role subjects, rebuilt wholesale from unscoped fetches.
//! - [`roles::RoleAdmin`] — manager-only role mutation, reflected into the
//!   live session when self-targeted.
//!
//! Construction is explicit dependency injection: build a `SessionState`,
//! hand it (in an `Arc`) to whichever components need it. There is no
//! ambient global.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod aggregate;
pub mod config;
pub mod mirror;
pub mod roles;
pub mod session;
pub mod stats;

pub use watchdesk_core::{Error, Result};

/// Flatten a backend error into the portal taxonomy.
pub(crate) fn store_err<E: std::error::Error>(error: E) -> Error {
  Error::Store(error.to_string())
}

/// Lock a mutex, recovering the data if a panicking observer poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
