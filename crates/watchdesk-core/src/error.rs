//! Error types for `watchdesk-core`.
//!
//! The taxonomy separates locally-recoverable failures (bad credential,
//! duplicate registration) from contract violations (mutating with no
//! session) and from fatal startup conditions (subsystem never ready).

use std::time::Duration;

use thiserror::Error;

/// A categorized sign-in failure, suitable for a user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
  #[error("invalid email or password")]
  InvalidCredentials,

  #[error("no account exists for that email")]
  UserNotFound,

  #[error("this account has been disabled")]
  AccountDisabled,

  #[error("too many attempts; try again later")]
  RateLimited,

  #[error("network error; check your connection")]
  NetworkUnavailable,
}

/// A categorized registration failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
  #[error("an account already exists for that email")]
  EmailInUse,

  #[error("password does not meet the minimum requirements")]
  WeakPassword,

  #[error("invalid email address")]
  InvalidEmail,

  #[error("identity provider is misconfigured")]
  ProviderMisconfigured,
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("authentication failed: {0}")]
  Auth(#[from] AuthError),

  #[error("registration failed: {0}")]
  Registration(#[from] RegistrationError),

  /// A mutating operation was invoked with no active session. Always a
  /// programming-contract violation, never a transient condition.
  #[error("operation requires an authenticated session")]
  NotAuthenticated,

  /// A manager-only operation was invoked by a non-manager session.
  #[error("operation requires the manager role")]
  AccessDenied,

  /// Role-administration lookup by email found no subject. Distinct from a
  /// write failure so callers can show "no such user" rather than
  /// "update failed".
  #[error("no profile found for email {0:?}")]
  ProfileNotFound(String),

  #[error("batch of {requested} documents exceeds the store limit of {limit}")]
  BatchTooLarge { requested: usize, limit: usize },

  #[error("{subsystem} did not become ready within {budget:?}")]
  InitializationTimeout {
    subsystem: &'static str,
    budget:    Duration,
  },

  #[error(
    "invalid reference code {0:?}: expected \"WA\" followed by at least \
     four digits"
  )]
  InvalidReference(String),

  #[error("store error: {0}")]
  Store(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
