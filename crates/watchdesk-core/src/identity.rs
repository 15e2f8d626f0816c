//! The `IdentityProvider` trait — the hosted auth provider as consumed by
//! this core.
//!
//! Credential verification, session tokens, and password policy all live on
//! the provider side. This core only ever learns "who is the session
//! subject", and authorization (the role) is never derived from provider
//! claims — it is fetched from the profile document.

use std::future::Future;

use uuid::Uuid;

use crate::error::{AuthError, RegistrationError};

/// The authenticated identity the provider vouches for. Carries no
/// authorization information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSubject {
  pub subject_id: Uuid,
  pub email:      String,
}

/// Abstraction over the hosted identity provider.
pub trait IdentityProvider: Send + Sync {
  /// Resolves once the provider is reachable. Callers bound the wait with a
  /// timeout budget; this future itself may pend indefinitely.
  fn ready(&self) -> impl Future<Output = ()> + Send + '_;

  /// Verify credentials and open a session.
  fn sign_in<'a>(
    &'a self,
    email: &'a str,
    password: &'a str,
  ) -> impl Future<Output = Result<AuthSubject, AuthError>> + Send + 'a;

  /// Create a new identity. Does not create a profile document; that is
  /// the session layer's job.
  fn create_account<'a>(
    &'a self,
    email: &'a str,
    password: &'a str,
  ) -> impl Future<Output = Result<AuthSubject, RegistrationError>> + Send + 'a;

  /// Revoke the current session. A no-op when none is open.
  fn sign_out(&self) -> impl Future<Output = ()> + Send + '_;

  /// The current session subject, or `None`. Does not perform I/O.
  fn current_subject(&self) -> Option<AuthSubject>;

  /// Update the display name attached to the identity.
  fn update_display_name<'a>(
    &'a self,
    subject_id: Uuid,
    name: &'a str,
  ) -> impl Future<Output = Result<(), RegistrationError>> + Send + 'a;
}
