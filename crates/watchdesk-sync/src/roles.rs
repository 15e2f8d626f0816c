//! [`RoleAdmin`] — manager-only mutation of another subject's role.
//!
//! The role and the legacy manager flag are written in one atomic document
//! update. A change targeting the current session's own subject is
//! reflected into [`SessionState`] immediately, so `current()` and
//! `is_manager()` track it without a sign-out/sign-in round trip.
//!
//! There is deliberately no guard against a manager demoting themselves —
//! the last manager CAN lock everyone out. Preserved from the portal's
//! observed behavior; a client-side count check could not be made atomic
//! against concurrent demotions anyway.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use watchdesk_core::{
  Error, Result,
  identity::IdentityProvider,
  model::{Profile, Role},
  store::PortalStore,
};

use crate::{session::SessionState, store_err};

pub struct RoleAdmin<P, S> {
  session: Arc<SessionState<P, S>>,
  store:   Arc<S>,
}

impl<P, S> RoleAdmin<P, S>
where
  P: IdentityProvider,
  S: PortalStore,
{
  pub fn new(session: Arc<SessionState<P, S>>, store: Arc<S>) -> Self {
    Self { session, store }
  }

  /// Set `subject_id`'s role. Manager-only.
  pub async fn set_role(
    &self,
    subject_id: Uuid,
    make_manager: bool,
  ) -> Result<()> {
    if !self.session.is_manager() {
      return Err(Error::AccessDenied);
    }
    let role = if make_manager { Role::Manager } else { Role::User };
    self.store.set_role(subject_id, role).await.map_err(store_err)?;

    if self
      .session
      .current()
      .is_some_and(|p| p.subject_id == subject_id)
    {
      self.session.apply_role(role);
    }

    info!(subject = %subject_id, %role, "role updated");
    Ok(())
  }

  /// Resolve `email` to a subject and set their role. A missing subject is
  /// [`Error::ProfileNotFound`] — distinct from a write failure, so callers
  /// can show "no such user" rather than "update failed".
  pub async fn set_role_by_email(
    &self,
    email: &str,
    make_manager: bool,
  ) -> Result<Profile> {
    if !self.session.is_manager() {
      return Err(Error::AccessDenied);
    }
    let profile = self
      .store
      .get_profile_by_email(email)
      .await
      .map_err(store_err)?
      .ok_or_else(|| Error::ProfileNotFound(email.to_string()))?;

    self.set_role(profile.subject_id, make_manager).await?;

    self
      .store
      .get_profile(profile.subject_id)
      .await
      .map_err(store_err)?
      .ok_or_else(|| Error::ProfileNotFound(email.to_string()))
  }

  /// Every profile, for the administration listing. Manager-only.
  pub async fn list_profiles(&self) -> Result<Vec<Profile>> {
    if !self.session.is_manager() {
      return Err(Error::AccessDenied);
    }
    self.store.list_profiles().await.map_err(store_err)
  }
}
