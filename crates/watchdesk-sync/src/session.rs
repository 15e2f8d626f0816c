//! [`SessionState`] — who is signed in and what they may do.
//!
//! The profile (including the role) is always read from the document store,
//! never assumed from the identity token. Auth transitions are published on
//! a watch channel so dependents can release subscriptions on sign-out
//! without consulting a global.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use watchdesk_core::{
  Error, Result,
  identity::IdentityProvider,
  model::{NewProfile, Profile, Role},
  store::PortalStore,
};

use crate::{config::PortalConfig, store_err};

/// The single authoritative in-memory record of the current session.
pub struct SessionState<P, S> {
  provider:   Arc<P>,
  store:      Arc<S>,
  config:     PortalConfig,
  profile_tx: watch::Sender<Option<Profile>>,
}

impl<P, S> SessionState<P, S>
where
  P: IdentityProvider,
  S: PortalStore,
{
  pub fn new(provider: Arc<P>, store: Arc<S>, config: PortalConfig) -> Self {
    let (profile_tx, _) = watch::channel(None);
    Self { provider, store, config, profile_tx }
  }

  /// Wait for both external subsystems to become ready, bounded by the
  /// configured budget. Exceeding the budget is a fatal startup error, not
  /// a silent retry.
  pub async fn initialize(&self) -> Result<()> {
    let budget = self.config.init_timeout();
    tokio::time::timeout(budget, self.provider.ready())
      .await
      .map_err(|_| Error::InitializationTimeout {
        subsystem: "identity provider",
        budget,
      })?;
    tokio::time::timeout(budget, self.store.ready())
      .await
      .map_err(|_| Error::InitializationTimeout {
        subsystem: "document store",
        budget,
      })?;
    Ok(())
  }

  /// Verify credentials and load the subject's profile.
  ///
  /// A first-ever sign-in creates the profile with role `user`. A repeat
  /// sign-in updates only the last-login timestamp — the role is never
  /// rewritten on login, even if another client changed it concurrently.
  /// Returns the freshly-read profile, not a cached or assumed one.
  pub async fn sign_in(&self, email: &str, password: &str) -> Result<Profile> {
    let subject = self.provider.sign_in(email, password).await?;

    let existing = self
      .store
      .get_profile(subject.subject_id)
      .await
      .map_err(store_err)?;

    let profile = match existing {
      Some(_) => {
        self
          .store
          .touch_last_login(subject.subject_id)
          .await
          .map_err(store_err)?;
        self
          .store
          .get_profile(subject.subject_id)
          .await
          .map_err(store_err)?
          .ok_or_else(|| {
            Error::Store("profile disappeared during sign-in".to_string())
          })?
      }
      None => {
        let display_name = display_name_from_email(&subject.email);
        self
          .store
          .create_profile(NewProfile {
            subject_id: subject.subject_id,
            email: subject.email.clone(),
            display_name,
            role: Role::User,
          })
          .await
          .map_err(store_err)?
      }
    };

    info!(subject = %profile.subject_id, role = %profile.role, "signed in");
    self.profile_tx.send_replace(Some(profile.clone()));
    Ok(profile)
  }

  /// Create a new identity and its profile document. The role is forced to
  /// `user`; elevation is a separate, manager-only act.
  pub async fn register(
    &self,
    email: &str,
    password: &str,
    display_name: &str,
  ) -> Result<Profile> {
    let subject = self.provider.create_account(email, password).await?;
    self
      .provider
      .update_display_name(subject.subject_id, display_name)
      .await?;

    let profile = self
      .store
      .create_profile(NewProfile {
        subject_id:   subject.subject_id,
        email:        subject.email.clone(),
        display_name: display_name.to_string(),
        role:         Role::User,
      })
      .await
      .map_err(store_err)?;

    info!(subject = %profile.subject_id, "registered");
    self.profile_tx.send_replace(Some(profile.clone()));
    Ok(profile)
  }

  /// Revoke the session and clear the in-memory profile. Dependents observe
  /// the transition via [`SessionState::subscribe`] and release their
  /// subscriptions.
  pub async fn sign_out(&self) {
    self.provider.sign_out().await;
    self.profile_tx.send_replace(None);
    info!("signed out");
  }

  /// The current profile, or `None`. Does not perform I/O.
  pub fn current(&self) -> Option<Profile> {
    self.profile_tx.borrow().clone()
  }

  pub fn is_manager(&self) -> bool {
    self
      .profile_tx
      .borrow()
      .as_ref()
      .is_some_and(Profile::has_manager_access)
  }

  /// Observe auth transitions. The receiver yields the profile after every
  /// sign-in, sign-out, and self-targeted role change.
  pub fn subscribe(&self) -> watch::Receiver<Option<Profile>> {
    self.profile_tx.subscribe()
  }

  /// Reflect a role change into the live session without re-authentication.
  /// Only role administration calls this, and only when the affected
  /// subject is the current session.
  pub(crate) fn apply_role(&self, role: Role) {
    self.profile_tx.send_modify(|profile| {
      if let Some(profile) = profile {
        profile.role = role;
        profile.legacy_manager = role == Role::Manager;
      }
    });
  }
}

fn display_name_from_email(email: &str) -> String {
  email.split('@').next().unwrap_or(email).to_string()
}
