//! [`MemoryIdentity`] — a scriptable in-memory identity provider.
//!
//! Verifies credentials against seeded accounts and supports injecting the
//! categorized failures (rate limit, network outage) the hosted provider
//! can return, so the session layer's error mapping is testable.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use uuid::Uuid;

use watchdesk_core::{
  error::{AuthError, RegistrationError},
  identity::{AuthSubject, IdentityProvider},
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Account {
  subject_id:   Uuid,
  email:        String,
  password:     String,
  display_name: Option<String>,
  disabled:     bool,
}

struct Inner {
  accounts:  Vec<Account>,
  current:   Option<AuthSubject>,
  /// Injected one-shot failure returned by the next `sign_in` call.
  fail_next: Option<AuthError>,
}

/// An in-memory identity provider. Cloning shares state.
#[derive(Clone)]
pub struct MemoryIdentity {
  inner:    Arc<Mutex<Inner>>,
  ready_tx: Arc<watch::Sender<bool>>,
}

impl Default for MemoryIdentity {
  fn default() -> Self {
    Self::new()
  }
}

impl MemoryIdentity {
  pub fn new() -> Self {
    let (ready_tx, _) = watch::channel(true);
    Self {
      inner:    Arc::new(Mutex::new(Inner {
        accounts:  Vec::new(),
        current:   None,
        fail_next: None,
      })),
      ready_tx: Arc::new(ready_tx),
    }
  }

  /// Seed an account and return its subject id.
  pub fn add_account(&self, email: &str, password: &str) -> Uuid {
    let subject_id = Uuid::new_v4();
    lock(&self.inner).accounts.push(Account {
      subject_id,
      email: email.to_string(),
      password: password.to_string(),
      display_name: None,
      disabled: false,
    });
    subject_id
  }

  pub fn disable_account(&self, email: &str) {
    let mut inner = lock(&self.inner);
    if let Some(account) = inner
      .accounts
      .iter_mut()
      .find(|a| a.email.eq_ignore_ascii_case(email))
    {
      account.disabled = true;
    }
  }

  /// Make the next `sign_in` fail with `error` regardless of credentials.
  pub fn fail_next_sign_in(&self, error: AuthError) {
    lock(&self.inner).fail_next = Some(error);
  }

  /// Toggle provider reachability. `ready()` futures pend while `false`.
  pub fn set_ready(&self, ready: bool) {
    self.ready_tx.send_replace(ready);
  }
}

impl IdentityProvider for MemoryIdentity {
  async fn ready(&self) {
    let mut rx = self.ready_tx.subscribe();
    loop {
      if *rx.borrow_and_update() {
        return;
      }
      if rx.changed().await.is_err() {
        return;
      }
    }
  }

  async fn sign_in(
    &self,
    email: &str,
    password: &str,
  ) -> Result<AuthSubject, AuthError> {
    let mut inner = lock(&self.inner);
    if let Some(error) = inner.fail_next.take() {
      return Err(error);
    }
    let account = inner
      .accounts
      .iter()
      .find(|a| a.email.eq_ignore_ascii_case(email))
      .ok_or(AuthError::UserNotFound)?;
    if account.disabled {
      return Err(AuthError::AccountDisabled);
    }
    if account.password != password {
      return Err(AuthError::InvalidCredentials);
    }
    let subject = AuthSubject {
      subject_id: account.subject_id,
      email:      account.email.clone(),
    };
    inner.current = Some(subject.clone());
    Ok(subject)
  }

  async fn create_account(
    &self,
    email: &str,
    password: &str,
  ) -> Result<AuthSubject, RegistrationError> {
    if !email.contains('@') {
      return Err(RegistrationError::InvalidEmail);
    }
    if password.len() < 6 {
      return Err(RegistrationError::WeakPassword);
    }
    let mut inner = lock(&self.inner);
    if inner
      .accounts
      .iter()
      .any(|a| a.email.eq_ignore_ascii_case(email))
    {
      return Err(RegistrationError::EmailInUse);
    }
    let subject = AuthSubject {
      subject_id: Uuid::new_v4(),
      email:      email.to_string(),
    };
    inner.accounts.push(Account {
      subject_id:   subject.subject_id,
      email:        email.to_string(),
      password:     password.to_string(),
      display_name: None,
      disabled:     false,
    });
    // Creating an account opens a session, as the hosted provider does.
    inner.current = Some(subject.clone());
    Ok(subject)
  }

  async fn sign_out(&self) {
    lock(&self.inner).current = None;
  }

  fn current_subject(&self) -> Option<AuthSubject> {
    lock(&self.inner).current.clone()
  }

  async fn update_display_name(
    &self,
    subject_id: Uuid,
    name: &str,
  ) -> Result<(), RegistrationError> {
    let mut inner = lock(&self.inner);
    let account = inner
      .accounts
      .iter_mut()
      .find(|a| a.subject_id == subject_id)
      .ok_or(RegistrationError::ProviderMisconfigured)?;
    account.display_name = Some(name.to_string());
    Ok(())
  }
}
