//! [`MemoryStore`] — the in-memory implementation of `PortalStore`.

use std::{
  sync::{
    Arc, Mutex, MutexGuard, PoisonError,
    atomic::{AtomicBool, Ordering},
  },
  time::Duration,
};

use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use watchdesk_core::{
  instant::StoreInstant,
  model::{
    NewProfile, NewTestRecord, NewWarningRecord, Profile, Role, TestRecord,
    WarningRecord,
  },
  store::{Delivery, PortalStore, Subscription},
};

use crate::{Error, Result};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ─── Subscription bookkeeping ────────────────────────────────────────────────

/// One registered subscriber for a record collection.
///
/// A cancelled entry is not pruned immediately: it receives one final
/// delivery on the next commit and is dropped afterwards, matching the
/// hosted store's client behavior that the sync layer must guard against.
struct SubEntry<T> {
  owner_id:  Uuid,
  sender:    mpsc::UnboundedSender<Delivery<T>>,
  cancelled: Arc<AtomicBool>,
}

// ─── Store ───────────────────────────────────────────────────────────────────

struct Inner {
  profiles:     Vec<Profile>,
  tests:        Vec<TestRecord>,
  warnings:     Vec<WarningRecord>,
  test_subs:    Vec<SubEntry<TestRecord>>,
  warning_subs: Vec<SubEntry<WarningRecord>>,
}

/// An in-memory Watchdesk document store.
///
/// Cloning is cheap — the inner state is reference-counted, so clones
/// observe the same documents and subscriptions.
#[derive(Clone)]
pub struct MemoryStore {
  inner:     Arc<Mutex<Inner>>,
  ready_tx:  Arc<watch::Sender<bool>>,
  max_batch: usize,
  /// Artificial latency applied to the unscoped fetches; lets tests hold a
  /// load in flight long enough to observe single-flight behavior.
  latency:   Arc<Mutex<Option<Duration>>>,
}

impl Default for MemoryStore {
  fn default() -> Self {
    Self::new()
  }
}

impl MemoryStore {
  pub fn new() -> Self {
    let (ready_tx, _) = watch::channel(true);
    Self {
      inner:     Arc::new(Mutex::new(Inner {
        profiles:     Vec::new(),
        tests:        Vec::new(),
        warnings:     Vec::new(),
        test_subs:    Vec::new(),
        warning_subs: Vec::new(),
      })),
      ready_tx:  Arc::new(ready_tx),
      max_batch: 500,
      latency:   Arc::new(Mutex::new(None)),
    }
  }

  /// A store whose batch limit is smaller than the hosted default — for
  /// exercising the oversized-batch failure path.
  pub fn with_max_batch(max_batch: usize) -> Self {
    Self { max_batch, ..Self::new() }
  }

  /// Toggle backend reachability. `ready()` futures pend while `false`.
  pub fn set_ready(&self, ready: bool) {
    self.ready_tx.send_replace(ready);
  }

  /// Delay unscoped fetches by `latency`.
  pub fn set_fetch_latency(&self, latency: Option<Duration>) {
    *lock(&self.latency) = latency;
  }

  async fn simulate_latency(&self) {
    let latency = *lock(&self.latency);
    if let Some(latency) = latency {
      tokio::time::sleep(latency).await;
    }
  }

  /// Report a transient subscription error to every subscriber of
  /// `owner_id`'s records, as the hosted store does when a query lapses.
  pub fn inject_subscription_error(&self, owner_id: Uuid, message: &str) {
    let inner = lock(&self.inner);
    for entry in inner.test_subs.iter().filter(|e| e.owner_id == owner_id) {
      let _ = entry.sender.send(Delivery::Lapsed(message.to_string()));
    }
    for entry in inner.warning_subs.iter().filter(|e| e.owner_id == owner_id)
    {
      let _ = entry.sender.send(Delivery::Lapsed(message.to_string()));
    }
  }

  /// Deliver the current owner-scoped snapshot to every test subscriber.
  /// Cancelled entries receive this delivery and are then pruned.
  fn fan_out_tests(inner: &mut Inner) {
    let entries = std::mem::take(&mut inner.test_subs);
    for entry in entries {
      let snapshot: Vec<TestRecord> = inner
        .tests
        .iter()
        .filter(|t| t.owner_id == entry.owner_id)
        .cloned()
        .collect();
      let _ = entry.sender.send(Delivery::Replace(snapshot));
      if entry.cancelled.load(Ordering::SeqCst) {
        tracing::debug!(owner = %entry.owner_id, "pruning cancelled test subscription");
      } else {
        inner.test_subs.push(entry);
      }
    }
  }

  fn fan_out_warnings(inner: &mut Inner) {
    let entries = std::mem::take(&mut inner.warning_subs);
    for entry in entries {
      let snapshot: Vec<WarningRecord> = inner
        .warnings
        .iter()
        .filter(|w| w.owner_id == entry.owner_id)
        .cloned()
        .collect();
      let _ = entry.sender.send(Delivery::Replace(snapshot));
      if entry.cancelled.load(Ordering::SeqCst) {
        tracing::debug!(owner = %entry.owner_id, "pruning cancelled warning subscription");
      } else {
        inner.warning_subs.push(entry);
      }
    }
  }
}

impl PortalStore for MemoryStore {
  type Error = Error;

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

  fn max_batch_size(&self) -> usize {
    self.max_batch
  }

  // ── Profiles ──────────────────────────────────────────────────────────

  async fn create_profile(&self, input: NewProfile) -> Result<Profile> {
    let mut inner = lock(&self.inner);
    if inner.profiles.iter().any(|p| {
      p.subject_id == input.subject_id
        || p.email.eq_ignore_ascii_case(&input.email)
    }) {
      return Err(Error::DuplicateProfile(input.email));
    }
    let profile = Profile {
      subject_id:     input.subject_id,
      email:          input.email,
      display_name:   input.display_name,
      role:           input.role,
      legacy_manager: input.role == Role::Manager,
      created_at:     StoreInstant::now(),
      last_login:     Some(StoreInstant::now()),
    };
    inner.profiles.push(profile.clone());
    Ok(profile)
  }

  async fn get_profile(&self, id: Uuid) -> Result<Option<Profile>> {
    let inner = lock(&self.inner);
    Ok(inner.profiles.iter().find(|p| p.subject_id == id).cloned())
  }

  async fn get_profile_by_email(&self, email: &str) -> Result<Option<Profile>> {
    let inner = lock(&self.inner);
    Ok(
      inner
        .profiles
        .iter()
        .find(|p| p.email.eq_ignore_ascii_case(email))
        .cloned(),
    )
  }

  async fn list_profiles(&self) -> Result<Vec<Profile>> {
    self.simulate_latency().await;
    Ok(lock(&self.inner).profiles.clone())
  }

  async fn touch_last_login(&self, id: Uuid) -> Result<()> {
    let mut inner = lock(&self.inner);
    let profile = inner
      .profiles
      .iter_mut()
      .find(|p| p.subject_id == id)
      .ok_or(Error::ProfileNotFound(id))?;
    profile.last_login = Some(StoreInstant::now());
    Ok(())
  }

  async fn set_role(&self, id: Uuid, role: Role) -> Result<()> {
    let mut inner = lock(&self.inner);
    let profile = inner
      .profiles
      .iter_mut()
      .find(|p| p.subject_id == id)
      .ok_or(Error::ProfileNotFound(id))?;
    // Both fields in one update, so no reader can observe them disagreeing.
    profile.role = role;
    profile.legacy_manager = role == Role::Manager;
    Ok(())
  }

  // ── Test records ──────────────────────────────────────────────────────

  async fn add_test(
    &self,
    input: NewTestRecord,
    owner_id: Uuid,
    created_by: String,
  ) -> Result<TestRecord> {
    let mut inner = lock(&self.inner);
    let record = TestRecord {
      id: Uuid::new_v4(),
      owner_id,
      date: input.date,
      test_type: input.test_type,
      network: input.network,
      description: input.description,
      result: input.result,
      evidence_url: input.evidence_url,
      created_by,
      created_at: StoreInstant::now(),
    };
    inner.tests.push(record.clone());
    Self::fan_out_tests(&mut inner);
    Ok(record)
  }

  async fn tests_for(&self, owner_id: Uuid) -> Result<Vec<TestRecord>> {
    let inner = lock(&self.inner);
    Ok(
      inner
        .tests
        .iter()
        .filter(|t| t.owner_id == owner_id)
        .cloned()
        .collect(),
    )
  }

  async fn all_tests(&self) -> Result<Vec<TestRecord>> {
    self.simulate_latency().await;
    Ok(lock(&self.inner).tests.clone())
  }

  async fn delete_tests(&self, ids: Vec<Uuid>) -> Result<()> {
    if ids.len() > self.max_batch {
      return Err(Error::BatchTooLarge {
        requested: ids.len(),
        limit:     self.max_batch,
      });
    }
    let mut inner = lock(&self.inner);
    inner.tests.retain(|t| !ids.contains(&t.id));
    Self::fan_out_tests(&mut inner);
    Ok(())
  }

  async fn subscribe_tests(
    &self,
    owner_id: Uuid,
  ) -> Result<Subscription<TestRecord>> {
    let (sender, receiver) = mpsc::unbounded_channel();
    let cancelled = Arc::new(AtomicBool::new(false));

    let mut inner = lock(&self.inner);
    let snapshot: Vec<TestRecord> = inner
      .tests
      .iter()
      .filter(|t| t.owner_id == owner_id)
      .cloned()
      .collect();
    // The hosted store fires immediately with the current result set.
    let _ = sender.send(Delivery::Replace(snapshot));
    inner.test_subs.push(SubEntry {
      owner_id,
      sender,
      cancelled: Arc::clone(&cancelled),
    });

    Ok(Subscription::new(receiver, move || {
      cancelled.store(true, Ordering::SeqCst);
    }))
  }

  // ── Warning records ───────────────────────────────────────────────────

  async fn add_warning(
    &self,
    input: NewWarningRecord,
    owner_id: Uuid,
    created_by: String,
  ) -> Result<WarningRecord> {
    let mut inner = lock(&self.inner);
    let record = WarningRecord {
      id: Uuid::new_v4(),
      owner_id,
      date: input.date,
      category: input.category,
      recipient: input.recipient,
      reference: input.reference,
      details: input.details,
      problem_areas: input.problem_areas,
      created_by,
      created_at: StoreInstant::now(),
    };
    inner.warnings.push(record.clone());
    Self::fan_out_warnings(&mut inner);
    Ok(record)
  }

  async fn warnings_for(&self, owner_id: Uuid) -> Result<Vec<WarningRecord>> {
    let inner = lock(&self.inner);
    Ok(
      inner
        .warnings
        .iter()
        .filter(|w| w.owner_id == owner_id)
        .cloned()
        .collect(),
    )
  }

  async fn all_warnings(&self) -> Result<Vec<WarningRecord>> {
    self.simulate_latency().await;
    Ok(lock(&self.inner).warnings.clone())
  }

  async fn delete_warnings(&self, ids: Vec<Uuid>) -> Result<()> {
    if ids.len() > self.max_batch {
      return Err(Error::BatchTooLarge {
        requested: ids.len(),
        limit:     self.max_batch,
      });
    }
    let mut inner = lock(&self.inner);
    inner.warnings.retain(|w| !ids.contains(&w.id));
    Self::fan_out_warnings(&mut inner);
    Ok(())
  }

  async fn subscribe_warnings(
    &self,
    owner_id: Uuid,
  ) -> Result<Subscription<WarningRecord>> {
    let (sender, receiver) = mpsc::unbounded_channel();
    let cancelled = Arc::new(AtomicBool::new(false));

    let mut inner = lock(&self.inner);
    let snapshot: Vec<WarningRecord> = inner
      .warnings
      .iter()
      .filter(|w| w.owner_id == owner_id)
      .cloned()
      .collect();
    let _ = sender.send(Delivery::Replace(snapshot));
    inner.warning_subs.push(SubEntry {
      owner_id,
      sender,
      cancelled: Arc::clone(&cancelled),
    });

    Ok(Subscription::new(receiver, move || {
      cancelled.store(true, Ordering::SeqCst);
    }))
  }
}
