//! [`RecordMirror`] — a live, owner-scoped local copy of the session
//! subject's records.
//!
//! Every subscription delivery *fully replaces* the corresponding in-memory
//! sequence; the store's commit order is the sole ordering authority and no
//! client-side merging ever happens. Writes do not touch the snapshot
//! either — a new record appears only once the store delivers it back, so
//! the UI can never show a record the store rejected.
//!
//! Re-initialization is guarded by a generation token: `start` and `stop`
//! bump an epoch, and a delivery tagged with a stale epoch is discarded.
//! This covers store clients that deliver one final callback after
//! cancellation is requested.

use std::{
  panic::{AssertUnwindSafe, catch_unwind},
  sync::{
    Arc, Mutex, Weak,
    atomic::{AtomicU64, Ordering},
  },
};

use chrono::Local;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use watchdesk_core::{
  Error, Result,
  identity::IdentityProvider,
  model::{
    DateRange, NewTestRecord, NewWarningRecord, RecordKind, TestRecord,
    WarningRecord,
  },
  store::{Delivery, PortalStore, Subscription},
};

use crate::{lock, session::SessionState, stats, store_err};

// ─── Observers ───────────────────────────────────────────────────────────────

type ObserverCallback = Box<dyn Fn() + Send + Sync>;

struct ObserverEntry {
  id:       u64,
  callback: ObserverCallback,
}

/// A registered observer. Dropping (or calling [`ObserverHandle::detach`])
/// detaches the callback, so observers cannot leak across
/// re-initialization.
#[must_use = "dropping the handle detaches the observer"]
pub struct ObserverHandle {
  id:        u64,
  observers: Weak<Mutex<Vec<Arc<ObserverEntry>>>>,
}

impl ObserverHandle {
  pub fn detach(self) {}
}

impl Drop for ObserverHandle {
  fn drop(&mut self) {
    if let Some(observers) = self.observers.upgrade() {
      lock(&observers).retain(|entry| entry.id != self.id);
    }
  }
}

/// Invoke every observer; a panic in one must not starve the others.
///
/// The list is snapshotted and the lock released before any callback runs,
/// so a callback may detach or register observers (including its own
/// handle) without deadlocking the delivery task.
fn notify_observers(observers: &Mutex<Vec<Arc<ObserverEntry>>>) {
  let entries: Vec<Arc<ObserverEntry>> = lock(observers).clone();
  for entry in entries {
    if catch_unwind(AssertUnwindSafe(|| (entry.callback)())).is_err() {
      warn!(observer = entry.id, "observer panicked during change notification");
    }
  }
}

// ─── Mirror ──────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Snapshot {
  tests:    Vec<TestRecord>,
  warnings: Vec<WarningRecord>,
}

/// The owner-scoped, eventually-consistent local copy of test and warning
/// records.
pub struct RecordMirror<P, S> {
  session:          Arc<SessionState<P, S>>,
  store:            Arc<S>,
  snapshot:         Arc<Mutex<Snapshot>>,
  observers:        Arc<Mutex<Vec<Arc<ObserverEntry>>>>,
  epoch:            Arc<AtomicU64>,
  next_observer_id: AtomicU64,
  tasks:            Mutex<Vec<JoinHandle<()>>>,
}

impl<P, S> RecordMirror<P, S>
where
  P: IdentityProvider + 'static,
  S: PortalStore + 'static,
{
  pub fn new(session: Arc<SessionState<P, S>>, store: Arc<S>) -> Self {
    Self {
      session,
      store,
      snapshot: Arc::new(Mutex::new(Snapshot::default())),
      observers: Arc::new(Mutex::new(Vec::new())),
      epoch: Arc::new(AtomicU64::new(0)),
      next_observer_id: AtomicU64::new(0),
      tasks: Mutex::new(Vec::new()),
    }
  }

  /// Open both owner-scoped subscriptions. Any previous subscriptions are
  /// cancelled first; their late deliveries are discarded by the epoch
  /// guard, so a prior owner's data can never corrupt the new view.
  pub async fn start(&self, owner_id: Uuid) -> Result<()> {
    self.stop();
    let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;

    let tests = self
      .store
      .subscribe_tests(owner_id)
      .await
      .map_err(store_err)?;
    let warnings = self
      .store
      .subscribe_warnings(owner_id)
      .await
      .map_err(store_err)?;

    let mut tasks = lock(&self.tasks);
    tasks.push(tokio::spawn(pump(
      "tests",
      tests,
      Arc::clone(&self.epoch),
      epoch,
      Arc::clone(&self.snapshot),
      Arc::clone(&self.observers),
      |snapshot, records| snapshot.tests = records,
    )));
    tasks.push(tokio::spawn(pump(
      "warnings",
      warnings,
      Arc::clone(&self.epoch),
      epoch,
      Arc::clone(&self.snapshot),
      Arc::clone(&self.observers),
      |snapshot, records| snapshot.warnings = records,
    )));
    Ok(())
  }

  /// Cancel both subscriptions. Safe to call when not started. The snapshot
  /// is left in place (last known good); use [`RecordMirror::clear`] to
  /// drop it.
  pub fn stop(&self) {
    self.epoch.fetch_add(1, Ordering::SeqCst);
    for task in lock(&self.tasks).drain(..) {
      task.abort();
    }
  }

  /// Empty the snapshot and notify observers.
  pub fn clear(&self) {
    {
      let mut snapshot = lock(&self.snapshot);
      snapshot.tests.clear();
      snapshot.warnings.clear();
    }
    notify_observers(&self.observers);
  }

  /// Drive `start`/`stop` from the session's auth transitions: start on
  /// sign-in, stop and clear on sign-out, restart on subject change.
  pub fn follow_session(self: &Arc<Self>) -> JoinHandle<()> {
    let mirror = Arc::clone(self);
    let mut auth = mirror.session.subscribe();
    tokio::spawn(async move {
      let mut owner: Option<Uuid> = None;
      loop {
        let target =
          auth.borrow_and_update().as_ref().map(|p| p.subject_id);
        if target != owner {
          match target {
            Some(subject_id) => {
              if let Err(error) = mirror.start(subject_id).await {
                warn!(%error, "failed to start mirror for new session");
              }
            }
            None => {
              mirror.stop();
              mirror.clear();
            }
          }
          owner = target;
        }
        if auth.changed().await.is_err() {
          return;
        }
      }
    })
  }

  /// Register a change observer, invoked after every applied delivery.
  pub fn observe(
    &self,
    callback: impl Fn() + Send + Sync + 'static,
  ) -> ObserverHandle {
    let id = self.next_observer_id.fetch_add(1, Ordering::SeqCst);
    lock(&self.observers).push(Arc::new(ObserverEntry {
      id,
      callback: Box::new(callback),
    }));
    ObserverHandle { id, observers: Arc::downgrade(&self.observers) }
  }

  // ── Writes ────────────────────────────────────────────────────────────

  /// Persist a test record for the current session subject. The record is
  /// NOT spliced into the local snapshot; the subscription delivery is the
  /// sole source of truth.
  pub async fn add_test(&self, input: NewTestRecord) -> Result<TestRecord> {
    let profile = self.session.current().ok_or(Error::NotAuthenticated)?;
    self
      .store
      .add_test(input, profile.subject_id, profile.email)
      .await
      .map_err(store_err)
  }

  pub async fn add_warning(
    &self,
    input: NewWarningRecord,
  ) -> Result<WarningRecord> {
    let profile = self.session.current().ok_or(Error::NotAuthenticated)?;
    self
      .store
      .add_warning(input, profile.subject_id, profile.email)
      .await
      .map_err(store_err)
  }

  /// Delete every one of the current subject's records of `kind` as one
  /// atomic batch. Fails whole — without deleting anything — if the batch
  /// would exceed the store's batch-size limit. Returns the number of
  /// records deleted.
  pub async fn clear_all(&self, kind: RecordKind) -> Result<usize> {
    let profile = self.session.current().ok_or(Error::NotAuthenticated)?;
    let owner_id = profile.subject_id;

    let ids: Vec<Uuid> = match kind {
      RecordKind::Tests => self
        .store
        .tests_for(owner_id)
        .await
        .map_err(store_err)?
        .iter()
        .map(|t| t.id)
        .collect(),
      RecordKind::Warnings => self
        .store
        .warnings_for(owner_id)
        .await
        .map_err(store_err)?
        .iter()
        .map(|w| w.id)
        .collect(),
    };

    let limit = self.store.max_batch_size();
    if ids.len() > limit {
      return Err(Error::BatchTooLarge { requested: ids.len(), limit });
    }

    let deleted = ids.len();
    match kind {
      RecordKind::Tests => {
        self.store.delete_tests(ids).await.map_err(store_err)?;
      }
      RecordKind::Warnings => {
        self.store.delete_warnings(ids).await.map_err(store_err)?;
      }
    }
    Ok(deleted)
  }

  // ── Reads ─────────────────────────────────────────────────────────────
  // Pure and synchronous over the in-memory snapshot; never I/O.

  pub fn tests(&self) -> Vec<TestRecord> {
    lock(&self.snapshot).tests.clone()
  }

  pub fn warnings(&self) -> Vec<WarningRecord> {
    lock(&self.snapshot).warnings.clone()
  }

  /// Tests whose performed-date equals today's calendar date in the local
  /// timezone. Dated by when the test occurred, not when it was logged.
  pub fn today_tests(&self) -> Vec<TestRecord> {
    let today = Local::now().date_naive();
    stats::tests_on(&lock(&self.snapshot).tests, today)
  }

  pub fn today_warnings(&self) -> Vec<WarningRecord> {
    let today = Local::now().date_naive();
    stats::warnings_on(&lock(&self.snapshot).warnings, today)
  }

  pub fn filtered_tests(
    &self,
    range: DateRange,
    network: Option<&str>,
  ) -> Vec<TestRecord> {
    stats::filter_tests(&lock(&self.snapshot).tests, range, network)
  }

  pub fn filtered_warnings(&self, range: DateRange) -> Vec<WarningRecord> {
    stats::filter_warnings(&lock(&self.snapshot).warnings, range)
  }
}

impl<P, S> Drop for RecordMirror<P, S> {
  fn drop(&mut self) {
    for task in lock(&self.tasks).drain(..) {
      task.abort();
    }
  }
}

/// Apply deliveries from one subscription until it closes or is superseded.
async fn pump<T, F>(
  label: &'static str,
  mut subscription: Subscription<T>,
  epoch: Arc<AtomicU64>,
  my_epoch: u64,
  snapshot: Arc<Mutex<Snapshot>>,
  observers: Arc<Mutex<Vec<Arc<ObserverEntry>>>>,
  apply: F,
) where
  T: Send,
  F: Fn(&mut Snapshot, Vec<T>) + Send,
{
  while let Some(delivery) = subscription.next().await {
    if epoch.load(Ordering::SeqCst) != my_epoch {
      debug!(label, "discarding delivery from a superseded subscription");
      return;
    }
    match delivery {
      Delivery::Replace(records) => {
        apply(&mut lock(&snapshot), records);
        notify_observers(&observers);
      }
      Delivery::Lapsed(message) => {
        // Transient: keep the last known good snapshot.
        warn!(label, %message, "subscription error reported by store");
      }
    }
  }
}
