//! The `PortalStore` trait and subscription types.
//!
//! The trait is implemented by storage backends (the hosted document store
//! in production, `watchdesk-store-mem` in tests). Higher layers depend on
//! this abstraction, not on any concrete backend.

use std::future::Future;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::model::{
  NewProfile, NewTestRecord, NewWarningRecord, Profile, Role, TestRecord,
  WarningRecord,
};

// ─── Subscriptions ───────────────────────────────────────────────────────────

/// One push from an owner-scoped subscription.
///
/// Every `Replace` carries the *complete* current result set for the query —
/// never an incremental patch. The store's callback delivery order is the
/// sole ordering authority; consumers apply each delivery as a full
/// replacement of their local sequence.
#[derive(Debug, Clone)]
pub enum Delivery<T> {
  Replace(Vec<T>),
  /// The store reported a subscription error. The subscription may recover;
  /// consumers keep their last-known-good snapshot rather than clearing it.
  Lapsed(String),
}

/// A live subscription handle.
///
/// Cancelling (explicitly or by drop) asks the backend to stop delivering.
/// Some store clients still deliver one final callback after cancellation
/// is requested, so consumers must discard late deliveries with their own
/// generation token — "the subscription was cancelled" is not a sufficient
/// guard.
pub struct Subscription<T> {
  receiver: mpsc::UnboundedReceiver<Delivery<T>>,
  cancel:   Option<Box<dyn FnOnce() + Send>>,
}

impl<T> Subscription<T> {
  pub fn new(
    receiver: mpsc::UnboundedReceiver<Delivery<T>>,
    cancel: impl FnOnce() + Send + 'static,
  ) -> Self {
    Self { receiver, cancel: Some(Box::new(cancel)) }
  }

  /// The next delivery, or `None` once the backend has dropped its sender.
  pub async fn next(&mut self) -> Option<Delivery<T>> {
    self.receiver.recv().await
  }

  /// Ask the backend to stop delivering. Idempotent.
  pub fn cancel(&mut self) {
    if let Some(cancel) = self.cancel.take() {
      cancel();
    }
  }
}

impl<T> Drop for Subscription<T> {
  fn drop(&mut self) {
    self.cancel();
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the hosted document store.
///
/// Creation timestamps are always assigned by the store, never the client.
/// Batch deletes are atomic and bounded by [`PortalStore::max_batch_size`];
/// an oversized batch fails whole rather than being split — a documented
/// limit of the hosted store, not worked around here.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait PortalStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Resolves once the backend is reachable. Callers bound the wait with a
  /// timeout budget; this future itself may pend indefinitely.
  fn ready(&self) -> impl Future<Output = ()> + Send + '_;

  /// The largest number of documents one atomic batch may touch.
  fn max_batch_size(&self) -> usize {
    500
  }

  // ── Profiles ──────────────────────────────────────────────────────────

  /// Create a profile document. `created_at` and `last_login` are stamped
  /// by the store.
  fn create_profile(
    &self,
    input: NewProfile,
  ) -> impl Future<Output = Result<Profile, Self::Error>> + Send + '_;

  fn get_profile(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Profile>, Self::Error>> + Send + '_;

  fn get_profile_by_email<'a>(
    &'a self,
    email: &'a str,
  ) -> impl Future<Output = Result<Option<Profile>, Self::Error>> + Send + 'a;

  /// All profiles, unscoped. Manager paths only.
  fn list_profiles(
    &self,
  ) -> impl Future<Output = Result<Vec<Profile>, Self::Error>> + Send + '_;

  /// Update ONLY the last-login timestamp. The role is never rewritten on
  /// login, even if another client changed it concurrently.
  fn touch_last_login(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Write the role and the legacy manager flag in one atomic document
  /// update.
  fn set_role(
    &self,
    id: Uuid,
    role: Role,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Test records ──────────────────────────────────────────────────────

  /// Persist a test record. The store assigns the id and `created_at`.
  fn add_test(
    &self,
    input: NewTestRecord,
    owner_id: Uuid,
    created_by: String,
  ) -> impl Future<Output = Result<TestRecord, Self::Error>> + Send + '_;

  /// All of one owner's test records, in the store's commit order.
  fn tests_for(
    &self,
    owner_id: Uuid,
  ) -> impl Future<Output = Result<Vec<TestRecord>, Self::Error>> + Send + '_;

  /// Every test record, unscoped. Manager paths only.
  fn all_tests(
    &self,
  ) -> impl Future<Output = Result<Vec<TestRecord>, Self::Error>> + Send + '_;

  /// Delete the given test records as one atomic batch.
  fn delete_tests(
    &self,
    ids: Vec<Uuid>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Subscribe to full-replacement deliveries of one owner's test records.
  fn subscribe_tests(
    &self,
    owner_id: Uuid,
  ) -> impl Future<Output = Result<Subscription<TestRecord>, Self::Error>>
  + Send
  + '_;

  // ── Warning records ───────────────────────────────────────────────────

  fn add_warning(
    &self,
    input: NewWarningRecord,
    owner_id: Uuid,
    created_by: String,
  ) -> impl Future<Output = Result<WarningRecord, Self::Error>> + Send + '_;

  fn warnings_for(
    &self,
    owner_id: Uuid,
  ) -> impl Future<Output = Result<Vec<WarningRecord>, Self::Error>> + Send + '_;

  fn all_warnings(
    &self,
  ) -> impl Future<Output = Result<Vec<WarningRecord>, Self::Error>> + Send + '_;

  fn delete_warnings(
    &self,
    ids: Vec<Uuid>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn subscribe_warnings(
    &self,
    owner_id: Uuid,
  ) -> impl Future<Output = Result<Subscription<WarningRecord>, Self::Error>>
  + Send
  + '_;
}
