//! End-to-end scenarios over the in-memory backend: session lifecycle,
//! live mirroring, manager aggregation, and role administration wired
//! together the way an embedding application would wire them.

use std::{
  sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  },
  time::Duration,
};

use chrono::NaiveDate;
use uuid::Uuid;

use watchdesk_core::{
  Error,
  error::RegistrationError,
  model::{
    NewProfile, NewTestRecord, NewWarningRecord, RecordKind, Role,
    TestResult, WarningCategory, WarningReference,
  },
  store::PortalStore,
};
use watchdesk_store_mem::{MemoryIdentity, MemoryStore};
use watchdesk_sync::{
  aggregate::{LoadOutcome, ManagerAggregator, RoleFilter},
  config::PortalConfig,
  mirror::RecordMirror,
  roles::RoleAdmin,
  session::SessionState,
};

// ─── Harness ─────────────────────────────────────────────────────────────────

struct Harness {
  identity: MemoryIdentity,
  store:    Arc<MemoryStore>,
  session:  Arc<SessionState<MemoryIdentity, MemoryStore>>,
  mirror:   Arc<RecordMirror<MemoryIdentity, MemoryStore>>,
}

impl Harness {
  fn new() -> Self {
    Self::with_store(MemoryStore::new())
  }

  fn with_store(store: MemoryStore) -> Self {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let identity = MemoryIdentity::new();
    let store = Arc::new(store);
    let session = Arc::new(SessionState::new(
      Arc::new(identity.clone()),
      Arc::clone(&store),
      PortalConfig::default(),
    ));
    let mirror = Arc::new(RecordMirror::new(
      Arc::clone(&session),
      Arc::clone(&store),
    ));
    Self { identity, store, session, mirror }
  }

  fn aggregator(&self) -> ManagerAggregator<MemoryIdentity, MemoryStore> {
    ManagerAggregator::new(Arc::clone(&self.session), Arc::clone(&self.store))
  }

  fn role_admin(&self) -> RoleAdmin<MemoryIdentity, MemoryStore> {
    RoleAdmin::new(Arc::clone(&self.session), Arc::clone(&self.store))
  }

  /// Seed an account plus a profile document with the given role.
  async fn seed_subject(&self, email: &str, role: Role) -> Uuid {
    let subject_id = self.identity.add_account(email, "hunter22");
    self
      .store
      .create_profile(NewProfile {
        subject_id,
        email: email.to_string(),
        display_name: email.split('@').next().unwrap().to_string(),
        role,
      })
      .await
      .expect("seed profile");
    subject_id
  }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
  for _ in 0..400 {
    if condition() {
      return;
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
  }
  panic!("condition not met within deadline");
}

fn day(day: u32) -> NaiveDate {
  NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
}

fn new_test(day_of_month: u32, network: &str, result: TestResult) -> NewTestRecord {
  NewTestRecord {
    date:         day(day_of_month),
    test_type:    "sms".to_string(),
    network:      network.to_string(),
    description:  "routine check".to_string(),
    result,
    evidence_url: None,
  }
}

fn new_warning(day_of_month: u32, reference: &str) -> NewWarningRecord {
  NewWarningRecord {
    date:          day(day_of_month),
    category:      WarningCategory::Pricing,
    recipient:     "NetCo".to_string(),
    reference:     WarningReference::parse(reference).unwrap(),
    details:       "undisclosed charges".to_string(),
    problem_areas: "section 6".to_string(),
  }
}

// ─── Session lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn first_sign_in_creates_a_user_profile() {
  let h = Harness::new();
  h.identity.add_account("alice@example.com", "hunter22");

  let profile = h
    .session
    .sign_in("alice@example.com", "hunter22")
    .await
    .expect("sign in");

  assert_eq!(profile.role, Role::User);
  assert_eq!(profile.display_name, "alice");
  assert!(!h.session.is_manager());
  assert!(h.session.current().is_some());
}

#[tokio::test]
async fn repeat_sign_in_preserves_a_concurrently_granted_role() {
  let h = Harness::new();
  let alice = h.seed_subject("alice@example.com", Role::User).await;

  h.session
    .sign_in("alice@example.com", "hunter22")
    .await
    .expect("first sign in");
  h.session.sign_out().await;

  // Another client promotes alice between her sessions.
  h.store.set_role(alice, Role::Manager).await.expect("set role");

  let profile = h
    .session
    .sign_in("alice@example.com", "hunter22")
    .await
    .expect("second sign in");
  assert_eq!(profile.role, Role::Manager);
  assert!(h.session.is_manager());
}

#[tokio::test]
async fn sign_in_failures_keep_the_session_signed_out() {
  let h = Harness::new();
  h.identity.add_account("alice@example.com", "hunter22");

  let wrong = h.session.sign_in("alice@example.com", "wrong").await;
  assert!(matches!(wrong, Err(Error::Auth(_))));

  let unknown = h.session.sign_in("nobody@example.com", "hunter22").await;
  assert!(matches!(unknown, Err(Error::Auth(_))));

  assert!(h.session.current().is_none());
}

#[tokio::test]
async fn register_creates_profile_and_opens_session() {
  let h = Harness::new();

  let profile = h
    .session
    .register("bob@example.com", "hunter22", "Bob")
    .await
    .expect("register");

  assert_eq!(profile.role, Role::User);
  assert_eq!(profile.display_name, "Bob");
  assert!(h.session.current().is_some());
}

#[tokio::test]
async fn register_rejects_weak_password_and_duplicate_email() {
  let h = Harness::new();
  h.identity.add_account("taken@example.com", "hunter22");

  let weak = h.session.register("new@example.com", "abc", "New").await;
  assert!(matches!(
    weak,
    Err(Error::Registration(RegistrationError::WeakPassword)),
  ));

  let taken = h
    .session
    .register("taken@example.com", "hunter22", "Taken")
    .await;
  assert!(matches!(
    taken,
    Err(Error::Registration(RegistrationError::EmailInUse)),
  ));
}

#[tokio::test]
async fn initialize_times_out_when_the_store_is_unreachable() {
  let identity = MemoryIdentity::new();
  let store = Arc::new(MemoryStore::new());
  store.set_ready(false);

  let session = SessionState::new(
    Arc::new(identity),
    Arc::clone(&store),
    PortalConfig { init_timeout_secs: 0 },
  );

  let result = session.initialize().await;
  assert!(matches!(result, Err(Error::InitializationTimeout { .. })));
}

#[tokio::test]
async fn initialize_succeeds_once_subsystems_are_ready() {
  let h = Harness::new();
  h.session.initialize().await.expect("initialize");
}

// ─── Mirror ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn added_warning_arrives_through_the_subscription() {
  let h = Harness::new();
  h.seed_subject("alice@example.com", Role::User).await;
  let profile = h
    .session
    .sign_in("alice@example.com", "hunter22")
    .await
    .expect("sign in");
  h.mirror.start(profile.subject_id).await.expect("start mirror");

  h.mirror
    .add_warning(new_warning(3, "WA1234"))
    .await
    .expect("add warning");

  let mirror = Arc::clone(&h.mirror);
  wait_until(move || mirror.warnings().len() == 1).await;

  let warnings = h.mirror.warnings();
  assert_eq!(warnings[0].reference.as_str(), "WA1234");
  assert_eq!(warnings[0].created_by, "alice@example.com");
}

#[tokio::test]
async fn mirror_only_sees_the_owners_records() {
  let h = Harness::new();
  let bob = h.seed_subject("bob@example.com", Role::User).await;
  h.seed_subject("alice@example.com", Role::User).await;
  let alice_profile = h
    .session
    .sign_in("alice@example.com", "hunter22")
    .await
    .expect("sign in");
  h.mirror
    .start(alice_profile.subject_id)
    .await
    .expect("start mirror");

  h.store
    .add_test(
      new_test(1, "MTN", TestResult::Compliant),
      bob,
      "bob@example.com".to_string(),
    )
    .await
    .expect("bob's test");
  h.mirror
    .add_test(new_test(2, "Vodacom", TestResult::Compliant))
    .await
    .expect("alice's test");

  let mirror = Arc::clone(&h.mirror);
  wait_until(move || mirror.tests().len() == 1).await;
  assert_eq!(h.mirror.tests()[0].network, "Vodacom");
}

#[tokio::test]
async fn writes_require_an_authenticated_session() {
  let h = Harness::new();
  let result = h.mirror.add_test(new_test(1, "MTN", TestResult::Compliant)).await;
  assert!(matches!(result, Err(Error::NotAuthenticated)));
}

#[tokio::test]
async fn clear_all_removes_only_the_owners_records_of_that_kind() {
  let h = Harness::new();
  let bob = h.seed_subject("bob@example.com", Role::User).await;
  h.seed_subject("alice@example.com", Role::User).await;
  let alice_profile = h
    .session
    .sign_in("alice@example.com", "hunter22")
    .await
    .expect("sign in");
  h.mirror
    .start(alice_profile.subject_id)
    .await
    .expect("start mirror");

  h.store
    .add_test(
      new_test(1, "MTN", TestResult::Compliant),
      bob,
      "bob@example.com".to_string(),
    )
    .await
    .expect("bob's test");
  h.mirror
    .add_test(new_test(2, "MTN", TestResult::Compliant))
    .await
    .expect("alice test 1");
  h.mirror
    .add_test(new_test(3, "MTN", TestResult::NonCompliant))
    .await
    .expect("alice test 2");
  h.mirror
    .add_warning(new_warning(3, "WA1234"))
    .await
    .expect("alice warning");

  {
    let mirror = Arc::clone(&h.mirror);
    wait_until(move || {
      mirror.tests().len() == 2 && mirror.warnings().len() == 1
    })
    .await;
  }

  let deleted = h.mirror.clear_all(RecordKind::Tests).await.expect("clear");
  assert_eq!(deleted, 2);

  let mirror = Arc::clone(&h.mirror);
  wait_until(move || mirror.tests().is_empty()).await;

  // Warnings and other subjects' tests are untouched.
  assert_eq!(h.mirror.warnings().len(), 1);
  assert_eq!(h.store.tests_for(bob).await.expect("bob's tests").len(), 1);
}

#[tokio::test]
async fn oversized_clear_fails_whole_without_deleting() {
  let h = Harness::with_store(MemoryStore::with_max_batch(2));
  h.seed_subject("alice@example.com", Role::User).await;
  let profile = h
    .session
    .sign_in("alice@example.com", "hunter22")
    .await
    .expect("sign in");

  for day_of_month in 1..=3 {
    h.mirror
      .add_test(new_test(day_of_month, "MTN", TestResult::Compliant))
      .await
      .expect("add test");
  }

  let result = h.mirror.clear_all(RecordKind::Tests).await;
  assert!(matches!(
    result,
    Err(Error::BatchTooLarge { requested: 3, limit: 2 }),
  ));
  assert_eq!(
    h.store
      .tests_for(profile.subject_id)
      .await
      .expect("tests")
      .len(),
    3,
  );
}

#[tokio::test]
async fn stopped_mirror_ignores_later_commits() {
  let h = Harness::new();
  h.seed_subject("alice@example.com", Role::User).await;
  let profile = h
    .session
    .sign_in("alice@example.com", "hunter22")
    .await
    .expect("sign in");
  h.mirror.start(profile.subject_id).await.expect("start mirror");

  h.mirror
    .add_test(new_test(1, "MTN", TestResult::Compliant))
    .await
    .expect("add test");
  {
    let mirror = Arc::clone(&h.mirror);
    wait_until(move || mirror.tests().len() == 1).await;
  }

  h.mirror.stop();

  // Committed after stop; the store may still fan out, the mirror must not
  // apply it.
  h.store
    .add_test(
      new_test(2, "MTN", TestResult::Compliant),
      profile.subject_id,
      profile.email.clone(),
    )
    .await
    .expect("late commit");
  tokio::time::sleep(Duration::from_millis(50)).await;
  assert_eq!(h.mirror.tests().len(), 1);
}

#[tokio::test]
async fn observers_fire_per_delivery_and_detach_on_drop() {
  let h = Harness::new();
  h.seed_subject("alice@example.com", Role::User).await;
  let profile = h
    .session
    .sign_in("alice@example.com", "hunter22")
    .await
    .expect("sign in");

  let notifications = Arc::new(AtomicUsize::new(0));
  let counter = Arc::clone(&notifications);
  let handle = h.mirror.observe(move || {
    counter.fetch_add(1, Ordering::SeqCst);
  });
  // A panicking observer must not starve the counting one.
  let _panicky = h.mirror.observe(|| panic!("observer bug"));

  h.mirror.start(profile.subject_id).await.expect("start mirror");
  h.mirror
    .add_test(new_test(1, "MTN", TestResult::Compliant))
    .await
    .expect("add test");

  {
    let notifications = Arc::clone(&notifications);
    wait_until(move || notifications.load(Ordering::SeqCst) >= 2).await;
  }

  handle.detach();
  let before = notifications.load(Ordering::SeqCst);
  h.mirror
    .add_test(new_test(2, "MTN", TestResult::Compliant))
    .await
    .expect("add test");
  {
    let mirror = Arc::clone(&h.mirror);
    wait_until(move || mirror.tests().len() == 2).await;
  }
  assert_eq!(notifications.load(Ordering::SeqCst), before);
}

#[tokio::test]
async fn observers_may_detach_each_other_during_notification() {
  let h = Harness::new();
  h.seed_subject("alice@example.com", Role::User).await;
  let profile = h
    .session
    .sign_in("alice@example.com", "hunter22")
    .await
    .expect("sign in");

  let notifications = Arc::new(AtomicUsize::new(0));
  let counter = Arc::clone(&notifications);
  let counting = h.mirror.observe(move || {
    counter.fetch_add(1, Ordering::SeqCst);
  });

  // The first notification detaches the counting observer from inside a
  // callback; delivery must keep flowing afterwards.
  let parked = Arc::new(std::sync::Mutex::new(Some(counting)));
  let to_drop = Arc::clone(&parked);
  let _detacher = h.mirror.observe(move || {
    to_drop.lock().unwrap().take();
  });

  h.mirror.start(profile.subject_id).await.expect("start mirror");
  h.mirror
    .add_test(new_test(1, "MTN", TestResult::Compliant))
    .await
    .expect("add test");
  {
    let mirror = Arc::clone(&h.mirror);
    wait_until(move || mirror.tests().len() == 1).await;
  }

  h.mirror
    .add_test(new_test(2, "MTN", TestResult::Compliant))
    .await
    .expect("add test");
  let mirror = Arc::clone(&h.mirror);
  wait_until(move || mirror.tests().len() == 2).await;

  assert!(parked.lock().unwrap().is_none());
}

#[tokio::test]
async fn subscription_error_keeps_the_last_known_good_snapshot() {
  let h = Harness::new();
  h.seed_subject("alice@example.com", Role::User).await;
  let profile = h
    .session
    .sign_in("alice@example.com", "hunter22")
    .await
    .expect("sign in");
  h.mirror.start(profile.subject_id).await.expect("start mirror");

  h.mirror
    .add_test(new_test(1, "MTN", TestResult::Compliant))
    .await
    .expect("add test");
  {
    let mirror = Arc::clone(&h.mirror);
    wait_until(move || mirror.tests().len() == 1).await;
  }

  h.store
    .inject_subscription_error(profile.subject_id, "query lapsed");
  tokio::time::sleep(Duration::from_millis(50)).await;
  assert_eq!(h.mirror.tests().len(), 1);

  // The subscription recovers: a later commit still replaces the snapshot.
  h.mirror
    .add_test(new_test(2, "MTN", TestResult::Compliant))
    .await
    .expect("add test");
  let mirror = Arc::clone(&h.mirror);
  wait_until(move || mirror.tests().len() == 2).await;
}

#[tokio::test]
async fn follow_session_starts_on_sign_in_and_clears_on_sign_out() {
  let h = Harness::new();
  h.seed_subject("alice@example.com", Role::User).await;
  let _driver = h.mirror.follow_session();

  h.session
    .sign_in("alice@example.com", "hunter22")
    .await
    .expect("sign in");
  h.mirror
    .add_test(new_test(1, "MTN", TestResult::Compliant))
    .await
    .expect("add test");
  {
    let mirror = Arc::clone(&h.mirror);
    wait_until(move || mirror.tests().len() == 1).await;
  }

  h.session.sign_out().await;
  let mirror = Arc::clone(&h.mirror);
  wait_until(move || mirror.tests().is_empty()).await;
}

// ─── Manager aggregation ─────────────────────────────────────────────────────

#[tokio::test]
async fn aggregator_fails_closed_for_regular_users() {
  let h = Harness::new();
  h.seed_subject("alice@example.com", Role::User).await;
  h.session
    .sign_in("alice@example.com", "hunter22")
    .await
    .expect("sign in");

  let aggregator = h.aggregator();
  assert!(matches!(aggregator.load_all().await, Err(Error::AccessDenied)));
  assert!(aggregator.current().is_none());
}

#[tokio::test]
async fn aggregate_joins_records_to_subjects() {
  let h = Harness::new();
  let alice = h.seed_subject("alice@example.com", Role::User).await;
  let bob = h.seed_subject("bob@example.com", Role::User).await;
  h.seed_subject("carol@example.com", Role::Manager).await;
  h.session
    .sign_in("carol@example.com", "hunter22")
    .await
    .expect("sign in");

  for day_of_month in 1..=3 {
    h.store
      .add_test(
        new_test(day_of_month, "MTN", TestResult::Compliant),
        alice,
        "alice@example.com".to_string(),
      )
      .await
      .expect("alice test");
  }
  h.store
    .add_warning(new_warning(1, "WA1000"), alice, "alice@example.com".to_string())
    .await
    .expect("alice warning");
  for reference in ["WA2000", "WA2001"] {
    h.store
      .add_warning(new_warning(2, reference), bob, "bob@example.com".to_string())
      .await
      .expect("bob warning");
  }

  let aggregator = h.aggregator();
  assert_eq!(
    aggregator.load_all().await.expect("load"),
    LoadOutcome::Loaded,
  );
  let aggregate = aggregator.current().expect("aggregate");

  assert_eq!(aggregate.total_subjects(), 3);
  assert_eq!(aggregate.total_tests, 3);
  assert_eq!(aggregate.total_warnings, 3);
  assert_eq!(aggregate.active_days, 3);
  assert_eq!(aggregate.avg_tests_per_subject, 1.0);

  let alice_activity = aggregate
    .subjects
    .iter()
    .find(|s| s.profile.subject_id == alice)
    .expect("alice in aggregate");
  assert_eq!(alice_activity.test_count(), 3);
  assert_eq!(alice_activity.warning_count(), 1);
  assert_eq!(alice_activity.compliance_rate, 100.0);

  let managers = aggregator.filter("", RoleFilter::Manager);
  assert_eq!(managers.len(), 1);
  assert_eq!(managers[0].profile.email, "carol@example.com");

  let by_name = aggregator.filter("BOB", RoleFilter::All);
  assert_eq!(by_name.len(), 1);
  assert_eq!(by_name[0].profile.subject_id, bob);
}

#[tokio::test]
async fn load_range_restricts_by_performed_date() {
  let h = Harness::new();
  let alice = h.seed_subject("alice@example.com", Role::User).await;
  h.seed_subject("carol@example.com", Role::Manager).await;
  h.session
    .sign_in("carol@example.com", "hunter22")
    .await
    .expect("sign in");

  for day_of_month in [1, 10, 20] {
    h.store
      .add_test(
        new_test(day_of_month, "MTN", TestResult::Compliant),
        alice,
        "alice@example.com".to_string(),
      )
      .await
      .expect("test");
  }

  let aggregator = h.aggregator();
  aggregator
    .load_range(Some(watchdesk_core::model::DateRange::new(
      Some(day(5)),
      Some(day(15)),
    )))
    .await
    .expect("load range");

  let aggregate = aggregator.current().expect("aggregate");
  assert_eq!(aggregate.total_tests, 1);
}

#[tokio::test]
async fn concurrent_loads_collapse_to_one() {
  let h = Harness::new();
  h.seed_subject("carol@example.com", Role::Manager).await;
  h.session
    .sign_in("carol@example.com", "hunter22")
    .await
    .expect("sign in");
  h.store.set_fetch_latency(Some(Duration::from_millis(50)));

  let aggregator = h.aggregator();
  let (first, second) =
    tokio::join!(aggregator.load_all(), aggregator.load_all());
  let outcomes = [first.expect("first"), second.expect("second")];

  assert!(outcomes.contains(&LoadOutcome::Loaded));
  assert!(outcomes.contains(&LoadOutcome::AlreadyInFlight));
}

// ─── Role administration ─────────────────────────────────────────────────────

#[tokio::test]
async fn role_changes_are_manager_only() {
  let h = Harness::new();
  let bob = h.seed_subject("bob@example.com", Role::User).await;
  h.seed_subject("alice@example.com", Role::User).await;
  h.session
    .sign_in("alice@example.com", "hunter22")
    .await
    .expect("sign in");

  let admin = h.role_admin();
  assert!(matches!(
    admin.set_role(bob, true).await,
    Err(Error::AccessDenied),
  ));
}

#[tokio::test]
async fn promote_by_email_returns_the_updated_profile() {
  let h = Harness::new();
  h.seed_subject("bob@example.com", Role::User).await;
  h.seed_subject("carol@example.com", Role::Manager).await;
  h.session
    .sign_in("carol@example.com", "hunter22")
    .await
    .expect("sign in");

  let admin = h.role_admin();
  let updated = admin
    .set_role_by_email("bob@example.com", true)
    .await
    .expect("promote");
  assert_eq!(updated.role, Role::Manager);
  assert!(updated.has_manager_access());

  let missing = admin.set_role_by_email("nobody@example.com", true).await;
  assert!(matches!(missing, Err(Error::ProfileNotFound(_))));
}

#[tokio::test]
async fn self_demotion_takes_effect_without_reauthentication() {
  let h = Harness::new();
  let carol = h.seed_subject("carol@example.com", Role::Manager).await;
  h.session
    .sign_in("carol@example.com", "hunter22")
    .await
    .expect("sign in");
  assert!(h.session.is_manager());

  let admin = h.role_admin();
  admin.set_role(carol, false).await.expect("demote self");

  assert!(!h.session.is_manager());
  // The lockout is real: the demoted session can no longer administer roles.
  assert!(matches!(
    admin.set_role(carol, true).await,
    Err(Error::AccessDenied),
  ));
}

#[tokio::test]
async fn profile_listing_is_manager_only() {
  let h = Harness::new();
  h.seed_subject("alice@example.com", Role::User).await;
  h.seed_subject("carol@example.com", Role::Manager).await;

  h.session
    .sign_in("alice@example.com", "hunter22")
    .await
    .expect("sign in");
  let admin = h.role_admin();
  assert!(matches!(admin.list_profiles().await, Err(Error::AccessDenied)));

  h.session
    .sign_in("carol@example.com", "hunter22")
    .await
    .expect("manager sign in");
  let profiles = admin.list_profiles().await.expect("list");
  assert_eq!(profiles.len(), 2);
}
