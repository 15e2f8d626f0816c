//! [`ManagerAggregator`] — cross-user visibility for manager-role subjects.
//!
//! Three unscoped fetches (profiles, tests, warnings) joined in memory by
//! owner id. The join is O(subjects × records) and the aggregate is rebuilt
//! wholesale on every load — a deliberate simplicity-over-efficiency choice
//! that is acceptable at internal-staff-tool scale and is a documented
//! scaling boundary, not a surprise.

use std::{
  collections::BTreeMap,
  sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
  },
};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use watchdesk_core::{
  Error, Result,
  identity::IdentityProvider,
  model::{DateRange, Profile, TestRecord, WarningRecord},
  store::PortalStore,
};

use crate::{lock, session::SessionState, stats, store_err};

// ─── Aggregate types ─────────────────────────────────────────────────────────

/// One subject's activity within the loaded window.
#[derive(Debug, Clone)]
pub struct SubjectActivity {
  pub profile:              Profile,
  pub tests:                Vec<TestRecord>,
  pub warnings:             Vec<WarningRecord>,
  pub compliance_rate:      f64,
  pub network_distribution: BTreeMap<String, usize>,
  /// Most recent creation instant across both record kinds; `None` when the
  /// subject has no records with a parseable timestamp.
  pub last_activity:        Option<DateTime<Utc>>,
}

impl SubjectActivity {
  pub fn test_count(&self) -> usize {
    self.tests.len()
  }

  pub fn warning_count(&self) -> usize {
    self.warnings.len()
  }

  pub fn total_activity(&self) -> usize {
    self.tests.len() + self.warnings.len()
  }
}

/// The organization-wide aggregate. Derived, never persisted; always a full
/// recompute, never a partial update.
#[derive(Debug, Clone)]
pub struct OrgAggregate {
  pub subjects:              Vec<SubjectActivity>,
  pub total_tests:           usize,
  pub total_warnings:        usize,
  /// Distinct active days across ALL subjects' tests, not per-subject.
  pub active_days:           usize,
  pub avg_tests_per_subject: f64,
}

impl OrgAggregate {
  pub fn total_subjects(&self) -> usize {
    self.subjects.len()
  }
}

/// Whether a `load` call actually rebuilt the aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
  Loaded,
  /// Another load was already in flight; this call was dropped, not queued.
  AlreadyInFlight,
}

/// Role facet for [`ManagerAggregator::filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleFilter {
  All,
  Manager,
  User,
}

impl RoleFilter {
  fn matches(self, profile: &Profile) -> bool {
    match self {
      Self::All => true,
      Self::Manager => profile.has_manager_access(),
      Self::User => !profile.has_manager_access(),
    }
  }
}

// ─── Aggregator ──────────────────────────────────────────────────────────────

pub struct ManagerAggregator<P, S> {
  session:   Arc<SessionState<P, S>>,
  store:     Arc<S>,
  /// Single-flight guard: a load arriving while one is in progress is a
  /// no-op, which keeps repeated mirror change notifications from causing
  /// fetch storms.
  loading:   AtomicBool,
  aggregate: Mutex<Option<OrgAggregate>>,
}

/// Releases the single-flight guard on every exit path.
struct LoadingGuard<'a>(&'a AtomicBool);

impl Drop for LoadingGuard<'_> {
  fn drop(&mut self) {
    self.0.store(false, Ordering::SeqCst);
  }
}

impl<P, S> ManagerAggregator<P, S>
where
  P: IdentityProvider,
  S: PortalStore,
{
  pub fn new(session: Arc<SessionState<P, S>>, store: Arc<S>) -> Self {
    Self {
      session,
      store,
      loading: AtomicBool::new(false),
      aggregate: Mutex::new(None),
    }
  }

  /// Rebuild the aggregate from three unscoped fetches.
  ///
  /// Fails closed: a non-manager session gets `AccessDenied` and no fetch
  /// is attempted — an unscoped fetch by a regular user would leak other
  /// subjects' data.
  pub async fn load_all(&self) -> Result<LoadOutcome> {
    self.load_range(None).await
  }

  /// Like [`ManagerAggregator::load_all`], restricted to records whose
  /// performed-date falls inside `range`.
  pub async fn load_range(
    &self,
    range: Option<DateRange>,
  ) -> Result<LoadOutcome> {
    if !self.session.is_manager() {
      return Err(Error::AccessDenied);
    }
    if self
      .loading
      .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
      .is_err()
    {
      debug!("aggregate rebuild already in flight; dropping request");
      return Ok(LoadOutcome::AlreadyInFlight);
    }
    let _guard = LoadingGuard(&self.loading);

    let profiles = self.store.list_profiles().await.map_err(store_err)?;
    let mut tests = self.store.all_tests().await.map_err(store_err)?;
    let mut warnings = self.store.all_warnings().await.map_err(store_err)?;

    if let Some(range) = range {
      tests.retain(|t| range.contains(t.date));
      warnings.retain(|w| range.contains(w.date));
    }

    // O(subjects × records); fine at staff-tool scale.
    let subjects: Vec<SubjectActivity> = profiles
      .into_iter()
      .map(|profile| {
        let own_tests: Vec<TestRecord> = tests
          .iter()
          .filter(|t| t.owner_id == profile.subject_id)
          .cloned()
          .collect();
        let own_warnings: Vec<WarningRecord> = warnings
          .iter()
          .filter(|w| w.owner_id == profile.subject_id)
          .cloned()
          .collect();
        SubjectActivity {
          compliance_rate:      stats::compliance_rate(&own_tests),
          network_distribution: stats::network_distribution(&own_tests),
          last_activity:        stats::latest_activity(
            &own_tests,
            &own_warnings,
          ),
          profile,
          tests: own_tests,
          warnings: own_warnings,
        }
      })
      .collect();

    let total_subjects = subjects.len();
    let aggregate = OrgAggregate {
      total_tests: tests.len(),
      total_warnings: warnings.len(),
      active_days: stats::distinct_active_days(&tests),
      avg_tests_per_subject: if total_subjects == 0 {
        0.0
      } else {
        tests.len() as f64 / total_subjects as f64
      },
      subjects,
    };

    info!(
      subjects = total_subjects,
      tests = aggregate.total_tests,
      warnings = aggregate.total_warnings,
      "rebuilt manager aggregate"
    );
    *lock(&self.aggregate) = Some(aggregate);
    Ok(LoadOutcome::Loaded)
  }

  /// The last loaded aggregate, if any. Synchronous; never fetches.
  pub fn current(&self) -> Option<OrgAggregate> {
    lock(&self.aggregate).clone()
  }

  /// Filter the loaded subjects by case-insensitive name/email substring
  /// and role facet. Returns a new list; the loaded aggregate is not
  /// mutated, so repeated re-filtering needs no re-fetch.
  pub fn filter(
    &self,
    search: &str,
    role: RoleFilter,
  ) -> Vec<SubjectActivity> {
    let needle = search.to_lowercase();
    let aggregate = lock(&self.aggregate);
    let Some(aggregate) = aggregate.as_ref() else {
      return Vec::new();
    };
    aggregate
      .subjects
      .iter()
      .filter(|s| role.matches(&s.profile))
      .filter(|s| {
        needle.is_empty()
          || s.profile.display_name.to_lowercase().contains(&needle)
          || s.profile.email.to_lowercase().contains(&needle)
      })
      .cloned()
      .collect()
  }
}
