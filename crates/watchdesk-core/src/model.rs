//! Domain model — profiles, test records, and warning records.
//!
//! Records are immutable once written: there is no per-record update path,
//! only creation and owner-scoped bulk deletion. Creation timestamps are
//! assigned by the store, never the client, so the store's commit order is
//! the single ordering authority.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::{Error, Result, instant::StoreInstant};

// ─── Subjects ────────────────────────────────────────────────────────────────

/// The single source of truth for authorization. Lives only in the document
/// store — never derived from the identity provider's claims.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
  #[default]
  User,
  Manager,
}

/// A portal subject's profile document.
///
/// `email` is immutable after creation. `legacy_manager` is a boolean flag
/// older documents carry from before `role` existed; it is read as an OR
/// alongside the role and rewritten whenever the role changes, so documents
/// converge on the enum over time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
  pub subject_id:     Uuid,
  pub email:          String,
  pub display_name:   String,
  #[serde(default)]
  pub role:           Role,
  #[serde(default)]
  pub legacy_manager: bool,
  pub created_at:     StoreInstant,
  pub last_login:     Option<StoreInstant>,
}

impl Profile {
  /// Whether this subject may view and act on all subjects' data.
  pub fn has_manager_access(&self) -> bool {
    self.role == Role::Manager || self.legacy_manager
  }
}

/// Input to [`crate::store::PortalStore::create_profile`].
/// `created_at` and `last_login` are always set by the store.
#[derive(Debug, Clone)]
pub struct NewProfile {
  pub subject_id:   Uuid,
  pub email:        String,
  pub display_name: String,
  pub role:         Role,
}

// ─── Test records ────────────────────────────────────────────────────────────

/// The tri-state outcome of a compliance test.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "kebab-case")]
pub enum TestResult {
  Compliant,
  #[strum(serialize = "Non-compliant")]
  NonCompliant,
  Inconclusive,
}

/// A logged compliance test against a member network.
///
/// `date` is when the test was performed — distinct from `created_at`, which
/// is when the record was logged. `owner_id` is immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRecord {
  pub id:           Uuid,
  pub owner_id:     Uuid,
  pub date:         NaiveDate,
  pub test_type:    String,
  pub network:      String,
  pub description:  String,
  pub result:       TestResult,
  pub evidence_url: Option<String>,
  pub created_by:   String,
  pub created_at:   StoreInstant,
}

/// Caller-supplied fields of a new test record. Owner, creator email, and
/// creation timestamp are stamped by the mirror and the store respectively.
#[derive(Debug, Clone)]
pub struct NewTestRecord {
  pub date:         NaiveDate,
  pub test_type:    String,
  pub network:      String,
  pub description:  String,
  pub result:       TestResult,
  pub evidence_url: Option<String>,
}

// ─── Warning records ─────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum WarningCategory {
  Compliance,
  Service,
  Pricing,
  Other,
}

impl WarningCategory {
  /// The long form used on formal documents and exports.
  pub fn long_form(self) -> &'static str {
    match self {
      Self::Compliance => "Compliance Issue",
      Self::Service => "Service Issue",
      Self::Pricing => "Pricing Issue",
      Self::Other => "Other Issue",
    }
  }
}

/// A formal warning reference code: `WA` followed by at least four digits.
///
/// Uniqueness is NOT enforced here — the store carries no unique index on
/// reference codes. A known gap, preserved deliberately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WarningReference(String);

impl WarningReference {
  pub fn parse(input: &str) -> Result<Self> {
    let digits = input
      .strip_prefix("WA")
      .ok_or_else(|| Error::InvalidReference(input.to_string()))?;
    if digits.len() >= 4 && digits.bytes().all(|b| b.is_ascii_digit()) {
      Ok(Self(input.to_string()))
    } else {
      Err(Error::InvalidReference(input.to_string()))
    }
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl std::fmt::Display for WarningReference {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

/// A formal warning issued against a member network.
/// Same immutability and lifecycle pattern as [`TestRecord`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarningRecord {
  pub id:            Uuid,
  pub owner_id:      Uuid,
  pub date:          NaiveDate,
  pub category:      WarningCategory,
  pub recipient:     String,
  pub reference:     WarningReference,
  pub details:       String,
  pub problem_areas: String,
  pub created_by:    String,
  pub created_at:    StoreInstant,
}

/// Caller-supplied fields of a new warning record.
#[derive(Debug, Clone)]
pub struct NewWarningRecord {
  pub date:          NaiveDate,
  pub category:      WarningCategory,
  pub recipient:     String,
  pub reference:     WarningReference,
  pub details:       String,
  pub problem_areas: String,
}

// ─── Shared query types ──────────────────────────────────────────────────────

/// Which record collection an owner-scoped bulk operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
  Tests,
  Warnings,
}

/// An inclusive calendar-date range; either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
  pub start: Option<NaiveDate>,
  pub end:   Option<NaiveDate>,
}

impl DateRange {
  pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
    Self { start, end }
  }

  pub fn contains(&self, date: NaiveDate) -> bool {
    self.start.is_none_or(|s| date >= s)
      && self.end.is_none_or(|e| date <= e)
  }
}
