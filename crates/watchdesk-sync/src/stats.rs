//! Pure, deterministic computations over record slices.
//!
//! No state, no I/O, no failure: every function degrades to zero/empty on
//! missing data, which keeps them fit for property-based testing.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};

use watchdesk_core::model::{
  DateRange, TestRecord, TestResult, WarningCategory, WarningRecord,
};

/// Tests performed on `day` (calendar-date equality on the `date` field,
/// not the creation timestamp).
pub fn tests_on(tests: &[TestRecord], day: NaiveDate) -> Vec<TestRecord> {
  tests.iter().filter(|t| t.date == day).cloned().collect()
}

pub fn warnings_on(
  warnings: &[WarningRecord],
  day: NaiveDate,
) -> Vec<WarningRecord> {
  warnings.iter().filter(|w| w.date == day).cloned().collect()
}

/// The number of distinct calendar dates with at least one test.
pub fn distinct_active_days(tests: &[TestRecord]) -> usize {
  tests.iter().map(|t| t.date).collect::<BTreeSet<_>>().len()
}

/// Compliant tests over total tests, in percent. Zero tests is exactly
/// `0.0` — never NaN.
pub fn compliance_rate(tests: &[TestRecord]) -> f64 {
  if tests.is_empty() {
    return 0.0;
  }
  let compliant = tests
    .iter()
    .filter(|t| t.result == TestResult::Compliant)
    .count();
  compliant as f64 / tests.len() as f64 * 100.0
}

/// Test count per target network, deterministically ordered.
pub fn network_distribution(tests: &[TestRecord]) -> BTreeMap<String, usize> {
  let mut distribution = BTreeMap::new();
  for test in tests {
    *distribution.entry(test.network.clone()).or_insert(0) += 1;
  }
  distribution
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResultBreakdown {
  pub compliant:     usize,
  pub non_compliant: usize,
  pub inconclusive:  usize,
}

pub fn result_breakdown(tests: &[TestRecord]) -> ResultBreakdown {
  let mut breakdown = ResultBreakdown::default();
  for test in tests {
    match test.result {
      TestResult::Compliant => breakdown.compliant += 1,
      TestResult::NonCompliant => breakdown.non_compliant += 1,
      TestResult::Inconclusive => breakdown.inconclusive += 1,
    }
  }
  breakdown
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryBreakdown {
  pub compliance: usize,
  pub service:    usize,
  pub pricing:    usize,
  pub other:      usize,
}

pub fn category_breakdown(warnings: &[WarningRecord]) -> CategoryBreakdown {
  let mut breakdown = CategoryBreakdown::default();
  for warning in warnings {
    match warning.category {
      WarningCategory::Compliance => breakdown.compliance += 1,
      WarningCategory::Service => breakdown.service += 1,
      WarningCategory::Pricing => breakdown.pricing += 1,
      WarningCategory::Other => breakdown.other += 1,
    }
  }
  breakdown
}

/// Earliest and latest of the given dates, or `None` when there are none.
pub fn date_bounds(
  dates: impl IntoIterator<Item = NaiveDate>,
) -> Option<(NaiveDate, NaiveDate)> {
  dates.into_iter().fold(None, |bounds, date| match bounds {
    None => Some((date, date)),
    Some((earliest, latest)) => {
      Some((earliest.min(date), latest.max(date)))
    }
  })
}

/// The most recent creation instant across both record kinds, with
/// unparseable timestamps excluded rather than crashing the comparison.
pub fn latest_activity(
  tests: &[TestRecord],
  warnings: &[WarningRecord],
) -> Option<DateTime<Utc>> {
  tests
    .iter()
    .filter_map(|t| t.created_at.to_utc())
    .chain(warnings.iter().filter_map(|w| w.created_at.to_utc()))
    .max()
}

pub fn filter_tests(
  tests: &[TestRecord],
  range: DateRange,
  network: Option<&str>,
) -> Vec<TestRecord> {
  tests
    .iter()
    .filter(|t| range.contains(t.date))
    .filter(|t| network.is_none_or(|n| t.network == n))
    .cloned()
    .collect()
}

pub fn filter_warnings(
  warnings: &[WarningRecord],
  range: DateRange,
) -> Vec<WarningRecord> {
  warnings
    .iter()
    .filter(|w| range.contains(w.date))
    .cloned()
    .collect()
}
