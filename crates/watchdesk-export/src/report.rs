//! Report builders — record sheets, the summary row-set, and manager
//! reports.
//!
//! Column sets and row ordering mirror the portal's published spreadsheet
//! layout; changing them breaks downstream report consumers.

use chrono::{DateTime, NaiveDate, Utc};

use watchdesk_core::{
  instant::StoreInstant,
  model::{TestRecord, WarningRecord},
};
use watchdesk_sync::{
  aggregate::{OrgAggregate, SubjectActivity},
  stats,
};

use crate::sheet::Sheet;

const TEST_COLUMNS: [&str; 7] = [
  "Date",
  "Test Type",
  "Network",
  "Description",
  "Result",
  "Created By",
  "Created At",
];

const WARNING_COLUMNS: [&str; 8] = [
  "Date",
  "Warning Type",
  "Recipient Member",
  "Reference Number",
  "Details",
  "Problem Areas",
  "Created By",
  "Created At",
];

fn format_date(date: NaiveDate) -> String {
  date.format("%b %-d, %Y").to_string()
}

fn format_instant(instant: &StoreInstant) -> String {
  instant
    .to_utc()
    .map_or_else(|| "N/A".to_string(), format_datetime)
}

fn format_datetime(instant: DateTime<Utc>) -> String {
  instant.format("%b %-d, %Y %H:%M").to_string()
}

fn format_rate(tests: &[TestRecord]) -> String {
  if tests.is_empty() {
    "0%".to_string()
  } else {
    format!("{:.1}%", stats::compliance_rate(tests))
  }
}

fn role_label(has_manager_access: bool) -> String {
  if has_manager_access { "Manager" } else { "User" }.to_string()
}

// ─── Record sheets ───────────────────────────────────────────────────────────

pub fn tests_sheet(tests: &[TestRecord]) -> Sheet {
  let mut sheet = Sheet::new("Tests", TEST_COLUMNS.to_vec());
  for test in tests {
    sheet.push_row(vec![
      format_date(test.date),
      test.test_type.clone(),
      test.network.clone(),
      test.description.clone(),
      test.result.to_string(),
      test.created_by.clone(),
      format_instant(&test.created_at),
    ]);
  }
  sheet
}

pub fn warnings_sheet(warnings: &[WarningRecord]) -> Sheet {
  let mut sheet = Sheet::new("Warnings", WARNING_COLUMNS.to_vec());
  for warning in warnings {
    sheet.push_row(vec![
      format_date(warning.date),
      warning.category.long_form().to_string(),
      warning.recipient.clone(),
      warning.reference.to_string(),
      warning.details.clone(),
      warning.problem_areas.clone(),
      warning.created_by.clone(),
      format_instant(&warning.created_at),
    ]);
  }
  sheet
}

// ─── Summary ─────────────────────────────────────────────────────────────────

/// The overview row-set: counts, breakdowns by result/category/network, and
/// date-range bounds. `today` is the caller's calendar date so the function
/// stays deterministic.
pub fn summary_sheet(
  tests: &[TestRecord],
  warnings: &[WarningRecord],
  generated_by: &str,
  today: NaiveDate,
) -> Sheet {
  let results = stats::result_breakdown(tests);
  let categories = stats::category_breakdown(warnings);

  let network_line = {
    let distribution = stats::network_distribution(tests);
    if distribution.is_empty() {
      "No data".to_string()
    } else {
      distribution
        .into_iter()
        .map(|(network, count)| format!("{network}: {count}"))
        .collect::<Vec<_>>()
        .join(", ")
    }
  };

  let bounds =
    |bounds: Option<(NaiveDate, NaiveDate)>| -> (String, String) {
      bounds.map_or_else(
        || ("N/A".to_string(), "N/A".to_string()),
        |(earliest, latest)| (format_date(earliest), format_date(latest)),
      )
    };
  let (earliest_test, latest_test) =
    bounds(stats::date_bounds(tests.iter().map(|t| t.date)));
  let (earliest_warning, latest_warning) =
    bounds(stats::date_bounds(warnings.iter().map(|w| w.date)));

  let rows: Vec<(&str, String)> = vec![
    ("Generated By", generated_by.to_string()),
    ("Total Test Records", tests.len().to_string()),
    ("Total Warning Records", warnings.len().to_string()),
    ("Tests Today", stats::tests_on(tests, today).len().to_string()),
    (
      "Warnings Today",
      stats::warnings_on(warnings, today).len().to_string(),
    ),
    (
      "Active Testing Days",
      stats::distinct_active_days(tests).to_string(),
    ),
    ("Compliant Tests", results.compliant.to_string()),
    ("Non-compliant Tests", results.non_compliant.to_string()),
    ("Inconclusive Tests", results.inconclusive.to_string()),
    ("Compliance Rate", format_rate(tests)),
    ("Compliance Issues", categories.compliance.to_string()),
    ("Service Issues", categories.service.to_string()),
    ("Pricing Issues", categories.pricing.to_string()),
    ("Other Issues", categories.other.to_string()),
    ("Tests by Network", network_line),
    ("Earliest Test", earliest_test),
    ("Latest Test", latest_test),
    ("Earliest Warning", earliest_warning),
    ("Latest Warning", latest_warning),
  ];

  let mut sheet = Sheet::new("Summary", vec!["Metric", "Value"]);
  for (metric, value) in rows {
    sheet.push_row(vec![metric.to_string(), value]);
  }
  sheet
}

// ─── Manager reports ─────────────────────────────────────────────────────────

/// One subject's overview as a metric/value row-set.
pub fn subject_report(activity: &SubjectActivity) -> Sheet {
  let mut sheet = Sheet::new(
    &format!("Report - {}", activity.profile.display_name),
    vec!["Metric", "Value"],
  );
  let rows: Vec<(&str, String)> = vec![
    ("Name", activity.profile.display_name.clone()),
    ("Email", activity.profile.email.clone()),
    ("Role", role_label(activity.profile.has_manager_access())),
    ("Test Records", activity.test_count().to_string()),
    ("Warning Records", activity.warning_count().to_string()),
    ("Compliance Rate", format_rate(&activity.tests)),
    (
      "Last Activity",
      activity
        .last_activity
        .map_or_else(|| "No activity".to_string(), format_datetime),
    ),
  ];
  for (metric, value) in rows {
    sheet.push_row(vec![metric.to_string(), value]);
  }
  sheet
}

/// The all-subjects table, one row per subject.
pub fn org_report(aggregate: &OrgAggregate) -> Sheet {
  let mut sheet = Sheet::new(
    "All Users",
    vec![
      "Name",
      "Email",
      "Role",
      "Tests",
      "Warnings",
      "Compliance Rate",
      "Last Activity",
    ],
  );
  for activity in &aggregate.subjects {
    sheet.push_row(vec![
      activity.profile.display_name.clone(),
      activity.profile.email.clone(),
      role_label(activity.profile.has_manager_access()),
      activity.test_count().to_string(),
      activity.warning_count().to_string(),
      format_rate(&activity.tests),
      activity
        .last_activity
        .map_or_else(|| "No activity".to_string(), format_datetime),
    ]);
  }
  sheet
}
