//! Spreadsheet-row formatting for Watchdesk data.
//!
//! Converts records, derived statistics, and manager aggregates into flat
//! key-value row sets with stable column ordering, ready for a spreadsheet
//! or CSV renderer. Pure and synchronous; no I/O, no store dependencies.

mod report;
mod sheet;

pub use report::{
  org_report, subject_report, summary_sheet, tests_sheet, warnings_sheet,
};
pub use sheet::Sheet;
