//! [`StoreInstant`] — the store-assigned timestamp in any of the shapes
//! legacy documents carry.
//!
//! The hosted store writes native timestamps, but documents created by older
//! portal revisions hold ISO-8601 strings or raw `{seconds, nanoseconds}`
//! objects. Reads normalise all three into one comparable instant;
//! unparseable values are excluded from comparisons rather than crashing
//! them.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A creation timestamp as stored, in one of three historical shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoreInstant {
  /// The store's native timestamp representation.
  Native(DateTime<Utc>),
  /// Raw epoch-seconds object written by an early portal revision.
  Epoch { seconds: i64, nanoseconds: u32 },
  /// An ISO-8601 string written by an early portal revision.
  Iso(String),
}

impl StoreInstant {
  /// The current wall-clock instant, in the native shape.
  pub fn now() -> Self {
    Self::Native(Utc::now())
  }

  /// Normalise to a comparable UTC instant. Returns `None` for values that
  /// cannot be parsed; callers exclude those from max/ordering computations.
  pub fn to_utc(&self) -> Option<DateTime<Utc>> {
    match self {
      Self::Native(dt) => Some(*dt),
      Self::Epoch { seconds, nanoseconds } => {
        Utc.timestamp_opt(*seconds, *nanoseconds).single()
      }
      Self::Iso(s) => s.parse::<DateTime<Utc>>().ok(),
    }
  }
}
