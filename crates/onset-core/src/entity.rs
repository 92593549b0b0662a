//! Entity identifiers and timestamp helpers.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Epoch milliseconds, as carried by every feature row and event.
pub type TimestampMs = i64;

/// Convert seconds (as used in configuration) into milliseconds.
pub fn secs_to_ms(secs: f64) -> i64 {
    (secs * 1000.0).round() as i64
}

/// Render an epoch-millisecond timestamp as UTC, for logs and reports.
///
/// Returns None for timestamps chrono cannot represent.
pub fn ts_to_utc(ts: TimestampMs) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ts).single()
}

/// Identifier of the instrument (entity) a row or event belongs to.
///
/// All per-entity state (CPD accumulators, refractory state) is keyed by
/// this value; rows of different entities never interact.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}
