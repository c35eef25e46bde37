//! Row/domain conversion helpers
//!
//! Timestamps are stored as RFC 3339 strings; wire-form enums go through
//! their serde string representation so the database and the JSON API
//! always agree on spelling.

use autopilot_core::{Department, StoreError, Timestamp};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

pub fn db_err(e: rusqlite::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

pub fn ts_to_sql(ts: Timestamp) -> String {
    ts.to_rfc3339()
}

pub fn ts_from_sql(s: &str) -> Result<Timestamp, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp '{s}': {e}")))
}

pub fn opt_ts_from_sql(s: Option<String>) -> Result<Option<Timestamp>, StoreError> {
    s.as_deref().map(ts_from_sql).transpose()
}

pub fn uuid_from_sql(s: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(s).map_err(|e| StoreError::Corrupt(format!("bad uuid '{s}': {e}")))
}

pub fn dept_from_sql(s: &str) -> Result<Department, StoreError> {
    Department::parse(s).ok_or_else(|| StoreError::Corrupt(format!("unknown department '{s}'")))
}

/// Serialize a wire-form enum to its bare string (e.g. `post_review`).
pub fn enum_to_sql<T: Serialize>(value: &T) -> Result<String, StoreError> {
    match serde_json::to_value(value) {
        Ok(Value::String(s)) => Ok(s),
        Ok(other) => Err(StoreError::Corrupt(format!(
            "expected string-serializable enum, got {other}"
        ))),
        Err(e) => Err(StoreError::Corrupt(e.to_string())),
    }
}

/// Parse a wire-form enum back from its bare string.
pub fn enum_from_sql<T: DeserializeOwned>(s: &str) -> Result<T, StoreError> {
    serde_json::from_value(Value::String(s.to_string()))
        .map_err(|e| StoreError::Corrupt(format!("bad enum value '{s}': {e}")))
}

pub fn json_to_sql<T: Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Corrupt(e.to_string()))
}

pub fn json_from_sql<T: DeserializeOwned>(s: &str) -> Result<T, StoreError> {
    serde_json::from_str(s).map_err(|e| StoreError::Corrupt(format!("bad json column: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use autopilot_core::{Disposition, Outcome, RiskLevel};

    #[test]
    fn enum_roundtrip_matches_wire_form() {
        assert_eq!(enum_to_sql(&Disposition::PostReview).unwrap(), "post_review");
        assert_eq!(enum_to_sql(&RiskLevel::High).unwrap(), "high");
        assert_eq!(enum_to_sql(&Outcome::Pending).unwrap(), "pending");

        let d: Disposition = enum_from_sql("requires_approval").unwrap();
        assert_eq!(d, Disposition::RequiresApproval);
        assert!(enum_from_sql::<Disposition>("nonsense").is_err());
    }

    #[test]
    fn timestamp_roundtrip() {
        let ts = autopilot_core::now();
        let back = ts_from_sql(&ts_to_sql(ts)).unwrap();
        assert_eq!(ts, back);
    }
}
