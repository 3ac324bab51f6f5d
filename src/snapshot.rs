// src/snapshot.rs - One cycle's worth of unit-normalized observations
use crate::value::Value;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Fixed format for the `{_TIME}` template variable, UTC.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single cycle's observation: field name to value, plus the
/// timestamp the host adapter stamped it with.
///
/// The host is responsible for unit conversion; by the time a snapshot
/// reaches the engine every field is already in the configured unit
/// system. Snapshots are read-only within a cycle and discarded after.
#[derive(Debug, Clone)]
pub struct Snapshot {
    timestamp: DateTime<Utc>,
    fields: HashMap<String, Value>,
}

impl Snapshot {
    /// An empty snapshot stamped with the cycle's timestamp.
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            fields: HashMap::new(),
        }
    }

    /// Set a field value, replacing any previous value of that name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Look up a field by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// The timestamp the host stamped this snapshot with.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Iterate over all fields, unordered.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when no fields are present.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Render the timestamp in the fixed `{_TIME}` form.
    pub fn format_time(&self) -> String {
        self.timestamp.format(TIME_FORMAT).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_field_access() {
        let mut snap = Snapshot::new(Utc::now());
        snap.set("outTemp", 31.2).set("txBatteryStatus", 2i64);

        assert_eq!(snap.get("outTemp"), Some(&Value::Float(31.2)));
        assert_eq!(snap.get("txBatteryStatus"), Some(&Value::Int(2)));
        assert_eq!(snap.get("missing"), None);
        assert_eq!(snap.len(), 2);
    }

    #[test]
    fn test_time_format_is_fixed() {
        let ts = Utc.with_ymd_and_hms(2021, 1, 2, 3, 4, 5).unwrap();
        let snap = Snapshot::new(ts);
        assert_eq!(snap.format_time(), "2021-01-02 03:04:05");
    }
}
