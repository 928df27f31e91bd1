/*!
Builders de télémétrie

Produce values shaped like the `telemetry/{key}` branch of the store:
`{flow, pH, tds, temperature, turbidity, volume, timestamp}` with
`yyyy-MM-dd HH:mm:ss` timestamps.
*/

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde_json::{json, Map, Value};

pub const WIRE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 2024-06-01 10:00:00, the reference instant of the fixtures
pub fn base_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 1)
        .and_then(|d| d.and_hms_opt(10, 0, 0))
        .unwrap_or_default()
}

pub fn wire_timestamp(at: NaiveDateTime) -> String {
    at.format(WIRE_FORMAT).to_string()
}

/// One telemetry record, healthy defaults
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    fields: Map<String, Value>,
}

impl RecordBuilder {
    pub fn new() -> Self {
        let mut fields = Map::new();
        fields.insert("flow".into(), json!(1.0));
        fields.insert("pH".into(), json!(7.0));
        fields.insert("tds".into(), json!(150.0));
        fields.insert("temperature".into(), json!(25.0));
        fields.insert("turbidity".into(), json!(1.0));
        fields.insert("volume".into(), json!(100.0));
        fields.insert("timestamp".into(), json!(wire_timestamp(base_time())));
        Self { fields }
    }

    /// Définit un champ brut
    pub fn set_field<S: Into<String>>(mut self, field: S, value: Value) -> Self {
        self.fields.insert(field.into(), value);
        self
    }

    pub fn tds(self, value: f64) -> Self {
        self.set_field("tds", json!(value))
    }

    pub fn ph(self, value: f64) -> Self {
        self.set_field("pH", json!(value))
    }

    pub fn turbidity(self, value: f64) -> Self {
        self.set_field("turbidity", json!(value))
    }

    pub fn temperature(self, value: f64) -> Self {
        self.set_field("temperature", json!(value))
    }

    /// Temperature probe unplugged
    pub fn offline_temperature(self) -> Self {
        self.temperature(-127.0)
    }

    pub fn at(self, when: NaiveDateTime) -> Self {
        self.set_field("timestamp", json!(wire_timestamp(when)))
    }

    pub fn timestamp<S: Into<String>>(self, raw: S) -> Self {
        self.set_field("timestamp", Value::String(raw.into()))
    }

    pub fn build(self) -> Value {
        Value::Object(self.fields)
    }
}

impl Default for RecordBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot keyed like the store does it (`"1"`, `"2"`, ...)
#[derive(Debug, Clone, Default)]
pub struct SnapshotBuilder {
    entries: Map<String, Value>,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry<K: Into<String>>(mut self, key: K, record: RecordBuilder) -> Self {
        self.entries.insert(key.into(), record.build());
        self
    }

    /// `count` records keyed 1..=count, one minute apart from `base_time()`
    pub fn series<F>(mut self, count: usize, make: F) -> Self
    where
        F: Fn(usize) -> RecordBuilder,
    {
        for i in 0..count {
            let at = base_time() + Duration::minutes(i as i64);
            self.entries.insert((i + 1).to_string(), make(i).at(at).build());
        }
        self
    }

    pub fn build(self) -> Value {
        Value::Object(self.entries)
    }
}
