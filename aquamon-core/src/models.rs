//! Data model shared by every layer of the core
//!
//! Raw side: `TelemetryRecord` / `TelemetrySnapshot` as pushed by the store,
//! `ActuatorVector` and `ScheduleState` mirrored from their branches.
//! Derived side: `DerivedReading`, `DerivedStatus`, `TimedReading`, all
//! recomputed from the raw side and never persisted.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use tracing::debug;

/// Wire timestamp format, `yyyy-MM-dd HH:mm:ss`
pub(crate) const WIRE_TIMESTAMP: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// History clock format, `HH:mm`
pub(crate) const CLOCK_TIME: &[BorrowedFormatItem<'static>] = format_description!("[hour]:[minute]");

/// Temperatures at or below this value mean the probe is offline
pub const TEMPERATURE_OFFLINE_AT: f64 = -100.0;

/// Number of pumps on the apparatus
pub const ACTUATOR_COUNT: usize = 7;

/// One timestamped reading of every raw channel (contract `telemetry/{key}`)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryRecord {
    pub flow: f64,
    #[serde(rename = "pH", alias = "ph")]
    pub ph: f64,
    pub tds: f64,
    pub temperature: f64,
    pub turbidity: f64,
    pub volume: f64,
    /// `yyyy-MM-dd HH:mm:ss`
    pub timestamp: String,
}

impl TelemetryRecord {
    pub fn temperature_online(&self) -> bool {
        self.temperature > TEMPERATURE_OFFLINE_AT
    }
}

/// Store key -> record, replaced wholesale on every push
pub type TelemetrySnapshot = BTreeMap<String, TelemetryRecord>;

/// Decodes the telemetry branch. Entries that do not deserialize are skipped.
pub fn decode_snapshot(value: &Value) -> TelemetrySnapshot {
    let entries: Vec<(String, &Value)> = match value {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        // numeric keys can come back array-shaped
        Value::Array(items) => items
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_null())
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        _ => Vec::new(),
    };

    entries
        .into_iter()
        .filter_map(|(key, raw)| match TelemetryRecord::deserialize(raw) {
            Ok(record) => Some((key, record)),
            Err(e) => {
                debug!("[telemetry] skipping malformed entry {key}: {e}");
                None
            }
        })
        .collect()
}

/// Sensor channels exposed to consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Tds,
    Ph,
    Turbidity,
    Temperature,
}

impl Channel {
    /// Readings order (overview grid)
    pub const READINGS_ORDER: [Channel; 4] = [Channel::Tds, Channel::Ph, Channel::Turbidity, Channel::Temperature];
    /// Statuses order (monitoring list)
    pub const STATUSES_ORDER: [Channel; 4] = [Channel::Ph, Channel::Turbidity, Channel::Tds, Channel::Temperature];

    /// Case-insensitive lookup: `ph`, `tds`, `turbidity`, `temperature`
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "ph" => Some(Channel::Ph),
            "tds" => Some(Channel::Tds),
            "turbidity" => Some(Channel::Turbidity),
            "temperature" => Some(Channel::Temperature),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Channel::Tds => "TDS",
            Channel::Ph => "pH",
            Channel::Turbidity => "Turbidity",
            Channel::Temperature => "Temperature",
        }
    }

    pub fn unit(self) -> Option<&'static str> {
        match self {
            Channel::Tds => Some("ppm"),
            Channel::Ph => None,
            Channel::Turbidity => Some("NTU"),
            Channel::Temperature => Some("°C"),
        }
    }

    pub fn value_of(self, record: &TelemetryRecord) -> f64 {
        match self {
            Channel::Tds => record.tds,
            Channel::Ph => record.ph,
            Channel::Turbidity => record.turbidity,
            Channel::Temperature => record.temperature,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Presentation-ready value of one channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedReading {
    pub label: String,
    pub display_value: String,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SensorState {
    Normal,
    Low,
    High,
    Offline,
}

impl fmt::Display for SensorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SensorState::Normal => "Normal",
            SensorState::Low => "Low",
            SensorState::High => "High",
            SensorState::Offline => "Offline",
        };
        f.write_str(s)
    }
}

/// Health classification of one channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedStatus {
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub is_working: bool,
    pub state: SensorState,
}

/// One history point, `time` is `HH:mm`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimedReading {
    pub value: f64,
    pub time: String,
}

/// Fixed-size on/off state of the pumps (contract `actuators/{0..6}`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ActuatorVector([bool; ACTUATOR_COUNT]);

impl ActuatorVector {
    pub fn new(states: [bool; ACTUATOR_COUNT]) -> Self {
        Self(states)
    }

    pub fn all(on: bool) -> Self {
        Self([on; ACTUATOR_COUNT])
    }

    pub fn get(&self, index: usize) -> Option<bool> {
        self.0.get(index).copied()
    }

    /// Returns false when `index` is out of range
    pub fn set(&mut self, index: usize, on: bool) -> bool {
        match self.0.get_mut(index) {
            Some(slot) => {
                *slot = on;
                true
            }
            None => false,
        }
    }

    pub fn as_array(&self) -> &[bool; ACTUATOR_COUNT] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        self.0.iter().copied()
    }

    /// Accepts `{"0": 1, ...}` or `[1, 0, ...]`; anything missing or unreadable is off.
    pub fn from_value(value: &Value) -> Self {
        let mut states = [false; ACTUATOR_COUNT];
        for (index, slot) in states.iter_mut().enumerate() {
            let raw = match value {
                Value::Object(map) => map.get(&index.to_string()),
                Value::Array(items) => items.get(index),
                _ => None,
            };
            *slot = raw.map(actuator_flag).unwrap_or(false);
        }
        Self(states)
    }
}

fn actuator_flag(raw: &Value) -> bool {
    match raw {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
        Value::String(s) => matches!(s.trim(), "1" | "true" | "on"),
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleStatus {
    Stopped,
    Running,
    Paused,
    #[default]
    #[serde(other)]
    Unknown,
}

impl ScheduleStatus {
    /// start/resume -> running, stop -> stopped, pause -> paused, anything else -> unknown
    pub fn for_command(command: &str) -> Self {
        match command.trim().to_ascii_lowercase().as_str() {
            "start" | "resume" => ScheduleStatus::Running,
            "stop" => ScheduleStatus::Stopped,
            "pause" => ScheduleStatus::Paused,
            _ => ScheduleStatus::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScheduleStatus::Stopped => "stopped",
            ScheduleStatus::Running => "running",
            ScheduleStatus::Paused => "paused",
            ScheduleStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contract `schedule/` : `{command, status, last_updated}`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScheduleState {
    #[serde(default)]
    pub status: ScheduleStatus,
    #[serde(default, rename = "command")]
    pub last_command: String,
    #[serde(default)]
    pub last_updated: String,
}

impl ScheduleState {
    pub fn from_value(value: &Value) -> Self {
        if value.is_null() {
            return Self::default();
        }
        ScheduleState::deserialize(value).unwrap_or_else(|e| {
            debug!("[schedule] unreadable state, reporting unknown: {e}");
            Self::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_snapshot_skips_malformed_entries() {
        let raw = json!({
            "1": {"tds": 100, "pH": 7.1, "turbidity": 2.5, "temperature": 25, "timestamp": "2024-06-01 10:00:00"},
            "2": {"tds": "not a number"},
            "3": "garbage",
            "4": {"flow": 1.5}
        });
        let snapshot = decode_snapshot(&raw);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["1"].ph, 7.1);
        // missing fields default to zero
        assert_eq!(snapshot["4"].tds, 0.0);
        assert_eq!(snapshot["4"].timestamp, "");
    }

    #[test]
    fn test_decode_snapshot_array_shape() {
        let raw = json!([null, {"tds": 10}, {"tds": 20}]);
        let snapshot = decode_snapshot(&raw);
        assert_eq!(snapshot.keys().cloned().collect::<Vec<_>>(), vec!["1", "2"]);
        assert!(decode_snapshot(&Value::Null).is_empty());
    }

    #[test]
    fn test_channel_parse_is_case_insensitive() {
        assert_eq!(Channel::parse("PH"), Some(Channel::Ph));
        assert_eq!(Channel::parse("Temperature"), Some(Channel::Temperature));
        assert_eq!(Channel::parse("flow"), None);
    }

    #[test]
    fn test_actuator_vector_decoding() {
        let from_map = ActuatorVector::from_value(&json!({"0": 1, "2": true, "6": "1", "9": 1}));
        assert_eq!(from_map.as_array(), &[true, false, true, false, false, false, true]);

        let from_array = ActuatorVector::from_value(&json!([0, 1]));
        assert_eq!(from_array.get(1), Some(true));
        assert_eq!(from_array.iter().count(), ACTUATOR_COUNT);
        assert_eq!(from_array.get(7), None);
    }

    #[test]
    fn test_schedule_status_for_command() {
        assert_eq!(ScheduleStatus::for_command("start"), ScheduleStatus::Running);
        assert_eq!(ScheduleStatus::for_command("stop"), ScheduleStatus::Stopped);
        assert_eq!(ScheduleStatus::for_command("pause"), ScheduleStatus::Paused);
        assert_eq!(ScheduleStatus::for_command("resume"), ScheduleStatus::Running);
        assert_eq!(ScheduleStatus::for_command("flush"), ScheduleStatus::Unknown);
    }

    #[test]
    fn test_schedule_state_wire_shape() {
        let state = ScheduleState::from_value(&json!({
            "command": "pause", "status": "paused", "last_updated": "2024-06-01 10:00:00"
        }));
        assert_eq!(state.status, ScheduleStatus::Paused);
        assert_eq!(state.last_command, "pause");

        let odd = ScheduleState::from_value(&json!({"status": "draining"}));
        assert_eq!(odd.status, ScheduleStatus::Unknown);

        let unreadable = ScheduleState::from_value(&json!(42));
        assert_eq!(unreadable, ScheduleState::default());
    }
}
