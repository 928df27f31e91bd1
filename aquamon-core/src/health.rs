//! Sensor health classification
//!
//! Fixed thresholds, Normal side inclusive:
//! - pH          Low < 6.5, High > 8.5
//! - TDS         Low < 50,  High > 500 (ppm)
//! - Turbidity   High > 500 (NTU), never Low
//! - Temperature Offline at or below -100; banded Low < 20, High > 35 (°C)

use crate::models::{Channel, SensorState, TelemetryRecord, TEMPERATURE_OFFLINE_AT};

pub const PH_LOW: f64 = 6.5;
pub const PH_HIGH: f64 = 8.5;
pub const TDS_LOW: f64 = 50.0;
pub const TDS_HIGH: f64 = 500.0;
pub const TURBIDITY_HIGH: f64 = 500.0;
pub const TEMPERATURE_LOW: f64 = 20.0;
pub const TEMPERATURE_HIGH: f64 = 35.0;

/// How the temperature channel is graded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemperatureGrading {
    /// Readings view: offline or normal
    #[default]
    Presence,
    /// Monitoring view: offline, then low / normal / high bands
    Banded,
}

fn banded(value: f64, low: f64, high: f64) -> SensorState {
    if value < low {
        SensorState::Low
    } else if value > high {
        SensorState::High
    } else {
        SensorState::Normal
    }
}

pub fn classify_ph(value: f64) -> SensorState {
    banded(value, PH_LOW, PH_HIGH)
}

pub fn classify_tds(value: f64) -> SensorState {
    banded(value, TDS_LOW, TDS_HIGH)
}

pub fn classify_turbidity(value: f64) -> SensorState {
    if value > TURBIDITY_HIGH {
        SensorState::High
    } else {
        SensorState::Normal
    }
}

pub fn classify_temperature(value: f64, grading: TemperatureGrading) -> SensorState {
    if value <= TEMPERATURE_OFFLINE_AT {
        return SensorState::Offline;
    }
    match grading {
        TemperatureGrading::Presence => SensorState::Normal,
        TemperatureGrading::Banded => banded(value, TEMPERATURE_LOW, TEMPERATURE_HIGH),
    }
}

/// Only the temperature probe reports itself missing; every other channel counts as working
pub fn is_working(channel: Channel, record: &TelemetryRecord) -> bool {
    match channel {
        Channel::Temperature => record.temperature_online(),
        _ => true,
    }
}

pub fn classify(channel: Channel, record: &TelemetryRecord, grading: TemperatureGrading) -> SensorState {
    let value = channel.value_of(record);
    match channel {
        Channel::Ph => classify_ph(value),
        Channel::Tds => classify_tds(value),
        Channel::Turbidity => classify_turbidity(value),
        Channel::Temperature => classify_temperature(value, grading),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ph_boundaries() {
        assert_eq!(classify_ph(6.4), SensorState::Low);
        assert_eq!(classify_ph(6.5), SensorState::Normal);
        assert_eq!(classify_ph(8.5), SensorState::Normal);
        assert_eq!(classify_ph(8.6), SensorState::High);
    }

    #[test]
    fn test_tds_boundaries() {
        assert_eq!(classify_tds(49.0), SensorState::Low);
        assert_eq!(classify_tds(50.0), SensorState::Normal);
        assert_eq!(classify_tds(500.0), SensorState::Normal);
        assert_eq!(classify_tds(501.0), SensorState::High);
    }

    #[test]
    fn test_turbidity_boundaries() {
        assert_eq!(classify_turbidity(0.0), SensorState::Normal);
        assert_eq!(classify_turbidity(500.0), SensorState::Normal);
        assert_eq!(classify_turbidity(501.0), SensorState::High);
    }

    #[test]
    fn test_temperature_grading() {
        assert_eq!(classify_temperature(-100.0, TemperatureGrading::Presence), SensorState::Offline);
        assert_eq!(classify_temperature(-150.0, TemperatureGrading::Banded), SensorState::Offline);
        assert_eq!(classify_temperature(-99.9, TemperatureGrading::Presence), SensorState::Normal);
        assert_eq!(classify_temperature(40.0, TemperatureGrading::Presence), SensorState::Normal);

        assert_eq!(classify_temperature(19.9, TemperatureGrading::Banded), SensorState::Low);
        assert_eq!(classify_temperature(20.0, TemperatureGrading::Banded), SensorState::Normal);
        assert_eq!(classify_temperature(35.0, TemperatureGrading::Banded), SensorState::Normal);
        assert_eq!(classify_temperature(35.1, TemperatureGrading::Banded), SensorState::High);
    }

    #[test]
    fn test_is_working_follows_temperature_probe() {
        let mut record = TelemetryRecord {
            temperature: -100.0,
            ..Default::default()
        };
        assert!(!is_working(Channel::Temperature, &record));
        assert!(is_working(Channel::Ph, &record));
        record.temperature = -99.9;
        assert!(is_working(Channel::Temperature, &record));
    }
}
