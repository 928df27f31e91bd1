/**
 * AGGREGATOR - Projections dérivées de la télémétrie
 *
 * ROLE :
 * Turns the raw telemetry snapshot into the three consumer-facing
 * projections: current readings, current statuses, per-channel history.
 *
 * HOW IT WORKS :
 * - Subscription-backed reads re-derive everything on each push and
 *   replace the cached snapshot wholesale (RwLock around an Arc)
 * - Synchronous reads serve the cache, or a placeholder set before the
 *   first push
 * - Latest record = highest numeric key (non-numeric keys weigh 0.0);
 *   equal weights resolve to the lexicographically greatest key
 *
 * ORDER (index-based navigation relies on it) :
 * readings = TDS, pH, Turbidity, Temperature
 * statuses = pH, Turbidity, TDS, Temperature
 */

use crate::health::{classify, is_working, TemperatureGrading};
use crate::models::{
    Channel, DerivedReading, DerivedStatus, SensorState, TelemetryRecord, TelemetrySnapshot, TimedReading, CLOCK_TIME,
    WIRE_TIMESTAMP,
};
use crate::state::{new_read_state, SharedRead};
use crate::telemetry::{sorted_by_timestamp, RemoteTelemetryClient, Subscription, DEFAULT_HISTORY_LIMIT};
use std::sync::Arc;
use time::PrimitiveDateTime;
use tracing::debug;

/// Points kept by the live history projection
pub const LIVE_HISTORY_POINTS: usize = 10;
/// Points kept by the cache-backed history fallback
pub const CACHED_HISTORY_POINTS: usize = 5;

type SnapshotCache = SharedRead<Option<Arc<TelemetrySnapshot>>>;

#[derive(Clone)]
pub struct Aggregator {
    client: RemoteTelemetryClient,
    cache: SnapshotCache,
    history_window: usize,
}

impl Aggregator {
    pub fn new(client: RemoteTelemetryClient) -> Self {
        Self::with_history_window(client, DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_history_window(client: RemoteTelemetryClient, history_window: usize) -> Self {
        Self {
            client,
            cache: new_read_state(None),
            history_window,
        }
    }

    pub fn client(&self) -> &RemoteTelemetryClient {
        &self.client
    }

    /// Readings of the latest record; empty while the snapshot is empty
    pub fn subscribe_readings(&self) -> Subscription<Vec<DerivedReading>> {
        let cache = self.cache.clone();
        self.client.subscribe_telemetry().map(move |snapshot| {
            let snapshot = remember(&cache, snapshot);
            derive_readings(&snapshot)
        })
    }

    /// Statuses of the latest record; empty while the snapshot is empty
    pub fn subscribe_statuses(&self, grading: TemperatureGrading) -> Subscription<Vec<DerivedStatus>> {
        let cache = self.cache.clone();
        self.client.subscribe_telemetry().map(move |snapshot| {
            let snapshot = remember(&cache, snapshot);
            derive_statuses(&snapshot, grading)
        })
    }

    /// Last 10 points of `channel` out of the "last N" window
    pub fn subscribe_history(&self, channel: &str) -> Subscription<Vec<TimedReading>> {
        let channel = Channel::parse(channel);
        self.client
            .subscribe_history(self.history_window)
            .map(move |records| match channel {
                Some(channel) => derive_history(&records, channel, LIVE_HISTORY_POINTS),
                None => Vec::new(),
            })
    }

    /// Best-effort readings: cache if any, placeholders otherwise
    pub fn readings(&self) -> Vec<DerivedReading> {
        match self.cached() {
            Some(snapshot) if !snapshot.is_empty() => derive_readings(&snapshot),
            _ => placeholder_readings(),
        }
    }

    pub fn statuses(&self, grading: TemperatureGrading) -> Vec<DerivedStatus> {
        match self.cached() {
            Some(snapshot) if !snapshot.is_empty() => derive_statuses(&snapshot, grading),
            _ => placeholder_statuses(),
        }
    }

    /// Last 5 points of `channel` taken from the cached snapshot
    pub fn cached_history(&self, channel: &str) -> Vec<TimedReading> {
        let (Some(channel), Some(snapshot)) = (Channel::parse(channel), self.cached()) else {
            return Vec::new();
        };
        let records = sorted_by_timestamp(snapshot.as_ref().clone());
        derive_history(&records, channel, CACHED_HISTORY_POINTS)
    }

    pub fn cached(&self) -> Option<Arc<TelemetrySnapshot>> {
        self.cache.read().clone()
    }
}

fn remember(cache: &SnapshotCache, snapshot: TelemetrySnapshot) -> Arc<TelemetrySnapshot> {
    let snapshot = Arc::new(snapshot);
    *cache.write() = Some(snapshot.clone());
    debug!("[aggregator] snapshot cached ({} records)", snapshot.len());
    snapshot
}

fn key_weight(key: &str) -> f64 {
    key.trim().parse::<f64>().ok().filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// Entry with the highest numeric key; ties go to the lexicographically greatest key
pub fn latest_entry(snapshot: &TelemetrySnapshot) -> Option<(&String, &TelemetryRecord)> {
    snapshot
        .iter()
        .max_by(|(a, _), (b, _)| key_weight(a).total_cmp(&key_weight(b)).then_with(|| a.cmp(b)))
}

fn display_value(channel: Channel, record: &TelemetryRecord) -> String {
    let value = channel.value_of(record);
    match channel {
        Channel::Ph | Channel::Turbidity => two_decimals(value),
        Channel::Temperature if !record.temperature_online() => "N/A".to_string(),
        Channel::Tds | Channel::Temperature => value.to_string(),
    }
}

/// Two decimals, half-up on the shortest decimal form (7.125 -> "7.13")
fn two_decimals(value: f64) -> String {
    if !value.is_finite() {
        return format!("{value:.2}");
    }
    let shortest = value.abs().to_string();
    let (whole, fraction) = shortest.split_once('.').unwrap_or((shortest.as_str(), ""));
    let mut digits: Vec<u8> = whole
        .bytes()
        .chain(fraction.bytes().chain(std::iter::repeat(b'0')).take(2))
        .map(|b| b - b'0')
        .collect();

    if fraction.as_bytes().get(2).is_some_and(|&d| d >= b'5') {
        let mut carry = true;
        for digit in digits.iter_mut().rev() {
            if *digit == 9 {
                *digit = 0;
            } else {
                *digit += 1;
                carry = false;
                break;
            }
        }
        if carry {
            digits.insert(0, 1);
        }
    }

    let split = digits.len() - 2;
    let render = |ds: &[u8]| ds.iter().map(|d| char::from(b'0' + d)).collect::<String>();
    let sign = if value < 0.0 { "-" } else { "" };
    format!("{sign}{}.{}", render(&digits[..split]), render(&digits[split..]))
}

fn reading(channel: Channel, display_value: String) -> DerivedReading {
    DerivedReading {
        label: channel.label().to_string(),
        display_value,
        unit: channel.unit().map(str::to_string),
    }
}

pub fn derive_readings(snapshot: &TelemetrySnapshot) -> Vec<DerivedReading> {
    let Some((_, latest)) = latest_entry(snapshot) else {
        return Vec::new();
    };
    Channel::READINGS_ORDER
        .iter()
        .map(|&channel| reading(channel, display_value(channel, latest)))
        .collect()
}

pub fn derive_statuses(snapshot: &TelemetrySnapshot, grading: TemperatureGrading) -> Vec<DerivedStatus> {
    let Some((_, latest)) = latest_entry(snapshot) else {
        return Vec::new();
    };
    Channel::STATUSES_ORDER
        .iter()
        .map(|&channel| {
            let state = classify(channel, latest, grading);
            let value = if state == SensorState::Offline {
                0.0
            } else {
                channel.value_of(latest)
            };
            DerivedStatus {
                name: channel.label().to_string(),
                value,
                unit: channel.unit().unwrap_or_default().to_string(),
                is_working: is_working(channel, latest),
                state,
            }
        })
        .collect()
}

/// `records` must already be in display order; offline temperatures are dropped
pub fn derive_history(records: &[TelemetryRecord], channel: Channel, points: usize) -> Vec<TimedReading> {
    let series: Vec<TimedReading> = records
        .iter()
        .filter(|r| channel != Channel::Temperature || r.temperature_online())
        .map(|r| TimedReading {
            value: channel.value_of(r),
            time: format_clock(&r.timestamp),
        })
        .collect();
    let skip = series.len().saturating_sub(points);
    series.into_iter().skip(skip).collect()
}

/// `yyyy-MM-dd HH:mm:ss` -> `HH:mm`; unparseable input comes back unchanged
pub fn format_clock(timestamp: &str) -> String {
    PrimitiveDateTime::parse(timestamp, WIRE_TIMESTAMP)
        .ok()
        .and_then(|dt| dt.format(CLOCK_TIME).ok())
        .unwrap_or_else(|| timestamp.to_string())
}

pub fn placeholder_readings() -> Vec<DerivedReading> {
    Channel::READINGS_ORDER
        .iter()
        .map(|&channel| {
            let shown = if channel == Channel::Temperature { "N/A" } else { "0" };
            reading(channel, shown.to_string())
        })
        .collect()
}

pub fn placeholder_statuses() -> Vec<DerivedStatus> {
    Channel::STATUSES_ORDER
        .iter()
        .map(|&channel| DerivedStatus {
            name: channel.label().to_string(),
            value: 0.0,
            unit: channel.unit().unwrap_or_default().to_string(),
            is_working: false,
            state: SensorState::Offline,
        })
        .collect()
}
