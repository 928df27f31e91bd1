//! Actuator and schedule commands
//!
//! Reads go through the telemetry client (full vector / schedule triple on
//! every push). Writes are one-shot: `Ok` means the store accepted the write,
//! the new state only shows up on the next pushed value. Failures are always
//! returned to the caller, tagged by channel.

use crate::error::ControlError;
use crate::models::{ActuatorVector, ScheduleState, ScheduleStatus, ACTUATOR_COUNT, WIRE_TIMESTAMP};
use crate::telemetry::{RemoteTelemetryClient, Subscription, ACTUATORS_PATH, SCHEDULE_PATH};
use futures::future::try_join_all;
use serde_json::{json, Map};
use time::OffsetDateTime;
use tracing::{info, warn};

#[derive(Clone)]
pub struct ActuatorController {
    client: RemoteTelemetryClient,
}

impl ActuatorController {
    pub fn new(client: RemoteTelemetryClient) -> Self {
        Self { client }
    }

    pub fn subscribe_actuator_vector(&self) -> Subscription<ActuatorVector> {
        self.client.subscribe_actuators()
    }

    pub fn subscribe_schedule_status(&self) -> Subscription<ScheduleStatus> {
        self.client.subscribe_schedule_status()
    }

    pub fn subscribe_schedule(&self) -> Subscription<ScheduleState> {
        self.client.subscribe_schedule()
    }

    /// Writes `actuators/{index}` = 1 or 0
    pub async fn set_actuator(&self, index: usize, on: bool) -> Result<(), ControlError> {
        if index >= ACTUATOR_COUNT {
            return Err(ControlError::InvalidIndex(index));
        }
        let path = format!("{ACTUATORS_PATH}/{index}");
        self.client
            .store()
            .set(&path, json!(u8::from(on)))
            .await
            .map_err(|e| {
                warn!("[actuators] pump {index} write failed: {e}");
                ControlError::Actuator(e)
            })?;
        info!("[actuators] pump {index} -> {}", if on { "on" } else { "off" });
        Ok(())
    }

    /// One write per pump; the first failure is reported
    pub async fn set_all_actuators(&self, on: bool) -> Result<(), ControlError> {
        try_join_all((0..ACTUATOR_COUNT).map(|index| self.set_actuator(index, on))).await?;
        Ok(())
    }

    /// Writes `{command, status, last_updated}` as one update and returns what was written
    pub async fn send_schedule_command(&self, command: &str) -> Result<ScheduleState, ControlError> {
        let command = command.trim();
        let state = ScheduleState {
            status: ScheduleStatus::for_command(command),
            last_command: command.to_string(),
            last_updated: wall_clock_timestamp(),
        };

        let mut fields = Map::new();
        fields.insert("command".into(), json!(state.last_command));
        fields.insert("status".into(), json!(state.status.as_str()));
        fields.insert("last_updated".into(), json!(state.last_updated));

        self.client.store().update(SCHEDULE_PATH, fields).await.map_err(|e| {
            warn!("[schedule] command '{command}' failed: {e}");
            ControlError::Schedule(e)
        })?;
        info!("[schedule] {command} -> {}", state.status);
        Ok(state)
    }
}

/// Local wall-clock time in wire format, UTC when the local offset is unknown
pub fn wall_clock_timestamp() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(WIRE_TIMESTAMP).unwrap_or_default()
}
