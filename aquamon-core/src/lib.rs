/**
 * AQUAMON CORE - Agrégation réactive et médiation des commandes
 *
 * ROLE : Ingests telemetry pushed by the remote store, derives readings,
 * statuses and history, and forwards pump/schedule commands back.
 *
 * FLOW : store -> telemetry (client) -> aggregator -> holders -> presentation
 *        presentation -> holders -> actuators (controller) -> store
 */

pub mod actuators;
pub mod aggregator;
pub mod config;
pub mod error;
pub mod health;
pub mod holders;
pub mod models;
pub mod state;
pub mod store;
pub mod telemetry;

pub use actuators::ActuatorController;
pub use aggregator::Aggregator;
pub use error::{ControlError, StoreError, StoreResult};
pub use health::TemperatureGrading;
pub use holders::{ControlHolder, DetailHolder, MonitoringHolder, OverviewHolder, SubscribedView, ViewState};
pub use models::{
    ActuatorVector, Channel, DerivedReading, DerivedStatus, ScheduleState, ScheduleStatus, SensorState,
    TelemetryRecord, TelemetrySnapshot, TimedReading,
};
pub use store::{MemoryStore, MqttStore, Query, RemoteStore};
pub use telemetry::{RemoteTelemetryClient, Subscription};
