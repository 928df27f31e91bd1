/*!
Test Harness pour le core Aquamon

Facilite l'écriture de tests avec:
- Un MemoryStore câblé au client, à l'aggregator et au controller
- Simulation des pushes du store (télémétrie, pompes, planning)
- Attentes bornées par timeout sur l'état des holders et du store
*/

use crate::fixtures::RecordBuilder;
use anyhow::Result;
use aquamon_core::holders::ViewState;
use aquamon_core::store::memory::WriteRecord;
use aquamon_core::{ActuatorController, Aggregator, MemoryStore, RemoteTelemetryClient};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::info;

/// Délai par défaut des attentes
pub const DEFAULT_WAIT_MS: u64 = 2000;

/// Harness de test complet du core
pub struct TestHarness {
    pub store: MemoryStore,
    pub client: RemoteTelemetryClient,
    pub aggregator: Aggregator,
    pub controller: ActuatorController,
}

impl TestHarness {
    pub fn new() -> Self {
        // logging pour tests, une seule fois par process
        tracing_subscriber::fmt().with_test_writer().try_init().ok();

        let store = MemoryStore::new();
        let client = RemoteTelemetryClient::new(Arc::new(store.clone()));
        Self {
            aggregator: Aggregator::new(client.clone()),
            controller: ActuatorController::new(client.clone()),
            client,
            store,
        }
    }

    /// Simule le push d'un relevé sous `telemetry/{key}`
    pub fn push_record(&self, key: &str, record: RecordBuilder) {
        self.store.push(&format!("telemetry/{key}"), record.build());
        info!("[harness] pushed telemetry/{key}");
    }

    /// Remplace toute la branche télémétrie
    pub fn push_snapshot(&self, snapshot: Value) {
        self.store.push("telemetry", snapshot);
    }

    /// Simule le store qui rapporte l'état d'une pompe
    pub fn push_actuator(&self, index: usize, on: bool) {
        self.store.push(&format!("actuators/{index}"), json!(u8::from(on)));
    }

    pub fn push_actuators(&self, states: [bool; 7]) {
        let vector: serde_json::Map<String, Value> = states
            .iter()
            .enumerate()
            .map(|(i, &on)| (i.to_string(), json!(u8::from(on))))
            .collect();
        self.store.push("actuators", Value::Object(vector));
    }

    pub fn push_schedule(&self, command: &str, status: &str) {
        self.store.push(
            "schedule",
            json!({"command": command, "status": status, "last_updated": "2024-06-01 10:00:00"}),
        );
    }

    /// Simule une coupure : tous les listeners sont fermés avec une erreur
    pub fn cut_connection(&self, reason: &str) -> usize {
        self.store.cancel_listeners(reason)
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.store.write_log()
    }

    /// Attend qu'une condition devienne vraie (polling 5 ms)
    pub async fn wait_until<F>(&self, timeout_ms: u64, condition: F) -> Result<()>
    where
        F: Fn() -> bool,
    {
        timeout(Duration::from_millis(timeout_ms), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .map_err(|_| anyhow::anyhow!("condition not met within {timeout_ms} ms"))
    }

    /// Attend que le store compte exactement `count` listeners
    pub async fn wait_for_listeners(&self, count: usize) -> Result<()> {
        let store = self.store.clone();
        self.wait_until(DEFAULT_WAIT_MS, move || store.listener_count() == count)
            .await
            .map_err(|e| anyhow::anyhow!("{e} (listeners: {})", self.store.listener_count()))
    }

    /// Attend un état de holder vérifiant `predicate`
    pub async fn wait_for_state<T, F>(rx: &mut watch::Receiver<ViewState<T>>, predicate: F) -> Result<ViewState<T>>
    where
        T: Clone,
        F: Fn(&ViewState<T>) -> bool,
    {
        let state = timeout(Duration::from_millis(DEFAULT_WAIT_MS), rx.wait_for(|s| predicate(s)))
            .await
            .map_err(|_| anyhow::anyhow!("holder state not reached within {DEFAULT_WAIT_MS} ms"))??;
        Ok(state.clone())
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
