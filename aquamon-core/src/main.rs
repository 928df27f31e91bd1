/**
 * AQUAMON MONITOR - Point d'entrée console du core
 *
 * RÔLE : Bootstrap headless : config, store MQTT, client/aggregator/controller,
 * holders overview + monitoring + control, journalisation de chaque changement.
 *
 * ARRÊT : Ctrl-C -> holders dropped -> listeners released -> event loop aborted.
 */

use anyhow::{Context, Result};
use aquamon_core::config::load_config;
use aquamon_core::holders::ViewState;
use aquamon_core::{
    ActuatorController, Aggregator, ControlHolder, MonitoringHolder, MqttStore, OverviewHolder, RemoteTelemetryClient,
};
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn log_state<T: Debug>(surface: &str, state: &ViewState<T>) {
    match (&state.data, &state.error) {
        (_, Some(e)) if state.data.is_some() => warn!("[{surface}] stale: {e}"),
        (None, Some(e)) => error!("[{surface}] {e}"),
        (Some(data), None) => info!("[{surface}] {data:?}"),
        _ if state.is_loading => info!("[{surface}] loading"),
        _ => {}
    }
}

async fn changed<T>(rx: &mut watch::Receiver<ViewState<T>>) -> Option<ViewState<T>>
where
    T: Clone,
{
    rx.changed().await.ok()?;
    Some(rx.borrow_and_update().clone())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("aquamon=info")))
        .init();

    let cfg = load_config().await;
    info!("[monitor] store {}:{} prefix '{}'", cfg.store.host, cfg.store.port, cfg.store.topic_prefix);

    let (store, event_loop) = MqttStore::connect(&cfg.store);
    let client = RemoteTelemetryClient::new(Arc::new(store));
    let aggregator = Aggregator::with_history_window(client.clone(), cfg.history.window);
    let controller = ActuatorController::new(client);

    let overview = OverviewHolder::new(aggregator.clone());
    let monitoring = MonitoringHolder::new(aggregator);
    let control = ControlHolder::new(controller);

    let mut readings = overview.watch();
    let mut statuses = monitoring.watch();
    let mut pumps = control.watch();
    let mut schedule = control.watch_schedule();

    loop {
        tokio::select! {
            Some(state) = changed(&mut readings) => log_state("overview", &state),
            Some(state) = changed(&mut statuses) => log_state("monitoring", &state),
            Some(state) = changed(&mut pumps) => log_state("pumps", &state),
            Some(state) = changed(&mut schedule) => log_state("schedule", &state),
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for Ctrl-C")?;
                info!("[monitor] shutting down");
                break;
            }
        }
    }

    drop((overview, monitoring, control));
    event_loop.abort();
    Ok(())
}
