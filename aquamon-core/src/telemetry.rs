//! Remote telemetry client - bridges store listeners into async streams
//!
//! Each `subscribe_*` call registers exactly one listener and hands back a
//! `Subscription` owning it:
//! - every store change yields the full decoded value (never a delta)
//! - a store-side cancellation yields one `Err` and then ends the stream
//! - dropping the subscription (consumer gone, task aborted, error path)
//!   deregisters the listener
//!
//! No de-duplication here: two subscriptions on the same branch are two
//! independent listeners.

use crate::error::StoreResult;
use crate::models::{decode_snapshot, ActuatorVector, ScheduleState, ScheduleStatus, TelemetryRecord, TelemetrySnapshot};
use crate::store::{compare_keys, Listener, ListenerId, Query, RemoteStore, StoreEvent};
use futures::stream::{BoxStream, Stream, StreamExt};
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::debug;

pub const TELEMETRY_PATH: &str = "telemetry";
pub const ACTUATORS_PATH: &str = "actuators";
pub const SCHEDULE_PATH: &str = "schedule";

/// Records fetched by the history query ("last N")
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Flux possédé d'un abonnement au store
pub struct Subscription<T> {
    inner: BoxStream<'static, StoreResult<T>>,
}

impl<T: Send + 'static> Subscription<T> {
    /// Next value, `Some(Err(_))` once on store failure, `None` when closed
    pub async fn next(&mut self) -> Option<StoreResult<T>> {
        self.inner.next().await
    }

    /// Transforms every value; errors and the listener registration are kept as-is
    pub fn map<U, F>(self, mut f: F) -> Subscription<U>
    where
        U: Send + 'static,
        F: FnMut(T) -> U + Send + 'static,
    {
        Subscription {
            inner: self.inner.map(move |item| item.map(&mut f)).boxed(),
        }
    }

    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = StoreResult<T>> + Send + 'static,
    {
        Self { inner: stream.boxed() }
    }
}

impl<T> Stream for Subscription<T> {
    type Item = StoreResult<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

/// Releases the store listener on every exit path
struct ListenerGuard {
    store: Arc<dyn RemoteStore>,
    id: ListenerId,
    path: String,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.store.remove_listener(self.id);
        debug!("[telemetry] released listener on {}", self.path);
    }
}

struct ListenerStream<T> {
    rx: mpsc::UnboundedReceiver<StoreResult<T>>,
    _guard: ListenerGuard,
    closed: bool,
}

impl<T> Stream for ListenerStream<T> {
    type Item = StoreResult<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.closed {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(Err(e))) => {
                self.closed = true;
                Poll::Ready(Some(Err(e)))
            }
            other => other,
        }
    }
}

/// Client lecture du store distant (télémétrie, actionneurs, planning)
#[derive(Clone)]
pub struct RemoteTelemetryClient {
    store: Arc<dyn RemoteStore>,
}

impl RemoteTelemetryClient {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    /// Registers one listener on `path`, decoding each pushed value with `decode`
    pub fn listen<T, F>(&self, path: &str, query: Query, decode: F) -> Subscription<T>
    where
        T: Send + 'static,
        F: Fn(&Value) -> T + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let listener: Listener = Arc::new(move |event| {
            let item = match event {
                StoreEvent::Changed(value) => Ok(decode(&value)),
                StoreEvent::Cancelled(e) => Err(e),
            };
            // a closed receiver means the guard is about to deregister us
            let _ = tx.send(item);
        });

        let id = self.store.add_listener(path, query, listener);
        debug!("[telemetry] listening on {path} ({query:?})");
        Subscription::from_stream(ListenerStream {
            rx,
            _guard: ListenerGuard {
                store: self.store.clone(),
                id,
                path: path.to_string(),
            },
            closed: false,
        })
    }

    /// Whole telemetry branch, re-emitted on every push
    pub fn subscribe_telemetry(&self) -> Subscription<TelemetrySnapshot> {
        self.listen(TELEMETRY_PATH, Query::All, decode_snapshot)
    }

    /// Last `limit` records in key order, sorted ascending by timestamp string
    pub fn subscribe_history(&self, limit: usize) -> Subscription<Vec<TelemetryRecord>> {
        self.listen(TELEMETRY_PATH, Query::LimitToLast(limit), |value| {
            sorted_by_timestamp(decode_snapshot(value))
        })
    }

    pub fn subscribe_actuators(&self) -> Subscription<ActuatorVector> {
        self.listen(ACTUATORS_PATH, Query::All, ActuatorVector::from_value)
    }

    pub fn subscribe_schedule(&self) -> Subscription<ScheduleState> {
        self.listen(SCHEDULE_PATH, Query::All, ScheduleState::from_value)
    }

    pub fn subscribe_schedule_status(&self) -> Subscription<ScheduleStatus> {
        self.subscribe_schedule().map(|state| state.status)
    }
}

/// Ascending by timestamp string; equal timestamps keep store key order
pub fn sorted_by_timestamp(snapshot: TelemetrySnapshot) -> Vec<TelemetryRecord> {
    let mut entries: Vec<(String, TelemetryRecord)> = snapshot.into_iter().collect();
    entries.sort_by(|(ka, a), (kb, b)| a.timestamp.cmp(&b.timestamp).then_with(|| compare_keys(ka, kb)));
    entries.into_iter().map(|(_, record)| record).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn client() -> (MemoryStore, RemoteTelemetryClient) {
        let store = MemoryStore::new();
        let client = RemoteTelemetryClient::new(Arc::new(store.clone()));
        (store, client)
    }

    #[tokio::test]
    async fn test_snapshot_reemitted_in_full() {
        let (store, client) = client();
        let mut sub = client.subscribe_telemetry();
        store.push("telemetry/1", json!({"tds": 10, "timestamp": "2024-06-01 10:00:00"}));
        store.push("telemetry/2", json!({"tds": 20, "timestamp": "2024-06-01 10:01:00"}));

        assert_eq!(sub.next().await.unwrap().unwrap().len(), 1);
        let second = sub.next().await.unwrap().unwrap();
        assert_eq!(second.len(), 2);
        assert_eq!(second["2"].tds, 20.0);
    }

    #[tokio::test]
    async fn test_history_limited_and_sorted() {
        let (store, client) = client();
        store.push(
            "telemetry",
            json!({
                "1": {"pH": 7.0, "timestamp": "2024-06-01 10:02:00"},
                "2": {"pH": 7.1, "timestamp": "2024-06-01 10:00:00"},
                "3": {"pH": 7.2, "timestamp": "2024-06-01 10:01:00"}
            }),
        );
        let mut sub = client.subscribe_history(2);
        let records = sub.next().await.unwrap().unwrap();
        // last two keys are "2" and "3", then sorted by timestamp
        assert_eq!(records.iter().map(|r| r.ph).collect::<Vec<_>>(), vec![7.1, 7.2]);
    }

    #[tokio::test]
    async fn test_cancellation_is_terminal() {
        let (store, client) = client();
        let mut sub = client.subscribe_actuators();
        store.cancel_listeners("permission denied");

        match sub.next().await {
            Some(Err(StoreError::Cancelled(reason))) => assert_eq!(reason, "permission denied"),
            other => panic!("expected a terminal error, got {other:?}"),
        }
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn test_drop_deregisters_listener() {
        let (store, client) = client();
        let a = client.subscribe_telemetry();
        let b = client.subscribe_telemetry();
        assert_eq!(store.listener_count(), 2);
        drop(a);
        assert_eq!(store.listener_count(), 1);
        drop(b);
        assert_eq!(store.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_schedule_status_stream() {
        let (store, client) = client();
        let mut sub = client.subscribe_schedule_status();
        store.push("schedule", json!({"command": "pause", "status": "paused", "last_updated": "2024-06-01 10:00:00"}));
        assert_eq!(sub.next().await.unwrap().unwrap(), ScheduleStatus::Paused);
    }
}
