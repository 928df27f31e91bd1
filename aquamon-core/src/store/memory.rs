//! In-process remote store
//!
//! Behaves like the real store for the core: full-value pushes to every
//! overlapping listener, immediate priming on registration, terminal
//! cancellation. Adds what tests need: write failure injection, forced
//! listener cancellation, a write log and the live listener count.

use super::{split_path, DataTree, Listener, ListenerId, ListenerTable, Query, RemoteStore};
use crate::error::{StoreError, StoreResult};
use crate::state::{new_state, Shared};
use futures::future::{self, BoxFuture};
use serde_json::{Map, Value};
use tracing::debug;

/// One accepted write, as recorded by the store
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRecord {
    pub path: String,
    pub value: Value,
}

#[derive(Default)]
struct Inner {
    tree: DataTree,
    listeners: ListenerTable,
    write_log: Vec<WriteRecord>,
    failing_writes: Option<String>,
}

/// Store en mémoire (tests, devkit)
#[derive(Clone)]
pub struct MemoryStore {
    inner: Shared<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: new_state(Inner::default()),
        }
    }

    /// Remote-side write: bypasses failure injection and the write log
    pub fn push(&self, path: &str, value: Value) {
        let segments = split_path(path);
        let mut inner = self.inner.lock();
        inner.tree.set(&segments, value);
        inner.listeners.notify(&segments, &inner.tree);
    }

    /// Current value at `path`, if any
    pub fn value_at(&self, path: &str) -> Option<Value> {
        self.inner.lock().tree.get(&split_path(path)).cloned()
    }

    /// Every subsequent write fails with `reason` until `None` is passed back
    pub fn fail_writes(&self, reason: Option<&str>) {
        self.inner.lock().failing_writes = reason.map(str::to_string);
    }

    /// Simulates a transport failure: every listener is closed with `Cancelled`
    pub fn cancel_listeners(&self, reason: &str) -> usize {
        let mut inner = self.inner.lock();
        let count = inner.listeners.cancel_all(&StoreError::Cancelled(reason.to_string()));
        debug!("memory store cancelled {count} listeners: {reason}");
        count
    }

    /// Same, for listeners registered under `prefix` only
    pub fn cancel_listeners_under(&self, prefix: &str, reason: &str) -> usize {
        let segments = split_path(prefix);
        self.inner
            .lock()
            .listeners
            .cancel_under(&segments, &StoreError::Cancelled(reason.to_string()))
    }

    pub fn listener_count(&self) -> usize {
        self.inner.lock().listeners.len()
    }

    pub fn write_log(&self) -> Vec<WriteRecord> {
        self.inner.lock().write_log.clone()
    }

    pub fn clear_write_log(&self) {
        self.inner.lock().write_log.clear();
    }

    fn write(&self, path: &str, value: impl FnOnce(&DataTree, &[String]) -> Value) -> StoreResult<()> {
        let segments = split_path(path);
        let mut inner = self.inner.lock();
        if let Some(reason) = &inner.failing_writes {
            return Err(StoreError::Write {
                path: path.to_string(),
                reason: reason.clone(),
            });
        }
        let value = value(&inner.tree, &segments);
        inner.write_log.push(WriteRecord {
            path: segments.join("/"),
            value: value.clone(),
        });
        inner.tree.set(&segments, value);
        inner.listeners.notify(&segments, &inner.tree);
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteStore for MemoryStore {
    fn add_listener(&self, path: &str, query: Query, listener: Listener) -> ListenerId {
        let mut inner = self.inner.lock();
        let id = inner.listeners.insert(split_path(path), query, listener);
        inner.listeners.prime(id, &inner.tree);
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        self.inner.lock().listeners.remove(id);
    }

    fn set(&self, path: &str, value: Value) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(future::ready(self.write(path, |_, _| value)))
    }

    fn update(&self, path: &str, fields: Map<String, Value>) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(future::ready(self.write(path, |tree, segments| tree.merged(segments, fields))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreEvent;
    use serde_json::json;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn recorder() -> (Listener, Arc<Mutex<Vec<StoreEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let listener: Listener = Arc::new(move |ev| sink.lock().push(ev));
        (listener, events)
    }

    #[test]
    fn test_listener_primed_only_when_value_exists() {
        let store = MemoryStore::new();
        let (listener, events) = recorder();
        store.add_listener("telemetry", Query::All, listener);
        assert!(events.lock().is_empty());

        store.push("telemetry/1", json!({"tds": 100}));
        let (late, late_events) = recorder();
        store.add_listener("telemetry", Query::All, late);

        assert_eq!(events.lock().len(), 1);
        assert_eq!(late_events.lock().len(), 1);
    }

    #[test]
    fn test_full_value_on_every_change() {
        let store = MemoryStore::new();
        let (listener, events) = recorder();
        store.add_listener("actuators", Query::All, listener);
        store.push("actuators/0", json!(1));
        store.push("actuators/1", json!(1));

        let events = events.lock();
        match events.last() {
            Some(StoreEvent::Changed(value)) => assert_eq!(value, &json!({"0": 1, "1": 1})),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_writes_leave_tree_untouched() {
        let store = MemoryStore::new();
        store.fail_writes(Some("offline"));
        let err = store.set("actuators/2", json!(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Write { .. }));
        assert_eq!(store.value_at("actuators/2"), None);
        assert!(store.write_log().is_empty());

        store.fail_writes(None);
        store.set("actuators/2", json!(1)).await.unwrap();
        assert_eq!(store.value_at("actuators/2"), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_update_merges_into_one_write() {
        let store = MemoryStore::new();
        store.push("schedule", json!({"command": "start", "status": "running", "last_updated": "x"}));
        let mut fields = Map::new();
        fields.insert("command".into(), json!("stop"));
        fields.insert("status".into(), json!("stopped"));
        store.update("schedule", fields).await.unwrap();

        assert_eq!(store.write_log().len(), 1);
        assert_eq!(
            store.value_at("schedule"),
            Some(json!({"command": "stop", "status": "stopped", "last_updated": "x"}))
        );
    }

    #[test]
    fn test_cancel_and_remove_listeners() {
        let store = MemoryStore::new();
        let (a, a_events) = recorder();
        let (b, _) = recorder();
        store.add_listener("telemetry", Query::All, a);
        let b_id = store.add_listener("actuators", Query::All, b);
        assert_eq!(store.listener_count(), 2);

        store.remove_listener(b_id);
        assert_eq!(store.listener_count(), 1);

        assert_eq!(store.cancel_listeners("network down"), 1);
        assert_eq!(store.listener_count(), 0);
        assert!(matches!(a_events.lock()[0], StoreEvent::Cancelled(_)));
    }
}
