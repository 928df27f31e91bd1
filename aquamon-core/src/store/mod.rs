/**
 * REMOTE STORE - Frontière avec le store clé/valeur distant (push)
 *
 * ROLE :
 * Defines the one seam between the core and the remote real-time store:
 * callback-style listener registration on logical paths, plus writes.
 *
 * HOW IT WORKS :
 * - RemoteStore trait = add_listener / remove_listener / set / update
 * - A listener receives the FULL current value at its path on every change
 *   (never a delta), or a terminal `Cancelled` event after which the store
 *   forgets it
 * - DataTree + ListenerTable hold the logic every implementation shares
 *
 * IMPLEMENTATIONS :
 * - memory::MemoryStore : in-process, failure injection, used by tests/devkit
 * - mqtt::MqttStore     : retained MQTT topics under a prefix (rumqttc)
 *
 * PATHS (logical) :
 * telemetry/{key} -> record, actuators/{0..6} -> 0|1, schedule -> {command, status, last_updated}
 */

pub mod memory;
pub mod mqtt;

use crate::error::{StoreError, StoreResult};
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

pub use memory::MemoryStore;
pub use mqtt::MqttStore;

/// Filtre appliqué à la valeur livrée au listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    All,
    /// Only the last N children, in store key order
    LimitToLast(usize),
}

/// Événement livré à un listener
#[derive(Debug, Clone)]
pub enum StoreEvent {
    Changed(Value),
    Cancelled(StoreError),
}

pub type Listener = Arc<dyn Fn(StoreEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Interface commune de tous les stores distants
pub trait RemoteStore: Send + Sync {
    /// Registers one listener. It fires immediately if a value already exists at `path`.
    fn add_listener(&self, path: &str, query: Query, listener: Listener) -> ListenerId;

    /// Unknown or already-cancelled ids are ignored
    fn remove_listener(&self, id: ListenerId);

    /// Replaces the value at `path`; `Value::Null` deletes it
    fn set(&self, path: &str, value: Value) -> BoxFuture<'_, StoreResult<()>>;

    /// Merges `fields` into the object at `path` as one write
    fn update(&self, path: &str, fields: Map<String, Value>) -> BoxFuture<'_, StoreResult<()>>;
}

pub(crate) fn split_path(path: &str) -> Vec<String> {
    path.split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Store key order: numeric-looking keys first (numerically), then the rest lexicographically.
pub fn compare_keys(a: &str, b: &str) -> Ordering {
    match (numeric_key(a), numeric_key(b)) {
        (Some(x), Some(y)) => x.total_cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

fn numeric_key(key: &str) -> Option<f64> {
    key.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

pub(crate) fn apply_query(value: Value, query: Query) -> Value {
    match (query, value) {
        (Query::LimitToLast(n), Value::Object(map)) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| compare_keys(a, b));
            let skip = entries.len().saturating_sub(n);
            Value::Object(entries.into_iter().skip(skip).collect())
        }
        (Query::LimitToLast(n), Value::Array(items)) => {
            let skip = items.len().saturating_sub(n);
            Value::Array(items.into_iter().skip(skip).collect())
        }
        (_, value) => value,
    }
}

/// Miroir JSON du store, adressé par chemin
#[derive(Debug, Default)]
pub(crate) struct DataTree {
    root: Value,
}

impl DataTree {
    pub fn get(&self, path: &[String]) -> Option<&Value> {
        let mut current = &self.root;
        for seg in path {
            current = match current {
                Value::Object(map) => map.get(seg)?,
                Value::Array(items) => items.get(seg.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        if current.is_null() {
            None
        } else {
            Some(current)
        }
    }

    pub fn set(&mut self, path: &[String], value: Value) {
        let Some((last, parents)) = path.split_last() else {
            self.root = value;
            return;
        };

        let mut current = &mut self.root;
        for seg in parents {
            current = object_mut(current).entry(seg.clone()).or_insert(Value::Null);
        }
        let map = object_mut(current);
        if value.is_null() {
            map.remove(last);
        } else {
            map.insert(last.clone(), value);
        }
    }

    /// Current object at `path` with `fields` merged in
    pub fn merged(&self, path: &[String], fields: Map<String, Value>) -> Value {
        let mut base = match self.get(path) {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        base.extend(fields);
        Value::Object(base)
    }
}

struct Registration {
    path: Vec<String>,
    query: Query,
    listener: Listener,
}

/// Table des listeners actifs
#[derive(Default)]
pub(crate) struct ListenerTable {
    next_id: u64,
    entries: HashMap<ListenerId, Registration>,
}

impl ListenerTable {
    pub fn insert(&mut self, path: Vec<String>, query: Query, listener: Listener) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.entries.insert(id, Registration { path, query, listener });
        id
    }

    pub fn remove(&mut self, id: ListenerId) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Pushes the current value to one listener, if there is one
    pub fn prime(&self, id: ListenerId, tree: &DataTree) {
        if let Some(reg) = self.entries.get(&id) {
            if let Some(value) = tree.get(&reg.path) {
                (reg.listener)(StoreEvent::Changed(apply_query(value.clone(), reg.query)));
            }
        }
    }

    /// Re-emits the full value to every listener whose path overlaps `changed`
    pub fn notify(&self, changed: &[String], tree: &DataTree) {
        for reg in self.entries.values() {
            if !overlaps(&reg.path, changed) {
                continue;
            }
            let value = tree.get(&reg.path).cloned().unwrap_or(Value::Null);
            (reg.listener)(StoreEvent::Changed(apply_query(value, reg.query)));
        }
    }

    /// Terminal failure: every listener gets the error once and is dropped
    pub fn cancel_all(&mut self, error: &StoreError) -> usize {
        let count = self.entries.len();
        for (_, reg) in self.entries.drain() {
            (reg.listener)(StoreEvent::Cancelled(error.clone()));
        }
        count
    }

    /// Same as `cancel_all`, restricted to listeners under `prefix`
    pub fn cancel_under(&mut self, prefix: &[String], error: &StoreError) -> usize {
        let ids: Vec<ListenerId> = self
            .entries
            .iter()
            .filter(|(_, reg)| reg.path.starts_with(prefix))
            .map(|(id, _)| *id)
            .collect();
        for id in &ids {
            if let Some(reg) = self.entries.remove(id) {
                (reg.listener)(StoreEvent::Cancelled(error.clone()));
            }
        }
        ids.len()
    }
}

/// Coerces a node into an object, discarding a scalar that sat in the way
fn object_mut(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("node was just replaced by an object"),
    }
}

fn overlaps(a: &[String], b: &[String]) -> bool {
    a.starts_with(b) || b.starts_with(a)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    fn path(p: &str) -> Vec<String> {
        split_path(p)
    }

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("/telemetry//42/"), vec!["telemetry", "42"]);
        assert!(split_path("").is_empty());
    }

    #[test]
    fn test_key_order_numeric_first() {
        let mut keys = vec!["10", "b", "2", "a", "1.5"];
        keys.sort_by(|a, b| compare_keys(a, b));
        assert_eq!(keys, vec!["1.5", "2", "10", "a", "b"]);
    }

    #[test]
    fn test_limit_to_last_uses_key_order() {
        let value = json!({"1": 1, "10": 10, "2": 2, "9": 9});
        let limited = apply_query(value, Query::LimitToLast(2));
        let keys: Vec<_> = limited.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&"9".to_string()));
        assert!(keys.contains(&"10".to_string()));
    }

    #[test]
    fn test_tree_set_get_delete() {
        let mut tree = DataTree::default();
        tree.set(&path("actuators/2"), json!(1));
        assert_eq!(tree.get(&path("actuators")), Some(&json!({"2": 1})));
        tree.set(&path("actuators/2"), Value::Null);
        assert_eq!(tree.get(&path("actuators")), Some(&json!({})));
        assert_eq!(tree.get(&path("actuators/2")), None);
    }

    #[test]
    fn test_tree_merge() {
        let mut tree = DataTree::default();
        tree.set(&path("schedule"), json!({"command": "start", "status": "running"}));
        let mut fields = Map::new();
        fields.insert("command".into(), json!("pause"));
        let merged = tree.merged(&path("schedule"), fields);
        assert_eq!(merged, json!({"command": "pause", "status": "running"}));
    }

    #[test]
    fn test_notify_only_overlapping_listeners() {
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let mut table = ListenerTable::default();
        for p in ["telemetry", "actuators", "actuators/3"] {
            let seen = seen.clone();
            let tag = p.to_string();
            table.insert(path(p), Query::All, Arc::new(move |_| seen.lock().push(tag.clone())));
        }

        let mut tree = DataTree::default();
        tree.set(&path("actuators/3"), json!(1));
        table.notify(&path("actuators/3"), &tree);

        let mut got = seen.lock().clone();
        got.sort();
        assert_eq!(got, vec!["actuators", "actuators/3"]);
    }

    #[test]
    fn test_cancel_all_drains_table() {
        let cancelled = Arc::new(Mutex::new(0));
        let mut table = ListenerTable::default();
        let c = cancelled.clone();
        table.insert(path("telemetry"), Query::All, Arc::new(move |ev| {
            if matches!(ev, StoreEvent::Cancelled(_)) {
                *c.lock() += 1;
            }
        }));
        assert_eq!(table.cancel_all(&StoreError::Cancelled("boom".into())), 1);
        assert_eq!(table.len(), 0);
        assert_eq!(*cancelled.lock(), 1);
    }
}
