//! MQTT-backed remote store
//!
//! Logical path `a/b/c` lives on retained topic `{prefix}/a/b/c` and carries
//! one JSON value (an empty payload deletes it). The event loop mirrors every
//! retained message into a local tree and re-emits full values to listeners.

use super::{split_path, DataTree, Listener, ListenerId, ListenerTable, Query, RemoteStore};
use crate::config::StoreConf;
use crate::error::{StoreError, StoreResult};
use crate::state::{new_state, Shared};
use futures::future::BoxFuture;
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS};
use serde_json::{Map, Value};
use std::time::Duration;
use tokio::task::{self, JoinHandle};
use tracing::{debug, error, info, warn};

const RECONNECT_BACKOFF: Duration = Duration::from_secs(2);

#[derive(Default)]
struct Mirror {
    tree: DataTree,
    listeners: ListenerTable,
}

/// Store distant sur broker MQTT (topics retained)
#[derive(Clone)]
pub struct MqttStore {
    client: AsyncClient,
    prefix: String,
    mirror: Shared<Mirror>,
}

impl MqttStore {
    /// Builds the client and spawns the event loop. Must run inside a tokio runtime.
    pub fn connect(conf: &StoreConf) -> (Self, JoinHandle<()>) {
        let client_id = conf
            .client_id
            .clone()
            .unwrap_or_else(|| format!("aquamon-{}", uuid::Uuid::new_v4().simple()));
        let mut opts = MqttOptions::new(client_id, &conf.host, conf.port);
        opts.set_keep_alive(Duration::from_secs(conf.keep_alive_secs));
        opts.set_clean_session(true);

        let (client, eventloop) = AsyncClient::new(opts, 64);
        let store = Self {
            client,
            prefix: conf.topic_prefix.trim_matches('/').to_string(),
            mirror: new_state(Mirror::default()),
        };

        let handle = task::spawn(store.clone().run(eventloop));
        info!("[store] MQTT store connecting to {}:{} (prefix '{}')", conf.host, conf.port, store.prefix);
        (store, handle)
    }

    fn topic_for(&self, segments: &[String]) -> String {
        if self.prefix.is_empty() {
            segments.join("/")
        } else if segments.is_empty() {
            self.prefix.clone()
        } else {
            format!("{}/{}", self.prefix, segments.join("/"))
        }
    }

    fn path_of(&self, topic: &str) -> Option<Vec<String>> {
        if self.prefix.is_empty() {
            return Some(split_path(topic));
        }
        let rest = topic.strip_prefix(&self.prefix)?;
        if !rest.is_empty() && !rest.starts_with('/') {
            return None;
        }
        Some(split_path(rest))
    }

    async fn run(self, mut eventloop: EventLoop) {
        let filter = self.topic_for(&["#".to_string()]);
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("[store] connected, subscribing to {filter}");
                    // the request queue is drained by this very loop: never await here
                    if let Err(e) = self.client.try_subscribe(filter.as_str(), QoS::AtLeastOnce) {
                        error!("[store] subscribe {filter} failed: {e:?}");
                    }
                }
                Ok(Event::Incoming(Incoming::Publish(p))) => {
                    let Some(path) = self.path_of(&p.topic) else {
                        continue;
                    };
                    self.apply_incoming(&path, &p.payload);
                }
                Ok(_) => {}
                Err(e) => {
                    let reason = format!("{e}");
                    let cancelled = self.mirror.lock().listeners.cancel_all(&StoreError::Cancelled(reason.clone()));
                    error!("[store] MQTT error: {reason} ({cancelled} listeners closed)");
                    tokio::time::sleep(RECONNECT_BACKOFF).await;
                }
            }
        }
    }

    fn apply_incoming(&self, path: &[String], payload: &[u8]) {
        let value = decode_payload(payload);
        debug!("[store] push on {} ({} bytes)", path.join("/"), payload.len());
        let mut mirror = self.mirror.lock();
        mirror.tree.set(path, value);
        mirror.listeners.notify(path, &mirror.tree);
    }

    async fn publish(&self, segments: &[String], value: &Value) -> StoreResult<()> {
        let topic = self.topic_for(segments);
        let payload = if value.is_null() {
            Vec::new()
        } else {
            serde_json::to_vec(value).map_err(|e| StoreError::Write {
                path: segments.join("/"),
                reason: e.to_string(),
            })?
        };
        self.client
            .publish(topic.as_str(), QoS::AtLeastOnce, true, payload)
            .await
            .map_err(|e| {
                // the request queue only fails once the event loop is gone
                warn!("[store] publish to {topic} failed: {e:?}");
                StoreError::Unavailable(format!("{topic}: {e}"))
            })
    }
}

/// JSON when it parses, a plain string otherwise, `Null` for an empty payload
fn decode_payload(payload: &[u8]) -> Value {
    if payload.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(payload)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(payload).trim().to_string()))
}

impl RemoteStore for MqttStore {
    fn add_listener(&self, path: &str, query: Query, listener: Listener) -> ListenerId {
        let mut mirror = self.mirror.lock();
        let id = mirror.listeners.insert(split_path(path), query, listener);
        mirror.listeners.prime(id, &mirror.tree);
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        self.mirror.lock().listeners.remove(id);
    }

    fn set(&self, path: &str, value: Value) -> BoxFuture<'_, StoreResult<()>> {
        let segments = split_path(path);
        Box::pin(async move { self.publish(&segments, &value).await })
    }

    fn update(&self, path: &str, fields: Map<String, Value>) -> BoxFuture<'_, StoreResult<()>> {
        let segments = split_path(path);
        let merged = self.mirror.lock().tree.merged(&segments, fields);
        Box::pin(async move { self.publish(&segments, &merged).await })
    }
}
