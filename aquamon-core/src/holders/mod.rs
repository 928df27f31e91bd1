/**
 * CONSUMER STATE HOLDERS - État par surface (overview, monitoring, détail, contrôle)
 *
 * ROLE :
 * Each holder owns exactly one subscription and exposes `ViewState<T>`
 * (`data`, `is_loading`, `error`) to its presentation layer.
 *
 * STATE MACHINE (implemented once, in SubscribedView) :
 * - Loading -> Ready on the first value, Loading -> Error on failure
 * - refresh() -> Loading again, with a fresh subscription
 * - an error after data keeps the data and only sets `error`
 *   (full error view only when nothing ever arrived)
 *
 * LIFECYCLE :
 * One tokio task per subscription. refresh() and Drop abort it, which drops
 * the subscription and deregisters the store listener. A generation counter
 * keeps a torn-down subscription from writing into the state.
 */

pub mod control;
pub mod detail;
pub mod monitoring;
pub mod overview;

pub use control::ControlHolder;
pub use detail::DetailHolder;
pub use monitoring::MonitoringHolder;
pub use overview::OverviewHolder;

use crate::telemetry::Subscription;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct ViewState<T> {
    pub data: Option<T>,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl<T> ViewState<T> {
    pub fn loading() -> Self {
        Self {
            data: None,
            is_loading: true,
            error: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.data.is_some() && !self.is_loading
    }

    /// Full error view: failed before any data arrived
    pub fn is_error(&self) -> bool {
        self.data.is_none() && self.error.is_some()
    }

    /// Data still shown, with an error flag on top
    pub fn is_stale(&self) -> bool {
        self.data.is_some() && self.error.is_some()
    }
}

impl<T> Default for ViewState<T> {
    fn default() -> Self {
        Self::loading()
    }
}

type SubscribeFn<T> = Box<dyn Fn() -> Subscription<T> + Send + Sync>;

/// Vue abonnée générique, partagée par tous les holders
pub struct SubscribedView<T> {
    name: &'static str,
    tx: watch::Sender<ViewState<T>>,
    subscribe: SubscribeFn<T>,
    task: Mutex<Option<JoinHandle<()>>>,
    generation: Arc<AtomicU64>,
}

impl<T> SubscribedView<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Subscribes right away. Must be called inside a tokio runtime.
    pub fn new<F>(name: &'static str, subscribe: F) -> Self
    where
        F: Fn() -> Subscription<T> + Send + Sync + 'static,
    {
        let (tx, _) = watch::channel(ViewState::loading());
        let view = Self {
            name,
            tx,
            subscribe: Box::new(subscribe),
            task: Mutex::new(None),
            generation: Arc::new(AtomicU64::new(0)),
        };
        view.refresh();
        view
    }

    /// Tears down the current subscription and opens a new one
    pub fn refresh(&self) {
        // bump under the task lock so the newest generation owns the newest task
        let mut task = self.task.lock();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(old) = task.take() {
            old.abort();
        }

        self.tx.send_modify(|state| {
            state.is_loading = true;
            state.error = None;
        });

        let mut subscription = (self.subscribe)();
        let tx = self.tx.clone();
        let current = self.generation.clone();
        let name = self.name;
        *task = Some(tokio::spawn(async move {
            while let Some(item) = subscription.next().await {
                let applied = tx.send_if_modified(|state| {
                    if current.load(Ordering::SeqCst) != generation {
                        return false;
                    }
                    state.is_loading = false;
                    match item {
                        Ok(data) => {
                            state.data = Some(data);
                            state.error = None;
                        }
                        Err(e) => state.error = Some(e.to_string()),
                    }
                    true
                });
                if !applied {
                    break;
                }
            }
            debug!("[{name}] subscription {generation} closed");
        }));
    }

    pub fn state(&self) -> ViewState<T> {
        self.tx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<ViewState<T>> {
        self.tx.subscribe()
    }

    /// Local edit of the published state; `f` returns whether it changed anything
    pub fn modify<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut ViewState<T>) -> bool,
    {
        self.tx.send_if_modified(f)
    }
}

impl<T> Drop for SubscribedView<T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::telemetry::RemoteTelemetryClient;
    use serde_json::json;
    use std::time::Duration;

    async fn wait_for<T: Clone>(rx: &mut watch::Receiver<ViewState<T>>, pred: impl Fn(&ViewState<T>) -> bool) -> ViewState<T> {
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| pred(s)))
            .await
            .expect("timed out")
            .expect("view dropped")
            .clone()
    }

    fn schedule_view(store: &MemoryStore) -> SubscribedView<crate::models::ScheduleStatus> {
        let client = RemoteTelemetryClient::new(Arc::new(store.clone()));
        SubscribedView::new("test", move || client.subscribe_schedule_status())
    }

    #[tokio::test]
    async fn test_loading_until_first_value() {
        let store = MemoryStore::new();
        let view = schedule_view(&store);
        assert!(view.state().is_loading);

        let mut rx = view.watch();
        store.push("schedule", json!({"status": "running"}));
        let state = wait_for(&mut rx, |s| s.is_ready()).await;
        assert_eq!(state.data, Some(crate::models::ScheduleStatus::Running));
    }

    #[tokio::test]
    async fn test_error_without_data_is_full_error() {
        let store = MemoryStore::new();
        let view = schedule_view(&store);
        let mut rx = view.watch();
        store.cancel_listeners("network down");
        let state = wait_for(&mut rx, |s| s.error.is_some()).await;
        assert!(state.is_error());
        assert!(!state.is_loading);
    }

    #[tokio::test]
    async fn test_refresh_resubscribes_and_releases_listener() {
        let store = MemoryStore::new();
        let view = schedule_view(&store);
        let mut rx = view.watch();
        store.cancel_listeners("network down");
        wait_for(&mut rx, |s| s.error.is_some()).await;
        assert_eq!(store.listener_count(), 0);

        view.refresh();
        assert!(view.state().is_loading);
        assert_eq!(store.listener_count(), 1);
        store.push("schedule", json!({"status": "paused"}));
        let state = wait_for(&mut rx, |s| s.is_ready()).await;
        assert_eq!(state.error, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_refreshes_settle_on_one_subscription() {
        let store = MemoryStore::new();
        let view = Arc::new(schedule_view(&store));
        let mut rx = view.watch();

        let runtime = tokio::runtime::Handle::current();
        let refreshers: Vec<_> = (0..4)
            .map(|_| {
                let view = view.clone();
                let runtime = runtime.clone();
                std::thread::spawn(move || {
                    let _entered = runtime.enter();
                    for _ in 0..25 {
                        view.refresh();
                    }
                })
            })
            .collect();
        for handle in refreshers {
            handle.join().expect("refresh thread panicked");
        }

        store.push("schedule", json!({"status": "running"}));
        let state = wait_for(&mut rx, |s| s.is_ready()).await;
        assert_eq!(state.data, Some(crate::models::ScheduleStatus::Running));
        tokio::time::timeout(Duration::from_secs(2), async {
            while store.listener_count() != 1 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("stale subscriptions still registered");
    }

    #[tokio::test]
    async fn test_drop_aborts_subscription() {
        let store = MemoryStore::new();
        let view = schedule_view(&store);
        assert_eq!(store.listener_count(), 1);
        drop(view);
        tokio::time::timeout(Duration::from_secs(2), async {
            while store.listener_count() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("listener still registered");
    }
}
