//! SSE Supervisor: one SSE client per live `MapConfig`.
//!
//! Subscribes to the Registry's `maps_updated` broadcast; starts a client
//! for each newly added slug, stops the corresponding client on removal,
//! and restarts a client that exits unexpectedly, with a capped restart
//! intensity so a client that fails to start repeatedly is reported
//! unhealthy instead of hot-looping.

use crate::processor::EventProcessor;
use crate::registry::MapRegistry;
use crate::sse::client::{self, SseClientHandle};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use wh_notifier_proto::MapConfig;

const MAX_RESTARTS: u32 = 10;

struct Child {
    handle: Arc<SseClientHandle>,
    monitor: JoinHandle<()>,
}

pub struct SseSupervisor {
    base_url: String,
    registry: Arc<MapRegistry>,
    processor: Arc<EventProcessor>,
    children: DashMap<String, Child>,
    shutting_down: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl SseSupervisor {
    pub fn new(base_url: String, registry: Arc<MapRegistry>, processor: Arc<EventProcessor>, shutdown_tx: broadcast::Sender<()>) -> Self {
        Self {
            base_url,
            registry,
            processor,
            children: DashMap::new(),
            shutting_down: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    /// Whether at least one managed client currently reports `connected`,
    /// or no maps are configured yet (startup gate not yet reached is not
    /// itself unhealthy).
    pub fn any_connected(&self) -> bool {
        self.children.is_empty() || self.children.iter().any(|c| c.handle.is_connected())
    }

    /// Run the supervisor. The caller MUST only invoke this after the
    /// initial bulk data load (systems + characters per map) has completed,
    /// so the first events on each stream do not race spurious "new entity"
    /// notifications for entities loaded from the initial snapshot.
    pub async fn run(self: Arc<Self>) {
        for map in self.registry.all_maps() {
            self.clone().start_child(map);
        }

        let mut updates = self.registry.subscribe();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                update = updates.recv() => {
                    match update {
                        Ok(update) => {
                            for slug in update.added {
                                if let Some(config) = self.registry.get_map(&slug) {
                                    self.clone().start_child(config);
                                }
                            }
                            for slug in update.removed {
                                self.stop_child(&slug);
                                self.processor.purge_map(&slug);
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(skipped = n, "supervisor lagged behind maps_updated broadcast");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                _ = shutdown_rx.recv() => {
                    self.shutting_down.store(true, Ordering::Release);
                    break;
                }
            }
        }
    }

    fn start_child(self: Arc<Self>, map_config: MapConfig) {
        if self.children.contains_key(&map_config.slug) {
            return;
        }
        let restarts = Arc::new(AtomicU32::new(0));
        self.spawn_monitored(map_config, restarts);
    }

    fn spawn_monitored(self: Arc<Self>, map_config: MapConfig, restarts: Arc<AtomicU32>) {
        let slug = map_config.slug.clone();
        let (handle, join) = client::spawn(
            self.base_url.clone(),
            map_config.clone(),
            self.processor.clone(),
            self.shutdown_tx.subscribe(),
        );

        let supervisor = self.clone();
        let monitor_handle = handle.clone();
        let monitor = tokio::spawn(async move {
            let _ = join.await;
            if supervisor.shutting_down.load(Ordering::Acquire) {
                return;
            }
            supervisor.children.remove(&slug);

            let attempt = restarts.fetch_add(1, Ordering::AcqRel) + 1;
            if attempt > MAX_RESTARTS {
                tracing::error!(slug = %slug, attempts = attempt, "SSE client exceeded restart intensity, giving up");
                return;
            }
            tracing::warn!(slug = %slug, attempts = attempt, "SSE client exited unexpectedly, restarting");
            if let Some(config) = supervisor.registry.get_map(&slug) {
                supervisor.clone().spawn_monitored(config, restarts);
            }
        });
        drop(monitor_handle);

        self.children.insert(map_config.slug, Child { handle, monitor });
    }

    fn stop_child(&self, slug: &str) {
        if let Some((_, child)) = self.children.remove(slug) {
            child.monitor.abort();
        }
    }
}
