//! Map Registry: the authoritative directory of configured maps, with
//! O(1) reverse indexes from system/character id to the set of interested
//! map slugs.

use crate::cache::DashMapExt;
use crate::error::RegistryError;
use dashmap::DashMap;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, broadcast};
use wh_notifier_proto::{MapConfig, RawMapEntry};

/// Whether configs currently come from the control plane or from the
/// environment legacy fallback. Latches to `Api` the first time a
/// control-plane response succeeds and never reverts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryMode {
    Api,
    Legacy,
}

/// Broadcast when the set of served maps changes.
#[derive(Debug, Clone)]
pub struct MapsUpdated {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ConfigResponse {
    data: ConfigResponseData,
}

#[derive(Debug, Deserialize)]
struct ConfigResponseData {
    maps: Vec<RawMapEntry>,
    version: i64,
}

pub struct MapRegistry {
    configs: DashMap<String, MapConfig>,
    system_index: DashMap<String, HashSet<String>>,
    character_index: DashMap<String, HashSet<String>>,
    version: AtomicI64,
    api_latched: AtomicBool,
    write_lock: Mutex<()>,
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    legacy: Option<crate::config::LegacyEnv>,
    update_tx: broadcast::Sender<MapsUpdated>,
}

impl MapRegistry {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        legacy: Option<crate::config::LegacyEnv>,
    ) -> (Self, broadcast::Receiver<MapsUpdated>) {
        let (update_tx, update_rx) = broadcast::channel(64);
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("wh-notifier/0.1")
            .build()
            .expect("failed to build control-plane HTTP client");

        let registry = Self {
            configs: DashMap::new(),
            system_index: DashMap::new(),
            character_index: DashMap::new(),
            version: AtomicI64::new(i64::MIN),
            api_latched: AtomicBool::new(false),
            write_lock: Mutex::new(()),
            http,
            base_url,
            api_key,
            legacy,
            update_tx,
        };
        (registry, update_rx)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MapsUpdated> {
        self.update_tx.subscribe()
    }

    pub fn mode(&self) -> RegistryMode {
        if self.api_latched.load(Ordering::Acquire) {
            RegistryMode::Api
        } else {
            RegistryMode::Legacy
        }
    }

    pub fn all_maps(&self) -> Vec<MapConfig> {
        self.configs.iter().map(|e| e.value().clone()).collect()
    }

    pub fn get_map(&self, slug: &str) -> Option<MapConfig> {
        self.configs.get_cloned(slug)
    }

    /// Insert or replace a single map's config directly, without going
    /// through a control-plane refresh cycle.
    pub fn register_map(&self, config: MapConfig) {
        self.configs.insert(config.slug.clone(), config);
    }

    pub fn maps_tracking_system(&self, system_id: &str) -> Vec<MapConfig> {
        self.slugs_for_index(&self.system_index, system_id)
    }

    pub fn maps_tracking_character(&self, character_id: &str) -> Vec<MapConfig> {
        self.slugs_for_index(&self.character_index, character_id)
    }

    fn slugs_for_index(&self, index: &DashMap<String, HashSet<String>>, key: &str) -> Vec<MapConfig> {
        let Some(slugs) = index.get(key) else {
            return Vec::new();
        };
        slugs.iter().filter_map(|slug| self.configs.get_cloned(slug)).collect()
    }

    /// Idempotent: inserting an already-present `(slug, system_id)` pair is a no-op.
    /// Dropped silently if `slug` is not a known config (a client may race removal).
    pub fn index_system(&self, slug: &str, system_id: &str) {
        if !self.configs.contains_key(slug) {
            return;
        }
        self.system_index.entry(system_id.to_string()).or_default().insert(slug.to_string());
    }

    pub fn deindex_system(&self, slug: &str, system_id: &str) {
        if let Some(mut slugs) = self.system_index.get_mut(system_id) {
            slugs.remove(slug);
        }
    }

    pub fn index_character(&self, slug: &str, character_id: &str) {
        if !self.configs.contains_key(slug) {
            return;
        }
        self.character_index
            .entry(character_id.to_string())
            .or_default()
            .insert(slug.to_string());
    }

    pub fn deindex_character(&self, slug: &str, character_id: &str) {
        if let Some(mut slugs) = self.character_index.get_mut(character_id) {
            slugs.remove(slug);
        }
    }

    /// Force-fetch control-plane configs and reconcile. See module docs for
    /// the reconciliation protocol.
    pub async fn refresh(&self) -> Result<(), RegistryError> {
        let _span = crate::telemetry::registry_refresh_span().entered();
        let _write_guard = self.write_lock.lock().await;

        match self.fetch_control_plane().await {
            Ok(response) => {
                if self.mode() == RegistryMode::Api && response.data.version == self.version.load(Ordering::Acquire) {
                    return Ok(());
                }
                self.reconcile(response.data).await;
                self.api_latched.store(true, Ordering::Release);
                Ok(())
            }
            Err(err) => {
                if self.mode() == RegistryMode::Api {
                    // Transient failure while already serving from the control
                    // plane: keep the existing configs.
                    tracing::warn!(error = %err, "control-plane refresh failed, keeping prior configs");
                    return Ok(());
                }
                self.fall_back_to_legacy()?;
                Err(err)
            }
        }
    }

    async fn fetch_control_plane(&self) -> Result<ConfigResponse, RegistryError> {
        let url = format!("{}/api/v1/notifier/config", self.base_url.trim_end_matches('/'));
        let mut request = self.http.get(&url).header("Accept", "application/json");
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        match response.status().as_u16() {
            200 => {
                let body: ConfigResponse = response.json().await.map_err(RegistryError::Transport)?;
                Ok(body)
            }
            404 => Err(RegistryError::EndpointNotFound),
            other => Err(RegistryError::UnexpectedStatus(other)),
        }
    }

    fn fall_back_to_legacy(&self) -> Result<(), RegistryError> {
        let Some(legacy) = &self.legacy else {
            return Err(RegistryError::NoLegacyConfig);
        };

        let config = MapConfig {
            slug: legacy.map_name.clone(),
            map_id: legacy.map_name.clone(),
            api_token: legacy.map_api_key.clone(),
            event_filter: None,
            created_at: chrono::Utc::now(),
        };
        if self.configs.insert(config.slug.clone(), config).is_none() {
            tracing::info!(slug = %legacy.map_name, "seeded legacy single-map configuration");
        }
        Ok(())
    }

    async fn reconcile(&self, data: ConfigResponseData) {
        let now = chrono::Utc::now();
        let mut new_configs = Vec::with_capacity(data.maps.len());
        for raw in data.maps {
            match raw.into_config(now) {
                Ok(config) => new_configs.push(config),
                Err(err) => tracing::warn!(error = %err, "skipping invalid map config entry"),
            }
        }

        let new_slugs: HashSet<String> = new_configs.iter().map(|c| c.slug.clone()).collect();
        let old_slugs: HashSet<String> = self.configs.iter().map(|e| e.key().clone()).collect();

        let added: Vec<String> = new_slugs.difference(&old_slugs).cloned().collect();
        let removed: Vec<String> = old_slugs.difference(&new_slugs).cloned().collect();

        for slug in &removed {
            self.configs.remove(slug);
            self.purge_index(&self.system_index, slug);
            self.purge_index(&self.character_index, slug);
        }

        for config in new_configs {
            self.configs.insert(config.slug.clone(), config);
        }

        self.version.store(data.version, Ordering::Release);

        if !added.is_empty() || !removed.is_empty() {
            let _ = self.update_tx.send(MapsUpdated { added, removed });
        }
    }

    fn purge_index(&self, index: &DashMap<String, HashSet<String>>, slug: &str) {
        index.retain(|_, slugs| {
            slugs.remove(slug);
            !slugs.is_empty()
        });
    }
}
