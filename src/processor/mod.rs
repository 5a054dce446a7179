//! Event Processor: routes validated SSE events by type, maintains the
//! Registry's reverse indexes and per-map projections, and hands terminal
//! events to the Notification Coordinator.

use crate::error::ProcessorError;
use crate::notifier::NotificationCoordinator;
use crate::registry::MapRegistry;
use crate::static_info::StaticInfoSource;
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use wh_notifier_proto::{
    Character, MapConfig, RawCharacter, SseEvent, SseEventKind, StaticDetail, System, SystemPatch,
    SystemType, CONNECTED_EVENT_TYPE,
};

#[derive(Debug, Deserialize)]
struct SystemPayload {
    solar_system_id: Value,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    original_name: Option<String>,
    #[serde(default)]
    system_type: Option<SystemType>,
    #[serde(default)]
    class_title: Option<String>,
    #[serde(default)]
    effect_name: Option<String>,
    #[serde(default)]
    is_shattered: Option<bool>,
    #[serde(default)]
    region_name: Option<String>,
    #[serde(default)]
    static_details: Option<Vec<StaticDetail>>,
    #[serde(default)]
    sun_type_id: Option<String>,
}

impl SystemPayload {
    fn into_patch(self) -> SystemPatch {
        SystemPatch {
            name: self.name,
            original_name: self.original_name,
            system_type: self.system_type,
            class_title: self.class_title,
            effect_name: self.effect_name,
            is_shattered: self.is_shattered,
            region_name: self.region_name,
            static_details: self.static_details,
            sun_type_id: self.sun_type_id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct IdOnlyPayload {
    #[serde(alias = "solar_system_id", alias = "character_id")]
    id: Value,
}

fn stringify_id(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Routes validated events; owns per-map system/character projections and
/// per-stream duplicate-id detection.
pub struct EventProcessor {
    registry: Arc<MapRegistry>,
    coordinator: Arc<NotificationCoordinator>,
    static_info: Arc<dyn StaticInfoSource>,
    systems: DashMap<String, DashMap<String, System>>,
    characters: DashMap<String, DashMap<String, Character>>,
    last_seen_id: DashMap<String, String>,
}

impl EventProcessor {
    pub fn new(
        registry: Arc<MapRegistry>,
        coordinator: Arc<NotificationCoordinator>,
        static_info: Arc<dyn StaticInfoSource>,
    ) -> Self {
        Self {
            registry,
            coordinator,
            static_info,
            systems: DashMap::new(),
            characters: DashMap::new(),
            last_seen_id: DashMap::new(),
        }
    }

    pub async fn handle_event(
        &self,
        map_config: &MapConfig,
        event: SseEvent,
    ) -> Result<(), ProcessorError> {
        let _span = crate::telemetry::event_span(&map_config.slug, &event.map_id, &event.event_type).entered();

        if self.is_duplicate(&map_config.slug, &event.id) {
            tracing::debug!(slug = %map_config.slug, id = %event.id, "dropping duplicate event");
            return Ok(());
        }

        if event.event_type == CONNECTED_EVENT_TYPE {
            tracing::info!(slug = %map_config.slug, map_id = %event.map_id, "sse stream connected");
            return Ok(());
        }

        let payload = match &event.kind {
            SseEventKind::Data { payload, .. } => payload.clone(),
            SseEventKind::Connected { .. } => unreachable!("handled above"),
        };

        match event.event_type.as_str() {
            "add_system" => self.handle_add_system(&map_config.slug, payload).await,
            "deleted_system" => self.handle_deleted_system(&map_config.slug, payload),
            "system_metadata_changed" => self.handle_system_metadata_changed(&map_config.slug, payload),
            "character_added" => self.handle_character_added(&map_config.slug, payload).await,
            "character_removed" => self.handle_character_removed(&map_config.slug, payload),
            "character_updated" => self.handle_character_updated(&map_config.slug, payload),
            other => {
                tracing::debug!(event_type = other, "dropping unrecognized event type");
                Ok(())
            }
        }
    }

    /// Fan out a killmail occurring in `system_id` to every map tracking
    /// that system. Killmails arrive on a separate ingest path; this is
    /// the Processor's side of that fan-out.
    pub async fn handle_killmail(&self, system_id: &str, killmail_id: &str, system_name: &str) {
        crate::metrics::record_lifecycle("killmail_received");
        crate::metrics::record_lifecycle("killmail_processing_start");
        crate::metrics::record_kill_processed();

        let maps = self.registry.maps_tracking_system(system_id);
        if maps.is_empty() {
            crate::metrics::record_lifecycle("killmail_processing_skipped");
            crate::metrics::record_kill_skipped();
            crate::metrics::record_lifecycle("killmail_processing_complete");
            return;
        }

        let mut any_sent = false;
        let mut any_error = false;
        for map_config in maps {
            match self.coordinator.notify_kill(&map_config.slug, killmail_id, system_name).await {
                crate::notifier::NotificationOutcome::Sent => {
                    any_sent = true;
                    crate::metrics::record_kill_notified();
                }
                crate::notifier::NotificationOutcome::Skipped(_) => {
                    crate::metrics::record_kill_skipped();
                }
                crate::notifier::NotificationOutcome::Error(_) => {
                    any_error = true;
                    crate::metrics::record_kill_error();
                }
            }
        }

        if any_error {
            crate::metrics::record_lifecycle("killmail_processing_complete_error");
        } else if any_sent {
            crate::metrics::record_lifecycle("killmail_processing_complete_success");
        } else {
            crate::metrics::record_lifecycle("killmail_processing_skipped");
        }
        crate::metrics::record_lifecycle("killmail_processing_complete");
    }

    fn update_tracked_counts(&self) {
        let systems: i64 = self.systems.iter().map(|e| e.value().len() as i64).sum();
        let characters: i64 = self.characters.iter().map(|e| e.value().len() as i64).sum();
        crate::metrics::set_tracked_count(crate::metrics::TrackedKind::Systems, systems);
        crate::metrics::set_tracked_count(crate::metrics::TrackedKind::Characters, characters);
    }

    /// Drop a removed map's per-map caches: system/character projections and
    /// the last-seen-event-id dedup entry. Called by the Supervisor once it
    /// has torn down the map's SSE client.
    pub fn purge_map(&self, slug: &str) {
        self.systems.remove(slug);
        self.characters.remove(slug);
        self.last_seen_id.remove(slug);
        self.update_tracked_counts();
    }

    fn is_duplicate(&self, slug: &str, id: &str) -> bool {
        if self.last_seen_id.get(slug).is_some_and(|last| last.value() == id) {
            return true;
        }
        self.last_seen_id.insert(slug.to_string(), id.to_string());
        false
    }

    async fn handle_add_system(&self, slug: &str, payload: Value) -> Result<(), ProcessorError> {
        let raw: SystemPayload = serde_json::from_value(payload)
            .map_err(|_| ProcessorError::Validation(vec!["solar_system_id"]))?;
        let solar_system_id = stringify_id(&raw.solar_system_id)
            .ok_or(ProcessorError::Validation(vec!["solar_system_id"]))?;
        let name = raw.name.clone().unwrap_or_else(|| solar_system_id.clone());

        let system = System {
            solar_system_id: solar_system_id.clone(),
            name: name.clone(),
            ..Default::default()
        };
        let mut system = system;
        system.merge(raw.into_patch());

        self.systems
            .entry(slug.to_string())
            .or_default()
            .insert(solar_system_id.clone(), system);
        self.registry.index_system(slug, &solar_system_id);
        self.update_tracked_counts();

        self.coordinator.notify_system(slug, &name).await;
        self.enrich_static_info(slug, &solar_system_id).await;
        Ok(())
    }

    /// Best-effort: failures are logged and otherwise dropped, since static
    /// info enriches a system record but is never required for a
    /// notification to fire.
    async fn enrich_static_info(&self, slug: &str, solar_system_id: &str) {
        match self.static_info.fetch(solar_system_id).await {
            Ok(patch) => {
                if let Some(map) = self.systems.get(slug) {
                    if let Some(mut system) = map.get_mut(solar_system_id) {
                        system.merge(patch);
                    }
                }
            }
            Err(err) => {
                tracing::debug!(slug, solar_system_id, error = %err, "static-info enrichment failed");
            }
        }
    }

    fn handle_deleted_system(&self, slug: &str, payload: Value) -> Result<(), ProcessorError> {
        let raw: IdOnlyPayload = serde_json::from_value(payload)
            .map_err(|_| ProcessorError::Validation(vec!["solar_system_id"]))?;
        let solar_system_id =
            stringify_id(&raw.id).ok_or(ProcessorError::Validation(vec!["solar_system_id"]))?;

        if let Some(map) = self.systems.get(slug) {
            map.remove(&solar_system_id);
        }
        self.registry.deindex_system(slug, &solar_system_id);
        self.update_tracked_counts();
        Ok(())
    }

    fn handle_system_metadata_changed(&self, slug: &str, payload: Value) -> Result<(), ProcessorError> {
        let raw: SystemPayload = serde_json::from_value(payload)
            .map_err(|_| ProcessorError::Validation(vec!["solar_system_id"]))?;
        let solar_system_id = stringify_id(&raw.solar_system_id)
            .ok_or(ProcessorError::Validation(vec!["solar_system_id"]))?;

        if let Some(map) = self.systems.get(slug) {
            if let Some(mut system) = map.get_mut(&solar_system_id) {
                system.merge(raw.into_patch());
            }
        }
        Ok(())
    }

    async fn handle_character_added(&self, slug: &str, payload: Value) -> Result<(), ProcessorError> {
        let raw: RawCharacter = serde_json::from_value(payload)
            .map_err(|_| ProcessorError::Validation(vec!["character_id", "name"]))?;
        let character = raw.into_character().map_err(ProcessorError::Validation)?;

        let name = character.name.clone();
        let character_id = character.character_id.clone();
        self.characters.entry(slug.to_string()).or_default().insert(character_id.clone(), character);
        self.registry.index_character(slug, &character_id);
        self.update_tracked_counts();

        self.coordinator.notify_character(slug, &name).await;
        Ok(())
    }

    fn handle_character_removed(&self, slug: &str, payload: Value) -> Result<(), ProcessorError> {
        let raw: IdOnlyPayload = serde_json::from_value(payload)
            .map_err(|_| ProcessorError::Validation(vec!["character_id"]))?;
        let character_id =
            stringify_id(&raw.id).ok_or(ProcessorError::Validation(vec!["character_id"]))?;

        if let Some(map) = self.characters.get(slug) {
            map.remove(&character_id);
        }
        self.registry.deindex_character(slug, &character_id);
        self.update_tracked_counts();
        Ok(())
    }

    fn handle_character_updated(&self, slug: &str, payload: Value) -> Result<(), ProcessorError> {
        let raw: RawCharacter = serde_json::from_value(payload)
            .map_err(|_| ProcessorError::Validation(vec!["character_id", "name"]))?;
        let character = raw.into_character().map_err(ProcessorError::Validation)?;

        self.characters
            .entry(slug.to_string())
            .or_default()
            .insert(character.character_id.clone(), character);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::persistent::InMemoryPersistentValues;
    use crate::transport::voice::NoopVoiceParticipantsSource;
    use crate::transport::ChatPayload;
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;
    use std::time::Duration;

    struct NullTransport;

    #[async_trait]
    impl crate::transport::ChatTransport for NullTransport {
        async fn send_message(&self, _payload: ChatPayload) -> Result<(), crate::error::NotifierError> {
            Ok(())
        }
    }

    fn processor() -> EventProcessor {
        let (registry, _rx) = MapRegistry::new("https://example.test".to_string(), Some("tok".to_string()), None);
        registry.register_map(map_config("map-1"));
        let registry = Arc::new(registry);
        let coordinator = Arc::new(NotificationCoordinator::new(
            crate::config::NotificationsConfig::default(),
            Arc::new(NullTransport),
            Arc::new(InMemoryPersistentValues::default()),
            Arc::new(NoopVoiceParticipantsSource),
            5,
            Duration::from_secs(60),
        ));
        EventProcessor::new(registry, coordinator, Arc::new(crate::static_info::NoopStaticInfoSource))
    }

    fn map_config(slug: &str) -> MapConfig {
        MapConfig {
            slug: slug.to_string(),
            map_id: "M".to_string(),
            api_token: "tok".to_string(),
            event_filter: None,
            created_at: Utc::now(),
        }
    }

    fn data_event(id: &str, event_type: &str, payload: Value) -> SseEvent {
        SseEvent {
            id: id.to_string(),
            event_type: event_type.to_string(),
            map_id: "M".to_string(),
            kind: SseEventKind::Data {
                timestamp: "2024-01-01T00:00:00Z".to_string(),
                payload,
            },
        }
    }

    #[tokio::test]
    async fn add_system_indexes_and_caches() {
        let proc = processor();
        let config = map_config("map-1");
        let event = data_event(
            "e1",
            "add_system",
            json!({"solar_system_id": 30000142, "name": "Jita"}),
        );
        proc.handle_event(&config, event).await.unwrap();

        assert!(proc.registry.maps_tracking_system("30000142").iter().any(|c| c.slug == "map-1"));
        assert!(proc.systems.get("map-1").unwrap().contains_key("30000142"));
    }

    #[tokio::test]
    async fn duplicate_event_id_is_dropped() {
        let proc = processor();
        let config = map_config("map-1");
        let payload = json!({"solar_system_id": 30000142, "name": "Jita"});

        proc.handle_event(&config, data_event("dup", "add_system", payload.clone())).await.unwrap();
        proc.handle_event(&config, data_event("dup", "deleted_system", payload)).await.unwrap();

        // second event (same id) was dropped before routing, so the system
        // inserted by the first event is still present.
        assert!(proc.systems.get("map-1").unwrap().contains_key("30000142"));
    }

    #[tokio::test]
    async fn deleted_system_removes_from_cache_and_index() {
        let proc = processor();
        let config = map_config("map-1");
        proc.handle_event(
            &config,
            data_event("e1", "add_system", json!({"solar_system_id": 30000142, "name": "Jita"})),
        )
        .await
        .unwrap();
        proc.handle_event(
            &config,
            data_event("e2", "deleted_system", json!({"solar_system_id": 30000142})),
        )
        .await
        .unwrap();

        assert!(!proc.systems.get("map-1").unwrap().contains_key("30000142"));
        assert!(proc.registry.maps_tracking_system("30000142").is_empty());
    }

    #[tokio::test]
    async fn purge_map_drops_all_per_map_caches() {
        let proc = processor();
        let config = map_config("map-1");
        proc.handle_event(
            &config,
            data_event("e1", "add_system", json!({"solar_system_id": 30000142, "name": "Jita"})),
        )
        .await
        .unwrap();

        proc.purge_map("map-1");

        assert!(proc.systems.get("map-1").is_none());
        assert!(proc.characters.get("map-1").is_none());
        assert!(proc.last_seen_id.get("map-1").is_none());
    }

    #[tokio::test]
    async fn connected_event_is_a_logging_no_op() {
        let proc = processor();
        let config = map_config("map-1");
        let event = SseEvent {
            id: "c1".to_string(),
            event_type: CONNECTED_EVENT_TYPE.to_string(),
            map_id: "M".to_string(),
            kind: SseEventKind::Connected { server_time: "2024-01-01T00:00:00Z".to_string() },
        };
        assert!(proc.handle_event(&config, event).await.is_ok());
    }

    #[tokio::test]
    async fn handle_killmail_fans_out_and_records_kill_metrics() {
        let proc = processor();
        let config = map_config("map-1");
        proc.handle_event(
            &config,
            data_event("e1", "add_system", json!({"solar_system_id": 30000142, "name": "Jita"})),
        )
        .await
        .unwrap();

        let before = crate::metrics::get_stats();
        proc.handle_killmail("30000142", "k-1", "Jita").await;
        let after = crate::metrics::get_stats();

        assert_eq!(after.kills_processed, before.kills_processed + 1);
        assert_eq!(after.kills_notified, before.kills_notified + 1);
    }

    #[tokio::test]
    async fn unknown_event_type_is_dropped() {
        let proc = processor();
        let config = map_config("map-1");
        let event = data_event("e1", "rally_point_added", json!({}));
        assert!(proc.handle_event(&config, event).await.is_ok());
    }
}
