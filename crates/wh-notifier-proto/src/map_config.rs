//! `MapConfig` — an immutable snapshot of one map's configuration.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashSet;

/// Immutable configuration for one tracked map.
///
/// Created from a control-plane response or from environment fallback.
/// Never mutated in place: a config change is a wholesale replacement
/// keyed by `slug`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapConfig {
    /// Stable unique identifier for this map.
    pub slug: String,
    /// Opaque identifier assigned by the map service.
    pub map_id: String,
    /// Bearer token used for control-plane and SSE authentication.
    pub api_token: String,
    /// Event-type names this map wants; `None` means "all default events".
    pub event_filter: Option<HashSet<String>>,
    pub created_at: DateTime<Utc>,
}

impl MapConfig {
    /// Whether `event_type` should be delivered to this map's SSE client,
    /// per the default-events-unless-filtered rule (invariant 12).
    pub fn accepts_event(&self, event_type: &str) -> bool {
        match &self.event_filter {
            None => true,
            Some(filter) if filter.is_empty() => true,
            Some(filter) => filter.contains(event_type),
        }
    }

    /// Render `event_filter` as the comma-separated query value the SSE
    /// endpoint expects, or the default set when unset/empty.
    pub fn events_query_value(&self) -> String {
        match &self.event_filter {
            Some(filter) if !filter.is_empty() => {
                let mut names: Vec<&str> = filter.iter().map(String::as_str).collect();
                names.sort_unstable();
                names.join(",")
            }
            _ => DEFAULT_EVENT_SET.join(","),
        }
    }
}

/// Default subscribed event set per the SSE endpoint contract.
pub const DEFAULT_EVENT_SET: &[&str] = &[
    "add_system",
    "deleted_system",
    "system_metadata_changed",
    "character_added",
    "character_removed",
    "character_updated",
    "rally_point_added",
    "rally_point_removed",
];

/// Shape of one entry in the control-plane `{"data": {"maps": [...]}}` response.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMapEntry {
    pub slug: Option<String>,
    pub map_id: Option<String>,
    pub api_token: Option<String>,
    #[serde(default)]
    pub event_filter: Option<Vec<String>>,
}

/// Reasons a `RawMapEntry` failed to become a `MapConfig`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MapConfigError {
    #[error("missing slug")]
    MissingSlug,
    #[error("missing map_id")]
    MissingMapId,
    #[error("missing api_token")]
    MissingApiToken,
}

impl RawMapEntry {
    /// Validate and convert into a `MapConfig`, stamping `created_at` with `now`.
    ///
    /// Entries that fail validation are skipped by the caller (the Registry
    /// logs and continues rather than aborting the whole refresh).
    pub fn into_config(self, now: DateTime<Utc>) -> Result<MapConfig, MapConfigError> {
        let slug = self.slug.filter(|s| !s.is_empty()).ok_or(MapConfigError::MissingSlug)?;
        let map_id = self.map_id.filter(|s| !s.is_empty()).ok_or(MapConfigError::MissingMapId)?;
        let api_token = self
            .api_token
            .filter(|s| !s.is_empty())
            .ok_or(MapConfigError::MissingApiToken)?;
        let event_filter = self.event_filter.map(|v| v.into_iter().collect::<HashSet<_>>());

        Ok(MapConfig {
            slug,
            map_id,
            api_token,
            event_filter,
            created_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(slug: &str, map_id: &str, token: &str) -> RawMapEntry {
        RawMapEntry {
            slug: Some(slug.to_string()),
            map_id: Some(map_id.to_string()),
            api_token: Some(token.to_string()),
            event_filter: None,
        }
    }

    #[test]
    fn missing_slug_is_rejected() {
        let mut entry = raw("a", "1", "tok");
        entry.slug = None;
        assert_eq!(entry.into_config(Utc::now()), Err(MapConfigError::MissingSlug));
    }

    #[test]
    fn empty_filter_accepts_all_default_events() {
        let cfg = raw("a", "1", "tok").into_config(Utc::now()).unwrap();
        assert!(cfg.accepts_event("add_system"));
        assert!(cfg.accepts_event("anything"));
    }

    #[test]
    fn non_empty_filter_overrides_default_set() {
        let mut entry = raw("a", "1", "tok");
        entry.event_filter = Some(vec!["add_system".to_string()]);
        let cfg = entry.into_config(Utc::now()).unwrap();
        assert!(cfg.accepts_event("add_system"));
        assert!(!cfg.accepts_event("character_added"));
    }
}
