//! S5 — a system tracked by two maps fans out to both configs via the
//! registry's reverse index.

use std::collections::HashSet;
use wh_notifier::registry::MapRegistry;
use wh_notifier_proto::MapConfig;

fn map_config(slug: &str) -> MapConfig {
    MapConfig {
        slug: slug.to_string(),
        map_id: format!("map-id-{slug}"),
        api_token: "tok".to_string(),
        event_filter: None,
        created_at: chrono::Utc::now(),
    }
}

#[test]
fn s5_fan_out_returns_all_tracking_maps() {
    let (registry, _rx) = MapRegistry::new("https://example.test".to_string(), None, None);
    registry.register_map(map_config("A"));
    registry.register_map(map_config("B"));

    registry.index_system("A", "30000142");
    registry.index_system("B", "30000142");

    let tracking = registry.maps_tracking_system("30000142");
    let slugs: HashSet<&str> = tracking.iter().map(|c| c.slug.as_str()).collect();

    assert_eq!(slugs, HashSet::from(["A", "B"]));
}
