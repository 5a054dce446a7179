//! `System` — stable identity of a solar system, plus static-info enrichment.

use serde::Deserialize;

/// Topology class of a solar system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemType {
    Wormhole,
    Highsec,
    Lowsec,
    Nullsec,
    Pochven,
    Abyssal,
    #[serde(other)]
    Unknown,
}

impl Default for SystemType {
    fn default() -> Self {
        SystemType::Unknown
    }
}

/// One wormhole exit, part of a system's `static_details`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StaticDetail {
    pub name: String,
    pub destination_id: Option<String>,
    pub destination_name: Option<String>,
    pub destination_short_name: Option<String>,
    pub lifetime: Option<String>,
    pub max_jump_mass: Option<i64>,
    pub max_mass: Option<i64>,
    pub mass_regeneration: Option<i64>,
}

/// A tracked solar system.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct System {
    pub solar_system_id: String,
    pub name: String,
    pub original_name: Option<String>,
    pub system_type: SystemType,
    pub class_title: Option<String>,
    pub effect_name: Option<String>,
    pub is_shattered: bool,
    pub region_name: Option<String>,
    pub static_details: Vec<StaticDetail>,
    pub sun_type_id: Option<String>,
}

impl System {
    /// Merge `system_metadata_changed` fields (or static-info enrichment)
    /// into an existing cached entry, leaving absent fields untouched.
    pub fn merge(&mut self, patch: SystemPatch) {
        if let Some(v) = patch.name {
            self.name = v;
        }
        if let Some(v) = patch.original_name {
            self.original_name = Some(v);
        }
        if let Some(v) = patch.system_type {
            self.system_type = v;
        }
        if let Some(v) = patch.class_title {
            self.class_title = Some(v);
        }
        if let Some(v) = patch.effect_name {
            self.effect_name = Some(v);
        }
        if let Some(v) = patch.is_shattered {
            self.is_shattered = v;
        }
        if let Some(v) = patch.region_name {
            self.region_name = Some(v);
        }
        if let Some(v) = patch.static_details {
            self.static_details = v;
        }
        if let Some(v) = patch.sun_type_id {
            self.sun_type_id = Some(v);
        }
    }
}

/// A partial update to a cached `System`. Every field is optional; `None`
/// means "leave as-is", distinguishing this from a full replacement.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SystemPatch {
    pub name: Option<String>,
    pub original_name: Option<String>,
    pub system_type: Option<SystemType>,
    pub class_title: Option<String>,
    pub effect_name: Option<String>,
    pub is_shattered: Option<bool>,
    pub region_name: Option<String>,
    pub static_details: Option<Vec<StaticDetail>>,
    pub sun_type_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_leaves_absent_fields_untouched() {
        let mut sys = System {
            solar_system_id: "30000142".to_string(),
            name: "Jita".to_string(),
            region_name: Some("The Forge".to_string()),
            ..Default::default()
        };

        sys.merge(SystemPatch {
            is_shattered: Some(true),
            ..Default::default()
        });

        assert_eq!(sys.name, "Jita");
        assert_eq!(sys.region_name.as_deref(), Some("The Forge"));
        assert!(sys.is_shattered);
    }

    #[test]
    fn unknown_system_type_is_default() {
        let v: SystemType = serde_json::from_str("\"not-a-real-type\"").unwrap();
        assert_eq!(v, SystemType::Unknown);
    }
}
