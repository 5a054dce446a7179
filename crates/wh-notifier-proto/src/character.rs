//! `Character` — stable identity of a tracked pilot.

use serde::Deserialize;

/// A tracked pilot as reported by the map service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Character {
    pub character_id: String,
    pub name: String,
    #[serde(default)]
    pub corporation_id: Option<String>,
    #[serde(default)]
    pub corporation_ticker: Option<String>,
    #[serde(default)]
    pub alliance_id: Option<String>,
    #[serde(default)]
    pub alliance_ticker: Option<String>,
    #[serde(default)]
    pub tracked: bool,
}

/// Raw, not-yet-validated shape of a character payload (fields optional so
/// missing-required-field validation can report exactly what's absent).
#[derive(Debug, Clone, Deserialize)]
pub struct RawCharacter {
    pub character_id: Option<serde_json::Value>,
    pub name: Option<String>,
    #[serde(default)]
    pub corporation_id: Option<serde_json::Value>,
    #[serde(default)]
    pub corporation_ticker: Option<String>,
    #[serde(default)]
    pub alliance_id: Option<serde_json::Value>,
    #[serde(default)]
    pub alliance_ticker: Option<String>,
    #[serde(default)]
    pub tracked: Option<bool>,
}

fn stringify_id(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl RawCharacter {
    /// Validate required fields (`character_id`, `name`) and parse integer
    /// fields once, per the Character validation rule.
    pub fn into_character(self) -> Result<Character, Vec<&'static str>> {
        let mut missing = Vec::new();

        let character_id = self.character_id.as_ref().and_then(stringify_id);
        if character_id.is_none() {
            missing.push("character_id");
        }
        let name = self.name.filter(|n| !n.is_empty());
        if name.is_none() {
            missing.push("name");
        }

        if !missing.is_empty() {
            return Err(missing);
        }

        Ok(Character {
            character_id: character_id.unwrap(),
            name: name.unwrap(),
            corporation_id: self.corporation_id.as_ref().and_then(stringify_id),
            corporation_ticker: self.corporation_ticker,
            alliance_id: self.alliance_id.as_ref().and_then(stringify_id),
            alliance_ticker: self.alliance_ticker,
            tracked: self.tracked.unwrap_or(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn requires_character_id_and_name() {
        let raw = RawCharacter {
            character_id: None,
            name: None,
            corporation_id: None,
            corporation_ticker: None,
            alliance_id: None,
            alliance_ticker: None,
            tracked: None,
        };
        let err = raw.into_character().unwrap_err();
        assert_eq!(err, vec!["character_id", "name"]);
    }

    #[test]
    fn numeric_ids_are_stringified_once() {
        let raw = RawCharacter {
            character_id: Some(json!(123456)),
            name: Some("Some Pilot".to_string()),
            corporation_id: Some(json!(987)),
            corporation_ticker: Some("ABC".to_string()),
            alliance_id: None,
            alliance_ticker: None,
            tracked: Some(true),
        };
        let c = raw.into_character().unwrap();
        assert_eq!(c.character_id, "123456");
        assert_eq!(c.corporation_id.as_deref(), Some("987"));
        assert!(c.tracked);
    }
}
