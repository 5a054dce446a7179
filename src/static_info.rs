//! Static-info enrichment: one best-effort HTTP fetch per system, merging
//! class/effect/static-exit metadata into the cached `System` record.
//!
//! Shares the reconnect backoff formula (`sse::backoff`) for transient
//! failures, bounded to a small number of attempts: static info is
//! enrichment, not mandatory for a notification to fire.

use crate::error::SseError;
use crate::sse::backoff::{BackoffConfig, compute_delay};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::time::Duration;
use wh_notifier_proto::{StaticDetail, SystemPatch};

const MAX_ATTEMPTS: u32 = 3;

/// Per-system static-info enrichment, injected so the Processor's merge
/// path is testable without a real map-service backend.
#[async_trait]
pub trait StaticInfoSource: Send + Sync {
    async fn fetch(&self, solar_system_id: &str) -> Result<SystemPatch, SseError>;
}

/// No enrichment: used when a map's static-info endpoint is unavailable or
/// in tests that don't exercise this path.
pub struct NoopStaticInfoSource;

#[async_trait]
impl StaticInfoSource for NoopStaticInfoSource {
    async fn fetch(&self, _solar_system_id: &str) -> Result<SystemPatch, SseError> {
        Ok(SystemPatch::default())
    }
}

fn flexible_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[derive(Debug, Deserialize)]
struct StaticInfoResponse {
    data: StaticInfoData,
}

#[derive(Debug, Default, Deserialize)]
struct RawDestination {
    #[serde(default, deserialize_with = "flexible_string")]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    short_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawProperties {
    #[serde(default)]
    lifetime: Option<String>,
    #[serde(default)]
    max_jump_mass: Option<i64>,
    #[serde(default)]
    max_mass: Option<i64>,
    #[serde(default)]
    mass_regeneration: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawStaticDetail {
    name: String,
    #[serde(default)]
    destination: Option<RawDestination>,
    #[serde(default)]
    properties: Option<RawProperties>,
}

impl From<RawStaticDetail> for StaticDetail {
    fn from(raw: RawStaticDetail) -> Self {
        let destination = raw.destination.unwrap_or_default();
        let properties = raw.properties.unwrap_or_default();
        StaticDetail {
            name: raw.name,
            destination_id: destination.id,
            destination_name: destination.name,
            destination_short_name: destination.short_name,
            lifetime: properties.lifetime,
            max_jump_mass: properties.max_jump_mass,
            max_mass: properties.max_mass,
            mass_regeneration: properties.mass_regeneration,
        }
    }
}

/// Mirrors the subset of `system-static-info`'s response this service
/// caches. `security`, `region_id`, `system_class`,
/// `triglavian_invasion_status`, and `type_description` are accepted by the
/// endpoint but have no counterpart in the cached `System` record, so they
/// are parsed and discarded.
#[derive(Debug, Deserialize)]
struct StaticInfoData {
    #[serde(default)]
    class_title: Option<String>,
    #[serde(default)]
    effect_name: Option<String>,
    #[serde(default)]
    is_shattered: Option<bool>,
    #[serde(default)]
    static_details: Option<Vec<RawStaticDetail>>,
    #[serde(default)]
    region_name: Option<String>,
    #[serde(default, deserialize_with = "flexible_string")]
    sun_type_id: Option<String>,
}

/// Fetches per-system static info from a map's `system-static-info`
/// endpoint and turns it into a `SystemPatch`.
pub struct StaticInfoClient {
    http: reqwest::Client,
    base_url: String,
}

impl StaticInfoClient {
    pub fn new(base_url: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent("wh-notifier/0.1")
            .build()
            .expect("failed to build static-info HTTP client");
        Self { http, base_url }
    }

    async fn fetch_once(&self, solar_system_id: &str) -> Result<SystemPatch, SseError> {
        let url = format!(
            "{}/api/common/system-static-info?id={solar_system_id}",
            self.base_url.trim_end_matches('/')
        );
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(SseError::UnexpectedStatus(response.status().as_u16()));
        }
        let body: StaticInfoResponse = response.json().await?;
        Ok(SystemPatch {
            name: None,
            original_name: None,
            system_type: None,
            class_title: body.data.class_title,
            effect_name: body.data.effect_name,
            is_shattered: body.data.is_shattered,
            region_name: body.data.region_name,
            static_details: body.data.static_details.map(|v| v.into_iter().map(StaticDetail::from).collect()),
            sun_type_id: body.data.sun_type_id,
        })
    }
}

#[async_trait]
impl StaticInfoSource for StaticInfoClient {
    /// Retries transient failures with the shared backoff formula up to
    /// `MAX_ATTEMPTS` times before giving up.
    async fn fetch(&self, solar_system_id: &str) -> Result<SystemPatch, SseError> {
        let backoff = BackoffConfig::default();
        let mut attempt = 0;
        loop {
            match self.fetch_once(solar_system_id).await {
                Ok(patch) => return Ok(patch),
                Err(err) if attempt + 1 >= MAX_ATTEMPTS => return Err(err),
                Err(err) => {
                    tracing::debug!(
                        solar_system_id,
                        error = %err,
                        attempt,
                        "static-info fetch failed, retrying"
                    );
                    tokio::time::sleep(compute_delay(&backoff, attempt)).await;
                    attempt += 1;
                }
            }
        }
    }
}
