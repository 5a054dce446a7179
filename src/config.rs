//! Configuration loading and management.

use crate::error::{ConfigError, ConfigValidationError};
use serde::Deserialize;
use std::collections::HashSet;

/// Top-level configuration, loaded from a single TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub maps: MapsConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Output log format, selectable independently of the `RUST_LOG` filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

impl Default for LogFormat {
    fn default() -> Self {
        LogFormat::Pretty
    }
}

/// Process identity and logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Instance name, used only in the startup banner and health payload.
    pub name: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Control-plane / legacy map configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MapsConfig {
    /// Base URL of the map service, e.g. `https://example-map.example`.
    pub base_url: String,
    /// Bearer token for the control-plane config endpoint.
    pub api_key: Option<String>,
    /// Legacy single-map slug, used only when the control plane is unreachable
    /// and no prior `api` mode has been latched.
    pub legacy_map_name: Option<String>,
    /// Legacy single-map API token.
    pub legacy_api_token: Option<String>,
    /// Poll interval for the control-plane config refresh, in seconds.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
}

fn default_refresh_interval_secs() -> u64 {
    300
}

/// Notification decision and mention-composition configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_true")]
    pub system_notifications_enabled: bool,
    #[serde(default = "default_true")]
    pub character_notifications_enabled: bool,
    #[serde(default = "default_true")]
    pub kill_notifications_enabled: bool,
    #[serde(default)]
    pub priority_only_mode: bool,
    #[serde(default)]
    pub priority_systems: HashSet<String>,
    #[serde(default)]
    pub voice_participant_notifications: bool,
    #[serde(default = "default_true")]
    pub fallback_to_here: bool,
    #[serde(default = "default_dedup_ttl_secs")]
    pub dedup_ttl_secs: u64,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            system_notifications_enabled: true,
            character_notifications_enabled: true,
            kill_notifications_enabled: true,
            priority_only_mode: false,
            priority_systems: HashSet::new(),
            voice_participant_notifications: false,
            fallback_to_here: true,
            dedup_ttl_secs: default_dedup_ttl_secs(),
        }
    }
}

fn default_dedup_ttl_secs() -> u64 {
    24 * 3600
}

impl NotificationsConfig {
    /// Overlay the legacy environment-variable flags onto a config loaded
    /// from TOML. Only meaningful while the Registry has never latched to
    /// `api` mode; callers should gate this on `RegistryMode::Legacy`.
    pub fn apply_legacy(&mut self, legacy: &LegacyEnv) {
        self.priority_only_mode = legacy.priority_systems_only;
        self.voice_participant_notifications = legacy.voice_participant_notifications;
        self.fallback_to_here = legacy.fallback_to_here;
    }
}

fn default_true() -> bool {
    true
}

/// Outbound chat transport configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    /// Webhook URL the chat transport posts to. Required for non-test use;
    /// absence is treated like the daemon's insecure-secret guard: a fatal
    /// refusal to start rather than a silent no-op transport.
    pub webhook_url: Option<String>,
    #[serde(default = "default_dispatch_timeout_secs")]
    pub dispatch_timeout_secs: u64,
    #[serde(default = "default_circuit_failure_threshold")]
    pub circuit_failure_threshold: u32,
    #[serde(default = "default_circuit_cooldown_secs")]
    pub circuit_cooldown_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            dispatch_timeout_secs: default_dispatch_timeout_secs(),
            circuit_failure_threshold: default_circuit_failure_threshold(),
            circuit_cooldown_secs: default_circuit_cooldown_secs(),
        }
    }
}

fn default_dispatch_timeout_secs() -> u64 {
    30
}

fn default_circuit_failure_threshold() -> u32 {
    5
}

fn default_circuit_cooldown_secs() -> u64 {
    60
}

/// Prometheus metrics HTTP surface configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Port serving `/metrics` and `/healthz`. `0` disables the HTTP surface
    /// (used by tests), matching the convention for this service family.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

fn default_metrics_port() -> u16 {
    9090
}

/// Cache sizing/eviction configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_max_cache_entries")]
    pub max_entries_per_map: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries_per_map: default_max_cache_entries(),
        }
    }
}

fn default_max_cache_entries() -> usize {
    50_000
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Validate a loaded configuration, collecting every failure rather than
/// stopping at the first.
pub fn validate(config: &Config) -> Result<(), Vec<ConfigValidationError>> {
    let mut errors = Vec::new();

    if config.server.name.trim().is_empty() {
        errors.push(ConfigValidationError {
            field: "server.name".to_string(),
            message: "must not be empty".to_string(),
        });
    }

    if config.maps.base_url.trim().is_empty() {
        errors.push(ConfigValidationError {
            field: "maps.base_url".to_string(),
            message: "must not be empty".to_string(),
        });
    }

    if config.maps.api_key.is_none()
        && (config.maps.legacy_map_name.is_none() || config.maps.legacy_api_token.is_none())
    {
        errors.push(ConfigValidationError {
            field: "maps".to_string(),
            message: "either maps.api_key or both legacy_map_name and legacy_api_token must be set"
                .to_string(),
        });
    }

    if config.transport.webhook_url.is_none() {
        errors.push(ConfigValidationError {
            field: "transport.webhook_url".to_string(),
            message: "must be set; refusing to start with a no-op chat transport".to_string(),
        });
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Environment-variable legacy fallback, consulted only when the control
/// plane has never produced a response (Registry mode has never been `api`).
#[derive(Debug, Clone)]
pub struct LegacyEnv {
    pub map_url: String,
    pub map_name: String,
    pub map_api_key: String,
    pub priority_systems_only: bool,
    pub voice_participant_notifications: bool,
    pub fallback_to_here: bool,
}

impl LegacyEnv {
    pub fn from_environment() -> Option<Self> {
        let map_url = std::env::var("MAP_URL").ok()?;
        let map_name = std::env::var("MAP_NAME").unwrap_or_else(|_| "default".to_string());
        let map_api_key = std::env::var("MAP_API_KEY").ok()?;
        let priority_systems_only = env_flag("PRIORITY_SYSTEMS_ONLY");
        let voice_participant_notifications = env_flag("VOICE_PARTICIPANT_NOTIFICATIONS");
        let fallback_to_here = env_flag("FALLBACK_TO_HERE");

        Some(Self {
            map_url,
            map_name,
            map_api_key,
            priority_systems_only,
            voice_participant_notifications,
            fallback_to_here,
        })
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "yes"))
        .unwrap_or(false)
}

/// Resolve the configuration path from CLI arguments.
/// Supports `-c <path>`, `--config <path>`, or a bare path.
/// Falls back to `config.toml` when no argument is provided.
pub fn resolve_config_path() -> String {
    let mut args = std::env::args().skip(1);

    let raw_path = match args.next() {
        Some(flag) if flag == "-c" || flag == "--config" => args.next().unwrap_or_else(|| {
            eprintln!("Missing path after {flag}");
            std::process::exit(1);
        }),
        Some(path) => path,
        None => "config.toml".to_string(),
    };

    match std::fs::canonicalize(std::path::Path::new(&raw_path)) {
        Ok(p) => p.to_string_lossy().into_owned(),
        Err(_) => raw_path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            server: ServerConfig {
                name: "bridge-1".to_string(),
                log_format: LogFormat::Pretty,
            },
            maps: MapsConfig {
                base_url: "https://example.test".to_string(),
                api_key: Some("token".to_string()),
                legacy_map_name: None,
                legacy_api_token: None,
                refresh_interval_secs: 300,
            },
            notifications: NotificationsConfig::default(),
            transport: TransportConfig {
                webhook_url: Some("https://hooks.example.test/x".to_string()),
                ..TransportConfig::default()
            },
            metrics: MetricsConfig::default(),
            cache: CacheConfig::default(),
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(validate(&base_config()).is_ok());
    }

    #[test]
    fn missing_webhook_and_server_name_are_both_reported() {
        let mut config = base_config();
        config.server.name = "".to_string();
        config.transport.webhook_url = None;
        let errors = validate(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn apply_legacy_overlays_notification_flags() {
        let mut notifications = NotificationsConfig::default();
        let legacy = LegacyEnv {
            map_url: "https://example.test".to_string(),
            map_name: "default".to_string(),
            map_api_key: "key".to_string(),
            priority_systems_only: true,
            voice_participant_notifications: true,
            fallback_to_here: false,
        };
        notifications.apply_legacy(&legacy);
        assert!(notifications.priority_only_mode);
        assert!(notifications.voice_participant_notifications);
        assert!(!notifications.fallback_to_here);
    }

    #[test]
    fn legacy_env_requires_map_url_and_api_key() {
        // SAFETY: single-threaded test process; no concurrent env mutation.
        unsafe {
            std::env::remove_var("MAP_URL");
        }
        assert!(LegacyEnv::from_environment().is_none());
    }
}
