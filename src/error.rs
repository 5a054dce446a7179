//! Error taxonomy for the notification bridge.
//!
//! One `thiserror` enum per subsystem boundary, each exposing a stable
//! `error_code()` string for metrics labeling. Every variant here is
//! recovered locally by its owning actor; nothing is meant to unwind past
//! a component boundary except through the `anyhow::Result` returned by
//! `main`.

use thiserror::Error;

/// Errors raised while maintaining the Map Registry's directory and indexes.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("control-plane request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("control-plane returned unexpected status {0}")]
    UnexpectedStatus(u16),

    #[error("control-plane endpoint not found")]
    EndpointNotFound,

    #[error("control-plane response was not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("no legacy configuration available (MAP_URL unset)")]
    NoLegacyConfig,
}

impl RegistryError {
    pub fn error_code(&self) -> &'static str {
        match self {
            RegistryError::Transport(_) => "transport_error",
            RegistryError::UnexpectedStatus(_) => "config_error",
            RegistryError::EndpointNotFound => "config_error",
            RegistryError::Decode(_) => "decode_error",
            RegistryError::NoLegacyConfig => "config_error",
        }
    }
}

/// Errors raised while framing, validating, or streaming SSE events.
#[derive(Debug, Error)]
pub enum SseError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream returned status {0}")]
    UnexpectedStatus(u16),

    #[error("malformed event: {0}")]
    Decode(#[from] wh_notifier_proto::ProtoError),

    #[error("stream closed by server")]
    StreamClosed,

    #[error("event stream framing error: {0}")]
    Framing(String),

    #[error("operation timed out")]
    Timeout,
}

impl SseError {
    pub fn error_code(&self) -> &'static str {
        match self {
            SseError::Transport(_) => "transport_error",
            SseError::UnexpectedStatus(_) => "transport_error",
            SseError::Decode(_) => "decode_error",
            SseError::StreamClosed => "transport_error",
            SseError::Framing(_) => "decode_error",
            SseError::Timeout => "timeout",
        }
    }
}

/// Errors raised while routing validated events to handlers.
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("event missing required fields: {0:?}")]
    Validation(Vec<&'static str>),

    #[error("no map configuration for map_id {0}")]
    UnknownMap(String),
}

impl ProcessorError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ProcessorError::Validation(_) => "validation_error",
            ProcessorError::UnknownMap(_) => "config_error",
        }
    }
}

/// Errors raised while deciding on or dispatching a chat notification.
#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("chat transport rejected message: {0}")]
    Dispatch(String),

    #[error("dispatch timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("circuit breaker open for destination {0}")]
    CircuitOpen(String),

    #[error("persistent value store error: {0}")]
    PersistentStore(#[source] anyhow::Error),
}

impl NotifierError {
    pub fn error_code(&self) -> &'static str {
        match self {
            NotifierError::Dispatch(_) => "dispatch_error",
            NotifierError::Timeout(_) => "timeout",
            NotifierError::CircuitOpen(_) => "dispatch_error",
            NotifierError::PersistentStore(_) => "fatal_init_error",
        }
    }
}

/// Configuration loading/validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// A single configuration validation failure, as collected by `config::validate`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_error_codes_are_stable() {
        assert_eq!(RegistryError::EndpointNotFound.error_code(), "config_error");
        assert_eq!(RegistryError::NoLegacyConfig.error_code(), "config_error");
    }

    #[test]
    fn notifier_circuit_open_maps_to_dispatch_error() {
        assert_eq!(
            NotifierError::CircuitOpen("discord".to_string()).error_code(),
            "dispatch_error"
        );
    }
}
