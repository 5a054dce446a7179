//! One long-lived SSE streaming connection per map.
//!
//! Frames SSE bytes into events (byte-level partial-chunk buffering is
//! delegated to `eventsource-stream`), validates them via
//! `wh_notifier_proto::SseEvent`, and forwards accepted events to the
//! Event Processor. Owns its `ConnectionState` exclusively.

use crate::error::SseError;
use crate::processor::EventProcessor;
use crate::sse::backoff::{BackoffConfig, compute_delay};
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use wh_notifier_proto::{MapConfig, RawFrame, SseEvent, SseEventKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

#[derive(Debug, Clone)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    pub last_event_id: String,
    pub reconnect_attempts: u32,
    pub events_filter: Option<std::collections::HashSet<String>>,
    pub connection_id: String,
}

impl ConnectionState {
    fn new(connection_id: String, events_filter: Option<std::collections::HashSet<String>>) -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            last_event_id: String::new(),
            reconnect_attempts: 0,
            events_filter,
            connection_id,
        }
    }
}

/// A handle to a running client, shared with the Supervisor and the
/// health endpoint.
pub struct SseClientHandle {
    pub slug: String,
    pub state: Arc<RwLock<ConnectionState>>,
    reconnect_tx: mpsc::Sender<()>,
}

impl SseClientHandle {
    pub fn is_connected(&self) -> bool {
        self.state.read().status == ConnectionStatus::Connected
    }

    /// Cancel any pending reconnect timer and attempt immediately.
    pub async fn reconnect_now(&self) {
        let _ = self.reconnect_tx.send(()).await;
    }
}

/// Spawn one SSE client for `map_config`. Returns a handle and the task's
/// `JoinHandle`; the caller owns both.
pub fn spawn(
    base_url: String,
    map_config: MapConfig,
    processor: Arc<EventProcessor>,
    mut shutdown: broadcast::Receiver<()>,
) -> (Arc<SseClientHandle>, tokio::task::JoinHandle<()>) {
    let (reconnect_tx, mut reconnect_rx) = mpsc::channel::<()>(1);
    let state = Arc::new(RwLock::new(ConnectionState::new(
        uuid::Uuid::new_v4().to_string(),
        map_config.event_filter.clone(),
    )));
    let handle = Arc::new(SseClientHandle {
        slug: map_config.slug.clone(),
        state: state.clone(),
        reconnect_tx,
    });

    let join = tokio::spawn(async move {
        let backoff = BackoffConfig::default();
        let http = reqwest::Client::builder()
            .user_agent("wh-notifier/0.1")
            .build()
            .expect("failed to build SSE HTTP client");

        loop {
            state.write().status = ConnectionStatus::Connecting;
            let attempt = state.read().reconnect_attempts;
            let _span = crate::telemetry::sse_connect_span(&map_config.slug, attempt).entered();

            let last_event_id = state.read().last_event_id.clone();
            match connect_and_process(&http, &base_url, &map_config, &last_event_id, &state, &processor).await {
                Ok(()) => {
                    tracing::debug!(slug = %map_config.slug, "SSE stream closed normally");
                }
                Err(err) => {
                    tracing::warn!(slug = %map_config.slug, error = %err, code = err.error_code(), "SSE stream error");
                }
            }

            state.write().status = ConnectionStatus::Disconnected;
            crate::metrics::set_sse_connected(&map_config.slug, false);

            let attempts = {
                let mut guard = state.write();
                guard.status = ConnectionStatus::Reconnecting;
                guard.reconnect_attempts += 1;
                guard.reconnect_attempts
            };
            crate::metrics::record_sse_reconnect(&map_config.slug);

            let delay = compute_delay(&backoff, attempts.saturating_sub(1));
            let _span = crate::telemetry::reconnect_span(&map_config.slug, attempts, delay.as_millis() as u64).entered();

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = reconnect_rx.recv() => {
                    tracing::info!(slug = %map_config.slug, "manual reconnect requested, skipping remaining backoff");
                }
                _ = shutdown.recv() => {
                    tracing::info!(slug = %map_config.slug, "SSE client shutting down");
                    return;
                }
            }
        }
    });

    (handle, join)
}

async fn connect_and_process(
    http: &reqwest::Client,
    base_url: &str,
    map_config: &MapConfig,
    last_event_id: &str,
    state: &Arc<RwLock<ConnectionState>>,
    processor: &Arc<EventProcessor>,
) -> Result<(), SseError> {
    let mut url = format!(
        "{}/api/maps/{}/events/stream?events={}",
        base_url.trim_end_matches('/'),
        map_config.slug,
        map_config.events_query_value()
    );
    if !last_event_id.is_empty() {
        url.push_str(&format!("&last_event_id={last_event_id}"));
    }

    let response = http
        .get(&url)
        .bearer_auth(&map_config.api_token)
        .header("Accept", "text/event-stream")
        .header("Cache-Control", "no-cache")
        .header("Connection", "keep-alive")
        .timeout(Duration::from_secs(60))
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(SseError::UnexpectedStatus(response.status().as_u16()));
    }

    {
        let mut guard = state.write();
        guard.status = ConnectionStatus::Connected;
        guard.reconnect_attempts = 0;
    }
    crate::metrics::set_sse_connected(&map_config.slug, true);
    tracing::info!(slug = %map_config.slug, "SSE connection established");

    let mut events = response.bytes_stream().eventsource();
    while let Some(item) = events.next().await {
        let raw_event = item.map_err(|e| SseError::Framing(e.to_string()))?;

        let frame = RawFrame {
            event: non_empty(raw_event.event),
            id: non_empty(raw_event.id),
            data: raw_event.data,
        };

        let sse_event = match SseEvent::from_raw_frame(&frame) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(slug = %map_config.slug, error = %err, "dropping invalid SSE frame");
                continue;
            }
        };

        if sse_event.map_id != map_config.map_id && matches!(sse_event.kind, SseEventKind::Data { .. }) {
            tracing::debug!(slug = %map_config.slug, event_map_id = %sse_event.map_id, "event map_id does not match configured map, forwarding anyway");
        }

        let id = sse_event.id.clone();
        let is_connected_event = sse_event.event_type == wh_notifier_proto::CONNECTED_EVENT_TYPE;

        match processor.handle_event(map_config, sse_event).await {
            Ok(()) => {
                if !id.is_empty() && !is_connected_event {
                    state.write().last_event_id = id;
                }
            }
            Err(err) => {
                tracing::warn!(slug = %map_config.slug, error = %err, code = err.error_code(), "processor rejected event");
            }
        }
    }

    Ok(())
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_state_starts_disconnected() {
        let state = ConnectionState::new("test".to_string(), None);
        assert_eq!(state.status, ConnectionStatus::Disconnected);
        assert_eq!(state.reconnect_attempts, 0);
        assert!(state.last_event_id.is_empty());
    }
}
