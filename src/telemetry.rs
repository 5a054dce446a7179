//! Structured tracing helpers for the notification bridge.
//!
//! Every suspension point (SSE connect/read, control-plane fetch,
//! static-info fetch, chat dispatch) gets a span carrying the fields
//! operators actually search on: `slug`, `map_id`, `event_type`,
//! `attempt`, `delay_ms`.

use std::time::Instant;
use tracing::{Level, Span, span};

/// Span for one SSE connection attempt.
pub fn sse_connect_span(slug: &str, attempt: u32) -> Span {
    span!(Level::DEBUG, "sse.connect", slug = slug, attempt = attempt)
}

/// Span for one control-plane config refresh.
pub fn registry_refresh_span() -> Span {
    span!(Level::DEBUG, "registry.refresh")
}

/// Span for handling one validated event.
pub fn event_span(slug: &str, map_id: &str, event_type: &str) -> Span {
    span!(
        Level::DEBUG,
        "processor.handle",
        slug = slug,
        map_id = map_id,
        event_type = event_type,
    )
}

/// Span for a scheduled reconnect, logging the chosen backoff delay.
pub fn reconnect_span(slug: &str, attempt: u32, delay_ms: u64) -> Span {
    span!(
        Level::INFO,
        "sse.reconnect",
        slug = slug,
        attempt = attempt,
        delay_ms = delay_ms,
    )
}

/// Guard that records dispatch latency on drop.
pub struct DispatchTimer {
    destination: String,
    start: Instant,
}

impl DispatchTimer {
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            start: Instant::now(),
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Drop for DispatchTimer {
    fn drop(&mut self) {
        tracing::debug!(
            destination = %self.destination,
            elapsed_secs = self.elapsed_secs(),
            "dispatch finished"
        );
    }
}
