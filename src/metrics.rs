//! Prometheus metrics collection for the notification bridge.
//!
//! Tracks notification throughput, killmail processing outcomes, SSE
//! connection health per map, and tracked-entity gauges.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    /// Notifications dispatched, labeled by kind (`kill`, `character`, `system`).
    pub static ref NOTIFICATIONS_SENT: IntCounterVec = IntCounterVec::new(
        Opts::new("notifications_sent_total", "Notifications dispatched to chat"),
        &["kind"]
    ).unwrap();

    pub static ref KILLS_PROCESSED: IntCounter = IntCounter::new(
        "kills_processed_total", "Killmail events processed"
    ).unwrap();

    pub static ref KILLS_NOTIFIED: IntCounter = IntCounter::new(
        "kills_notified_total", "Killmail events that produced a dispatch"
    ).unwrap();

    pub static ref KILLS_SKIPPED: IntCounter = IntCounter::new(
        "kills_skipped_total", "Killmail events skipped by the decision table"
    ).unwrap();

    pub static ref KILLS_ERROR: IntCounter = IntCounter::new(
        "kills_error_total", "Killmail events that errored during processing"
    ).unwrap();

    /// SSE reconnects, labeled by map slug.
    pub static ref SSE_RECONNECTS: IntCounterVec = IntCounterVec::new(
        Opts::new("sse_reconnects_total", "SSE reconnect attempts"),
        &["slug"]
    ).unwrap();

    /// 1 if the named map's SSE client is currently connected, else 0.
    pub static ref SSE_CONNECTED: IntGaugeVec = IntGaugeVec::new(
        Opts::new("sse_connected", "SSE connection status per map"),
        &["slug"]
    ).unwrap();

    pub static ref TRACKED_SYSTEMS: IntGauge = IntGauge::new(
        "tracked_systems", "Systems currently tracked across all maps"
    ).unwrap();

    pub static ref TRACKED_CHARACTERS: IntGauge = IntGauge::new(
        "tracked_characters", "Characters currently tracked across all maps"
    ).unwrap();

    /// Processing-lifecycle counters named in the killmail pipeline.
    pub static ref KILLMAIL_LIFECYCLE: IntCounterVec = IntCounterVec::new(
        Opts::new("killmail_lifecycle_total", "Killmail processing lifecycle events"),
        &["stage"]
    ).unwrap();
}

/// Initialize the Prometheus metrics registry. Must be called once at
/// startup, before any metrics are recorded.
pub fn init() {
    REGISTRY.register(Box::new(NOTIFICATIONS_SENT.clone())).unwrap();
    REGISTRY.register(Box::new(KILLS_PROCESSED.clone())).unwrap();
    REGISTRY.register(Box::new(KILLS_NOTIFIED.clone())).unwrap();
    REGISTRY.register(Box::new(KILLS_SKIPPED.clone())).unwrap();
    REGISTRY.register(Box::new(KILLS_ERROR.clone())).unwrap();
    REGISTRY.register(Box::new(SSE_RECONNECTS.clone())).unwrap();
    REGISTRY.register(Box::new(SSE_CONNECTED.clone())).unwrap();
    REGISTRY.register(Box::new(TRACKED_SYSTEMS.clone())).unwrap();
    REGISTRY.register(Box::new(TRACKED_CHARACTERS.clone())).unwrap();
    REGISTRY.register(Box::new(KILLMAIL_LIFECYCLE.clone())).unwrap();
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

pub fn record_notification_sent(kind: &str) {
    NOTIFICATIONS_SENT.with_label_values(&[kind]).inc();
}

pub fn record_sse_reconnect(slug: &str) {
    SSE_RECONNECTS.with_label_values(&[slug]).inc();
}

pub fn set_sse_connected(slug: &str, connected: bool) {
    SSE_CONNECTED.with_label_values(&[slug]).set(i64::from(connected));
}

pub fn record_lifecycle(stage: &str) {
    KILLMAIL_LIFECYCLE.with_label_values(&[stage]).inc();
}

pub fn record_kill_processed() {
    KILLS_PROCESSED.inc();
}

pub fn record_kill_notified() {
    KILLS_NOTIFIED.inc();
}

pub fn record_kill_skipped() {
    KILLS_SKIPPED.inc();
}

pub fn record_kill_error() {
    KILLS_ERROR.inc();
}

/// Which tracked-entity gauge `set_tracked_count` updates.
pub enum TrackedKind {
    Systems,
    Characters,
}

pub fn set_tracked_count(kind: TrackedKind, n: i64) {
    match kind {
        TrackedKind::Systems => TRACKED_SYSTEMS.set(n),
        TrackedKind::Characters => TRACKED_CHARACTERS.set(n),
    }
}

/// Snapshot of the counters/gauges most relevant to an operator, independent
/// of the Prometheus text encoding used by `/metrics`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub kills_processed: i64,
    pub kills_notified: i64,
    pub kills_skipped: i64,
    pub kills_error: i64,
    pub tracked_systems: i64,
    pub tracked_characters: i64,
}

pub fn get_stats() -> Stats {
    Stats {
        kills_processed: KILLS_PROCESSED.get() as i64,
        kills_notified: KILLS_NOTIFIED.get() as i64,
        kills_skipped: KILLS_SKIPPED.get() as i64,
        kills_error: KILLS_ERROR.get() as i64,
        tracked_systems: TRACKED_SYSTEMS.get(),
        tracked_characters: TRACKED_CHARACTERS.get(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_tracked_count_updates_the_matching_gauge() {
        set_tracked_count(TrackedKind::Systems, 7);
        set_tracked_count(TrackedKind::Characters, 3);
        let stats = get_stats();
        assert_eq!(stats.tracked_systems, 7);
        assert_eq!(stats.tracked_characters, 3);
    }

    #[test]
    fn kill_counters_increment_independently() {
        let before = get_stats();
        record_kill_processed();
        record_kill_notified();
        record_kill_skipped();
        record_kill_error();
        let after = get_stats();
        assert_eq!(after.kills_processed, before.kills_processed + 1);
        assert_eq!(after.kills_notified, before.kills_notified + 1);
        assert_eq!(after.kills_skipped, before.kills_skipped + 1);
        assert_eq!(after.kills_error, before.kills_error + 1);
    }
}
