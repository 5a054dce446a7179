//! S1 (priority mention), S2 (skip), and S6 (kill dedup) driven through the
//! public `NotificationCoordinator` API with a mock chat transport, per the
//! end-to-end scenarios' own wording.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use wh_notifier::config::NotificationsConfig;
use wh_notifier::error::NotifierError;
use wh_notifier::notifier::{NotificationCoordinator, NotificationOutcome};
use wh_notifier::transport::persistent::InMemoryPersistentValues;
use wh_notifier::transport::voice::NoopVoiceParticipantsSource;
use wh_notifier::transport::{ChatPayload, ChatTransport};

struct RecordingTransport {
    sent: Mutex<Vec<String>>,
}

impl RecordingTransport {
    fn new() -> Self {
        Self { sent: Mutex::new(Vec::new()) }
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_message(&self, payload: ChatPayload) -> Result<(), NotifierError> {
        self.sent.lock().push(payload.body);
        Ok(())
    }
}

fn coordinator(config: NotificationsConfig, transport: Arc<RecordingTransport>) -> NotificationCoordinator {
    NotificationCoordinator::new(
        config,
        transport,
        Arc::new(InMemoryPersistentValues::default()),
        Arc::new(NoopVoiceParticipantsSource),
        5,
        Duration::from_secs(60),
    )
}

fn priority_config() -> NotificationsConfig {
    let mut config = NotificationsConfig::default();
    config.priority_systems = ["Jita".to_string()].into_iter().collect();
    config.system_notifications_enabled = false;
    config.priority_only_mode = false;
    config
}

#[tokio::test]
async fn s1_priority_mention_path() {
    let transport = Arc::new(RecordingTransport::new());
    let coord = coordinator(priority_config(), transport.clone());

    let outcome = coord.notify_system("map-1", "Jita").await;

    assert_eq!(outcome, NotificationOutcome::Sent);
    let sent = transport.sent.lock();
    const ONBOARDING_BANNER: &str = "\u{1F44B} This is the first notification of this kind from this bridge instance.\n";
    let body = sent[0].strip_prefix(ONBOARDING_BANNER).unwrap_or(&sent[0]);
    assert!(
        body.starts_with("@here \u{1F5FA}\u{FE0F} System event detected: **Jita** (Priority System)"),
        "unexpected body: {}",
        sent[0]
    );
}

#[tokio::test]
async fn s2_skip_path() {
    let transport = Arc::new(RecordingTransport::new());
    let coord = coordinator(priority_config(), transport.clone());

    let outcome = coord.notify_system("map-1", "Amarr").await;

    assert_eq!(outcome, NotificationOutcome::Skipped("decision_table"));
    assert!(transport.sent.lock().is_empty());
}

#[tokio::test]
async fn s6_kill_dedup() {
    let transport = Arc::new(RecordingTransport::new());
    let mut config = NotificationsConfig::default();
    config.kill_notifications_enabled = true;
    let coord = coordinator(config, transport.clone());

    let first = coord.notify_kill("map-1", "k-7", "Jita").await;
    let second = coord.notify_kill("map-1", "k-7", "Jita").await;

    assert_eq!(first, NotificationOutcome::Sent);
    assert_eq!(second, NotificationOutcome::Skipped("duplicate"));
    assert_eq!(transport.sent.lock().len(), 1);
}
