//! Notification Coordinator: the priority/dedup/first-notification decision
//! table plus mention composition and circuit-breaker-guarded dispatch.

pub mod circuit_breaker;
pub mod priority;

use crate::cache::TtlCache;
use crate::config::NotificationsConfig;
use crate::error::NotifierError;
use crate::transport::{ChatPayload, ChatTransport, PersistentValues, VoiceParticipantsSource};
use circuit_breaker::CircuitBreaker;
use priority::PrioritySet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const ONBOARDING_BANNER: &str = "👋 This is the first notification of this kind from this bridge instance.\n";

/// What happened to a candidate notification.
#[derive(Debug, PartialEq, Eq)]
pub enum NotificationOutcome {
    Sent,
    Skipped(&'static str),
    Error(String),
}

enum Kind {
    System,
    Character,
    Kill,
}

impl Kind {
    fn label(&self) -> &'static str {
        match self {
            Kind::System => "system",
            Kind::Character => "character",
            Kind::Kill => "kill",
        }
    }
}

pub struct NotificationCoordinator {
    config: NotificationsConfig,
    transport: Arc<dyn ChatTransport>,
    persistent: Arc<dyn PersistentValues>,
    voice: Arc<dyn VoiceParticipantsSource>,
    priority: PrioritySet,
    dedup: TtlCache<String, ()>,
    circuit: CircuitBreaker,
    first_system: AtomicBool,
    first_character: AtomicBool,
    first_kill: AtomicBool,
}

impl NotificationCoordinator {
    pub fn new(
        config: NotificationsConfig,
        transport: Arc<dyn ChatTransport>,
        persistent: Arc<dyn PersistentValues>,
        voice: Arc<dyn VoiceParticipantsSource>,
        circuit_failure_threshold: u32,
        circuit_cooldown: Duration,
    ) -> Self {
        let priority = PrioritySet::from_names(config.priority_systems.iter().map(String::as_str));
        let dedup_ttl = Duration::from_secs(config.dedup_ttl_secs.max(1));
        Self {
            dedup: TtlCache::new(dedup_ttl, usize::MAX),
            circuit: CircuitBreaker::new(circuit_failure_threshold, circuit_cooldown),
            priority,
            config,
            transport,
            persistent,
            voice,
            first_system: AtomicBool::new(true),
            first_character: AtomicBool::new(true),
            first_kill: AtomicBool::new(true),
        }
    }

    /// Merge fingerprints from the persisted `priority_systems` store into
    /// the in-memory `PrioritySet`. Call once at startup; the store only
    /// ever grows via this path, never shrinks a config-seeded entry.
    pub async fn load_persisted_priority_set(&self) -> Result<(), NotifierError> {
        let fingerprints = self
            .persistent
            .get_fingerprints(crate::transport::persistent::PRIORITY_SYSTEMS_KEY)
            .await
            .map_err(NotifierError::PersistentStore)?;
        for fp in fingerprints {
            self.priority.insert_fingerprint(fp);
        }
        Ok(())
    }

    pub async fn notify_system(&self, map_slug: &str, name: &str) -> NotificationOutcome {
        self.notify(
            Kind::System,
            map_slug,
            name,
            self.config.system_notifications_enabled,
            &self.first_system,
            format!("🗺️ System event detected: **{name}**"),
        )
        .await
    }

    pub async fn notify_character(&self, map_slug: &str, name: &str) -> NotificationOutcome {
        self.notify(
            Kind::Character,
            map_slug,
            name,
            self.config.character_notifications_enabled,
            &self.first_character,
            format!("🧑 Character event detected: **{name}**"),
        )
        .await
    }

    pub async fn notify_kill(
        &self,
        map_slug: &str,
        killmail_id: &str,
        system_name: &str,
    ) -> NotificationOutcome {
        let dedup_key = format!("kill:{killmail_id}");
        if self.dedup.contains(&dedup_key) {
            return NotificationOutcome::Skipped("duplicate");
        }

        let outcome = self
            .notify(
                Kind::Kill,
                map_slug,
                system_name,
                self.config.kill_notifications_enabled,
                &self.first_kill,
                format!("💀 Kill detected in **{system_name}** (killmail {killmail_id})"),
            )
            .await;

        if outcome == NotificationOutcome::Sent {
            self.dedup.insert(dedup_key, ());
        }
        outcome
    }

    async fn notify(
        &self,
        kind: Kind,
        map_slug: &str,
        name: &str,
        enabled: bool,
        first_flag: &AtomicBool,
        base_body: String,
    ) -> NotificationOutcome {
        let is_priority = self.priority.is_priority(name);
        let priority_only = self.config.priority_only_mode;

        let with_mention = match (enabled, is_priority, priority_only) {
            (_, true, _) => true,
            (true, false, false) => false,
            _ => return NotificationOutcome::Skipped("decision_table"),
        };

        let mut body = if with_mention {
            let mention = self.compose_mention(map_slug).await;
            match mention {
                Some(m) => format!("{m} {base_body} (Priority System)"),
                None => format!("{base_body} (Priority System)"),
            }
        } else {
            base_body
        };

        let is_first = first_flag.swap(false, Ordering::SeqCst);
        if is_first {
            body = format!("{ONBOARDING_BANNER}{body}");
        }

        let outcome = self.dispatch(kind, body).await;
        if is_first && outcome != NotificationOutcome::Sent {
            // Dispatch didn't go through: give the "first notification of
            // this kind" banner back to whichever attempt actually succeeds.
            first_flag.store(true, Ordering::SeqCst);
        }
        outcome
    }

    async fn compose_mention(&self, map_slug: &str) -> Option<String> {
        if self.config.voice_participant_notifications {
            let participants = self.voice.participants(map_slug).await;
            if !participants.is_empty() {
                return Some(
                    participants
                        .iter()
                        .map(|p| format!("@{p}"))
                        .collect::<Vec<_>>()
                        .join(" "),
                );
            }
        }
        if self.config.fallback_to_here { Some("@here".to_string()) } else { None }
    }

    async fn dispatch(&self, kind: Kind, body: String) -> NotificationOutcome {
        if !self.circuit.allow() {
            crate::metrics::record_lifecycle("notification_circuit_open");
            return NotificationOutcome::Error("circuit breaker open".to_string());
        }

        let payload = ChatPayload {
            body,
            embed_title: None,
            embed_description: None,
        };

        match self.transport.send_message(payload).await {
            Ok(()) => {
                self.circuit.record_success();
                crate::metrics::record_notification_sent(kind.label());
                crate::metrics::record_lifecycle("notification_sent");
                NotificationOutcome::Sent
            }
            Err(e) => {
                self.circuit.record_failure();
                tracing::warn!(error_code = e.error_code(), "chat dispatch failed");
                NotificationOutcome::Error(e.to_string())
            }
        }
    }
}
