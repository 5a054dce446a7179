//! Voice-participant mention source, injected so the Coordinator's
//! mention-composition branch is fully exercised by tests without a real
//! voice backend.

use async_trait::async_trait;

/// Reports which participants are currently in a map's voice channel, for
/// per-participant mention composition.
#[async_trait]
pub trait VoiceParticipantsSource: Send + Sync {
    async fn participants(&self, map_slug: &str) -> Vec<String>;
}

/// Default implementation: no voice backend wired up.
pub struct NoopVoiceParticipantsSource;

#[async_trait]
impl VoiceParticipantsSource for NoopVoiceParticipantsSource {
    async fn participants(&self, _map_slug: &str) -> Vec<String> {
        Vec::new()
    }
}
