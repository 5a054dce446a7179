//! External collaborators: outbound chat dispatch, the persisted
//! priority-systems store, and the injected voice-participants source.

pub mod persistent;
pub mod voice;
pub mod webhook;

pub use persistent::PersistentValues;
pub use voice::VoiceParticipantsSource;
pub use webhook::WebhookTransport;

use crate::error::NotifierError;
use async_trait::async_trait;

/// Outbound message to the chat platform. Mention composition is the
/// caller's responsibility; this is the opaque `send_message` contract.
#[derive(Debug, Clone)]
pub struct ChatPayload {
    pub body: String,
    pub embed_title: Option<String>,
    pub embed_description: Option<String>,
}

/// The chat-transport collaborator: a single operation, `send_message`.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_message(&self, payload: ChatPayload) -> Result<(), NotifierError>;
}
