use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{ChoiceSet, Selection};

/// One inbound event from the messaging channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub user_id: i64,
    pub chat_id: i64,
    pub display_name: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub selection: Option<Selection>,
}

/// Outbound side of the opaque messaging channel.
///
/// The core assumes nothing about delivery beyond best-effort, ordered
/// per chat. Send failures are the driver's problem to log; they never
/// roll back conversation state.
#[async_trait]
pub trait MessagingChannel: Send + Sync {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        choices: Option<&ChoiceSet>,
    ) -> Result<(), ChannelSendError>;
}

#[derive(Debug, thiserror::Error)]
#[error("channel send failed: {0}")]
pub struct ChannelSendError(pub String);
