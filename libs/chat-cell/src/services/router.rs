use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use shared_models::UserRef;

use crate::channel::{InboundMessage, MessagingChannel};
use crate::models::{ChatInput, ReplyTarget};
use crate::services::conversation::ConversationEngine;
use crate::services::session::SessionStore;

/// Routes inbound channel events into per-user sessions.
///
/// Inputs for one session are processed to completion strictly one at a
/// time (the per-session lock is held across handling and the resulting
/// sends); sessions do not block each other.
pub struct SessionRouter {
    store: SessionStore,
    engine: ConversationEngine,
    channel: Arc<dyn MessagingChannel>,
    operator_chat_id: Option<i64>,
}

impl SessionRouter {
    pub fn new(
        engine: ConversationEngine,
        channel: Arc<dyn MessagingChannel>,
        operator_chat_id: Option<i64>,
    ) -> Self {
        Self {
            store: SessionStore::new(),
            engine,
            channel,
            operator_chat_id,
        }
    }

    pub async fn dispatch(&self, inbound: InboundMessage) {
        let input = match (inbound.text, inbound.selection) {
            (_, Some(selection)) => ChatInput::Selection(selection),
            (Some(text), None) => ChatInput::Text(text),
            (None, None) => {
                debug!("Ignoring empty inbound event from user {}", inbound.user_id);
                return;
            }
        };

        let mut user = UserRef::new(inbound.user_id, inbound.display_name);
        if let Some(username) = inbound.username {
            user = user.with_username(username);
        }

        let session = self.store.session(&user, inbound.chat_id).await;
        let mut session = session.lock().await;
        session.user = user;
        session.chat_id = inbound.chat_id;

        let replies = self
            .engine
            .handle_input(&mut session, input, Utc::now())
            .await;

        for reply in replies {
            let chat_id = match reply.target {
                ReplyTarget::User => session.chat_id,
                ReplyTarget::Operator => match self.operator_chat_id {
                    Some(id) => id,
                    None => {
                        warn!("Dropping operator reply: no operator chat configured");
                        continue;
                    }
                },
            };
            if let Err(e) = self
                .channel
                .send_text(chat_id, &reply.text, reply.choices.as_ref())
                .await
            {
                warn!("Send to chat {} failed: {}", chat_id, e);
            }
        }
    }
}
