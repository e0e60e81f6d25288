pub mod channel;
pub mod models;
pub mod services;

pub use channel::{ChannelSendError, InboundMessage, MessagingChannel};
pub use models::{ChatInput, ChoiceSet, Reply, ReplyTarget, Selection};
pub use services::conversation::ConversationEngine;
pub use services::router::SessionRouter;
pub use services::session::{ConversationState, Session, SessionStore};
