use serde::{Deserialize, Serialize};

/// Channel-provided identity of the person talking to the assistant.
///
/// The id is the only field trusted for ownership checks; display name and
/// username are cosmetic and go into event summaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: i64,
    pub display_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

impl UserRef {
    pub fn new(id: i64, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            username: None,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}
