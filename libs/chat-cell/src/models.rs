use serde::{Deserialize, Serialize};

// Main menu option labels. The channel renders them as buttons; users on
// plain-text channels can type them verbatim.
pub const MENU_BOOK: &str = "Book an appointment";
pub const MENU_CANCEL_RESERVATION: &str = "Cancel a reservation";
pub const MENU_EDIT_RESERVATION: &str = "Edit a reservation";
pub const MENU_OPERATOR: &str = "Talk to the operator";
pub const CANCEL_ACTION: &str = "Cancel current action";

/// Weekdays offered for booking. The resolver also understands Spanish
/// names and Sunday; only these six are offered.
pub const DAY_MENU: [&str; 6] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

/// One user input as the state machine sees it: free text, or a structured
/// selection from a previously offered choice set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    Text(String),
    Selection(Selection),
}

impl ChatInput {
    /// The global cancel signal, honored from every state.
    pub fn is_cancel(&self) -> bool {
        match self {
            ChatInput::Text(text) => {
                let trimmed = text.trim();
                trimmed == CANCEL_ACTION || trimmed.eq_ignore_ascii_case("cancel")
            }
            ChatInput::Selection(_) => false,
        }
    }
}

/// Structured choice payloads carried by inline buttons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Selection {
    CancelReservation { event_id: String, provider: String },
    EditReservation { event_id: String, provider: String },
    ProceedEdit,
    AbortEdit,
    FinalizeEdit,
    AbortFinalize,
}

/// Choices attached to an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChoiceSet {
    /// Plain labels; the user answers by sending the label text back.
    Labels(Vec<String>),
    /// Labeled structured selections delivered back as `Selection` values.
    Selections(Vec<(String, Selection)>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyTarget {
    /// The chat the input came from.
    User,
    /// The configured operator escalation chat.
    Operator,
}

/// An outgoing message produced by the state machine. The driver performs
/// the channel send, which keeps the machine testable without a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub target: ReplyTarget,
    pub text: String,
    pub choices: Option<ChoiceSet>,
}

impl Reply {
    pub fn to_user(text: impl Into<String>) -> Self {
        Self {
            target: ReplyTarget::User,
            text: text.into(),
            choices: None,
        }
    }

    pub fn to_operator(text: impl Into<String>) -> Self {
        Self {
            target: ReplyTarget::Operator,
            text: text.into(),
            choices: None,
        }
    }

    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.choices = Some(ChoiceSet::Labels(labels));
        self
    }

    pub fn with_selections(mut self, selections: Vec<(String, Selection)>) -> Self {
        self.choices = Some(ChoiceSet::Selections(selections));
        self
    }
}

/// The main menu choice set.
pub fn main_menu_labels() -> Vec<String> {
    vec![
        MENU_BOOK.to_string(),
        MENU_EDIT_RESERVATION.to_string(),
        MENU_CANCEL_RESERVATION.to_string(),
        MENU_OPERATOR.to_string(),
    ]
}

/// Day menu plus the cancel escape hatch.
pub fn day_menu_labels() -> Vec<String> {
    DAY_MENU
        .iter()
        .map(|day| day.to_string())
        .chain(std::iter::once(CANCEL_ACTION.to_string()))
        .collect()
}
