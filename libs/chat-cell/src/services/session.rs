use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use tokio::sync::Mutex;
use tracing::debug;

use booking_cell::Reservation;
use shared_models::{Provider, UserRef};

/// Conversation position of one session. Terminal transitions land back in
/// `Idle`; the machine runs for the lifetime of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    Idle,
    AwaitingProvider,
    AwaitingDay,
    AwaitingTimeslot,
    AwaitingEditSelection,
    AwaitingEditConfirmation,
    AwaitingNewDay,
    AwaitingNewTimeslot,
    AwaitingFinalConfirmation,
    TalkingToOperator,
}

/// Working data for a booking in progress.
#[derive(Debug, Clone, Default)]
pub struct BookingDraft {
    pub provider: Option<Provider>,
    pub day: Option<String>,
    pub date: Option<NaiveDate>,
}

/// Working data for an edit in progress: the reservation being replaced
/// and the replacement slot as it firms up.
#[derive(Debug, Clone)]
pub struct EditDraft {
    pub original: Reservation,
    pub new_day: Option<String>,
    pub new_date: Option<NaiveDate>,
    pub new_time: Option<NaiveTime>,
}

impl EditDraft {
    pub fn new(original: Reservation) -> Self {
        Self {
            original,
            new_day: None,
            new_date: None,
            new_time: None,
        }
    }
}

/// Per-user conversational context. Owned exclusively by one user's
/// conversation and mutated only by the state machine.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: UserRef,
    pub chat_id: i64,
    pub state: ConversationState,
    pub draft: BookingDraft,
    pub edit: Option<EditDraft>,
}

impl Session {
    pub fn new(user: UserRef, chat_id: i64) -> Self {
        Self {
            user,
            chat_id,
            state: ConversationState::Idle,
            draft: BookingDraft::default(),
            edit: None,
        }
    }

    /// Return to `Idle` and discard all working data.
    pub fn reset(&mut self) {
        self.state = ConversationState::Idle;
        self.draft = BookingDraft::default();
        self.edit = None;
    }
}

/// Sessions keyed by user id. The outer lock is held only for lookup and
/// insert; processing locks the per-session mutex, so one user's pending
/// remote call never blocks another user's session.
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<i64, Arc<Mutex<Session>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch or create the session for `user`. Callers refresh the stored
    /// channel identity under the per-session lock they take to process
    /// input, so identity updates stay ordered with the messages that
    /// carried them.
    pub async fn session(&self, user: &UserRef, chat_id: i64) -> Arc<Mutex<Session>> {
        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(user.id)
            .or_insert_with(|| {
                debug!("Creating session for user {}", user.id);
                Arc::new(Mutex::new(Session::new(user.clone(), chat_id)))
            })
            .clone()
    }
}
