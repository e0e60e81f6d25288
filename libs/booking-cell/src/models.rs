use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use calendar_client::CalendarError;
use scheduling_cell::{AvailabilityError, ScheduleError};
use shared_models::Provider;

/// A confirmed booking as held by the remote store. The store is
/// authoritative; nothing beyond transient conversation references is
/// kept locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub event_id: String,
    pub provider: Provider,
    pub user_id: i64,
    pub summary: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub html_link: Option<String>,
}

impl Reservation {
    /// Human-readable start in the business timezone, e.g. `Mon 03/03 10:30`.
    pub fn display_start(&self, timezone: Tz) -> String {
        self.start
            .with_timezone(&timezone)
            .format("%a %d/%m %H:%M")
            .to_string()
    }
}

/// Target day for a booking: a weekday name resolved forward from today,
/// or an explicit date (edit flow).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DayChoice {
    Weekday(String),
    Date(NaiveDate),
}

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error("calendar store unavailable")]
    RemoteUnavailable(#[source] CalendarError),

    #[error("requested slot is not available")]
    NoAvailability,

    #[error("booking insert failed after validation")]
    BookingFailed(#[source] CalendarError),

    #[error("original reservation removed but replacement booking failed")]
    RescheduleLostSlot(#[source] Box<BookingError>),

    #[error("user already holds a reservation with {provider}: {details}")]
    ConflictExists { provider: String, details: String },
}

impl From<CalendarError> for BookingError {
    fn from(e: CalendarError) -> Self {
        BookingError::RemoteUnavailable(e)
    }
}

impl From<AvailabilityError> for BookingError {
    fn from(e: AvailabilityError) -> Self {
        match e {
            AvailabilityError::Schedule(inner) => BookingError::Schedule(inner),
            AvailabilityError::Remote(inner) => BookingError::RemoteUnavailable(inner),
        }
    }
}
