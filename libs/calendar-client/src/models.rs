use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An externally-booked range on a provider's calendar, in absolute time.
/// Closed on the left, open on the right for overlap purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Zoned start/end of a remote event as the store reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTime {
    #[serde(default)]
    pub date_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEvent {
    pub id: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub start: EventTime,
    pub end: EventTime,
    #[serde(default)]
    pub html_link: Option<String>,
}

impl RemoteEvent {
    pub fn start_instant(&self) -> Option<DateTime<Utc>> {
        self.start.date_time
    }

    pub fn end_instant(&self) -> Option<DateTime<Utc>> {
        self.end.date_time
    }
}

/// Result of a successful event insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertedEvent {
    pub id: String,
    #[serde(default)]
    pub html_link: Option<String>,
}

// Wire shapes for the freeBusy query.

#[derive(Debug, Deserialize)]
pub(crate) struct FreeBusyResponse {
    #[serde(default)]
    pub calendars: std::collections::HashMap<String, CalendarBusy>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CalendarBusy {
    #[serde(default)]
    pub busy: Vec<BusyInterval>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EventList {
    #[serde(default)]
    pub items: Vec<RemoteEvent>,
}
