use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Method, StatusCode,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, warn};

use shared_config::AppConfig;

use crate::models::{BusyInterval, EventList, FreeBusyResponse, InsertedEvent, RemoteEvent};

/// Per-request deadline. A hung remote store must surface as
/// `CalendarError::Unavailable`, not stall the session.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("calendar store unavailable: {0}")]
    Unavailable(String),

    #[error("calendar authentication error: {0}")]
    Auth(String),

    #[error("calendar resource not found: {0}")]
    NotFound(String),

    #[error("calendar API error ({status}): {message}")]
    Api { status: u16, message: String },
}

/// Thin client over the remote calendar store's REST surface.
///
/// Constructed once at startup and passed to the services that need it;
/// retry policy lives with callers, not here.
pub struct CalendarClient {
    client: Client,
    base_url: String,
    api_token: String,
}

impl CalendarClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.calendar_api_url.trim_end_matches('/').to_string(),
            api_token: config.calendar_api_token.clone(),
        }
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if !self.api_token.is_empty() {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", self.api_token)) {
                headers.insert(AUTHORIZATION, value);
            }
        }
        headers
    }

    async fn request<T>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, CalendarError>
    where
        T: DeserializeOwned,
    {
        let response = self.send(method, path, body).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| CalendarError::Unavailable(format!("invalid response body: {}", e)))
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<reqwest::Response, CalendarError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Calendar request {} {}", method, url);

        let mut req = self
            .client
            .request(method, &url)
            .headers(self.headers())
            .timeout(REQUEST_TIMEOUT);
        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req
            .send()
            .await
            .map_err(|e| CalendarError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Calendar API error ({}): {}", status, error_text);

            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CalendarError::Auth(error_text),
                StatusCode::NOT_FOUND => CalendarError::NotFound(error_text),
                s if s.is_server_error() => CalendarError::Unavailable(error_text),
                s => CalendarError::Api {
                    status: s.as_u16(),
                    message: error_text,
                },
            });
        }

        Ok(response)
    }

    /// Busy intervals on `calendar_key` overlapping [time_min, time_max].
    pub async fn query_busy(
        &self,
        calendar_key: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
        timezone: &str,
    ) -> Result<Vec<BusyInterval>, CalendarError> {
        let body = json!({
            "timeMin": time_min.to_rfc3339(),
            "timeMax": time_max.to_rfc3339(),
            "timeZone": timezone,
            "items": [{ "id": calendar_key }],
        });

        let result: FreeBusyResponse = self.request(Method::POST, "/freeBusy", Some(body)).await?;
        let busy = result
            .calendars
            .get(calendar_key)
            .map(|c| c.busy.clone())
            .unwrap_or_default();

        debug!(
            "freeBusy for {}: {} busy intervals in [{}, {}]",
            calendar_key,
            busy.len(),
            time_min,
            time_max
        );
        Ok(busy)
    }

    /// Insert an event; the store is transactional per single insert.
    pub async fn insert_event(
        &self,
        calendar_key: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        timezone: &str,
        summary: &str,
        description: &str,
    ) -> Result<InsertedEvent, CalendarError> {
        let body = json!({
            "summary": summary,
            "description": description,
            "start": { "dateTime": start.to_rfc3339(), "timeZone": timezone },
            "end": { "dateTime": end.to_rfc3339(), "timeZone": timezone },
            "reminders": {
                "useDefault": false,
                "overrides": [
                    { "method": "popup", "minutes": 60 },
                    { "method": "popup", "minutes": 1440 },
                ],
            },
        });

        let path = format!("/calendars/{}/events", calendar_key);
        let created: InsertedEvent = self.request(Method::POST, &path, Some(body)).await?;
        debug!("Event {} created on {}", created.id, calendar_key);
        Ok(created)
    }

    /// Events on `calendar_key` starting at or after `time_min` whose text
    /// matches `search_text`, ordered by start time, capped at `max`.
    pub async fn list_events(
        &self,
        calendar_key: &str,
        time_min: DateTime<Utc>,
        search_text: &str,
        max: usize,
    ) -> Result<Vec<RemoteEvent>, CalendarError> {
        let path = format!(
            "/calendars/{}/events?timeMin={}&q={}&singleEvents=true&orderBy=startTime&maxResults={}",
            calendar_key,
            urlencoding::encode(&time_min.to_rfc3339()),
            urlencoding::encode(search_text),
            max,
        );

        let result: EventList = self.request(Method::GET, &path, None).await?;
        Ok(result.items)
    }

    /// Delete an event. An event that is already gone (404/410) counts as
    /// deleted so that cancellation stays idempotent.
    pub async fn delete_event(
        &self,
        calendar_key: &str,
        event_id: &str,
    ) -> Result<(), CalendarError> {
        let path = format!("/calendars/{}/events/{}", calendar_key, event_id);
        match self.send(Method::DELETE, &path, None).await {
            Ok(_) => {
                debug!("Event {} deleted from {}", event_id, calendar_key);
                Ok(())
            }
            Err(CalendarError::NotFound(_)) => {
                warn!(
                    "Event {} on {} already gone, treating delete as success",
                    event_id, calendar_key
                );
                Ok(())
            }
            Err(CalendarError::Api { status: 410, .. }) => {
                warn!(
                    "Event {} on {} already gone (410), treating delete as success",
                    event_id, calendar_key
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Fetch a single event; `Ok(None)` when the store no longer has it.
    pub async fn get_event(
        &self,
        calendar_key: &str,
        event_id: &str,
    ) -> Result<Option<RemoteEvent>, CalendarError> {
        let path = format!("/calendars/{}/events/{}", calendar_key, event_id);
        match self.request(Method::GET, &path, None).await {
            Ok(event) => Ok(Some(event)),
            Err(CalendarError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
