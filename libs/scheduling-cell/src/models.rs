use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use shared_config::{AppConfig, ConfigError};

/// Read-only scheduling rules, validated once at startup.
#[derive(Debug, Clone, Copy)]
pub struct SchedulingConfig {
    pub timezone: Tz,
    pub office_start: NaiveTime,
    pub office_end: NaiveTime,
    pub slot_duration: Duration,
}

impl SchedulingConfig {
    pub fn from_app_config(config: &AppConfig) -> Result<Self, ConfigError> {
        let (office_start, office_end) = config.office_hours()?;
        Ok(Self {
            timezone: config.timezone()?,
            office_start,
            office_end,
            slot_duration: config.slot_duration()?,
        })
    }
}

/// A bookable window within office hours. Immutable once computed; slots
/// are regenerated fresh per query, never cached across requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub date: NaiveDate,
    /// Wall-clock start in the business timezone, shown to users.
    pub start_local: NaiveTime,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeSlot {
    /// The `HH:MM` label offered as a choice in the conversation.
    pub fn label(&self) -> String {
        self.start_local.format("%H:%M").to_string()
    }
}
