use std::env;

use chrono::{Duration, NaiveTime};
use chrono_tz::Tz;
use thiserror::Error;
use tracing::warn;

use shared_models::{DirectoryError, ProviderDirectory};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("provider table: {0}")]
    Directory(#[from] DirectoryError),

    #[error("provider table entry '{0}' is not of the form Name=calendar-key")]
    MalformedProviderEntry(String),

    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("office hours {start}..{end} are not a valid window")]
    InvalidOfficeHours { start: u32, end: u32 },

    #[error("slot duration must be positive, got {0} minutes")]
    InvalidSlotDuration(i64),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub calendar_api_url: String,
    pub calendar_api_token: String,
    pub messaging_api_url: String,
    pub messaging_api_token: String,
    /// Semicolon-separated `Name=calendar-key` pairs.
    pub provider_calendars: String,
    pub business_timezone: String,
    pub office_start_hour: u32,
    pub office_end_hour: u32,
    pub slot_duration_minutes: i64,
    pub max_listed_reservations: usize,
    pub operator_chat_id: Option<i64>,
    pub bind_port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            calendar_api_url: env::var("CALENDAR_API_URL").unwrap_or_else(|_| {
                warn!("CALENDAR_API_URL not set, using empty value");
                String::new()
            }),
            calendar_api_token: env::var("CALENDAR_API_TOKEN").unwrap_or_else(|_| {
                warn!("CALENDAR_API_TOKEN not set, using empty value");
                String::new()
            }),
            messaging_api_url: env::var("MESSAGING_API_URL").unwrap_or_else(|_| {
                warn!("MESSAGING_API_URL not set, using empty value");
                String::new()
            }),
            messaging_api_token: env::var("MESSAGING_API_TOKEN").unwrap_or_else(|_| {
                warn!("MESSAGING_API_TOKEN not set, using empty value");
                String::new()
            }),
            provider_calendars: env::var("PROVIDER_CALENDARS").unwrap_or_else(|_| {
                warn!("PROVIDER_CALENDARS not set, using empty value");
                String::new()
            }),
            business_timezone: env::var("BUSINESS_TIMEZONE")
                .unwrap_or_else(|_| "America/Argentina/Buenos_Aires".to_string()),
            office_start_hour: parse_env("OFFICE_START_HOUR", 9),
            office_end_hour: parse_env("OFFICE_END_HOUR", 18),
            slot_duration_minutes: parse_env("SLOT_DURATION_MINUTES", 30),
            max_listed_reservations: parse_env("MAX_LISTED_RESERVATIONS", 6),
            operator_chat_id: env::var("OPERATOR_CHAT_ID")
                .ok()
                .and_then(|raw| raw.parse().ok()),
            bind_port: parse_env("BIND_PORT", 3000),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.calendar_api_url.is_empty()
            && !self.messaging_api_url.is_empty()
            && !self.provider_calendars.is_empty()
    }

    /// Parse the provider table, enforcing the bidirectional-lookup invariant.
    pub fn directory(&self) -> Result<ProviderDirectory, ConfigError> {
        let mut entries = Vec::new();
        for raw in self
            .provider_calendars
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            let (name, key) = raw
                .split_once('=')
                .ok_or_else(|| ConfigError::MalformedProviderEntry(raw.to_string()))?;
            let (name, key) = (name.trim(), key.trim());
            if name.is_empty() || key.is_empty() {
                return Err(ConfigError::MalformedProviderEntry(raw.to_string()));
            }
            entries.push((name.to_string(), key.to_string()));
        }
        Ok(ProviderDirectory::new(entries)?)
    }

    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.business_timezone
            .parse()
            .map_err(|_| ConfigError::UnknownTimezone(self.business_timezone.clone()))
    }

    pub fn office_hours(&self) -> Result<(NaiveTime, NaiveTime), ConfigError> {
        let invalid = || ConfigError::InvalidOfficeHours {
            start: self.office_start_hour,
            end: self.office_end_hour,
        };
        if self.office_start_hour >= self.office_end_hour {
            return Err(invalid());
        }
        let start = NaiveTime::from_hms_opt(self.office_start_hour, 0, 0).ok_or_else(invalid)?;
        let end = NaiveTime::from_hms_opt(self.office_end_hour, 0, 0).ok_or_else(invalid)?;
        Ok((start, end))
    }

    pub fn slot_duration(&self) -> Result<Duration, ConfigError> {
        if self.slot_duration_minutes <= 0 {
            return Err(ConfigError::InvalidSlotDuration(self.slot_duration_minutes));
        }
        Ok(Duration::minutes(self.slot_duration_minutes))
    }
}

fn parse_env<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} is not a valid value, using default", key);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            calendar_api_url: "https://calendar.example".to_string(),
            calendar_api_token: "token".to_string(),
            messaging_api_url: "https://channel.example".to_string(),
            messaging_api_token: "token".to_string(),
            provider_calendars: "Dr. Pérez=perez@cal;Dra. Gómez=gomez@cal".to_string(),
            business_timezone: "America/Argentina/Buenos_Aires".to_string(),
            office_start_hour: 9,
            office_end_hour: 18,
            slot_duration_minutes: 30,
            max_listed_reservations: 6,
            operator_chat_id: Some(42),
            bind_port: 3000,
        }
    }

    #[test]
    fn parses_provider_table() {
        let dir = base_config().directory().unwrap();
        assert_eq!(dir.len(), 2);
        assert_eq!(dir.by_name("Dr. Pérez").unwrap().calendar_key, "perez@cal");
    }

    #[test]
    fn rejects_malformed_provider_entry() {
        let mut config = base_config();
        config.provider_calendars = "Dr. Pérez".to_string();
        assert!(matches!(
            config.directory(),
            Err(ConfigError::MalformedProviderEntry(_))
        ));
    }

    #[test]
    fn rejects_inverted_office_hours() {
        let mut config = base_config();
        config.office_start_hour = 18;
        config.office_end_hour = 9;
        assert!(matches!(
            config.office_hours(),
            Err(ConfigError::InvalidOfficeHours { .. })
        ));
    }

    #[test]
    fn rejects_zero_slot_duration() {
        let mut config = base_config();
        config.slot_duration_minutes = 0;
        assert!(matches!(
            config.slot_duration(),
            Err(ConfigError::InvalidSlotDuration(0))
        ));
    }

    #[test]
    fn resolves_timezone() {
        assert_eq!(
            base_config().timezone().unwrap(),
            chrono_tz::America::Argentina::Buenos_Aires
        );
    }
}
