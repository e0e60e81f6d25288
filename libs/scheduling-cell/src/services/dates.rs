use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("unrecognized weekday name: {0}")]
    InvalidWeekday(String),

    #[error("time of day '{0}' is not a valid HH:MM value")]
    InvalidTimeOfDay(String),

    #[error("local time {date} {time} is ambiguous or nonexistent in {timezone}")]
    AmbiguousLocalTime {
        date: NaiveDate,
        time: NaiveTime,
        timezone: String,
    },
}

/// Nearest date on or after `today` falling on the named weekday.
///
/// Accepts Spanish and English weekday names, case- and
/// diacritic-insensitive. A `today` that already matches is returned
/// unchanged (same-day booking is allowed).
pub fn resolve_next_occurrence(
    weekday_name: &str,
    today: NaiveDate,
) -> Result<NaiveDate, ScheduleError> {
    let target = weekday_from_name(weekday_name)?;
    let days_ahead = (target.num_days_from_monday() + 7 - today.weekday().num_days_from_monday()) % 7;
    let date = today + Duration::days(days_ahead as i64);
    debug!("Resolved '{}' from {} to {}", weekday_name, today, date);
    Ok(date)
}

/// Interpret a wall-clock (date, time) as local time in `timezone`.
///
/// Ambiguous (DST fall-back) and nonexistent (DST spring-forward) wall
/// clocks fail explicitly; silently picking one would corrupt the booked
/// instant.
pub fn combine_zoned(
    date: NaiveDate,
    time: NaiveTime,
    timezone: Tz,
) -> Result<DateTime<Utc>, ScheduleError> {
    match timezone.from_local_datetime(&date.and_time(time)) {
        LocalResult::Single(zoned) => Ok(zoned.with_timezone(&Utc)),
        LocalResult::Ambiguous(_, _) | LocalResult::None => Err(ScheduleError::AmbiguousLocalTime {
            date,
            time,
            timezone: timezone.name().to_string(),
        }),
    }
}

/// Parse an `HH:MM` choice label into a time of day.
pub fn parse_time_of_day(raw: &str) -> Result<NaiveTime, ScheduleError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|_| ScheduleError::InvalidTimeOfDay(raw.to_string()))
}

fn weekday_from_name(name: &str) -> Result<Weekday, ScheduleError> {
    match normalize(name).as_str() {
        "lunes" | "monday" => Ok(Weekday::Mon),
        "martes" | "tuesday" => Ok(Weekday::Tue),
        "miercoles" | "wednesday" => Ok(Weekday::Wed),
        "jueves" | "thursday" => Ok(Weekday::Thu),
        "viernes" | "friday" => Ok(Weekday::Fri),
        "sabado" | "saturday" => Ok(Weekday::Sat),
        "domingo" | "sunday" => Ok(Weekday::Sun),
        _ => Err(ScheduleError::InvalidWeekday(name.to_string())),
    }
}

fn normalize(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'á' => 'a',
            'é' => 'e',
            'í' => 'i',
            'ó' => 'o',
            'ú' => 'u',
            other => other,
        })
        .collect()
}
