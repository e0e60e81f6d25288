use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use thiserror::Error;
use tracing::{debug, warn};

use calendar_client::{BusyInterval, CalendarClient, CalendarError};
use shared_models::Provider;

use crate::models::{SchedulingConfig, TimeSlot};
use crate::services::dates::{combine_zoned, ScheduleError};

/// Defensive ceiling on slots enumerated for one day. A misconfigured
/// office window or slot duration truncates here instead of failing.
pub const MAX_SLOTS_PER_DAY: usize = 64;

#[derive(Debug, Error)]
pub enum AvailabilityError {
    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Remote(#[from] CalendarError),
}

/// Computes the free slot lattice for a provider and date from the remote
/// store's busy intervals.
pub struct AvailabilityEngine {
    calendar: Arc<CalendarClient>,
    rules: SchedulingConfig,
}

impl AvailabilityEngine {
    pub fn new(calendar: Arc<CalendarClient>, rules: SchedulingConfig) -> Self {
        Self { calendar, rules }
    }

    pub fn rules(&self) -> &SchedulingConfig {
        &self.rules
    }

    /// Free slots for `provider` on `date`, ordered by start time.
    ///
    /// Queries the store fresh on every call; with an unchanged store the
    /// result is identical across calls.
    pub async fn compute_free_slots(
        &self,
        provider: &Provider,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Vec<TimeSlot>, AvailabilityError> {
        let office_open = combine_zoned(date, self.rules.office_start, self.rules.timezone)?;
        let office_close = combine_zoned(date, self.rules.office_end, self.rules.timezone)?;

        let busy = self
            .calendar
            .query_busy(
                &provider.calendar_key,
                office_open,
                office_close,
                self.rules.timezone.name(),
            )
            .await?;

        let slots = slot_lattice(
            office_open,
            office_close,
            self.rules.slot_duration,
            now,
            &busy,
            self.rules.timezone,
        );
        debug!(
            "{} free slots for {} on {} ({} busy intervals)",
            slots.len(),
            provider.name,
            date,
            busy.len()
        );
        Ok(slots)
    }
}

/// Enumerate free slots between `office_open` and `office_close`.
///
/// A candidate [s, s+duration) is excluded when it has already passed
/// relative to `now`, or when it strictly overlaps a busy interval:
/// `busy.end > s && s + duration > busy.start`. Touching endpoints do not
/// conflict.
pub fn slot_lattice(
    office_open: DateTime<Utc>,
    office_close: DateTime<Utc>,
    slot_duration: Duration,
    now: DateTime<Utc>,
    busy: &[BusyInterval],
    timezone: Tz,
) -> Vec<TimeSlot> {
    if slot_duration <= Duration::zero() {
        warn!("Non-positive slot duration, returning empty lattice");
        return Vec::new();
    }

    let mut slots = Vec::new();
    let mut cursor = office_open;
    let mut enumerated = 0usize;

    while cursor + slot_duration <= office_close {
        if enumerated == MAX_SLOTS_PER_DAY {
            warn!(
                "Slot enumeration hit the {}-slot cap between {} and {}, truncating",
                MAX_SLOTS_PER_DAY, office_open, office_close
            );
            break;
        }
        enumerated += 1;

        let slot_end = cursor + slot_duration;
        let already_past = slot_end <= now;
        let overlaps_busy = busy
            .iter()
            .any(|interval| interval.end > cursor && slot_end > interval.start);

        if !already_past && !overlaps_busy {
            let local_start = cursor.with_timezone(&timezone);
            slots.push(TimeSlot {
                date: local_start.date_naive(),
                start_local: local_start.time(),
                start: cursor,
                end: slot_end,
            });
        }

        cursor = slot_end;
    }

    slots
}
