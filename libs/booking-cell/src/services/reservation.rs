use std::sync::Arc;

use chrono::{DateTime, NaiveTime, Utc};
use futures::future::join_all;
use tracing::{debug, error, info, warn};

use calendar_client::{CalendarClient, RemoteEvent};
use scheduling_cell::services::dates::{combine_zoned, resolve_next_occurrence};
use scheduling_cell::AvailabilityEngine;
use shared_models::{Provider, ProviderDirectory, UserRef};

use crate::models::{BookingError, DayChoice, Reservation};

/// Creates, finds, and deletes reservations in the remote store.
///
/// Owns the two booking invariants: one active reservation per
/// (user, provider), and the busy re-fetch immediately before every
/// insert. No insert path skips the re-fetch.
pub struct ReservationManager {
    calendar: Arc<CalendarClient>,
    availability: Arc<AvailabilityEngine>,
    directory: Arc<ProviderDirectory>,
    max_listed: usize,
}

impl ReservationManager {
    pub fn new(
        calendar: Arc<CalendarClient>,
        availability: Arc<AvailabilityEngine>,
        directory: Arc<ProviderDirectory>,
        max_listed: usize,
    ) -> Self {
        Self {
            calendar,
            availability,
            directory,
            max_listed,
        }
    }

    pub fn directory(&self) -> &ProviderDirectory {
        &self.directory
    }

    /// Earliest future reservation this user holds with `provider`, if any.
    /// Used as the pre-booking gate.
    pub async fn has_active_reservation(
        &self,
        user: &UserRef,
        provider: &Provider,
        now: DateTime<Utc>,
    ) -> Result<Option<Reservation>, BookingError> {
        let marker = ownership_marker(user.id);
        let events = self
            .calendar
            .list_events(&provider.calendar_key, now, &marker, 5)
            .await?;

        let existing = events
            .into_iter()
            .filter_map(|event| reservation_from_event(event, provider, user.id))
            .find(|reservation| reservation.start > now);

        if let Some(ref reservation) = existing {
            debug!(
                "User {} already holds {} with {} starting {}",
                user.id, reservation.event_id, provider.name, reservation.start
            );
        }
        Ok(existing)
    }

    /// Book a slot for `user` with `provider`.
    ///
    /// Rejects with `ConflictExists` when the user already holds a future
    /// reservation with this provider, re-validates the slot against a
    /// fresh busy query, then inserts. Insert failure leaves no partial
    /// state behind.
    pub async fn book(
        &self,
        provider: &Provider,
        day: &DayChoice,
        time_of_day: NaiveTime,
        user: &UserRef,
        now: DateTime<Utc>,
    ) -> Result<Reservation, BookingError> {
        if let Some(existing) = self.has_active_reservation(user, provider, now).await? {
            let timezone = self.availability.rules().timezone;
            return Err(BookingError::ConflictExists {
                provider: provider.name.clone(),
                details: existing.display_start(timezone),
            });
        }

        self.book_unguarded(provider, day, time_of_day, user, now)
            .await
    }

    /// All future reservations for `user` across every configured provider,
    /// merged and sorted ascending, capped at the configured listing limit.
    ///
    /// Best-effort aggregation: a provider whose calendar query fails is
    /// logged and skipped rather than failing the whole listing.
    pub async fn find_all_future_reservations(
        &self,
        user: &UserRef,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reservation>, BookingError> {
        let marker = ownership_marker(user.id);
        let fetch_cap = self.max_listed + 5;

        let lookups = self.directory.iter().map(|provider| {
            let marker = marker.clone();
            async move {
                let outcome = self
                    .calendar
                    .list_events(&provider.calendar_key, now, &marker, fetch_cap)
                    .await;
                (provider, outcome)
            }
        });

        let mut found = Vec::new();
        for (provider, outcome) in join_all(lookups).await {
            match outcome {
                Ok(events) => {
                    found.extend(
                        events
                            .into_iter()
                            .filter_map(|event| reservation_from_event(event, provider, user.id))
                            .filter(|reservation| reservation.start > now),
                    );
                }
                Err(e) => {
                    warn!(
                        "Skipping calendar for {} while listing reservations: {}",
                        provider.name, e
                    );
                }
            }
        }

        found.sort_by_key(|reservation| reservation.start);
        found.truncate(self.max_listed);
        debug!(
            "Found {} future reservations for user {}",
            found.len(),
            user.id
        );
        Ok(found)
    }

    /// Delete a reservation event. Deleting an event that is already gone
    /// succeeds, so repeated cancellation is safe.
    pub async fn cancel(&self, calendar_key: &str, event_id: &str) -> Result<(), BookingError> {
        self.calendar.delete_event(calendar_key, event_id).await?;
        info!("Reservation {} cancelled on {}", event_id, calendar_key);
        Ok(())
    }

    /// Fetch one reservation's detail for the edit flow. `Ok(None)` when
    /// the store no longer has it, or it is not this user's event.
    pub async fn get_reservation(
        &self,
        provider: &Provider,
        event_id: &str,
        user_id: i64,
    ) -> Result<Option<Reservation>, BookingError> {
        let event = self
            .calendar
            .get_event(&provider.calendar_key, event_id)
            .await?;
        Ok(event.and_then(|event| reservation_from_event(event, provider, user_id)))
    }

    /// Move a reservation to a new day/time (and optionally provider) by
    /// deleting the original and booking the replacement.
    ///
    /// If the delete fails the original stays in place. If the replacement
    /// booking fails after the delete succeeded, the user is left without a
    /// reservation; that case surfaces as `RescheduleLostSlot` so the
    /// caller can tell the user to rebook.
    pub async fn reschedule(
        &self,
        current: &Reservation,
        new_provider: Option<&Provider>,
        new_day: &DayChoice,
        new_time: NaiveTime,
        user: &UserRef,
        now: DateTime<Utc>,
    ) -> Result<Reservation, BookingError> {
        self.calendar
            .delete_event(&current.provider.calendar_key, &current.event_id)
            .await?;
        info!(
            "Original reservation {} removed for reschedule by user {}",
            current.event_id, user.id
        );

        let provider = new_provider.unwrap_or(&current.provider);
        match self
            .book_unguarded(provider, new_day, new_time, user, now)
            .await
        {
            Ok(reservation) => Ok(reservation),
            Err(e) => {
                error!(
                    "Replacement booking failed after deleting {} for user {}: {}",
                    current.event_id, user.id, e
                );
                Err(BookingError::RescheduleLostSlot(Box::new(e)))
            }
        }
    }

    /// Shared insert path. Every caller goes through the fresh-busy
    /// re-validation here; there is no way to insert without it.
    async fn book_unguarded(
        &self,
        provider: &Provider,
        day: &DayChoice,
        time_of_day: NaiveTime,
        user: &UserRef,
        now: DateTime<Utc>,
    ) -> Result<Reservation, BookingError> {
        let rules = self.availability.rules();
        let target_date = match day {
            DayChoice::Weekday(name) => {
                let today = now.with_timezone(&rules.timezone).date_naive();
                resolve_next_occurrence(name, today)?
            }
            DayChoice::Date(date) => *date,
        };

        let start = combine_zoned(target_date, time_of_day, rules.timezone)?;
        let end = start + rules.slot_duration;

        // Close the race between "user saw free slot" and "user confirmed":
        // the slot must still be free against the store as of right now.
        let fresh_slots = self
            .availability
            .compute_free_slots(provider, target_date, now)
            .await?;
        if !fresh_slots.iter().any(|slot| slot.start == start) {
            warn!(
                "Slot {} with {} no longer free at confirmation time (user {})",
                start, provider.name, user.id
            );
            return Err(BookingError::NoAvailability);
        }

        let summary = format!("{} with {}", user.display_name, provider.name);
        let description = ownership_description(user);
        let created = self
            .calendar
            .insert_event(
                &provider.calendar_key,
                start,
                end,
                rules.timezone.name(),
                &summary,
                &description,
            )
            .await
            .map_err(BookingError::BookingFailed)?;

        info!(
            "Reservation {} created for user {} with {} at {}",
            created.id, user.id, provider.name, start
        );
        Ok(Reservation {
            event_id: created.id,
            provider: provider.clone(),
            user_id: user.id,
            summary,
            start,
            end,
            html_link: created.html_link,
        })
    }
}

/// Machine-parseable ownership marker embedded in event descriptions and
/// used verbatim as the search text for ownership-scoped queries.
pub fn ownership_marker(user_id: i64) -> String {
    format!("Chat ID: {}", user_id)
}

fn ownership_description(user: &UserRef) -> String {
    format!(
        "Booked via scheduling assistant.\nUsername: @{}\n{}",
        user.username.as_deref().unwrap_or("N/A"),
        ownership_marker(user.id),
    )
}

/// The store's text search matches loosely, so ownership is re-checked
/// with an exact substring match on the description.
fn reservation_from_event(
    event: RemoteEvent,
    provider: &Provider,
    user_id: i64,
) -> Option<Reservation> {
    let marker = ownership_marker(user_id);
    if !event
        .description
        .as_deref()
        .is_some_and(|description| description.contains(&marker))
    {
        return None;
    }

    let start = event.start_instant()?;
    let end = event.end_instant()?;
    Some(Reservation {
        event_id: event.id,
        provider: provider.clone(),
        user_id,
        summary: event.summary.unwrap_or_else(|| "Appointment".to_string()),
        start,
        end,
        html_link: event.html_link,
    })
}
