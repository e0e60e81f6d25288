use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use booking_cell::{BookingError, DayChoice, ReservationManager};
use scheduling_cell::services::dates::parse_time_of_day;
use scheduling_cell::{AvailabilityEngine, ScheduleError};
use shared_models::{Provider, ProviderDirectory};

use crate::models::{
    day_menu_labels, main_menu_labels, ChatInput, Reply, Selection, CANCEL_ACTION, MENU_BOOK,
    MENU_CANCEL_RESERVATION, MENU_EDIT_RESERVATION, MENU_OPERATOR,
};
use crate::services::session::{ConversationState, EditDraft, Session};

const TEXT_RESTART: &str = "Something went wrong on my side, so I have returned to the main menu.";
const TEXT_REMOTE_TROUBLE: &str =
    "I couldn't reach the calendar right now. Please try again in a few minutes.";

/// Drives the multi-turn booking/edit/cancel dialogue.
///
/// One entry point, `handle_input`, matches on (state, input) and returns
/// the outgoing messages plus the mutated session. Every mutating failure
/// lands the session somewhere the user can act from, and the global
/// cancel works from every state.
pub struct ConversationEngine {
    reservations: Arc<ReservationManager>,
    availability: Arc<AvailabilityEngine>,
    directory: Arc<ProviderDirectory>,
    operator_chat_id: Option<i64>,
}

impl ConversationEngine {
    pub fn new(
        reservations: Arc<ReservationManager>,
        availability: Arc<AvailabilityEngine>,
        directory: Arc<ProviderDirectory>,
        operator_chat_id: Option<i64>,
    ) -> Self {
        Self {
            reservations,
            availability,
            directory,
            operator_chat_id,
        }
    }

    pub async fn handle_input(
        &self,
        session: &mut Session,
        input: ChatInput,
        now: DateTime<Utc>,
    ) -> Vec<Reply> {
        if input.is_cancel() {
            info!(
                "User {} cancelled from state {:?}",
                session.user.id, session.state
            );
            return self.reset_to_menu(session, "Action cancelled.");
        }

        match session.state {
            ConversationState::Idle => self.handle_idle(session, input, now).await,
            ConversationState::AwaitingProvider => {
                self.handle_awaiting_provider(session, input, now).await
            }
            ConversationState::AwaitingDay => self.handle_day(session, input, now, false).await,
            ConversationState::AwaitingTimeslot => {
                self.handle_timeslot(session, input, now, false).await
            }
            ConversationState::AwaitingEditSelection => {
                self.handle_edit_selection(session, input, now).await
            }
            ConversationState::AwaitingEditConfirmation => {
                self.handle_edit_confirmation(session, input).await
            }
            ConversationState::AwaitingNewDay => self.handle_day(session, input, now, true).await,
            ConversationState::AwaitingNewTimeslot => {
                self.handle_timeslot(session, input, now, true).await
            }
            ConversationState::AwaitingFinalConfirmation => {
                self.handle_final_confirmation(session, input, now).await
            }
            ConversationState::TalkingToOperator => self.handle_operator_message(session, input),
        }
    }

    // ------------------------------------------------------------------
    // Idle: main menu dispatch
    // ------------------------------------------------------------------

    async fn handle_idle(
        &self,
        session: &mut Session,
        input: ChatInput,
        now: DateTime<Utc>,
    ) -> Vec<Reply> {
        match input {
            ChatInput::Selection(Selection::CancelReservation { event_id, provider }) => {
                self.cancel_reservation(session, &event_id, &provider).await
            }
            ChatInput::Selection(_) => {
                vec![self.menu("That choice is no longer active. Pick an option:")]
            }
            ChatInput::Text(text) => {
                let text = text.trim();
                if text == MENU_BOOK {
                    session.state = ConversationState::AwaitingProvider;
                    vec![self.provider_prompt("Which provider would you like to see?")]
                } else if text == MENU_CANCEL_RESERVATION {
                    self.offer_reservations_for_cancel(session, now).await
                } else if text == MENU_EDIT_RESERVATION {
                    self.offer_reservations_for_edit(session, now).await
                } else if text == MENU_OPERATOR {
                    if self.operator_chat_id.is_some() {
                        session.state = ConversationState::TalkingToOperator;
                        vec![Reply::to_user("Write your message for the operator:")
                            .with_labels(vec![CANCEL_ACTION.to_string()])]
                    } else {
                        vec![self.menu("The operator channel is not configured right now.")]
                    }
                } else if text == "/start" {
                    vec![self.menu(&format!(
                        "Hello {}! I can help you book, edit, or cancel appointments.",
                        session.user.display_name
                    ))]
                } else {
                    vec![self.menu("I didn't understand that. Pick one of the options:")]
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Booking flow
    // ------------------------------------------------------------------

    async fn handle_awaiting_provider(
        &self,
        session: &mut Session,
        input: ChatInput,
        now: DateTime<Utc>,
    ) -> Vec<Reply> {
        let ChatInput::Text(text) = input else {
            return vec![self.provider_prompt("Please pick a provider from the list:")];
        };
        let Some(provider) = self.directory.by_name(text.trim()).cloned() else {
            return vec![self.provider_prompt(&format!(
                "'{}' is not one of the available providers. Pick one from the list:",
                text.trim()
            ))];
        };

        // One active reservation per (user, provider): gate before offering days.
        match self
            .reservations
            .has_active_reservation(&session.user, &provider, now)
            .await
        {
            Ok(Some(existing)) => {
                let timezone = self.availability.rules().timezone;
                vec![self.provider_prompt(&format!(
                    "You already have a reservation with {} on {}. Cancel it first from the main menu, or pick another provider:",
                    provider.name,
                    existing.display_start(timezone)
                ))]
            }
            Ok(None) => {
                session.draft.provider = Some(provider.clone());
                session.state = ConversationState::AwaitingDay;
                vec![Reply::to_user(format!(
                    "Great. Which day would you like to see {}?",
                    provider.name
                ))
                .with_labels(day_menu_labels())]
            }
            Err(e) => {
                warn!("Availability gate failed for user {}: {}", session.user.id, e);
                self.reset_to_menu(session, TEXT_REMOTE_TROUBLE)
            }
        }
    }

    /// Day selection, shared between the booking flow and the edit flow.
    async fn handle_day(
        &self,
        session: &mut Session,
        input: ChatInput,
        now: DateTime<Utc>,
        editing: bool,
    ) -> Vec<Reply> {
        let ChatInput::Text(text) = input else {
            return vec![self.day_reprompt("Please pick a day from the list:")];
        };
        let day_name = text.trim().to_string();

        let provider = if editing {
            session.edit.as_ref().map(|edit| edit.original.provider.clone())
        } else {
            session.draft.provider.clone()
        };
        let Some(provider) = provider else {
            return self.reset_to_menu(session, TEXT_RESTART);
        };

        let timezone = self.availability.rules().timezone;
        let today = now.with_timezone(&timezone).date_naive();
        let date = match scheduling_cell::services::dates::resolve_next_occurrence(&day_name, today)
        {
            Ok(date) => date,
            Err(ScheduleError::InvalidWeekday(_)) => {
                return vec![self.day_reprompt(&format!(
                    "'{}' is not a day I can book. Pick one from the list:",
                    day_name
                ))];
            }
            Err(e) => {
                warn!("Day resolution failed for user {}: {}", session.user.id, e);
                return vec![self.day_reprompt("Please pick a day from the list:")];
            }
        };

        if editing {
            if let Some(edit) = session.edit.as_mut() {
                edit.new_day = Some(day_name.clone());
                edit.new_date = Some(date);
            }
        } else {
            session.draft.day = Some(day_name.clone());
            session.draft.date = Some(date);
        }

        self.offer_slots(
            session,
            &provider,
            date,
            now,
            editing,
            &format!(
                "Available times for {} on {} ({}):",
                provider.name,
                day_name,
                date.format("%d/%m")
            ),
        )
        .await
    }

    /// Time selection, shared between the booking flow and the edit flow.
    async fn handle_timeslot(
        &self,
        session: &mut Session,
        input: ChatInput,
        now: DateTime<Utc>,
        editing: bool,
    ) -> Vec<Reply> {
        let (provider, date) = if editing {
            match session.edit.as_ref() {
                Some(edit) => (edit.original.provider.clone(), edit.new_date),
                None => return self.reset_to_menu(session, TEXT_RESTART),
            }
        } else {
            (
                match session.draft.provider.clone() {
                    Some(provider) => provider,
                    None => return self.reset_to_menu(session, TEXT_RESTART),
                },
                session.draft.date,
            )
        };
        let Some(date) = date else {
            return self.reset_to_menu(session, TEXT_RESTART);
        };

        let ChatInput::Text(text) = input else {
            return self
                .offer_slots(session, &provider, date, now, editing, "Pick a time:")
                .await;
        };
        let time = match parse_time_of_day(&text) {
            Ok(time) => time,
            Err(_) => {
                return self
                    .offer_slots(
                        session,
                        &provider,
                        date,
                        now,
                        editing,
                        &format!("'{}' is not one of the offered times. Pick a time:", text.trim()),
                    )
                    .await;
            }
        };

        if editing {
            return self.confirm_edit_time(session, &provider, date, time, now).await;
        }

        let day = match session.draft.day.clone() {
            Some(day) => DayChoice::Weekday(day),
            None => DayChoice::Date(date),
        };
        match self
            .reservations
            .book(&provider, &day, time, &session.user, now)
            .await
        {
            Ok(reservation) => {
                let timezone = self.availability.rules().timezone;
                let mut replies = vec![Reply::to_user(format!(
                    "Booked! {} on {}.{}",
                    provider.name,
                    reservation.display_start(timezone),
                    reservation
                        .html_link
                        .as_deref()
                        .map(|link| format!("\nDetails: {}", link))
                        .unwrap_or_default()
                ))];
                session.reset();
                replies.push(self.menu("Anything else?"));
                replies
            }
            Err(BookingError::NoAvailability) => {
                self.offer_slots(
                    session,
                    &provider,
                    date,
                    now,
                    editing,
                    "That time was just taken. These are the times still free:",
                )
                .await
            }
            Err(BookingError::ConflictExists { provider, details }) => self.reset_to_menu(
                session,
                &format!(
                    "You already have a reservation with {} on {}. Cancel it first if you want a different time.",
                    provider, details
                ),
            ),
            Err(BookingError::Schedule(ScheduleError::AmbiguousLocalTime { .. })) => {
                self.offer_slots(
                    session,
                    &provider,
                    date,
                    now,
                    editing,
                    "That time falls inside a clock change on that date and cannot be booked. Pick a different time:",
                )
                .await
            }
            Err(e) => {
                warn!("Booking failed for user {}: {}", session.user.id, e);
                self.reset_to_menu(
                    session,
                    "I couldn't save your booking. Please try again later or contact the operator.",
                )
            }
        }
    }

    // ------------------------------------------------------------------
    // Cancel flow (reservation selections arrive while Idle)
    // ------------------------------------------------------------------

    async fn offer_reservations_for_cancel(
        &self,
        session: &mut Session,
        now: DateTime<Utc>,
    ) -> Vec<Reply> {
        match self
            .reservations
            .find_all_future_reservations(&session.user, now)
            .await
        {
            Ok(reservations) if reservations.is_empty() => {
                vec![self.menu("I found no upcoming reservations under your name.")]
            }
            Ok(reservations) => {
                let timezone = self.availability.rules().timezone;
                let selections = reservations
                    .iter()
                    .map(|reservation| {
                        (
                            format!(
                                "{} {}",
                                reservation.provider.name,
                                reservation.display_start(timezone)
                            ),
                            Selection::CancelReservation {
                                event_id: reservation.event_id.clone(),
                                provider: reservation.provider.name.clone(),
                            },
                        )
                    })
                    .collect();
                vec![Reply::to_user("Which reservation do you want to cancel?")
                    .with_selections(selections)]
            }
            Err(e) => {
                warn!(
                    "Listing reservations failed for user {}: {}",
                    session.user.id, e
                );
                vec![self.menu(TEXT_REMOTE_TROUBLE)]
            }
        }
    }

    async fn cancel_reservation(
        &self,
        session: &mut Session,
        event_id: &str,
        provider_name: &str,
    ) -> Vec<Reply> {
        let Some(provider) = self.directory.by_name(provider_name).cloned() else {
            return vec![self.menu("That reservation's provider is no longer configured.")];
        };
        match self
            .reservations
            .cancel(&provider.calendar_key, event_id)
            .await
        {
            Ok(()) => {
                info!(
                    "User {} cancelled reservation {} with {}",
                    session.user.id, event_id, provider.name
                );
                vec![self.menu(&format!("Your reservation with {} is cancelled.", provider.name))]
            }
            Err(e) => {
                warn!(
                    "Cancel failed for user {} event {}: {}",
                    session.user.id, event_id, e
                );
                vec![self.menu("I couldn't cancel that reservation. Please try again later.")]
            }
        }
    }

    // ------------------------------------------------------------------
    // Edit flow
    // ------------------------------------------------------------------

    async fn offer_reservations_for_edit(
        &self,
        session: &mut Session,
        now: DateTime<Utc>,
    ) -> Vec<Reply> {
        match self
            .reservations
            .find_all_future_reservations(&session.user, now)
            .await
        {
            Ok(reservations) if reservations.is_empty() => {
                vec![self.menu("You have no upcoming reservations to edit.")]
            }
            Ok(reservations) => {
                let timezone = self.availability.rules().timezone;
                let selections = reservations
                    .iter()
                    .map(|reservation| {
                        (
                            format!(
                                "{} {}",
                                reservation.provider.name,
                                reservation.display_start(timezone)
                            ),
                            Selection::EditReservation {
                                event_id: reservation.event_id.clone(),
                                provider: reservation.provider.name.clone(),
                            },
                        )
                    })
                    .collect();
                session.state = ConversationState::AwaitingEditSelection;
                vec![Reply::to_user("Which reservation do you want to move?")
                    .with_selections(selections)]
            }
            Err(e) => {
                warn!(
                    "Listing reservations for edit failed for user {}: {}",
                    session.user.id, e
                );
                vec![self.menu(TEXT_REMOTE_TROUBLE)]
            }
        }
    }

    async fn handle_edit_selection(
        &self,
        session: &mut Session,
        input: ChatInput,
        _now: DateTime<Utc>,
    ) -> Vec<Reply> {
        let ChatInput::Selection(Selection::EditReservation { event_id, provider }) = input else {
            return vec![
                Reply::to_user("Please pick one of the listed reservations, or cancel.")
                    .with_labels(vec![CANCEL_ACTION.to_string()]),
            ];
        };
        let Some(provider) = self.directory.by_name(&provider).cloned() else {
            return self.reset_to_menu(session, "That reservation's provider is no longer configured.");
        };

        match self
            .reservations
            .get_reservation(&provider, &event_id, session.user.id)
            .await
        {
            Ok(Some(reservation)) => {
                let timezone = self.availability.rules().timezone;
                let text = format!(
                    "You picked your reservation with {} on {}. Do you want to move it to a new day and time?",
                    reservation.provider.name,
                    reservation.display_start(timezone)
                );
                session.edit = Some(EditDraft::new(reservation));
                session.state = ConversationState::AwaitingEditConfirmation;
                vec![Reply::to_user(text).with_selections(vec![
                    ("Yes, move it".to_string(), Selection::ProceedEdit),
                    ("No, keep it".to_string(), Selection::AbortEdit),
                ])]
            }
            Ok(None) => self.reset_to_menu(
                session,
                "I couldn't find that reservation anymore; it may have been cancelled.",
            ),
            Err(e) => {
                warn!(
                    "Fetching reservation {} failed for user {}: {}",
                    event_id, session.user.id, e
                );
                self.reset_to_menu(session, TEXT_REMOTE_TROUBLE)
            }
        }
    }

    async fn handle_edit_confirmation(
        &self,
        session: &mut Session,
        input: ChatInput,
    ) -> Vec<Reply> {
        match input {
            ChatInput::Selection(Selection::ProceedEdit) => {
                let Some(edit) = session.edit.as_ref() else {
                    return self.reset_to_menu(session, TEXT_RESTART);
                };
                let provider_name = edit.original.provider.name.clone();
                session.state = ConversationState::AwaitingNewDay;
                vec![Reply::to_user(format!(
                    "Which day should the reservation with {} move to?",
                    provider_name
                ))
                .with_labels(day_menu_labels())]
            }
            ChatInput::Selection(Selection::AbortEdit) => {
                self.reset_to_menu(session, "Edit cancelled; your reservation stays as it is.")
            }
            _ => vec![Reply::to_user("Please answer with one of the buttons.").with_selections(
                vec![
                    ("Yes, move it".to_string(), Selection::ProceedEdit),
                    ("No, keep it".to_string(), Selection::AbortEdit),
                ],
            )],
        }
    }

    /// The new time was offered from a fresh slot list; verify it is still
    /// free and ask for the final go-ahead.
    async fn confirm_edit_time(
        &self,
        session: &mut Session,
        provider: &Provider,
        date: NaiveDate,
        time: chrono::NaiveTime,
        now: DateTime<Utc>,
    ) -> Vec<Reply> {
        let slots = match self.availability.compute_free_slots(provider, date, now).await {
            Ok(slots) => slots,
            Err(e) => {
                warn!(
                    "Slot verification failed for user {}: {}",
                    session.user.id, e
                );
                return self.reset_to_menu(session, TEXT_REMOTE_TROUBLE);
            }
        };
        if !slots.iter().any(|slot| slot.start_local == time) {
            return self
                .offer_slots(
                    session,
                    provider,
                    date,
                    now,
                    true,
                    "That time was just taken. These are the times still free:",
                )
                .await;
        }

        let Some(edit) = session.edit.as_mut() else {
            return self.reset_to_menu(session, TEXT_RESTART);
        };
        edit.new_time = Some(time);
        let timezone = self.availability.rules().timezone;
        let summary = format!(
            "You are about to move your reservation:\n\nCurrent: {} on {}\nNew: {} on {} ({}) at {}\n\nConfirm the change?",
            edit.original.provider.name,
            edit.original.display_start(timezone),
            provider.name,
            edit.new_day.as_deref().unwrap_or("the chosen day"),
            date.format("%d/%m/%Y"),
            time.format("%H:%M"),
        );
        session.state = ConversationState::AwaitingFinalConfirmation;
        vec![Reply::to_user(summary).with_selections(vec![
            ("Confirm".to_string(), Selection::FinalizeEdit),
            ("Go back".to_string(), Selection::AbortFinalize),
        ])]
    }

    async fn handle_final_confirmation(
        &self,
        session: &mut Session,
        input: ChatInput,
        now: DateTime<Utc>,
    ) -> Vec<Reply> {
        match input {
            ChatInput::Selection(Selection::FinalizeEdit) => {
                let Some(edit) = session.edit.clone() else {
                    return self.reset_to_menu(session, TEXT_RESTART);
                };
                let (Some(date), Some(time)) = (edit.new_date, edit.new_time) else {
                    return self.reset_to_menu(session, TEXT_RESTART);
                };

                match self
                    .reservations
                    .reschedule(
                        &edit.original,
                        None,
                        &DayChoice::Date(date),
                        time,
                        &session.user,
                        now,
                    )
                    .await
                {
                    Ok(reservation) => {
                        let timezone = self.availability.rules().timezone;
                        let text = format!(
                            "Rescheduled! {} on {}.",
                            reservation.provider.name,
                            reservation.display_start(timezone)
                        );
                        self.reset_to_menu(session, &text)
                    }
                    Err(BookingError::RescheduleLostSlot(cause)) => {
                        warn!(
                            "User {} lost reservation {} during reschedule: {}",
                            session.user.id, edit.original.event_id, cause
                        );
                        self.reset_to_menu(
                            session,
                            "Your original reservation was cancelled, but the new time could not be booked. Please book a fresh appointment from the menu.",
                        )
                    }
                    Err(e) => {
                        warn!(
                            "Reschedule failed before any change for user {}: {}",
                            session.user.id, e
                        );
                        self.reset_to_menu(
                            session,
                            "I couldn't change the reservation; the original one is unchanged. Please try again later.",
                        )
                    }
                }
            }
            ChatInput::Selection(Selection::AbortFinalize) => {
                self.reset_to_menu(session, "Change discarded; your reservation stays as it is.")
            }
            _ => vec![Reply::to_user("Please confirm or go back.").with_selections(vec![
                ("Confirm".to_string(), Selection::FinalizeEdit),
                ("Go back".to_string(), Selection::AbortFinalize),
            ])],
        }
    }

    // ------------------------------------------------------------------
    // Operator escalation
    // ------------------------------------------------------------------

    fn handle_operator_message(&self, session: &mut Session, input: ChatInput) -> Vec<Reply> {
        let ChatInput::Text(text) = input else {
            return vec![Reply::to_user("Write your message for the operator:")
                .with_labels(vec![CANCEL_ACTION.to_string()])];
        };

        let reference = Uuid::new_v4();
        let forwarded = Reply::to_operator(format!(
            "[{}] Message from {} (chat {}):\n{}",
            reference, session.user.display_name, session.chat_id, text
        ));
        info!(
            "Forwarded operator message {} from user {}",
            reference, session.user.id
        );

        let mut replies = vec![forwarded];
        replies.extend(self.reset_to_menu(
            session,
            "Your message was passed to the operator. They will answer in this chat.",
        ));
        replies
    }

    // ------------------------------------------------------------------
    // Shared prompts
    // ------------------------------------------------------------------

    /// Offer the free slots for (provider, date). Never enters a timeslot
    /// state with an empty choice set: with no free slots the session goes
    /// back to day selection.
    async fn offer_slots(
        &self,
        session: &mut Session,
        provider: &Provider,
        date: NaiveDate,
        now: DateTime<Utc>,
        editing: bool,
        lead_text: &str,
    ) -> Vec<Reply> {
        match self.availability.compute_free_slots(provider, date, now).await {
            Ok(slots) if slots.is_empty() => {
                session.state = if editing {
                    ConversationState::AwaitingNewDay
                } else {
                    ConversationState::AwaitingDay
                };
                vec![Reply::to_user(format!(
                    "No free times with {} on {}. Pick another day, or cancel:",
                    provider.name,
                    date.format("%d/%m")
                ))
                .with_labels(day_menu_labels())]
            }
            Ok(slots) => {
                session.state = if editing {
                    ConversationState::AwaitingNewTimeslot
                } else {
                    ConversationState::AwaitingTimeslot
                };
                let labels = slots
                    .iter()
                    .map(|slot| slot.label())
                    .chain(std::iter::once(CANCEL_ACTION.to_string()))
                    .collect();
                vec![Reply::to_user(lead_text.to_string()).with_labels(labels)]
            }
            Err(e) => {
                warn!(
                    "Computing slots failed for user {} with {}: {}",
                    session.user.id, provider.name, e
                );
                self.reset_to_menu(session, TEXT_REMOTE_TROUBLE)
            }
        }
    }

    fn provider_prompt(&self, text: &str) -> Reply {
        let labels = self
            .directory
            .names()
            .into_iter()
            .chain(std::iter::once(CANCEL_ACTION.to_string()))
            .collect();
        Reply::to_user(text.to_string()).with_labels(labels)
    }

    fn day_reprompt(&self, text: &str) -> Reply {
        Reply::to_user(text.to_string()).with_labels(day_menu_labels())
    }

    fn menu(&self, text: &str) -> Reply {
        Reply::to_user(text.to_string()).with_labels(main_menu_labels())
    }

    fn reset_to_menu(&self, session: &mut Session, text: &str) -> Vec<Reply> {
        session.reset();
        vec![self.menu(text)]
    }
}
