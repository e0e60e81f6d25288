use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use booking_cell::{BookingError, DayChoice, ReservationManager};
use calendar_client::CalendarClient;
use scheduling_cell::{AvailabilityEngine, SchedulingConfig};
use shared_config::AppConfig;
use shared_models::{Provider, ProviderDirectory, UserRef};

fn test_config(base_url: &str, providers: &str) -> AppConfig {
    AppConfig {
        calendar_api_url: base_url.to_string(),
        calendar_api_token: "test-token".to_string(),
        messaging_api_url: "http://channel.invalid".to_string(),
        messaging_api_token: String::new(),
        provider_calendars: providers.to_string(),
        business_timezone: "America/Argentina/Buenos_Aires".to_string(),
        office_start_hour: 9,
        office_end_hour: 18,
        slot_duration_minutes: 30,
        max_listed_reservations: 6,
        operator_chat_id: None,
        bind_port: 0,
    }
}

fn manager(server: &MockServer, providers: &str) -> ReservationManager {
    let config = test_config(&server.uri(), providers);
    let calendar = Arc::new(CalendarClient::new(&config));
    let rules = SchedulingConfig::from_app_config(&config).unwrap();
    let availability = Arc::new(AvailabilityEngine::new(Arc::clone(&calendar), rules));
    let directory = Arc::new(config.directory().unwrap());
    ReservationManager::new(calendar, availability, directory, 6)
}

fn provider() -> Provider {
    Provider {
        name: "Dr. Pérez".to_string(),
        calendar_key: "perez@cal".to_string(),
    }
}

fn user(id: i64) -> UserRef {
    UserRef::new(id, "Ana").with_username("ana")
}

fn utc(raw: &str) -> DateTime<Utc> {
    raw.parse().unwrap()
}

fn ten_am_local() -> NaiveTime {
    NaiveTime::from_hms_opt(10, 0, 0).unwrap()
}

fn target_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 3).unwrap()
}

async fn mock_no_owned_events(server: &MockServer, key: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/calendars/{}/events", key)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [] })))
        .mount(server)
        .await;
}

async fn mock_free_day(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/freeBusy"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "calendars": { "perez@cal": { "busy": [] } }
        })))
        .mount(server)
        .await;
}

fn owned_event(id: &str, user_id: i64, start: &str, end: &str) -> serde_json::Value {
    json!({
        "id": id,
        "summary": "Ana with Dr. Pérez",
        "description": format!("Booked via scheduling assistant.\nUsername: @ana\nChat ID: {}", user_id),
        "start": { "dateTime": start },
        "end": { "dateTime": end },
        "htmlLink": format!("https://calendar.example/{}", id)
    })
}

// ------------------------------------------------------------------
// Booking
// ------------------------------------------------------------------

#[tokio::test]
async fn books_a_free_slot_after_revalidation() {
    let server = MockServer::start().await;
    mock_no_owned_events(&server, "perez@cal").await;
    mock_free_day(&server).await;
    Mock::given(method("POST"))
        .and(path("/calendars/perez@cal/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "evt-1",
            "htmlLink": "https://calendar.example/evt-1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let manager = manager(&server, "Dr. Pérez=perez@cal");
    let now = utc("2025-03-03T11:00:00Z");

    let reservation = manager
        .book(
            &provider(),
            &DayChoice::Date(target_date()),
            ten_am_local(),
            &user(42),
            now,
        )
        .await
        .unwrap();

    assert_eq!(reservation.event_id, "evt-1");
    assert_eq!(reservation.user_id, 42);
    // 10:00 local in Buenos Aires is 13:00 UTC.
    assert_eq!(reservation.start, utc("2025-03-03T13:00:00Z"));
    assert_eq!(reservation.end, utc("2025-03-03T13:30:00Z"));
}

#[tokio::test]
async fn books_by_weekday_name() {
    let server = MockServer::start().await;
    mock_no_owned_events(&server, "perez@cal").await;
    mock_free_day(&server).await;
    Mock::given(method("POST"))
        .and(path("/calendars/perez@cal/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "evt-2" })))
        .mount(&server)
        .await;

    let manager = manager(&server, "Dr. Pérez=perez@cal");
    // Monday 2025-03-03, 08:00 local: same-day booking resolves to today.
    let now = utc("2025-03-03T11:00:00Z");

    let reservation = manager
        .book(
            &provider(),
            &DayChoice::Weekday("Lunes".to_string()),
            ten_am_local(),
            &user(42),
            now,
        )
        .await
        .unwrap();

    assert_eq!(reservation.start, utc("2025-03-03T13:00:00Z"));
}

#[tokio::test]
async fn rejects_booking_when_user_already_holds_one_with_provider() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/calendars/perez@cal/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [owned_event("evt-held", 42, "2025-03-05T13:00:00Z", "2025-03-05T13:30:00Z")]
        })))
        .mount(&server)
        .await;

    let manager = manager(&server, "Dr. Pérez=perez@cal");
    let now = utc("2025-03-03T11:00:00Z");

    let err = manager
        .book(
            &provider(),
            &DayChoice::Date(target_date()),
            ten_am_local(),
            &user(42),
            now,
        )
        .await
        .unwrap_err();

    assert_matches!(err, BookingError::ConflictExists { .. });
}

#[tokio::test]
async fn another_users_event_does_not_trip_the_gate() {
    let server = MockServer::start().await;
    // The store's text search can return loosely matching events; ownership
    // is decided by the exact marker in the description.
    Mock::given(method("GET"))
        .and(path("/calendars/perez@cal/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [owned_event("evt-other", 999, "2025-03-05T13:00:00Z", "2025-03-05T13:30:00Z")]
        })))
        .mount(&server)
        .await;
    mock_free_day(&server).await;
    Mock::given(method("POST"))
        .and(path("/calendars/perez@cal/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "evt-3" })))
        .mount(&server)
        .await;

    let manager = manager(&server, "Dr. Pérez=perez@cal");
    let now = utc("2025-03-03T11:00:00Z");

    let reservation = manager
        .book(
            &provider(),
            &DayChoice::Date(target_date()),
            ten_am_local(),
            &user(42),
            now,
        )
        .await
        .unwrap();
    assert_eq!(reservation.event_id, "evt-3");
}

#[tokio::test]
async fn second_booking_for_the_same_slot_is_rejected_after_refetch() {
    let server = MockServer::start().await;
    mock_no_owned_events(&server, "perez@cal").await;

    // First re-validation sees a free day; after the first insert the store
    // reports the slot busy, so the second attempt must fail.
    Mock::given(method("POST"))
        .and(path("/freeBusy"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "calendars": { "perez@cal": { "busy": [] } }
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/freeBusy"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "calendars": { "perez@cal": { "busy": [
                { "start": "2025-03-03T13:00:00Z", "end": "2025-03-03T13:30:00Z" }
            ] } }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/calendars/perez@cal/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "evt-first" })))
        .expect(1)
        .mount(&server)
        .await;

    let manager = manager(&server, "Dr. Pérez=perez@cal");
    let now = utc("2025-03-03T11:00:00Z");

    let first = manager
        .book(
            &provider(),
            &DayChoice::Date(target_date()),
            ten_am_local(),
            &user(42),
            now,
        )
        .await
        .unwrap();
    assert_eq!(first.event_id, "evt-first");

    let second = manager
        .book(
            &provider(),
            &DayChoice::Date(target_date()),
            ten_am_local(),
            &user(43),
            now,
        )
        .await
        .unwrap_err();
    assert_matches!(second, BookingError::NoAvailability);
}

#[tokio::test]
async fn insert_failure_surfaces_as_booking_failed() {
    let server = MockServer::start().await;
    mock_no_owned_events(&server, "perez@cal").await;
    mock_free_day(&server).await;
    Mock::given(method("POST"))
        .and(path("/calendars/perez@cal/events"))
        .respond_with(ResponseTemplate::new(500).set_body_string("insert failed"))
        .mount(&server)
        .await;

    let manager = manager(&server, "Dr. Pérez=perez@cal");
    let now = utc("2025-03-03T11:00:00Z");

    let err = manager
        .book(
            &provider(),
            &DayChoice::Date(target_date()),
            ten_am_local(),
            &user(42),
            now,
        )
        .await
        .unwrap_err();
    assert_matches!(err, BookingError::BookingFailed(_));
}

// ------------------------------------------------------------------
// Listing across providers
// ------------------------------------------------------------------

#[tokio::test]
async fn listing_skips_broken_provider_calendars() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/calendars/a@cal/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [owned_event("evt-a", 42, "2025-03-05T15:00:00Z", "2025-03-05T15:30:00Z")]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/calendars/b@cal/events"))
        .respond_with(ResponseTemplate::new(404).set_body_string("calendar not found"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/calendars/c@cal/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [owned_event("evt-c", 42, "2025-03-04T13:00:00Z", "2025-03-04T13:30:00Z")]
        })))
        .mount(&server)
        .await;

    let manager = manager(&server, "Dr. A=a@cal;Dr. B=b@cal;Dr. C=c@cal");
    let now = utc("2025-03-03T11:00:00Z");

    let reservations = manager
        .find_all_future_reservations(&user(42), now)
        .await
        .unwrap();

    // Provider B's failure is skipped; results are merged and sorted.
    assert_eq!(reservations.len(), 2);
    assert_eq!(reservations[0].event_id, "evt-c");
    assert_eq!(reservations[1].event_id, "evt-a");
}

#[tokio::test]
async fn listing_filters_past_events_and_applies_cap() {
    let server = MockServer::start().await;
    let items: Vec<serde_json::Value> = (0..10)
        .map(|i| {
            owned_event(
                &format!("evt-{}", i),
                42,
                &format!("2025-03-0{}T13:00:00Z", i % 9 + 1),
                &format!("2025-03-0{}T13:30:00Z", i % 9 + 1),
            )
        })
        .collect();
    Mock::given(method("GET"))
        .and(path("/calendars/perez@cal/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": items })))
        .mount(&server)
        .await;

    let manager = manager(&server, "Dr. Pérez=perez@cal");
    let now = utc("2025-03-03T11:00:00Z");

    let reservations = manager
        .find_all_future_reservations(&user(42), now)
        .await
        .unwrap();

    assert!(reservations.len() <= 6);
    assert!(reservations.iter().all(|r| r.start > now));
    assert!(reservations
        .windows(2)
        .all(|pair| pair[0].start <= pair[1].start));
}

// ------------------------------------------------------------------
// Cancellation
// ------------------------------------------------------------------

#[tokio::test]
async fn cancel_is_idempotent() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/calendars/perez@cal/events/evt-1"))
        .respond_with(ResponseTemplate::new(204))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/calendars/perez@cal/events/evt-1"))
        .respond_with(ResponseTemplate::new(410).set_body_string("gone"))
        .mount(&server)
        .await;

    let manager = manager(&server, "Dr. Pérez=perez@cal");
    manager.cancel("perez@cal", "evt-1").await.unwrap();
    manager.cancel("perez@cal", "evt-1").await.unwrap();
}

// ------------------------------------------------------------------
// Rescheduling
// ------------------------------------------------------------------

fn held_reservation() -> booking_cell::Reservation {
    booking_cell::Reservation {
        event_id: "evt-old".to_string(),
        provider: provider(),
        user_id: 42,
        summary: "Ana with Dr. Pérez".to_string(),
        start: utc("2025-03-04T13:00:00Z"),
        end: utc("2025-03-04T13:30:00Z"),
        html_link: None,
    }
}

#[tokio::test]
async fn reschedule_deletes_old_and_books_new() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/calendars/perez@cal/events/evt-old"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    mock_free_day(&server).await;
    Mock::given(method("POST"))
        .and(path("/calendars/perez@cal/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "evt-new" })))
        .mount(&server)
        .await;

    let manager = manager(&server, "Dr. Pérez=perez@cal");
    let now = utc("2025-03-03T11:00:00Z");

    let moved = manager
        .reschedule(
            &held_reservation(),
            None,
            &DayChoice::Date(target_date()),
            ten_am_local(),
            &user(42),
            now,
        )
        .await
        .unwrap();

    assert_eq!(moved.event_id, "evt-new");
    assert_eq!(moved.start, utc("2025-03-03T13:00:00Z"));
}

#[tokio::test]
async fn reschedule_surfaces_lost_slot_when_rebook_fails() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/calendars/perez@cal/events/evt-old"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    // The replacement slot got taken between offer and confirmation.
    Mock::given(method("POST"))
        .and(path("/freeBusy"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "calendars": { "perez@cal": { "busy": [
                { "start": "2025-03-03T13:00:00Z", "end": "2025-03-03T13:30:00Z" }
            ] } }
        })))
        .mount(&server)
        .await;

    let manager = manager(&server, "Dr. Pérez=perez@cal");
    let now = utc("2025-03-03T11:00:00Z");

    let err = manager
        .reschedule(
            &held_reservation(),
            None,
            &DayChoice::Date(target_date()),
            ten_am_local(),
            &user(42),
            now,
        )
        .await
        .unwrap_err();
    assert_matches!(err, BookingError::RescheduleLostSlot(_));
}

#[tokio::test]
async fn reschedule_keeps_original_when_delete_fails() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/calendars/perez@cal/events/evt-old"))
        .respond_with(ResponseTemplate::new(500).set_body_string("backend down"))
        .mount(&server)
        .await;

    let manager = manager(&server, "Dr. Pérez=perez@cal");
    let now = utc("2025-03-03T11:00:00Z");

    let err = manager
        .reschedule(
            &held_reservation(),
            None,
            &DayChoice::Date(target_date()),
            ten_am_local(),
            &user(42),
            now,
        )
        .await
        .unwrap_err();
    // Not a lost slot: nothing was deleted, the original still stands.
    assert_matches!(err, BookingError::RemoteUnavailable(_));
}
