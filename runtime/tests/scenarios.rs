//! End-to-end booking scenarios against the in-memory harness.
//!
//! The harness provider works 10:00-18:00 every day and the clock starts at
//! 2025-01-01 00:00 UTC, the day before `test_date()`.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use booking_engine_core::{BookingError, BookingStatus, NaiveDate};
use booking_engine_runtime::CompletionData;
use booking_engine_testing::BookingHarness;
use booking_engine_testing::fixtures::{booking_at, hm, test_date, with_status};

#[tokio::test]
async fn test_slots_skip_a_confirmed_booking() {
    let harness = BookingHarness::new();
    let booking = harness.book(test_date(), hm(12, 0), hm(13, 0)).await.unwrap();
    harness
        .service
        .confirm_booking(booking.id, harness.provider())
        .await
        .unwrap();

    let slots = harness
        .service
        .get_available_slots_with_step(harness.provider_id, test_date(), 60, 60)
        .await
        .unwrap();

    let starts: Vec<_> = slots.iter().map(|slot| slot.start).collect();
    assert_eq!(
        starts,
        vec![hm(10, 0), hm(11, 0), hm(13, 0), hm(14, 0), hm(15, 0), hm(16, 0), hm(17, 0)]
    );
    assert!(slots.iter().all(|slot| slot.duration_minutes == 60));
}

#[tokio::test]
async fn test_booking_yesterday_is_past_time_and_writes_nothing() {
    let harness = BookingHarness::new();
    let yesterday = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();

    let result = harness.book(yesterday, hm(10, 0), hm(11, 0)).await;

    assert!(matches!(result, Err(BookingError::PastTime { .. })));
    assert!(harness.store.is_empty());
    assert_eq!(harness.store.write_count(), 0);
}

#[tokio::test]
async fn test_client_cannot_confirm() {
    let harness = BookingHarness::new();
    let booking = harness.book(test_date(), hm(10, 0), hm(11, 0)).await.unwrap();

    let result = harness.service.confirm_booking(booking.id, harness.client()).await;

    assert!(matches!(result, Err(BookingError::Unauthorized { .. })));
    let stored = harness.store.get(booking.id).unwrap();
    assert_eq!(stored.status, BookingStatus::Pending);
    assert!(stored.confirmed_at.is_none());
}

#[tokio::test]
async fn test_completed_booking_cannot_be_cancelled() {
    let harness = BookingHarness::new();
    let mut completed = with_status(booking_at(hm(10, 0), hm(11, 0)), BookingStatus::Completed);
    completed.provider_id = harness.provider_id;
    let before = completed.clone();
    harness.store.seed(completed);

    let result = harness
        .service
        .cancel_booking(before.id, harness.admin(), "changed my mind")
        .await;

    assert_eq!(
        result.unwrap_err(),
        BookingError::InvalidTransition {
            booking_id: before.id,
            from: BookingStatus::Completed,
            to: BookingStatus::Cancelled,
        }
    );
    let after = harness.store.get(before.id).unwrap();
    assert_eq!(after, before);
    assert!(after.cancelled_at.is_none());
}

#[tokio::test]
async fn test_completion_waits_for_the_end_and_happens_once() {
    let harness = BookingHarness::new();
    let booking = harness.book(test_date(), hm(10, 0), hm(11, 0)).await.unwrap();
    harness
        .service
        .confirm_booking(booking.id, harness.provider())
        .await
        .unwrap();

    harness.set_now(test_date(), hm(10, 30));
    let early = harness
        .service
        .complete_booking(booking.id, CompletionData::by(harness.provider()))
        .await;
    assert!(matches!(early, Err(BookingError::Validation { .. })));
    assert_eq!(harness.store.get(booking.id).unwrap().status, BookingStatus::Confirmed);

    harness.set_now(test_date(), hm(11, 1));
    let completed = harness
        .service
        .complete_booking(booking.id, CompletionData::by(harness.provider()))
        .await
        .unwrap();
    assert_eq!(completed.status, BookingStatus::Completed);
    let completed_at = completed.completed_at.unwrap();
    let writes = harness.store.write_count();

    let again = harness
        .service
        .complete_booking(booking.id, CompletionData::by(harness.provider()))
        .await;
    assert!(matches!(again, Err(BookingError::InvalidTransition { .. })));
    assert_eq!(harness.store.write_count(), writes);
    assert_eq!(harness.store.get(booking.id).unwrap().completed_at, Some(completed_at));
}

#[tokio::test]
async fn test_full_lifecycle_emits_events_in_order() {
    let harness = BookingHarness::new();
    let booking = harness.book(test_date(), hm(14, 0), hm(15, 30)).await.unwrap();
    harness
        .service
        .confirm_booking(booking.id, harness.provider())
        .await
        .unwrap();
    harness.set_now(test_date(), hm(16, 0));
    harness
        .service
        .complete_booking(
            booking.id,
            CompletionData {
                completed_by: harness.provider(),
                notes: Some("all good".into()),
            },
        )
        .await
        .unwrap();

    harness.service.flush_events().await;
    assert_eq!(
        harness.notifier.event_types(),
        ["BookingCreated", "BookingConfirmed", "BookingCompleted"]
    );
    assert_eq!(harness.ratings.recalculated(), [harness.provider_id]);
}
