//! Status transitions, rescheduling and event delivery through the service.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use booking_engine_core::{
    Actor, BookingError, BookingEventKind, BookingId, BookingStatus, ClientId, HistoryAction,
    ProviderId,
};
use booking_engine_runtime::{BookingConfig, CompletionData};
use booking_engine_testing::fixtures::{hm, test_date};
use booking_engine_testing::{BookingHarness, FailingNotifier, FailingRatingRecalculator};
use std::sync::Arc;

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_client_cancels_before_the_cutoff() {
    let harness = BookingHarness::new();
    let booking = harness.book(test_date(), hm(10, 0), hm(11, 0)).await.unwrap();

    let cancelled = harness
        .service
        .cancel_booking(booking.id, harness.client(), "sick")
        .await
        .unwrap();

    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("sick"));
    assert!(cancelled.cancelled_at.is_some());
}

#[tokio::test]
async fn test_cancellation_cutoff_binds_participants_not_admins() {
    let harness = BookingHarness::new();
    let booking = harness.book(test_date(), hm(10, 0), hm(11, 0)).await.unwrap();
    // 90 minutes before the start, inside the default 120-minute cutoff
    harness.set_now(test_date(), hm(8, 30));

    let by_client = harness
        .service
        .cancel_booking(booking.id, harness.client(), "late")
        .await;
    assert!(matches!(by_client, Err(BookingError::Validation { .. })));

    let by_admin = harness
        .service
        .cancel_booking(booking.id, harness.admin(), "provider emergency")
        .await
        .unwrap();
    assert_eq!(by_admin.status, BookingStatus::Cancelled);
}

#[tokio::test]
async fn test_stranger_cannot_cancel() {
    let harness = BookingHarness::new();
    let booking = harness.book(test_date(), hm(10, 0), hm(11, 0)).await.unwrap();

    let result = harness
        .service
        .cancel_booking(booking.id, Actor::Client(ClientId::new()), "not mine")
        .await;

    assert!(matches!(result, Err(BookingError::Unauthorized { .. })));
}

#[tokio::test]
async fn test_cancelling_frees_the_interval() {
    let harness = BookingHarness::new();
    let booking = harness.book(test_date(), hm(10, 0), hm(11, 0)).await.unwrap();
    harness
        .service
        .cancel_booking(booking.id, harness.provider(), "closed")
        .await
        .unwrap();

    let rebooked = harness.book(test_date(), hm(10, 0), hm(11, 0)).await;
    assert!(rebooked.is_ok());
}

#[tokio::test]
async fn test_unknown_booking_is_not_found() {
    let harness = BookingHarness::new();
    let id = BookingId::new();

    assert_eq!(
        harness.service.confirm_booking(id, harness.provider()).await,
        Err(BookingError::NotFound(id))
    );
    assert_eq!(harness.service.get_booking(id).await, Err(BookingError::NotFound(id)));
}

// ============================================================================
// Confirmation, completion, no-show
// ============================================================================

#[tokio::test]
async fn test_confirming_after_the_start_is_past_time() {
    let harness = BookingHarness::new();
    let booking = harness.book(test_date(), hm(10, 0), hm(11, 0)).await.unwrap();
    harness.set_now(test_date(), hm(10, 0));

    let result = harness.service.confirm_booking(booking.id, harness.provider()).await;

    assert!(matches!(result, Err(BookingError::PastTime { .. })));
}

#[tokio::test]
async fn test_pending_booking_cannot_complete() {
    let harness = BookingHarness::new();
    let booking = harness.book(test_date(), hm(10, 0), hm(11, 0)).await.unwrap();
    harness.set_now(test_date(), hm(12, 0));

    let result = harness
        .service
        .complete_booking(booking.id, CompletionData::by(harness.provider()))
        .await;

    assert!(matches!(
        result,
        Err(BookingError::InvalidTransition {
            from: BookingStatus::Pending,
            to: BookingStatus::Completed,
            ..
        })
    ));
}

#[tokio::test]
async fn test_only_the_provider_marks_no_show() {
    let harness = BookingHarness::new();
    let booking = harness.book(test_date(), hm(10, 0), hm(11, 0)).await.unwrap();
    harness
        .service
        .confirm_booking(booking.id, harness.provider())
        .await
        .unwrap();
    harness.set_now(test_date(), hm(11, 30));

    let by_client = harness.service.mark_no_show(booking.id, harness.client()).await;
    assert!(matches!(by_client, Err(BookingError::Unauthorized { .. })));

    let by_provider = harness
        .service
        .mark_no_show(booking.id, harness.provider())
        .await
        .unwrap();
    assert_eq!(by_provider.status, BookingStatus::NoShow);
    assert!(by_provider.no_show_at.is_some());
}

#[tokio::test]
async fn test_system_completion_follows_configuration() {
    let disabled = BookingHarness::with_config(BookingConfig::default().with_auto_completion(false));
    let booking = disabled.book(test_date(), hm(10, 0), hm(11, 0)).await.unwrap();
    disabled
        .service
        .confirm_booking(booking.id, disabled.provider())
        .await
        .unwrap();
    disabled.set_now(test_date(), hm(12, 0));
    let result = disabled
        .service
        .complete_booking(booking.id, CompletionData::by(Actor::System))
        .await;
    assert!(matches!(result, Err(BookingError::Unauthorized { .. })));

    let enabled = BookingHarness::new();
    let booking = enabled.book(test_date(), hm(10, 0), hm(11, 0)).await.unwrap();
    enabled
        .service
        .confirm_booking(booking.id, enabled.provider())
        .await
        .unwrap();
    enabled.set_now(test_date(), hm(12, 0));
    let completed = enabled
        .service
        .complete_booking(booking.id, CompletionData::by(Actor::System))
        .await
        .unwrap();
    assert_eq!(completed.status, BookingStatus::Completed);
}

// ============================================================================
// Rescheduling
// ============================================================================

#[tokio::test]
async fn test_reschedule_moves_the_booking_and_keeps_its_duration() {
    let harness = BookingHarness::new();
    let booking = harness.book(test_date(), hm(10, 0), hm(11, 30)).await.unwrap();
    let next_day = test_date().succ_opt().unwrap();

    let moved = harness
        .service
        .reschedule_booking(booking.id, harness.client(), next_day, hm(14, 0))
        .await
        .unwrap();

    assert_eq!(moved.date, next_day);
    assert_eq!(moved.time_start(), hm(14, 0));
    assert_eq!(moved.time_end(), hm(15, 30));
    assert_eq!(moved.reschedule_count, 1);
    assert_eq!(moved.status, BookingStatus::Pending);

    harness.service.flush_events().await;
    let events = harness.notifier.events();
    let last = events.last().unwrap();
    assert!(matches!(
        last.kind,
        BookingEventKind::Rescheduled { from_date, to_date, .. }
            if from_date == test_date() && to_date == next_day
    ));

    // The old interval is free again
    assert!(harness.book(test_date(), hm(10, 0), hm(11, 30)).await.is_ok());
}

#[tokio::test]
async fn test_reschedule_limit_binds_participants() {
    let harness = BookingHarness::new();
    let booking = harness.book(test_date(), hm(10, 0), hm(11, 0)).await.unwrap();

    for start in [hm(12, 0), hm(13, 0)] {
        harness
            .service
            .reschedule_booking(booking.id, harness.client(), test_date(), start)
            .await
            .unwrap();
    }
    let third = harness
        .service
        .reschedule_booking(booking.id, harness.client(), test_date(), hm(14, 0))
        .await;
    assert!(matches!(third, Err(BookingError::Validation { .. })));

    let by_admin = harness
        .service
        .reschedule_booking(booking.id, harness.admin(), test_date(), hm(14, 0))
        .await
        .unwrap();
    assert_eq!(by_admin.reschedule_count, 3);
}

#[tokio::test]
async fn test_reschedule_rejections() {
    let harness = BookingHarness::new();
    let booking = harness.book(test_date(), hm(10, 0), hm(11, 0)).await.unwrap();
    harness.book(test_date(), hm(15, 0), hm(16, 0)).await.unwrap();

    let onto_other = harness
        .service
        .reschedule_booking(booking.id, harness.client(), test_date(), hm(15, 30))
        .await;
    assert!(matches!(onto_other, Err(BookingError::SlotConflict { .. })));

    let same = harness
        .service
        .reschedule_booking(booking.id, harness.client(), test_date(), hm(10, 0))
        .await;
    assert!(matches!(same, Err(BookingError::Validation { .. })));

    let after_hours = harness
        .service
        .reschedule_booking(booking.id, harness.client(), test_date(), hm(17, 30))
        .await;
    assert!(matches!(after_hours, Err(BookingError::Validation { .. })));

    let past = harness
        .service
        .reschedule_booking(
            booking.id,
            harness.client(),
            test_date().pred_opt().unwrap().pred_opt().unwrap(),
            hm(10, 0),
        )
        .await;
    assert!(matches!(past, Err(BookingError::PastTime { .. })));

    let stranger = harness
        .service
        .reschedule_booking(booking.id, Actor::Provider(ProviderId::new()), test_date(), hm(12, 0))
        .await;
    assert!(matches!(stranger, Err(BookingError::Unauthorized { .. })));

    // Overlapping its own current interval is fine
    let shifted = harness
        .service
        .reschedule_booking(booking.id, harness.client(), test_date(), hm(10, 30))
        .await
        .unwrap();
    assert_eq!(shifted.time_start(), hm(10, 30));
}

#[tokio::test]
async fn test_terminal_booking_cannot_be_rescheduled() {
    let harness = BookingHarness::new();
    let booking = harness.book(test_date(), hm(10, 0), hm(11, 0)).await.unwrap();
    harness
        .service
        .cancel_booking(booking.id, harness.client(), "plans changed")
        .await
        .unwrap();

    let result = harness
        .service
        .reschedule_booking(booking.id, harness.admin(), test_date(), hm(12, 0))
        .await;

    assert!(matches!(result, Err(BookingError::Validation { .. })));
}

// ============================================================================
// Event delivery
// ============================================================================

#[tokio::test]
async fn test_failing_collaborators_do_not_fail_operations() {
    let notifier = FailingNotifier::new();
    let harness = BookingHarness::with_event_consumers(
        BookingConfig::default(),
        Arc::new(notifier.clone()),
        Arc::new(FailingRatingRecalculator),
    );

    let booking = harness.book(test_date(), hm(10, 0), hm(11, 0)).await.unwrap();
    harness
        .service
        .confirm_booking(booking.id, harness.provider())
        .await
        .unwrap();
    harness.set_now(test_date(), hm(11, 0));
    let completed = harness
        .service
        .complete_booking(booking.id, CompletionData::by(harness.provider()))
        .await
        .unwrap();

    harness.service.flush_events().await;
    assert_eq!(completed.status, BookingStatus::Completed);
    assert_eq!(notifier.attempts(), 3);
    assert_eq!(
        harness.store.get(booking.id).unwrap().status,
        BookingStatus::Completed
    );
}

#[tokio::test]
async fn test_ratings_recalculate_only_on_completion() {
    let harness = BookingHarness::new();
    let booking = harness.book(test_date(), hm(10, 0), hm(11, 0)).await.unwrap();
    harness
        .service
        .confirm_booking(booking.id, harness.provider())
        .await
        .unwrap();
    harness.set_now(test_date(), hm(11, 0));
    harness
        .service
        .mark_no_show(booking.id, harness.provider())
        .await
        .unwrap();

    harness.service.flush_events().await;
    assert_eq!(
        harness.notifier.event_types(),
        ["BookingCreated", "BookingConfirmed", "BookingNoShow"]
    );
    assert!(harness.ratings.recalculated().is_empty());
}

#[tokio::test]
async fn test_rejected_operations_emit_nothing() {
    let harness = BookingHarness::new();
    let booking = harness.book(test_date(), hm(10, 0), hm(11, 0)).await.unwrap();
    let _ = harness.book(test_date(), hm(10, 0), hm(11, 0)).await;
    let _ = harness.service.confirm_booking(booking.id, harness.client()).await;

    harness.service.flush_events().await;
    assert_eq!(harness.notifier.event_types(), ["BookingCreated"]);
}

// ============================================================================
// History
// ============================================================================

#[tokio::test]
async fn test_history_records_every_committed_action() {
    let harness = BookingHarness::new();
    let booking = harness.book(test_date(), hm(10, 0), hm(11, 0)).await.unwrap();
    harness
        .service
        .reschedule_booking(booking.id, harness.client(), test_date(), hm(14, 0))
        .await
        .unwrap();
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
                notes: Some("went well".into()),
            },
        )
        .await
        .unwrap();

    let history = harness.service.get_booking_history(booking.id).await.unwrap();

    let actions: Vec<HistoryAction> = history.iter().map(|entry| entry.action).collect();
    assert_eq!(
        actions,
        [
            HistoryAction::Created,
            HistoryAction::Rescheduled,
            HistoryAction::Confirmed,
            HistoryAction::Completed,
        ]
    );
    assert_eq!(history[0].actor, harness.client());
    assert_eq!(history[1].previous_time, Some(booking.time));
    assert_eq!(history[2].actor, harness.provider());
    assert_eq!(history[2].previous_status, Some(BookingStatus::Pending));
    assert_eq!(history[3].notes.as_deref(), Some("went well"));
    assert_eq!(history[3].new_status, BookingStatus::Completed);
}

#[tokio::test]
async fn test_history_keeps_cancellation_reason_and_skips_rejections() {
    let harness = BookingHarness::new();
    let booking = harness.book(test_date(), hm(10, 0), hm(11, 0)).await.unwrap();
    let _ = harness.service.confirm_booking(booking.id, harness.client()).await;
    harness
        .service
        .cancel_booking(booking.id, harness.admin(), "provider ill")
        .await
        .unwrap();

    let history = harness.service.get_booking_history(booking.id).await.unwrap();

    assert_eq!(history.len(), 2);
    assert_eq!(history[1].action, HistoryAction::Cancelled);
    assert_eq!(history[1].actor, harness.admin());
    assert_eq!(history[1].reason.as_deref(), Some("provider ill"));
}

#[tokio::test]
async fn test_history_of_unknown_booking_is_not_found() {
    let harness = BookingHarness::new();
    let id = BookingId::new();

    let result = harness.service.get_booking_history(id).await;

    assert_eq!(result.unwrap_err(), BookingError::NotFound(id));
}
