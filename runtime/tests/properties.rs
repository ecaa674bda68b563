//! Property tests: whatever sequence of requests arrives, the schedule stays consistent.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use booking_engine_core::{BookingError, TimeRange};
use booking_engine_testing::fixtures::test_date;
use booking_engine_testing::properties::arb_time_range;
use booking_engine_testing::{BookingHarness, init_tracing};
use proptest::prelude::*;

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_created_bookings_never_overlap(requests in prop::collection::vec(arb_time_range(15, 180), 1..24)) {
        init_tracing();
        let (stored, outcomes) = block_on(async {
            let harness = BookingHarness::new();
            let mut outcomes = Vec::new();
            for range in &requests {
                outcomes.push(harness.book(test_date(), range.start(), range.end()).await);
            }
            (harness.store.all(), outcomes)
        });

        for outcome in &outcomes {
            let expected = matches!(
                outcome,
                Ok(_) | Err(BookingError::SlotConflict { .. } | BookingError::Validation { .. })
            );
            prop_assert!(expected, "unexpected outcome {:?}", outcome);
        }
        for (i, a) in stored.iter().enumerate() {
            for b in &stored[i + 1..] {
                prop_assert!(!a.time.overlaps(&b.time));
            }
        }
    }

    #[test]
    fn prop_offered_slots_are_bookable(requests in prop::collection::vec(arb_time_range(30, 120), 0..8)) {
        let (busy, offered, booked) = block_on(async {
            let harness = BookingHarness::new();
            for range in &requests {
                let _ = harness.book(test_date(), range.start(), range.end()).await;
            }
            let busy: Vec<TimeRange> = harness.store.all().iter().map(|booking| booking.time).collect();
            let offered = harness
                .service
                .get_available_slots(harness.provider_id, test_date(), 30)
                .await
                .unwrap();
            let booked = match offered.first() {
                Some(slot) => Some(harness.book(test_date(), slot.start, slot.end).await),
                None => None,
            };
            (busy, offered, booked)
        });

        for slot in &offered {
            prop_assert!(busy.iter().all(|taken| !taken.overlaps(&slot.range())));
        }
        if let Some(result) = booked {
            prop_assert!(result.is_ok());
        }
    }
}
