//! Free-slot calculation.
//!
//! Pure interval arithmetic: working windows minus busy intervals, then a fixed-step
//! walk through each free gap.
//!
//! ```text
//! window     10:00 ├──────────────────────────────────────┤ 18:00
//! busy                    12:00 ├────┤ 13:00
//! free       10:00 ├──────┤           ├──────────────────┤ 18:00
//! slots(60)        10  11               13 14 15 16 17
//! ```

use crate::error::BookingError;
use crate::types::{Slot, TimeOfDay, TimeRange, WorkingWindow};

/// Parameters of a slot query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotRequest {
    duration_minutes: u32,
    step_minutes: u32,
}

impl SlotRequest {
    /// Creates a request for slots of `duration_minutes`, starting every `step_minutes`.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Validation`] if either value is zero or the duration
    /// exceeds a day.
    pub fn new(duration_minutes: u32, step_minutes: u32) -> Result<Self, BookingError> {
        if duration_minutes == 0 {
            return Err(BookingError::validation("Slot duration must be positive"));
        }
        if duration_minutes > u32::from(crate::types::MINUTES_PER_DAY) {
            return Err(BookingError::validation(format!(
                "Slot duration of {duration_minutes} minutes exceeds a day"
            )));
        }
        if step_minutes == 0 {
            return Err(BookingError::validation("Slot step must be positive"));
        }
        Ok(Self {
            duration_minutes,
            step_minutes,
        })
    }

    /// Requested slot length
    #[must_use]
    pub const fn duration_minutes(&self) -> u32 {
        self.duration_minutes
    }

    /// Grid step between candidate starts
    #[must_use]
    pub const fn step_minutes(&self) -> u32 {
        self.step_minutes
    }
}

/// Sorts windows by start and merges any that overlap.
///
/// A well-behaved schedule source already returns disjoint windows; merging keeps the
/// output of [`free_intervals`] disjoint when it does not. Abutting windows stay
/// separate so no slot straddles a shift boundary.
#[must_use]
pub fn normalize_windows(windows: &[TimeRange]) -> Vec<TimeRange> {
    let mut sorted = windows.to_vec();
    sorted.sort();

    let mut merged: Vec<TimeRange> = Vec::with_capacity(sorted.len());
    for window in sorted {
        match merged.last_mut() {
            Some(last) if last.overlaps(&window) => {
                if window.end() > last.end() {
                    if let Ok(joined) = TimeRange::new(last.start(), window.end()) {
                        *last = joined;
                    }
                }
            }
            _ => merged.push(window),
        }
    }
    merged
}

/// Working windows minus busy intervals.
///
/// Each busy interval is clipped to the window it overlaps; intervals outside a window
/// are ignored for it, and abutting intervals consume no extra gap. The result is sorted
/// and disjoint.
#[must_use]
pub fn free_intervals(windows: &[TimeRange], busy: &[TimeRange]) -> Vec<TimeRange> {
    let mut busy = busy.to_vec();
    busy.sort();

    let mut free = Vec::new();
    for window in normalize_windows(windows) {
        let mut cursor = window.start();
        for interval in busy.iter().filter(|interval| interval.overlaps(&window)) {
            if interval.start() > cursor {
                if let Ok(gap) = TimeRange::new(cursor, interval.start()) {
                    free.push(gap);
                }
            }
            cursor = cursor.max(interval.end());
        }
        if cursor < window.end() {
            if let Ok(rest) = TimeRange::new(cursor, window.end()) {
                free.push(rest);
            }
        }
    }
    free
}

/// Free slots inside `windows` that avoid every `busy` interval.
///
/// Within each free gap, candidates start at the gap start and advance by the request's
/// step while the slot still fits. Output is ordered by start; an empty schedule yields
/// an empty vector.
#[must_use]
pub fn compute_slots(
    windows: &[WorkingWindow],
    busy: &[TimeRange],
    request: &SlotRequest,
) -> Vec<Slot> {
    let ranges: Vec<TimeRange> = windows.iter().map(|window| window.range).collect();

    let mut slots = Vec::new();
    for gap in free_intervals(&ranges, busy) {
        let gap_end = u32::from(gap.end().minutes());
        let mut next = Some(u32::from(gap.start().minutes()));
        while let Some(start) = next {
            if start.saturating_add(request.duration_minutes) > gap_end {
                break;
            }
            let slot = u16::try_from(start)
                .ok()
                .and_then(TimeOfDay::from_minutes)
                .and_then(|from| TimeRange::starting_at(from, request.duration_minutes));
            if let Some(range) = slot {
                slots.push(Slot::from_range(range));
            }
            next = start.checked_add(request.step_minutes);
        }
    }
    slots
}

/// Drops slots starting before `earliest`, e.g. inside today's booking lead time.
pub fn retain_starting_from(slots: &mut Vec<Slot>, earliest: TimeOfDay) {
    slots.retain(|slot| slot.start >= earliest);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn t(hour: u16, minute: u16) -> TimeOfDay {
        TimeOfDay::from_hm(hour, minute).unwrap()
    }

    fn range(start: (u16, u16), end: (u16, u16)) -> TimeRange {
        TimeRange::new(t(start.0, start.1), t(end.0, end.1)).unwrap()
    }

    fn window(start: (u16, u16), end: (u16, u16)) -> WorkingWindow {
        WorkingWindow::new(NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(), range(start, end))
    }

    fn starts(slots: &[Slot]) -> Vec<String> {
        slots.iter().map(|slot| slot.start.to_string()).collect()
    }

    #[test]
    fn test_lunch_booking_removes_one_hour() {
        let slots = compute_slots(
            &[window((10, 0), (18, 0))],
            &[range((12, 0), (13, 0))],
            &SlotRequest::new(60, 60).unwrap(),
        );
        assert_eq!(
            starts(&slots),
            ["10:00", "11:00", "13:00", "14:00", "15:00", "16:00", "17:00"]
        );
        assert!(slots.iter().all(|slot| slot.duration_minutes == 60));
    }

    #[test]
    fn test_no_windows_yields_no_slots() {
        let slots = compute_slots(&[], &[range((12, 0), (13, 0))], &SlotRequest::new(30, 30).unwrap());
        assert!(slots.is_empty());
    }

    #[test]
    fn test_duration_longer_than_any_gap() {
        let slots = compute_slots(
            &[window((10, 0), (12, 0))],
            &[range((10, 45), (11, 15))],
            &SlotRequest::new(60, 15).unwrap(),
        );
        assert!(slots.is_empty());
    }

    #[test]
    fn test_abutting_booking_consumes_no_gap() {
        let slots = compute_slots(
            &[window((10, 0), (12, 0))],
            &[range((9, 0), (10, 0)), range((12, 0), (13, 0))],
            &SlotRequest::new(60, 60).unwrap(),
        );
        assert_eq!(starts(&slots), ["10:00", "11:00"]);
    }

    #[test]
    fn test_booking_outside_window_is_ignored() {
        let slots = compute_slots(
            &[window((10, 0), (11, 0))],
            &[range((15, 0), (16, 0))],
            &SlotRequest::new(30, 30).unwrap(),
        );
        assert_eq!(starts(&slots), ["10:00", "10:30"]);
    }

    #[test]
    fn test_step_restarts_at_each_gap() {
        let slots = compute_slots(
            &[window((9, 0), (12, 0))],
            &[range((9, 50), (10, 20))],
            &SlotRequest::new(30, 30).unwrap(),
        );
        assert_eq!(starts(&slots), ["09:00", "10:20", "10:50", "11:20"]);
    }

    #[test]
    fn test_split_shifts_are_concatenated_in_order() {
        let slots = compute_slots(
            &[window((18, 0), (20, 0)), window((9, 0), (11, 0))],
            &[],
            &SlotRequest::new(60, 60).unwrap(),
        );
        assert_eq!(starts(&slots), ["09:00", "10:00", "18:00", "19:00"]);
    }

    #[test]
    fn test_overlapping_bookings_are_subtracted_once() {
        let free = free_intervals(
            &[range((10, 0), (18, 0))],
            &[range((11, 0), (13, 0)), range((12, 0), (14, 0)), range((12, 30), (12, 45))],
        );
        assert_eq!(free, vec![range((10, 0), (11, 0)), range((14, 0), (18, 0))]);
    }

    #[test]
    fn test_overlapping_windows_are_merged() {
        let merged = normalize_windows(&[range((12, 0), (16, 0)), range((10, 0), (13, 0))]);
        assert_eq!(merged, vec![range((10, 0), (16, 0))]);
        let kept = normalize_windows(&[range((12, 0), (16, 0)), range((10, 0), (12, 0))]);
        assert_eq!(kept, vec![range((10, 0), (12, 0)), range((12, 0), (16, 0))]);
    }

    #[test]
    fn test_window_until_midnight() {
        let slots = compute_slots(
            &[window((22, 0), (24, 0))],
            &[],
            &SlotRequest::new(60, 60).unwrap(),
        );
        assert_eq!(starts(&slots), ["22:00", "23:00"]);
        assert_eq!(slots[1].end, TimeOfDay::END_OF_DAY);
    }

    #[test]
    fn test_earliest_start_keeps_grid() {
        let request = SlotRequest::new(30, 30).unwrap();
        let mut slots = compute_slots(&[window((9, 0), (11, 0))], &[], &request);
        retain_starting_from(&mut slots, t(10, 10));
        assert_eq!(starts(&slots), ["10:30"]);
    }

    #[test]
    fn test_step_wider_than_a_day_yields_gap_starts_only() {
        let slots = compute_slots(
            &[window((10, 0), (18, 0))],
            &[range((12, 0), (13, 0))],
            &SlotRequest::new(60, u32::MAX).unwrap(),
        );
        assert_eq!(starts(&slots), ["10:00", "13:00"]);
    }

    #[test]
    fn test_invalid_requests() {
        assert!(SlotRequest::new(0, 15).is_err());
        assert!(SlotRequest::new(30, 0).is_err());
        assert!(SlotRequest::new(1441, 15).is_err());
    }

    fn arb_range() -> impl Strategy<Value = TimeRange> {
        (0u16..1440, 1u16..240).prop_map(|(start, len)| {
            let end = (start + len).min(crate::types::MINUTES_PER_DAY);
            TimeRange::new(
                TimeOfDay::from_minutes(start).unwrap(),
                TimeOfDay::from_minutes(end).unwrap(),
            )
            .unwrap()
        })
    }

    proptest! {
        #[test]
        fn prop_slots_inside_windows_and_clear_of_bookings(
            windows in prop::collection::vec(arb_range(), 0..4),
            busy in prop::collection::vec(arb_range(), 0..6),
            duration in 5u32..180,
            step in 5u32..60,
        ) {
            let disjoint = normalize_windows(&windows);
            let working: Vec<WorkingWindow> = disjoint
                .iter()
                .map(|range| WorkingWindow::new(NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(), *range))
                .collect();
            let request = SlotRequest::new(duration, step).unwrap();
            let slots = compute_slots(&working, &busy, &request);

            for slot in &slots {
                let range = slot.range();
                prop_assert_eq!(range.duration_minutes(), duration);
                prop_assert!(disjoint.iter().any(|window| window.contains(&range)));
                prop_assert!(busy.iter().all(|interval| !interval.overlaps(&range)));
            }
            for pair in slots.windows(2) {
                prop_assert!(pair[0].start < pair[1].start);
            }
            prop_assert_eq!(compute_slots(&working, &busy, &request), slots);
        }

        #[test]
        fn prop_free_intervals_are_disjoint_and_clear(
            windows in prop::collection::vec(arb_range(), 0..4),
            busy in prop::collection::vec(arb_range(), 0..6),
        ) {
            let free = free_intervals(&windows, &busy);
            for pair in free.windows(2) {
                prop_assert!(pair[0].end() <= pair[1].start());
            }
            for gap in &free {
                prop_assert!(busy.iter().all(|interval| !interval.overlaps(gap)));
            }
        }
    }
}
