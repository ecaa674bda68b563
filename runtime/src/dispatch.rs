//! Best-effort delivery of lifecycle events to collaborators.
//!
//! The service hands each committed event to [`EventDispatcher::emit`], which only
//! enqueues it. A single worker task drains the queue in order and calls the
//! [`NotificationDispatcher`] (every event) and the [`RatingRecalculator`] (completions
//! only). Each call runs under a deadline; failures and timeouts are logged and
//! counted, never retried and never reported back to the booking operation.
//!
//! ```text
//! BookingService ──emit──► mpsc ──► worker ──► NotificationDispatcher
//!                                        └──► RatingRecalculator (Completed)
//! ```

use booking_engine_core::ports::{CollaboratorError, PortFuture};
use booking_engine_core::{BookingEvent, NotificationDispatcher, RatingRecalculator};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use crate::metrics::BookingMetrics;

enum Message {
    Deliver(BookingEvent),
    Flush(oneshot::Sender<()>),
}

/// Handle to the event delivery worker.
///
/// Dropping every handle lets the worker finish the queued events and exit.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: mpsc::UnboundedSender<Message>,
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deliver(event) => f.debug_tuple("Deliver").field(&event.event_type()).finish(),
            Self::Flush(_) => f.write_str("Flush"),
        }
    }
}

impl EventDispatcher {
    /// Spawns the delivery worker on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn spawn(
        notifier: Arc<dyn NotificationDispatcher>,
        ratings: Arc<dyn RatingRecalculator>,
        call_timeout: Duration,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(receiver, notifier, ratings, call_timeout));
        Self { sender }
    }

    /// Queues `event` for delivery. Never blocks.
    pub fn emit(&self, event: BookingEvent) {
        let event_type = event.event_type();
        if self.sender.send(Message::Deliver(event)).is_err() {
            tracing::warn!(event = event_type, "Event worker stopped, dropping event");
            BookingMetrics::record_delivery_failure("dispatcher");
        }
    }

    /// Waits until every event emitted before this call has been handled.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.sender.send(Message::Flush(done)).is_ok() {
            // The worker drops the sender only if it exits, which also means the queue is empty
            let _ = wait.await;
        }
    }
}

async fn run_worker(
    mut receiver: mpsc::UnboundedReceiver<Message>,
    notifier: Arc<dyn NotificationDispatcher>,
    ratings: Arc<dyn RatingRecalculator>,
    call_timeout: Duration,
) {
    while let Some(message) = receiver.recv().await {
        match message {
            Message::Deliver(event) => {
                deliver(&event, notifier.as_ref(), ratings.as_ref(), call_timeout).await;
            }
            Message::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    tracing::debug!("Event worker stopped");
}

async fn deliver(
    event: &BookingEvent,
    notifier: &dyn NotificationDispatcher,
    ratings: &dyn RatingRecalculator,
    call_timeout: Duration,
) {
    let mut delivered = call_with_deadline(
        "notifier",
        event,
        notifier.send_booking_notifications(event.clone()),
        call_timeout,
    )
    .await;

    if event.affects_rating() {
        delivered &= call_with_deadline(
            "rating_recalculator",
            event,
            ratings.recalculate(event.provider_id),
            call_timeout,
        )
        .await;
    }

    if delivered {
        BookingMetrics::record_event_delivered(event.event_type());
    }
}

async fn call_with_deadline(
    collaborator: &'static str,
    event: &BookingEvent,
    call: PortFuture<'_, (), CollaboratorError>,
    call_timeout: Duration,
) -> bool {
    let failure = match tokio::time::timeout(call_timeout, call).await {
        Ok(Ok(())) => return true,
        Ok(Err(error)) => error.to_string(),
        Err(_) => format!("no response within {}ms", call_timeout.as_millis()),
    };

    tracing::warn!(
        collaborator,
        event = event.event_type(),
        booking_id = %event.booking_id,
        error = %failure,
        "Event delivery failed"
    );
    BookingMetrics::record_delivery_failure(collaborator);
    false
}

/// [`NotificationDispatcher`] that writes each event to the log.
///
/// Used by binaries without a real notification channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

impl NotificationDispatcher for LoggingNotifier {
    fn send_booking_notifications(
        &self,
        event: BookingEvent,
    ) -> PortFuture<'_, (), CollaboratorError> {
        Box::pin(async move {
            tracing::info!(
                event = event.event_type(),
                booking_id = %event.booking_id,
                provider_id = %event.provider_id,
                client_id = %event.client_id,
                occurred_at = %event.occurred_at,
                "Booking notification"
            );
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use booking_engine_core::{
        Actor, Booking, BookingEventKind, BookingId, ClientId, Money, NaiveDate, NewBooking,
        ProviderId, ServiceId, TimeOfDay, Utc,
    };
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        notified: Mutex<Vec<&'static str>>,
        recalculated: Mutex<Vec<ProviderId>>,
        fail_notifications: bool,
    }

    impl NotificationDispatcher for Recorder {
        fn send_booking_notifications(
            &self,
            event: BookingEvent,
        ) -> PortFuture<'_, (), CollaboratorError> {
            Box::pin(async move {
                self.notified.lock().unwrap().push(event.event_type());
                if self.fail_notifications {
                    return Err(CollaboratorError::Unavailable {
                        collaborator: "notifier",
                        reason: "smtp down".into(),
                    });
                }
                Ok(())
            })
        }
    }

    impl RatingRecalculator for Recorder {
        fn recalculate(&self, provider_id: ProviderId) -> PortFuture<'_, (), CollaboratorError> {
            Box::pin(async move {
                self.recalculated.lock().unwrap().push(provider_id);
                Ok(())
            })
        }
    }

    struct Hanging;

    impl NotificationDispatcher for Hanging {
        fn send_booking_notifications(
            &self,
            _event: BookingEvent,
        ) -> PortFuture<'_, (), CollaboratorError> {
            Box::pin(std::future::pending())
        }
    }

    fn booking() -> Booking {
        let request = NewBooking {
            provider_id: ProviderId::new(),
            client_id: ClientId::new(),
            service_ids: BTreeSet::from([ServiceId::new()]),
            date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            time_start: TimeOfDay::from_hm(10, 0).unwrap(),
            time_end: TimeOfDay::from_hm(11, 0).unwrap(),
            total_price: Money::from_cents(3_000),
        };
        Booking::pending(BookingId::new(), request, Utc::now()).unwrap()
    }

    fn completed(booking: &Booking) -> BookingEvent {
        BookingEvent::new(
            booking,
            BookingEventKind::Completed {
                completed_by: Actor::System,
                notes: None,
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_events_delivered_in_order_and_rating_only_on_completion() {
        let recorder = Arc::new(Recorder::default());
        let dispatcher = EventDispatcher::spawn(recorder.clone(), recorder.clone(), Duration::from_secs(1));
        let booking = booking();

        dispatcher.emit(BookingEvent::new(&booking, BookingEventKind::Confirmed, Utc::now()));
        dispatcher.emit(completed(&booking));
        dispatcher.flush().await;

        assert_eq!(*recorder.notified.lock().unwrap(), ["BookingConfirmed", "BookingCompleted"]);
        assert_eq!(*recorder.recalculated.lock().unwrap(), [booking.provider_id]);
    }

    #[tokio::test]
    async fn test_failing_notifier_does_not_stop_rating() {
        let recorder = Arc::new(Recorder {
            fail_notifications: true,
            ..Recorder::default()
        });
        let dispatcher = EventDispatcher::spawn(recorder.clone(), recorder.clone(), Duration::from_secs(1));
        let booking = booking();

        dispatcher.emit(completed(&booking));
        dispatcher.flush().await;

        assert_eq!(recorder.recalculated.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_notifier_times_out() {
        let recorder = Arc::new(Recorder::default());
        let dispatcher = EventDispatcher::spawn(Arc::new(Hanging), recorder.clone(), Duration::from_millis(100));
        let booking = booking();

        dispatcher.emit(completed(&booking));
        dispatcher.flush().await;

        assert_eq!(*recorder.recalculated.lock().unwrap(), [booking.provider_id]);
    }

    #[tokio::test]
    async fn test_logging_notifier_accepts_every_event() {
        let booking = booking();
        let result = LoggingNotifier
            .send_booking_notifications(BookingEvent::new(&booking, BookingEventKind::NoShow, Utc::now()))
            .await;
        assert!(result.is_ok());
    }
}
