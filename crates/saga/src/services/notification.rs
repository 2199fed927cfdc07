//! Notification dispatcher: best-effort notices on terminal outcomes.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::{BookingId, TraceId};
use domain::{BookingEvent, NotificationKind, Topic};
use event_bus::EventBus;

use crate::error::Result;

/// Tells the patient how their booking ended.
///
/// Nothing downstream depends on these notices; a lost notification
/// never changes a booking's outcome.
#[derive(Clone)]
pub struct NotificationDispatcher {
    bus: EventBus<BookingEvent>,
    sent: Arc<AtomicUsize>,
}

impl NotificationDispatcher {
    /// Creates a dispatcher publishing on the given bus.
    pub fn new(bus: EventBus<BookingEvent>) -> Self {
        Self {
            bus,
            sent: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Subscribes the dispatcher to both terminal topics.
    pub async fn subscribe(&self) {
        let dispatcher = self.clone();
        self.bus
            .subscribe_fn(Topic::BookingConfirmed, move |event| {
                let dispatcher = dispatcher.clone();
                async move {
                    if let BookingEvent::BookingConfirmed(data) = event.payload {
                        dispatcher
                            .send(event.trace_id, data.booking_id, NotificationKind::Confirmation)
                            .await?;
                    }
                    Ok(())
                }
            })
            .await;

        let dispatcher = self.clone();
        self.bus
            .subscribe_fn(Topic::BookingFailed, move |event| {
                let dispatcher = dispatcher.clone();
                async move {
                    if let BookingEvent::BookingFailed(data) = event.payload {
                        dispatcher
                            .send(event.trace_id, data.booking_id, NotificationKind::FailureNotice)
                            .await?;
                    }
                    Ok(())
                }
            })
            .await;
    }

    /// Returns how many notices have gone out.
    pub fn sent_count(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }

    async fn send(
        &self,
        trace_id: TraceId,
        booking_id: BookingId,
        kind: NotificationKind,
    ) -> Result<()> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        metrics::counter!("notifications_sent_total").increment(1);
        tracing::info!(%booking_id, %kind, "notification sent");

        self.bus
            .publish_with_trace(trace_id, BookingEvent::notification_sent(booking_id, kind))
            .await;
        Ok(())
    }
}
