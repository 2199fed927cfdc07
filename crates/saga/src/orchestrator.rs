//! The booking orchestrator: owns booking records and terminal decisions.

use std::collections::HashMap;
use std::sync::Arc;

use common::{BookingId, TraceId};
use domain::events::{
    DiscountRejectedData, InventoryFailedData, PaymentFailedData, PaymentSuccessData,
};
use domain::{Booking, BookingEvent, Patient, ServiceId, Topic};
use event_bus::EventBus;
use tokio::sync::RwLock;

use crate::error::{Result, SagaError};

/// Starts sagas and converts downstream stage outcomes into terminal
/// booking decisions.
///
/// The orchestrator never calls the other services; it publishes
/// `BOOKING_INITIATED` and reacts to whatever comes back. On a stage
/// failure it orders the compensations that undo completed stages,
/// fire-and-forget, and finalizes the booking without waiting for the
/// compensation acknowledgements.
#[derive(Clone)]
pub struct BookingOrchestrator {
    bus: EventBus<BookingEvent>,
    bookings: Arc<RwLock<HashMap<BookingId, Booking>>>,
}

impl BookingOrchestrator {
    /// Creates an orchestrator publishing on the given bus.
    pub fn new(bus: EventBus<BookingEvent>) -> Self {
        Self {
            bus,
            bookings: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Subscribes the orchestrator to every stage outcome it reacts to.
    pub async fn subscribe(&self) {
        let orchestrator = self.clone();
        self.bus
            .subscribe_fn(Topic::PaymentSuccess, move |event| {
                let orchestrator = orchestrator.clone();
                async move {
                    if let BookingEvent::PaymentSuccess(data) = event.payload {
                        orchestrator.on_payment_success(event.trace_id, data).await?;
                    }
                    Ok(())
                }
            })
            .await;

        let orchestrator = self.clone();
        self.bus
            .subscribe_fn(Topic::InventoryFailed, move |event| {
                let orchestrator = orchestrator.clone();
                async move {
                    if let BookingEvent::InventoryFailed(data) = event.payload {
                        orchestrator.on_inventory_failed(event.trace_id, data).await?;
                    }
                    Ok(())
                }
            })
            .await;

        let orchestrator = self.clone();
        self.bus
            .subscribe_fn(Topic::DiscountRejected, move |event| {
                let orchestrator = orchestrator.clone();
                async move {
                    if let BookingEvent::DiscountRejected(data) = event.payload {
                        orchestrator.on_discount_rejected(event.trace_id, data).await?;
                    }
                    Ok(())
                }
            })
            .await;

        let orchestrator = self.clone();
        self.bus
            .subscribe_fn(Topic::PaymentFailed, move |event| {
                let orchestrator = orchestrator.clone();
                async move {
                    if let BookingEvent::PaymentFailed(data) = event.payload {
                        orchestrator.on_payment_failed(event.trace_id, data).await?;
                    }
                    Ok(())
                }
            })
            .await;
    }

    /// Starts a saga for the given patient and services.
    ///
    /// Stores a Pending booking and publishes `BOOKING_INITIATED` under
    /// a fresh trace ID. Returns immediately; the outcome arrives
    /// asynchronously and can be read back with [`booking`](Self::booking).
    #[tracing::instrument(skip(self, patient, service_ids))]
    pub async fn create_booking(
        &self,
        patient: Patient,
        service_ids: Vec<ServiceId>,
    ) -> Result<BookingId> {
        if service_ids.is_empty() {
            return Err(SagaError::EmptyServiceList);
        }

        let booking_id = BookingId::new();
        let booking = Booking::new(booking_id, patient.clone(), service_ids.clone());
        self.bookings.write().await.insert(booking_id, booking);

        metrics::counter!("bookings_created_total").increment(1);
        tracing::info!(%booking_id, services = service_ids.len(), "booking saga started");

        let trace_id = self
            .bus
            .publish(BookingEvent::booking_initiated(
                booking_id, patient, service_ids,
            ))
            .await;
        tracing::debug!(%booking_id, %trace_id, "saga trace minted");

        Ok(booking_id)
    }

    /// Looks up one booking.
    pub async fn booking(&self, booking_id: BookingId) -> Result<Booking> {
        self.bookings
            .read()
            .await
            .get(&booking_id)
            .cloned()
            .ok_or(SagaError::BookingNotFound(booking_id))
    }

    /// Returns every booking the orchestrator has seen.
    pub async fn bookings(&self) -> Vec<Booking> {
        self.bookings.read().await.values().cloned().collect()
    }

    async fn on_payment_success(
        &self,
        trace_id: TraceId,
        data: PaymentSuccessData,
    ) -> Result<()> {
        {
            let mut bookings = self.bookings.write().await;
            let Some(booking) = bookings.get_mut(&data.booking_id) else {
                tracing::warn!(booking_id = %data.booking_id, "payment success for unknown booking; ignoring");
                return Ok(());
            };
            if !booking.status.can_confirm() {
                tracing::warn!(
                    booking_id = %data.booking_id,
                    status = %booking.status,
                    "payment success for terminal booking; ignoring"
                );
                return Ok(());
            }
            booking.confirm(data.amount, data.transaction_id.clone());
        }

        metrics::counter!("bookings_confirmed_total").increment(1);
        tracing::info!(
            booking_id = %data.booking_id,
            final_price = %data.amount,
            transaction_id = %data.transaction_id,
            "booking confirmed"
        );

        self.bus
            .publish_with_trace(
                trace_id,
                BookingEvent::booking_confirmed(data.booking_id, data.amount, data.transaction_id),
            )
            .await;
        Ok(())
    }

    async fn on_inventory_failed(
        &self,
        trace_id: TraceId,
        data: InventoryFailedData,
    ) -> Result<()> {
        // Nothing was reserved, so there is nothing to unwind.
        self.finalize_failure(trace_id, data.booking_id, &data.reason, Vec::new())
            .await
    }

    async fn on_discount_rejected(
        &self,
        trace_id: TraceId,
        data: DiscountRejectedData,
    ) -> Result<()> {
        let compensations = vec![BookingEvent::compensate_inventory(
            data.booking_id,
            data.reason.clone(),
        )];
        self.finalize_failure(trace_id, data.booking_id, &data.reason, compensations)
            .await
    }

    async fn on_payment_failed(&self, trace_id: TraceId, data: PaymentFailedData) -> Result<()> {
        // Payment runs after a discount decision, so both earlier
        // stages must be unwound.
        let compensations = vec![
            BookingEvent::compensate_discount(data.booking_id, data.reason.clone()),
            BookingEvent::compensate_inventory(data.booking_id, data.reason.clone()),
        ];
        self.finalize_failure(trace_id, data.booking_id, &data.reason, compensations)
            .await
    }

    /// Applies the terminal failure at most once, then publishes the
    /// compensation orders followed by `BOOKING_FAILED`. The failure is
    /// final as soon as the record flips; the compensations are not
    /// awaited.
    async fn finalize_failure(
        &self,
        trace_id: TraceId,
        booking_id: BookingId,
        reason: &str,
        compensations: Vec<BookingEvent>,
    ) -> Result<()> {
        {
            let mut bookings = self.bookings.write().await;
            let Some(booking) = bookings.get_mut(&booking_id) else {
                tracing::warn!(%booking_id, "stage failure for unknown booking; ignoring");
                return Ok(());
            };
            if !booking.status.can_fail() {
                tracing::warn!(
                    %booking_id,
                    status = %booking.status,
                    "stage failure for terminal booking; ignoring"
                );
                return Ok(());
            }
            booking.fail(reason);
        }

        metrics::counter!("bookings_failed_total").increment(1);
        tracing::warn!(%booking_id, %reason, "booking failed; compensating");

        for compensation in compensations {
            self.bus.publish_with_trace(trace_id, compensation).await;
        }
        self.bus
            .publish_with_trace(trace_id, BookingEvent::booking_failed(booking_id, reason))
            .await;
        Ok(())
    }
}
