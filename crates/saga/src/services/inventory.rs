//! Inventory manager: validates, prices, and holds service slots.

use std::collections::HashMap;
use std::sync::Arc;

use common::{BookingId, TraceId};
use domain::events::{BookingInitiatedData, CompensationData};
use domain::{BookingEvent, Money, ServiceCatalog, ServiceId, Topic, UNLISTED_SERVICE_ID};
use event_bus::EventBus;
use tokio::sync::RwLock;

use crate::error::Result;

/// Slots held for one booking, plus the price they were held at.
#[derive(Debug, Clone)]
pub struct Reservation {
    /// The reserved services.
    pub service_ids: Vec<ServiceId>,

    /// Sum of the catalog prices at reservation time.
    pub base_price: Money,
}

#[derive(Debug, Default)]
struct InventoryState {
    reservations: HashMap<BookingId, Reservation>,
}

/// Validates booking requests against the catalog and owns the
/// reservation map.
///
/// Reacts to `BOOKING_INITIATED` with either `INVENTORY_RESERVED` or
/// `INVENTORY_FAILED`, and to `COMPENSATE_INVENTORY` by releasing the
/// held slots. Releasing a booking that holds nothing is a logged
/// no-op so compensation is always safe to order.
#[derive(Clone)]
pub struct InventoryManager {
    bus: EventBus<BookingEvent>,
    catalog: Arc<ServiceCatalog>,
    state: Arc<RwLock<InventoryState>>,
}

impl InventoryManager {
    /// Creates an inventory manager over the given catalog.
    pub fn new(bus: EventBus<BookingEvent>, catalog: ServiceCatalog) -> Self {
        Self {
            bus,
            catalog: Arc::new(catalog),
            state: Arc::new(RwLock::new(InventoryState::default())),
        }
    }

    /// Subscribes the manager to its bus topics.
    pub async fn subscribe(&self) {
        let manager = self.clone();
        self.bus
            .subscribe_fn(Topic::BookingInitiated, move |event| {
                let manager = manager.clone();
                async move {
                    if let BookingEvent::BookingInitiated(data) = event.payload {
                        manager.on_booking_initiated(event.trace_id, data).await?;
                    }
                    Ok(())
                }
            })
            .await;

        let manager = self.clone();
        self.bus
            .subscribe_fn(Topic::CompensateInventory, move |event| {
                let manager = manager.clone();
                async move {
                    if let BookingEvent::CompensateInventory(data) = event.payload {
                        manager.on_compensate(event.trace_id, data).await?;
                    }
                    Ok(())
                }
            })
            .await;
    }

    /// Returns the reservation held for a booking, if any.
    pub async fn reservation(&self, booking_id: BookingId) -> Option<Reservation> {
        self.state.read().await.reservations.get(&booking_id).cloned()
    }

    /// Returns the number of active reservations.
    pub async fn reservation_count(&self) -> usize {
        self.state.read().await.reservations.len()
    }

    async fn on_booking_initiated(
        &self,
        trace_id: TraceId,
        data: BookingInitiatedData,
    ) -> Result<()> {
        if let Some(unknown) = data
            .service_ids
            .iter()
            .find(|id| !self.catalog.contains(id))
        {
            let reason = if unknown.as_str() == UNLISTED_SERVICE_ID {
                "Service not found"
            } else {
                "Invalid Service ID"
            };
            metrics::counter!("inventory_validation_failures_total").increment(1);
            tracing::warn!(
                booking_id = %data.booking_id,
                service_id = %unknown,
                reason,
                "rejecting booking"
            );
            self.bus
                .publish_with_trace(
                    trace_id,
                    BookingEvent::inventory_failed(data.booking_id, reason),
                )
                .await;
            return Ok(());
        }

        let base_price: Money = data
            .service_ids
            .iter()
            .filter_map(|id| self.catalog.entry(id))
            .map(|entry| entry.unit_price)
            .sum();

        self.state.write().await.reservations.insert(
            data.booking_id,
            Reservation {
                service_ids: data.service_ids.clone(),
                base_price,
            },
        );

        metrics::counter!("inventory_reservations_total").increment(1);
        tracing::info!(
            booking_id = %data.booking_id,
            %base_price,
            services = data.service_ids.len(),
            "slots reserved"
        );

        self.bus
            .publish_with_trace(
                trace_id,
                BookingEvent::inventory_reserved(
                    data.booking_id,
                    data.patient,
                    data.service_ids,
                    base_price,
                ),
            )
            .await;
        Ok(())
    }

    async fn on_compensate(&self, trace_id: TraceId, data: CompensationData) -> Result<()> {
        let removed = self
            .state
            .write()
            .await
            .reservations
            .remove(&data.booking_id);

        if removed.is_none() {
            tracing::warn!(
                booking_id = %data.booking_id,
                "no reservation to release; ignoring compensation"
            );
            return Ok(());
        }

        metrics::counter!("inventory_releases_total").increment(1);
        tracing::info!(
            booking_id = %data.booking_id,
            reason = %data.reason,
            "reservation released"
        );

        self.bus
            .publish_with_trace(trace_id, BookingEvent::inventory_released(data.booking_id))
            .await;
        Ok(())
    }
}
