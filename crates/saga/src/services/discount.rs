//! Discount manager: rule evaluation against a shared daily quota.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use common::{BookingId, TraceId};
use domain::events::{CompensationData, InventoryReservedData};
use domain::{BookingEvent, DiscountType, Gender, Money, Patient, Topic};
use event_bus::EventBus;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::error::Result;

/// Selections priced above this are discount-eligible regardless of
/// the birthday rule.
const HIGH_VALUE_THRESHOLD_RUPEES: i64 = 1000;

/// The percentage rule R1 takes off the base price.
const DISCOUNT_PERCENT: u8 = 12;

/// The wire reason for a quota rejection.
pub const QUOTA_REACHED_REASON: &str =
    "Daily discount quota reached. Please try again tomorrow.";

/// A point-in-time view of the daily quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaSnapshot {
    /// Units consumed today.
    pub used: u32,

    /// The configured daily limit.
    pub limit: u32,
}

#[derive(Debug, Default)]
struct QuotaState {
    used: u32,
    granted: HashSet<BookingId>,
}

/// Prices reserved bookings and owns the daily discount quota.
///
/// The quota is the one resource shared across concurrent sagas, so
/// eligibility check and consumption happen under a single write-lock
/// acquisition; `used` can never exceed the limit. Alongside the bare
/// counter the manager records which bookings actually consumed a
/// unit, so a release can be audited even though the wire behavior is
/// the original blind decrement.
#[derive(Clone)]
pub struct DiscountManager {
    bus: EventBus<BookingEvent>,
    limit: u32,
    state: Arc<RwLock<QuotaState>>,
}

impl DiscountManager {
    /// Creates a discount manager with the given daily quota limit.
    pub fn new(bus: EventBus<BookingEvent>, daily_quota: u32) -> Self {
        Self {
            bus,
            limit: daily_quota,
            state: Arc::new(RwLock::new(QuotaState::default())),
        }
    }

    /// Subscribes the manager to its bus topics.
    pub async fn subscribe(&self) {
        let manager = self.clone();
        self.bus
            .subscribe_fn(Topic::InventoryReserved, move |event| {
                let manager = manager.clone();
                async move {
                    if let BookingEvent::InventoryReserved(data) = event.payload {
                        manager.on_inventory_reserved(event.trace_id, data).await?;
                    }
                    Ok(())
                }
            })
            .await;

        let manager = self.clone();
        self.bus
            .subscribe_fn(Topic::CompensateDiscount, move |event| {
                let manager = manager.clone();
                async move {
                    if let BookingEvent::CompensateDiscount(data) = event.payload {
                        manager.on_compensate(event.trace_id, data).await?;
                    }
                    Ok(())
                }
            })
            .await;
    }

    /// Rule R1: a female patient booking on her birthday, or any
    /// selection priced above ₹1000.
    fn is_eligible(patient: &Patient, base_price: Money, today: NaiveDate) -> bool {
        (patient.gender == Gender::Female && patient.is_birthday(today))
            || base_price > Money::from_rupees(HIGH_VALUE_THRESHOLD_RUPEES)
    }

    /// Returns the current quota usage.
    pub async fn quota(&self) -> QuotaSnapshot {
        QuotaSnapshot {
            used: self.state.read().await.used,
            limit: self.limit,
        }
    }

    /// Returns true if this booking consumed a quota unit that has not
    /// been released.
    pub async fn granted_discount(&self, booking_id: BookingId) -> bool {
        self.state.read().await.granted.contains(&booking_id)
    }

    /// Test control: sets the counter back to zero and forgets every
    /// consumption record.
    pub async fn reset_quota(&self) -> QuotaSnapshot {
        let mut state = self.state.write().await;
        state.used = 0;
        state.granted.clear();
        tracing::info!(limit = self.limit, "discount quota reset");
        QuotaSnapshot {
            used: 0,
            limit: self.limit,
        }
    }

    /// Test control: marks the whole daily quota as consumed.
    pub async fn fill_quota(&self) -> QuotaSnapshot {
        let mut state = self.state.write().await;
        state.used = self.limit;
        tracing::info!(limit = self.limit, "discount quota filled");
        QuotaSnapshot {
            used: state.used,
            limit: self.limit,
        }
    }

    async fn on_inventory_reserved(
        &self,
        trace_id: TraceId,
        data: InventoryReservedData,
    ) -> Result<()> {
        let today = Utc::now().date_naive();
        if !Self::is_eligible(&data.patient, data.base_price, today) {
            tracing::info!(
                booking_id = %data.booking_id,
                base_price = %data.base_price,
                "no rule matched; full price"
            );
            self.bus
                .publish_with_trace(
                    trace_id,
                    BookingEvent::discount_applied(
                        data.booking_id,
                        data.base_price,
                        data.base_price,
                        DiscountType::None,
                    ),
                )
                .await;
            return Ok(());
        }

        // Check and consume under one lock acquisition so two eligible
        // sagas racing for the last unit cannot both win.
        {
            let mut state = self.state.write().await;
            if state.used >= self.limit {
                drop(state);
                metrics::counter!("discounts_rejected_total").increment(1);
                tracing::warn!(
                    booking_id = %data.booking_id,
                    limit = self.limit,
                    "quota exhausted; rejecting discount"
                );
                self.bus
                    .publish_with_trace(
                        trace_id,
                        BookingEvent::discount_rejected(data.booking_id, QUOTA_REACHED_REASON),
                    )
                    .await;
                return Ok(());
            }
            state.used += 1;
            state.granted.insert(data.booking_id);
        }

        let final_price = data.base_price.percent_off(DISCOUNT_PERCENT);
        metrics::counter!("discounts_granted_total").increment(1);
        tracing::info!(
            booking_id = %data.booking_id,
            base_price = %data.base_price,
            %final_price,
            "discount granted"
        );

        self.bus
            .publish_with_trace(
                trace_id,
                BookingEvent::discount_applied(
                    data.booking_id,
                    data.base_price,
                    final_price,
                    DiscountType::R1TwelvePercentOff,
                ),
            )
            .await;
        Ok(())
    }

    async fn on_compensate(&self, trace_id: TraceId, data: CompensationData) -> Result<()> {
        let remaining = {
            let mut state = self.state.write().await;
            if state.used == 0 {
                tracing::warn!(
                    booking_id = %data.booking_id,
                    "no quota consumed; ignoring compensation"
                );
                return Ok(());
            }
            state.used -= 1;
            state.granted.remove(&data.booking_id);
            self.limit - state.used
        };

        metrics::counter!("discounts_released_total").increment(1);
        tracing::info!(
            booking_id = %data.booking_id,
            remaining,
            "quota unit released"
        );

        self.bus
            .publish_with_trace(
                trace_id,
                BookingEvent::discount_released(data.booking_id, remaining),
            )
            .await;
        Ok(())
    }
}
