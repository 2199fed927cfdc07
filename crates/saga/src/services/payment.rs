//! Payment processor: a simulated slow gateway with a test kill switch.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use common::TraceId;
use domain::events::DiscountAppliedData;
use domain::{BookingEvent, Topic};
use event_bus::EventBus;
use rand::Rng;

use crate::error::Result;

/// The wire reason for a forced payment decline.
pub const SIMULATED_FAILURE_REASON: &str = "Payment Logic Simulated Failure";

/// Charges the final price of a priced booking.
///
/// Every charge sleeps out a configurable gateway latency first. The
/// force-fail flag is a single-shot switch: armed via the
/// `TEST_FORCE_PAYMENT_FAIL` topic (or [`arm_failure`](Self::arm_failure)
/// directly), it declines exactly the next charge and disarms itself.
#[derive(Clone)]
pub struct PaymentProcessor {
    bus: EventBus<BookingEvent>,
    processing_delay: Duration,
    fail_next: Arc<AtomicBool>,
}

impl PaymentProcessor {
    /// Creates a payment processor with the given simulated latency.
    pub fn new(bus: EventBus<BookingEvent>, processing_delay: Duration) -> Self {
        Self {
            bus,
            processing_delay,
            fail_next: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Subscribes the processor to its bus topics.
    pub async fn subscribe(&self) {
        let processor = self.clone();
        self.bus
            .subscribe_fn(Topic::DiscountApplied, move |event| {
                let processor = processor.clone();
                async move {
                    if let BookingEvent::DiscountApplied(data) = event.payload {
                        processor.on_discount_applied(event.trace_id, data).await?;
                    }
                    Ok(())
                }
            })
            .await;

        let processor = self.clone();
        self.bus
            .subscribe_fn(Topic::ForcePaymentFailure, move |_event| {
                let processor = processor.clone();
                async move {
                    processor.arm_failure();
                    Ok(())
                }
            })
            .await;
    }

    /// Arms the single-shot switch so the next charge is declined.
    pub fn arm_failure(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
        tracing::warn!("next payment armed to fail");
    }

    /// Returns whether the force-fail switch is currently armed.
    pub fn failure_armed(&self) -> bool {
        self.fail_next.load(Ordering::SeqCst)
    }

    fn new_transaction_id() -> String {
        format!("TXN_{}", rand::thread_rng().gen_range(10000..100000))
    }

    async fn on_discount_applied(
        &self,
        trace_id: TraceId,
        data: DiscountAppliedData,
    ) -> Result<()> {
        if !self.processing_delay.is_zero() {
            tokio::time::sleep(self.processing_delay).await;
        }

        // swap() both reads and disarms, so only one charge can pick
        // up an armed failure.
        if self.fail_next.swap(false, Ordering::SeqCst) {
            metrics::counter!("payments_failed_total").increment(1);
            tracing::warn!(
                booking_id = %data.booking_id,
                amount = %data.final_price,
                "charge declined"
            );
            self.bus
                .publish_with_trace(
                    trace_id,
                    BookingEvent::payment_failed(data.booking_id, SIMULATED_FAILURE_REASON),
                )
                .await;
            return Ok(());
        }

        let transaction_id = Self::new_transaction_id();
        metrics::counter!("payments_succeeded_total").increment(1);
        tracing::info!(
            booking_id = %data.booking_id,
            amount = %data.final_price,
            %transaction_id,
            "charge accepted"
        );

        self.bus
            .publish_with_trace(
                trace_id,
                BookingEvent::payment_success(data.booking_id, data.final_price, transaction_id),
            )
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use common::BookingId;
    use domain::{DiscountType, Money};
    use event_bus::DeliveryDelay;

    use super::*;

    fn setup() -> PaymentProcessor {
        PaymentProcessor::new(EventBus::with_delay(DeliveryDelay::None), Duration::ZERO)
    }

    fn priced() -> DiscountAppliedData {
        DiscountAppliedData {
            booking_id: BookingId::new(),
            base_price: Money::from_rupees(500),
            final_price: Money::from_paise(44000),
            discount_type: DiscountType::R1TwelvePercentOff,
        }
    }

    #[test]
    fn transaction_ids_are_five_digits() {
        for _ in 0..100 {
            let id = PaymentProcessor::new_transaction_id();
            let digits = id.strip_prefix("TXN_").unwrap();
            assert_eq!(digits.len(), 5);
            assert!(digits.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn armed_failure_disarms_after_one_charge() {
        let processor = setup();
        processor.arm_failure();
        assert!(processor.failure_armed());

        processor
            .on_discount_applied(TraceId::new(), priced())
            .await
            .unwrap();
        assert!(!processor.failure_armed());

        // The second charge is back on the happy path.
        processor
            .on_discount_applied(TraceId::new(), priced())
            .await
            .unwrap();
        assert!(!processor.failure_armed());
    }
}
