//! The choreographed booking saga.
//!
//! A booking flows through four independently owned stages — inventory
//! reservation, discount evaluation, payment, confirmation — connected
//! only by events on the bus. Each stage can fail, and the
//! [`BookingOrchestrator`] answers every failure with the compensation
//! orders that unwind the stages already completed:
//!
//! - inventory failure: nothing to unwind;
//! - discount rejection: release the reservation;
//! - payment decline: release the quota unit, then the reservation.
//!
//! [`BookingSystem`] wires all five services onto one bus.

pub mod error;
pub mod orchestrator;
pub mod services;

use std::time::Duration;

use domain::{BookingEvent, ServiceCatalog};
use event_bus::{DeliveryDelay, EventBus};

pub use error::{Result, SagaError};
pub use orchestrator::BookingOrchestrator;
pub use services::{
    DiscountManager, InventoryManager, NotificationDispatcher, PaymentProcessor,
    QUOTA_REACHED_REASON, QuotaSnapshot, Reservation, SIMULATED_FAILURE_REASON,
};

/// Tunables for one wired-up booking system.
#[derive(Debug, Clone)]
pub struct BookingSystemConfig {
    /// Artificial bus latency between publish and delivery.
    pub delivery_delay: DeliveryDelay,

    /// Daily limit of discount grants shared by all sagas.
    pub daily_quota: u32,

    /// Simulated payment gateway latency.
    pub payment_delay: Duration,

    /// The services bookings are validated and priced against.
    pub catalog: ServiceCatalog,
}

impl Default for BookingSystemConfig {
    /// The demo defaults: visible bus jitter, quota of 100, a slow
    /// gateway, and the clinic catalog.
    fn default() -> Self {
        Self {
            delivery_delay: DeliveryDelay::default(),
            daily_quota: 100,
            payment_delay: Duration::from_millis(800),
            catalog: ServiceCatalog::clinic_defaults(),
        }
    }
}

impl BookingSystemConfig {
    /// A deterministic configuration for tests: no bus delay, no
    /// gateway latency, the given quota.
    pub fn instant(daily_quota: u32) -> Self {
        Self {
            delivery_delay: DeliveryDelay::None,
            daily_quota,
            payment_delay: Duration::ZERO,
            catalog: ServiceCatalog::clinic_defaults(),
        }
    }
}

/// All five saga services wired onto one shared bus.
#[derive(Clone)]
pub struct BookingSystem {
    pub bus: EventBus<BookingEvent>,
    pub orchestrator: BookingOrchestrator,
    pub inventory: InventoryManager,
    pub discount: DiscountManager,
    pub payment: PaymentProcessor,
    pub notifications: NotificationDispatcher,
}

impl BookingSystem {
    /// Builds the bus, constructs every service on it, and subscribes
    /// them all. The returned handles share state with the running
    /// system and stay valid for its lifetime.
    pub async fn start(config: BookingSystemConfig) -> Self {
        let bus = EventBus::with_delay(config.delivery_delay);

        let orchestrator = BookingOrchestrator::new(bus.clone());
        let inventory = InventoryManager::new(bus.clone(), config.catalog);
        let discount = DiscountManager::new(bus.clone(), config.daily_quota);
        let payment = PaymentProcessor::new(bus.clone(), config.payment_delay);
        let notifications = NotificationDispatcher::new(bus.clone());

        orchestrator.subscribe().await;
        inventory.subscribe().await;
        discount.subscribe().await;
        payment.subscribe().await;
        notifications.subscribe().await;

        tracing::info!(
            daily_quota = config.daily_quota,
            payment_delay_ms = config.payment_delay.as_millis() as u64,
            "booking system started"
        );

        Self {
            bus,
            orchestrator,
            inventory,
            discount,
            payment,
            notifications,
        }
    }
}
