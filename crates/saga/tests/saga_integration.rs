//! Whole-saga flows over a zero-delay bus.
//!
//! Every test runs the real services end to end and asserts against
//! the recorded event timeline plus the services' own read sides.

use std::time::Duration;

use chrono::{Datelike, Utc};
use common::BookingId;
use domain::{
    BookingEvent, BookingStatus, DiscountType, Gender, Money, NotificationKind, Patient,
    ServiceId, Topic,
};
use event_bus::{Event, EventRecorder};
use futures_util::future;
use saga::{
    BookingSystem, BookingSystemConfig, QUOTA_REACHED_REASON, SIMULATED_FAILURE_REASON,
};

const WAIT: Duration = Duration::from_secs(5);

struct Harness {
    system: BookingSystem,
    recorder: EventRecorder<BookingEvent>,
}

async fn setup(daily_quota: u32) -> Harness {
    let system = BookingSystem::start(BookingSystemConfig::instant(daily_quota)).await;
    let recorder = EventRecorder::new();
    recorder.attach(&system.bus, &Topic::ALL).await;
    Harness { system, recorder }
}

impl Harness {
    /// Waits until an event on `topic` has been delivered for this booking.
    async fn wait_for_topic(&self, booking_id: BookingId, topic: Topic) -> bool {
        self.recorder
            .wait_for(WAIT, |events| {
                events
                    .iter()
                    .any(|e| e.topic() == topic && e.payload.booking_id() == Some(booking_id))
            })
            .await
    }

    /// The recorded events belonging to one booking, in delivery order.
    async fn saga_events(&self, booking_id: BookingId) -> Vec<Event<BookingEvent>> {
        self.recorder
            .events()
            .await
            .into_iter()
            .filter(|e| e.payload.booking_id() == Some(booking_id))
            .collect()
    }

    async fn saga_topics(&self, booking_id: BookingId) -> Vec<Topic> {
        self.saga_events(booking_id)
            .await
            .iter()
            .map(Event::topic)
            .collect()
    }
}

/// A patient eligible under the birthday half of rule R1.
fn birthday_patient() -> Patient {
    let today = Utc::now().date_naive();
    let dob = today.with_year(1990).unwrap_or(today);
    Patient::new("Alice Smith", Gender::Female, dob)
}

/// A patient no discount rule matches at low prices.
fn ordinary_patient() -> Patient {
    let today = Utc::now().date_naive();
    // A date of birth guaranteed not to be today.
    let dob = today
        .succ_opt()
        .unwrap_or_else(|| today.pred_opt().unwrap());
    Patient::new("Bob Jones", Gender::Male, dob)
}

fn services(ids: &[&str]) -> Vec<ServiceId> {
    ids.iter().map(|id| ServiceId::new(*id)).collect()
}

/// Asserts that `topics` contains `expected` as a subsequence.
fn assert_causal_order(topics: &[Topic], expected: &[Topic]) {
    let mut remaining = expected.iter();
    let mut next = remaining.next();
    for topic in topics {
        if Some(topic) == next {
            next = remaining.next();
        }
    }
    assert!(
        next.is_none(),
        "expected causal order {expected:?} within {topics:?}"
    );
}

#[tokio::test]
async fn birthday_booking_is_confirmed_with_discount() {
    let harness = setup(100).await;
    let booking_id = harness
        .system
        .orchestrator
        .create_booking(birthday_patient(), services(&["srv_1"]))
        .await
        .unwrap();

    assert!(harness.wait_for_topic(booking_id, Topic::NotificationSent).await);

    let booking = harness.system.orchestrator.booking(booking_id).await.unwrap();
    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert_eq!(booking.final_price, Some(Money::from_paise(44000)));
    let transaction_id = booking.transaction_id.expect("confirmed without transaction");
    assert!(transaction_id.starts_with("TXN_"));

    let quota = harness.system.discount.quota().await;
    assert_eq!(quota.used, 1);
    assert!(harness.system.discount.granted_discount(booking_id).await);

    let events = harness.saga_events(booking_id).await;
    let applied = events
        .iter()
        .find_map(|e| match &e.payload {
            BookingEvent::DiscountApplied(data) => Some(data.clone()),
            _ => None,
        })
        .expect("no DiscountApplied recorded");
    assert_eq!(applied.discount_type, DiscountType::R1TwelvePercentOff);
    assert_eq!(applied.base_price, Money::from_rupees(500));
    assert_eq!(applied.final_price, Money::from_paise(44000));

    let notice = events
        .iter()
        .find_map(|e| match &e.payload {
            BookingEvent::NotificationSent(data) => Some(data.kind),
            _ => None,
        })
        .expect("no NotificationSent recorded");
    assert_eq!(notice, NotificationKind::Confirmation);

    assert_causal_order(
        &harness.saga_topics(booking_id).await,
        &[
            Topic::BookingInitiated,
            Topic::InventoryReserved,
            Topic::DiscountApplied,
            Topic::PaymentSuccess,
            Topic::BookingConfirmed,
        ],
    );
}

#[tokio::test]
async fn ineligible_booking_pays_full_price() {
    let harness = setup(100).await;
    let booking_id = harness
        .system
        .orchestrator
        .create_booking(ordinary_patient(), services(&["srv_1"]))
        .await
        .unwrap();

    assert!(harness.wait_for_topic(booking_id, Topic::BookingConfirmed).await);

    let booking = harness.system.orchestrator.booking(booking_id).await.unwrap();
    assert_eq!(booking.final_price, Some(Money::from_rupees(500)));
    assert_eq!(harness.system.discount.quota().await.used, 0);

    let events = harness.saga_events(booking_id).await;
    let applied = events
        .iter()
        .find_map(|e| match &e.payload {
            BookingEvent::DiscountApplied(data) => Some(data.discount_type),
            _ => None,
        })
        .expect("no DiscountApplied recorded");
    assert_eq!(applied, DiscountType::None);
}

#[tokio::test]
async fn high_value_selection_is_discounted_by_price_alone() {
    let harness = setup(100).await;
    let booking_id = harness
        .system
        .orchestrator
        .create_booking(ordinary_patient(), services(&["srv_2"]))
        .await
        .unwrap();

    assert!(harness.wait_for_topic(booking_id, Topic::BookingConfirmed).await);

    let booking = harness.system.orchestrator.booking(booking_id).await.unwrap();
    // 12% off ₹1200.
    assert_eq!(booking.final_price, Some(Money::from_paise(105600)));
    assert_eq!(harness.system.discount.quota().await.used, 1);
}

#[tokio::test]
async fn quota_exhaustion_fails_the_booking_and_releases_inventory() {
    let harness = setup(0).await;
    let booking_id = harness
        .system
        .orchestrator
        .create_booking(birthday_patient(), services(&["srv_1"]))
        .await
        .unwrap();

    assert!(harness.wait_for_topic(booking_id, Topic::BookingFailed).await);
    assert!(harness.wait_for_topic(booking_id, Topic::InventoryReleased).await);

    let booking = harness.system.orchestrator.booking(booking_id).await.unwrap();
    assert_eq!(booking.status, BookingStatus::Failed);
    assert_eq!(booking.failure_reason.as_deref(), Some(QUOTA_REACHED_REASON));

    assert!(harness.system.inventory.reservation(booking_id).await.is_none());
    assert_eq!(harness.system.discount.quota().await.used, 0);

    let topics = harness.saga_topics(booking_id).await;
    assert_causal_order(
        &topics,
        &[
            Topic::DiscountRejected,
            Topic::CompensateInventory,
            Topic::InventoryReleased,
        ],
    );
    // The saga never reached the gateway.
    assert!(!topics.contains(&Topic::PaymentSuccess));
    assert!(!topics.contains(&Topic::PaymentFailed));
}

#[tokio::test]
async fn forced_payment_failure_compensates_discount_and_inventory() {
    let harness = setup(100).await;
    harness.system.payment.arm_failure();

    let booking_id = harness
        .system
        .orchestrator
        .create_booking(ordinary_patient(), services(&["srv_2"]))
        .await
        .unwrap();

    assert!(harness.wait_for_topic(booking_id, Topic::BookingFailed).await);
    assert!(harness.wait_for_topic(booking_id, Topic::DiscountReleased).await);
    assert!(harness.wait_for_topic(booking_id, Topic::InventoryReleased).await);

    let booking = harness.system.orchestrator.booking(booking_id).await.unwrap();
    assert_eq!(booking.status, BookingStatus::Failed);
    assert_eq!(
        booking.failure_reason.as_deref(),
        Some(SIMULATED_FAILURE_REASON)
    );

    // Both stages were unwound.
    assert!(harness.system.inventory.reservation(booking_id).await.is_none());
    assert_eq!(harness.system.discount.quota().await.used, 0);
    assert!(!harness.system.discount.granted_discount(booking_id).await);
    assert!(!harness.system.payment.failure_armed());

    let events = harness.saga_events(booking_id).await;
    let notice = events
        .iter()
        .find_map(|e| match &e.payload {
            BookingEvent::NotificationSent(data) => Some(data.kind),
            _ => None,
        })
        .expect("no NotificationSent recorded");
    assert_eq!(notice, NotificationKind::FailureNotice);

    // The switch was single-shot: the next booking sails through.
    let retry_id = harness
        .system
        .orchestrator
        .create_booking(ordinary_patient(), services(&["srv_2"]))
        .await
        .unwrap();
    assert!(harness.wait_for_topic(retry_id, Topic::BookingConfirmed).await);
}

#[tokio::test]
async fn force_failure_topic_arms_the_gateway() {
    let harness = setup(100).await;
    assert!(!harness.system.payment.failure_armed());

    harness.system.bus.publish(BookingEvent::ForcePaymentFailure).await;

    let deadline = tokio::time::Instant::now() + WAIT;
    while !harness.system.payment.failure_armed() {
        assert!(tokio::time::Instant::now() < deadline, "flag never armed");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn unknown_service_short_circuits_before_any_reservation() {
    let harness = setup(100).await;
    let booking_id = harness
        .system
        .orchestrator
        .create_booking(birthday_patient(), services(&["srv_999"]))
        .await
        .unwrap();

    assert!(harness.wait_for_topic(booking_id, Topic::BookingFailed).await);

    let booking = harness.system.orchestrator.booking(booking_id).await.unwrap();
    assert_eq!(booking.status, BookingStatus::Failed);
    assert_eq!(booking.failure_reason.as_deref(), Some("Service not found"));
    assert!(harness.system.inventory.reservation(booking_id).await.is_none());

    let topics = harness.saga_topics(booking_id).await;
    assert!(topics.contains(&Topic::InventoryFailed));
    assert!(!topics.contains(&Topic::InventoryReserved));
    assert!(!topics.contains(&Topic::DiscountApplied));
    assert!(!topics.contains(&Topic::PaymentSuccess));
    assert!(!topics.contains(&Topic::InventoryReleased));
}

#[tokio::test]
async fn unlisted_ids_other_than_the_demo_one_get_the_generic_reason() {
    let harness = setup(100).await;
    let booking_id = harness
        .system
        .orchestrator
        .create_booking(ordinary_patient(), services(&["srv_42"]))
        .await
        .unwrap();

    assert!(harness.wait_for_topic(booking_id, Topic::BookingFailed).await);
    let booking = harness.system.orchestrator.booking(booking_id).await.unwrap();
    assert_eq!(booking.failure_reason.as_deref(), Some("Invalid Service ID"));
}

#[tokio::test]
async fn stray_compensations_are_harmless() {
    let harness = setup(100).await;
    let phantom = BookingId::new();

    harness
        .system
        .bus
        .publish(BookingEvent::compensate_inventory(phantom, "never booked"))
        .await;
    harness
        .system
        .bus
        .publish(BookingEvent::compensate_discount(phantom, "never booked"))
        .await;

    // Give both deliveries time to land.
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(harness.system.discount.quota().await.used, 0);
    assert_eq!(harness.system.inventory.reservation_count().await, 0);

    let topics = harness.saga_topics(phantom).await;
    assert!(!topics.contains(&Topic::InventoryReleased));
    assert!(!topics.contains(&Topic::DiscountReleased));
}

#[tokio::test]
async fn every_saga_event_carries_the_initiating_trace() {
    let harness = setup(100).await;
    let booking_id = harness
        .system
        .orchestrator
        .create_booking(birthday_patient(), services(&["srv_1"]))
        .await
        .unwrap();

    assert!(harness.wait_for_topic(booking_id, Topic::NotificationSent).await);

    let events = harness.saga_events(booking_id).await;
    let initiating_trace = events
        .iter()
        .find(|e| e.topic() == Topic::BookingInitiated)
        .expect("no BookingInitiated recorded")
        .trace_id;
    for event in &events {
        assert_eq!(event.trace_id, initiating_trace, "{:?}", event.topic());
    }
}

#[tokio::test]
async fn concurrent_sagas_never_overrun_the_quota() {
    const SAGAS: usize = 10;
    const LIMIT: u32 = 3;

    let harness = setup(LIMIT).await;
    let ids: Vec<BookingId> = future::join_all((0..SAGAS).map(|_| {
        let orchestrator = harness.system.orchestrator.clone();
        async move {
            orchestrator
                .create_booking(ordinary_patient(), services(&["srv_2"]))
                .await
                .unwrap()
        }
    }))
    .await;

    for &booking_id in &ids {
        let terminal = harness
            .recorder
            .wait_for(WAIT, |events| {
                events.iter().any(|e| {
                    matches!(
                        e.topic(),
                        Topic::BookingConfirmed | Topic::BookingFailed
                    ) && e.payload.booking_id() == Some(booking_id)
                })
            })
            .await;
        assert!(terminal, "saga never finished");
    }

    let quota = harness.system.discount.quota().await;
    assert!(quota.used <= LIMIT);

    let mut confirmed = 0;
    let mut granted = 0;
    for &booking_id in &ids {
        let booking = harness.system.orchestrator.booking(booking_id).await.unwrap();
        if booking.status == BookingStatus::Confirmed {
            confirmed += 1;
        } else {
            assert_eq!(
                booking.failure_reason.as_deref(),
                Some(QUOTA_REACHED_REASON)
            );
        }
        if harness.system.discount.granted_discount(booking_id).await {
            granted += 1;
        }
    }
    assert_eq!(confirmed, LIMIT as usize);
    assert_eq!(granted as u32, quota.used);
}

#[tokio::test]
async fn quota_can_be_filled_and_reset_between_sagas() {
    let harness = setup(10).await;
    harness.system.discount.fill_quota().await;

    let blocked_id = harness
        .system
        .orchestrator
        .create_booking(birthday_patient(), services(&["srv_1"]))
        .await
        .unwrap();
    assert!(harness.wait_for_topic(blocked_id, Topic::BookingFailed).await);

    harness.system.discount.reset_quota().await;

    let open_id = harness
        .system
        .orchestrator
        .create_booking(birthday_patient(), services(&["srv_1"]))
        .await
        .unwrap();
    assert!(harness.wait_for_topic(open_id, Topic::BookingConfirmed).await);
    assert_eq!(harness.system.discount.quota().await.used, 1);
}
