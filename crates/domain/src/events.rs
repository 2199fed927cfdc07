//! The event vocabulary of the booking saga.
//!
//! Every message that crosses the bus is one variant of
//! [`BookingEvent`], routed on its [`Topic`]. The vocabulary is closed:
//! adding a stage to the saga means adding a variant here, and the
//! compiler then walks every `match` that must learn about it.

use common::BookingId;
use event_bus::EventPayload;
use serde::{Deserialize, Serialize};

use crate::value_objects::{Money, Patient, ServiceId};

/// The channels of the saga, one per event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    BookingInitiated,
    InventoryReserved,
    InventoryFailed,
    InventoryReleased,
    DiscountApplied,
    DiscountRejected,
    DiscountReleased,
    PaymentSuccess,
    PaymentFailed,
    BookingConfirmed,
    BookingFailed,
    CompensateInventory,
    CompensateDiscount,
    NotificationSent,
    ForcePaymentFailure,
}

impl Topic {
    /// Every topic, the test trigger included.
    pub const ALL: [Topic; 15] = [
        Topic::BookingInitiated,
        Topic::InventoryReserved,
        Topic::InventoryFailed,
        Topic::InventoryReleased,
        Topic::DiscountApplied,
        Topic::DiscountRejected,
        Topic::DiscountReleased,
        Topic::PaymentSuccess,
        Topic::PaymentFailed,
        Topic::BookingConfirmed,
        Topic::BookingFailed,
        Topic::CompensateInventory,
        Topic::CompensateDiscount,
        Topic::NotificationSent,
        Topic::ForcePaymentFailure,
    ];

    /// The topics mirrored onto the public timeline. The force-failure
    /// trigger is test plumbing and stays off the wire view.
    pub const STREAMED: [Topic; 14] = [
        Topic::BookingInitiated,
        Topic::InventoryReserved,
        Topic::InventoryFailed,
        Topic::InventoryReleased,
        Topic::DiscountApplied,
        Topic::DiscountRejected,
        Topic::DiscountReleased,
        Topic::PaymentSuccess,
        Topic::PaymentFailed,
        Topic::BookingConfirmed,
        Topic::BookingFailed,
        Topic::CompensateInventory,
        Topic::CompensateDiscount,
        Topic::NotificationSent,
    ];

    /// Returns the topic as its wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::BookingInitiated => "BOOKING_INITIATED",
            Topic::InventoryReserved => "INVENTORY_RESERVED",
            Topic::InventoryFailed => "INVENTORY_FAILED",
            Topic::InventoryReleased => "INVENTORY_RELEASED",
            Topic::DiscountApplied => "DISCOUNT_APPLIED",
            Topic::DiscountRejected => "DISCOUNT_REJECTED",
            Topic::DiscountReleased => "DISCOUNT_RELEASED",
            Topic::PaymentSuccess => "PAYMENT_SUCCESS",
            Topic::PaymentFailed => "PAYMENT_FAILED",
            Topic::BookingConfirmed => "BOOKING_CONFIRMED",
            Topic::BookingFailed => "BOOKING_FAILED",
            Topic::CompensateInventory => "COMPENSATE_INVENTORY",
            Topic::CompensateDiscount => "COMPENSATE_DISCOUNT",
            Topic::NotificationSent => "NOTIFICATION_SENT",
            Topic::ForcePaymentFailure => "TEST_FORCE_PAYMENT_FAIL",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which discount rule priced a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscountType {
    /// No rule matched; final price equals base price.
    #[serde(rename = "NONE")]
    None,

    /// Rule R1 matched: 12% off for a birthday booking by a female
    /// patient, or any selection priced above ₹1000.
    #[serde(rename = "R1_12_PERCENT_OFF")]
    R1TwelvePercentOff,
}

impl DiscountType {
    /// Returns the discount type as the wire string.
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::None => "NONE",
            DiscountType::R1TwelvePercentOff => "R1_12_PERCENT_OFF",
        }
    }
}

impl std::fmt::Display for DiscountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a notification told the patient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    /// The booking went through.
    Confirmation,

    /// The booking failed and was rolled back.
    FailureNotice,
}

impl NotificationKind {
    /// Returns the kind as the wire string.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Confirmation => "CONFIRMATION",
            NotificationKind::FailureNotice => "FAILURE_NOTICE",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Events that can occur during a booking saga.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum BookingEvent {
    /// A booking was requested; the saga starts here.
    BookingInitiated(BookingInitiatedData),

    /// The requested services exist; slots are held.
    InventoryReserved(InventoryReservedData),

    /// Validation failed; nothing is held.
    InventoryFailed(InventoryFailedData),

    /// A compensation released previously held slots.
    InventoryReleased(InventoryReleasedData),

    /// Discounts were evaluated and the booking priced.
    DiscountApplied(DiscountAppliedData),

    /// The booking was eligible but the daily quota is exhausted.
    DiscountRejected(DiscountRejectedData),

    /// A compensation returned one quota unit.
    DiscountReleased(DiscountReleasedData),

    /// The gateway charged the final price.
    PaymentSuccess(PaymentSuccessData),

    /// The gateway declined the charge.
    PaymentFailed(PaymentFailedData),

    /// Terminal: the booking is confirmed.
    BookingConfirmed(BookingConfirmedData),

    /// Terminal: the booking failed and partial work was unwound.
    BookingFailed(BookingFailedData),

    /// Orchestrator order: release this booking's slots.
    CompensateInventory(CompensationData),

    /// Orchestrator order: return this booking's quota unit.
    CompensateDiscount(CompensationData),

    /// A notification went out for a terminal booking.
    NotificationSent(NotificationSentData),

    /// Test control: arm the payment processor to fail once.
    ForcePaymentFailure,
}

/// Data for BookingInitiated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingInitiatedData {
    /// The new booking's ID.
    pub booking_id: BookingId,

    /// Who the booking is for; carried forward for discount rules.
    pub patient: Patient,

    /// The requested services.
    pub service_ids: Vec<ServiceId>,
}

/// Data for InventoryReserved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryReservedData {
    /// The booking whose slots are held.
    pub booking_id: BookingId,

    /// Patient context passed along the chain.
    pub patient: Patient,

    /// The reserved services.
    pub service_ids: Vec<ServiceId>,

    /// Sum of the catalog prices for the selection.
    pub base_price: Money,
}

/// Data for InventoryFailed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryFailedData {
    /// The booking that failed validation.
    pub booking_id: BookingId,

    /// Why validation failed.
    pub reason: String,
}

/// Data for InventoryReleased.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryReleasedData {
    /// The booking whose slots were released.
    pub booking_id: BookingId,
}

/// Data for DiscountApplied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscountAppliedData {
    /// The priced booking.
    pub booking_id: BookingId,

    /// Price before discounts.
    pub base_price: Money,

    /// Price the gateway will charge.
    pub final_price: Money,

    /// Which rule priced it.
    pub discount_type: DiscountType,
}

/// Data for DiscountRejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscountRejectedData {
    /// The rejected booking.
    pub booking_id: BookingId,

    /// Why the booking was rejected.
    pub reason: String,
}

/// Data for DiscountReleased.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscountReleasedData {
    /// The booking whose quota unit was returned.
    pub booking_id: BookingId,

    /// Free quota after the release.
    pub remaining_quota: u32,
}

/// Data for PaymentSuccess.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSuccessData {
    /// The charged booking.
    pub booking_id: BookingId,

    /// What was charged.
    pub amount: Money,

    /// Gateway reference for the charge.
    pub transaction_id: String,
}

/// Data for PaymentFailed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentFailedData {
    /// The declined booking.
    pub booking_id: BookingId,

    /// Why the charge was declined.
    pub reason: String,
}

/// Data for BookingConfirmed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingConfirmedData {
    /// The confirmed booking.
    pub booking_id: BookingId,

    /// Reference handed to the patient; equals the booking ID.
    pub reference_id: BookingId,

    /// Price actually charged.
    pub final_price: Money,

    /// Gateway reference for the charge.
    pub transaction_id: String,
}

/// Data for BookingFailed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingFailedData {
    /// The failed booking.
    pub booking_id: BookingId,

    /// The stage reason that sank it.
    pub reason: String,
}

/// Data for both compensation orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompensationData {
    /// The booking being unwound.
    pub booking_id: BookingId,

    /// The failure reason that triggered the unwind.
    pub reason: String,
}

/// Data for NotificationSent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSentData {
    /// The booking the notification is about.
    pub booking_id: BookingId,

    /// What the patient was told.
    pub kind: NotificationKind,
}

impl BookingEvent {
    /// Returns the booking this event belongs to, if any.
    ///
    /// Only the test trigger is booking-agnostic.
    pub fn booking_id(&self) -> Option<BookingId> {
        match self {
            BookingEvent::BookingInitiated(data) => Some(data.booking_id),
            BookingEvent::InventoryReserved(data) => Some(data.booking_id),
            BookingEvent::InventoryFailed(data) => Some(data.booking_id),
            BookingEvent::InventoryReleased(data) => Some(data.booking_id),
            BookingEvent::DiscountApplied(data) => Some(data.booking_id),
            BookingEvent::DiscountRejected(data) => Some(data.booking_id),
            BookingEvent::DiscountReleased(data) => Some(data.booking_id),
            BookingEvent::PaymentSuccess(data) => Some(data.booking_id),
            BookingEvent::PaymentFailed(data) => Some(data.booking_id),
            BookingEvent::BookingConfirmed(data) => Some(data.booking_id),
            BookingEvent::BookingFailed(data) => Some(data.booking_id),
            BookingEvent::CompensateInventory(data) => Some(data.booking_id),
            BookingEvent::CompensateDiscount(data) => Some(data.booking_id),
            BookingEvent::NotificationSent(data) => Some(data.booking_id),
            BookingEvent::ForcePaymentFailure => None,
        }
    }
}

impl EventPayload for BookingEvent {
    type Topic = Topic;

    fn topic(&self) -> Topic {
        match self {
            BookingEvent::BookingInitiated(_) => Topic::BookingInitiated,
            BookingEvent::InventoryReserved(_) => Topic::InventoryReserved,
            BookingEvent::InventoryFailed(_) => Topic::InventoryFailed,
            BookingEvent::InventoryReleased(_) => Topic::InventoryReleased,
            BookingEvent::DiscountApplied(_) => Topic::DiscountApplied,
            BookingEvent::DiscountRejected(_) => Topic::DiscountRejected,
            BookingEvent::DiscountReleased(_) => Topic::DiscountReleased,
            BookingEvent::PaymentSuccess(_) => Topic::PaymentSuccess,
            BookingEvent::PaymentFailed(_) => Topic::PaymentFailed,
            BookingEvent::BookingConfirmed(_) => Topic::BookingConfirmed,
            BookingEvent::BookingFailed(_) => Topic::BookingFailed,
            BookingEvent::CompensateInventory(_) => Topic::CompensateInventory,
            BookingEvent::CompensateDiscount(_) => Topic::CompensateDiscount,
            BookingEvent::NotificationSent(_) => Topic::NotificationSent,
            BookingEvent::ForcePaymentFailure => Topic::ForcePaymentFailure,
        }
    }
}

// Convenience constructors
impl BookingEvent {
    /// Creates a BookingInitiated event.
    pub fn booking_initiated(
        booking_id: BookingId,
        patient: Patient,
        service_ids: Vec<ServiceId>,
    ) -> Self {
        BookingEvent::BookingInitiated(BookingInitiatedData {
            booking_id,
            patient,
            service_ids,
        })
    }

    /// Creates an InventoryReserved event.
    pub fn inventory_reserved(
        booking_id: BookingId,
        patient: Patient,
        service_ids: Vec<ServiceId>,
        base_price: Money,
    ) -> Self {
        BookingEvent::InventoryReserved(InventoryReservedData {
            booking_id,
            patient,
            service_ids,
            base_price,
        })
    }

    /// Creates an InventoryFailed event.
    pub fn inventory_failed(booking_id: BookingId, reason: impl Into<String>) -> Self {
        BookingEvent::InventoryFailed(InventoryFailedData {
            booking_id,
            reason: reason.into(),
        })
    }

    /// Creates an InventoryReleased event.
    pub fn inventory_released(booking_id: BookingId) -> Self {
        BookingEvent::InventoryReleased(InventoryReleasedData { booking_id })
    }

    /// Creates a DiscountApplied event.
    pub fn discount_applied(
        booking_id: BookingId,
        base_price: Money,
        final_price: Money,
        discount_type: DiscountType,
    ) -> Self {
        BookingEvent::DiscountApplied(DiscountAppliedData {
            booking_id,
            base_price,
            final_price,
            discount_type,
        })
    }

    /// Creates a DiscountRejected event.
    pub fn discount_rejected(booking_id: BookingId, reason: impl Into<String>) -> Self {
        BookingEvent::DiscountRejected(DiscountRejectedData {
            booking_id,
            reason: reason.into(),
        })
    }

    /// Creates a DiscountReleased event.
    pub fn discount_released(booking_id: BookingId, remaining_quota: u32) -> Self {
        BookingEvent::DiscountReleased(DiscountReleasedData {
            booking_id,
            remaining_quota,
        })
    }

    /// Creates a PaymentSuccess event.
    pub fn payment_success(
        booking_id: BookingId,
        amount: Money,
        transaction_id: impl Into<String>,
    ) -> Self {
        BookingEvent::PaymentSuccess(PaymentSuccessData {
            booking_id,
            amount,
            transaction_id: transaction_id.into(),
        })
    }

    /// Creates a PaymentFailed event.
    pub fn payment_failed(booking_id: BookingId, reason: impl Into<String>) -> Self {
        BookingEvent::PaymentFailed(PaymentFailedData {
            booking_id,
            reason: reason.into(),
        })
    }

    /// Creates a BookingConfirmed event. The patient-facing reference
    /// is the booking ID itself.
    pub fn booking_confirmed(
        booking_id: BookingId,
        final_price: Money,
        transaction_id: impl Into<String>,
    ) -> Self {
        BookingEvent::BookingConfirmed(BookingConfirmedData {
            booking_id,
            reference_id: booking_id,
            final_price,
            transaction_id: transaction_id.into(),
        })
    }

    /// Creates a BookingFailed event.
    pub fn booking_failed(booking_id: BookingId, reason: impl Into<String>) -> Self {
        BookingEvent::BookingFailed(BookingFailedData {
            booking_id,
            reason: reason.into(),
        })
    }

    /// Creates a CompensateInventory order.
    pub fn compensate_inventory(booking_id: BookingId, reason: impl Into<String>) -> Self {
        BookingEvent::CompensateInventory(CompensationData {
            booking_id,
            reason: reason.into(),
        })
    }

    /// Creates a CompensateDiscount order.
    pub fn compensate_discount(booking_id: BookingId, reason: impl Into<String>) -> Self {
        BookingEvent::CompensateDiscount(CompensationData {
            booking_id,
            reason: reason.into(),
        })
    }

    /// Creates a NotificationSent event.
    pub fn notification_sent(booking_id: BookingId, kind: NotificationKind) -> Self {
        BookingEvent::NotificationSent(NotificationSentData { booking_id, kind })
    }
}
