//! The booking record the orchestrator tracks.

use chrono::{DateTime, Utc};
use common::BookingId;
use serde::{Deserialize, Serialize};

use crate::state::BookingStatus;
use crate::value_objects::{Money, Patient, ServiceId};

/// One booking and the outcome of its saga so far.
///
/// Created Pending when the saga starts; exactly one of
/// [`confirm`](Booking::confirm) or [`fail`](Booking::fail) moves it to
/// its terminal status. Callers guard with [`BookingStatus::can_confirm`]
/// and [`BookingStatus::can_fail`] so late events cannot reopen it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    /// Unique booking identifier.
    pub id: BookingId,

    /// Who the booking is for.
    pub patient: Patient,

    /// The requested services.
    pub service_ids: Vec<ServiceId>,

    /// Current lifecycle status.
    pub status: BookingStatus,

    /// Price actually charged; set on confirmation.
    pub final_price: Option<Money>,

    /// Payment gateway reference; set on confirmation.
    pub transaction_id: Option<String>,

    /// Why the saga failed; set on failure.
    pub failure_reason: Option<String>,

    /// When the booking was requested.
    pub created_at: DateTime<Utc>,
}

impl Booking {
    /// Creates a new Pending booking.
    pub fn new(id: BookingId, patient: Patient, service_ids: Vec<ServiceId>) -> Self {
        Self {
            id,
            patient,
            service_ids,
            status: BookingStatus::Pending,
            final_price: None,
            transaction_id: None,
            failure_reason: None,
            created_at: Utc::now(),
        }
    }

    /// Marks the booking confirmed with its charge and payment reference.
    pub fn confirm(&mut self, final_price: Money, transaction_id: impl Into<String>) {
        self.status = BookingStatus::Confirmed;
        self.final_price = Some(final_price);
        self.transaction_id = Some(transaction_id.into());
    }

    /// Marks the booking failed with the stage's reason.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = BookingStatus::Failed;
        self.failure_reason = Some(reason.into());
    }
}
