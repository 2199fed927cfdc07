//! Booking status machine.

use serde::{Deserialize, Serialize};

/// The status of a booking in its lifecycle.
///
/// Status transitions:
/// ```text
/// Pending ──┬──► Confirmed
///           └──► Failed
/// ```
///
/// Both outcomes are terminal; a late stage event arriving for a
/// terminal booking is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    /// Saga in flight, outcome unknown.
    #[default]
    Pending,

    /// Payment went through; the booking holds its slots (terminal).
    Confirmed,

    /// A stage failed and compensation ran (terminal).
    Failed,
}

impl BookingStatus {
    /// Returns true if the booking can still be confirmed.
    pub fn can_confirm(&self) -> bool {
        matches!(self, BookingStatus::Pending)
    }

    /// Returns true if the booking can still be failed.
    pub fn can_fail(&self) -> bool {
        matches!(self, BookingStatus::Pending)
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Confirmed | BookingStatus::Failed)
    }

    /// Returns the status as the wire string.
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
