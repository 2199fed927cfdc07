//! Saga error types.

use common::BookingId;
use thiserror::Error;

/// Errors the saga layer can report to its callers.
///
/// Business failures (unknown service, quota exhausted, declined
/// payment) are not errors: they travel over the bus as failure events
/// and drive compensation. This enum covers only the direct call
/// surface.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A booking was requested with no services on it.
    #[error("a booking needs at least one service")]
    EmptyServiceList,

    /// A lookup referenced a booking the orchestrator never saw.
    #[error("booking not found: {0}")]
    BookingNotFound(BookingId),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
