//! The downstream services of the booking saga.

pub mod discount;
pub mod inventory;
pub mod notification;
pub mod payment;

pub use discount::{DiscountManager, QuotaSnapshot, QUOTA_REACHED_REASON};
pub use inventory::{InventoryManager, Reservation};
pub use notification::NotificationDispatcher;
pub use payment::{PaymentProcessor, SIMULATED_FAILURE_REASON};
