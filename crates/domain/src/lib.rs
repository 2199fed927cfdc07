//! Booking domain model.
//!
//! This crate defines everything the saga services agree on: the
//! patient and money value objects, the clinic service catalog, the
//! booking record with its status machine, and the typed event
//! vocabulary that travels over the bus.

pub mod booking;
pub mod catalog;
pub mod events;
pub mod state;
pub mod value_objects;

pub use booking::Booking;
pub use catalog::{CatalogEntry, ServiceCatalog, UNLISTED_SERVICE_ID};
pub use events::{BookingEvent, DiscountType, NotificationKind, Topic};
pub use state::BookingStatus;
pub use value_objects::{Gender, Money, Patient, ServiceId};
