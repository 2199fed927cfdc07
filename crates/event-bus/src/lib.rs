//! In-process topic bus with artificial delivery latency.
//!
//! This crate is the transport of the booking saga demo. It routes
//! typed payloads by topic, stamps each chain of events with a trace
//! ID, and injects a configurable delay between publish and delivery
//! so concurrent sagas interleave the way they would across real
//! service boundaries. Payload types are supplied by the caller via
//! [`EventPayload`]; the bus itself carries no domain knowledge.

pub mod bus;
pub mod delay;
pub mod event;
pub mod handler;
pub mod recorder;

pub use bus::EventBus;
pub use delay::DeliveryDelay;
pub use event::{Event, EventPayload};
pub use handler::{BoxError, EventHandler};
pub use recorder::EventRecorder;
