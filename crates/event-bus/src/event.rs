use std::fmt::{Debug, Display};
use std::hash::Hash;

use chrono::{DateTime, Utc};
use common::TraceId;
use serde::Serialize;

/// A message type that can travel over the bus.
///
/// Implementors are closed sum types: one variant per kind of message,
/// each mapping to exactly one topic. The bus itself stays ignorant of
/// what the payloads mean; it only routes by topic.
pub trait EventPayload: Clone + Send + Sync + 'static {
    /// The channel names for this payload family.
    type Topic: Copy + Eq + Hash + Debug + Display + Send + Sync + 'static;

    /// Returns the topic this payload is routed on.
    fn topic(&self) -> Self::Topic;
}

/// An event as a subscriber sees it.
///
/// The trace ID is minted at the first publish of a chain and carried
/// unchanged by every follow-on publish. The timestamp is assigned when
/// the delivery delay elapses, so every subscriber of one publish sees
/// the same instant.
#[derive(Debug, Clone, Serialize)]
pub struct Event<P> {
    pub trace_id: TraceId,
    pub timestamp: DateTime<Utc>,
    pub payload: P,
}

impl<P: EventPayload> Event<P> {
    /// Returns the topic of the carried payload.
    pub fn topic(&self) -> P::Topic {
        self.payload.topic()
    }
}
