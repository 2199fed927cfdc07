use std::future::Future;

use async_trait::async_trait;

use crate::event::{Event, EventPayload};

/// Error type handlers report back to the bus.
///
/// The bus does not interpret handler errors; it logs them at the
/// delivery boundary and moves on, so the concrete type is erased.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A subscriber callback for one or more topics.
#[async_trait]
pub trait EventHandler<P: EventPayload>: Send + Sync {
    async fn handle(&self, event: Event<P>) -> Result<(), BoxError>;
}

/// Adapts a plain async closure into an [`EventHandler`].
pub(crate) struct FnHandler<F> {
    pub(crate) f: F,
}

#[async_trait]
impl<P, F, Fut> EventHandler<P> for FnHandler<F>
where
    P: EventPayload,
    F: Fn(Event<P>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), BoxError>> + Send,
{
    async fn handle(&self, event: Event<P>) -> Result<(), BoxError> {
        (self.f)(event).await
    }
}
