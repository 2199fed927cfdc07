use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::TraceId;
use futures_util::future;
use tokio::sync::RwLock;

use crate::delay::DeliveryDelay;
use crate::event::{Event, EventPayload};
use crate::handler::{BoxError, EventHandler, FnHandler};

/// Topic-based publish/subscribe bus.
///
/// Publishing never blocks the caller: the event is handed to a spawned
/// delivery task that sleeps out the configured [`DeliveryDelay`] and
/// then invokes every handler subscribed at publish time. Distinct
/// publishes draw independent delays, so nothing orders one publish
/// against another; a single publish, however, reaches all of its own
/// subscribers together.
///
/// Handler errors are caught here, logged with topic and trace ID, and
/// never propagate to the publisher or to sibling handlers.
#[derive(Clone)]
pub struct EventBus<P: EventPayload> {
    handlers: Arc<RwLock<HashMap<P::Topic, Vec<Arc<dyn EventHandler<P>>>>>>,
    delay: DeliveryDelay,
}

impl<P: EventPayload> EventBus<P> {
    /// Creates a bus with the demo default delivery jitter.
    pub fn new() -> Self {
        Self::with_delay(DeliveryDelay::default())
    }

    /// Creates a bus with the given delivery delay strategy.
    pub fn with_delay(delay: DeliveryDelay) -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
            delay,
        }
    }

    /// Returns the configured delivery delay strategy.
    pub fn delay(&self) -> DeliveryDelay {
        self.delay
    }

    /// Registers a handler for a topic.
    ///
    /// Handlers for one topic are invoked in subscription order.
    pub async fn subscribe(&self, topic: P::Topic, handler: Arc<dyn EventHandler<P>>) {
        let mut handlers = self.handlers.write().await;
        handlers.entry(topic).or_default().push(handler);
        tracing::info!(topic = %topic, "new subscriber");
    }

    /// Registers a plain async closure as a handler for a topic.
    pub async fn subscribe_fn<F, Fut>(&self, topic: P::Topic, f: F)
    where
        F: Fn(Event<P>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.subscribe(topic, Arc::new(FnHandler { f })).await;
    }

    /// Returns how many handlers are subscribed to a topic.
    pub async fn subscriber_count(&self, topic: P::Topic) -> usize {
        self.handlers
            .read()
            .await
            .get(&topic)
            .map_or(0, Vec::len)
    }

    /// Publishes the first event of a chain under a freshly minted
    /// trace ID, which is returned so the caller can correlate.
    pub async fn publish(&self, payload: P) -> TraceId {
        let trace_id = TraceId::new();
        self.publish_with_trace(trace_id, payload).await;
        trace_id
    }

    /// Publishes a follow-on event under an existing trace ID.
    ///
    /// Returns before delivery: the event lands on subscribers only
    /// after the delivery delay elapses. Publishing to a topic nobody
    /// subscribes to is a silent no-op.
    pub async fn publish_with_trace(&self, trace_id: TraceId, payload: P) {
        let topic = payload.topic();
        tracing::info!(topic = %topic, trace_id = %trace_id, "publishing event");
        metrics::counter!("bus_events_published_total").increment(1);

        let handlers = self
            .handlers
            .read()
            .await
            .get(&topic)
            .cloned()
            .unwrap_or_default();
        if handlers.is_empty() {
            tracing::debug!(topic = %topic, trace_id = %trace_id, "no subscribers for topic");
            return;
        }

        let delay = self.delay.sample();
        tokio::spawn(deliver(topic, trace_id, payload, handlers, delay));
    }
}

impl<P: EventPayload> Default for EventBus<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// Delivery task for one publish: sleep out the delay, stamp the
/// delivery time, then run every handler. Handlers start in
/// subscription order but run concurrently, so one handler's internal
/// latency does not hold up its siblings.
async fn deliver<P: EventPayload>(
    topic: P::Topic,
    trace_id: TraceId,
    payload: P,
    handlers: Vec<Arc<dyn EventHandler<P>>>,
    delay: Duration,
) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let timestamp = Utc::now();
    tracing::debug!(
        topic = %topic,
        trace_id = %trace_id,
        subscribers = handlers.len(),
        "delivering event"
    );
    metrics::counter!("bus_events_delivered_total").increment(1);

    let invocations = handlers.into_iter().map(|handler| {
        let event = Event {
            trace_id,
            timestamp,
            payload: payload.clone(),
        };
        async move {
            if let Err(error) = handler.handle(event).await {
                metrics::counter!("bus_handler_errors_total").increment(1);
                tracing::error!(
                    topic = %topic,
                    trace_id = %trace_id,
                    error = %error,
                    "handler failed; event dropped for this subscriber"
                );
            }
        }
    });
    future::join_all(invocations).await;
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::recorder::EventRecorder;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum TestEvent {
        Ping { n: u32 },
        Pong,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum TestTopic {
        Ping,
        Pong,
    }

    impl std::fmt::Display for TestTopic {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            let name = match self {
                TestTopic::Ping => "PING",
                TestTopic::Pong => "PONG",
            };
            write!(f, "{name}")
        }
    }

    impl EventPayload for TestEvent {
        type Topic = TestTopic;

        fn topic(&self) -> TestTopic {
            match self {
                TestEvent::Ping { .. } => TestTopic::Ping,
                TestEvent::Pong => TestTopic::Pong,
            }
        }
    }

    fn instant_bus() -> EventBus<TestEvent> {
        EventBus::with_delay(DeliveryDelay::None)
    }

    const WAIT: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn publish_delivers_to_subscriber() {
        let bus = instant_bus();
        let recorder = EventRecorder::new();
        recorder.attach(&bus, &[TestTopic::Ping]).await;

        bus.publish(TestEvent::Ping { n: 7 }).await;

        assert!(recorder.wait_for(WAIT, |events| events.len() == 1).await);
        let events = recorder.events().await;
        assert_eq!(events[0].payload, TestEvent::Ping { n: 7 });
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_silent() {
        let bus = instant_bus();
        let recorder = EventRecorder::new();
        recorder.attach(&bus, &[TestTopic::Pong]).await;

        // Nobody listens on PING; only the PONG publish may arrive.
        bus.publish(TestEvent::Ping { n: 1 }).await;
        bus.publish(TestEvent::Pong).await;

        assert!(recorder.wait_for(WAIT, |events| events.len() == 1).await);
        let events = recorder.events().await;
        assert_eq!(events[0].payload, TestEvent::Pong);
    }

    #[tokio::test]
    async fn handlers_start_in_subscription_order() {
        let bus = instant_bus();
        let seen: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));

        for tag in 1..=3 {
            let seen = seen.clone();
            bus.subscribe_fn(TestTopic::Ping, move |_event| {
                let seen = seen.clone();
                async move {
                    seen.lock().unwrap().push(tag);
                    Ok(())
                }
            })
            .await;
        }

        bus.publish(TestEvent::Ping { n: 0 }).await;

        let deadline = tokio::time::Instant::now() + WAIT;
        while seen.lock().unwrap().len() < 3 {
            assert!(tokio::time::Instant::now() < deadline, "handlers never ran");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn failing_handler_does_not_disturb_siblings() {
        let bus = instant_bus();
        let delivered = Arc::new(AtomicUsize::new(0));

        bus.subscribe_fn(TestTopic::Ping, |_event| async move {
            Err::<(), BoxError>("boom".into())
        })
        .await;
        {
            let delivered = delivered.clone();
            bus.subscribe_fn(TestTopic::Ping, move |_event| {
                let delivered = delivered.clone();
                async move {
                    delivered.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;
        }

        bus.publish(TestEvent::Ping { n: 0 }).await;

        let deadline = tokio::time::Instant::now() + WAIT;
        while delivered.load(Ordering::SeqCst) == 0 {
            assert!(tokio::time::Instant::now() < deadline, "sibling never ran");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn trace_id_is_propagated_unchanged() {
        let bus = instant_bus();
        let recorder = EventRecorder::new();
        recorder.attach(&bus, &[TestTopic::Ping, TestTopic::Pong]).await;

        let trace_id = bus.publish(TestEvent::Ping { n: 1 }).await;
        bus.publish_with_trace(trace_id, TestEvent::Pong).await;

        assert!(recorder.wait_for(WAIT, |events| events.len() == 2).await);
        for event in recorder.events().await {
            assert_eq!(event.trace_id, trace_id);
        }
    }

    #[tokio::test]
    async fn each_publish_mints_a_fresh_trace() {
        let bus = instant_bus();
        let first = bus.publish(TestEvent::Pong).await;
        let second = bus.publish(TestEvent::Pong).await;
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn one_publish_reaches_all_subscribers_with_one_timestamp() {
        let bus = instant_bus();
        let first = EventRecorder::new();
        let second = EventRecorder::new();
        first.attach(&bus, &[TestTopic::Ping]).await;
        second.attach(&bus, &[TestTopic::Ping]).await;

        bus.publish(TestEvent::Ping { n: 9 }).await;

        assert!(first.wait_for(WAIT, |events| events.len() == 1).await);
        assert!(second.wait_for(WAIT, |events| events.len() == 1).await);
        assert_eq!(
            first.events().await[0].timestamp,
            second.events().await[0].timestamp
        );
    }

    #[tokio::test]
    async fn fixed_delay_defers_delivery() {
        let bus = EventBus::with_delay(DeliveryDelay::Fixed(Duration::from_millis(80)));
        let recorder = EventRecorder::new();
        recorder.attach(&bus, &[TestTopic::Ping]).await;

        bus.publish(TestEvent::Ping { n: 1 }).await;

        // Publish returns before delivery; nothing has landed yet.
        assert!(recorder.is_empty().await);
        assert!(recorder.wait_for(WAIT, |events| events.len() == 1).await);
    }

    #[tokio::test]
    async fn slow_handler_does_not_block_siblings() {
        let bus = instant_bus();
        let fast = Arc::new(AtomicUsize::new(0));

        bus.subscribe_fn(TestTopic::Ping, |_event| async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        {
            let fast = fast.clone();
            bus.subscribe_fn(TestTopic::Ping, move |_event| {
                let fast = fast.clone();
                async move {
                    fast.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;
        }

        bus.publish(TestEvent::Ping { n: 0 }).await;

        // The fast sibling lands long before the slow one finishes.
        let deadline = tokio::time::Instant::now() + Duration::from_millis(500);
        while fast.load(Ordering::SeqCst) == 0 {
            assert!(tokio::time::Instant::now() < deadline, "sibling was held up");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn subscriber_count_tracks_registrations() {
        let bus = instant_bus();
        assert_eq!(bus.subscriber_count(TestTopic::Ping).await, 0);

        bus.subscribe_fn(TestTopic::Ping, |_event| async move { Ok(()) })
            .await;
        bus.subscribe_fn(TestTopic::Ping, |_event| async move { Ok(()) })
            .await;

        assert_eq!(bus.subscriber_count(TestTopic::Ping).await, 2);
        assert_eq!(bus.subscriber_count(TestTopic::Pong).await, 0);
    }

    #[tokio::test]
    async fn subscribers_registered_after_publish_miss_the_event() {
        let bus = EventBus::with_delay(DeliveryDelay::Fixed(Duration::from_millis(40)));
        let early = EventRecorder::new();
        early.attach(&bus, &[TestTopic::Ping]).await;

        bus.publish(TestEvent::Ping { n: 1 }).await;

        // Registered while the first publish is still in flight.
        let late = EventRecorder::new();
        late.attach(&bus, &[TestTopic::Ping]).await;

        assert!(early.wait_for(WAIT, |events| events.len() == 1).await);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(late.is_empty().await);
    }
}
