use std::time::Duration;

use rand::Rng;

/// Artificial latency applied between publish and delivery.
///
/// Each publish draws one delay independently, so two back-to-back
/// publishes can be delivered in either order. This is what gives the
/// demo its distributed-system feel; tests inject `None` or `Fixed`
/// to make runs deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryDelay {
    /// Deliver on the next runtime tick.
    None,
    /// Deliver after exactly this duration.
    Fixed(Duration),
    /// Deliver after a uniform random duration in `[min, max]`.
    Jitter { min: Duration, max: Duration },
}

impl DeliveryDelay {
    /// Draws the delay for one publish.
    pub fn sample(&self) -> Duration {
        match self {
            Self::None => Duration::ZERO,
            Self::Fixed(duration) => *duration,
            Self::Jitter { min, max } => {
                let millis = rand::thread_rng().gen_range(min.as_millis()..=max.as_millis());
                Duration::from_millis(millis as u64)
            }
        }
    }
}

impl Default for DeliveryDelay {
    /// The demo default: visible latency between 100 and 500 ms.
    fn default() -> Self {
        Self::Jitter {
            min: Duration::from_millis(100),
            max: Duration::from_millis(500),
        }
    }
}
