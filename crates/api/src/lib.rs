//! HTTP boundary for the booking saga demo.
//!
//! Exposes the booking entry point, booking/quota reads, the
//! test-control triggers, and the recorded event timeline, with
//! structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use domain::Topic;
use event_bus::EventRecorder;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{BookingSystem, BookingSystemConfig};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use routes::bookings::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/api/book", post(routes::bookings::create))
        .route("/api/bookings", get(routes::bookings::list))
        .route("/api/bookings/{id}", get(routes::bookings::get))
        .route("/api/quota", get(routes::bookings::quota))
        .route("/api/reset-quota", post(routes::bookings::reset_quota))
        .route("/api/test/fill-quota", post(routes::bookings::fill_quota))
        .route(
            "/api/test/fail-next-payment",
            post(routes::bookings::fail_next_payment),
        )
        .route("/api/events", get(routes::bookings::events))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Starts the saga services and taps the public timeline.
///
/// The timeline records the fourteen vocabulary topics; the
/// test-control trigger stays off the wire view.
pub async fn create_state(config: BookingSystemConfig) -> Arc<AppState> {
    let system = BookingSystem::start(config).await;
    let timeline = EventRecorder::new();
    timeline.attach(&system.bus, &Topic::STREAMED).await;
    Arc::new(AppState { system, timeline })
}
