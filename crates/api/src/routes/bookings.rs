//! Booking, quota, test-control, and timeline endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, NaiveDate, Utc};
use common::{BookingId, TraceId};
use domain::{Booking, BookingEvent, Gender, Patient, ServiceId};
use event_bus::EventRecorder;
use saga::{BookingSystem, QuotaSnapshot};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState {
    /// The wired-up saga services.
    pub system: BookingSystem,

    /// Tap on the vocabulary topics; backs `GET /api/events`.
    pub timeline: EventRecorder<BookingEvent>,
}

// -- Request types --

#[derive(Deserialize)]
pub struct BookRequest {
    pub name: String,
    pub gender: Gender,
    pub dob: NaiveDate,
    pub service_ids: Vec<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct BookAccepted {
    pub booking_id: String,
    pub message: &'static str,
}

#[derive(Serialize)]
pub struct BookingResponse {
    pub booking_id: String,
    pub patient_name: String,
    pub status: String,
    pub service_ids: Vec<String>,
    pub final_price_paise: Option<i64>,
    pub transaction_id: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Booking> for BookingResponse {
    fn from(booking: Booking) -> Self {
        Self {
            booking_id: booking.id.to_string(),
            patient_name: booking.patient.name,
            status: booking.status.to_string(),
            service_ids: booking
                .service_ids
                .iter()
                .map(ToString::to_string)
                .collect(),
            final_price_paise: booking.final_price.map(|price| price.paise()),
            transaction_id: booking.transaction_id,
            failure_reason: booking.failure_reason,
            created_at: booking.created_at,
        }
    }
}

#[derive(Serialize)]
pub struct TimelineEntry {
    pub topic: String,
    pub trace_id: TraceId,
    pub timestamp: DateTime<Utc>,
    pub event: BookingEvent,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

// -- Handlers --

/// POST /api/book — starts a booking saga.
#[tracing::instrument(skip(state, req))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BookRequest>,
) -> Result<(StatusCode, Json<BookAccepted>), ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("Name is required".to_string()));
    }
    if req.service_ids.is_empty() {
        return Err(ApiError::BadRequest(
            "At least one service must be selected".to_string(),
        ));
    }

    let patient = Patient::new(req.name.trim(), req.gender, req.dob);
    let service_ids = req.service_ids.into_iter().map(ServiceId::from).collect();
    let booking_id = state
        .system
        .orchestrator
        .create_booking(patient, service_ids)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(BookAccepted {
            booking_id: booking_id.to_string(),
            message: "Booking initiated",
        }),
    ))
}

/// GET /api/bookings/{id} — one booking's current state.
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<BookingResponse>, ApiError> {
    let uuid = uuid::Uuid::parse_str(&id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid booking id: {e}")))?;
    let booking = state
        .system
        .orchestrator
        .booking(BookingId::from_uuid(uuid))
        .await?;
    Ok(Json(booking.into()))
}

/// GET /api/bookings — every booking seen this process lifetime.
pub async fn list(State(state): State<Arc<AppState>>) -> Json<Vec<BookingResponse>> {
    let mut bookings = state.system.orchestrator.bookings().await;
    bookings.sort_by_key(|booking| booking.created_at);
    Json(bookings.into_iter().map(Into::into).collect())
}

/// GET /api/quota — current discount quota usage.
pub async fn quota(State(state): State<Arc<AppState>>) -> Json<QuotaSnapshot> {
    Json(state.system.discount.quota().await)
}

/// POST /api/reset-quota — test control: counter back to zero.
pub async fn reset_quota(State(state): State<Arc<AppState>>) -> Json<QuotaSnapshot> {
    Json(state.system.discount.reset_quota().await)
}

/// POST /api/test/fill-quota — test control: counter up to the limit.
pub async fn fill_quota(State(state): State<Arc<AppState>>) -> Json<QuotaSnapshot> {
    Json(state.system.discount.fill_quota().await)
}

/// POST /api/test/fail-next-payment — arms the gateway to decline once.
pub async fn fail_next_payment(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<MessageResponse>) {
    state
        .system
        .bus
        .publish(BookingEvent::ForcePaymentFailure)
        .await;
    (
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: "Next payment will fail",
        }),
    )
}

/// GET /api/events — the recorded event timeline, in delivery order.
pub async fn events(State(state): State<Arc<AppState>>) -> Json<Vec<TimelineEntry>> {
    let entries = state
        .timeline
        .events()
        .await
        .into_iter()
        .map(|event| TimelineEntry {
            topic: event.topic().to_string(),
            trace_id: event.trace_id,
            timestamp: event.timestamp,
            event: event.payload,
        })
        .collect();
    Json(entries)
}
