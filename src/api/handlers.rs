use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{
        sse::{Event as SseEvent, KeepAlive},
        IntoResponse, Sse,
    },
    Json,
};
use chrono::{DateTime, Utc};
use futures::{stream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;

use super::live::{LiveFrame, LiveUpdates};
use crate::data::{Alert, AlertStatus, Vital};
use crate::ingest::{IngestError, VitalService};
use crate::notify::{Message, MessageStatus, NotificationQueue};

/// Application state shared across handlers
pub struct AppState {
    pub service: Arc<VitalService>,
    pub queue: Arc<NotificationQueue>,
    pub live: LiveUpdates,
    /// Process shutdown; passed into blocking calls such as publish
    pub shutdown: CancellationToken,
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============================================================================
// Wire representations
// ============================================================================

fn unix_secs(ts: Option<DateTime<Utc>>) -> i64 {
    ts.map(|t| t.timestamp()).unwrap_or(0)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VitalResponse {
    pub id: u64,
    pub patient_id: String,
    pub systolic: i32,
    pub diastolic: i32,
    pub taken_at: i64,
    pub received_at: i64,
}

impl From<&Vital> for VitalResponse {
    fn from(vital: &Vital) -> Self {
        Self {
            id: vital.id,
            patient_id: vital.patient_id.clone(),
            systolic: vital.systolic,
            diastolic: vital.diastolic,
            taken_at: vital.taken_at.timestamp(),
            received_at: unix_secs(vital.received_at),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AlertResponse {
    pub id: u64,
    pub vital: VitalResponse,
    pub reason: String,
    pub created_at: i64,
    pub status: AlertStatus,
}

impl From<&Alert> for AlertResponse {
    fn from(alert: &Alert) -> Self {
        Self {
            id: alert.id,
            vital: VitalResponse {
                id: alert.vital_id,
                patient_id: alert.patient_id.clone(),
                systolic: alert.systolic,
                diastolic: alert.diastolic,
                taken_at: alert.taken_at.timestamp(),
                received_at: unix_secs(alert.received_at),
            },
            reason: alert.reason.clone(),
            created_at: alert.created_at.timestamp(),
            status: alert.status,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: u64,
    pub patient_id: String,
    pub content: String,
    pub status: MessageStatus,
    pub queued_at: i64,
    /// Zero until the message is sent
    pub sent_at: i64,
}

impl From<&Message> for MessageResponse {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            patient_id: message.patient_id.clone(),
            content: message.content.clone(),
            status: message.status,
            queued_at: message.queued_at.timestamp(),
            sent_at: unix_secs(message.sent_at),
        }
    }
}

// ============================================================================
// Vitals
// ============================================================================

#[derive(Deserialize)]
pub struct PatientFilter {
    #[serde(default)]
    pub patient_id: String,
}

#[derive(Deserialize)]
pub struct IngestVitalRequest {
    #[serde(default)]
    pub patient_id: String,
    pub systolic: i32,
    pub diastolic: i32,
    /// Unix seconds
    #[serde(default)]
    pub taken_at: i64,
}

#[derive(Serialize, Deserialize)]
pub struct IngestVitalResponse {
    pub vital: VitalResponse,
}

#[derive(Serialize, Deserialize)]
pub struct VitalsResponse {
    pub vitals: Vec<VitalResponse>,
}

pub async fn ingest_vital(
    State(state): State<Arc<AppState>>,
    request: Result<Json<IngestVitalRequest>, JsonRejection>,
) -> Result<Json<IngestVitalResponse>, ApiError> {
    let Json(request) = request?;
    if request.taken_at <= 0 {
        return Err(ApiError::BadRequest("taken_at is required".to_string()));
    }
    let taken_at = DateTime::<Utc>::from_timestamp(request.taken_at, 0)
        .ok_or_else(|| ApiError::BadRequest("taken_at is out of range".to_string()))?;

    let vital = state
        .service
        .ingest_vital(
            &request.patient_id,
            request.systolic,
            request.diastolic,
            Some(taken_at),
            &state.shutdown,
        )
        .await?;

    Ok(Json(IngestVitalResponse {
        vital: VitalResponse::from(&vital),
    }))
}

pub async fn list_vitals(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<PatientFilter>,
) -> Result<Json<VitalsResponse>, ApiError> {
    let vitals = state
        .service
        .list_vitals(&filter.patient_id, &state.shutdown)?;

    Ok(Json(VitalsResponse {
        vitals: vitals.iter().map(VitalResponse::from).collect(),
    }))
}

// ============================================================================
// Alerts
// ============================================================================

#[derive(Serialize, Deserialize)]
pub struct AlertsResponse {
    pub alerts: Vec<AlertResponse>,
}

pub async fn list_alerts(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<PatientFilter>,
) -> Result<Json<AlertsResponse>, ApiError> {
    let alerts = state
        .service
        .list_alerts(&filter.patient_id, &state.shutdown)?;

    Ok(Json(AlertsResponse {
        alerts: alerts.iter().map(AlertResponse::from).collect(),
    }))
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Serialize, Deserialize)]
pub struct MessagesResponse {
    pub messages: Vec<MessageResponse>,
}

pub async fn list_messages(State(state): State<Arc<AppState>>) -> Json<MessagesResponse> {
    let messages = state.queue.list_messages();
    Json(MessagesResponse {
        messages: messages.iter().map(MessageResponse::from).collect(),
    })
}

/// Server-sent stream of message updates; ends at process shutdown
pub async fn message_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let connected = stream::iter(LiveFrame::Connected.encode());

    let updates = BroadcastStream::new(state.live.subscribe()).filter_map(|item| async move {
        match item {
            Ok(data) => Some(data),
            Err(e) => {
                tracing::debug!("Live update viewer lagged: {}", e);
                None
            }
        }
    });

    let stream = connected
        .chain(updates)
        .map(|data| Ok::<_, Infallible>(SseEvent::default().data(data)))
        .take_until(state.shutdown.clone().cancelled_owned());

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(30)))
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::InvalidVital(_) => ApiError::BadRequest(e.to_string()),
            IngestError::Storage(_) | IngestError::Publish { .. } => {
                tracing::error!(error = %e, "Ingestion failed");
                ApiError::Internal(e.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(format!("invalid request body: {}", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
