use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
};
use serde::Serialize;
use std::collections::BTreeMap;
use tower_http::decompression::RequestDecompressionLayer;

use super::{
    ApiError,
    state::AppState,
    utils::{LimitQuery, require_json},
};
use crate::deadletter::DeadLetterView;
use crate::envelope::Envelope;
use crate::messaging::MessageProducer;
use crate::observability::MetricsSnapshot;

/// Build the operator router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route(
            "/destinations/{destination}/messages",
            get(drain_messages).post(publish_message),
        )
        .route("/dead-letters", get(list_dead_letters))
        .with_state(state)
        // Transparent gzip/deflate request bodies
        .layer(RequestDecompressionLayer::new())
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub node: String,
    pub version: String,
    pub components: BTreeMap<String, String>,
}

/// Health check endpoint (GET /health)
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let mut components = BTreeMap::new();
    components.insert("broker".to_string(), "healthy".to_string());

    let dead_letters = match &state.dead_letters {
        Some(store) => match store.len() {
            Ok(_) => "healthy",
            Err(e) => {
                tracing::warn!(error = %e, "Dead-letter store health check failed");
                "unhealthy"
            }
        },
        None => "log-only",
    };
    components.insert("dead_letters".to_string(), dead_letters.to_string());

    let healthy = components.values().all(|status| status != "unhealthy");
    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        node: state.node_name.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        components,
    };

    (status_code, Json(response))
}

/// Worker counters (GET /metrics)
pub async fn metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

#[derive(Debug, Serialize)]
pub struct PublishResponse {
    pub destination: String,
}

/// Broker ingress (POST /destinations/{destination}/messages)
///
/// The body must be a complete envelope (`{"type": ..., "body": ...}`). The
/// envelope is queued as-is; checking the discriminator is the consumer's job.
pub async fn publish_message(
    State(state): State<AppState>,
    Path(destination): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    require_json(&headers)?;

    let envelope: Envelope = serde_json::from_slice(&body)?;
    state.broker.send(&destination, &envelope).await?;

    tracing::info!(
        destination = %destination,
        message_type = %envelope.message_type,
        "Message accepted"
    );

    Ok((StatusCode::ACCEPTED, Json(PublishResponse { destination })))
}

/// Pop queued messages (GET /destinations/{destination}/messages?limit=N)
pub async fn drain_messages(
    State(state): State<AppState>,
    Path(destination): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<Envelope>>, ApiError> {
    Ok(Json(state.broker.drain(&destination, query.resolve())?))
}

/// Persisted dead letters, oldest first (GET /dead-letters?limit=N)
pub async fn list_dead_letters(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<DeadLetterView>>, ApiError> {
    let store = state
        .dead_letters
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("dead letters are not persisted on this node".into()))?;

    let records = store
        .list(query.resolve())
        .map_err(|e| ApiError::Internal(format!("Failed to list dead letters: {}", e)))?;

    let views = records.into_iter().map(DeadLetterView::from).collect();

    Ok(Json(views))
}
