//! Telemetry and legacy emotion ingestion

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use tracing::warn;

use crate::error::{ApiError, ApiResult};
use crate::pipeline::{BatchSummary, EmotionEvent, TelemetryBatch};
use crate::state::AppState;

fn summary_body(summary: BatchSummary) -> Value {
    json!({
        "success": true,
        "processed": summary.processed,
        "diagnosed": summary.diagnosed,
        "patterns": summary.patterns,
        "skipped": summary.skipped,
        "top_pattern": summary.top_pattern,
        "intervention": summary.intervention,
    })
}

/// A body that cannot be parsed is the one unexpected failure of this endpoint.
/// The parser detail stays in the log.
fn unreadable(rejection: JsonRejection) -> ApiError {
    warn!(error = %rejection.body_text(), "Unreadable ingestion payload");
    ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

pub async fn ingest_telemetry(
    State(state): State<AppState>,
    payload: Result<Json<TelemetryBatch>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(batch) = payload.map_err(unreadable)?;
    let summary = state.pipeline.process_batch(batch).await?;
    Ok(Json(summary_body(summary)))
}

pub async fn ingest_emotion(
    State(state): State<AppState>,
    payload: Result<Json<EmotionEvent>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(event) = payload.map_err(unreadable)?;
    let summary = state.pipeline.process_emotion(event).await?;
    Ok(Json(summary_body(summary)))
}
