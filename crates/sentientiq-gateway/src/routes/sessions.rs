use axum::{
    extract::{Path, State},
    Json,
};
use sentientiq_common::SessionOutcome;
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::pipeline::{OutcomeReport, SessionPrediction, SessionSnapshot};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct OutcomeBody {
    pub outcome: SessionOutcome,
}

fn unknown_session(session_id: &str) -> ApiError {
    ApiError::not_found(format!("Session not found: {session_id}"))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SessionSnapshot>> {
    state
        .pipeline
        .snapshot(&session_id)
        .await
        .map(Json)
        .ok_or_else(|| unknown_session(&session_id))
}

pub async fn report_outcome(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<OutcomeBody>,
) -> ApiResult<Json<OutcomeReport>> {
    state
        .pipeline
        .report_outcome(&session_id, body.outcome)
        .await
        .map(Json)
        .ok_or_else(|| unknown_session(&session_id))
}

pub async fn predict_outcome(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SessionPrediction>> {
    state
        .pipeline
        .predict(&session_id)
        .await
        .map(Json)
        .ok_or_else(|| unknown_session(&session_id))
}
