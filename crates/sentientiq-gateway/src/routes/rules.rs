//! Rule catalog management

use axum::{
    extract::{Path, State},
    Json,
};
use sentientiq_common::{RuleError, SentientError};
use sentientiq_intervention::InterventionRule;
use serde::Deserialize;
use tracing::info;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EnabledBody {
    pub enabled: bool,
}

fn not_found(rule_id: &str) -> SentientError {
    RuleError::NotFound(rule_id.to_string()).into()
}

pub async fn list_rules(State(state): State<AppState>) -> Json<Vec<InterventionRule>> {
    Json(state.catalog().all())
}

pub async fn get_rule(
    State(state): State<AppState>,
    Path(rule_id): Path<String>,
) -> ApiResult<Json<InterventionRule>> {
    let rule = state.catalog().get(&rule_id).ok_or_else(|| not_found(&rule_id))?;
    Ok(Json(rule))
}

/// Insert a rule or replace the one with the same id
pub async fn upsert_rule(
    State(state): State<AppState>,
    Json(rule): Json<InterventionRule>,
) -> ApiResult<Json<InterventionRule>> {
    state.catalog().upsert(rule.clone())?;
    info!(rule_id = %rule.id, "Rule upserted");
    Ok(Json(rule))
}

pub async fn delete_rule(
    State(state): State<AppState>,
    Path(rule_id): Path<String>,
) -> ApiResult<Json<InterventionRule>> {
    let removed = state.catalog().remove(&rule_id)?;
    info!(rule_id = %rule_id, "Rule removed");
    Ok(Json(removed))
}

pub async fn set_enabled(
    State(state): State<AppState>,
    Path(rule_id): Path<String>,
    Json(body): Json<EnabledBody>,
) -> ApiResult<Json<InterventionRule>> {
    let catalog = state.catalog();
    catalog.set_enabled(&rule_id, body.enabled)?;
    info!(rule_id = %rule_id, enabled = body.enabled, "Rule toggled");
    let rule = catalog.get(&rule_id).ok_or_else(|| not_found(&rule_id))?;
    Ok(Json(rule))
}
