use axum::{extract::State, Json};
use chrono::Utc;
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let pipeline = &state.pipeline;
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": (Utc::now() - state.started_at).num_seconds(),
        "sessions": pipeline.sessions.len(),
        "connections": pipeline.dispatcher.connection_count(),
        "routes": pipeline.dispatcher.route_count(),
        "rules": state.catalog().len(),
        "evi": pipeline.volatility.latest(),
    }))
}
