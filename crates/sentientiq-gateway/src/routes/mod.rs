//! HTTP surface

pub mod health;
pub mod ingest;
pub mod insights;
pub mod rules;
pub mod sessions;

use axum::{
    http::Method,
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::state::AppState;
use crate::ws::websocket_handler;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        // Health
        .route("/health", get(health::health_check))
        // Ingestion
        .route("/telemetry/stream", post(ingest::ingest_telemetry))
        .route("/emotional/event", post(ingest::ingest_emotion))
        // Real-time channel
        .route("/ws", get(websocket_handler))
        // Query surface
        .route("/insights/market", get(insights::market_insights))
        .route("/insights/tenants/:tenant_id/patterns", get(insights::tenant_patterns))
        .route("/insights/interventions", get(insights::intervention_effectiveness))
        // Sessions
        .route("/sessions/:session_id", get(sessions::get_session))
        .route("/sessions/:session_id/outcome", post(sessions::report_outcome))
        .route("/sessions/:session_id/prediction", get(sessions::predict_outcome))
        // Rule catalog
        .route("/rules", get(rules::list_rules).post(rules::upsert_rule))
        .route("/rules/:rule_id", get(rules::get_rule).delete(rules::delete_rule))
        .route("/rules/:rule_id/enabled", post(rules::set_enabled))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}

