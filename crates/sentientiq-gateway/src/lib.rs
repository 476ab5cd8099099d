//! # SentientIQ Gateway
//!
//! HTTP ingestion, the real-time dispatch channel, the query surface and the
//! persistence adapters around the behavior, intervention and memory crates.
//!
//! ## Endpoints
//!
//! - `POST /telemetry/stream`, `POST /emotional/event`: ingestion
//! - `GET /ws?channel=emotions|interventions&session=..&tenant=..`: real-time channel
//! - `GET /insights/...`, `GET /sessions/:id/...`: queries and outcome reporting
//! - `/rules`: rule catalog management

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod persistence;
pub mod pipeline;
pub mod routes;
pub mod state;
pub mod tasks;
pub mod ws;

pub use config::GatewayConfig;
pub use dispatcher::{Channel, ChannelMessage, Dispatcher, DispatcherConfig, InboundMessage};
pub use error::{ApiError, ApiResult};
pub use executor::GatewayExecutor;
pub use persistence::{
    tables, InMemoryGateway, PersistenceGateway, PersistenceWriter, RestGateway, StoreError,
};
pub use pipeline::{BatchSummary, EmotionEvent, Pipeline, TelemetryBatch};
pub use routes::router;
pub use state::AppState;
