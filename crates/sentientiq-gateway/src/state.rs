//! Shared application state

use chrono::{DateTime, Utc};
use sentientiq_behavior::SessionStore;
use sentientiq_intervention::{DecisionEngine, RuleCatalog};
use sentientiq_memory::{PatternMemory, VolatilityTracker};
use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::dispatcher::Dispatcher;
use crate::persistence::PersistenceWriter;
use crate::pipeline::Pipeline;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub pipeline: Pipeline,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Wire every component from the configuration
    pub fn new(config: GatewayConfig, catalog: RuleCatalog, writer: PersistenceWriter) -> Self {
        let sessions = Arc::new(SessionStore::new(config.session_config()));
        let engine = Arc::new(DecisionEngine::new(config.engine_config(), Arc::new(catalog)));
        let memory = Arc::new(PatternMemory::new());
        let volatility = Arc::new(VolatilityTracker::new(config.volatility_config()));
        let dispatcher = Arc::new(Dispatcher::new(config.dispatcher_config()));

        Self {
            pipeline: Pipeline::new(sessions, engine, memory, volatility, dispatcher, writer)
                .with_webhook_timeout(config.actions.webhook_timeout()),
            config: Arc::new(config),
            started_at: Utc::now(),
        }
    }

    pub fn catalog(&self) -> &Arc<RuleCatalog> {
        self.pipeline.engine.catalog()
    }
}
