//! Action execution seam

use async_trait::async_trait;
use sentientiq_common::{Priority, Result};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::rules::{ActionKind, InterventionAction};

/// Everything an action may need about the decision it belongs to
#[derive(Debug, Clone, Serialize)]
pub struct ActionContext {
    pub decision_id: String,
    pub session_id: String,
    pub tenant_id: String,
    pub rule_id: String,
    pub variant_id: Option<String>,
    pub intervention_type: String,
    pub emotion: String,
    pub confidence: u8,
    pub priority: Priority,
}

/// Performs side effects for intervention actions
///
/// An `Err` marks the single action failed; sibling actions still run.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, action: &InterventionAction, ctx: &ActionContext) -> Result<Option<Value>>;
}

/// Executor that only logs; used when no delivery channel is wired
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingExecutor;

#[async_trait]
impl ActionExecutor for LoggingExecutor {
    async fn execute(&self, action: &InterventionAction, ctx: &ActionContext) -> Result<Option<Value>> {
        info!(
            session_id = %ctx.session_id,
            rule_id = %ctx.rule_id,
            action = action.kind.as_str(),
            intervention = %ctx.intervention_type,
            "Intervention action"
        );
        Ok(match action.kind {
            ActionKind::LogEvent => Some(action.params.clone()),
            _ => None,
        })
    }
}
