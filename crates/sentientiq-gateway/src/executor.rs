//! Action executor wired to the dispatcher, webhooks and the log

use async_trait::async_trait;
use sentientiq_common::{Result, SentientError};
use sentientiq_intervention::{ActionContext, ActionExecutor, ActionKind, InterventionAction};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::dispatcher::Dispatcher;

/// Default upper bound on one webhook request
pub const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);

/// Delivers intervention actions for decisions made on the request path
#[derive(Clone)]
pub struct GatewayExecutor {
    dispatcher: Arc<Dispatcher>,
    http: reqwest::Client,
    webhook_timeout: Duration,
}

impl GatewayExecutor {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            http: reqwest::Client::new(),
            webhook_timeout: DEFAULT_WEBHOOK_TIMEOUT,
        }
    }

    pub fn with_webhook_timeout(mut self, timeout: Duration) -> Self {
        self.webhook_timeout = timeout;
        self
    }

    fn show(&self, action: &InterventionAction, ctx: &ActionContext) -> Result<Option<Value>> {
        let intervention_type = action.intervention_type().unwrap_or(&ctx.intervention_type);
        let context = json!({
            "decision_id": ctx.decision_id,
            "tenant_id": ctx.tenant_id,
            "rule_id": ctx.rule_id,
            "variant_id": ctx.variant_id,
            "emotion": ctx.emotion,
            "confidence": ctx.confidence,
            "priority": ctx.priority,
            "params": action.params,
        });

        self.dispatcher
            .deliver_intervention(&ctx.session_id, intervention_type, context)?;
        Ok(Some(json!({ "delivered": intervention_type })))
    }

    async fn notify(&self, action: &InterventionAction, ctx: &ActionContext) -> Result<Option<Value>> {
        let url = action
            .params
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| SentientError::Config(format!("webhook action of rule {} has no url", ctx.rule_id)))?;

        let response = self
            .http
            .post(url)
            .timeout(self.webhook_timeout)
            .json(&json!({ "context": ctx, "params": action.params }))
            .send()
            .await
            .map_err(|e| SentientError::Internal(format!("webhook request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SentientError::Internal(format!("webhook returned {status}")));
        }
        Ok(Some(json!({ "status": status.as_u16() })))
    }
}

#[async_trait]
impl ActionExecutor for GatewayExecutor {
    async fn execute(&self, action: &InterventionAction, ctx: &ActionContext) -> Result<Option<Value>> {
        match action.kind {
            ActionKind::ShowIntervention => self.show(action, ctx),
            ActionKind::NotifyWebhook => self.notify(action, ctx).await,
            ActionKind::TagSession => {
                let tag = action.params.get("tag").and_then(Value::as_str).unwrap_or(&ctx.rule_id);
                info!(session_id = %ctx.session_id, tag, "Session tagged");
                Ok(Some(json!({ "tag": tag })))
            }
            ActionKind::LogEvent => {
                info!(
                    session_id = %ctx.session_id,
                    rule_id = %ctx.rule_id,
                    emotion = %ctx.emotion,
                    params = %action.params,
                    "Intervention event"
                );
                Ok(Some(action.params.clone()))
            }
        }
    }
}
