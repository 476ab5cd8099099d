//! Request-path pipeline
//!
//! interpret -> classify -> record -> detect -> decide -> dispatch. Everything up
//! to the decision is serialized per session by the session lock; the chosen
//! actions run after the lock is released, so a slow action never stalls the
//! next batch. Persistence is queued after each in-memory step and never delays
//! or rolls back a decision.

use dashmap::DashMap;
use sentientiq_behavior::{BatchAnalysis, BehaviorAnalyzer, PatternMatch, SessionContext, SessionStore};
use sentientiq_common::{
    now_millis, EmotionDiagnosis, EmotionalVectors, EventContext, ExecutionStatus, Identity, Priority,
    Result, SessionOutcome, TelemetryError, TelemetryEvent,
};
use sentientiq_intervention::{Decision, DecisionEngine, DecisionRequest, Feedback, Timing};
use sentientiq_memory::{OutcomePrediction, PathCount, PatternMemory, VolatilityTracker};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::dispatcher::Dispatcher;
use crate::executor::GatewayExecutor;
use crate::persistence::{tables, PersistenceGateway, PersistenceWriter};

/// Labels considered by decisions, outcome learning and prediction
const RECENT_EMOTIONS: usize = 10;

fn default_tenant() -> String {
    "default".to_string()
}

/// `POST /telemetry/stream` body
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryBatch {
    #[serde(default)]
    pub session_id: String,
    #[serde(default = "default_tenant")]
    pub tenant_id: String,
    #[serde(default)]
    pub events: Vec<TelemetryEvent>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub identity: Option<Identity>,
}

/// `POST /emotional/event` body: a pre-diagnosed emotion
#[derive(Debug, Clone, Deserialize)]
pub struct EmotionEvent {
    #[serde(default)]
    pub session_id: String,
    #[serde(default = "default_tenant")]
    pub tenant_id: String,
    pub emotion: String,
    pub confidence: i64,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub identity: Option<Identity>,
}

/// Result of one ingestion cycle
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub processed: usize,
    pub diagnosed: usize,
    pub patterns: usize,
    pub skipped: usize,
    pub top_pattern: Option<PatternMatch>,
    pub intervention: Option<DecisionSummary>,
}

impl BatchSummary {
    fn new(processed: usize, analysis: &BatchAnalysis) -> Self {
        Self {
            processed,
            diagnosed: analysis.diagnoses.len(),
            patterns: analysis.patterns.len(),
            skipped: analysis.skipped,
            top_pattern: analysis.top_pattern().cloned(),
            intervention: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DecisionSummary {
    pub id: Uuid,
    pub rule_id: String,
    pub intervention_type: String,
    pub priority: Priority,
    pub timing: Timing,
    pub auto_execute: bool,
    /// `None` when not executed yet (review or delayed dispatch)
    pub delivered: Option<bool>,
}

impl From<&Decision> for DecisionSummary {
    fn from(decision: &Decision) -> Self {
        Self {
            id: decision.id,
            rule_id: decision.rule_id.clone(),
            intervention_type: decision.intervention_type.clone(),
            priority: decision.priority,
            timing: decision.timing,
            auto_execute: decision.auto_execute,
            delivered: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OutcomeReport {
    pub session_id: String,
    pub tenant_id: String,
    pub outcome: SessionOutcome,
    /// Learned path and its new count; `None` for sessions without diagnoses
    pub learned: Option<PathCount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionPrediction {
    pub session_id: String,
    pub tenant_id: String,
    pub recent_emotions: Vec<String>,
    pub prediction: OutcomePrediction,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub tenant_id: String,
    pub age_ms: i64,
    pub page_url: Option<String>,
    pub history: Vec<EmotionDiagnosis>,
    pub vectors: EmotionalVectors,
}

#[derive(Serialize)]
struct EmotionalEventRecord<'a> {
    session_id: &'a str,
    tenant_id: &'a str,
    emotion: &'a str,
    confidence: u8,
    behavior: &'a str,
    context: EventContext,
    timestamp: i64,
}

#[derive(Serialize)]
struct FeedbackRecord<'a> {
    event: &'static str,
    session_id: &'a str,
    tenant_id: Option<&'a str>,
    intervention_type: Option<String>,
    timestamp: i64,
}

#[derive(Serialize)]
struct OutcomeRecord<'a> {
    session_id: &'a str,
    tenant_id: &'a str,
    outcome: SessionOutcome,
    path: Option<&'a str>,
    timestamp: i64,
}

#[derive(Serialize)]
struct PatternRecord<'a> {
    tenant_id: &'a str,
    path: &'a str,
    outcome: SessionOutcome,
    count: u64,
    timestamp: i64,
}

/// A committed decision awaiting its actions
struct Reaction {
    summary: DecisionSummary,
    decision: Decision,
    identity: Option<Identity>,
}

/// Shared request-path components
#[derive(Clone)]
pub struct Pipeline {
    pub sessions: Arc<SessionStore>,
    pub engine: Arc<DecisionEngine>,
    pub memory: Arc<PatternMemory>,
    pub volatility: Arc<VolatilityTracker>,
    pub dispatcher: Arc<Dispatcher>,
    pub writer: PersistenceWriter,
    analyzer: BehaviorAnalyzer,
    executor: GatewayExecutor,
    /// session -> identity supplied by the client
    identities: Arc<DashMap<String, Identity>>,
}

impl Pipeline {
    pub fn new(
        sessions: Arc<SessionStore>,
        engine: Arc<DecisionEngine>,
        memory: Arc<PatternMemory>,
        volatility: Arc<VolatilityTracker>,
        dispatcher: Arc<Dispatcher>,
        writer: PersistenceWriter,
    ) -> Self {
        Self {
            executor: GatewayExecutor::new(dispatcher.clone()),
            sessions,
            engine,
            memory,
            volatility,
            dispatcher,
            writer,
            analyzer: BehaviorAnalyzer::new(),
            identities: Arc::new(DashMap::new()),
        }
    }

    /// Bound every webhook action by `timeout`
    pub fn with_webhook_timeout(mut self, timeout: Duration) -> Self {
        self.executor = self.executor.with_webhook_timeout(timeout);
        self
    }

    fn remember_identity(&self, session_id: &str, identity: Option<Identity>) {
        if let Some(identity) = identity {
            self.identities.insert(session_id.to_string(), identity);
        }
    }

    /// Process one telemetry batch to completion, including dispatch
    #[instrument(skip(self, batch), fields(session_id = %batch.session_id, events = batch.events.len()))]
    pub async fn process_batch(&self, batch: TelemetryBatch) -> Result<BatchSummary> {
        if batch.session_id.trim().is_empty() {
            return Err(TelemetryError::MissingSession.into());
        }
        let now = now_millis();
        self.remember_identity(&batch.session_id, batch.identity);

        let handle = self.sessions.get_or_create(&batch.session_id, &batch.tenant_id, now);
        let mut session = handle.lock().await;
        if let Some(url) = batch.url {
            session.set_page_url(url);
        }

        let analysis = self.analyzer.analyze_batch(&mut session, &batch.events, now);
        let mut summary = BatchSummary::new(batch.events.len(), &analysis);
        let reaction = self.react(&session, &analysis, now);
        drop(session);
        summary.intervention = self.follow_through(reaction).await;

        debug!(
            diagnosed = summary.diagnosed,
            patterns = summary.patterns,
            skipped = summary.skipped,
            "Batch processed"
        );
        Ok(summary)
    }

    /// Record a pre-diagnosed emotion; classification is bypassed, cooldowns and
    /// pattern detection still apply
    #[instrument(skip(self, event), fields(session_id = %event.session_id, emotion = %event.emotion))]
    pub async fn process_emotion(&self, event: EmotionEvent) -> Result<BatchSummary> {
        if event.session_id.trim().is_empty() {
            return Err(TelemetryError::MissingSession.into());
        }
        if event.emotion.trim().is_empty() {
            return Err(TelemetryError::MissingType.into());
        }
        let confidence = u8::try_from(event.confidence)
            .ok()
            .filter(|c| *c <= sentientiq_common::MAX_CONFIDENCE)
            .ok_or(TelemetryError::ConfidenceOutOfRange(event.confidence))?;

        let now = now_millis();
        self.remember_identity(&event.session_id, event.identity);
        let behavior = event
            .metadata
            .get("behavior")
            .and_then(Value::as_str)
            .unwrap_or("direct");
        let diagnosis = EmotionDiagnosis::new(
            event.emotion.trim(),
            confidence,
            behavior,
            event.timestamp.unwrap_or(now),
        );

        let handle = self.sessions.get_or_create(&event.session_id, &event.tenant_id, now);
        let mut session = handle.lock().await;
        let analysis = self.analyzer.record_direct(&mut session, diagnosis);
        let mut summary = BatchSummary::new(1, &analysis);
        let reaction = self.react(&session, &analysis, now);
        drop(session);
        summary.intervention = self.follow_through(reaction).await;
        Ok(summary)
    }

    /// Fan out, persist and decide on what a cycle recorded
    fn react(&self, session: &SessionContext, analysis: &BatchAnalysis, now: i64) -> Option<Reaction> {
        let session_id = session.session_id.as_str();
        let tenant_id = session.tenant_id.as_str();

        for diagnosis in &analysis.diagnoses {
            self.volatility.observe(session_id, diagnosis, now);
            self.dispatcher.broadcast_emotion(session_id, tenant_id, diagnosis);
            self.writer.enqueue(
                tables::EMOTIONAL_EVENTS,
                &EmotionalEventRecord {
                    session_id,
                    tenant_id,
                    emotion: &diagnosis.emotion,
                    confidence: diagnosis.confidence,
                    behavior: &diagnosis.behavior,
                    context: diagnosis.context,
                    timestamp: diagnosis.timestamp,
                },
            );
        }

        let diagnosis = analysis.last_diagnosis()?;
        let identity = self.identities.get(session_id).map(|i| i.clone());
        let recent = session.recent_labels(RECENT_EMOTIONS);
        let request = DecisionRequest {
            session_id,
            tenant_id,
            identity: identity.as_ref(),
            diagnosis,
            pattern: analysis.top_pattern(),
            vectors: analysis.vectors,
            session_age_ms: session.session_age(diagnosis.timestamp),
            page_url: session.page_url(),
            recent_emotions: &recent,
            now,
        };

        let decision = match self.engine.decide(&request) {
            Ok(decision) => decision,
            Err(reason) => {
                debug!(?reason, "No intervention this cycle");
                return None;
            }
        };
        self.writer.enqueue(tables::INTERVENTION_DECISIONS, &decision);

        Some(Reaction {
            summary: DecisionSummary::from(&decision),
            decision,
            identity,
        })
    }

    /// Run an auto-executing decision; called without the session lock
    async fn follow_through(&self, reaction: Option<Reaction>) -> Option<DecisionSummary> {
        let Reaction {
            mut summary,
            decision,
            identity,
        } = reaction?;
        if decision.auto_execute {
            summary.delivered = self.dispatch(decision, identity).await;
        }
        Some(summary)
    }

    /// Execute now, or from a spawned task once a delayed timing elapses
    async fn dispatch(&self, decision: Decision, identity: Option<Identity>) -> Option<bool> {
        match decision.timing {
            Timing::Delayed { delay_ms } => {
                debug!(delay_ms, rule_id = %decision.rule_id, "Intervention scheduled");
                let pipeline = self.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    pipeline.execute(decision, identity).await;
                });
                None
            }
            _ => Some(self.execute(decision, identity).await),
        }
    }

    async fn execute(&self, decision: Decision, identity: Option<Identity>) -> bool {
        let execution = self
            .engine
            .execute(&decision, identity.as_ref(), &self.executor)
            .await;
        self.writer.enqueue(tables::INTERVENTION_LOGS, &execution);
        execution.status == ExecutionStatus::Success
    }

    /// Apply client feedback received over the real-time channel
    pub fn record_feedback(
        &self,
        session_id: &str,
        tenant_id: Option<&str>,
        feedback: Feedback,
        reported_type: Option<String>,
    ) {
        let intervention_type = self.engine.record_feedback(session_id, feedback).or(reported_type);
        let event = match feedback {
            Feedback::Shown => "intervention_shown",
            Feedback::Clicked => "intervention_clicked",
            Feedback::Dismissed => "intervention_dismissed",
        };
        info!(session_id, event, intervention = ?intervention_type, "Intervention feedback");
        self.writer.enqueue(
            tables::INTERVENTION_LOGS,
            &FeedbackRecord {
                event,
                session_id,
                tenant_id,
                intervention_type,
                timestamp: now_millis(),
            },
        );
    }

    /// Learn the session's emotion path toward `outcome`; `None` for unknown sessions
    pub async fn report_outcome(&self, session_id: &str, outcome: SessionOutcome) -> Option<OutcomeReport> {
        let handle = self.sessions.get(session_id)?;
        let session = handle.lock().await;
        let labels = session.recent_labels(RECENT_EMOTIONS);
        let learned = self
            .memory
            .learn_from_session(&session.tenant_id, &labels, outcome);
        let timestamp = now_millis();

        self.writer.enqueue(
            tables::SESSION_OUTCOMES,
            &OutcomeRecord {
                session_id,
                tenant_id: &session.tenant_id,
                outcome,
                path: learned.as_ref().map(|p| p.path.as_str()),
                timestamp,
            },
        );
        if let Some(learned) = &learned {
            self.writer.enqueue(
                tables::EMOTIONAL_PATTERNS,
                &PatternRecord {
                    tenant_id: &session.tenant_id,
                    path: &learned.path,
                    outcome,
                    count: learned.count,
                    timestamp,
                },
            );
        }
        info!(session_id, outcome = outcome.as_str(), "Session outcome learned");

        Some(OutcomeReport {
            session_id: session_id.to_string(),
            tenant_id: session.tenant_id.clone(),
            outcome,
            learned,
        })
    }

    pub async fn predict(&self, session_id: &str) -> Option<SessionPrediction> {
        let handle = self.sessions.get(session_id)?;
        let session = handle.lock().await;
        let recent_emotions = session.recent_labels(RECENT_EMOTIONS);
        let prediction = self.memory.predict_outcome(&session.tenant_id, &recent_emotions);
        Some(SessionPrediction {
            session_id: session_id.to_string(),
            tenant_id: session.tenant_id.clone(),
            recent_emotions,
            prediction,
        })
    }

    pub async fn snapshot(&self, session_id: &str) -> Option<SessionSnapshot> {
        let handle = self.sessions.get(session_id)?;
        let session = handle.lock().await;
        Some(SessionSnapshot {
            session_id: session_id.to_string(),
            tenant_id: session.tenant_id.clone(),
            age_ms: session.session_age(now_millis()),
            page_url: session.page_url().map(str::to_string),
            history: session.history().iter().cloned().collect(),
            vectors: session.derive_vectors(),
        })
    }

    /// Drop per-session state after eviction
    pub fn forget(&self, session_id: &str) {
        self.identities.remove(session_id);
        self.engine.forget_session(session_id);
        self.volatility.forget(session_id);
    }

    /// Replay persisted session outcomes into pattern memory
    pub async fn hydrate_memory(&self, gateway: &dyn PersistenceGateway) -> usize {
        let rows = match gateway.query(tables::SESSION_OUTCOMES, &[]).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(error = %e, "Could not load persisted session outcomes");
                return 0;
            }
        };

        let mut restored = 0;
        for row in rows {
            let tenant = row.get("tenant_id").and_then(Value::as_str);
            let path = row.get("path").and_then(Value::as_str);
            let outcome = row
                .get("outcome")
                .cloned()
                .and_then(|v| serde_json::from_value::<SessionOutcome>(v).ok());
            if let (Some(tenant), Some(path), Some(outcome)) = (tenant, path, outcome) {
                self.memory.add(tenant, path, outcome, 1);
                restored += 1;
            }
        }
        if restored > 0 {
            info!(restored, "Pattern memory hydrated");
        }
        restored
    }
}
