//! Intervention decision engine
//!
//! Per `(session, rule)` the engine moves `idle -> eligible -> cooling-down -> idle`.
//! Eligibility needs a trigger match, enough confidence, satisfied conditions,
//! no active cooldown and room under the daily cap. All gates are checked and
//! committed inside [`DecisionEngine::decide`], before any action runs.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use sentientiq_behavior::PatternMatch;
use sentientiq_common::{
    ActionResult, EmotionDiagnosis, EmotionalVectors, ExecutionStatus, Identity,
    InterventionExecution, Priority,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::allocation::VariantAllocator;
use crate::conditions::{self, ConditionContext};
use crate::executor::{ActionContext, ActionExecutor};
use crate::gates::{self, FatigueTracker, Timing};
use crate::revenue;
use crate::rules::{InterventionAction, InterventionRule, RuleCatalog};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;
const MINUTE_MS: i64 = 60 * 1000;

/// Decision engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Lowest priority dispatched without review
    pub auto_execute_min: Priority,
    /// Fall back to the pattern's own intervention when no rule matches
    pub pattern_fallback: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            auto_execute_min: Priority::High,
            pattern_fallback: true,
        }
    }
}

/// Inputs for one decision cycle
#[derive(Debug, Clone)]
pub struct DecisionRequest<'a> {
    pub session_id: &'a str,
    pub tenant_id: &'a str,
    pub identity: Option<&'a Identity>,
    /// Latest recorded diagnosis of the cycle
    pub diagnosis: &'a EmotionDiagnosis,
    /// Top pattern of the cycle, if any
    pub pattern: Option<&'a PatternMatch>,
    pub vectors: EmotionalVectors,
    pub session_age_ms: i64,
    pub page_url: Option<&'a str>,
    /// Recent emotion labels, oldest first
    pub recent_emotions: &'a [String],
    pub now: i64,
}

impl DecisionRequest<'_> {
    fn identity_key(&self) -> String {
        match self.identity {
            Some(identity) if !identity.id.is_empty() => identity.id.clone(),
            _ => self.session_id.to_string(),
        }
    }

    fn last_emotion(&self) -> Option<&str> {
        self.recent_emotions.last().map(String::as_str)
    }
}

/// An intervention chosen for a session
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub id: Uuid,
    pub session_id: String,
    pub tenant_id: String,
    pub rule_id: String,
    pub variant_id: Option<String>,
    pub intervention_type: String,
    pub emotion: String,
    pub confidence: u8,
    pub pattern: Option<String>,
    pub priority: Priority,
    pub timing: Timing,
    pub actions: Vec<InterventionAction>,
    /// CRITICAL/HIGH with a non-deferred timing
    pub auto_execute: bool,
    pub created_at: DateTime<Utc>,
}

impl Decision {
    pub fn action_context(&self) -> ActionContext {
        ActionContext {
            decision_id: self.id.to_string(),
            session_id: self.session_id.clone(),
            tenant_id: self.tenant_id.clone(),
            rule_id: self.rule_id.clone(),
            variant_id: self.variant_id.clone(),
            intervention_type: self.intervention_type.clone(),
            emotion: self.emotion.clone(),
            confidence: self.confidence,
            priority: self.priority,
        }
    }
}

/// Why no decision was produced
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Suppressed {
    /// Session-level cooldown after the last intervention
    Cooldown { remaining_ms: i64 },
    /// No rule passed its gates and no pattern fallback applied
    NoCandidate,
}

/// Client feedback about a dispatched intervention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Feedback {
    Shown,
    Clicked,
    Dismissed,
}

/// Per intervention type effectiveness counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Effectiveness {
    pub executed: u64,
    pub succeeded: u64,
    pub shown: u64,
    pub clicked: u64,
    pub dismissed: u64,
    pub revenue_impact: Decimal,
}

impl Effectiveness {
    pub fn click_through_rate(&self) -> f64 {
        if self.shown == 0 {
            0.0
        } else {
            self.clicked as f64 / self.shown as f64
        }
    }
}

#[derive(Debug, Clone)]
struct Dispatched {
    rule_id: String,
    variant_id: Option<String>,
    intervention_type: String,
}

pub struct DecisionEngine {
    config: EngineConfig,
    catalog: Arc<RuleCatalog>,
    allocator: VariantAllocator,
    fatigue: FatigueTracker,
    /// session -> last auto-executed decision time
    last_fired: DashMap<String, i64>,
    /// (session, rule) -> last firing
    rule_fired: DashMap<(String, String), i64>,
    /// (identity, rule, day) -> firings
    daily_counts: DashMap<(String, String, i64), u32>,
    /// session -> latest executed intervention, for feedback attribution
    dispatched: DashMap<String, Dispatched>,
    effectiveness: DashMap<String, Effectiveness>,
}

impl DecisionEngine {
    pub fn new(config: EngineConfig, catalog: Arc<RuleCatalog>) -> Self {
        Self::with_allocator(config, catalog, VariantAllocator::new())
    }

    pub fn with_allocator(config: EngineConfig, catalog: Arc<RuleCatalog>, allocator: VariantAllocator) -> Self {
        Self {
            config,
            catalog,
            allocator,
            fatigue: FatigueTracker::new(),
            last_fired: DashMap::new(),
            rule_fired: DashMap::new(),
            daily_counts: DashMap::new(),
            dispatched: DashMap::new(),
            effectiveness: DashMap::new(),
        }
    }

    pub fn catalog(&self) -> &Arc<RuleCatalog> {
        &self.catalog
    }

    pub fn allocator(&self) -> &VariantAllocator {
        &self.allocator
    }

    pub fn fatigue(&self) -> &FatigueTracker {
        &self.fatigue
    }

    /// Evaluate one cycle; auto-executing decisions commit their cooldowns here
    #[instrument(skip(self, req), fields(session_id = %req.session_id, emotion = %req.diagnosis.emotion))]
    pub fn decide(&self, req: &DecisionRequest<'_>) -> Result<Decision, Suppressed> {
        let diagnosis = req.diagnosis;
        let computed = gates::calculate_priority(
            &diagnosis.emotion,
            diagnosis.confidence,
            &req.vectors,
            req.session_age_ms,
        );
        let priority = req
            .pattern
            .map(|p| p.priority.max(computed))
            .unwrap_or(computed);
        let timing = gates::calculate_timing(
            &diagnosis.emotion,
            &req.vectors,
            req.session_age_ms,
            req.last_emotion(),
        );

        let fatigue = self.fatigue.level(req.session_id);
        if let Some(last) = self.last_fired.get(req.session_id).map(|t| *t) {
            let cooldown = gates::cooldown_ms(priority, fatigue);
            let elapsed = req.now - last;
            if elapsed < cooldown {
                debug!(remaining_ms = cooldown - elapsed, "Session in intervention cooldown");
                return Err(Suppressed::Cooldown {
                    remaining_ms: cooldown - elapsed,
                });
            }
        }

        let identity_key = req.identity_key();
        let day = req.now.div_euclid(DAY_MS);
        let pattern_type = req.pattern.map(|p| p.pattern_type.as_str());

        let selected = self
            .catalog
            .candidates(&diagnosis.emotion, pattern_type)
            .into_iter()
            .find(|rule| self.is_eligible(rule, req, &identity_key, day));

        let (rule_id, variant_id, actions, rule_priority) = match selected {
            Some(rule) => {
                let (variant_id, actions) = match self.allocator.select(&rule, &identity_key) {
                    Some(variant) => (Some(variant.id.clone()), variant.actions.clone()),
                    None => (None, rule.actions.clone()),
                };
                (rule.id.clone(), variant_id, actions, Some(rule.priority))
            }
            None => match req.pattern {
                Some(pattern) if self.config.pattern_fallback => (
                    format!("pattern:{}", pattern.pattern_type),
                    None,
                    vec![InterventionAction::show(&pattern.intervention)],
                    None,
                ),
                _ => return Err(Suppressed::NoCandidate),
            },
        };

        let priority = rule_priority.map(|p| p.max(priority)).unwrap_or(priority);
        let intervention_type = actions
            .iter()
            .find_map(|a| a.intervention_type())
            .map(str::to_string)
            .or_else(|| req.pattern.map(|p| p.intervention.clone()))
            .unwrap_or_else(|| rule_id.clone());
        let auto_execute = priority >= self.config.auto_execute_min && timing != Timing::Deferred;

        let decision = Decision {
            id: Uuid::new_v4(),
            session_id: req.session_id.to_string(),
            tenant_id: req.tenant_id.to_string(),
            rule_id,
            variant_id,
            intervention_type,
            emotion: diagnosis.emotion.clone(),
            confidence: diagnosis.confidence,
            pattern: pattern_type.map(str::to_string),
            priority,
            timing,
            actions,
            auto_execute,
            created_at: Utc::now(),
        };

        if decision.auto_execute {
            self.commit(&decision, &identity_key, req.now, day);
        }

        info!(
            rule_id = %decision.rule_id,
            intervention = %decision.intervention_type,
            priority = %decision.priority,
            auto_execute = decision.auto_execute,
            "Intervention decided"
        );
        Ok(decision)
    }

    fn is_eligible(&self, rule: &InterventionRule, req: &DecisionRequest<'_>, identity_key: &str, day: i64) -> bool {
        if req.diagnosis.confidence < rule.min_confidence {
            return false;
        }

        let ctx = ConditionContext {
            identity: req.identity,
            page_url: req.page_url,
            session_age_ms: req.session_age_ms,
            previous_emotions: req.recent_emotions,
        };
        if !conditions::all_satisfied(&rule.conditions, &ctx) {
            return false;
        }

        if rule.cooldown_minutes > 0 {
            let key = (req.session_id.to_string(), rule.id.clone());
            if let Some(last) = self.rule_fired.get(&key).map(|t| *t) {
                if req.now - last < i64::from(rule.cooldown_minutes) * MINUTE_MS {
                    debug!(rule_id = %rule.id, "Rule cooling down");
                    return false;
                }
            }
        }

        if rule.max_per_day > 0 {
            let key = (identity_key.to_string(), rule.id.clone(), day);
            let fired = self.daily_counts.get(&key).map(|c| *c).unwrap_or(0);
            if fired >= rule.max_per_day {
                debug!(rule_id = %rule.id, fired, "Daily cap reached");
                return false;
            }
        }

        true
    }

    fn commit(&self, decision: &Decision, identity_key: &str, now: i64, day: i64) {
        self.last_fired.insert(decision.session_id.clone(), now);
        self.rule_fired
            .insert((decision.session_id.clone(), decision.rule_id.clone()), now);
        *self
            .daily_counts
            .entry((identity_key.to_string(), decision.rule_id.clone(), day))
            .or_insert(0) += 1;
    }

    /// Run the decision's actions in order; failures are recorded, never raised
    #[instrument(skip_all, fields(session_id = %decision.session_id, rule_id = %decision.rule_id))]
    pub async fn execute(
        &self,
        decision: &Decision,
        identity: Option<&Identity>,
        executor: &dyn ActionExecutor,
    ) -> InterventionExecution {
        let ctx = decision.action_context();
        let mut results = Vec::with_capacity(decision.actions.len());

        for (idx, action) in decision.actions.iter().enumerate() {
            let result = match executor.execute(action, &ctx).await {
                Ok(Some(detail)) => ActionResult::ok(action.kind.as_str()).with_detail(detail),
                Ok(None) => ActionResult::ok(action.kind.as_str()),
                Err(e) => {
                    warn!(action = action.kind.as_str(), error = %e, "Intervention action failed");
                    ActionResult::failed(action.kind.as_str(), e.to_string())
                }
            };
            results.push(result);

            if action.delay_ms > 0 && idx + 1 < decision.actions.len() {
                tokio::time::sleep(Duration::from_millis(action.delay_ms)).await;
            }
        }

        let status = ExecutionStatus::from_results(&results);
        let value = identity.map(|i| i.value).unwrap_or(Decimal::ZERO);
        let revenue_impact = revenue::revenue_impact(value, &decision.emotion);

        self.dispatched.insert(
            decision.session_id.clone(),
            Dispatched {
                rule_id: decision.rule_id.clone(),
                variant_id: decision.variant_id.clone(),
                intervention_type: decision.intervention_type.clone(),
            },
        );
        self.effectiveness
            .entry(decision.intervention_type.clone())
            .and_modify(|e| {
                e.executed += 1;
                e.succeeded += u64::from(status == ExecutionStatus::Success);
                e.revenue_impact += revenue_impact;
            })
            .or_insert_with(|| Effectiveness {
                executed: 1,
                succeeded: u64::from(status == ExecutionStatus::Success),
                revenue_impact,
                ..Default::default()
            });

        InterventionExecution {
            id: decision.id,
            rule_id: decision.rule_id.clone(),
            variant_id: decision.variant_id.clone(),
            session_id: decision.session_id.clone(),
            tenant_id: decision.tenant_id.clone(),
            intervention_type: decision.intervention_type.clone(),
            emotion: decision.emotion.clone(),
            confidence: decision.confidence,
            results,
            status,
            revenue_impact,
            executed_at: Utc::now(),
        }
    }

    /// Apply client feedback to fatigue and variant statistics
    ///
    /// Returns the intervention type the feedback was attributed to.
    pub fn record_feedback(&self, session_id: &str, feedback: Feedback) -> Option<String> {
        match feedback {
            Feedback::Shown => {
                self.fatigue.record_shown(session_id);
            }
            Feedback::Dismissed => {
                self.fatigue.record_dismissed(session_id);
            }
            Feedback::Clicked => {}
        }

        let dispatched = self.dispatched.get(session_id).map(|d| d.clone())?;
        if let Some(variant_id) = &dispatched.variant_id {
            match feedback {
                Feedback::Shown => self.allocator.record_shown(&dispatched.rule_id, variant_id),
                Feedback::Clicked => self.allocator.record_conversion(&dispatched.rule_id, variant_id),
                Feedback::Dismissed => {}
            }
        }

        let mut stats = self
            .effectiveness
            .entry(dispatched.intervention_type.clone())
            .or_default();
        match feedback {
            Feedback::Shown => stats.shown += 1,
            Feedback::Clicked => stats.clicked += 1,
            Feedback::Dismissed => stats.dismissed += 1,
        }
        Some(dispatched.intervention_type)
    }

    pub fn effectiveness(&self) -> Vec<(String, Effectiveness)> {
        let mut all: Vec<_> = self
            .effectiveness
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Drop per-session state for an evicted session
    pub fn forget_session(&self, session_id: &str) {
        self.last_fired.remove(session_id);
        self.dispatched.remove(session_id);
        self.fatigue.forget(session_id);
        self.rule_fired.retain(|(session, _), _| session != session_id);
    }

    /// Drop daily counters older than `now`'s day
    pub fn prune_daily(&self, now: i64) {
        let today = now.div_euclid(DAY_MS);
        self.daily_counts.retain(|(_, _, day), _| *day >= today);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{default_rules, ActionKind};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;
    use sentientiq_common::{DispatchError, SentientError};
    use serde_json::Value;

    const NOW: i64 = 1_700_000_000_000;

    fn engine() -> DecisionEngine {
        DecisionEngine::with_allocator(
            EngineConfig::default(),
            Arc::new(RuleCatalog::new(default_rules()).unwrap()),
            VariantAllocator::with_seed(11),
        )
    }

    fn request<'a>(diagnosis: &'a EmotionDiagnosis, pattern: Option<&'a PatternMatch>, now: i64) -> DecisionRequest<'a> {
        DecisionRequest {
            session_id: "s1",
            tenant_id: "t1",
            identity: None,
            diagnosis,
            pattern,
            vectors: EmotionalVectors::default(),
            session_age_ms: 120_000,
            page_url: None,
            recent_emotions: &[],
            now,
        }
    }

    #[derive(Default)]
    struct RecordingExecutor {
        seen: Mutex<Vec<ActionKind>>,
    }

    #[async_trait]
    impl ActionExecutor for RecordingExecutor {
        async fn execute(&self, action: &InterventionAction, ctx: &ActionContext) -> sentientiq_common::Result<Option<Value>> {
            self.seen.lock().push(action.kind);
            if action.kind == ActionKind::NotifyWebhook {
                return Err(SentientError::Dispatch(DispatchError::NoRoute(ctx.session_id.clone())));
            }
            Ok(None)
        }
    }

    #[test]
    fn test_rule_match_and_cooldown() {
        let engine = engine();
        let rage = EmotionDiagnosis::new("rage", 95, "rage_click", NOW);

        let decision = engine.decide(&request(&rage, None, NOW)).unwrap();
        assert_eq!(decision.rule_id, "rage_support");
        assert_eq!(decision.intervention_type, "help_chat");
        assert_eq!(decision.priority, Priority::Critical);
        assert!(decision.auto_execute);

        // engine-level cooldown for CRITICAL is 30s
        let again = engine.decide(&request(&rage, None, NOW + 10_000));
        assert!(matches!(again, Err(Suppressed::Cooldown { .. })));
    }

    #[test]
    fn test_rule_cooldown_blocks_after_engine_cooldown() {
        let engine = engine();
        let rage = EmotionDiagnosis::new("rage", 95, "rage_click", NOW);
        engine.decide(&request(&rage, None, NOW)).unwrap();

        // past the engine cooldown but inside the rule's 10 minutes
        let later = engine.decide(&request(&rage, None, NOW + 60_000));
        assert_eq!(later.unwrap_err(), Suppressed::NoCandidate);
    }

    #[test]
    fn test_pattern_priority_wins_over_computed() {
        let engine = engine();
        let confusion = EmotionDiagnosis::new("confusion", 55, "circular_motion", NOW);
        let pattern = PatternMatch {
            pattern_type: "checkout_friction".into(),
            intervention: "checkout_assist".into(),
            priority: Priority::Critical,
        };

        let decision = engine.decide(&request(&confusion, Some(&pattern), NOW)).unwrap();
        assert_eq!(decision.rule_id, "pattern:checkout_friction");
        assert_eq!(decision.intervention_type, "checkout_assist");
        assert_eq!(decision.priority, Priority::Critical);
    }

    #[test]
    fn test_low_priority_not_auto_executed() {
        let engine = engine();
        let reading = EmotionDiagnosis::new("reading", 65, "scroll", NOW);
        let pattern = PatternMatch {
            pattern_type: "deep_engagement".into(),
            intervention: "social_toast".into(),
            priority: Priority::Low,
        };

        let decision = engine.decide(&request(&reading, Some(&pattern), NOW)).unwrap();
        assert_eq!(decision.priority, Priority::Medium);
        assert!(!decision.auto_execute);
        // nothing was committed, so the next cycle is not cooling down
        assert!(engine.decide(&request(&reading, Some(&pattern), NOW + 1)).is_ok());
    }

    #[test]
    fn test_no_candidate() {
        let engine = engine();
        let scanning = EmotionDiagnosis::new("scanning", 55, "hover", NOW);
        assert_eq!(
            engine.decide(&request(&scanning, None, NOW)).unwrap_err(),
            Suppressed::NoCandidate
        );
    }

    #[test]
    fn test_daily_cap() {
        let engine = engine();
        let exit = EmotionDiagnosis::new("abandonment_intent", 85, "exit_intent", NOW);

        let first = engine.decide(&request(&exit, None, NOW)).unwrap();
        assert_eq!(first.rule_id, "exit_save");

        // cooldowns long expired, cap of one per day still holds
        let later = engine.decide(&request(&exit, None, NOW + 2 * 60 * 60 * 1000));
        assert!(later.map(|d| d.rule_id != "exit_save").unwrap_or(true));
    }

    #[test]
    fn test_ab_variant_sticky() {
        let engine = engine();
        let shock = EmotionDiagnosis::new("sticker_shock", 85, "sudden_stop", NOW);
        let identity = Identity {
            id: "buyer@example.com".into(),
            tier: None,
            value: dec!(500),
        };

        let mut req = request(&shock, None, NOW);
        req.identity = Some(&identity);
        let first = engine.decide(&req).unwrap();

        req.session_id = "s2";
        req.now = NOW + 5_000;
        let second = engine.decide(&req).unwrap();

        assert!(first.variant_id.is_some());
        assert_eq!(first.variant_id, second.variant_id);
    }

    #[tokio::test]
    async fn test_action_failure_recorded_siblings_run() {
        let engine = engine();
        let executor = RecordingExecutor::default();
        let rage = EmotionDiagnosis::new("rage", 95, "rage_click", NOW);
        let mut decision = engine.decide(&request(&rage, None, NOW)).unwrap();
        decision.actions = vec![
            InterventionAction::with_params(ActionKind::NotifyWebhook, Value::Null),
            InterventionAction::show("help_chat"),
        ];
        let identity = Identity {
            id: "x".into(),
            tier: None,
            value: dec!(1000),
        };

        let execution = engine.execute(&decision, Some(&identity), &executor).await;

        assert_eq!(executor.seen.lock().len(), 2);
        assert_eq!(execution.status, ExecutionStatus::Partial);
        assert!(execution.results[0].error.is_some());
        assert_eq!(execution.revenue_impact, dec!(800));
    }

    #[tokio::test(start_paused = true)]
    async fn test_action_delay_honored() {
        let engine = engine();
        let rage = EmotionDiagnosis::new("rage", 95, "rage_click", NOW);
        let mut decision = engine.decide(&request(&rage, None, NOW)).unwrap();
        decision.actions = vec![
            InterventionAction::show("help_chat").after(2_000),
            InterventionAction::with_params(ActionKind::LogEvent, Value::Null),
        ];

        let start = tokio::time::Instant::now();
        let execution = engine.execute(&decision, None, &RecordingExecutor::default()).await;
        assert!(start.elapsed() >= Duration::from_millis(2_000));
        assert_eq!(execution.status, ExecutionStatus::Success);
    }

    #[tokio::test]
    async fn test_feedback_updates_fatigue_and_stats() {
        let engine = engine();
        let rage = EmotionDiagnosis::new("rage", 95, "rage_click", NOW);
        let decision = engine.decide(&request(&rage, None, NOW)).unwrap();
        engine.execute(&decision, None, &RecordingExecutor::default()).await;

        assert_eq!(engine.record_feedback("s1", Feedback::Shown).as_deref(), Some("help_chat"));
        engine.record_feedback("s1", Feedback::Clicked);

        assert!((engine.fatigue().level("s1") - 0.2).abs() < 1e-9);
        let (_, stats) = engine
            .effectiveness()
            .into_iter()
            .find(|(kind, _)| kind == "help_chat")
            .unwrap();
        assert_eq!(stats.shown, 1);
        assert_eq!(stats.clicked, 1);
        assert_eq!(stats.click_through_rate(), 1.0);
    }
}
