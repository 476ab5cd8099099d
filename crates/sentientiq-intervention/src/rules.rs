//! Intervention rule catalog
//!
//! Rules are static configuration loaded at startup (built-in defaults or a
//! JSON file) and changed only through explicit catalog calls.

use parking_lot::RwLock;
use sentientiq_common::{Priority, Result, RuleError, SentientError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

/// Trigger matching any emotion
pub const WILDCARD_TRIGGER: &str = "*";

/// One intervention rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionRule {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Emotion label or pattern type that triggers the rule (`*` for any)
    #[serde(alias = "emotion")]
    pub trigger: String,
    #[serde(default)]
    pub min_confidence: u8,
    #[serde(default)]
    pub conditions: Vec<RuleCondition>,
    /// Direct action set, used when `variants` is empty
    #[serde(default)]
    pub actions: Vec<InterventionAction>,
    #[serde(default)]
    pub variants: Vec<AbVariant>,
    #[serde(default)]
    pub allocation: AllocationStrategy,
    #[serde(default)]
    pub priority: Priority,
    /// Minimum gap between firings for one session (minutes, 0 disables)
    #[serde(default)]
    pub cooldown_minutes: u32,
    /// Cap per identity and day (0 disables)
    #[serde(default)]
    pub max_per_day: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl InterventionRule {
    /// Whether the rule reacts to `emotion` or the detected `pattern`
    pub fn matches_trigger(&self, emotion: &str, pattern: Option<&str>) -> bool {
        self.trigger == WILDCARD_TRIGGER || self.trigger == emotion || pattern == Some(self.trigger.as_str())
    }

    pub fn is_ab_test(&self) -> bool {
        !self.variants.is_empty()
    }

    pub fn validate(&self) -> std::result::Result<(), RuleError> {
        if self.variants.is_empty() {
            if self.actions.is_empty() {
                return Err(RuleError::NoActions {
                    rule_id: self.id.clone(),
                });
            }
            return Ok(());
        }

        let mut seen = HashSet::new();
        for variant in &self.variants {
            if !seen.insert(variant.id.as_str()) {
                return Err(RuleError::InvalidVariants {
                    rule_id: self.id.clone(),
                    reason: format!("duplicate variant id {}", variant.id),
                });
            }
            if variant.actions.is_empty() {
                return Err(RuleError::InvalidVariants {
                    rule_id: self.id.clone(),
                    reason: format!("variant {} has no actions", variant.id),
                });
            }
            if !(variant.weight.is_finite() && variant.weight >= 0.0) {
                return Err(RuleError::InvalidVariants {
                    rule_id: self.id.clone(),
                    reason: format!("variant {} has invalid weight", variant.id),
                });
            }
        }

        if self.allocation == AllocationStrategy::Weighted
            && self.variants.iter().all(|v| v.weight == 0.0)
        {
            return Err(RuleError::InvalidVariants {
                rule_id: self.id.clone(),
                reason: "all variant weights are zero".to_string(),
            });
        }

        Ok(())
    }
}

/// Predicate over the session and visitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleCondition {
    #[serde(rename = "type")]
    pub kind: ConditionKind,
    pub operator: ConditionOperator,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    IdentityTier,
    IdentityValue,
    PageUrl,
    /// Session age in seconds
    TimeOnSite,
    /// Any of the recent emotions
    PreviousEmotion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    Contains,
    GreaterThan,
    LessThan,
    In,
}

/// One side effect of an intervention
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionAction {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(default)]
    pub params: Value,
    /// Pause after this action before the next one runs (ms)
    #[serde(default)]
    pub delay_ms: u64,
}

impl InterventionAction {
    pub fn show(intervention_type: &str) -> Self {
        Self {
            kind: ActionKind::ShowIntervention,
            params: json!({ "intervention_type": intervention_type }),
            delay_ms: 0,
        }
    }

    pub fn with_params(kind: ActionKind, params: Value) -> Self {
        Self {
            kind,
            params,
            delay_ms: 0,
        }
    }

    pub fn after(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    /// Intervention type carried by a `show_intervention` action
    pub fn intervention_type(&self) -> Option<&str> {
        match self.kind {
            ActionKind::ShowIntervention => self.params.get("intervention_type")?.as_str(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Push an intervention to the session's live connection
    ShowIntervention,
    /// POST the execution context to an external URL
    NotifyWebhook,
    /// Attach a tag to the session record
    TagSession,
    /// Structured log line only
    LogEvent,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::ShowIntervention => "show_intervention",
            ActionKind::NotifyWebhook => "notify_webhook",
            ActionKind::TagSession => "tag_session",
            ActionKind::LogEvent => "log_event",
        }
    }
}

/// Named action set competing in an A/B test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbVariant {
    pub id: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    pub actions: Vec<InterventionAction>,
}

fn default_weight() -> f64 {
    1.0
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStrategy {
    #[default]
    Weighted,
    Uniform,
    ThompsonSampling,
}

/// Shared, mutable rule catalog
#[derive(Debug, Default)]
pub struct RuleCatalog {
    rules: RwLock<Vec<InterventionRule>>,
}

impl RuleCatalog {
    pub fn new(rules: Vec<InterventionRule>) -> Result<Self> {
        for rule in &rules {
            rule.validate()?;
        }
        Ok(Self {
            rules: RwLock::new(rules),
        })
    }

    /// Catalog with the built-in rules
    pub fn with_defaults() -> Self {
        Self {
            rules: RwLock::new(default_rules()),
        }
    }

    /// Parse a JSON array of rules
    pub fn from_json(content: &str) -> Result<Self> {
        let rules: Vec<InterventionRule> = serde_json::from_str(content)
            .map_err(|e| RuleError::Catalog(format!("Failed to parse rules JSON: {}", e)))?;
        Self::new(rules)
    }

    /// Load a JSON rule file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SentientError::Rule(RuleError::Catalog(format!(
                "Failed to read rules file {}: {}",
                path.display(),
                e
            )))
        })?;
        let catalog = Self::from_json(&content)?;
        info!(path = %path.display(), rules = catalog.len(), "Loaded rule catalog");
        Ok(catalog)
    }

    pub fn all(&self) -> Vec<InterventionRule> {
        self.rules.read().clone()
    }

    pub fn get(&self, id: &str) -> Option<InterventionRule> {
        self.rules.read().iter().find(|r| r.id == id).cloned()
    }

    /// Enabled rules reacting to the trigger, highest priority first
    pub fn candidates(&self, emotion: &str, pattern: Option<&str>) -> Vec<InterventionRule> {
        let mut matching: Vec<_> = self
            .rules
            .read()
            .iter()
            .filter(|r| r.enabled && r.matches_trigger(emotion, pattern))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.priority.cmp(&a.priority));
        matching
    }

    /// Insert a rule or replace the one with the same id
    pub fn upsert(&self, rule: InterventionRule) -> Result<()> {
        rule.validate()?;
        let mut rules = self.rules.write();
        match rules.iter_mut().find(|r| r.id == rule.id) {
            Some(existing) => *existing = rule,
            None => rules.push(rule),
        }
        Ok(())
    }

    pub fn remove(&self, id: &str) -> Result<InterventionRule> {
        let mut rules = self.rules.write();
        let idx = rules
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| RuleError::NotFound(id.to_string()))?;
        Ok(rules.remove(idx))
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        let mut rules = self.rules.write();
        let rule = rules
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| RuleError::NotFound(id.to_string()))?;
        rule.enabled = enabled;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }
}

fn rule(id: &str, trigger: &str, min_confidence: u8, priority: Priority) -> InterventionRule {
    InterventionRule {
        id: id.to_string(),
        name: id.replace('_', " "),
        trigger: trigger.to_string(),
        min_confidence,
        conditions: Vec::new(),
        actions: Vec::new(),
        variants: Vec::new(),
        allocation: AllocationStrategy::default(),
        priority,
        cooldown_minutes: 30,
        max_per_day: 3,
        enabled: true,
    }
}

/// Built-in catalog
pub fn default_rules() -> Vec<InterventionRule> {
    vec![
        InterventionRule {
            actions: vec![
                InterventionAction::show("help_chat"),
                InterventionAction::with_params(ActionKind::TagSession, json!({ "tag": "rage" })),
            ],
            cooldown_minutes: 10,
            ..rule("rage_support", "rage", 80, Priority::Critical)
        },
        InterventionRule {
            actions: vec![InterventionAction::show("cart_rescue")],
            cooldown_minutes: 60,
            max_per_day: 1,
            ..rule("cart_rescue", "cart_abandonment_imminent", 0, Priority::Critical)
        },
        InterventionRule {
            variants: vec![
                AbVariant {
                    id: "discount".to_string(),
                    weight: 1.0,
                    actions: vec![InterventionAction::show("discount_modal")],
                },
                AbVariant {
                    id: "value".to_string(),
                    weight: 1.0,
                    actions: vec![InterventionAction::show("value_highlight")],
                },
            ],
            allocation: AllocationStrategy::ThompsonSampling,
            ..rule("sticker_shock_offer", "sticker_shock", 70, Priority::High)
        },
        InterventionRule {
            conditions: vec![RuleCondition {
                kind: ConditionKind::TimeOnSite,
                operator: ConditionOperator::GreaterThan,
                value: json!(30),
            }],
            actions: vec![InterventionAction::show("urgency_banner")],
            ..rule("purchase_nudge", "purchase_intent", 75, Priority::High)
        },
        InterventionRule {
            actions: vec![InterventionAction::show("exit_intent")],
            max_per_day: 1,
            ..rule("exit_save", "abandonment_intent", 80, Priority::High)
        },
        InterventionRule {
            actions: vec![InterventionAction::show("trust_badges")],
            ..rule("cart_reassurance", "cart_shock", 70, Priority::High)
        },
        InterventionRule {
            actions: vec![InterventionAction::show("comparison_modal")],
            ..rule("comparison_helper", "comparison_shopping", 70, Priority::Medium)
        },
        InterventionRule {
            conditions: vec![RuleCondition {
                kind: ConditionKind::IdentityTier,
                operator: ConditionOperator::In,
                value: json!(["pro", "enterprise"]),
            }],
            actions: vec![InterventionAction::show("upsell")],
            max_per_day: 1,
            ..rule("upsell_delight", "delight", 60, Priority::Low)
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules_valid() {
        for rule in default_rules() {
            rule.validate().unwrap();
        }
    }

    #[test]
    fn test_rule_without_actions_rejected() {
        let rule = rule("empty", "rage", 0, Priority::Low);
        assert!(matches!(rule.validate(), Err(RuleError::NoActions { .. })));
    }

    #[test]
    fn test_duplicate_variants_rejected() {
        let variant = AbVariant {
            id: "a".into(),
            weight: 1.0,
            actions: vec![InterventionAction::show("help_chat")],
        };
        let rule = InterventionRule {
            variants: vec![variant.clone(), variant],
            ..rule("dup", "rage", 0, Priority::Low)
        };
        assert!(matches!(rule.validate(), Err(RuleError::InvalidVariants { .. })));
    }

    #[test]
    fn test_candidates_sorted_and_filtered() {
        let catalog = RuleCatalog::with_defaults();
        catalog.set_enabled("exit_save", false).unwrap();

        assert!(catalog.candidates("abandonment_intent", None).is_empty());
        let cart = catalog.candidates("cart_hesitation", Some("cart_abandonment_imminent"));
        assert_eq!(cart[0].id, "cart_rescue");
    }

    #[test]
    fn test_upsert_and_remove() {
        let catalog = RuleCatalog::with_defaults();
        let before = catalog.len();

        let mut custom = rule("custom", "*", 50, Priority::Low);
        custom.actions.push(InterventionAction::show("social_toast"));
        catalog.upsert(custom.clone()).unwrap();
        custom.min_confidence = 90;
        catalog.upsert(custom).unwrap();

        assert_eq!(catalog.len(), before + 1);
        assert_eq!(catalog.get("custom").unwrap().min_confidence, 90);
        assert!(catalog.remove("custom").is_ok());
        assert!(catalog.remove("custom").is_err());
    }

    #[test]
    fn test_catalog_from_json() {
        let catalog = RuleCatalog::from_json(
            r#"[{
                "id": "confused",
                "emotion": "confusion",
                "min_confidence": 60,
                "actions": [{"type": "show_intervention", "params": {"intervention_type": "help_chat"}, "delay_ms": 250}],
                "priority": "MEDIUM",
                "cooldown_minutes": 15
            }]"#,
        )
        .unwrap();

        let rule = catalog.get("confused").unwrap();
        assert_eq!(rule.trigger, "confusion");
        assert!(rule.enabled);
        assert_eq!(rule.actions[0].intervention_type(), Some("help_chat"));
        assert_eq!(rule.actions[0].delay_ms, 250);
    }

    #[test]
    fn test_catalog_from_bad_json() {
        assert!(RuleCatalog::from_json("[{\"id\": 1}]").is_err());
    }
}
