//! # SentientIQ Intervention
//!
//! Turns a session's latest diagnosis, top pattern and emotional vectors into at
//! most one intervention per cycle.
//!
//! ## Gates
//!
//! - **Rules**: trigger, confidence, conditions, per-rule cooldown and daily cap
//! - **Timing**: delayed during orientation, immediate for cart/abandonment and high urgency
//! - **Priority**: CRITICAL/HIGH auto-execute, MEDIUM/LOW are recorded only
//! - **Cooldown**: `base(priority) * (1 + 0.5 * fatigue)` per session
//!
//! A/B variants are allocated sticky per `(rule, identity)`.

pub mod allocation;
pub mod conditions;
pub mod engine;
pub mod executor;
pub mod gates;
pub mod revenue;
pub mod rules;

pub use allocation::{VariantAllocator, VariantStats};
pub use engine::{
    Decision, DecisionEngine, DecisionRequest, Effectiveness, EngineConfig, Feedback, Suppressed,
};
pub use executor::{ActionContext, ActionExecutor, LoggingExecutor};
pub use gates::{calculate_priority, calculate_timing, FatigueTracker, Timing};
pub use rules::{
    default_rules, AbVariant, ActionKind, AllocationStrategy, ConditionKind, ConditionOperator,
    InterventionAction, InterventionRule, RuleCatalog, RuleCondition,
};
