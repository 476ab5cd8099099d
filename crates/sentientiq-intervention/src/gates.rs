//! Timing, priority, cooldown and fatigue gates

use dashmap::DashMap;
use sentientiq_common::{EmotionalVectors, Priority, ORIENTATION_WINDOW_MS};
use serde::{Deserialize, Serialize};

/// When a decision may fire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Timing {
    Immediate,
    /// Fire after the remaining orientation window
    Delayed { delay_ms: u64 },
    /// Natural pause reached; fire now
    Optimal,
    /// Visitor is absorbed; wait for a later cycle
    Deferred,
}

pub fn calculate_timing(
    emotion: &str,
    vectors: &EmotionalVectors,
    session_age_ms: i64,
    last_emotion: Option<&str>,
) -> Timing {
    if session_age_ms < ORIENTATION_WINDOW_MS {
        return Timing::Delayed {
            delay_ms: (ORIENTATION_WINDOW_MS - session_age_ms.max(0)) as u64,
        };
    }
    if emotion.starts_with("cart_") || emotion == "abandonment_intent" {
        return Timing::Immediate;
    }
    if vectors.urgency > 80.0 {
        return Timing::Immediate;
    }
    if last_emotion == Some("deep_reading") {
        return Timing::Deferred;
    }
    Timing::Optimal
}

pub fn calculate_priority(
    emotion: &str,
    confidence: u8,
    vectors: &EmotionalVectors,
    session_age_ms: i64,
) -> Priority {
    let is_cart = emotion.starts_with("cart_");

    if (emotion == "abandonment_intent" && confidence > 80)
        || (emotion == "cart_shock" && vectors.frustration > 70.0)
        || vectors.frustration > 90.0
    {
        return Priority::Critical;
    }
    if (is_cart && confidence > 70)
        || vectors.frustration > 70.0
        || (vectors.urgency > 80.0 && session_age_ms > 60_000)
    {
        return Priority::High;
    }
    if confidence > 60 || vectors.urgency > 50.0 {
        return Priority::Medium;
    }
    Priority::Low
}

/// Engine-level cooldown base per priority (ms)
pub fn base_cooldown_ms(priority: Priority) -> i64 {
    match priority {
        Priority::Critical => 30_000,
        Priority::High => 45_000,
        Priority::Medium => 60_000,
        Priority::Low => 120_000,
    }
}

pub fn fatigue_multiplier(fatigue: f64) -> f64 {
    1.0 + 0.5 * fatigue.clamp(0.0, 1.0)
}

pub fn cooldown_ms(priority: Priority, fatigue: f64) -> i64 {
    (base_cooldown_ms(priority) as f64 * fatigue_multiplier(fatigue)).round() as i64
}

const SHOWN_FATIGUE: f64 = 0.2;
const DISMISSED_FATIGUE: f64 = 0.3;
const MAX_FATIGUE: f64 = 1.0;

/// Session-scoped intervention fatigue in [0, 1]
#[derive(Debug, Default)]
pub struct FatigueTracker {
    levels: DashMap<String, f64>,
}

impl FatigueTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(&self, session_id: &str) -> f64 {
        self.levels.get(session_id).map(|l| *l).unwrap_or(0.0)
    }

    pub fn record_shown(&self, session_id: &str) -> f64 {
        self.bump(session_id, SHOWN_FATIGUE)
    }

    pub fn record_dismissed(&self, session_id: &str) -> f64 {
        self.bump(session_id, DISMISSED_FATIGUE)
    }

    fn bump(&self, session_id: &str, amount: f64) -> f64 {
        let mut level = self.levels.entry(session_id.to_string()).or_insert(0.0);
        *level = (*level + amount).min(MAX_FATIGUE);
        *level
    }

    pub fn forget(&self, session_id: &str) {
        self.levels.remove(session_id);
    }
}
