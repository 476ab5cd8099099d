//! Pattern detector
//!
//! A fixed battery of named checks over the newest 5 and 10 emotion labels of
//! a session. Matches are returned highest priority first; checks of equal
//! priority keep their battery order, so the first listed check wins a tie.

use sentientiq_common::Priority;
use serde::{Deserialize, Serialize};

use crate::emotions::{self, ANXIETY, CLICK_EMOTIONS};

const SHORT_WINDOW: usize = 5;
const LONG_WINDOW: usize = 10;

/// A named behavioral signature with its candidate intervention
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternMatch {
    #[serde(rename = "type")]
    pub pattern_type: String,
    pub intervention: String,
    pub priority: Priority,
}

/// Recent label views handed to each check
struct Window<'a> {
    last5: &'a [String],
    last10: &'a [String],
}

struct PatternCheck {
    name: &'static str,
    intervention: &'static str,
    priority: Priority,
    matches: fn(&Window<'_>) -> bool,
}

fn has(labels: &[String], label: &str) -> bool {
    labels.iter().any(|l| l == label)
}

fn has_any(labels: &[String], set: &[&str]) -> bool {
    labels.iter().any(|l| emotions::is_in(l, set))
}

fn count(labels: &[String], label: &str) -> usize {
    labels.iter().filter(|l| *l == label).count()
}

fn count_in(labels: &[String], set: &[&str]) -> usize {
    labels.iter().filter(|l| emotions::is_in(l, set)).count()
}

/// `first` appears somewhere before any label of `then`
fn followed_by(labels: &[String], first: &[&str], then: &[&str]) -> bool {
    labels
        .iter()
        .position(|l| emotions::is_in(l, first))
        .map(|idx| has_any(&labels[idx + 1..], then))
        .unwrap_or(false)
}

/// `first` directly followed by a label of `then`
fn immediately_followed_by(labels: &[String], first: &str, then: &[&str]) -> bool {
    labels
        .windows(2)
        .any(|pair| pair[0] == first && emotions::is_in(&pair[1], then))
}

const EXIT_LABELS: &[&str] = &["abandonment_intent", "exit_risk", "cart_abandonment"];
const FRICTION_LABELS: &[&str] = &["rage", "frustration", "confusion"];
const SHOCK_LABELS: &[&str] = &["sticker_shock", "cart_shock"];
const DRIFT_LABELS: &[&str] = &["disengagement", "distraction"];
const READING_LABELS: &[&str] = &["deep_reading", "reading"];
const RECOVERY_LABELS: &[&str] = &["price_evaluation", "consideration", "evaluation"];

const CHECKS: &[PatternCheck] = &[
    // CRITICAL
    PatternCheck {
        name: "cart_abandonment_imminent",
        intervention: "cart_rescue",
        priority: Priority::Critical,
        matches: |w| {
            immediately_followed_by(
                w.last10,
                "cart_hesitation",
                &["distraction", "comparison_shopping", "abandonment_intent"],
            )
        },
    },
    PatternCheck {
        name: "rage_escalation",
        intervention: "help_chat",
        priority: Priority::Critical,
        matches: |w| has(w.last5, "rage") && has_any(w.last5, &["frustration", "confusion"]),
    },
    PatternCheck {
        name: "exit_after_price_shock",
        intervention: "discount_modal",
        priority: Priority::Critical,
        matches: |w| followed_by(w.last10, SHOCK_LABELS, EXIT_LABELS),
    },
    PatternCheck {
        name: "checkout_friction",
        intervention: "checkout_assist",
        priority: Priority::Critical,
        matches: |w| followed_by(w.last5, &["checkout_intent"], FRICTION_LABELS),
    },
    // HIGH
    PatternCheck {
        name: "price_reaction",
        intervention: "discount_modal",
        priority: Priority::High,
        matches: |w| has(w.last5, "sticker_shock"),
    },
    PatternCheck {
        name: "purchase_hesitation",
        intervention: "urgency_banner",
        priority: Priority::High,
        matches: |w| has(w.last5, "purchase_intent") && !has_any(w.last5, CLICK_EMOTIONS),
    },
    PatternCheck {
        name: "price_paralysis",
        intervention: "value_highlight",
        priority: Priority::High,
        matches: |w| has(w.last5, "price_paralysis"),
    },
    PatternCheck {
        name: "cart_shock_reaction",
        intervention: "trust_badges",
        priority: Priority::High,
        matches: |w| has(w.last5, "cart_shock"),
    },
    PatternCheck {
        name: "comparison_loop",
        intervention: "comparison_modal",
        priority: Priority::High,
        matches: |w| count(w.last10, "comparison_shopping") >= 2,
    },
    PatternCheck {
        name: "price_anxiety",
        intervention: "trust_badges",
        priority: Priority::High,
        matches: |w| has(w.last5, "price_hesitation") && has_any(w.last5, &["anxiety", "hesitation"]),
    },
    PatternCheck {
        name: "abandonment_risk",
        intervention: "exit_intent",
        priority: Priority::High,
        matches: |w| has_any(w.last5, EXIT_LABELS),
    },
    PatternCheck {
        name: "checkout_stall",
        intervention: "checkout_assist",
        priority: Priority::High,
        matches: |w| count(w.last10, "cart_hesitation") >= 2,
    },
    // MEDIUM
    PatternCheck {
        name: "demo_curiosity",
        intervention: "demo_offer",
        priority: Priority::Medium,
        matches: |w| has(w.last5, "demo_interest"),
    },
    PatternCheck {
        name: "confusion_spiral",
        intervention: "help_chat",
        priority: Priority::Medium,
        matches: |w| count(w.last5, "confusion") >= 2,
    },
    PatternCheck {
        name: "skeptical_reading",
        intervention: "trust_badges",
        priority: Priority::Medium,
        matches: |w| {
            has(w.last5, "skeptical") || followed_by(w.last5, &["deep_reading"], &["hesitation"])
        },
    },
    PatternCheck {
        name: "price_comparison",
        intervention: "comparison_modal",
        priority: Priority::Medium,
        matches: |w| has(w.last10, "price_evaluation") && has(w.last10, "comparison_shopping"),
    },
    PatternCheck {
        name: "hesitation_cluster",
        intervention: "social_toast",
        priority: Priority::Medium,
        matches: |w| count_in(w.last10, ANXIETY) >= 3,
    },
    PatternCheck {
        name: "price_consideration_lingering",
        intervention: "value_highlight",
        priority: Priority::Medium,
        matches: |w| count(w.last10, "price_consideration") >= 2,
    },
    PatternCheck {
        name: "repeated_frustration",
        intervention: "help_chat",
        priority: Priority::Medium,
        matches: |w| count(w.last10, "frustration") >= 3,
    },
    PatternCheck {
        name: "disengagement_drift",
        intervention: "re_engagement",
        priority: Priority::Medium,
        matches: |w| count_in(w.last10, DRIFT_LABELS) >= 2,
    },
    PatternCheck {
        name: "indecision_oscillation",
        intervention: "comparison_modal",
        priority: Priority::Medium,
        matches: |w| has(w.last10, "plan_selection") && has(w.last10, "price_hesitation"),
    },
    PatternCheck {
        name: "anxiety_spike",
        intervention: "trust_badges",
        priority: Priority::Medium,
        matches: |w| has(w.last5, "anxiety") && has(w.last5, "attention_spike"),
    },
    // LOW
    PatternCheck {
        name: "deep_engagement",
        intervention: "social_toast",
        priority: Priority::Low,
        matches: |w| count_in(w.last10, READING_LABELS) >= 3,
    },
    PatternCheck {
        name: "distracted_browsing",
        intervention: "re_engagement",
        priority: Priority::Low,
        matches: |w| has(w.last5, "distraction"),
    },
    PatternCheck {
        name: "sticker_shock_recovery",
        intervention: "value_highlight",
        priority: Priority::Low,
        matches: |w| followed_by(w.last10, &["sticker_shock"], RECOVERY_LABELS),
    },
    PatternCheck {
        name: "upsell_moment",
        intervention: "upsell",
        priority: Priority::Low,
        matches: |w| has(w.last5, "delight") || count(w.last5, "engagement") >= 2,
    },
];

/// Stateless detector over a session's label history
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternDetector;

impl PatternDetector {
    pub fn new() -> Self {
        Self
    }

    /// All matching patterns for `labels` (oldest first), highest priority first
    pub fn detect(&self, labels: &[String]) -> Vec<PatternMatch> {
        let last10 = &labels[labels.len().saturating_sub(LONG_WINDOW)..];
        let last5 = &labels[labels.len().saturating_sub(SHORT_WINDOW)..];
        let window = Window { last5, last10 };

        let mut found: Vec<PatternMatch> = CHECKS
            .iter()
            .filter(|check| (check.matches)(&window))
            .map(|check| PatternMatch {
                pattern_type: check.name.to_string(),
                intervention: check.intervention.to_string(),
                priority: check.priority,
            })
            .collect();

        // sort_by is stable: equal priorities keep battery order
        found.sort_by(|a, b| b.priority.cmp(&a.priority));
        found
    }

    /// The single match escalated per cycle; the rest are dropped
    pub fn top(&self, labels: &[String]) -> Option<PatternMatch> {
        self.detect(labels).into_iter().next()
    }

    /// Names of every check in the battery
    pub fn catalog() -> impl Iterator<Item = (&'static str, &'static str, Priority)> {
        CHECKS
            .iter()
            .map(|c| (c.name, c.intervention, c.priority))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_cart_abandonment_imminent() {
        let history = labels(&["reading", "cart_hesitation", "distraction"]);
        let top = PatternDetector::new().top(&history).unwrap();

        assert_eq!(top.pattern_type, "cart_abandonment_imminent");
        assert_eq!(top.intervention, "cart_rescue");
        assert_eq!(top.priority, Priority::Critical);
    }

    #[test]
    fn test_cart_hesitation_needs_adjacency() {
        let history = labels(&["cart_hesitation", "reading", "distraction"]);
        let found = PatternDetector::new().detect(&history);
        assert!(found.iter().all(|m| m.pattern_type != "cart_abandonment_imminent"));
    }

    #[test]
    fn test_price_reaction() {
        let top = PatternDetector::new()
            .top(&labels(&["scanning", "sticker_shock"]))
            .unwrap();
        assert_eq!(top.pattern_type, "price_reaction");
        assert_eq!(top.priority, Priority::High);
    }

    #[test]
    fn test_purchase_hesitation_suppressed_by_click() {
        let detector = PatternDetector::new();
        let hesitant = detector.detect(&labels(&["purchase_intent"]));
        assert!(hesitant.iter().any(|m| m.pattern_type == "purchase_hesitation"));

        let clicked = detector.detect(&labels(&["purchase_intent", "plan_selection"]));
        assert!(clicked.iter().all(|m| m.pattern_type != "purchase_hesitation"));
    }

    #[test]
    fn test_repeated_frustration() {
        let history = labels(&["frustration", "reading", "frustration", "scanning", "frustration"]);
        let found = PatternDetector::new().detect(&history);
        let m = found
            .iter()
            .find(|m| m.pattern_type == "repeated_frustration")
            .unwrap();
        assert_eq!(m.priority, Priority::Medium);
    }

    #[test]
    fn test_highest_priority_first_then_battery_order() {
        // price_reaction and price_paralysis are both HIGH; price_reaction is listed first
        let history = labels(&["demo_interest", "price_paralysis", "sticker_shock"]);
        let found = PatternDetector::new().detect(&history);

        assert_eq!(found[0].pattern_type, "price_reaction");
        assert_eq!(found[1].pattern_type, "price_paralysis");
        assert!(found
            .windows(2)
            .all(|pair| pair[0].priority >= pair[1].priority));
    }

    #[test]
    fn test_short_window_excludes_old_labels() {
        let mut history = labels(&["sticker_shock"]);
        history.extend(labels(&["reading"; 5]));
        let found = PatternDetector::new().detect(&history);
        assert!(found.iter().all(|m| m.pattern_type != "price_reaction"));
    }

    #[test]
    fn test_empty_history() {
        assert!(PatternDetector::new().top(&[]).is_none());
    }

    #[test]
    fn test_catalog_size() {
        assert!(PatternDetector::catalog().count() >= 25);
    }

    #[test]
    fn test_serializes_type_field() {
        let m = PatternMatch {
            pattern_type: "price_reaction".into(),
            intervention: "discount_modal".into(),
            priority: Priority::High,
        };
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["type"], "price_reaction");
        assert_eq!(json["priority"], "HIGH");
    }
}
