//! Emotion vocabulary: categories, cooldowns and label groups shared by the
//! classifier, the session store and the pattern detector.

/// Default minimum gap between two diagnoses of the same emotion (ms)
pub const DEFAULT_COOLDOWN_MS: i64 = 5_000;

/// Per-emotion cooldown overrides (ms)
const COOLDOWN_OVERRIDES: &[(&str, i64)] = &[
    ("purchase_intent", 10_000),
    ("sticker_shock", 8_000),
    ("price_paralysis", 8_000),
    ("deep_reading", 8_000),
    ("scanning", 3_000),
    ("browsing", 3_000),
    ("exploring", 3_000),
    ("rage", 3_000),
];

/// Minimum gap between two recorded diagnoses of `emotion`
pub fn cooldown_ms(emotion: &str) -> i64 {
    COOLDOWN_OVERRIDES
        .iter()
        .find(|(name, _)| *name == emotion)
        .map(|(_, ms)| *ms)
        .unwrap_or(DEFAULT_COOLDOWN_MS)
}

/// Pricing emotions whose confidence is dampened early in a session
pub const HIGH_INTENT_PRICING: &[&str] = &[
    "sticker_shock",
    "cart_shock",
    "purchase_intent",
    "price_consideration",
    "price_hesitation",
    "price_paralysis",
    "price_evaluation",
];

/// Labels produced by click behaviors
pub const CLICK_EMOTIONS: &[&str] = &["checkout_intent", "plan_selection", "demo_interest", "engagement"];

/// Emotion categories feeding the session vectors
pub const FRUSTRATION: &[&str] = &["rage", "frustration", "confusion", "price_paralysis"];
pub const ANXIETY: &[&str] = &[
    "anxiety",
    "hesitation",
    "price_hesitation",
    "cart_hesitation",
    "sticker_shock",
    "cart_shock",
    "skeptical",
];
pub const URGENCY: &[&str] = &[
    "purchase_intent",
    "checkout_intent",
    "abandonment_intent",
    "exit_risk",
    "cart_abandonment",
    "plan_selection",
];
pub const EXCITEMENT: &[&str] = &["delight", "demo_interest", "attention_spike", "engagement", "curiosity"];
pub const TRUST: &[&str] = &[
    "deep_reading",
    "reading",
    "evaluation",
    "price_evaluation",
    "consideration",
];

pub fn is_in(label: &str, group: &[&str]) -> bool {
    group.contains(&label)
}

/// `cart_*` emotions fire immediately and weigh heavier in priority
pub fn is_cart_emotion(label: &str) -> bool {
    label.starts_with("cart_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cooldown_overrides() {
        assert_eq!(cooldown_ms("purchase_intent"), 10_000);
        assert_eq!(cooldown_ms("scanning"), 3_000);
        assert_eq!(cooldown_ms("confusion"), DEFAULT_COOLDOWN_MS);
    }

    #[test]
    fn test_cart_prefix() {
        assert!(is_cart_emotion("cart_hesitation"));
        assert!(!is_cart_emotion("checkout_intent"));
    }
}
