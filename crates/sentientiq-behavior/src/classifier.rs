//! Emotion classifier
//!
//! Maps a [`BehaviorEvent`] plus session age to an `(emotion, confidence)` pair.
//! Each behavior kind owns one [`BehaviorClassifier`]; the kind enum selects it.
//!
//! Session-age policy applied on top of the per-kind tables:
//! - first 5s: pricing sudden-stop / hover / scroll become `noticing` / `exploring` / `browsing`
//! - first 15s: high-intent pricing emotions lose 20 confidence (floor 40)

use sentientiq_common::{
    BehaviorEvent, BehaviorKind, EmotionDiagnosis, DAMPENING_WINDOW_MS, ORIENTATION_WINDOW_MS,
};
use serde::Serialize;

use crate::emotions::HIGH_INTENT_PRICING;

/// Confidence removed from high-intent pricing emotions during the dampening window
const EARLY_DAMPENING: u8 = 20;
const DAMPENED_FLOOR: u8 = 40;

/// Classifier output before it becomes a diagnosis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub emotion: &'static str,
    pub confidence: u8,
}

impl Classification {
    pub const fn new(emotion: &'static str, confidence: u8) -> Self {
        Self { emotion, confidence }
    }

    /// Attach the behavior and timing of the event that produced this classification
    pub fn into_diagnosis(self, event: &BehaviorEvent) -> EmotionDiagnosis {
        EmotionDiagnosis::new(self.emotion, self.confidence, event.kind.as_str(), event.timestamp)
            .with_context(event.context)
    }
}

/// Classification capability of one behavior kind
pub trait BehaviorClassifier: Send + Sync {
    fn classify(&self, event: &BehaviorEvent) -> Option<Classification>;
}

/// Session-aware classifier front
#[derive(Debug, Clone, Copy, Default)]
pub struct EmotionClassifier;

impl EmotionClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, event: &BehaviorEvent, session_age_ms: i64) -> Option<Classification> {
        if session_age_ms < ORIENTATION_WINDOW_MS && event.context.is_purchase_related() {
            match event.kind {
                BehaviorKind::SuddenStop => return Some(Classification::new("noticing", 50)),
                BehaviorKind::Hover => return Some(Classification::new("exploring", 45)),
                BehaviorKind::Scroll => return Some(Classification::new("browsing", 40)),
                _ => {}
            }
        }

        let mut classification = classifier_for(event.kind).classify(event)?;

        if session_age_ms < DAMPENING_WINDOW_MS
            && HIGH_INTENT_PRICING.contains(&classification.emotion)
        {
            classification.confidence = classification
                .confidence
                .saturating_sub(EARLY_DAMPENING)
                .max(DAMPENED_FLOOR);
        }

        Some(classification)
    }
}

/// Select the classifier owning `kind`
pub fn classifier_for(kind: BehaviorKind) -> &'static dyn BehaviorClassifier {
    match kind {
        BehaviorKind::SuddenStop => &SuddenStop,
        BehaviorKind::ErraticMovement => &ErraticMovement,
        BehaviorKind::Hover => &Hover,
        BehaviorKind::Scroll => &Scroll,
        BehaviorKind::Click => &Click,
        BehaviorKind::RageClick => &RageClick,
        BehaviorKind::ExitIntent => &ExitIntent,
        BehaviorKind::TabSwitch => &TabSwitch,
        BehaviorKind::TextSelection => &TextSelection,
        BehaviorKind::Idle => &Idle,
        BehaviorKind::CircularMotion => &CircularMotion,
        BehaviorKind::FormAbandon => &FormAbandon,
    }
}

/// Pick the first band whose upper bound exceeds `value`, else the fallback
fn graded(value: f64, bands: &[(f64, Classification)], fallback: Classification) -> Classification {
    bands
        .iter()
        .find(|(limit, _)| value < *limit)
        .map(|(_, c)| *c)
        .unwrap_or(fallback)
}

struct SuddenStop;

impl BehaviorClassifier for SuddenStop {
    fn classify(&self, event: &BehaviorEvent) -> Option<Classification> {
        let c = if event.context.cart || event.context.checkout {
            Classification::new("cart_shock", 88)
        } else if event.context.pricing {
            Classification::new("sticker_shock", 85)
        } else {
            Classification::new("attention_spike", 60)
        };
        Some(c)
    }
}

struct ErraticMovement;

impl BehaviorClassifier for ErraticMovement {
    fn classify(&self, event: &BehaviorEvent) -> Option<Classification> {
        let c = match event.changes {
            n if n >= 8 => Classification::new("frustration", 80),
            n if n >= 4 => Classification::new("confusion", 70),
            _ => Classification::new("anxiety", 60),
        };
        Some(c)
    }
}

struct Hover;

const PRICE_HOVER_BANDS: &[(f64, Classification)] = &[
    (500.0, Classification::new("price_glance", 60)),
    (1_200.0, Classification::new("price_scan", 70)),
    (2_500.0, Classification::new("purchase_intent", 85)),
    (4_000.0, Classification::new("price_consideration", 88)),
    (6_000.0, Classification::new("price_hesitation", 90)),
];

const HOVER_BANDS: &[(f64, Classification)] = &[
    (1_000.0, Classification::new("scanning", 55)),
    (3_000.0, Classification::new("evaluation", 65)),
];

impl BehaviorClassifier for Hover {
    fn classify(&self, event: &BehaviorEvent) -> Option<Classification> {
        let duration = event.duration_ms;
        let c = if event.context.pricing {
            graded(duration, PRICE_HOVER_BANDS, Classification::new("price_paralysis", 93))
        } else if event.context.cart || event.context.checkout {
            if duration < 2_000.0 {
                Classification::new("cart_review", 70)
            } else {
                Classification::new("cart_hesitation", 80)
            }
        } else if event.context.demo {
            Classification::new("demo_interest", 72)
        } else {
            graded(duration, HOVER_BANDS, Classification::new("consideration", 72))
        };
        Some(c)
    }
}

struct Scroll;

const PRICE_SCROLL_BANDS: &[(f64, Classification)] = &[
    (300.0, Classification::new("price_evaluation", 78)),
    (1_200.0, Classification::new("comparison_shopping", 70)),
];

const SCROLL_BANDS: &[(f64, Classification)] = &[
    (150.0, Classification::new("deep_reading", 75)),
    (500.0, Classification::new("reading", 65)),
    (1_200.0, Classification::new("scanning", 60)),
    (2_500.0, Classification::new("skimming", 55)),
];

impl BehaviorClassifier for Scroll {
    fn classify(&self, event: &BehaviorEvent) -> Option<Classification> {
        let c = if event.context.pricing {
            graded(event.velocity, PRICE_SCROLL_BANDS, Classification::new("price_skimming", 60))
        } else {
            graded(event.velocity, SCROLL_BANDS, Classification::new("searching", 62))
        };
        Some(c)
    }
}

struct Click;

impl BehaviorClassifier for Click {
    fn classify(&self, event: &BehaviorEvent) -> Option<Classification> {
        let c = if event.context.cart || event.context.checkout {
            Classification::new("checkout_intent", 82)
        } else if event.context.pricing {
            Classification::new("plan_selection", 78)
        } else if event.context.demo {
            Classification::new("demo_interest", 75)
        } else {
            Classification::new("engagement", 55)
        };
        Some(c)
    }
}

struct RageClick;

impl BehaviorClassifier for RageClick {
    fn classify(&self, _event: &BehaviorEvent) -> Option<Classification> {
        Some(Classification::new("rage", 95))
    }
}

struct ExitIntent;

impl BehaviorClassifier for ExitIntent {
    fn classify(&self, event: &BehaviorEvent) -> Option<Classification> {
        let c = if event.context.cart || event.context.checkout {
            Classification::new("cart_abandonment", 90)
        } else if event.context.pricing {
            Classification::new("abandonment_intent", 85)
        } else {
            Classification::new("exit_risk", 75)
        };
        Some(c)
    }
}

struct TabSwitch;

impl BehaviorClassifier for TabSwitch {
    fn classify(&self, event: &BehaviorEvent) -> Option<Classification> {
        let c = if event.context.is_purchase_related() {
            Classification::new("comparison_shopping", 72)
        } else {
            Classification::new("distraction", 60)
        };
        Some(c)
    }
}

struct TextSelection;

impl BehaviorClassifier for TextSelection {
    fn classify(&self, event: &BehaviorEvent) -> Option<Classification> {
        let c = if event.context.pricing {
            Classification::new("comparison_shopping", 74)
        } else {
            Classification::new("evaluation", 65)
        };
        Some(c)
    }
}

struct Idle;

impl BehaviorClassifier for Idle {
    fn classify(&self, event: &BehaviorEvent) -> Option<Classification> {
        if event.context.cart || event.context.checkout {
            return Some(Classification::new("cart_hesitation", 80));
        }
        match event.duration_ms {
            d if d >= 30_000.0 => Some(Classification::new("disengagement", 70)),
            d if d >= 8_000.0 => Some(Classification::new("hesitation", 65)),
            _ => None,
        }
    }
}

struct CircularMotion;

impl BehaviorClassifier for CircularMotion {
    fn classify(&self, _event: &BehaviorEvent) -> Option<Classification> {
        Some(Classification::new("confusion", 72))
    }
}

struct FormAbandon;

impl BehaviorClassifier for FormAbandon {
    fn classify(&self, event: &BehaviorEvent) -> Option<Classification> {
        let c = if event.context.cart || event.context.checkout {
            Classification::new("cart_abandonment", 85)
        } else {
            Classification::new("frustration", 70)
        };
        Some(c)
    }
}
