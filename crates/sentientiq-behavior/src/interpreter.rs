//! Event interpreter
//!
//! Normalizes raw physics/DOM telemetry into canonical [`BehaviorEvent`]s.
//! Physics rules are applied in a fixed order:
//!
//! ```text
//! |decel| > 5000                      => sudden_stop
//! |decel| > 1500 && velocity > 2000   => erratic_movement (changes = |decel| / 1000)
//! velocity < 500 && |decel| > 100     => hover (synthetic duration)
//! otherwise                           => not diagnosable
//! ```
//!
//! Pure function of its input; unknown shapes yield `None` and are never an error.

use sentientiq_common::{BehaviorEvent, BehaviorKind, EventContext, TelemetryEvent};

const SUDDEN_STOP_DECELERATION: f64 = 5_000.0;
const ERRATIC_DECELERATION: f64 = 1_500.0;
const ERRATIC_VELOCITY: f64 = 2_000.0;
const HOVER_MAX_VELOCITY: f64 = 500.0;
const HOVER_MIN_DECELERATION: f64 = 100.0;

/// Base synthetic hover durations (ms), scaled up as velocity approaches zero
const PRICING_HOVER_BASE_MS: f64 = 1_500.0;
const DEFAULT_HOVER_BASE_MS: f64 = 600.0;

const PRICING_KEYWORDS: &[&str] = &["price", "pricing", "plan", "tier", "cost", "billing", "subscription", "$"];
const CART_KEYWORDS: &[&str] = &["cart", "basket", "add-to-cart", "add_to_cart", "buy", "purchase", "order"];
const CHECKOUT_KEYWORDS: &[&str] = &["checkout", "payment", "pay-now", "pay_now"];
const DEMO_KEYWORDS: &[&str] = &["demo", "trial", "book-a-call", "schedule", "contact-sales", "contact_sales"];

/// Stateless telemetry interpreter
#[derive(Debug, Clone, Copy, Default)]
pub struct EventInterpreter;

impl EventInterpreter {
    pub fn new() -> Self {
        Self
    }

    /// Interpret one raw event; `received_at` stands in for a missing client timestamp
    pub fn interpret(&self, event: &TelemetryEvent, received_at: i64) -> Option<BehaviorEvent> {
        let tag = event.event_type.as_deref()?.trim().to_ascii_lowercase();
        if tag.is_empty() {
            return None;
        }

        let timestamp = event.timestamp.unwrap_or(received_at);
        let context = event
            .context
            .merge(target_context(event.target.as_deref()));

        if tag == "click" {
            let mut behavior = BehaviorEvent::new(BehaviorKind::Click, timestamp).with_context(context);
            behavior.target = event.target.clone();
            return Some(behavior);
        }

        if let Some(deceleration) = event.deceleration {
            return interpret_physics(
                deceleration.abs(),
                event.velocity.unwrap_or(0.0).abs(),
                context,
                event.target.clone(),
                timestamp,
            );
        }

        let kind = BehaviorKind::from_tag(&tag)?;
        let mut behavior = BehaviorEvent::new(kind, timestamp).with_context(context);
        behavior.target = event.target.clone();
        behavior.velocity = event.velocity.unwrap_or(0.0).abs();
        behavior.duration_ms = event.duration.unwrap_or(0.0).max(0.0);
        Some(behavior)
    }
}

fn interpret_physics(
    deceleration: f64,
    velocity: f64,
    context: EventContext,
    target: Option<String>,
    timestamp: i64,
) -> Option<BehaviorEvent> {
    let mut behavior = if deceleration > SUDDEN_STOP_DECELERATION {
        // Purchase-region stops are reported as pricing reactions
        let mut context = context;
        context.pricing = context.is_purchase_related();
        BehaviorEvent::new(BehaviorKind::SuddenStop, timestamp).with_context(context)
    } else if deceleration > ERRATIC_DECELERATION && velocity > ERRATIC_VELOCITY {
        let mut behavior =
            BehaviorEvent::new(BehaviorKind::ErraticMovement, timestamp).with_context(context);
        behavior.changes = (deceleration / 1_000.0).floor() as u32;
        behavior
    } else if velocity < HOVER_MAX_VELOCITY && deceleration > HOVER_MIN_DECELERATION {
        let base = if context.pricing {
            PRICING_HOVER_BASE_MS
        } else {
            DEFAULT_HOVER_BASE_MS
        };
        let stillness = (HOVER_MAX_VELOCITY - velocity) / HOVER_MAX_VELOCITY;
        BehaviorEvent::new(BehaviorKind::Hover, timestamp)
            .with_context(context)
            .with_duration(base * (1.0 + stillness))
    } else {
        return None;
    };

    behavior.velocity = velocity;
    behavior.deceleration = deceleration;
    behavior.target = target;
    Some(behavior)
}

/// Derive context flags from a target descriptor
pub fn target_context(target: Option<&str>) -> EventContext {
    let Some(target) = target else {
        return EventContext::default();
    };
    let target = target.to_ascii_lowercase();
    let matches = |keywords: &[&str]| keywords.iter().any(|k| target.contains(k));

    EventContext {
        pricing: matches(PRICING_KEYWORDS),
        cart: matches(CART_KEYWORDS),
        checkout: matches(CHECKOUT_KEYWORDS),
        demo: matches(DEMO_KEYWORDS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn physics(velocity: f64, deceleration: f64) -> TelemetryEvent {
        TelemetryEvent::tagged("mouse")
            .with_velocity(velocity)
            .with_deceleration(deceleration)
            .at(1_000)
    }

    #[test]
    fn test_sudden_stop_over_pricing() {
        let event = physics(3_000.0, -6_200.0).with_target("div.pricing-card");
        let behavior = EventInterpreter::new().interpret(&event, 0).unwrap();

        assert_eq!(behavior.kind, BehaviorKind::SuddenStop);
        assert!(behavior.context.pricing);
        assert_eq!(behavior.timestamp, 1_000);
    }

    #[test]
    fn test_sudden_stop_over_cart_is_pricing_tagged() {
        let event = physics(3_000.0, 7_000.0).with_target("#cart-summary");
        let behavior = EventInterpreter::new().interpret(&event, 0).unwrap();

        assert!(behavior.context.pricing);
        assert!(behavior.context.cart);
    }

    #[test]
    fn test_erratic_movement_changes() {
        let behavior = EventInterpreter::new()
            .interpret(&physics(2_500.0, 3_400.0), 0)
            .unwrap();

        assert_eq!(behavior.kind, BehaviorKind::ErraticMovement);
        assert_eq!(behavior.changes, 3);
    }

    #[test]
    fn test_hover_duration_longer_over_pricing() {
        let interpreter = EventInterpreter::new();
        let plain = interpreter.interpret(&physics(200.0, 300.0), 0).unwrap();
        let pricing = interpreter
            .interpret(&physics(200.0, 300.0).with_target(".price"), 0)
            .unwrap();

        assert_eq!(plain.kind, BehaviorKind::Hover);
        assert!(pricing.duration_ms > plain.duration_ms);
    }

    #[test]
    fn test_normal_motion_not_diagnosable() {
        let interpreter = EventInterpreter::new();
        assert!(interpreter.interpret(&physics(800.0, 900.0), 0).is_none());
        assert!(interpreter.interpret(&physics(300.0, 50.0), 0).is_none());
    }

    #[test]
    fn test_click_keyword_flags() {
        let event = TelemetryEvent::tagged("click").with_target("button#book-a-demo");
        let behavior = EventInterpreter::new().interpret(&event, 42).unwrap();

        assert_eq!(behavior.kind, BehaviorKind::Click);
        assert!(behavior.context.demo);
        assert!(!behavior.context.pricing);
        assert_eq!(behavior.timestamp, 42);
    }

    #[test]
    fn test_unknown_shapes_dropped() {
        let interpreter = EventInterpreter::new();
        assert!(interpreter.interpret(&TelemetryEvent::default(), 0).is_none());
        assert!(interpreter.interpret(&TelemetryEvent::tagged("wiggle"), 0).is_none());
        assert!(interpreter.interpret(&TelemetryEvent::tagged("   "), 0).is_none());
    }

    #[test]
    fn test_canonical_tags_forwarded() {
        let event = TelemetryEvent::tagged("hover")
            .with_duration(3_000.0)
            .with_context(EventContext::pricing());
        let behavior = EventInterpreter::new().interpret(&event, 0).unwrap();

        assert_eq!(behavior.kind, BehaviorKind::Hover);
        assert_eq!(behavior.duration_ms, 3_000.0);
        assert!(behavior.context.pricing);
    }
}
