//! Raw client telemetry and its interpreted form

use serde::{Deserialize, Serialize};

/// Raw signal as posted by the web client
///
/// Every field is optional: clients send physics samples, DOM events and
/// pre-tagged behaviors through the same envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryEvent {
    /// Event tag (`click`, `scroll`, `mouse`, `hover`, ...)
    #[serde(rename = "type", alias = "event")]
    pub event_type: Option<String>,
    /// Pointer or scroll velocity (px/s)
    pub velocity: Option<f64>,
    /// Signed deceleration (px/s²); only the magnitude is interpreted
    pub deceleration: Option<f64>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    /// Target descriptor (selector, id, class list or text)
    pub target: Option<String>,
    /// Dwell duration reported by the client (ms)
    pub duration: Option<f64>,
    /// Context flags set by the client
    pub context: EventContext,
    /// Client timestamp (Unix millis)
    pub timestamp: Option<i64>,
}

impl TelemetryEvent {
    /// Create an event with only a type tag
    pub fn tagged(event_type: impl Into<String>) -> Self {
        Self {
            event_type: Some(event_type.into()),
            ..Default::default()
        }
    }

    pub fn with_velocity(mut self, velocity: f64) -> Self {
        self.velocity = Some(velocity);
        self
    }

    pub fn with_deceleration(mut self, deceleration: f64) -> Self {
        self.deceleration = Some(deceleration);
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_duration(mut self, duration_ms: f64) -> Self {
        self.duration = Some(duration_ms);
        self
    }

    pub fn with_context(mut self, context: EventContext) -> Self {
        self.context = context;
        self
    }

    pub fn at(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Page-region flags attached to an event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventContext {
    pub pricing: bool,
    pub cart: bool,
    pub checkout: bool,
    pub demo: bool,
}

impl EventContext {
    pub fn pricing() -> Self {
        Self {
            pricing: true,
            ..Default::default()
        }
    }

    pub fn cart() -> Self {
        Self {
            cart: true,
            ..Default::default()
        }
    }

    pub fn demo() -> Self {
        Self {
            demo: true,
            ..Default::default()
        }
    }

    /// Pricing, cart or checkout region
    pub fn is_purchase_related(&self) -> bool {
        self.pricing || self.cart || self.checkout
    }

    /// Union of two flag sets
    pub fn merge(self, other: EventContext) -> Self {
        Self {
            pricing: self.pricing || other.pricing,
            cart: self.cart || other.cart,
            checkout: self.checkout || other.checkout,
            demo: self.demo || other.demo,
        }
    }
}

/// Canonical behavior kinds understood by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorKind {
    SuddenStop,
    ErraticMovement,
    Hover,
    Scroll,
    Click,
    RageClick,
    ExitIntent,
    TabSwitch,
    TextSelection,
    Idle,
    CircularMotion,
    FormAbandon,
}

impl BehaviorKind {
    pub const ALL: [BehaviorKind; 12] = [
        BehaviorKind::SuddenStop,
        BehaviorKind::ErraticMovement,
        BehaviorKind::Hover,
        BehaviorKind::Scroll,
        BehaviorKind::Click,
        BehaviorKind::RageClick,
        BehaviorKind::ExitIntent,
        BehaviorKind::TabSwitch,
        BehaviorKind::TextSelection,
        BehaviorKind::Idle,
        BehaviorKind::CircularMotion,
        BehaviorKind::FormAbandon,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BehaviorKind::SuddenStop => "sudden_stop",
            BehaviorKind::ErraticMovement => "erratic_movement",
            BehaviorKind::Hover => "hover",
            BehaviorKind::Scroll => "scroll",
            BehaviorKind::Click => "click",
            BehaviorKind::RageClick => "rage_click",
            BehaviorKind::ExitIntent => "exit_intent",
            BehaviorKind::TabSwitch => "tab_switch",
            BehaviorKind::TextSelection => "text_selection",
            BehaviorKind::Idle => "idle",
            BehaviorKind::CircularMotion => "circular_motion",
            BehaviorKind::FormAbandon => "form_abandon",
        }
    }

    /// Parse a client tag, accepting a few legacy spellings
    pub fn from_tag(tag: &str) -> Option<Self> {
        let normalized = tag.trim().to_ascii_lowercase().replace('-', "_");
        let kind = match normalized.as_str() {
            "sudden_stop" => BehaviorKind::SuddenStop,
            "erratic_movement" | "erratic" => BehaviorKind::ErraticMovement,
            "hover" | "price_hover" => BehaviorKind::Hover,
            "scroll" => BehaviorKind::Scroll,
            "click" => BehaviorKind::Click,
            "rage_click" => BehaviorKind::RageClick,
            "exit_intent" | "mouse_exit" => BehaviorKind::ExitIntent,
            "tab_switch" | "visibility_hidden" => BehaviorKind::TabSwitch,
            "text_selection" | "copy" => BehaviorKind::TextSelection,
            "idle" => BehaviorKind::Idle,
            "circular_motion" => BehaviorKind::CircularMotion,
            "form_abandon" => BehaviorKind::FormAbandon,
            _ => return None,
        };
        Some(kind)
    }
}

impl std::fmt::Display for BehaviorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interpreted telemetry ready for classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorEvent {
    pub kind: BehaviorKind,
    pub target: Option<String>,
    pub velocity: f64,
    pub deceleration: f64,
    /// Dwell duration (ms); synthetic for physics-derived hovers
    pub duration_ms: f64,
    /// Direction changes for erratic movement
    pub changes: u32,
    pub context: EventContext,
    /// Event time (Unix millis)
    pub timestamp: i64,
}

impl BehaviorEvent {
    pub fn new(kind: BehaviorKind, timestamp: i64) -> Self {
        Self {
            kind,
            target: None,
            velocity: 0.0,
            deceleration: 0.0,
            duration_ms: 0.0,
            changes: 0,
            context: EventContext::default(),
            timestamp,
        }
    }

    pub fn with_context(mut self, context: EventContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_duration(mut self, duration_ms: f64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_velocity(mut self, velocity: f64) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}
