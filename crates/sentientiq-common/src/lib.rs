//! # SentientIQ Common
//!
//! Shared types and errors for the SentientIQ behavioral intervention pipeline.
//!
//! ## Core Types
//!
//! - [`TelemetryEvent`]: raw client signal, consumed once by the interpreter
//! - [`BehaviorEvent`]: interpreted signal with a canonical [`BehaviorKind`]
//! - [`EmotionDiagnosis`]: (emotion, confidence) attributed to one behavior
//! - [`EmotionalVectors`]: frustration/anxiety/urgency/excitement/trust scores
//! - [`InterventionExecution`]: record of one intervention firing

pub mod error;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{DispatchError, Result, RuleError, SentientError, TelemetryError};
pub use types::{
    diagnosis::{EmotionDiagnosis, EmotionalVectors, MAX_CONFIDENCE},
    intervention::{
        ActionResult, ExecutionStatus, Identity, InterventionExecution, Priority, SessionOutcome,
    },
    telemetry::{BehaviorEvent, BehaviorKind, EventContext, TelemetryEvent},
};

/// SentientIQ version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum diagnoses retained per session
pub const MAX_SESSION_HISTORY: usize = 50;

/// Inactivity after which a session is evicted (ms)
pub const SESSION_TTL_MS: i64 = 60 * 60 * 1000;

/// Orientation window during which pricing reactions are neutralized (ms)
pub const ORIENTATION_WINDOW_MS: i64 = 5_000;

/// Window during which high-intent pricing confidences are dampened (ms)
pub const DAMPENING_WINDOW_MS: i64 = 15_000;

/// Current wall-clock time in Unix millis
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
