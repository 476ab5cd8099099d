//! # SentientIQ Behavior
//!
//! The request-path half of the pipeline: raw telemetry is interpreted into
//! behaviors, classified into emotion diagnoses, gated by per-emotion cooldowns
//! into the session history, and scanned for known emotional patterns.
//!
//! ```text
//! TelemetryEvent -> EventInterpreter -> EmotionClassifier -> SessionContext -> PatternDetector
//! ```

pub mod analysis;
pub mod classifier;
pub mod emotions;
pub mod interpreter;
pub mod patterns;
pub mod session;

pub use analysis::{BatchAnalysis, BehaviorAnalyzer};
pub use classifier::{BehaviorClassifier, Classification, EmotionClassifier};
pub use interpreter::EventInterpreter;
pub use patterns::{PatternDetector, PatternMatch};
pub use session::{SessionConfig, SessionContext, SessionHandle, SessionStore};
