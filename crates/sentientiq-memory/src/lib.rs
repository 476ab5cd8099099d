//! # SentientIQ Memory
//!
//! Cross-session aggregates shared by every request:
//!
//! - [`PatternMemory`]: conversion / abandonment counts per emotion path
//! - [`VolatilityTracker`]: the Emotional Volatility Index (EVI)

pub mod pattern_memory;
pub mod volatility;

pub use pattern_memory::{OutcomePrediction, PathCount, PatternMemory, TenantInsights};
pub use volatility::{EviSignal, EviSnapshot, VolatilityConfig, VolatilityTracker};
