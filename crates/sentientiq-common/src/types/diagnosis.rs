//! Emotion diagnoses and derived session vectors

use serde::{Deserialize, Serialize};

use super::telemetry::EventContext;

/// Maximum diagnosis confidence
pub const MAX_CONFIDENCE: u8 = 100;

/// One (emotion, confidence) attribution for an interpreted behavior
///
/// Immutable once produced by the classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionDiagnosis {
    pub emotion: String,
    /// 0-100
    pub confidence: u8,
    /// Canonical behavior that produced the diagnosis
    pub behavior: String,
    /// Event time (Unix millis)
    pub timestamp: i64,
    #[serde(default)]
    pub context: EventContext,
}

impl EmotionDiagnosis {
    pub fn new(
        emotion: impl Into<String>,
        confidence: u8,
        behavior: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            emotion: emotion.into(),
            confidence: confidence.min(MAX_CONFIDENCE),
            behavior: behavior.into(),
            timestamp,
            context: EventContext::default(),
        }
    }

    pub fn with_context(mut self, context: EventContext) -> Self {
        self.context = context;
        self
    }
}

/// Weighted emotion-category scores over a session's recent history, each 0-100
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EmotionalVectors {
    pub frustration: f64,
    pub anxiety: f64,
    pub urgency: f64,
    pub excitement: f64,
    pub trust: f64,
}

impl EmotionalVectors {
    /// Clamp every component into [0, 100]
    pub fn clamped(self) -> Self {
        Self {
            frustration: self.frustration.clamp(0.0, 100.0),
            anxiety: self.anxiety.clamp(0.0, 100.0),
            urgency: self.urgency.clamp(0.0, 100.0),
            excitement: self.excitement.clamp(0.0, 100.0),
            trust: self.trust.clamp(0.0, 100.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_capped() {
        let diagnosis = EmotionDiagnosis::new("rage", 140, "rage_click", 0);
        assert_eq!(diagnosis.confidence, 100);
    }

    #[test]
    fn test_vectors_clamped() {
        let vectors = EmotionalVectors {
            frustration: 130.0,
            anxiety: -4.0,
            ..Default::default()
        }
        .clamped();
        assert_eq!(vectors.frustration, 100.0);
        assert_eq!(vectors.anxiety, 0.0);
    }
}
