//! Batch analysis: interpretation, classification, cooldown-gated recording and
//! pattern detection for one session batch.

use sentientiq_common::{BehaviorKind, EmotionDiagnosis, EmotionalVectors, TelemetryEvent};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::classifier::EmotionClassifier;
use crate::interpreter::EventInterpreter;
use crate::patterns::{PatternDetector, PatternMatch};
use crate::session::SessionContext;

/// Labels handed to the pattern detector
const PATTERN_HISTORY: usize = 10;

/// Outcome of one processed batch
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchAnalysis {
    /// Diagnoses recorded into the session (post-cooldown)
    pub diagnoses: Vec<EmotionDiagnosis>,
    /// Patterns over the updated history, highest priority first
    pub patterns: Vec<PatternMatch>,
    /// Events the interpreter could not use
    pub skipped: usize,
    pub vectors: EmotionalVectors,
}

impl BatchAnalysis {
    /// The one pattern escalated this cycle
    pub fn top_pattern(&self) -> Option<&PatternMatch> {
        self.patterns.first()
    }

    pub fn last_diagnosis(&self) -> Option<&EmotionDiagnosis> {
        self.diagnoses.last()
    }
}

/// Interpreter, classifier and detector bundled for the request path
#[derive(Debug, Clone, Copy, Default)]
pub struct BehaviorAnalyzer {
    interpreter: EventInterpreter,
    classifier: EmotionClassifier,
    detector: PatternDetector,
}

impl BehaviorAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a batch through the session; the caller holds the session lock
    #[instrument(skip(self, session, events), fields(session_id = %session.session_id, events = events.len()))]
    pub fn analyze_batch(
        &self,
        session: &mut SessionContext,
        events: &[TelemetryEvent],
        received_at: i64,
    ) -> BatchAnalysis {
        let mut analysis = BatchAnalysis::default();

        for event in events {
            let Some(mut behavior) = self.interpreter.interpret(event, received_at) else {
                analysis.skipped += 1;
                debug!(event_type = ?event.event_type, "Skipping undiagnosable event");
                continue;
            };

            session.observe(behavior.timestamp);

            if behavior.kind == BehaviorKind::Click
                && session.register_click(behavior.target.as_deref(), behavior.timestamp)
            {
                behavior.kind = BehaviorKind::RageClick;
            }

            let age = session.session_age(behavior.timestamp);
            let Some(classification) = self.classifier.classify(&behavior, age) else {
                continue;
            };

            let diagnosis = classification.into_diagnosis(&behavior);
            if session.try_record(diagnosis.clone()) {
                debug!(
                    emotion = %diagnosis.emotion,
                    confidence = diagnosis.confidence,
                    behavior = %diagnosis.behavior,
                    "Recorded diagnosis"
                );
                analysis.diagnoses.push(diagnosis);
            }
        }

        if !analysis.diagnoses.is_empty() {
            analysis.patterns = self.detect(session);
        }
        analysis.vectors = session.derive_vectors();
        analysis
    }

    /// Record an externally supplied diagnosis, still honoring cooldowns and
    /// running pattern detection
    pub fn record_direct(&self, session: &mut SessionContext, diagnosis: EmotionDiagnosis) -> BatchAnalysis {
        session.observe(diagnosis.timestamp);
        let mut analysis = BatchAnalysis::default();
        if session.try_record(diagnosis.clone()) {
            analysis.diagnoses.push(diagnosis);
            analysis.patterns = self.detect(session);
        }
        analysis.vectors = session.derive_vectors();
        analysis
    }

    fn detect(&self, session: &SessionContext) -> Vec<PatternMatch> {
        self.detector.detect(&session.recent_labels(PATTERN_HISTORY))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionConfig;
    use sentientiq_common::EventContext;

    fn session() -> SessionContext {
        SessionContext::new("s1", "t1", SessionConfig::default())
    }

    #[test]
    fn test_batch_counts() {
        let mut session = session();
        session.observe(0);
        let events = vec![
            TelemetryEvent::tagged("hover")
                .with_duration(3_000.0)
                .with_context(EventContext::pricing())
                .at(60_000),
            TelemetryEvent::tagged("wiggle").at(60_100),
            TelemetryEvent::default(),
        ];

        let analysis = BehaviorAnalyzer::new().analyze_batch(&mut session, &events, 60_000);
        assert_eq!(analysis.skipped, 2);
        assert_eq!(analysis.diagnoses.len(), 1);
        assert_eq!(analysis.diagnoses[0].emotion, "price_consideration");
        assert_eq!(analysis.diagnoses[0].confidence, 88);
    }

    #[test]
    fn test_rage_click_single_diagnosis() {
        let mut session = session();
        let events: Vec<_> = (0..4)
            .map(|i| TelemetryEvent::tagged("click").with_target("#submit").at(10_000 + i * 100))
            .collect();

        let analysis = BehaviorAnalyzer::new().analyze_batch(&mut session, &events, 10_000);
        let rage = analysis
            .diagnoses
            .iter()
            .filter(|d| d.emotion == "rage")
            .count();
        assert_eq!(rage, 1);
        assert_eq!(analysis.diagnoses.iter().find(|d| d.emotion == "rage").unwrap().behavior, "rage_click");
    }

    #[test]
    fn test_patterns_only_with_new_diagnoses() {
        let mut session = session();
        let analyzer = BehaviorAnalyzer::new();
        session.observe(0);
        let stop = TelemetryEvent::tagged("mouse")
            .with_velocity(3_000.0)
            .with_deceleration(6_000.0)
            .with_target(".price")
            .at(30_000);

        let first = analyzer.analyze_batch(&mut session, std::slice::from_ref(&stop), 30_000);
        assert_eq!(first.top_pattern().unwrap().pattern_type, "price_reaction");

        // same emotion inside its cooldown is not recorded, so nothing escalates
        let second = analyzer.analyze_batch(&mut session, &[stop.at(31_000)], 31_000);
        assert!(second.diagnoses.is_empty());
        assert!(second.patterns.is_empty());
    }

    #[test]
    fn test_record_direct_runs_patterns() {
        let mut session = session();
        let analysis = BehaviorAnalyzer::new()
            .record_direct(&mut session, EmotionDiagnosis::new("sticker_shock", 85, "legacy", 1_000));
        assert_eq!(analysis.diagnoses.len(), 1);
        assert_eq!(analysis.top_pattern().unwrap().intervention, "discount_modal");
    }
}
