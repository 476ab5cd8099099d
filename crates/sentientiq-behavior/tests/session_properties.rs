//! Property tests for session history, cooldowns and rage-click detection

use proptest::prelude::*;
use sentientiq_behavior::emotions::cooldown_ms;
use sentientiq_behavior::{BehaviorAnalyzer, SessionConfig, SessionContext};
use sentientiq_common::{EmotionDiagnosis, TelemetryEvent, MAX_SESSION_HISTORY};
use std::collections::HashMap;

const EMOTIONS: &[&str] = &[
    "purchase_intent",
    "scanning",
    "confusion",
    "sticker_shock",
    "rage",
    "deep_reading",
];

fn telemetry_from_code(code: u8, at: i64) -> TelemetryEvent {
    match code {
        0 => TelemetryEvent::tagged("mouse")
            .with_velocity(3_000.0)
            .with_deceleration(6_500.0)
            .with_target(".price")
            .at(at),
        1 => TelemetryEvent::tagged("mouse")
            .with_velocity(2_500.0)
            .with_deceleration(3_000.0)
            .at(at),
        2 => TelemetryEvent::tagged("scroll").with_velocity(400.0).at(at),
        3 => TelemetryEvent::tagged("click").with_target("#buy").at(at),
        4 => TelemetryEvent::tagged("exit_intent").at(at),
        _ => TelemetryEvent::tagged("wiggle").at(at),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_history_never_exceeds_cap(
        batches in prop::collection::vec(prop::collection::vec((0u8..6, 0i64..20_000), 1..40), 1..12)
    ) {
        let analyzer = BehaviorAnalyzer::new();
        let mut session = SessionContext::new("s", "t", SessionConfig::default());
        let mut clock = 0i64;

        for batch in batches {
            let events: Vec<_> = batch
                .into_iter()
                .map(|(code, gap)| {
                    clock += gap;
                    telemetry_from_code(code, clock)
                })
                .collect();
            analyzer.analyze_batch(&mut session, &events, clock);
            prop_assert!(session.history().len() <= MAX_SESSION_HISTORY);
        }
    }

    #[test]
    fn prop_recorded_diagnoses_respect_cooldown(
        steps in prop::collection::vec((0usize..EMOTIONS.len(), 0i64..6_000), 1..200)
    ) {
        let config = SessionConfig { history_cap: 500, ..SessionConfig::default() };
        let mut session = SessionContext::new("s", "t", config);
        let mut clock = 0i64;

        for (idx, gap) in steps {
            clock += gap;
            session.try_record(EmotionDiagnosis::new(EMOTIONS[idx], 70, "hover", clock));
        }

        let mut last_seen: HashMap<String, i64> = HashMap::new();
        for diagnosis in session.history() {
            if let Some(previous) = last_seen.get(&diagnosis.emotion) {
                prop_assert!(diagnosis.timestamp - previous >= cooldown_ms(&diagnosis.emotion));
            }
            last_seen.insert(diagnosis.emotion.clone(), diagnosis.timestamp);
        }
    }

    #[test]
    fn prop_rage_click_fires_once_per_burst(bursts in 1usize..6, gap in 1i64..300) {
        let mut session = SessionContext::new("s", "t", SessionConfig::default());
        let mut fired = 0;
        let mut clock = 0i64;

        for _ in 0..bursts {
            // four quick clicks, then a pause longer than the window
            for _ in 0..4 {
                if session.register_click(Some("#submit"), clock) {
                    fired += 1;
                }
                clock += gap.min(200);
            }
            clock += 5_000;
        }

        prop_assert_eq!(fired, bursts);
    }
}
