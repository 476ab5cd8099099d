//! EVI stays within [0, 100] for arbitrary session samples

use proptest::prelude::*;
use sentientiq_common::EmotionDiagnosis;
use sentientiq_memory::{EviSignal, VolatilityConfig, VolatilityTracker};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_evi_bounded(
        sessions in prop::collection::vec(prop::collection::vec(0u8..=100, 2..20), 10..60)
    ) {
        let tracker = VolatilityTracker::new(VolatilityConfig::default());
        for (s, confidences) in sessions.iter().enumerate() {
            let id = format!("session-{s}");
            for (i, confidence) in confidences.iter().enumerate() {
                let at = i as i64 * 100;
                tracker.observe(&id, &EmotionDiagnosis::new("hover_label", *confidence, "hover", at), at);
            }
        }

        let snapshot = tracker.compute(10_000);
        prop_assert!((0.0..=100.0).contains(&snapshot.evi));
        prop_assert!((0.0..=1.0).contains(&snapshot.confidence));
        prop_assert_eq!(snapshot.sample_size, sessions.len());
        prop_assert_eq!(snapshot.signal, EviSignal::from_evi(snapshot.evi));
        prop_assert!(snapshot.predicted_stability_hours <= 72);
        prop_assert_eq!(snapshot.predicted_stability_hours == 0, snapshot.signal == EviSignal::Go);
    }
}
