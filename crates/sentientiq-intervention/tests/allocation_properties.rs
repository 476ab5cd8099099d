//! Property tests for A/B stickiness and cooldown arithmetic

use proptest::prelude::*;
use sentientiq_common::Priority;
use sentientiq_intervention::gates::{base_cooldown_ms, cooldown_ms};
use sentientiq_intervention::{
    AbVariant, AllocationStrategy, InterventionAction, InterventionRule, VariantAllocator,
};

fn rule(allocation: AllocationStrategy, variants: usize) -> InterventionRule {
    InterventionRule {
        id: "ab".to_string(),
        name: "ab".to_string(),
        trigger: "*".to_string(),
        min_confidence: 0,
        conditions: vec![],
        actions: vec![],
        variants: (0..variants)
            .map(|i| AbVariant {
                id: format!("v{i}"),
                weight: (i + 1) as f64,
                actions: vec![InterventionAction::show("social_toast")],
            })
            .collect(),
        allocation,
        priority: Priority::Medium,
        cooldown_minutes: 0,
        max_per_day: 0,
        enabled: true,
    }
}

fn strategy() -> impl Strategy<Value = AllocationStrategy> {
    prop_oneof![
        Just(AllocationStrategy::Weighted),
        Just(AllocationStrategy::Uniform),
        Just(AllocationStrategy::ThompsonSampling),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_selection_is_sticky(
        allocation in strategy(),
        variants in 2usize..5,
        others in prop::collection::vec("[a-z]{1,8}", 0..40),
        seed in any::<u64>(),
    ) {
        let allocator = VariantAllocator::with_seed(seed);
        let rule = rule(allocation, variants);

        let first = allocator.select(&rule, "identity-under-test").map(|v| v.id.clone());
        for other in &others {
            allocator.select(&rule, other);
            allocator.record_shown("ab", "v0");
        }
        let second = allocator.select(&rule, "identity-under-test").map(|v| v.id.clone());

        prop_assert!(first.is_some());
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_cooldown_within_fatigue_bounds(fatigue in -1.0f64..3.0) {
        for priority in [Priority::Low, Priority::Medium, Priority::High, Priority::Critical] {
            let base = base_cooldown_ms(priority);
            let cooldown = cooldown_ms(priority, fatigue);
            prop_assert!(cooldown >= base);
            prop_assert!(cooldown <= base * 3 / 2);
        }
    }
}
