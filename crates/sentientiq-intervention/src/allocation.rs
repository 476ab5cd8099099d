//! A/B variant allocation
//!
//! Assignment is sticky per `(rule, identity)`: the first draw is stored and
//! replayed for the lifetime of the allocator. Thompson sampling draws from
//! `Beta(converted + 1, shown - converted + 1)` per variant and picks the max.

use dashmap::DashMap;
use parking_lot::Mutex;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::debug;

use crate::rules::{AbVariant, AllocationStrategy, InterventionRule};

/// Exposure and conversion counts of one variant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VariantStats {
    pub shown: u64,
    pub converted: u64,
}

impl VariantStats {
    pub fn failures(&self) -> u64 {
        self.shown.saturating_sub(self.converted)
    }

    pub fn conversion_rate(&self) -> f64 {
        if self.shown == 0 {
            0.0
        } else {
            self.converted as f64 / self.shown as f64
        }
    }
}

pub struct VariantAllocator {
    /// (rule_id, identity) -> variant_id
    assignments: DashMap<(String, String), String>,
    /// (rule_id, variant_id) -> stats
    stats: DashMap<(String, String), VariantStats>,
    rng: Mutex<StdRng>,
}

impl Default for VariantAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl VariantAllocator {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic allocator for tests and replays
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            assignments: DashMap::new(),
            stats: DashMap::new(),
            rng: Mutex::new(rng),
        }
    }

    /// Variant for `identity` under `rule`, allocating on first request
    pub fn select<'r>(&self, rule: &'r InterventionRule, identity: &str) -> Option<&'r AbVariant> {
        if rule.variants.is_empty() {
            return None;
        }

        let key = (rule.id.clone(), identity.to_string());
        if let Some(existing) = self.assignments.get(&key) {
            if let Some(variant) = rule.variants.iter().find(|v| v.id == *existing) {
                return Some(variant);
            }
        }

        let variant = self.draw(rule)?;
        let assigned = self
            .assignments
            .entry(key)
            .and_modify(|current| {
                // a variant removed from the rule is reallocated
                if !rule.variants.iter().any(|v| v.id == *current) {
                    *current = variant.id.clone();
                }
            })
            .or_insert_with(|| variant.id.clone())
            .clone();

        debug!(rule_id = %rule.id, identity, variant_id = %assigned, "Allocated variant");
        rule.variants.iter().find(|v| v.id == assigned)
    }

    fn draw<'r>(&self, rule: &'r InterventionRule) -> Option<&'r AbVariant> {
        let mut rng = self.rng.lock();
        match rule.allocation {
            AllocationStrategy::Uniform => {
                let idx = rng.gen_range(0..rule.variants.len());
                rule.variants.get(idx)
            }
            AllocationStrategy::Weighted => {
                let weights = rule.variants.iter().map(|v| v.weight.max(0.0));
                match WeightedIndex::new(weights) {
                    Ok(dist) => rule.variants.get(dist.sample(&mut *rng)),
                    Err(_) => rule.variants.first(),
                }
            }
            AllocationStrategy::ThompsonSampling => rule
                .variants
                .iter()
                .map(|variant| {
                    let stats = self.stats(&rule.id, &variant.id);
                    let draw = sample_beta(
                        &mut *rng,
                        stats.converted as f64 + 1.0,
                        stats.failures() as f64 + 1.0,
                    );
                    (variant, draw)
                })
                .max_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(variant, _)| variant),
        }
    }

    pub fn assignment(&self, rule_id: &str, identity: &str) -> Option<String> {
        self.assignments
            .get(&(rule_id.to_string(), identity.to_string()))
            .map(|v| v.clone())
    }

    pub fn record_shown(&self, rule_id: &str, variant_id: &str) {
        self.stats
            .entry((rule_id.to_string(), variant_id.to_string()))
            .and_modify(|s| s.shown += 1)
            .or_insert(VariantStats {
                shown: 1,
                converted: 0,
            });
    }

    /// Count a conversion; also counts an exposure if none was recorded
    pub fn record_conversion(&self, rule_id: &str, variant_id: &str) {
        let mut entry = self
            .stats
            .entry((rule_id.to_string(), variant_id.to_string()))
            .or_default();
        entry.converted += 1;
        entry.shown = entry.shown.max(entry.converted);
    }

    pub fn stats(&self, rule_id: &str, variant_id: &str) -> VariantStats {
        self.stats
            .get(&(rule_id.to_string(), variant_id.to_string()))
            .map(|s| *s)
            .unwrap_or_default()
    }

    /// Stats for every variant seen under `rule_id`
    pub fn rule_stats(&self, rule_id: &str) -> Vec<(String, VariantStats)> {
        let mut all: Vec<_> = self
            .stats
            .iter()
            .filter(|e| e.key().0 == rule_id)
            .map(|e| (e.key().1.clone(), *e.value()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}

/// Beta(alpha, beta) as the ratio of two Gamma draws
pub fn sample_beta<R: Rng + ?Sized>(rng: &mut R, alpha: f64, beta: f64) -> f64 {
    let x = sample_gamma(rng, alpha);
    let y = sample_gamma(rng, beta);
    if x + y <= 0.0 {
        0.5
    } else {
        x / (x + y)
    }
}

/// Marsaglia-Tsang Gamma(shape, 1) sampler
fn sample_gamma<R: Rng + ?Sized>(rng: &mut R, shape: f64) -> f64 {
    if shape < 1.0 {
        // boost: Gamma(a) = Gamma(a + 1) * U^(1/a)
        let u: f64 = rng.gen::<f64>().max(f64::MIN_POSITIVE);
        return sample_gamma(rng, shape + 1.0) * u.powf(1.0 / shape);
    }

    let d = shape - 1.0 / 3.0;
    let c = 1.0 / (9.0 * d).sqrt();
    loop {
        let x = standard_normal(rng);
        let v = (1.0 + c * x).powi(3);
        if v <= 0.0 {
            continue;
        }
        let u: f64 = rng.gen();
        if u < 1.0 - 0.0331 * x.powi(4) || u.ln() < 0.5 * x * x + d * (1.0 - v + v.ln()) {
            return d * v;
        }
    }
}

/// Box-Muller
fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::InterventionAction;
    use sentientiq_common::Priority;

    fn ab_rule(allocation: AllocationStrategy) -> InterventionRule {
        InterventionRule {
            id: "ab".into(),
            name: "ab".into(),
            trigger: "sticker_shock".into(),
            min_confidence: 0,
            conditions: vec![],
            actions: vec![],
            variants: vec![
                AbVariant {
                    id: "a".into(),
                    weight: 1.0,
                    actions: vec![InterventionAction::show("discount_modal")],
                },
                AbVariant {
                    id: "b".into(),
                    weight: 3.0,
                    actions: vec![InterventionAction::show("value_highlight")],
                },
            ],
            allocation,
            priority: Priority::High,
            cooldown_minutes: 0,
            max_per_day: 0,
            enabled: true,
        }
    }

    #[test]
    fn test_sticky_assignment() {
        let allocator = VariantAllocator::with_seed(7);
        let rule = ab_rule(AllocationStrategy::Uniform);

        let first = allocator.select(&rule, "alice").unwrap().id.clone();
        for i in 0..50 {
            allocator.select(&rule, &format!("other-{i}"));
        }
        let again = allocator.select(&rule, "alice").unwrap().id.clone();

        assert_eq!(first, again);
        assert_eq!(allocator.assignment("ab", "alice"), Some(first));
    }

    #[test]
    fn test_weighted_distribution_favors_heavier_variant() {
        let allocator = VariantAllocator::with_seed(42);
        let rule = ab_rule(AllocationStrategy::Weighted);

        let b = (0..400)
            .filter(|i| allocator.select(&rule, &format!("id-{i}")).unwrap().id == "b")
            .count();
        assert!(b > 200, "b chosen {b} times");
    }

    #[test]
    fn test_thompson_prefers_converting_variant() {
        let allocator = VariantAllocator::with_seed(3);
        let rule = ab_rule(AllocationStrategy::ThompsonSampling);
        for _ in 0..200 {
            allocator.record_shown("ab", "a");
            allocator.record_shown("ab", "b");
        }
        for _ in 0..120 {
            allocator.record_conversion("ab", "a");
        }
        for _ in 0..5 {
            allocator.record_conversion("ab", "b");
        }

        let a = (0..100)
            .filter(|i| allocator.select(&rule, &format!("v-{i}")).unwrap().id == "a")
            .count();
        assert!(a > 90, "a chosen {a} times");
    }

    #[test]
    fn test_no_variants() {
        let allocator = VariantAllocator::new();
        let mut rule = ab_rule(AllocationStrategy::Uniform);
        rule.variants.clear();
        assert!(allocator.select(&rule, "x").is_none());
    }

    #[test]
    fn test_beta_in_unit_interval() {
        let mut rng = StdRng::seed_from_u64(1);
        for (a, b) in [(1.0, 1.0), (0.5, 2.0), (30.0, 4.0)] {
            for _ in 0..200 {
                let x = sample_beta(&mut rng, a, b);
                assert!((0.0..=1.0).contains(&x));
            }
        }
    }

    #[test]
    fn test_stats() {
        let allocator = VariantAllocator::new();
        allocator.record_shown("r", "a");
        allocator.record_shown("r", "a");
        allocator.record_conversion("r", "a");

        let stats = allocator.stats("r", "a");
        assert_eq!(stats, VariantStats { shown: 2, converted: 1 });
        assert_eq!(stats.conversion_rate(), 0.5);
        assert_eq!(allocator.rule_stats("r").len(), 1);
    }
}
