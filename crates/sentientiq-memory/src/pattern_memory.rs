//! Pattern memory
//!
//! Counts how often a normalized "last 10 emotions" path ended in a conversion
//! or an abandonment, per tenant. Counters are DashMap entries, so concurrent
//! increments from different sessions never lose counts.

use dashmap::DashMap;
use sentientiq_common::SessionOutcome;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Emotions that make up a learned path
pub const PATH_LENGTH: usize = 10;
/// Trailing emotions matched against learned paths by the predictor
pub const PREDICTION_SEGMENT: usize = 3;
/// Pseudo-count controlling how quickly prediction confidence grows
const CONFIDENCE_PRIOR: f64 = 10.0;
const PATH_SEPARATOR: &str = "->";

type PathKey = (String, String);

/// Normalized path key for the newest `PATH_LENGTH` labels
pub fn path_key<S: AsRef<str>>(labels: &[S]) -> String {
    join_tail(labels, PATH_LENGTH)
}

fn normalized_tail<S: AsRef<str>>(labels: &[S], n: usize) -> Vec<String> {
    labels[labels.len().saturating_sub(n)..]
        .iter()
        .map(|l| l.as_ref().trim().to_ascii_lowercase())
        .collect()
}

fn join_tail<S: AsRef<str>>(labels: &[S], n: usize) -> String {
    normalized_tail(labels, n).join(PATH_SEPARATOR)
}

/// True when `segment` appears in `path` as consecutive whole labels
fn contains_segment(path: &str, segment: &[String]) -> bool {
    let labels: Vec<&str> = path.split(PATH_SEPARATOR).collect();
    labels
        .windows(segment.len())
        .any(|window| window.iter().zip(segment).all(|(a, b)| *a == b.as_str()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathCount {
    pub path: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcomePrediction {
    pub conversion_probability: f64,
    pub abandonment_probability: f64,
    /// Grows toward 1.0 with the number of matching sessions
    pub confidence: f64,
    pub sample_size: u64,
}

impl OutcomePrediction {
    fn uninformed() -> Self {
        Self {
            conversion_probability: 0.5,
            abandonment_probability: 0.5,
            confidence: 0.0,
            sample_size: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TenantInsights {
    pub tenant_id: String,
    pub learned_sessions: u64,
    pub conversion_rate: f64,
    pub top_conversion_paths: Vec<PathCount>,
    pub top_abandonment_paths: Vec<PathCount>,
}

#[derive(Debug, Default)]
pub struct PatternMemory {
    conversions: DashMap<PathKey, u64>,
    abandonments: DashMap<PathKey, u64>,
}

impl PatternMemory {
    pub fn new() -> Self {
        Self::default()
    }

    fn counters(&self, outcome: SessionOutcome) -> &DashMap<PathKey, u64> {
        match outcome {
            SessionOutcome::Converted => &self.conversions,
            SessionOutcome::Abandoned => &self.abandonments,
        }
    }

    /// Count the session's path toward `outcome`; returns the path and its new count
    pub fn learn_from_session<S: AsRef<str>>(
        &self,
        tenant_id: &str,
        labels: &[S],
        outcome: SessionOutcome,
    ) -> Option<PathCount> {
        if labels.is_empty() {
            return None;
        }
        let path = path_key(labels);
        let count = self.add(tenant_id, &path, outcome, 1);
        debug!(tenant_id, path = %path, outcome = outcome.as_str(), count, "Learned emotion path");
        Some(PathCount { path, count })
    }

    /// Add `count` to a stored path, e.g. when hydrating from persisted patterns
    pub fn add(&self, tenant_id: &str, path: &str, outcome: SessionOutcome, count: u64) -> u64 {
        let mut entry = self
            .counters(outcome)
            .entry((tenant_id.to_string(), path.to_string()))
            .or_insert(0);
        *entry += count;
        *entry
    }

    /// Conversion vs abandonment odds for paths ending like `labels`
    pub fn predict_outcome<S: AsRef<str>>(&self, tenant_id: &str, labels: &[S]) -> OutcomePrediction {
        if labels.is_empty() {
            return OutcomePrediction::uninformed();
        }
        let segment = normalized_tail(labels, PREDICTION_SEGMENT);
        let matching = |counters: &DashMap<PathKey, u64>| -> u64 {
            counters
                .iter()
                .filter(|e| e.key().0 == tenant_id && contains_segment(&e.key().1, &segment))
                .map(|e| *e.value())
                .sum()
        };

        let converted = matching(&self.conversions);
        let abandoned = matching(&self.abandonments);
        let total = converted + abandoned;
        if total == 0 {
            return OutcomePrediction::uninformed();
        }

        let total_f = total as f64;
        OutcomePrediction {
            conversion_probability: converted as f64 / total_f,
            abandonment_probability: abandoned as f64 / total_f,
            confidence: total_f / (total_f + CONFIDENCE_PRIOR),
            sample_size: total,
        }
    }

    /// Most frequent paths for one outcome, optionally scoped to a tenant
    pub fn top_paths(&self, tenant_id: Option<&str>, outcome: SessionOutcome, limit: usize) -> Vec<PathCount> {
        let mut merged: HashMap<String, u64> = HashMap::new();
        for entry in self.counters(outcome).iter() {
            let (tenant, path) = entry.key();
            if tenant_id.map_or(true, |t| t == tenant) {
                *merged.entry(path.clone()).or_insert(0) += *entry.value();
            }
        }

        let mut paths: Vec<_> = merged
            .into_iter()
            .map(|(path, count)| PathCount { path, count })
            .collect();
        paths.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.path.cmp(&b.path)));
        paths.truncate(limit);
        paths
    }

    fn total(&self, tenant_id: &str, outcome: SessionOutcome) -> u64 {
        self.counters(outcome)
            .iter()
            .filter(|e| e.key().0 == tenant_id)
            .map(|e| *e.value())
            .sum()
    }

    pub fn tenant_insights(&self, tenant_id: &str, limit: usize) -> TenantInsights {
        let converted = self.total(tenant_id, SessionOutcome::Converted);
        let abandoned = self.total(tenant_id, SessionOutcome::Abandoned);
        let learned = converted + abandoned;

        TenantInsights {
            tenant_id: tenant_id.to_string(),
            learned_sessions: learned,
            conversion_rate: if learned == 0 {
                0.0
            } else {
                converted as f64 / learned as f64
            },
            top_conversion_paths: self.top_paths(Some(tenant_id), SessionOutcome::Converted, limit),
            top_abandonment_paths: self.top_paths(Some(tenant_id), SessionOutcome::Abandoned, limit),
        }
    }
}
