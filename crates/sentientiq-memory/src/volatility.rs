//! Emotional Volatility Index (EVI)
//!
//! For every recently active session the tracker keeps the mean absolute
//! confidence change between consecutive diagnoses. EVI is the standard
//! deviation of those per-session means across the window, doubled and
//! clamped to [0, 100].
//!
//! Each snapshot also carries a launch signal with its confidence, the hours
//! until the index is expected back under the GO threshold, and the risk and
//! opportunity factors read off the window's emotion mix.

use dashmap::DashMap;
use parking_lot::RwLock;
use sentientiq_behavior::emotions::{self, is_in};
use sentientiq_common::EmotionDiagnosis;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

const EVI_SCALE: f64 = 2.0;
const GO_BELOW: f64 = 30.0;
const WAIT_BELOW: f64 = 70.0;

/// Forecast horizon for the stability estimate
const MAX_FORECAST_HOURS: u32 = 72;
/// EVI change between snapshots treated as a trend
const TREND_STEP: f64 = 10.0;
/// Per-session mean confidence delta counted as a swing
const SWING_DELTA: f64 = 30.0;

const MAX_RISK_FACTORS: usize = 5;
const MAX_OPPORTUNITY_FACTORS: usize = 3;

const EXTRA_NEGATIVE: &[&str] = &["abandonment_intent", "exit_risk", "cart_abandonment"];

#[derive(Debug, Clone)]
pub struct VolatilityConfig {
    /// Sessions idle longer than this drop out of the window (ms)
    pub window_ms: i64,
    /// Sessions needed before the population counts as a full sample
    pub min_sessions: usize,
    /// Hourly multiplier applied to EVI by the stability forecast
    pub stability_decay_rate: f64,
}

impl Default for VolatilityConfig {
    fn default() -> Self {
        Self {
            window_ms: 15 * 60 * 1000,
            min_sessions: 10,
            stability_decay_rate: 0.9,
        }
    }
}

/// Launch signal derived from the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EviSignal {
    Go,
    Wait,
    Abort,
}

impl EviSignal {
    pub fn from_evi(evi: f64) -> Self {
        if evi < GO_BELOW {
            EviSignal::Go
        } else if evi < WAIT_BELOW {
            EviSignal::Wait
        } else {
            EviSignal::Abort
        }
    }

    /// How firmly `evi` sits inside this signal's band, in [0, 1]
    pub fn confidence(self, evi: f64) -> f64 {
        let raw = match self {
            EviSignal::Go => 1.0 - evi / GO_BELOW,
            EviSignal::Wait => 0.5 + (WAIT_BELOW - evi) / 40.0,
            EviSignal::Abort => evi / 100.0,
        };
        (raw.clamp(0.0, 1.0) * 1000.0).round() / 1000.0
    }
}

/// Hours of geometric decay until EVI drops under the GO threshold
pub fn predict_stability_hours(evi: f64, decay_rate: f64) -> u32 {
    let mut projected = evi;
    let mut hours = 0;
    while projected >= GO_BELOW && hours < MAX_FORECAST_HOURS {
        projected *= decay_rate;
        hours += 1;
    }
    hours
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EviSnapshot {
    /// 0-100
    pub evi: f64,
    pub signal: EviSignal,
    /// 0-1
    pub confidence: f64,
    pub dominant_emotion: Option<String>,
    pub sample_size: usize,
    /// Mean of the per-session mean deltas
    pub mean_delta: f64,
    pub std_dev: f64,
    pub predicted_stability_hours: u32,
    pub risk_factors: Vec<String>,
    pub opportunity_factors: Vec<String>,
    pub computed_at: i64,
}

#[derive(Debug, Default)]
struct SessionVolatility {
    last_confidence: Option<u8>,
    delta_sum: f64,
    delta_count: u64,
    /// Server receipt time of the newest diagnosis
    last_seen: i64,
    emotions: HashMap<String, u64>,
}

impl SessionVolatility {
    fn mean_delta(&self) -> Option<f64> {
        (self.delta_count > 0).then(|| self.delta_sum / self.delta_count as f64)
    }
}

/// Emotion mix of the window
#[derive(Debug, Default)]
struct EmotionMix {
    counts: HashMap<String, u64>,
}

impl EmotionMix {
    fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    fn share(&self, matches: impl Fn(&str) -> bool) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let hits: u64 = self
            .counts
            .iter()
            .filter(|(emotion, _)| matches(emotion.as_str()))
            .map(|(_, count)| *count)
            .sum();
        hits as f64 / total as f64
    }

    fn dominant(&self) -> Option<String> {
        self.counts
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(emotion, _)| emotion.clone())
    }
}

fn is_negative(label: &str) -> bool {
    is_in(label, emotions::FRUSTRATION) || is_in(label, emotions::ANXIETY) || is_in(label, EXTRA_NEGATIVE)
}

fn is_positive(label: &str) -> bool {
    is_in(label, emotions::EXCITEMENT)
        || is_in(label, emotions::TRUST)
        || is_in(label, emotions::CLICK_EMOTIONS)
        || label == "purchase_intent"
}

pub struct VolatilityTracker {
    config: VolatilityConfig,
    sessions: DashMap<String, SessionVolatility>,
    latest: RwLock<Option<EviSnapshot>>,
}

impl VolatilityTracker {
    pub fn new(config: VolatilityConfig) -> Self {
        Self {
            config,
            sessions: DashMap::new(),
            latest: RwLock::new(None),
        }
    }

    /// Feed one recorded diagnosis received at server time `received_at`
    pub fn observe(&self, session_id: &str, diagnosis: &EmotionDiagnosis, received_at: i64) {
        let mut session = self.sessions.entry(session_id.to_string()).or_default();
        if let Some(previous) = session.last_confidence {
            session.delta_sum += (f64::from(diagnosis.confidence) - f64::from(previous)).abs();
            session.delta_count += 1;
        }
        session.last_confidence = Some(diagnosis.confidence);
        session.last_seen = session.last_seen.max(received_at);
        *session.emotions.entry(diagnosis.emotion.clone()).or_insert(0) += 1;
    }

    /// Recompute the index over the window ending at `now` and cache it
    pub fn compute(&self, now: i64) -> EviSnapshot {
        let cutoff = now - self.config.window_ms;
        let mut means = Vec::new();
        let mut mix = EmotionMix::default();

        for entry in self.sessions.iter() {
            let session = entry.value();
            if session.last_seen < cutoff {
                continue;
            }
            if let Some(mean) = session.mean_delta() {
                means.push(mean);
            }
            for (emotion, count) in &session.emotions {
                *mix.counts.entry(emotion.clone()).or_insert(0) += count;
            }
        }

        let (mean_delta, std_dev) = mean_and_std_dev(&means);
        let evi = evi_from_std_dev(std_dev);
        let signal = EviSignal::from_evi(evi);
        let previous_evi = self.latest.read().as_ref().map(|s| s.evi);
        let swinging = if means.is_empty() {
            0.0
        } else {
            means.iter().filter(|m| **m > SWING_DELTA).count() as f64 / means.len() as f64
        };

        let mut risk_factors = Vec::new();
        if mix.share(is_negative) > 0.6 {
            risk_factors.push("Dominant negative emotion (60%+)".to_string());
        }
        if mix.share(|e| e == "rage") > 0.1 {
            risk_factors.push("Rage in 10%+ of diagnoses".to_string());
        }
        if swinging > 0.3 {
            risk_factors.push("Erratic confidence swings in 30%+ of sessions".to_string());
        }
        if previous_evi.is_some_and(|p| evi - p >= TREND_STEP) {
            risk_factors.push("Volatility rising".to_string());
        }
        if !means.is_empty() && means.len() < self.config.min_sessions {
            risk_factors.push("Thin session sample".to_string());
        }
        risk_factors.truncate(MAX_RISK_FACTORS);

        let mut opportunity_factors = Vec::new();
        if mix.share(is_positive) > 0.7 {
            opportunity_factors.push("Positive emotion wave (70%+)".to_string());
        }
        if previous_evi.is_some_and(|p| p - evi >= TREND_STEP) {
            opportunity_factors.push("Volatility easing".to_string());
        }
        if signal == EviSignal::Go && means.len() >= self.config.min_sessions {
            opportunity_factors.push("Stable session population".to_string());
        }
        opportunity_factors.truncate(MAX_OPPORTUNITY_FACTORS);

        let snapshot = EviSnapshot {
            evi,
            signal,
            confidence: signal.confidence(evi),
            dominant_emotion: mix.dominant(),
            sample_size: means.len(),
            mean_delta,
            std_dev,
            predicted_stability_hours: predict_stability_hours(evi, self.config.stability_decay_rate),
            risk_factors,
            opportunity_factors,
            computed_at: now,
        };
        debug!(evi = snapshot.evi, sample_size = snapshot.sample_size, "EVI recomputed");
        *self.latest.write() = Some(snapshot.clone());
        snapshot
    }

    /// Last computed snapshot
    pub fn latest(&self) -> Option<EviSnapshot> {
        self.latest.read().clone()
    }

    /// Drop sessions that left the window; returns how many were removed
    pub fn prune(&self, now: i64) -> usize {
        let cutoff = now - self.config.window_ms;
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.last_seen >= cutoff);
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            info!(removed, "Pruned volatility window");
        }
        removed
    }

    pub fn forget(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }

    pub fn tracked_sessions(&self) -> usize {
        self.sessions.len()
    }
}

/// Population mean and standard deviation; zeros for fewer than two samples
pub fn mean_and_std_dev(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

pub fn evi_from_std_dev(std_dev: f64) -> f64 {
    if !std_dev.is_finite() {
        return 0.0;
    }
    (std_dev * EVI_SCALE).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diagnosis(emotion: &str, confidence: u8, timestamp: i64) -> EmotionDiagnosis {
        EmotionDiagnosis::new(emotion, confidence, "hover", timestamp)
    }

    /// Five steady sessions plus five that jump 40 -> 95 -> 95
    fn mixed(tracker: &VolatilityTracker, wild: &str) {
        for s in 0..5 {
            let id = format!("calm{s}");
            tracker.observe(&id, &diagnosis("reading", 65, 1_000), 1_000);
            tracker.observe(&id, &diagnosis("reading", 65, 2_000), 2_000);
        }
        for s in 0..5 {
            let id = format!("wild{s}");
            tracker.observe(&id, &diagnosis("scanning", 40, 1_000), 1_000);
            tracker.observe(&id, &diagnosis(wild, 95, 2_000), 2_000);
            tracker.observe(&id, &diagnosis(wild, 95, 2_500), 2_500);
        }
    }

    #[test]
    fn test_signal_thresholds() {
        assert_eq!(EviSignal::from_evi(0.0), EviSignal::Go);
        assert_eq!(EviSignal::from_evi(29.9), EviSignal::Go);
        assert_eq!(EviSignal::from_evi(30.0), EviSignal::Wait);
        assert_eq!(EviSignal::from_evi(70.0), EviSignal::Abort);
    }

    #[test]
    fn test_signal_confidence() {
        assert_eq!(EviSignal::Go.confidence(0.0), 1.0);
        assert_eq!(EviSignal::Go.confidence(15.0), 0.5);
        assert_eq!(EviSignal::Wait.confidence(60.0), 0.75);
        assert_eq!(EviSignal::Wait.confidence(50.0), 1.0);
        // 0.5 + 40 / 40 saturates
        assert_eq!(EviSignal::Wait.confidence(30.0), 1.0);
        assert_eq!(EviSignal::Abort.confidence(80.0), 0.8);
        assert_eq!(EviSignal::Abort.confidence(100.0), 1.0);
    }

    #[test]
    fn test_stability_forecast() {
        assert_eq!(predict_stability_hours(20.0, 0.9), 0);
        // 50 -> 45 -> 40.5 -> 36.45 -> 32.8 -> 29.5
        assert_eq!(predict_stability_hours(50.0, 0.9), 5);
        assert_eq!(predict_stability_hours(100.0, 0.9), 12);
        assert_eq!(predict_stability_hours(80.0, 1.0), MAX_FORECAST_HOURS);
    }

    #[test]
    fn test_calm_sessions_low_evi() {
        let tracker = VolatilityTracker::new(VolatilityConfig::default());
        for s in 0..10 {
            let id = format!("s{s}");
            tracker.observe(&id, &diagnosis("reading", 65, 1_000), 1_000);
            tracker.observe(&id, &diagnosis("deep_reading", 75, 2_000), 2_000);
        }

        let snapshot = tracker.compute(3_000);
        assert_eq!(snapshot.sample_size, 10);
        assert_eq!(snapshot.evi, 0.0);
        assert_eq!(snapshot.signal, EviSignal::Go);
        assert_eq!(snapshot.confidence, 1.0);
        assert_eq!(snapshot.predicted_stability_hours, 0);
        assert!(snapshot.risk_factors.is_empty());
        assert_eq!(
            snapshot.opportunity_factors,
            vec!["Positive emotion wave (70%+)", "Stable session population"]
        );
        assert_eq!(tracker.latest(), Some(snapshot));
    }

    #[test]
    fn test_mixed_sessions_raise_evi() {
        let tracker = VolatilityTracker::new(VolatilityConfig::default());
        mixed(&tracker, "rage");

        // calm means 0, wild means 27.5 => std dev 13.75 => EVI 27.5
        let snapshot = tracker.compute(3_000);
        assert!((snapshot.evi - 27.5).abs() < 1e-9);
        assert_eq!(snapshot.dominant_emotion.as_deref(), Some("rage"));
        assert_eq!(snapshot.confidence, 0.083);
        assert!(snapshot.risk_factors.contains(&"Rage in 10%+ of diagnoses".to_string()));
    }

    #[test]
    fn test_trend_factors() {
        let tracker = VolatilityTracker::new(VolatilityConfig::default());
        assert_eq!(tracker.compute(0).evi, 0.0);

        mixed(&tracker, "delight");
        let rising = tracker.compute(3_000);
        assert!(rising.risk_factors.contains(&"Volatility rising".to_string()));

        for s in 0..5 {
            tracker.forget(&format!("wild{s}"));
        }
        let easing = tracker.compute(3_000);
        assert_eq!(easing.evi, 0.0);
        assert!(easing.opportunity_factors.contains(&"Volatility easing".to_string()));
        assert!(easing.risk_factors.contains(&"Thin session sample".to_string()));
    }

    #[test]
    fn test_window_excludes_idle_sessions() {
        let tracker = VolatilityTracker::new(VolatilityConfig {
            window_ms: 1_000,
            min_sessions: 1,
            ..VolatilityConfig::default()
        });
        tracker.observe("old", &diagnosis("rage", 95, 0), 0);
        tracker.observe("old", &diagnosis("reading", 10, 100), 100);

        assert_eq!(tracker.compute(5_000).sample_size, 0);
        assert_eq!(tracker.prune(5_000), 1);
        assert_eq!(tracker.tracked_sessions(), 0);
    }

    #[test]
    fn test_window_uses_receipt_time() {
        let tracker = VolatilityTracker::new(VolatilityConfig {
            window_ms: 60_000,
            ..VolatilityConfig::default()
        });
        let now = 1_700_000_000_000;
        // relative client clock
        tracker.observe("relative", &diagnosis("rage", 95, 0), now);
        tracker.observe("relative", &diagnosis("reading", 10, 500), now + 500);
        // client clock a day ahead
        tracker.observe("ahead", &diagnosis("rage", 95, now + 86_400_000), now);
        tracker.observe("ahead", &diagnosis("reading", 10, now + 86_400_500), now + 500);

        assert_eq!(tracker.prune(now + 1_000), 0);
        assert_eq!(tracker.compute(now + 1_000).sample_size, 2);

        assert_eq!(tracker.prune(now + 120_000), 2);
        assert_eq!(tracker.tracked_sessions(), 0);
    }

    #[test]
    fn test_evi_clamped() {
        assert_eq!(evi_from_std_dev(80.0), 100.0);
        assert_eq!(evi_from_std_dev(f64::NAN), 0.0);
        assert_eq!(mean_and_std_dev(&[]), (0.0, 0.0));
    }
}
