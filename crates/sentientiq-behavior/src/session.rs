//! Session store
//!
//! One [`SessionContext`] per session id, created lazily and evicted after an
//! hour of inactivity. Each context sits behind its own async mutex, so a batch
//! holds its session for the whole pipeline while other sessions proceed.

use dashmap::DashMap;
use sentientiq_common::{EmotionDiagnosis, EmotionalVectors, MAX_SESSION_HISTORY, SESSION_TTL_MS};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::emotions::{self, ANXIETY, EXCITEMENT, FRUSTRATION, TRUST, URGENCY};

/// Diagnoses considered by the vector derivation
const VECTOR_WINDOW: usize = 10;
/// Entries within this many of the newest count at full weight
const VECTOR_RECENT: usize = 5;
const VECTOR_SCALE: f64 = 0.4;

/// Session store configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Maximum diagnoses retained per session
    pub history_cap: usize,
    /// Inactivity before eviction (ms)
    pub ttl_ms: i64,
    /// Same-target clicks that make a rage click
    pub rage_click_threshold: usize,
    /// Window for the rage-click burst (ms)
    pub rage_click_window_ms: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_cap: MAX_SESSION_HISTORY,
            ttl_ms: SESSION_TTL_MS,
            rage_click_threshold: 3,
            rage_click_window_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone)]
struct ClickSample {
    target: String,
    at: i64,
}

/// Behavioral state of one visit
#[derive(Debug)]
pub struct SessionContext {
    pub session_id: String,
    pub tenant_id: String,
    first_event_at: Option<i64>,
    history: VecDeque<EmotionDiagnosis>,
    /// emotion -> last recorded diagnosis time
    cooldowns: HashMap<String, i64>,
    clicks: Vec<ClickSample>,
    page_url: Option<String>,
    config: SessionConfig,
}

impl SessionContext {
    pub fn new(session_id: impl Into<String>, tenant_id: impl Into<String>, config: SessionConfig) -> Self {
        Self {
            session_id: session_id.into(),
            tenant_id: tenant_id.into(),
            first_event_at: None,
            history: VecDeque::with_capacity(config.history_cap),
            cooldowns: HashMap::new(),
            clicks: Vec::new(),
            page_url: None,
            config,
        }
    }

    /// Pin the session start to the first event seen
    pub fn observe(&mut self, event_time: i64) {
        if self.first_event_at.is_none() {
            self.first_event_at = Some(event_time);
        }
    }

    pub fn first_event_at(&self) -> Option<i64> {
        self.first_event_at
    }

    /// Milliseconds since the first event (0 before any event)
    pub fn session_age(&self, at: i64) -> i64 {
        self.first_event_at
            .map(|start| (at - start).max(0))
            .unwrap_or(0)
    }

    pub fn page_url(&self) -> Option<&str> {
        self.page_url.as_deref()
    }

    pub fn set_page_url(&mut self, url: impl Into<String>) {
        self.page_url = Some(url.into());
    }

    pub fn history(&self) -> &VecDeque<EmotionDiagnosis> {
        &self.history
    }

    pub fn last_diagnosis(&self) -> Option<&EmotionDiagnosis> {
        self.history.back()
    }

    /// Emotion labels of the newest `n` diagnoses, oldest first
    pub fn recent_labels(&self, n: usize) -> Vec<String> {
        let skip = self.history.len().saturating_sub(n);
        self.history
            .iter()
            .skip(skip)
            .map(|d| d.emotion.clone())
            .collect()
    }

    /// Whether `emotion` was recorded within its cooldown before `at`
    pub fn is_cooling_down(&self, emotion: &str, at: i64) -> bool {
        self.cooldowns
            .get(emotion)
            .map(|last| at - last <= emotions::cooldown_ms(emotion))
            .unwrap_or(false)
    }

    /// Record a diagnosis unless its emotion is cooling down
    pub fn try_record(&mut self, diagnosis: EmotionDiagnosis) -> bool {
        if self.is_cooling_down(&diagnosis.emotion, diagnosis.timestamp) {
            debug!(
                session_id = %self.session_id,
                emotion = %diagnosis.emotion,
                "Diagnosis suppressed by cooldown"
            );
            return false;
        }
        self.cooldowns
            .insert(diagnosis.emotion.clone(), diagnosis.timestamp);
        self.append(diagnosis);
        true
    }

    /// Append without a cooldown check, trimming to the history cap
    pub fn append(&mut self, diagnosis: EmotionDiagnosis) {
        self.history.push_back(diagnosis);
        while self.history.len() > self.config.history_cap {
            self.history.pop_front();
        }
    }

    /// Track a click; returns true when it completes a rage-click burst
    ///
    /// A completed burst clears the buffer, so further clicks need a fresh burst.
    pub fn register_click(&mut self, target: Option<&str>, at: i64) -> bool {
        let target = target.unwrap_or("").to_string();
        let window = self.config.rage_click_window_ms;
        self.clicks
            .retain(|c| at >= c.at && at - c.at <= window);
        self.clicks.push(ClickSample {
            target: target.clone(),
            at,
        });

        let burst = self.clicks.iter().filter(|c| c.target == target).count();
        if burst >= self.config.rage_click_threshold {
            self.clicks.clear();
            return true;
        }
        false
    }

    /// Weighted category scores over the last diagnoses, each clamped to [0, 100]
    pub fn derive_vectors(&self) -> EmotionalVectors {
        let len = self.history.len();
        let window = self.history.iter().skip(len.saturating_sub(VECTOR_WINDOW));
        let mut vectors = EmotionalVectors::default();

        for (idx, diagnosis) in window.enumerate() {
            let age_rank = len.min(VECTOR_WINDOW) - idx;
            let weight = if age_rank <= VECTOR_RECENT { 1.0 } else { 0.5 };
            let score = weight * f64::from(diagnosis.confidence) * VECTOR_SCALE;
            let label = diagnosis.emotion.as_str();

            if emotions::is_in(label, FRUSTRATION) {
                vectors.frustration += score;
            }
            if emotions::is_in(label, ANXIETY) {
                vectors.anxiety += score;
            }
            if emotions::is_in(label, URGENCY) {
                vectors.urgency += score;
            }
            if emotions::is_in(label, EXCITEMENT) {
                vectors.excitement += score;
            }
            if emotions::is_in(label, TRUST) {
                vectors.trust += score;
            }
        }

        vectors.clamped()
    }
}

/// Store entry: the locked context plus a lock-free activity stamp for sweeping
#[derive(Debug)]
pub struct SessionHandle {
    last_activity: AtomicI64,
    context: Mutex<SessionContext>,
}

impl SessionHandle {
    pub fn touch(&self, at: i64) {
        self.last_activity.fetch_max(at, Ordering::Relaxed);
    }

    pub fn last_activity(&self) -> i64 {
        self.last_activity.load(Ordering::Relaxed)
    }

    /// Lock the session for one processing cycle
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, SessionContext> {
        self.context.lock().await
    }
}

/// Concurrent session registry
pub struct SessionStore {
    sessions: DashMap<String, Arc<SessionHandle>>,
    config: SessionConfig,
}

impl SessionStore {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Fetch a session, creating it on first sight
    pub fn get_or_create(&self, session_id: &str, tenant_id: &str, now: i64) -> Arc<SessionHandle> {
        let handle = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                debug!(session_id, tenant_id, "Creating session");
                Arc::new(SessionHandle {
                    last_activity: AtomicI64::new(now),
                    context: Mutex::new(SessionContext::new(
                        session_id,
                        tenant_id,
                        self.config.clone(),
                    )),
                })
            })
            .clone();
        handle.touch(now);
        handle
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<SessionHandle>> {
        self.sessions.get(session_id).map(|h| h.clone())
    }

    /// Append a diagnosis to an existing session, honoring cooldowns
    pub async fn append(&self, session_id: &str, diagnosis: EmotionDiagnosis) -> bool {
        let Some(handle) = self.get(session_id) else {
            return false;
        };
        handle.touch(diagnosis.timestamp);
        let mut session = handle.lock().await;
        session.try_record(diagnosis)
    }

    pub async fn derive_vectors(&self, session_id: &str) -> Option<EmotionalVectors> {
        let handle = self.get(session_id)?;
        let session = handle.lock().await;
        Some(session.derive_vectors())
    }

    /// Evict sessions idle since before `now - ttl`; returns evicted ids
    pub fn sweep(&self, now: i64) -> Vec<String> {
        let cutoff = now - self.config.ttl_ms;
        let mut evicted = Vec::new();
        self.sessions.retain(|id, handle| {
            let keep = handle.last_activity() >= cutoff;
            if !keep {
                evicted.push(id.clone());
            }
            keep
        });
        if !evicted.is_empty() {
            info!(evicted = evicted.len(), remaining = self.sessions.len(), "Swept idle sessions");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
