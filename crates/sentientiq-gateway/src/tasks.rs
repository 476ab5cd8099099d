//! Periodic background tasks
//!
//! Session eviction and EVI recomputation run on their own intervals, have no
//! ordering dependency on the request path, and stop when shutdown is signalled.

use sentientiq_common::now_millis;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::persistence::tables;
use crate::pipeline::Pipeline;

/// Evict idle sessions and drop their per-session state
pub fn sweep_sessions(pipeline: &Pipeline, now: i64) -> Vec<String> {
    let evicted = pipeline.sessions.sweep(now);
    for session_id in &evicted {
        pipeline.forget(session_id);
    }
    pipeline.engine.prune_daily(now);
    evicted
}

/// Recompute EVI, trim its window and persist the snapshot
pub fn refresh_volatility(pipeline: &Pipeline, now: i64) {
    let snapshot = pipeline.volatility.compute(now);
    pipeline.volatility.prune(now);
    debug!(evi = snapshot.evi, signal = ?snapshot.signal, "EVI refreshed");
    pipeline.writer.enqueue(tables::VOLATILITY_METRICS, &snapshot);
}

fn spawn_periodic<F>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut job: F,
) -> JoinHandle<()>
where
    F: FnMut() + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => job(),
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(task = name, "Periodic task stopping");
                        break;
                    }
                }
            }
        }
    })
}

/// Start the sweep and EVI tasks
pub fn spawn_background(
    pipeline: Pipeline,
    sweep_every: Duration,
    evi_every: Duration,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let sweeper = pipeline.clone();
    vec![
        spawn_periodic("session_sweep", sweep_every, shutdown.clone(), move || {
            sweep_sessions(&sweeper, now_millis());
        }),
        spawn_periodic("evi_refresh", evi_every, shutdown, move || {
            refresh_volatility(&pipeline, now_millis());
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::persistence::{InMemoryGateway, PersistenceWriter};
    use crate::state::AppState;
    use sentientiq_common::EmotionDiagnosis;
    use sentientiq_intervention::RuleCatalog;
    use std::sync::Arc;

    fn state(gateway: Arc<InMemoryGateway>) -> AppState {
        let (writer, _handle) = PersistenceWriter::spawn(gateway, 16);
        AppState::new(GatewayConfig::default(), RuleCatalog::with_defaults(), writer)
    }

    #[tokio::test]
    async fn test_sweep_forgets_evicted_sessions() {
        let state = state(Arc::new(InMemoryGateway::new()));
        let pipeline = &state.pipeline;
        pipeline.sessions.get_or_create("old", "t1", 0);
        pipeline.sessions.get_or_create("fresh", "t1", 10_000_000);
        pipeline
            .volatility
            .observe("old", &EmotionDiagnosis::new("rage", 90, "rage_click", 0), 0);

        let evicted = sweep_sessions(pipeline, 10_000_000);
        assert_eq!(evicted, vec!["old".to_string()]);
        assert_eq!(pipeline.sessions.len(), 1);
        assert_eq!(pipeline.volatility.tracked_sessions(), 0);
    }

    #[tokio::test]
    async fn test_refresh_persists_snapshot() {
        let gateway = Arc::new(InMemoryGateway::new());
        let state = state(gateway.clone());
        refresh_volatility(&state.pipeline, now_millis());
        assert!(state.pipeline.volatility.latest().is_some());

        tokio::time::sleep(Duration::from_millis(50)).await;
        let rows = gateway.records(tables::VOLATILITY_METRICS);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["signal"], "GO");
    }

    #[tokio::test(start_paused = true)]
    async fn test_tasks_stop_on_shutdown() {
        let state = state(Arc::new(InMemoryGateway::new()));
        let (tx, rx) = watch::channel(false);
        let handles = spawn_background(
            state.pipeline.clone(),
            Duration::from_secs(1),
            Duration::from_secs(1),
            rx,
        );

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(state.pipeline.volatility.latest().is_some());

        tx.send(true).unwrap();
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
