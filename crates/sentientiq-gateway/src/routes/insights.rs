//! Read-only query surface

use axum::{
    extract::{Path, State},
    Json,
};
use rust_decimal::Decimal;
use sentientiq_common::{now_millis, SessionOutcome};
use sentientiq_intervention::AllocationStrategy;
use sentientiq_memory::{EviSnapshot, PathCount, TenantInsights};
use serde::Serialize;

use crate::state::AppState;

const TOP_PATHS: usize = 10;

#[derive(Debug, Serialize)]
pub struct MarketInsights {
    pub evi: EviSnapshot,
    pub active_sessions: usize,
    pub tracked_sessions: usize,
    pub top_conversion_paths: Vec<PathCount>,
    pub top_abandonment_paths: Vec<PathCount>,
}

pub async fn market_insights(State(state): State<AppState>) -> Json<MarketInsights> {
    let pipeline = &state.pipeline;
    // on demand between periodic recomputes
    let evi = pipeline.volatility.compute(now_millis());

    Json(MarketInsights {
        evi,
        active_sessions: pipeline.sessions.len(),
        tracked_sessions: pipeline.volatility.tracked_sessions(),
        top_conversion_paths: pipeline
            .memory
            .top_paths(None, SessionOutcome::Converted, TOP_PATHS),
        top_abandonment_paths: pipeline
            .memory
            .top_paths(None, SessionOutcome::Abandoned, TOP_PATHS),
    })
}

pub async fn tenant_patterns(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> Json<TenantInsights> {
    Json(state.pipeline.memory.tenant_insights(&tenant_id, TOP_PATHS))
}

#[derive(Debug, Serialize)]
pub struct InterventionMetrics {
    pub intervention_type: String,
    pub executed: u64,
    pub succeeded: u64,
    pub shown: u64,
    pub clicked: u64,
    pub dismissed: u64,
    pub click_through_rate: f64,
    pub revenue_impact: Decimal,
}

#[derive(Debug, Serialize)]
pub struct VariantMetrics {
    pub variant_id: String,
    pub shown: u64,
    pub converted: u64,
    pub conversion_rate: f64,
}

#[derive(Debug, Serialize)]
pub struct ExperimentMetrics {
    pub rule_id: String,
    pub allocation: AllocationStrategy,
    pub variants: Vec<VariantMetrics>,
}

#[derive(Debug, Serialize)]
pub struct EffectivenessReport {
    pub interventions: Vec<InterventionMetrics>,
    pub experiments: Vec<ExperimentMetrics>,
    pub total_revenue_impact: Decimal,
}

pub async fn intervention_effectiveness(State(state): State<AppState>) -> Json<EffectivenessReport> {
    let engine = &state.pipeline.engine;

    let interventions: Vec<_> = engine
        .effectiveness()
        .into_iter()
        .map(|(intervention_type, stats)| InterventionMetrics {
            click_through_rate: stats.click_through_rate(),
            intervention_type,
            executed: stats.executed,
            succeeded: stats.succeeded,
            shown: stats.shown,
            clicked: stats.clicked,
            dismissed: stats.dismissed,
            revenue_impact: stats.revenue_impact,
        })
        .collect();

    let experiments = engine
        .catalog()
        .all()
        .into_iter()
        .filter(|rule| rule.is_ab_test())
        .map(|rule| {
            let stats = engine.allocator().rule_stats(&rule.id);
            let variants = rule
                .variants
                .iter()
                .map(|variant| {
                    let s = stats
                        .iter()
                        .find(|(id, _)| id == &variant.id)
                        .map(|(_, s)| *s)
                        .unwrap_or_default();
                    VariantMetrics {
                        variant_id: variant.id.clone(),
                        shown: s.shown,
                        converted: s.converted,
                        conversion_rate: s.conversion_rate(),
                    }
                })
                .collect();
            ExperimentMetrics {
                rule_id: rule.id,
                allocation: rule.allocation,
                variants,
            }
        })
        .collect();

    Json(EffectivenessReport {
        total_revenue_impact: interventions.iter().map(|i| i.revenue_impact).sum(),
        interventions,
        experiments,
    })
}
