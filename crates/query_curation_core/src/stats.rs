//! crates/query_curation_core/src/stats.rs
//!
//! Per-engine aggregation over a user's query items: how many queries and
//! answers each engine produced, with character and completion-token totals.

use std::collections::HashMap;

use serde::Serialize;

use crate::domain::{QueryItem, QuerySource};

/// Totals attributed to one generation engine.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EngineStats {
    pub engine: String,
    pub query_count: usize,
    pub answer_count: usize,
    pub total_query_chars: usize,
    pub total_answer_chars: usize,
    pub total_query_tokens: u64,
    pub total_answer_tokens: u64,
}

/// Dataset-wide counters shown next to the per-engine breakdown.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatsTotals {
    pub generated_queries: usize,
    pub answered_queries: usize,
    pub manual_queries: usize,
    pub total_chars: usize,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatsReport {
    pub engines: Vec<EngineStats>,
    pub totals: StatsTotals,
}

/// Builds the engine breakdown. A generated query counts toward its engine's
/// query side; any item with an answer and an engine counts toward the answer
/// side. Engines sort by combined activity, busiest first.
pub fn engine_stats(queries: &[QueryItem]) -> StatsReport {
    let mut by_engine: HashMap<String, EngineStats> = HashMap::new();

    for q in queries {
        if let Some(engine) = &q.ai_engine {
            if q.source == QuerySource::Generated {
                let entry = by_engine.entry(engine.clone()).or_default();
                entry.query_count += 1;
                entry.total_query_chars += q.query_length.unwrap_or(q.text.chars().count());
                entry.total_query_tokens +=
                    q.query_tokens.map(|u| u.completion_tokens as u64).unwrap_or(0);
            }
            if let Some(answer) = &q.answer {
                let entry = by_engine.entry(engine.clone()).or_default();
                entry.answer_count += 1;
                entry.total_answer_chars += q.answer_length.unwrap_or(answer.chars().count());
                entry.total_answer_tokens +=
                    q.answer_tokens.map(|u| u.completion_tokens as u64).unwrap_or(0);
            }
        }
    }

    let mut engines: Vec<EngineStats> = by_engine
        .into_iter()
        .map(|(engine, mut stats)| {
            stats.engine = engine;
            stats
        })
        .collect();
    engines.sort_by(|a, b| {
        (b.query_count + b.answer_count)
            .cmp(&(a.query_count + a.answer_count))
            .then_with(|| a.engine.cmp(&b.engine))
    });

    let totals = StatsTotals {
        generated_queries: queries
            .iter()
            .filter(|q| q.source == QuerySource::Generated)
            .count(),
        answered_queries: queries.iter().filter(|q| q.answer.is_some()).count(),
        manual_queries: queries
            .iter()
            .filter(|q| q.source == QuerySource::Manual)
            .count(),
        total_chars: engines
            .iter()
            .map(|e| e.total_query_chars + e.total_answer_chars)
            .sum(),
        total_tokens: engines
            .iter()
            .map(|e| e.total_query_tokens + e.total_answer_tokens)
            .sum(),
    };

    StatsReport { engines, totals }
}
