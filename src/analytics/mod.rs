//! Read-only analytics over persisted research.
//!
//! Every call goes straight to the store's views; nothing is cached, so two
//! calls with no write in between return identical data.

use crate::db::{ComparisonSummary, HistoryEntry, ModelPerformance, ResearchStore, StageAverage};
use crate::types::{HistoryFilter, ModelKind, ResearchResult, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

/// Runs listed in a model's detail view.
pub const RECENT_RUNS: u32 = 5;

/// Score a run from 0 to 100.
///
/// Failed runs score 0. Otherwise ten points per source plus one point per
/// ten words (integer division), capped at 100.
pub fn quality_score(sources_found: u32, word_count: u32, success: bool) -> u32 {
    if !success {
        return 0;
    }
    sources_found
        .saturating_mul(10)
        .saturating_add(word_count / 10)
        .min(100)
}

/// A history row with its quality score attached.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct ScoredHistoryEntry {
    #[serde(flatten)]
    pub entry: HistoryEntry,
    pub quality_score: u32,
}

impl From<HistoryEntry> for ScoredHistoryEntry {
    fn from(entry: HistoryEntry) -> Self {
        let quality_score = quality_score(entry.sources_found, entry.word_count, entry.success);
        Self {
            entry,
            quality_score,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct RecentRun {
    pub research_id: String,
    pub session_id: String,
    pub duration: f64,
    pub success: bool,
    pub sources_found: u32,
    pub word_count: u32,
    pub quality_score: u32,
    pub created_at: DateTime<Utc>,
}

impl From<ResearchResult> for RecentRun {
    fn from(result: ResearchResult) -> Self {
        Self {
            quality_score: quality_score(result.sources_found, result.word_count, result.success),
            research_id: result.research_id,
            session_id: result.session_id,
            duration: result.duration,
            success: result.success,
            sources_found: result.sources_found,
            word_count: result.word_count,
            created_at: result.created_at,
        }
    }
}

/// Everything known about one model.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct ModelDetail {
    pub model: ModelKind,
    pub provider: String,
    /// Absent when the model has never run
    pub summary: Option<ModelPerformance>,
    pub stage_averages: Vec<StageAverage>,
    pub recent_runs: Vec<RecentRun>,
}

/// Derived views over a [`ResearchStore`].
#[derive(Clone)]
pub struct AnalyticsEngine {
    store: Arc<dyn ResearchStore>,
}

impl AnalyticsEngine {
    pub fn new(store: Arc<dyn ResearchStore>) -> Self {
        Self { store }
    }

    /// Per-model aggregates. Models without results are absent.
    pub async fn model_performance(&self) -> Result<Vec<ModelPerformance>> {
        self.store.model_performance().await
    }

    pub async fn comparison_history(&self, filter: &HistoryFilter) -> Result<Vec<ComparisonSummary>> {
        self.store
            .comparison_history(filter.limit(), filter.offset())
            .await
    }

    pub async fn research_history(&self, filter: &HistoryFilter) -> Result<Vec<ScoredHistoryEntry>> {
        let rows = self.store.research_history(filter, false).await?;
        Ok(rows.into_iter().map(ScoredHistoryEntry::from).collect())
    }

    pub async fn individual_research_history(
        &self,
        filter: &HistoryFilter,
    ) -> Result<Vec<ScoredHistoryEntry>> {
        let rows = self.store.research_history(filter, true).await?;
        Ok(rows.into_iter().map(ScoredHistoryEntry::from).collect())
    }

    pub async fn model_detail(&self, model: ModelKind) -> Result<ModelDetail> {
        let summary = self
            .store
            .model_performance()
            .await?
            .into_iter()
            .find(|row| row.model == model);
        let stage_averages = self.store.stage_averages(model).await?;
        let recent_runs = self
            .store
            .recent_results(model, RECENT_RUNS)
            .await?
            .into_iter()
            .map(RecentRun::from)
            .collect();

        Ok(ModelDetail {
            model,
            provider: model.provider_name().to_string(),
            summary,
            stage_averages,
            recent_runs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(7, 250, true, 95)]
    #[case(4, 600, true, 100)]
    #[case(0, 0, true, 0)]
    #[case(12, 0, true, 100)]
    #[case(0, 999, true, 99)]
    #[case(7, 250, false, 0)]
    #[case(u32::MAX, u32::MAX, true, 100)]
    fn test_quality_score(
        #[case] sources: u32,
        #[case] words: u32,
        #[case] success: bool,
        #[case] expected: u32,
    ) {
        assert_eq!(quality_score(sources, words, success), expected);
    }
}
