// src/models/stats_models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::matching::MatchOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Blocking,
    Scoring,
    Verification,
    Merge,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Blocking => "blocking",
            PipelineStage::Scoring => "scoring",
            PipelineStage::Verification => "verification",
            PipelineStage::Merge => "merge",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    Pending,
    Completed,
    Skipped(String),
    Failed(String),
}

impl StageStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, StageStatus::Failed(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyKindStats {
    pub buckets: usize,
    pub cross_source_buckets: usize,
    pub pairs_emitted: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockingStats {
    pub linkedin_records: usize,
    pub crm_records: usize,
    pub skipped_linkedin_records: usize,
    pub skipped_crm_records: usize,
    pub potential_comparisons: u64,
    pub candidate_pairs: usize,
    pub reduction_factor: f64,
    pub keys: BTreeMap<String, KeyKindStats>,
    pub elapsed_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopMatchSummary {
    pub linkedin_name: Option<String>,
    pub crm_name: Option<String>,
    pub score: f64,
    pub primary_key: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkageDiagnostics {
    pub positive_examples: usize,
    pub negative_examples: usize,
    pub training_skipped: bool,
    pub threshold: f64,
    pub clusters: usize,
    pub cross_source_clusters: usize,
    pub weights: Vec<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoringStats {
    pub strategy: String,
    pub status: StageStatus,
    pub scored_pairs: usize,
    pub high_tier: usize,
    pub medium_tier: usize,
    pub low_tier: usize,
    pub mean_score: f64,
    pub top_matches: Vec<TopMatchSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkage: Option<LinkageDiagnostics>,
    pub elapsed_secs: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerificationStats {
    pub status: StageStatus,
    pub eligible_pairs: usize,
    pub dispatched: usize,
    pub completed: usize,
    pub cache_hits: usize,
    pub confirmations: usize,
    pub rejections: usize,
    pub errors: usize,
    pub skipped_due_to_cap: usize,
    pub skipped_cancelled: usize,
    pub skipped_no_verifier: usize,
    pub cancelled: bool,
    pub timed_out: bool,
    pub elapsed_secs: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineStats {
    pub stages_completed: Vec<String>,
    pub total_linkedin_records: usize,
    pub total_crm_records: usize,
    pub potential_comparisons: u64,
    pub candidate_pairs: usize,
    pub reduction_factor: f64,
    pub high_confidence_total: usize,
    pub medium_confidence_total: usize,
    pub low_confidence_total: usize,
    pub low_confidence_reported: usize,
    pub failed_verification_total: usize,
    pub total_runtime_seconds: f64,
    pub ai_runtime_seconds: f64,
}

/// Everything one pipeline run produced. Built up stage by stage, then handed back by value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub scorer: String,
    pub stats: PipelineStats,
    pub blocking: BlockingStats,
    pub scoring: ScoringStats,
    pub verification: VerificationStats,
    pub high_confidence_matches: Vec<MatchOutcome>,
    pub medium_confidence_matches: Vec<MatchOutcome>,
    pub low_confidence_matches: Vec<MatchOutcome>,
    pub failed_verifications: Vec<MatchOutcome>,
}

impl PipelineResult {
    pub fn is_empty(&self) -> bool {
        self.high_confidence_matches.is_empty()
            && self.medium_confidence_matches.is_empty()
            && self.low_confidence_matches.is_empty()
            && self.failed_verifications.is_empty()
    }

    pub fn mark_stage_completed(&mut self, stage: PipelineStage) {
        self.stats.stages_completed.push(stage.as_str().to_string());
    }

    /// Highest-ranked matches from the high-confidence bucket.
    pub fn top_matches(&self, limit: usize) -> Vec<&MatchOutcome> {
        let mut matches: Vec<&MatchOutcome> = self.high_confidence_matches.iter().collect();
        matches.sort_by(|a, b| {
            b.effective_confidence()
                .total_cmp(&a.effective_confidence())
                .then_with(|| a.linkedin_idx().cmp(&b.linkedin_idx()))
                .then_with(|| a.crm_idx().cmp(&b.crm_idx()))
        });
        matches.truncate(limit);
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_status_defaults_to_pending() {
        assert_eq!(StageStatus::default(), StageStatus::Pending);
        assert_eq!(VerificationStats::default().status, StageStatus::Pending);
        assert_eq!(ScoringStats::default().status, StageStatus::Pending);
    }

    #[test]
    fn test_stage_status_serialized_shape() {
        let skipped = serde_json::to_value(StageStatus::Skipped("no candidate pairs".to_string())).unwrap();
        assert_eq!(skipped, serde_json::json!({"state": "skipped", "reason": "no candidate pairs"}));
        let pending = serde_json::to_value(StageStatus::Pending).unwrap();
        assert_eq!(pending, serde_json::json!({"state": "pending"}));
    }
}
