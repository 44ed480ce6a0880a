use chrono::{DateTime, Utc};
use log::info;

use crate::models::stats_models::{
    BlockingStats, PipelineResult, PipelineStats, ScoringStats, VerificationStats,
};

/// Empty result for a new run; every stage fills in its own section.
pub fn create_initial_pipeline_result(
    run_id: &str,
    started_at: DateTime<Utc>,
    scorer_name: &str,
    linkedin_records: usize,
    crm_records: usize,
) -> PipelineResult {
    info!("Created initial pipeline result with ID: {}", run_id);

    PipelineResult {
        run_id: run_id.to_string(),
        started_at,
        scorer: scorer_name.to_string(),
        stats: PipelineStats {
            total_linkedin_records: linkedin_records,
            total_crm_records: crm_records,
            potential_comparisons: linkedin_records as u64 * crm_records as u64,
            reduction_factor: 1.0,
            ..Default::default()
        },
        blocking: BlockingStats::default(),
        scoring: ScoringStats {
            strategy: scorer_name.to_string(),
            ..Default::default()
        },
        verification: VerificationStats::default(),
        high_confidence_matches: Vec::new(),
        medium_confidence_matches: Vec::new(),
        low_confidence_matches: Vec::new(),
        failed_verifications: Vec::new(),
    }
}
