// src/utils/progress_bars/logging.rs - Logging helpers for the pipeline stages
use log::{debug, error, info, warn};
use std::time::{Duration, Instant};

use crate::models::stats_models::{PipelineResult, PipelineStage};
use crate::utils::pipeline_config::PipelineConfig;

#[derive(Clone)]
pub struct StageLogger {
    stage_name: &'static str,
    stage_emoji: &'static str,
    start_time: Instant,
}

fn stage_label(stage: PipelineStage) -> (&'static str, &'static str) {
    match stage {
        PipelineStage::Blocking => ("BLOCKING", "🧱"),
        PipelineStage::Scoring => ("SCORING", "📐"),
        PipelineStage::Verification => ("AI", "🤖"),
        PipelineStage::Merge => ("MERGE", "🔀"),
    }
}

impl StageLogger {
    pub fn new(stage: PipelineStage) -> Self {
        let (stage_name, stage_emoji) = stage_label(stage);
        Self {
            stage_name,
            stage_emoji,
            start_time: Instant::now(),
        }
    }

    pub fn log_start(&self, run_id: &str, details: &str) {
        info!(
            "[{}] {} 🚀 Starting {} stage (run ID: {}) - {}",
            self.stage_name,
            self.stage_emoji,
            self.stage_name.to_lowercase(),
            run_id,
            details
        );
    }

    pub fn log_data_loaded(&self, count: usize, data_type: &str) {
        info!(
            "[{}] {} 📊 Received {} {} records",
            self.stage_name, self.stage_emoji, count, data_type
        );
    }

    pub fn log_reduction(&self, potential: u64, candidates: usize, reduction_factor: f64) {
        info!(
            "[{}] {} 🎯 Comparison space: {} potential → {} candidates ({:.1}x reduction)",
            self.stage_name, self.stage_emoji, potential, candidates, reduction_factor
        );
    }

    pub fn log_tier_split(&self, high: usize, medium: usize, low: usize) {
        info!(
            "[{}] {} 📈 Tiers: {} high, {} medium, {} low",
            self.stage_name, self.stage_emoji, high, medium, low
        );
    }

    pub fn log_cache_results(&self, cache_hits: usize, cache_misses: usize) {
        let total = cache_hits + cache_misses;
        if total > 0 {
            let hit_rate = (cache_hits as f64 / total as f64) * 100.0;
            info!(
                "[{}] {} 💾 Cache results: {} hits, {} misses ({:.1}% hit rate)",
                self.stage_name, self.stage_emoji, cache_hits, cache_misses, hit_rate
            );
        }
    }

    pub fn log_completion(&self, summary: &str) {
        let duration = self.start_time.elapsed();
        info!(
            "[{}] {} 🎉 COMPLETED in {:.2?}: {}",
            self.stage_name, self.stage_emoji, duration, summary
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!("[{}] {} ⚠️  {}", self.stage_name, self.stage_emoji, message);
    }

    pub fn log_error(&self, message: &str) {
        error!("[{}] {} ❌ {}", self.stage_name, self.stage_emoji, message);
    }

    pub fn log_debug(&self, message: &str) {
        debug!("[{}] {} {}", self.stage_name, self.stage_emoji, message);
    }

    pub fn log_progress_update(&self, current: usize, total: usize, additional_info: Option<&str>) {
        // Every 10% for larger batches, plus the last item
        let should_log = current == total || (total >= 10 && current % (total / 10) == 0);

        if should_log && current > 0 {
            let percent = (current as f64 / total as f64) * 100.0;
            let msg = if let Some(info) = additional_info {
                format!("Progress: {}/{} ({:.1}%) - {}", current, total, percent, info)
            } else {
                format!("Progress: {}/{} ({:.1}%)", current, total, percent)
            };
            info!("[{}] {} 📊 {}", self.stage_name, self.stage_emoji, msg);
        }
    }

    pub fn log_data_quality_issue(&self, issue_type: &str, count: usize) {
        if count > 0 {
            warn!(
                "[{}] {} ⚠️  Data quality: {} instances of {}",
                self.stage_name, self.stage_emoji, count, issue_type
            );
        }
    }

    pub fn get_elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

// Pipeline-level logging functions
pub fn log_pipeline_start(run_id: &str, linkedin_count: usize, crm_count: usize, config: &PipelineConfig) {
    info!("🚀 ===== CONTACT DUPLICATE DETECTION STARTING =====");
    info!("📅 Pipeline Run ID: {}", run_id);
    info!("👥 Input: {} LinkedIn records, {} CRM records", linkedin_count, crm_count);
    config.log_config();
    info!("🎯 Stages: Blocking 🧱, Scoring 📐, AI verification 🤖, Merge 🔀");
    info!("================================================");
}

pub fn log_pipeline_phase(phase: &str, details: Option<&str>) {
    let msg = if let Some(details) = details {
        format!("🔄 Pipeline Phase: {} - {}", phase, details)
    } else {
        format!("🔄 Pipeline Phase: {}", phase)
    };
    info!("{}", msg);
}

pub fn log_pipeline_completion(result: &PipelineResult, duration: Duration) {
    let stats = &result.stats;
    info!("🎉 ===== CONTACT DUPLICATE DETECTION COMPLETED =====");
    info!("📅 Pipeline Run ID: {}", result.run_id);
    info!("⏱️  Total Duration: {:.2?}", duration);
    info!("🧩 Stages completed: {}", stats.stages_completed.join(" → "));
    info!(
        "🎯 Comparisons: {} potential → {} candidates ({:.1}x reduction)",
        stats.potential_comparisons, stats.candidate_pairs, stats.reduction_factor
    );
    info!("");
    info!("📈 Result Breakdown:");
    info!("   ✅ High confidence: {}", stats.high_confidence_total);
    info!("   🤔 Medium confidence: {}", stats.medium_confidence_total);
    info!(
        "   💤 Low confidence: {} ({} reported)",
        stats.low_confidence_total, stats.low_confidence_reported
    );
    if stats.failed_verification_total > 0 {
        warn!("   ⚠️  Failed verifications: {}", stats.failed_verification_total);
    }
    let verification = &result.verification;
    if verification.dispatched > 0 || verification.cache_hits > 0 {
        info!(
            "🤖 AI: {} calls, {} cache hits, {} confirmed, {} rejected, {} errors in {:.1}s",
            verification.dispatched,
            verification.cache_hits,
            verification.confirmations,
            verification.rejections,
            verification.errors,
            verification.elapsed_secs
        );
    }
    if verification.skipped_due_to_cap > 0 {
        warn!(
            "   ⚠️  {} medium-tier pairs were not verified (AI comparison cap reached)",
            verification.skipped_due_to_cap
        );
    }
    if verification.cancelled || verification.timed_out {
        warn!(
            "   ⚠️  Verification stopped early ({}), {} pairs not verified",
            if verification.timed_out { "run timeout" } else { "cancelled" },
            verification.skipped_cancelled
        );
    }
    info!("================================================");
}
