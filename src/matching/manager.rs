// src/matching/manager.rs - Coordinates blocking, scoring, AI verification and merge
use anyhow::Result;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::matching::blocking::BlockingEngine;
use crate::matching::scorer::{build_scorer, resolve_pair, SimilarityScorer};
use crate::matching::similarity::match_reasons;
use crate::matching::tiers::{partition, TieredPairs};
use crate::models::contact::ContactRecord;
use crate::models::matching::{
    sort_by_score, CandidatePair, DetectionMethod, MatchOutcome, ScoredPair, Verdict,
};
use crate::models::stats_models::{
    PipelineResult, PipelineStage, StageStatus, TopMatchSummary, VerificationStats,
};
use crate::utils::instantiate_run::create_initial_pipeline_result;
use crate::utils::pipeline_config::PipelineConfig;
use crate::utils::progress_bars::logging::{
    log_pipeline_completion, log_pipeline_phase, log_pipeline_start, StageLogger,
};
use crate::utils::progress_bars::progress_config::ProgressConfig;
use crate::verification::verifier::{AiVerifier, ContactComparator, VerdictSource, VerifiedPair};

const TOP_MATCHES_REPORTED: usize = 10;

/// A medium-tier pair after the verification stage. `None` means it was never dispatched.
type VerificationOutcome<'a> = (ScoredPair, &'a ContactRecord, &'a ContactRecord, Option<VerifiedPair>);

pub struct DuplicateDetectionPipeline {
    config: PipelineConfig,
    scorer: Box<dyn SimilarityScorer>,
    verifier: Option<AiVerifier>,
    progress: ProgressConfig,
    cancelled: Arc<AtomicBool>,
}

impl DuplicateDetectionPipeline {
    /// Rejects invalid configuration. Without a comparator the medium tier is
    /// reported as unverified.
    pub fn new(config: PipelineConfig, comparator: Option<Arc<dyn ContactComparator>>) -> Result<Self> {
        config.validate()?;
        let verifier = comparator.map(|comparator| {
            AiVerifier::new(
                comparator,
                config.verifier.comparison_timeout(),
                config.verifier.cache_size,
            )
        });
        Ok(Self {
            scorer: build_scorer(&config),
            config,
            verifier,
            progress: ProgressConfig::disabled(),
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn with_progress(mut self, progress: ProgressConfig) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Setting the flag stops new AI dispatches; calls already in flight finish.
    pub fn cancellation_handle(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Model calls made by this pipeline's verifier across all runs.
    pub fn ai_calls(&self) -> usize {
        self.verifier.as_ref().map(AiVerifier::calls).unwrap_or(0)
    }

    pub async fn run(&self, linkedin: &[ContactRecord], crm: &[ContactRecord]) -> PipelineResult {
        let run_start = Instant::now();
        let run_id = format!("run_{}", Uuid::new_v4());
        let deadline = self
            .config
            .run_timeout_secs
            .map(|secs| run_start + Duration::from_secs(secs));
        let mut result =
            create_initial_pipeline_result(&run_id, Utc::now(), self.scorer.name(), linkedin.len(), crm.len());
        log_pipeline_start(&run_id, linkedin.len(), crm.len(), &self.config);

        if linkedin.is_empty() && crm.is_empty() {
            warn!("Both inputs are empty; nothing to compare");
            result.scoring.status = StageStatus::Skipped("no input records".to_string());
            result.verification.status = StageStatus::Skipped("no input records".to_string());
            return self.finish(result, run_start);
        }

        // Stage 1: blocking
        log_pipeline_phase("Blocking", Some("generating candidate pairs"));
        let blocking = BlockingEngine::new(self.config.blocking.clone()).generate_candidates(linkedin, crm);
        result.stats.potential_comparisons = blocking.stats.potential_comparisons;
        result.stats.candidate_pairs = blocking.stats.candidate_pairs;
        result.stats.reduction_factor = blocking.stats.reduction_factor;
        result.blocking = blocking.stats;
        result.mark_stage_completed(PipelineStage::Blocking);

        if blocking.candidates.is_empty() {
            info!("No candidate pairs share a blocking key; returning empty result");
            result.scoring.status = StageStatus::Skipped("no candidate pairs".to_string());
            result.verification.status = StageStatus::Skipped("no candidate pairs".to_string());
            return self.finish(result, run_start);
        }

        // Stage 2: scoring and tiering
        log_pipeline_phase("Scoring", Some(self.scorer.name()));
        let Some(tiers) = self.score(&run_id, linkedin, crm, &blocking.candidates, &mut result) else {
            result.verification.status = StageStatus::Skipped("scoring failed".to_string());
            return self.finish(result, run_start);
        };
        result.mark_stage_completed(PipelineStage::Scoring);

        // Stage 3: AI verification of the medium tier
        let TieredPairs { high, mut medium, low } = tiers;
        let cap = self.config.max_ai_comparisons;
        let overflow = if medium.len() > cap { medium.split_off(cap) } else { Vec::new() };
        result.verification.eligible_pairs = medium.len() + overflow.len();
        result.verification.skipped_due_to_cap = overflow.len();

        log_pipeline_phase("AI verification", Some(&format!("{} medium-tier pairs", medium.len())));
        let medium = self.resolve_all(linkedin, crm, medium);
        let verified = self
            .verify_medium_tier(&run_id, medium, deadline, &mut result.verification)
            .await;
        result.stats.ai_runtime_seconds = result.verification.elapsed_secs;
        if !result.verification.status.is_failed() {
            result.mark_stage_completed(PipelineStage::Verification);
        }

        // Stage 4: merge
        log_pipeline_phase("Merge", None);
        self.merge(linkedin, crm, high, verified, low, &mut result);
        result.mark_stage_completed(PipelineStage::Merge);

        self.finish(result, run_start)
    }

    fn score(
        &self,
        run_id: &str,
        linkedin: &[ContactRecord],
        crm: &[ContactRecord],
        candidates: &[CandidatePair],
        result: &mut PipelineResult,
    ) -> Option<TieredPairs> {
        let logger = StageLogger::new(PipelineStage::Scoring);
        logger.log_start(
            run_id,
            &format!("{} strategy over {} candidates", self.scorer.name(), candidates.len()),
        );

        let output = match self.scorer.score_candidates(linkedin, crm, candidates) {
            Ok(output) => output,
            Err(e) => {
                let reason = format!("{:#}", e);
                logger.log_error(&format!("Scoring failed: {}", reason));
                result.scoring.status = StageStatus::Failed(reason);
                result.scoring.elapsed_secs = logger.get_elapsed().as_secs_f64();
                return None;
            }
        };

        let mut scored = output.scored;
        sort_by_score(&mut scored);

        result.scoring.scored_pairs = scored.len();
        result.scoring.mean_score = if scored.is_empty() {
            0.0
        } else {
            scored.iter().map(|p| p.score).sum::<f64>() / scored.len() as f64
        };
        result.scoring.top_matches = scored
            .iter()
            .take(TOP_MATCHES_REPORTED)
            .filter_map(|p| {
                let (li, crm_record) = resolve_pair(linkedin, crm, &p.pair).ok()?;
                Some(TopMatchSummary {
                    linkedin_name: li.display_name(),
                    crm_name: crm_record.display_name(),
                    score: p.score,
                    primary_key: p.pair.primary_key().to_string(),
                })
            })
            .collect();
        for (rank, top) in result.scoring.top_matches.iter().enumerate() {
            logger.log_debug(&format!(
                "#{} {:.3} {} ↔ {} via {}",
                rank + 1,
                top.score,
                top.linkedin_name.as_deref().unwrap_or("?"),
                top.crm_name.as_deref().unwrap_or("?"),
                top.primary_key
            ));
        }
        result.scoring.linkage = output.linkage;

        let tiers = partition(scored, &self.config.thresholds);
        result.scoring.high_tier = tiers.high.len();
        result.scoring.medium_tier = tiers.medium.len();
        result.scoring.low_tier = tiers.low.len();
        logger.log_tier_split(tiers.high.len(), tiers.medium.len(), tiers.low.len());

        result.scoring.status = StageStatus::Completed;
        result.scoring.elapsed_secs = logger.get_elapsed().as_secs_f64();
        logger.log_completion(&format!(
            "{} pairs scored, mean score {:.3}",
            result.scoring.scored_pairs, result.scoring.mean_score
        ));
        Some(tiers)
    }

    fn resolve_all<'a>(
        &self,
        linkedin: &'a [ContactRecord],
        crm: &'a [ContactRecord],
        pairs: Vec<ScoredPair>,
    ) -> Vec<(ScoredPair, &'a ContactRecord, &'a ContactRecord)> {
        pairs
            .into_iter()
            .filter_map(|scored| match resolve_pair(linkedin, crm, &scored.pair) {
                Ok((li, crm_record)) => Some((scored, li, crm_record)),
                Err(e) => {
                    warn!("Dropping unresolvable pair: {:#}", e);
                    None
                }
            })
            .collect()
    }

    fn stop_requested(&self, deadline: Option<Instant>) -> bool {
        self.cancelled.load(Ordering::SeqCst) || deadline.is_some_and(|d| Instant::now() >= d)
    }

    async fn verify_medium_tier<'a>(
        &self,
        run_id: &str,
        pairs: Vec<(ScoredPair, &'a ContactRecord, &'a ContactRecord)>,
        deadline: Option<Instant>,
        stats: &mut VerificationStats,
    ) -> Vec<VerificationOutcome<'a>> {
        let logger = StageLogger::new(PipelineStage::Verification);

        if pairs.is_empty() {
            stats.status = StageStatus::Skipped("no medium-tier pairs".to_string());
            return Vec::new();
        }
        let Some(verifier) = self.verifier.as_ref() else {
            logger.log_warning(&format!(
                "No AI comparator configured; {} medium-tier pairs left unverified",
                pairs.len()
            ));
            stats.skipped_no_verifier = pairs.len();
            stats.status = StageStatus::Skipped("no AI comparator configured".to_string());
            return pairs.into_iter().map(|(p, li, crm)| (p, li, crm, None)).collect();
        };

        logger.log_start(
            run_id,
            &format!(
                "{} pairs with {} (concurrency {})",
                pairs.len(),
                verifier.comparator_name(),
                self.config.verifier.concurrency
            ),
        );

        let multi = self.progress.create_multi_progress();
        let progress_bar: Option<ProgressBar> = self.progress.verification_bar(multi.as_ref(), pairs.len());
        let total = pairs.len();
        let cap = self.config.max_ai_comparisons;
        let dispatched = AtomicUsize::new(0);
        let finished = AtomicUsize::new(0);
        let (dispatched, finished, progress_ref, logger_ref) = (&dispatched, &finished, &progress_bar, &logger);

        let outcomes: Vec<VerificationOutcome<'a>> = stream::iter(pairs)
            .map(move |(scored, li, crm_record)| async move {
                if self.stop_requested(deadline) || dispatched.fetch_add(1, Ordering::SeqCst) >= cap {
                    return (scored, li, crm_record, None);
                }
                let verified = verifier.verify(li, crm_record).await;
                let done = finished.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some(pb) = progress_ref {
                    pb.inc(1);
                }
                logger_ref.log_progress_update(done, total, None);
                (scored, li, crm_record, Some(verified))
            })
            .buffered(self.config.verifier.concurrency)
            .collect()
            .await;

        if let Some(pb) = &progress_bar {
            pb.finish_with_message("AI verification complete");
        }

        for (_, _, _, verified) in &outcomes {
            match verified {
                None => stats.skipped_cancelled += 1,
                Some(v) => {
                    stats.completed += 1;
                    match v.source {
                        VerdictSource::Cache => stats.cache_hits += 1,
                        VerdictSource::Model => stats.dispatched += 1,
                        VerdictSource::Fallback => {
                            stats.dispatched += 1;
                            stats.errors += 1;
                        }
                    }
                    if !v.is_failure() {
                        if v.verdict.is_confirmation() {
                            stats.confirmations += 1;
                        } else {
                            stats.rejections += 1;
                        }
                    }
                }
            }
        }
        stats.cancelled = self.cancelled.load(Ordering::SeqCst);
        stats.timed_out = deadline.is_some_and(|d| Instant::now() >= d);
        if stats.skipped_cancelled > 0 {
            logger.log_warning(&format!(
                "Run stopped early; {} pairs were not verified",
                stats.skipped_cancelled
            ));
        }
        logger.log_cache_results(stats.cache_hits, stats.dispatched);
        stats.status = StageStatus::Completed;
        stats.elapsed_secs = logger.get_elapsed().as_secs_f64();
        logger.log_completion(&format!(
            "{} confirmed, {} rejected, {} errors",
            stats.confirmations, stats.rejections, stats.errors
        ));
        outcomes
    }

    fn outcome(
        &self,
        scored: ScoredPair,
        li: &ContactRecord,
        crm: &ContactRecord,
        detection_method: DetectionMethod,
        verdict: Option<Verdict>,
    ) -> MatchOutcome {
        let combined_confidence = match (&verdict, detection_method) {
            (Some(v), DetectionMethod::AiConfirmed | DetectionMethod::AiRejected) => {
                Some((scored.score + v.similarity_score) / 2.0)
            }
            _ => None,
        };
        MatchOutcome {
            match_reasons: match_reasons(li, crm),
            linkedin: li.clone(),
            crm: crm.clone(),
            score: scored.score,
            breakdown: scored.breakdown,
            blocking_keys: scored.pair.blocking_keys,
            detection_method,
            verdict,
            combined_confidence,
            cluster_id: scored.cluster_id,
        }
    }

    fn merge(
        &self,
        linkedin: &[ContactRecord],
        crm: &[ContactRecord],
        high: Vec<ScoredPair>,
        verified: Vec<VerificationOutcome<'_>>,
        low: Vec<ScoredPair>,
        result: &mut PipelineResult,
    ) {
        let logger = StageLogger::new(PipelineStage::Merge);

        for (scored, li, crm_record) in self.resolve_all(linkedin, crm, high) {
            let outcome = self.outcome(scored, li, crm_record, DetectionMethod::AutoAccepted, None);
            result.high_confidence_matches.push(outcome);
        }
        let auto_accepted = result.high_confidence_matches.len();

        for (scored, li, crm_record, verified) in verified {
            let Some(verified) = verified else {
                continue;
            };
            if verified.is_failure() {
                let outcome = self.outcome(
                    scored,
                    li,
                    crm_record,
                    DetectionMethod::VerificationFailed,
                    Some(verified.verdict),
                );
                result.failed_verifications.push(outcome);
            } else if verified.verdict.is_confirmation() {
                let outcome =
                    self.outcome(scored, li, crm_record, DetectionMethod::AiConfirmed, Some(verified.verdict));
                result.high_confidence_matches.push(outcome);
            } else {
                let outcome =
                    self.outcome(scored, li, crm_record, DetectionMethod::AiRejected, Some(verified.verdict));
                result.medium_confidence_matches.push(outcome);
            }
        }

        let low_total = low.len();
        let reported: Vec<ScoredPair> = low
            .into_iter()
            .take(self.config.low_confidence_output_limit)
            .collect();
        for (scored, li, crm_record) in self.resolve_all(linkedin, crm, reported) {
            let outcome = self.outcome(scored, li, crm_record, DetectionMethod::LowConfidence, None);
            result.low_confidence_matches.push(outcome);
        }

        let stats = &mut result.stats;
        stats.high_confidence_total = result.high_confidence_matches.len();
        stats.medium_confidence_total = result.medium_confidence_matches.len();
        stats.low_confidence_total = low_total;
        stats.low_confidence_reported = result.low_confidence_matches.len();
        stats.failed_verification_total = result.failed_verifications.len();

        debug!(
            "Merged {} auto-accepted and {} AI-confirmed pairs into the high bucket",
            auto_accepted,
            stats.high_confidence_total - auto_accepted
        );
        logger.log_completion(&format!(
            "{} high, {} needs review, {} low ({} reported), {} failed",
            stats.high_confidence_total,
            stats.medium_confidence_total,
            stats.low_confidence_total,
            stats.low_confidence_reported,
            stats.failed_verification_total
        ));
    }

    fn finish(&self, mut result: PipelineResult, run_start: Instant) -> PipelineResult {
        let elapsed = run_start.elapsed();
        result.stats.total_runtime_seconds = elapsed.as_secs_f64();
        log_pipeline_completion(&result, elapsed);
        result
    }
}
