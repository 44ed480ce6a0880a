// src/linkage/scorer.rs
use anyhow::{Context, Result};
use log::{info, warn};
use std::collections::HashMap;

use crate::linkage::clustering::{cluster, LinkEdge};
use crate::linkage::features::{compare_records, ComparisonVector, LinkageField};
use crate::linkage::model::{threshold, LinkageModel};
use crate::linkage::training::bootstrap_training_set;
use crate::matching::scorer::{resolve_pair, ScoringOutput, SimilarityScorer};
use crate::models::contact::ContactRecord;
use crate::models::matching::{CandidatePair, ScoreBreakdown, ScoredPair};
use crate::models::stats_models::LinkageDiagnostics;
use crate::utils::pipeline_config::LinkageConfig;

pub const MATCH_PROBABILITY: &str = "match_probability";
pub const CLUSTER_THRESHOLD: &str = "cluster_threshold";

fn breakdown_for(vector: &ComparisonVector, probability: f64, cut: f64) -> ScoreBreakdown {
    let mut breakdown = ScoreBreakdown::default();
    for field in LinkageField::ALL {
        breakdown.set_field(field.as_str(), vector.get(field));
    }
    breakdown.add_adjustment(MATCH_PROBABILITY, probability);
    breakdown.add_adjustment(CLUSTER_THRESHOLD, cut);
    breakdown
}

/// Probabilistic record linkage: bootstrap labels, fit, pick a cut, cluster.
pub struct LinkageScorer {
    config: LinkageConfig,
}

impl LinkageScorer {
    pub fn new(config: LinkageConfig) -> Self {
        Self { config }
    }

    fn train(&self, linkedin: &[ContactRecord], crm: &[ContactRecord], diagnostics: &mut LinkageDiagnostics) -> Result<LinkageModel> {
        let mut model = LinkageModel::with_prior();
        let training = bootstrap_training_set(linkedin, crm, &self.config);
        diagnostics.positive_examples = training.positives;
        diagnostics.negative_examples = training.negatives;

        if training.is_empty() {
            warn!("No automatic training pairs could be derived; scoring with prior weights");
            diagnostics.training_skipped = true;
            return Ok(model);
        }

        info!(
            "Training linkage model on {} positive and {} negative pairs",
            training.positives, training.negatives
        );
        model
            .fit(&training.examples, &self.config)
            .context("Linkage model training failed")?;
        Ok(model)
    }
}

impl SimilarityScorer for LinkageScorer {
    fn name(&self) -> &'static str {
        "trained"
    }

    fn score_candidates(
        &self,
        linkedin: &[ContactRecord],
        crm: &[ContactRecord],
        candidates: &[CandidatePair],
    ) -> Result<ScoringOutput> {
        let mut diagnostics = LinkageDiagnostics::default();
        let model = self.train(linkedin, crm, &mut diagnostics)?;
        diagnostics.weights = model.weights().to_vec();

        let mut vectors = Vec::with_capacity(candidates.len());
        let mut probabilities = Vec::with_capacity(candidates.len());
        for pair in candidates {
            let (li, crm_record) = resolve_pair(linkedin, crm, pair)?;
            let vector = compare_records(li, crm_record);
            let probability = model.predict(&vector.to_features()).with_context(|| {
                format!("Failed to score pair ({}, {})", pair.linkedin_idx, pair.crm_idx)
            })?;
            vectors.push(vector);
            probabilities.push(probability);
        }

        let cut = threshold(&probabilities, self.config.recall_weight);
        diagnostics.threshold = cut;

        let edges: Vec<LinkEdge> = candidates
            .iter()
            .zip(&probabilities)
            .map(|(pair, probability)| LinkEdge {
                linkedin_idx: pair.linkedin_idx,
                crm_idx: pair.crm_idx,
                probability: *probability,
            })
            .collect();
        let clusters = cluster(linkedin.len(), crm.len(), &edges, cut);
        diagnostics.clusters = clusters.len();
        diagnostics.cross_source_clusters = clusters.iter().filter(|c| c.is_cross_source()).count();

        let mut membership: HashMap<(usize, usize), (usize, f64)> = HashMap::new();
        for found in clusters.iter().filter(|c| c.is_cross_source()) {
            for key in found.pairs() {
                membership.insert(key, (found.id, found.score));
            }
        }

        let mut scored = Vec::with_capacity(candidates.len());
        for ((pair, vector), probability) in candidates.iter().zip(&vectors).zip(&probabilities) {
            let cluster_hit = membership.remove(&pair.index_key());
            let (score, cluster_id) = match cluster_hit {
                Some((id, cluster_score)) => (cluster_score, Some(id)),
                None => (*probability, None),
            };
            scored.push(ScoredPair {
                pair: pair.clone(),
                score: score.clamp(0.0, 1.0),
                breakdown: breakdown_for(vector, *probability, cut),
                cluster_id,
            });
        }

        // Cluster members linked only transitively were never blocked together.
        let mut transitive: Vec<((usize, usize), (usize, f64))> = membership.into_iter().collect();
        transitive.sort_by_key(|(key, _)| *key);
        for ((li_idx, crm_idx), (id, cluster_score)) in transitive {
            let pair = CandidatePair::new(li_idx, crm_idx, format!("cluster:{}", id));
            let (li, crm_record) = resolve_pair(linkedin, crm, &pair)?;
            let vector = compare_records(li, crm_record);
            let probability = model.predict(&vector.to_features())?;
            scored.push(ScoredPair {
                pair,
                score: cluster_score.clamp(0.0, 1.0),
                breakdown: breakdown_for(&vector, probability, cut),
                cluster_id: Some(id),
            });
        }

        info!(
            "Linkage scoring: {} pairs, threshold {:.3}, {} cross-source clusters",
            scored.len(),
            cut,
            diagnostics.cross_source_clusters
        );

        Ok(ScoringOutput {
            scored,
            linkage: Some(diagnostics),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::blocking::BlockingEngine;
    use crate::models::contact::Origin;
    use crate::utils::pipeline_config::BlockingConfig;

    fn record(origin: Origin, idx: usize, name: &str, email: Option<&str>, company: &str) -> ContactRecord {
        let mut record = ContactRecord::new(origin, idx);
        record.full_name = Some(name.to_string());
        record.email = email.map(str::to_string);
        record.company = Some(company.to_string());
        record
    }

    fn sample() -> (Vec<ContactRecord>, Vec<ContactRecord>) {
        let linkedin = vec![
            record(Origin::LinkedIn, 0, "Jane Doe", Some("jane@acme.com"), "Acme"),
            record(Origin::LinkedIn, 1, "Max Muster", Some("max@globex.com"), "Globex"),
            record(Origin::LinkedIn, 2, "Erika Example", None, "Initech"),
            record(Origin::LinkedIn, 3, "Paul Weber", None, "Acme"),
        ];
        let crm = vec![
            record(Origin::Crm, 0, "Jane Doe", Some("jane@acme.com"), "Acme Inc"),
            record(Origin::Crm, 1, "Max Muster", Some("max@globex.com"), "Globex GmbH"),
            record(Origin::Crm, 2, "Erika Example", None, "Initech"),
            record(Origin::Crm, 3, "Lena Vogel", None, "Acme"),
        ];
        (linkedin, crm)
    }

    #[test]
    fn test_trained_scorer_ranks_true_matches_first() {
        let (linkedin, crm) = sample();
        let candidates = BlockingEngine::new(BlockingConfig::default())
            .generate_candidates(&linkedin, &crm)
            .candidates;
        let output = LinkageScorer::new(LinkageConfig::default())
            .score_candidates(&linkedin, &crm, &candidates)
            .unwrap();

        let diagnostics = output.linkage.unwrap();
        assert_eq!(diagnostics.positive_examples, 2);
        assert!(diagnostics.negative_examples > 0);
        assert!(!diagnostics.training_skipped);

        let score_of = |li: usize, crm: usize| {
            output
                .scored
                .iter()
                .find(|p| p.pair.index_key() == (li, crm))
                .map(|p| p.score)
                .unwrap()
        };
        assert!(score_of(0, 0) > score_of(3, 3));
        assert!(score_of(2, 2) > score_of(0, 3));
        assert!(output.scored.iter().all(|p| (0.0..=1.0).contains(&p.score)));
    }

    #[test]
    fn test_training_skipped_without_labels() {
        let linkedin = vec![record(Origin::LinkedIn, 0, "Ann", None, "Acme")];
        let crm = vec![record(Origin::Crm, 0, "Ann", None, "Acme")];
        let candidates = vec![CandidatePair::new(0, 0, "company:acme")];
        let output = LinkageScorer::new(LinkageConfig::default())
            .score_candidates(&linkedin, &crm, &candidates)
            .unwrap();
        assert!(output.linkage.unwrap().training_skipped);
        assert_eq!(output.scored.len(), 1);
    }

    #[test]
    fn test_divergent_training_is_an_error() {
        let (linkedin, crm) = sample();
        let candidates = vec![CandidatePair::new(0, 0, "name:jane doe")];
        let mut config = LinkageConfig::default();
        config.learning_rate = f64::MAX;
        let result = LinkageScorer::new(config).score_candidates(&linkedin, &crm, &candidates);
        assert!(result.is_err());
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let (linkedin, crm) = sample();
        let candidates = BlockingEngine::new(BlockingConfig::default())
            .generate_candidates(&linkedin, &crm)
            .candidates;
        let scorer = LinkageScorer::new(LinkageConfig::default());
        let first = scorer.score_candidates(&linkedin, &crm, &candidates).unwrap();
        let second = scorer.score_candidates(&linkedin, &crm, &candidates).unwrap();
        assert_eq!(first.scored, second.scored);
    }
}
