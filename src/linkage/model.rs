// src/linkage/model.rs
use anyhow::{bail, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::linkage::features::{LinkageField, FEATURE_COUNT};
use crate::utils::pipeline_config::LinkageConfig;

/// Labelled comparison vector: 1.0 for a known match, 0.0 for a known non-match.
#[derive(Debug, Clone)]
pub struct TrainingExample {
    pub features: Vec<f64>,
    pub label: f64,
}

fn sigmoid(logit: f64) -> f64 {
    1.0 / (1.0 + (-logit).exp())
}

fn prior_similarity_weight(field: LinkageField) -> f64 {
    match field {
        LinkageField::FullName => 3.0,
        LinkageField::GivenName => 1.0,
        LinkageField::FamilyName => 1.5,
        LinkageField::Email => 4.0,
        LinkageField::Phone => 2.0,
        LinkageField::Company => 1.5,
        LinkageField::JobTitle => 0.5,
        LinkageField::Location => 0.5,
    }
}

const PRIOR_BIAS: f64 = -5.0;

/// Logistic regression over comparison vectors, fitted with full-batch gradient
/// descent and an L2 penalty that pulls weights back toward the prior.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LinkageModel {
    weights: Vec<f64>,
    bias: f64,
    prior_weights: Vec<f64>,
    prior_bias: f64,
    trained: bool,
}

impl LinkageModel {
    /// Hand-set starting point: agreement on a field raises the odds, missing flags are neutral.
    pub fn with_prior() -> Self {
        let mut weights = Vec::with_capacity(FEATURE_COUNT);
        for field in LinkageField::ALL {
            weights.push(prior_similarity_weight(field));
            weights.push(0.0);
        }
        Self {
            prior_weights: weights.clone(),
            weights,
            bias: PRIOR_BIAS,
            prior_bias: PRIOR_BIAS,
            trained: false,
        }
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn is_trained(&self) -> bool {
        self.trained
    }

    pub fn predict(&self, features: &[f64]) -> Result<f64> {
        if features.len() != self.weights.len() {
            bail!(
                "Expected {} features, but got {}",
                self.weights.len(),
                features.len()
            );
        }
        let logit: f64 = self
            .weights
            .iter()
            .zip(features)
            .map(|(w, f)| w * f)
            .sum::<f64>()
            + self.bias;
        let probability = sigmoid(logit);
        if !probability.is_finite() {
            bail!("Model produced a non-finite probability (logit {})", logit);
        }
        Ok(probability)
    }

    pub fn fit(&mut self, examples: &[TrainingExample], config: &LinkageConfig) -> Result<()> {
        if examples.is_empty() {
            bail!("No training examples");
        }
        if let Some(bad) = examples.iter().find(|e| e.features.len() != self.weights.len()) {
            bail!(
                "Training example has {} features, expected {}",
                bad.features.len(),
                self.weights.len()
            );
        }
        let positives = examples.iter().filter(|e| e.label >= 0.5).count();
        if positives == 0 || positives == examples.len() {
            warn!(
                "Training data holds a single class ({} examples); fit will lean on the prior",
                examples.len()
            );
        }

        let n = examples.len() as f64;
        let dims = self.weights.len();
        for epoch in 0..config.epochs {
            let mut gradient = vec![0.0; dims];
            let mut bias_gradient = 0.0;
            for example in examples {
                let logit: f64 = self
                    .weights
                    .iter()
                    .zip(&example.features)
                    .map(|(w, f)| w * f)
                    .sum::<f64>()
                    + self.bias;
                let error = sigmoid(logit) - example.label;
                for (g, f) in gradient.iter_mut().zip(&example.features) {
                    *g += error * f;
                }
                bias_gradient += error;
            }
            for i in 0..dims {
                let penalty = config.l2_penalty * (self.weights[i] - self.prior_weights[i]);
                self.weights[i] -= config.learning_rate * (gradient[i] / n + penalty);
            }
            self.bias -= config.learning_rate
                * (bias_gradient / n + config.l2_penalty * (self.bias - self.prior_bias));

            if epoch % 100 == 0 {
                debug!("Linkage model epoch {}: bias {:.4}", epoch, self.bias);
            }
        }

        if self.weights.iter().any(|w| !w.is_finite()) || !self.bias.is_finite() {
            bail!("Training diverged: model weights are not finite");
        }
        self.trained = true;
        Ok(())
    }
}

/// Cut on predicted match probabilities that maximizes expected F-beta, using the
/// probabilities themselves as soft labels. `recall_weight` is beta.
pub fn threshold(probabilities: &[f64], recall_weight: f64) -> f64 {
    const DEFAULT_THRESHOLD: f64 = 0.5;
    let expected_positives: f64 = probabilities.iter().filter(|p| p.is_finite()).sum();
    if probabilities.is_empty() || expected_positives <= 0.0 {
        return DEFAULT_THRESHOLD;
    }

    let mut sorted: Vec<f64> = probabilities.iter().copied().filter(|p| p.is_finite()).collect();
    sorted.sort_by(|a, b| b.total_cmp(a));
    let beta_sq = recall_weight * recall_weight;

    let mut best_cut = DEFAULT_THRESHOLD;
    let mut best_score = f64::NEG_INFINITY;
    let mut true_positives = 0.0;
    for (i, probability) in sorted.iter().enumerate() {
        true_positives += probability;
        // Only evaluate at the last element of a run of equal values.
        if i + 1 < sorted.len() && sorted[i + 1] == *probability {
            continue;
        }
        let predicted = (i + 1) as f64;
        let precision = true_positives / predicted;
        let recall = true_positives / expected_positives;
        let denominator = beta_sq * precision + recall;
        let f_beta = if denominator > 0.0 {
            (1.0 + beta_sq) * precision * recall / denominator
        } else {
            0.0
        };
        if f_beta > best_score {
            best_score = f_beta;
            best_cut = *probability;
        }
    }
    best_cut
}
