// src/matching/scorer.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::linkage::scorer::LinkageScorer;
use crate::matching::weighted::WeightedScorer;
use crate::models::contact::ContactRecord;
use crate::models::matching::{CandidatePair, ScoredPair};
use crate::models::stats_models::LinkageDiagnostics;
use crate::utils::pipeline_config::PipelineConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScorerKind {
    Weighted,
    Trained,
}

impl FromStr for ScorerKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "weighted" | "fast" => Ok(ScorerKind::Weighted),
            "trained" | "linkage" | "model" => Ok(ScorerKind::Trained),
            other => Err(anyhow!("Unknown scorer strategy '{}'", other)),
        }
    }
}

impl fmt::Display for ScorerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScorerKind::Weighted => write!(f, "weighted"),
            ScorerKind::Trained => write!(f, "trained"),
        }
    }
}

/// Scored pairs in candidate order, plus whatever the strategy wants to report.
#[derive(Debug, Clone, Default)]
pub struct ScoringOutput {
    pub scored: Vec<ScoredPair>,
    pub linkage: Option<LinkageDiagnostics>,
}

/// One interchangeable way of turning candidate pairs into scores in [0,1].
pub trait SimilarityScorer: Send + Sync {
    fn name(&self) -> &'static str;

    fn score_candidates(
        &self,
        linkedin: &[ContactRecord],
        crm: &[ContactRecord],
        candidates: &[CandidatePair],
    ) -> Result<ScoringOutput>;
}

pub fn build_scorer(config: &PipelineConfig) -> Box<dyn SimilarityScorer> {
    match config.scorer {
        ScorerKind::Weighted => Box::new(WeightedScorer::new(config.weights.clone())),
        ScorerKind::Trained => Box::new(LinkageScorer::new(config.linkage.clone())),
    }
}

/// Looks up both records of a candidate, failing on indices outside the inputs.
pub fn resolve_pair<'a>(
    linkedin: &'a [ContactRecord],
    crm: &'a [ContactRecord],
    pair: &CandidatePair,
) -> Result<(&'a ContactRecord, &'a ContactRecord)> {
    let li = linkedin
        .get(pair.linkedin_idx)
        .with_context(|| format!("LinkedIn index {} out of range", pair.linkedin_idx))?;
    let crm_record = crm
        .get(pair.crm_idx)
        .with_context(|| format!("CRM index {} out of range", pair.crm_idx))?;
    Ok((li, crm_record))
}
