// src/models/matching.rs
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::models::contact::ContactRecord;

/// A LinkedIn/CRM index pair produced by blocking.
///
/// `blocking_keys` holds every key that produced the pair, in first-seen order;
/// the first entry is the primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidatePair {
    pub linkedin_idx: usize,
    pub crm_idx: usize,
    pub blocking_keys: Vec<String>,
}

impl CandidatePair {
    pub fn new(linkedin_idx: usize, crm_idx: usize, key: impl Into<String>) -> Self {
        Self {
            linkedin_idx,
            crm_idx,
            blocking_keys: vec![key.into()],
        }
    }

    pub fn primary_key(&self) -> &str {
        self.blocking_keys.first().map(String::as_str).unwrap_or("")
    }

    pub fn index_key(&self) -> (usize, usize) {
        (self.linkedin_idx, self.crm_idx)
    }
}

/// Per-field similarity values plus any adjustments applied on top of the weighted sum.
/// A `None` field value means the field was missing on at least one side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub fields: BTreeMap<String, Option<f64>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub adjustments: BTreeMap<String, f64>,
}

impl ScoreBreakdown {
    pub fn set_field(&mut self, field: &str, value: Option<f64>) {
        self.fields.insert(field.to_string(), value);
    }

    pub fn field(&self, field: &str) -> Option<f64> {
        self.fields.get(field).copied().flatten()
    }

    pub fn add_adjustment(&mut self, name: &str, value: f64) {
        self.adjustments.insert(name.to_string(), value);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPair {
    pub pair: CandidatePair,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<usize>,
}

/// Sorts by descending score; ties break on LinkedIn index, then CRM index.
pub fn sort_by_score(pairs: &mut [ScoredPair]) {
    pairs.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.pair.linkedin_idx.cmp(&b.pair.linkedin_idx))
            .then_with(|| a.pair.crm_idx.cmp(&b.pair.crm_idx))
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
    None,
}

impl ConfidenceTier {
    /// Maps a certainty in [0,1] onto the verifier's confidence bands:
    /// high at 95% and above, medium from 70%, low from 40%, none below.
    pub fn from_certainty(certainty: f64) -> Self {
        if certainty >= 0.95 {
            ConfidenceTier::High
        } else if certainty >= 0.70 {
            ConfidenceTier::Medium
        } else if certainty >= 0.40 {
            ConfidenceTier::Low
        } else {
            ConfidenceTier::None
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "high" => Some(ConfidenceTier::High),
            "medium" => Some(ConfidenceTier::Medium),
            "low" => Some(ConfidenceTier::Low),
            "none" => Some(ConfidenceTier::None),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceTier::High => "high",
            ConfidenceTier::Medium => "medium",
            ConfidenceTier::Low => "low",
            ConfidenceTier::None => "none",
        }
    }
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of one AI comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub is_duplicate: bool,
    pub confidence: ConfidenceTier,
    pub similarity_score: f64,
    pub reasoning: String,
    #[serde(default)]
    pub matching_fields: Vec<String>,
    #[serde(default)]
    pub conflicting_fields: Vec<String>,
}

impl Verdict {
    /// Substituted whenever the comparator fails; never counts as a duplicate.
    pub fn fallback(error: &str) -> Self {
        Self {
            is_duplicate: false,
            confidence: ConfidenceTier::None,
            similarity_score: 0.0,
            reasoning: format!("Error during AI analysis: {}", error),
            matching_fields: Vec::new(),
            conflicting_fields: Vec::new(),
        }
    }

    pub fn is_confirmation(&self) -> bool {
        self.is_duplicate
            && matches!(self.confidence, ConfidenceTier::High | ConfidenceTier::Medium)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    AutoAccepted,
    AiConfirmed,
    AiRejected,
    VerificationFailed,
    LowConfidence,
}

/// A pair as it appears in the final result buckets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub linkedin: ContactRecord,
    pub crm: ContactRecord,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
    pub blocking_keys: Vec<String>,
    pub detection_method: DetectionMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combined_confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<usize>,
    #[serde(default)]
    pub match_reasons: Vec<String>,
}

impl MatchOutcome {
    pub fn linkedin_idx(&self) -> usize {
        self.linkedin.source_index
    }

    pub fn crm_idx(&self) -> usize {
        self.crm.source_index
    }

    /// Confidence used for ranking: the combined AI confidence when present, else the score.
    pub fn effective_confidence(&self) -> f64 {
        self.combined_confidence.unwrap_or(self.score)
    }
}
