// src/matching/weighted.rs
use anyhow::Result;

use crate::matching::scorer::{resolve_pair, ScoringOutput, SimilarityScorer};
use crate::matching::similarity::{company_similarity, email_similarity, name_similarity, token_jaccard};
use crate::models::contact::ContactRecord;
use crate::models::matching::{CandidatePair, ScoreBreakdown, ScoredPair};
use crate::utils::pipeline_config::ScoringWeights;

pub const FIELD_NAME: &str = "name";
pub const FIELD_EMAIL: &str = "email";
pub const FIELD_COMPANY: &str = "company";
pub const FIELD_JOB_TITLE: &str = "job_title";
pub const EXACT_EMAIL_BOOST: &str = "exact_email_boost";

fn compare<F>(a: Option<String>, b: Option<String>, f: F) -> Option<f64>
where
    F: Fn(&str, &str) -> f64,
{
    match (a, b) {
        (Some(a), Some(b)) => Some(f(&a, &b)),
        _ => None,
    }
}

/// Fixed-weight field comparison. Cheap, deterministic, no training step.
pub struct WeightedScorer {
    weights: ScoringWeights,
}

impl WeightedScorer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    pub fn score_pair(&self, linkedin: &ContactRecord, crm: &ContactRecord) -> (f64, ScoreBreakdown) {
        let bonus = self.weights.significant_token_bonus;
        let name = compare(linkedin.normalized_name(), crm.normalized_name(), |a, b| {
            name_similarity(a, b, bonus)
        });
        let email = compare(linkedin.normalized_email(), crm.normalized_email(), email_similarity);
        let company = compare(
            linkedin.normalized_company(),
            crm.normalized_company(),
            company_similarity,
        );
        let job_title = compare(
            linkedin.normalized_job_title(),
            crm.normalized_job_title(),
            token_jaccard,
        );

        let mut breakdown = ScoreBreakdown::default();
        breakdown.set_field(FIELD_NAME, name);
        breakdown.set_field(FIELD_EMAIL, email);
        breakdown.set_field(FIELD_COMPANY, company);
        breakdown.set_field(FIELD_JOB_TITLE, job_title);

        // Absent fields count as neutral evidence rather than as a mismatch.
        let neutral = self.weights.missing_field_score;
        let mut score = self.weights.name * name.unwrap_or(neutral)
            + self.weights.email * email.unwrap_or(neutral)
            + self.weights.company * company.unwrap_or(neutral)
            + self.weights.job_title * job_title.unwrap_or(neutral);

        if email == Some(1.0) && self.weights.exact_email_boost > 0.0 {
            score += self.weights.exact_email_boost;
            breakdown.add_adjustment(EXACT_EMAIL_BOOST, self.weights.exact_email_boost);
        }

        (score.clamp(0.0, 1.0), breakdown)
    }
}

impl SimilarityScorer for WeightedScorer {
    fn name(&self) -> &'static str {
        "weighted"
    }

    fn score_candidates(
        &self,
        linkedin: &[ContactRecord],
        crm: &[ContactRecord],
        candidates: &[CandidatePair],
    ) -> Result<ScoringOutput> {
        let mut scored = Vec::with_capacity(candidates.len());
        for pair in candidates {
            let (li, crm_record) = resolve_pair(linkedin, crm, pair)?;
            let (score, breakdown) = self.score_pair(li, crm_record);
            scored.push(ScoredPair {
                pair: pair.clone(),
                score,
                breakdown,
                cluster_id: None,
            });
        }
        Ok(ScoringOutput {
            scored,
            linkage: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::contact::Origin;

    fn record(origin: Origin, name: &str, email: Option<&str>, company: Option<&str>) -> ContactRecord {
        let mut record = ContactRecord::new(origin, 0);
        record.full_name = Some(name.to_string());
        record.email = email.map(str::to_string);
        record.company = company.map(str::to_string);
        record
    }

    fn scorer() -> WeightedScorer {
        WeightedScorer::new(ScoringWeights::default())
    }

    #[test]
    fn test_exact_email_is_boosted_to_high() {
        let li = record(Origin::LinkedIn, "Jane Doe", Some("jane@acme.com"), None);
        let crm = record(Origin::Crm, "Jane Doe", Some("JANE@acme.com"), None);
        let (score, breakdown) = scorer().score_pair(&li, &crm);
        assert_eq!(breakdown.field(FIELD_EMAIL), Some(1.0));
        assert_eq!(breakdown.adjustments.get(EXACT_EMAIL_BOOST), Some(&0.3));
        assert_eq!(score, 1.0);
    }

    #[test]
    fn test_nickname_with_same_company_lands_in_the_middle() {
        let li = record(Origin::LinkedIn, "Robert Smith", None, Some("Acme"));
        let crm = record(Origin::Crm, "Bob Smith", None, Some("Acme Inc"));
        let (score, breakdown) = scorer().score_pair(&li, &crm);
        assert_eq!(breakdown.field(FIELD_COMPANY), Some(1.0));
        assert_eq!(breakdown.field(FIELD_EMAIL), None);
        let expected = 0.4 * (1.0 / 3.0 + 0.2) + 0.4 * 0.5 + 0.2 * 1.0;
        assert!((score - expected).abs() < 1e-9, "score {}", score);
        assert!(score >= 0.6 && score < 0.8);
    }

    #[test]
    fn test_unrelated_people_score_low() {
        let li = record(Origin::LinkedIn, "Jane Doe", Some("jane@acme.com"), Some("Acme"));
        let crm = record(Origin::Crm, "Max Muster", Some("max@globex.com"), Some("Globex"));
        let (score, _) = scorer().score_pair(&li, &crm);
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_scores_are_deterministic_and_bounded() {
        let li = vec![
            record(Origin::LinkedIn, "Anna Maria Schmidt", Some("anna@siemens.com"), Some("Siemens AG")),
            record(Origin::LinkedIn, "Jürgen Klein", None, Some("Bosch")),
        ];
        let crm = vec![
            record(Origin::Crm, "Anna Schmidt", Some("a.schmidt@siemens.com"), Some("Siemens")),
            record(Origin::Crm, "Jurgen Klein", Some("jk@bosch.de"), Some("Robert Bosch GmbH")),
        ];
        let candidates = vec![
            CandidatePair::new(0, 0, "company:siemens"),
            CandidatePair::new(1, 1, "name:jurgen klein"),
            CandidatePair::new(0, 1, "test"),
        ];
        let first = scorer().score_candidates(&li, &crm, &candidates).unwrap();
        let second = scorer().score_candidates(&li, &crm, &candidates).unwrap();
        assert_eq!(first.scored, second.scored);
        for pair in &first.scored {
            assert!((0.0..=1.0).contains(&pair.score));
        }
        assert_eq!(first.scored[1].breakdown.field(FIELD_NAME), Some(1.0));
    }

    #[test]
    fn test_out_of_range_candidate_is_an_error() {
        let li = vec![record(Origin::LinkedIn, "Jane Doe", None, Some("Acme"))];
        let crm = vec![record(Origin::Crm, "Jane Doe", None, Some("Acme"))];
        let candidates = vec![CandidatePair::new(0, 5, "name:jane doe")];
        assert!(scorer().score_candidates(&li, &crm, &candidates).is_err());
    }
}
