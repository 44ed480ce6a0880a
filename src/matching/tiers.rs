// src/matching/tiers.rs
use crate::models::matching::{ConfidenceTier, ScoredPair};
use crate::utils::pipeline_config::TierThresholds;

#[derive(Debug, Clone, Default)]
pub struct TieredPairs {
    pub high: Vec<ScoredPair>,
    pub medium: Vec<ScoredPair>,
    pub low: Vec<ScoredPair>,
}

impl TieredPairs {
    pub fn total(&self) -> usize {
        self.high.len() + self.medium.len() + self.low.len()
    }
}

/// Splits scored pairs into tiers. Every input lands in exactly one tier and
/// the relative order within a tier is the input order.
pub fn partition(scored: Vec<ScoredPair>, thresholds: &TierThresholds) -> TieredPairs {
    let mut tiers = TieredPairs::default();
    for pair in scored {
        match thresholds.tier_for(pair.score) {
            ConfidenceTier::High => tiers.high.push(pair),
            ConfidenceTier::Medium => tiers.medium.push(pair),
            ConfidenceTier::Low | ConfidenceTier::None => tiers.low.push(pair),
        }
    }
    tiers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::matching::{sort_by_score, CandidatePair, ScoreBreakdown};

    fn scored(idx: usize, score: f64) -> ScoredPair {
        ScoredPair {
            pair: CandidatePair::new(idx, idx, "name:x"),
            score,
            breakdown: ScoreBreakdown::default(),
            cluster_id: None,
        }
    }

    #[test]
    fn test_partition_is_complete_and_disjoint() {
        let scores = [0.0, 0.15, 0.59, 0.6, 0.61, 0.79, 0.8, 0.95, 1.0, 0.6133];
        let pairs: Vec<ScoredPair> = scores.iter().enumerate().map(|(i, s)| scored(i, *s)).collect();
        let tiers = partition(pairs, &TierThresholds::default());

        assert_eq!(tiers.total(), scores.len());
        assert!(tiers.high.iter().all(|p| p.score >= 0.8));
        assert!(tiers.medium.iter().all(|p| p.score >= 0.6 && p.score < 0.8));
        assert!(tiers.low.iter().all(|p| p.score < 0.6));
        assert_eq!(tiers.high.len(), 3);
        assert_eq!(tiers.medium.len(), 4);
        assert_eq!(tiers.low.len(), 3);
    }

    #[test]
    fn test_partition_preserves_sorted_order() {
        let mut pairs = vec![scored(3, 0.7), scored(1, 0.9), scored(2, 0.7), scored(0, 0.65)];
        sort_by_score(&mut pairs);
        let tiers = partition(pairs, &TierThresholds::default());
        let medium: Vec<usize> = tiers.medium.iter().map(|p| p.pair.linkedin_idx).collect();
        assert_eq!(medium, vec![2, 3, 0]);
    }

    #[test]
    fn test_empty_input() {
        let tiers = partition(Vec::new(), &TierThresholds::default());
        assert_eq!(tiers.total(), 0);
    }
}
