// src/verification/verifier.rs
use anyhow::Result;
use async_trait::async_trait;
use log::{debug, error};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::models::contact::ContactRecord;
use crate::models::matching::Verdict;
use crate::verification::cache::{pair_signature, VerdictCache};

/// Decides whether a LinkedIn record and a CRM record describe the same person.
#[async_trait]
pub trait ContactComparator: Send + Sync {
    fn name(&self) -> &str;

    async fn compare(&self, linkedin: &ContactRecord, crm: &ContactRecord) -> Result<Verdict>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictSource {
    Model,
    Cache,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct VerifiedPair {
    pub verdict: Verdict,
    pub source: VerdictSource,
    pub error: Option<String>,
}

impl VerifiedPair {
    pub fn is_failure(&self) -> bool {
        self.source == VerdictSource::Fallback
    }
}

fn sanitize(mut verdict: Verdict) -> Verdict {
    verdict.similarity_score = if verdict.similarity_score.is_finite() {
        verdict.similarity_score.clamp(0.0, 1.0)
    } else {
        0.0
    };
    verdict
}

/// Wraps a comparator so that no comparison can fail: errors and timeouts become
/// the fallback verdict. Counts every comparator call it makes.
pub struct AiVerifier {
    comparator: Arc<dyn ContactComparator>,
    request_timeout: Duration,
    cache: Option<VerdictCache>,
    calls: AtomicUsize,
}

impl AiVerifier {
    pub fn new(comparator: Arc<dyn ContactComparator>, request_timeout: Duration, cache_size: usize) -> Self {
        Self {
            comparator,
            request_timeout,
            cache: VerdictCache::new(cache_size),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn comparator_name(&self) -> &str {
        self.comparator.name()
    }

    pub async fn verify(&self, linkedin: &ContactRecord, crm: &ContactRecord) -> VerifiedPair {
        let signature = self.cache.as_ref().map(|_| pair_signature(linkedin, crm));
        if let (Some(cache), Some(signature)) = (&self.cache, &signature) {
            if let Some(verdict) = cache.get(signature).await {
                debug!("Verdict cache hit for {} / {}", linkedin.label(), crm.label());
                return VerifiedPair {
                    verdict,
                    source: VerdictSource::Cache,
                    error: None,
                };
            }
        }

        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = tokio::time::timeout(self.request_timeout, self.comparator.compare(linkedin, crm)).await;
        let failure = match outcome {
            Ok(Ok(verdict)) => {
                let verdict = sanitize(verdict);
                if let (Some(cache), Some(signature)) = (&self.cache, signature) {
                    cache.put(signature, verdict.clone()).await;
                }
                return VerifiedPair {
                    verdict,
                    source: VerdictSource::Model,
                    error: None,
                };
            }
            Ok(Err(e)) => format!("{:#}", e),
            Err(_) => format!("comparison timed out after {}s", self.request_timeout.as_secs_f64()),
        };

        error!(
            "AI comparison failed for {} / {}: {}",
            linkedin.label(),
            crm.label(),
            failure
        );
        VerifiedPair {
            verdict: Verdict::fallback(&failure),
            source: VerdictSource::Fallback,
            error: Some(failure),
        }
    }

    /// Comparator calls made so far, cache hits excluded.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn cache_hits(&self) -> usize {
        self.cache.as_ref().map(VerdictCache::hits).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::contact::Origin;
    use crate::models::matching::ConfidenceTier;
    use anyhow::anyhow;

    struct FixedComparator {
        score: f64,
    }

    #[async_trait]
    impl ContactComparator for FixedComparator {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn compare(&self, _linkedin: &ContactRecord, _crm: &ContactRecord) -> Result<Verdict> {
            Ok(Verdict {
                is_duplicate: true,
                confidence: ConfidenceTier::Medium,
                similarity_score: self.score,
                reasoning: "same name and company".to_string(),
                matching_fields: vec!["name".to_string(), "company".to_string()],
                conflicting_fields: vec![],
            })
        }
    }

    struct FailingComparator;

    #[async_trait]
    impl ContactComparator for FailingComparator {
        fn name(&self) -> &str {
            "failing"
        }

        async fn compare(&self, _linkedin: &ContactRecord, _crm: &ContactRecord) -> Result<Verdict> {
            Err(anyhow!("connection refused"))
        }
    }

    struct SlowComparator;

    #[async_trait]
    impl ContactComparator for SlowComparator {
        fn name(&self) -> &str {
            "slow"
        }

        async fn compare(&self, _linkedin: &ContactRecord, _crm: &ContactRecord) -> Result<Verdict> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Err(anyhow!("unreachable"))
        }
    }

    fn record(origin: Origin, name: &str) -> ContactRecord {
        let mut record = ContactRecord::new(origin, 0);
        record.full_name = Some(name.to_string());
        record.company = Some("Acme".to_string());
        record
    }

    #[tokio::test]
    async fn test_success_is_clamped_and_cached() {
        let verifier = AiVerifier::new(Arc::new(FixedComparator { score: 1.4 }), Duration::from_secs(1), 10);
        let li = record(Origin::LinkedIn, "Robert Smith");
        let crm = record(Origin::Crm, "Bob Smith");

        let first = verifier.verify(&li, &crm).await;
        assert_eq!(first.source, VerdictSource::Model);
        assert_eq!(first.verdict.similarity_score, 1.0);

        let second = verifier.verify(&li, &crm).await;
        assert_eq!(second.source, VerdictSource::Cache);
        assert_eq!(verifier.calls(), 1);
        assert_eq!(verifier.cache_hits(), 1);
    }

    #[tokio::test]
    async fn test_error_becomes_fallback_and_is_not_cached() {
        let verifier = AiVerifier::new(Arc::new(FailingComparator), Duration::from_secs(1), 10);
        let li = record(Origin::LinkedIn, "Robert Smith");
        let crm = record(Origin::Crm, "Bob Smith");

        for _ in 0..2 {
            let verified = verifier.verify(&li, &crm).await;
            assert!(verified.is_failure());
            assert!(!verified.verdict.is_duplicate);
            assert_eq!(verified.verdict.confidence, ConfidenceTier::None);
            assert!(verified.error.unwrap().contains("connection refused"));
        }
        assert_eq!(verifier.calls(), 2);
        assert_eq!(verifier.cache_hits(), 0);
    }

    #[tokio::test]
    async fn test_timeout_becomes_fallback() {
        let verifier = AiVerifier::new(Arc::new(SlowComparator), Duration::from_millis(20), 0);
        let verified = verifier
            .verify(&record(Origin::LinkedIn, "Ann Lee"), &record(Origin::Crm, "Ann Lee"))
            .await;
        assert!(verified.is_failure());
        assert!(verified.verdict.reasoning.contains("timed out"));
    }
}
