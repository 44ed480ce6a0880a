// src/verification/cache.rs
use lru::LruCache;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

use crate::models::contact::ContactRecord;
use crate::models::matching::Verdict;
use crate::verification::prompt::prompt_fields;

/// Digest of every value the comparison prompt shows. Two pairs with the same
/// signature send the model the same prompt.
pub fn pair_signature(linkedin: &ContactRecord, crm: &ContactRecord) -> String {
    let mut hasher = Sha256::new();
    for record in [linkedin, crm] {
        for (_, value) in prompt_fields(record) {
            hasher.update(value.as_deref().unwrap_or("").as_bytes());
            hasher.update(b"\x1f");
        }
        hasher.update(b"\x1e");
    }
    hex::encode(hasher.finalize())
}

/// Successful verdicts keyed by pair signature.
pub struct VerdictCache {
    entries: Mutex<LruCache<String, Verdict>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl VerdictCache {
    /// `None` for a zero capacity, which disables caching.
    pub fn new(capacity: usize) -> Option<Self> {
        let capacity = NonZeroUsize::new(capacity)?;
        Some(Self {
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        })
    }

    pub async fn get(&self, signature: &str) -> Option<Verdict> {
        let mut entries = self.entries.lock().await;
        match entries.get(signature) {
            Some(verdict) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(verdict.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub async fn put(&self, signature: String, verdict: Verdict) {
        self.entries.lock().await.put(signature, verdict);
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::contact::Origin;
    use crate::models::matching::ConfidenceTier;
    use crate::verification::prompt::build_prompt;

    fn record(origin: Origin, name: &str) -> ContactRecord {
        let mut record = ContactRecord::new(origin, 0);
        record.full_name = Some(name.to_string());
        record.company = Some("Acme".to_string());
        record
    }

    #[test]
    fn test_signature_ignores_formatting_noise() {
        let a = pair_signature(&record(Origin::LinkedIn, "Dr. Jane Doe"), &record(Origin::Crm, "Bob Smith"));
        let b = pair_signature(&record(Origin::LinkedIn, "jane  DOE"), &record(Origin::Crm, "bob smith"));
        let c = pair_signature(&record(Origin::LinkedIn, "Bob Smith"), &record(Origin::Crm, "Jane Doe"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_signature_tracks_every_prompt_field() {
        let crm = record(Origin::Crm, "Jane Doe");
        let plain = record(Origin::LinkedIn, "Jane Doe");
        let mut split = plain.clone();
        split.given_name = Some("Jane".to_string());

        assert_ne!(build_prompt(&plain, &crm), build_prompt(&split, &crm));
        assert_ne!(pair_signature(&plain, &crm), pair_signature(&split, &crm));

        let mut same = split.clone();
        same.given_name = Some(" JANE ".to_string());
        assert_eq!(build_prompt(&split, &crm), build_prompt(&same, &crm));
        assert_eq!(pair_signature(&split, &crm), pair_signature(&same, &crm));
    }

    #[tokio::test]
    async fn test_cache_hits_and_misses() {
        let cache = VerdictCache::new(2).unwrap();
        let verdict = Verdict {
            is_duplicate: true,
            confidence: ConfidenceTier::High,
            similarity_score: 0.97,
            reasoning: "same person".to_string(),
            matching_fields: vec!["name".to_string()],
            conflicting_fields: vec![],
        };
        assert!(cache.get("a").await.is_none());
        cache.put("a".to_string(), verdict.clone()).await;
        assert_eq!(cache.get("a").await, Some(verdict));
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn test_zero_capacity_disables_cache() {
        assert!(VerdictCache::new(0).is_none());
    }
}
