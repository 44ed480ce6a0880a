// src/matching/blocking.rs
use log::debug;
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use crate::matching::normalize::{email_domain, normalize};
use crate::models::contact::{ContactRecord, Origin};
use crate::models::matching::CandidatePair;
use crate::models::stats_models::{BlockingStats, KeyKindStats, PipelineStage};
use crate::utils::pipeline_config::BlockingConfig;
use crate::utils::progress_bars::logging::StageLogger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BlockingKeyKind {
    FullName,
    NamePair,
    Email,
    EmailDomain,
    Company,
}

impl BlockingKeyKind {
    /// Processing order. Earlier kinds win the primary-key slot of a pair.
    pub const ALL: [BlockingKeyKind; 5] = [
        BlockingKeyKind::FullName,
        BlockingKeyKind::NamePair,
        BlockingKeyKind::Email,
        BlockingKeyKind::EmailDomain,
        BlockingKeyKind::Company,
    ];

    pub fn prefix(&self) -> &'static str {
        match self {
            BlockingKeyKind::FullName => "name",
            BlockingKeyKind::NamePair => "name_pair",
            BlockingKeyKind::Email => "email",
            BlockingKeyKind::EmailDomain => "domain",
            BlockingKeyKind::Company => "company",
        }
    }

    pub fn key(&self, value: &str) -> String {
        format!("{}:{}", self.prefix(), value)
    }
}

#[derive(Debug, Clone)]
pub struct BlockingOutput {
    pub candidates: Vec<CandidatePair>,
    pub stats: BlockingStats,
}

#[derive(Default)]
struct Bucket {
    linkedin: Vec<usize>,
    crm: Vec<usize>,
}

pub struct BlockingEngine {
    config: BlockingConfig,
}

fn compact(token: &str) -> String {
    token.chars().filter(char::is_ascii_alphanumeric).collect()
}

impl BlockingEngine {
    pub fn new(config: BlockingConfig) -> Self {
        Self { config }
    }

    /// Given and family blocking tokens: the first token of the given name and the last
    /// token of the family name, each falling back to the ends of the full name.
    fn name_parts(&self, record: &ContactRecord) -> Option<(String, String)> {
        let full = normalize(record.display_name().as_deref());
        let full_tokens: Vec<&str> = full.as_deref().map(|f| f.split_whitespace().collect()).unwrap_or_default();

        let given = normalize(record.given_name.as_deref())
            .and_then(|g| g.split_whitespace().next().map(compact))
            .or_else(|| (full_tokens.len() >= 2).then(|| compact(full_tokens[0])))?;
        let family = normalize(record.family_name.as_deref())
            .and_then(|f| f.split_whitespace().last().map(compact))
            .or_else(|| (full_tokens.len() >= 2).then(|| compact(full_tokens[full_tokens.len() - 1])))?;

        let min = self.config.min_name_part_len;
        (given.chars().count() >= min && family.chars().count() >= min).then_some((given, family))
    }

    /// Every blocking key a record contributes, at most one per kind.
    pub fn keys_for(&self, record: &ContactRecord) -> Vec<(BlockingKeyKind, String)> {
        let mut keys = Vec::with_capacity(BlockingKeyKind::ALL.len());

        if let Some(name) = record.normalized_name() {
            if name.chars().count() >= self.config.min_full_name_len {
                keys.push((BlockingKeyKind::FullName, BlockingKeyKind::FullName.key(&name)));
            }
        }

        if let Some((given, family)) = self.name_parts(record) {
            let value = format!("{}_{}", given, family);
            keys.push((BlockingKeyKind::NamePair, BlockingKeyKind::NamePair.key(&value)));
        }

        if let Some(email) = record.normalized_email() {
            keys.push((BlockingKeyKind::Email, BlockingKeyKind::Email.key(&email)));
            if let Some(domain) = email_domain(&email).filter(|d| !self.config.is_free_email_domain(d)) {
                keys.push((BlockingKeyKind::EmailDomain, BlockingKeyKind::EmailDomain.key(domain)));
            }
        }

        if let Some(company) = record.normalized_company() {
            if company.chars().count() >= self.config.min_company_len {
                keys.push((BlockingKeyKind::Company, BlockingKeyKind::Company.key(&company)));
            }
        }

        keys
    }

    fn index(
        &self,
        records: &[ContactRecord],
        origin: Origin,
        buckets: &mut HashMap<BlockingKeyKind, BTreeMap<String, Bucket>>,
    ) -> usize {
        let mut skipped = 0;
        for (idx, record) in records.iter().enumerate() {
            if !record.is_eligible() {
                skipped += 1;
                debug!("Skipping ineligible {} record {}", origin, record.label());
                continue;
            }
            for (kind, key) in self.keys_for(record) {
                let bucket = buckets.entry(kind).or_default().entry(key).or_default();
                match origin {
                    Origin::LinkedIn => bucket.linkedin.push(idx),
                    Origin::Crm => bucket.crm.push(idx),
                }
            }
        }
        skipped
    }

    /// Candidate pairs for two record sets: the LinkedIn × CRM cross product of every
    /// bucket holding both origins, deduplicated by index pair.
    pub fn generate_candidates(&self, linkedin: &[ContactRecord], crm: &[ContactRecord]) -> BlockingOutput {
        let start = Instant::now();
        let logger = StageLogger::new(PipelineStage::Blocking);

        let mut buckets: HashMap<BlockingKeyKind, BTreeMap<String, Bucket>> = HashMap::new();
        logger.log_data_loaded(linkedin.len(), "LinkedIn");
        logger.log_data_loaded(crm.len(), "CRM");
        let skipped_linkedin = self.index(linkedin, Origin::LinkedIn, &mut buckets);
        let skipped_crm = self.index(crm, Origin::Crm, &mut buckets);
        logger.log_data_quality_issue("LinkedIn records with fewer than two usable fields", skipped_linkedin);
        logger.log_data_quality_issue("CRM records with fewer than two usable fields", skipped_crm);

        let mut candidates: Vec<CandidatePair> = Vec::new();
        let mut positions: HashMap<(usize, usize), usize> = HashMap::new();
        let mut key_stats: BTreeMap<String, KeyKindStats> = BTreeMap::new();

        for kind in BlockingKeyKind::ALL {
            let kind_stats = key_stats.entry(kind.prefix().to_string()).or_default();
            let Some(kind_buckets) = buckets.get(&kind) else {
                continue;
            };
            kind_stats.buckets = kind_buckets.len();

            for (key, bucket) in kind_buckets {
                if bucket.linkedin.is_empty() || bucket.crm.is_empty() {
                    continue;
                }
                kind_stats.cross_source_buckets += 1;
                kind_stats.pairs_emitted += bucket.linkedin.len() * bucket.crm.len();

                for &li_idx in &bucket.linkedin {
                    for &crm_idx in &bucket.crm {
                        match positions.get(&(li_idx, crm_idx)) {
                            Some(&position) => {
                                let pair = &mut candidates[position];
                                if !pair.blocking_keys.iter().any(|k| k == key) {
                                    pair.blocking_keys.push(key.clone());
                                }
                            }
                            None => {
                                positions.insert((li_idx, crm_idx), candidates.len());
                                candidates.push(CandidatePair::new(li_idx, crm_idx, key.clone()));
                            }
                        }
                    }
                }
            }
        }

        let potential = linkedin.len() as u64 * crm.len() as u64;
        let reduction_factor = if candidates.is_empty() {
            1.0
        } else {
            potential as f64 / candidates.len() as f64
        };
        logger.log_reduction(potential, candidates.len(), reduction_factor);

        let stats = BlockingStats {
            linkedin_records: linkedin.len(),
            crm_records: crm.len(),
            skipped_linkedin_records: skipped_linkedin,
            skipped_crm_records: skipped_crm,
            potential_comparisons: potential,
            candidate_pairs: candidates.len(),
            reduction_factor,
            keys: key_stats,
            elapsed_secs: start.elapsed().as_secs_f64(),
        };

        BlockingOutput { candidates, stats }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(origin: Origin, idx: usize, name: &str, email: Option<&str>, company: Option<&str>) -> ContactRecord {
        let mut record = ContactRecord::new(origin, idx);
        record.full_name = Some(name.to_string());
        record.email = email.map(str::to_string);
        record.company = company.map(str::to_string);
        record
    }

    fn engine() -> BlockingEngine {
        BlockingEngine::new(BlockingConfig::default())
    }

    #[test]
    fn test_identical_names_always_become_candidates() {
        let linkedin = vec![
            person(Origin::LinkedIn, 0, "Dr. Zoë Müller", None, Some("Initech")),
            person(Origin::LinkedIn, 1, "Ann Li", Some("ann@globex.com"), None),
        ];
        let crm = vec![
            person(Origin::Crm, 0, "Ann Li", None, Some("Hooli")),
            person(Origin::Crm, 1, "zoe muller", Some("zm@other.org"), None),
        ];
        let output = engine().generate_candidates(&linkedin, &crm);
        let pairs: Vec<(usize, usize)> = output.candidates.iter().map(|c| c.index_key()).collect();
        assert!(pairs.contains(&(0, 1)));
        assert!(pairs.contains(&(1, 0)));
        let zoe = output.candidates.iter().find(|c| c.index_key() == (0, 1)).unwrap();
        assert_eq!(zoe.primary_key(), "name:zoe muller");
    }

    #[test]
    fn test_pairs_are_deduplicated_and_keys_unioned() {
        let linkedin = vec![person(Origin::LinkedIn, 0, "Jane Doe", Some("jane@acme.com"), Some("Acme Robotics"))];
        let crm = vec![person(Origin::Crm, 0, "Jane Doe", Some("jane@acme.com"), Some("Acme Robotics GmbH"))];
        let output = engine().generate_candidates(&linkedin, &crm);
        assert_eq!(output.candidates.len(), 1);
        let pair = &output.candidates[0];
        assert_eq!(
            pair.blocking_keys,
            vec![
                "name:jane doe".to_string(),
                "name_pair:jane_doe".to_string(),
                "email:jane@acme.com".to_string(),
                "domain:acme.com".to_string(),
                "company:acme robotics".to_string(),
            ]
        );
        assert_eq!(output.stats.reduction_factor, 1.0);
    }

    #[test]
    fn test_free_mail_domains_do_not_block() {
        let linkedin = vec![person(Origin::LinkedIn, 0, "Jane Doe", Some("jane.d@gmail.com"), None)];
        let crm = vec![person(Origin::Crm, 0, "Max Muster", Some("max.m@gmail.com"), None)];
        let output = engine().generate_candidates(&linkedin, &crm);
        assert!(output.candidates.is_empty());
        assert_eq!(output.stats.keys["domain"].buckets, 0);
    }

    #[test]
    fn test_short_values_are_not_keys() {
        let mut li = ContactRecord::new(Origin::LinkedIn, 0);
        li.full_name = Some("Al".to_string());
        li.company = Some("AB".to_string());
        let keys = engine().keys_for(&li);
        assert!(keys.is_empty());
    }

    #[test]
    fn test_name_pair_key_uses_split_fields() {
        let mut crm = ContactRecord::new(Origin::Crm, 0);
        crm.given_name = Some("Anna Maria".to_string());
        crm.family_name = Some("von Schmidt".to_string());
        let li = person(Origin::LinkedIn, 0, "Anna Schmidt", None, Some("Siemens"));
        let engine = engine();
        let crm_keys: Vec<String> = engine.keys_for(&crm).into_iter().map(|(_, k)| k).collect();
        let li_keys: Vec<String> = engine.keys_for(&li).into_iter().map(|(_, k)| k).collect();
        assert!(crm_keys.contains(&"name_pair:anna_schmidt".to_string()));
        assert!(li_keys.contains(&"name_pair:anna_schmidt".to_string()));
    }

    #[test]
    fn test_cyrillic_names_are_blocked_together() {
        let linkedin = vec![person(Origin::LinkedIn, 0, "Иван Петров", None, Some("Яндекс"))];
        let crm = vec![person(Origin::Crm, 0, "Иван Петров", None, Some("Яндекс"))];
        let output = engine().generate_candidates(&linkedin, &crm);
        assert_eq!(output.candidates.len(), 1);
        assert_eq!(output.stats.skipped_linkedin_records, 0);
        assert_eq!(output.stats.skipped_crm_records, 0);
        assert!(engine()
            .keys_for(&linkedin[0])
            .iter()
            .any(|(_, key)| key.contains("ivan")));
    }

    #[test]
    fn test_ineligible_records_are_skipped_and_counted() {
        let mut lonely = ContactRecord::new(Origin::LinkedIn, 0);
        lonely.full_name = Some("Jane Doe".to_string());
        let linkedin = vec![lonely];
        let crm = vec![person(Origin::Crm, 0, "Jane Doe", None, Some("Acme"))];
        let output = engine().generate_candidates(&linkedin, &crm);
        assert!(output.candidates.is_empty());
        assert_eq!(output.stats.skipped_linkedin_records, 1);
        assert_eq!(output.stats.skipped_crm_records, 0);
    }

    #[test]
    fn test_candidates_never_exceed_cross_product() {
        let companies = ["Acme", "Globex", "Initech"];
        let linkedin: Vec<ContactRecord> = (0..12)
            .map(|i| person(Origin::LinkedIn, i, &format!("Person {} Lastname", i % 4), None, Some(companies[i % 3])))
            .collect();
        let crm: Vec<ContactRecord> = (0..9)
            .map(|i| person(Origin::Crm, i, &format!("Person {} Lastname", i % 5), None, Some(companies[i % 2])))
            .collect();
        let output = engine().generate_candidates(&linkedin, &crm);
        assert!(output.candidates.len() <= linkedin.len() * crm.len());
        assert_eq!(output.stats.potential_comparisons, 108);
        assert!(output.stats.reduction_factor >= 1.0);

        let mut seen = std::collections::HashSet::new();
        for pair in &output.candidates {
            assert!(seen.insert(pair.index_key()), "duplicate pair {:?}", pair.index_key());
        }
    }

    #[test]
    fn test_blocking_is_deterministic() {
        let linkedin: Vec<ContactRecord> = (0..6)
            .map(|i| person(Origin::LinkedIn, i, &format!("Sam Taylor{}", i % 2), None, Some("Umbrella")))
            .collect();
        let crm: Vec<ContactRecord> = (0..6)
            .map(|i| person(Origin::Crm, i, &format!("Sam Taylor{}", i % 3), None, Some("Umbrella Corp")))
            .collect();
        let first = engine().generate_candidates(&linkedin, &crm).candidates;
        let second = engine().generate_candidates(&linkedin, &crm).candidates;
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_inputs_give_no_candidates() {
        let output = engine().generate_candidates(&[], &[]);
        assert!(output.candidates.is_empty());
        assert_eq!(output.stats.reduction_factor, 1.0);
    }
}
