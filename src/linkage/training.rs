// src/linkage/training.rs
use std::collections::BTreeMap;

use crate::linkage::features::compare_records;
use crate::linkage::model::TrainingExample;
use crate::models::contact::ContactRecord;
use crate::utils::pipeline_config::LinkageConfig;

const MIN_NEGATIVE_NAME_LEN: usize = 4;
const SHARED_WORD_MIN_LEN: usize = 3;

#[derive(Debug, Clone, Default)]
pub struct TrainingSet {
    pub examples: Vec<TrainingExample>,
    pub positives: usize,
    pub negatives: usize,
}

impl TrainingSet {
    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }
}

fn clearly_different_names(linkedin_name: &str, crm_name: &str) -> bool {
    linkedin_name.chars().count() >= MIN_NEGATIVE_NAME_LEN
        && crm_name.chars().count() >= MIN_NEGATIVE_NAME_LEN
        && !crm_name
            .split_whitespace()
            .any(|word| word.len() >= SHARED_WORD_MIN_LEN && linkedin_name.contains(word))
}

/// Labelled pairs derived from the data itself.
///
/// Positives: one pair per email address present in both sources (first record of
/// each origin carrying it). Negatives: pairs of clearly different names drawn only
/// from the first `negative_sample_records` eligible records of each source, capped
/// at `max_negative_examples`. The negatives are therefore biased toward whatever
/// happens to sit at the head of the input.
pub fn bootstrap_training_set(
    linkedin: &[ContactRecord],
    crm: &[ContactRecord],
    config: &LinkageConfig,
) -> TrainingSet {
    let eligible_linkedin: Vec<&ContactRecord> = linkedin.iter().filter(|r| r.is_eligible()).collect();
    let eligible_crm: Vec<&ContactRecord> = crm.iter().filter(|r| r.is_eligible()).collect();

    let mut set = TrainingSet::default();

    let mut linkedin_by_email: BTreeMap<String, &ContactRecord> = BTreeMap::new();
    for record in &eligible_linkedin {
        if let Some(email) = record.normalized_email() {
            linkedin_by_email.entry(email).or_insert(*record);
        }
    }
    let mut crm_by_email: BTreeMap<String, &ContactRecord> = BTreeMap::new();
    for record in &eligible_crm {
        if let Some(email) = record.normalized_email() {
            crm_by_email.entry(email).or_insert(*record);
        }
    }
    for (email, crm_record) in &crm_by_email {
        if let Some(li_record) = linkedin_by_email.get(email) {
            set.examples.push(TrainingExample {
                features: compare_records(li_record, crm_record).to_features(),
                label: 1.0,
            });
            set.positives += 1;
        }
    }

    'outer: for crm_record in eligible_crm.iter().take(config.negative_sample_records) {
        let Some(crm_name) = crm_record.normalized_name() else {
            continue;
        };
        for li_record in eligible_linkedin.iter().take(config.negative_sample_records) {
            if set.negatives >= config.max_negative_examples {
                break 'outer;
            }
            let Some(li_name) = li_record.normalized_name() else {
                continue;
            };
            if clearly_different_names(&li_name, &crm_name) {
                set.examples.push(TrainingExample {
                    features: compare_records(li_record, crm_record).to_features(),
                    label: 0.0,
                });
                set.negatives += 1;
            }
        }
    }

    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::contact::Origin;

    fn record(origin: Origin, idx: usize, name: &str, email: Option<&str>) -> ContactRecord {
        let mut record = ContactRecord::new(origin, idx);
        record.full_name = Some(name.to_string());
        record.email = email.map(str::to_string);
        record.company = Some("Acme".to_string());
        record
    }

    #[test]
    fn test_positives_from_shared_emails() {
        let linkedin = vec![
            record(Origin::LinkedIn, 0, "Jane Doe", Some("jane@acme.com")),
            record(Origin::LinkedIn, 1, "Max Muster", Some("max@acme.com")),
        ];
        let crm = vec![
            record(Origin::Crm, 0, "Jane Doe", Some("JANE@acme.com")),
            record(Origin::Crm, 1, "Erika Example", Some("erika@acme.com")),
        ];
        let set = bootstrap_training_set(&linkedin, &crm, &LinkageConfig::default());
        assert_eq!(set.positives, 1);
        assert_eq!(set.examples.iter().filter(|e| e.label == 1.0).count(), 1);
    }

    #[test]
    fn test_negatives_need_clearly_different_names() {
        let linkedin = vec![
            record(Origin::LinkedIn, 0, "Jane Doe", None),
            record(Origin::LinkedIn, 1, "Bob Smith", None),
        ];
        let crm = vec![record(Origin::Crm, 0, "Robert Smith", None)];
        let set = bootstrap_training_set(&linkedin, &crm, &LinkageConfig::default());
        // "smith" is shared with Bob Smith, so only Jane Doe qualifies.
        assert_eq!(set.negatives, 1);
        assert_eq!(set.positives, 0);
    }

    #[test]
    fn test_negatives_are_capped_and_sampled_from_the_head() {
        let linkedin: Vec<ContactRecord> = (0..30)
            .map(|i| record(Origin::LinkedIn, i, &format!("Linkedin Person{}", i), None))
            .collect();
        let crm: Vec<ContactRecord> = (0..30)
            .map(|i| record(Origin::Crm, i, &format!("Crm Contact{}", i), None))
            .collect();
        let mut config = LinkageConfig::default();
        let set = bootstrap_training_set(&linkedin, &crm, &config);
        assert_eq!(set.negatives, 20);

        config.negative_sample_records = 2;
        let set = bootstrap_training_set(&linkedin, &crm, &config);
        assert_eq!(set.negatives, 4);
    }

    #[test]
    fn test_no_data_gives_empty_set() {
        let set = bootstrap_training_set(&[], &[], &LinkageConfig::default());
        assert!(set.is_empty());
    }
}
