// src/linkage/features.rs
use crate::matching::normalize::{normalize, tokens};
use crate::matching::similarity::{jaro_winkler, normalized_levenshtein};
use crate::models::contact::ContactRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkageField {
    FullName,
    GivenName,
    FamilyName,
    Email,
    Phone,
    Company,
    JobTitle,
    Location,
}

impl LinkageField {
    pub const ALL: [LinkageField; 8] = [
        LinkageField::FullName,
        LinkageField::GivenName,
        LinkageField::FamilyName,
        LinkageField::Email,
        LinkageField::Phone,
        LinkageField::Company,
        LinkageField::JobTitle,
        LinkageField::Location,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LinkageField::FullName => "full_name",
            LinkageField::GivenName => "given_name",
            LinkageField::FamilyName => "family_name",
            LinkageField::Email => "email",
            LinkageField::Phone => "phone",
            LinkageField::Company => "company",
            LinkageField::JobTitle => "job_title",
            LinkageField::Location => "location",
        }
    }
}

/// One similarity plus one missing indicator per field.
pub const FEATURE_COUNT: usize = LinkageField::ALL.len() * 2;

/// Per-field similarity of a pair; `None` where either side lacks the field.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonVector {
    pub similarities: [Option<f64>; 8],
}

impl ComparisonVector {
    /// Flattened as [sim_0, missing_0, sim_1, missing_1, ...]; a missing field has similarity 0.
    pub fn to_features(&self) -> Vec<f64> {
        let mut features = Vec::with_capacity(FEATURE_COUNT);
        for similarity in self.similarities {
            match similarity {
                Some(value) => {
                    features.push(value);
                    features.push(0.0);
                }
                None => {
                    features.push(0.0);
                    features.push(1.0);
                }
            }
        }
        features
    }

    pub fn get(&self, field: LinkageField) -> Option<f64> {
        LinkageField::ALL
            .iter()
            .position(|f| *f == field)
            .and_then(|i| self.similarities[i])
    }
}

#[derive(Debug, Clone, Default)]
struct LinkageValues {
    full_name: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    company: Option<String>,
    job_title: Option<String>,
    location: Option<String>,
}

fn phone_digits(phone: Option<&str>) -> Option<String> {
    let digits: String = phone?.chars().filter(char::is_ascii_digit).collect();
    (digits.len() >= 4).then_some(digits)
}

fn linkage_values(record: &ContactRecord) -> LinkageValues {
    let full_name = record.normalized_name();
    let full_tokens: Vec<String> = full_name
        .as_deref()
        .map(|name| tokens(name).into_iter().map(str::to_string).collect())
        .unwrap_or_default();
    let derived_given = (full_tokens.len() >= 2).then(|| full_tokens[0].clone());
    let derived_family = (full_tokens.len() >= 2).then(|| full_tokens[full_tokens.len() - 1].clone());

    LinkageValues {
        given_name: normalize(record.given_name.as_deref()).or(derived_given),
        family_name: normalize(record.family_name.as_deref()).or(derived_family),
        full_name,
        email: record.normalized_email(),
        phone: phone_digits(record.phone.as_deref()),
        company: record.normalized_company(),
        job_title: record.normalized_job_title(),
        location: normalize(record.location.as_deref()),
    }
}

fn both<F>(a: &Option<String>, b: &Option<String>, f: F) -> Option<f64>
where
    F: Fn(&str, &str) -> f64,
{
    match (a, b) {
        (Some(a), Some(b)) => Some(f(a, b)),
        _ => None,
    }
}

fn exact(a: &str, b: &str) -> f64 {
    if a == b {
        1.0
    } else {
        0.0
    }
}

pub fn compare_records(linkedin: &ContactRecord, crm: &ContactRecord) -> ComparisonVector {
    let a = linkage_values(linkedin);
    let b = linkage_values(crm);
    ComparisonVector {
        similarities: [
            both(&a.full_name, &b.full_name, jaro_winkler),
            both(&a.given_name, &b.given_name, jaro_winkler),
            both(&a.family_name, &b.family_name, jaro_winkler),
            both(&a.email, &b.email, exact),
            both(&a.phone, &b.phone, normalized_levenshtein),
            both(&a.company, &b.company, normalized_levenshtein),
            both(&a.job_title, &b.job_title, normalized_levenshtein),
            both(&a.location, &b.location, normalized_levenshtein),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::contact::Origin;

    #[test]
    fn test_feature_layout() {
        let mut li = ContactRecord::new(Origin::LinkedIn, 0);
        li.full_name = Some("Jane Doe".to_string());
        li.email = Some("jane@acme.com".to_string());
        let mut crm = ContactRecord::new(Origin::Crm, 0);
        crm.given_name = Some("Jane".to_string());
        crm.family_name = Some("Doe".to_string());
        crm.email = Some("Jane@Acme.com".to_string());
        crm.phone = Some("+49 30 123456".to_string());

        let vector = compare_records(&li, &crm);
        assert_eq!(vector.get(LinkageField::FullName), Some(1.0));
        assert_eq!(vector.get(LinkageField::GivenName), Some(1.0));
        assert_eq!(vector.get(LinkageField::FamilyName), Some(1.0));
        assert_eq!(vector.get(LinkageField::Email), Some(1.0));
        assert_eq!(vector.get(LinkageField::Phone), None);

        let features = vector.to_features();
        assert_eq!(features.len(), FEATURE_COUNT);
        // email similarity and its missing flag
        assert_eq!(&features[6..8], &[1.0, 0.0]);
        // phone missing on the LinkedIn side
        assert_eq!(&features[8..10], &[0.0, 1.0]);
    }

    #[test]
    fn test_different_emails_score_zero() {
        let mut li = ContactRecord::new(Origin::LinkedIn, 0);
        li.email = Some("jane@acme.com".to_string());
        let mut crm = ContactRecord::new(Origin::Crm, 0);
        crm.email = Some("jane@globex.com".to_string());
        assert_eq!(compare_records(&li, &crm).get(LinkageField::Email), Some(0.0));
    }
}
