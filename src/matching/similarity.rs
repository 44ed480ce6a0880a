// src/matching/similarity.rs
//
// Field comparators shared by the weighted scorer, the linkage features and the
// match explanations. Inputs are expected to be normalized already.

use std::collections::BTreeSet;

use crate::matching::normalize::{email_local_part, normalize};
use crate::models::contact::ContactRecord;

/// Tokens at least this long count as "significant" when names are compared.
pub const SIGNIFICANT_TOKEN_MIN_LEN: usize = 3;
const TITLE_WORD_MIN_LEN: usize = 4;

fn token_set(text: &str) -> BTreeSet<&str> {
    text.split_whitespace().collect()
}

pub fn token_jaccard(a: &str, b: &str) -> f64 {
    let set_a = token_set(a);
    let set_b = token_set(b);
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}

/// Exact match scores 1.0. Otherwise token Jaccard plus `significant_bonus`
/// for every shared token of three or more characters, capped at 1.0.
pub fn name_similarity(a: &str, b: &str, significant_bonus: f64) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    let set_a = token_set(a);
    let set_b = token_set(b);
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let shared: Vec<&&str> = set_a.intersection(&set_b).collect();
    let union = set_a.union(&set_b).count();
    let jaccard = shared.len() as f64 / union as f64;
    let significant = shared
        .iter()
        .filter(|token| token.len() >= SIGNIFICANT_TOKEN_MIN_LEN)
        .count();
    (jaccard + significant_bonus * significant as f64).min(1.0)
}

pub fn email_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    let local_a = email_local_part(a);
    let local_b = email_local_part(b);
    if local_a.is_empty() || local_b.is_empty() {
        return 0.0;
    }
    if local_a == local_b {
        0.8
    } else if local_a.contains(local_b) || local_b.contains(local_a) {
        0.6
    } else {
        0.0
    }
}

pub fn company_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        1.0
    } else if a.contains(b) || b.contains(a) {
        0.8
    } else {
        token_jaccard(a, b)
    }
}

pub fn jaro_winkler(a: &str, b: &str) -> f64 {
    strsim::jaro_winkler(a, b)
}

pub fn normalized_levenshtein(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

/// Human-readable reasons two records look alike, attached to reported matches.
pub fn match_reasons(linkedin: &ContactRecord, crm: &ContactRecord) -> Vec<String> {
    let mut reasons = Vec::new();

    if let (Some(li_name), Some(crm_name)) = (linkedin.normalized_name(), crm.normalized_name()) {
        if li_name == crm_name {
            reasons.push("Exact name match".to_string());
        } else if li_name.contains(&crm_name) || crm_name.contains(&li_name) {
            reasons.push("Partial name match".to_string());
        } else if crm_name
            .split_whitespace()
            .any(|word| word.len() >= SIGNIFICANT_TOKEN_MIN_LEN && li_name.contains(word))
        {
            reasons.push("Name words match".to_string());
        }
    }

    if let (Some(li_email), Some(crm_email)) = (linkedin.normalized_email(), crm.normalized_email()) {
        if li_email == crm_email {
            reasons.push("Exact email match".to_string());
        } else if email_local_part(&li_email) == email_local_part(&crm_email) {
            reasons.push("Email username match".to_string());
        }
    }

    if let (Some(li_company), Some(crm_company)) =
        (linkedin.normalized_company(), crm.normalized_company())
    {
        if li_company == crm_company {
            reasons.push("Exact company match".to_string());
        } else if li_company.contains(&crm_company) || crm_company.contains(&li_company) {
            reasons.push("Partial company match".to_string());
        }
    }

    if let (Some(li_title), Some(crm_title)) = (
        normalize(linkedin.job_title.as_deref()),
        normalize(crm.job_title.as_deref()),
    ) {
        if li_title == crm_title {
            reasons.push("Exact job title match".to_string());
        } else if crm_title
            .split_whitespace()
            .any(|word| word.len() >= TITLE_WORD_MIN_LEN && li_title.contains(word))
        {
            reasons.push("Job title words match".to_string());
        }
    }

    reasons
}
