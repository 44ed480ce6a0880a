// src/verification/prompt.rs
use crate::matching::normalize::normalize;
use crate::models::contact::ContactRecord;

pub const SYSTEM_INSTRUCTIONS: &str = "\
You are a contact duplicate detection expert. Compare a LinkedIn contact with a CRM contact \
and decide whether they are the same person.

Return JSON with:
- is_duplicate: true/false
- confidence: \"high\", \"medium\", \"low\" or \"none\"
- similarity_score: 0.0 to 1.0
- reasoning: brief explanation
- matching_fields: fields that agree (e.g. \"name\", \"company\", \"email\", \"job_title\")
- conflicting_fields: fields that disagree

Confidence levels:
- high: 95% or more certain (name plus company match, or a unique identifier such as email)
- medium: 70-95% certain (name plus some professional details match)
- low: 40-70% certain (partial matches only)
- none: below 40% (major conflicts or no significant matches)

Nicknames and short forms of first names (Bob for Robert, Kate for Katherine) can refer to the same person. \
Focus on name similarity, company and job alignment, and contact information.";

const ABSENT: &str = "none";

fn shown(value: Option<String>) -> String {
    value.unwrap_or_else(|| ABSENT.to_string())
}

/// Labelled, normalized values a prompt shows for one record, in prompt order.
pub fn prompt_fields(record: &ContactRecord) -> [(&'static str, Option<String>); 6] {
    [
        ("name", record.normalized_name()),
        ("given name", normalize(record.given_name.as_deref())),
        ("family name", normalize(record.family_name.as_deref())),
        ("company", record.normalized_company()),
        ("position", record.normalized_job_title()),
        ("email", record.normalized_email()),
    ]
}

fn describe(record: &ContactRecord) -> String {
    prompt_fields(record)
        .into_iter()
        .map(|(label, value)| format!("{}: {}", label, shown(value)))
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Comparison prompt for one pair. Absent values are written as `none`.
pub fn build_prompt(linkedin: &ContactRecord, crm: &ContactRecord) -> String {
    format!(
        "Compare these contacts:\n\nLinkedIn: {}\nCRM: {}\n\n\
         Are these the same person? Consider name similarity, company/job alignment, \
         and any matching contact details.",
        describe(linkedin),
        describe(crm)
    )
}
