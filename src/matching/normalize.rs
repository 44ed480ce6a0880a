// src/matching/normalize.rs
use deunicode::deunicode_char;
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

pub const HONORIFICS: [&str; 5] = ["dr", "prof", "mr", "mrs", "ms"];

pub const CORPORATE_SUFFIXES: [&str; 11] = [
    "gmbh", "ag", "ltd", "inc", "corp", "llc", "co", "sa", "bv", "plc", "limited",
];

// Anything outside the kept alphabet becomes a token separator.
static NON_TOKEN_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9@.\-'+_&]+").expect("static pattern"));

static POSITION_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s+(?:at|@)\s+").expect("static pattern"));

/// Lowercase ASCII spelling of `text`.
///
/// Latin diacritics are stripped through NFKD. Whatever is still non-ASCII after
/// that (Cyrillic, Greek, CJK, ligatures like ß or ø) is transliterated, so
/// "Иван Петров" becomes "ivan petrov". Characters without a spelling become spaces.
fn fold_to_ascii(text: &str) -> String {
    let mut folded = String::with_capacity(text.len());
    for c in text.to_lowercase().nfkd() {
        if is_combining_mark(c) {
            continue;
        }
        if c.is_ascii() {
            folded.push(c);
            continue;
        }
        match deunicode_char(c) {
            Some(spelling) => folded.push_str(spelling),
            None => folded.push(' '),
        }
    }
    folded.make_ascii_lowercase();
    folded
}

fn is_noise_token(token: &str) -> bool {
    if !token.chars().any(|c| c.is_ascii_alphanumeric()) {
        return true;
    }
    let bare = token.trim_end_matches('.');
    HONORIFICS.contains(&bare) || CORPORATE_SUFFIXES.contains(&bare)
}

/// Canonical comparison form of a free-text field.
///
/// Lowercased, transliterated to ASCII, punctuation turned into spaces,
/// honorifics and corporate suffixes removed as whole words, whitespace collapsed.
/// Blank input or blank output gives `None`. Applying it twice changes nothing.
pub fn normalize(text: Option<&str>) -> Option<String> {
    let text = text?.trim();
    if text.is_empty() {
        return None;
    }

    let folded = fold_to_ascii(text);
    let spaced = NON_TOKEN_CHARS.replace_all(&folded, " ");
    let kept: Vec<&str> = spaced
        .split_whitespace()
        .filter(|token| !is_noise_token(token))
        .collect();

    if kept.is_empty() {
        None
    } else {
        Some(kept.join(" "))
    }
}

/// Lowercased, trimmed address with a non-empty local part and domain.
pub fn normalize_email(email: Option<&str>) -> Option<String> {
    let email = email?.trim().to_lowercase();
    if email.chars().any(char::is_whitespace) {
        return None;
    }
    let (local, domain) = email.rsplit_once('@')?;
    if local.is_empty() || domain.is_empty() {
        return None;
    }
    Some(email)
}

pub fn email_local_part(email: &str) -> &str {
    email.rsplit_once('@').map(|(local, _)| local).unwrap_or(email)
}

pub fn email_domain(email: &str) -> Option<&str> {
    email
        .rsplit_once('@')
        .map(|(_, domain)| domain)
        .filter(|domain| !domain.is_empty())
}

/// Splits a "title at company" position line. The last separator wins,
/// so "Head of Research at Lab at University" keeps "University" as the company.
pub fn split_position(position: &str) -> (Option<String>, Option<String>) {
    let position = position.trim();
    if position.is_empty() {
        return (None, None);
    }
    match POSITION_SEPARATOR.find_iter(position).last() {
        Some(separator) => {
            let title = position[..separator.start()].trim();
            let company = position[separator.end()..].trim();
            (
                (!title.is_empty()).then(|| title.to_string()),
                (!company.is_empty()).then(|| company.to_string()),
            )
        }
        None => (Some(position.to_string()), None),
    }
}

/// Normalized text with every non-alphanumeric character removed, for compact keys.
pub fn blocking_token(text: Option<&str>) -> Option<String> {
    let normalized = normalize(text)?;
    let compact: String = normalized.chars().filter(char::is_ascii_alphanumeric).collect();
    (!compact.is_empty()).then_some(compact)
}

pub fn tokens(normalized: &str) -> Vec<&str> {
    normalized.split_whitespace().collect()
}
