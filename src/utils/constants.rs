// src/utils/constants.rs

// Tier cutoffs for the weighted scorer.
pub const DEFAULT_HIGH_CUTOFF: f64 = 0.8;
pub const DEFAULT_MEDIUM_CUTOFF: f64 = 0.6;

/// Upper bound on AI comparisons per run.
pub const DEFAULT_MAX_AI_COMPARISONS: usize = 1000;
/// Low-tier matches are informational only, so the report keeps just the first few.
pub const DEFAULT_LOW_CONFIDENCE_OUTPUT_LIMIT: usize = 100;

pub const DEFAULT_MIN_FULL_NAME_LEN: usize = 3;
pub const DEFAULT_MIN_NAME_PART_LEN: usize = 2;
pub const DEFAULT_MIN_COMPANY_LEN: usize = 3;

/// Webmail providers. A shared domain here says nothing about two people being related.
pub const FREE_EMAIL_DOMAINS: [&str; 18] = [
    "gmail.com",
    "googlemail.com",
    "outlook.com",
    "hotmail.com",
    "live.com",
    "msn.com",
    "yahoo.com",
    "icloud.com",
    "me.com",
    "aol.com",
    "gmx.de",
    "gmx.net",
    "web.de",
    "t-online.de",
    "proton.me",
    "protonmail.com",
    "mail.com",
    "yandex.ru",
];

pub const DEFAULT_NAME_WEIGHT: f64 = 0.4;
pub const DEFAULT_EMAIL_WEIGHT: f64 = 0.4;
pub const DEFAULT_COMPANY_WEIGHT: f64 = 0.2;
pub const DEFAULT_JOB_TITLE_WEIGHT: f64 = 0.0;
pub const DEFAULT_EXACT_EMAIL_BOOST: f64 = 0.3;
pub const DEFAULT_SIGNIFICANT_TOKEN_BONUS: f64 = 0.2;
/// Contribution of a field that is absent on either side: no evidence either way.
pub const DEFAULT_MISSING_FIELD_SCORE: f64 = 0.5;

pub const DEFAULT_RECALL_WEIGHT: f64 = 1.0;
pub const DEFAULT_LEARNING_RATE: f64 = 0.5;
pub const DEFAULT_TRAINING_EPOCHS: usize = 500;
pub const DEFAULT_L2_PENALTY: f64 = 0.01;
pub const DEFAULT_MAX_NEGATIVE_EXAMPLES: usize = 20;
pub const DEFAULT_NEGATIVE_SAMPLE_RECORDS: usize = 10;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "mistral-small:24b";
pub const DEFAULT_AI_CONCURRENCY: usize = 1;
pub const DEFAULT_AI_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_AI_MAX_RETRIES: usize = 3;
pub const DEFAULT_VERDICT_CACHE_SIZE: usize = 5000;
