// src/utils/pipeline_config.rs
use anyhow::{bail, Result};
use log::info;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::matching::scorer::ScorerKind;
use crate::models::matching::ConfidenceTier;
use crate::utils::constants::*;

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

/// Score cutoffs separating the high, medium and low tiers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierThresholds {
    pub high_cutoff: f64,
    pub medium_cutoff: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            high_cutoff: DEFAULT_HIGH_CUTOFF,
            medium_cutoff: DEFAULT_MEDIUM_CUTOFF,
        }
    }
}

impl TierThresholds {
    pub fn new(high_cutoff: f64, medium_cutoff: f64) -> Result<Self> {
        let thresholds = Self {
            high_cutoff,
            medium_cutoff,
        };
        thresholds.validate()?;
        Ok(thresholds)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.high_cutoff.is_finite() || !self.medium_cutoff.is_finite() {
            bail!("Tier thresholds must be finite numbers");
        }
        if !(0.0 <= self.medium_cutoff && self.medium_cutoff < self.high_cutoff && self.high_cutoff <= 1.0) {
            bail!(
                "Invalid tier thresholds: require 0 <= medium ({}) < high ({}) <= 1",
                self.medium_cutoff,
                self.high_cutoff
            );
        }
        Ok(())
    }

    /// High, Medium or Low for a score. Never returns `ConfidenceTier::None`.
    pub fn tier_for(&self, score: f64) -> ConfidenceTier {
        if score >= self.high_cutoff {
            ConfidenceTier::High
        } else if score >= self.medium_cutoff {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        }
    }
}

#[derive(Debug, Clone)]
pub struct BlockingConfig {
    pub min_full_name_len: usize,
    pub min_name_part_len: usize,
    pub min_company_len: usize,
    pub free_email_domains: Vec<String>,
}

impl Default for BlockingConfig {
    fn default() -> Self {
        Self {
            min_full_name_len: DEFAULT_MIN_FULL_NAME_LEN,
            min_name_part_len: DEFAULT_MIN_NAME_PART_LEN,
            min_company_len: DEFAULT_MIN_COMPANY_LEN,
            free_email_domains: FREE_EMAIL_DOMAINS.iter().map(|d| d.to_string()).collect(),
        }
    }
}

impl BlockingConfig {
    pub fn from_env() -> Self {
        let mut config = Self {
            min_full_name_len: env_or("BLOCKING_MIN_FULL_NAME_LEN", DEFAULT_MIN_FULL_NAME_LEN),
            min_name_part_len: env_or("BLOCKING_MIN_NAME_PART_LEN", DEFAULT_MIN_NAME_PART_LEN),
            min_company_len: env_or("BLOCKING_MIN_COMPANY_LEN", DEFAULT_MIN_COMPANY_LEN),
            ..Default::default()
        };
        let extra: Vec<String> = env::var("BLOCKING_EXTRA_FREE_DOMAINS")
            .unwrap_or_else(|_| String::new())
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        config.free_email_domains.extend(extra);
        config
    }

    /// True for a denylisted domain or any subdomain of one.
    pub fn is_free_email_domain(&self, domain: &str) -> bool {
        self.free_email_domains.iter().any(|free| {
            domain == free
                || (domain.len() > free.len()
                    && domain.ends_with(free.as_str())
                    && domain.as_bytes()[domain.len() - free.len() - 1] == b'.')
        })
    }
}

#[derive(Debug, Clone)]
pub struct ScoringWeights {
    pub name: f64,
    pub email: f64,
    pub company: f64,
    pub job_title: f64,
    pub exact_email_boost: f64,
    pub significant_token_bonus: f64,
    pub missing_field_score: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME_WEIGHT,
            email: DEFAULT_EMAIL_WEIGHT,
            company: DEFAULT_COMPANY_WEIGHT,
            job_title: DEFAULT_JOB_TITLE_WEIGHT,
            exact_email_boost: DEFAULT_EXACT_EMAIL_BOOST,
            significant_token_bonus: DEFAULT_SIGNIFICANT_TOKEN_BONUS,
            missing_field_score: DEFAULT_MISSING_FIELD_SCORE,
        }
    }
}

impl ScoringWeights {
    pub fn from_env() -> Self {
        Self {
            name: env_or("WEIGHT_NAME", DEFAULT_NAME_WEIGHT),
            email: env_or("WEIGHT_EMAIL", DEFAULT_EMAIL_WEIGHT),
            company: env_or("WEIGHT_COMPANY", DEFAULT_COMPANY_WEIGHT),
            job_title: env_or("WEIGHT_JOB_TITLE", DEFAULT_JOB_TITLE_WEIGHT),
            exact_email_boost: env_or("EXACT_EMAIL_BOOST", DEFAULT_EXACT_EMAIL_BOOST),
            significant_token_bonus: env_or("SIGNIFICANT_TOKEN_BONUS", DEFAULT_SIGNIFICANT_TOKEN_BONUS),
            missing_field_score: env_or("MISSING_FIELD_SCORE", DEFAULT_MISSING_FIELD_SCORE),
        }
    }

    fn validate(&self) -> Result<()> {
        let values = [
            ("name", self.name),
            ("email", self.email),
            ("company", self.company),
            ("job_title", self.job_title),
            ("exact_email_boost", self.exact_email_boost),
            ("significant_token_bonus", self.significant_token_bonus),
        ];
        for (label, value) in values {
            if !value.is_finite() || value < 0.0 {
                bail!("Scoring weight '{}' must be a non-negative number, got {}", label, value);
            }
        }
        if !(0.0..=1.0).contains(&self.missing_field_score) {
            bail!("missing_field_score must lie in [0, 1], got {}", self.missing_field_score);
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct LinkageConfig {
    pub recall_weight: f64,
    pub learning_rate: f64,
    pub epochs: usize,
    pub l2_penalty: f64,
    pub max_negative_examples: usize,
    pub negative_sample_records: usize,
}

impl Default for LinkageConfig {
    fn default() -> Self {
        Self {
            recall_weight: DEFAULT_RECALL_WEIGHT,
            learning_rate: DEFAULT_LEARNING_RATE,
            epochs: DEFAULT_TRAINING_EPOCHS,
            l2_penalty: DEFAULT_L2_PENALTY,
            max_negative_examples: DEFAULT_MAX_NEGATIVE_EXAMPLES,
            negative_sample_records: DEFAULT_NEGATIVE_SAMPLE_RECORDS,
        }
    }
}

impl LinkageConfig {
    pub fn from_env() -> Self {
        Self {
            recall_weight: env_or("LINKAGE_RECALL_WEIGHT", DEFAULT_RECALL_WEIGHT),
            learning_rate: env_or("LINKAGE_LEARNING_RATE", DEFAULT_LEARNING_RATE),
            epochs: env_or("LINKAGE_EPOCHS", DEFAULT_TRAINING_EPOCHS),
            l2_penalty: env_or("LINKAGE_L2_PENALTY", DEFAULT_L2_PENALTY),
            max_negative_examples: env_or("LINKAGE_MAX_NEGATIVE_EXAMPLES", DEFAULT_MAX_NEGATIVE_EXAMPLES),
            negative_sample_records: env_or("LINKAGE_NEGATIVE_SAMPLE_RECORDS", DEFAULT_NEGATIVE_SAMPLE_RECORDS),
        }
    }

    fn validate(&self) -> Result<()> {
        if !self.recall_weight.is_finite() || self.recall_weight <= 0.0 {
            bail!("recall_weight must be positive, got {}", self.recall_weight);
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            bail!("learning_rate must be positive, got {}", self.learning_rate);
        }
        if !self.l2_penalty.is_finite() || self.l2_penalty < 0.0 {
            bail!("l2_penalty must be non-negative, got {}", self.l2_penalty);
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct VerifierConfig {
    pub ollama_url: String,
    pub model: String,
    pub concurrency: usize,
    pub request_timeout_secs: u64,
    pub max_retries: usize,
    pub temperature: f32,
    pub top_p: f32,
    pub repeat_penalty: f32,
    pub cache_size: usize,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            model: DEFAULT_OLLAMA_MODEL.to_string(),
            concurrency: DEFAULT_AI_CONCURRENCY,
            request_timeout_secs: DEFAULT_AI_REQUEST_TIMEOUT_SECS,
            max_retries: DEFAULT_AI_MAX_RETRIES,
            temperature: 0.1,
            top_p: 0.9,
            repeat_penalty: 1.1,
            cache_size: DEFAULT_VERDICT_CACHE_SIZE,
        }
    }
}

impl VerifierConfig {
    pub fn from_env() -> Self {
        let ollama_url = env::var("OLLAMA_URL")
            .or_else(|_| env::var("OLLAMA_HOST"))
            .unwrap_or_else(|_| DEFAULT_OLLAMA_URL.to_string());
        Self {
            ollama_url: ollama_url.trim_end_matches('/').to_string(),
            model: env::var("OLLAMA_MODEL").unwrap_or_else(|_| DEFAULT_OLLAMA_MODEL.to_string()),
            concurrency: env_or("AI_CONCURRENCY", DEFAULT_AI_CONCURRENCY),
            request_timeout_secs: env_or("AI_REQUEST_TIMEOUT_SECS", DEFAULT_AI_REQUEST_TIMEOUT_SECS),
            max_retries: env_or("AI_MAX_RETRIES", DEFAULT_AI_MAX_RETRIES),
            temperature: env_or("AI_TEMPERATURE", 0.1),
            cache_size: env_or("VERDICT_CACHE_SIZE", DEFAULT_VERDICT_CACHE_SIZE),
            ..Default::default()
        }
    }

    /// Upper bound for one comparison including retries and their backoff.
    pub fn comparison_timeout(&self) -> Duration {
        let attempts = self.max_retries.max(1) as u64;
        let backoff: u64 = (1..attempts).sum();
        Duration::from_secs(self.request_timeout_secs * attempts + backoff)
    }

    fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            bail!("AI concurrency must be at least 1");
        }
        if self.request_timeout_secs == 0 {
            bail!("AI request timeout must be at least one second");
        }
        Ok(())
    }
}

/// Immutable settings for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub scorer: ScorerKind,
    pub thresholds: TierThresholds,
    pub max_ai_comparisons: usize,
    pub low_confidence_output_limit: usize,
    pub run_timeout_secs: Option<u64>,
    pub blocking: BlockingConfig,
    pub weights: ScoringWeights,
    pub linkage: LinkageConfig,
    pub verifier: VerifierConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scorer: ScorerKind::Weighted,
            thresholds: TierThresholds::default(),
            max_ai_comparisons: DEFAULT_MAX_AI_COMPARISONS,
            low_confidence_output_limit: DEFAULT_LOW_CONFIDENCE_OUTPUT_LIMIT,
            run_timeout_secs: None,
            blocking: BlockingConfig::default(),
            weights: ScoringWeights::default(),
            linkage: LinkageConfig::default(),
            verifier: VerifierConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let scorer = env::var("SCORER_STRATEGY")
            .ok()
            .and_then(|value| value.parse::<ScorerKind>().ok())
            .unwrap_or(ScorerKind::Weighted);
        Self {
            scorer,
            thresholds: TierThresholds {
                high_cutoff: env_or("TIER_HIGH_CUTOFF", DEFAULT_HIGH_CUTOFF),
                medium_cutoff: env_or("TIER_MEDIUM_CUTOFF", DEFAULT_MEDIUM_CUTOFF),
            },
            max_ai_comparisons: env_or("MAX_AI_COMPARISONS", DEFAULT_MAX_AI_COMPARISONS),
            low_confidence_output_limit: env_or(
                "LOW_CONFIDENCE_OUTPUT_LIMIT",
                DEFAULT_LOW_CONFIDENCE_OUTPUT_LIMIT,
            ),
            run_timeout_secs: env::var("RUN_TIMEOUT_SECS")
                .ok()
                .and_then(|value| value.trim().parse().ok())
                .filter(|secs| *secs > 0),
            blocking: BlockingConfig::from_env(),
            weights: ScoringWeights::from_env(),
            linkage: LinkageConfig::from_env(),
            verifier: VerifierConfig::from_env(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.thresholds.validate()?;
        self.weights.validate()?;
        self.linkage.validate()?;
        self.verifier.validate()?;
        if self.blocking.min_full_name_len == 0
            || self.blocking.min_name_part_len == 0
            || self.blocking.min_company_len == 0
        {
            bail!("Blocking minimum lengths must be at least 1");
        }
        Ok(())
    }

    pub fn log_config(&self) {
        info!("⚙️  Pipeline configuration:");
        info!("   • Scorer strategy: {}", self.scorer);
        info!(
            "   • Tier cutoffs: high >= {:.2}, medium >= {:.2}",
            self.thresholds.high_cutoff, self.thresholds.medium_cutoff
        );
        info!("   • Max AI comparisons: {}", self.max_ai_comparisons);
        info!("   • Low-confidence output limit: {}", self.low_confidence_output_limit);
        match self.run_timeout_secs {
            Some(secs) => info!("   • Run timeout: {}s", secs),
            None => info!("   • Run timeout: none"),
        }
        info!(
            "   • Blocking min lengths: full name {}, name part {}, company {} ({} free-mail domains)",
            self.blocking.min_full_name_len,
            self.blocking.min_name_part_len,
            self.blocking.min_company_len,
            self.blocking.free_email_domains.len()
        );
        info!(
            "   • Verifier: {} at {} (concurrency {}, timeout {}s, retries {})",
            self.verifier.model,
            self.verifier.ollama_url,
            self.verifier.concurrency,
            self.verifier.request_timeout_secs,
            self.verifier.max_retries
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scorer, ScorerKind::Weighted);
        assert_eq!(config.max_ai_comparisons, 1000);
        assert_eq!(config.low_confidence_output_limit, 100);
        assert_eq!(config.verifier.model, "mistral-small:24b");
    }

    #[test]
    fn test_thresholds_must_be_ordered() {
        assert!(TierThresholds::new(0.8, 0.6).is_ok());
        assert!(TierThresholds::new(0.6, 0.6).is_err());
        assert!(TierThresholds::new(0.5, 0.7).is_err());
        assert!(TierThresholds::new(1.2, 0.6).is_err());
        assert!(TierThresholds::new(0.8, -0.1).is_err());
        assert!(TierThresholds::new(f64::NAN, 0.1).is_err());
    }

    #[test]
    fn test_tier_for_boundaries() {
        let thresholds = TierThresholds::default();
        assert_eq!(thresholds.tier_for(0.8), ConfidenceTier::High);
        assert_eq!(thresholds.tier_for(0.7999), ConfidenceTier::Medium);
        assert_eq!(thresholds.tier_for(0.6), ConfidenceTier::Medium);
        assert_eq!(thresholds.tier_for(0.5999), ConfidenceTier::Low);
    }

    #[test]
    fn test_comparison_timeout_covers_retries() {
        let config = VerifierConfig {
            request_timeout_secs: 10,
            max_retries: 3,
            ..Default::default()
        };
        assert_eq!(config.comparison_timeout(), Duration::from_secs(33));
    }

    #[test]
    fn test_free_email_domain_matching() {
        let config = BlockingConfig::default();
        assert!(config.is_free_email_domain("gmail.com"));
        assert!(config.is_free_email_domain("mail.yahoo.com"));
        assert!(!config.is_free_email_domain("notgmail.com"));
        assert!(!config.is_free_email_domain("acme.com"));
    }

    #[test]
    fn test_invalid_weights_rejected() {
        let mut config = PipelineConfig::default();
        config.weights.email = -0.1;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.verifier.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_env() {
        env::set_var("SCORER_STRATEGY", "trained");
        env::set_var("TIER_HIGH_CUTOFF", "0.9");
        env::set_var("MAX_AI_COMPARISONS", "25");
        env::set_var("RUN_TIMEOUT_SECS", "60");
        env::set_var("BLOCKING_EXTRA_FREE_DOMAINS", "Example.org, ");
        env::set_var("OLLAMA_MODEL", "llama3:8b");

        let config = PipelineConfig::from_env();
        assert_eq!(config.scorer, ScorerKind::Trained);
        assert_eq!(config.thresholds.high_cutoff, 0.9);
        assert_eq!(config.max_ai_comparisons, 25);
        assert_eq!(config.run_timeout_secs, Some(60));
        assert!(config.blocking.is_free_email_domain("example.org"));
        assert_eq!(config.verifier.model, "llama3:8b");

        env::remove_var("SCORER_STRATEGY");
        env::remove_var("TIER_HIGH_CUTOFF");
        env::remove_var("MAX_AI_COMPARISONS");
        env::remove_var("RUN_TIMEOUT_SECS");
        env::remove_var("BLOCKING_EXTRA_FREE_DOMAINS");
        env::remove_var("OLLAMA_MODEL");
    }
}
