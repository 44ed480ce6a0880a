// src/verification/ollama.rs
//
// Ollama-backed comparator with JSON-schema structured output.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::time::Duration;

use crate::models::contact::ContactRecord;
use crate::models::matching::{ConfidenceTier, Verdict};
use crate::utils::pipeline_config::VerifierConfig;
use crate::verification::prompt::{build_prompt, SYSTEM_INSTRUCTIONS};
use crate::verification::verifier::ContactComparator;

/// OLLAMA API request structure with JSON schema
#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    system: String,
    format: serde_json::Value,
    stream: bool,
    options: Option<OllamaOptions>,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    top_p: f32,
    repeat_penalty: f32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
    #[serde(default)]
    done: bool,
}

/// Verdict as the model writes it; confidence and score are reconciled afterwards.
#[derive(Debug, Deserialize)]
struct RawVerdict {
    is_duplicate: bool,
    #[serde(default)]
    confidence: Option<String>,
    #[serde(default)]
    similarity_score: Option<f64>,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    matching_fields: Vec<String>,
    #[serde(default)]
    conflicting_fields: Vec<String>,
}

fn band_midpoint(tier: ConfidenceTier) -> f64 {
    match tier {
        ConfidenceTier::High => 0.97,
        ConfidenceTier::Medium => 0.85,
        ConfidenceTier::Low => 0.55,
        ConfidenceTier::None => 0.2,
    }
}

impl From<RawVerdict> for Verdict {
    fn from(raw: RawVerdict) -> Self {
        let parsed_tier = raw.confidence.as_deref().and_then(ConfidenceTier::parse);
        let score = raw
            .similarity_score
            .filter(|s| s.is_finite())
            .or_else(|| parsed_tier.map(band_midpoint))
            .unwrap_or(0.0)
            .clamp(0.0, 1.0);
        Verdict {
            is_duplicate: raw.is_duplicate,
            confidence: parsed_tier.unwrap_or_else(|| ConfidenceTier::from_certainty(score)),
            similarity_score: score,
            reasoning: raw.reasoning,
            matching_fields: raw.matching_fields,
            conflicting_fields: raw.conflicting_fields,
        }
    }
}

pub fn verdict_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "is_duplicate": {
                "type": "boolean",
                "description": "Whether the two contacts are the same person"
            },
            "confidence": {
                "type": "string",
                "enum": ["high", "medium", "low", "none"],
                "description": "high >= 95%, medium 70-95%, low 40-70%, none < 40% certainty"
            },
            "similarity_score": {
                "type": "number",
                "minimum": 0.0,
                "maximum": 1.0,
                "description": "Overall similarity from 0.0 to 1.0"
            },
            "reasoning": {
                "type": "string",
                "description": "Brief explanation of the decision"
            },
            "matching_fields": {
                "type": "array",
                "items": {"type": "string"},
                "description": "Fields that agree"
            },
            "conflicting_fields": {
                "type": "array",
                "items": {"type": "string"},
                "description": "Fields that disagree"
            }
        },
        "required": ["is_duplicate", "confidence", "similarity_score", "reasoning", "matching_fields", "conflicting_fields"]
    })
}

/// Parse model output, tolerating prose or code fences around the JSON object.
pub fn parse_verdict(response: &str) -> Result<Verdict> {
    // Strategy 1: Direct JSON parsing
    match serde_json::from_str::<RawVerdict>(response) {
        Ok(raw) => return Ok(raw.into()),
        Err(e) => debug!("Direct JSON parsing failed: {}", e),
    }

    // Strategy 2: Extract JSON from response (in case there's extra text)
    if let Some(json_str) = extract_json_from_text(response) {
        match serde_json::from_str::<RawVerdict>(&json_str) {
            Ok(raw) => return Ok(raw.into()),
            Err(e) => debug!("JSON extraction parsing failed: {}", e),
        }
    }

    // Strategy 3: Try to fix common JSON issues
    let cleaned = clean_json_response(response);
    let candidate = extract_json_from_text(&cleaned).unwrap_or(cleaned);
    serde_json::from_str::<RawVerdict>(&candidate)
        .map(Verdict::from)
        .map_err(|e| anyhow!("Unparseable model response ({}): {}", e, truncate(response, 200)))
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Extract the first balanced JSON object from text that might have extra content
fn extract_json_from_text(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(text[start..start + i + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Clean common JSON formatting issues
fn clean_json_response(response: &str) -> String {
    response
        .trim()
        .replace("```json", "")
        .replace("```", "")
        .replace(",\n}", "\n}")
        .replace(",}", "}")
        .replace(",\n]", "\n]")
        .replace(",]", "]")
}

pub struct OllamaComparator {
    client: Client,
    config: VerifierConfig,
}

impl OllamaComparator {
    pub fn new(config: VerifierConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client for Ollama")?;
        Ok(Self { client, config })
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.config.ollama_url)
    }

    /// Cheap round trip to fail fast when the model server is down.
    pub async fn check_connection(&self) -> Result<()> {
        let request = OllamaRequest {
            model: self.config.model.clone(),
            prompt: "Reply with {}".to_string(),
            system: String::new(),
            format: serde_json::json!({}),
            stream: false,
            options: None,
        };
        let response = self
            .client
            .post(self.generate_url())
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Cannot reach Ollama at {}", self.config.ollama_url))?;
        if !response.status().is_success() {
            return Err(anyhow!("Ollama returned status: {}", response.status()));
        }
        info!("🤖 Ollama reachable at {} (model {})", self.config.ollama_url, self.config.model);
        Ok(())
    }

    async fn attempt(&self, request: &OllamaRequest) -> Result<Verdict> {
        let response = self
            .client
            .post(self.generate_url())
            .json(request)
            .send()
            .await
            .context("Failed to send request to Ollama")?;

        if !response.status().is_success() {
            return Err(anyhow!("Ollama returned status: {}", response.status()));
        }

        let body: OllamaResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response envelope")?;
        if !body.done {
            debug!("Ollama response not marked done; parsing what was returned");
        }
        debug!("Raw AI response: {}", body.response);
        parse_verdict(&body.response)
    }
}

#[async_trait]
impl ContactComparator for OllamaComparator {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn compare(&self, linkedin: &ContactRecord, crm: &ContactRecord) -> Result<Verdict> {
        let request = OllamaRequest {
            model: self.config.model.clone(),
            prompt: build_prompt(linkedin, crm),
            system: SYSTEM_INSTRUCTIONS.to_string(),
            format: verdict_schema(),
            stream: false,
            options: Some(OllamaOptions {
                temperature: self.config.temperature,
                top_p: self.config.top_p,
                repeat_penalty: self.config.repeat_penalty,
            }),
        };

        let attempts = self.config.max_retries.max(1);
        let mut last_error = anyhow!("No attempt made");
        for attempt in 1..=attempts {
            match self.attempt(&request).await {
                Ok(verdict) => return Ok(verdict),
                Err(e) => {
                    debug!("AI comparison attempt {}/{} failed: {:#}", attempt, attempts, e);
                    last_error = e;
                    if attempt < attempts {
                        tokio::time::sleep(Duration::from_millis(1000 * attempt as u64)).await;
                    }
                }
            }
        }
        Err(last_error.context(format!("AI comparison failed after {} attempts", attempts)))
    }
}
