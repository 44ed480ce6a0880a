use anyhow::{bail, Context, Result};
use clap::Parser;
use dedupe_lib::matching::manager::DuplicateDetectionPipeline;
use dedupe_lib::matching::scorer::ScorerKind;
use dedupe_lib::models::contact::{ContactRecord, CrmContact, LinkedInProfile};
use dedupe_lib::models::stats_models::PipelineResult;
use dedupe_lib::utils::env::load_env;
use dedupe_lib::utils::get_memory_usage;
use dedupe_lib::utils::pipeline_config::PipelineConfig;
use dedupe_lib::utils::progress_bars::progress_config::ProgressConfig;
use dedupe_lib::verification::{ContactComparator, OllamaComparator};
use log::{info, warn};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tokio::signal;

const TOP_MATCHES_PRINTED: usize = 5;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct DedupeArgs {
    /// LinkedIn profiles: {"profiles": [...]} or a bare array
    #[arg(long)]
    linkedin: PathBuf,

    /// CRM contacts: {"contacts": [...]}, {"value": [...]} or a bare array
    #[arg(long)]
    crm: PathBuf,

    /// Where to write the result JSON (default data/duplicate_results_<unix>.json)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Scoring strategy: weighted or trained
    #[arg(long)]
    scorer: Option<ScorerKind>,

    /// Maximum number of medium-tier pairs sent to the model
    #[arg(long)]
    max_ai: Option<usize>,

    #[arg(long)]
    high_cutoff: Option<f64>,

    #[arg(long)]
    medium_cutoff: Option<f64>,

    #[arg(long)]
    ollama_url: Option<String>,

    #[arg(long)]
    ollama_model: Option<String>,

    /// Skip AI verification entirely
    #[arg(long)]
    no_ai: bool,

    /// Stop dispatching AI calls after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,
}

impl DedupeArgs {
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(scorer) = self.scorer {
            config.scorer = scorer;
        }
        if let Some(max_ai) = self.max_ai {
            config.max_ai_comparisons = max_ai;
        }
        if let Some(high) = self.high_cutoff {
            config.thresholds.high_cutoff = high;
        }
        if let Some(medium) = self.medium_cutoff {
            config.thresholds.medium_cutoff = medium;
        }
        if let Some(url) = &self.ollama_url {
            config.verifier.ollama_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = &self.ollama_model {
            config.verifier.model = model.clone();
        }
        if let Some(secs) = self.timeout_secs {
            config.run_timeout_secs = Some(secs);
        }
    }
}

/// Accepts a bare array or an object wrapping the array under one of `keys`.
fn load_list<T: DeserializeOwned>(path: &Path, keys: &[&str]) -> Result<Vec<T>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let value: serde_json::Value =
        serde_json::from_str(&raw).with_context(|| format!("{} is not valid JSON", path.display()))?;
    let list = match value {
        serde_json::Value::Array(_) => value,
        serde_json::Value::Object(mut map) => match keys.iter().find_map(|k| map.remove(*k)) {
            Some(list) => list,
            None => bail!("{} has none of the keys {:?}", path.display(), keys),
        },
        _ => bail!("{} must hold an array or an object", path.display()),
    };
    serde_json::from_value(list).with_context(|| format!("Unexpected record shape in {}", path.display()))
}

fn load_linkedin(path: &Path) -> Result<Vec<ContactRecord>> {
    let profiles: Vec<LinkedInProfile> = load_list(path, &["profiles", "connections"])?;
    Ok(profiles
        .into_iter()
        .enumerate()
        .map(|(idx, profile)| profile.into_record(idx))
        .collect())
}

fn load_crm(path: &Path) -> Result<Vec<ContactRecord>> {
    let contacts: Vec<CrmContact> = load_list(path, &["contacts", "value"])?;
    Ok(contacts
        .into_iter()
        .enumerate()
        .map(|(idx, contact)| contact.into_record(idx))
        .collect())
}

fn write_result(result: &PipelineResult, output: Option<PathBuf>) -> Result<PathBuf> {
    let path = output.unwrap_or_else(|| {
        PathBuf::from(format!("data/duplicate_results_{}.json", result.started_at.timestamp()))
    });
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(result).context("Failed to serialize pipeline result")?;
    std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

fn print_summary(result: &PipelineResult, output: &Path) {
    let stats = &result.stats;
    println!();
    println!("📊 Duplicate detection summary ({})", result.run_id);
    println!("   LinkedIn records:   {}", stats.total_linkedin_records);
    println!("   CRM records:        {}", stats.total_crm_records);
    println!(
        "   Candidate pairs:    {} ({:.1}x reduction)",
        stats.candidate_pairs, stats.reduction_factor
    );
    println!("   High confidence:    {}", stats.high_confidence_total);
    println!("   Needs review:       {}", stats.medium_confidence_total);
    println!(
        "   Low confidence:     {} ({} written)",
        stats.low_confidence_total, stats.low_confidence_reported
    );
    println!("   Failed AI checks:   {}", stats.failed_verification_total);
    println!("   AI calls:           {}", result.verification.dispatched);
    println!("   Runtime:            {:.1}s", stats.total_runtime_seconds);

    let top = result.top_matches(TOP_MATCHES_PRINTED);
    if !top.is_empty() {
        println!();
        println!("🏆 Top matches:");
        for (rank, outcome) in top.iter().enumerate() {
            println!(
                "   {}. {} ↔ {} ({:.2}, {:?})",
                rank + 1,
                outcome.linkedin.display_name().unwrap_or_else(|| "?".to_string()),
                outcome.crm.display_name().unwrap_or_else(|| "?".to_string()),
                outcome.effective_confidence(),
                outcome.detection_method
            );
        }
    }
    println!();
    println!("💾 Results written to {}", output.display());
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = DedupeArgs::parse();
    load_env();
    let start = Instant::now();

    let mut config = PipelineConfig::from_env();
    args.apply(&mut config);
    let progress = ProgressConfig::from_env();

    let linkedin = load_linkedin(&args.linkedin)?;
    let crm = load_crm(&args.crm)?;
    info!("Loaded {} LinkedIn profiles and {} CRM contacts", linkedin.len(), crm.len());

    let comparator: Option<Arc<dyn ContactComparator>> = if args.no_ai {
        info!("AI verification disabled by --no-ai");
        None
    } else {
        let ollama = OllamaComparator::new(config.verifier.clone())?;
        if let Err(e) = ollama.check_connection().await {
            warn!("Ollama check failed ({:#}); failed comparisons will be reported as failed verifications", e);
        }
        let ollama: Arc<dyn ContactComparator> = Arc::new(ollama);
        Some(ollama)
    };

    let pipeline = DuplicateDetectionPipeline::new(config, comparator)
        .context("Invalid pipeline configuration")?
        .with_progress(progress.clone());

    let cancel = pipeline.cancellation_handle();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Ctrl+C received; finishing in-flight AI calls and writing partial results");
            cancel.store(true, Ordering::SeqCst);
        }
    });

    let result = pipeline.run(&linkedin, &crm).await;
    let output = write_result(&result, args.output.clone())?;
    print_summary(&result, &output);

    if progress.should_show_memory() {
        info!("Memory in use: {} MB", get_memory_usage().await);
    }
    info!("Finished in {:.2?}", start.elapsed());
    Ok(())
}
