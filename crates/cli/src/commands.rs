use anyhow::{bail, Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use hoteltune_core::auth::{self, resolve_project_id, ServiceAccountInfo};
use hoteltune_core::config::{
    PersistedConfig, TuningConfig, DEFAULT_CONFIG_PATH, DEFAULT_DISPLAY_NAME, DEFAULT_EPOCHS,
    DEFAULT_LEARNING_RATE_MULTIPLIER, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_SOURCE_MODEL,
    DEFAULT_TUNING_LOCATION,
};
use hoteltune_core::convert::{convert_file, ConvertOptions};
use hoteltune_core::dataset::{load_jsonl, split_dataset, validate_tuning_file, write_jsonl};
use hoteltune_core::error::{ConfigError, FilterError};
use hoteltune_core::llm::{GeminiClient, LlmClient};
use hoteltune_core::models::ModelConfig;
use hoteltune_core::quality::{QualityFilter, QualityReport};
use hoteltune_core::tuning::{
    poll_until_ended, run_tuning_workflow, StorageClient, TuningApi, TuningJob, VertexTuningApi,
};

#[derive(Args, Clone)]
pub struct FilterArgs {
    /// Raw JSONL input
    #[arg(short, long)]
    pub input: PathBuf,
    /// Filtered JSONL output; the report goes next to it
    #[arg(short, long)]
    pub output: PathBuf,
    /// Service-account JSON file
    #[arg(long)]
    pub credentials: Option<PathBuf>,
    #[arg(long)]
    pub project_id: Option<String>,
    #[arg(long)]
    pub location: Option<String>,
    /// vertex or gemini-api
    #[arg(long)]
    pub provider: Option<String>,
    /// Judge model
    #[arg(long)]
    pub model_name: Option<String>,
    /// Minimum judge score to keep an entry (1-10, default 7)
    #[arg(long)]
    pub min_score: Option<u8>,
    /// Entries per judge request (default 12)
    #[arg(long)]
    pub batch_size: Option<usize>,
    /// Concurrent judge requests (default 6)
    #[arg(long)]
    pub max_workers: Option<usize>,
    /// Only process the first N valid entries
    #[arg(long)]
    pub sample_size: Option<usize>,
    /// Skip the judge stage
    #[arg(long)]
    pub rules_only: bool,
}

#[derive(Args, Clone)]
pub struct ConvertArgs {
    #[arg(short, long)]
    pub input: PathBuf,
    #[arg(short, long)]
    pub output: PathBuf,
    /// System instruction for every record
    #[arg(long)]
    pub system_instruction: Option<String>,
    /// Keep an entry's own systemInstruction when present
    #[arg(long)]
    pub keep_existing_instruction: bool,
}

#[derive(Args, Clone)]
pub struct SplitArgs {
    #[arg(short, long)]
    pub input: PathBuf,
    #[arg(long)]
    pub train: PathBuf,
    #[arg(long)]
    pub validation: PathBuf,
    #[arg(long, default_value_t = 0.1)]
    pub validation_ratio: f64,
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

#[derive(Args, Clone)]
pub struct ValidateArgs {
    /// Tuning-format JSONL files
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

#[derive(Args, Clone)]
pub struct TuneArgs {
    #[arg(long)]
    pub train: PathBuf,
    #[arg(long)]
    pub validation: PathBuf,
    /// Cloud Storage bucket name (without gs://)
    #[arg(long)]
    pub bucket: Option<String>,
    #[arg(long)]
    pub credentials: Option<PathBuf>,
    #[arg(long)]
    pub project_id: Option<String>,
    /// Tuning region (default asia-east2)
    #[arg(long)]
    pub location: Option<String>,
    #[arg(long)]
    pub source_model: Option<String>,
    #[arg(long, default_value_t = DEFAULT_EPOCHS)]
    pub epochs: u32,
    #[arg(long, default_value_t = DEFAULT_LEARNING_RATE_MULTIPLIER)]
    pub learning_rate_multiplier: f64,
    #[arg(long, default_value = DEFAULT_DISPLAY_NAME)]
    pub display_name: String,
    /// Submit and return without waiting
    #[arg(long)]
    pub no_wait: bool,
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_SECS)]
    pub poll_interval_secs: u64,
    /// Give up waiting after this many minutes
    #[arg(long)]
    pub timeout_mins: Option<u64>,
    /// Ask the tuned model a few sample questions
    #[arg(long)]
    pub smoke_test: bool,
}

#[derive(Args, Clone)]
pub struct StatusArgs {
    /// Full resource name or job id
    pub job_name: String,
    #[arg(long)]
    pub credentials: Option<PathBuf>,
    #[arg(long)]
    pub project_id: Option<String>,
    #[arg(long)]
    pub location: Option<String>,
    /// Poll until the job ends
    #[arg(long)]
    pub wait: bool,
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_SECS)]
    pub poll_interval_secs: u64,
}

/// Defaults, then the config file, then the environment
pub async fn load_settings(explicit: Option<&Path>) -> Result<PersistedConfig> {
    let path = match explicit {
        Some(path) if !path.exists() => bail!("config file {} not found", path.display()),
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(DEFAULT_CONFIG_PATH),
    };
    let mut settings = PersistedConfig::load(&path).await?;
    settings.apply_env(|key| std::env::var(key).ok());
    tracing::debug!(path = %path.display(), "settings loaded");
    Ok(settings)
}

async fn resolve_project(settings: &PersistedConfig) -> Result<String> {
    let credentials = match &settings.credentials {
        Some(path) => Some(ServiceAccountInfo::from_file(path).await?),
        None => None,
    };
    let project = resolve_project_id(
        settings.project_id.as_deref(),
        credentials.as_ref(),
        std::env::var(auth::PROJECT_ENV).ok(),
    )?;
    Ok(project)
}

async fn judge_client(settings: &PersistedConfig) -> Result<Arc<dyn LlmClient>> {
    let mut model = settings.model_config()?;
    if model.provider.requires_project() {
        model = model.with_project(resolve_project(settings).await?);
    }
    println!("🤖 Judge: {} / {}", model.provider.display_name(), model.model);
    let client = GeminiClient::from_config(model, settings.credentials.as_deref())
        .context("Failed to create judge client")?;
    Ok(Arc::new(client))
}

fn print_report(report: &QualityReport) {
    let summary = &report.summary;
    println!("📊 Total entries:   {}", summary.total_entries);
    println!("✅ High quality:    {}", summary.high_quality_entries);
    println!("❌ Low quality:     {}", summary.low_quality_entries);
    println!("📈 Retention rate:  {:.1}%", summary.retention_rate_percent);
    println!(
        "⏱️  Processing time: {:.1}s ({:.1} entries/s)",
        summary.processing_time_seconds, summary.processing_speed_per_second
    );
    if !summary.skipped_lines.is_empty() {
        println!("⚠️  Skipped lines:   {:?}", summary.skipped_lines);
    }
}

pub async fn filter(args: FilterArgs, mut settings: PersistedConfig) -> Result<()> {
    settings.merge(PersistedConfig {
        provider: args.provider,
        model: args.model_name,
        project_id: args.project_id,
        location: args.location,
        credentials: args.credentials,
        min_score: args.min_score,
        batch_size: args.batch_size,
        max_workers: args.max_workers,
        ..PersistedConfig::default()
    });

    let mut processing = settings.processing_config();
    processing.sample_size = args.sample_size;
    processing.rules_only = args.rules_only;
    processing.validate()?;

    let rules = settings.rules.clone().unwrap_or_default();
    let filter = if processing.rules_only {
        QualityFilter::rules_only(rules)
    } else {
        let client = judge_client(&settings).await?;
        QualityFilter::new(client, rules, settings.judge.clone().unwrap_or_default())
    };

    println!("🔍 Filtering {}", args.input.display());
    match filter.run(&args.input, &args.output, &processing).await {
        Ok(run) => {
            print_report(&run.report);
            println!("💾 Output: {}", args.output.display());
            println!("📝 Report: {}", run.report_path.display());
            Ok(())
        }
        Err(FilterError::NothingPassedRules { report }) => {
            print_report(&report);
            Err(FilterError::NothingPassedRules { report }.into())
        }
        Err(e) => Err(e).context("Quality filter failed"),
    }
}

pub async fn convert(args: ConvertArgs, settings: PersistedConfig) -> Result<()> {
    let mut options = ConvertOptions {
        keep_existing_instruction: args.keep_existing_instruction,
        ..ConvertOptions::default()
    };
    if let Some(instruction) = args.system_instruction.or(settings.system_instruction) {
        options.system_instruction = instruction;
    }

    let stats = convert_file(&args.input, &args.output, &options)
        .await
        .with_context(|| format!("Failed to convert {}", args.input.display()))?;
    println!(
        "✅ Converted {} entries ({} skipped) -> {}",
        stats.converted,
        stats.skipped,
        args.output.display()
    );
    Ok(())
}

pub async fn split(args: SplitArgs) -> Result<()> {
    let loaded = load_jsonl(&args.input, None).await?;
    let total = loaded.entries.len();
    let (train, validation) = split_dataset(loaded.entries, args.validation_ratio, args.seed)?;

    write_jsonl(&args.train, &train).await?;
    write_jsonl(&args.validation, &validation).await?;
    println!(
        "✂️  Split {} entries: {} train -> {}, {} validation -> {}",
        total,
        train.len(),
        args.train.display(),
        validation.len(),
        args.validation.display()
    );
    Ok(())
}

pub async fn validate(args: ValidateArgs) -> Result<()> {
    let mut failed = 0;
    for file in &args.files {
        match validate_tuning_file(file).await {
            Ok(count) => println!("✅ {}: {} records", file.display(), count),
            Err(e) => {
                failed += 1;
                println!("❌ {}", e);
            }
        }
    }
    if failed > 0 {
        bail!("{} of {} files failed validation", failed, args.files.len());
    }
    Ok(())
}

fn tuning_api(settings: &PersistedConfig, project: &str, location: &str) -> Result<VertexTuningApi> {
    let tokens = auth::token_provider(settings.credentials.as_deref());
    Ok(VertexTuningApi::new(project, location, tokens)?)
}

fn print_job(job: &TuningJob) {
    println!("📋 Job:   {}", job.name);
    println!("   State: {}", job.state);
    if let Some(model) = &job.tuned_model {
        println!("   Model:    {}", model.model);
        println!("   Endpoint: {}", model.endpoint);
    }
    if let Some(error) = &job.error {
        println!("   Error: {}", error.message);
    }
}

fn poll_timeout(minutes: Option<u64>) -> Option<Duration> {
    minutes.map(|m| Duration::from_secs(m.saturating_mul(60)))
}

pub async fn tune(args: TuneArgs, mut settings: PersistedConfig) -> Result<()> {
    settings.merge(PersistedConfig {
        project_id: args.project_id,
        credentials: args.credentials,
        bucket: args.bucket,
        tuning_location: args.location,
        source_model: args.source_model,
        ..PersistedConfig::default()
    });

    let Some(bucket) = settings.bucket.clone() else {
        return Err(ConfigError::Invalid(vec!["--bucket is required (or set bucket in the config file)".to_string()]).into());
    };
    let location = settings
        .tuning_location
        .clone()
        .unwrap_or_else(|| DEFAULT_TUNING_LOCATION.to_string());

    let mut config = TuningConfig::new(String::new(), bucket, args.train, args.validation);
    config.location = location.clone();
    config.source_model = settings
        .source_model
        .clone()
        .unwrap_or_else(|| DEFAULT_SOURCE_MODEL.to_string());
    config.epochs = args.epochs;
    config.learning_rate_multiplier = args.learning_rate_multiplier;
    config.display_name = args.display_name;
    config.wait = !args.no_wait;
    config.poll_interval = Duration::from_secs(args.poll_interval_secs);
    config.poll_timeout = poll_timeout(args.timeout_mins);
    config.smoke_test = args.smoke_test;
    config.project_id = resolve_project(&settings).await?;
    config.validate()?;

    let tokens = auth::token_provider(settings.credentials.as_deref());
    let store = StorageClient::new(tokens.clone())?;
    let api = VertexTuningApi::new(config.project_id.clone(), location.clone(), tokens.clone())?;

    let project = config.project_id.clone();
    let endpoint_client = move |endpoint: &str| -> Result<Arc<dyn LlmClient>, ConfigError> {
        let model = ModelConfig::new(endpoint)
            .with_project(project.clone())
            .with_location(location.clone());
        Ok(Arc::new(GeminiClient::vertex(model, tokens.clone())?))
    };

    println!(
        "🚀 Tuning {} on {} ({} epochs) in {}",
        config.source_model, config.project_id, config.epochs, config.location
    );
    let outcome = run_tuning_workflow(&config, &store, &api, &endpoint_client)
        .await
        .context("Tuning workflow failed")?;

    println!("☁️  Train data:      {} ({} records)", outcome.train_uri, outcome.train_records);
    println!("☁️  Validation data: {} ({} records)", outcome.validation_uri, outcome.validation_records);
    print_job(&outcome.job);
    if !config.wait {
        println!("⏳ Not waiting. Check progress with `hoteltune status {}`", outcome.job.name);
    }
    for (i, answer) in outcome.smoke_test.iter().enumerate() {
        println!("\n--- Test {} ---", i + 1);
        println!("Q: {}", answer.question);
        match &answer.answer {
            Ok(text) => println!("A: {}", text),
            Err(e) => println!("⚠️  {}", e),
        }
    }
    Ok(())
}

pub async fn status(args: StatusArgs, mut settings: PersistedConfig) -> Result<()> {
    settings.merge(PersistedConfig {
        project_id: args.project_id,
        credentials: args.credentials,
        tuning_location: args.location,
        ..PersistedConfig::default()
    });
    let location = settings
        .tuning_location
        .clone()
        .unwrap_or_else(|| DEFAULT_TUNING_LOCATION.to_string());
    let project = resolve_project(&settings).await?;
    let api = tuning_api(&settings, &project, &location)?;

    let job = if args.wait {
        poll_until_ended(
            &api,
            &args.job_name,
            Duration::from_secs(args.poll_interval_secs.max(1)),
            None,
        )
        .await?
    } else {
        api.get(&args.job_name).await?
    };
    print_job(&job);
    Ok(())
}
