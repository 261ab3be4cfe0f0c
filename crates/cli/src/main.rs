mod cli;
mod display;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde::de::DeserializeOwned;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use podbuild_core::config::LoggingConfig;
use podbuild_core::pipeline::JobStatus;
use podbuild_core::{
    load_config_or_default, resolve_build_plan, validate_config, BuildCache, BuildPlan, Config,
    ConversionPipeline, Decision, ItemGroup, RunReport, SqliteBuildCache, Transcoder,
};

use cli::{CacheCommand, Cli, Commands, PlanInputs};

/// Buffer size for the pipeline event channel
const EVENT_BUFFER_SIZE: usize = 1000;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config_or_default(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("podbuild: failed to load config from {:?}: {}", cli.config, e);
            std::process::exit(1);
        }
    };
    init_logging(&config.logging, cli.verbose);

    match run(cli, config).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            tracing::error!("Fatal error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn init_logging(config: &LoggingConfig, verbose: bool) {
    let default_filter = if verbose { "debug" } else { config.filter.as_str() };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let registry = tracing_subscriber::registry().with(filter);
    if config.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Returns `Ok(false)` when the command ran but some jobs failed.
async fn run(cli: Cli, mut config: Config) -> Result<bool> {
    match cli.command {
        Commands::Plan { inputs, json } => {
            validate_config(&config).context("Configuration validation failed")?;
            let plan = resolve(&config, &inputs)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                print_plan(&plan);
            }
            Ok(true)
        }
        Commands::Apply {
            inputs,
            dry_run,
            fail_fast,
            force,
            concurrency,
            out,
        } => {
            if let Some(out) = out {
                config.build.output_root = out;
            }
            if let Some(concurrency) = concurrency {
                config.build.concurrency = concurrency;
            }
            config.build.fail_fast |= fail_fast;
            config.build.force |= force;
            validate_config(&config).context("Configuration validation failed")?;

            apply(&config, &inputs, dry_run).await
        }
        Commands::Cache { action } => {
            cache_command(&config, action)?;
            Ok(true)
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {} from {:?}", what, path))?;
    serde_json::from_str(&body).with_context(|| format!("Failed to parse {} in {:?}", what, path))
}

fn resolve(config: &Config, inputs: &PlanInputs) -> Result<BuildPlan> {
    let groups: Vec<ItemGroup> = read_json(&inputs.facts, "item facts")?;
    let decisions: HashMap<String, Decision> = match &inputs.decisions {
        Some(path) => read_json(path, "decisions")?,
        None => HashMap::new(),
    };
    info!(
        groups = groups.len(),
        decisions = decisions.len(),
        "Resolving build plan"
    );
    Ok(resolve_build_plan(&groups, &decisions, &config.policy()))
}

fn print_plan(plan: &BuildPlan) {
    println!(
        "{} jobs from {} groups, {} skipped, {} rejected",
        plan.len(),
        plan.group_count(),
        plan.skipped_groups.len(),
        plan.validation_errors.len()
    );
    for job in &plan.jobs {
        println!(
            "  {:<12} {} -> {}",
            job.action.as_str(),
            job.source_path.display(),
            job.output_path.display()
        );
    }
    for group_id in &plan.skipped_groups {
        println!("  skipped      {}", group_id);
    }
    for error in &plan.validation_errors {
        println!(
            "  [{}] {}: {}",
            error.error_code, error.group_id, error.message
        );
    }
}

async fn apply(config: &Config, inputs: &PlanInputs, dry_run: bool) -> Result<bool> {
    let plan = resolve(config, inputs)?;
    for error in &plan.validation_errors {
        warn!(group_id = %error.group_id, code = %error.error_code, "{}", error.message);
    }

    let cache_path = config.build.cache_path();
    let cache: Arc<dyn BuildCache> = Arc::new(
        SqliteBuildCache::new(&cache_path)
            .with_context(|| format!("Failed to open cache at {:?}", cache_path))?,
    );
    let transcoder = Arc::new(Transcoder::ffmpeg(&config.encoder));

    if !dry_run && !plan.is_empty() {
        podbuild_core::converter::FfmpegEncoder::new(config.encoder.clone())
            .validate()
            .await
            .context("FFmpeg is not usable")?;
    }

    let (tx, rx) = mpsc::channel(EVENT_BUFFER_SIZE);
    let display = tokio::spawn(display::render(rx));
    let pipeline = ConversionPipeline::new(config.pipeline(), cache, transcoder).with_events(tx);

    let cancel = pipeline.cancellation_token();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing running jobs");
            cancel.cancel();
        }
    });

    let summary = pipeline.execute(&plan, dry_run).await?;
    drop(pipeline);
    let _ = display.await;

    if dry_run {
        println!(
            "{} jobs: {} cached, {} would build",
            summary.stats.total,
            summary.count(JobStatus::Cached),
            summary.count(JobStatus::Pending)
        );
        return Ok(true);
    }

    match RunReport::build(&plan, &summary)
        .write(&config.build.output_root)
        .await
    {
        Ok(paths) => info!("Run log: {}", paths.jsonl.display()),
        Err(e) => warn!("Failed to write run report: {}", e),
    }

    for failure in summary.failures() {
        if let Some(f) = &failure.failure {
            println!(
                "FAILED [{}] {}: {}",
                f.kind.code(),
                failure.source_path.display(),
                f.message
            );
        }
    }

    Ok(!summary.has_failures())
}

fn cache_command(config: &Config, action: CacheCommand) -> Result<()> {
    let cache_path = config.build.cache_path();
    let cache = SqliteBuildCache::new(&cache_path)
        .with_context(|| format!("Failed to open cache at {:?}", cache_path))?;

    match action {
        CacheCommand::Stats => {
            let stats = cache.stats()?;
            println!("Cache: {}", cache_path.display());
            println!("Entries:      {}", stats.entry_count);
            println!(
                "Output size:  {:.1} MB",
                stats.total_output_bytes as f64 / (1024.0 * 1024.0)
            );
        }
        CacheCommand::Prune => {
            let removed = cache.prune_missing()?;
            println!("Removed {} stale entries", removed);
        }
        CacheCommand::Clear => {
            let removed = cache.clear()?;
            println!("Removed {} entries", removed);
        }
    }
    Ok(())
}
