use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "podbuild")]
#[command(author, version, about = "Build a device-ready copy of a music library")]
pub struct Cli {
    /// Path to config file
    #[arg(
        short,
        long,
        global = true,
        env = "PODBUILD_CONFIG",
        default_value = "podbuild.toml"
    )]
    pub config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Scanner and decision-sheet outputs.
#[derive(Args, Debug, Clone)]
pub struct PlanInputs {
    /// JSON array of item groups produced by the scanner
    #[arg(long)]
    pub facts: PathBuf,

    /// JSON object mapping group id to decision
    #[arg(long)]
    pub decisions: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve the build plan and print it
    Plan {
        #[command(flatten)]
        inputs: PlanInputs,

        /// Print the full plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Resolve the plan and build every job that is not cached
    Apply {
        #[command(flatten)]
        inputs: PlanInputs,

        /// Report cached and pending jobs without building anything
        #[arg(long)]
        dry_run: bool,

        /// Stop after the first failed job
        #[arg(long)]
        fail_fast: bool,

        /// Rebuild even when the cache has a valid entry
        #[arg(long)]
        force: bool,

        /// Maximum parallel jobs
        #[arg(short = 'j', long)]
        concurrency: Option<usize>,

        /// Output library root
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Inspect or maintain the build cache
    Cache {
        #[command(subcommand)]
        action: CacheCommand,
    },
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheCommand {
    /// Show entry count and total output size
    Stats,
    /// Remove entries whose output file is gone
    Prune,
    /// Remove every entry
    Clear,
}
