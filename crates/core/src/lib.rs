pub mod cache;
pub mod config;
pub mod converter;
pub mod library;
pub mod pipeline;
pub mod report;
pub mod resolver;
pub mod testing;

pub use cache::{BuildCache, CacheEntry, CacheError, CacheStats, SqliteBuildCache};
pub use config::{
    load_config, load_config_from_str, load_config_or_default, validate_config, Config,
    ConfigError,
};
pub use converter::{EncoderConfig, TranscodeResult, Transcoder};
pub use library::{ItemFacts, ItemGroup};
pub use pipeline::{ConversionPipeline, PipelineConfig, PipelineEvent, RunSummary};
pub use report::RunReport;
pub use resolver::{resolve_build_plan, Action, BuildPlan, Decision, Job, Policy};
