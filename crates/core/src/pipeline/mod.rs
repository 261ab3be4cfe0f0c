//! Conversion pipeline: executes a build plan.
//!
//! Per job: `PENDING -> CACHE_HIT -> DONE`, or `PENDING -> RUNNING -> DONE |
//! FAILED | CANCELLED`. Pending jobs run on tokio tasks bounded by a
//! semaphore of `concurrency` permits. Results come back to a single
//! orchestrating loop, which is the only place the cache is written.
//!
//! # Example
//!
//! ```ignore
//! use podbuild_core::pipeline::{ConversionPipeline, PipelineConfig};
//!
//! let pipeline = ConversionPipeline::new(config, cache, transcoder).with_events(tx);
//! let summary = pipeline.execute(&plan, false).await?;
//! if summary.has_failures() {
//!     std::process::exit(1);
//! }
//! ```

mod config;
mod events;
mod runner;
mod types;

pub use config::{default_concurrency, PipelineConfig};
pub use events::{EventSink, PipelineEvent};
pub use runner::{ConversionPipeline, PipelineError};
pub use types::{JobReport, JobStatus, PipelineStats, RunSummary};
