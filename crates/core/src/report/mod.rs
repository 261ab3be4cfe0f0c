//! Run report written under `<output_root>/.logs/` after each real run.
//!
//! Two files per run: a JSONL log (summary line, then one line per job) and
//! a JSON summary with the failures and per-action counts.

mod types;
mod writer;

pub use types::{FailedJob, ReportEntry, ReportSummary, RunReport};
pub use writer::{ReportError, ReportPaths, LOG_DIR};
