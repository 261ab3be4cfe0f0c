//! Writes run reports to disk.

use serde_json::json;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use super::types::RunReport;

/// Directory under the output root that holds run reports.
pub const LOG_DIR: &str = ".logs";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Files written for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportPaths {
    pub jsonl: PathBuf,
    pub json: PathBuf,
}

impl RunReport {
    /// JSONL body: a summary line, then one line per job.
    pub fn to_jsonl(&self) -> Result<String, ReportError> {
        let mut out = serde_json::to_string(&json!({
            "type": "summary",
            "data": &self.summary,
        }))?;
        out.push('\n');
        for entry in &self.entries {
            out.push_str(&serde_json::to_string(&json!({
                "type": "job",
                "data": entry,
            }))?);
            out.push('\n');
        }
        Ok(out)
    }

    /// Pretty JSON body: summary, failures and per-action counts.
    pub fn to_summary_json(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(&json!({
            "summary": &self.summary,
            "errors": &self.errors,
            "action_counts": &self.action_counts,
        }))?)
    }

    /// Writes both report files under `<output_root>/.logs/`.
    pub async fn write(&self, output_root: &Path) -> Result<ReportPaths, ReportError> {
        let dir = output_root.join(LOG_DIR);
        tokio::fs::create_dir_all(&dir).await?;

        let stamp = self.summary.started_at.format("%Y%m%d_%H%M%S_%3f");
        let paths = ReportPaths {
            jsonl: dir.join(format!("run_{}.jsonl", stamp)),
            json: dir.join(format!("run_{}.json", stamp)),
        };

        tokio::fs::write(&paths.jsonl, self.to_jsonl()?).await?;
        tokio::fs::write(&paths.json, self.to_summary_json()?).await?;

        info!(
            run_id = %self.summary.run_id,
            path = %paths.json.display(),
            "Wrote run report"
        );
        Ok(paths)
    }
}
