//! Run summary output
//!
//! The coordinator can write a machine-readable summary of the run next to
//! its console report. The summary carries only what the coordinator itself
//! observed; per-task outcomes stay on the workers.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::config::RunConfig;
use crate::dispatch::coordinator::DispatchReport;
use crate::util::time::calculate_rate;

/// JSON run summary written by the coordinator
#[derive(Debug, Serialize, Deserialize)]
pub struct RunSummary {
    /// When the summary was written
    pub generated_at: DateTime<Utc>,

    /// Total tasks dispatched
    pub tasks: u64,

    /// Number of workers in the run
    pub workers: usize,

    /// Command executed for every task
    pub command: String,

    /// Wall-clock duration of the run in seconds
    pub elapsed_s: f64,

    /// Dispatch rate in tasks per second
    pub tasks_per_sec: f64,

    /// Tasks dispatched per worker, indexed by connection order
    pub per_worker_dispatched: Vec<u64>,
}

impl RunSummary {
    /// Build a summary from the dispatch report
    pub fn new(config: &RunConfig, report: &DispatchReport, elapsed: Duration) -> Self {
        Self {
            generated_at: Utc::now(),
            tasks: report.dispatched,
            workers: report.per_worker.len(),
            command: config.command.clone(),
            elapsed_s: elapsed.as_secs_f64(),
            tasks_per_sec: calculate_rate(report.dispatched, elapsed),
            per_worker_dispatched: report.per_worker.clone(),
        }
    }

    /// Write the summary as pretty-printed JSON
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize run summary")?;

        std::fs::write(path, json)
            .with_context(|| format!("Failed to write run summary: {}", path.display()))?;

        Ok(())
    }
}
