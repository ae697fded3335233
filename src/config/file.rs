//! TOML run file
//!
//! A run file can carry everything a recurring invocation needs, so the
//! command line only has to name the file:
//!
//! ```toml
//! tasks = 1000
//! command = "bash -c 'exit 0'"
//! hosts = ["10.0.1.10", "10.0.1.11:7777"]
//! worker_port = 9999
//! ```
//!
//! Command-line arguments win over run file values.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Optional run settings loaded from a TOML file
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunFile {
    /// Total number of tasks to distribute
    pub tasks: Option<u64>,

    /// Command executed for every task
    pub command: Option<String>,

    /// Worker addresses, with or without ports
    pub hosts: Option<Vec<String>>,

    /// Default port for hosts listed without one
    pub worker_port: Option<u16>,
}

impl RunFile {
    /// Load a run file from disk
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read run file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse run file: {}", path.display()))
    }
}
