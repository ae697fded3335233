//! CLI argument parsing using clap

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::config::ConfigError;
use crate::Result;

/// Execution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExecutionMode {
    /// Standalone mode (default) - spawn local workers and coordinate them
    Standalone,
    /// Coordinator mode - distribute tasks to remote workers
    Coordinator,
    /// Worker mode - serve one coordinator, then exit
    Worker,
}

/// TaskFarm - minimal distributed task dispatcher
#[derive(Parser, Debug)]
#[command(name = "taskfarm")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Execution mode: standalone, coordinator, or worker
    #[arg(long, value_enum, default_value = "standalone")]
    pub mode: ExecutionMode,

    /// Total number of tasks to distribute
    #[arg(short = 'n', long)]
    pub tasks: Option<u64>,

    /// Command executed for every task (default: "bash -c 'exit 0'")
    #[arg(short = 'c', long)]
    pub command: Option<String>,

    /// Number of local worker processes to spawn (standalone mode, default: CPU count)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Comma-separated list of worker addresses for coordinator mode (e.g., "10.0.1.10:9999,10.0.1.11:9999")
    #[arg(long)]
    pub host_list: Option<String>,

    /// File containing worker addresses (one per line, for coordinator mode)
    #[arg(long)]
    pub clients_file: Option<PathBuf>,

    /// Port to connect to on workers when an address has none (coordinator mode)
    #[arg(long, default_value = "9999")]
    pub worker_port: u16,

    /// Port for the worker service to listen on (worker mode)
    #[arg(long, default_value = "9999")]
    pub listen_port: u16,

    /// TOML run file supplying tasks, command, and hosts
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write a JSON run summary to this path (coordinator side)
    #[arg(long)]
    pub json_output: Option<PathBuf>,

    /// Validate the configuration and exit without dispatching
    #[arg(long)]
    pub dry_run: bool,

    /// Enable debug output
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Cheap argument sanity checks that need no config file
    pub fn validate(&self) -> Result<()> {
        if self.mode == ExecutionMode::Standalone && self.workers == Some(0) {
            return Err(ConfigError::NoWorkers.into());
        }

        Ok(())
    }
}
