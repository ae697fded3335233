//! Run configuration
//!
//! Configuration comes from the command line, optionally backed by a TOML
//! run file; CLI values win. Validation happens before any connection is
//! made, so a bad configuration never reaches a worker.

pub mod cli;
pub mod file;

use anyhow::{Context, Result};
use thiserror::Error;

use crate::dispatch::protocol::{serialize_message, Message, TaskMessage, MAX_MESSAGE_SIZE};
use crate::task::{TaskDescriptor, DEFAULT_COMMAND};

pub use cli::{Cli, ExecutionMode};
pub use file::RunFile;

/// Configuration errors detected at startup
///
/// All of these are fatal; the run aborts before dispatch begins.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Requires task count!")]
    MissingTaskCount,

    #[error("No workers!")]
    NoWorkers,

    #[error("Coordinator mode requires --host-list, --clients-file, or hosts in the run file")]
    MissingWorkerAddresses,

    #[error("Task command is too long: {bytes} bytes (framed messages are capped at {max} bytes)")]
    CommandTooLong { bytes: usize, max: usize },
}

/// Resolved settings for one run
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Total number of tasks to distribute
    pub tasks: u64,

    /// Command executed for every task
    pub command: String,

    /// Verbose logging
    pub debug: bool,
}

impl RunConfig {
    /// Merge CLI arguments and run file into a validated configuration
    pub fn resolve(cli: &Cli, run_file: &RunFile) -> Result<Self> {
        let tasks = cli
            .tasks
            .or(run_file.tasks)
            .ok_or(ConfigError::MissingTaskCount)?;

        let command = cli
            .command
            .clone()
            .or_else(|| run_file.command.clone())
            .unwrap_or_else(|| DEFAULT_COMMAND.to_string());

        let config = Self {
            tasks,
            command,
            debug: cli.debug,
        };
        config.validate()?;

        Ok(config)
    }

    /// Check that the configuration can actually be dispatched
    ///
    /// Encodes a probe task message so a command that cannot fit in a frame
    /// fails here, on the coordinator, rather than mid-dispatch.
    pub fn validate(&self) -> Result<()> {
        let probe = Message::Task(TaskMessage {
            descriptor: TaskDescriptor::new(&self.command),
        });

        serialize_message(&probe).map_err(|_| ConfigError::CommandTooLong {
            bytes: self.command.len(),
            max: MAX_MESSAGE_SIZE,
        })?;

        Ok(())
    }
}

/// Resolve the worker addresses for coordinator mode
///
/// Sources, in order of precedence: `--host-list`, `--clients-file`, the run
/// file's `hosts`. Addresses without an explicit port get the default worker
/// port appended.
pub fn resolve_worker_addresses(cli: &Cli, run_file: &RunFile) -> Result<Vec<String>> {
    if let Some(ref host_list) = cli.host_list {
        return Ok(host_list
            .split(',')
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
            .map(|addr| with_default_port(addr, cli.worker_port))
            .collect());
    }

    if let Some(ref path) = cli.clients_file {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read clients file: {}", path.display()))?;

        return Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| with_default_port(line, cli.worker_port))
            .collect());
    }

    if let Some(ref hosts) = run_file.hosts {
        let port = run_file.worker_port.unwrap_or(cli.worker_port);
        return Ok(hosts
            .iter()
            .map(|host| with_default_port(host, port))
            .collect());
    }

    Err(ConfigError::MissingWorkerAddresses.into())
}

fn with_default_port(addr: &str, port: u16) -> String {
    if addr.contains(':') {
        addr.to_string()
    } else {
        format!("{}:{}", addr, port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    fn cli(args: &[&str]) -> Cli {
        let mut full = vec!["taskfarm"];
        full.extend_from_slice(args);
        Cli::parse_from(full)
    }

    #[test]
    fn test_resolve_uses_cli_over_run_file() {
        let run_file = RunFile {
            tasks: Some(5),
            command: Some("echo file".to_string()),
            hosts: None,
            worker_port: None,
        };

        let config = RunConfig::resolve(&cli(&["--tasks", "10", "--command", "echo cli"]), &run_file)
            .unwrap();
        assert_eq!(config.tasks, 10);
        assert_eq!(config.command, "echo cli");
    }

    #[test]
    fn test_resolve_falls_back_to_run_file_and_default() {
        let run_file = RunFile {
            tasks: Some(5),
            command: None,
            hosts: None,
            worker_port: None,
        };

        let config = RunConfig::resolve(&cli(&[]), &run_file).unwrap();
        assert_eq!(config.tasks, 5);
        assert_eq!(config.command, DEFAULT_COMMAND);
    }

    #[test]
    fn test_resolve_requires_task_count() {
        let err = RunConfig::resolve(&cli(&[]), &RunFile::default()).unwrap_err();
        assert!(err.to_string().contains("Requires task count"));
    }

    #[test]
    fn test_zero_tasks_is_legal() {
        let config = RunConfig::resolve(&cli(&["--tasks", "0"]), &RunFile::default()).unwrap();
        assert_eq!(config.tasks, 0);
    }

    #[test]
    fn test_validate_rejects_oversized_command() {
        let config = RunConfig {
            tasks: 1,
            command: "x".repeat(MAX_MESSAGE_SIZE),
            debug: false,
        };

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("too long"));
    }

    #[test]
    fn test_host_list_gets_default_ports() {
        let addresses = resolve_worker_addresses(
            &cli(&["--host-list", "10.0.1.10, 10.0.1.11:7777", "--worker-port", "9000"]),
            &RunFile::default(),
        )
        .unwrap();

        assert_eq!(addresses, vec!["10.0.1.10:9000", "10.0.1.11:7777"]);
    }

    #[test]
    fn test_clients_file_skips_comments_and_blanks() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# workers").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "10.0.1.10").unwrap();
        writeln!(file, "10.0.1.11:7777").unwrap();

        let path_arg = file.path().to_str().unwrap().to_string();
        let addresses = resolve_worker_addresses(
            &cli(&["--clients-file", &path_arg]),
            &RunFile::default(),
        )
        .unwrap();

        assert_eq!(addresses, vec!["10.0.1.10:9999", "10.0.1.11:7777"]);
    }

    #[test]
    fn test_run_file_hosts_use_run_file_port() {
        let run_file = RunFile {
            tasks: None,
            command: None,
            hosts: Some(vec!["10.0.1.10".to_string()]),
            worker_port: Some(7000),
        };

        let addresses = resolve_worker_addresses(&cli(&[]), &run_file).unwrap();
        assert_eq!(addresses, vec!["10.0.1.10:7000"]);
    }

    #[test]
    fn test_no_address_source_is_an_error() {
        let err = resolve_worker_addresses(&cli(&[]), &RunFile::default()).unwrap_err();
        assert!(err.to_string().contains("Coordinator mode requires"));
    }
}
