//! Task execution
//!
//! The worker hands each descriptor to a `TaskRunner` and gets back a
//! success/failure outcome. Execution is synchronous; the worker has nothing
//! else to do while a task runs, and the coordinator only hears from it again
//! on its next work request.

use anyhow::{Context, Result};
use std::process::Command;

use super::TaskDescriptor;

/// Outcome of a single task execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The task exited cleanly
    Success,
    /// The task exited with a non-zero status
    ///
    /// `exit_code` is None when the process was killed by a signal.
    Failed { exit_code: Option<i32> },
}

/// Executes task descriptors
///
/// Implementations must not panic on a bad descriptor; a failed execution is
/// reported through `TaskOutcome::Failed` or an error, and the worker loop
/// carries on either way.
pub trait TaskRunner {
    /// Execute one task and report its outcome
    fn run(&mut self, task: &TaskDescriptor) -> Result<TaskOutcome>;
}

/// Runs task descriptors through `sh -c`
///
/// This mirrors what a `system()` call would do: the descriptor is handed to
/// the shell verbatim, so pipelines and quoting work as expected.
#[derive(Debug, Default)]
pub struct ShellRunner;

impl ShellRunner {
    /// Create a new shell runner
    pub fn new() -> Self {
        Self
    }
}

impl TaskRunner for ShellRunner {
    fn run(&mut self, task: &TaskDescriptor) -> Result<TaskOutcome> {
        let status = Command::new("sh")
            .arg("-c")
            .arg(task.as_str())
            .status()
            .with_context(|| format!("Failed to spawn shell for task: {}", task))?;

        if status.success() {
            Ok(TaskOutcome::Success)
        } else {
            Ok(TaskOutcome::Failed {
                exit_code: status.code(),
            })
        }
    }
}
