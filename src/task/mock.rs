//! Mock task runner for testing
//!
//! Simulates task execution without spawning any processes, making tests fast
//! and deterministic. The mock records every descriptor it is asked to run
//! and can be switched into a failure mode.
//!
//! # Example
//!
//! ```
//! use taskfarm::task::TaskDescriptor;
//! use taskfarm::task::mock::MockRunner;
//! use taskfarm::task::runner::{TaskOutcome, TaskRunner};
//!
//! let mut runner = MockRunner::new();
//! let outcome = runner.run(&TaskDescriptor::new("unit")).unwrap();
//! assert_eq!(outcome, TaskOutcome::Success);
//! assert_eq!(runner.executed_count(), 1);
//! ```

use std::sync::{Arc, Mutex};

use anyhow::Result;

use super::runner::{TaskOutcome, TaskRunner};
use super::TaskDescriptor;

/// Mock task runner
///
/// Clones share the same recorded state, so a test can hand one clone to a
/// worker loop and inspect the execution history through another.
#[derive(Debug, Clone)]
pub struct MockRunner {
    /// Whether executions should report failure
    should_fail: Arc<Mutex<bool>>,

    /// Exit code reported for failed executions
    exit_code: Arc<Mutex<i32>>,

    /// Every descriptor handed to `run`, in order
    executed: Arc<Mutex<Vec<TaskDescriptor>>>,
}

impl MockRunner {
    /// Create a mock runner that succeeds every execution
    pub fn new() -> Self {
        Self {
            should_fail: Arc::new(Mutex::new(false)),
            exit_code: Arc::new(Mutex::new(1)),
            executed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Configure the runner to fail all executions
    pub fn set_should_fail(&self, should_fail: bool) {
        *self.should_fail.lock().unwrap() = should_fail;
    }

    /// Set the exit code reported for failed executions
    pub fn set_exit_code(&self, exit_code: i32) {
        *self.exit_code.lock().unwrap() = exit_code;
    }

    /// Get a copy of every executed descriptor, in execution order
    pub fn executed_descriptors(&self) -> Vec<TaskDescriptor> {
        self.executed.lock().unwrap().clone()
    }

    /// Get the number of executed tasks
    pub fn executed_count(&self) -> usize {
        self.executed.lock().unwrap().len()
    }
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRunner for MockRunner {
    fn run(&mut self, task: &TaskDescriptor) -> Result<TaskOutcome> {
        self.executed.lock().unwrap().push(task.clone());

        if *self.should_fail.lock().unwrap() {
            Ok(TaskOutcome::Failed {
                exit_code: Some(*self.exit_code.lock().unwrap()),
            })
        } else {
            Ok(TaskOutcome::Success)
        }
    }
}
