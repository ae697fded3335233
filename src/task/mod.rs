//! Task descriptors and task sources
//!
//! A task is an opaque command string. The dispatch protocol never inspects
//! it; only the worker's runner does. Task content comes from a `TaskSource`,
//! which the coordinator consumes once per dispatched task.

pub mod mock;
pub mod runner;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Command executed for every task when none is configured
pub const DEFAULT_COMMAND: &str = "bash -c 'exit 0'";

/// Opaque unit of work sent from coordinator to worker
///
/// The descriptor is a string naming an action the worker can execute. The
/// protocol does not require descriptors to be identical across dispatches,
/// but the shipped task source produces the same one every time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskDescriptor(String);

impl TaskDescriptor {
    /// Create a descriptor from a command string
    pub fn new(command: impl Into<String>) -> Self {
        Self(command.into())
    }

    /// The command string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Supplies the next task descriptor to dispatch
///
/// The coordinator pulls exactly one descriptor per dispatched task. Sources
/// are infinite; the coordinator's task counter bounds how many are consumed.
pub trait TaskSource {
    /// Produce the descriptor for the next dispatch
    fn next_task(&mut self) -> TaskDescriptor;
}

/// Task source that yields the same descriptor for every dispatch
#[derive(Debug, Clone)]
pub struct FixedTaskSource {
    descriptor: TaskDescriptor,
}

impl FixedTaskSource {
    /// Create a source that always yields `descriptor`
    pub fn new(descriptor: TaskDescriptor) -> Self {
        Self { descriptor }
    }
}

impl TaskSource for FixedTaskSource {
    fn next_task(&mut self) -> TaskDescriptor {
        self.descriptor.clone()
    }
}
