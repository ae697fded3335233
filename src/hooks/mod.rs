//! Environment hooks
//!
//! Optional integration point for embedding a runtime environment around a
//! run. The hook is called exactly once before dispatch starts and once after
//! it finishes; dispatch itself never touches it, so a hook cannot affect
//! which worker gets which task.

use anyhow::Result;

/// Lifecycle hook invoked around a run
pub trait EnvironmentHook {
    /// Called once before dispatch begins
    fn startup(&mut self) -> Result<()>;

    /// Called once after the shutdown phase completes
    fn shutdown(&mut self) -> Result<()>;
}

/// Hook that does nothing
#[derive(Debug, Default)]
pub struct NoopEnvironment;

impl EnvironmentHook for NoopEnvironment {
    fn startup(&mut self) -> Result<()> {
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

/// The hook used when no environment integration is configured
pub fn default_hook() -> Box<dyn EnvironmentHook> {
    Box::new(NoopEnvironment)
}
