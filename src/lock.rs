use std::path::PathBuf;
use anyhow::{Context, Result};
use tracing::info;
use crate::traits::LockOutput;
use crate::types::LockState;

/// Drives a sysfs-style GPIO value file. The line is active-low for the
/// lock: `1` releases the printer, `0` locks it.
#[derive(Debug, Clone)]
pub struct FileLockOutput {
    path: PathBuf,
}

impl FileLockOutput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn level(state: LockState) -> &'static str {
        match state {
            LockState::Locked => "0",
            LockState::Unlocked => "1",
        }
    }
}

impl LockOutput for FileLockOutput {
    fn set(&mut self, state: LockState) -> Result<()> {
        std::fs::write(&self.path, Self::level(state))
            .with_context(|| format!("failed to drive lock output {}", self.path.display()))
    }
}

/// Stand-in for hosts without a lock line wired up.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogLockOutput;

impl LockOutput for LogLockOutput {
    fn set(&mut self, state: LockState) -> Result<()> {
        info!(state = state.as_payload(), "lock output (not wired)");
        Ok(())
    }
}
