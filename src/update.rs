use std::path::PathBuf;
use tokio::process::Command;
use tracing::{error, info, warn};
use crate::traits::UpdateExecutor;

/// Hands the update URL to an external program (`<program> <url>`) and
/// lets it run detached. Without a program, update commands are logged and
/// dropped.
#[derive(Debug, Clone, Default)]
pub struct CommandUpdateExecutor {
    program: Option<PathBuf>,
}

impl CommandUpdateExecutor {
    pub fn new(program: Option<PathBuf>) -> Self {
        Self { program }
    }
}

impl UpdateExecutor for CommandUpdateExecutor {
    fn apply_update(&self, source: &str) {
        let Some(program) = self.program.clone() else {
            warn!(url = source, "update requested but no update command is configured");
            return;
        };
        let url = source.to_string();
        info!(program = %program.display(), %url, "starting update");
        tokio::spawn(async move {
            match Command::new(&program).arg(&url).status().await {
                Ok(status) if status.success() => info!(%url, "update command finished"),
                Ok(status) => warn!(%url, %status, "update command failed"),
                Err(e) => error!(program = %program.display(), error = %e, "could not start update command"),
            }
        });
    }
}
