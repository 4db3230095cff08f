//! Durable settings kept in a small JSON file so they survive restarts.

use std::collections::BTreeMap;
use std::path::PathBuf;
use anyhow::{Context, Result};
use tracing::debug;
use crate::traits::KvStore;

/// Address of the printer the last session locked on to.
pub const KEY_PRINTER_IP: &str = "printer_ip";
/// Serial reported by that printer.
pub const KEY_PRINTER_SERIAL: &str = "printer_serial";
/// Serial filter set at runtime; overrides the config file.
pub const KEY_TARGET_SERIAL: &str = "target_serial";

#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl FileStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read state file {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("failed to parse state file {}", path.display()))?
        } else {
            debug!(path = %path.display(), "no state file, starting empty");
            BTreeMap::new()
        };
        Ok(Self { path, values })
    }

    fn flush(&self) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).context("failed to create state directory")?;
        }
        let content =
            serde_json::to_string_pretty(&self.values).context("failed to serialize state")?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("failed to write state file {}", self.path.display()))
    }
}

impl KvStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).filter(|v| !v.is_empty()).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        if value.is_empty() {
            self.values.remove(key);
        } else {
            self.values.insert(key.to_string(), value.to_string());
        }
        self.flush()
    }
}
