//! Outward topic layout and the edge-trigger rules deciding what gets
//! published when.

use ::time::{format_description::well_known, OffsetDateTime};

/// Broker topics for one bridge instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    /// Retained `online`/`offline` plus heartbeat reports; also the last will.
    pub status: String,
    /// Counter snapshots.
    pub data: String,
    /// Retained announcement of the locked printer.
    pub init: String,
    /// Retained lock-state echo.
    pub lock_state: String,
    /// Inbound: firmware URL for this device.
    pub update_cmd: String,
    /// Inbound: firmware URL for every device.
    pub update_broadcast: String,
    /// Inbound: `lock` / `unlock`.
    pub lock_cmd: String,
}

impl Topics {
    pub fn new(prefix: &str, command_prefix: &str, broadcast: &str, device_id: &str) -> Self {
        let base = format!("{prefix}/{device_id}");
        let cmd = format!("{command_prefix}/{device_id}");
        Self {
            status: format!("{base}/status"),
            init: format!("{base}/init"),
            lock_state: format!("{base}/lock"),
            update_cmd: format!("{base}/ota/update"),
            data: base,
            update_broadcast: broadcast.to_string(),
            lock_cmd: format!("{cmd}/lock"),
        }
    }

    /// Everything the bridge subscribes to.
    pub fn inbound(&self) -> [&str; 3] {
        [&self.update_cmd, &self.update_broadcast, &self.lock_cmd]
    }
}

/// Publish counters only when the total moves, and never an all-zero one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TotalTrigger {
    last_published: u64,
}

impl TotalTrigger {
    pub fn should_publish(&self, total: u64) -> bool {
        total != self.last_published && total > 0
    }

    pub fn record(&mut self, total: u64) {
        self.last_published = total;
    }

    pub fn last_published(&self) -> u64 {
        self.last_published
    }
}

/// Announce the locked serial once per change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SerialTrigger {
    announced: Option<String>,
}

impl SerialTrigger {
    pub fn should_announce(&self, serial: &str) -> bool {
        self.announced.as_deref() != Some(serial)
    }

    pub fn record(&mut self, serial: &str) {
        self.announced = Some(serial.to_string());
    }

    /// Forget the last announcement, e.g. after the broker session restarted.
    pub fn reset(&mut self) {
        self.announced = None;
    }
}

pub(crate) fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
