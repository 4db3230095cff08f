//! Bridge configuration, read from a TOML file. Every field has a default,
//! so an absent file or section is valid.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;
use crate::engine::EngineSettings;
use crate::netdetect;
use crate::telemetry::Topics;

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    pub device: DeviceConfig,
    pub network: NetworkConfig,
    pub scan: ScanConfig,
    pub snmp: SnmpConfig,
    pub watchdog: WatchdogConfig,
    pub mqtt: MqttConfig,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeviceConfig {
    /// Identifier used in topics; defaults to the wired MAC address.
    pub id: Option<String>,
    /// Only lock on to a printer reporting this serial. Empty: first responder.
    pub target_serial: String,
    pub state_file: PathBuf,
    /// GPIO value file driving the access lock. Unset: log only.
    pub lock_output: Option<PathBuf>,
    /// Program invoked as `<update_command> <url>` on update commands.
    pub update_command: Option<PathBuf>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            id: None,
            target_serial: String::new(),
            state_file: PathBuf::from("bridge-state.json"),
            lock_output: None,
            update_command: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    pub wired_interface: String,
    pub wireless_interface: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wired_interface: "eth0".into(),
            wireless_interface: "wlan0".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScanConfig {
    pub batch_size: usize,
    pub connect_timeout_ms: u64,
    /// Restart a pass that ended "Not Found" after this long; 0 disables.
    pub rescan_after_secs: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            connect_timeout_ms: 50,
            rescan_after_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SnmpConfig {
    pub community: String,
    pub port: u16,
    pub poll_interval_ms: u64,
}

impl Default for SnmpConfig {
    fn default() -> Self {
        Self {
            community: "public".into(),
            port: crate::snmp::SNMP_PORT,
            poll_interval_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct WatchdogConfig {
    pub stale_after_secs: u64,
    pub probe_timeout_ms: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: 60,
            probe_timeout_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker host; empty disables the broker link entirely.
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub topic_prefix: String,
    pub command_prefix: String,
    pub broadcast_topic: String,
    pub keep_alive_secs: u64,
    pub heartbeat_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 1883,
            user: None,
            password: None,
            topic_prefix: "printer/data".into(),
            command_prefix: "server".into(),
            broadcast_topic: "printer/ota/broadcast".into(),
            keep_alive_secs: 30,
            heartbeat_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
    pub enabled: bool,
    pub bind: SocketAddr,
    pub ui_dir: PathBuf,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            ui_dir: PathBuf::from("ui"),
        }
    }
}

impl BridgeConfig {
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("failed to parse configuration")
    }

    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("in {}", path.display()))
    }

    /// Configured id, else the wired MAC, else the wireless MAC.
    pub fn device_id(&self) -> String {
        self.device
            .id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .or_else(|| netdetect::mac_address(&self.network.wired_interface))
            .or_else(|| netdetect::mac_address(&self.network.wireless_interface))
            .unwrap_or_else(|| "bridge".to_string())
    }

    pub fn topics(&self, device_id: &str) -> Topics {
        Topics::new(
            &self.mqtt.topic_prefix,
            &self.mqtt.command_prefix,
            &self.mqtt.broadcast_topic,
            device_id,
        )
    }

    pub fn engine_settings(&self, device_id: &str) -> EngineSettings {
        let mut settings = EngineSettings::new(device_id, self.topics(device_id));
        settings.target_serial = self.device.target_serial.trim().to_string();
        settings.scan_batch = self.scan.batch_size.max(1);
        settings.connect_timeout = Duration::from_millis(self.scan.connect_timeout_ms);
        settings.poll_interval = Duration::from_millis(self.snmp.poll_interval_ms);
        settings.stale_after = Duration::from_secs(self.watchdog.stale_after_secs);
        settings.probe_timeout = Duration::from_millis(self.watchdog.probe_timeout_ms);
        settings
    }
}
