use std::fmt;
use std::net::Ipv4Addr;
use serde::{Deserialize, Serialize};

/// State of the physical access lock.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    Locked,
    #[default]
    Unlocked,
}

impl LockState {
    /// Wire form used on the broker, in both directions.
    pub fn as_payload(self) -> &'static str {
        match self {
            LockState::Locked => "lock",
            LockState::Unlocked => "unlock",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Searching,
    Locked,
}

/// Human-readable status line. Labels only, not a machine contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    ScanningForSerial(String),
    ScanningAny,
    NoNetwork,
    NotFound,
    Locked(Ipv4Addr),
    Online,
    ProtocolError,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::ScanningForSerial(serial) => write!(f, "Scanning for Serial: {serial}"),
            Status::ScanningAny => f.write_str("Scanning for ANY Printer..."),
            Status::NoNetwork => f.write_str("No Network"),
            Status::NotFound => f.write_str("Not Found"),
            Status::Locked(addr) => write!(f, "Locked: {addr}"),
            Status::Online => f.write_str("Online (SNMP OK)"),
            Status::ProtocolError => f.write_str("Online / SNMP Error"),
        }
    }
}

/// Everything a display or the HTTP surface needs, in one serializable value.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub device_id: String,
    pub mode: Mode,
    pub status: String,
    pub target_serial: String,
    pub target_address: Option<String>,
    pub serial: Option<String>,
    pub total_pages: u64,
    pub color_copies: u64,
    pub mono_copies: u64,
    pub color_prints: u64,
    pub mono_prints: u64,
    pub color_total: u64,
    pub mono_total: u64,
    pub total_copies: u64,
    pub lock: LockState,
}

/// Counter payload published to the broker.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CounterReport {
    pub mac: String,
    pub status: String,
    pub serial: String,
    pub ip: String,
    pub total: u64,
    pub color_copies: u64,
    pub mono_copies: u64,
    pub color_prints: u64,
    pub mono_prints: u64,
    pub color_total: u64,
    pub mono_total: u64,
    pub total_copies: u64,
    pub timestamp: String,
}

/// Retained announcement of which printer the bridge is bound to.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub mac: String,
    pub serial: String,
    pub ip: String,
    pub version: String,
}

/// Periodic liveness report on the status topic.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Heartbeat {
    pub mac: String,
    pub status: String,
    pub ip: String,
    pub target_serial: String,
    pub mode: Mode,
    pub version: String,
}
