//! Seams to everything outside the engine.
//!
//! The engine owns one boxed implementation of each trait. Production
//! implementations live next to the concern they wrap (`netdetect`, `probe`,
//! `snmp`, `mqtt`, `store`, `lock`, `update`); tests substitute recorders.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;
use anyhow::Result;
use async_trait::async_trait;
use crate::oid::PrinterOid;
use crate::types::LockState;

/// The two alternate uplinks of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetPath {
    Wired,
    Wireless,
}

pub trait NetworkPaths: Send + Sync {
    fn is_up(&self, path: NetPath) -> bool;

    fn local_address(&self, path: NetPath) -> Option<Ipv4Addr>;

    /// Address of whichever path is up, wired first.
    fn current_address(&self) -> Option<Ipv4Addr> {
        [NetPath::Wired, NetPath::Wireless]
            .into_iter()
            .filter(|p| self.is_up(*p))
            .find_map(|p| self.local_address(p))
    }
}

/// Cheap reachability check against a single TCP port.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn reachable(&self, addr: SocketAddrV4, timeout: Duration) -> bool;
}

/// Fire-and-forget management queries. Responses arrive out of band and are
/// handed to [`crate::engine::Engine::on_response`] by the driver.
#[async_trait]
pub trait SnmpTransport: Send + Sync {
    async fn send_get(&self, target: Ipv4Addr, oids: &[PrinterOid]) -> Result<()>;
}

/// Message broker, as seen by the engine.
pub trait Outbound: Send {
    fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<()>;

    fn subscribe(&self, topic: &str) -> Result<()>;
}

/// Durable key/value settings.
pub trait KvStore: Send {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&mut self, key: &str, value: &str) -> Result<()>;
}

/// The physical access-lock output.
pub trait LockOutput: Send {
    fn set(&mut self, state: LockState) -> Result<()>;
}

/// Applies a firmware/software update; the outcome is not observed.
pub trait UpdateExecutor: Send {
    fn apply_update(&self, source: &str);
}
