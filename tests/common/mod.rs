#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use anyhow::{bail, Result};
use async_trait::async_trait;
use lan_print_bridge::engine::{Collaborators, Engine, EngineSettings};
use lan_print_bridge::oid::PrinterOid;
use lan_print_bridge::telemetry::Topics;
use lan_print_bridge::traits::{
    KvStore, LockOutput, NetPath, NetworkPaths, Outbound, Probe, SnmpTransport, UpdateExecutor,
};
use lan_print_bridge::types::LockState;

pub const DEVICE: &str = "AABBCCDDEEFF";

pub fn topics() -> Topics {
    Topics::new("printer/data", "server", "printer/ota/broadcast", DEVICE)
}

#[derive(Clone, Default)]
pub struct FakeNet {
    pub wired: Arc<Mutex<Option<Ipv4Addr>>>,
}

impl NetworkPaths for FakeNet {
    fn is_up(&self, path: NetPath) -> bool {
        self.local_address(path).is_some()
    }

    fn local_address(&self, path: NetPath) -> Option<Ipv4Addr> {
        match path {
            NetPath::Wired => *self.wired.lock().unwrap(),
            NetPath::Wireless => None,
        }
    }
}

#[derive(Clone, Default)]
pub struct FakeProbe {
    pub open: Arc<Mutex<HashSet<Ipv4Addr>>>,
    pub probed: Arc<Mutex<Vec<SocketAddrV4>>>,
}

#[async_trait]
impl Probe for FakeProbe {
    async fn reachable(&self, addr: SocketAddrV4, _timeout: Duration) -> bool {
        self.probed.lock().unwrap().push(addr);
        self.open.lock().unwrap().contains(addr.ip())
    }
}

#[derive(Clone, Default)]
pub struct FakeSnmp {
    pub sent: Arc<Mutex<Vec<(Ipv4Addr, Vec<PrinterOid>)>>>,
}

#[async_trait]
impl SnmpTransport for FakeSnmp {
    async fn send_get(&self, target: Ipv4Addr, oids: &[PrinterOid]) -> Result<()> {
        self.sent.lock().unwrap().push((target, oids.to_vec()));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

#[derive(Clone, Default)]
pub struct FakeBroker {
    pub published: Arc<Mutex<Vec<Published>>>,
    pub subscribed: Arc<Mutex<Vec<String>>>,
    pub offline: Arc<AtomicBool>,
}

impl Outbound for FakeBroker {
    fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            bail!("not connected");
        }
        self.published.lock().unwrap().push(Published {
            topic: topic.to_string(),
            payload,
            retain,
        });
        Ok(())
    }

    fn subscribe(&self, topic: &str) -> Result<()> {
        self.subscribed.lock().unwrap().push(topic.to_string());
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MemStore {
    pub map: Arc<Mutex<HashMap<String, String>>>,
}

impl KvStore for MemStore {
    fn get(&self, key: &str) -> Option<String> {
        self.map.lock().unwrap().get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut map = self.map.lock().unwrap();
        if value.is_empty() {
            map.remove(key);
        } else {
            map.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct FakeLock {
    pub writes: Arc<Mutex<Vec<LockState>>>,
}

impl LockOutput for FakeLock {
    fn set(&mut self, state: LockState) -> Result<()> {
        self.writes.lock().unwrap().push(state);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct FakeUpdater {
    pub urls: Arc<Mutex<Vec<String>>>,
}

impl UpdateExecutor for FakeUpdater {
    fn apply_update(&self, source: &str) {
        self.urls.lock().unwrap().push(source.to_string());
    }
}

/// Every fake, sharing state with the boxed copies handed to the engine.
#[derive(Clone, Default)]
pub struct Harness {
    pub net: FakeNet,
    pub probe: FakeProbe,
    pub snmp: FakeSnmp,
    pub broker: FakeBroker,
    pub store: MemStore,
    pub lock: FakeLock,
    pub updater: FakeUpdater,
}

impl Harness {
    pub fn on_network(local: Ipv4Addr) -> Self {
        let harness = Self::default();
        *harness.net.wired.lock().unwrap() = Some(local);
        harness
    }

    pub fn with_printers(self, hosts: &[Ipv4Addr]) -> Self {
        self.probe.open.lock().unwrap().extend(hosts.iter().copied());
        self
    }

    pub fn settings(&self, target_serial: &str) -> EngineSettings {
        let mut settings = EngineSettings::new(DEVICE, topics());
        settings.target_serial = target_serial.to_string();
        settings.version = "test".to_string();
        settings
    }

    pub fn engine(&self, target_serial: &str) -> Engine {
        Engine::new(self.settings(target_serial), self.collaborators())
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            net: Box::new(self.net.clone()),
            probe: Arc::new(self.probe.clone()),
            snmp: Arc::new(self.snmp.clone()),
            outbound: Box::new(self.broker.clone()),
            store: Box::new(self.store.clone()),
            lock_output: Box::new(self.lock.clone()),
            updater: Box::new(self.updater.clone()),
        }
    }

    pub fn stored(&self, key: &str) -> Option<String> {
        self.store.map.lock().unwrap().get(key).cloned()
    }

    pub fn sent(&self) -> Vec<(Ipv4Addr, Vec<PrinterOid>)> {
        self.snmp.sent.lock().unwrap().clone()
    }

    pub fn take_sent(&self) -> Vec<(Ipv4Addr, Vec<PrinterOid>)> {
        std::mem::take(&mut *self.snmp.sent.lock().unwrap())
    }

    pub fn probed_hosts(&self) -> Vec<u8> {
        self.probe
            .probed
            .lock()
            .unwrap()
            .iter()
            .map(|a| a.ip().octets()[3])
            .collect()
    }

    pub fn published_on(&self, topic: &str) -> Vec<Published> {
        self.broker
            .published
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.topic == topic)
            .cloned()
            .collect()
    }

    pub fn json_on(&self, topic: &str) -> Vec<serde_json::Value> {
        self.published_on(topic)
            .iter()
            .map(|p| serde_json::from_slice(&p.payload).unwrap())
            .collect()
    }
}
