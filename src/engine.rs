//! The discovery / polling / state-synchronisation engine.
//!
//! One `Engine` value owns every piece of mutable state. All entry points
//! take `&mut self` and are invoked one at a time by the driver, so there is
//! no locking anywhere in here. Entry points never fail: collaborator errors
//! are logged and the state is left as it was.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};
use crate::commands::Command;
use crate::counters::CounterSet;
use crate::netdetect::ipv4_to_default_cidr;
use crate::oid::PrinterOid;
use crate::scanner::{self, ScanCursor, RAW_PRINT_PORT};
use crate::session::{MatchPolicy, Session};
use crate::snmp::{Value, VarBind};
use crate::store::{KEY_PRINTER_IP, KEY_PRINTER_SERIAL, KEY_TARGET_SERIAL};
use crate::telemetry::{now_rfc3339, SerialTrigger, Topics, TotalTrigger};
use crate::traits::{
    KvStore, LockOutput, NetworkPaths, Outbound, Probe, SnmpTransport, UpdateExecutor,
};
use crate::types::{
    CounterReport, Heartbeat, LockState, Mode, SessionReport, Snapshot, Status,
};
use crate::watchdog::Watchdog;

/// Tunables for one engine instance.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub device_id: String,
    /// Serial filter from configuration; empty accepts the first responder.
    pub target_serial: String,
    pub scan_batch: usize,
    pub connect_timeout: Duration,
    pub poll_interval: Duration,
    pub stale_after: Duration,
    pub probe_timeout: Duration,
    pub topics: Topics,
    pub version: String,
}

impl EngineSettings {
    pub fn new(device_id: impl Into<String>, topics: Topics) -> Self {
        Self {
            device_id: device_id.into(),
            target_serial: String::new(),
            scan_batch: 10,
            connect_timeout: Duration::from_millis(50),
            poll_interval: Duration::from_secs(5),
            stale_after: Duration::from_secs(60),
            probe_timeout: Duration::from_millis(200),
            topics,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Everything outside the engine, one implementation per concern.
pub struct Collaborators {
    pub net: Box<dyn NetworkPaths>,
    pub probe: Arc<dyn Probe>,
    pub snmp: Arc<dyn SnmpTransport>,
    pub outbound: Box<dyn Outbound>,
    pub store: Box<dyn KvStore>,
    pub lock_output: Box<dyn LockOutput>,
    pub updater: Box<dyn UpdateExecutor>,
}

pub struct Engine {
    settings: EngineSettings,
    policy: MatchPolicy,
    session: Session,
    cursor: ScanCursor,
    counters: CounterSet,
    totals: TotalTrigger,
    serials: SerialTrigger,
    watchdog: Watchdog,
    lock: LockState,
    status: Status,
    last_request: Option<Instant>,
    io: Collaborators,
}

/// The parts of one response the engine cares about.
#[derive(Debug, Default)]
struct Parsed {
    serial: Option<String>,
    counters: Vec<(PrinterOid, i64)>,
}

fn parse_bindings(bindings: &[VarBind]) -> Parsed {
    let mut parsed = Parsed::default();
    for bind in bindings {
        let Some(oid) = PrinterOid::from_suffix(&bind.oid) else {
            trace!(oid = ?bind.oid, "unknown binding");
            continue;
        };
        match (oid, &bind.value) {
            (PrinterOid::Serial, Value::Text(text)) => {
                let serial = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
                parsed.serial = Some(serial.to_string());
            }
            (PrinterOid::Serial, _) => {}
            (counter, Value::Integer(v)) => parsed.counters.push((counter, *v)),
            (counter, other) => debug!(?counter, ?other, "non-integer counter value"),
        }
    }
    parsed
}

impl Engine {
    /// Build the engine, restoring a persisted lock when the stored printer
    /// still satisfies the serial filter; otherwise start scanning.
    pub fn new(settings: EngineSettings, mut io: Collaborators) -> Self {
        let filter = io
            .store
            .get(KEY_TARGET_SERIAL)
            .unwrap_or_else(|| settings.target_serial.clone());
        let policy = MatchPolicy::from_filter(&filter);

        let lock = LockState::default();
        if let Err(e) = io.lock_output.set(lock) {
            warn!(error = %e, "could not drive initial lock state");
        }

        let restored = match (io.store.get(KEY_PRINTER_IP), io.store.get(KEY_PRINTER_SERIAL)) {
            (Some(ip), Some(serial)) => match ip.parse::<Ipv4Addr>() {
                Ok(address) if policy.accepts(&serial) => Some((address, serial)),
                Ok(_) => {
                    info!(%serial, "stored printer does not match the serial filter");
                    None
                }
                Err(e) => {
                    warn!(%ip, error = %e, "ignoring unparsable stored printer address");
                    None
                }
            },
            _ => None,
        };

        let stale_after = settings.stale_after;
        let mut engine = Self {
            settings,
            policy,
            session: Session::Searching,
            cursor: ScanCursor::Idle,
            counters: CounterSet::default(),
            totals: TotalTrigger::default(),
            serials: SerialTrigger::default(),
            watchdog: Watchdog::new(stale_after),
            lock,
            status: Status::ScanningAny,
            last_request: None,
            io,
        };

        match restored {
            Some((address, serial)) => {
                info!(%address, %serial, "resuming stored printer session");
                engine.session = Session::Locked { address, serial };
                engine.status = Status::Locked(address);
            }
            None => engine.start_scan(),
        }
        engine
    }

    /// Begin a fresh pass over the local /24. Any locked session is
    /// abandoned first.
    pub fn start_scan(&mut self) {
        if !self.session.is_searching() {
            self.release_session();
        }
        self.cursor.restart();
        self.status = self.scanning_status();
        info!(status = %self.status, "scan started");
    }

    fn scanning_status(&self) -> Status {
        match &self.policy {
            MatchPolicy::ExactSerial(serial) => Status::ScanningForSerial(serial.clone()),
            MatchPolicy::FirstResponder => Status::ScanningAny,
        }
    }

    /// Advance the scan by one batch. No-op unless searching with a pass in
    /// progress.
    pub async fn process_scan_batch(&mut self) {
        if !self.session.is_searching() || self.cursor.next_host().is_none() {
            return;
        }
        let Some(local) = self.io.net.current_address() else {
            debug!("no network path up, scan paused");
            self.status = Status::NoNetwork;
            return;
        };
        if self.status == Status::NoNetwork {
            self.status = self.scanning_status();
        }
        if self.cursor.next_host() == Some(scanner::FIRST_HOST) {
            info!(subnet = %ipv4_to_default_cidr(local), "scanning subnet");
        }

        let batch = self.cursor.take_batch(local.octets()[3], self.settings.scan_batch);
        let targets: Vec<Ipv4Addr> = batch
            .hosts
            .iter()
            .map(|h| scanner::candidate(local, *h))
            .collect();
        let open = scanner::prefilter(
            self.io.probe.clone(),
            &targets,
            RAW_PRINT_PORT,
            self.settings.connect_timeout,
        )
        .await;
        for ip in open {
            debug!(%ip, "raw print port open, querying serial");
            self.send_query(ip).await;
        }

        if batch.exhausted {
            self.status = Status::NotFound;
            info!("scan pass finished without a match");
        }
    }

    /// Restart a finished pass once it has been parked for `after`.
    /// A zero duration disables automatic restarts.
    pub fn restart_exhausted_scan(&mut self, after: Duration) {
        if after.is_zero() || !self.session.is_searching() {
            return;
        }
        if let Some(at) = self.cursor.exhausted_at() {
            if at.elapsed() >= after {
                self.start_scan();
            }
        }
    }

    /// Send one GetRequest. Searching asks for the serial only; locked
    /// sessions also ask for every counter.
    pub async fn send_query(&mut self, target: Ipv4Addr) {
        let mut oids = vec![PrinterOid::Serial];
        if !self.session.is_searching() {
            oids.extend(PrinterOid::COUNTERS);
        }
        match self.io.snmp.send_get(target, &oids).await {
            Ok(()) => self.last_request = Some(Instant::now()),
            Err(e) => debug!(%target, error = %e, "query not sent"),
        }
    }

    /// Single ingestion point for every management response.
    pub async fn on_response(&mut self, bindings: &[VarBind], remote: Ipv4Addr) {
        let parsed = parse_bindings(bindings);
        match self.session.address() {
            None => self.consider_candidate(parsed.serial, remote).await,
            Some(address) if address == remote => self.ingest_poll(parsed),
            Some(address) => {
                debug!(%remote, target = %address, "ignoring response from non-target host")
            }
        }
    }

    /// Searching: decide whether the responder is the printer to lock on.
    /// Counter bindings seen here are discarded.
    async fn consider_candidate(&mut self, serial: Option<String>, remote: Ipv4Addr) {
        let Some(serial) = serial.filter(|s| !s.is_empty()) else {
            debug!(%remote, "response without serial, ignoring");
            return;
        };
        if !self.policy.accepts(&serial) {
            info!(%remote, %serial, "serial mismatch, skipping");
            return;
        }
        self.lock_on(remote, serial).await;
    }

    async fn lock_on(&mut self, address: Ipv4Addr, serial: String) {
        info!(%address, %serial, "printer locked");
        self.persist(KEY_PRINTER_IP, &address.to_string());
        self.persist(KEY_PRINTER_SERIAL, &serial);

        self.session = Session::Locked { address, serial };
        self.cursor.clear();
        self.counters.reset();
        self.status = Status::Locked(address);
        self.watchdog.mark_healthy(Instant::now());

        self.send_query(address).await;
        self.announce_serial();
    }

    /// Locked: fold a poll response into the counters and publish changes.
    fn ingest_poll(&mut self, parsed: Parsed) {
        if let Some(new) = parsed.serial.filter(|s| !s.is_empty()) {
            if let Session::Locked { serial, .. } = &mut self.session {
                if *serial != new {
                    if !self.policy.accepts(&new) {
                        warn!(old = %serial, new = %new, "locked printer now reports a different serial");
                    }
                    *serial = new.clone();
                    self.persist(KEY_PRINTER_SERIAL, &new);
                }
            }
        }

        for (oid, value) in parsed.counters {
            self.counters.set_raw(oid, value);
        }
        self.counters.recompute();

        self.status = Status::Online;
        self.watchdog.mark_healthy(Instant::now());

        self.publish_counters();
        self.announce_serial();
    }

    /// Periodic poll. Sends a full query once the poll interval has passed
    /// since the last successful send.
    pub async fn poll_tick(&mut self) {
        let Some(address) = self.session.address() else {
            return;
        };
        let due = self
            .last_request
            .map_or(true, |t| t.elapsed() >= self.settings.poll_interval);
        if due {
            self.send_query(address).await;
        }
    }

    /// Escalate a silent session: degrade while the raw print port still
    /// answers, otherwise drop the session and rescan.
    pub async fn watchdog_check(&mut self) {
        let Some(address) = self.session.address() else {
            return;
        };
        let now = Instant::now();
        if !self.watchdog.is_stale(now) {
            return;
        }

        let port = SocketAddrV4::new(address, RAW_PRINT_PORT);
        if self
            .io
            .probe
            .reachable(port, self.settings.probe_timeout)
            .await
        {
            warn!(
                %address,
                silent_secs = self.watchdog.stale_after().as_secs(),
                "printer reachable but not answering SNMP"
            );
            self.status = Status::ProtocolError;
            self.watchdog.mark_healthy(now);
        } else {
            warn!(%address, "printer lost, rescanning");
            self.start_scan();
        }
    }

    fn release_session(&mut self) {
        if let Session::Locked { address, .. } = &self.session {
            info!(%address, "releasing printer session");
        }
        self.session = Session::Searching;
        self.counters.reset();
        self.persist(KEY_PRINTER_IP, "");
        self.persist(KEY_PRINTER_SERIAL, "");
    }

    fn publish_counters(&mut self) {
        let total = self.counters.total_pages;
        if !self.totals.should_publish(total) {
            return;
        }
        let Session::Locked { address, serial } = &self.session else {
            return;
        };
        let c = &self.counters;
        let report = CounterReport {
            mac: self.settings.device_id.clone(),
            status: "online".to_string(),
            serial: serial.clone(),
            ip: address.to_string(),
            total: c.total_pages,
            color_copies: c.color_copies,
            mono_copies: c.mono_copies,
            color_prints: c.color_prints,
            mono_prints: c.mono_prints,
            color_total: c.color_total,
            mono_total: c.mono_total,
            total_copies: c.total_copies,
            timestamp: now_rfc3339(),
        };
        let topic = self.settings.topics.data.clone();
        if self.publish_json(&topic, &report, false) {
            info!(total, "counters published");
            self.totals.record(total);
        }
    }

    fn announce_serial(&mut self) {
        let Session::Locked { address, serial } = &self.session else {
            return;
        };
        if !self.serials.should_announce(serial) {
            return;
        }
        let report = SessionReport {
            mac: self.settings.device_id.clone(),
            serial: serial.clone(),
            ip: address.to_string(),
            version: self.settings.version.clone(),
        };
        let topic = self.settings.topics.init.clone();
        if self.publish_json(&topic, &report, true) {
            self.serials.record(&report.serial);
        }
    }

    /// Retained liveness report on the status topic.
    pub fn publish_heartbeat(&mut self) {
        let heartbeat = Heartbeat {
            mac: self.settings.device_id.clone(),
            status: "online".to_string(),
            ip: self
                .io
                .net
                .current_address()
                .map(|ip| ip.to_string())
                .unwrap_or_default(),
            target_serial: self.policy.filter().to_string(),
            mode: self.session.mode(),
            version: self.settings.version.clone(),
        };
        let topic = self.settings.topics.status.clone();
        self.publish_json(&topic, &heartbeat, true);
    }

    /// Called on every broker (re)connect: subscribe to commands, mark the
    /// bridge online, re-mirror the lock state and re-announce the printer.
    pub fn on_broker_connected(&mut self) {
        for topic in self.settings.topics.inbound() {
            if let Err(e) = self.io.outbound.subscribe(topic) {
                warn!(%topic, error = %e, "subscribe failed");
            }
        }
        self.publish_raw(&self.settings.topics.status, b"online".to_vec(), true);
        self.publish_lock_state();
        self.serials.reset();
        self.announce_serial();
    }

    fn publish_json<T: serde::Serialize>(&self, topic: &str, value: &T, retain: bool) -> bool {
        match serde_json::to_vec(value) {
            Ok(payload) => self.publish_raw(topic, payload, retain),
            Err(e) => {
                warn!(%topic, error = %e, "could not encode payload");
                false
            }
        }
    }

    fn publish_raw(&self, topic: &str, payload: Vec<u8>, retain: bool) -> bool {
        match self.io.outbound.publish(topic, payload, retain) {
            Ok(()) => true,
            Err(e) => {
                warn!(%topic, error = %e, "publish failed");
                false
            }
        }
    }

    /// Drive the lock output and echo the state outward. Always echoes,
    /// even when the state is unchanged.
    pub fn set_lock(&mut self, state: LockState) {
        if let Err(e) = self.io.lock_output.set(state) {
            warn!(state = state.as_payload(), error = %e, "lock output write failed");
        }
        self.lock = state;
        info!(state = state.as_payload(), "lock state set");
        self.publish_lock_state();
    }

    fn publish_lock_state(&self) {
        let payload = self.lock.as_payload().as_bytes().to_vec();
        self.publish_raw(&self.settings.topics.lock_state, payload, true);
    }

    /// Handle one inbound broker message. Malformed commands change nothing.
    pub fn dispatch(&mut self, topic: &str, payload: &[u8]) {
        match Command::parse(&self.settings.topics, topic, payload) {
            Ok(Command::ApplyUpdate(url)) => {
                info!(%url, "update command received");
                self.io.updater.apply_update(&url);
            }
            Ok(Command::SetLock(state)) => self.set_lock(state),
            Err(e) => warn!(%topic, error = %e, "discarding command"),
        }
    }

    /// Replace the serial filter, persist it and start over.
    pub fn reconfigure(&mut self, target_serial: &str) {
        self.policy = MatchPolicy::from_filter(target_serial);
        let filter = self.policy.filter().to_string();
        self.persist(KEY_TARGET_SERIAL, &filter);
        info!(%filter, "serial filter changed");
        self.start_scan();
    }

    fn persist(&mut self, key: &str, value: &str) {
        if let Err(e) = self.io.store.set(key, value) {
            warn!(%key, error = %e, "persisting setting failed");
        }
    }

    pub fn mode(&self) -> Mode {
        self.session.mode()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn counters(&self) -> &CounterSet {
        &self.counters
    }

    pub fn lock_state(&self) -> LockState {
        self.lock
    }

    pub fn scan_cursor(&self) -> &ScanCursor {
        &self.cursor
    }

    pub fn target_serial(&self) -> &str {
        self.policy.filter()
    }

    pub fn last_published_total(&self) -> u64 {
        self.totals.last_published()
    }

    pub fn snapshot(&self) -> Snapshot {
        let c = &self.counters;
        Snapshot {
            device_id: self.settings.device_id.clone(),
            mode: self.session.mode(),
            status: self.status.to_string(),
            target_serial: self.policy.filter().to_string(),
            target_address: self.session.address().map(|a| a.to_string()),
            serial: self.session.serial().map(str::to_string),
            total_pages: c.total_pages,
            color_copies: c.color_copies,
            mono_copies: c.mono_copies,
            color_prints: c.color_prints,
            mono_prints: c.mono_prints,
            color_total: c.color_total,
            mono_total: c.mono_total,
            total_copies: c.total_copies,
            lock: self.lock,
        }
    }
}
