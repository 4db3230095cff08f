//! The periodic driver: the only task that touches the engine.
//!
//! Every input (timer ticks, SNMP responses, broker messages, HTTP
//! requests) is funnelled through one `select!` loop, so engine calls are
//! strictly serialized.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use crate::engine::Engine;
use crate::snmp::{Response, UdpSnmp};
use crate::types::Snapshot;

/// Requests from the broker pump and the HTTP surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    BrokerConnected,
    Message { topic: String, payload: Vec<u8> },
    SetTargetSerial(String),
    Rescan,
}

#[derive(Debug, Clone, Copy)]
pub struct DriverTiming {
    pub scan_every: Duration,
    pub poll_every: Duration,
    pub heartbeat_every: Duration,
    /// 0 disables automatic restart of a finished scan pass.
    pub rescan_after: Duration,
}

impl Default for DriverTiming {
    fn default() -> Self {
        Self {
            scan_every: Duration::from_millis(200),
            poll_every: Duration::from_secs(1),
            heartbeat_every: Duration::from_secs(30),
            rescan_after: Duration::from_secs(300),
        }
    }
}

fn interval(period: Duration) -> time::Interval {
    let mut iv = time::interval(period.max(Duration::from_millis(10)));
    iv.set_missed_tick_behavior(MissedTickBehavior::Delay);
    iv
}

/// Run until `cancel` fires. Snapshots are pushed to `snapshots` after every
/// step so readers never need access to the engine.
pub async fn run(
    mut engine: Engine,
    snmp: Arc<UdpSnmp>,
    mut inbound: mpsc::Receiver<Inbound>,
    snapshots: watch::Sender<Snapshot>,
    timing: DriverTiming,
    cancel: CancellationToken,
) -> Engine {
    let mut scan_tick = interval(timing.scan_every);
    let mut poll_tick = interval(timing.poll_every);
    let mut heartbeat_tick = interval(timing.heartbeat_every);

    info!(mode = ?engine.mode(), status = %engine.status(), "driver started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = scan_tick.tick() => {
                engine.restart_exhausted_scan(timing.rescan_after);
                engine.process_scan_batch().await;
            }
            _ = poll_tick.tick() => {
                engine.poll_tick().await;
                engine.watchdog_check().await;
            }
            _ = heartbeat_tick.tick() => engine.publish_heartbeat(),
            received = snmp.recv() => match received {
                Ok((response, from)) => handle_response(&mut engine, response, from.ip()).await,
                Err(e) => {
                    warn!(error = %e, "SNMP receive failed");
                    time::sleep(Duration::from_millis(500)).await;
                }
            },
            msg = inbound.recv() => match msg {
                Some(msg) => handle_inbound(&mut engine, msg),
                None => {
                    debug!("inbound channel closed");
                    break;
                }
            },
        }
        snapshots.send_replace(engine.snapshot());
    }
    info!("driver stopped");
    engine
}

async fn handle_response(engine: &mut Engine, response: Response, from: IpAddr) {
    let IpAddr::V4(remote) = from else {
        return;
    };
    if response.error_status != 0 {
        debug!(
            %remote,
            error_status = response.error_status,
            error_index = response.error_index,
            "agent returned an error, response discarded"
        );
        return;
    }
    engine.on_response(&response.bindings, remote).await;
}

fn handle_inbound(engine: &mut Engine, msg: Inbound) {
    match msg {
        Inbound::BrokerConnected => engine.on_broker_connected(),
        Inbound::Message { topic, payload } => engine.dispatch(&topic, &payload),
        Inbound::SetTargetSerial(serial) => engine.reconfigure(&serial),
        Inbound::Rescan => engine.start_scan(),
    }
}

