use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use lan_print_bridge::config::BridgeConfig;
use lan_print_bridge::driver::{self, DriverTiming, Inbound};
use lan_print_bridge::engine::{Collaborators, Engine};
use lan_print_bridge::lock::{FileLockOutput, LogLockOutput};
use lan_print_bridge::mqtt::{self, NoBroker};
use lan_print_bridge::netdetect::InterfacePaths;
use lan_print_bridge::probe::TcpProbe;
use lan_print_bridge::server;
use lan_print_bridge::snmp::UdpSnmp;
use lan_print_bridge::store::FileStore;
use lan_print_bridge::traits::{LockOutput, Outbound};
use lan_print_bridge::update::CommandUpdateExecutor;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// lan-print-bridge: finds one printer on the local /24, polls its page
/// counters over SNMP and republishes changes to an MQTT broker.
#[derive(Debug, Clone, Parser)]
#[command(name = "lan-print-bridge", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Missing file means defaults.
    #[arg(long, default_value = "bridge.toml")]
    config: PathBuf,

    /// Override the serial filter (empty string accepts the first printer).
    #[arg(long = "target-serial")]
    target_serial: Option<String>,

    /// Override the broker host.
    #[arg(long)]
    broker: Option<String>,

    /// Override the HTTP bind address.
    #[arg(long = "http-bind")]
    http_bind: Option<SocketAddr>,

    /// Do not start the embedded HTTP UI.
    #[arg(long = "no-http", default_value_t = false)]
    no_http: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut cfg = BridgeConfig::load(&cli.config)?;
    if let Some(serial) = cli.target_serial {
        cfg.device.target_serial = serial;
    }
    if let Some(host) = cli.broker {
        cfg.mqtt.host = host;
    }
    if let Some(bind) = cli.http_bind {
        cfg.http.bind = bind;
    }
    if cli.no_http {
        cfg.http.enabled = false;
    }

    let device_id = cfg.device_id();
    let topics = cfg.topics(&device_id);
    let broker = if cfg.mqtt.host.is_empty() {
        "<none>".to_string()
    } else {
        format!("{}:{}", cfg.mqtt.host, cfg.mqtt.port)
    };
    let http = if cfg.http.enabled {
        cfg.http.bind.to_string()
    } else {
        "<off>".to_string()
    };
    info!(
        device = %device_id,
        config = %cli.config.display(),
        target_serial = %cfg.device.target_serial,
        %broker,
        %http,
        "lan-print-bridge starting"
    );

    let cancel = CancellationToken::new();
    let (inbound_tx, inbound_rx) = mpsc::channel::<Inbound>(64);

    let snmp = Arc::new(UdpSnmp::bind(cfg.snmp.community.clone(), cfg.snmp.port).await?);
    let store = FileStore::open(cfg.device.state_file.clone())
        .with_context(|| format!("failed to open state file {}", cfg.device.state_file.display()))?;
    let lock_output: Box<dyn LockOutput> = match &cfg.device.lock_output {
        Some(path) => Box::new(FileLockOutput::new(path.clone())),
        None => Box::new(LogLockOutput),
    };

    // The broker outlives the driver so the final `offline` can be flushed.
    let broker_stop = CancellationToken::new();
    let mut link = None;
    let outbound: Box<dyn Outbound> = if cfg.mqtt.host.is_empty() {
        info!("no broker configured, telemetry stays local");
        Box::new(NoBroker)
    } else {
        let (client, eventloop) = mqtt::connect(&cfg.mqtt, &device_id, &topics);
        let pump = tokio::spawn(mqtt::pump(eventloop, inbound_tx.clone(), broker_stop.clone()));
        link = Some((client.clone(), pump));
        Box::new(client)
    };

    let engine = Engine::new(
        cfg.engine_settings(&device_id),
        Collaborators {
            net: Box::new(InterfacePaths::new(
                cfg.network.wired_interface.clone(),
                cfg.network.wireless_interface.clone(),
            )),
            probe: Arc::new(TcpProbe),
            snmp: snmp.clone(),
            outbound,
            store: Box::new(store),
            lock_output,
            updater: Box::new(CommandUpdateExecutor::new(cfg.device.update_command.clone())),
        },
    );
    let (snap_tx, snap_rx) = watch::channel(engine.snapshot());

    if cfg.http.enabled {
        let bind = cfg.http.bind;
        let ui_dir = cfg.http.ui_dir.clone();
        let requests = inbound_tx.clone();
        let stop = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = server::spawn_server(bind, &ui_dir, snap_rx, requests, stop).await {
                error!("HTTP UI server error: {e:#}");
            }
        });
    }

    let timing = DriverTiming {
        heartbeat_every: Duration::from_secs(cfg.mqtt.heartbeat_secs.max(1)),
        rescan_after: Duration::from_secs(cfg.scan.rescan_after_secs),
        ..DriverTiming::default()
    };
    let stop = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("Ctrl+C received, shutting down");
        stop.cancel();
    });

    // The driver stops once every sender is gone; hold one until it exits.
    let _keepalive = inbound_tx;
    let engine = driver::run(engine, snmp, inbound_rx, snap_tx, timing, cancel).await;

    if let Some((client, pump)) = link {
        client.shutdown(&topics).await;
        if tokio::time::timeout(SHUTDOWN_GRACE, pump).await.is_err() {
            broker_stop.cancel();
        }
    }
    info!(mode = ?engine.mode(), "stopped");
    Ok(())
}
