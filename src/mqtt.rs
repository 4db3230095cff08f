//! Broker link over `rumqttc`.
//!
//! `MqttLink` is the engine's [`Outbound`]; [`pump`] drives the event loop
//! and forwards connects and inbound publishes to the driver.

use std::time::Duration;
use anyhow::Result;
use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Outgoing, Packet, QoS};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use crate::config::MqttConfig;
use crate::driver::Inbound;
use crate::telemetry::Topics;
use crate::traits::Outbound;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const REQUEST_CAPACITY: usize = 32;

#[derive(Clone)]
pub struct MqttLink {
    client: AsyncClient,
}

/// Build the client and its event loop. Nothing touches the network until
/// the event loop is polled.
pub fn connect(cfg: &MqttConfig, device_id: &str, topics: &Topics) -> (MqttLink, EventLoop) {
    let client_id = format!("bridge-{device_id}");
    let mut options = MqttOptions::new(client_id, &cfg.host, cfg.port);
    options.set_keep_alive(Duration::from_secs(cfg.keep_alive_secs.max(5)));
    if let Some(user) = &cfg.user {
        options.set_credentials(user, cfg.password.clone().unwrap_or_default());
    }
    options.set_last_will(LastWill::new(
        &topics.status,
        b"offline".to_vec(),
        QoS::AtLeastOnce,
        true,
    ));
    let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
    (MqttLink { client }, eventloop)
}

impl MqttLink {
    /// Best-effort retained `offline` and a clean disconnect.
    pub async fn shutdown(&self, topics: &Topics) {
        let _ = self
            .client
            .publish(&topics.status, QoS::AtLeastOnce, true, b"offline".to_vec())
            .await;
        let _ = self.client.disconnect().await;
    }
}

impl Outbound for MqttLink {
    fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<()> {
        trace!(%topic, bytes = payload.len(), retain, "publish");
        self.client
            .try_publish(topic, QoS::AtLeastOnce, retain, payload)?;
        Ok(())
    }

    fn subscribe(&self, topic: &str) -> Result<()> {
        self.client.try_subscribe(topic, QoS::AtLeastOnce)?;
        debug!(%topic, "subscribed");
        Ok(())
    }
}

/// Outbound used when no broker is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBroker;

impl Outbound for NoBroker {
    fn publish(&self, topic: &str, payload: Vec<u8>, _retain: bool) -> Result<()> {
        trace!(%topic, bytes = payload.len(), "no broker configured, dropping publish");
        Ok(())
    }

    fn subscribe(&self, _topic: &str) -> Result<()> {
        Ok(())
    }
}

/// Poll the event loop until cancelled or a disconnect has been sent,
/// reconnecting after errors.
pub async fn pump(mut eventloop: EventLoop, tx: mpsc::Sender<Inbound>, cancel: CancellationToken) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = eventloop.poll() => event,
        };
        let inbound = match event {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("broker connected");
                Inbound::BrokerConnected
            }
            Ok(Event::Incoming(Packet::Publish(p))) => Inbound::Message {
                topic: p.topic.clone(),
                payload: p.payload.to_vec(),
            },
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("broker disconnected");
                continue;
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "broker connection error, retrying in {}s", RECONNECT_DELAY.as_secs());
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                }
                continue;
            }
        };
        if tx.send(inbound).await.is_err() {
            trace!("driver gone, dropping broker event");
        }
    }
    debug!("broker pump stopped");
}
