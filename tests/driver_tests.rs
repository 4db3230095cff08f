//! Runs the driver loop against a loopback SNMP agent. Linux only: the agent
//! binds 127.0.0.5, which other platforms do not route by default.
#![cfg(target_os = "linux")]

mod common;

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use common::{topics, Harness};
use lan_print_bridge::driver::{self, DriverTiming, Inbound};
use lan_print_bridge::engine::Engine;
use lan_print_bridge::oid::PrinterOid;
use lan_print_bridge::snmp::UdpSnmp;
use lan_print_bridge::types::{LockState, Mode};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

const AGENT: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 5);

fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    match content.len() {
        n if n < 0x80 => out.push(n as u8),
        n if n < 0x100 => out.extend([0x81, n as u8]),
        n => out.extend([0x82, (n >> 8) as u8, n as u8]),
    }
    out.extend_from_slice(content);
    out
}

fn oid(arcs: &[u32]) -> Vec<u8> {
    let mut out = vec![(arcs[0] * 40 + arcs[1]) as u8];
    for &arc in &arcs[2..] {
        let mut groups = vec![(arc & 0x7F) as u8];
        let mut v = arc >> 7;
        while v > 0 {
            groups.push((v & 0x7F) as u8 | 0x80);
            v >>= 7;
        }
        groups.reverse();
        out.extend(groups);
    }
    out
}

fn uint(v: u32) -> Vec<u8> {
    let mut bytes: Vec<u8> = v.to_be_bytes().into_iter().skip_while(|b| *b == 0).collect();
    if bytes.first().map_or(true, |b| b & 0x80 != 0) {
        bytes.insert(0, 0);
    }
    bytes
}

/// A Printer-MIB agent reporting serial `X123` and fixed counters.
fn get_response(with_counters: bool) -> Vec<u8> {
    let mut binds = vec![(PrinterOid::Serial, tlv(0x04, b"X123"))];
    if with_counters {
        binds.extend([
            (PrinterOid::SysTotal, tlv(0x41, &uint(12))),
            (PrinterOid::ColorCopies, tlv(0x02, &uint(3))),
            (PrinterOid::MonoCopies, tlv(0x02, &uint(4))),
            (PrinterOid::ColorPrints, tlv(0x02, &uint(2))),
            (PrinterOid::MonoPrints, tlv(0x02, &uint(3))),
        ]);
    }
    let list: Vec<u8> = binds
        .into_iter()
        .flat_map(|(o, value)| tlv(0x30, &[tlv(0x06, &oid(o.arcs())), value].concat()))
        .collect();
    let pdu = [tlv(0x02, &[1]), tlv(0x02, &[0]), tlv(0x02, &[0]), tlv(0x30, &list)].concat();
    let msg = [tlv(0x02, &[0]), tlv(0x04, b"public"), tlv(0xA2, &pdu)].concat();
    tlv(0x30, &msg)
}

/// Answers the first request with the serial only, later ones in full.
async fn run_agent(socket: UdpSocket) {
    let mut buf = [0u8; 1500];
    let mut answered = 0;
    while let Ok((_, from)) = socket.recv_from(&mut buf).await {
        let reply = get_response(answered > 0);
        answered += 1;
        if socket.send_to(&reply, from).await.is_err() {
            break;
        }
    }
}

#[tokio::test]
async fn driver_discovers_polls_and_serves_commands() {
    let agent = UdpSocket::bind((AGENT, 0)).await.unwrap();
    let port = agent.local_addr().unwrap().port();
    tokio::spawn(run_agent(agent));

    let h = Harness::on_network(Ipv4Addr::LOCALHOST).with_printers(&[AGENT]);
    let snmp = Arc::new(UdpSnmp::bind("public", port).await.unwrap());
    let mut collaborators = h.collaborators();
    collaborators.snmp = snmp.clone();
    let engine = Engine::new(h.settings("X123"), collaborators);

    let (tx, rx) = mpsc::channel(8);
    let (snap_tx, mut snap_rx) = watch::channel(engine.snapshot());
    let cancel = CancellationToken::new();
    let timing = DriverTiming {
        scan_every: Duration::from_millis(10),
        poll_every: Duration::from_millis(50),
        ..DriverTiming::default()
    };
    let driver = tokio::spawn(driver::run(engine, snmp, rx, snap_tx, timing, cancel.clone()));

    let snap = tokio::time::timeout(
        Duration::from_secs(5),
        snap_rx.wait_for(|s| s.total_pages == 12),
    )
    .await
    .expect("printer was never polled")
    .unwrap()
    .clone();
    assert_eq!(snap.mode, Mode::Locked);
    assert_eq!(snap.target_address.as_deref(), Some("127.0.0.5"));
    assert_eq!(snap.color_total, 5);
    assert_eq!(snap.mono_total, 7);

    tx.send(Inbound::Message {
        topic: topics().lock_cmd,
        payload: b"lock".to_vec(),
    })
    .await
    .unwrap();
    tokio::time::timeout(
        Duration::from_secs(5),
        snap_rx.wait_for(|s| s.lock == LockState::Locked),
    )
    .await
    .expect("lock command not applied")
    .unwrap();

    cancel.cancel();
    let engine = driver.await.unwrap();
    assert_eq!(engine.mode(), Mode::Locked);
    assert_eq!(h.json_on(&topics().data).len(), 1);
    assert_eq!(h.json_on(&topics().init).len(), 1);
}
