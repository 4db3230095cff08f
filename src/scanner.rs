use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::debug;
use crate::traits::Probe;

/// First and last host octet probed in a /24 pass.
pub const FIRST_HOST: u16 = 1;
pub const LAST_HOST: u16 = 254;

/// Raw print (JetDirect) port; anything listening here is worth an SNMP query.
pub const RAW_PRINT_PORT: u16 = 9100;

/// Progress through one pass over the local /24.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanCursor {
    #[default]
    Idle,
    Scanning { next: u16 },
    /// The pass ran past the last host without a lock.
    Exhausted { at: Instant },
}

/// Host octets handed out by one [`ScanCursor::take_batch`] call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Batch {
    pub hosts: Vec<u8>,
    /// True when this batch ended the pass.
    pub exhausted: bool,
}

impl ScanCursor {
    pub fn restart(&mut self) {
        *self = ScanCursor::Scanning { next: FIRST_HOST };
    }

    pub fn clear(&mut self) {
        *self = ScanCursor::Idle;
    }

    pub fn next_host(&self) -> Option<u16> {
        match self {
            ScanCursor::Scanning { next } => Some(*next),
            _ => None,
        }
    }

    /// When the last pass ended, if the cursor is parked at the end.
    pub fn exhausted_at(&self) -> Option<Instant> {
        match self {
            ScanCursor::Exhausted { at } => Some(*at),
            _ => None,
        }
    }

    /// Advance over up to `size` host octets, skipping `own`.
    ///
    /// The skipped octet still counts against the batch size, so a call
    /// never does more than `size` steps of work.
    pub fn take_batch(&mut self, own: u8, size: usize) -> Batch {
        let mut batch = Batch::default();
        let ScanCursor::Scanning { next } = self else {
            return batch;
        };
        let mut cur = *next;
        for _ in 0..size.max(1) {
            if cur > LAST_HOST {
                batch.exhausted = true;
                break;
            }
            if cur != own as u16 {
                batch.hosts.push(cur as u8);
            }
            cur += 1;
        }
        if cur > LAST_HOST {
            batch.exhausted = true;
        }
        *self = if batch.exhausted {
            ScanCursor::Exhausted { at: Instant::now() }
        } else {
            ScanCursor::Scanning { next: cur }
        };
        batch
    }
}

/// Candidate address for `host` on the same /24 as `local`.
pub fn candidate(local: Ipv4Addr, host: u8) -> Ipv4Addr {
    let o = local.octets();
    Ipv4Addr::new(o[0], o[1], o[2], host)
}

/// Probe `port` on every target concurrently and return the ones that
/// accepted a connection, in ascending address order.
pub async fn prefilter(
    probe: Arc<dyn Probe>,
    targets: &[Ipv4Addr],
    port: u16,
    timeout: Duration,
) -> Vec<Ipv4Addr> {
    let mut set = JoinSet::new();
    for &ip in targets {
        let probe = probe.clone();
        set.spawn(async move {
            let open = probe.reachable(SocketAddrV4::new(ip, port), timeout).await;
            (ip, open)
        });
    }

    let mut open = Vec::new();
    while let Some(res) = set.join_next().await {
        match res {
            Ok((ip, true)) => open.push(ip),
            Ok((ip, false)) => debug!(%ip, port, "no listener"),
            Err(e) => debug!(error = %e, "probe task failed"),
        }
    }
    open.sort();
    open
}
