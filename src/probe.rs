use std::net::SocketAddrV4;
use std::time::Duration;
use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::{self, Instant};
use tracing::trace;
use crate::traits::Probe;

/// TCP connect probe: a port counts as reachable when the handshake
/// completes within the timeout. The connection is dropped immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProbe;

#[async_trait]
impl Probe for TcpProbe {
    async fn reachable(&self, addr: SocketAddrV4, timeout: Duration) -> bool {
        let start = Instant::now();
        match time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => {
                trace!(%addr, latency_ms = start.elapsed().as_millis() as u64, "port open");
                true
            }
            // Closed, filtered, or timed out.
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn open_listener_is_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let addr = SocketAddrV4::new(Ipv4Addr::LOCALHOST, port);
        assert!(TcpProbe.reachable(addr, Duration::from_millis(500)).await);
    }

    #[tokio::test]
    async fn closed_port_is_not_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let addr = SocketAddrV4::new(Ipv4Addr::LOCALHOST, port);
        assert!(!TcpProbe.reachable(addr, Duration::from_millis(500)).await);
    }
}
