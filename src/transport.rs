//! Link-layer collaborators consumed by a node
//!
//! The node only needs "send these bytes to that peer" and "what does the
//! routing layer currently see". Both are traits so the mesh stack, a UDP
//! socket or a test recorder can stand behind them.

use std::net::SocketAddr;
use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tokio::net::UdpSocket;
use tracing::debug;

use crate::contracts::RoutingSummary;
use crate::errors::Result;

/// Best-effort datagram sender
pub trait Transport {
    /// False until the endpoint is established; sends are skipped until then
    fn is_ready(&self) -> bool;

    /// Fire-and-forget send; delivery is not guaranteed and not reported
    fn send_to(&mut self, peer: SocketAddr, bytes: &[u8]);

    /// Link-layer retransmission signal: true once if the most recent send
    /// was dropped before reaching the wire
    ///
    /// Links that cannot observe loss never raise it.
    fn take_loss_signal(&mut self) -> bool {
        false
    }
}

/// Current view of the mesh routing topology
pub trait RoutingView {
    fn current_routing_summary(&self) -> RoutingSummary;
}

/// Routing view that never changes
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticRouting {
    summary: Option<RoutingSummary>,
}

impl StaticRouting {
    /// No topology known: every summary is zeroed
    pub fn unknown() -> Self {
        Self { summary: None }
    }

    pub fn fixed(summary: RoutingSummary) -> Self {
        Self {
            summary: Some(summary),
        }
    }
}

impl RoutingView for StaticRouting {
    fn current_routing_summary(&self) -> RoutingSummary {
        self.summary.unwrap_or_else(RoutingSummary::unknown)
    }
}

/// UDP socket transport with optional simulated outbound loss
///
/// Sends use `try_send_to` so they never block the node; a full socket
/// buffer is treated like any other lost datagram. Either kind of drop
/// raises the loss signal until the next successful send or until it is
/// taken.
pub struct UdpTransport {
    socket: Option<Arc<UdpSocket>>,
    loss_rate: f64,
    rng: SmallRng,
    last_send_lost: bool,
    dropped: u64,
}

impl UdpTransport {
    /// Transport with no socket yet; every send is a silent no-op
    pub fn unbound() -> Self {
        Self {
            socket: None,
            loss_rate: 0.0,
            rng: SmallRng::from_entropy(),
            last_send_lost: false,
            dropped: 0,
        }
    }

    pub fn new(socket: Arc<UdpSocket>) -> Self {
        Self {
            socket: Some(socket),
            ..Self::unbound()
        }
    }

    /// Bind a socket on `local`
    pub async fn bind(local: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(local).await?;
        Ok(Self::new(Arc::new(socket)))
    }

    /// Drop each outbound datagram with probability `rate`, clamped to [0, 1]
    pub fn with_loss_rate(mut self, rate: f64) -> Self {
        self.loss_rate = if rate.is_nan() { 0.0 } else { rate.clamp(0.0, 1.0) };
        self
    }

    /// Seed the loss generator for reproducible runs
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    pub fn socket(&self) -> Option<Arc<UdpSocket>> {
        self.socket.clone()
    }

    pub fn loss_rate(&self) -> f64 {
        self.loss_rate
    }

    /// Datagrams dropped since the transport was created
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn record_loss(&mut self) {
        self.last_send_lost = true;
        self.dropped += 1;
    }
}

impl Transport for UdpTransport {
    fn is_ready(&self) -> bool {
        self.socket.is_some()
    }

    fn send_to(&mut self, peer: SocketAddr, bytes: &[u8]) {
        let Some(socket) = self.socket.clone() else {
            return;
        };

        if self.loss_rate > 0.0 && self.rng.gen_bool(self.loss_rate) {
            debug!(%peer, len = bytes.len(), "simulated link loss");
            self.record_loss();
            return;
        }

        match socket.try_send_to(bytes, peer) {
            Ok(_) => self.last_send_lost = false,
            Err(e) => {
                debug!(%peer, error = %e, "send failed");
                self.record_loss();
            }
        }
    }

    fn take_loss_signal(&mut self) -> bool {
        std::mem::take(&mut self.last_send_lost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_routing() {
        assert!(StaticRouting::unknown().current_routing_summary().is_unknown());

        let summary = RoutingSummary {
            parent_address: [0x02, 0x00],
            parent_link_cost: 64,
            rank_metric: 512,
            neighbor_count: 4,
            beacon_interval: 16,
        };
        assert_eq!(StaticRouting::fixed(summary).current_routing_summary(), summary);
    }

    #[test]
    fn test_unbound_transport_is_silent() {
        let mut transport = UdpTransport::unbound();
        assert!(!transport.is_ready());
        transport.send_to("127.0.0.1:5688".parse().unwrap(), b"report");
    }

    #[test]
    fn test_loss_rate_is_clamped() {
        assert_eq!(UdpTransport::unbound().with_loss_rate(1.5).loss_rate(), 1.0);
        assert_eq!(UdpTransport::unbound().with_loss_rate(-0.2).loss_rate(), 0.0);
        assert_eq!(UdpTransport::unbound().with_loss_rate(f64::NAN).loss_rate(), 0.0);
    }

    #[tokio::test]
    async fn test_udp_transport_delivers() {
        let mut tx = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let rx = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer = rx.local_addr().unwrap();

        assert!(tx.is_ready());
        tx.send_to(peer, b"telemetry");
        assert!(!tx.take_loss_signal());

        let mut buf = [0u8; 64];
        let (len, _) = rx.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"telemetry");
    }

    #[tokio::test]
    async fn test_full_loss_drops_everything() {
        let mut tx = UdpTransport::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap()
            .with_loss_rate(1.0)
            .with_seed(7);
        let rx = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer = rx.local_addr().unwrap();

        tx.send_to(peer, b"lost");
        assert_eq!(tx.dropped(), 1);
        assert!(tx.take_loss_signal());
        assert!(!tx.take_loss_signal(), "signal is raised once per drop");

        let mut buf = [0u8; 16];
        let res = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            rx.recv_from(&mut buf),
        )
        .await;
        assert!(res.is_err());
    }
}
