//! Event pump for a node on a UDP socket
//!
//! A single task waits for the next datagram and hands it to the node as an
//! event. The retransmit timeout paces the link-layer retry: when it expires
//! and the transport reports that the node's last datagram was dropped, the
//! loop raises a retransmission request. Silence without a recorded loss
//! means the peer is still busy (handshake or cool-down) and the loop keeps
//! waiting. Events are handled inline on this task, so the handshake
//! workload and the cool-down block the loop exactly as they would block a
//! sensor.

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::contracts::{Event, Role};
use crate::errors::{FlightError, Result};
use crate::node::{FlightNode, FlightStep};
use crate::transport::{Transport, UdpTransport};

/// Receive buffer size; larger than any report so truncation shows up as a
/// decode failure instead of a silent cut
const RECV_BUFFER_LEN: usize = crate::MAX_DATAGRAM_SIZE * 2;

/// Loop settings for [`run`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverOptions {
    /// Wait before resending a dropped datagram
    pub retransmit_timeout: Duration,
    /// Stop after this many completed flights
    pub max_flights: Option<u64>,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            retransmit_timeout: Duration::from_secs(2),
            max_flights: None,
        }
    }
}

/// Counters collected over one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverSummary {
    pub datagrams: u64,
    pub retransmissions: u64,
    /// Timeouts with nothing lost; the peer was busy
    pub silent_timeouts: u64,
    pub flights: u64,
    pub replies: u64,
}

/// Feed queued events to `node` strictly in order
pub fn process_queue<T: Transport>(
    node: &mut FlightNode<T>,
    queue: &mut VecDeque<Event>,
) -> Vec<FlightStep> {
    let mut steps = Vec::with_capacity(queue.len());
    while let Some(event) = queue.pop_front() {
        steps.push(node.handle(event));
    }
    steps
}

/// Drive `node` from its socket until `max_flights` flights complete
///
/// The initiator opens the exchange with an unsolicited report.
///
/// # Errors
/// Returns an I/O error if the node's transport has no socket.
pub async fn run(node: &mut FlightNode<UdpTransport>, options: DriverOptions) -> Result<DriverSummary> {
    let socket = node.transport().socket().ok_or_else(|| {
        FlightError::Io(io::Error::new(io::ErrorKind::NotConnected, "transport not bound"))
    })?;

    info!(role = %node.role(), local = ?socket.local_addr().ok(), peer = ?node.peer(), "node started");

    let mut summary = DriverSummary::default();
    if node.role() == Role::Initiator {
        node.send_report();
    }

    let mut buf = vec![0u8; RECV_BUFFER_LEN];
    loop {
        if options
            .max_flights
            .is_some_and(|max| node.flight().completed_flights() >= max)
        {
            break;
        }

        node.begin_wait();
        let received = tokio::time::timeout(options.retransmit_timeout, socket.recv_from(&mut buf)).await;
        node.end_wait();

        let event = match received {
            Ok(Ok((len, sender))) => {
                summary.datagrams += 1;
                Event::DataReceived {
                    sender,
                    payload: buf[..len].to_vec(),
                }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "receive failed");
                continue;
            }
            Err(_) if node.transport_mut().take_loss_signal() => {
                summary.retransmissions += 1;
                Event::RetransmitRequested
            }
            Err(_) => {
                summary.silent_timeouts += 1;
                debug!(role = %node.role(), "peer silent, nothing lost");
                continue;
            }
        };

        node.handle(event);
    }

    summary.flights = node.flight().completed_flights();
    summary.replies = node.replies_sent();
    info!(
        datagrams = summary.datagrams,
        retransmissions = summary.retransmissions,
        silent_timeouts = summary.silent_timeouts,
        flights = summary.flights,
        replies = summary.replies,
        "node stopped"
    );
    Ok(summary)
}
