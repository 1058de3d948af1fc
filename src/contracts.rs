//! Core data structures for the certflight exchange
//!
//! Telemetry messages are archived with rkyv so the receiving side can
//! validate a datagram in place. The layout mirrors the collect-view report
//! of a mesh sensor: a one-byte sequence number, one alignment byte, the
//! routing summary and a filler blob standing in for a certificate.
use std::fmt;
use std::net::SocketAddr;

use rkyv::{Archive, Deserialize, Serialize};

/// Sequence value a counter jumps to after 255, so 0 is never reused
pub const SEQUENCE_WRAP_TO: u8 = 128;

/// Reserved sequence value that tells a peer the sender restarted
pub const SEQUENCE_RESTART: u8 = 0;

/// The two sides of an exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Sensor node: reports telemetry and times each flight
    Initiator,
    /// Sink node: answers the most recent sender
    Responder,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initiator => write!(f, "initiator"),
            Self::Responder => write!(f, "responder"),
        }
    }
}

/// One-byte message counter with wrap-to-128 semantics
///
/// A fresh counter yields 1, 2, ..., 255, 128, 129, ... so the value 0
/// only ever appears on the wire when a node has just restarted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceNumber(u8);

impl SequenceNumber {
    /// Counter that has not produced a value yet
    pub fn new() -> Self {
        Self(SEQUENCE_RESTART)
    }

    /// Last value handed out, 0 if none
    pub fn current(&self) -> u8 {
        self.0
    }

    /// Advance and return the value for the next transmission
    pub fn next(&mut self) -> u8 {
        self.0 = self.0.wrapping_add(1);
        if self.0 == SEQUENCE_RESTART {
            self.0 = SEQUENCE_WRAP_TO;
        }
        self.0
    }
}

/// Snapshot of the mesh topology attached to every report
///
/// All fields are zero when no routing topology is known yet.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[archive(check_bytes)]
pub struct RoutingSummary {
    /// Link-layer address of the preferred parent, low bytes of its IPv6
    /// address in reversed order
    pub parent_address: [u8; 2],

    /// Expected transmission count towards the parent
    pub parent_link_cost: u16,

    /// Local rank in the routing DAG
    pub rank_metric: u16,

    /// Number of neighbours in the neighbour table
    pub neighbor_count: u16,

    /// Current beacon (DIO) interval in seconds
    pub beacon_interval: u16,
}

impl RoutingSummary {
    /// Summary reported while no topology is known
    pub fn unknown() -> Self {
        Self::default()
    }

    /// True when every field is zero
    pub fn is_unknown(&self) -> bool {
        *self == Self::default()
    }
}

/// Telemetry datagram exchanged in both directions
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[archive(check_bytes)]
pub struct TelemetryMessage {
    /// Wrap-to-128 sequence number, see [`SequenceNumber`]
    pub sequence: u8,

    /// Padding kept for parity with the sensor firmware layout
    pub for_alignment: u8,

    /// Routing view of the sender at transmission time
    pub routing: RoutingSummary,

    /// Certificate stand-in: fill bytes terminated by a zero byte
    pub payload: Vec<u8>,
}

impl TelemetryMessage {
    /// Build a message with a filler payload of `filler_len` bytes
    pub fn new(sequence: u8, routing: RoutingSummary, filler_len: usize, fill_byte: u8) -> Self {
        let mut payload = vec![fill_byte; filler_len];
        if let Some(last) = payload.last_mut() {
            *last = 0;
        }

        Self {
            sequence,
            for_alignment: 0,
            routing,
            payload,
        }
    }

    /// True when the sender signalled a restart
    pub fn is_restart(&self) -> bool {
        self.sequence == SEQUENCE_RESTART
    }
}

/// Discrete inputs delivered to a node, processed strictly in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A datagram arrived from `sender`
    DataReceived { sender: SocketAddr, payload: Vec<u8> },

    /// The link reported a dropped packet; resend the last report
    RetransmitRequested,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_starts_at_one() {
        let mut seq = SequenceNumber::new();
        assert_eq!(seq.current(), 0);
        assert_eq!(seq.next(), 1);
        assert_eq!(seq.next(), 2);
    }

    #[test]
    fn test_sequence_wraps_to_128() {
        let mut seq = SequenceNumber::new();
        let values: Vec<u8> = (0..300).map(|_| seq.next()).collect();

        assert_eq!(values[254], 255);
        assert_eq!(values[255], 128);
        assert_eq!(values[256], 129);
        assert!(!values.contains(&0));
    }

    #[test]
    fn test_filler_is_zero_terminated() {
        let msg = TelemetryMessage::new(7, RoutingSummary::unknown(), 128, b'A');

        assert_eq!(msg.payload.len(), 128);
        assert_eq!(msg.payload[127], 0);
        assert!(msg.payload[..127].iter().all(|b| *b == b'A'));
        assert!(!msg.is_restart());
    }

    #[test]
    fn test_empty_filler() {
        let msg = TelemetryMessage::new(1, RoutingSummary::unknown(), 0, b'A');
        assert!(msg.payload.is_empty());
    }

    #[test]
    fn test_unknown_routing_summary() {
        assert!(RoutingSummary::unknown().is_unknown());

        let known = RoutingSummary {
            parent_address: [0x01, 0x00],
            parent_link_cost: 128,
            rank_metric: 256,
            neighbor_count: 3,
            beacon_interval: 8,
        };
        assert!(!known.is_unknown());
    }
}
