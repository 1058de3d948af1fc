//! Transmitter module - telemetry message assembly
//!
//! Builds one datagram per transmission from a fresh sequence number, the
//! routing collaborator's current view and the filler payload, then hands
//! it to the transport. Sending is fire-and-forget: the retransmission path
//! exists precisely because delivery is not guaranteed.

use std::net::SocketAddr;

use rkyv::to_bytes;
use tracing::{debug, warn};

use crate::contracts::{RoutingSummary, SequenceNumber, TelemetryMessage};
use crate::errors::{FlightError, Result};
use crate::transport::{RoutingView, Transport};

/// Assembles and sends telemetry reports for one node
#[derive(Debug, Clone)]
pub struct Transmitter {
    sequence: SequenceNumber,
    filler_len: usize,
    fill_byte: u8,
}

impl Transmitter {
    /// Serialize a message to bytes using rkyv
    ///
    /// # Errors
    /// Returns `DatagramTooLarge` when the archive exceeds
    /// [`crate::MAX_DATAGRAM_SIZE`].
    pub fn serialize_message(message: &TelemetryMessage) -> Result<Vec<u8>> {
        let bytes = to_bytes::<_, 1024>(message)
            .map(|aligned_vec| aligned_vec.to_vec())
            .map_err(|_| FlightError::Serialization(
                "Failed to serialize TelemetryMessage".to_string()
            ))?;

        if bytes.len() > crate::MAX_DATAGRAM_SIZE {
            return Err(FlightError::DatagramTooLarge {
                size: bytes.len(),
                limit: crate::MAX_DATAGRAM_SIZE,
            });
        }

        Ok(bytes)
    }

    /// Build the next message, consuming one sequence number
    pub fn assemble(&mut self, routing: RoutingSummary) -> TelemetryMessage {
        let sequence = self.sequence.next();
        TelemetryMessage::new(sequence, routing, self.filler_len, self.fill_byte)
    }

    /// Assemble a report and send it to `peer`
    ///
    /// Returns the sequence number handed to the transport, or `None` when
    /// the transport is not set up yet. In that case nothing is consumed.
    pub fn send<T, R>(&mut self, transport: &mut T, routing: &R, peer: SocketAddr) -> Option<u8>
    where
        T: Transport + ?Sized,
        R: RoutingView + ?Sized,
    {
        if !transport.is_ready() {
            return None;
        }

        let message = self.assemble(routing.current_routing_summary());
        match Self::serialize_message(&message) {
            Ok(bytes) => {
                transport.send_to(peer, &bytes);
                debug!(%peer, seqno = message.sequence, len = bytes.len(), "report sent");
                Some(message.sequence)
            }
            Err(e) => {
                warn!(seqno = message.sequence, error = %e, "report dropped");
                None
            }
        }
    }

    /// Last sequence number handed out
    pub fn last_sequence(&self) -> u8 {
        self.sequence.current()
    }

    pub fn filler_len(&self) -> usize {
        self.filler_len
    }
}

/// TransmitterBuilder - Fluent interface for report layout configuration
pub struct TransmitterBuilder {
    filler_len: usize,
    fill_byte: u8,
}

impl TransmitterBuilder {
    /// Create a builder with the default certificate stand-in
    pub fn new() -> Self {
        Self {
            filler_len: crate::FILLER_LEN,
            fill_byte: crate::FILL_BYTE,
        }
    }

    /// Set the filler payload length in bytes
    pub fn with_filler_len(mut self, len: usize) -> Self {
        self.filler_len = len;
        self
    }

    /// Set the byte the filler is made of
    pub fn with_fill_byte(mut self, byte: u8) -> Self {
        self.fill_byte = byte;
        self
    }

    /// Validate the layout and build the transmitter
    ///
    /// # Errors
    /// Returns `DatagramTooLarge` if a report with this filler would not fit
    /// in one datagram.
    pub fn build(self) -> Result<Transmitter> {
        let sample = TelemetryMessage::new(1, RoutingSummary::unknown(), self.filler_len, self.fill_byte);
        Transmitter::serialize_message(&sample)?;

        Ok(Transmitter {
            sequence: SequenceNumber::new(),
            filler_len: self.filler_len,
            fill_byte: self.fill_byte,
        })
    }
}

impl Default for TransmitterBuilder {
    fn default() -> Self {
        Self::new()
    }
}
