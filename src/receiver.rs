//! Receiver module - inbound report inspection
//!
//! The responder logs each datagram it answers. Bytes are validated as an
//! archived [`TelemetryMessage`] before any field is read; an unreadable
//! datagram is logged and still counts as an exchange.

use std::net::SocketAddr;

use rkyv::{check_archived_root, AlignedVec, Deserialize, Infallible};
use tracing::{info, warn};

use crate::contracts::{RoutingSummary, TelemetryMessage};
use crate::errors::{FlightError, Result};

/// What a node learned from one inbound report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedReport {
    pub sender: SocketAddr,
    pub sequence: u8,
    pub routing: RoutingSummary,
    pub payload_len: usize,
}

impl ReceivedReport {
    /// The sender's counter is at the reserved restart value
    pub fn is_restart(&self) -> bool {
        self.sequence == crate::contracts::SEQUENCE_RESTART
    }
}

pub struct Receiver;

impl Receiver {
    /// Validate `bytes` as an archived telemetry message
    pub fn decode(sender: SocketAddr, bytes: &[u8]) -> Result<ReceivedReport> {
        // archived roots must be read from an aligned buffer
        let mut aligned = AlignedVec::with_capacity(bytes.len());
        aligned.extend_from_slice(bytes);

        let archived = check_archived_root::<TelemetryMessage>(&aligned)
            .map_err(|_| FlightError::Deserialization(
                "Failed to validate archived telemetry message".to_string()
            ))?;

        let routing: RoutingSummary = match archived.routing.deserialize(&mut Infallible) {
            Ok(routing) => routing,
            Err(never) => match never {},
        };

        Ok(ReceivedReport {
            sender,
            sequence: archived.sequence,
            routing,
            payload_len: archived.payload.len(),
        })
    }

    /// Decode and log an inbound report
    ///
    /// Undecodable datagrams are logged and reported as `None`; they still
    /// count as exchanges for the caller.
    pub fn log_inbound(sender: SocketAddr, bytes: &[u8]) -> Option<ReceivedReport> {
        match Self::decode(sender, bytes) {
            Ok(report) => {
                info!(
                    %sender,
                    seqno = report.sequence,
                    parent = ?report.routing.parent_address,
                    parent_etx = report.routing.parent_link_cost,
                    rank = report.routing.rank_metric,
                    neighbors = report.routing.neighbor_count,
                    beacon_interval = report.routing.beacon_interval,
                    restart = report.is_restart(),
                    "report received"
                );
                Some(report)
            }
            Err(e) => {
                warn!(%sender, len = bytes.len(), error = %e, "unreadable datagram");
                None
            }
        }
    }
}
