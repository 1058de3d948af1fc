//! Error types for certflight operations
//!
//! Errors only surface at the edges of the system: loading configuration,
//! building a node, encoding or decoding a datagram and binding sockets.
//! Dispatching an event to a running node never fails.
use std::io;

use thiserror::Error;

/// Result type alias for certflight operations
pub type Result<T> = std::result::Result<T, FlightError>;

/// Failure modes outside the per-event dispatch path
#[derive(Debug, Error)]
pub enum FlightError {
    /// Socket bind or local I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Message could not be archived
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Inbound datagram is not a valid telemetry message
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Encoded datagram exceeds the link budget
    #[error("Datagram too large: {size} bytes, limit {limit}")]
    DatagramTooLarge { size: usize, limit: usize },

    /// A flight needs a distinct first and last exchange
    #[error("Invalid flight size {0}: must be at least 2")]
    InvalidFlightSize(u32),

    /// Configuration value out of range or unparsable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Initiator built without a peer endpoint
    #[error("Initiator requires a peer endpoint")]
    MissingPeer,
}
