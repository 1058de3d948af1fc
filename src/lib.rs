//! certflight core - flight-windowed telemetry exchange
//!
//! Models a sensor node (initiator) and a sink (responder) trading
//! telemetry reports over a lossy low-power mesh. Every `FLIGHT_SIZE`
//! exchanges the nodes run a simulated certificate handshake, and the
//! initiator measures how long the flight took and how much energy it
//! cost.
//!
//! # Layout
//! - [`flight`]: the bounded exchange counter
//! - [`node`]: the per-role state machine and its builder
//! - [`workload`]: CPU-bound stand-ins for hashing, signatures and key
//!   generation
//! - [`instrumentation`]: per-flight timing and energy estimates
//! - [`transmitter`] / [`receiver`]: report assembly and inspection
//! - [`transport`], [`clock`]: the collaborators a node depends on
//! - [`driver`]: runs a node on a UDP socket

pub mod errors;
pub mod config;
pub mod contracts;
pub mod clock;
pub mod flight;
pub mod workload;
pub mod instrumentation;
pub mod transport;
pub mod transmitter;
pub mod receiver;
pub mod node;
pub mod driver;

pub use config::NodeConfig;
pub use contracts::{Event, Role, RoutingSummary, SequenceNumber, TelemetryMessage};
pub use errors::{FlightError, Result};
pub use flight::{FlightCounter, FlightPhase};
pub use node::{FlightNode, FlightNodeBuilder, FlightStep};

/// Exchanges per flight
pub const FLIGHT_SIZE: u32 = 18;

/// Port the initiator binds to
pub const UDP_CLIENT_PORT: u16 = 8775;

/// Port the responder binds to
pub const UDP_SERVER_PORT: u16 = 5688;

/// Filler payload length of each report (certificate stand-in)
pub const FILLER_LEN: usize = 128;

/// Byte the filler payload is made of
pub const FILL_BYTE: u8 = b'A';

/// Buffer size touched by one simulated hash pass
pub const HASH_BUFFER_LEN: usize = 1024;

/// Loop bound of the simulated key generation (bound x bound iterations)
pub const KEYGEN_BOUND: u64 = 65_300;

/// Initiator cool-down after the last exchange of a flight, in seconds
pub const COOLDOWN_SECS: u64 = 120;

/// Largest encoded report accepted for transmission
pub const MAX_DATAGRAM_SIZE: usize = 1024;
