//! Flight state machine shared by both roles
//!
//! A [`FlightNode`] owns every piece of per-node state: the flight counter,
//! the peer endpoint, the sequence counter inside its transmitter and the
//! instrumentation record. Events are handled one at a time by
//! [`FlightNode::handle`]; each call runs to completion, including the
//! handshake workload and the cool-down pause.
//!
//! Per inbound datagram:
//! 1. advance the flight counter
//! 2. first of flight: start instrumentation, run the handshake workload
//! 3. last of flight: stop instrumentation, then (initiator only) pause
//! 4. always reply with a telemetry report
//!
//! A retransmission request skips steps 1-3. While the node has nothing to
//! do it sits in low-power mode with the radio listening; the driver marks
//! that window with [`FlightNode::begin_wait`] and [`FlightNode::end_wait`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::clock::{BusyWait, Delay, HostClock, SharedClock};
use crate::config::NodeConfig;
use crate::contracts::{Event, Role};
use crate::errors::{FlightError, Result};
use crate::flight::{FlightCounter, FlightPhase};
use crate::instrumentation::{Energest, EnergyDomain, EnergyModel, FlightReport, Instrumentation};
use crate::receiver::Receiver;
use crate::transmitter::{Transmitter, TransmitterBuilder};
use crate::transport::{RoutingView, StaticRouting, Transport};
use crate::workload::{SecurityOps, SimulatedWorkload};

/// Result of dispatching one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightStep {
    /// Datagram counted at `phase`; `sent` is the reply's sequence number
    Exchanged { phase: FlightPhase, sent: Option<u8> },
    /// Retransmission answered without touching the flight
    Resent { sent: Option<u8> },
}

impl FlightStep {
    pub fn sent(&self) -> Option<u8> {
        match self {
            Self::Exchanged { sent, .. } | Self::Resent { sent } => *sent,
        }
    }
}

/// One role's protocol context
pub struct FlightNode<T: Transport> {
    role: Role,
    flight: FlightCounter,
    peer: Option<SocketAddr>,
    transmitter: Transmitter,
    transport: T,
    routing: Box<dyn RoutingView + Send>,
    workload: Box<dyn SecurityOps + Send>,
    delay: Box<dyn Delay + Send>,
    cooldown: Duration,
    energest: Energest,
    instrumentation: Option<Instrumentation>,
    replies_sent: u64,
    handshakes: u64,
}

impl<T: Transport> FlightNode<T> {
    /// Dispatch hook: advance the state machine by one event
    pub fn handle(&mut self, event: Event) -> FlightStep {
        match event {
            Event::DataReceived { sender, payload } => self.on_datagram(sender, &payload),
            Event::RetransmitRequested => {
                debug!(role = %self.role, "retransmission requested");
                self.energest.on(EnergyDomain::Cpu);
                let sent = self.reply();
                self.energest.off(EnergyDomain::Cpu);
                FlightStep::Resent { sent }
            }
        }
    }

    /// Send a report outside the flight accounting
    ///
    /// Used to open the exchange and for periodic reports.
    pub fn send_report(&mut self) -> Option<u8> {
        self.reply()
    }

    fn on_datagram(&mut self, sender: SocketAddr, payload: &[u8]) -> FlightStep {
        self.energest.on(EnergyDomain::Cpu);

        if self.role == Role::Responder {
            // always answer whoever spoke last
            self.peer = Some(sender);
            Receiver::log_inbound(sender, payload);
        }

        let phase = self.flight.advance();
        match phase {
            FlightPhase::First => {
                if let Some(instr) = self.instrumentation.as_mut() {
                    instr.start(&mut self.energest);
                }
                self.handshakes += 1;
                debug!(role = %self.role, "running handshake workload");
                self.workload.perform_handshake(self.role);
            }
            FlightPhase::Last => {
                info!(
                    role = %self.role,
                    flights = self.flight.completed_flights(),
                    "flight complete"
                );
                if let Some(instr) = self.instrumentation.as_mut() {
                    instr.stop(&mut self.energest);
                }
                if self.role == Role::Initiator && !self.cooldown.is_zero() {
                    self.delay.delay(self.cooldown);
                }
            }
            FlightPhase::Mid | FlightPhase::Idle => {}
        }

        let sent = self.reply();
        self.energest.off(EnergyDomain::Cpu);
        FlightStep::Exchanged { phase, sent }
    }

    fn reply(&mut self) -> Option<u8> {
        let peer = self.peer?;

        self.energest.on(EnergyDomain::Transmit);
        let sent = self
            .transmitter
            .send(&mut self.transport, self.routing.as_ref(), peer);
        self.energest.off(EnergyDomain::Transmit);

        if sent.is_some() {
            self.replies_sent += 1;
        }
        sent
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Exchanges counted in the current flight
    pub fn flight_count(&self) -> u32 {
        self.flight.count()
    }

    pub fn flight(&self) -> &FlightCounter {
        &self.flight
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn replies_sent(&self) -> u64 {
        self.replies_sent
    }

    /// Times the handshake workload has run
    pub fn handshakes(&self) -> u64 {
        self.handshakes
    }

    pub fn last_sequence(&self) -> u8 {
        self.transmitter.last_sequence()
    }

    /// Report of the last completed flight (initiator only)
    pub fn last_report(&self) -> Option<&FlightReport> {
        self.instrumentation.as_ref().and_then(|i| i.last_report())
    }

    pub fn is_measuring(&self) -> bool {
        self.instrumentation.as_ref().is_some_and(|i| i.is_running())
    }

    /// Enter the idle window before the next event: CPU asleep, radio listening
    pub fn begin_wait(&mut self) {
        self.energest.on(EnergyDomain::Lpm);
        self.energest.on(EnergyDomain::Listen);
    }

    /// Leave the idle window opened by [`FlightNode::begin_wait`]
    pub fn end_wait(&mut self) {
        self.energest.off(EnergyDomain::Listen);
        self.energest.off(EnergyDomain::Lpm);
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

/// FlightNodeBuilder - Fluent interface for node assembly
///
/// Unset collaborators default to the host implementations: monotonic
/// clock, busy-wait delay, simulated workload and an unknown routing view.
pub struct FlightNodeBuilder {
    role: Role,
    flight_size: u32,
    cooldown: Duration,
    peer: Option<SocketAddr>,
    transmitter: TransmitterBuilder,
    routing: Option<Box<dyn RoutingView + Send>>,
    workload: Option<Box<dyn SecurityOps + Send>>,
    delay: Option<Box<dyn Delay + Send>>,
    clock: Option<SharedClock>,
    energy_model: EnergyModel,
}

impl FlightNodeBuilder {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            flight_size: crate::FLIGHT_SIZE,
            cooldown: Duration::from_secs(crate::COOLDOWN_SECS),
            peer: None,
            transmitter: TransmitterBuilder::new(),
            routing: None,
            workload: None,
            delay: None,
            clock: None,
            energy_model: EnergyModel::default(),
        }
    }

    /// Builder preloaded from a validated configuration
    pub fn from_config(role: Role, config: &NodeConfig) -> Self {
        let mut builder = Self::new(role)
            .with_flight_size(config.flight_size)
            .with_cooldown(config.cooldown())
            .with_filler_len(config.filler_len)
            .with_fill_byte(config.fill_byte)
            .with_energy_model(config.energy)
            .with_workload(SimulatedWorkload::new(
                config.hash_buffer_len,
                config.fill_byte,
                config.keygen_bound,
            ));
        builder.peer = config.initial_peer(role);
        if let Some(summary) = config.routing_summary() {
            builder = builder.with_routing(StaticRouting::fixed(summary));
        }
        builder
    }

    pub fn with_flight_size(mut self, size: u32) -> Self {
        self.flight_size = size;
        self
    }

    /// Initiator pause after the last exchange of a flight
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn with_filler_len(mut self, len: usize) -> Self {
        self.transmitter = self.transmitter.with_filler_len(len);
        self
    }

    pub fn with_fill_byte(mut self, byte: u8) -> Self {
        self.transmitter = self.transmitter.with_fill_byte(byte);
        self
    }

    pub fn with_routing(mut self, routing: impl RoutingView + Send + 'static) -> Self {
        self.routing = Some(Box::new(routing));
        self
    }

    pub fn with_workload(mut self, workload: impl SecurityOps + Send + 'static) -> Self {
        self.workload = Some(Box::new(workload));
        self
    }

    pub fn with_delay(mut self, delay: impl Delay + Send + 'static) -> Self {
        self.delay = Some(Box::new(delay));
        self
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_energy_model(mut self, model: EnergyModel) -> Self {
        self.energy_model = model;
        self
    }

    /// Assemble the node around `transport`
    ///
    /// # Errors
    /// - `InvalidFlightSize` for flights shorter than 2 exchanges
    /// - `MissingPeer` for an initiator without a peer endpoint
    /// - `DatagramTooLarge` if the filler does not fit a datagram
    pub fn build<T: Transport>(self, transport: T) -> Result<FlightNode<T>> {
        let flight = FlightCounter::new(self.flight_size)?;
        if self.role == Role::Initiator && self.peer.is_none() {
            return Err(FlightError::MissingPeer);
        }
        let transmitter = self.transmitter.build()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(HostClock::new()));
        let delay = self
            .delay
            .unwrap_or_else(|| Box::new(BusyWait::new(clock.clone())));
        let instrumentation = match self.role {
            Role::Initiator => Some(Instrumentation::new(clock.clone(), self.energy_model)),
            Role::Responder => None,
        };

        Ok(FlightNode {
            role: self.role,
            flight,
            peer: self.peer,
            transmitter,
            transport,
            routing: self
                .routing
                .unwrap_or_else(|| Box::new(StaticRouting::unknown())),
            workload: self
                .workload
                .unwrap_or_else(|| Box::new(SimulatedWorkload::default())),
            delay,
            cooldown: self.cooldown,
            energest: Energest::new(clock),
            instrumentation,
            replies_sent: 0,
            handshakes: 0,
        })
    }
}
