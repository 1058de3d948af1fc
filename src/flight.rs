//! Flight counter
//!
//! Counts request/response exchanges since the last security handshake.
//! The count stays in `0..limit` between calls; the increment that reaches
//! `limit` resets it to 0 in the same step.

use crate::errors::{FlightError, Result};

/// Position of an exchange inside its flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightPhase {
    /// No exchange seen since the last reset
    Idle,
    /// Post-increment count is 1: run the handshake workload
    First,
    /// Anything between first and last: reply only
    Mid,
    /// Post-increment count reached the limit: report and reset
    Last,
}

/// Exchange counter bounded by the flight size
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlightCounter {
    count: u32,
    limit: u32,
    completed: u64,
}

impl FlightCounter {
    /// Create a counter for flights of `limit` exchanges
    ///
    /// # Errors
    /// Returns `FlightError::InvalidFlightSize` when `limit < 2`, since the
    /// first and last exchange of a flight must be distinct events.
    pub fn new(limit: u32) -> Result<Self> {
        if limit < 2 {
            return Err(FlightError::InvalidFlightSize(limit));
        }

        Ok(Self {
            count: 0,
            limit,
            completed: 0,
        })
    }

    /// Count one accepted inbound datagram
    pub fn advance(&mut self) -> FlightPhase {
        self.count += 1;

        if self.count == self.limit {
            self.count = 0;
            self.completed += 1;
            FlightPhase::Last
        } else if self.count == 1 {
            FlightPhase::First
        } else {
            FlightPhase::Mid
        }
    }

    /// Phase the counter is in right now, without advancing it
    pub fn phase(&self) -> FlightPhase {
        match self.count {
            0 => FlightPhase::Idle,
            1 => FlightPhase::First,
            _ => FlightPhase::Mid,
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Number of flights that reached their last exchange
    pub fn completed_flights(&self) -> u64 {
        self.completed
    }
}
