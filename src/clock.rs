//! Clock and delay capabilities
//!
//! Sensor firmware exposes two timers: a high-resolution real-time tick
//! counter and a coarse system clock. Both are modelled by [`Clock`] so the
//! instrumentation can be driven by the host's monotonic clock in
//! production and by a hand-advanced clock in tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// High-resolution tick rate of the host clock (ticks per second)
pub const RTIMER_SECOND: u64 = 32_768;

/// Coarse tick rate of the host clock (ticks per second)
pub const CLOCK_SECOND: u64 = 128;

/// Two free-running tick counters with known rates
pub trait Clock: Send + Sync {
    /// High-resolution tick counter
    fn rtimer_now(&self) -> u64;

    /// Ticks per second of [`Clock::rtimer_now`]
    fn rtimer_second(&self) -> u64;

    /// Coarse system clock
    fn clock_time(&self) -> u64;

    /// Ticks per second of [`Clock::clock_time`]
    fn clock_second(&self) -> u64;
}

/// Shared handle to a clock
pub type SharedClock = Arc<dyn Clock>;

/// Host monotonic clock scaled to sensor-like tick rates
#[derive(Debug, Clone)]
pub struct HostClock {
    origin: Instant,
}

impl HostClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    fn ticks_at(&self, rate: u64) -> u64 {
        let nanos = self.origin.elapsed().as_nanos();
        (nanos * rate as u128 / 1_000_000_000) as u64
    }
}

impl Default for HostClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for HostClock {
    fn rtimer_now(&self) -> u64 {
        self.ticks_at(RTIMER_SECOND)
    }

    fn rtimer_second(&self) -> u64 {
        RTIMER_SECOND
    }

    fn clock_time(&self) -> u64 {
        self.ticks_at(CLOCK_SECOND)
    }

    fn clock_second(&self) -> u64 {
        CLOCK_SECOND
    }
}

/// Clock that only moves when told to
///
/// The coarse counter is derived from the high-resolution one, so both
/// always agree on elapsed wall time.
#[derive(Debug)]
pub struct ManualClock {
    rtimer: AtomicU64,
    rtimer_second: u64,
    clock_second: u64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::with_rates(RTIMER_SECOND, CLOCK_SECOND)
    }

    pub fn with_rates(rtimer_second: u64, clock_second: u64) -> Self {
        Self {
            rtimer: AtomicU64::new(0),
            rtimer_second,
            clock_second,
        }
    }

    /// Move the clock forward by `ticks` high-resolution ticks
    pub fn advance_ticks(&self, ticks: u64) {
        self.rtimer.fetch_add(ticks, Ordering::SeqCst);
    }

    /// Move the clock forward by a wall-clock duration
    pub fn advance(&self, duration: Duration) {
        let ticks = duration.as_nanos() * self.rtimer_second as u128 / 1_000_000_000;
        self.advance_ticks(ticks as u64);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn rtimer_now(&self) -> u64 {
        self.rtimer.load(Ordering::SeqCst)
    }

    fn rtimer_second(&self) -> u64 {
        self.rtimer_second
    }

    fn clock_time(&self) -> u64 {
        let ticks = self.rtimer_now() as u128 * self.clock_second as u128;
        (ticks / self.rtimer_second.max(1) as u128) as u64
    }

    fn clock_second(&self) -> u64 {
        self.clock_second
    }
}

/// Blocking pause used for the post-flight cool-down
pub trait Delay {
    fn delay(&mut self, duration: Duration);
}

/// Spins on a clock until the deadline passes
///
/// Nothing else runs on the node while it waits, matching a busy-wait on a
/// single-threaded sensor. Must be paired with a clock that advances on its
/// own, such as [`HostClock`].
pub struct BusyWait {
    clock: SharedClock,
}

impl BusyWait {
    pub fn new(clock: SharedClock) -> Self {
        Self { clock }
    }
}

impl Delay for BusyWait {
    fn delay(&mut self, duration: Duration) {
        let rate = self.clock.rtimer_second() as u128;
        let ticks = (duration.as_nanos() * rate / 1_000_000_000) as u64;
        let deadline = self.clock.rtimer_now().saturating_add(ticks);

        while self.clock.rtimer_now() < deadline {
            std::hint::spin_loop();
        }
    }
}

/// Returns immediately and remembers every requested pause
#[derive(Debug, Clone, Default)]
pub struct NoDelay {
    requested: Arc<Mutex<Vec<Duration>>>,
}

impl NoDelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pauses requested so far, in order
    pub fn requested(&self) -> Vec<Duration> {
        self.requested
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl Delay for NoDelay {
    fn delay(&mut self, duration: Duration) {
        if let Ok(mut guard) = self.requested.lock() {
            guard.push(duration);
        }
    }
}
