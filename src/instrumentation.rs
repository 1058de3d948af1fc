//! Per-flight timing and energy instrumentation
//!
//! Both trackers work in start/stop pairs that bracket exactly one flight.
//! There is a single record per node: a second `start` overwrites the first.
//! Results are reported through `tracing`; the last report is also kept
//! for inspection.
//!
//! Energy is an approximation: each domain's active time is weighted by a
//! configured current draw, summed, multiplied by the supply voltage and
//! converted from high-resolution ticks to seconds.

use serde::Deserialize;
use tracing::{debug, info};

use crate::clock::SharedClock;

/// Energy accounting domains, in reporting order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnergyDomain {
    Cpu,
    Lpm,
    Transmit,
    Listen,
}

impl EnergyDomain {
    pub const ALL: [EnergyDomain; 4] = [
        EnergyDomain::Cpu,
        EnergyDomain::Lpm,
        EnergyDomain::Transmit,
        EnergyDomain::Listen,
    ];

    fn index(self) -> usize {
        match self {
            Self::Cpu => 0,
            Self::Lpm => 1,
            Self::Transmit => 2,
            Self::Listen => 3,
        }
    }
}

/// Tracks how long each energy domain has been active, in rtimer ticks
///
/// Running intervals are only folded into the totals on `off` or `flush`,
/// so readers must flush before sampling.
pub struct Energest {
    clock: SharedClock,
    totals: [u64; 4],
    since: [Option<u64>; 4],
}

impl Energest {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            totals: [0; 4],
            since: [None; 4],
        }
    }

    /// Mark a domain active; no-op if it already is
    pub fn on(&mut self, domain: EnergyDomain) {
        let slot = &mut self.since[domain.index()];
        if slot.is_none() {
            *slot = Some(self.clock.rtimer_now());
        }
    }

    /// Mark a domain inactive and account its running interval
    pub fn off(&mut self, domain: EnergyDomain) {
        let i = domain.index();
        if let Some(started) = self.since[i].take() {
            let now = self.clock.rtimer_now();
            self.totals[i] = self.totals[i].saturating_add(now.saturating_sub(started));
        }
    }

    pub fn is_on(&self, domain: EnergyDomain) -> bool {
        self.since[domain.index()].is_some()
    }

    /// Fold every running interval into the totals
    pub fn flush(&mut self) {
        let now = self.clock.rtimer_now();
        for i in 0..self.totals.len() {
            if let Some(started) = self.since[i] {
                self.totals[i] = self.totals[i].saturating_add(now.saturating_sub(started));
                self.since[i] = Some(now);
            }
        }
    }

    /// Accumulated active ticks for `domain` as of the last flush
    pub fn domain_ticks(&self, domain: EnergyDomain) -> u64 {
        self.totals[domain.index()]
    }

    fn snapshot(&self) -> [u64; 4] {
        self.totals
    }
}

/// Current-draw weights and supply voltage of the energy estimate
///
/// Currents share one unit (mA in the default model) and the result is in
/// millijoules when the voltage is in volts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnergyModel {
    pub cpu_current: u64,
    pub lpm_current: u64,
    pub transmit_current: u64,
    pub listen_current: u64,
    pub supply_volts: u64,
}

impl Default for EnergyModel {
    fn default() -> Self {
        Self {
            cpu_current: 2,
            lpm_current: 1,
            transmit_current: 23,
            listen_current: 21,
            supply_volts: 4,
        }
    }
}

impl EnergyModel {
    fn current(&self, domain: EnergyDomain) -> u64 {
        match domain {
            EnergyDomain::Cpu => self.cpu_current,
            EnergyDomain::Lpm => self.lpm_current,
            EnergyDomain::Transmit => self.transmit_current,
            EnergyDomain::Listen => self.listen_current,
        }
    }
}

/// Millijoule estimate for per-domain tick deltas
///
/// `deltas` is indexed like [`EnergyDomain::ALL`]. Computed in 128-bit
/// arithmetic and saturated to `u64`; a zero tick rate yields 0.
pub fn estimate_millijoules(deltas: [u64; 4], model: &EnergyModel, rtimer_second: u64) -> u64 {
    if rtimer_second == 0 {
        return 0;
    }

    let weighted: u128 = EnergyDomain::ALL
        .iter()
        .map(|d| model.current(*d) as u128 * deltas[d.index()] as u128)
        .sum();
    let energy = weighted * model.supply_volts as u128 / rtimer_second as u128;

    u64::try_from(energy).unwrap_or(u64::MAX)
}

/// Outcome of one start/stop pair
#[derive(Debug, Clone, PartialEq)]
pub struct FlightReport {
    pub rtimer_ticks: u64,
    pub rtimer_secs: f64,
    pub clock_ticks: u64,
    pub clock_secs: f64,
    /// Active ticks per domain, indexed like [`EnergyDomain::ALL`]
    pub domain_ticks: [u64; 4],
    pub millijoules: u64,
}

#[derive(Debug, Clone, Copy)]
struct FlightStart {
    rtimer: u64,
    clock: u64,
    energy: [u64; 4],
}

/// Wall-clock and energy bracketing of a flight
pub struct Instrumentation {
    clock: SharedClock,
    model: EnergyModel,
    started: Option<FlightStart>,
    last_report: Option<FlightReport>,
}

impl Instrumentation {
    pub fn new(clock: SharedClock, model: EnergyModel) -> Self {
        Self {
            clock,
            model,
            started: None,
            last_report: None,
        }
    }

    /// Sample both clocks and snapshot the energy counters
    pub fn start(&mut self, energest: &mut Energest) {
        let rtimer = self.clock.rtimer_now();
        let clock = self.clock.clock_time();
        info!(rtime = rtimer, ctime = clock, "first packet of flight");

        energest.flush();
        self.started = Some(FlightStart {
            rtimer,
            clock,
            energy: energest.snapshot(),
        });
    }

    /// Close the flight opened by the last `start` and log the results
    pub fn stop(&mut self, energest: &mut Energest) {
        let Some(start) = self.started.take() else {
            debug!("instrumentation stop without a matching start");
            return;
        };

        let rtimer_ticks = self.clock.rtimer_now().saturating_sub(start.rtimer);
        let clock_ticks = self.clock.clock_time().saturating_sub(start.clock);
        let rtimer_secs = rtimer_ticks as f64 / self.clock.rtimer_second().max(1) as f64;
        let clock_secs = clock_ticks as f64 / self.clock.clock_second().max(1) as f64;
        info!(ticks = rtimer_ticks, secs = rtimer_secs, "rtimer elapsed");
        info!(ticks = clock_ticks, secs = clock_secs, "clock elapsed");

        energest.flush();
        let now = energest.snapshot();
        let mut domain_ticks = [0u64; 4];
        for (i, ticks) in domain_ticks.iter_mut().enumerate() {
            *ticks = now[i].saturating_sub(start.energy[i]);
        }
        let millijoules =
            estimate_millijoules(domain_ticks, &self.model, self.clock.rtimer_second());
        info!(
            cpu = domain_ticks[0],
            lpm = domain_ticks[1],
            transmit = domain_ticks[2],
            listen = domain_ticks[3],
            millijoules,
            "energy consumption"
        );

        self.last_report = Some(FlightReport {
            rtimer_ticks,
            rtimer_secs,
            clock_ticks,
            clock_secs,
            domain_ticks,
            millijoules,
        });
    }

    pub fn is_running(&self) -> bool {
        self.started.is_some()
    }

    pub fn last_report(&self) -> Option<&FlightReport> {
        self.last_report.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::clock::{Clock, ManualClock, RTIMER_SECOND};

    #[test]
    fn test_zero_ticks_zero_energy() {
        let model = EnergyModel::default();
        assert_eq!(estimate_millijoules([0; 4], &model, RTIMER_SECOND), 0);
    }

    #[test]
    fn test_energy_formula() {
        let model = EnergyModel::default();
        let one_sec = RTIMER_SECOND;

        // one second of each domain: (2 + 1 + 23 + 21) * 4
        let mj = estimate_millijoules([one_sec; 4], &model, RTIMER_SECOND);
        assert_eq!(mj, 188);

        let cpu_only = estimate_millijoules([one_sec, 0, 0, 0], &model, RTIMER_SECOND);
        assert_eq!(cpu_only, 8);
    }

    #[test]
    fn test_energy_monotonic() {
        let model = EnergyModel::default();
        let mut last = 0;
        for ticks in (0..10 * RTIMER_SECOND).step_by(4096) {
            let mj = estimate_millijoules([ticks, ticks / 2, ticks / 3, ticks], &model, RTIMER_SECOND);
            assert!(mj >= last);
            last = mj;
        }
        assert_eq!(estimate_millijoules([u64::MAX; 4], &model, 1), u64::MAX);
        assert_eq!(estimate_millijoules([RTIMER_SECOND; 4], &model, 0), 0);
    }

    #[test]
    fn test_energest_accumulates_active_time() {
        let clock = Arc::new(ManualClock::new());
        let mut energest = Energest::new(clock.clone());

        energest.on(EnergyDomain::Listen);
        clock.advance_ticks(100);
        energest.on(EnergyDomain::Listen);
        clock.advance_ticks(50);
        energest.off(EnergyDomain::Listen);
        clock.advance_ticks(1000);

        assert_eq!(energest.domain_ticks(EnergyDomain::Listen), 150);
        assert!(!energest.is_on(EnergyDomain::Listen));

        energest.on(EnergyDomain::Cpu);
        clock.advance_ticks(10);
        assert_eq!(energest.domain_ticks(EnergyDomain::Cpu), 0);
        energest.flush();
        assert_eq!(energest.domain_ticks(EnergyDomain::Cpu), 10);
        assert!(energest.is_on(EnergyDomain::Cpu));
    }

    #[test]
    fn test_flight_report_spans_start_to_stop() {
        let clock = Arc::new(ManualClock::new());
        let mut energest = Energest::new(clock.clone());
        let mut instr = Instrumentation::new(clock.clone(), EnergyModel::default());

        instr.start(&mut energest);
        assert!(instr.is_running());

        energest.on(EnergyDomain::Transmit);
        clock.advance(Duration::from_secs(2));
        energest.off(EnergyDomain::Transmit);
        energest.on(EnergyDomain::Listen);
        clock.advance(Duration::from_secs(1));
        instr.stop(&mut energest);

        let report = instr.last_report().unwrap();
        assert_eq!(report.rtimer_ticks, 3 * RTIMER_SECOND);
        assert_eq!(report.clock_ticks, 3 * clock.clock_second());
        assert!((report.rtimer_secs - 3.0).abs() < f64::EPSILON);
        assert_eq!(report.domain_ticks, [0, 0, 2 * RTIMER_SECOND, RTIMER_SECOND]);
        assert_eq!(report.millijoules, (23 * 2 + 21) * 4);
        assert!(!instr.is_running());
    }

    #[test]
    fn test_listen_delta_uses_its_own_baseline() {
        let clock = Arc::new(ManualClock::new());
        let mut energest = Energest::new(clock.clone());
        let mut instr = Instrumentation::new(clock.clone(), EnergyModel::default());

        energest.on(EnergyDomain::Listen);
        clock.advance(Duration::from_secs(5));
        energest.off(EnergyDomain::Listen);

        instr.start(&mut energest);
        clock.advance(Duration::from_secs(1));
        instr.stop(&mut energest);

        assert_eq!(instr.last_report().unwrap().domain_ticks[3], 0);
    }

    #[test]
    fn test_stop_without_start_is_noop() {
        let clock = Arc::new(ManualClock::new());
        let mut energest = Energest::new(clock.clone());
        let mut instr = Instrumentation::new(clock, EnergyModel::default());

        instr.stop(&mut energest);
        assert!(instr.last_report().is_none());
    }

    #[tracing_test::traced_test]
    #[test]
    fn test_start_stop_log_lines() {
        let clock = Arc::new(ManualClock::new());
        let mut energest = Energest::new(clock.clone());
        let mut instr = Instrumentation::new(clock.clone(), EnergyModel::default());

        instr.start(&mut energest);
        clock.advance(Duration::from_millis(500));
        instr.stop(&mut energest);

        assert!(logs_contain("first packet of flight"));
        assert!(logs_contain("rtimer elapsed"));
        assert!(logs_contain("clock elapsed"));
        assert!(logs_contain("energy consumption"));
    }
}
