//! Clock sources: the things which decide *when* something happens.
//!
//! The chip is driven by several independent clocks: the system
//! clock (the crystal, possibly multiplied by the clock PLL) and a
//! pair of counter PLLs in each running cog.  Each source reports
//! how long it is until its next edge; the hub repeatedly advances
//! every source by the smallest such interval.
//!
//! Times are in seconds.

/// Time until the next edge reported by a source which is not
/// running.  It is longer than any real clock period, so a disabled
/// source never wins the race for the next edge.
pub const DISABLED_INTERVAL: f64 = 1.0;

pub trait ClockSource {
    /// What the source reports when advanced.
    type Edge;

    /// Seconds until the next edge; never negative.
    fn time_until_clock(&self) -> f64;

    /// Advances the source by `elapsed` seconds.  Callers must not
    /// advance a source by more than [`ClockSource::time_until_clock`].
    fn advance_clock(&mut self, elapsed: f64) -> Self::Edge;
}

/// The system clock oscillator.  Each of its edges is one system
/// clock cycle: one hub ring step and one cog step.
#[derive(Debug, Clone)]
pub struct SystemXtal {
    frequency: u32,
    period: f64,
    clock_left: f64,
}

impl Default for SystemXtal {
    fn default() -> SystemXtal {
        SystemXtal::new()
    }
}

impl SystemXtal {
    #[must_use]
    pub fn new() -> SystemXtal {
        SystemXtal {
            frequency: 0,
            period: 0.0,
            clock_left: DISABLED_INTERVAL,
        }
    }

    #[must_use]
    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    /// Changes the oscillator frequency.  A frequency of zero stops
    /// the clock.  A pending edge is brought forward if the new
    /// period is shorter than the time left.
    pub fn set_frequency(&mut self, frequency: u32) {
        self.frequency = frequency;
        if frequency > 0 {
            self.period = 1.0 / f64::from(frequency);
            if self.clock_left > self.period {
                self.clock_left = self.period;
            }
        } else {
            self.period = 0.0;
            self.clock_left = DISABLED_INTERVAL;
        }
    }
}

impl ClockSource for SystemXtal {
    /// True when the oscillator produced an edge.
    type Edge = bool;

    fn time_until_clock(&self) -> f64 {
        self.clock_left
    }

    fn advance_clock(&mut self, elapsed: f64) -> bool {
        if self.frequency == 0 {
            return false;
        }
        self.clock_left -= elapsed;
        if self.clock_left <= 0.0 {
            self.clock_left += self.period;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ClockSource, SystemXtal, DISABLED_INTERVAL};

    #[test]
    fn test_stopped_xtal_never_ticks() {
        let mut xtal = SystemXtal::new();
        assert_eq!(xtal.time_until_clock(), DISABLED_INTERVAL);
        assert!(!xtal.advance_clock(DISABLED_INTERVAL));
        assert_eq!(xtal.time_until_clock(), DISABLED_INTERVAL);
    }

    #[test]
    fn test_xtal_ticks_once_per_period() {
        let mut xtal = SystemXtal::new();
        xtal.set_frequency(1000);
        let period = xtal.time_until_clock();
        assert!((period - 0.001).abs() < 1e-12);
        let mut edges = 0;
        for _ in 0..10 {
            let dt = xtal.time_until_clock();
            if xtal.advance_clock(dt) {
                edges += 1;
            }
        }
        assert_eq!(edges, 10);
        // Half a period is not enough for an edge.
        let half = xtal.time_until_clock() / 2.0;
        assert!(!xtal.advance_clock(half));
    }

    #[test]
    fn test_xtal_speedup_brings_edge_forward() {
        let mut xtal = SystemXtal::new();
        xtal.set_frequency(10);
        xtal.set_frequency(1_000_000);
        assert!(xtal.time_until_clock() <= 1e-6);
    }
}
