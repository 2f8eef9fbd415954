//! Counter phase-locked loops.
//!
//! Each cog has two counters, and each counter has a PLL which can
//! multiply the system clock to drive a pin (or, for counter A, the
//! video generator).  The model is simple: a PLL is an oscillator
//! running at twice the target frequency whose output bit toggles
//! on every edge.
use super::clock::{ClockSource, DISABLED_INTERVAL};

/// Lowest output frequency the PLL can lock to.
pub const PLL_MINIMUM_FREQUENCY: f64 = 500_000.0;
/// Highest output frequency the PLL can lock to.
pub const PLL_MAXIMUM_FREQUENCY: f64 = 128_000_000.0;

#[derive(Debug, Clone)]
pub struct Pll {
    base_frequency: u32,
    multiplier: f64,
    /// Edge rate (twice the output frequency), zero when disabled.
    frequency: f64,
    period: f64,
    clock_left: f64,
    output: bool,
    pin_a: u64,
    pin_b: u64,
}

impl Default for Pll {
    fn default() -> Pll {
        Pll::new()
    }
}

impl Pll {
    #[must_use]
    pub fn new() -> Pll {
        Pll {
            base_frequency: 0,
            multiplier: 0.0,
            frequency: 0.0,
            period: 0.0,
            clock_left: DISABLED_INTERVAL,
            output: false,
            pin_a: 0,
            pin_b: 0,
        }
    }

    /// Sets the frequency the multiplier applies to (the system
    /// clock) and re-locks at the current multiplier.
    pub fn set_base_frequency(&mut self, frequency: u32) {
        self.base_frequency = frequency;
        self.feed(self.multiplier);
    }

    /// Re-locks the PLL at `multiplier` times the base frequency.
    /// Targets outside the PLL's lock range disable it.
    pub fn feed(&mut self, multiplier: f64) {
        self.multiplier = multiplier;
        let target = f64::from(self.base_frequency) * multiplier;
        if !(PLL_MINIMUM_FREQUENCY..=PLL_MAXIMUM_FREQUENCY).contains(&target) {
            self.disable();
        } else {
            self.set_frequency(target * 2.0);
        }
    }

    /// Selects the pins driven while the output is high (`pin_a`)
    /// and low (`pin_b`).
    pub fn drive_pins(&mut self, pin_a: u64, pin_b: u64) {
        self.pin_a = pin_a;
        self.pin_b = pin_b;
    }

    /// Stops the PLL.  It produces no more edges and drives no pins
    /// until it is fed a frequency in its lock range again.
    pub fn disable(&mut self) {
        self.frequency = 0.0;
        self.period = 0.0;
        self.clock_left = DISABLED_INTERVAL;
    }

    fn set_frequency(&mut self, frequency: f64) {
        self.frequency = frequency;
        self.period = 1.0 / frequency;
        if self.clock_left > self.period {
            self.clock_left = self.period;
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.frequency > 0.0
    }

    /// Edge rate in Hz; zero when disabled.
    #[must_use]
    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    #[must_use]
    pub fn output(&self) -> bool {
        self.output
    }

    /// Pins currently driven high by this PLL.
    #[must_use]
    pub fn pins(&self) -> u64 {
        if !self.is_enabled() {
            0
        } else if self.output {
            self.pin_a
        } else {
            self.pin_b
        }
    }
}

impl ClockSource for Pll {
    /// The new output level, if the output toggled.
    type Edge = Option<bool>;

    fn time_until_clock(&self) -> f64 {
        self.clock_left
    }

    fn advance_clock(&mut self, elapsed: f64) -> Option<bool> {
        if !self.is_enabled() {
            return None;
        }
        self.clock_left -= elapsed;
        if self.clock_left <= 0.0 {
            self.clock_left += self.period;
            self.output = !self.output;
            Some(self.output)
        } else {
            None
        }
    }
}

/// Which of a cog's two PLLs.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PllChannel {
    A,
    B,
}

/// Output levels of the PLLs which toggled during an advance.
///
/// Edges of PLL A clock the video generator's pixel shifter and any
/// aural subcarrier listeners; edges of PLL B supply the composite
/// video carrier.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct PllEdges {
    pub a: Option<bool>,
    pub b: Option<bool>,
}

/// The pair of PLLs belonging to one cog.
#[derive(Debug, Clone, Default)]
pub struct PllGroup {
    a: Pll,
    b: Pll,
}

impl PllGroup {
    #[must_use]
    pub fn new() -> PllGroup {
        PllGroup::default()
    }

    #[must_use]
    pub fn channel(&self, channel: PllChannel) -> &Pll {
        match channel {
            PllChannel::A => &self.a,
            PllChannel::B => &self.b,
        }
    }

    pub fn channel_mut(&mut self, channel: PllChannel) -> &mut Pll {
        match channel {
            PllChannel::A => &mut self.a,
            PllChannel::B => &mut self.b,
        }
    }

    pub fn set_base_frequency(&mut self, frequency: u32) {
        self.a.set_base_frequency(frequency);
        self.b.set_base_frequency(frequency);
    }

    /// Pins driven high by either PLL.
    #[must_use]
    pub fn pins(&self) -> u64 {
        self.a.pins() | self.b.pins()
    }
}

impl ClockSource for PllGroup {
    type Edge = PllEdges;

    fn time_until_clock(&self) -> f64 {
        self.a.time_until_clock().min(self.b.time_until_clock())
    }

    fn advance_clock(&mut self, elapsed: f64) -> PllEdges {
        PllEdges {
            a: self.a.advance_clock(elapsed),
            b: self.b.advance_clock(elapsed),
        }
    }
}
