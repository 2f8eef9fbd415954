//! Cog counters (CTRA and CTRB).
//!
//! A counter has a control register (CTR) selecting one of 32
//! modes, a frequency register (FRQ) and a phase accumulator (PHS).
//! On every system clock, depending on the mode and on two sampled
//! input pins, FRQ is added to PHS.  Some modes drive one or two
//! output pins from the accumulator; the PLL modes instead use FRQ
//! to set the frequency of the counter's PLL.
//!
//! Pin inputs are sampled at the end of each tick and used on the
//! following ticks, so an edge detector sees a pin two clocks late.
use serde::Serialize;

use base::prelude::Condition;

use super::pll::{PllChannel, PllGroup};

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize)]
pub enum CounterMode {
    Disabled,
    PllInternal,
    PllSingleEnded,
    PllDifferential,
    NcoSingleEnded,
    NcoDifferential,
    DutySingleEnded,
    DutyDifferential,
    PosDetector,
    PosDetectorFeedback,
    PosEdgeDetector,
    PosEdgeDetectorFeedback,
    NegDetector,
    NegDetectorFeedback,
    NegEdgeDetector,
    NegEdgeDetectorFeedback,
    /// Accumulate whenever the condition holds for (A, B), with pin
    /// A in the place of the zero flag and pin B in the place of
    /// the carry flag.
    Logic(Condition),
}

impl CounterMode {
    /// Decodes the mode field (bits 30:26) of a CTR value.
    #[must_use]
    pub fn from_ctr(ctr: u32) -> CounterMode {
        match (ctr >> 26) & 0x1F {
            0 => CounterMode::Disabled,
            1 => CounterMode::PllInternal,
            2 => CounterMode::PllSingleEnded,
            3 => CounterMode::PllDifferential,
            4 => CounterMode::NcoSingleEnded,
            5 => CounterMode::NcoDifferential,
            6 => CounterMode::DutySingleEnded,
            7 => CounterMode::DutyDifferential,
            8 => CounterMode::PosDetector,
            9 => CounterMode::PosDetectorFeedback,
            10 => CounterMode::PosEdgeDetector,
            11 => CounterMode::PosEdgeDetectorFeedback,
            12 => CounterMode::NegDetector,
            13 => CounterMode::NegDetectorFeedback,
            14 => CounterMode::NegEdgeDetector,
            15 => CounterMode::NegEdgeDetectorFeedback,
            n => CounterMode::Logic(Condition::from_bits((n - 16) as u8)),
        }
    }

    #[must_use]
    pub fn is_pll(self) -> bool {
        matches!(
            self,
            CounterMode::PllInternal | CounterMode::PllSingleEnded | CounterMode::PllDifferential
        )
    }
}

#[derive(Debug, Clone)]
pub struct FreqGenerator {
    channel: PllChannel,
    control: u32,
    frequency: u32,
    phase: u32,
    mode: CounterMode,
    divider: u32,
    pin_a_mask: u64,
    pin_b_mask: u64,
    pin_a: bool,
    pin_a_previous: bool,
    pin_b: bool,
    out_a: bool,
    out_b: bool,
}

impl FreqGenerator {
    /// Creates a counter which owns PLL `channel` of its cog's
    /// [`PllGroup`].
    #[must_use]
    pub fn new(channel: PllChannel) -> FreqGenerator {
        FreqGenerator {
            channel,
            control: 0,
            frequency: 0,
            phase: 0,
            mode: CounterMode::Disabled,
            divider: 128,
            pin_a_mask: 1,
            pin_b_mask: 1,
            pin_a: false,
            pin_a_previous: false,
            pin_b: false,
            out_a: false,
            out_b: false,
        }
    }

    #[must_use]
    pub fn ctr(&self) -> u32 {
        self.control
    }

    #[must_use]
    pub fn frq(&self) -> u32 {
        self.frequency
    }

    #[must_use]
    pub fn phs(&self) -> u32 {
        self.phase
    }

    #[must_use]
    pub fn mode(&self) -> CounterMode {
        self.mode
    }

    /// The PLL multiplier implied by FRQ and the CTR divider.
    fn pll_multiplier(&self) -> f64 {
        f64::from(self.frequency) / 4_294_967_296.0 * 16.0 / f64::from(self.divider)
    }

    pub fn set_ctr(&mut self, value: u32, pll: &mut PllGroup) {
        self.control = value;
        self.divider = 128 >> ((value >> 23) & 7);
        self.out_a = false;
        self.out_b = false;
        self.pin_a_mask = 1 << (value & 0x3F);
        self.pin_b_mask = 1 << ((value >> 9) & 0x3F);
        self.mode = CounterMode::from_ctr(value);

        let multiplier = self.pll_multiplier();
        let pll = pll.channel_mut(self.channel);
        match self.mode {
            CounterMode::PllInternal => pll.drive_pins(0, 0),
            CounterMode::PllSingleEnded => pll.drive_pins(self.pin_a_mask, 0),
            CounterMode::PllDifferential => pll.drive_pins(self.pin_a_mask, self.pin_b_mask),
            _ => {
                pll.disable();
                return;
            }
        }
        pll.feed(multiplier);
    }

    pub fn set_frq(&mut self, value: u32, pll: &mut PllGroup) {
        self.frequency = value;
        let multiplier = self.pll_multiplier();
        let pll = pll.channel_mut(self.channel);
        if self.mode.is_pll() {
            pll.feed(multiplier);
        } else {
            pll.disable();
        }
    }

    pub fn set_phs(&mut self, value: u32) {
        self.phase = value;
    }

    /// Pins this counter drives high.
    #[must_use]
    pub fn output(&self, pll: &PllGroup) -> u64 {
        let mut pins = pll.channel(self.channel).pins();
        if self.out_a {
            pins |= self.pin_a_mask;
        }
        if self.out_b {
            pins |= self.pin_b_mask;
        }
        pins
    }

    fn accumulate(&mut self) {
        self.phase = self.phase.wrapping_add(self.frequency);
    }

    /// Advances the counter by one system clock.  `pins` is the
    /// chip's current input state, sampled for later ticks.
    pub fn tick(&mut self, pins: u64) {
        match self.mode {
            CounterMode::Disabled
            | CounterMode::PllInternal
            | CounterMode::PllSingleEnded
            | CounterMode::PllDifferential => (),
            CounterMode::NcoSingleEnded | CounterMode::NcoDifferential => {
                self.accumulate();
                self.out_a = self.phase & 0x8000_0000 != 0;
                if self.mode == CounterMode::NcoDifferential {
                    self.out_b = !self.out_a;
                }
            }
            CounterMode::DutySingleEnded | CounterMode::DutyDifferential => {
                let (sum, carry) = self.phase.overflowing_add(self.frequency);
                self.phase = sum;
                self.out_a = carry;
                if self.mode == CounterMode::DutyDifferential {
                    self.out_b = !self.out_a;
                }
            }
            CounterMode::PosDetector | CounterMode::PosDetectorFeedback => {
                if self.pin_a {
                    self.accumulate();
                }
            }
            CounterMode::PosEdgeDetector | CounterMode::PosEdgeDetectorFeedback => {
                if self.pin_a && !self.pin_a_previous {
                    self.accumulate();
                }
            }
            CounterMode::NegDetector | CounterMode::NegDetectorFeedback => {
                if !self.pin_a {
                    self.accumulate();
                }
            }
            CounterMode::NegEdgeDetector | CounterMode::NegEdgeDetectorFeedback => {
                if !self.pin_a && self.pin_a_previous {
                    self.accumulate();
                }
            }
            CounterMode::Logic(condition) => {
                if condition.holds(self.pin_a, self.pin_b) {
                    self.accumulate();
                }
            }
        }
        if matches!(
            self.mode,
            CounterMode::PosDetectorFeedback
                | CounterMode::PosEdgeDetectorFeedback
                | CounterMode::NegDetectorFeedback
                | CounterMode::NegEdgeDetectorFeedback
        ) {
            self.out_b = !self.pin_a;
        }

        self.pin_a_previous = self.pin_a;
        self.pin_a = pins & self.pin_a_mask != 0;
        self.pin_b = pins & self.pin_b_mask != 0;
    }
}
