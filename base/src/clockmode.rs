//! The clock-mode byte (the CLK register).
//!
//! ```text
//! bit 7    RESET   writing 1 resets the chip
//! bit 6    PLLENA  enable the crystal PLL
//! bit 5    OSCENA  enable the crystal oscillator
//! bits 4:3 OSCM    oscillator gain (XINPUT, XTAL1..XTAL3)
//! bits 2:0 CLKSEL  clock source (RCFAST, RCSLOW, XINPUT, PLL1X..PLL16X)
//! ```
use std::fmt::{self, Display, Formatter};

use serde::Serialize;

#[cfg(test)]
use test_strategy::proptest;

/// Frequency of the internal fast RC oscillator.
pub const RCFAST_FREQUENCY: u32 = 12_000_000;
/// Frequency of the internal slow RC oscillator.
pub const RCSLOW_FREQUENCY: u32 = 20_000;

const OSCILLATOR_NAMES: [&str; 4] = ["XINPUT", "XTAL1", "XTAL2", "XTAL3"];
const CLOCK_SELECT_NAMES: [&str; 8] = [
    "RCFAST", "RCSLOW", "XINPUT", "PLL1X", "PLL2X", "PLL4X", "PLL8X", "PLL16X",
];

#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, Hash, Serialize)]
pub struct ClockMode(u8);

impl ClockMode {
    #[must_use]
    pub const fn new(bits: u8) -> ClockMode {
        ClockMode(bits)
    }

    #[must_use]
    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// Writing a clock mode with this bit set resets the chip.
    #[must_use]
    pub const fn reset(&self) -> bool {
        self.0 & 0x80 != 0
    }

    #[must_use]
    pub const fn pll_enabled(&self) -> bool {
        self.0 & 0x40 != 0
    }

    #[must_use]
    pub const fn oscillator_enabled(&self) -> bool {
        self.0 & 0x20 != 0
    }

    #[must_use]
    pub const fn clock_select(&self) -> u8 {
        self.0 & 7
    }

    /// The same mode with the reset bit cleared.
    #[must_use]
    pub const fn without_reset(&self) -> ClockMode {
        ClockMode(self.0 & 0x7F)
    }

    /// For PLL modes, the power of two the crystal frequency is
    /// multiplied by.
    #[must_use]
    pub const fn pll_shift(&self) -> Option<u32> {
        match self.clock_select() {
            sel @ 3..=7 => Some((sel - 3) as u32),
            _ => None,
        }
    }

    /// Works out the system clock frequency this mode produces from
    /// a crystal (or XIN input) of the given frequency.  A PLL mode
    /// with the PLL disabled produces no clock at all.
    #[must_use]
    pub const fn core_frequency(&self, xtal_frequency: u32) -> u32 {
        match self.clock_select() {
            0 => RCFAST_FREQUENCY,
            1 => RCSLOW_FREQUENCY,
            2 => xtal_frequency,
            _ => match self.pll_shift() {
                Some(shift) if self.pll_enabled() => xtal_frequency.wrapping_shl(shift),
                _ => 0,
            },
        }
    }

    /// Works backwards from the clock frequency stored in a program
    /// image to the crystal frequency the image expects.  Returns
    /// `None` when the mode doesn't use a crystal.
    #[must_use]
    pub const fn xtal_frequency(&self, core_frequency: u32) -> Option<u32> {
        if self.0 & 0x18 == 0 {
            return None;
        }
        match self.clock_select() {
            2 => Some(core_frequency),
            sel @ 3..=7 => Some(core_frequency >> (sel - 3)),
            _ => None,
        }
    }
}

impl From<u8> for ClockMode {
    fn from(bits: u8) -> ClockMode {
        ClockMode(bits)
    }
}

impl Display for ClockMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.reset() {
            f.write_str("RESET+")?;
        }
        if self.pll_enabled() {
            f.write_str("PLL+")?;
        }
        if self.oscillator_enabled() {
            f.write_str(OSCILLATOR_NAMES[usize::from((self.0 & 0x18) >> 3)])?;
            f.write_str("+")?;
        }
        f.write_str(CLOCK_SELECT_NAMES[usize::from(self.clock_select())])
    }
}

#[test]
fn test_clock_mode_display() {
    assert_eq!(ClockMode::new(0x00).to_string(), "RCFAST");
    assert_eq!(ClockMode::new(0x01).to_string(), "RCSLOW");
    // The usual 80MHz setting: XTAL1 + PLL16X.
    assert_eq!(ClockMode::new(0x6F).to_string(), "PLL+XTAL1+PLL16X");
    assert_eq!(ClockMode::new(0xE2).to_string(), "RESET+PLL+XINPUT+XINPUT");
}

#[test]
fn test_core_frequency() {
    assert_eq!(ClockMode::new(0x00).core_frequency(5_000_000), 12_000_000);
    assert_eq!(ClockMode::new(0x01).core_frequency(5_000_000), 20_000);
    assert_eq!(ClockMode::new(0x22).core_frequency(5_000_000), 5_000_000);
    assert_eq!(ClockMode::new(0x6F).core_frequency(5_000_000), 80_000_000);
    assert_eq!(ClockMode::new(0x6C).core_frequency(5_000_000), 10_000_000);
    // PLL selected but not enabled.
    assert_eq!(ClockMode::new(0x2F).core_frequency(5_000_000), 0);
}

#[test]
fn test_xtal_frequency() {
    assert_eq!(ClockMode::new(0x6F).xtal_frequency(80_000_000), Some(5_000_000));
    assert_eq!(ClockMode::new(0x6A).xtal_frequency(6_000_000), Some(6_000_000));
    assert_eq!(ClockMode::new(0x00).xtal_frequency(12_000_000), None);
}

#[cfg(test)]
#[proptest]
fn pll_modes_invert(#[strategy(3u8..8)] select: u8, #[strategy(1u32..8_000_000)] xtal: u32) {
    let mode = ClockMode::new(0x68 | select);
    let core = mode.core_frequency(xtal);
    assert_eq!(mode.xtal_frequency(core), Some(xtal));
}
