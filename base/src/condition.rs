//! Conditional execution codes.
//!
//! Each native instruction carries a four-bit condition which is
//! evaluated against the cog's zero and carry flags before the
//! instruction takes effect.  The same evaluator is used by the
//! counters' LOGIC modes, with the two sampled input pins standing
//! in for the flags.
use std::fmt::{self, Display, Formatter};

use serde::Serialize;

#[cfg(test)]
use test_strategy::{proptest, Arbitrary};

#[repr(u8)]
#[cfg_attr(test, derive(Arbitrary))]
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize)]
pub enum Condition {
    Never = 0x0,
    NcAndNz = 0x1,
    NcAndZ = 0x2,
    Nc = 0x3,
    CAndNz = 0x4,
    Nz = 0x5,
    CNeZ = 0x6,
    NcOrNz = 0x7,
    CAndZ = 0x8,
    CEqZ = 0x9,
    Z = 0xA,
    NcOrZ = 0xB,
    C = 0xC,
    COrNz = 0xD,
    COrZ = 0xE,
    Always = 0xF,
}

const CONDITIONS: [Condition; 16] = [
    Condition::Never,
    Condition::NcAndNz,
    Condition::NcAndZ,
    Condition::Nc,
    Condition::CAndNz,
    Condition::Nz,
    Condition::CNeZ,
    Condition::NcOrNz,
    Condition::CAndZ,
    Condition::CEqZ,
    Condition::Z,
    Condition::NcOrZ,
    Condition::C,
    Condition::COrNz,
    Condition::COrZ,
    Condition::Always,
];

impl Condition {
    /// Decodes the low four bits of `bits`.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Condition {
        CONDITIONS[(bits & 0xF) as usize]
    }

    #[must_use]
    pub const fn bits(self) -> u8 {
        self as u8
    }

    /// Returns true when an instruction with this condition should
    /// execute, given the current flag values.
    #[must_use]
    pub const fn holds(self, zero: bool, carry: bool) -> bool {
        match self {
            Condition::Never => false,
            Condition::NcAndNz => !carry && !zero,
            Condition::NcAndZ => !carry && zero,
            Condition::Nc => !carry,
            Condition::CAndNz => carry && !zero,
            Condition::Nz => !zero,
            Condition::CNeZ => carry != zero,
            Condition::NcOrNz => !carry || !zero,
            Condition::CAndZ => carry && zero,
            Condition::CEqZ => carry == zero,
            Condition::Z => zero,
            Condition::NcOrZ => !carry || zero,
            Condition::C => carry,
            Condition::COrNz => carry || !zero,
            Condition::COrZ => carry || zero,
            Condition::Always => true,
        }
    }

    /// The assembler spelling of the condition prefix.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Condition::Never => "IF_NEVER",
            Condition::NcAndNz => "IF_NC_AND_NZ",
            Condition::NcAndZ => "IF_NC_AND_Z",
            Condition::Nc => "IF_NC",
            Condition::CAndNz => "IF_C_AND_NZ",
            Condition::Nz => "IF_NZ",
            Condition::CNeZ => "IF_C_NE_Z",
            Condition::NcOrNz => "IF_NC_OR_NZ",
            Condition::CAndZ => "IF_C_AND_Z",
            Condition::CEqZ => "IF_C_EQ_Z",
            Condition::Z => "IF_Z",
            Condition::NcOrZ => "IF_NC_OR_Z",
            Condition::C => "IF_C",
            Condition::COrNz => "IF_C_OR_NZ",
            Condition::COrZ => "IF_C_OR_Z",
            Condition::Always => "IF_ALWAYS",
        }
    }
}

impl Display for Condition {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[test]
fn test_never_and_always() {
    for zero in [false, true] {
        for carry in [false, true] {
            assert!(!Condition::Never.holds(zero, carry));
            assert!(Condition::Always.holds(zero, carry));
        }
    }
}

#[test]
fn test_condition_names_are_distinct() {
    let mut names: Vec<&str> = CONDITIONS.iter().map(|c| c.name()).collect();
    names.sort_unstable();
    names.dedup();
    assert_eq!(names.len(), 16);
}

// The condition field is a truth table indexed by the flags: bit 0
// selects !C&!Z, bit 1 !C&Z, bit 2 C&!Z and bit 3 C&Z.
#[cfg(test)]
#[proptest]
fn condition_is_a_truth_table(bits: u32, zero: bool, carry: bool) {
    let cond = Condition::from_bits((bits & 0xF) as u8);
    let index = (u32::from(carry) << 1) | u32::from(zero);
    let expected = (bits >> index) & 1 != 0;
    assert_eq!(cond.holds(zero, carry), expected);
    // Evaluation has no side effects.
    assert_eq!(cond.holds(zero, carry), cond.holds(zero, carry));
}

#[cfg(test)]
#[proptest]
fn condition_bits_round_trip(cond: Condition) {
    assert_eq!(Condition::from_bits(cond.bits()), cond);
}
