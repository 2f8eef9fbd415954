//! Hub operations: the chip-wide services a cog asks the hub for
//! (clock control, cog start/stop and locks).
use std::fmt::{self, Display, Formatter};

use serde::Serialize;

#[cfg(test)]
use test_strategy::{proptest, Arbitrary};

/// The hub's re-entry address for the bytecode interpreter.  A
/// COGINIT whose program address is this value starts an
/// interpreted cog rather than a native one.
pub const INTERPRETER_ENTRY: u32 = 0xF004;

#[repr(u8)]
#[cfg_attr(test, derive(Arbitrary))]
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize)]
pub enum HubOperation {
    ClkSet = 0,
    CogId = 1,
    CogInit = 2,
    CogStop = 3,
    LockNew = 4,
    LockReturn = 5,
    LockSet = 6,
    LockClear = 7,
}

impl HubOperation {
    /// Decodes the low three bits of `bits`; every value is valid.
    #[must_use]
    pub const fn from_bits(bits: u32) -> HubOperation {
        match bits & 7 {
            0 => HubOperation::ClkSet,
            1 => HubOperation::CogId,
            2 => HubOperation::CogInit,
            3 => HubOperation::CogStop,
            4 => HubOperation::LockNew,
            5 => HubOperation::LockReturn,
            6 => HubOperation::LockSet,
            _ => HubOperation::LockClear,
        }
    }
}

impl Display for HubOperation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HubOperation::ClkSet => "CLKSET",
            HubOperation::CogId => "COGID",
            HubOperation::CogInit => "COGINIT",
            HubOperation::CogStop => "COGSTOP",
            HubOperation::LockNew => "LOCKNEW",
            HubOperation::LockReturn => "LOCKRET",
            HubOperation::LockSet => "LOCKSET",
            HubOperation::LockClear => "LOCKCLR",
        })
    }
}

/// Which cog a COGINIT should start.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize)]
pub enum CogSelection {
    /// Start the lowest-numbered idle cog.
    AnyFree,
    /// (Re)start the given cog, stopping it first if it is running.
    Specific(usize),
}

/// The decoded argument of a COGINIT hub operation.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize)]
pub struct CogInitRequest {
    /// Hub address passed to the new cog in its PAR register
    /// (always long-aligned).
    pub parameter: u32,
    /// Hub address the cog loads its 496 longs of code from (always
    /// long-aligned).
    pub program: u32,
    pub cog: CogSelection,
}

impl CogInitRequest {
    #[must_use]
    pub const fn decode(arg: u32) -> CogInitRequest {
        CogInitRequest {
            parameter: (arg >> 16) & 0xFFFC,
            program: (arg >> 2) & 0xFFFC,
            cog: if arg & 8 != 0 {
                CogSelection::AnyFree
            } else {
                CogSelection::Specific((arg & 7) as usize)
            },
        }
    }

    #[must_use]
    pub const fn encode(&self) -> u32 {
        let selection = match self.cog {
            CogSelection::AnyFree => 8,
            CogSelection::Specific(n) => (n as u32) & 7,
        };
        ((self.parameter & 0xFFFC) << 16) | ((self.program & 0xFFFC) << 2) | selection
    }

    /// True if the new cog should run the bytecode interpreter.
    #[must_use]
    pub const fn is_interpreter(&self) -> bool {
        self.program == INTERPRETER_ENTRY
    }
}

#[test]
fn test_decode_interpreter_start() {
    let req = CogInitRequest::decode((0x1234 << 16) | (INTERPRETER_ENTRY << 2) | 8);
    assert_eq!(req.parameter, 0x1234);
    assert_eq!(req.program, INTERPRETER_ENTRY);
    assert_eq!(req.cog, CogSelection::AnyFree);
    assert!(req.is_interpreter());
}

#[test]
fn test_decode_specific_cog_ignores_unaligned_bits() {
    // Bit 0 of the program address lands on bit 2 of the argument,
    // which belongs to the cog number; the program field drops it.
    let req = CogInitRequest::decode((0x0010 << 16) | (0x0101 << 2) | 5);
    assert_eq!(req.parameter, 0x0010);
    assert_eq!(req.program, 0x0100);
    assert_eq!(req.cog, CogSelection::Specific(5));
    assert!(!req.is_interpreter());
}

#[cfg(test)]
#[derive(Debug, Arbitrary)]
struct CogInitFields {
    #[strategy(0..0x4000u32)]
    parameter_long: u32,
    #[strategy(0..0x4000u32)]
    program_long: u32,
    // 8 stands for "any free cog".
    #[strategy(0..=8usize)]
    cog: usize,
}

#[cfg(test)]
#[proptest]
fn coginit_request_encoding_is_reversible(fields: CogInitFields) {
    let req = CogInitRequest {
        parameter: fields.parameter_long << 2,
        program: fields.program_long << 2,
        cog: if fields.cog == 8 {
            CogSelection::AnyFree
        } else {
            CogSelection::Specific(fields.cog)
        },
    };
    assert_eq!(CogInitRequest::decode(req.encode()), req);
}

#[test]
fn test_hub_operation_decode_uses_low_bits() {
    assert_eq!(HubOperation::from_bits(0xFFFF_FFF8), HubOperation::ClkSet);
    assert_eq!(HubOperation::from_bits(2), HubOperation::CogInit);
    assert_eq!(HubOperation::from_bits(0x17), HubOperation::LockClear);
}
