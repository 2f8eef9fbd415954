//! Errors reported by the emulator.
//!
//! A [`Fault`] is raised when a cog executes something the emulator
//! has no behavior for.  The cog which raised it has already
//! finished the offending instruction (treating it as a no-op where
//! it can), so the caller may choose to keep stepping.
use std::error::Error;
use std::fmt::{self, Display, Formatter};

use serde::Serialize;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize)]
pub enum FaultKind {
    /// A reserved native opcode (MUL, MULS, ENC or ONES).
    UndefinedNativeOpcode { opcode: u8, pc: u32 },
    /// A bytecode with no defined meaning.
    UndefinedBytecode { opcode: u8, pc: u32 },
    /// An in-place effect byte with no defined meaning.
    UndefinedEffect { effect: u8, pc: u32 },
    /// A register access bytecode with an undefined operation.
    UndefinedRegisterOp { op: u8, pc: u32 },
    /// A call bytecode executed without a preceding frame push.
    CallWithoutFrame { pc: u32 },
}

impl Display for FaultKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::UndefinedNativeOpcode { opcode, pc } => {
                write!(f, "undefined native opcode {opcode:#04x} at {pc:#05x}")
            }
            FaultKind::UndefinedBytecode { opcode, pc } => {
                write!(f, "undefined bytecode {opcode:#04x} at {pc:#06x}")
            }
            FaultKind::UndefinedEffect { effect, pc } => {
                write!(f, "undefined effect {effect:#04x} at {pc:#06x}")
            }
            FaultKind::UndefinedRegisterOp { op, pc } => {
                write!(f, "undefined register operation {op} at {pc:#06x}")
            }
            FaultKind::CallWithoutFrame { pc } => {
                write!(f, "call without a stack frame at {pc:#06x}")
            }
        }
    }
}

/// A fault raised by a cog.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize)]
pub struct Fault {
    pub cog: usize,
    /// The system counter when the fault was raised.
    pub counter: u32,
    pub kind: FaultKind,
}

impl Display for Fault {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "cog {} at counter {}: {}", self.cog, self.counter, self.kind)
    }
}

impl Error for Fault {}

/// Returned when a program image cannot be loaded into hub RAM.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize)]
pub struct BinarySizeError {
    pub size: usize,
}

impl Display for BinarySizeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.size == 0 {
            f.write_str("program image is empty")
        } else {
            write!(
                f,
                "program image is {} bytes, but hub RAM only holds {}",
                self.size,
                super::memory::HUB_RAM_SIZE
            )
        }
    }
}

impl Error for BinarySizeError {}

#[test]
fn test_fault_display() {
    let fault = Fault {
        cog: 3,
        counter: 1000,
        kind: FaultKind::UndefinedBytecode {
            opcode: 0x14,
            pc: 0x0020,
        },
    };
    assert_eq!(
        fault.to_string(),
        "cog 3 at counter 1000: undefined bytecode 0x14 at 0x0020"
    );
    assert_eq!(
        BinarySizeError { size: 0 }.to_string(),
        "program image is empty"
    );
}
