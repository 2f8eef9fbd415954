//! The prelude exports the types which are useful in representing
//! the chip's instructions, registers and images.  Providing this
//! prelude is the main purpose of the base crate.
pub use super::bytecode::{
    AccessKind, AccessSize, AddressSpace, Effect, EffectByte, EffectWidth, MathOperator,
    MemoryAccess, OpcodeFamily, RegisterAccess, VariableAccess,
};
pub use super::clockmode::ClockMode;
pub use super::condition::Condition;
pub use super::hubop::{CogInitRequest, CogSelection, HubOperation, INTERPRETER_ENTRY};
pub use super::image::{ImageHeader, TERMINATION_TRAP};
pub use super::instruction::{Effects, Instruction, Opcode};
pub use super::registers::{
    SpecialRegister, COG_MEMORY_LONGS, COG_PROGRAM_LONGS, INTERPRETER_COGID,
    INTERPRETER_INITCOGID,
};
pub use super::{COG_COUNT, LOCK_COUNT, PIN_COUNT};
