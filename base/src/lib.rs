//! The `base` crate defines the encodings of the Propeller chip
//! which are useful in both a simulator and other associated tools
//! (a disassembler or an image inspector, say).  The idea is that
//! such a tool would depend on the base crate but would not need to
//! depend on the simulator library itself.

pub mod bytecode;
pub mod clockmode;
pub mod condition;
pub mod hubop;
pub mod image;
pub mod instruction;
pub mod prelude;
pub mod registers;

/// Number of cogs on the chip.
pub const COG_COUNT: usize = 8;

/// Number of hardware locks.
pub const LOCK_COUNT: usize = 8;

/// Number of I/O pins (port A and the unbonded port B).
pub const PIN_COUNT: usize = 64;
