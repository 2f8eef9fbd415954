//! Encodings used by the bytecode interpreter.
//!
//! The opcode space divides into four ranges:
//!
//! | range     | family                                          |
//! |-----------|-------------------------------------------------|
//! | 0x00-0x3F | special operations (calls, branches, hub ops)   |
//! | 0x40-0x7F | fast access to the first 8 variables or locals  |
//! | 0x80-0xDF | general memory access                           |
//! | 0xE0-0xFF | math operators on the top of the stack          |
//!
//! Memory access and several special operations may be followed by
//! an "effect" byte describing an in-place update (assignment
//! operators, increment, decrement, random and so on).
//!
//! Branch offsets and variable offsets are packed into one or two
//! bytes.  If the top bit of the first byte is clear, the offset is
//! the low seven bits (sign-extended from bit 6 for signed offsets).
//! Otherwise the low seven bits of the first byte and the whole of
//! the second byte form a fifteen bit value (sign-extended from bit
//! 14 for signed offsets).
use std::fmt::{self, Display, Formatter};

use serde::Serialize;

#[cfg(test)]
use test_strategy::proptest;

/// The broad family an opcode byte belongs to.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize)]
pub enum OpcodeFamily {
    Special(u8),
    VariableAccess(VariableAccess),
    MemoryAccess(MemoryAccess),
    Math(MathOperator),
}

impl OpcodeFamily {
    #[must_use]
    pub fn classify(op: u8) -> OpcodeFamily {
        match op {
            0xE0..=0xFF => OpcodeFamily::Math(MathOperator::from_bits(op)),
            0x80..=0xDF => OpcodeFamily::MemoryAccess(MemoryAccess::decode(op)),
            0x40..=0x7F => OpcodeFamily::VariableAccess(VariableAccess::decode(op)),
            _ => OpcodeFamily::Special(op),
        }
    }
}

/// Reads an unsigned packed offset.  `next` supplies successive
/// bytes of the instruction stream; it is called once or twice.
pub fn read_packed_unsigned<F: FnMut() -> u8>(mut next: F) -> u32 {
    let first = u32::from(next());
    if first & 0x80 == 0 {
        first
    } else {
        ((first << 8) | u32::from(next())) & 0x7FFF
    }
}

/// Reads a signed packed offset, returning it as a two's complement
/// 32-bit value.
pub fn read_packed_signed<F: FnMut() -> u8>(mut next: F) -> u32 {
    let first = u32::from(next());
    if first & 0x80 == 0 {
        if first & 0x40 != 0 {
            first | 0xFFFF_FF80
        } else {
            first
        }
    } else {
        let value = ((first << 8) | u32::from(next())) & 0x7FFF;
        if value & 0x4000 != 0 {
            value | 0xFFFF_8000
        } else {
            value
        }
    }
}

/// What a memory access does with the location it addresses.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize)]
pub enum AccessKind {
    /// Push the value onto the stack.
    Push,
    /// Pop the stack into the location.
    Pop,
    /// Apply an in-place effect (an effect byte follows).
    Effect,
    /// Push the address of the location.
    Reference,
}

impl AccessKind {
    #[must_use]
    pub const fn from_bits(bits: u8) -> AccessKind {
        match bits & 3 {
            0 => AccessKind::Push,
            1 => AccessKind::Pop,
            2 => AccessKind::Effect,
            _ => AccessKind::Reference,
        }
    }
}

/// The base address a memory access is relative to.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize)]
pub enum AddressSpace {
    /// The address is popped from the stack.
    Main,
    Object,
    Variable,
    Local,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize)]
pub enum AccessSize {
    Byte,
    Word,
    Long,
}

impl AccessSize {
    /// log2 of the size in bytes; an index is shifted left by this
    /// much.
    #[must_use]
    pub const fn shift(self) -> u32 {
        match self {
            AccessSize::Byte => 0,
            AccessSize::Word => 1,
            AccessSize::Long => 2,
        }
    }
}

/// A decoded 0x80-0xDF opcode.
///
/// ```text
/// bit 7    1
/// bits 6:5 size (byte, word, long)
/// bit 4    indexed (an index is popped and scaled by the size)
/// bits 3:2 address space (main, object, variable, local)
/// bits 1:0 access kind
/// ```
///
/// All but main-memory accesses are followed by a packed unsigned
/// offset.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize)]
pub struct MemoryAccess {
    pub kind: AccessKind,
    pub space: AddressSpace,
    pub indexed: bool,
    pub size: AccessSize,
}

impl MemoryAccess {
    #[must_use]
    pub const fn decode(op: u8) -> MemoryAccess {
        MemoryAccess {
            kind: AccessKind::from_bits(op),
            space: match op & 0x0C {
                0x00 => AddressSpace::Main,
                0x04 => AddressSpace::Object,
                0x08 => AddressSpace::Variable,
                _ => AddressSpace::Local,
            },
            indexed: op & 0x10 != 0,
            size: match op & 0x60 {
                0x00 => AccessSize::Byte,
                0x20 => AccessSize::Word,
                // 0x60 only arises for math operators, which are
                // classified before we get here.
                _ => AccessSize::Long,
            },
        }
    }
}

/// A decoded 0x40-0x7F opcode: a long access to one of the first
/// eight longs of the variable or local frame.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize)]
pub struct VariableAccess {
    pub kind: AccessKind,
    /// Either [`AddressSpace::Variable`] or [`AddressSpace::Local`].
    pub space: AddressSpace,
    /// Byte offset from the start of the frame.
    pub offset: u32,
}

impl VariableAccess {
    #[must_use]
    pub const fn decode(op: u8) -> VariableAccess {
        VariableAccess {
            kind: AccessKind::from_bits(op),
            space: if op & 0x20 == 0 {
                AddressSpace::Variable
            } else {
                AddressSpace::Local
            },
            offset: (op & 0x1C) as u32,
        }
    }
}

/// The operand byte of the cog register operations (0x3D-0x3F).
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize)]
pub struct RegisterAccess {
    pub kind: AccessKind,
    /// Cog register address (0x1E0-0x1FF).
    pub register: u32,
}

impl RegisterAccess {
    /// Returns `None` for operand bytes which don't describe a
    /// register read, write or effect.
    #[must_use]
    pub const fn decode(op: u8) -> Option<RegisterAccess> {
        let kind = match op & 0xE0 {
            0x80 => AccessKind::Push,
            0xA0 => AccessKind::Pop,
            0xC0 => AccessKind::Effect,
            _ => return None,
        };
        Some(RegisterAccess {
            kind,
            register: (op & 0x1F) as u32 + 0x1E0,
        })
    }
}

/// The 32 math operators, shared by the 0xE0-0xFF opcodes and by
/// the assignment effects (0x40-0x5F).
#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize)]
pub enum MathOperator {
    RotateRight = 0x00,
    RotateLeft = 0x01,
    ShiftRight = 0x02,
    ShiftLeft = 0x03,
    LimitMinimum = 0x04,
    LimitMaximum = 0x05,
    Negate = 0x06,
    Complement = 0x07,
    BitAnd = 0x08,
    Absolute = 0x09,
    BitOr = 0x0A,
    BitXor = 0x0B,
    Add = 0x0C,
    Subtract = 0x0D,
    ArithmeticShiftRight = 0x0E,
    Reverse = 0x0F,
    LogicalAnd = 0x10,
    Encode = 0x11,
    LogicalOr = 0x12,
    Decode = 0x13,
    Multiply = 0x14,
    MultiplyHigh = 0x15,
    Divide = 0x16,
    Modulus = 0x17,
    SquareRoot = 0x18,
    Less = 0x19,
    Greater = 0x1A,
    NotEqual = 0x1B,
    Equal = 0x1C,
    LessOrEqual = 0x1D,
    GreaterOrEqual = 0x1E,
    LogicalNot = 0x1F,
}

const MATH_OPERATORS: [MathOperator; 32] = [
    MathOperator::RotateRight,
    MathOperator::RotateLeft,
    MathOperator::ShiftRight,
    MathOperator::ShiftLeft,
    MathOperator::LimitMinimum,
    MathOperator::LimitMaximum,
    MathOperator::Negate,
    MathOperator::Complement,
    MathOperator::BitAnd,
    MathOperator::Absolute,
    MathOperator::BitOr,
    MathOperator::BitXor,
    MathOperator::Add,
    MathOperator::Subtract,
    MathOperator::ArithmeticShiftRight,
    MathOperator::Reverse,
    MathOperator::LogicalAnd,
    MathOperator::Encode,
    MathOperator::LogicalOr,
    MathOperator::Decode,
    MathOperator::Multiply,
    MathOperator::MultiplyHigh,
    MathOperator::Divide,
    MathOperator::Modulus,
    MathOperator::SquareRoot,
    MathOperator::Less,
    MathOperator::Greater,
    MathOperator::NotEqual,
    MathOperator::Equal,
    MathOperator::LessOrEqual,
    MathOperator::GreaterOrEqual,
    MathOperator::LogicalNot,
];

impl MathOperator {
    /// Decodes the low five bits of `bits`.
    #[must_use]
    pub const fn from_bits(bits: u8) -> MathOperator {
        MATH_OPERATORS[(bits & 0x1F) as usize]
    }

    /// Unary operators work on a single operand and never pop a
    /// second one.
    #[must_use]
    pub const fn is_unary(self) -> bool {
        matches!(
            self,
            MathOperator::Negate
                | MathOperator::Complement
                | MathOperator::Absolute
                | MathOperator::Encode
                | MathOperator::Decode
                | MathOperator::SquareRoot
                | MathOperator::LogicalNot
        )
    }

    /// The Spin operator symbol.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            MathOperator::RotateRight => "->",
            MathOperator::RotateLeft => "<-",
            MathOperator::ShiftRight => ">>",
            MathOperator::ShiftLeft => "<<",
            MathOperator::LimitMinimum => "#>",
            MathOperator::LimitMaximum => "<#",
            MathOperator::Negate => "-",
            MathOperator::Complement => "!",
            MathOperator::BitAnd => "&",
            MathOperator::Absolute => "||",
            MathOperator::BitOr => "|",
            MathOperator::BitXor => "^",
            MathOperator::Add => "+",
            MathOperator::Subtract => "-",
            MathOperator::ArithmeticShiftRight => "~>",
            MathOperator::Reverse => "><",
            MathOperator::LogicalAnd => "AND",
            MathOperator::Encode => ">|",
            MathOperator::LogicalOr => "OR",
            MathOperator::Decode => "|<",
            MathOperator::Multiply => "*",
            MathOperator::MultiplyHigh => "**",
            MathOperator::Divide => "/",
            MathOperator::Modulus => "//",
            MathOperator::SquareRoot => "^^",
            MathOperator::Less => "<",
            MathOperator::Greater => ">",
            MathOperator::NotEqual => "<>",
            MathOperator::Equal => "==",
            MathOperator::LessOrEqual => "=<",
            MathOperator::GreaterOrEqual => "=>",
            MathOperator::LogicalNot => "NOT",
        }
    }
}

impl Display for MathOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Width of the location an increment or decrement effect applies
/// to; the result wraps at this width.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize)]
pub enum EffectWidth {
    /// A bit field of a cog register; the caller masks the result.
    Bits,
    Byte,
    Word,
    Long,
}

impl EffectWidth {
    #[must_use]
    pub const fn mask(self) -> u32 {
        match self {
            EffectWidth::Byte => 0xFF,
            EffectWidth::Word => 0xFFFF,
            EffectWidth::Bits | EffectWidth::Long => 0xFFFF_FFFF,
        }
    }
}

/// A decoded effect byte (without its push flag).
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize)]
pub enum Effect {
    /// Store the popped value.
    Copy,
    /// REPEAT var FROM start TO end: a branch offset follows.
    RepeatCompare,
    /// REPEAT var FROM start TO end STEP delta: a branch offset
    /// follows.
    RepeatCompareStep,
    /// `?var`: advance a pseudo-random sequence.
    RandomForward,
    /// `var?`: step a pseudo-random sequence backwards.
    RandomReverse,
    SignExtendByte,
    SignExtendWord,
    /// `var~`: yield the value, then clear it.
    PostClear,
    /// `var~~`: yield the value, then set it to all ones.
    PostSet,
    PreIncrement(EffectWidth),
    PostIncrement(EffectWidth),
    PreDecrement(EffectWidth),
    PostDecrement(EffectWidth),
    /// `var op= value`.
    Assign(MathOperator),
    Undefined(u8),
}

/// An effect byte: the low seven bits select the effect and the top
/// bit says whether the result is also pushed.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize)]
pub struct EffectByte {
    pub effect: Effect,
    pub push: bool,
}

impl EffectByte {
    #[must_use]
    pub const fn decode(byte: u8) -> EffectByte {
        let code = byte & 0x7F;
        let width = match code & 0x06 {
            0x00 => EffectWidth::Bits,
            0x02 => EffectWidth::Byte,
            0x04 => EffectWidth::Word,
            _ => EffectWidth::Long,
        };
        let effect = match code {
            0x00 => Effect::Copy,
            0x02 => Effect::RepeatCompare,
            0x06 => Effect::RepeatCompareStep,
            0x08 => Effect::RandomForward,
            0x0C => Effect::RandomReverse,
            0x10 => Effect::SignExtendByte,
            0x14 => Effect::SignExtendWord,
            0x18 => Effect::PostClear,
            0x1C => Effect::PostSet,
            0x20..=0x3F if code & 1 == 0 => match code & 0x18 {
                0x00 => Effect::PreIncrement(width),
                0x08 => Effect::PostIncrement(width),
                0x10 => Effect::PreDecrement(width),
                _ => Effect::PostDecrement(width),
            },
            0x40..=0x5F => Effect::Assign(MathOperator::from_bits(code)),
            _ => Effect::Undefined(code),
        };
        EffectByte {
            effect,
            push: byte & 0x80 != 0,
        }
    }
}

#[cfg(test)]
fn packed(bytes: &[u8]) -> (u32, u32, usize) {
    let mut it = bytes.iter().copied();
    let unsigned = read_packed_unsigned(|| it.next().unwrap_or(0));
    let mut it = bytes.iter().copied();
    let mut used = 0;
    let signed = read_packed_signed(|| {
        used += 1;
        it.next().unwrap_or(0)
    });
    (unsigned, signed, used)
}

#[test]
fn test_packed_offsets() {
    assert_eq!(packed(&[0x05]), (0x05, 0x05, 1));
    // Bit 6 is the sign of a one-byte offset.
    assert_eq!(packed(&[0x7F]), (0x7F, 0xFFFF_FFFF, 1));
    assert_eq!(packed(&[0x40]), (0x40, 0xFFFF_FFC0, 1));
    assert_eq!(packed(&[0x81, 0x23]), (0x0123, 0x0123, 2));
    assert_eq!(packed(&[0xFF, 0xFE]), (0x7FFE, 0xFFFF_FFFE, 2));
    assert_eq!(packed(&[0xC0, 0x00]), (0x4000, 0xFFFF_C000, 2));
}

#[cfg(test)]
#[proptest]
fn short_signed_offsets_are_sign_extended_seven_bit_values(#[strategy(-64i32..64)] n: i32) {
    let byte = (n & 0x7F) as u8;
    let (_, signed, used) = packed(&[byte]);
    assert_eq!(used, 1);
    assert_eq!(signed as i32, n);
}

#[cfg(test)]
#[proptest]
fn long_signed_offsets_are_sign_extended_fifteen_bit_values(#[strategy(-16384i32..16384)] n: i32) {
    let bits = (n & 0x7FFF) as u32;
    let bytes = [0x80 | (bits >> 8) as u8, (bits & 0xFF) as u8];
    let (unsigned, signed, used) = packed(&bytes);
    assert_eq!(used, 2);
    assert_eq!(signed as i32, n);
    assert_eq!(unsigned, bits);
}

#[test]
fn test_opcode_families() {
    assert_eq!(OpcodeFamily::classify(0x38), OpcodeFamily::Special(0x38));
    assert_eq!(
        OpcodeFamily::classify(0xEC),
        OpcodeFamily::Math(MathOperator::Add)
    );
    assert_eq!(
        OpcodeFamily::classify(0x64),
        OpcodeFamily::VariableAccess(VariableAccess {
            kind: AccessKind::Push,
            space: AddressSpace::Local,
            offset: 4,
        })
    );
    assert_eq!(
        OpcodeFamily::classify(0xD9),
        OpcodeFamily::MemoryAccess(MemoryAccess {
            kind: AccessKind::Pop,
            space: AddressSpace::Variable,
            indexed: true,
            size: AccessSize::Long,
        })
    );
}

#[test]
fn test_effect_decode() {
    assert_eq!(
        EffectByte::decode(0x80),
        EffectByte {
            effect: Effect::Copy,
            push: true
        }
    );
    assert_eq!(
        EffectByte::decode(0x2E).effect,
        Effect::PostIncrement(EffectWidth::Long)
    );
    assert_eq!(
        EffectByte::decode(0x32).effect,
        Effect::PreDecrement(EffectWidth::Byte)
    );
    assert_eq!(
        EffectByte::decode(0x3C).effect,
        Effect::PostDecrement(EffectWidth::Word)
    );
    assert_eq!(
        EffectByte::decode(0x4C).effect,
        Effect::Assign(MathOperator::Add)
    );
    assert_eq!(EffectByte::decode(0x21).effect, Effect::Undefined(0x21));
    assert_eq!(EffectByte::decode(0x60).effect, Effect::Undefined(0x60));
}

#[test]
fn test_register_access_decode() {
    assert_eq!(
        RegisterAccess::decode(0x94),
        Some(RegisterAccess {
            kind: AccessKind::Push,
            register: 0x1F4
        })
    );
    assert_eq!(
        RegisterAccess::decode(0xBF).map(|r| r.kind),
        Some(AccessKind::Pop)
    );
    assert_eq!(RegisterAccess::decode(0xE0), None);
}

#[test]
fn test_unary_operators() {
    let unary: Vec<MathOperator> = MATH_OPERATORS
        .iter()
        .copied()
        .filter(|op| op.is_unary())
        .collect();
    assert_eq!(unary.len(), 7);
    assert!(MathOperator::from_bits(0xFF).is_unary());
}
