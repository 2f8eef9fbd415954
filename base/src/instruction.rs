//! Native cog instructions.
//!
//! Every native instruction is a single 32-bit long with this
//! layout:
//!
//! ```text
//! 31....26 25 24 23 22 21..18 17......9 8.......0
//! opcode    Z  C  R  I  cond   dest      source
//! ```
//!
//! Z, C and R select whether the zero flag, the carry flag and the
//! destination register are written when the instruction retires.
//! I selects whether the source field is an immediate value or the
//! address of a cog register.
//!
//! Several assembler mnemonics share an opcode: WRBYTE and RDBYTE
//! differ only in the R bit, JMP, CALL and RET are all JMPRET, CMP
//! is SUB without R, and so on.  This module only deals with the
//! opcode as it appears in the instruction word.

use std::fmt::{self, Display, Formatter};

use serde::Serialize;

#[cfg(test)]
use test_strategy::{proptest, Arbitrary};

use super::condition::Condition;

/// The six-bit operation field of a native instruction.
///
/// Names follow the instruction word, not the assembler mnemonic
/// (so `RwByte` covers both RDBYTE and WRBYTE).
#[repr(u8)]
#[cfg_attr(test, derive(Arbitrary))]
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize)]
pub enum Opcode {
    RwByte = 0x00,
    RwWord = 0x01,
    RwLong = 0x02,
    HubOp = 0x03,
    Mul = 0x04,
    Muls = 0x05,
    Enc = 0x06,
    Ones = 0x07,
    Ror = 0x08,
    Rol = 0x09,
    Shr = 0x0A,
    Shl = 0x0B,
    Rcr = 0x0C,
    Rcl = 0x0D,
    Sar = 0x0E,
    Rev = 0x0F,
    Mins = 0x10,
    Maxs = 0x11,
    Min = 0x12,
    Max = 0x13,
    Movs = 0x14,
    Movd = 0x15,
    Movi = 0x16,
    Jmpret = 0x17,
    And = 0x18,
    Andn = 0x19,
    Or = 0x1A,
    Xor = 0x1B,
    Muxc = 0x1C,
    Muxnc = 0x1D,
    Muxz = 0x1E,
    Muxnz = 0x1F,
    Add = 0x20,
    Sub = 0x21,
    Addabs = 0x22,
    Subabs = 0x23,
    Sumc = 0x24,
    Sumnc = 0x25,
    Sumz = 0x26,
    Sumnz = 0x27,
    Mov = 0x28,
    Neg = 0x29,
    Abs = 0x2A,
    Absneg = 0x2B,
    Negc = 0x2C,
    Negnc = 0x2D,
    Negz = 0x2E,
    Negnz = 0x2F,
    Cmps = 0x30,
    Cmpsx = 0x31,
    Addx = 0x32,
    Subx = 0x33,
    Adds = 0x34,
    Subs = 0x35,
    Addsx = 0x36,
    Subsx = 0x37,
    Cmpsub = 0x38,
    Djnz = 0x39,
    Tjnz = 0x3A,
    Tjz = 0x3B,
    Waitpeq = 0x3C,
    Waitpne = 0x3D,
    Waitcnt = 0x3E,
    Waitvid = 0x3F,
}

/// Opcodes indexed by their six-bit encoding.
const OPCODES: [Opcode; 64] = [
    Opcode::RwByte,
    Opcode::RwWord,
    Opcode::RwLong,
    Opcode::HubOp,
    Opcode::Mul,
    Opcode::Muls,
    Opcode::Enc,
    Opcode::Ones,
    Opcode::Ror,
    Opcode::Rol,
    Opcode::Shr,
    Opcode::Shl,
    Opcode::Rcr,
    Opcode::Rcl,
    Opcode::Sar,
    Opcode::Rev,
    Opcode::Mins,
    Opcode::Maxs,
    Opcode::Min,
    Opcode::Max,
    Opcode::Movs,
    Opcode::Movd,
    Opcode::Movi,
    Opcode::Jmpret,
    Opcode::And,
    Opcode::Andn,
    Opcode::Or,
    Opcode::Xor,
    Opcode::Muxc,
    Opcode::Muxnc,
    Opcode::Muxz,
    Opcode::Muxnz,
    Opcode::Add,
    Opcode::Sub,
    Opcode::Addabs,
    Opcode::Subabs,
    Opcode::Sumc,
    Opcode::Sumnc,
    Opcode::Sumz,
    Opcode::Sumnz,
    Opcode::Mov,
    Opcode::Neg,
    Opcode::Abs,
    Opcode::Absneg,
    Opcode::Negc,
    Opcode::Negnc,
    Opcode::Negz,
    Opcode::Negnz,
    Opcode::Cmps,
    Opcode::Cmpsx,
    Opcode::Addx,
    Opcode::Subx,
    Opcode::Adds,
    Opcode::Subs,
    Opcode::Addsx,
    Opcode::Subsx,
    Opcode::Cmpsub,
    Opcode::Djnz,
    Opcode::Tjnz,
    Opcode::Tjz,
    Opcode::Waitpeq,
    Opcode::Waitpne,
    Opcode::Waitcnt,
    Opcode::Waitvid,
];

impl Opcode {
    /// Decodes the low six bits of `bits`.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Opcode {
        OPCODES[(bits & 0x3F) as usize]
    }

    #[must_use]
    pub const fn bits(self) -> u8 {
        self as u8
    }

    /// MUL, MULS, ENC and ONES are reserved encodings on the P1;
    /// the silicon has no multiplier.
    #[must_use]
    pub const fn is_reserved(self) -> bool {
        matches!(self, Opcode::Mul | Opcode::Muls | Opcode::Enc | Opcode::Ones)
    }

    /// Hub instructions go through the hub bus, so they wait for
    /// the cog's hub window.
    #[must_use]
    pub const fn is_hub_access(self) -> bool {
        matches!(
            self,
            Opcode::RwByte | Opcode::RwWord | Opcode::RwLong | Opcode::HubOp
        )
    }

    /// Blocking instructions which stall until a pin, counter or
    /// video condition is met.
    #[must_use]
    pub const fn is_wait(self) -> bool {
        matches!(
            self,
            Opcode::Waitpeq | Opcode::Waitpne | Opcode::Waitcnt | Opcode::Waitvid
        )
    }
}

impl Display for Opcode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = format!("{self:?}");
        f.write_str(&name.to_uppercase())
    }
}

/// The write-back effects of an instruction (the Z, C and R bits).
#[cfg_attr(test, derive(Arbitrary))]
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, Hash, Serialize)]
pub struct Effects {
    pub write_zero: bool,
    pub write_carry: bool,
    pub write_result: bool,
}

impl Effects {
    pub const NONE: Effects = Effects {
        write_zero: false,
        write_carry: false,
        write_result: false,
    };

    /// Only the destination register is written (the usual case for
    /// ALU instructions).
    pub const RESULT: Effects = Effects {
        write_zero: false,
        write_carry: false,
        write_result: true,
    };

    #[must_use]
    pub const fn with_zero(self) -> Effects {
        Effects {
            write_zero: true,
            ..self
        }
    }

    #[must_use]
    pub const fn with_carry(self) -> Effects {
        Effects {
            write_carry: true,
            ..self
        }
    }
}

/// A native instruction word.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Instruction(u32);

const WZ_BIT: u32 = 1 << 25;
const WC_BIT: u32 = 1 << 24;
const WR_BIT: u32 = 1 << 23;
const IMM_BIT: u32 = 1 << 22;

impl Instruction {
    #[must_use]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        Opcode::from_bits((self.0 >> 26) as u8)
    }

    #[must_use]
    pub const fn effects(&self) -> Effects {
        Effects {
            write_zero: self.0 & WZ_BIT != 0,
            write_carry: self.0 & WC_BIT != 0,
            write_result: self.0 & WR_BIT != 0,
        }
    }

    #[must_use]
    pub const fn immediate(&self) -> bool {
        self.0 & IMM_BIT != 0
    }

    #[must_use]
    pub const fn condition(&self) -> Condition {
        Condition::from_bits((self.0 >> 18) as u8)
    }

    /// The 9-bit destination register address.
    #[must_use]
    pub const fn destination(&self) -> u32 {
        (self.0 >> 9) & 0x1FF
    }

    /// The 9-bit source field; either a register address or (if
    /// [`Instruction::immediate`] is set) a literal.
    #[must_use]
    pub const fn source(&self) -> u32 {
        self.0 & 0x1FF
    }

    /// Assembles an instruction word.  `destination` and `source`
    /// are truncated to 9 bits.
    #[must_use]
    pub const fn build(
        opcode: Opcode,
        effects: Effects,
        immediate: bool,
        condition: Condition,
        destination: u32,
        source: u32,
    ) -> Instruction {
        let mut bits = (opcode as u32) << 26;
        if effects.write_zero {
            bits |= WZ_BIT;
        }
        if effects.write_carry {
            bits |= WC_BIT;
        }
        if effects.write_result {
            bits |= WR_BIT;
        }
        if immediate {
            bits |= IMM_BIT;
        }
        bits |= (condition as u32) << 18;
        bits |= (destination & 0x1FF) << 9;
        bits |= source & 0x1FF;
        Instruction(bits)
    }
}

impl From<u32> for Instruction {
    fn from(bits: u32) -> Instruction {
        Instruction(bits)
    }
}

impl From<Instruction> for u32 {
    fn from(inst: Instruction) -> u32 {
        inst.0
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instruction")
            .field("bits", &format_args!("{:#010x}", self.0))
            .field("opcode", &self.opcode())
            .field("condition", &self.condition())
            .field("effects", &self.effects())
            .field("immediate", &self.immediate())
            .field("destination", &format_args!("{:#05x}", self.destination()))
            .field("source", &format_args!("{:#05x}", self.source()))
            .finish()
    }
}

#[test]
fn test_opcode_table_matches_discriminants() {
    for bits in 0..64u8 {
        assert_eq!(Opcode::from_bits(bits).bits(), bits);
    }
}

#[test]
fn test_decode_mov_immediate() {
    // mov 5, #$1FF wz
    let inst = Instruction::from(0xA2FC_0BFF_u32);
    assert_eq!(inst.opcode(), Opcode::Mov);
    assert!(inst.immediate());
    assert!(inst.effects().write_result);
    assert!(inst.effects().write_zero);
    assert!(!inst.effects().write_carry);
    assert_eq!(inst.condition(), Condition::Always);
    assert_eq!(inst.destination(), 5);
    assert_eq!(inst.source(), 0x1FF);
}

#[test]
fn test_opcode_display() {
    assert_eq!(Opcode::Jmpret.to_string(), "JMPRET");
    assert_eq!(Opcode::RwLong.to_string(), "RWLONG");
}

#[cfg(test)]
#[derive(Debug, Arbitrary)]
struct InstructionFields {
    opcode: Opcode,
    effects: Effects,
    immediate: bool,
    condition: Condition,
    #[strategy(0..0x200u32)]
    destination: u32,
    #[strategy(0..0x200u32)]
    source: u32,
}

#[cfg(test)]
#[proptest]
fn built_instruction_fields_are_recovered(input: InstructionFields) {
    let inst = Instruction::build(
        input.opcode,
        input.effects,
        input.immediate,
        input.condition,
        input.destination,
        input.source,
    );
    assert_eq!(inst.opcode(), input.opcode);
    assert_eq!(inst.effects(), input.effects);
    assert_eq!(inst.immediate(), input.immediate);
    assert_eq!(inst.condition(), input.condition);
    assert_eq!(inst.destination(), input.destination);
    assert_eq!(inst.source(), input.source);
}
