//! The arithmetic and logic instructions of a native cog.
//!
//! These are pure functions of the operands and the flags, so that
//! they can be tested without a cog.
use base::prelude::Opcode;

/// What an ALU instruction produced.  Whether the result and flags
/// are actually written depends on the instruction's effects.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub(crate) struct AluOutcome {
    pub(crate) result: u32,
    pub(crate) carry: bool,
    pub(crate) zero: bool,
    /// The new program counter, for instructions which branch.
    pub(crate) jump: Option<u32>,
}

impl AluOutcome {
    fn new(result: u32, carry: bool) -> AluOutcome {
        AluOutcome {
            result,
            carry,
            zero: result == 0,
            jump: None,
        }
    }

    fn with_zero(self, zero: bool) -> AluOutcome {
        AluOutcome { zero, ..self }
    }
}

fn parity(value: u32) -> bool {
    value.count_ones() & 1 != 0
}

fn bit31(value: u32) -> bool {
    value & 0x8000_0000 != 0
}

fn signed(value: u32) -> i64 {
    i64::from(value as i32)
}

/// Truncates a signed sum to 32 bits; the flag is signed overflow.
fn signed_result(sum: i64) -> (u32, bool) {
    (sum as u32, sum < i64::from(i32::MIN) || sum > i64::from(i32::MAX))
}

fn negate_if(condition: bool, value: u32) -> u32 {
    if condition {
        value.wrapping_neg()
    } else {
        value
    }
}

/// Evaluates an ALU instruction.  `pc` is the address of the
/// instruction after this one (the return address of JMPRET).
///
/// Returns `None` for opcodes which aren't ALU operations: hub
/// access, waits and the reserved encodings.
pub(crate) fn evaluate(
    opcode: Opcode,
    d: u32,
    s: u32,
    carry: bool,
    zero: bool,
    pc: u32,
) -> Option<AluOutcome> {
    let shift = s & 31;
    let outcome = match opcode {
        Opcode::RwByte
        | Opcode::RwWord
        | Opcode::RwLong
        | Opcode::HubOp
        | Opcode::Mul
        | Opcode::Muls
        | Opcode::Enc
        | Opcode::Ones
        | Opcode::Waitpeq
        | Opcode::Waitpne
        | Opcode::Waitcnt
        | Opcode::Waitvid => return None,

        Opcode::Ror => AluOutcome::new(d.rotate_right(shift), d & 1 != 0),
        Opcode::Rol => AluOutcome::new(d.rotate_left(shift), bit31(d)),
        Opcode::Shr => AluOutcome::new(d >> shift, d & 1 != 0),
        Opcode::Shl => AluOutcome::new(d << shift, bit31(d)),
        Opcode::Rcr => {
            let fill = if carry { !(u32::MAX >> shift) } else { 0 };
            AluOutcome::new((d >> shift) | fill, d & 1 != 0)
        }
        Opcode::Rcl => {
            let fill = if carry { !(u32::MAX << shift) } else { 0 };
            AluOutcome::new((d << shift) | fill, bit31(d))
        }
        Opcode::Sar => AluOutcome::new(((d as i32) >> shift) as u32, d & 1 != 0),
        Opcode::Rev => AluOutcome::new(
            d.reverse_bits().checked_shr(shift).unwrap_or(0),
            d & 1 != 0,
        ),

        Opcode::Mins => {
            let below = (d as i32) < (s as i32);
            AluOutcome::new(if below { s } else { d }, below).with_zero(s == 0)
        }
        Opcode::Maxs => {
            let below = (d as i32) < (s as i32);
            AluOutcome::new(if below { d } else { s }, below).with_zero(s == 0)
        }
        Opcode::Min => {
            let below = d < s;
            AluOutcome::new(if below { s } else { d }, below).with_zero(s == 0)
        }
        Opcode::Max => {
            let below = d < s;
            AluOutcome::new(if below { d } else { s }, below).with_zero(s == 0)
        }

        Opcode::Movs => AluOutcome::new((d & !0x1FF) | (s & 0x1FF), carry),
        Opcode::Movd => AluOutcome::new((d & !(0x1FF << 9)) | ((s & 0x1FF) << 9), carry),
        Opcode::Movi => AluOutcome::new((d & !(0x1FF << 23)) | ((s & 0x1FF) << 23), carry),
        Opcode::Jmpret => AluOutcome {
            jump: Some(s & 0x1FF),
            ..AluOutcome::new((d & !0x1FF) | (pc & 0x1FF), carry)
        },

        Opcode::And => {
            let r = d & s;
            AluOutcome::new(r, parity(r))
        }
        Opcode::Andn => {
            let r = d & !s;
            AluOutcome::new(r, parity(r))
        }
        Opcode::Or => {
            let r = d | s;
            AluOutcome::new(r, parity(r))
        }
        Opcode::Xor => {
            let r = d ^ s;
            AluOutcome::new(r, parity(r))
        }
        Opcode::Muxc | Opcode::Muxnc | Opcode::Muxz | Opcode::Muxnz => {
            let set = match opcode {
                Opcode::Muxc => carry,
                Opcode::Muxnc => !carry,
                Opcode::Muxz => zero,
                _ => !zero,
            };
            let r = if set { d | s } else { d & !s };
            AluOutcome::new(r, parity(r))
        }

        Opcode::Add => {
            let (r, c) = d.overflowing_add(s);
            AluOutcome::new(r, c)
        }
        Opcode::Sub => {
            let (r, c) = d.overflowing_sub(s);
            AluOutcome::new(r, c)
        }
        Opcode::Addabs => {
            let (r, c) = d.overflowing_add((s as i32).unsigned_abs());
            AluOutcome::new(r, c)
        }
        Opcode::Subabs => {
            let (r, c) = d.overflowing_sub((s as i32).unsigned_abs());
            AluOutcome::new(r, c)
        }
        Opcode::Sumc | Opcode::Sumnc | Opcode::Sumz | Opcode::Sumnz => {
            let subtract = match opcode {
                Opcode::Sumc => carry,
                Opcode::Sumnc => !carry,
                Opcode::Sumz => zero,
                _ => !zero,
            };
            let sum = if subtract {
                signed(d) - signed(s)
            } else {
                signed(d) + signed(s)
            };
            let (r, overflow) = signed_result(sum);
            AluOutcome::new(r, overflow)
        }

        Opcode::Mov => AluOutcome::new(s, bit31(s)),
        Opcode::Neg => AluOutcome::new(s.wrapping_neg(), bit31(s)),
        Opcode::Abs => AluOutcome::new((s as i32).unsigned_abs(), bit31(s)),
        Opcode::Absneg => AluOutcome::new((s as i32).unsigned_abs().wrapping_neg(), bit31(s)),
        Opcode::Negc => AluOutcome::new(negate_if(carry, s), bit31(s)),
        Opcode::Negnc => AluOutcome::new(negate_if(!carry, s), bit31(s)),
        Opcode::Negz => AluOutcome::new(negate_if(zero, s), bit31(s)),
        Opcode::Negnz => AluOutcome::new(negate_if(!zero, s), bit31(s)),

        Opcode::Cmps => {
            let r = d.wrapping_sub(s);
            AluOutcome::new(r, signed(d) < signed(s))
        }
        Opcode::Cmpsx => {
            let difference = signed(d) - signed(s) - i64::from(carry);
            AluOutcome::new(difference as u32, difference < 0).with_zero(zero && difference as u32 == 0)
        }
        Opcode::Addx => {
            let sum = u64::from(d) + u64::from(s) + u64::from(carry);
            let r = sum as u32;
            AluOutcome::new(r, sum > u64::from(u32::MAX)).with_zero(zero && r == 0)
        }
        Opcode::Subx => {
            let borrow = u64::from(s) + u64::from(carry) > u64::from(d);
            let r = d.wrapping_sub(s).wrapping_sub(u32::from(carry));
            AluOutcome::new(r, borrow).with_zero(zero && r == 0)
        }
        Opcode::Adds => {
            let (r, overflow) = signed_result(signed(d) + signed(s));
            AluOutcome::new(r, overflow)
        }
        Opcode::Subs => {
            let (r, overflow) = signed_result(signed(d) - signed(s));
            AluOutcome::new(r, overflow)
        }
        Opcode::Addsx => {
            let (r, overflow) = signed_result(signed(d) + signed(s) + i64::from(carry));
            AluOutcome::new(r, overflow).with_zero(zero && r == 0)
        }
        Opcode::Subsx => {
            let (r, overflow) = signed_result(signed(d) - signed(s) - i64::from(carry));
            AluOutcome::new(r, overflow).with_zero(zero && r == 0)
        }
        Opcode::Cmpsub => {
            if d >= s {
                AluOutcome::new(d - s, true)
            } else {
                AluOutcome::new(d, false).with_zero(false)
            }
        }

        Opcode::Djnz => {
            let r = d.wrapping_sub(1);
            AluOutcome {
                jump: (r != 0).then_some(s & 0x1FF),
                ..AluOutcome::new(r, d == 0)
            }
        }
        Opcode::Tjnz => AluOutcome {
            jump: (d != 0).then_some(s & 0x1FF),
            ..AluOutcome::new(d, false)
        },
        Opcode::Tjz => AluOutcome {
            jump: (d == 0).then_some(s & 0x1FF),
            ..AluOutcome::new(d, false)
        },
    };
    Some(outcome)
}
