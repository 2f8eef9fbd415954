//! Arithmetic for the bytecode interpreter: the math operators and
//! the value transformations used by in-place effects.
use conv::*;

use base::prelude::MathOperator;

const TRUE: u32 = 0xFFFF_FFFF;

fn truth(value: bool) -> u32 {
    if value {
        TRUE
    } else {
        0
    }
}

/// Applies a unary operator.  Returns `None` if `op` takes two
/// operands.
pub(crate) fn unary(op: MathOperator, value: u32) -> Option<u32> {
    let result = match op {
        MathOperator::Negate => value.wrapping_neg(),
        MathOperator::Complement => !value,
        MathOperator::Absolute => (value as i32).unsigned_abs(),
        MathOperator::Encode => 32 - value.leading_zeros(),
        MathOperator::Decode => 1 << (value & 31),
        MathOperator::SquareRoot => square_root(value),
        MathOperator::LogicalNot => truth(value == 0),
        _ => return None,
    };
    Some(result)
}

fn square_root(value: u32) -> u32 {
    f64::from(value)
        .sqrt()
        .approx_as_by::<u32, RoundToZero>()
        .unwrap_or(u32::MAX)
}

/// Reverses the low `bits` bits of `value`, clearing the rest.
fn reverse_low_bits(value: u32, bits: u32) -> u32 {
    match bits.min(32) {
        0 => 0,
        n => value.reverse_bits() >> (32 - n),
    }
}

/// Applies a binary operator to `left` and `right`.  Signed
/// operators treat their operands as two's complement.
pub(crate) fn binary(op: MathOperator, left: u32, right: u32) -> u32 {
    let (l, r) = (left as i32, right as i32);
    match op {
        MathOperator::RotateRight => left.rotate_right(right & 31),
        MathOperator::RotateLeft => left.rotate_left(right & 31),
        MathOperator::ShiftRight => left >> (right & 31),
        MathOperator::ShiftLeft => left << (right & 31),
        MathOperator::LimitMinimum => l.max(r) as u32,
        MathOperator::LimitMaximum => l.min(r) as u32,
        MathOperator::BitAnd => left & right,
        MathOperator::BitOr => left | right,
        MathOperator::BitXor => left ^ right,
        MathOperator::Add => left.wrapping_add(right),
        MathOperator::Subtract => left.wrapping_sub(right),
        MathOperator::ArithmeticShiftRight => (l >> (right & 31)) as u32,
        MathOperator::Reverse => reverse_low_bits(left, right),
        MathOperator::LogicalAnd => truth(left != 0 && right != 0),
        MathOperator::LogicalOr => truth(left != 0 || right != 0),
        MathOperator::Multiply => left.wrapping_mul(right),
        MathOperator::MultiplyHigh => ((i64::from(l) * i64::from(r)) >> 32) as u32,
        MathOperator::Divide if right == 0 => TRUE,
        MathOperator::Divide => l.wrapping_div(r) as u32,
        MathOperator::Modulus if right == 0 => TRUE,
        MathOperator::Modulus => l.wrapping_rem(r) as u32,
        MathOperator::Less => truth(l < r),
        MathOperator::Greater => truth(l > r),
        MathOperator::NotEqual => truth(left != right),
        MathOperator::Equal => truth(left == right),
        MathOperator::LessOrEqual => truth(l <= r),
        MathOperator::GreaterOrEqual => truth(l >= r),
        // Unary operators ignore the right operand.
        MathOperator::Negate
        | MathOperator::Complement
        | MathOperator::Absolute
        | MathOperator::Encode
        | MathOperator::Decode
        | MathOperator::SquareRoot
        | MathOperator::LogicalNot => unary(op, left).unwrap_or(left),
    }
}

/// The value of a packed literal (bytecode 0x37).  The low five
/// bits select a power of two, bit 5 subtracts one and bit 6
/// complements the result.
pub(crate) fn packed_literal(byte: u8) -> u32 {
    let mut value = 2u32.wrapping_shl(u32::from(byte & 0x1F));
    if byte & 0x20 != 0 {
        value = value.wrapping_sub(1);
    }
    if byte & 0x40 != 0 {
        value = !value;
    }
    value
}

/// `?x`: 32 steps of the forward pseudo-random sequence.  Zero is
/// treated as one, since zero is a fixed point of the generator.
pub(crate) fn random_forward(value: u32) -> u32 {
    let mut x = if value == 0 { 1 } else { value };
    for _ in 0..32 {
        let parity = x ^ (x >> 1) ^ (x >> 2) ^ (x >> 4);
        x >>= 1;
        if parity & 1 != 0 {
            x |= 0x8000_0000;
        }
    }
    x
}

/// `x?`: 32 steps of the reverse pseudo-random sequence.
pub(crate) fn random_reverse(value: u32) -> u32 {
    let mut x = if value == 0 { 1 } else { value };
    for _ in 0..32 {
        let parity = x ^ (x >> 1) ^ (x >> 3) ^ (x >> 31);
        x <<= 1;
        if parity & 1 != 0 {
            x |= 1;
        }
    }
    x
}

pub(crate) fn sign_extend_byte(value: u32) -> u32 {
    i32::from(value as u8 as i8) as u32
}

pub(crate) fn sign_extend_word(value: u32) -> u32 {
    i32::from(value as u16 as i16) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_strategy::proptest;

    fn neg(value: i32) -> u32 {
        value as u32
    }

    #[test]
    fn test_unary_operators() {
        assert_eq!(unary(MathOperator::Negate, 5), Some(neg(-5)));
        assert_eq!(unary(MathOperator::Absolute, neg(-7)), Some(7));
        assert_eq!(unary(MathOperator::Encode, 0), Some(0));
        assert_eq!(unary(MathOperator::Encode, 1), Some(1));
        assert_eq!(unary(MathOperator::Encode, 0x8000_0000), Some(32));
        assert_eq!(unary(MathOperator::Decode, 33), Some(2));
        assert_eq!(unary(MathOperator::SquareRoot, 99), Some(9));
        assert_eq!(unary(MathOperator::SquareRoot, u32::MAX), Some(65535));
        assert_eq!(unary(MathOperator::LogicalNot, 0), Some(TRUE));
        assert_eq!(unary(MathOperator::LogicalNot, 3), Some(0));
        assert_eq!(unary(MathOperator::Add, 3), None);
    }

    #[test]
    fn test_division() {
        assert_eq!(binary(MathOperator::Divide, 7, 2), 3);
        assert_eq!(binary(MathOperator::Divide, neg(-7), 2), neg(-3));
        assert_eq!(binary(MathOperator::Modulus, neg(-7), 2), neg(-1));
        assert_eq!(binary(MathOperator::Divide, 7, 0), TRUE);
        assert_eq!(binary(MathOperator::Modulus, 7, 0), TRUE);
        // The one quotient which doesn't fit wraps.
        assert_eq!(
            binary(MathOperator::Divide, 0x8000_0000, neg(-1)),
            0x8000_0000
        );
    }

    #[test]
    fn test_limits_and_comparisons_are_signed() {
        assert_eq!(binary(MathOperator::LimitMinimum, neg(-5), 0), 0);
        assert_eq!(binary(MathOperator::LimitMaximum, 10, neg(-1)), neg(-1));
        assert_eq!(binary(MathOperator::Less, neg(-1), 0), TRUE);
        assert_eq!(binary(MathOperator::GreaterOrEqual, neg(-1), 0), 0);
        assert_eq!(binary(MathOperator::Equal, 4, 4), TRUE);
    }

    #[test]
    fn test_multiply_high() {
        assert_eq!(binary(MathOperator::MultiplyHigh, 0x1_0000, 0x1_0000), 1);
        assert_eq!(binary(MathOperator::MultiplyHigh, neg(-1), 1), TRUE);
    }

    #[test]
    fn test_shifts() {
        assert_eq!(binary(MathOperator::RotateRight, 1, 1), 0x8000_0000);
        assert_eq!(binary(MathOperator::RotateLeft, 0x8000_0000, 33), 1);
        assert_eq!(binary(MathOperator::ArithmeticShiftRight, 0x8000_0000, 31), TRUE);
        assert_eq!(binary(MathOperator::Reverse, 0b0011, 4), 0b1100);
        assert_eq!(binary(MathOperator::Reverse, 0b0011, 0), 0);
        assert_eq!(binary(MathOperator::Reverse, 1, 40), 0x8000_0000);
    }

    #[test]
    fn test_packed_literal() {
        assert_eq!(packed_literal(0x00), 2);
        assert_eq!(packed_literal(0x1F), 0);
        assert_eq!(packed_literal(0x20 | 7), 0xFF);
        assert_eq!(packed_literal(0x40 | 0x20 | 7), 0xFFFF_FF00);
    }

    #[test]
    fn test_sign_extension() {
        assert_eq!(sign_extend_byte(0x1234_5680), 0xFFFF_FF80);
        assert_eq!(sign_extend_byte(0x1234_567F), 0x7F);
        assert_eq!(sign_extend_word(0x0000_8001), 0xFFFF_8001);
        assert_eq!(sign_extend_word(0xFFFF_1234), 0x1234);
    }

    #[test]
    fn test_random_of_zero_is_seeded() {
        assert_ne!(random_forward(0), 0);
        assert_eq!(random_forward(0), random_forward(1));
    }

    #[proptest]
    fn test_random_reverse_undoes_forward(value: u32) {
        let start = if value == 0 { 1 } else { value };
        assert_eq!(random_reverse(random_forward(start)), start);
    }
}
