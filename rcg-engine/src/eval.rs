//! Scalar arithmetic shared by the interpreter and constant folding

use rcg_common::{CodegenError, Result};
use rcg_ir::{mask, sign_extend, BinaryOp, CastOp, IntPredicate};

/// Apply an integer operator at width `bits`; operands and result are zero-extended
pub fn int_binary(op: BinaryOp, bits: u32, lhs: u64, rhs: u64) -> Result<u64> {
    let (a, b) = (mask(bits, lhs), mask(bits, rhs));
    let (sa, sb) = (sign_extend(bits, a), sign_extend(bits, b));
    let value = match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::UDiv => a.checked_div(b).ok_or_else(division_by_zero)?,
        BinaryOp::URem => a.checked_rem(b).ok_or_else(division_by_zero)?,
        BinaryOp::SDiv => {
            if sb == 0 {
                return Err(division_by_zero());
            }
            sa.wrapping_div(sb) as u64
        }
        BinaryOp::SRem => {
            if sb == 0 {
                return Err(division_by_zero());
            }
            sa.wrapping_rem(sb) as u64
        }
        // oversized shift amounts produce zero (or the sign fill)
        BinaryOp::Shl => {
            if b >= u64::from(bits) { 0 } else { a << b }
        }
        BinaryOp::LShr => {
            if b >= u64::from(bits) { 0 } else { a >> b }
        }
        BinaryOp::AShr => {
            let amount = b.min(u64::from(bits.saturating_sub(1)).min(63));
            (sa >> amount) as u64
        }
        BinaryOp::And => a & b,
        BinaryOp::Or => a | b,
        BinaryOp::Xor => a ^ b,
        float => {
            return Err(CodegenError::execution(format!("{float} is not an integer operator")))
        }
    };
    Ok(mask(bits, value))
}

/// Apply a float operator in double precision
pub fn float_binary(op: BinaryOp, lhs: f64, rhs: f64) -> Result<f64> {
    match op {
        BinaryOp::FAdd => Ok(lhs + rhs),
        BinaryOp::FSub => Ok(lhs - rhs),
        BinaryOp::FMul => Ok(lhs * rhs),
        BinaryOp::FDiv => Ok(lhs / rhs),
        BinaryOp::FRem => Ok(lhs % rhs),
        int => Err(CodegenError::execution(format!("{int} is not a float operator"))),
    }
}

/// Compare two integers of width `bits`
pub fn int_compare(pred: IntPredicate, bits: u32, lhs: u64, rhs: u64) -> bool {
    let (a, b) = (mask(bits, lhs), mask(bits, rhs));
    pred.evaluate(a, b, sign_extend(bits, a), sign_extend(bits, b))
}

/// Resize an integer for trunc, zext and sext
pub fn int_resize(op: CastOp, from_bits: u32, to_bits: u32, value: u64) -> u64 {
    match op {
        CastOp::SExt => mask(to_bits, sign_extend(from_bits, value) as u64),
        _ => mask(to_bits, value),
    }
}

fn division_by_zero() -> CodegenError {
    CodegenError::execution("integer division by zero")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn i32_op(op: BinaryOp, a: i32, b: i32) -> i32 {
        int_binary(op, 32, a as u32 as u64, b as u32 as u64).unwrap() as u32 as i32
    }

    #[test]
    fn test_wrapping_and_signed_ops() {
        assert_eq!(i32_op(BinaryOp::Add, i32::MAX, 1), i32::MIN);
        assert_eq!(i32_op(BinaryOp::SDiv, -7, 2), -3);
        assert_eq!(i32_op(BinaryOp::SRem, -7, 2), -1);
        assert_eq!(i32_op(BinaryOp::UDiv, -2, 2), i32::MAX);
        assert_eq!(i32_op(BinaryOp::SDiv, i32::MIN, -1), i32::MIN);
        assert_eq!(i32_op(BinaryOp::AShr, -8, 1), -4);
        assert_eq!(i32_op(BinaryOp::LShr, -8, 28), 15);
        assert_eq!(i32_op(BinaryOp::Shl, 1, 32), 0);
    }

    #[test]
    fn test_division_by_zero_traps() {
        for op in [BinaryOp::UDiv, BinaryOp::SDiv, BinaryOp::URem, BinaryOp::SRem] {
            assert!(int_binary(op, 32, 1, 0).is_err());
        }
    }

    #[test]
    fn test_narrow_widths() {
        assert_eq!(int_binary(BinaryOp::Add, 8, 255, 2).unwrap(), 1);
        assert_eq!(int_binary(BinaryOp::Xor, 1, 1, 1).unwrap(), 0);
        assert!(int_compare(IntPredicate::Slt, 8, 0xff, 0));
        assert!(!int_compare(IntPredicate::Ult, 8, 0xff, 0));
        assert_eq!(int_resize(CastOp::SExt, 8, 16, 0xff), 0xffff);
        assert_eq!(int_resize(CastOp::ZExt, 8, 16, 0xff), 0xff);
        assert_eq!(int_resize(CastOp::Trunc, 32, 8, 257), 1);
    }

    #[test]
    fn test_float_ops() {
        assert_eq!(float_binary(BinaryOp::FMul, 1.5, 2.0).unwrap(), 3.0);
        assert!(float_binary(BinaryOp::Add, 1.0, 2.0).is_err());
    }
}
