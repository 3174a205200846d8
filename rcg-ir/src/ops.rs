//! IR Operations
//!
//! Closed enumerations of the binary operators, comparison predicates and
//! conversions the builder can emit. Each one carries its textual name so
//! callers can dispatch from a mnemonic (`"sdiv"`, `"uge"`, `"fptosi"`).

use rcg_common::CodegenError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Binary operations in IR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    // Integer arithmetic
    Add, Sub, Mul,
    UDiv, SDiv,    // Unsigned/signed division
    URem, SRem,    // Unsigned/signed remainder

    // Bitwise
    Shl, LShr, AShr, // Logical/arithmetic shift right
    And, Or, Xor,

    // Floating point
    FAdd, FSub, FMul, FDiv, FRem,
}

impl BinaryOp {
    pub const ALL: [BinaryOp; 18] = [
        BinaryOp::Add, BinaryOp::Sub, BinaryOp::Mul,
        BinaryOp::UDiv, BinaryOp::SDiv, BinaryOp::URem, BinaryOp::SRem,
        BinaryOp::Shl, BinaryOp::LShr, BinaryOp::AShr,
        BinaryOp::And, BinaryOp::Or, BinaryOp::Xor,
        BinaryOp::FAdd, BinaryOp::FSub, BinaryOp::FMul, BinaryOp::FDiv, BinaryOp::FRem,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::UDiv => "udiv",
            BinaryOp::SDiv => "sdiv",
            BinaryOp::URem => "urem",
            BinaryOp::SRem => "srem",
            BinaryOp::Shl => "shl",
            BinaryOp::LShr => "lshr",
            BinaryOp::AShr => "ashr",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
            BinaryOp::FAdd => "fadd",
            BinaryOp::FSub => "fsub",
            BinaryOp::FMul => "fmul",
            BinaryOp::FDiv => "fdiv",
            BinaryOp::FRem => "frem",
        }
    }

    /// Operates on floating point operands
    pub fn is_float(self) -> bool {
        matches!(
            self,
            BinaryOp::FAdd | BinaryOp::FSub | BinaryOp::FMul | BinaryOp::FDiv | BinaryOp::FRem
        )
    }

    /// May trap on a zero divisor
    pub fn is_division(self) -> bool {
        matches!(self, BinaryOp::UDiv | BinaryOp::SDiv | BinaryOp::URem | BinaryOp::SRem)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for BinaryOp {
    type Err = CodegenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BinaryOp::ALL
            .into_iter()
            .find(|op| op.name() == s)
            .ok_or_else(|| CodegenError::argument(format!("unknown binary operator '{s}'")))
    }
}

/// Integer comparison predicates (icmp)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntPredicate {
    Eq, Ne,
    Ugt, Uge, Ult, Ule, // Unsigned comparisons
    Sgt, Sge, Slt, Sle, // Signed comparisons
}

impl IntPredicate {
    pub const ALL: [IntPredicate; 10] = [
        IntPredicate::Eq, IntPredicate::Ne,
        IntPredicate::Ugt, IntPredicate::Uge, IntPredicate::Ult, IntPredicate::Ule,
        IntPredicate::Sgt, IntPredicate::Sge, IntPredicate::Slt, IntPredicate::Sle,
    ];

    pub fn name(self) -> &'static str {
        match self {
            IntPredicate::Eq => "eq",
            IntPredicate::Ne => "ne",
            IntPredicate::Ugt => "ugt",
            IntPredicate::Uge => "uge",
            IntPredicate::Ult => "ult",
            IntPredicate::Ule => "ule",
            IntPredicate::Sgt => "sgt",
            IntPredicate::Sge => "sge",
            IntPredicate::Slt => "slt",
            IntPredicate::Sle => "sle",
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(self, IntPredicate::Sgt | IntPredicate::Sge | IntPredicate::Slt | IntPredicate::Sle)
    }

    /// Evaluate on operands already widened to their signed/unsigned forms
    pub fn evaluate(self, lhs_unsigned: u64, rhs_unsigned: u64, lhs_signed: i64, rhs_signed: i64) -> bool {
        match self {
            IntPredicate::Eq => lhs_unsigned == rhs_unsigned,
            IntPredicate::Ne => lhs_unsigned != rhs_unsigned,
            IntPredicate::Ugt => lhs_unsigned > rhs_unsigned,
            IntPredicate::Uge => lhs_unsigned >= rhs_unsigned,
            IntPredicate::Ult => lhs_unsigned < rhs_unsigned,
            IntPredicate::Ule => lhs_unsigned <= rhs_unsigned,
            IntPredicate::Sgt => lhs_signed > rhs_signed,
            IntPredicate::Sge => lhs_signed >= rhs_signed,
            IntPredicate::Slt => lhs_signed < rhs_signed,
            IntPredicate::Sle => lhs_signed <= rhs_signed,
        }
    }
}

impl fmt::Display for IntPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for IntPredicate {
    type Err = CodegenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IntPredicate::ALL
            .into_iter()
            .find(|pred| pred.name() == s)
            .ok_or_else(|| CodegenError::argument(format!("unknown integer predicate '{s}'")))
    }
}

/// Floating point comparison predicates (fcmp)
///
/// Ordered predicates are false when either operand is NaN, unordered
/// predicates are true in that case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FloatPredicate {
    Oeq, Ogt, Oge, Olt, Ole, One, Ord,
    Ueq, Ugt, Uge, Ult, Ule, Une, Uno,
}

impl FloatPredicate {
    pub const ALL: [FloatPredicate; 14] = [
        FloatPredicate::Oeq, FloatPredicate::Ogt, FloatPredicate::Oge,
        FloatPredicate::Olt, FloatPredicate::Ole, FloatPredicate::One, FloatPredicate::Ord,
        FloatPredicate::Ueq, FloatPredicate::Ugt, FloatPredicate::Uge,
        FloatPredicate::Ult, FloatPredicate::Ule, FloatPredicate::Une, FloatPredicate::Uno,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FloatPredicate::Oeq => "oeq",
            FloatPredicate::Ogt => "ogt",
            FloatPredicate::Oge => "oge",
            FloatPredicate::Olt => "olt",
            FloatPredicate::Ole => "ole",
            FloatPredicate::One => "one",
            FloatPredicate::Ord => "ord",
            FloatPredicate::Ueq => "ueq",
            FloatPredicate::Ugt => "ugt",
            FloatPredicate::Uge => "uge",
            FloatPredicate::Ult => "ult",
            FloatPredicate::Ule => "ule",
            FloatPredicate::Une => "une",
            FloatPredicate::Uno => "uno",
        }
    }

    pub fn evaluate(self, lhs: f64, rhs: f64) -> bool {
        let unordered = lhs.is_nan() || rhs.is_nan();
        match self {
            FloatPredicate::Oeq => !unordered && lhs == rhs,
            FloatPredicate::Ogt => !unordered && lhs > rhs,
            FloatPredicate::Oge => !unordered && lhs >= rhs,
            FloatPredicate::Olt => !unordered && lhs < rhs,
            FloatPredicate::Ole => !unordered && lhs <= rhs,
            FloatPredicate::One => !unordered && lhs != rhs,
            FloatPredicate::Ord => !unordered,
            FloatPredicate::Ueq => unordered || lhs == rhs,
            FloatPredicate::Ugt => unordered || lhs > rhs,
            FloatPredicate::Uge => unordered || lhs >= rhs,
            FloatPredicate::Ult => unordered || lhs < rhs,
            FloatPredicate::Ule => unordered || lhs <= rhs,
            FloatPredicate::Une => unordered || lhs != rhs,
            FloatPredicate::Uno => unordered,
        }
    }
}

impl fmt::Display for FloatPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for FloatPredicate {
    type Err = CodegenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FloatPredicate::ALL
            .into_iter()
            .find(|pred| pred.name() == s)
            .ok_or_else(|| CodegenError::argument(format!("unknown float predicate '{s}'")))
    }
}

/// Conversion operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CastOp {
    BitCast,
    Trunc,    // Truncate
    ZExt,     // Zero extend
    SExt,     // Sign extend
    FpToUi,
    FpToSi,
    UiToFp,
    SiToFp,
    FpExt,
    FpTrunc,
}

impl CastOp {
    pub const ALL: [CastOp; 10] = [
        CastOp::BitCast, CastOp::Trunc, CastOp::ZExt, CastOp::SExt,
        CastOp::FpToUi, CastOp::FpToSi, CastOp::UiToFp, CastOp::SiToFp,
        CastOp::FpExt, CastOp::FpTrunc,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CastOp::BitCast => "bitcast",
            CastOp::Trunc => "trunc",
            CastOp::ZExt => "zext",
            CastOp::SExt => "sext",
            CastOp::FpToUi => "fptoui",
            CastOp::FpToSi => "fptosi",
            CastOp::UiToFp => "uitofp",
            CastOp::SiToFp => "sitofp",
            CastOp::FpExt => "fpext",
            CastOp::FpTrunc => "fptrunc",
        }
    }
}

impl fmt::Display for CastOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for CastOp {
    type Err = CodegenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CastOp::ALL
            .into_iter()
            .find(|op| op.name() == s)
            .ok_or_else(|| CodegenError::argument(format!("unknown conversion '{s}'")))
    }
}
