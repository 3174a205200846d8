//! Boxed scalars crossing the execution boundary
//!
//! Readers name the representation they want: `to_i64` sign-extends from
//! the stored width, `to_u64` zero-extends, and the float readers only
//! accept the matching precision.

use rcg_ir::{mask, sign_extend};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum GenericValue {
    /// Integer of `bits` width, stored zero-extended
    Int { bits: u32, value: u64 },
    Float(f32),
    Double(f64),
    /// Opaque address; zero is null
    Pointer(u64),
    Void,
}

impl GenericValue {
    /// Integer box truncated to `bits`
    pub fn from_int(value: i64, bits: u32) -> Self {
        GenericValue::Int { bits, value: mask(bits, value as u64) }
    }

    pub fn from_uint(value: u64, bits: u32) -> Self {
        GenericValue::Int { bits, value: mask(bits, value) }
    }

    pub fn to_i64(&self) -> Option<i64> {
        match *self {
            GenericValue::Int { bits, value } => Some(sign_extend(bits, value)),
            _ => None,
        }
    }

    pub fn to_u64(&self) -> Option<u64> {
        match *self {
            GenericValue::Int { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn to_f32(&self) -> Option<f32> {
        match *self {
            GenericValue::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn to_f64(&self) -> Option<f64> {
        match *self {
            GenericValue::Double(v) => Some(v),
            _ => None,
        }
    }

    pub fn to_pointer(&self) -> Option<u64> {
        match *self {
            GenericValue::Pointer(address) => Some(address),
            _ => None,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, GenericValue::Void)
    }
}

macro_rules! from_signed {
    ($($ty:ty => $bits:expr),*) => {
        $(impl From<$ty> for GenericValue {
            fn from(value: $ty) -> Self {
                GenericValue::from_int(i64::from(value), $bits)
            }
        })*
    };
}

from_signed!(i8 => 8, i16 => 16, i32 => 32, i64 => 64);

impl From<u32> for GenericValue {
    fn from(value: u32) -> Self {
        GenericValue::from_uint(u64::from(value), 32)
    }
}

impl From<u64> for GenericValue {
    fn from(value: u64) -> Self {
        GenericValue::from_uint(value, 64)
    }
}

impl From<bool> for GenericValue {
    fn from(value: bool) -> Self {
        GenericValue::from_uint(u64::from(value), 1)
    }
}

impl From<f32> for GenericValue {
    fn from(value: f32) -> Self {
        GenericValue::Float(value)
    }
}

impl From<f64> for GenericValue {
    fn from(value: f64) -> Self {
        GenericValue::Double(value)
    }
}

impl fmt::Display for GenericValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            GenericValue::Int { bits: 1, value } => write!(f, "{}", value != 0),
            GenericValue::Int { bits, value } => write!(f, "{}", sign_extend(bits, value)),
            GenericValue::Float(v) => write!(f, "{v}"),
            GenericValue::Double(v) => write!(f, "{v}"),
            GenericValue::Pointer(0) => write!(f, "null"),
            GenericValue::Pointer(address) => write!(f, "{address:#x}"),
            GenericValue::Void => write!(f, "void"),
        }
    }
}
