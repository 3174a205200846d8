//! RCG Toolkit - Common Types and Utilities
//!
//! This crate contains the error definitions shared by all components
//! of the toolkit.

pub mod error;

pub use error::{CodegenError, ErrorKind, Result};
