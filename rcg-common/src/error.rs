//! Error handling for the RCG toolkit
//!
//! This module defines the error type shared by IR construction, the
//! verifier, the pass manager and the execution engine.

use std::fmt;
use thiserror::Error;

/// Main error type that encompasses every layer of the toolkit
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodegenError {
    /// Malformed or out-of-domain constructor arguments
    #[error("Argument error: {message}")]
    Argument { message: String },

    /// Operand type incompatible with the requested operation
    #[error("Type error: {message}")]
    Type { message: String },

    /// A value does not have the type a slot requires
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    /// A declaration collides with an existing one of a different type
    #[error("Type conflict for '{name}': {message}")]
    TypeConflict { name: String, message: String },

    /// Mutation of an entity that no longer accepts it
    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    /// Structural access outside a statically known bound
    #[error("Index {index} out of range: {message}")]
    Index { index: i64, message: String },

    #[error("Verification failed in '{function}': {message}")]
    Verification { function: String, message: String },

    #[error("Execution error: {message}")]
    Execution { message: String },

    #[error("Pass '{pass}' failed: {message}")]
    Pass { pass: String, message: String },

    #[error("Bitcode error: {message}")]
    Bitcode { message: String },

    #[error("IO error: {message}")]
    Io { message: String },
}

/// Broad classification used when callers only care about the error family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Argument,
    Type,
    InvalidState,
    Index,
    Verification,
    Execution,
    Pass,
    Bitcode,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Argument => "argument",
            ErrorKind::Type => "type",
            ErrorKind::InvalidState => "invalid state",
            ErrorKind::Index => "index",
            ErrorKind::Verification => "verification",
            ErrorKind::Execution => "execution",
            ErrorKind::Pass => "pass",
            ErrorKind::Bitcode => "bitcode",
            ErrorKind::Io => "io",
        };
        write!(f, "{name}")
    }
}

impl CodegenError {
    /// Create an argument error
    pub fn argument(message: impl Into<String>) -> Self {
        CodegenError::Argument { message: message.into() }
    }

    /// Create a type error
    pub fn type_error(message: impl Into<String>) -> Self {
        CodegenError::Type { message: message.into() }
    }

    /// Create a type mismatch error from the rendered types
    pub fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        CodegenError::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create a type conflict error for a named declaration
    pub fn type_conflict(name: impl Into<String>, message: impl Into<String>) -> Self {
        CodegenError::TypeConflict {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        CodegenError::InvalidState { message: message.into() }
    }

    pub fn index(index: i64, message: impl Into<String>) -> Self {
        CodegenError::Index { index, message: message.into() }
    }

    pub fn verification(function: impl Into<String>, message: impl Into<String>) -> Self {
        CodegenError::Verification {
            function: function.into(),
            message: message.into(),
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        CodegenError::Execution { message: message.into() }
    }

    pub fn pass(pass: impl Into<String>, message: impl Into<String>) -> Self {
        CodegenError::Pass {
            pass: pass.into(),
            message: message.into(),
        }
    }

    pub fn bitcode(message: impl Into<String>) -> Self {
        CodegenError::Bitcode { message: message.into() }
    }

    /// The family this error belongs to
    pub fn kind(&self) -> ErrorKind {
        match self {
            CodegenError::Argument { .. } => ErrorKind::Argument,
            CodegenError::Type { .. }
            | CodegenError::TypeMismatch { .. }
            | CodegenError::TypeConflict { .. } => ErrorKind::Type,
            CodegenError::InvalidState { .. } => ErrorKind::InvalidState,
            CodegenError::Index { .. } => ErrorKind::Index,
            CodegenError::Verification { .. } => ErrorKind::Verification,
            CodegenError::Execution { .. } => ErrorKind::Execution,
            CodegenError::Pass { .. } => ErrorKind::Pass,
            CodegenError::Bitcode { .. } => ErrorKind::Bitcode,
            CodegenError::Io { .. } => ErrorKind::Io,
        }
    }
}

/// Convert from std::io::Error
impl From<std::io::Error> for CodegenError {
    fn from(err: std::io::Error) -> Self {
        CodegenError::Io {
            message: err.to_string(),
        }
    }
}

/// Malformed bitcode surfaces through the JSON decoder
impl From<serde_json::Error> for CodegenError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            CodegenError::Io { message: err.to_string() }
        } else {
            CodegenError::Bitcode { message: err.to_string() }
        }
    }
}

/// Result alias used across the toolkit
pub type Result<T> = std::result::Result<T, CodegenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CodegenError::type_mismatch("i32", "float");
        assert_eq!(err.to_string(), "Type mismatch: expected i32, found float");

        let err = CodegenError::type_conflict("sin", "declared as double (double)");
        assert_eq!(err.to_string(), "Type conflict for 'sin': declared as double (double)");

        let err = CodegenError::index(3, "struct has 2 fields");
        assert_eq!(err.to_string(), "Index 3 out of range: struct has 2 fields");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(CodegenError::type_error("x").kind(), ErrorKind::Type);
        assert_eq!(CodegenError::type_mismatch("a", "b").kind(), ErrorKind::Type);
        assert_eq!(CodegenError::type_conflict("f", "x").kind(), ErrorKind::Type);
        assert_eq!(CodegenError::invalid_state("x").kind(), ErrorKind::InvalidState);
        assert_eq!(CodegenError::argument("x").kind(), ErrorKind::Argument);
        assert_eq!(ErrorKind::InvalidState.to_string(), "invalid state");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: CodegenError = io.into();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_json_conversion() {
        let err: CodegenError = serde_json::from_str::<u32>("not json").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::Bitcode);
    }
}
