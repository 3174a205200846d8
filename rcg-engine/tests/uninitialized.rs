//! Engine creation in a process where no target was ever initialized.
//! Kept in its own test binary: every other suite initializes the target.

use pretty_assertions::assert_eq;
use rcg_common::ErrorKind;
use rcg_engine::{target, EngineOptions, Interpreter};

#[test]
fn test_engine_needs_target_init() {
    assert!(target::initialized().is_none());

    let err = Interpreter::new().err().map(|err| err.kind());
    assert_eq!(err, Some(ErrorKind::InvalidState));
    let err = Interpreter::with_options(EngineOptions::default()).err().map(|err| err.kind());
    assert_eq!(err, Some(ErrorKind::InvalidState));
}
