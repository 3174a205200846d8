//! RCG Engine
//!
//! The services a built module is handed to: process-wide target setup,
//! boxed values for calls across the engine boundary, an interpreter that
//! executes functions, a pass manager and the bitcode reader and writer.
//!
//! ## Architecture
//!
//! - `target` - One-time target selection
//! - `generic_value` - Boxed scalars (GenericValue)
//! - `memory` - Runtime values and typed allocations
//! - `eval` - Integer and float arithmetic shared with constant folding
//! - `externals` - Host functions reachable from declarations
//! - `interpreter` - ExecutionEngine trait and the Interpreter
//! - `passes` - Pass and PassManager
//! - `bitcode` - Module serialization

pub mod target;
pub mod bitcode;

mod generic_value;
mod memory;
mod eval;
mod externals;
mod interpreter;
mod passes;

pub use self::generic_value::GenericValue;
pub use self::externals::{ExternalFn, Externals};
pub use self::interpreter::{EngineOptions, ExecutionEngine, Interpreter};
pub use self::passes::{Pass, PassManager};
pub use self::target::Arch;
pub use self::bitcode::{read_bitcode, write_bitcode};
