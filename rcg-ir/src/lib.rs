//! RCG Intermediate Representation
//!
//! Typed, SSA-style IR construction: a module owns every type, value,
//! basic block and function, and hands out small copyable handles to them.
//!
//! ## Architecture
//!
//! The crate is structured as follows:
//! - `types` - Interned type registry (TypeRegistry, Type, TypeData)
//! - `values` - Value arena, constants and globals
//! - `ops` - Binary operators, comparison predicates and conversions
//! - `graph` - Intrusive ordering of instructions and blocks
//! - `instructions` - IR instructions and use/def maintenance
//! - `blocks` - Basic block management
//! - `function` - Function definitions and parameters
//! - `module` - Module, global variables and linkage
//! - `builder` - Cursor-based instruction emission
//! - `verify` - Structural verification
//! - `integrity` - Handle checks for modules loaded from outside
//! - `printer` - Textual IR

// Public exports - clean API surface
pub use self::types::{Type, TypeData, TypeKind, TypeRegistry, TypeDisplay, MAX_INT_BITS};
pub use self::values::{mask, sign_extend, GlobalData, Value, ValueData, ValueKind};
pub use self::ops::{BinaryOp, CastOp, FloatPredicate, IntPredicate};
pub use self::instructions::InstKind;
pub use self::blocks::{Block, BlockData, Instructions};
pub use self::function::{Blocks, Function, FunctionData};
pub use self::module::{Linkage, Module};
pub use self::builder::{Builder, Position};
pub use self::printer::{FunctionDisplay, ModuleDisplay};

// Internal modules
mod types;
mod values;
mod ops;
mod graph;
mod instructions;
mod blocks;
mod function;
mod module;
mod builder;
mod verify;
mod integrity;
mod printer;
