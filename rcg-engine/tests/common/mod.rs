//! Helpers shared by the engine integration tests
#![allow(dead_code)]

use rcg_common::Result;
use rcg_engine::{target, Arch, ExecutionEngine, GenericValue, Interpreter};
use rcg_ir::{Builder, Function, Module, Type, Value};

pub fn engine() -> Interpreter {
    target::init(Arch::X86_64).unwrap();
    Interpreter::new().unwrap()
}

/// Verify `module`, then run `name` on a fresh engine
pub fn run(module: &Module, name: &str, args: &[GenericValue]) -> GenericValue {
    module.verify().unwrap();
    engine().run_named(module, name, args).unwrap()
}

/// Define a single-block function whose body is emitted by `body`
pub fn define<F>(module: &mut Module, name: &str, ret: Type, params: &[Type], body: F) -> Function
where
    F: FnOnce(&mut Builder, &[Value]) -> Result<()>,
{
    let function = module.declare_function(name, ret, params, false).unwrap();
    let args = module.params(function).to_vec();
    let entry = module.append_block(function, "entry");
    Builder::new(module).build(entry, |b| body(b, &args)).unwrap();
    function
}

/// `ret (op a)` for a function of one parameter
pub fn unary<F>(from: Type, to: Type, module: &mut Module, op: F) -> Function
where
    F: FnOnce(&mut Builder, Value) -> Result<Value>,
{
    define(module, "unary", to, &[from], |b, args| {
        let result = op(b, args[0])?;
        b.ret(result)?;
        Ok(())
    })
}
