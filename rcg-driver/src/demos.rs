//! Bundled demo programs
//!
//! Each demo builds a small module through the public builder API. The
//! driver prints, optimizes, runs and serializes them.

use rcg_common::{CodegenError, Result};
use rcg_ir::{Builder, IntPredicate, Linkage, Module};

pub struct Demo {
    pub name: &'static str,
    pub description: &'static str,
    build: fn(&mut Module) -> Result<()>,
}

impl Demo {
    /// Build and verify a fresh module for this demo
    pub fn module(&self) -> Result<Module> {
        let mut module = Module::new(self.name);
        (self.build)(&mut module)?;
        module.verify()?;
        Ok(module)
    }
}

pub const DEMOS: &[Demo] = &[
    Demo { name: "max", description: "max(i32, i32) with a diamond and a phi", build: build_max },
    Demo { name: "arith", description: "integer and floating point arithmetic, sqrt through an external", build: build_arith },
    Demo { name: "fib", description: "iterative fibonacci loop over back-edge phis", build: build_fib },
    Demo { name: "factorial", description: "recursive i64 factorial", build: build_factorial },
    Demo { name: "struct-sum", description: "stack struct written and read through struct_gep", build: build_struct_sum },
];

pub fn find(name: &str) -> Result<&'static Demo> {
    DEMOS.iter().find(|demo| demo.name == name).ok_or_else(|| {
        let known: Vec<&str> = DEMOS.iter().map(|demo| demo.name).collect();
        CodegenError::argument(format!("unknown demo '{name}' (available: {})", known.join(", ")))
    })
}

fn build_max(module: &mut Module) -> Result<()> {
    let i32_ty = module.types.i32();
    let max = module.declare_function("max", i32_ty, &[i32_ty, i32_ty], false)?;
    module.set_param_names(max, &["a", "b"]);
    let (a, b) = (module.params(max)[0], module.params(max)[1]);
    let entry = module.append_block(max, "entry");
    let left = module.append_block(max, "left");
    let right = module.append_block(max, "right");
    let exit = module.append_block(max, "exit");

    let mut builder = Builder::new(module);
    builder.build(entry, |bld| {
        let greater = bld.icmp(IntPredicate::Sgt, a, b)?;
        bld.named(greater, "greater")?;
        bld.cond_br(greater, left, right)
    })?;
    builder.build(left, |bld| bld.br(exit))?;
    builder.build(right, |bld| bld.br(exit))?;
    builder.build(exit, |bld| {
        let result = bld.phi(i32_ty, &[(left, a), (right, b)])?;
        bld.named(result, "result")?;
        bld.ret(result)
    })?;
    Ok(())
}

fn build_arith(module: &mut Module) -> Result<()> {
    let i32_ty = module.types.i32();
    let f64_ty = module.types.f64();

    // (x + y) * (x - y) / 2
    let arith = module.declare_function("arith", i32_ty, &[i32_ty, i32_ty], false)?;
    module.set_param_names(arith, &["x", "y"]);
    let (x, y) = (module.params(arith)[0], module.params(arith)[1]);
    let entry = module.append_block(arith, "entry");
    Builder::new(module).build(entry, |bld| {
        let two = bld.module_mut().const_int(i32_ty, 2)?;
        let sum = bld.add(x, y)?;
        let difference = bld.sub(x, y)?;
        let product = bld.mul(sum, difference)?;
        let result = bld.sdiv(product, two)?;
        bld.ret(result)
    })?;

    let sqrt = module.declare_function("sqrt", f64_ty, &[f64_ty], false)?;
    let norm = module.declare_function("norm", f64_ty, &[f64_ty, f64_ty], false)?;
    module.set_param_names(norm, &["x", "y"]);
    let (x, y) = (module.params(norm)[0], module.params(norm)[1]);
    let entry = module.append_block(norm, "entry");
    Builder::new(module).build(entry, |bld| {
        let xx = bld.fmul(x, x)?;
        let yy = bld.fmul(y, y)?;
        let sum = bld.fadd(xx, yy)?;
        let root = bld.call(sqrt, &[sum])?;
        bld.ret(root)
    })?;
    Ok(())
}

fn build_fib(module: &mut Module) -> Result<()> {
    let i32_ty = module.types.i32();
    let fib = module.declare_function("fib", i32_ty, &[i32_ty], false)?;
    module.set_param_names(fib, &["n"]);
    let n = module.params(fib)[0];
    let entry = module.append_block(fib, "entry");
    let header = module.append_block(fib, "loop");
    let body = module.append_block(fib, "body");
    let exit = module.append_block(fib, "exit");

    let zero = module.const_int(i32_ty, 0)?;
    let one = module.const_int(i32_ty, 1)?;
    let mut builder = Builder::new(module);
    builder.build(entry, |bld| bld.br(header))?;
    let (i, current, next) = builder.build(header, |bld| {
        let i = bld.phi(i32_ty, &[(entry, zero)])?;
        let current = bld.phi(i32_ty, &[(entry, zero)])?;
        let next = bld.phi(i32_ty, &[(entry, one)])?;
        let done = bld.icmp(IntPredicate::Sge, i, n)?;
        bld.cond_br(done, exit, body)?;
        Ok::<_, CodegenError>((i, current, next))
    })?;
    builder.build(body, |bld| {
        let following = bld.add(current, next)?;
        let step = bld.add(i, one)?;
        bld.add_incoming(i, body, step)?;
        bld.add_incoming(current, body, next)?;
        bld.add_incoming(next, body, following)?;
        bld.br(header)
    })?;
    builder.build(exit, |bld| bld.ret(current))?;
    Ok(())
}

fn build_factorial(module: &mut Module) -> Result<()> {
    let i64_ty = module.types.i64();
    let factorial = module.declare_function("factorial", i64_ty, &[i64_ty], false)?;
    module.set_param_names(factorial, &["n"]);
    let n = module.params(factorial)[0];
    let entry = module.append_block(factorial, "entry");
    let base = module.append_block(factorial, "base");
    let recurse = module.append_block(factorial, "recurse");

    let one = module.const_int(i64_ty, 1)?;
    let mut builder = Builder::new(module);
    builder.build(entry, |bld| {
        let small = bld.icmp(IntPredicate::Sle, n, one)?;
        bld.cond_br(small, base, recurse)
    })?;
    builder.build(base, |bld| bld.ret(one))?;
    builder.build(recurse, |bld| {
        let smaller = bld.sub(n, one)?;
        let partial = bld.call(factorial, &[smaller])?;
        let result = bld.mul(n, partial)?;
        bld.ret(result)
    })?;
    Ok(())
}

fn build_struct_sum(module: &mut Module) -> Result<()> {
    let i32_ty = module.types.i32();
    let f64_ty = module.types.f64();
    let pair = module.types.named_struct("pair", &[i32_ty, f64_ty], false)?;

    let sum = module.declare_function("pair_sum", f64_ty, &[i32_ty, f64_ty], false)?;
    module.set_param_names(sum, &["count", "scale"]);
    let (count, scale) = (module.params(sum)[0], module.params(sum)[1]);
    let entry = module.append_block(sum, "entry");
    Builder::new(module).build(entry, |bld| {
        let slot = bld.alloca(pair)?;
        let count_field = bld.struct_gep(slot, 0)?;
        bld.store(count, count_field)?;
        let scale_field = bld.struct_gep(slot, 1)?;
        bld.store(scale, scale_field)?;

        let stored_count = bld.load(count_field)?;
        let stored_scale = bld.load(scale_field)?;
        let widened = bld.sitofp(stored_count, f64_ty)?;
        let result = bld.fadd(widened, stored_scale)?;
        bld.ret(result)
    })?;

    let total = module.add_global(i32_ty, "pair_total")?;
    let zero = module.const_int(i32_ty, 0)?;
    module.set_initializer(total, zero)?;
    module.set_global_linkage(total, Linkage::Internal)?;
    Ok(())
}
