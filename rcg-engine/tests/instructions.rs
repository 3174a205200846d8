//! Comparisons, memory, aggregates and conversions through the interpreter

mod common;

use common::{define, run, unary};
use pretty_assertions::assert_eq;
use rcg_engine::{ExecutionEngine, GenericValue};
use rcg_ir::{Builder, FloatPredicate, IntPredicate, Module, Type, Value};

fn compare_ints(pred: IntPredicate, a: i32, b: i32) -> bool {
    let mut module = Module::new("icmp");
    let i32_ty = module.types.i32();
    let i1 = module.types.i1();
    define(&mut module, "cmp", i1, &[i32_ty, i32_ty], |b, args| {
        let result = b.icmp(pred, args[0], args[1])?;
        b.ret(result)?;
        Ok(())
    });
    run(&module, "cmp", &[a.into(), b.into()]).to_u64() == Some(1)
}

fn compare_floats(pred: FloatPredicate, a: f64, b: f64) -> bool {
    let mut module = Module::new("fcmp");
    let f64_ty = module.types.f64();
    let i1 = module.types.i1();
    define(&mut module, "cmp", i1, &[f64_ty, f64_ty], |b, args| {
        let result = b.fcmp(pred, args[0], args[1])?;
        b.ret(result)?;
        Ok(())
    });
    run(&module, "cmp", &[a.into(), b.into()]).to_u64() == Some(1)
}

#[test]
fn test_integer_comparisons() {
    for (a, b) in [(1, 2), (2, 1), (-1, 1), (3, 3)] {
        let (ua, ub) = (a as u32, b as u32);
        let expected = [
            (IntPredicate::Eq, a == b),
            (IntPredicate::Ne, a != b),
            (IntPredicate::Ugt, ua > ub),
            (IntPredicate::Uge, ua >= ub),
            (IntPredicate::Ult, ua < ub),
            (IntPredicate::Ule, ua <= ub),
            (IntPredicate::Sgt, a > b),
            (IntPredicate::Sge, a >= b),
            (IntPredicate::Slt, a < b),
            (IntPredicate::Sle, a <= b),
        ];
        for (pred, want) in expected {
            assert_eq!(compare_ints(pred, a, b), want, "{pred} {a} {b}");
        }
    }
}

#[test]
fn test_float_comparisons() {
    for (a, b) in [(1.0, 2.0_f64), (2.0, 2.0), (3.0, 2.0), (f64::NAN, 1.0)] {
        let unordered = a.is_nan() || b.is_nan();
        let expected = [
            (FloatPredicate::Oeq, !unordered && a == b),
            (FloatPredicate::Ogt, !unordered && a > b),
            (FloatPredicate::Oge, !unordered && a >= b),
            (FloatPredicate::Olt, !unordered && a < b),
            (FloatPredicate::Ole, !unordered && a <= b),
            (FloatPredicate::One, !unordered && a != b),
            (FloatPredicate::Ord, !unordered),
            (FloatPredicate::Ueq, unordered || a == b),
            (FloatPredicate::Ugt, unordered || a > b),
            (FloatPredicate::Uge, unordered || a >= b),
            (FloatPredicate::Ult, unordered || a < b),
            (FloatPredicate::Ule, unordered || a <= b),
            (FloatPredicate::Une, unordered || a != b),
            (FloatPredicate::Uno, unordered),
        ];
        for (pred, want) in expected {
            assert_eq!(compare_floats(pred, a, b), want, "{pred} {a} {b}");
        }
    }
}

#[test]
fn test_simple_memory() {
    let mut module = Module::new("memory");
    let i32_ty = module.types.i32();
    define(&mut module, "roundtrip", i32_ty, &[i32_ty], |b, args| {
        let slot = b.alloca(i32_ty)?;
        b.store(args[0], slot)?;
        let value = b.load(slot)?;
        b.ret(value)?;
        Ok(())
    });
    assert_eq!(run(&module, "roundtrip", &[42i32.into()]).to_i64(), Some(42));
}

#[test]
fn test_fresh_alloca_reads_zero() {
    let mut module = Module::new("memory");
    let i64_ty = module.types.i64();
    define(&mut module, "zero", i64_ty, &[], |b, _| {
        let slot = b.alloca(i64_ty)?;
        let value = b.load(slot)?;
        b.ret(value)?;
        Ok(())
    });
    assert_eq!(run(&module, "zero", &[]).to_i64(), Some(0));
}

#[test]
fn test_array_alloca_and_gep() {
    let mut module = Module::new("array_memory");
    let i32_ty = module.types.i32();
    define(&mut module, "sum", i32_ty, &[], |b, _| {
        let m = b.module_mut();
        let (zero, one, two) = (m.const_int(i32_ty, 0)?, m.const_int(i32_ty, 1)?, m.const_int(i32_ty, 2)?);
        let cells = b.array_alloca(i32_ty, two)?;
        let first = b.gep(cells, &[zero])?;
        let second = b.gep(cells, &[one])?;
        b.store(one, first)?;
        b.store(two, second)?;
        let a = b.load(first)?;
        let c = b.load(second)?;
        let total = b.add(a, c)?;
        b.ret(total)?;
        Ok(())
    });
    assert_eq!(run(&module, "sum", &[]).to_i64(), Some(3));
}

#[test]
fn test_nested_struct_gep() {
    let mut module = Module::new("struct_memory");
    let i32_ty = module.types.i32();
    let f64_ty = module.types.f64();
    let inner = module.types.struct_type(&[f64_ty, i32_ty], false).unwrap();
    let outer = module.types.struct_type(&[i32_ty, inner], false).unwrap();
    define(&mut module, "nested", f64_ty, &[], |b, _| {
        let m = b.module_mut();
        let zero = m.const_int(i32_ty, 0)?;
        let one = m.const_int(i32_ty, 1)?;
        let value = m.const_float(f64_ty, 5.3)?;
        let record = b.alloca(outer)?;
        let field = b.gep(record, &[zero, one, zero])?;
        b.store(value, field)?;
        let inner_ptr = b.struct_gep(record, 1)?;
        let same_field = b.struct_gep(inner_ptr, 0)?;
        let loaded = b.load(same_field)?;
        b.ret(loaded)?;
        Ok(())
    });
    assert_eq!(run(&module, "nested", &[]).to_f64(), Some(5.3));
}

#[test]
fn test_out_of_bounds_access_traps() {
    let mut module = Module::new("bounds");
    let i32_ty = module.types.i32();
    define(&mut module, "oob", i32_ty, &[i32_ty], |b, args| {
        let slot = b.alloca(i32_ty)?;
        let past = b.gep(slot, &[args[0]])?;
        let value = b.load(past)?;
        b.ret(value)?;
        Ok(())
    });
    module.verify().unwrap();
    let mut engine = common::engine();
    let f = module.function("oob").unwrap();
    assert!(engine.run_function(&module, f, &[0i32.into()]).is_ok());
    assert!(engine.run_function(&module, f, &[1i32.into()]).is_err());
}

#[test]
fn test_struct_values() {
    let mut module = Module::new("aggregates");
    let i32_ty = module.types.i32();
    let pair = module.types.struct_type(&[i32_ty, i32_ty], false).unwrap();
    define(&mut module, "pair_sum", i32_ty, &[i32_ty, i32_ty], |b, args| {
        let empty = b.module_mut().undef(pair)?;
        let half = b.insert_value(empty, args[0], 0)?;
        let full = b.insert_value(half, args[1], 1)?;
        let x = b.extract_value(full, 0)?;
        let y = b.extract_value(full, 1)?;
        let total = b.add(x, y)?;
        b.ret(total)?;
        Ok(())
    });
    assert_eq!(run(&module, "pair_sum", &[2i32.into(), 3i32.into()]).to_i64(), Some(5));
}

#[test]
fn test_mixed_struct_values() {
    let mut module = Module::new("aggregates");
    let i32_ty = module.types.i32();
    let f32_ty = module.types.f32();
    let pair = module.types.struct_type(&[i32_ty, f32_ty], false).unwrap();
    define(&mut module, "mixed_sum", f32_ty, &[i32_ty, f32_ty], |b, args| {
        let empty = b.module_mut().undef(pair)?;
        let half = b.insert_value(empty, args[0], 0)?;
        let full = b.insert_value(half, args[1], 1)?;
        let x = b.extract_value(full, 0)?;
        let y = b.extract_value(full, 1)?;
        let widened = b.sitofp(x, f32_ty)?;
        let total = b.fadd(widened, y)?;
        b.ret(total)?;
        Ok(())
    });
    let result = run(&module, "mixed_sum", &[2i32.into(), 3.0f32.into()]);
    assert_eq!(result.to_f32(), Some(5.0));
}

type TypeOf = fn(&mut Module) -> Type;

/// Run `op` on a single argument converted between two types
fn convert<F>(from: TypeOf, to: TypeOf, arg: GenericValue, op: F) -> GenericValue
where
    F: FnOnce(&mut Builder, Value, Type) -> rcg_common::Result<Value>,
{
    let mut module = Module::new("casts");
    let (from, to) = (from(&mut module), to(&mut module));
    unary(from, to, &mut module, |b, value| op(b, value, to));
    run(&module, "unary", &[arg])
}

fn i1_ty(m: &mut Module) -> Type {
    m.types.i1()
}

fn i8_ty(m: &mut Module) -> Type {
    m.types.i8()
}

fn i16_ty(m: &mut Module) -> Type {
    m.types.i16()
}

fn i32_ty(m: &mut Module) -> Type {
    m.types.i32()
}

fn f32_ty(m: &mut Module) -> Type {
    m.types.f32()
}

fn f64_ty(m: &mut Module) -> Type {
    m.types.f64()
}

#[test]
fn test_integer_conversions() {
    let truncated = convert(i32_ty, i8_ty, 257i32.into(), |b, v, ty| b.trunc(v, ty));
    assert_eq!(truncated.to_i64(), Some(1));

    let bit = convert(i32_ty, i1_ty, 3i32.into(), |b, v, ty| b.trunc(v, ty));
    assert_eq!(bit.to_u64(), Some(1));

    let all_ones = convert(i1_ty, i32_ty, true.into(), |b, v, ty| b.sext(v, ty));
    assert_eq!(all_ones.to_i64(), Some(-1));

    let widened = convert(i8_ty, i16_ty, (-1i8).into(), |b, v, ty| b.sext(v, ty));
    assert_eq!(widened.to_u64(), Some(65535));
    assert_eq!(widened.to_i64(), Some(-1));

    let zero_filled = convert(i8_ty, i16_ty, (-1i8).into(), |b, v, ty| b.zext(v, ty));
    assert_eq!(zero_filled.to_i64(), Some(255));
}

#[test]
fn test_bitcasts() {
    let same = convert(i8_ty, i8_ty, GenericValue::from_uint(255, 8), |b, v, ty| b.bitcast(v, ty));
    assert_eq!(same.to_i64(), Some(-1));
    assert_eq!(same.to_u64(), Some(255));

    let bits = convert(f32_ty, i32_ty, 1.0f32.into(), |b, v, ty| b.bitcast(v, ty));
    assert_eq!(bits.to_u64(), Some(0x3f80_0000));

    let float = convert(i32_ty, f32_ty, GenericValue::from_uint(0x4020_0000, 32), |b, v, ty| b.bitcast(v, ty));
    assert_eq!(float.to_f32(), Some(2.5));
}

#[test]
fn test_float_conversions() {
    let unsigned = convert(f64_ty, i32_ty, 3.7f64.into(), |b, v, ty| b.fptoui(v, ty));
    assert_eq!(unsigned.to_i64(), Some(3));

    let signed = convert(f64_ty, i32_ty, (-3.7f64).into(), |b, v, ty| b.fptosi(v, ty));
    assert_eq!(signed.to_i64(), Some(-3));

    let from_signed = convert(i32_ty, f64_ty, (-3i32).into(), |b, v, ty| b.sitofp(v, ty));
    assert_eq!(from_signed.to_f64(), Some(-3.0));

    let from_unsigned = convert(i8_ty, f64_ty, (-1i8).into(), |b, v, ty| b.uitofp(v, ty));
    assert_eq!(from_unsigned.to_f64(), Some(255.0));

    let extended = convert(f32_ty, f64_ty, 1.5f32.into(), |b, v, ty| b.fpext(v, ty));
    assert_eq!(extended.to_f64(), Some(1.5));

    let narrowed = convert(f64_ty, f32_ty, 1.5f64.into(), |b, v, ty| b.fptrunc(v, ty));
    assert_eq!(narrowed.to_f32(), Some(1.5));
}

#[test]
fn test_cast_helpers_pick_the_opcode() {
    let widened = convert(i8_ty, i32_ty, (-2i8).into(), |b, v, ty| b.int_cast(v, ty, true));
    assert_eq!(widened.to_i64(), Some(-2));

    let unsigned = convert(i8_ty, i32_ty, (-2i8).into(), |b, v, ty| b.int_cast(v, ty, false));
    assert_eq!(unsigned.to_i64(), Some(254));

    let narrowed = convert(f64_ty, f32_ty, 0.25f64.into(), |b, v, ty| b.fp_cast(v, ty));
    assert_eq!(narrowed.to_f32(), Some(0.25));
}
