//! Whole-module behaviour: bitcode, externals and return precision

mod common;

use common::{define, engine, run};
use pretty_assertions::assert_eq;
use rcg_common::ErrorKind;
use rcg_engine::{bitcode, read_bitcode, target, write_bitcode, ExecutionEngine, GenericValue, Interpreter};
use rcg_ir::{IntPredicate, Linkage, Module};

fn sample_module() -> Module {
    let mut module = Module::new("sample");
    let i32_ty = module.types.i32();
    let f64_ty = module.types.f64();
    let sin = module.declare_function("sin", f64_ty, &[f64_ty], false).unwrap();
    define(&mut module, "max", i32_ty, &[i32_ty, i32_ty], |b, args| {
        let greater = b.icmp(IntPredicate::Sgt, args[0], args[1])?;
        let result = b.select(greater, args[0], args[1])?;
        b.ret(result)?;
        Ok(())
    });
    let helper = define(&mut module, "helper", f64_ty, &[f64_ty], |b, args| {
        let result = b.call(sin, &[args[0]])?;
        b.ret(result)?;
        Ok(())
    });
    module.set_linkage(helper, Linkage::Internal);
    module
}

#[test]
fn test_bitcode_round_trip() {
    let module = sample_module();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.bc");
    write_bitcode(&module, &path).unwrap();

    let loaded = read_bitcode(&path).unwrap();
    assert_eq!(loaded.name(), "sample");
    let names: Vec<&str> = loaded.functions().map(|f| loaded.function_name(f)).collect();
    assert_eq!(names, vec!["sin", "max", "helper"]);

    let helper = loaded.function("helper").unwrap();
    assert_eq!(loaded.linkage(helper), Linkage::Internal);
    assert_eq!(loaded.display().to_string(), module.display().to_string());

    let result = run(&loaded, "max", &[3i32.into(), 9i32.into()]);
    assert_eq!(result.to_i64(), Some(9));
    let result = run(&loaded, "helper", &[0.0f64.into()]);
    assert_eq!(result.to_f64(), Some(0.0));
}

#[test]
fn test_corrupt_bitcode_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.bc");
    std::fs::write(&path, b"{\"magic\":\"RCGBC\",\"version\":1}").unwrap();
    assert_eq!(read_bitcode(&path).unwrap_err().kind(), ErrorKind::Bitcode);

    let bytes = bitcode::to_bytes(&sample_module()).unwrap();
    assert_eq!(bitcode::from_bytes(&bytes[..bytes.len() / 2]).unwrap_err().kind(), ErrorKind::Bitcode);
}

#[test]
fn test_running_an_external_declaration_directly() {
    let module = sample_module();
    let sin = module.function("sin").unwrap();
    let result = engine().run_function(&module, sin, &[std::f64::consts::FRAC_PI_2.into()]).unwrap();
    assert!((result.to_f64().unwrap() - 1.0).abs() < 1e-12);
}

#[test]
fn test_float_and_double_returns() {
    let mut module = Module::new("precision");
    let f32_ty = module.types.f32();
    let f64_ty = module.types.f64();
    define(&mut module, "float", f32_ty, &[], |b, _| {
        let value = b.module_mut().const_float(f32_ty, 1.5)?;
        b.ret(value)?;
        Ok(())
    });
    define(&mut module, "double", f64_ty, &[], |b, _| {
        let value = b.module_mut().const_float(f64_ty, 1.6)?;
        b.ret(value)?;
        Ok(())
    });

    let float = run(&module, "float", &[]);
    assert_eq!(float, GenericValue::Float(1.5));
    let double = run(&module, "double", &[]);
    assert_eq!(double.to_f64(), Some(1.6));
    assert_eq!(double.to_f32(), None);
}

#[test]
fn test_engine_needs_initialized_target() {
    target::init(rcg_engine::Arch::X86_64).unwrap();
    assert!(Interpreter::new().is_ok());
    assert_eq!(target::init_named("vax").unwrap_err().kind(), ErrorKind::Argument);
    assert_eq!(target::initialized(), Some(rcg_engine::Arch::X86_64));
}

#[test]
fn test_missing_function_is_an_argument_error() {
    let module = sample_module();
    let err = engine().run_named(&module, "nope", &[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Argument);
}
