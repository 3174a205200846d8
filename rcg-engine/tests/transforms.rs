//! Passes change the module but never the result of running it

mod common;

use common::{define, run};
use pretty_assertions::assert_eq;
use rcg_engine::{Pass, PassManager};
use rcg_ir::{Builder, IntPredicate, Linkage, Module};

fn run_passes(module: &mut Module, passes: &[Pass]) -> bool {
    let mut manager = PassManager::new();
    for &pass in passes {
        manager.add(pass);
    }
    let changed = manager.run(module).unwrap();
    module.verify().unwrap();
    changed
}

#[test]
fn test_global_dce_keeps_called_internals() {
    let mut module = Module::new("gdce");
    let i32_ty = module.types.i32();
    let fn0 = define(&mut module, "fn0", i32_ty, &[], |b, _| {
        let value = b.module_mut().const_int(i32_ty, 42)?;
        b.ret(value)?;
        Ok(())
    });
    let fn1 = define(&mut module, "fn1", i32_ty, &[], |b, _| {
        let value = b.module_mut().const_int(i32_ty, 7)?;
        b.ret(value)?;
        Ok(())
    });
    module.set_linkage(fn0, Linkage::Internal);
    module.set_linkage(fn1, Linkage::Internal);
    let unused = module.add_global(i32_ty, "unused").unwrap();
    let zero = module.const_int(i32_ty, 0).unwrap();
    module.set_initializer(unused, zero).unwrap();
    module.set_global_linkage(unused, Linkage::Private).unwrap();
    define(&mut module, "main", i32_ty, &[], |b, _| {
        let value = b.call(fn0, &[])?;
        b.ret(value)?;
        Ok(())
    });

    assert!(run_passes(&mut module, &[Pass::GlobalDce]));
    assert!(module.function("fn0").is_some());
    assert!(module.function("fn1").is_none());
    assert!(module.global("unused").is_none());
    assert_eq!(run(&module, "main", &[]).to_i64(), Some(42));

    assert!(!run_passes(&mut module, &[Pass::GlobalDce]));
}

#[test]
fn test_dce_removes_unused_arithmetic() {
    let mut module = Module::new("dce");
    let i32_ty = module.types.i32();
    let f = define(&mut module, "double", i32_ty, &[i32_ty], |b, args| {
        let unused = b.mul(args[0], args[0])?;
        b.add(unused, args[0])?;
        let result = b.add(args[0], args[0])?;
        b.ret(result)?;
        Ok(())
    });
    let entry = module.entry_block(f).unwrap();
    assert_eq!(module.instruction_count(entry), 4);

    assert!(run_passes(&mut module, &[Pass::Dce]));
    assert_eq!(module.instruction_count(entry), 2);
    assert_eq!(run(&module, "double", &[21i32.into()]).to_i64(), Some(42));
}

#[test]
fn test_dce_keeps_stores_and_calls() {
    let mut module = Module::new("effects");
    let void = module.types.void();
    let i32_ty = module.types.i32();
    let callee = define(&mut module, "noop", void, &[], |b, _| {
        b.ret_void()?;
        Ok(())
    });
    let f = define(&mut module, "effects", i32_ty, &[i32_ty], |b, args| {
        let slot = b.alloca(i32_ty)?;
        b.store(args[0], slot)?;
        b.call(callee, &[])?;
        let value = b.load(slot)?;
        b.ret(value)?;
        Ok(())
    });

    assert!(!run_passes(&mut module, &[Pass::Dce]));
    let entry = module.entry_block(f).unwrap();
    assert_eq!(module.instruction_count(entry), 5);
}

#[test]
fn test_unreachable_blocks_and_their_phi_entries_are_removed() {
    let mut module = Module::new("unreachable");
    let i32_ty = module.types.i32();
    let f = module.declare_function("pick", i32_ty, &[i32_ty], false).unwrap();
    let x = module.params(f)[0];
    let entry = module.append_block(f, "entry");
    let orphan = module.append_block(f, "orphan");
    let exit = module.append_block(f, "exit");

    let mut b = Builder::new(&mut module);
    b.build(entry, |b| b.br(exit)).unwrap();
    let seven = b.module_mut().const_int(i32_ty, 7).unwrap();
    b.build(orphan, |b| b.br(exit)).unwrap();
    b.build(exit, |b| {
        let merged = b.phi(i32_ty, &[(entry, x), (orphan, seven)])?;
        b.ret(merged)
    })
    .unwrap();

    assert!(run_passes(&mut module, &[Pass::UnreachableBlockElim]));
    assert_eq!(module.block_count(f), 2);
    let phi = module.first_instruction(exit).unwrap();
    assert_eq!(module.operands(phi), vec![x]);
    assert_eq!(run(&module, "pick", &[3i32.into()]).to_i64(), Some(3));
}

#[test]
fn test_constant_propagation_folds_arithmetic() {
    let mut module = Module::new("constprop");
    let i32_ty = module.types.i32();
    let f = module.declare_function("folded", i32_ty, &[], false).unwrap();
    let entry = module.append_block(f, "entry");
    let yes = module.append_block(f, "yes");
    let no = module.append_block(f, "no");

    let mut b = Builder::new(&mut module);
    b.build(entry, |b| {
        let m = b.module_mut();
        let two = m.const_int(i32_ty, 2)?;
        let three = m.const_int(i32_ty, 3)?;
        let ten = m.const_int(i32_ty, 10)?;
        let product = b.mul(two, three)?;
        let total = b.add(product, ten)?;
        let big = b.icmp(IntPredicate::Sgt, total, ten)?;
        b.cond_br(big, yes, no)
    })
    .unwrap();
    b.build(yes, |b| {
        let one = b.module_mut().const_int(i32_ty, 1)?;
        b.ret(one)
    })
    .unwrap();
    b.build(no, |b| {
        let zero = b.module_mut().const_int(i32_ty, 0)?;
        b.ret(zero)
    })
    .unwrap();

    assert_eq!(run(&module, "folded", &[]).to_i64(), Some(1));
    assert!(run_passes(&mut module, &[Pass::ConstProp]));
    assert_eq!(module.instruction_count(entry), 1);
    assert_eq!(run(&module, "folded", &[]).to_i64(), Some(1));
}

#[test]
fn test_division_by_zero_is_not_folded() {
    let mut module = Module::new("trap");
    let i32_ty = module.types.i32();
    let f = define(&mut module, "trap", i32_ty, &[], |b, _| {
        let m = b.module_mut();
        let one = m.const_int(i32_ty, 1)?;
        let zero = m.const_int(i32_ty, 0)?;
        let quotient = b.sdiv(one, zero)?;
        b.ret(quotient)?;
        Ok(())
    });

    assert!(!run_passes(&mut module, &[Pass::ConstProp, Pass::Dce]));
    let entry = module.entry_block(f).unwrap();
    assert_eq!(module.instruction_count(entry), 2);
}
