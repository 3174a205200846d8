//! Building whole functions through the public API

use pretty_assertions::assert_eq;
use rcg_common::{CodegenError, ErrorKind};
use rcg_ir::{Block, Builder, IntPredicate, Linkage, Module, Value};

fn linked_blocks(module: &Module, first: Option<Block>) -> Vec<Block> {
    std::iter::successors(first, |&block| module.next_block(block)).collect()
}

fn linked_instructions(module: &Module, block: Block) -> Vec<Value> {
    std::iter::successors(module.first_instruction(block), |&inst| module.next_instruction(inst)).collect()
}

#[test]
fn test_enumeration_matches_links() {
    let mut module = Module::new("order");
    let i32_ty = module.types.i32();
    let f = module.declare_function("f", i32_ty, &[i32_ty], false).unwrap();
    let x = module.param(f, 0).unwrap();
    let blocks: Vec<Block> = ["a", "b", "c", "d"].iter().map(|name| module.append_block(f, name)).collect();

    let mut builder = Builder::new(&mut module);
    for pair in blocks.windows(2) {
        builder
            .build(pair[0], |b| {
                let doubled = b.add(x, x)?;
                b.mul(doubled, x)?;
                b.br(pair[1])
            })
            .unwrap();
    }
    builder.build(blocks[3], |b| b.ret(x)).unwrap();

    assert_eq!(module.blocks(f).collect::<Vec<_>>(), blocks);
    assert_eq!(linked_blocks(&module, module.first_block(f)), blocks);
    assert_eq!(module.entry_block(f), Some(blocks[0]));
    assert_eq!(module.last_block(f), Some(blocks[3]));
    assert_eq!(module.previous_block(blocks[0]), None);

    for &block in &blocks {
        let listed: Vec<Value> = module.instructions(block).collect();
        assert_eq!(listed, linked_instructions(&module, block));
        assert_eq!(module.last_instruction(block), listed.last().copied());
        assert_eq!(module.terminator(block), listed.last().copied());
    }

    // traversals restart from the first element
    let first_pass: Vec<Block> = module.blocks(f).collect();
    let second_pass: Vec<Block> = module.blocks(f).collect();
    assert_eq!(first_pass, second_pass);
    module.verify().unwrap();
}

#[test]
fn test_max_with_phi() {
    let mut module = Module::new("max");
    let i32_ty = module.types.i32();
    let max = module.declare_function("max", i32_ty, &[i32_ty, i32_ty], false).unwrap();
    module.set_param_names(max, &["a", "b"]);
    let (a, b) = (module.param(max, 0).unwrap(), module.param(max, -1).unwrap());
    let entry = module.append_block(max, "entry");
    let left = module.append_block(max, "left");
    let right = module.append_block(max, "right");
    let exit = module.append_block(max, "exit");

    let mut builder = Builder::new(&mut module);
    builder
        .build(entry, |bld| {
            let greater = bld.icmp(IntPredicate::Sgt, a, b)?;
            bld.cond_br(greater, left, right)
        })
        .unwrap();
    builder.build(left, |bld| bld.br(exit)).unwrap();
    builder.build(right, |bld| bld.br(exit)).unwrap();
    let result = builder
        .build(exit, |bld| {
            let result = bld.phi(i32_ty, &[(right, b), (left, a)])?;
            bld.ret(result)?;
            Ok::<_, rcg_common::CodegenError>(result)
        })
        .unwrap();
    assert_eq!(builder.insert_block(), None);

    module.verify().unwrap();
    assert_eq!(module.successors(entry), vec![left, right]);
    assert_eq!(module.operands(result), vec![b, a]);
    assert_eq!(module.instruction_parent(result), Some(exit));
    assert_eq!(module.users(a).len(), 2);

    let text = module.display().to_string();
    assert!(text.contains("define i32 @max(i32 %a, i32 %b) {"));
    assert!(text.contains("br i1"));
}

#[test]
fn test_library_declarations_are_shared() {
    let mut module = Module::new("libc");
    let i8_ty = module.types.i8();
    let i32_ty = module.types.i32();
    let i64_ty = module.types.i64();
    let string = module.types.pointer(i8_ty);

    let puts = module.declare_function("puts", i32_ty, &[string], false).unwrap();
    let again = module.declare_function("puts", i32_ty, &[string], false).unwrap();
    assert_eq!(puts, again);
    assert!(module.is_declaration(puts));

    let err = module.declare_function("puts", i64_ty, &[string], false).unwrap_err();
    assert!(matches!(err, CodegenError::TypeConflict { .. }));
    assert_eq!(err.kind(), ErrorKind::Type);

    let printf = module.declare_function("printf", i32_ty, &[string], true).unwrap();
    let main = module.declare_function("main", i32_ty, &[], false).unwrap();
    let entry = module.append_block(main, "entry");
    let message = module.global_string("message", "hello").unwrap();
    let zero = module.const_int(i32_ty, 0).unwrap();

    Builder::new(&mut module)
        .build(entry, |b| {
            let first = b.gep(message, &[zero, zero])?;
            b.call(puts, &[first])?;
            let extra = b.module_mut().const_int(i64_ty, 7)?;
            b.call(printf, &[first, extra])?;
            b.ret(zero)
        })
        .unwrap();

    module.verify().unwrap();
    assert_eq!(module.callers(puts), vec![main]);
    assert_eq!(module.global_linkage(message).unwrap(), Linkage::Internal);
    let text = module.display().to_string();
    assert!(text.contains("declare i32 @puts(i8*)"));
    assert!(text.contains("declare i32 @printf(i8*, ...)"));
}
