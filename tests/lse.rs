//! Load-store elimination integration scenarios.

use dexmir::{
    bytecode::{CodeAssembler, FieldDesc, MethodDesc},
    mir::{GraphBuilder, MirGraph, Op, PrimType},
    opt::LsePass,
    ssa::build_ssa,
};

fn int_field(asm: &mut CodeAssembler, offset: u32) -> u16 {
    asm.add_field(FieldDesc {
        offset,
        class_def_index: 1,
        ty: PrimType::Int,
        is_volatile: false,
        requires_class_init: false,
    })
}

fn optimized(asm: CodeAssembler) -> (MirGraph, bool) {
    let body = asm.finish().expect("assembly failed");
    let mut graph = GraphBuilder::build(&body, true).expect("build failed");
    build_ssa(&mut graph).expect("ssa failed");
    let changed = LsePass::run(&mut graph, &body.fields);
    graph.check_consistency().expect("inconsistent graph");
    (graph, changed)
}

fn count_ops(graph: &MirGraph, pred: impl Fn(&Op) -> bool) -> usize {
    graph
        .live_instrs()
        .filter(|&i| pred(&graph.instr(i).op))
        .count()
}

/// A field read following a field write of the same value on a singleton
/// allocation is replaced by that value, the write whose value equals the
/// tracked value is deleted, and the allocation itself disappears.
#[test]
fn singleton_roundtrip_fully_eliminated() {
    let mut asm = CodeAssembler::new(3, 1);
    asm.param_types(&[PrimType::Int]);
    let f = int_field(&mut asm, 8);
    asm.new_instance(0, 4)
        .unwrap()
        .iput(2, 0, f)
        .unwrap()
        .iget(1, 0, f)
        .unwrap()
        .return_val(1)
        .unwrap();
    let (graph, changed) = optimized(asm);

    assert!(changed);
    assert_eq!(count_ops(&graph, |op| matches!(op, Op::FieldGet { .. })), 0);
    assert_eq!(count_ops(&graph, |op| matches!(op, Op::FieldSet { .. })), 0);
    assert_eq!(
        count_ops(&graph, |op| matches!(op, Op::NewInstance { .. })),
        0
    );

    // The method now returns its own parameter.
    let ret = graph
        .live_instrs()
        .find(|&i| matches!(graph.instr(i).op, Op::Return { value: Some(_) }))
        .unwrap();
    let Op::Return { value: Some(v) } = graph.instr(ret).op else {
        unreachable!()
    };
    assert!(matches!(graph.instr(v).op, Op::Param { index: 0 }));
}

/// Any method call invalidates all non-singleton locations: a read after
/// the call must not be elided.
#[test]
fn post_call_read_survives() {
    let mut asm = CodeAssembler::new(4, 1);
    asm.param_types(&[PrimType::Ref]);
    let f = int_field(&mut asm, 8);
    let callee = asm.add_method(MethodDesc {
        return_type: PrimType::Void,
        class_def_index: 0,
    });
    asm.const4(0, 7)
        .unwrap()
        .iput(0, 3, f)
        .unwrap()
        .invoke_static(callee, &[])
        .unwrap()
        .iget(1, 3, f)
        .unwrap()
        .return_val(1)
        .unwrap();
    let (graph, _) = optimized(asm);

    assert_eq!(
        count_ops(&graph, |op| matches!(op, Op::FieldGet { .. })),
        1,
        "the read after the call must stay"
    );
}

/// Without an intervening call the read folds to the stored value even on
/// a non-singleton (parameter) reference.
#[test]
fn read_after_write_on_parameter_folds() {
    let mut asm = CodeAssembler::new(4, 1);
    asm.param_types(&[PrimType::Ref]);
    let f = int_field(&mut asm, 8);
    asm.const4(0, 7)
        .unwrap()
        .iput(0, 3, f)
        .unwrap()
        .iget(1, 3, f)
        .unwrap()
        .return_val(1)
        .unwrap();
    let (graph, changed) = optimized(asm);

    assert!(changed);
    assert_eq!(count_ops(&graph, |op| matches!(op, Op::FieldGet { .. })), 0);
}

/// A write into one field must not invalidate the tracked value of a
/// different field (different offsets never alias).
#[test]
fn distinct_fields_do_not_interfere() {
    let mut asm = CodeAssembler::new(4, 1);
    asm.param_types(&[PrimType::Ref]);
    let f = int_field(&mut asm, 8);
    let g = int_field(&mut asm, 12);
    asm.const4(0, 7)
        .unwrap()
        .iput(0, 3, f)
        .unwrap()
        .iput(0, 3, g)
        .unwrap()
        .iget(1, 3, f)
        .unwrap()
        .return_val(1)
        .unwrap();
    let (graph, _) = optimized(asm);

    assert_eq!(
        count_ops(&graph, |op| matches!(op, Op::FieldGet { .. })),
        0,
        "the write to the second field cannot kill the first"
    );
}

/// Writes through a second, possibly aliasing reference of the same
/// declared class invalidate the tracked value.
#[test]
fn aliasing_reference_kills_value() {
    let mut asm = CodeAssembler::new(5, 2);
    asm.param_types(&[PrimType::Ref, PrimType::Ref]);
    let f = int_field(&mut asm, 8);
    asm.const4(0, 7)
        .unwrap()
        .const4(1, 9)
        .unwrap()
        .iput(0, 3, f)
        .unwrap()
        .iput(1, 4, f)
        .unwrap()
        .iget(2, 3, f)
        .unwrap()
        .return_val(2)
        .unwrap();
    let (graph, _) = optimized(asm);

    assert_eq!(
        count_ops(&graph, |op| matches!(op, Op::FieldGet { .. })),
        1,
        "a may-aliasing write must kill the tracked value"
    );
}

/// A value stored in a loop that writes heap memory is invalidated at
/// the loop header; reads inside the loop stay.
#[test]
fn loop_store_invalidates_header_value() {
    let mut asm = CodeAssembler::new(5, 2);
    asm.param_types(&[PrimType::Ref, PrimType::Int]);
    let f = int_field(&mut asm, 8);
    asm.const4(0, 0)
        .unwrap()
        .iput(0, 3, f)
        .unwrap()
        .label("loop")
        .unwrap()
        .iget(1, 3, f)
        .unwrap()
        .add_int_lit8(1, 1, 1)
        .unwrap()
        .iput(1, 3, f)
        .unwrap()
        .add_int_lit8(0, 0, 1)
        .unwrap()
        .if_lt(0, 4, "loop")
        .unwrap()
        .return_val(1)
        .unwrap();
    let (graph, _) = optimized(asm);

    assert_eq!(
        count_ops(&graph, |op| matches!(op, Op::FieldGet { .. })),
        1,
        "the loop-carried read must survive the header invalidation"
    );
}
