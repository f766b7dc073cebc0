//! Bounds-check elimination integration scenarios.
//!
//! Each test assembles real bytecode, builds the graph, converts to SSA,
//! runs value numbering (to unify redundant `array.length` reads), then
//! bounds-check elimination, and asserts exactly which checks survive.

use dexmir::{
    bytecode::CodeAssembler,
    mir::{GraphBuilder, MirGraph, Op, PrimType},
    opt::{BcePass, GvnPass},
    ssa::build_ssa,
};

fn optimized(asm: CodeAssembler) -> MirGraph {
    let body = asm.finish().expect("assembly failed");
    let mut graph = GraphBuilder::build(&body, true).expect("build failed");
    build_ssa(&mut graph).expect("ssa failed");
    GvnPass::run(&mut graph);
    BcePass::run(&mut graph);
    graph.check_consistency().expect("inconsistent graph");
    graph
}

fn bounds_checks(graph: &MirGraph) -> usize {
    graph
        .live_instrs()
        .filter(|&i| matches!(graph.instr(i).op, Op::BoundsCheck { .. }))
        .count()
}

/// `for (int i = 0; i < array.length; i++) array[i] = 10;`
///
/// The induction variable's monotonic range narrows against the loop
/// condition (constant initial value, provably no overflow), so the check
/// is removed.
#[test]
fn counting_loop_check_removed() {
    let mut asm = CodeAssembler::new(4, 1);
    asm.param_types(&[PrimType::Ref]);
    asm.const4(0, 0)
        .unwrap()
        .const4(2, 10)
        .unwrap()
        .label("loop")
        .unwrap()
        .array_length(1, 3)
        .unwrap()
        .if_ge(0, 1, "done")
        .unwrap()
        .aput(2, 3, 0)
        .unwrap()
        .add_int_lit8(0, 0, 1)
        .unwrap()
        .goto("loop")
        .unwrap()
        .label("done")
        .unwrap()
        .return_void()
        .unwrap();
    let graph = optimized(asm);

    assert_eq!(bounds_checks(&graph), 0, "loop check should be removed");
}

/// The same loop with `i` initialized to `-1`: the lower bound cannot be
/// proven non-negative, so the check stays.
#[test]
fn loop_from_minus_one_check_kept() {
    let mut asm = CodeAssembler::new(4, 1);
    asm.param_types(&[PrimType::Ref]);
    asm.const4(0, -1)
        .unwrap()
        .const4(2, 10)
        .unwrap()
        .label("loop")
        .unwrap()
        .array_length(1, 3)
        .unwrap()
        .if_ge(0, 1, "done")
        .unwrap()
        .aput(2, 3, 0)
        .unwrap()
        .add_int_lit8(0, 0, 1)
        .unwrap()
        .goto("loop")
        .unwrap()
        .label("done")
        .unwrap()
        .return_void()
        .unwrap();
    let graph = optimized(asm);

    assert_eq!(bounds_checks(&graph), 1, "negative start must keep check");
}

/// `array[5] = 1; array[4] = 1;` - the first check establishes
/// `length >= 6`, which proves index 4 in range for the second.
#[test]
fn sequential_constant_indices() {
    let mut asm = CodeAssembler::new(4, 1);
    asm.param_types(&[PrimType::Ref]);
    asm.const4(0, 5)
        .unwrap()
        .const4(1, 4)
        .unwrap()
        .const4(2, 1)
        .unwrap()
        .aput(2, 3, 0)
        .unwrap()
        .aput(2, 3, 1)
        .unwrap()
        .return_void()
        .unwrap();
    let graph = optimized(asm);

    assert_eq!(
        bounds_checks(&graph),
        1,
        "first check stays, second is implied by length >= 6"
    );
}

/// Constant indices in ascending order prove nothing: `array[4]` only
/// establishes `length >= 5`, which says nothing about index 5.
#[test]
fn ascending_constant_indices_keep_both() {
    let mut asm = CodeAssembler::new(4, 1);
    asm.param_types(&[PrimType::Ref]);
    asm.const4(0, 4)
        .unwrap()
        .const4(1, 5)
        .unwrap()
        .const4(2, 1)
        .unwrap()
        .aput(2, 3, 0)
        .unwrap()
        .aput(2, 3, 1)
        .unwrap()
        .return_void()
        .unwrap();
    let graph = optimized(asm);

    assert_eq!(bounds_checks(&graph), 2);
}

/// Three-way `if (i < 0) / else if (i >= length) / else` guard: only the
/// access in the fully narrowed `else` branch is eliminated; the two
/// defensive accesses keep their checks.
#[test]
fn three_way_guard_eliminates_only_narrowed_branch() {
    let mut asm = CodeAssembler::new(5, 2);
    asm.param_types(&[PrimType::Ref, PrimType::Int]);
    asm.if_ltz(4, "neg")
        .unwrap()
        .array_length(0, 3)
        .unwrap()
        .if_ge(4, 0, "big")
        .unwrap()
        // else: 0 <= i < length, provably safe
        .aget(1, 3, 4)
        .unwrap()
        .return_val(1)
        .unwrap()
        .label("neg")
        .unwrap()
        .aget(1, 3, 4)
        .unwrap()
        .return_val(1)
        .unwrap()
        .label("big")
        .unwrap()
        .aget(1, 3, 4)
        .unwrap()
        .return_val(1)
        .unwrap();
    let graph = optimized(asm);

    assert_eq!(
        bounds_checks(&graph),
        2,
        "only the else-branch access is provably in range"
    );
}

/// A fresh allocation with a constant size proves constant indices below
/// that size in range, with no prior access needed.
#[test]
fn new_array_size_fact() {
    let mut asm = CodeAssembler::new(4, 0);
    asm.const4(0, 8)
        .unwrap()
        .const4(1, 3)
        .unwrap()
        .const4(2, 1)
        .unwrap()
        .new_array(3, 0, 7)
        .unwrap()
        .aput(2, 3, 1)
        .unwrap()
        .return_void()
        .unwrap();
    let graph = optimized(asm);

    assert_eq!(
        bounds_checks(&graph),
        0,
        "index 3 < allocated size 8 is trivially safe"
    );
}

/// Running the pass again finds nothing new (fixed point on the first
/// run for a loop-free method).
#[test]
fn second_run_is_idempotent() {
    let mut asm = CodeAssembler::new(4, 1);
    asm.param_types(&[PrimType::Ref]);
    asm.const4(0, 5)
        .unwrap()
        .const4(1, 4)
        .unwrap()
        .const4(2, 1)
        .unwrap()
        .aput(2, 3, 0)
        .unwrap()
        .aput(2, 3, 1)
        .unwrap()
        .return_void()
        .unwrap();
    let body = asm.finish().unwrap();
    let mut graph = GraphBuilder::build(&body, true).unwrap();
    build_ssa(&mut graph).unwrap();
    GvnPass::run(&mut graph);

    assert!(BcePass::run(&mut graph));
    assert!(!BcePass::run(&mut graph));
    graph.check_consistency().unwrap();
}
