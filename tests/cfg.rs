//! CFG construction and graph invariant integration tests.
//!
//! These exercise the testable properties of the graph through the public
//! API: bidirectional edge consistency after every builder operation and
//! later mutation, split idempotence, offset-map correctness, the SSA
//! invariant, and dataflow idempotence.

use dexmir::{
    bytecode::CodeAssembler,
    dataflow::{NullPropagation, RangePropagation},
    mir::{BlockKind, GraphBuilder, MirGraph, Op, PrimType},
    opt::{BcePass, GvnPass, LsePass},
    ssa::build_ssa,
};

fn branchy_method() -> CodeAssembler {
    // if (v2 == 0) v0 = 1 else v0 = 2; while (v0 > 0) v0--; return v0
    let mut asm = CodeAssembler::new(3, 1);
    asm.param_types(&[PrimType::Int]);
    asm.if_eqz(2, "else")
        .unwrap()
        .const4(0, 1)
        .unwrap()
        .goto("merge")
        .unwrap()
        .label("else")
        .unwrap()
        .const4(0, 2)
        .unwrap()
        .label("merge")
        .unwrap()
        .if_lez(0, "done")
        .unwrap()
        .add_int_lit8(0, 0, -1)
        .unwrap()
        .goto("merge")
        .unwrap()
        .label("done")
        .unwrap()
        .return_val(0)
        .unwrap();
    asm
}

#[test]
fn well_formed_after_build() {
    let body = branchy_method().finish().unwrap();
    let graph = GraphBuilder::build(&body, false).unwrap();
    graph.check_consistency().unwrap();
}

#[test]
fn well_formed_after_every_pass() {
    let body = branchy_method().finish().unwrap();
    let mut graph = GraphBuilder::build(&body, false).unwrap();
    build_ssa(&mut graph).unwrap();
    graph.check_consistency().unwrap();

    NullPropagation::run(&mut graph);
    graph.check_consistency().unwrap();
    GvnPass::run(&mut graph);
    graph.check_consistency().unwrap();
    RangePropagation::run(&mut graph);
    graph.check_consistency().unwrap();
    BcePass::run(&mut graph);
    graph.check_consistency().unwrap();
    LsePass::run(&mut graph, &body.fields);
    graph.check_consistency().unwrap();
}

#[test]
fn offset_map_resolves_every_live_instruction() {
    let body = branchy_method().finish().unwrap();
    let graph = GraphBuilder::build(&body, false).unwrap();

    for insn in graph.live_instrs() {
        let instr = graph.instr(insn);
        if instr.check_body || graph.block(instr.block).kind != BlockKind::Code {
            continue;
        }
        let mapped = graph
            .block_at_offset(instr.offset)
            .expect("live instruction offset must be mapped");
        // Either the map names the containing block directly, or the
        // mapped block ends in the check half of a split at this offset.
        if mapped != instr.block {
            let has_check = graph.block_insns(mapped).into_iter().any(|id| {
                graph.instr(id).offset == instr.offset
                    && matches!(graph.instr(id).op, Op::Check { .. })
            });
            assert!(has_check, "offset {:#x} maps to a foreign block", instr.offset);
        }
    }
}

#[test]
fn split_at_existing_boundary_creates_nothing() {
    // Branching twice to the same offset must not create a second block.
    let mut asm = CodeAssembler::new(2, 1);
    asm.if_eqz(1, "t")
        .unwrap()
        .if_nez(1, "t")
        .unwrap()
        .nop()
        .unwrap()
        .label("t")
        .unwrap()
        .return_void()
        .unwrap();
    let body = asm.finish().unwrap();
    let graph = GraphBuilder::build(&body, false).unwrap();

    let target_blocks: Vec<_> = graph
        .block_ids()
        .filter(|&b| graph.block(b).start_offset == 5 && graph.block(b).kind == BlockKind::Code)
        .collect();
    assert_eq!(target_blocks.len(), 1);
    graph.check_consistency().unwrap();
}

#[test]
fn ssa_leaves_no_local_pseudo_ops() {
    let body = branchy_method().finish().unwrap();
    let mut graph = GraphBuilder::build(&body, false).unwrap();
    build_ssa(&mut graph).unwrap();

    for insn in graph.live_instrs() {
        assert!(
            !matches!(
                graph.instr(insn).op,
                Op::LoadLocal { .. } | Op::StoreLocal { .. }
            ),
            "local pseudo-op survived SSA construction"
        );
    }
    // In particular the entry block holds only parameter definitions now.
    for insn in graph.block_insns(graph.entry()) {
        assert!(matches!(graph.instr(insn).op, Op::Param { .. }));
    }
}

#[test]
fn dataflow_passes_are_idempotent() {
    let body = branchy_method().finish().unwrap();
    let mut graph = GraphBuilder::build(&body, false).unwrap();
    build_ssa(&mut graph).unwrap();

    // Whatever the first runs changed, the second runs must not.
    NullPropagation::run(&mut graph);
    assert!(!NullPropagation::run(&mut graph));
    RangePropagation::run(&mut graph);
    assert!(!RangePropagation::run(&mut graph));
    graph.check_consistency().unwrap();
}

#[test]
fn merged_graphs_share_one_offset_space() {
    fn small_graph() -> (MirGraph, usize) {
        let mut asm = CodeAssembler::new(2, 0);
        asm.const4(0, 3).unwrap().return_val(0).unwrap();
        let body = asm.finish().unwrap();
        let units = body.code_units();
        (GraphBuilder::build(&body, false).unwrap(), units)
    }

    let (mut primary, primary_units) = small_graph();
    let (secondary, secondary_units) = small_graph();
    primary.merge(secondary);

    assert_eq!(
        primary.code_unit_len() as usize,
        primary_units + secondary_units
    );
    assert_eq!(primary.units().len(), 2);
    primary.check_consistency().unwrap();

    // The second unit's instructions live at shifted offsets.
    let shifted = primary
        .block_at_offset(primary_units as u32)
        .expect("second unit's entry offset");
    assert!(primary
        .block_insns(shifted)
        .iter()
        .any(|&i| matches!(primary.instr(i).op, Op::Const { value: 3 })));
}

#[test]
fn dot_export_is_side_effect_free() {
    let body = branchy_method().finish().unwrap();
    let mut graph = GraphBuilder::build(&body, false).unwrap();
    build_ssa(&mut graph).unwrap();

    let first = graph.to_dot(Some("method"));
    let second = graph.to_dot(Some("method"));
    assert_eq!(first, second);
    graph.check_consistency().unwrap();
}
