//! Dominator-scoped global value numbering.
//!
//! Detects pure operations computing a value an earlier, dominating
//! instruction already computed, rewires the later uses to the earlier
//! result, and drops the duplicate. Keys are normalized (commutative
//! operand ordering, null checks stripped from array-length operands), so
//! the two `array.length` reads a loop condition and a loop body lower
//! separately unify - which is what lets bounds-check elimination see
//! through redundant length reads.
//!
//! Per-block key tables are looked up by walking up the dominator tree,
//! the same dominance-scoped discipline the bounds-check pass uses for
//! its value ranges: a hit is only valid when the earlier computation
//! dominates the later one.

use std::collections::HashMap;

use crate::mir::{BinOpKind, BlockId, InstrId, MirGraph, Op, PrimType, UnOpKind};

/// A hashable key representing a pure computation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ValueKey {
    /// Constant: value bits and category.
    Const(i64, PrimType),
    /// Binary operation with normalized operand order.
    Binary(BinOpKind, PrimType, InstrId, InstrId),
    /// Unary operation.
    Unary(UnOpKind, PrimType, InstrId),
    /// Array length, keyed on the array with null checks stripped.
    ArrayLength(InstrId),
}

/// Strips null-check wrappers off a reference value.
fn strip_null_checks(graph: &MirGraph, mut value: InstrId) -> InstrId {
    while let Op::NullCheck { object } = graph.instr(value).op {
        value = object;
    }
    value
}

impl ValueKey {
    /// Builds the key of an instruction, or `None` when the operation
    /// should not be value-numbered (impure, throwing, or control flow).
    fn from_insn(graph: &MirGraph, insn: InstrId) -> Option<Self> {
        let instr = graph.instr(insn);
        match instr.op {
            Op::Const { value } => Some(ValueKey::Const(value, instr.ty)),
            Op::BinOp { kind, lhs, rhs } => {
                // Integer division and remainder can throw.
                if kind.can_throw() {
                    return None;
                }
                let (lhs, rhs) = if kind.is_commutative() && rhs < lhs {
                    (rhs, lhs)
                } else {
                    (lhs, rhs)
                };
                Some(ValueKey::Binary(kind, instr.ty, lhs, rhs))
            }
            Op::UnOp { kind, operand } => Some(ValueKey::Unary(kind, instr.ty, operand)),
            Op::ArrayLength { array } => {
                Some(ValueKey::ArrayLength(strip_null_checks(graph, array)))
            }
            _ => None,
        }
    }
}

/// The global value numbering pass.
pub struct GvnPass;

impl GvnPass {
    /// Runs value numbering over the dominator tree.
    ///
    /// Returns `true` if any redundant computation was eliminated.
    pub fn run(graph: &mut MirGraph) -> bool {
        graph.compute_dominators();

        let mut maps: HashMap<BlockId, HashMap<ValueKey, InstrId>> = HashMap::new();
        let mut changed = false;

        for block in graph.reverse_postorder() {
            maps.insert(block, HashMap::new());
            for insn in graph.block_insns(block) {
                if graph.instr(insn).dead {
                    continue;
                }
                let Some(key) = ValueKey::from_insn(graph, insn) else {
                    continue;
                };

                if let Some(original) = lookup(graph, &maps, block, &key) {
                    graph.replace_uses(insn, original);
                    if is_check_anchor(graph, insn) {
                        // The guard of a check/work split keeps its work
                        // instruction in place; the duplicate is merely
                        // unused now.
                        changed = true;
                    } else {
                        graph.remove_instr(insn);
                        changed = true;
                    }
                } else {
                    maps.get_mut(&block)
                        .expect("map created above")
                        .insert(key, insn);
                }
            }
        }
        changed
    }
}

/// Walks up the dominator tree looking for a prior computation.
fn lookup(
    graph: &MirGraph,
    maps: &HashMap<BlockId, HashMap<ValueKey, InstrId>>,
    mut block: BlockId,
    key: &ValueKey,
) -> Option<InstrId> {
    loop {
        if let Some(found) = maps.get(&block).and_then(|map| map.get(key)) {
            return Some(*found);
        }
        block = graph.idom(block)?;
    }
}

/// Returns `true` if a live check pseudo-op anchors on this instruction.
fn is_check_anchor(graph: &MirGraph, insn: InstrId) -> bool {
    graph.live_instrs().any(|id| {
        matches!(graph.instr(id).op, Op::Check { body } if body == insn)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bytecode::CodeAssembler, mir::GraphBuilder, ssa::build_ssa};

    fn prepared(asm: CodeAssembler) -> MirGraph {
        let body = asm.finish().unwrap();
        let mut graph = GraphBuilder::build(&body, true).unwrap();
        build_ssa(&mut graph).unwrap();
        graph
    }

    fn count_ops(graph: &MirGraph, pred: impl Fn(&Op) -> bool) -> usize {
        graph
            .live_instrs()
            .filter(|&i| pred(&graph.instr(i).op))
            .count()
    }

    #[test]
    fn test_duplicate_constants_unify() {
        // Two add-int/lit8 with the same literal materialize two constants.
        let mut asm = CodeAssembler::new(3, 1);
        asm.param_types(&[crate::mir::PrimType::Int]);
        asm.add_int_lit8(0, 2, 1)
            .unwrap()
            .add_int_lit8(1, 2, 1)
            .unwrap()
            .add_int(0, 0, 1)
            .unwrap()
            .return_val(0)
            .unwrap();
        let mut graph = prepared(asm);

        assert_eq!(count_ops(&graph, |op| matches!(op, Op::Const { .. })), 2);
        // The two additions have identical operands once constants unify.
        let changed = GvnPass::run(&mut graph);
        assert!(changed);
        assert_eq!(count_ops(&graph, |op| matches!(op, Op::Const { .. })), 1);
        // add(v2, 1) computed twice collapses to once.
        assert_eq!(
            count_ops(&graph, |op| matches!(
                op,
                Op::BinOp {
                    kind: BinOpKind::Add,
                    ..
                }
            )),
            2
        );
        graph.check_consistency().unwrap();
    }

    #[test]
    fn test_commutative_operands_normalize() {
        let mut asm = CodeAssembler::new(3, 2);
        asm.param_types(&[crate::mir::PrimType::Int, crate::mir::PrimType::Int]);
        asm.add_int(0, 1, 2)
            .unwrap()
            .add_int(2, 2, 1)
            .unwrap()
            .return_val(2)
            .unwrap();
        let mut graph = prepared(asm);

        assert!(GvnPass::run(&mut graph));
        assert_eq!(count_ops(&graph, |op| matches!(op, Op::BinOp { .. })), 1);

        // Non-commutative operations with swapped operands stay distinct.
        let mut asm = CodeAssembler::new(3, 2);
        asm.param_types(&[crate::mir::PrimType::Int, crate::mir::PrimType::Int]);
        asm.sub_int(0, 1, 2)
            .unwrap()
            .sub_int(2, 2, 1)
            .unwrap()
            .return_val(2)
            .unwrap();
        let mut graph = prepared(asm);
        assert!(!GvnPass::run(&mut graph));
        assert_eq!(count_ops(&graph, |op| matches!(op, Op::BinOp { .. })), 2);
    }

    #[test]
    fn test_array_length_reads_unify_across_null_checks() {
        // Two array-length reads of the same array lower with separate
        // null checks; the lengths still unify.
        let mut asm = CodeAssembler::new(3, 1);
        asm.param_types(&[crate::mir::PrimType::Ref]);
        asm.array_length(0, 2)
            .unwrap()
            .array_length(1, 2)
            .unwrap()
            .add_int(0, 0, 1)
            .unwrap()
            .return_val(0)
            .unwrap();
        let mut graph = prepared(asm);

        assert_eq!(
            count_ops(&graph, |op| matches!(op, Op::ArrayLength { .. })),
            2
        );
        assert!(GvnPass::run(&mut graph));
        assert_eq!(
            count_ops(&graph, |op| matches!(op, Op::ArrayLength { .. })),
            1
        );
        graph.check_consistency().unwrap();
    }

    #[test]
    fn test_no_unification_across_sibling_branches() {
        // The same computation in two sibling arms must both survive:
        // neither dominates the other.
        let mut asm = CodeAssembler::new(3, 2);
        asm.param_types(&[crate::mir::PrimType::Int, crate::mir::PrimType::Int]);
        asm.if_eqz(1, "else")
            .unwrap()
            .add_int(0, 1, 2)
            .unwrap()
            .return_val(0)
            .unwrap()
            .label("else")
            .unwrap()
            .add_int(0, 1, 2)
            .unwrap()
            .return_val(0)
            .unwrap();
        let mut graph = prepared(asm);

        assert!(!GvnPass::run(&mut graph));
        assert_eq!(count_ops(&graph, |op| matches!(op, Op::BinOp { .. })), 2);
    }

    #[test]
    fn test_division_is_not_numbered() {
        let mut asm = CodeAssembler::new(3, 2);
        asm.param_types(&[crate::mir::PrimType::Int, crate::mir::PrimType::Int]);
        asm.div_int(0, 1, 2)
            .unwrap()
            .div_int(0, 1, 2)
            .unwrap()
            .return_val(0)
            .unwrap();
        let mut graph = prepared(asm);

        assert!(!GvnPass::run(&mut graph));
        assert_eq!(
            count_ops(&graph, |op| matches!(
                op,
                Op::BinOp {
                    kind: BinOpKind::Div,
                    ..
                }
            )),
            2
        );
    }
}
