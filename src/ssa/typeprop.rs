//! Phi primitive type propagation.
//!
//! Dex bytecode types some instructions ambiguously (the same `const` can
//! feed an int or a float consumer), so phis start `Void` and are widened
//! from their inputs with a worklist until a fixed point. Irreconcilable
//! input categories (different sizes, or float against reference) mark the
//! phi dead rather than erroring; dead phis are excluded from further
//! typed reasoning.

use crate::mir::{InstrId, MirGraph, Op, PrimType};

/// Collapses sub-int categories for phi typing.
fn to_phi_type(ty: PrimType) -> PrimType {
    match ty {
        PrimType::Boolean | PrimType::Byte | PrimType::Char | PrimType::Short => PrimType::Int,
        other => other,
    }
}

/// Merges a phi's input types into its own type.
///
/// Returns `true` when the types conflict and the phi must die.
fn merge_input_types(graph: &mut MirGraph, phi: InstrId) -> bool {
    let Op::Phi { ref inputs, .. } = graph.instr(phi).op else {
        return false;
    };
    let inputs: Vec<InstrId> = inputs.iter().map(|&(v, _)| v).collect();

    let mut new_type = graph.instr(phi).ty;
    for input in &inputs {
        let input_insn = graph.instr(*input);
        if input_insn.is_phi() && input_insn.dead {
            // A dead phi input means its own inputs conflicted; this phi
            // is conflicting too.
            return true;
        }
        let input_type = to_phi_type(input_insn.ty);

        if new_type == PrimType::Void {
            new_type = input_type;
        } else if new_type == input_type || input_type == PrimType::Void {
            // Nothing to do.
        } else if new_type.component_size() != input_type.component_size() {
            return true;
        } else if new_type.is_integral() {
            // Same-size float or reference input wins over integral.
            new_type = input_type;
        } else if input_type.is_integral() {
            // Keep the non-integral type.
        } else {
            // float vs reference (or double vs reference): unreconcilable.
            return true;
        }
    }

    // Re-type integral constants feeding a float-typed phi in place; the
    // raw bits are already the right value.
    if new_type.is_floating_point() {
        for input in &inputs {
            let insn = graph.instr(*input);
            if matches!(insn.op, Op::Const { .. }) && insn.ty.is_integral() {
                graph.instr_mut(*input).ty = new_type;
            }
        }
    }

    graph.instr_mut(phi).ty = new_type;
    false
}

/// Recomputes one phi's type. Returns whether the type changed.
fn update_type(graph: &mut MirGraph, phi: InstrId) -> bool {
    if graph.instr(phi).dead {
        return false;
    }
    let old_type = graph.instr(phi).ty;
    if merge_input_types(graph, phi) {
        graph.instr_mut(phi).dead = true;
        return true;
    }
    old_type != graph.instr(phi).ty
}

/// Live phis that use `value` as an input.
fn dependent_phis(graph: &MirGraph, value: InstrId) -> Vec<InstrId> {
    graph
        .live_instrs()
        .filter(|&id| {
            let insn = graph.instr(id);
            if !insn.is_phi() || insn.dead {
                return false;
            }
            let mut uses_value = false;
            insn.op.for_each_input(|input| uses_value |= input == value);
            uses_value
        })
        .collect()
}

/// Runs phi type propagation to a fixed point.
///
/// Loop-header phis (whose inputs were backfilled after the main walk) go
/// on the worklist; forward phis are typed eagerly during the reverse
/// post-order sweep for quicker convergence.
pub fn propagate_types(graph: &mut MirGraph) {
    let mut worklist: Vec<InstrId> = Vec::new();

    let rpo = graph.reverse_postorder();
    for &block in &rpo {
        let is_loop_header = graph
            .block(block)
            .predecessors
            .iter()
            .any(|&pred| {
                rpo.iter().position(|&b| b == pred)
                    >= rpo.iter().position(|&b| b == block)
            });
        for insn in graph.block_insns(block) {
            if !graph.instr(insn).is_phi() || graph.instr(insn).dead {
                continue;
            }
            if is_loop_header {
                worklist.push(insn);
            } else {
                update_type(graph, insn);
            }
        }
    }

    while let Some(phi) = worklist.pop() {
        if update_type(graph, phi) {
            let ty = graph.instr(phi).ty;
            let died = graph.instr(phi).dead;
            for dependent in dependent_phis(graph, phi) {
                if graph.instr(dependent).ty != ty || died {
                    worklist.push(dependent);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::{BlockId, BlockKind};

    fn phi_of(graph: &mut MirGraph, block: BlockId, inputs: Vec<(InstrId, BlockId)>) -> InstrId {
        let phi = graph.alloc_instr(Op::Phi { vreg: 0, inputs }, 0, PrimType::Void);
        graph.prepend_instr(block, phi);
        phi
    }

    #[test]
    fn test_same_types_unify() {
        let mut graph = MirGraph::new(8, 2);
        let a = graph.alloc_block(BlockKind::Code);
        let b = graph.alloc_block(BlockKind::Code);
        let join = graph.alloc_block(BlockKind::Code);
        graph.set_fall_through(graph.entry(), Some(a));
        graph.set_taken(a, Some(b));
        graph.set_fall_through(a, Some(join));
        graph.set_fall_through(b, Some(join));

        let c1 = graph.alloc_instr(Op::Const { value: 1 }, 0, PrimType::Int);
        let c2 = graph.alloc_instr(Op::Const { value: 2 }, 1, PrimType::Int);
        graph.append_instr(a, c1);
        graph.append_instr(b, c2);
        let phi = phi_of(&mut graph, join, vec![(c1, a), (c2, b)]);

        propagate_types(&mut graph);
        assert_eq!(graph.instr(phi).ty, PrimType::Int);
        assert!(!graph.instr(phi).dead);
    }

    #[test]
    fn test_int_float_same_size_widens_to_float() {
        let mut graph = MirGraph::new(8, 2);
        let a = graph.alloc_block(BlockKind::Code);
        graph.set_fall_through(graph.entry(), Some(a));

        let int_const = graph.alloc_instr(Op::Const { value: 0 }, 0, PrimType::Int);
        let float_val = graph.alloc_instr(
            Op::UnOp {
                kind: crate::mir::UnOpKind::Conv,
                operand: int_const,
            },
            0,
            PrimType::Float,
        );
        graph.append_instr(a, int_const);
        graph.append_instr(a, float_val);
        let phi = phi_of(&mut graph, a, vec![(int_const, a), (float_val, a)]);

        propagate_types(&mut graph);
        assert_eq!(graph.instr(phi).ty, PrimType::Float);
        // The integral constant was re-typed in place.
        assert_eq!(graph.instr(int_const).ty, PrimType::Float);
        assert!(!graph.instr(phi).dead);
    }

    #[test]
    fn test_size_mismatch_marks_dead() {
        let mut graph = MirGraph::new(8, 2);
        let a = graph.alloc_block(BlockKind::Code);
        graph.set_fall_through(graph.entry(), Some(a));

        let int_const = graph.alloc_instr(Op::Const { value: 0 }, 0, PrimType::Int);
        let long_const = graph.alloc_instr(Op::Const { value: 0 }, 0, PrimType::Long);
        graph.append_instr(a, int_const);
        graph.append_instr(a, long_const);
        let phi = phi_of(&mut graph, a, vec![(int_const, a), (long_const, a)]);

        propagate_types(&mut graph);
        assert!(graph.instr(phi).dead);
    }

    #[test]
    fn test_float_vs_ref_conflict_propagates_death() {
        let mut graph = MirGraph::new(8, 2);
        let a = graph.alloc_block(BlockKind::Code);
        graph.set_fall_through(graph.entry(), Some(a));

        let b = graph.alloc_block(BlockKind::Code);
        graph.set_fall_through(a, Some(b));

        let f = graph.alloc_instr(Op::Const { value: 0 }, 0, PrimType::Float);
        let r = graph.alloc_instr(Op::NewInstance { class_idx: 0 }, 0, PrimType::Ref);
        graph.append_instr(a, f);
        graph.append_instr(a, r);
        let conflicted = phi_of(&mut graph, a, vec![(f, a), (r, a)]);
        let downstream = phi_of(&mut graph, b, vec![(conflicted, a), (f, a)]);

        propagate_types(&mut graph);
        assert!(graph.instr(conflicted).dead);
        // A dead phi input kills dependent phis too.
        assert!(graph.instr(downstream).dead);
    }
}
