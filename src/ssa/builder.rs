//! SSA construction over per-block local value tables.
//!
//! The builder walks blocks in reverse post order, which guarantees every
//! non-loop predecessor of a block is visited first:
//!
//! 1. Loop headers eagerly create a phi for every local live in the
//!    pre-header, even though the back-edge inputs are not known yet; the
//!    header is recorded for backfilling.
//! 2. Other join blocks read each local from all predecessors: agreeing
//!    values propagate as-is, locals missing in any predecessor are
//!    skipped (the verifier guarantees no read reaches this point without
//!    a dominating store), and disagreeing values synthesize a phi with
//!    one input per predecessor.
//! 3. After the walk, every loop-header phi's inputs are backfilled from
//!    the now-known value-at-end of each predecessor.
//!
//! During the same walk each `LoadLocal` is replaced by the current value
//! and removed, each `StoreLocal` updates the table and is removed, and
//! every instruction that can throw or deoptimize receives an environment
//! snapshot of all current local values for unwinding/deoptimization.

use crate::{
    mir::{BlockId, InstrId, MirGraph, Op, PrimType},
    Result,
};

/// Per-block table of current SSA values, one slot per virtual register.
type Locals = Vec<Option<InstrId>>;

/// Converts a freshly built graph into SSA form.
///
/// After this pass no `LoadLocal`/`StoreLocal` instructions remain; every
/// register read has been replaced by a concrete definition or a phi.
/// Finishes with the phi type propagation fixed point; phis with
/// irreconcilable input types are marked dead rather than failing the
/// method.
///
/// # Errors
///
/// Returns [`crate::Error::GraphError`] on reads of locals the verifier
/// should have proven initialized (an internal invariant violation).
pub fn build_ssa(graph: &mut MirGraph) -> Result<()> {
    let num_vregs = usize::from(graph.num_vregs());
    {
        let mut builder = SsaBuilder {
            graph: &mut *graph,
            locals_for: Vec::new(),
            reachable: Vec::new(),
            loop_headers: Vec::new(),
            num_vregs,
        };
        builder.run()?;
    }
    crate::ssa::propagate_types(graph);
    Ok(())
}

struct SsaBuilder<'g> {
    graph: &'g mut MirGraph,
    /// Value table per block, `None` until the block is visited.
    locals_for: Vec<Option<Locals>>,
    /// Blocks reachable from the entry block. Edges from unreachable
    /// blocks (dead code falling into live code) contribute no values and
    /// no phi inputs.
    reachable: Vec<bool>,
    /// Loop headers needing phi input backfilling.
    loop_headers: Vec<BlockId>,
    num_vregs: usize,
}

impl SsaBuilder<'_> {
    fn run(&mut self) -> Result<()> {
        self.locals_for = vec![None; self.graph.block_count()];
        self.reachable = vec![false; self.graph.block_count()];

        // 1) Visit in reverse post order.
        let rpo = self.graph.reverse_postorder();
        for &block in &rpo {
            self.reachable[block.index()] = true;
        }
        for &block in &rpo {
            self.visit_block(block)?;
        }

        // 2) Set inputs of loop phis.
        for header_idx in 0..self.loop_headers.len() {
            let header = self.loop_headers[header_idx];
            let preds = self.live_predecessors(header);
            for insn in self.graph.block_insns(header) {
                let Op::Phi { vreg, ref inputs } = self.graph.instr(insn).op else {
                    continue;
                };
                if !inputs.is_empty() {
                    continue; // already backfilled (shared header revisit)
                }
                let mut filled = Vec::with_capacity(preds.len());
                for &pred in &preds {
                    let value = self.value_of_local(pred, usize::from(vreg)).ok_or_else(
                        || {
                            crate::Error::GraphError(format!(
                                "loop phi for v{vreg} has no value in predecessor {pred}"
                            ))
                        },
                    )?;
                    filled.push((value, pred));
                }
                if let Op::Phi { inputs, .. } = &mut self.graph.instr_mut(insn).op {
                    *inputs = filled;
                }
            }
        }

        Ok(())
    }

    fn value_of_local(&self, block: BlockId, local: usize) -> Option<InstrId> {
        self.locals_for[block.index()].as_ref()?.get(local).copied()?
    }

    /// Predecessors reachable from the entry block.
    fn live_predecessors(&self, block: BlockId) -> Vec<BlockId> {
        self.graph
            .block(block)
            .predecessors
            .iter()
            .copied()
            .filter(|p| self.reachable[p.index()])
            .collect()
    }

    fn visit_block(&mut self, block: BlockId) -> Result<()> {
        let preds = self.live_predecessors(block);
        let unvisited_pred = preds
            .iter()
            .any(|p| self.locals_for[p.index()].is_none());

        let mut locals: Locals = vec![None; self.num_vregs];

        if unvisited_pred && !preds.is_empty() {
            // A predecessor not yet visited in reverse post order means a
            // back edge: this block is a loop header. Create phis for all
            // locals initialized in the pre-header; inputs are populated
            // at the end of the analysis.
            let pre_header = preds
                .iter()
                .copied()
                .find(|p| self.locals_for[p.index()].is_some())
                .ok_or_else(|| {
                    crate::Error::GraphError(format!(
                        "loop header {block} has no visited pre-header"
                    ))
                })?;
            for local in 0..self.num_vregs {
                if self.value_of_local(pre_header, local).is_some() {
                    let phi = self.graph.alloc_instr(
                        Op::Phi {
                            vreg: local as u16,
                            inputs: Vec::new(),
                        },
                        self.graph.block(block).start_offset,
                        PrimType::Void,
                    );
                    self.graph.prepend_instr(block, phi);
                    locals[local] = Some(phi);
                }
            }
            self.loop_headers.push(block);
        } else if !preds.is_empty() {
            // All predecessors are visited: merge the values of all
            // locals, creating phis where they differ.
            for local in 0..self.num_vregs {
                let mut one_predecessor_has_no_value = false;
                let mut is_different = false;
                let value = self.value_of_local(preds[0], local);

                for &pred in &preds {
                    let current = self.value_of_local(pred, local);
                    if current.is_none() {
                        one_predecessor_has_no_value = true;
                        break;
                    }
                    if current != value {
                        is_different = true;
                    }
                }

                if one_predecessor_has_no_value {
                    // The verifier guarantees a store dominates any read
                    // past this point; nothing to merge.
                    continue;
                }

                if is_different {
                    let inputs = preds
                        .iter()
                        .map(|&pred| {
                            (
                                self.value_of_local(pred, local)
                                    .expect("checked above"),
                                pred,
                            )
                        })
                        .collect();
                    let phi = self.graph.alloc_instr(
                        Op::Phi {
                            vreg: local as u16,
                            inputs,
                        },
                        self.graph.block(block).start_offset,
                        PrimType::Void,
                    );
                    self.graph.prepend_instr(block, phi);
                    locals[local] = Some(phi);
                } else {
                    locals[local] = value;
                }
            }
        }

        // Rewrite the block's instructions against the running table.
        for insn in self.graph.block_insns(block) {
            match self.graph.instr(insn).op.clone() {
                Op::LoadLocal { vreg } => {
                    let value = locals.get(usize::from(vreg)).copied().flatten().ok_or_else(
                        || {
                            crate::Error::GraphError(format!(
                                "read of undefined local v{vreg} in {block}"
                            ))
                        },
                    )?;
                    self.graph.replace_uses(insn, value);
                    self.graph.remove_instr(insn);
                }
                Op::StoreLocal { vreg, value } => {
                    locals[usize::from(vreg)] = Some(value);
                    self.graph.remove_instr(insn);
                }
                Op::Phi { .. } => {}
                op => {
                    if op.can_throw()
                        || matches!(op, Op::Deoptimize | Op::Check { .. })
                    {
                        self.graph.instr_mut(insn).env =
                            Some(locals.clone().into_boxed_slice());
                    }
                }
            }
        }

        self.locals_for[block.index()] = Some(locals);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bytecode::CodeAssembler,
        mir::{GraphBuilder, PrimType},
    };

    fn ssa_graph(asm: CodeAssembler) -> MirGraph {
        let body = asm.finish().expect("assembly failed");
        let mut graph = GraphBuilder::build(&body, false).expect("build failed");
        build_ssa(&mut graph).expect("ssa failed");
        graph.check_consistency().expect("inconsistent graph");
        graph
    }

    fn count_ops(graph: &MirGraph, pred: impl Fn(&Op) -> bool) -> usize {
        graph
            .live_instrs()
            .filter(|&i| pred(&graph.instr(i).op))
            .count()
    }

    #[test]
    fn test_no_locals_remain() {
        let mut asm = CodeAssembler::new(2, 0);
        asm.const4(0, 5)
            .unwrap()
            .const4(1, 7)
            .unwrap()
            .add_int(0, 0, 1)
            .unwrap()
            .return_val(0)
            .unwrap();
        let graph = ssa_graph(asm);

        assert_eq!(count_ops(&graph, |op| matches!(op, Op::LoadLocal { .. })), 0);
        assert_eq!(
            count_ops(&graph, |op| matches!(op, Op::StoreLocal { .. })),
            0
        );

        // The add consumes the two constants directly.
        let add = graph
            .live_instrs()
            .find(|&i| matches!(graph.instr(i).op, Op::BinOp { .. }))
            .unwrap();
        let Op::BinOp { lhs, rhs, .. } = graph.instr(add).op else {
            unreachable!()
        };
        assert!(matches!(graph.instr(lhs).op, Op::Const { value: 5 }));
        assert!(matches!(graph.instr(rhs).op, Op::Const { value: 7 }));
    }

    #[test]
    fn test_diamond_merge_creates_phi() {
        // v0 = v1 != 0 ? 1 : 0; return v0
        let mut asm = CodeAssembler::new(2, 1);
        asm.param_types(&[PrimType::Int]);
        asm.if_eqz(1, "else")
            .unwrap()
            .const4(0, 1)
            .unwrap()
            .goto("end")
            .unwrap()
            .label("else")
            .unwrap()
            .const4(0, 0)
            .unwrap()
            .label("end")
            .unwrap()
            .return_val(0)
            .unwrap();
        let graph = ssa_graph(asm);

        assert_eq!(count_ops(&graph, |op| matches!(op, Op::Phi { .. })), 1);

        let phi = graph
            .live_instrs()
            .find(|&i| graph.instr(i).is_phi())
            .unwrap();
        let Op::Phi { ref inputs, .. } = graph.instr(phi).op else {
            unreachable!()
        };
        assert_eq!(inputs.len(), 2);
        // Each input is tagged with its incoming predecessor.
        assert_ne!(inputs[0].1, inputs[1].1);

        // The return consumes the phi.
        let ret = graph
            .live_instrs()
            .find(|&i| matches!(graph.instr(i).op, Op::Return { value: Some(_) }))
            .unwrap();
        let Op::Return { value: Some(v) } = graph.instr(ret).op else {
            unreachable!()
        };
        assert_eq!(v, phi);
    }

    #[test]
    fn test_agreeing_values_propagate_without_phi() {
        // v0 set to the same constant instruction on both paths? Each arm
        // materializes its own constant, so use a value defined before the
        // branch instead: v0 = 3; if (v1) {} ; return v0
        let mut asm = CodeAssembler::new(2, 1);
        asm.const4(0, 3)
            .unwrap()
            .if_eqz(1, "end")
            .unwrap()
            .nop()
            .unwrap()
            .label("end")
            .unwrap()
            .return_val(0)
            .unwrap();
        let graph = ssa_graph(asm);

        // Both predecessors agree on the same definition: no phi needed.
        assert_eq!(count_ops(&graph, |op| matches!(op, Op::Phi { .. })), 0);
    }

    #[test]
    fn test_loop_header_phi_backfilled() {
        // v0 = 0; while (v0 < v2) v0 += 1; return v0
        let mut asm = CodeAssembler::new(3, 1);
        asm.param_types(&[PrimType::Int]);
        asm.const4(0, 0)
            .unwrap()
            .label("loop")
            .unwrap()
            .if_ge(0, 2, "done")
            .unwrap()
            .add_int_lit8(0, 0, 1)
            .unwrap()
            .goto("loop")
            .unwrap()
            .label("done")
            .unwrap()
            .return_val(0)
            .unwrap();
        let graph = ssa_graph(asm);

        // One phi for v0 at the loop header; v1/v2 phis may exist for the
        // untouched locals only if they were live, which they are (param).
        let header = graph.block_at_offset(1).unwrap();
        let phis: Vec<_> = graph
            .block_insns(header)
            .into_iter()
            .filter(|&i| graph.instr(i).is_phi())
            .collect();
        assert!(!phis.is_empty());

        let v0_phi = phis
            .iter()
            .copied()
            .find(|&i| matches!(graph.instr(i).op, Op::Phi { vreg: 0, .. }))
            .expect("phi for v0");
        let Op::Phi { ref inputs, .. } = graph.instr(v0_phi).op else {
            unreachable!()
        };
        assert_eq!(inputs.len(), 2, "pre-header and back edge");

        // One input is the constant 0, the other the increment.
        let ops: Vec<_> = inputs
            .iter()
            .map(|&(v, _)| graph.instr(v).op.clone())
            .collect();
        assert!(ops.iter().any(|op| matches!(op, Op::Const { value: 0 })));
        assert!(ops.iter().any(|op| matches!(op, Op::BinOp { .. })));

        // The increment itself consumes the phi (the loop-carried cycle).
        let add = inputs
            .iter()
            .map(|&(v, _)| v)
            .find(|&v| matches!(graph.instr(v).op, Op::BinOp { .. }))
            .unwrap();
        let Op::BinOp { lhs, .. } = graph.instr(add).op else {
            unreachable!()
        };
        assert_eq!(lhs, v0_phi);
    }

    #[test]
    fn test_throwing_instructions_get_environment() {
        let mut asm = CodeAssembler::new(3, 2);
        asm.param_types(&[PrimType::Ref, PrimType::Int]);
        asm.aget(0, 1, 2).unwrap().return_val(0).unwrap();
        let graph = ssa_graph(asm);

        let nc = graph
            .live_instrs()
            .find(|&i| matches!(graph.instr(i).op, Op::NullCheck { .. }))
            .unwrap();
        let env = graph.instr(nc).env.as_ref().expect("environment snapshot");
        assert_eq!(env.len(), 3);
        // The argument registers hold the parameter definitions.
        assert!(env[1].is_some());
        assert!(env[2].is_some());
    }

    #[test]
    fn test_dead_code_into_live_block_is_ignored() {
        // The nop after the goto is unreachable but still falls through
        // into the return block; its (missing) values must not poison the
        // merge.
        let mut asm = CodeAssembler::new(2, 0);
        asm.const4(0, 1)
            .unwrap()
            .goto("end")
            .unwrap()
            .nop()
            .unwrap()
            .label("end")
            .unwrap()
            .return_val(0)
            .unwrap();
        let graph = ssa_graph(asm);

        assert_eq!(count_ops(&graph, |op| matches!(op, Op::Phi { .. })), 0);
        let ret = graph
            .live_instrs()
            .find(|&i| matches!(graph.instr(i).op, Op::Return { value: Some(_) }))
            .unwrap();
        let Op::Return { value: Some(v) } = graph.instr(ret).op else {
            unreachable!()
        };
        assert!(matches!(graph.instr(v).op, Op::Const { value: 1 }));
    }

    #[test]
    fn test_params_reach_uses() {
        let mut asm = CodeAssembler::new(2, 2);
        asm.param_types(&[PrimType::Int, PrimType::Int]);
        asm.add_int(0, 0, 1).unwrap().return_val(0).unwrap();
        let graph = ssa_graph(asm);

        let add = graph
            .live_instrs()
            .find(|&i| matches!(graph.instr(i).op, Op::BinOp { .. }))
            .unwrap();
        let Op::BinOp { lhs, rhs, .. } = graph.instr(add).op else {
            unreachable!()
        };
        assert!(matches!(graph.instr(lhs).op, Op::Param { index: 0 }));
        assert!(matches!(graph.instr(rhs).op, Op::Param { index: 1 }));
    }
}
