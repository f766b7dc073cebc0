//! The contextualized fixed-point pass engine.
//!
//! [`ContextualizedPass`] tracks a per-instruction property of type `P`
//! during a reverse post-order graph traversal. For each block it rebuilds
//! the "in" map by merging all predecessors' "out" maps (replacing, not
//! accumulating, so revisits never see stale carry-over), computes phi
//! properties automatically as the merge of their inputs, lets the
//! visitor set or merge properties per instruction, then snapshots "in"
//! as the block's new "out" and discards the old one.
//!
//! The property type supplies a default value and a merge operation that
//! must be pure, associative, commutative, and monotonic under repeated
//! merging; the engine supplies everything else. Null propagation and
//! range propagation are the two built-in instantiations.

use std::collections::HashMap;
use std::fmt::Debug;

use crate::mir::{BlockId, InstrId, MirGraph, Op};

/// A per-instruction dataflow fact.
///
/// # Contract
///
/// [`merge`](Property::merge) must be pure, associative, commutative, and
/// monotonic under repeated merging; [`default_value`](Property::default_value)
/// must be a safe fact for instructions nothing is known about.
pub trait Property: Clone + PartialEq + Debug {
    /// The safe fact for unknown instructions.
    fn default_value() -> Self;

    /// Combines two facts arriving on different control-flow paths.
    #[must_use]
    fn merge(a: &Self, b: &Self) -> Self;
}

/// Per-instruction visitor of a contextualized pass.
///
/// Implementations inspect instructions and record facts through the pass
/// context; they never mutate the graph (graph rewrites happen after the
/// walk, from facts the visitor collected on the side).
pub trait PropertyVisitor<P: Property> {
    /// Visits one instruction. Phis have their merged property already set
    /// when this is called.
    fn visit_insn(&mut self, ctx: &mut ContextualizedPass<'_, P>, insn: InstrId);

    /// Hook invoked after predecessor merging, before the block's
    /// instructions are visited.
    fn before_block(&mut self, _ctx: &mut ContextualizedPass<'_, P>, _block: BlockId) {}
}

/// Fixed-point property tracking over a reverse post-order walk.
pub struct ContextualizedPass<'g, P: Property> {
    graph: &'g MirGraph,
    in_: HashMap<BlockId, HashMap<InstrId, P>>,
    out_: HashMap<BlockId, HashMap<InstrId, P>>,
    current: BlockId,
}

impl<'g, P: Property> ContextualizedPass<'g, P> {
    /// Creates a pass over a graph.
    #[must_use]
    pub fn new(graph: &'g MirGraph) -> Self {
        Self {
            graph,
            in_: HashMap::new(),
            out_: HashMap::new(),
            current: crate::mir::NULL_BLOCK,
        }
    }

    /// The graph being analyzed.
    #[must_use]
    pub const fn graph(&self) -> &'g MirGraph {
        self.graph
    }

    /// The block currently being visited.
    #[must_use]
    pub const fn current_block(&self) -> BlockId {
        self.current
    }

    /// Runs the walk, feeding each instruction to the visitor.
    pub fn run(&mut self, visitor: &mut impl PropertyVisitor<P>) {
        for block in self.graph.reverse_postorder() {
            self.current = block;
            self.merge_predecessors();
            visitor.before_block(self, block);

            for insn in self.graph.block_insns(block) {
                if self.graph.instr(insn).is_phi() {
                    self.handle_phi(insn);
                }
                visitor.visit_insn(self, insn);
            }

            // out ← in; the old out is discarded.
            let in_map = self.in_.remove(&block).unwrap_or_default();
            self.out_.insert(block, in_map);
        }
    }

    /// Overwrites the property of an instruction in the current block.
    pub fn set_property(&mut self, insn: InstrId, property: P) {
        self.in_
            .entry(self.current)
            .or_default()
            .insert(insn, property);
    }

    /// Merges a property with whatever is recorded for the instruction in
    /// the current block.
    pub fn merge_property(&mut self, insn: InstrId, property: P) {
        let map = self.in_.entry(self.current).or_default();
        match map.get(&insn) {
            Some(existing) => {
                let merged = P::merge(existing, &property);
                map.insert(insn, merged);
            }
            None => {
                map.insert(insn, property);
            }
        }
    }

    /// The property of an instruction in the current block, defaulting to
    /// the safe value.
    #[must_use]
    pub fn get_property(&self, insn: InstrId) -> P {
        self.in_
            .get(&self.current)
            .and_then(|map| map.get(&insn))
            .cloned()
            .unwrap_or_else(P::default_value)
    }

    /// Rebuilds the current block's in map from its predecessors' out
    /// maps. The map is replaced, not accumulated, to avoid stale
    /// carry-over when blocks are revisited.
    ///
    /// A fact absent in one predecessor merges as the default value, so a
    /// narrowing established on one path cannot survive a join with a
    /// path that never established it. Unvisited predecessors (back
    /// edges) contribute defaults for every fact, which is exactly the
    /// conservative loop-header widening the property contract requires.
    fn merge_predecessors(&mut self) {
        let preds = self.graph.block(self.current).predecessors.clone();
        if preds.is_empty() {
            return;
        }

        let empty = HashMap::new();
        let pred_outs: Vec<&HashMap<InstrId, P>> = preds
            .iter()
            .map(|pred| self.out_.get(pred).unwrap_or(&empty))
            .collect();

        let mut keys: Vec<InstrId> = pred_outs
            .iter()
            .flat_map(|out| out.keys().copied())
            .collect();
        keys.sort_unstable();
        keys.dedup();

        let mut in_map = HashMap::with_capacity(keys.len());
        for key in keys {
            let mut acc: Option<P> = None;
            for out in &pred_outs {
                let fact = out.get(&key).cloned().unwrap_or_else(P::default_value);
                acc = Some(match acc {
                    None => fact,
                    Some(prev) => P::merge(&prev, &fact),
                });
            }
            if let Some(acc) = acc {
                in_map.insert(key, acc);
            }
        }
        self.in_.insert(self.current, in_map);
    }

    /// Computes a phi's property as the merge of its inputs' properties.
    fn handle_phi(&mut self, phi: InstrId) {
        let Op::Phi { ref inputs, .. } = self.graph.instr(phi).op else {
            return;
        };
        let mut value: Option<P> = None;
        for &(input, _) in inputs {
            let property = self.get_property(input);
            value = Some(match value {
                None => property,
                Some(acc) => P::merge(&acc, &property),
            });
        }
        if let Some(value) = value {
            self.set_property(phi, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::{BlockKind, PrimType};

    /// A simple "is known constant" fact for testing the engine.
    #[derive(Debug, Clone, PartialEq)]
    enum Known {
        Unknown,
        Value(i64),
        Conflict,
    }

    impl Property for Known {
        fn default_value() -> Self {
            Known::Unknown
        }

        fn merge(a: &Self, b: &Self) -> Self {
            match (a, b) {
                (Known::Unknown, x) | (x, Known::Unknown) => x.clone(),
                (Known::Value(x), Known::Value(y)) if x == y => Known::Value(*x),
                _ => Known::Conflict,
            }
        }
    }

    struct ConstVisitor;

    impl PropertyVisitor<Known> for ConstVisitor {
        fn visit_insn(&mut self, ctx: &mut ContextualizedPass<'_, Known>, insn: InstrId) {
            if let Op::Const { value } = ctx.graph().instr(insn).op {
                ctx.set_property(insn, Known::Value(value));
            }
        }
    }

    #[test]
    fn test_phi_property_is_merge_of_inputs() {
        // Diamond with a phi of two different constants.
        let mut graph = MirGraph::new(8, 2);
        let a = graph.alloc_block(BlockKind::Code);
        let b = graph.alloc_block(BlockKind::Code);
        let c = graph.alloc_block(BlockKind::Code);
        let join = graph.alloc_block(BlockKind::Code);
        graph.set_fall_through(graph.entry(), Some(a));
        graph.set_taken(a, Some(b));
        graph.set_fall_through(a, Some(c));
        graph.set_fall_through(b, Some(join));
        graph.set_fall_through(c, Some(join));

        let c1 = graph.alloc_instr(Op::Const { value: 1 }, 0, PrimType::Int);
        let c2 = graph.alloc_instr(Op::Const { value: 2 }, 1, PrimType::Int);
        graph.append_instr(b, c1);
        graph.append_instr(c, c2);
        let phi = graph.alloc_instr(
            Op::Phi {
                vreg: 0,
                inputs: vec![(c1, b), (c2, c)],
            },
            2,
            PrimType::Int,
        );
        graph.prepend_instr(join, phi);

        let mut pass = ContextualizedPass::new(&graph);
        pass.run(&mut ConstVisitor);

        // After the walk the block's final facts live in its out map.
        let out = pass.out_.get(&join).unwrap();
        assert_eq!(out.get(&phi), Some(&Known::Conflict));
        assert_eq!(out.get(&c1), Some(&Known::Value(1)));
    }

    #[test]
    fn test_agreeing_paths_keep_value() {
        // Both paths see the same constant defined before the split.
        let mut graph = MirGraph::new(8, 2);
        let a = graph.alloc_block(BlockKind::Code);
        let b = graph.alloc_block(BlockKind::Code);
        let c = graph.alloc_block(BlockKind::Code);
        let join = graph.alloc_block(BlockKind::Code);
        graph.set_fall_through(graph.entry(), Some(a));
        graph.set_taken(a, Some(b));
        graph.set_fall_through(a, Some(c));
        graph.set_fall_through(b, Some(join));
        graph.set_fall_through(c, Some(join));

        let c1 = graph.alloc_instr(Op::Const { value: 7 }, 0, PrimType::Int);
        graph.append_instr(a, c1);

        let mut pass = ContextualizedPass::new(&graph);
        pass.run(&mut ConstVisitor);

        let out = pass.out_.get(&join).unwrap();
        assert_eq!(out.get(&c1), Some(&Known::Value(7)));
    }

    #[test]
    fn test_default_for_unknown_instruction() {
        let graph = MirGraph::new(8, 2);
        let pass: ContextualizedPass<'_, Known> = ContextualizedPass::new(&graph);
        assert_eq!(pass.get_property(InstrId::new(0)), Known::Unknown);
    }
}
