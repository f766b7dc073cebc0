//! Range propagation: a `[min, max]` interval fact per int value.
//!
//! Constants produce exact ranges; add/sub/mul/div are evaluated in
//! 64-bit arithmetic and clamped back (overflow widens to the full
//! range). The true and false edges of comparisons against a constant
//! narrow the compared value in the successor block, and loop-header phis
//! are widened to the full range so no cross-iteration assumption leaks
//! in. Comparisons proven always-true or always-false are folded into
//! unconditional control flow after the walk.

use std::collections::HashSet;

use crate::{
    dataflow::{ContextualizedPass, Property, PropertyVisitor},
    mir::{BinOpKind, BlockId, IfKind, InstrId, MirGraph, Op, PrimType, UnOpKind},
};

/// A closed interval of possible 32-bit values.
///
/// The invalid range (`max < min`) marks a value proven impossible on the
/// current path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntRange {
    min: i32,
    max: i32,
}

impl IntRange {
    /// The full range: nothing is known.
    #[must_use]
    pub const fn full() -> Self {
        Self {
            min: i32::MIN,
            max: i32::MAX,
        }
    }

    /// The impossible range.
    #[must_use]
    pub const fn invalid() -> Self {
        Self {
            min: i32::MAX,
            max: i32::MIN,
        }
    }

    /// A single-value range.
    #[must_use]
    pub const fn exact(value: i32) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    /// Builds a range from 64-bit bounds, widening to the full range when
    /// the input overflows 32 bits.
    #[must_use]
    pub fn clamped(min: i64, max: i64) -> Self {
        if min < i64::from(i32::MIN) || max > i64::from(i32::MAX) {
            Self::full()
        } else if max < min {
            Self::invalid()
        } else {
            Self {
                min: min as i32,
                max: max as i32,
            }
        }
    }

    /// Lower bound (inclusive).
    #[must_use]
    pub const fn lower(&self) -> i32 {
        self.min
    }

    /// Upper bound (inclusive).
    #[must_use]
    pub const fn upper(&self) -> i32 {
        self.max
    }

    /// Returns `true` unless this is the impossible range.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.min <= self.max
    }

    /// Returns `true` if the range contains `value`.
    #[must_use]
    pub const fn contains(&self, value: i32) -> bool {
        self.is_valid() && self.min <= value && value <= self.max
    }

    /// Lowers the upper bound to `value` if that narrows the range.
    #[must_use]
    pub fn reduce_upper_bound(&self, value: i32) -> Self {
        if !self.is_valid() || self.min > value {
            return Self::invalid();
        }
        Self {
            min: self.min,
            max: value.min(self.max),
        }
    }

    /// Raises the lower bound to `value` if that narrows the range.
    #[must_use]
    pub fn reduce_lower_bound(&self, value: i32) -> Self {
        if !self.is_valid() || self.max < value {
            return Self::invalid();
        }
        Self {
            min: value.max(self.min),
            max: self.max,
        }
    }
}

impl Property for IntRange {
    fn default_value() -> Self {
        Self::full()
    }

    fn merge(a: &Self, b: &Self) -> Self {
        match (a.is_valid(), b.is_valid()) {
            (true, true) => Self {
                min: a.min.min(b.min),
                max: a.max.max(b.max),
            },
            (true, false) => *a,
            _ => *b,
        }
    }
}

/// Returns `true` for value categories the range lattice covers.
fn is_int_category(ty: PrimType) -> bool {
    matches!(
        ty,
        PrimType::Boolean | PrimType::Byte | PrimType::Char | PrimType::Short | PrimType::Int
    )
}

struct RangeVisitor<'h> {
    loop_headers: &'h HashSet<BlockId>,
    always_true: Vec<InstrId>,
    always_false: Vec<InstrId>,
}

impl RangeVisitor<'_> {
    /// Narrows the compared value on the current block's edge of its
    /// single predecessor's `if (value <cmp> constant)`.
    fn handle_coming_from_if(&mut self, ctx: &mut ContextualizedPass<'_, IntRange>, block: BlockId) {
        let graph = ctx.graph();
        let preds = &graph.block(block).predecessors;
        if preds.len() != 1 {
            return;
        }
        let pred = preds[0];
        let Some(last) = graph.block(pred).last_insn else {
            return;
        };
        let Op::If { kind, lhs, rhs } = graph.instr(last).op else {
            return;
        };

        let value = match rhs {
            None => 0,
            Some(rhs) => match graph.instr(rhs).op {
                Op::Const { value } if is_int_category(graph.instr(rhs).ty) => value as i32,
                _ => return,
            },
        };

        let taken = graph.block(pred).taken;
        let fall_through = graph.block(pred).fall_through;
        if taken == fall_through {
            // Degenerate branch where both edges land here.
            return;
        }

        // Strict comparisons shift the bound by one; at the i32 limits the
        // shifted bound is unsatisfiable and the edge is impossible.
        let raise_to = |range: IntRange, bound: i64| {
            if bound > i64::from(i32::MAX) {
                IntRange::invalid()
            } else {
                range.reduce_lower_bound(bound as i32)
            }
        };
        let cap_to = |range: IntRange, bound: i64| {
            if bound < i64::from(i32::MIN) {
                IntRange::invalid()
            } else {
                range.reduce_upper_bound(bound as i32)
            }
        };

        let range = ctx.get_property(lhs);
        if taken == Some(block) {
            let old_range = range;
            let range = match kind {
                IfKind::Gt => raise_to(range, i64::from(value) + 1),
                IfKind::Ge => range.reduce_lower_bound(value),
                IfKind::Lt => cap_to(range, i64::from(value) - 1),
                IfKind::Le => range.reduce_upper_bound(value),
                IfKind::Eq => range
                    .reduce_lower_bound(value)
                    .reduce_upper_bound(value),
                IfKind::Ne => {
                    if range.contains(value) {
                        return;
                    }
                    range
                }
            };

            // A narrowing that changes nothing means the branch condition
            // was already implied; an impossible range means it can never
            // be satisfied.
            if !range.is_valid() {
                self.always_false.push(last);
            } else if old_range == range {
                self.always_true.push(last);
            }
            ctx.set_property(lhs, range);
        } else if fall_through == Some(block) {
            let range = match kind {
                IfKind::Gt => range.reduce_upper_bound(value),
                IfKind::Ge => cap_to(range, i64::from(value) - 1),
                IfKind::Lt => range.reduce_lower_bound(value),
                IfKind::Le => raise_to(range, i64::from(value) + 1),
                IfKind::Ne => range
                    .reduce_lower_bound(value)
                    .reduce_upper_bound(value),
                IfKind::Eq => return,
            };
            ctx.set_property(lhs, range);
        }
    }
}

impl PropertyVisitor<IntRange> for RangeVisitor<'_> {
    fn before_block(&mut self, ctx: &mut ContextualizedPass<'_, IntRange>, block: BlockId) {
        if self.loop_headers.contains(&block) {
            // Values spanning loop iterations are not estimated; widen
            // every header phi to the full range.
            let phis: Vec<InstrId> = ctx
                .graph()
                .block_insns(block)
                .into_iter()
                .filter(|&i| ctx.graph().instr(i).is_phi())
                .collect();
            for phi in phis {
                ctx.set_property(phi, IntRange::full());
            }
        } else {
            self.handle_coming_from_if(ctx, block);
        }
    }

    fn visit_insn(&mut self, ctx: &mut ContextualizedPass<'_, IntRange>, insn: InstrId) {
        let instr = ctx.graph().instr(insn);
        if instr.dead || !is_int_category(instr.ty) {
            return;
        }
        match instr.op {
            Op::Const { value } => {
                ctx.set_property(insn, IntRange::exact(value as i32));
            }
            Op::BoundsCheck { index, .. } => {
                // The check passes its index through.
                let range = ctx.get_property(index);
                ctx.set_property(insn, range);
            }
            Op::UnOp {
                kind: UnOpKind::Neg,
                operand,
            } => {
                let a = ctx.get_property(operand);
                if !a.is_valid() {
                    ctx.set_property(insn, IntRange::invalid());
                    return;
                }
                let range =
                    IntRange::clamped(-i64::from(a.upper()), -i64::from(a.lower()));
                ctx.set_property(insn, range);
            }
            Op::BinOp { kind, lhs, rhs } => {
                let a = ctx.get_property(lhs);
                let b = ctx.get_property(rhs);
                if !a.is_valid() || !b.is_valid() {
                    ctx.set_property(insn, IntRange::invalid());
                    return;
                }
                let range = match kind {
                    BinOpKind::Add => IntRange::clamped(
                        i64::from(a.lower()) + i64::from(b.lower()),
                        i64::from(a.upper()) + i64::from(b.upper()),
                    ),
                    BinOpKind::Sub => IntRange::clamped(
                        i64::from(a.lower()) - i64::from(b.upper()),
                        i64::from(a.upper()) - i64::from(b.lower()),
                    ),
                    BinOpKind::Mul => {
                        let candidates = [
                            i64::from(a.lower()) * i64::from(b.lower()),
                            i64::from(a.lower()) * i64::from(b.upper()),
                            i64::from(a.upper()) * i64::from(b.lower()),
                            i64::from(a.upper()) * i64::from(b.upper()),
                        ];
                        IntRange::clamped(
                            *candidates.iter().min().expect("non-empty"),
                            *candidates.iter().max().expect("non-empty"),
                        )
                    }
                    BinOpKind::Div => {
                        // Pull the divisor endpoints off zero; a divisor
                        // range still spanning zero defeats estimation.
                        let mut b = b;
                        if b.lower() == 0 {
                            b = b.reduce_lower_bound(1);
                        } else if b.upper() == 0 {
                            b = b.reduce_upper_bound(-1);
                        }
                        if !b.is_valid() || (b.lower() < 0 && b.upper() > 0) {
                            return;
                        }
                        let candidates = [
                            i64::from(a.lower()) / i64::from(b.lower()),
                            i64::from(a.lower()) / i64::from(b.upper()),
                            i64::from(a.upper()) / i64::from(b.lower()),
                            i64::from(a.upper()) / i64::from(b.upper()),
                        ];
                        IntRange::clamped(
                            *candidates.iter().min().expect("non-empty"),
                            *candidates.iter().max().expect("non-empty"),
                        )
                    }
                    _ => return,
                };
                ctx.set_property(insn, range);
            }
            _ => {}
        }
    }
}

/// The range propagation pass.
pub struct RangePropagation;

impl RangePropagation {
    /// Runs range propagation, folding comparisons proven always-true or
    /// always-false into unconditional control flow.
    ///
    /// Returns `true` if the graph changed. Running the pass a second
    /// time on a loop-free method changes nothing (the first run reaches
    /// the fixed point).
    pub fn run(graph: &mut MirGraph) -> bool {
        graph.compute_dominators();
        let loop_headers: HashSet<BlockId> =
            graph.detect_loops().iter().map(|l| l.header).collect();

        let mut visitor = RangeVisitor {
            loop_headers: &loop_headers,
            always_true: Vec::new(),
            always_false: Vec::new(),
        };
        ContextualizedPass::new(graph).run(&mut visitor);

        let mut changed = false;
        for insn in visitor.always_true {
            if !graph.instr(insn).is_live() {
                continue;
            }
            // The branch is always taken: drop the fallthrough edge and
            // degrade the comparison to a goto.
            let block = graph.instr(insn).block;
            graph.set_fall_through(block, None);
            graph.instr_mut(insn).op = Op::Goto;
            graph.block_mut(block).conditional_branch = false;
            changed = true;
        }
        for insn in visitor.always_false {
            if !graph.instr(insn).is_live() {
                continue;
            }
            // The branch is never taken: drop the taken edge entirely.
            let block = graph.instr(insn).block;
            graph.set_taken(block, None);
            graph.remove_instr(insn);
            graph.block_mut(block).conditional_branch = false;
            changed = true;
        }
        changed
    }
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

    fn conditional_blocks(graph: &MirGraph) -> usize {
        graph
            .block_ids()
            .filter(|&b| graph.block(b).conditional_branch)
            .count()
    }

    #[test]
    fn test_range_arithmetic() {
        assert_eq!(IntRange::exact(5).reduce_upper_bound(3).upper(), 3);
        assert!(!IntRange::exact(5).reduce_upper_bound(4).is_valid());
        assert_eq!(
            IntRange::clamped(i64::from(i32::MAX) + 1, i64::from(i32::MAX) + 2),
            IntRange::full()
        );
        let merged = IntRange::merge(&IntRange::exact(1), &IntRange::exact(9));
        assert_eq!(merged.lower(), 1);
        assert_eq!(merged.upper(), 9);
        assert_eq!(
            IntRange::merge(&IntRange::invalid(), &IntRange::exact(4)),
            IntRange::exact(4)
        );
    }

    #[test]
    fn test_implied_comparison_becomes_goto() {
        // v0 = 5; if (v0 >= 1) return 1; return 0 - always true.
        let mut asm = CodeAssembler::new(2, 0);
        asm.const4(0, 5)
            .unwrap()
            .const4(1, 1)
            .unwrap()
            .if_ge(0, 1, "yes")
            .unwrap()
            .const4(0, 0)
            .unwrap()
            .return_val(0)
            .unwrap()
            .label("yes")
            .unwrap()
            .const4(0, 1)
            .unwrap()
            .return_val(0)
            .unwrap();
        let mut graph = prepared(asm);

        assert_eq!(conditional_blocks(&graph), 1);
        let changed = RangePropagation::run(&mut graph);
        assert!(changed);
        assert_eq!(conditional_blocks(&graph), 0);
        graph.check_consistency().unwrap();

        // The branch block now ends in a goto with only the taken edge.
        let branch_block = graph
            .block_ids()
            .find(|&b| {
                graph
                    .block_insns(b)
                    .iter()
                    .any(|&i| matches!(graph.instr(i).op, Op::Goto))
            })
            .expect("folded branch");
        assert!(graph.block(branch_block).taken.is_some());
        assert!(graph.block(branch_block).fall_through.is_none());
    }

    #[test]
    fn test_impossible_comparison_edge_dropped() {
        // v0 = -3; if (v0 >= 0) ... - never taken.
        let mut asm = CodeAssembler::new(1, 0);
        asm.const4(0, -3)
            .unwrap()
            .if_gez(0, "dead")
            .unwrap()
            .return_val(0)
            .unwrap()
            .label("dead")
            .unwrap()
            .const4(0, 1)
            .unwrap()
            .return_val(0)
            .unwrap();
        let mut graph = prepared(asm);

        let changed = RangePropagation::run(&mut graph);
        assert!(changed);
        graph.check_consistency().unwrap();

        let branch_block = graph.block_at_offset(0).unwrap();
        assert!(graph.block(branch_block).taken.is_none());
        assert!(graph.block(branch_block).fall_through.is_some());
    }

    #[test]
    fn test_narrowed_branch_implies_nested_condition() {
        // if (v2 > 5) { if (v2 > 3) {...} } - the inner test is implied.
        let mut asm = CodeAssembler::new(3, 1);
        asm.param_types(&[crate::mir::PrimType::Int]);
        asm.const4(0, 5)
            .unwrap()
            .const4(1, 3)
            .unwrap()
            .if_le(2, 0, "out")
            .unwrap()
            .if_gt(2, 1, "inner")
            .unwrap()
            .label("out")
            .unwrap()
            .return_void()
            .unwrap()
            .label("inner")
            .unwrap()
            .return_void()
            .unwrap();
        let mut graph = prepared(asm);

        assert_eq!(conditional_blocks(&graph), 2);
        let changed = RangePropagation::run(&mut graph);
        assert!(changed);
        // Only the inner comparison folds; the outer test is real.
        assert_eq!(conditional_blocks(&graph), 1);
    }

    #[test]
    fn test_loop_header_phi_is_widened() {
        // for (v0 = 0; v0 < v2; v0++) {} - the loop test must survive:
        // cross-iteration values are not estimated.
        let mut asm = CodeAssembler::new(3, 1);
        asm.param_types(&[crate::mir::PrimType::Int]);
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
            .return_void()
            .unwrap();
        let mut graph = prepared(asm);

        let changed = RangePropagation::run(&mut graph);
        assert!(!changed);
        assert_eq!(conditional_blocks(&graph), 1);
    }

    #[test]
    fn test_second_run_reaches_fixed_point() {
        let mut asm = CodeAssembler::new(2, 0);
        asm.const4(0, 5)
            .unwrap()
            .const4(1, 1)
            .unwrap()
            .if_ge(0, 1, "yes")
            .unwrap()
            .return_val(0)
            .unwrap()
            .label("yes")
            .unwrap()
            .return_val(1)
            .unwrap();
        let mut graph = prepared(asm);

        assert!(RangePropagation::run(&mut graph));
        assert!(!RangePropagation::run(&mut graph));
        graph.check_consistency().unwrap();
    }
}
