//! Bounds-check elimination.
//!
//! A single reverse post-order walk over the dominator tree infers value
//! ranges for int values and removes `BoundsCheck` instructions whose
//! index provably fits `[0, array.length - 1]`. Ranges are looked up by
//! walking *up* the dominator tree, so an inference is visible exactly to
//! the instructions it dominates.
//!
//! The moving parts:
//!
//! - [`ValueBound`] - `instruction + constant` with saturating semantics
//!   at the i32 limits; array lengths and allocations are symbolic bounds
//! - [`ValueRange`] - an inclusive `[lower, upper]` pair, or a monotonic
//!   induction range that must survive an overflow proof before it can be
//!   narrowed against a comparison-derived range
//! - comparison handling pushes narrowed ranges only into the matching
//!   successor's map; an `array.length`-relative lower bound is never
//!   treated as useful
//! - constant-index checks record `length >= constant + 1` facts for
//!   later checks in dominated blocks, and allocations with known sizes
//!   seed range facts keyed to the not-yet-materialized length value
//!
//! Eliminating a check rewires its uses to the raw index and deletes the
//! pseudo-instruction; the preceding null check is deliberately left for
//! other passes to judge.

use std::collections::{HashMap, HashSet};

use crate::mir::{BinOpKind, BlockId, IfKind, InstrId, MirGraph, Op, PrimType};

/// A value bound: `instruction + constant`, or a pure constant when the
/// instruction is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueBound {
    instruction: Option<InstrId>,
    constant: i32,
}

/// Strips null-check wrappers off a reference value.
fn strip_null_checks(graph: &MirGraph, mut value: InstrId) -> InstrId {
    while let Op::NullCheck { object } = graph.instr(value).op {
        value = object;
    }
    value
}

/// `Some((left, constant))` when `instruction` is `left + constant` or
/// `left - constant` with a constant right operand.
fn as_add_or_sub_constant(graph: &MirGraph, instruction: InstrId) -> Option<(InstrId, i32)> {
    let Op::BinOp { kind, lhs, rhs } = graph.instr(instruction).op else {
        return None;
    };
    let negate = match kind {
        BinOpKind::Add => false,
        BinOpKind::Sub => true,
        _ => return None,
    };
    let Op::Const { value } = graph.instr(rhs).op else {
        return None;
    };
    let c = value as i32;
    Some((lhs, if negate { c.wrapping_neg() } else { c }))
}

impl ValueBound {
    /// Creates a bound, normalizing `constant-instruction + c` into a pure
    /// constant when that cannot overflow.
    #[must_use]
    pub fn new(graph: &MirGraph, instruction: Option<InstrId>, constant: i32) -> Self {
        if let Some(id) = instruction {
            if let Op::Const { value } = graph.instr(id).op {
                let instr_const = value as i32;
                if constant >= 0 && instr_const <= i32::MAX - constant {
                    return Self {
                        instruction: None,
                        constant: instr_const + constant,
                    };
                }
                if constant < 0 && instr_const >= i32::MIN - constant {
                    return Self {
                        instruction: None,
                        constant: instr_const + constant,
                    };
                }
            }
        }
        Self {
            instruction,
            constant,
        }
    }

    /// The smallest representable bound.
    #[must_use]
    pub const fn min() -> Self {
        Self {
            instruction: None,
            constant: i32::MIN,
        }
    }

    /// The largest representable bound.
    #[must_use]
    pub const fn max() -> Self {
        Self {
            instruction: None,
            constant: i32::MAX,
        }
    }

    /// The symbolic part of the bound.
    #[must_use]
    pub const fn instruction(&self) -> Option<InstrId> {
        self.instruction
    }

    /// The constant part of the bound.
    #[must_use]
    pub const fn constant(&self) -> i32 {
        self.constant
    }

    /// Returns `true` for pure-constant bounds.
    #[must_use]
    pub const fn is_constant(&self) -> bool {
        self.instruction.is_none()
    }

    /// Returns `true` when the symbolic part is an array length or a
    /// fresh allocation.
    #[must_use]
    pub fn is_related_to_array_length(&self, graph: &MirGraph) -> bool {
        match self.instruction {
            Some(id) => matches!(
                graph.instr(id).op,
                Op::ArrayLength { .. } | Op::NewArray { .. }
            ),
            None => false,
        }
    }

    /// Detects a useful bound shape in a value: a constant, an array
    /// length, or `array.length ± c`.
    fn detect_from_value(graph: &MirGraph, instruction: InstrId) -> Option<Self> {
        match graph.instr(instruction).op {
            Op::Const { value } => Some(Self {
                instruction: None,
                constant: value as i32,
            }),
            Op::ArrayLength { .. } => Some(Self {
                instruction: Some(instruction),
                constant: 0,
            }),
            _ => {
                let (left, right) = as_add_or_sub_constant(graph, instruction)?;
                if matches!(graph.instr(left).op, Op::ArrayLength { .. }) {
                    Some(Self {
                        instruction: Some(left),
                        constant: right,
                    })
                } else {
                    None
                }
            }
        }
    }

    /// Symbolic equality: identical instructions, with an array length of
    /// a fresh allocation treated as the allocation itself.
    fn instructions_equal(
        graph: &MirGraph,
        instruction1: Option<InstrId>,
        instruction2: Option<InstrId>,
    ) -> bool {
        if instruction1 == instruction2 {
            return true;
        }
        let (Some(mut a), Some(mut b)) = (instruction1, instruction2) else {
            return false;
        };
        if let Op::ArrayLength { array } = graph.instr(a).op {
            let root = strip_null_checks(graph, array);
            if matches!(graph.instr(root).op, Op::NewArray { .. }) {
                a = root;
            }
        }
        if let Op::ArrayLength { array } = graph.instr(b).op {
            let root = strip_null_checks(graph, array);
            if matches!(graph.instr(root).op, Op::NewArray { .. }) {
                b = root;
            }
        }
        a == b
    }

    /// Returns `true` when it is certain that `self >= other`.
    #[must_use]
    pub fn greater_than_or_equal_to(&self, graph: &MirGraph, other: &ValueBound) -> bool {
        Self::instructions_equal(graph, self.instruction, other.instruction)
            && self.constant >= other.constant
    }

    /// Returns `true` when it is certain that `self <= other`.
    #[must_use]
    pub fn less_than_or_equal_to(&self, graph: &MirGraph, other: &ValueBound) -> bool {
        Self::instructions_equal(graph, self.instruction, other.instruction)
            && self.constant <= other.constant
    }

    /// The greater of two lower bounds when comparable; favors the
    /// constant bound otherwise.
    fn narrow_lower_bound(graph: &MirGraph, bound1: ValueBound, bound2: ValueBound) -> ValueBound {
        if bound1.greater_than_or_equal_to(graph, &bound2) {
            return bound1;
        }
        if bound2.greater_than_or_equal_to(graph, &bound1) {
            return bound2;
        }
        if bound1.is_constant() {
            bound1
        } else {
            bound2
        }
    }

    /// The lower of two upper bounds when comparable; favors the
    /// array-length bound otherwise.
    fn narrow_upper_bound(graph: &MirGraph, bound1: ValueBound, bound2: ValueBound) -> ValueBound {
        if bound1.less_than_or_equal_to(graph, &bound2) {
            return bound1;
        }
        if bound2.less_than_or_equal_to(graph, &bound1) {
            return bound2;
        }
        if bound1.is_related_to_array_length(graph) {
            bound1
        } else {
            bound2
        }
    }

    /// Adds a constant with saturating semantics.
    ///
    /// Returns `(bound, overflow, underflow)`; a saturated result is only
    /// usable when the matching flag is clear.
    fn add(&self, graph: &MirGraph, c: i32) -> (ValueBound, bool, bool) {
        if c == 0 {
            return (*self, false, false);
        }
        if c > 0 {
            if self.constant > i32::MAX - c {
                return (Self::max(), true, false);
            }
            let new_constant = self.constant + c;
            if self.instruction.is_none()
                || (self.is_related_to_array_length(graph) && new_constant <= 0)
            {
                return (
                    Self {
                        instruction: self.instruction,
                        constant: new_constant,
                    },
                    false,
                    false,
                );
            }
            // `length + positive` may exceed the int range.
            (Self::max(), true, false)
        } else {
            if self.constant < i32::MIN - c {
                return (Self::min(), false, true);
            }
            let new_constant = self.constant + c;
            // `length - c` never underflows.
            if self.is_constant() || self.is_related_to_array_length(graph) {
                return (
                    Self {
                        instruction: self.instruction,
                        constant: new_constant,
                    },
                    false,
                    false,
                );
            }
            (Self::min(), false, true)
        }
    }
}

/// An inferred value range: a plain inclusive interval, or a monotonic
/// induction range awaiting its overflow proof.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueRange {
    /// Inclusive `[lower, upper]`.
    Normal {
        /// Inclusive lower bound.
        lower: ValueBound,
        /// Inclusive upper bound.
        upper: ValueBound,
    },
    /// An induction variable: `initial`, then `initial + increment`, ...
    /// Treated as the full range until narrowed against a concrete
    /// comparison-derived range with the overflow proof established.
    Monotonic {
        /// The phi's initial (pre-header) value.
        initial: InstrId,
        /// Per-iteration increment (never 0).
        increment: i32,
        /// Additional bound info on the initial value.
        bound: ValueBound,
    },
}

impl ValueRange {
    /// The effective lower bound (the full-range minimum for monotonic).
    #[must_use]
    pub fn lower(&self) -> ValueBound {
        match self {
            ValueRange::Normal { lower, .. } => *lower,
            ValueRange::Monotonic { .. } => ValueBound::min(),
        }
    }

    /// The effective upper bound (the full-range maximum for monotonic).
    #[must_use]
    pub fn upper(&self) -> ValueBound {
        match self {
            ValueRange::Normal { upper, .. } => *upper,
            ValueRange::Monotonic { .. } => ValueBound::max(),
        }
    }

    /// Whether this range certainly fits inside `other`.
    ///
    /// A monotonic range never fits a concrete range on its own: it must
    /// first be narrowed.
    #[must_use]
    pub fn fits_in(&self, graph: &MirGraph, other: Option<&ValueRange>) -> bool {
        let Some(other) = other else {
            return true;
        };
        match self {
            ValueRange::Monotonic { .. } => false,
            ValueRange::Normal { lower, upper } => {
                lower.greater_than_or_equal_to(graph, &other.lower())
                    && upper.less_than_or_equal_to(graph, &other.upper())
            }
        }
    }

    /// Intersects this range with `range`.
    ///
    /// For a monotonic range this attempts the narrowing proof: only when
    /// the last value in the induction sequence provably cannot overflow
    /// (or underflow) before the loop-exit test fires does the result
    /// become a concrete range. The proof is only attempted for constant
    /// initial values; otherwise the monotonic range is returned
    /// unchanged.
    #[must_use]
    pub fn narrow(&self, graph: &MirGraph, range: Option<&ValueRange>) -> ValueRange {
        let Some(range) = range else {
            return self.clone();
        };
        if matches!(range, ValueRange::Monotonic { .. }) {
            return self.clone();
        }

        match self {
            ValueRange::Normal { lower, upper } => ValueRange::Normal {
                lower: ValueBound::narrow_lower_bound(graph, *lower, range.lower()),
                upper: ValueBound::narrow_upper_bound(graph, *upper, range.upper()),
            },
            ValueRange::Monotonic {
                initial,
                increment,
                bound,
            } => {
                if *increment > 0 {
                    // Monotonically increasing.
                    let lower = ValueBound::narrow_lower_bound(graph, *bound, range.lower());

                    // Conservatively assume the maximum array length is
                    // i32::MAX; the largest value range's upper can take:
                    let upper_bound = range.upper();
                    let upper_constant = upper_bound.constant();
                    let upper: i32 = if upper_bound.is_constant() {
                        upper_constant
                    } else if upper_constant <= 0 {
                        // The usual shapes: <= length - 1, < size, ...
                        i32::MAX + upper_constant
                    } else {
                        i32::MAX
                    };

                    // Prove the last number in the sequence initial,
                    // initial + increment, ... that is <= upper cannot
                    // overflow when incremented once more.
                    let mut last_num_in_sequence = i64::from(upper);
                    if let Op::Const { value } = graph.instr(*initial).op {
                        let initial_constant = value as i32;
                        if upper <= initial_constant {
                            last_num_in_sequence = i64::from(upper);
                        } else {
                            last_num_in_sequence = i64::from(initial_constant)
                                + (i64::from(upper) - i64::from(initial_constant))
                                    / i64::from(*increment)
                                    * i64::from(*increment);
                        }
                    }
                    if last_num_in_sequence <= i64::from(i32::MAX - increment) {
                        return ValueRange::Normal {
                            lower,
                            upper: range.upper(),
                        };
                    }
                    // Might overflow: give up narrowing.
                    self.clone()
                } else {
                    // Monotonically decreasing.
                    let upper = ValueBound::narrow_upper_bound(graph, *bound, range.upper());

                    // Underflow-safe only for a constant lower bound far
                    // enough from the minimum.
                    let lower_bound = range.lower();
                    if lower_bound.is_constant() {
                        let constant = lower_bound.constant();
                        if i64::from(constant) >= i64::from(i32::MIN) - i64::from(*increment) {
                            return ValueRange::Normal {
                                lower: lower_bound,
                                upper,
                            };
                        }
                    }
                    self.clone()
                }
            }
        }
    }

    /// Shifts a range by a constant, or `None` when a bound would wrap.
    #[must_use]
    pub fn add_constant(&self, graph: &MirGraph, constant: i32) -> Option<ValueRange> {
        let (lower, _, underflow) = self.lower().add(graph, constant);
        if underflow {
            return None;
        }
        let (upper, overflow, _) = self.upper().add(graph, constant);
        if overflow {
            return None;
        }
        Some(ValueRange::Normal { lower, upper })
    }
}

/// The bounds-check elimination pass.
pub struct BcePass;

impl BcePass {
    /// Runs elimination over the dominator tree.
    ///
    /// Returns `true` if any check was removed. Reverse post order
    /// guarantees a block's dominators are visited first: a range proven
    /// at one instruction holds for every dominated use and can only be
    /// narrowed further down the tree.
    pub fn run(graph: &mut MirGraph) -> bool {
        graph.compute_dominators();
        let loop_headers: HashSet<BlockId> =
            graph.detect_loops().iter().map(|l| l.header).collect();

        let mut bce = Bce {
            graph,
            loop_headers,
            maps: HashMap::new(),
            changed: false,
        };
        bce.run();
        bce.changed
    }
}

struct Bce<'g> {
    graph: &'g mut MirGraph,
    loop_headers: HashSet<BlockId>,
    /// Proven value ranges at the beginning of each basic block.
    maps: HashMap<BlockId, HashMap<InstrId, ValueRange>>,
    changed: bool,
}

impl Bce<'_> {
    fn run(&mut self) {
        for block in self.graph.reverse_postorder() {
            for insn in self.graph.block_insns(block) {
                if self.graph.instr(insn).dead {
                    continue;
                }
                match self.graph.instr(insn).op.clone() {
                    Op::Phi { ref inputs, .. } => self.visit_phi(insn, block, inputs),
                    Op::If { kind, lhs, rhs } => self.visit_if(block, kind, lhs, rhs),
                    Op::BoundsCheck { index, length } => {
                        self.visit_bounds_check(insn, block, index, length);
                    }
                    Op::BinOp {
                        kind: BinOpKind::Add,
                        lhs,
                        rhs,
                    } => self.visit_add(insn, block, lhs, rhs),
                    Op::BinOp {
                        kind: BinOpKind::Sub,
                        lhs,
                        rhs,
                    } => self.visit_sub(insn, block, lhs, rhs),
                    Op::NewArray { length, .. } => self.visit_new_array(insn, block, length),
                    _ => {}
                }
            }
        }
    }

    /// Traverses up the dominator tree to look for value range info.
    fn lookup_range(&self, instruction: InstrId, block: BlockId) -> Option<&ValueRange> {
        let mut cur = Some(block);
        while let Some(b) = cur {
            if let Some(range) = self.maps.get(&b).and_then(|m| m.get(&instruction)) {
                return Some(range);
            }
            cur = self.graph.idom(b);
        }
        None
    }

    /// Array lengths may carry more info through their allocation.
    fn lookup_range_for_array_length(
        &self,
        array_length: InstrId,
        block: BlockId,
    ) -> Option<&ValueRange> {
        if let Some(range) = self.lookup_range(array_length, block) {
            // Only constant lower bounds are recorded for lengths.
            if range.lower().is_constant() {
                return Some(range);
            }
            return None;
        }
        if let Op::ArrayLength { array } = self.graph.instr(array_length).op {
            let root = strip_null_checks(self.graph, array);
            if matches!(self.graph.instr(root).op, Op::NewArray { .. }) {
                let range = self.lookup_range(root, block)?;
                if range.lower().is_constant() {
                    return Some(range);
                }
            }
        }
        None
    }

    fn overwrite(&mut self, block: BlockId, instruction: InstrId, range: ValueRange) {
        self.maps
            .entry(block)
            .or_default()
            .insert(instruction, range);
    }

    /// Narrows `instruction`'s range at the end of `block` with `range`
    /// and pushes the result down to `successor` only - per-block,
    /// per-edge specificity is what keeps the inference sound.
    fn apply_range_from_comparison(
        &mut self,
        instruction: InstrId,
        block: BlockId,
        successor: BlockId,
        range: ValueRange,
    ) {
        if self.graph.block(successor).predecessors.len() != 1 {
            // A critical edge would leak the fact to other paths.
            return;
        }
        let narrowed = match self.lookup_range(instruction, block) {
            Some(existing) => existing.narrow(self.graph, Some(&range)),
            None => range,
        };
        self.overwrite(successor, instruction, narrowed);
    }

    /// Handles `if (left <cmp> right)`.
    fn visit_if(&mut self, block: BlockId, kind: IfKind, left: InstrId, rhs: Option<InstrId>) {
        if !matches!(kind, IfKind::Lt | IfKind::Le | IfKind::Gt | IfKind::Ge) {
            return;
        }
        let Some(true_successor) = self.graph.block(block).taken else {
            return;
        };
        let Some(false_successor) = self.graph.block(block).fall_through else {
            return;
        };

        // Detect a recognizable bound shape on the right-hand side; the
        // zero-compare family compares against constant 0.
        let bound = match rhs {
            None => Some(ValueBound::new(self.graph, None, 0)),
            Some(right) => ValueBound::detect_from_value(self.graph, right),
        };
        let (lower, upper) = match bound {
            Some(bound) => (bound, bound),
            None => {
                // For `i < j`, j's own range still bounds i.
                let right = rhs.expect("bound detection only fails with an rhs");
                match self.lookup_range(right, block) {
                    Some(range) => (range.lower(), range.upper()),
                    None => (ValueBound::min(), ValueBound::max()),
                }
            }
        };

        match kind {
            IfKind::Lt | IfKind::Le => {
                if upper != ValueBound::max() {
                    // The upper bound is inclusive: compensate strictness.
                    let compensation = if kind == IfKind::Lt { -1 } else { 0 };
                    let (new_upper, overflow, underflow) =
                        upper.add(self.graph, compensation);
                    if overflow || underflow {
                        return;
                    }
                    let new_range = ValueRange::Normal {
                        lower: ValueBound::min(),
                        upper: new_upper,
                    };
                    self.apply_range_from_comparison(left, block, true_successor, new_range);
                }

                // An array.length-relative lower bound is never useful.
                if lower != ValueBound::min() && !lower.is_related_to_array_length(self.graph) {
                    let compensation = if kind == IfKind::Le { 1 } else { 0 };
                    let (new_lower, overflow, underflow) =
                        lower.add(self.graph, compensation);
                    if overflow || underflow {
                        return;
                    }
                    let new_range = ValueRange::Normal {
                        lower: new_lower,
                        upper: ValueBound::max(),
                    };
                    self.apply_range_from_comparison(left, block, false_successor, new_range);
                }
            }
            IfKind::Gt | IfKind::Ge => {
                if lower != ValueBound::min() && !lower.is_related_to_array_length(self.graph) {
                    let compensation = if kind == IfKind::Gt { 1 } else { 0 };
                    let (new_lower, overflow, underflow) =
                        lower.add(self.graph, compensation);
                    if overflow || underflow {
                        return;
                    }
                    let new_range = ValueRange::Normal {
                        lower: new_lower,
                        upper: ValueBound::max(),
                    };
                    self.apply_range_from_comparison(left, block, true_successor, new_range);
                }

                if upper != ValueBound::max() {
                    let compensation = if kind == IfKind::Ge { -1 } else { 0 };
                    let (new_upper, overflow, underflow) =
                        upper.add(self.graph, compensation);
                    if overflow || underflow {
                        return;
                    }
                    let new_range = ValueRange::Normal {
                        lower: ValueBound::min(),
                        upper: new_upper,
                    };
                    self.apply_range_from_comparison(left, block, false_successor, new_range);
                }
            }
            _ => {}
        }
    }

    fn visit_bounds_check(
        &mut self,
        bounds_check: InstrId,
        block: BlockId,
        index: InstrId,
        array_length: InstrId,
    ) {
        if let Op::Const { value } = self.graph.instr(index).op {
            let constant = value as i32;
            if let Some(range) = self.lookup_range_for_array_length(array_length, block) {
                if constant < range.lower().constant() {
                    self.replace_bounds_check(bounds_check, index);
                    return;
                }
            }

            // An access like `array[5]` establishes `length >= 6` for
            // everything dominated by this check. A non-constant index
            // proves nothing for smaller indices: the lower-bound side is
            // still open.
            let lower = ValueBound::new(self.graph, None, constant.saturating_add(1));
            let range = ValueRange::Normal {
                lower,
                upper: ValueBound::max(),
            };
            let new_range = match self.lookup_range(array_length, block) {
                Some(existing) => range.narrow(self.graph, Some(&existing.clone())),
                None => range,
            };
            self.overwrite(block, array_length, new_range);
            return;
        }

        let Some(index_range) = self.lookup_range(index, block).cloned() else {
            return;
        };
        let lower = ValueBound::new(self.graph, None, 0);
        let mut upper = ValueBound::new(self.graph, Some(array_length), -1);
        if index_range.upper().is_constant() {
            // Try for a constant-format upper bound through a recorded
            // minimum length.
            if let Some(length_range) = self.lookup_range_for_array_length(array_length, block)
            {
                upper =
                    ValueBound::new(self.graph, None, length_range.lower().constant() - 1);
            }
        }
        let array_range = ValueRange::Normal { lower, upper };
        if index_range.fits_in(self.graph, Some(&array_range)) {
            self.replace_bounds_check(bounds_check, index);
        }
    }

    fn replace_bounds_check(&mut self, bounds_check: InstrId, index: InstrId) {
        self.graph.replace_uses(bounds_check, index);
        self.graph.remove_instr(bounds_check);
        self.changed = true;
    }

    /// Recognizes loop-header phis of induction variables.
    fn visit_phi(&mut self, phi: InstrId, block: BlockId, inputs: &[(InstrId, BlockId)]) {
        if !self.loop_headers.contains(&block)
            || self.graph.instr(phi).ty != PrimType::Int
            || inputs.len() != 2
        {
            return;
        }

        // One input is the initial value, the other `phi ± constant`
        // coming around the back edge.
        let (initial_value, increment) = {
            let matches_back_edge = |candidate: InstrId| -> Option<i32> {
                let (left, increment) = as_add_or_sub_constant(self.graph, candidate)?;
                (left == phi).then_some(increment)
            };
            if let Some(inc) = matches_back_edge(inputs[1].0) {
                (inputs[0].0, inc)
            } else if let Some(inc) = matches_back_edge(inputs[0].0) {
                (inputs[1].0, inc)
            } else {
                return;
            }
        };

        let range = if increment == 0 {
            // Adding zero: really a fixed value.
            ValueRange::Normal {
                lower: ValueBound::new(self.graph, Some(initial_value), 0),
                upper: ValueBound::new(self.graph, Some(initial_value), 0),
            }
        } else {
            let bound = match ValueBound::detect_from_value(self.graph, initial_value) {
                Some(bound) => bound,
                None => match self.lookup_range(initial_value, block) {
                    // An initial value without a recognizable bound can
                    // still contribute its own range endpoint.
                    Some(initial_range) => {
                        if increment > 0 {
                            initial_range.lower()
                        } else {
                            initial_range.upper()
                        }
                    }
                    None => {
                        if increment > 0 {
                            ValueBound::min()
                        } else {
                            ValueBound::max()
                        }
                    }
                },
            };
            ValueRange::Monotonic {
                initial: initial_value,
                increment,
                bound,
            }
        };
        self.overwrite(block, phi, range);
    }

    fn visit_add(&mut self, add: InstrId, block: BlockId, lhs: InstrId, rhs: InstrId) {
        let Op::Const { value } = self.graph.instr(rhs).op else {
            return;
        };
        let Some(left_range) = self.lookup_range(lhs, block).cloned() else {
            return;
        };
        if let Some(range) = left_range.add_constant(self.graph, value as i32) {
            self.overwrite(block, add, range);
        }
    }

    fn visit_sub(&mut self, sub: InstrId, block: BlockId, lhs: InstrId, rhs: InstrId) {
        if let Op::Const { value } = self.graph.instr(rhs).op {
            if let Some(left_range) = self.lookup_range(lhs, block).cloned() {
                if let Some(range) =
                    left_range.add_constant(self.graph, (value as i32).wrapping_neg())
                {
                    self.overwrite(block, sub, range);
                    return;
                }
            }
        }

        // The triangular nested-loop case: `array.length - v` where v is
        // in `[c1, array.length + c2]` gets `[-c2, array.length - c1]`.
        if !matches!(self.graph.instr(lhs).op, Op::ArrayLength { .. }) {
            return;
        }
        let Some(right_range) = self.lookup_range(rhs, block).cloned() else {
            return;
        };
        let lower = right_range.lower();
        let upper = right_range.upper();
        if !lower.is_constant() || !upper.is_related_to_array_length(self.graph) {
            return;
        }
        if upper.instruction() == Some(lhs) {
            let range = ValueRange::Normal {
                lower: ValueBound::new(self.graph, None, upper.constant().wrapping_neg()),
                upper: ValueBound::new(self.graph, Some(lhs), lower.constant().wrapping_neg()),
            };
            self.overwrite(block, sub, range);
        }
    }

    /// Seeds length facts for allocations with known size expressions.
    fn visit_new_array(&mut self, new_array: InstrId, block: BlockId, length: InstrId) {
        if let Op::Const { value } = self.graph.instr(length).op {
            // Record `new_array >= len`; the range is keyed to the
            // allocation since the length value does not exist yet.
            let range = ValueRange::Normal {
                lower: ValueBound::new(self.graph, None, value as i32),
                upper: ValueBound::max(),
            };
            self.overwrite(block, new_array, range);
        } else if let Some((left, right_const)) = as_add_or_sub_constant(self.graph, length) {
            // `left + c` sizes the array: `-c <= left <= new_array - c`.
            let range = ValueRange::Normal {
                lower: ValueBound::new(self.graph, None, right_const.wrapping_neg()),
                upper: ValueBound::new(self.graph, Some(new_array), right_const.wrapping_neg()),
            };
            self.overwrite(block, left, range);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::BlockKind;

    fn test_graph() -> (MirGraph, BlockId) {
        let mut graph = MirGraph::new(16, 4);
        let block = graph.alloc_block(BlockKind::Code);
        graph.set_fall_through(graph.entry(), Some(block));
        (graph, block)
    }

    #[test]
    fn test_bound_normalizes_constants() {
        let (mut graph, block) = test_graph();
        let c = graph.alloc_instr(Op::Const { value: 10 }, 0, PrimType::Int);
        graph.append_instr(block, c);

        let bound = ValueBound::new(&graph, Some(c), 5);
        assert!(bound.is_constant());
        assert_eq!(bound.constant(), 15);
    }

    #[test]
    fn test_bound_comparisons_require_same_instruction() {
        let (mut graph, block) = test_graph();
        let param = graph.alloc_instr(Op::Param { index: 0 }, 0, PrimType::Ref);
        let nc = graph.alloc_instr(Op::NullCheck { object: param }, 0, PrimType::Ref);
        let len = graph.alloc_instr(Op::ArrayLength { array: nc }, 0, PrimType::Int);
        graph.append_instr(block, param);
        graph.append_instr(block, nc);
        graph.append_instr(block, len);

        let len_minus_1 = ValueBound::new(&graph, Some(len), -1);
        let len_bound = ValueBound::new(&graph, Some(len), 0);
        assert!(len_minus_1.less_than_or_equal_to(&graph, &len_bound));
        assert!(!len_bound.less_than_or_equal_to(&graph, &len_minus_1));

        // Plain constants never compare against symbolic bounds.
        let five = ValueBound::new(&graph, None, 5);
        assert!(!five.less_than_or_equal_to(&graph, &len_bound));
    }

    #[test]
    fn test_new_array_length_equivalence() {
        let (mut graph, block) = test_graph();
        let size = graph.alloc_instr(Op::Const { value: 8 }, 0, PrimType::Int);
        let alloc = graph.alloc_instr(
            Op::NewArray {
                length: size,
                class_idx: 0,
            },
            0,
            PrimType::Ref,
        );
        let nc = graph.alloc_instr(Op::NullCheck { object: alloc }, 1, PrimType::Ref);
        let len = graph.alloc_instr(Op::ArrayLength { array: nc }, 1, PrimType::Int);
        for id in [size, alloc, nc, len] {
            graph.append_instr(block, id);
        }

        // A bound on the allocation equals a bound on its length read.
        let alloc_bound = ValueBound::new(&graph, Some(alloc), -1);
        let len_bound = ValueBound::new(&graph, Some(len), -1);
        assert!(alloc_bound.less_than_or_equal_to(&graph, &len_bound));
    }

    #[test]
    fn test_monotonic_narrow_requires_constant_initial() {
        let (mut graph, block) = test_graph();
        let param = graph.alloc_instr(Op::Param { index: 0 }, 0, PrimType::Int);
        graph.append_instr(block, param);

        let monotonic = ValueRange::Monotonic {
            initial: param,
            increment: 1,
            bound: ValueBound::min(),
        };
        let concrete = ValueRange::Normal {
            lower: ValueBound::new(&graph, None, 0),
            upper: ValueBound::new(&graph, None, 100),
        };
        // Non-constant initial: conservatively abandoned... except that a
        // constant concrete upper bound still proves no overflow (the
        // last number in sequence is below i32::MAX - 1).
        let narrowed = monotonic.narrow(&graph, Some(&concrete));
        assert!(matches!(narrowed, ValueRange::Normal { .. }));

        // An upper bound near the limit defeats the proof.
        let near_limit = ValueRange::Normal {
            lower: ValueBound::new(&graph, None, 0),
            upper: ValueBound::max(),
        };
        let kept = monotonic.narrow(&graph, Some(&near_limit));
        assert!(matches!(kept, ValueRange::Monotonic { .. }));
    }

    #[test]
    fn test_monotonic_does_not_fit_directly() {
        let (mut graph, block) = test_graph();
        let c = graph.alloc_instr(Op::Const { value: 0 }, 0, PrimType::Int);
        graph.append_instr(block, c);

        let monotonic = ValueRange::Monotonic {
            initial: c,
            increment: 1,
            bound: ValueBound::new(&graph, None, 0),
        };
        let concrete = ValueRange::Normal {
            lower: ValueBound::new(&graph, None, 0),
            upper: ValueBound::max(),
        };
        assert!(!monotonic.fits_in(&graph, Some(&concrete)));
        assert!(monotonic.fits_in(&graph, None));
    }

    #[test]
    fn test_range_add_constant_saturation() {
        let (graph, _) = test_graph();
        let range = ValueRange::Normal {
            lower: ValueBound::new(&graph, None, i32::MAX - 1),
            upper: ValueBound::new(&graph, None, i32::MAX - 1),
        };
        // Upper bound overflow invalidates the shifted range.
        assert!(range.add_constant(&graph, 2).is_none());
        let shifted = range.add_constant(&graph, 1).expect("no overflow");
        assert_eq!(shifted.upper().constant(), i32::MAX);
    }
}
