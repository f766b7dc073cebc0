//! Load-store elimination via heap-location tracking.
//!
//! Two phases over the SSA graph:
//!
//! 1. A forward collection visit gathers every distinct heap location
//!    (reference + field offset, or reference + array index), computes a
//!    [`ReferenceInfo`] per base reference (singleton detection: an
//!    allocation escapes the moment it is merged into a phi, passed to a
//!    call, or stored as a *value* - the object operand of its own
//!    defining write is not an escape), and builds a static N×N
//!    upper-triangular may-alias matrix.
//! 2. A forward elimination visit tracks the currently known value of
//!    each location per block, merged from predecessors by value
//!    equality. Loads of known values are substituted; loads after a
//!    fresh allocation substitute typed zero constants; redundant stores
//!    are dropped; aliasing locations are invalidated on stores, and all
//!    non-singleton locations on calls and class-init checks. A
//!    best-effort null-check cleanup accompanies every eliminated access.
//!
//! The pass is skipped outright when the method has no heap stores, or
//! contains volatile accesses or monitor operations. A `Deoptimize`
//! instruction disables the store-elimination side for the whole method:
//! an eliminated write has nowhere to replay from in deopt metadata.

use std::collections::HashMap;

use crate::{
    bytecode::FieldDesc,
    mir::{BlockId, InstrId, MethodAttrs, MirGraph, Op, PrimType},
    utils::BitSet,
};

/// Field offset sentinel marking array-element locations.
const INVALID_FIELD_OFFSET: u32 = u32::MAX;
/// Declaring-class sentinel for array-element locations.
const ARRAY_CLASS_SENTINEL: i32 = -1;
/// Object fields below this offset belong to the object header and are
/// not given default values after allocation.
const OBJECT_HEADER_SIZE: u32 = 8;

/// Strips null-check wrappers off a reference value.
fn strip_null_checks(graph: &MirGraph, mut value: InstrId) -> InstrId {
    while let Op::NullCheck { object } = graph.instr(value).op {
        value = object;
    }
    value
}

/// Strips bounds-check wrappers off an index value.
fn strip_bounds_checks(graph: &MirGraph, mut value: InstrId) -> InstrId {
    while let Op::BoundsCheck { index, .. } = graph.instr(value).op {
        value = index;
    }
    value
}

/// A heap location: reference plus field offset or array index.
#[derive(Debug, Clone)]
pub struct HeapLocation {
    /// Base reference (null checks stripped).
    pub ref_: InstrId,
    /// Field byte offset, or [`INVALID_FIELD_OFFSET`] for array elements.
    offset: u32,
    /// Element index (bounds checks stripped) for array locations.
    index: Option<InstrId>,
    /// Declaring-class definition index; [`ARRAY_CLASS_SENTINEL`] for
    /// array elements.
    class_def_index: i32,
    /// Whether the tracked value may be invalidated through merging.
    may_become_unknown: bool,
}

impl HeapLocation {
    /// Returns `true` for array-element locations.
    #[must_use]
    pub const fn is_array_element(&self) -> bool {
        self.index.is_some()
    }
}

/// Escape summary of a base reference.
#[derive(Debug, Clone)]
pub struct ReferenceInfo {
    /// The reference instruction.
    pub ref_: InstrId,
    /// The reference never escapes: not stored as a value, not passed to
    /// a call, not merged into a phi.
    pub is_singleton: bool,
    /// The reference is a singleton and additionally never returned.
    pub is_global_singleton: bool,
}

impl ReferenceInfo {
    /// Computes the escape summary by scanning all uses of the reference,
    /// following its null-check wrappers.
    fn compute(graph: &MirGraph, ref_: InstrId) -> Self {
        let mut info = Self {
            ref_,
            is_singleton: true,
            is_global_singleton: true,
        };
        if !matches!(
            graph.instr(ref_).op,
            Op::NewInstance { .. } | Op::NewArray { .. }
        ) {
            info.is_singleton = false;
            info.is_global_singleton = false;
            return info;
        }

        // The reference is observable both directly and through any
        // null-check wrappers.
        let mut names = vec![ref_];
        for id in graph.live_instrs() {
            if let Op::NullCheck { object } = graph.instr(id).op {
                if names.contains(&object) {
                    names.push(id);
                }
            }
        }

        for user in graph.live_instrs() {
            let op = &graph.instr(user).op;
            let escapes = match op {
                Op::Phi { inputs, .. } => inputs.iter().any(|(v, _)| names.contains(v)),
                Op::Invoke { args, .. } => args.iter().any(|a| names.contains(a)),
                // The object operand is the defining write, not an
                // escape; only the stored value escapes.
                Op::FieldSet { value, .. }
                | Op::StaticSet { value, .. }
                | Op::ArraySet { value, .. } => names.contains(value),
                _ => false,
            };
            if escapes {
                info.is_singleton = false;
                info.is_global_singleton = false;
                return info;
            }
            if let Op::Return { value: Some(value) } = op {
                if names.contains(value) {
                    info.is_global_singleton = false;
                }
            }
        }
        info
    }
}

/// Collected heap locations plus the aliasing matrix.
pub struct HeapLocationCollector {
    locations: Vec<HeapLocation>,
    ref_infos: HashMap<InstrId, ReferenceInfo>,
    aliasing_matrix: BitSet,
    has_heap_stores: bool,
    may_deoptimize: bool,
}

impl HeapLocationCollector {
    /// Collects every heap location touched in the method.
    #[must_use]
    pub fn collect(graph: &MirGraph, fields: &[FieldDesc]) -> Self {
        let mut collector = Self {
            locations: Vec::new(),
            ref_infos: HashMap::new(),
            aliasing_matrix: BitSet::new(0),
            has_heap_stores: false,
            may_deoptimize: false,
        };

        for block in graph.reverse_postorder() {
            for insn in graph.block_insns(block) {
                match graph.instr(insn).op.clone() {
                    Op::FieldGet { object, field_idx } => {
                        collector.visit_field_access(graph, fields, insn, object, field_idx, false);
                    }
                    Op::FieldSet {
                        object, field_idx, ..
                    } => {
                        collector.visit_field_access(graph, fields, insn, object, field_idx, true);
                        collector.has_heap_stores = true;
                    }
                    Op::StaticGet {
                        class_ref,
                        field_idx,
                    } => {
                        collector.visit_field_access(
                            graph, fields, insn, class_ref, field_idx, false,
                        );
                    }
                    Op::StaticSet {
                        class_ref,
                        field_idx,
                        ..
                    } => {
                        collector.visit_field_access(
                            graph, fields, insn, class_ref, field_idx, true,
                        );
                        collector.has_heap_stores = true;
                    }
                    Op::ArrayGet { array, index } => {
                        collector.visit_array_access(graph, array, index);
                    }
                    Op::ArraySet { array, index, .. } => {
                        collector.visit_array_access(graph, array, index);
                        collector.has_heap_stores = true;
                    }
                    Op::Deoptimize => collector.may_deoptimize = true,
                    _ => {}
                }
            }
        }
        collector.build_aliasing_matrix(graph);
        collector
    }

    /// Number of distinct heap locations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Returns `true` when no heap location was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Whether the method contains heap stores at all.
    #[must_use]
    pub const fn has_heap_stores(&self) -> bool {
        self.has_heap_stores
    }

    /// Whether the method may deoptimize; store elimination has no replay
    /// metadata for eliminated writes.
    #[must_use]
    pub const fn may_deoptimize(&self) -> bool {
        self.may_deoptimize
    }

    /// The collected location with the given id.
    #[must_use]
    pub fn location(&self, id: usize) -> &HeapLocation {
        &self.locations[id]
    }

    /// Whether a base reference is a non-escaping singleton.
    #[must_use]
    pub fn is_singleton(&self, ref_: InstrId) -> bool {
        self.ref_infos
            .get(&ref_)
            .is_some_and(|info| info.is_singleton)
    }

    /// Whether a base reference is a singleton that is never returned.
    #[must_use]
    pub fn is_global_singleton(&self, ref_: InstrId) -> bool {
        self.ref_infos
            .get(&ref_)
            .is_some_and(|info| info.is_global_singleton)
    }

    /// Looks up the location id of an access, if collected.
    fn location_id(&self, ref_: InstrId, offset: u32, index: Option<InstrId>) -> Option<usize> {
        self.locations
            .iter()
            .position(|loc| loc.ref_ == ref_ && loc.offset == offset && loc.index == index)
    }

    fn reference_info(&mut self, graph: &MirGraph, ref_: InstrId) -> &ReferenceInfo {
        self.ref_infos
            .entry(ref_)
            .or_insert_with(|| ReferenceInfo::compute(graph, ref_))
    }

    fn update_locations(
        &mut self,
        graph: &MirGraph,
        ref_: InstrId,
        class_def_index: i32,
        offset: u32,
        index: Option<InstrId>,
    ) -> usize {
        let is_global = {
            let info = self.reference_info(graph, ref_);
            info.is_global_singleton
        };
        if let Some(id) = self.location_id(ref_, offset, index) {
            return id;
        }
        self.locations.push(HeapLocation {
            ref_,
            offset,
            index,
            class_def_index,
            // Stores to a never-escaping, never-returned singleton field
            // cannot be killed through aliasing; only merging can still
            // invalidate them, tracked separately below.
            may_become_unknown: !is_global,
        });
        self.locations.len() - 1
    }

    fn visit_field_access(
        &mut self,
        graph: &MirGraph,
        fields: &[FieldDesc],
        access: InstrId,
        object: InstrId,
        field_idx: u16,
        is_store: bool,
    ) {
        let Some(field) = fields.get(usize::from(field_idx)) else {
            return;
        };
        let ref_ = strip_null_checks(graph, object);
        let id = self.update_locations(
            graph,
            ref_,
            i32::from(field.class_def_index),
            field.offset,
            None,
        );
        if is_store
            && self.is_global_singleton(ref_)
            && graph.instr(access).block != graph.instr(ref_).block
        {
            // A store outside the defining block may be killed by a later
            // merge; without reverse-dominance info stay conservative.
            self.locations[id].may_become_unknown = true;
        }
    }

    fn visit_array_access(&mut self, graph: &MirGraph, array: InstrId, index: InstrId) {
        let ref_ = strip_null_checks(graph, array);
        let index = strip_bounds_checks(graph, index);
        self.update_locations(
            graph,
            ref_,
            ARRAY_CLASS_SENTINEL,
            INVALID_FIELD_OFFSET,
            Some(index),
        );
    }

    /// Position of the pair `(id1, id2)` (`id1 < id2`) in the
    /// upper-triangular matrix.
    fn matrix_position(&self, id1: usize, id2: usize) -> usize {
        debug_assert!(id2 > id1);
        let n = self.locations.len();
        if id1 == 0 {
            id2 - 1
        } else {
            n * id1 - (1 + id1) * id1 / 2 + (id2 - id1 - 1)
        }
    }

    /// Returns `true` if two collected locations may alias.
    #[must_use]
    pub fn may_alias(&self, id1: usize, id2: usize) -> bool {
        match id1.cmp(&id2) {
            std::cmp::Ordering::Less => self.aliasing_matrix.contains(self.matrix_position(id1, id2)),
            std::cmp::Ordering::Greater => {
                self.aliasing_matrix.contains(self.matrix_position(id2, id1))
            }
            std::cmp::Ordering::Equal => true,
        }
    }

    /// An allocation cannot alias a value that provably pre-exists it.
    fn may_alias_with_preexistence(
        &self,
        graph: &MirGraph,
        ref1: InstrId,
        ref2: InstrId,
    ) -> bool {
        if matches!(
            graph.instr(ref1).op,
            Op::NewInstance { .. } | Op::NewArray { .. }
        ) && graph.strictly_dominates_insn(ref2, ref1)
        {
            return false;
        }
        true
    }

    fn refs_may_alias(&self, graph: &MirGraph, ref1: InstrId, ref2: InstrId) -> bool {
        if ref1 == ref2 {
            return true;
        }
        if self.is_singleton(ref1) || self.is_singleton(ref2) {
            return false;
        }
        if !self.may_alias_with_preexistence(graph, ref1, ref2)
            || !self.may_alias_with_preexistence(graph, ref2, ref1)
        {
            return false;
        }
        true
    }

    fn locations_may_alias(&self, graph: &MirGraph, id1: usize, id2: usize) -> bool {
        let loc1 = &self.locations[id1];
        let loc2 = &self.locations[id2];
        if loc1.offset != loc2.offset {
            // Two different fields, or a field against an array element.
            return false;
        }
        if loc1.class_def_index != loc2.class_def_index {
            return false;
        }
        if !self.refs_may_alias(graph, loc1.ref_, loc2.ref_) {
            return false;
        }
        if loc1.is_array_element() {
            let Some(index2) = loc2.index else {
                return false;
            };
            let index1 = loc1.index.expect("array element has an index");
            if let (Op::Const { value: v1 }, Op::Const { value: v2 }) =
                (&graph.instr(index1).op, &graph.instr(index2).op)
            {
                if v1 != v2 {
                    // Distinct constant indices never alias.
                    return false;
                }
            }
        }
        true
    }

    fn build_aliasing_matrix(&mut self, graph: &MirGraph) {
        let n = self.locations.len();
        if n == 0 {
            return;
        }
        self.aliasing_matrix = BitSet::new(n * (n - 1) / 2 + 1);
        for i in 0..n - 1 {
            for j in i + 1..n {
                if self.locations_may_alias(graph, i, j) {
                    let pos = self.matrix_position(i, j);
                    self.aliasing_matrix.insert(pos);
                }
            }
        }
    }
}

/// The tracked value of a heap location within a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeapValue {
    /// Killed; a load is necessary.
    Unknown,
    /// Freshly allocated object field: zero/null of the field type.
    Default,
    /// A concrete prior value.
    Value(InstrId),
}

/// The load-store elimination pass.
pub struct LsePass;

impl LsePass {
    /// Runs load-store elimination.
    ///
    /// Returns `true` if the graph changed. The pass is skipped when the
    /// method has no heap stores (nothing to gain) or contains volatile
    /// accesses or monitor operations (alias/ordering reasoning does not
    /// cover them).
    pub fn run(graph: &mut MirGraph, fields: &[FieldDesc]) -> bool {
        if !graph.attrs.contains(MethodAttrs::HAS_HEAP_STORES) {
            return false;
        }
        if graph.attrs.contains(MethodAttrs::HAS_MONITOR_OPS)
            || graph.attrs.contains(MethodAttrs::HAS_VOLATILE_ACCESS)
        {
            return false;
        }

        let collector = HeapLocationCollector::collect(graph, fields);
        if !collector.has_heap_stores() {
            return false;
        }

        graph.compute_dominators();
        let loops = graph.detect_loops();

        let mut visitor = LseVisitor {
            graph,
            fields,
            collector: &collector,
            loops: &loops,
            heap_values_for: HashMap::new(),
            removed: Vec::new(),
            substitutes: HashMap::new(),
            singleton_new_instances: Vec::new(),
            default_constants: HashMap::new(),
        };
        visitor.visit_all();
        visitor.apply()
    }
}

struct LseVisitor<'g> {
    graph: &'g mut MirGraph,
    fields: &'g [FieldDesc],
    collector: &'g HeapLocationCollector,
    loops: &'g [crate::mir::NaturalLoop],
    /// Per-block current-value vector, indexed by heap location id.
    heap_values_for: HashMap<BlockId, Vec<HeapValue>>,
    /// Instructions to eliminate, in discovery order.
    removed: Vec<InstrId>,
    /// Substitute value per eliminated instruction (none for stores).
    substitutes: HashMap<InstrId, InstrId>,
    /// Singleton allocations whose remaining uses may disappear.
    singleton_new_instances: Vec<InstrId>,
    /// Cached zero/null constants per primitive type.
    default_constants: HashMap<PrimType, InstrId>,
}

impl LseVisitor<'_> {
    fn visit_all(&mut self) {
        for block in self.graph.reverse_postorder() {
            self.enter_block(block);
            for insn in self.graph.block_insns(block) {
                self.visit_insn(block, insn);
            }
        }
    }

    /// Whether any block of the loop writes heap memory.
    fn loop_writes_heap(&self, natural_loop: &crate::mir::NaturalLoop) -> bool {
        natural_loop.body.iter().any(|block_idx| {
            self.graph
                .block_insns(BlockId::new(block_idx))
                .into_iter()
                .any(|insn| {
                    let op = &self.graph.instr(insn).op;
                    op.is_heap_store()
                        | matches!(op, Op::Invoke { .. } | Op::ClassInit { .. })
                })
        })
    }

    fn enter_block(&mut self, block: BlockId) {
        let n = self.collector.len();
        let values = if let Some(natural_loop) = self.loops.iter().find(|l| l.header == block) {
            // A single pass in reverse post order: for loops, use the
            // loop's write effects to decide which values to kill.
            let pre_header = self
                .graph
                .block(block)
                .predecessors
                .iter()
                .copied()
                .find(|p| !natural_loop.contains(*p));
            let mut values = pre_header
                .and_then(|p| self.heap_values_for.get(&p).cloned())
                .unwrap_or_else(|| vec![HeapValue::Unknown; n]);
            if self.loop_writes_heap(natural_loop) {
                for (id, value) in values.iter_mut().enumerate() {
                    // A singleton-store location that cannot become
                    // ambiguous through merging keeps its value.
                    if self.collector.location(id).may_become_unknown {
                        *value = HeapValue::Unknown;
                    }
                }
            }
            values
        } else {
            let preds = self.graph.block(block).predecessors.clone();
            if preds.is_empty() {
                vec![HeapValue::Unknown; n]
            } else {
                let mut values = self
                    .heap_values_for
                    .get(&preds[0])
                    .cloned()
                    .unwrap_or_else(|| vec![HeapValue::Unknown; n]);
                for pred in &preds[1..] {
                    let pred_values = self.heap_values_for.get(pred);
                    for (id, value) in values.iter_mut().enumerate() {
                        let other = pred_values
                            .map_or(HeapValue::Unknown, |v| v[id]);
                        if *value != other {
                            *value = HeapValue::Unknown;
                        }
                    }
                }
                values
            }
        };
        self.heap_values_for.insert(block, values);
    }

    fn visit_insn(&mut self, block: BlockId, insn: InstrId) {
        match self.graph.instr(insn).op.clone() {
            Op::FieldGet { object, field_idx } => {
                if let Some(id) = self.field_location(object, field_idx) {
                    self.visit_get(block, insn, id);
                }
            }
            Op::StaticGet {
                class_ref,
                field_idx,
            } => {
                if let Some(id) = self.field_location(class_ref, field_idx) {
                    self.visit_get(block, insn, id);
                }
            }
            Op::ArrayGet { array, index } => {
                if let Some(id) = self.array_location(array, index) {
                    self.visit_get(block, insn, id);
                }
            }
            Op::FieldSet {
                object,
                value,
                field_idx,
            } => {
                if let Some(id) = self.field_location(object, field_idx) {
                    self.visit_set(block, insn, id, value);
                }
            }
            Op::StaticSet {
                class_ref,
                value,
                field_idx,
            } => {
                if let Some(id) = self.field_location(class_ref, field_idx) {
                    self.visit_set(block, insn, id, value);
                }
            }
            Op::ArraySet {
                array,
                index,
                value,
            } => {
                if let Some(id) = self.array_location(array, index) {
                    self.visit_set(block, insn, id, value);
                }
            }
            Op::Invoke { .. } | Op::ClassInit { .. } => self.handle_invoke(block),
            Op::NewInstance { .. } => self.visit_new_instance(block, insn),
            _ => {}
        }
    }

    fn field_location(&self, object: InstrId, field_idx: u16) -> Option<usize> {
        let field = self.fields.get(usize::from(field_idx))?;
        let ref_ = strip_null_checks(self.graph, object);
        self.collector.location_id(ref_, field.offset, None)
    }

    fn array_location(&self, array: InstrId, index: InstrId) -> Option<usize> {
        let ref_ = strip_null_checks(self.graph, array);
        let index = strip_bounds_checks(self.graph, index);
        self.collector
            .location_id(ref_, INVALID_FIELD_OFFSET, Some(index))
    }

    /// The cached zero/null/false constant of a primitive type, created
    /// in the entry block so it dominates every use.
    fn default_constant(&mut self, ty: PrimType) -> InstrId {
        if let Some(&c) = self.default_constants.get(&ty) {
            return c;
        }
        let c = self.graph.alloc_instr(Op::Const { value: 0 }, 0, ty);
        let entry = self.graph.entry();
        self.graph.append_instr(entry, c);
        self.default_constants.insert(ty, c);
        c
    }

    fn visit_get(&mut self, block: BlockId, insn: InstrId, id: usize) {
        let heap_value = self.heap_values_for[&block][id];
        match heap_value {
            HeapValue::Default => {
                let ty = self.graph.instr(insn).ty;
                let constant = self.default_constant(ty);
                self.removed.push(insn);
                self.substitutes.insert(insn, constant);
                self.heap_values_for.get_mut(&block).expect("entered")[id] =
                    HeapValue::Value(constant);
            }
            HeapValue::Value(value) => {
                if self.graph.instr(value).ty == self.graph.instr(insn).ty {
                    self.removed.push(insn);
                    self.substitutes.insert(insn, value);
                }
                // A type mismatch (int bits read as float) keeps the
                // load; the tracked value stays as-is.
            }
            HeapValue::Unknown => {
                // Record the load itself as the known value: GVN with
                // aliasing awareness.
                self.heap_values_for.get_mut(&block).expect("entered")[id] =
                    HeapValue::Value(insn);
            }
        }
    }

    fn visit_set(&mut self, block: BlockId, insn: InstrId, id: usize, value: InstrId) {
        let heap_value = self.heap_values_for[&block][id];
        let location = self.collector.location(id);
        let mut redundant_store = false;
        if heap_value == HeapValue::Value(value) {
            // Storing what the location already holds.
            redundant_store = true;
        } else if !self.collector.may_deoptimize()
            && self.collector.is_global_singleton(location.ref_)
            && !location.is_array_element()
            && !location.may_become_unknown
        {
            // A store into a non-escaping singleton field that merging
            // can never invalidate: future loads will produce `value`.
            redundant_store = true;
        }
        if redundant_store {
            self.removed.push(insn);
        }

        let values = self.heap_values_for.get_mut(&block).expect("entered");
        values[id] = HeapValue::Value(value);

        // Kill aliasing locations that hold a different, still-known value.
        for other in 0..self.collector.len() {
            if other == id {
                continue;
            }
            let other_value = values[other];
            if other_value != HeapValue::Value(value)
                && other_value != HeapValue::Unknown
                && self.collector.may_alias(other, id)
            {
                values[other] = HeapValue::Unknown;
            }
        }
    }

    fn handle_invoke(&mut self, block: BlockId) {
        let values = self.heap_values_for.get_mut(&block).expect("entered");
        for id in 0..self.collector.len() {
            let ref_ = self.collector.location(id).ref_;
            // Calls invalidate everything except singleton references.
            if !self.collector.is_singleton(ref_) {
                values[id] = HeapValue::Unknown;
            }
        }
    }

    fn visit_new_instance(&mut self, block: BlockId, insn: InstrId) {
        if !self.collector.may_deoptimize() && self.collector.is_global_singleton(insn) {
            self.singleton_new_instances.push(insn);
        }
        let values = self.heap_values_for.get_mut(&block).expect("entered");
        for id in 0..self.collector.len() {
            let location = self.collector.location(id);
            if location.ref_ == insn
                && !location.is_array_element()
                && location.offset >= OBJECT_HEADER_SIZE
            {
                // Non-header instance fields read as zero/null until
                // written.
                values[id] = HeapValue::Default;
            }
        }
    }

    /// Resolves a substitute through the chain of removed instructions.
    fn find_substitute(&self, mut value: InstrId) -> InstrId {
        while let Some(&next) = self.substitutes.get(&value) {
            if next == value {
                break;
            }
            value = next;
        }
        value
    }

    /// Applies the recorded eliminations to the graph.
    fn apply(&mut self) -> bool {
        let mut changed = false;
        for i in 0..self.removed.len() {
            let insn = self.removed[i];
            if !self.graph.instr(insn).is_live() {
                continue;
            }
            let base = self.access_base(insn);
            if let Some(substitute) = self.substitutes.get(&insn).copied() {
                let resolved = self.find_substitute(substitute);
                self.graph.replace_uses(insn, resolved);
            }
            self.graph.remove_instr(insn);
            changed = true;

            // Best-effort local null-check cleanup for the access we just
            // dropped.
            if let Some(base) = base {
                self.try_removing_null_check(base);
            }
        }

        // Unused singleton allocations disappear entirely. An allocation
        // still referenced from an environment snapshot must stay: the
        // unwinder would have nothing to materialize.
        for i in 0..self.singleton_new_instances.len() {
            let alloc = self.singleton_new_instances[i];
            if self.graph.instr(alloc).is_live()
                && self.graph.count_uses(alloc) == 0
                && !self.graph.has_env_uses(alloc)
            {
                self.graph.remove_instr(alloc);
                changed = true;
            }
        }
        changed
    }

    /// The (possibly null-checked) base reference operand of an access.
    fn access_base(&self, insn: InstrId) -> Option<InstrId> {
        match self.graph.instr(insn).op {
            Op::FieldGet { object, .. } | Op::FieldSet { object, .. } => Some(object),
            Op::ArrayGet { array, .. } | Op::ArraySet { array, .. } => Some(array),
            _ => None,
        }
    }

    /// Drops a null check left without uses by an eliminated access.
    fn try_removing_null_check(&mut self, base: InstrId) {
        let Op::NullCheck { object } = self.graph.instr(base).op else {
            return;
        };
        if !self.graph.instr(base).is_live() || self.graph.count_uses(base) != 0 {
            return;
        }
        if self.graph.instr(base).check_body {
            // The anchor of a check/work split stays.
            return;
        }
        self.graph.replace_uses(base, object);
        self.graph.remove_instr(base);
    }
}
