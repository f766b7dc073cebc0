//! The merged MIR graph: block and instruction arenas, the offset→block
//! map, and every graph mutation the builder and passes rely on.
//!
//! # Ownership model
//!
//! Blocks and instructions live in per-graph arenas and are referenced by
//! small integer ids ([`BlockId`], [`InstrId`]). Nothing outlives the graph
//! of its owning method compilation, and removal operations fully unlink
//! nodes so no dangling references can be traversed afterward.
//!
//! # Invariants
//!
//! - Block ids are unique and dense from 0; the distinguished null block
//!   always has id 0 and is hidden.
//! - Predecessor sets are kept consistent with successor edges; every edge
//!   mutation updates both ends within the same mutation step.
//! - Every live instruction's code offset maps, through the offset→block
//!   map, to the block holding that offset's instructions - except the work
//!   half of a check/work split, which is deliberately absent so branch
//!   target lookups land on the check pseudo-op.
//!
//! [`MirGraph::check_consistency`] verifies these invariants and is called
//! liberally from tests after every mutation kind.

use crate::{
    mir::{
        BasicBlock, BlockId, BlockKind, Instruction, InstrId, MethodAttrs, Op, PrimType,
        SuccessorList, NULL_BLOCK,
    },
    Result,
};

/// Bookkeeping for one merged compilation unit inside the container.
#[derive(Debug, Clone)]
pub struct MergedUnit {
    /// Entry block of the unit.
    pub entry: BlockId,
    /// Exit block of the unit.
    pub exit: BlockId,
    /// Code-unit offset this unit's instructions were shifted by.
    pub code_start: u32,
}

/// The control-flow graph of one method, or of several merged methods.
#[derive(Debug)]
pub struct MirGraph {
    /// Block arena; index 0 is the hidden null block.
    blocks: Vec<BasicBlock>,
    /// Instruction arena.
    instrs: Vec<Instruction>,
    /// Offset→block map, one entry per code unit. [`NULL_BLOCK`] = unmapped.
    offset_map: Vec<BlockId>,
    /// Entry block of the primary unit.
    entry: BlockId,
    /// Exit block of the primary unit.
    exit: BlockId,
    /// Total code units across all merged units.
    code_unit_len: u32,
    /// Number of virtual registers (maximum across merged units).
    num_vregs: u16,
    /// OR-accumulated method attribute bits.
    pub attrs: MethodAttrs,
    /// Merged unit bookkeeping, primary unit first.
    units: Vec<MergedUnit>,
}

impl MirGraph {
    /// Creates a graph with the null, entry, and exit blocks in place.
    ///
    /// # Arguments
    ///
    /// * `code_units` - Length of the method's code-unit array
    /// * `num_vregs` - Number of virtual registers
    #[must_use]
    pub fn new(code_units: usize, num_vregs: u16) -> Self {
        let mut graph = Self {
            blocks: Vec::new(),
            instrs: Vec::new(),
            offset_map: vec![NULL_BLOCK; code_units],
            entry: NULL_BLOCK,
            exit: NULL_BLOCK,
            code_unit_len: code_units as u32,
            num_vregs,
            attrs: MethodAttrs::default(),
            units: Vec::new(),
        };
        let null = graph.alloc_block(BlockKind::Null);
        debug_assert!(null.is_null());
        graph.entry = graph.alloc_block(BlockKind::Entry);
        graph.exit = graph.alloc_block(BlockKind::Exit);
        graph.units.push(MergedUnit {
            entry: graph.entry,
            exit: graph.exit,
            code_start: 0,
        });
        graph
    }

    // --- accessors -----------------------------------------------------------

    /// Entry block id of the primary unit.
    #[must_use]
    pub const fn entry(&self) -> BlockId {
        self.entry
    }

    /// Exit block id of the primary unit.
    #[must_use]
    pub const fn exit(&self) -> BlockId {
        self.exit
    }

    /// Total number of blocks, hidden blocks included.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Number of virtual registers tracked by SSA construction.
    #[must_use]
    pub const fn num_vregs(&self) -> u16 {
        self.num_vregs
    }

    /// Total code units across merged units.
    #[must_use]
    pub const fn code_unit_len(&self) -> u32 {
        self.code_unit_len
    }

    /// Merged unit bookkeeping, primary unit first.
    #[must_use]
    pub fn units(&self) -> &[MergedUnit] {
        &self.units
    }

    /// Borrows a block.
    ///
    /// # Panics
    ///
    /// Panics on an out-of-range id; ids never outlive their graph.
    #[must_use]
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    /// Mutably borrows a block.
    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.index()]
    }

    /// Borrows an instruction.
    #[must_use]
    pub fn instr(&self, id: InstrId) -> &Instruction {
        &self.instrs[id.index()]
    }

    /// Mutably borrows an instruction.
    pub fn instr_mut(&mut self, id: InstrId) -> &mut Instruction {
        &mut self.instrs[id.index()]
    }

    /// Iterates all non-hidden block ids in arena order.
    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks
            .iter()
            .filter(|b| !b.hidden)
            .map(|b| b.id)
    }

    /// Iterates the instruction ids of a block, in chain order.
    #[must_use]
    pub fn block_insns(&self, block: BlockId) -> Vec<InstrId> {
        let mut out = Vec::new();
        let mut cur = self.block(block).first_insn;
        while let Some(id) = cur {
            out.push(id);
            cur = self.instr(id).next;
        }
        out
    }

    /// Iterates all live instruction ids in arena order.
    pub fn live_instrs(&self) -> impl Iterator<Item = InstrId> + '_ {
        self.instrs
            .iter()
            .enumerate()
            .filter(|(_, i)| i.is_live())
            .map(|(idx, _)| InstrId::new(idx))
    }

    // --- allocation ----------------------------------------------------------

    /// Allocates a new block of the given kind.
    pub fn alloc_block(&mut self, kind: BlockKind) -> BlockId {
        let id = BlockId::new(self.blocks.len());
        self.blocks.push(BasicBlock::new(id, kind));
        id
    }

    /// Allocates a detached instruction.
    pub fn alloc_instr(&mut self, op: Op, offset: u32, ty: PrimType) -> InstrId {
        let id = InstrId::new(self.instrs.len());
        self.instrs.push(Instruction::new(op, offset, ty));
        id
    }

    // --- instruction chains --------------------------------------------------

    /// Appends a detached instruction to the end of a block.
    pub fn append_instr(&mut self, block: BlockId, insn: InstrId) {
        debug_assert!(!self.instrs[insn.index()].is_live(), "instruction in use");
        self.instrs[insn.index()].block = block;
        self.instrs[insn.index()].next = None;
        let bb = &mut self.blocks[block.index()];
        match bb.last_insn {
            None => {
                bb.first_insn = Some(insn);
                bb.last_insn = Some(insn);
            }
            Some(last) => {
                bb.last_insn = Some(insn);
                self.instrs[last.index()].next = Some(insn);
            }
        }
    }

    /// Prepends a detached instruction to the head of a block.
    pub fn prepend_instr(&mut self, block: BlockId, insn: InstrId) {
        debug_assert!(!self.instrs[insn.index()].is_live(), "instruction in use");
        self.instrs[insn.index()].block = block;
        let bb = &mut self.blocks[block.index()];
        self.instrs[insn.index()].next = bb.first_insn;
        if bb.first_insn.is_none() {
            bb.last_insn = Some(insn);
        }
        bb.first_insn = Some(insn);
    }

    /// Inserts a detached instruction after `current` within its block.
    pub fn insert_instr_after(&mut self, current: InstrId, insn: InstrId) {
        let block = self.instrs[current.index()].block;
        debug_assert!(!block.is_null(), "anchor instruction is detached");
        self.instrs[insn.index()].block = block;
        self.instrs[insn.index()].next = self.instrs[current.index()].next;
        self.instrs[current.index()].next = Some(insn);
        if self.blocks[block.index()].last_insn == Some(current) {
            self.blocks[block.index()].last_insn = Some(insn);
        }
    }

    /// The instruction preceding `insn` within its block, if any.
    #[must_use]
    pub fn prev_insn(&self, insn: InstrId) -> Option<InstrId> {
        let block = self.instr(insn).block;
        if block.is_null() {
            return None;
        }
        let mut cur = self.block(block).first_insn;
        let mut prev = None;
        while let Some(id) = cur {
            if id == insn {
                return prev;
            }
            prev = Some(id);
            cur = self.instr(id).next;
        }
        None
    }

    /// Unlinks an instruction from its block and detaches it.
    ///
    /// The instruction's operands are untouched; callers rewire uses via
    /// [`replace_uses`](Self::replace_uses) beforehand when eliminating a
    /// value-producing instruction.
    pub fn remove_instr(&mut self, insn: InstrId) {
        let block = self.instrs[insn.index()].block;
        if block.is_null() {
            return;
        }
        let prev = self.prev_insn(insn);
        let next = self.instrs[insn.index()].next;
        match prev {
            Some(p) => self.instrs[p.index()].next = next,
            None => self.blocks[block.index()].first_insn = next,
        }
        if self.blocks[block.index()].last_insn == Some(insn) {
            self.blocks[block.index()].last_insn = prev;
        }
        self.instrs[insn.index()].block = NULL_BLOCK;
        self.instrs[insn.index()].next = None;
    }

    /// Rewrites every live use of `from` (operands and environment
    /// snapshots) into `to`.
    ///
    /// Returns the number of slots rewritten.
    pub fn replace_uses(&mut self, from: InstrId, to: InstrId) -> usize {
        let mut replaced = 0;
        for insn in &mut self.instrs {
            if !insn.is_live() {
                continue;
            }
            replaced += insn.op.replace_input(from, to);
            if let Some(env) = &mut insn.env {
                for slot in env.iter_mut() {
                    if *slot == Some(from) {
                        *slot = Some(to);
                        replaced += 1;
                    }
                }
            }
        }
        replaced
    }

    /// Returns `true` if any live environment snapshot references a value.
    ///
    /// Deoptimization and unwinding replay from environments, so a value
    /// with environment uses cannot simply disappear.
    #[must_use]
    pub fn has_env_uses(&self, value: InstrId) -> bool {
        self.instrs.iter().any(|insn| {
            insn.is_live()
                && insn
                    .env
                    .as_ref()
                    .is_some_and(|env| env.iter().any(|slot| *slot == Some(value)))
        })
    }

    /// Counts live operand uses of a value (environment slots excluded).
    #[must_use]
    pub fn count_uses(&self, value: InstrId) -> usize {
        let mut count = 0;
        for insn in &self.instrs {
            if insn.is_live() {
                insn.op.for_each_input(|id| {
                    if id == value {
                        count += 1;
                    }
                });
            }
        }
        count
    }

    // --- edges ---------------------------------------------------------------

    /// Removes `src` from `target`'s predecessors unless another edge from
    /// `src` still reaches it.
    fn unlink_pred(&mut self, src: BlockId, target: BlockId) {
        if !self.blocks[src.index()].successor_blocks().contains(&target) {
            self.blocks[target.index()].remove_predecessor(src);
        }
    }

    /// Sets the taken edge of a block, maintaining predecessor sets.
    pub fn set_taken(&mut self, src: BlockId, target: Option<BlockId>) {
        let old = self.blocks[src.index()].taken;
        self.blocks[src.index()].taken = target;
        if let Some(old) = old {
            if Some(old) != target {
                self.unlink_pred(src, old);
            }
        }
        if let Some(target) = target {
            self.blocks[target.index()].add_predecessor(src);
        }
    }

    /// Sets the fallthrough edge of a block, maintaining predecessor sets.
    pub fn set_fall_through(&mut self, src: BlockId, target: Option<BlockId>) {
        let old = self.blocks[src.index()].fall_through;
        self.blocks[src.index()].fall_through = target;
        if let Some(old) = old {
            if Some(old) != target {
                self.unlink_pred(src, old);
            }
        }
        if let Some(target) = target {
            self.blocks[target.index()].add_predecessor(src);
        }
    }

    /// Installs a typed successor list on a block.
    ///
    /// # Errors
    ///
    /// Returns a fatal [`crate::Error::GraphError`] if a successor list is
    /// already in use; this is an internal invariant violation, not an
    /// input property.
    pub fn set_successors(&mut self, src: BlockId, list: SuccessorList) -> Result<()> {
        if !self.blocks[src.index()].successors.is_not_used() {
            return Err(crate::Error::GraphError(format!(
                "successor block list already in use on {}",
                src
            )));
        }
        let targets: Vec<BlockId> = list.entries().iter().map(|e| e.block).collect();
        self.blocks[src.index()].successors = list;
        for target in targets {
            self.blocks[target.index()].add_predecessor(src);
        }
        Ok(())
    }

    /// Hides a block, unlinking all its edges from both ends.
    pub fn hide_block(&mut self, id: BlockId) {
        let succs = self.blocks[id.index()].successor_blocks();
        self.blocks[id.index()].taken = None;
        self.blocks[id.index()].fall_through = None;
        self.blocks[id.index()].successors = SuccessorList::NotUsed;
        for succ in succs {
            self.blocks[succ.index()].remove_predecessor(id);
        }
        let preds = std::mem::take(&mut self.blocks[id.index()].predecessors);
        for pred in preds {
            let pb = &mut self.blocks[pred.index()];
            if pb.taken == Some(id) {
                pb.taken = None;
            }
            if pb.fall_through == Some(id) {
                pb.fall_through = None;
            }
            match &mut pb.successors {
                SuccessorList::NotUsed => {}
                SuccessorList::PackedSwitch(v)
                | SuccessorList::SparseSwitch(v)
                | SuccessorList::Catch(v) => v.retain(|e| e.block != id),
            }
        }
        self.blocks[id.index()].hidden = true;
    }

    // --- offset map ----------------------------------------------------------

    /// Records that the instructions at `offset` belong to `block`.
    pub fn map_offset(&mut self, offset: u32, block: BlockId) {
        self.offset_map[offset as usize] = block;
    }

    /// The block owning `offset` per the map, or `None` when unmapped.
    #[must_use]
    pub fn block_at_offset(&self, offset: u32) -> Option<BlockId> {
        let id = *self.offset_map.get(offset as usize)?;
        if id.is_null() {
            None
        } else {
            Some(id)
        }
    }

    /// Offset→block resolution with optional creation and splitting.
    ///
    /// The three spec operations map onto the flags:
    ///
    /// - find-or-null: `split = false, create = false`
    /// - find-or-create: `split = false, create = true`
    /// - find-with-split: `split = true, create = true`
    ///
    /// `immed_pred` names the caller's current block; when the split victim
    /// *is* that block, the reference is updated to the bottom half so the
    /// caller's outgoing edges land on the right block.
    ///
    /// # Errors
    ///
    /// Propagates split failures (fatal internal errors).
    pub fn find_block(
        &mut self,
        offset: u32,
        split: bool,
        create: bool,
        immed_pred: Option<&mut BlockId>,
    ) -> Result<Option<BlockId>> {
        if offset >= self.code_unit_len {
            return Ok(None);
        }

        let existing = self.block_at_offset(offset);
        if let Some(id) = existing {
            if self.block(id).start_offset == offset {
                // Does this containing block start with the desired
                // instruction? Split is a no-op at block starts.
                return Ok(Some(id));
            }
        }

        if !create {
            return Ok(None);
        }

        if let Some(id) = existing {
            // The target lives in the middle of an existing block.
            debug_assert!(split, "mid-block target requires split permission");
            let immed = match immed_pred {
                Some(p) if *p == id => Some(p),
                _ => None,
            };
            return Ok(Some(self.split_block(offset, id, immed)?));
        }

        let id = self.alloc_block(BlockKind::Code);
        self.blocks[id.index()].start_offset = offset;
        self.map_offset(offset, id);
        Ok(Some(id))
    }

    /// Splits `orig` at `code_offset` into a top and bottom half.
    ///
    /// Second-half instructions, taken/fallthrough/successor edges, and
    /// predecessor links migrate to the new bottom block; the offset map is
    /// updated only for instructions actually present in the bottom half,
    /// skipping the work half of any check/work pair.
    ///
    /// # Errors
    ///
    /// Returns a fatal error when no instruction starts at `code_offset`
    /// (an internal invariant violation: the map said it was here).
    pub fn split_block(
        &mut self,
        code_offset: u32,
        orig: BlockId,
        immed_pred: Option<&mut BlockId>,
    ) -> Result<BlockId> {
        if code_offset <= self.blocks[orig.index()].start_offset {
            return Err(crate::Error::GraphError(format!(
                "split offset {code_offset:#x} not inside {orig}"
            )));
        }

        // Locate the split point.
        let mut prev: Option<InstrId> = None;
        let mut cur = self.blocks[orig.index()].first_insn;
        while let Some(id) = cur {
            if self.instrs[id.index()].offset == code_offset {
                break;
            }
            prev = Some(id);
            cur = self.instrs[id.index()].next;
        }
        let (split_at, prev) = match (cur, prev) {
            (Some(c), Some(p)) => (c, p),
            _ => {
                return Err(crate::Error::GraphError(format!(
                    "could not find split point {code_offset:#x} in {orig}"
                )))
            }
        };

        let bottom = self.alloc_block(BlockKind::Code);
        self.blocks[bottom.index()].start_offset = code_offset;
        self.blocks[bottom.index()].first_insn = Some(split_at);
        self.blocks[bottom.index()].last_insn = self.blocks[orig.index()].last_insn;

        // Terminator-derived flags travel with the bottom half.
        let b = &mut self.blocks[orig.index()];
        let flags = (
            b.terminated_by_return,
            b.explicit_throw,
            b.conditional_branch,
        );
        b.terminated_by_return = false;
        b.explicit_throw = false;
        b.conditional_branch = false;
        let bb = &mut self.blocks[bottom.index()];
        bb.terminated_by_return = flags.0;
        bb.explicit_throw = flags.1;
        bb.conditional_branch = flags.2;

        // Migrate the taken edge.
        let taken = self.blocks[orig.index()].taken;
        if let Some(taken) = taken {
            self.blocks[orig.index()].taken = None;
            self.blocks[taken.index()].remove_predecessor(orig);
            self.blocks[bottom.index()].taken = Some(taken);
            self.blocks[taken.index()].add_predecessor(bottom);
        }

        // Migrate the fallthrough edge and chain orig into bottom.
        let fall_through = self.blocks[orig.index()].fall_through;
        self.blocks[bottom.index()].fall_through = fall_through;
        self.blocks[orig.index()].fall_through = Some(bottom);
        self.blocks[bottom.index()].add_predecessor(orig);
        if let Some(ft) = fall_through {
            self.blocks[ft.index()].remove_predecessor(orig);
            self.blocks[ft.index()].add_predecessor(bottom);
        }

        // Migrate the typed successor list.
        let succs = std::mem::take(&mut self.blocks[orig.index()].successors);
        if !succs.is_not_used() {
            let targets: Vec<BlockId> = succs.entries().iter().map(|e| e.block).collect();
            self.blocks[bottom.index()].successors = succs;
            for target in targets {
                self.blocks[target.index()].remove_predecessor(orig);
                self.blocks[target.index()].add_predecessor(bottom);
            }
        }

        // Cut the chain.
        self.blocks[orig.index()].last_insn = Some(prev);
        self.instrs[prev.index()].next = None;

        // Re-point the caller's current block if it was the one split.
        if let Some(p) = immed_pred {
            *p = bottom;
        }

        // Re-associate bottom-half instructions in the offset map, skipping
        // the work half of a check/work pair (the map must keep resolving
        // that offset to the check pseudo-op's block).
        let mut reassigned = std::collections::HashSet::new();
        let mut cur = Some(split_at);
        while let Some(id) = cur {
            let insn = &self.instrs[id.index()];
            if !insn.check_body && reassigned.insert(insn.offset) {
                debug_assert_eq!(self.offset_map[insn.offset as usize], orig);
                self.offset_map[insn.offset as usize] = bottom;
            }
            cur = insn.next;
        }

        // Migrate the instruction ownership of the bottom half.
        let mut cur = Some(split_at);
        while let Some(id) = cur {
            self.instrs[id.index()].block = bottom;
            cur = self.instrs[id.index()].next;
        }

        Ok(bottom)
    }

    // --- traversal -----------------------------------------------------------

    /// Non-hidden blocks in reverse post order from the entry block.
    #[must_use]
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        let mut postorder = Vec::with_capacity(self.blocks.len());
        let mut visited = vec![false; self.blocks.len()];
        // Iterative DFS with an explicit stack of (block, successors,
        // next-successor index).
        let mut stack: Vec<(BlockId, Vec<BlockId>, usize)> = Vec::new();
        visited[self.entry.index()] = true;
        stack.push((self.entry, self.block(self.entry).successor_blocks(), 0));
        while !stack.is_empty() {
            let next = {
                let top = stack.last_mut().expect("stack is non-empty");
                if top.2 < top.1.len() {
                    let next = top.1[top.2];
                    top.2 += 1;
                    Some(next)
                } else {
                    None
                }
            };
            match next {
                Some(next) => {
                    if !visited[next.index()] && !self.block(next).hidden {
                        visited[next.index()] = true;
                        let succs = self.block(next).successor_blocks();
                        stack.push((next, succs, 0));
                    }
                }
                None => {
                    let (block, _, _) = stack.pop().expect("stack is non-empty");
                    postorder.push(block);
                }
            }
        }
        postorder.reverse();
        postorder
    }

    // --- merge for inlining --------------------------------------------------

    /// Merges another independently-built graph into this container.
    ///
    /// Block ids, edge targets, and successor-list targets are renumbered
    /// by a fixed offset (skipping the duplicate null block), instruction
    /// offsets are shifted by the cumulative code-unit length so one flat
    /// offset space covers all merged methods, predecessor sets are
    /// recomputed from scratch, and attribute bits are OR-accumulated.
    pub fn merge(&mut self, other: MirGraph) {
        let block_shift = self.blocks.len() - 1; // other's null block is dropped
        let instr_shift = self.instrs.len();
        let code_shift = self.code_unit_len;

        let remap_block = |id: BlockId| -> BlockId {
            debug_assert!(!id.is_null(), "edge to the null block");
            BlockId::new(id.index() + block_shift)
        };
        let remap_instr = |id: InstrId| -> InstrId { InstrId::new(id.index() + instr_shift) };

        // Import instructions.
        for mut insn in other.instrs {
            insn.offset += code_shift;
            if insn.is_live() {
                insn.block = remap_block(insn.block);
            }
            insn.next = insn.next.map(remap_instr);
            let mut op = insn.op.clone();
            op.map_inputs(remap_instr);
            if let Op::Phi { inputs, .. } = &mut op {
                for (_, pred) in inputs.iter_mut() {
                    *pred = remap_block(*pred);
                }
            }
            if let Op::Check { body } = &mut op {
                *body = remap_instr(*body);
            }
            insn.op = op;
            if let Some(env) = &mut insn.env {
                for slot in env.iter_mut() {
                    *slot = slot.map(remap_instr);
                }
            }
            self.instrs.push(insn);
        }

        // Import blocks, skipping the duplicate null block.
        for mut block in other.blocks.into_iter().skip(1) {
            block.id = remap_block(block.id);
            block.start_offset += code_shift;
            block.first_insn = block.first_insn.map(remap_instr);
            block.last_insn = block.last_insn.map(remap_instr);
            block.taken = block.taken.map(remap_block);
            block.fall_through = block.fall_through.map(remap_block);
            for entry in block.successors.entries_mut() {
                entry.block = remap_block(entry.block);
            }
            block.predecessors.clear();
            block.i_dom = None;
            block.dom_bits = None;
            self.blocks.push(block);
        }

        // Extend the flat offset space.
        self.offset_map.extend(
            other
                .offset_map
                .into_iter()
                .map(|id| if id.is_null() { id } else { remap_block(id) }),
        );
        self.code_unit_len += other.code_unit_len;
        self.num_vregs = self.num_vregs.max(other.num_vregs);
        self.attrs |= other.attrs;
        for unit in other.units {
            self.units.push(MergedUnit {
                entry: remap_block(unit.entry),
                exit: remap_block(unit.exit),
                code_start: unit.code_start + code_shift,
            });
        }

        // Predecessor sets are recomputed from scratch afterward.
        self.recompute_predecessors();
    }

    /// Rebuilds every predecessor set from the successor edges.
    pub fn recompute_predecessors(&mut self) {
        for block in &mut self.blocks {
            block.predecessors.clear();
        }
        for idx in 0..self.blocks.len() {
            if self.blocks[idx].hidden {
                continue;
            }
            let id = BlockId::new(idx);
            for succ in self.blocks[idx].successor_blocks() {
                self.blocks[succ.index()].add_predecessor(id);
            }
        }
    }

    // --- consistency ---------------------------------------------------------

    /// Verifies the graph's structural invariants.
    ///
    /// Checked properties:
    ///
    /// - every outgoing edge of a non-hidden block targets a non-hidden
    ///   block whose predecessor set contains the source, and vice versa
    /// - every live non-work instruction's offset resolves through the
    ///   offset map to the block holding that offset (the check half for a
    ///   split pair)
    ///
    /// # Errors
    ///
    /// Returns a [`crate::Error::GraphError`] describing the first
    /// violation found.
    pub fn check_consistency(&self) -> Result<()> {
        for block in &self.blocks {
            if block.hidden {
                continue;
            }
            for succ in block.successor_blocks() {
                let sb = self
                    .blocks
                    .get(succ.index())
                    .ok_or_else(|| crate::Error::GraphError(format!("{succ} out of range")))?;
                if sb.hidden {
                    return Err(crate::Error::GraphError(format!(
                        "{} has edge to hidden {}",
                        block.id, succ
                    )));
                }
                if !sb.predecessors.contains(&block.id) {
                    return Err(crate::Error::GraphError(format!(
                        "{} missing predecessor {}",
                        succ, block.id
                    )));
                }
            }
            for &pred in &block.predecessors {
                let pb = self
                    .blocks
                    .get(pred.index())
                    .ok_or_else(|| crate::Error::GraphError(format!("{pred} out of range")))?;
                if pb.hidden {
                    return Err(crate::Error::GraphError(format!(
                        "{} has hidden predecessor {}",
                        block.id, pred
                    )));
                }
                if !pb.successor_blocks().contains(&block.id) {
                    return Err(crate::Error::GraphError(format!(
                        "{} not a successor of its predecessor {}",
                        block.id, pred
                    )));
                }
            }
        }

        // Offset map correctness for live instructions.
        for id in self.live_instrs() {
            let insn = self.instr(id);
            if insn.check_body || matches!(insn.op, Op::Phi { .. }) {
                continue;
            }
            let owner = self.block(insn.block);
            if owner.kind != BlockKind::Code {
                continue;
            }
            match self.block_at_offset(insn.offset) {
                None => {
                    return Err(crate::Error::GraphError(format!(
                        "offset {:#x} of {} unmapped",
                        insn.offset, id
                    )))
                }
                Some(mapped) if mapped == insn.block => {}
                Some(mapped) => {
                    // The only tolerated mismatch: the mapped block ends in
                    // the check half of a split whose work lives here.
                    let check_here = self.block_insns(mapped).into_iter().any(|cid| {
                        let check = self.instr(cid);
                        check.offset == insn.offset && matches!(check.op, Op::Check { .. })
                    });
                    if !check_here {
                        return Err(crate::Error::GraphError(format!(
                            "offset {:#x} of {} maps to {}, not {}",
                            insn.offset, id, mapped, insn.block
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_with_chain(offsets: &[u32]) -> (MirGraph, BlockId) {
        let mut graph = MirGraph::new(64, 4);
        let block = graph.alloc_block(BlockKind::Code);
        for &offset in offsets {
            let id = graph.alloc_instr(Op::Nop, offset, PrimType::Void);
            graph.append_instr(block, id);
            graph.map_offset(offset, block);
        }
        (graph, block)
    }

    #[test]
    fn test_new_graph_reserves_null_entry_exit() {
        let graph = MirGraph::new(16, 2);
        assert_eq!(graph.block_count(), 3);
        assert!(graph.block(NULL_BLOCK).hidden);
        assert_eq!(graph.block(graph.entry()).kind, BlockKind::Entry);
        assert_eq!(graph.block(graph.exit()).kind, BlockKind::Exit);
    }

    #[test]
    fn test_append_and_chain_order() {
        let (graph, block) = graph_with_chain(&[0, 1, 2]);
        let insns = graph.block_insns(block);
        assert_eq!(insns.len(), 3);
        assert_eq!(graph.instr(insns[0]).offset, 0);
        assert_eq!(graph.instr(insns[2]).offset, 2);
    }

    #[test]
    fn test_remove_instr_unlinks() {
        let (mut graph, block) = graph_with_chain(&[0, 1, 2]);
        let insns = graph.block_insns(block);

        graph.remove_instr(insns[1]);
        assert!(!graph.instr(insns[1]).is_live());
        let remaining = graph.block_insns(block);
        assert_eq!(remaining, vec![insns[0], insns[2]]);

        // Removing the head and the tail keeps the chain consistent.
        graph.remove_instr(insns[0]);
        graph.remove_instr(insns[2]);
        assert!(graph.block_insns(block).is_empty());
        assert_eq!(graph.block(block).first_insn, None);
        assert_eq!(graph.block(block).last_insn, None);
    }

    #[test]
    fn test_split_block_migrates_edges_and_map() {
        let (mut graph, block) = graph_with_chain(&[0, 1, 2, 3]);
        let target = graph.alloc_block(BlockKind::Code);
        graph.set_taken(block, Some(target));

        let bottom = graph.split_block(2, block, None).unwrap();

        assert_eq!(graph.block(block).successor_blocks(), vec![bottom]);
        assert_eq!(graph.block(bottom).taken, Some(target));
        assert!(graph.block(target).predecessors.contains(&bottom));
        assert!(!graph.block(target).predecessors.contains(&block));
        assert_eq!(graph.block_at_offset(1), Some(block));
        assert_eq!(graph.block_at_offset(2), Some(bottom));
        assert_eq!(graph.block_at_offset(3), Some(bottom));
        graph.check_consistency().unwrap();
    }

    #[test]
    fn test_find_block_is_split_idempotent() {
        let (mut graph, block) = graph_with_chain(&[0, 1, 2]);
        graph.blocks[block.index()].start_offset = 0;

        // Splitting at a block start returns the existing block.
        let found = graph.find_block(0, true, true, None).unwrap();
        assert_eq!(found, Some(block));
        let count = graph.block_count();
        let again = graph.find_block(0, true, true, None).unwrap();
        assert_eq!(again, Some(block));
        assert_eq!(graph.block_count(), count);
    }

    #[test]
    fn test_find_block_creates_at_unmapped_offset() {
        let (mut graph, _) = graph_with_chain(&[0, 1]);
        let created = graph.find_block(10, false, true, None).unwrap().unwrap();
        assert_eq!(graph.block(created).start_offset, 10);
        assert_eq!(graph.block_at_offset(10), Some(created));

        // find-or-null never creates.
        assert_eq!(graph.find_block(20, false, false, None).unwrap(), None);
    }

    #[test]
    fn test_find_block_updates_immediate_pred() {
        let (mut graph, block) = graph_with_chain(&[0, 1, 2]);
        let mut cur = block;
        let bottom = graph
            .find_block(1, true, true, Some(&mut cur))
            .unwrap()
            .unwrap();
        assert_eq!(cur, bottom, "split victim's cursor moves to bottom half");
    }

    #[test]
    fn test_split_failure_is_fatal() {
        let (mut graph, block) = graph_with_chain(&[0, 2]);
        // Offset 1 is mid-block but no instruction starts there.
        assert!(graph.split_block(1, block, None).is_err());
    }

    #[test]
    fn test_hide_block_unlinks_both_ends() {
        let (mut graph, block) = graph_with_chain(&[0]);
        let target = graph.alloc_block(BlockKind::Code);
        graph.set_taken(block, Some(target));
        graph.set_fall_through(graph.entry(), Some(block));

        graph.hide_block(block);

        assert!(graph.block(block).hidden);
        assert!(graph.block(target).predecessors.is_empty());
        assert_eq!(graph.block(graph.entry()).taken, None);
        assert_eq!(graph.block(graph.entry()).fall_through, None);
        graph.check_consistency().unwrap();
    }

    #[test]
    fn test_replace_uses_rewrites_operands_and_env() {
        let mut graph = MirGraph::new(16, 2);
        let block = graph.alloc_block(BlockKind::Code);
        let a = graph.alloc_instr(Op::Const { value: 1 }, 0, PrimType::Int);
        let b = graph.alloc_instr(Op::Const { value: 2 }, 0, PrimType::Int);
        let add = graph.alloc_instr(
            Op::BinOp {
                kind: crate::mir::BinOpKind::Add,
                lhs: a,
                rhs: a,
            },
            1,
            PrimType::Int,
        );
        graph.append_instr(block, a);
        graph.append_instr(block, b);
        graph.append_instr(block, add);
        graph.instr_mut(add).env = Some(vec![Some(a), None].into_boxed_slice());

        let replaced = graph.replace_uses(a, b);
        assert_eq!(replaced, 3);
        assert_eq!(graph.count_uses(b), 2);
        assert_eq!(graph.count_uses(a), 0);
    }

    #[test]
    fn test_merge_renumbers_and_shifts() {
        let mut first = MirGraph::new(8, 2);
        let b1 = first.alloc_block(BlockKind::Code);
        let c1 = first.alloc_instr(Op::Const { value: 7 }, 3, PrimType::Int);
        first.append_instr(b1, c1);
        first.map_offset(3, b1);
        first.set_fall_through(first.entry(), Some(b1));

        let mut second = MirGraph::new(8, 4);
        let b2 = second.alloc_block(BlockKind::Code);
        let c2 = second.alloc_instr(Op::Const { value: 9 }, 5, PrimType::Int);
        second.append_instr(b2, c2);
        second.map_offset(5, b2);
        second.set_fall_through(second.entry(), Some(b2));
        second.attrs |= MethodAttrs::HAS_INVOKES;

        let blocks_before = first.block_count();
        first.merge(second);

        assert_eq!(first.block_count(), blocks_before + 3);
        assert_eq!(first.code_unit_len(), 16);
        assert_eq!(first.num_vregs(), 4);
        assert!(first.attrs.contains(MethodAttrs::HAS_INVOKES));
        assert_eq!(first.units().len(), 2);

        // The second unit's instruction landed at shifted offset 8 + 5.
        let merged_block = first.block_at_offset(13).expect("offset shifted");
        let insns = first.block_insns(merged_block);
        assert_eq!(first.instr(insns[0]).offset, 13);
        first.check_consistency().unwrap();
    }
}
