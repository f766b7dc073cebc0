//! Control-flow graph construction from a method's code units.
//!
//! [`GraphBuilder`] decodes the instruction stream sequentially, lowers
//! each Dalvik instruction into a cluster of typed graph instructions
//! sharing its dex offset (`LoadLocal` reads, the main operation with its
//! guard instructions, a `StoreLocal` write), and links blocks as branch,
//! switch, return, and throw instructions are encountered:
//!
//! - Branch targets and fallthrough paths are resolved with
//!   find-or-create/find-with-split semantics, splitting existing blocks
//!   at the exact instruction boundary when a target lands mid-block.
//! - Switch payloads (packed `0x0100`, sparse `0x0200`) are decoded from
//!   the code units and become typed `(key, target)` successor lists,
//!   always with an unconditional fallthrough edge for the no-match case.
//! - Potentially-throwing instructions inside a try range receive one
//!   catch successor edge per covering handler, keyed by exception type
//!   index, and are split into a fall-through-only check pseudo-op that
//!   owns the exception edges plus a work block that is deliberately
//!   absent from the offset→block map. A monitor-exit's edge to its own
//!   unwind handler is suppressed when the handler matches the known
//!   `move-exception; (move)*; (goto)?; monitor-exit; throw` idiom.
//!
//! Malformed bytecode and violated builder invariants are fatal for the
//! method; unsupported-but-valid instructions surface as
//! [`crate::Error::NotSupported`] so the driver can punt to the
//! interpreter.

use crate::{
    bytecode::{
        CodeCursor, DecodedInstruction, InsnFlags, MethodBody, Opcode, PACKED_SWITCH_SIGNATURE,
        SPARSE_SWITCH_SIGNATURE,
    },
    mir::{
        BinOpKind, BlockId, BlockKind, CmpBias, IfKind, InstrId, InvokeKind, MethodAttrs,
        MirGraph, Op, OptFlags, PrimType, SuccessorInfo, SuccessorList, SwitchKind, UnOpKind,
    },
    utils::BitSet,
    Result,
};

/// Longest run of filler instructions tolerated while matching the
/// monitor-exit unwind-handler idiom.
const MAX_PATTERN_LEN: usize = 5;

/// Detached main/post instructions of one lowered Dalvik instruction.
///
/// Register loads are appended to the current block immediately; the main
/// operations and the trailing register store stay detached until throw
/// processing decides which block receives them.
#[derive(Debug, Default)]
struct Lowered {
    mains: Vec<InstrId>,
    posts: Vec<InstrId>,
}

/// Builds a [`MirGraph`] from a [`MethodBody`].
pub struct GraphBuilder<'a> {
    body: &'a MethodBody,
    graph: MirGraph,
    /// Bit-per-code-unit coverage of try ranges.
    try_coverage: BitSet,
    cur_block: BlockId,
    /// Offset of the instruction currently being lowered.
    offset: u32,
    /// Result value of the most recent invoke, for `move-result`.
    latest_result: Option<InstrId>,
    suppress_exception_edges: bool,
}

impl<'a> GraphBuilder<'a> {
    /// Builds the control-flow graph of a method.
    ///
    /// # Arguments
    ///
    /// * `body` - The method body container
    /// * `suppress_exception_edges` - Skip synthesizing generic exception
    ///   edges for throw sites outside try ranges (compile-time/size
    ///   optimization; edges inside try ranges are always built)
    ///
    /// # Errors
    ///
    /// [`crate::Error::Empty`] for an empty instruction stream,
    /// [`crate::Error::NotSupported`] for unsupported instructions (the
    /// driver punts the method), [`crate::Error::Malformed`] or
    /// [`crate::Error::GraphError`] for corrupt bytecode or violated
    /// builder invariants.
    pub fn build(body: &'a MethodBody, suppress_exception_edges: bool) -> Result<MirGraph> {
        if body.insns.is_empty() {
            return Err(crate::Error::Empty);
        }

        let mut graph = MirGraph::new(body.code_units(), body.num_vregs);

        // Argument registers are the trailing registers; each gets a
        // parameter definition in the entry block.
        let entry = graph.entry();
        for index in 0..body.num_ins {
            let vreg = body.num_vregs - body.num_ins + index;
            let ty = body
                .param_types
                .get(usize::from(index))
                .copied()
                .unwrap_or(PrimType::Void);
            let param = graph.alloc_instr(Op::Param { index }, 0, ty);
            graph.append_instr(entry, param);
            let store = graph.alloc_instr(
                Op::StoreLocal {
                    vreg,
                    value: param,
                },
                0,
                PrimType::Void,
            );
            graph.append_instr(entry, store);
        }

        // Identify code ranges in try blocks.
        let mut try_coverage = BitSet::new(body.code_units());
        for item in &body.tries {
            let end = (item.start_addr as usize + usize::from(item.insn_count))
                .min(body.code_units());
            try_coverage.insert_range(item.start_addr as usize, end);
        }

        let first = graph
            .find_block(0, false, true, None)?
            .ok_or_else(|| malformed_error!("method body has no instruction at offset 0"))?;
        graph.set_fall_through(entry, Some(first));

        let mut builder = GraphBuilder {
            body,
            graph,
            try_coverage,
            cur_block: first,
            offset: 0,
            latest_result: None,
            suppress_exception_edges,
        };

        // Set up the empty catch blocks before parsing.
        builder.process_try_catch_blocks()?;
        builder.parse_all()?;

        Ok(builder.graph)
    }

    /// Pre-creates one (possibly shared) block per catch handler address.
    fn process_try_catch_blocks(&mut self) -> Result<()> {
        let mut addresses = Vec::new();
        for list in &self.body.handlers {
            for handler in &list.handlers {
                addresses.push(handler.address);
            }
            if let Some(all) = list.catch_all {
                addresses.push(all);
            }
        }
        for address in addresses {
            self.graph
                .find_block(address, false, true, None)?
                .ok_or_else(|| {
                    malformed_error!("catch handler address {:#x} out of range", address)
                })?;
        }
        Ok(())
    }

    /// Parses all instructions, putting them into containing basic blocks.
    fn parse_all(&mut self) -> Result<()> {
        let code_len = self.body.code_units() as u32;
        let mut cursor = CodeCursor::new(&self.body.insns);
        while let Some(step) = cursor.next_insn() {
            let (offset, insn, width) = step?;
            let offset = offset as u32;
            self.offset = offset;
            self.graph.map_offset(offset, self.cur_block);

            let mut flags = insn.opcode.flags();
            let lowered = if insn.opcode == Opcode::Nop && width > 1 {
                // Embedded data payload: unreachable as an instruction,
                // mark for no continuation.
                flags.remove(InsnFlags::CONTINUE);
                Lowered::default()
            } else {
                self.lower(&insn)?
            };

            if flags.contains(InsnFlags::BRANCH) {
                let branch = lowered.mains.first().copied();
                self.append_all(&lowered.mains);
                self.process_can_branch(&insn, branch, offset, width, flags)?;
            } else if flags.contains(InsnFlags::RETURN) {
                self.append_all(&lowered.mains);
                self.graph.block_mut(self.cur_block).terminated_by_return = true;
                let exit = self.graph.exit();
                self.graph.set_fall_through(self.cur_block, Some(exit));
                if offset + u32::from(width) < code_len {
                    // Create a fallthrough block for following instructions.
                    self.graph
                        .find_block(offset + u32::from(width), false, true, None)?;
                }
            } else if flags.contains(InsnFlags::THROW) {
                self.process_can_throw(&insn, offset, width, lowered)?;
            } else if flags.contains(InsnFlags::SWITCH) {
                self.append_all(&lowered.mains);
                self.process_can_switch(&insn, offset, width)?;
            } else {
                self.append_all(&lowered.mains);
                self.append_all(&lowered.posts);
            }

            // The next instruction could be the target of a previously
            // parsed forward branch, so a block may already exist there.
            let next_offset = offset + u32::from(width);
            if let Some(next) = self.graph.find_block(next_offset, false, false, None)? {
                if self.graph.block(self.cur_block).fall_through.is_none()
                    && flags.contains(InsnFlags::CONTINUE)
                {
                    self.graph.set_fall_through(self.cur_block, Some(next));
                }
                self.cur_block = next;
            }
        }
        Ok(())
    }

    // --- edge processing ------------------------------------------------------

    /// Handles instructions with the branch flag.
    fn process_can_branch(
        &mut self,
        insn: &DecodedInstruction,
        branch: Option<InstrId>,
        offset: u32,
        width: u16,
        flags: InsnFlags,
    ) -> Result<()> {
        let rel = insn
            .branch_offset()
            .ok_or_else(|| malformed_error!("opcode {} has branch flag but no target", insn.opcode))?;
        let target = offset as i64 + i64::from(rel);
        if target < 0 || target >= i64::from(self.graph.code_unit_len()) {
            return Err(malformed_error!("branch target {target:#x} out of range"));
        }
        let target = target as u32;

        if flags.contains(InsnFlags::CONTINUE) {
            self.graph.block_mut(self.cur_block).conditional_branch = true;
        }
        if target > offset {
            // Forward edges need no suspend check.
            if let Some(branch) = branch {
                self.graph.instr_mut(branch).flags |= OptFlags::SUPPRESS_SUSPEND_CHECK;
            }
        }

        let taken = self
            .graph
            .find_block(target, true, true, Some(&mut self.cur_block))?
            .ok_or_else(|| malformed_error!("no block at branch target {target:#x}"))?;
        self.graph.set_taken(self.cur_block, Some(taken));

        if flags.contains(InsnFlags::CONTINUE) {
            let fallthrough = self
                .graph
                .find_block(offset + u32::from(width), true, true, Some(&mut self.cur_block))?
                .ok_or_else(|| malformed_error!("conditional branch falls off the method end"))?;
            self.graph.set_fall_through(self.cur_block, Some(fallthrough));
        } else if offset + u32::from(width) < self.graph.code_unit_len() {
            // Ensure a block boundary after an unconditional jump without
            // linking a fallthrough edge.
            self.graph
                .find_block(offset + u32::from(width), false, true, None)?;
        }
        Ok(())
    }

    /// Reads a signed 32-bit value from two code units.
    fn read_s32(&self, at: usize) -> Result<i32> {
        let lo = *self.body.insns.get(at).ok_or(crate::Error::OutOfBounds)?;
        let hi = *self.body.insns.get(at + 1).ok_or(crate::Error::OutOfBounds)?;
        Ok(((u32::from(hi) << 16) | u32::from(lo)) as i32)
    }

    /// Handles `packed-switch`/`sparse-switch` payload decoding and the
    /// typed successor list.
    fn process_can_switch(
        &mut self,
        insn: &DecodedInstruction,
        offset: u32,
        width: u16,
    ) -> Result<()> {
        let payload = offset as i64 + i64::from(insn.v_b as i32);
        if payload < 0 || payload >= i64::from(self.graph.code_unit_len()) {
            return Err(malformed_error!("switch payload {payload:#x} out of range"));
        }
        let payload = payload as usize;
        let signature = self.body.insns[payload];

        let (kind, size) = match (insn.opcode, signature) {
            (Opcode::PackedSwitch, PACKED_SWITCH_SIGNATURE) => {
                (SwitchKind::Packed, usize::from(self.body.insns[payload + 1]))
            }
            (Opcode::SparseSwitch, SPARSE_SWITCH_SIGNATURE) => {
                (SwitchKind::Sparse, usize::from(self.body.insns[payload + 1]))
            }
            _ => {
                return Err(malformed_error!(
                    "switch payload signature {signature:#06x} does not match {}",
                    insn.opcode
                ))
            }
        };

        let mut keys = Vec::with_capacity(size);
        let mut targets = Vec::with_capacity(size);
        match kind {
            SwitchKind::Packed => {
                let first_key = self.read_s32(payload + 2)?;
                for i in 0..size {
                    keys.push(first_key.wrapping_add(i as i32));
                    targets.push(self.read_s32(payload + 4 + i * 2)?);
                }
            }
            SwitchKind::Sparse => {
                for i in 0..size {
                    keys.push(self.read_s32(payload + 2 + i * 2)?);
                }
                for i in 0..size {
                    targets.push(self.read_s32(payload + 2 + size * 2 + i * 2)?);
                }
            }
        }

        let mut entries = Vec::with_capacity(size);
        for (key, rel) in keys.into_iter().zip(targets) {
            let target = offset as i64 + i64::from(rel);
            if target < 0 || target >= i64::from(self.graph.code_unit_len()) {
                return Err(malformed_error!("switch case target {target:#x} out of range"));
            }
            let case_block = self
                .graph
                .find_block(target as u32, true, true, Some(&mut self.cur_block))?
                .ok_or_else(|| malformed_error!("no block at switch case {target:#x}"))?;
            entries.push(SuccessorInfo {
                block: case_block,
                key,
            });
        }

        let list = match kind {
            SwitchKind::Packed => SuccessorList::PackedSwitch(entries),
            SwitchKind::Sparse => SuccessorList::SparseSwitch(entries),
        };
        self.graph.set_successors(self.cur_block, list)?;

        // The no-match case always falls through.
        let fallthrough = self
            .graph
            .find_block(offset + u32::from(width), false, true, None)?
            .ok_or_else(|| malformed_error!("switch falls off the method end"))?;
        self.graph.set_fall_through(self.cur_block, Some(fallthrough));
        Ok(())
    }

    /// Handles instructions with the throw flag: catch edges, the generic
    /// exception block, and the check/work split.
    fn process_can_throw(
        &mut self,
        insn: &DecodedInstruction,
        offset: u32,
        width: u16,
        lowered: Lowered,
    ) -> Result<()> {
        let in_try_block = self.try_coverage.contains(offset as usize);
        let is_throw = insn.opcode == Opcode::Throw;
        let build_all_edges = !self.suppress_exception_edges || is_throw || in_try_block;

        if in_try_block {
            if !self.graph.block(self.cur_block).successors.is_not_used() {
                return Err(crate::Error::GraphError(format!(
                    "successor block list already in use on {}",
                    self.cur_block
                )));
            }

            let handlers: Vec<(i32, u32)> = self.body.catch_handlers_at(offset).collect();
            let mut entries = Vec::with_capacity(handlers.len());
            for (key, address) in handlers {
                if insn.opcode == Opcode::MonitorExit
                    && is_monitor_exit_catch_pattern(&self.body.insns, address)
                {
                    // A monitor-exit's own unwind handler would trivially
                    // re-catch itself; skip the spurious edge.
                    continue;
                }
                let catch_block = self
                    .graph
                    .find_block(address, false, false, None)?
                    .ok_or_else(|| {
                        malformed_error!("catch handler at {address:#x} has no block")
                    })?;
                self.graph.block_mut(catch_block).catch_entry = true;
                entries.push(SuccessorInfo {
                    block: catch_block,
                    key,
                });
            }
            self.graph
                .set_successors(self.cur_block, SuccessorList::Catch(entries))?;
        } else if build_all_edges {
            let eh_block = self.graph.alloc_block(BlockKind::ExceptionHandling);
            self.graph.block_mut(eh_block).start_offset = offset;
            self.graph.set_taken(self.cur_block, Some(eh_block));
        }

        if is_throw {
            self.graph.block_mut(self.cur_block).explicit_throw = true;
            if offset + u32::from(width) < self.graph.code_unit_len() {
                // Force creation of a new block following the throw.
                self.graph
                    .find_block(offset + u32::from(width), false, true, None)?;
            }
            if !in_try_block {
                // A throw that can't rethrow in-method needs no split.
                self.append_all(&lowered.mains);
                self.append_all(&lowered.posts);
                return Ok(());
            }
        }

        if !build_all_edges {
            // Control cannot return to this method through the exception
            // edge; ignoring it widens the scope of block-level passes.
            self.append_all(&lowered.mains);
            self.append_all(&lowered.posts);
            return Ok(());
        }

        // Split the potentially-throwing instruction into a check pseudo-op
        // owning the exception edges and a work block holding the original
        // instruction. The work block must NOT enter the offset map: a
        // future branch to this offset has to find the check half.
        let first_main = *lowered.mains.first().ok_or_else(|| {
            crate::Error::GraphError(format!(
                "throwing instruction {} lowered to no operations",
                insn.opcode
            ))
        })?;
        let check = self
            .graph
            .alloc_instr(Op::Check { body: first_main }, offset, PrimType::Void);
        self.graph.append_instr(self.cur_block, check);

        let work = self.graph.alloc_block(BlockKind::Code);
        self.graph.block_mut(work).start_offset = offset;
        self.graph.set_fall_through(self.cur_block, Some(work));
        for &main in &lowered.mains {
            self.graph.append_instr(work, main);
            self.graph.instr_mut(main).check_body = true;
        }
        for &post in &lowered.posts {
            self.graph.append_instr(work, post);
            self.graph.instr_mut(post).check_body = true;
        }
        self.cur_block = work;
        Ok(())
    }

    // --- lowering -------------------------------------------------------------

    fn append_all(&mut self, insns: &[InstrId]) {
        for &insn in insns {
            self.graph.append_instr(self.cur_block, insn);
        }
    }

    /// Appends a register read to the current block.
    fn load(&mut self, vreg: u32, ty: PrimType) -> InstrId {
        let id = self
            .graph
            .alloc_instr(Op::LoadLocal { vreg: vreg as u16 }, self.offset, ty);
        self.graph.append_instr(self.cur_block, id);
        id
    }

    /// Appends a constant to the current block (literal operands).
    fn lit(&mut self, value: i64) -> InstrId {
        let id = self
            .graph
            .alloc_instr(Op::Const { value }, self.offset, PrimType::Int);
        self.graph.append_instr(self.cur_block, id);
        id
    }

    /// Allocates a detached instruction at the current offset.
    fn new_instr(&mut self, op: Op, ty: PrimType) -> InstrId {
        self.graph.alloc_instr(op, self.offset, ty)
    }

    /// Allocates a detached register write.
    fn store(&mut self, vreg: u32, value: InstrId) -> InstrId {
        self.new_instr(
            Op::StoreLocal {
                vreg: vreg as u16,
                value,
            },
            PrimType::Void,
        )
    }

    fn field_desc(&self, field_idx: u32) -> Result<&'a crate::bytecode::FieldDesc> {
        let body = self.body;
        body.field(field_idx).ok_or(crate::Error::NotSupported)
    }

    /// Lowers one decoded instruction into graph operations.
    ///
    /// Register loads and literal constants are appended to the current
    /// block immediately; main and post operations are returned detached
    /// for the edge-processing routines to place.
    #[allow(clippy::too_many_lines)]
    fn lower(&mut self, insn: &DecodedInstruction) -> Result<Lowered> {
        use Opcode::*;

        let mut lowered = Lowered::default();
        match insn.opcode {
            Nop => {
                lowered.mains.push(self.new_instr(Op::Nop, PrimType::Void));
            }

            Move | MoveFrom16 | MoveWide | MoveObject => {
                let value = self.load(insn.v_b, PrimType::Void);
                lowered.posts.push(self.store(insn.v_a, value));
            }

            MoveResult | MoveResultWide | MoveResultObject => {
                let value = self.latest_result.ok_or_else(|| {
                    malformed_error!("{} without preceding invoke", insn.opcode)
                })?;
                lowered.posts.push(self.store(insn.v_a, value));
            }

            MoveException => {
                let exc = self.new_instr(Op::MoveException, PrimType::Ref);
                lowered.mains.push(exc);
                lowered.posts.push(self.store(insn.v_a, exc));
            }

            ReturnVoid => {
                lowered
                    .mains
                    .push(self.new_instr(Op::Return { value: None }, PrimType::Void));
            }
            Return | ReturnWide | ReturnObject => {
                let value = self.load(insn.v_a, PrimType::Void);
                lowered.mains.push(self.new_instr(
                    Op::Return { value: Some(value) },
                    PrimType::Void,
                ));
            }

            Const4 | Const16 | Const => {
                let c = self.new_instr(
                    Op::Const {
                        value: i64::from(insn.v_b as i32),
                    },
                    PrimType::Int,
                );
                lowered.mains.push(c);
                lowered.posts.push(self.store(insn.v_a, c));
            }
            ConstHigh16 => {
                let c = self.new_instr(
                    Op::Const {
                        value: i64::from((insn.v_b << 16) as i32),
                    },
                    PrimType::Int,
                );
                lowered.mains.push(c);
                lowered.posts.push(self.store(insn.v_a, c));
            }
            ConstWide16 | ConstWide32 => {
                let c = self.new_instr(
                    Op::Const {
                        value: i64::from(insn.v_b as i32),
                    },
                    PrimType::Long,
                );
                lowered.mains.push(c);
                lowered.posts.push(self.store(insn.v_a, c));
            }
            ConstWide => {
                let c = self.new_instr(
                    Op::Const {
                        value: insn.v_b_wide as i64,
                    },
                    PrimType::Long,
                );
                lowered.mains.push(c);
                lowered.posts.push(self.store(insn.v_a, c));
            }
            ConstWideHigh16 => {
                let c = self.new_instr(
                    Op::Const {
                        value: ((u64::from(insn.v_b) << 48) as i64),
                    },
                    PrimType::Long,
                );
                lowered.mains.push(c);
                lowered.posts.push(self.store(insn.v_a, c));
            }

            ConstString => {
                let s = self.new_instr(
                    Op::StringRef {
                        string_idx: insn.v_b as u16,
                    },
                    PrimType::Ref,
                );
                lowered.mains.push(s);
                lowered.posts.push(self.store(insn.v_a, s));
            }
            ConstClass => {
                let c = self.new_instr(
                    Op::ClassRef {
                        class_idx: insn.v_b as u16,
                    },
                    PrimType::Ref,
                );
                lowered.mains.push(c);
                lowered.posts.push(self.store(insn.v_a, c));
            }

            MonitorEnter => {
                self.graph.attrs |= MethodAttrs::HAS_MONITOR_OPS;
                let object = self.load(insn.v_a, PrimType::Ref);
                lowered
                    .mains
                    .push(self.new_instr(Op::MonitorEnter { object }, PrimType::Void));
            }
            MonitorExit => {
                self.graph.attrs |= MethodAttrs::HAS_MONITOR_OPS;
                let object = self.load(insn.v_a, PrimType::Ref);
                lowered
                    .mains
                    .push(self.new_instr(Op::MonitorExit { object }, PrimType::Void));
            }

            ArrayLength => {
                let array = self.load(insn.v_b, PrimType::Ref);
                let nc = self.new_instr(Op::NullCheck { object: array }, PrimType::Ref);
                let len = self.new_instr(Op::ArrayLength { array: nc }, PrimType::Int);
                lowered.mains.push(nc);
                lowered.mains.push(len);
                lowered.posts.push(self.store(insn.v_a, len));
            }

            NewInstance => {
                let alloc = self.new_instr(
                    Op::NewInstance {
                        class_idx: insn.v_b as u16,
                    },
                    PrimType::Ref,
                );
                lowered.mains.push(alloc);
                lowered.posts.push(self.store(insn.v_a, alloc));
            }
            NewArray => {
                let length = self.load(insn.v_b, PrimType::Int);
                let alloc = self.new_instr(
                    Op::NewArray {
                        length,
                        class_idx: insn.v_c as u16,
                    },
                    PrimType::Ref,
                );
                lowered.mains.push(alloc);
                lowered.posts.push(self.store(insn.v_a, alloc));
            }

            Throw => {
                let exception = self.load(insn.v_a, PrimType::Ref);
                lowered
                    .mains
                    .push(self.new_instr(Op::Throw { exception }, PrimType::Void));
            }

            Goto | Goto16 | Goto32 => {
                lowered.mains.push(self.new_instr(Op::Goto, PrimType::Void));
            }

            IfEq | IfNe | IfLt | IfGe | IfGt | IfLe => {
                let kind = if_kind(insn.opcode);
                let lhs = self.load(insn.v_a, PrimType::Int);
                let rhs = self.load(insn.v_b, PrimType::Int);
                lowered.mains.push(self.new_instr(
                    Op::If {
                        kind,
                        lhs,
                        rhs: Some(rhs),
                    },
                    PrimType::Void,
                ));
            }
            IfEqz | IfNez | IfLtz | IfGez | IfGtz | IfLez => {
                let kind = if_kind(insn.opcode);
                let lhs = self.load(insn.v_a, PrimType::Int);
                lowered.mains.push(self.new_instr(
                    Op::If {
                        kind,
                        lhs,
                        rhs: None,
                    },
                    PrimType::Void,
                ));
            }

            PackedSwitch | SparseSwitch => {
                let value = self.load(insn.v_a, PrimType::Int);
                let kind = if insn.opcode == PackedSwitch {
                    SwitchKind::Packed
                } else {
                    SwitchKind::Sparse
                };
                lowered
                    .mains
                    .push(self.new_instr(Op::Switch { value, kind }, PrimType::Void));
            }

            CmpLong | CmplFloat | CmpgFloat | CmplDouble | CmpgDouble => {
                let (operand_ty, bias) = match insn.opcode {
                    CmpLong => (PrimType::Long, CmpBias::None),
                    CmplFloat => (PrimType::Float, CmpBias::Lt),
                    CmpgFloat => (PrimType::Float, CmpBias::Gt),
                    CmplDouble => (PrimType::Double, CmpBias::Lt),
                    _ => (PrimType::Double, CmpBias::Gt),
                };
                let lhs = self.load(insn.v_b, operand_ty);
                let rhs = self.load(insn.v_c, operand_ty);
                let cmp = self.new_instr(
                    Op::BinOp {
                        kind: BinOpKind::Cmp(bias),
                        lhs,
                        rhs,
                    },
                    PrimType::Int,
                );
                lowered.mains.push(cmp);
                lowered.posts.push(self.store(insn.v_a, cmp));
            }

            Aget | AgetWide | AgetObject | AgetBoolean | AgetByte | AgetChar | AgetShort => {
                let elem_ty = array_elem_type(insn.opcode);
                let array = self.load(insn.v_b, PrimType::Ref);
                let index = self.load(insn.v_c, PrimType::Int);
                let nc = self.new_instr(Op::NullCheck { object: array }, PrimType::Ref);
                let len = self.new_instr(Op::ArrayLength { array: nc }, PrimType::Int);
                let bc = self.new_instr(Op::BoundsCheck { index, length: len }, PrimType::Int);
                let get = self.new_instr(
                    Op::ArrayGet {
                        array: nc,
                        index: bc,
                    },
                    elem_ty,
                );
                lowered.mains.extend([nc, len, bc, get]);
                lowered.posts.push(self.store(insn.v_a, get));
            }
            Aput | AputWide | AputObject | AputBoolean | AputByte | AputChar | AputShort => {
                self.graph.attrs |= MethodAttrs::HAS_HEAP_STORES;
                let elem_ty = array_elem_type(insn.opcode);
                let value = self.load(insn.v_a, elem_ty);
                let array = self.load(insn.v_b, PrimType::Ref);
                let index = self.load(insn.v_c, PrimType::Int);
                let nc = self.new_instr(Op::NullCheck { object: array }, PrimType::Ref);
                let len = self.new_instr(Op::ArrayLength { array: nc }, PrimType::Int);
                let bc = self.new_instr(Op::BoundsCheck { index, length: len }, PrimType::Int);
                let set = self.new_instr(
                    Op::ArraySet {
                        array: nc,
                        index: bc,
                        value,
                    },
                    PrimType::Void,
                );
                lowered.mains.extend([nc, len, bc, set]);
            }

            Iget | IgetWide | IgetObject => {
                let field = self.field_desc(insn.v_c)?;
                let field_ty = field.ty;
                if field.is_volatile {
                    self.graph.attrs |= MethodAttrs::HAS_VOLATILE_ACCESS;
                }
                let object = self.load(insn.v_b, PrimType::Ref);
                let nc = self.new_instr(Op::NullCheck { object }, PrimType::Ref);
                let get = self.new_instr(
                    Op::FieldGet {
                        object: nc,
                        field_idx: insn.v_c as u16,
                    },
                    field_ty,
                );
                lowered.mains.extend([nc, get]);
                lowered.posts.push(self.store(insn.v_a, get));
            }
            Iput | IputWide | IputObject => {
                let field = self.field_desc(insn.v_c)?;
                let field_ty = field.ty;
                if field.is_volatile {
                    self.graph.attrs |= MethodAttrs::HAS_VOLATILE_ACCESS;
                }
                self.graph.attrs |= MethodAttrs::HAS_HEAP_STORES;
                let value = self.load(insn.v_a, field_ty);
                let object = self.load(insn.v_b, PrimType::Ref);
                let nc = self.new_instr(Op::NullCheck { object }, PrimType::Ref);
                let set = self.new_instr(
                    Op::FieldSet {
                        object: nc,
                        value,
                        field_idx: insn.v_c as u16,
                    },
                    PrimType::Void,
                );
                lowered.mains.extend([nc, set]);
            }

            Sget | SgetWide | SgetObject => {
                let field = self.field_desc(insn.v_b)?;
                let field_ty = field.ty;
                let class_idx = field.class_def_index;
                let needs_init = field.requires_class_init;
                if field.is_volatile {
                    self.graph.attrs |= MethodAttrs::HAS_VOLATILE_ACCESS;
                }
                let cls = self.new_instr(Op::ClassRef { class_idx }, PrimType::Ref);
                lowered.mains.push(cls);
                if needs_init {
                    lowered
                        .mains
                        .push(self.new_instr(Op::ClassInit { class_idx }, PrimType::Void));
                }
                let get = self.new_instr(
                    Op::StaticGet {
                        class_ref: cls,
                        field_idx: insn.v_b as u16,
                    },
                    field_ty,
                );
                lowered.mains.push(get);
                lowered.posts.push(self.store(insn.v_a, get));
            }
            Sput | SputWide | SputObject => {
                let field = self.field_desc(insn.v_b)?;
                let field_ty = field.ty;
                let class_idx = field.class_def_index;
                let needs_init = field.requires_class_init;
                if field.is_volatile {
                    self.graph.attrs |= MethodAttrs::HAS_VOLATILE_ACCESS;
                }
                self.graph.attrs |= MethodAttrs::HAS_HEAP_STORES;
                let value = self.load(insn.v_a, field_ty);
                let cls = self.new_instr(Op::ClassRef { class_idx }, PrimType::Ref);
                lowered.mains.push(cls);
                if needs_init {
                    lowered
                        .mains
                        .push(self.new_instr(Op::ClassInit { class_idx }, PrimType::Void));
                }
                let set = self.new_instr(
                    Op::StaticSet {
                        class_ref: cls,
                        value,
                        field_idx: insn.v_b as u16,
                    },
                    PrimType::Void,
                );
                lowered.mains.push(set);
            }

            InvokeVirtual | InvokeSuper | InvokeDirect | InvokeStatic | InvokeInterface => {
                let method = self
                    .body
                    .method(insn.v_b)
                    .ok_or(crate::Error::NotSupported)?;
                let return_type = method.return_type;
                self.graph.attrs |= MethodAttrs::HAS_INVOKES;
                self.graph.attrs.remove(MethodAttrs::IS_LEAF);

                let kind = match insn.opcode {
                    InvokeVirtual => InvokeKind::Virtual,
                    InvokeSuper => InvokeKind::Super,
                    InvokeDirect => InvokeKind::Direct,
                    InvokeStatic => InvokeKind::Static,
                    _ => InvokeKind::Interface,
                };
                let mut args: Vec<InstrId> = insn
                    .args
                    .iter()
                    .map(|&reg| self.load(u32::from(reg), PrimType::Void))
                    .collect();
                if kind != InvokeKind::Static {
                    let receiver = *args.first().ok_or_else(|| {
                        malformed_error!("instance invoke {} without receiver", insn.opcode)
                    })?;
                    let nc = self.new_instr(Op::NullCheck { object: receiver }, PrimType::Ref);
                    args[0] = nc;
                    lowered.mains.push(nc);
                }
                let invoke = self.new_instr(
                    Op::Invoke {
                        kind,
                        method_idx: insn.v_b as u16,
                        args,
                    },
                    return_type,
                );
                lowered.mains.push(invoke);
                self.latest_result = Some(invoke);
            }

            NegInt | NotInt | NegLong => {
                let (kind, ty) = match insn.opcode {
                    NegInt => (UnOpKind::Neg, PrimType::Int),
                    NotInt => (UnOpKind::Not, PrimType::Int),
                    _ => (UnOpKind::Neg, PrimType::Long),
                };
                let operand = self.load(insn.v_b, ty);
                let result = self.new_instr(Op::UnOp { kind, operand }, ty);
                lowered.mains.push(result);
                lowered.posts.push(self.store(insn.v_a, result));
            }
            IntToLong | IntToFloat | LongToInt | FloatToInt => {
                let (from, to) = match insn.opcode {
                    IntToLong => (PrimType::Int, PrimType::Long),
                    IntToFloat => (PrimType::Int, PrimType::Float),
                    LongToInt => (PrimType::Long, PrimType::Int),
                    _ => (PrimType::Float, PrimType::Int),
                };
                let operand = self.load(insn.v_b, from);
                let result = self.new_instr(
                    Op::UnOp {
                        kind: UnOpKind::Conv,
                        operand,
                    },
                    to,
                );
                lowered.mains.push(result);
                lowered.posts.push(self.store(insn.v_a, result));
            }

            AddInt | SubInt | MulInt | DivInt | RemInt | AndInt | OrInt | XorInt | ShlInt
            | ShrInt | UshrInt | AddLong | SubLong | MulLong | AddFloat | SubFloat | MulFloat => {
                let (kind, ty) = binop_kind(insn.opcode);
                let lhs = self.load(insn.v_b, ty);
                let rhs = self.load(insn.v_c, ty);
                let result = self.new_instr(Op::BinOp { kind, lhs, rhs }, ty);
                lowered.mains.push(result);
                lowered.posts.push(self.store(insn.v_a, result));
            }

            AddInt2addr | SubInt2addr | MulInt2addr | DivInt2addr | RemInt2addr
            | AndInt2addr => {
                let (kind, ty) = binop_kind(insn.opcode);
                let lhs = self.load(insn.v_a, ty);
                let rhs = self.load(insn.v_b, ty);
                let result = self.new_instr(Op::BinOp { kind, lhs, rhs }, ty);
                lowered.mains.push(result);
                lowered.posts.push(self.store(insn.v_a, result));
            }

            AddIntLit16 | MulIntLit16 | DivIntLit16 | AddIntLit8 | MulIntLit8 | DivIntLit8 => {
                let (kind, _) = binop_kind(insn.opcode);
                let lhs = self.load(insn.v_b, PrimType::Int);
                let rhs = self.lit(i64::from(insn.v_c as i32));
                let result = self.new_instr(Op::BinOp { kind, lhs, rhs }, PrimType::Int);
                lowered.mains.push(result);
                lowered.posts.push(self.store(insn.v_a, result));
            }
            RsubInt | RsubIntLit8 => {
                // Reverse subtract: result = literal - vB.
                let rhs = self.load(insn.v_b, PrimType::Int);
                let lhs = self.lit(i64::from(insn.v_c as i32));
                let result = self.new_instr(
                    Op::BinOp {
                        kind: BinOpKind::Sub,
                        lhs,
                        rhs,
                    },
                    PrimType::Int,
                );
                lowered.mains.push(result);
                lowered.posts.push(self.store(insn.v_a, result));
            }
        }

        Ok(lowered)
    }
}

/// Maps a conditional-branch opcode to its comparison kind.
fn if_kind(opcode: Opcode) -> IfKind {
    match opcode {
        Opcode::IfEq | Opcode::IfEqz => IfKind::Eq,
        Opcode::IfNe | Opcode::IfNez => IfKind::Ne,
        Opcode::IfLt | Opcode::IfLtz => IfKind::Lt,
        Opcode::IfGe | Opcode::IfGez => IfKind::Ge,
        Opcode::IfGt | Opcode::IfGtz => IfKind::Gt,
        _ => IfKind::Le,
    }
}

/// Element category of an array access opcode.
fn array_elem_type(opcode: Opcode) -> PrimType {
    match opcode {
        Opcode::Aget | Opcode::Aput => PrimType::Int,
        Opcode::AgetWide | Opcode::AputWide => PrimType::Long,
        Opcode::AgetObject | Opcode::AputObject => PrimType::Ref,
        Opcode::AgetBoolean | Opcode::AputBoolean => PrimType::Boolean,
        Opcode::AgetByte | Opcode::AputByte => PrimType::Byte,
        Opcode::AgetChar | Opcode::AputChar => PrimType::Char,
        _ => PrimType::Short,
    }
}

/// Operation kind and operand category of an arithmetic opcode.
fn binop_kind(opcode: Opcode) -> (BinOpKind, PrimType) {
    use Opcode::*;
    match opcode {
        AddInt | AddInt2addr | AddIntLit16 | AddIntLit8 => (BinOpKind::Add, PrimType::Int),
        SubInt | SubInt2addr => (BinOpKind::Sub, PrimType::Int),
        MulInt | MulInt2addr | MulIntLit16 | MulIntLit8 => (BinOpKind::Mul, PrimType::Int),
        DivInt | DivInt2addr | DivIntLit16 | DivIntLit8 => (BinOpKind::Div, PrimType::Int),
        RemInt | RemInt2addr => (BinOpKind::Rem, PrimType::Int),
        AndInt | AndInt2addr => (BinOpKind::And, PrimType::Int),
        OrInt => (BinOpKind::Or, PrimType::Int),
        XorInt => (BinOpKind::Xor, PrimType::Int),
        ShlInt => (BinOpKind::Shl, PrimType::Int),
        ShrInt => (BinOpKind::Shr, PrimType::Int),
        UshrInt => (BinOpKind::Ushr, PrimType::Int),
        AddLong => (BinOpKind::Add, PrimType::Long),
        SubLong => (BinOpKind::Sub, PrimType::Long),
        MulLong => (BinOpKind::Mul, PrimType::Long),
        AddFloat => (BinOpKind::Add, PrimType::Float),
        SubFloat => (BinOpKind::Sub, PrimType::Float),
        _ => (BinOpKind::Mul, PrimType::Float),
    }
}

/// Recognizes the monitor-exit unwind-handler idiom at a catch address:
/// `move-exception; (move)*; (goto)?; monitor-exit; throw`.
///
/// A monitor-exit inside a try range whose own handler matches this
/// pattern would re-catch its own unwind; the builder suppresses that
/// edge. The predicate is deliberately narrow: any deviation from the
/// pattern keeps the edge.
pub fn is_monitor_exit_catch_pattern(code: &[u16], handler_address: u32) -> bool {
    use crate::bytecode::decode_at;

    let mut offset = handler_address as usize;
    let mut followed_goto = false;

    // Leading move-exception.
    let Ok((insn, width)) = decode_at(code, offset) else {
        return false;
    };
    if insn.opcode != Opcode::MoveException {
        return false;
    }
    offset += width as usize;

    for _ in 0..MAX_PATTERN_LEN {
        let Ok((insn, width)) = decode_at(code, offset) else {
            return false;
        };
        match insn.opcode {
            Opcode::Move | Opcode::MoveFrom16 | Opcode::MoveWide | Opcode::MoveObject => {
                offset += width as usize;
            }
            Opcode::Goto | Opcode::Goto16 | Opcode::Goto32 => {
                if followed_goto {
                    return false;
                }
                followed_goto = true;
                let Some(rel) = insn.branch_offset() else {
                    return false;
                };
                let target = offset as i64 + i64::from(rel);
                if target < 0 || target as usize >= code.len() {
                    return false;
                }
                offset = target as usize;
            }
            Opcode::MonitorExit => {
                offset += width as usize;
                let Ok((next, _)) = decode_at(code, offset) else {
                    return false;
                };
                return next.opcode == Opcode::Throw;
            }
            _ => return false,
        }
    }
    false
}
