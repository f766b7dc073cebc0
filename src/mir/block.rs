//! Basic block nodes and their typed successor lists.

use crate::{
    mir::{BlockId, InstrId},
    utils::BitSet,
};

/// Block kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// The distinguished hidden null block (always id 0).
    Null,
    /// Synthetic method entry.
    Entry,
    /// Synthetic method exit, joined by every return.
    Exit,
    /// Ordinary bytecode block.
    Code,
    /// Synthetic generic exception-handling block.
    ExceptionHandling,
}

/// A `(key, target)` pair in a typed successor list.
///
/// The key is a switch case value for switch dispatch, or a caught
/// exception type index for catch dispatch
/// ([`crate::bytecode::CATCH_ALL_KEY`] for the catch-all handler).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuccessorInfo {
    /// Target block.
    pub block: BlockId,
    /// Dispatch key.
    pub key: i32,
}

/// Typed successor edges beyond the taken/fallthrough pair.
///
/// At most one dispatch style may be in use per block; installing a second
/// is an internal invariant violation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SuccessorList {
    /// No typed successors.
    #[default]
    NotUsed,
    /// Packed-switch case targets.
    PackedSwitch(Vec<SuccessorInfo>),
    /// Sparse-switch case targets.
    SparseSwitch(Vec<SuccessorInfo>),
    /// Catch-handler targets keyed by exception type index.
    Catch(Vec<SuccessorInfo>),
}

impl SuccessorList {
    /// Returns `true` when no typed successor list is installed.
    #[must_use]
    pub const fn is_not_used(&self) -> bool {
        matches!(self, SuccessorList::NotUsed)
    }

    /// The `(key, target)` entries, empty when unused.
    #[must_use]
    pub fn entries(&self) -> &[SuccessorInfo] {
        match self {
            SuccessorList::NotUsed => &[],
            SuccessorList::PackedSwitch(v)
            | SuccessorList::SparseSwitch(v)
            | SuccessorList::Catch(v) => v,
        }
    }

    /// Mutable `(key, target)` entries, empty when unused.
    pub fn entries_mut(&mut self) -> &mut [SuccessorInfo] {
        match self {
            SuccessorList::NotUsed => &mut [],
            SuccessorList::PackedSwitch(v)
            | SuccessorList::SparseSwitch(v)
            | SuccessorList::Catch(v) => v,
        }
    }
}

/// A basic block: an ordered instruction run with a single entry, a
/// fallthrough exit, an optional taken edge, and optional typed successors.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    /// Stable block id, unique and dense within the graph.
    pub id: BlockId,
    /// Kind tag.
    pub kind: BlockKind,
    /// Starting code-unit offset.
    pub start_offset: u32,
    /// First instruction of the chain.
    pub first_insn: Option<InstrId>,
    /// Last instruction of the chain.
    pub last_insn: Option<InstrId>,
    /// Taken branch target.
    pub taken: Option<BlockId>,
    /// Fallthrough target.
    pub fall_through: Option<BlockId>,
    /// Typed successor list for switch/catch dispatch.
    pub successors: SuccessorList,
    /// Predecessor block ids, kept consistent with successor edges.
    pub predecessors: Vec<BlockId>,
    /// Block ends in a return joining the exit block.
    pub terminated_by_return: bool,
    /// Block ends in an explicit `throw`.
    pub explicit_throw: bool,
    /// Block ends in a conditional branch.
    pub conditional_branch: bool,
    /// Block is a catch handler entry point.
    pub catch_entry: bool,
    /// Block has been removed from the graph.
    pub hidden: bool,
    /// Immediate dominator, filled by the dominator computation.
    pub i_dom: Option<BlockId>,
    /// Dominance bitset (blocks this block dominates), filled by the
    /// dominator computation.
    pub dom_bits: Option<BitSet>,
}

impl BasicBlock {
    /// Creates an empty block of the given kind.
    #[must_use]
    pub fn new(id: BlockId, kind: BlockKind) -> Self {
        Self {
            id,
            kind,
            start_offset: 0,
            first_insn: None,
            last_insn: None,
            taken: None,
            fall_through: None,
            successors: SuccessorList::default(),
            predecessors: Vec::new(),
            terminated_by_return: false,
            explicit_throw: false,
            conditional_branch: false,
            catch_entry: false,
            hidden: kind == BlockKind::Null,
            i_dom: None,
            dom_bits: None,
        }
    }

    /// All outgoing edges: taken, fallthrough, then typed successors.
    #[must_use]
    pub fn successor_blocks(&self) -> Vec<BlockId> {
        let mut out = Vec::new();
        if let Some(taken) = self.taken {
            out.push(taken);
        }
        if let Some(ft) = self.fall_through {
            out.push(ft);
        }
        for info in self.successors.entries() {
            out.push(info.block);
        }
        out
    }

    /// Inserts a predecessor edge endpoint (idempotent).
    pub fn add_predecessor(&mut self, pred: BlockId) {
        if !self.predecessors.contains(&pred) {
            self.predecessors.push(pred);
        }
    }

    /// Removes a predecessor edge endpoint if present.
    pub fn remove_predecessor(&mut self, pred: BlockId) {
        self.predecessors.retain(|&p| p != pred);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::NULL_BLOCK;

    #[test]
    fn test_null_block_is_hidden() {
        let block = BasicBlock::new(NULL_BLOCK, BlockKind::Null);
        assert!(block.hidden);
    }

    #[test]
    fn test_successor_collection_order() {
        let mut block = BasicBlock::new(BlockId::new(1), BlockKind::Code);
        block.taken = Some(BlockId::new(2));
        block.fall_through = Some(BlockId::new(3));
        block.successors = SuccessorList::Catch(vec![SuccessorInfo {
            block: BlockId::new(4),
            key: 9,
        }]);

        assert_eq!(
            block.successor_blocks(),
            vec![BlockId::new(2), BlockId::new(3), BlockId::new(4)]
        );
    }

    #[test]
    fn test_predecessors_idempotent() {
        let mut block = BasicBlock::new(BlockId::new(1), BlockKind::Code);
        block.add_predecessor(BlockId::new(2));
        block.add_predecessor(BlockId::new(2));
        assert_eq!(block.predecessors.len(), 1);

        block.remove_predecessor(BlockId::new(2));
        assert!(block.predecessors.is_empty());
    }
}
