//! Dominator computation over the MIR graph.
//!
//! Implements the iterative immediate-dominator algorithm over reverse
//! postorder. Results are stored on the blocks themselves: the immediate
//! dominator link and a dominance bitset (the set of blocks dominating the
//! block, itself included), which makes `dominates` queries a bit test.
//!
//! Passes that consume dominance (bounds-check elimination, the
//! dominator-scoped value numbering) call
//! [`compute_dominators`](MirGraph::compute_dominators) once after graph
//! construction and again after any pass that changes the block structure.

use crate::{
    mir::{BlockId, MirGraph},
    utils::BitSet,
};

impl MirGraph {
    /// Computes immediate dominators and dominance bitsets for all blocks
    /// reachable from the entry block.
    ///
    /// Unreachable blocks keep `i_dom == None` and an empty bitset.
    pub fn compute_dominators(&mut self) {
        let num_blocks = self.block_count();
        let rpo = self.reverse_postorder();

        let mut order_index = vec![usize::MAX; num_blocks];
        for (idx, &block) in rpo.iter().enumerate() {
            order_index[block.index()] = idx;
        }

        let mut idom: Vec<Option<BlockId>> = vec![None; num_blocks];
        idom[self.entry().index()] = Some(self.entry());

        let intersect = |idom: &[Option<BlockId>], mut a: BlockId, mut b: BlockId| -> BlockId {
            while a != b {
                while order_index[a.index()] > order_index[b.index()] {
                    a = idom[a.index()].expect("processed block has idom");
                }
                while order_index[b.index()] > order_index[a.index()] {
                    b = idom[b.index()].expect("processed block has idom");
                }
            }
            a
        };

        let mut changed = true;
        while changed {
            changed = false;
            for &block in rpo.iter().skip(1) {
                let mut new_idom: Option<BlockId> = None;
                for &pred in &self.block(block).predecessors {
                    if idom[pred.index()].is_none() {
                        // Not yet processed (or unreachable).
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(cur) => intersect(&idom, cur, pred),
                    });
                }
                if let Some(new_idom) = new_idom {
                    if idom[block.index()] != Some(new_idom) {
                        idom[block.index()] = Some(new_idom);
                        changed = true;
                    }
                }
            }
        }

        // Publish the idom links (entry's self-link becomes None) and the
        // dominance bitsets in RPO so parents are ready before children.
        let entry = self.entry();
        for idx in 0..num_blocks {
            let block = BlockId::new(idx);
            let link = match idom[idx] {
                Some(_) if block == entry => None,
                other => other,
            };
            self.block_mut(block).i_dom = link;
            self.block_mut(block).dom_bits = None;
        }
        for &block in &rpo {
            let mut bits = match self.block(block).i_dom {
                Some(parent) => self
                    .block(parent)
                    .dom_bits
                    .clone()
                    .unwrap_or_else(|| BitSet::new(num_blocks)),
                None => BitSet::new(num_blocks),
            };
            bits.grow(num_blocks);
            bits.insert(block.index());
            self.block_mut(block).dom_bits = Some(bits);
        }
    }

    /// Immediate dominator of a block (`None` for the entry block and
    /// unreachable blocks).
    #[must_use]
    pub fn idom(&self, block: BlockId) -> Option<BlockId> {
        self.block(block).i_dom
    }

    /// Returns `true` if `dominator` dominates `dominated`.
    ///
    /// Every block dominates itself. Requires
    /// [`compute_dominators`](Self::compute_dominators) to have run since
    /// the last structural change.
    #[must_use]
    pub fn dominates(&self, dominator: BlockId, dominated: BlockId) -> bool {
        match &self.block(dominated).dom_bits {
            Some(bits) => {
                dominator.index() < bits.len() && bits.contains(dominator.index())
            }
            None => false,
        }
    }

    /// Returns `true` if an instruction strictly dominates another.
    ///
    /// Within one block, chain order decides; across blocks, block
    /// dominance decides.
    #[must_use]
    pub fn strictly_dominates_insn(
        &self,
        dominator: crate::mir::InstrId,
        dominated: crate::mir::InstrId,
    ) -> bool {
        let a_block = self.instr(dominator).block;
        let b_block = self.instr(dominated).block;
        if a_block == b_block {
            let insns = self.block_insns(a_block);
            let a_pos = insns.iter().position(|&i| i == dominator);
            let b_pos = insns.iter().position(|&i| i == dominated);
            matches!((a_pos, b_pos), (Some(a), Some(b)) if a < b)
        } else {
            self.dominates(a_block, b_block)
        }
    }
}
