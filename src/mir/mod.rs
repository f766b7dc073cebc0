//! Mid-level IR: instruction model, basic blocks, and the CFG builder.
//!
//! This module is organized the way the data flows:
//!
//! - [`ops`](self) - the typed [`Op`] sum, ids, and flag bitsets
//! - [`Instruction`] / [`BasicBlock`] - the node/edge data model
//! - [`MirGraph`] - arenas, offset→block map, splitting, merging, and the
//!   consistency checker
//! - [`GraphBuilder`] - bytecode → CFG construction with exception-edge
//!   splitting
//! - dominators and natural loops - dominance-based analyses stored on the
//!   blocks
//! - DOT export - read-only diagnostics
//!
//! # Usage
//!
//! ```rust,ignore
//! use dexmir::{bytecode::CodeAssembler, mir::GraphBuilder};
//!
//! let mut asm = CodeAssembler::new(2, 0);
//! asm.const4(0, 5)?.return_val(0)?;
//! let body = asm.finish()?;
//!
//! let mut graph = GraphBuilder::build(&body, false)?;
//! graph.compute_dominators();
//! println!("{}", graph.to_dot(Some("demo")));
//! ```

mod block;
mod builder;
mod dom;
mod dump;
mod graph;
mod instruction;
mod loops;
mod ops;

pub use block::{BasicBlock, BlockKind, SuccessorInfo, SuccessorList};
pub use builder::{is_monitor_exit_catch_pattern, GraphBuilder};
pub use graph::{MergedUnit, MirGraph};
pub use instruction::Instruction;
pub use loops::NaturalLoop;
pub use ops::{
    BinOpKind, BlockId, CmpBias, IfKind, InstrId, InvokeKind, MethodAttrs, Op, OptFlags,
    PrimType, SwitchKind, UnOpKind, NULL_BLOCK,
};
