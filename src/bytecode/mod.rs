//! Dalvik bytecode input layer: opcodes, decoding, and method containers.
//!
//! This module is the boundary between the container format and the
//! compiler pipeline. It provides:
//!
//! - [`Opcode`] / [`Format`] / [`InsnFlags`] - the opcode table with the
//!   behavioural flags the CFG builder dispatches on
//! - [`DecodedInstruction`] / [`decode_at`] / [`CodeCursor`] - instruction
//!   decoding over 16-bit code-unit arrays
//! - [`MethodBody`] and the try/catch and resolver tables - the method
//!   container handed to the CFG builder
//! - [`CodeAssembler`] - a label-based assembler used by tests, examples,
//!   and benchmarks
//!
//! # Usage
//!
//! ```rust,ignore
//! use dexmir::bytecode::{CodeAssembler, CodeCursor};
//!
//! let mut asm = CodeAssembler::new(2, 0);
//! asm.const4(0, 3)?.return_val(0)?;
//! let body = asm.finish()?;
//!
//! let mut cursor = CodeCursor::new(&body.insns);
//! while let Some(step) = cursor.next_insn() {
//!     let (offset, insn, _width) = step?;
//!     println!("{offset:04x}: {}", insn.opcode);
//! }
//! ```

mod assembler;
mod insn;
mod method;
mod opcode;

pub use assembler::CodeAssembler;
pub use insn::{
    decode_at, CodeCursor, DecodedInstruction, ARRAY_DATA_SIGNATURE, PACKED_SWITCH_SIGNATURE,
    SPARSE_SWITCH_SIGNATURE,
};
pub use method::{
    CatchHandler, CatchHandlerList, FieldDesc, MethodBody, MethodDesc, TryItem, CATCH_ALL_KEY,
};
pub use opcode::{Format, InsnFlags, Opcode};
