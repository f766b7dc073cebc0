// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![allow(clippy::too_many_arguments)]

//! # dexmir
//!
//! A mid-level IR compiler pipeline for Dalvik bytecode. Built in pure Rust,
//! `dexmir` translates a method's code units into a control-flow graph of
//! typed instructions, converts the graph to SSA form, and runs a suite of
//! dataflow-based optimizations - bounds-check elimination, load-store
//! elimination, null and range propagation, and dominator-scoped value
//! numbering - producing a register-allocation-ready representation for a
//! backend code generator.
//!
//! ## Features
//!
//! - **🧱 Arena-indexed graph model** - blocks and instructions referenced by
//!   small integer ids within a per-compilation arena, no cyclic ownership
//! - **🪓 Exception-aware CFG construction** - try/catch successor edges,
//!   check/work splitting of throwing instructions, switch payload decoding
//! - **🔁 SSA construction** - value-table based with eagerly created and
//!   backfilled loop-header phis, plus phi type reconciliation
//! - **📐 Fixed-point dataflow framework** - a reusable contextualized pass
//!   engine parameterized by a mergeable fact type
//! - **✂️ Conservative optimizers** - every elimination pass skips rather
//!   than guesses whenever a soundness precondition cannot be established
//! - **🧵 Parallel batch compilation** - independent methods compile on
//!   worker threads with private graphs; only the inliner cache is shared
//!
//! ## Quick Start
//!
//! Add `dexmir` to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! dexmir = "0.1"
//! ```
//!
//! ### Using the Prelude
//!
//! ```rust,no_run
//! use dexmir::prelude::*;
//!
//! let mut asm = CodeAssembler::new(2, 0);
//! asm.const4(0, 5)?.return_val(0)?;
//! let body = asm.finish()?;
//!
//! let outcome = compile_method(&body, &CompileOptions::default(), &InlinerCache::new())?;
//! if let Some(graph) = outcome.graph() {
//!     println!("{}", graph.to_dot(Some("demo")));
//! }
//! # Ok::<(), dexmir::Error>(())
//! ```
//!
//! ### Driving the stages by hand
//!
//! ```rust,no_run
//! use dexmir::{bytecode::CodeAssembler, mir::GraphBuilder, opt::BcePass, ssa::build_ssa};
//!
//! let mut asm = CodeAssembler::new(3, 1);
//! asm.const4(0, 0)?.return_void()?;
//! let body = asm.finish()?;
//!
//! let mut graph = GraphBuilder::build(&body, false)?;
//! build_ssa(&mut graph)?;
//! BcePass::run(&mut graph);
//! graph.check_consistency()?;
//! # Ok::<(), dexmir::Error>(())
//! ```
//!
//! ## Architecture
//!
//! `dexmir` is organized along the data flow:
//!
//! - [`bytecode`] - opcode table, instruction decoding, method containers,
//!   and a label-based test assembler
//! - [`mir`] - the instruction/block data model, the CFG builder,
//!   dominators, natural loops, the consistency checker, and DOT export
//! - [`ssa`] - SSA construction and phi type propagation
//! - [`dataflow`] - the contextualized fixed-point engine with null and
//!   range propagation
//! - [`opt`] - value numbering, bounds-check elimination, load-store
//!   elimination
//! - [`compiler`] - the pass pipeline, per-method punt-or-compile driver,
//!   parallel batch driver, and the inliner cache service
//! - [`Error`] and [`Result`] - comprehensive error handling
//!
//! ## Error handling
//!
//! A method that cannot be optimally compiled falls back to a slower but
//! correct execution path: malformed input fails the *method* (never the
//! job), unsupported-but-valid shapes produce a punt-to-interpreter
//! outcome, and pass-local conflicts (irreconcilable phi types) are
//! contained by marking the offending phi dead.

#[macro_use]
pub(crate) mod error;

pub mod bytecode;
pub mod compiler;
pub mod dataflow;
pub mod mir;
pub mod opt;
pub mod ssa;
pub mod utils;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust,no_run
/// use dexmir::prelude::*;
///
/// let cache = InlinerCache::new();
/// ```
pub mod prelude;

pub use compiler::{
    compile_all, compile_method, CompileOptions, InlinerCache, MethodCompilation, PuntReason,
};
pub use error::Error;

/// The result type used throughout dexmir.
pub type Result<T> = std::result::Result<T, Error>;
