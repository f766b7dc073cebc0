//! # dexmir Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the dexmir library. Import this module to get quick access to the essential
//! types for building, analyzing, and optimizing method graphs.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all dexmir operations
pub use crate::Error;

/// The result type used throughout dexmir
pub use crate::Result;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// Per-method and batch compilation drivers
pub use crate::compiler::{compile_all, compile_method};

/// Compilation options and outcomes
pub use crate::compiler::{CompileOptions, MethodCompilation, PuntReason};

/// The shared inliner cache service and profile lookup trait
pub use crate::compiler::{InlinerCache, ProfileSource};

/// The pass interface and pipeline
pub use crate::compiler::{MirPass, PassPipeline};

// ================================================================================================
// Bytecode Input Layer
// ================================================================================================

/// Method container and resolver tables
pub use crate::bytecode::{FieldDesc, MethodBody, MethodDesc, TryItem};

/// Instruction decoding
pub use crate::bytecode::{decode_at, CodeCursor, DecodedInstruction, Opcode};

/// The label-based bytecode assembler
pub use crate::bytecode::CodeAssembler;

// ================================================================================================
// Graph Model
// ================================================================================================

/// The graph, its builder, and node ids
pub use crate::mir::{BasicBlock, BlockId, GraphBuilder, InstrId, Instruction, MirGraph};

/// The typed operation model
pub use crate::mir::{BlockKind, Op, OptFlags, PrimType};

// ================================================================================================
// Analyses and Passes
// ================================================================================================

/// SSA construction
pub use crate::ssa::build_ssa;

/// The fixed-point dataflow engine
pub use crate::dataflow::{ContextualizedPass, Property, PropertyVisitor};

/// Built-in dataflow passes
pub use crate::dataflow::{NullPropagation, RangePropagation};

/// The optimization passes
pub use crate::opt::{BcePass, GvnPass, LsePass};
