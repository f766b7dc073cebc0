//! Compilation driver: pass pipeline, per-method outcomes, batch driver.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Compilation pipeline                        │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  MethodBody ──► GraphBuilder ──► build_ssa ──► PassPipeline      │
//! │                                                                  │
//! │  PassPipeline (default order)                                    │
//! │    ├─ null propagation      (redundant null checks)              │
//! │    ├─ value numbering       (unify pure computations)            │
//! │    ├─ range propagation     (fold implied comparisons)           │
//! │    ├─ bounds-check elim     (dominance-scoped ranges)            │
//! │    └─ load-store elim       (alias-aware heap tracking)          │
//! │                                                                  │
//! │  MethodCompilation          Compiled(graph) | Punt(reason)       │
//! │  compile_all                rayon batch, private graph each      │
//! │  InlinerCache               shared service, injected by ref      │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Error policy per the taxonomy: malformed input is fatal at method
//! granularity (`Err`), unsupported-but-valid shapes punt to the
//! interpreter (`Ok(Punt)`), pass-local conflicts stay local (dead
//! phis), and internal invariant violations are fatal logic errors.

mod inliner;
mod pipeline;

pub use inliner::{InlinerCache, MethodHotness, ProfileSource};
pub use pipeline::{MirPass, PassPipeline};

use crate::{
    bytecode::MethodBody,
    mir::{GraphBuilder, MirGraph},
    ssa::build_ssa,
    Result,
};

/// Per-compilation tuning knobs.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Skip generic exception edges for throw sites outside try ranges.
    pub suppress_exception_edges: bool,
    /// Run the optimization pipeline (off = build + SSA only).
    pub optimize: bool,
    /// Upper bound on pipeline fixpoint iterations.
    pub max_pass_iterations: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            suppress_exception_edges: false,
            optimize: true,
            max_pass_iterations: 4,
        }
    }
}

/// Why a method was handed back to the interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PuntReason {
    /// The method uses an instruction outside the supported subset.
    UnsupportedInstruction,
    /// The method shape is valid but not representable by the backend.
    UnsupportedShape(String),
}

/// Outcome of compiling one method.
///
/// A punt is not an error: the method falls back to a slower but correct
/// execution strategy. Correctness is never traded for optimization.
#[derive(Debug)]
pub enum MethodCompilation {
    /// The optimized graph, ready for code generation.
    Compiled(MirGraph),
    /// Compilation abandoned; run the method in the interpreter.
    Punt(PuntReason),
}

impl MethodCompilation {
    /// The compiled graph, if compilation succeeded.
    #[must_use]
    pub fn graph(&self) -> Option<&MirGraph> {
        match self {
            MethodCompilation::Compiled(graph) => Some(graph),
            MethodCompilation::Punt(_) => None,
        }
    }
}

/// Compiles a single method through the full pipeline.
///
/// # Arguments
///
/// * `body` - The method body container
/// * `options` - Compilation options
/// * `cache` - The shared inliner cache service (consulted by merge-based
///   inlining; pass a fresh cache when inlining is not wanted)
///
/// # Errors
///
/// Malformed bytecode and internal invariant violations are returned as
/// errors; the surrounding driver catches them at method granularity and
/// falls back to the interpreter rather than failing the whole job.
pub fn compile_method(
    body: &MethodBody,
    options: &CompileOptions,
    _cache: &InlinerCache,
) -> Result<MethodCompilation> {
    let mut graph = match GraphBuilder::build(body, options.suppress_exception_edges) {
        Ok(graph) => graph,
        Err(crate::Error::NotSupported) => {
            return Ok(MethodCompilation::Punt(PuntReason::UnsupportedInstruction))
        }
        Err(e) => return Err(e),
    };

    build_ssa(&mut graph)?;

    if options.optimize {
        let pipeline = PassPipeline::default_pipeline();
        pipeline.run_to_fixpoint(&mut graph, body, options.max_pass_iterations)?;
    }

    graph.compute_dominators();
    debug_assert!(graph.check_consistency().is_ok());
    Ok(MethodCompilation::Compiled(graph))
}

/// Compiles a batch of independent methods in parallel.
///
/// Each method compiles its own private graph; the only shared state is
/// the inliner cache behind its own synchronization.
#[must_use]
pub fn compile_all(
    bodies: &[MethodBody],
    options: &CompileOptions,
    cache: &InlinerCache,
) -> Vec<Result<MethodCompilation>> {
    use rayon::prelude::*;

    bodies
        .par_iter()
        .map(|body| compile_method(body, options, cache))
        .collect()
}
