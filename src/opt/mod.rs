//! Dataflow-based optimization passes over the SSA graph.
//!
//! - [`GvnPass`] - dominator-scoped global value numbering of pure
//!   operations; unifies redundant `array.length` reads so bounds-check
//!   elimination can see through them
//! - [`BcePass`] - bounds-check elimination via dominance-scoped value
//!   ranges and induction-variable reasoning
//! - [`LsePass`] - alias-aware load-store elimination via heap-location
//!   tracking and singleton escape analysis
//!
//! Every pass is conservative by construction: when a soundness
//! precondition cannot be established the pass skips rather than guesses.

mod bce;
mod gvn;
mod lse;

pub use bce::{BcePass, ValueBound, ValueRange};
pub use gvn::GvnPass;
pub use lse::{HeapLocation, HeapLocationCollector, LsePass, ReferenceInfo};
