//! SSA construction and phi type propagation.
//!
//! Converts register-based locals into static single assignment form:
//! [`build_ssa`] runs the value-table construction (loop-header phis
//! created eagerly and backfilled after the walk, register loads/stores
//! rewritten away, environment snapshots attached to throwing
//! instructions), then [`propagate_types`] reconciles the ambiguous dex
//! typing of phis to a fixed point.
//!
//! # Usage
//!
//! ```rust,ignore
//! use dexmir::{mir::GraphBuilder, ssa::build_ssa};
//!
//! let mut graph = GraphBuilder::build(&body, false)?;
//! build_ssa(&mut graph)?;
//! ```

mod builder;
mod typeprop;

pub use builder::build_ssa;
pub use typeprop::propagate_types;
