//! Shared utility types for graph construction and data flow analysis.
//!
//! This module provides the small building blocks the rest of the crate is
//! assembled from:
//!
//! - [`BitSet`] - compact bit vector used for try-range coverage, dominance
//!   bitsets, loop bodies, and the aliasing matrix
//! - [`escape_dot`] - string escaping for the DOT graph exporter

mod bitset;
mod dot;

pub use bitset::{BitSet, BitSetIter};
pub use dot::escape_dot;
