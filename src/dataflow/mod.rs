//! Generic fixed-point dataflow framework and its instantiations.
//!
//! [`ContextualizedPass`] is a reusable engine tracking a per-instruction
//! fact type through a reverse post-order walk, merging predecessor
//! states and computing phi facts automatically. The fact type implements
//! [`Property`] (a default value plus a pure, associative, commutative,
//! monotonic merge).
//!
//! Built-in instantiations:
//!
//! - [`NullPropagation`] - `can_be_null` fact, OR-merged; removes
//!   provably redundant null checks
//! - [`RangePropagation`] - `[min, max]` interval fact; folds comparisons
//!   proven always-true/false, widening loop-header phis to stay sound
//!   across iterations

mod context;
mod nullability;
mod ranges;

pub use context::{ContextualizedPass, Property, PropertyVisitor};
pub use nullability::{NullPropagation, Nullability};
pub use ranges::{IntRange, RangePropagation};
