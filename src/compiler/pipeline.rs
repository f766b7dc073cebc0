//! The pass trait and the fixpoint pass pipeline.

use crate::{
    bytecode::MethodBody,
    dataflow::{NullPropagation, RangePropagation},
    mir::MirGraph,
    opt::{BcePass, GvnPass, LsePass},
    Result,
};

/// Interface of one graph transformation pass.
pub trait MirPass: Send + Sync {
    /// Stable pass name for diagnostics.
    fn name(&self) -> &'static str;

    /// One-line description of what the pass does.
    fn description(&self) -> &'static str;

    /// Runs the pass over a method's graph.
    ///
    /// # Returns
    ///
    /// `true` when the graph changed.
    ///
    /// # Errors
    ///
    /// Internal invariant violations abort the method's compilation.
    fn run(&self, graph: &mut MirGraph, body: &MethodBody) -> Result<bool>;
}

impl MirPass for NullPropagation {
    fn name(&self) -> &'static str {
        "null-propagation"
    }

    fn description(&self) -> &'static str {
        "Removes null checks on references proven non-null"
    }

    fn run(&self, graph: &mut MirGraph, _body: &MethodBody) -> Result<bool> {
        Ok(NullPropagation::run(graph))
    }
}

impl MirPass for GvnPass {
    fn name(&self) -> &'static str {
        "global-value-numbering"
    }

    fn description(&self) -> &'static str {
        "Eliminates redundant pure computations over the dominator tree"
    }

    fn run(&self, graph: &mut MirGraph, _body: &MethodBody) -> Result<bool> {
        Ok(GvnPass::run(graph))
    }
}

impl MirPass for RangePropagation {
    fn name(&self) -> &'static str {
        "range-propagation"
    }

    fn description(&self) -> &'static str {
        "Folds comparisons proven always-true or always-false"
    }

    fn run(&self, graph: &mut MirGraph, _body: &MethodBody) -> Result<bool> {
        Ok(RangePropagation::run(graph))
    }
}

impl MirPass for BcePass {
    fn name(&self) -> &'static str {
        "bounds-check-elimination"
    }

    fn description(&self) -> &'static str {
        "Removes bounds checks whose index provably fits the array"
    }

    fn run(&self, graph: &mut MirGraph, _body: &MethodBody) -> Result<bool> {
        Ok(BcePass::run(graph))
    }
}

impl MirPass for LsePass {
    fn name(&self) -> &'static str {
        "load-store-elimination"
    }

    fn description(&self) -> &'static str {
        "Removes redundant heap loads and stores via alias analysis"
    }

    fn run(&self, graph: &mut MirGraph, body: &MethodBody) -> Result<bool> {
        Ok(LsePass::run(graph, &body.fields))
    }
}

/// An ordered sequence of passes run over each method.
pub struct PassPipeline {
    passes: Vec<Box<dyn MirPass>>,
}

impl PassPipeline {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    /// The default optimization order: null propagation first (it widens
    /// the reach of value numbering), value numbering before the range
    /// passes (bounds-check elimination needs unified length reads), and
    /// load-store elimination last (it profits from every earlier
    /// cleanup).
    #[must_use]
    pub fn default_pipeline() -> Self {
        let mut pipeline = Self::new();
        pipeline.add(NullPropagation);
        pipeline.add(GvnPass);
        pipeline.add(RangePropagation);
        pipeline.add(BcePass);
        pipeline.add(LsePass);
        pipeline
    }

    /// Appends a pass to the pipeline.
    pub fn add(&mut self, pass: impl MirPass + 'static) {
        self.passes.push(Box::new(pass));
    }

    /// The registered passes, in order.
    #[must_use]
    pub fn passes(&self) -> &[Box<dyn MirPass>] {
        &self.passes
    }

    /// Runs every pass once.
    ///
    /// # Errors
    ///
    /// Propagates the first pass failure.
    pub fn run_once(&self, graph: &mut MirGraph, body: &MethodBody) -> Result<bool> {
        let mut changed = false;
        for pass in &self.passes {
            changed |= pass.run(graph, body)?;
        }
        Ok(changed)
    }

    /// Re-runs the pipeline until no pass reports a change, bounded by
    /// `max_iterations`.
    ///
    /// # Errors
    ///
    /// Propagates the first pass failure.
    pub fn run_to_fixpoint(
        &self,
        graph: &mut MirGraph,
        body: &MethodBody,
        max_iterations: usize,
    ) -> Result<bool> {
        let mut changed_any = false;
        for _ in 0..max_iterations {
            if !self.run_once(graph, body)? {
                break;
            }
            changed_any = true;
        }
        Ok(changed_any)
    }
}

impl Default for PassPipeline {
    fn default() -> Self {
        Self::default_pipeline()
    }
}
