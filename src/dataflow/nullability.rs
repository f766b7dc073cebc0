//! Null propagation: a `can_be_null` fact, OR-merged at join points.
//!
//! Allocations, string/class constants, and `move-exception` results are
//! never null; a null check narrows its operand to non-null for the code
//! below it. A null check whose operand is already provably non-null is
//! redundant: its consumers get the ignore-null-check flag and the check
//! node is removed with its uses rewired to the raw reference.

use crate::{
    dataflow::{ContextualizedPass, Property, PropertyVisitor},
    mir::{InstrId, MirGraph, Op, OptFlags},
};

/// The nullability fact of a reference value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nullability {
    /// Whether the value may be null on some path.
    pub can_be_null: bool,
}

impl Nullability {
    const NON_NULL: Nullability = Nullability { can_be_null: false };
}

impl Property for Nullability {
    fn default_value() -> Self {
        // Conservative: anything unknown may be null.
        Nullability { can_be_null: true }
    }

    fn merge(a: &Self, b: &Self) -> Self {
        Nullability {
            can_be_null: a.can_be_null || b.can_be_null,
        }
    }
}

struct NullVisitor {
    /// `(check, object)` pairs proven redundant.
    redundant: Vec<(InstrId, InstrId)>,
}

impl PropertyVisitor<Nullability> for NullVisitor {
    fn visit_insn(&mut self, ctx: &mut ContextualizedPass<'_, Nullability>, insn: InstrId) {
        match ctx.graph().instr(insn).op {
            Op::NewInstance { .. }
            | Op::NewArray { .. }
            | Op::StringRef { .. }
            | Op::ClassRef { .. }
            | Op::MoveException => {
                ctx.set_property(insn, Nullability::NON_NULL);
            }
            Op::NullCheck { object } => {
                if !ctx.get_property(object).can_be_null {
                    self.redundant.push((insn, object));
                }
                // Below the check both the operand and the check result
                // are non-null on the fall-through path.
                ctx.set_property(object, Nullability::NON_NULL);
                ctx.set_property(insn, Nullability::NON_NULL);
            }
            _ => {}
        }
    }
}

/// The null propagation pass.
pub struct NullPropagation;

impl NullPropagation {
    /// Runs null propagation, removing provably redundant null checks.
    ///
    /// Returns `true` if the graph changed. A redundant check that anchors
    /// a check/work split stays in place (the guard structure still needs
    /// its work instruction) and only receives the ignore flag.
    pub fn run(graph: &mut MirGraph) -> bool {
        let mut visitor = NullVisitor {
            redundant: Vec::new(),
        };
        ContextualizedPass::new(graph).run(&mut visitor);

        let mut changed = false;
        for (check, object) in visitor.redundant {
            if !graph.instr(check).is_live() {
                continue;
            }

            // Consumers of the checked reference may skip their implicit
            // null check.
            let users: Vec<InstrId> = graph
                .live_instrs()
                .filter(|&id| {
                    let mut uses = false;
                    graph.instr(id).op.for_each_input(|input| uses |= input == check);
                    uses
                })
                .collect();
            for user in users {
                let flags = &mut graph.instr_mut(user).flags;
                if !flags.contains(OptFlags::IGNORE_NULL_CHECK) {
                    *flags |= OptFlags::IGNORE_NULL_CHECK;
                    changed = true;
                }
            }

            if graph.instr(check).check_body {
                let flags = &mut graph.instr_mut(check).flags;
                if !flags.contains(OptFlags::IGNORE_NULL_CHECK) {
                    *flags |= OptFlags::IGNORE_NULL_CHECK;
                    changed = true;
                }
                continue;
            }

            graph.replace_uses(check, object);
            graph.remove_instr(check);
            changed = true;
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bytecode::{CodeAssembler, FieldDesc},
        mir::{GraphBuilder, PrimType},
        ssa::build_ssa,
    };

    fn prepared(asm: CodeAssembler) -> MirGraph {
        let body = asm.finish().unwrap();
        let mut graph = GraphBuilder::build(&body, true).unwrap();
        build_ssa(&mut graph).unwrap();
        graph
    }

    fn count_null_checks(graph: &MirGraph) -> usize {
        graph
            .live_instrs()
            .filter(|&i| matches!(graph.instr(i).op, Op::NullCheck { .. }))
            .count()
    }

    #[test]
    fn test_fresh_allocation_needs_no_check() {
        // v0 = new int[v1]; v2 = v0.length
        let mut asm = CodeAssembler::new(3, 1);
        asm.param_types(&[PrimType::Int]);
        asm.new_array(0, 2, 1)
            .unwrap()
            .array_length(1, 0)
            .unwrap()
            .return_val(1)
            .unwrap();
        let mut graph = prepared(asm);

        assert_eq!(count_null_checks(&graph), 1);
        let changed = NullPropagation::run(&mut graph);
        assert!(changed);
        assert_eq!(count_null_checks(&graph), 0);

        // The array length now reads the allocation directly.
        let len = graph
            .live_instrs()
            .find(|&i| matches!(graph.instr(i).op, Op::ArrayLength { .. }))
            .unwrap();
        let Op::ArrayLength { array } = graph.instr(len).op else {
            unreachable!()
        };
        assert!(matches!(graph.instr(array).op, Op::NewArray { .. }));
        graph.check_consistency().unwrap();
    }

    #[test]
    fn test_second_check_on_same_reference_is_redundant() {
        // Two field reads on the same parameter: the first check narrows
        // the reference, the second is removed.
        let mut asm = CodeAssembler::new(3, 1);
        asm.param_types(&[PrimType::Ref]);
        let field = asm.add_field(FieldDesc {
            offset: 8,
            class_def_index: 0,
            ty: PrimType::Int,
            is_volatile: false,
            requires_class_init: false,
        });
        asm.iget(0, 2, field)
            .unwrap()
            .iget(1, 2, field)
            .unwrap()
            .add_int(0, 0, 1)
            .unwrap()
            .return_val(0)
            .unwrap();
        let mut graph = prepared(asm);

        assert_eq!(count_null_checks(&graph), 2);
        NullPropagation::run(&mut graph);
        assert_eq!(count_null_checks(&graph), 1);
        graph.check_consistency().unwrap();
    }

    #[test]
    fn test_parameter_check_is_kept() {
        // A single check on a parameter cannot be removed.
        let mut asm = CodeAssembler::new(2, 1);
        asm.param_types(&[PrimType::Ref]);
        asm.array_length(0, 1).unwrap().return_val(0).unwrap();
        let mut graph = prepared(asm);

        let changed = NullPropagation::run(&mut graph);
        assert!(!changed);
        assert_eq!(count_null_checks(&graph), 1);
    }

    #[test]
    fn test_merge_with_unchecked_path_stays_nullable() {
        // if (v2 == 0) { v0 = v1.length } ; v0 = v1.length - the second
        // length sits at a merge where one path never checked v1.
        let mut asm = CodeAssembler::new(4, 2);
        asm.param_types(&[PrimType::Ref, PrimType::Int]);
        asm.if_eqz(3, "skip")
            .unwrap()
            .array_length(0, 2)
            .unwrap()
            .label("skip")
            .unwrap()
            .array_length(0, 2)
            .unwrap()
            .return_val(0)
            .unwrap();
        let mut graph = prepared(asm);

        assert_eq!(count_null_checks(&graph), 2);
        NullPropagation::run(&mut graph);
        // Neither check can go: the merge ORs in the unchecked path.
        assert_eq!(count_null_checks(&graph), 2);
    }
}
