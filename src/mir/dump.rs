//! DOT (Graphviz) export of the MIR graph.
//!
//! A read-only, side-effect-free diagnostic over the finalized graph;
//! never part of the compilation contract. Entry blocks are highlighted in
//! green, exit blocks in red, catch entries in orange.

use std::fmt::Write;

use crate::{
    mir::{BlockKind, InstrId, MirGraph, Op, SuccessorList},
    utils::escape_dot,
};

impl MirGraph {
    /// Renders one instruction as a compact text line.
    #[must_use]
    pub fn format_insn(&self, id: InstrId) -> String {
        let insn = self.instr(id);
        let body = match &insn.op {
            Op::Nop => "nop".to_string(),
            Op::LoadLocal { vreg } => format!("{id} = load v{vreg}"),
            Op::StoreLocal { vreg, value } => format!("store v{vreg}, {value}"),
            Op::Phi { vreg, inputs } => {
                let mut s = format!("{id} = phi v{vreg} [");
                for (i, (value, pred)) in inputs.iter().enumerate() {
                    if i > 0 {
                        s.push_str(", ");
                    }
                    let _ = write!(s, "{value}@{pred}");
                }
                s.push(']');
                s
            }
            Op::Check { body } => format!("check {body}"),
            Op::Const { value } => format!("{id} = const {value}"),
            Op::Param { index } => format!("{id} = param {index}"),
            Op::ClassRef { class_idx } => format!("{id} = class type@{class_idx}"),
            Op::StringRef { string_idx } => format!("{id} = string@{string_idx}"),
            Op::BinOp { kind, lhs, rhs } => {
                format!("{id} = {kind:?} {lhs}, {rhs}").to_lowercase()
            }
            Op::UnOp { kind, operand } => format!("{id} = {kind:?} {operand}").to_lowercase(),
            Op::Goto => "goto".to_string(),
            Op::If { kind, lhs, rhs } => match rhs {
                Some(rhs) => format!("if-{kind:?} {lhs}, {rhs}").to_lowercase(),
                None => format!("if-{kind:?}z {lhs}").to_lowercase(),
            },
            Op::Switch { value, .. } => format!("switch {value}"),
            Op::Return { value: Some(v) } => format!("return {v}"),
            Op::Return { value: None } => "return-void".to_string(),
            Op::Throw { exception } => format!("throw {exception}"),
            Op::MoveException => format!("{id} = move-exception"),
            Op::MonitorEnter { object } => format!("monitor-enter {object}"),
            Op::MonitorExit { object } => format!("monitor-exit {object}"),
            Op::NewInstance { class_idx } => format!("{id} = new-instance type@{class_idx}"),
            Op::NewArray { length, class_idx } => {
                format!("{id} = new-array {length}, type@{class_idx}")
            }
            Op::ArrayLength { array } => format!("{id} = array-length {array}"),
            Op::NullCheck { object } => format!("{id} = null-check {object}"),
            Op::BoundsCheck { index, length } => {
                format!("{id} = bounds-check {index}, {length}")
            }
            Op::ArrayGet { array, index } => format!("{id} = aget {array}[{index}]"),
            Op::ArraySet {
                array,
                index,
                value,
            } => format!("aset {array}[{index}], {value}"),
            Op::FieldGet { object, field_idx } => {
                format!("{id} = iget {object}.field@{field_idx}")
            }
            Op::FieldSet {
                object,
                value,
                field_idx,
            } => format!("iput {object}.field@{field_idx}, {value}"),
            Op::StaticGet {
                class_ref,
                field_idx,
            } => format!("{id} = sget {class_ref}.field@{field_idx}"),
            Op::StaticSet {
                class_ref,
                value,
                field_idx,
            } => format!("sput {class_ref}.field@{field_idx}, {value}"),
            Op::ClassInit { class_idx } => format!("clinit type@{class_idx}"),
            Op::Invoke {
                kind,
                method_idx,
                args,
            } => {
                let mut s = format!("{id} = invoke-{kind:?} method@{method_idx}(").to_lowercase();
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        s.push_str(", ");
                    }
                    let _ = write!(s, "{arg}");
                }
                s.push(')');
                s
            }
            Op::Deoptimize => "deoptimize".to_string(),
        };
        format!("{:04x}: {body}", insn.offset)
    }

    /// Generates a DOT format representation of this graph.
    ///
    /// # Arguments
    ///
    /// * `title` - Optional title for the graph (e.g., method name)
    ///
    /// # Returns
    ///
    /// A string containing the DOT representation of the graph.
    #[must_use]
    pub fn to_dot(&self, title: Option<&str>) -> String {
        let mut dot = String::new();

        dot.push_str("digraph MIR {\n");
        if let Some(name) = title {
            let _ = writeln!(dot, "    label=\"MIR: {}\";", escape_dot(name));
        }
        dot.push_str("    labelloc=t;\n");
        dot.push_str("    node [shape=box, fontname=\"Courier\", fontsize=10];\n");
        dot.push_str("    edge [fontname=\"Courier\", fontsize=9];\n\n");

        for block_id in self.block_ids() {
            let block = self.block(block_id);
            let node_name = format!("B{}_{:04X}", block_id.index(), block.start_offset);
            let mut label = match block.kind {
                BlockKind::Entry => format!("{node_name} (entry)"),
                BlockKind::Exit => format!("{node_name} (exit)"),
                BlockKind::ExceptionHandling => format!("{node_name} (eh)"),
                _ if block.catch_entry => format!("{node_name} (catch)"),
                _ => node_name.clone(),
            };
            label.push_str("\\l");
            for insn in self.block_insns(block_id) {
                label.push_str(&escape_dot(&self.format_insn(insn)));
                label.push_str("\\l");
            }

            let style = match block.kind {
                BlockKind::Entry => ", style=filled, fillcolor=lightgreen",
                BlockKind::Exit => ", style=filled, fillcolor=lightcoral",
                _ if block.catch_entry => ", style=filled, fillcolor=orange",
                _ => "",
            };
            let _ = writeln!(dot, "    {node_name} [label=\"{label}\"{style}];");
        }

        dot.push('\n');

        for block_id in self.block_ids() {
            let block = self.block(block_id);
            let source = format!("B{}_{:04X}", block_id.index(), block.start_offset);
            let mut emit = |target: crate::mir::BlockId, label: &str, color: &str| {
                let tb = self.block(target);
                let name = format!("B{}_{:04X}", target.index(), tb.start_offset);
                let _ = writeln!(
                    dot,
                    "    {source} -> {name} [label=\"{}\", color={color}];",
                    escape_dot(label)
                );
            };
            if let Some(taken) = block.taken {
                emit(taken, "taken", "green");
            }
            if let Some(ft) = block.fall_through {
                emit(ft, "", "black");
            }
            match &block.successors {
                SuccessorList::NotUsed => {}
                SuccessorList::PackedSwitch(v) | SuccessorList::SparseSwitch(v) => {
                    for info in v {
                        emit(info.block, &format!("case {}", info.key), "blue");
                    }
                }
                SuccessorList::Catch(v) => {
                    for info in v {
                        emit(info.block, &format!("catch type@{}", info.key), "purple");
                    }
                }
            }
        }

        dot.push_str("}\n");
        dot
    }
}

#[cfg(test)]
mod tests {
    use crate::mir::{BlockKind, MirGraph, Op, PrimType};

    #[test]
    fn test_dot_contains_blocks_and_edges() {
        let mut graph = MirGraph::new(8, 2);
        let a = graph.alloc_block(BlockKind::Code);
        let c = graph.alloc_instr(Op::Const { value: 42 }, 0, PrimType::Int);
        graph.append_instr(a, c);
        graph.set_fall_through(graph.entry(), Some(a));

        let dot = graph.to_dot(Some("test"));
        assert!(dot.starts_with("digraph MIR {"));
        assert!(dot.contains("const 42"));
        assert!(dot.contains("(entry)"));
        assert!(dot.contains("->"));
        assert!(dot.ends_with("}\n"));
    }
}
