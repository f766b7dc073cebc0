//! The typed operation model of the mid-level IR.
//!
//! [`Op`] is a closed sum over every instruction kind the pipeline knows:
//! the pseudo operations used before and during SSA construction
//! (`LoadLocal`/`StoreLocal`/`Phi`/`Check`), constants, arithmetic,
//! compares and branches, switches, invokes, allocation and heap access,
//! and the guard instructions (`NullCheck`/`BoundsCheck`) the optimization
//! passes reason about. Operands are [`InstrId`] value references: a
//! value-producing instruction *is* its SSA definition.
//!
//! Every pass dispatches on `Op` with exhaustive pattern matching, so a new
//! operation kind is a compile-time-checked concern in each pass rather
//! than a silently inherited default.

use bitflags::bitflags;

/// Arena index of an instruction within its [`crate::mir::MirGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrId(pub(crate) u32);

impl InstrId {
    /// Creates an id from a raw arena index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Raw arena index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for InstrId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "i{}", self.0)
    }
}

/// Arena index of a basic block within its [`crate::mir::MirGraph`].
///
/// Block id 0 is the distinguished hidden null block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub(crate) u32);

/// The distinguished null block, always block id 0 and always hidden.
pub const NULL_BLOCK: BlockId = BlockId(0);

impl BlockId {
    /// Creates an id from a raw arena index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Raw arena index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Returns `true` if this is the null block id.
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// Primitive value categories of the IR.
///
/// Dex bytecode leaves some instructions ambiguously typed (the same
/// `const` can produce an int or a float); the SSA type propagation pass
/// reconciles phi types from their inputs after construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimType {
    /// No value (also the pre-propagation state of phis).
    #[default]
    Void,
    /// Boolean (1 byte).
    Boolean,
    /// Signed 8-bit integer.
    Byte,
    /// Unsigned 16-bit code point.
    Char,
    /// Signed 16-bit integer.
    Short,
    /// Signed 32-bit integer.
    Int,
    /// Signed 64-bit integer.
    Long,
    /// 32-bit IEEE float.
    Float,
    /// 64-bit IEEE double.
    Double,
    /// Object reference.
    Ref,
}

impl PrimType {
    /// Storage size of the category in bytes (0 for void).
    #[must_use]
    pub const fn component_size(self) -> usize {
        match self {
            PrimType::Void => 0,
            PrimType::Boolean | PrimType::Byte => 1,
            PrimType::Char | PrimType::Short => 2,
            PrimType::Int | PrimType::Float => 4,
            PrimType::Long | PrimType::Double => 8,
            // Reference size is pointer-width; 8 covers every supported target.
            PrimType::Ref => 8,
        }
    }

    /// Returns `true` for the integral categories.
    #[must_use]
    pub const fn is_integral(self) -> bool {
        matches!(
            self,
            PrimType::Boolean
                | PrimType::Byte
                | PrimType::Char
                | PrimType::Short
                | PrimType::Int
                | PrimType::Long
        )
    }

    /// Returns `true` for float and double.
    #[must_use]
    pub const fn is_floating_point(self) -> bool {
        matches!(self, PrimType::Float | PrimType::Double)
    }

    /// Returns `true` for the 64-bit categories.
    #[must_use]
    pub const fn is_wide(self) -> bool {
        matches!(self, PrimType::Long | PrimType::Double)
    }
}

/// Binary operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum BinOpKind {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Ushr,
    /// Three-way compare producing an int (`cmp-long`, `cmpl/cmpg-*`).
    /// The bias decides the result when an operand is NaN.
    Cmp(CmpBias),
}

impl BinOpKind {
    /// Returns `true` if operand order does not matter.
    #[must_use]
    pub const fn is_commutative(self) -> bool {
        matches!(
            self,
            BinOpKind::Add | BinOpKind::Mul | BinOpKind::And | BinOpKind::Or | BinOpKind::Xor
        )
    }

    /// Returns `true` if the operation can raise (integer division by zero).
    #[must_use]
    pub const fn can_throw(self) -> bool {
        matches!(self, BinOpKind::Div | BinOpKind::Rem)
    }
}

/// NaN bias of a floating-point three-way compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpBias {
    /// Integer compare, no NaN involved.
    None,
    /// NaN compares as less-than (`cmpl`).
    Lt,
    /// NaN compares as greater-than (`cmpg`).
    Gt,
}

/// Unary operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOpKind {
    /// Arithmetic negation.
    Neg,
    /// Bitwise complement.
    Not,
    /// Primitive conversion; the result category is the instruction's type.
    Conv,
}

/// Comparison kinds of two-way conditional branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum IfKind {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl IfKind {
    /// The comparison taken when the branch is *not* taken.
    #[must_use]
    pub const fn negate(self) -> Self {
        match self {
            IfKind::Eq => IfKind::Ne,
            IfKind::Ne => IfKind::Eq,
            IfKind::Lt => IfKind::Ge,
            IfKind::Ge => IfKind::Lt,
            IfKind::Gt => IfKind::Le,
            IfKind::Le => IfKind::Gt,
        }
    }
}

/// Invoke dispatch kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum InvokeKind {
    Virtual,
    Super,
    Direct,
    Static,
    Interface,
}

/// Switch dispatch encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwitchKind {
    /// Contiguous keys starting from a first key.
    Packed,
    /// Explicit sorted keys.
    Sparse,
}

/// A single typed operation.
///
/// Operand slots hold [`InstrId`] value references. Index-style immediates
/// (class, string, field, method indices) are kept inline.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// No operation.
    Nop,
    /// Read of a virtual register; replaced by the tracked value and
    /// removed during SSA construction.
    LoadLocal {
        /// Virtual register number.
        vreg: u16,
    },
    /// Write of a virtual register; updates the tracked value and is
    /// removed during SSA construction.
    StoreLocal {
        /// Virtual register number.
        vreg: u16,
        /// Value being stored.
        value: InstrId,
    },
    /// SSA phi selecting a value per incoming control-flow edge.
    Phi {
        /// Virtual register this phi merges.
        vreg: u16,
        /// One `(value, predecessor)` pair per incoming edge.
        inputs: Vec<(InstrId, BlockId)>,
    },
    /// Guard half of a check/work split: owns the exception edges of its
    /// block and always falls through into the block holding `body`.
    Check {
        /// The moved work instruction this guard protects.
        body: InstrId,
    },
    /// Integer/float constant (bit pattern in two's complement).
    Const {
        /// Raw constant bits, sign-extended to 64 bits.
        value: i64,
    },
    /// Incoming method argument, defined in the entry block.
    Param {
        /// Argument position.
        index: u16,
    },
    /// Resolved class reference, the base of static field accesses.
    ClassRef {
        /// Class-definition index.
        class_idx: u16,
    },
    /// Resolved string constant reference.
    StringRef {
        /// String-pool index.
        string_idx: u16,
    },
    /// Binary arithmetic/logical operation.
    BinOp {
        /// Operation kind.
        kind: BinOpKind,
        /// Left operand.
        lhs: InstrId,
        /// Right operand.
        rhs: InstrId,
    },
    /// Unary operation (negation, complement, conversion).
    UnOp {
        /// Operation kind.
        kind: UnOpKind,
        /// Operand.
        operand: InstrId,
    },
    /// Unconditional jump; the target is the block's taken edge.
    Goto,
    /// Conditional branch. `rhs` is `None` for the zero-compare family.
    If {
        /// Comparison kind.
        kind: IfKind,
        /// Left operand.
        lhs: InstrId,
        /// Right operand, or `None` to compare against zero.
        rhs: Option<InstrId>,
    },
    /// Multi-way dispatch through the block's typed successor list.
    Switch {
        /// Scrutinee value.
        value: InstrId,
        /// Payload encoding.
        kind: SwitchKind,
    },
    /// Return from the method, joining the exit block.
    Return {
        /// Returned value, `None` for void.
        value: Option<InstrId>,
    },
    /// Explicit throw.
    Throw {
        /// The exception reference.
        exception: InstrId,
    },
    /// Materializes the in-flight exception at a catch entry.
    MoveException,
    /// Monitor acquisition.
    MonitorEnter {
        /// Lock object.
        object: InstrId,
    },
    /// Monitor release.
    MonitorExit {
        /// Lock object.
        object: InstrId,
    },
    /// Object allocation.
    NewInstance {
        /// Class-definition index.
        class_idx: u16,
    },
    /// Array allocation.
    NewArray {
        /// Element count.
        length: InstrId,
        /// Array class index.
        class_idx: u16,
    },
    /// Array length read.
    ArrayLength {
        /// Array reference.
        array: InstrId,
    },
    /// Null guard; produces the non-null reference.
    NullCheck {
        /// Checked reference.
        object: InstrId,
    },
    /// Array bounds guard; produces the in-range index.
    BoundsCheck {
        /// Checked index.
        index: InstrId,
        /// Array length value.
        length: InstrId,
    },
    /// Array element read.
    ArrayGet {
        /// Array reference (normally a null-check result).
        array: InstrId,
        /// Element index (normally a bounds-check result).
        index: InstrId,
    },
    /// Array element write.
    ArraySet {
        /// Array reference.
        array: InstrId,
        /// Element index.
        index: InstrId,
        /// Stored value.
        value: InstrId,
    },
    /// Instance field read.
    FieldGet {
        /// Object reference.
        object: InstrId,
        /// Field index into the resolver table.
        field_idx: u16,
    },
    /// Instance field write.
    FieldSet {
        /// Object reference.
        object: InstrId,
        /// Stored value.
        value: InstrId,
        /// Field index into the resolver table.
        field_idx: u16,
    },
    /// Static field read.
    StaticGet {
        /// Declaring class reference.
        class_ref: InstrId,
        /// Field index into the resolver table.
        field_idx: u16,
    },
    /// Static field write.
    StaticSet {
        /// Declaring class reference.
        class_ref: InstrId,
        /// Stored value.
        value: InstrId,
        /// Field index into the resolver table.
        field_idx: u16,
    },
    /// Class initialization check preceding a static access.
    ClassInit {
        /// Class-definition index.
        class_idx: u16,
    },
    /// Method invocation.
    Invoke {
        /// Dispatch kind.
        kind: InvokeKind,
        /// Method index into the resolver table.
        method_idx: u16,
        /// Argument values.
        args: Vec<InstrId>,
    },
    /// Deoptimization point; disables store elimination for the method.
    Deoptimize,
}

impl Op {
    /// Invokes `f` for every operand value reference of this operation.
    pub fn for_each_input(&self, mut f: impl FnMut(InstrId)) {
        match self {
            Op::Nop
            | Op::LoadLocal { .. }
            | Op::Const { .. }
            | Op::Param { .. }
            | Op::ClassRef { .. }
            | Op::StringRef { .. }
            | Op::Goto
            | Op::MoveException
            | Op::NewInstance { .. }
            | Op::ClassInit { .. }
            | Op::Deoptimize
            | Op::Check { .. }
            | Op::Return { value: None } => {}
            Op::StoreLocal { value, .. }
            | Op::Return { value: Some(value) }
            | Op::Throw { exception: value }
            | Op::MonitorEnter { object: value }
            | Op::MonitorExit { object: value }
            | Op::NewArray { length: value, .. }
            | Op::ArrayLength { array: value }
            | Op::NullCheck { object: value }
            | Op::UnOp { operand: value, .. }
            | Op::Switch { value, .. }
            | Op::FieldGet { object: value, .. }
            | Op::StaticGet {
                class_ref: value, ..
            } => f(*value),
            Op::Phi { inputs, .. } => {
                for (value, _) in inputs {
                    f(*value);
                }
            }
            Op::BinOp { lhs, rhs, .. } => {
                f(*lhs);
                f(*rhs);
            }
            Op::If { lhs, rhs, .. } => {
                f(*lhs);
                if let Some(rhs) = rhs {
                    f(*rhs);
                }
            }
            Op::BoundsCheck { index, length } => {
                f(*index);
                f(*length);
            }
            Op::ArrayGet { array, index } => {
                f(*array);
                f(*index);
            }
            Op::ArraySet {
                array,
                index,
                value,
            } => {
                f(*array);
                f(*index);
                f(*value);
            }
            Op::FieldSet { object, value, .. } => {
                f(*object);
                f(*value);
            }
            Op::StaticSet {
                class_ref, value, ..
            } => {
                f(*class_ref);
                f(*value);
            }
            Op::Invoke { args, .. } => {
                for arg in args {
                    f(*arg);
                }
            }
        }
    }

    /// Collects the operand value references of this operation.
    #[must_use]
    pub fn inputs(&self) -> Vec<InstrId> {
        let mut out = Vec::new();
        self.for_each_input(|id| out.push(id));
        out
    }

    /// Rewrites every operand through `f` simultaneously.
    ///
    /// Unlike repeated [`replace_input`](Self::replace_input) calls, all
    /// slots are remapped in one step, so a remapping whose range overlaps
    /// its domain (as in graph merging) cannot cascade.
    pub fn map_inputs(&mut self, mut f: impl FnMut(InstrId) -> InstrId) {
        let mut patch = |slot: &mut InstrId| {
            *slot = f(*slot);
        };
        match self {
            Op::Nop
            | Op::LoadLocal { .. }
            | Op::Const { .. }
            | Op::Param { .. }
            | Op::ClassRef { .. }
            | Op::StringRef { .. }
            | Op::Goto
            | Op::MoveException
            | Op::NewInstance { .. }
            | Op::ClassInit { .. }
            | Op::Deoptimize
            | Op::Check { .. }
            | Op::Return { value: None } => {}
            Op::StoreLocal { value, .. }
            | Op::Return { value: Some(value) }
            | Op::Throw { exception: value }
            | Op::MonitorEnter { object: value }
            | Op::MonitorExit { object: value }
            | Op::NewArray { length: value, .. }
            | Op::ArrayLength { array: value }
            | Op::NullCheck { object: value }
            | Op::UnOp { operand: value, .. }
            | Op::Switch { value, .. }
            | Op::FieldGet { object: value, .. }
            | Op::StaticGet {
                class_ref: value, ..
            } => patch(value),
            Op::Phi { inputs, .. } => {
                for (value, _) in inputs {
                    patch(value);
                }
            }
            Op::BinOp { lhs, rhs, .. } => {
                patch(lhs);
                patch(rhs);
            }
            Op::If { lhs, rhs, .. } => {
                patch(lhs);
                if let Some(rhs) = rhs {
                    patch(rhs);
                }
            }
            Op::BoundsCheck { index, length } => {
                patch(index);
                patch(length);
            }
            Op::ArrayGet { array, index } => {
                patch(array);
                patch(index);
            }
            Op::ArraySet {
                array,
                index,
                value,
            } => {
                patch(array);
                patch(index);
                patch(value);
            }
            Op::FieldSet { object, value, .. } => {
                patch(object);
                patch(value);
            }
            Op::StaticSet {
                class_ref, value, ..
            } => {
                patch(class_ref);
                patch(value);
            }
            Op::Invoke { args, .. } => {
                for arg in args {
                    patch(arg);
                }
            }
        }
    }

    /// Rewrites every operand equal to `from` into `to`.
    ///
    /// Returns the number of operand slots rewritten.
    pub fn replace_input(&mut self, from: InstrId, to: InstrId) -> usize {
        let mut replaced = 0;
        self.map_inputs(|id| {
            if id == from {
                replaced += 1;
                to
            } else {
                id
            }
        });
        replaced
    }

    /// Returns `true` if the operation can raise an exception.
    #[must_use]
    pub fn can_throw(&self) -> bool {
        match self {
            Op::Throw { .. }
            | Op::MonitorEnter { .. }
            | Op::MonitorExit { .. }
            | Op::NewInstance { .. }
            | Op::NewArray { .. }
            | Op::NullCheck { .. }
            | Op::BoundsCheck { .. }
            | Op::ClassInit { .. }
            | Op::StringRef { .. }
            | Op::Invoke { .. } => true,
            Op::BinOp { kind, .. } => kind.can_throw(),
            _ => false,
        }
    }

    /// Returns `true` if the operation writes a heap location.
    #[must_use]
    pub const fn is_heap_store(&self) -> bool {
        matches!(
            self,
            Op::ArraySet { .. } | Op::FieldSet { .. } | Op::StaticSet { .. }
        )
    }

    /// Returns `true` for operations that produce a usable value.
    #[must_use]
    pub const fn produces_value(&self) -> bool {
        !matches!(
            self,
            Op::Nop
                | Op::StoreLocal { .. }
                | Op::Check { .. }
                | Op::Goto
                | Op::If { .. }
                | Op::Switch { .. }
                | Op::Return { .. }
                | Op::Throw { .. }
                | Op::MonitorEnter { .. }
                | Op::MonitorExit { .. }
                | Op::ArraySet { .. }
                | Op::FieldSet { .. }
                | Op::StaticSet { .. }
                | Op::ClassInit { .. }
                | Op::Deoptimize
        )
    }
}

bitflags! {
    /// Per-instruction optimization flags.
    ///
    /// Set by analysis passes to tell the backend which implicit checks a
    /// lowered instruction may skip.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct OptFlags: u8 {
        /// The implicit null check is provably redundant.
        const IGNORE_NULL_CHECK = 1 << 0;
        /// The implicit range check is provably redundant.
        const IGNORE_RANGE_CHECK = 1 << 1;
        /// No suspend check is needed at this instruction.
        const SUPPRESS_SUSPEND_CHECK = 1 << 2;
    }
}

bitflags! {
    /// Whole-method attribute bits, OR-accumulated during graph building
    /// and across merged compilation units.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MethodAttrs: u16 {
        /// No invokes observed (starts set, cleared on first invoke).
        const IS_LEAF = 1 << 0;
        /// Method contains invoke instructions.
        const HAS_INVOKES = 1 << 1;
        /// Method contains monitor operations.
        const HAS_MONITOR_OPS = 1 << 2;
        /// Method accesses a volatile field.
        const HAS_VOLATILE_ACCESS = 1 << 3;
        /// Method contains heap stores.
        const HAS_HEAP_STORES = 1 << 4;
        /// Method contains a deoptimization point.
        const MAY_DEOPTIMIZE = 1 << 5;
    }
}

impl Default for MethodAttrs {
    fn default() -> Self {
        MethodAttrs::IS_LEAF
    }
}
