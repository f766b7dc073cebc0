//! Method body container: code units, try/catch tables, resolver tables.
//!
//! [`MethodBody`] is the input contract of the CFG builder: the code-unit
//! array, the register counts, the try-item and catch-handler tables in the
//! container format, and pre-resolved field/method descriptor tables that
//! stand in for the external resolver (field offsets, declaring classes,
//! volatility, and invoke return types are resolver facts, not bytecode).

use crate::mir::PrimType;

/// A try item covering a contiguous instruction range.
///
/// Offsets and counts are in 16-bit code units, as in the container format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryItem {
    /// First code-unit offset covered by this try range.
    pub start_addr: u32,
    /// Number of code units covered.
    pub insn_count: u16,
    /// Index into the method's catch-handler list table.
    pub handler_index: u16,
}

impl TryItem {
    /// Returns `true` if `offset` lies inside this try range.
    #[must_use]
    pub fn covers(&self, offset: u32) -> bool {
        offset >= self.start_addr && offset < self.start_addr + u32::from(self.insn_count)
    }
}

/// A single typed catch handler: exception type index plus handler address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatchHandler {
    /// Type index of the caught exception class.
    pub type_idx: u16,
    /// Code-unit address of the handler entry point.
    pub address: u32,
}

/// An ordered list of catch handlers plus an optional catch-all.
///
/// Handlers are tried in declaration order; the catch-all, when present,
/// comes last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatchHandlerList {
    /// Typed handlers in declaration order.
    pub handlers: Vec<CatchHandler>,
    /// Catch-all handler address, if any.
    pub catch_all: Option<u32>,
}

/// Successor-list key used for a catch-all handler edge.
///
/// Typed handlers use their exception type index as the key; the catch-all
/// uses this sentinel, mirroring the container format's "no type" encoding.
pub const CATCH_ALL_KEY: i32 = -1;

/// A pre-resolved instance or static field descriptor.
///
/// Indexed by the field index carried in `iget`/`iput`/`sget`/`sput`
/// instructions. Resolution (layout offsets, declaring class, volatility)
/// happens outside this crate; the pipeline only consumes the results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDesc {
    /// Byte offset of the field within its object (or static storage).
    pub offset: u32,
    /// Class-definition index of the declaring class.
    pub class_def_index: u16,
    /// Primitive category of the field.
    pub ty: PrimType,
    /// Whether the field is volatile. Volatile accesses disable load-store
    /// elimination for the whole method.
    pub is_volatile: bool,
    /// Whether a static access must be preceded by a class initialization
    /// check.
    pub requires_class_init: bool,
}

/// A pre-resolved method descriptor for invoke targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDesc {
    /// Return type category, `PrimType::Void` for void methods.
    pub return_type: PrimType,
    /// Class-definition index of the declaring class.
    pub class_def_index: u16,
}

/// A method body in the container format, the CFG builder's input.
#[derive(Debug, Clone, Default)]
pub struct MethodBody {
    /// The instruction stream as 16-bit code units.
    pub insns: Vec<u16>,
    /// Number of virtual registers used by the method, arguments included.
    pub num_vregs: u16,
    /// Number of argument registers (the trailing registers).
    pub num_ins: u16,
    /// Try items, ordered by start address, non-overlapping.
    pub tries: Vec<TryItem>,
    /// Catch-handler lists referenced by try items.
    pub handlers: Vec<CatchHandlerList>,
    /// Field descriptor table indexed by field index.
    pub fields: Vec<FieldDesc>,
    /// Method descriptor table indexed by method index.
    pub methods: Vec<MethodDesc>,
    /// Primitive categories of the argument registers, one per in-register.
    /// Missing entries default to an unknown (`Void`) category.
    pub param_types: Vec<PrimType>,
}

impl MethodBody {
    /// Creates a body over raw code units with the given register counts.
    #[must_use]
    pub fn new(insns: Vec<u16>, num_vregs: u16, num_ins: u16) -> Self {
        Self {
            insns,
            num_vregs,
            num_ins,
            ..Self::default()
        }
    }

    /// Length of the instruction stream in code units.
    #[must_use]
    pub fn code_units(&self) -> usize {
        self.insns.len()
    }

    /// The try item covering `offset`, if any.
    ///
    /// Try items never overlap, so at most one item covers any offset.
    #[must_use]
    pub fn try_item_at(&self, offset: u32) -> Option<&TryItem> {
        self.tries.iter().find(|t| t.covers(offset))
    }

    /// Iterates the catch handlers covering `offset`, in declaration order.
    ///
    /// Yields `(key, handler_address)` pairs where the key is the exception
    /// type index, or [`CATCH_ALL_KEY`] for the catch-all handler.
    pub fn catch_handlers_at(&self, offset: u32) -> impl Iterator<Item = (i32, u32)> + '_ {
        let list = self
            .try_item_at(offset)
            .and_then(|t| self.handlers.get(usize::from(t.handler_index)));
        let typed = list
            .map(|l| l.handlers.as_slice())
            .unwrap_or(&[])
            .iter()
            .map(|h| (i32::from(h.type_idx), h.address));
        let all = list.and_then(|l| l.catch_all).map(|a| (CATCH_ALL_KEY, a));
        typed.chain(all)
    }

    /// Field descriptor for a field index, or `None` when unresolved.
    #[must_use]
    pub fn field(&self, field_idx: u32) -> Option<&FieldDesc> {
        self.fields.get(field_idx as usize)
    }

    /// Method descriptor for a method index, or `None` when unresolved.
    #[must_use]
    pub fn method(&self, method_idx: u32) -> Option<&MethodDesc> {
        self.methods.get(method_idx as usize)
    }
}
