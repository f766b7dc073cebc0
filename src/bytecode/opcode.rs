//! Dalvik opcode table with behaviour flags and encoding formats.
//!
//! Every opcode this pipeline compiles is listed here together with its
//! encoding [`Format`] (which determines the instruction width in 16-bit
//! code units) and its [`InsnFlags`] (which drive control-flow construction:
//! can the instruction branch, fall through, switch, throw, or return).
//!
//! Opcode byte values match the Dalvik instruction set. Bytecode containing
//! opcodes outside this table decodes to [`crate::Error::NotSupported`],
//! which the compilation driver maps to a punt-to-interpreter outcome
//! rather than a hard failure.

use bitflags::bitflags;
use strum::{EnumCount, EnumIter};

bitflags! {
    /// Behavioural flags of an opcode, consulted by the CFG builder.
    ///
    /// These correspond to the branch/continue/switch/throw/return
    /// properties that decide where basic blocks end and which edge
    /// processing routine handles the instruction.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InsnFlags: u16 {
        /// Instruction transfers control to an explicit target.
        const BRANCH = 1 << 0;
        /// Control can continue to the following instruction.
        const CONTINUE = 1 << 1;
        /// Instruction dispatches through a switch payload.
        const SWITCH = 1 << 2;
        /// Instruction can raise an exception.
        const THROW = 1 << 3;
        /// Instruction returns from the method.
        const RETURN = 1 << 4;
        /// Instruction leaves a result for a following move-result.
        const SETS_RESULT = 1 << 5;
        /// Instruction is an invoke of some kind.
        const INVOKE = 1 << 6;
    }
}

/// Instruction encoding format, named after the Dalvik format identifiers.
///
/// The first digit is the width in 16-bit code units, the second the number
/// of registers encoded, and the trailing letter the kind of extra payload
/// (`t` = branch target, `s` = literal, `c` = constant-pool index, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Format {
    Fmt10x,
    Fmt12x,
    Fmt11n,
    Fmt11x,
    Fmt10t,
    Fmt20t,
    Fmt22x,
    Fmt21t,
    Fmt21s,
    Fmt21h,
    Fmt21c,
    Fmt23x,
    Fmt22b,
    Fmt22t,
    Fmt22s,
    Fmt22c,
    Fmt30t,
    Fmt31i,
    Fmt31t,
    Fmt35c,
    Fmt51l,
}

impl Format {
    /// Width of instructions in this format, in 16-bit code units.
    #[must_use]
    pub const fn width(self) -> u16 {
        match self {
            Format::Fmt10x
            | Format::Fmt12x
            | Format::Fmt11n
            | Format::Fmt11x
            | Format::Fmt10t => 1,
            Format::Fmt20t
            | Format::Fmt22x
            | Format::Fmt21t
            | Format::Fmt21s
            | Format::Fmt21h
            | Format::Fmt21c
            | Format::Fmt23x
            | Format::Fmt22b
            | Format::Fmt22t
            | Format::Fmt22s
            | Format::Fmt22c => 2,
            Format::Fmt30t | Format::Fmt31i | Format::Fmt31t | Format::Fmt35c => 3,
            Format::Fmt51l => 5,
        }
    }
}

/// The supported Dalvik opcode subset.
///
/// Variant order and discriminants follow the Dalvik opcode numbering so
/// that [`Opcode::from_byte`] is a direct table lookup. The set covers the
/// instructions the optimization pipeline reasons about: moves, constants,
/// allocation and array/field access, comparisons and branches, switches,
/// monitors, invokes, and integer/long/float arithmetic including the
/// 2addr and literal forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Opcode {
    Nop = 0x00,
    Move = 0x01,
    MoveFrom16 = 0x02,
    MoveWide = 0x04,
    MoveObject = 0x07,
    MoveResult = 0x0a,
    MoveResultWide = 0x0b,
    MoveResultObject = 0x0c,
    MoveException = 0x0d,
    ReturnVoid = 0x0e,
    Return = 0x0f,
    ReturnWide = 0x10,
    ReturnObject = 0x11,
    Const4 = 0x12,
    Const16 = 0x13,
    Const = 0x14,
    ConstHigh16 = 0x15,
    ConstWide16 = 0x16,
    ConstWide32 = 0x17,
    ConstWide = 0x18,
    ConstWideHigh16 = 0x19,
    ConstString = 0x1a,
    ConstClass = 0x1c,
    MonitorEnter = 0x1d,
    MonitorExit = 0x1e,
    ArrayLength = 0x21,
    NewInstance = 0x22,
    NewArray = 0x23,
    Throw = 0x27,
    Goto = 0x28,
    Goto16 = 0x29,
    Goto32 = 0x2a,
    PackedSwitch = 0x2b,
    SparseSwitch = 0x2c,
    CmplFloat = 0x2d,
    CmpgFloat = 0x2e,
    CmplDouble = 0x2f,
    CmpgDouble = 0x30,
    CmpLong = 0x31,
    IfEq = 0x32,
    IfNe = 0x33,
    IfLt = 0x34,
    IfGe = 0x35,
    IfGt = 0x36,
    IfLe = 0x37,
    IfEqz = 0x38,
    IfNez = 0x39,
    IfLtz = 0x3a,
    IfGez = 0x3b,
    IfGtz = 0x3c,
    IfLez = 0x3d,
    Aget = 0x44,
    AgetWide = 0x45,
    AgetObject = 0x46,
    AgetBoolean = 0x47,
    AgetByte = 0x48,
    AgetChar = 0x49,
    AgetShort = 0x4a,
    Aput = 0x4b,
    AputWide = 0x4c,
    AputObject = 0x4d,
    AputBoolean = 0x4e,
    AputByte = 0x4f,
    AputChar = 0x50,
    AputShort = 0x51,
    Iget = 0x52,
    IgetWide = 0x53,
    IgetObject = 0x54,
    Iput = 0x59,
    IputWide = 0x5a,
    IputObject = 0x5b,
    Sget = 0x60,
    SgetWide = 0x61,
    SgetObject = 0x62,
    Sput = 0x67,
    SputWide = 0x68,
    SputObject = 0x69,
    InvokeVirtual = 0x6e,
    InvokeSuper = 0x6f,
    InvokeDirect = 0x70,
    InvokeStatic = 0x71,
    InvokeInterface = 0x72,
    NegInt = 0x7b,
    NotInt = 0x7c,
    NegLong = 0x7d,
    IntToLong = 0x81,
    IntToFloat = 0x82,
    LongToInt = 0x84,
    FloatToInt = 0x87,
    AddInt = 0x90,
    SubInt = 0x91,
    MulInt = 0x92,
    DivInt = 0x93,
    RemInt = 0x94,
    AndInt = 0x95,
    OrInt = 0x96,
    XorInt = 0x97,
    ShlInt = 0x98,
    ShrInt = 0x99,
    UshrInt = 0x9a,
    AddLong = 0x9b,
    SubLong = 0x9c,
    MulLong = 0x9d,
    AddFloat = 0xa6,
    SubFloat = 0xa7,
    MulFloat = 0xa8,
    AddInt2addr = 0xb0,
    SubInt2addr = 0xb1,
    MulInt2addr = 0xb2,
    DivInt2addr = 0xb3,
    RemInt2addr = 0xb4,
    AndInt2addr = 0xb5,
    AddIntLit16 = 0xd0,
    RsubInt = 0xd1,
    MulIntLit16 = 0xd2,
    DivIntLit16 = 0xd3,
    AddIntLit8 = 0xd8,
    RsubIntLit8 = 0xd9,
    MulIntLit8 = 0xda,
    DivIntLit8 = 0xdb,
}

impl Opcode {
    /// Resolves an opcode byte to its [`Opcode`], or `None` when the byte
    /// is outside the supported subset.
    #[must_use]
    pub fn from_byte(byte: u8) -> Option<Self> {
        use Opcode::*;
        Some(match byte {
            0x00 => Nop,
            0x01 => Move,
            0x02 => MoveFrom16,
            0x04 => MoveWide,
            0x07 => MoveObject,
            0x0a => MoveResult,
            0x0b => MoveResultWide,
            0x0c => MoveResultObject,
            0x0d => MoveException,
            0x0e => ReturnVoid,
            0x0f => Return,
            0x10 => ReturnWide,
            0x11 => ReturnObject,
            0x12 => Const4,
            0x13 => Const16,
            0x14 => Const,
            0x15 => ConstHigh16,
            0x16 => ConstWide16,
            0x17 => ConstWide32,
            0x18 => ConstWide,
            0x19 => ConstWideHigh16,
            0x1a => ConstString,
            0x1c => ConstClass,
            0x1d => MonitorEnter,
            0x1e => MonitorExit,
            0x21 => ArrayLength,
            0x22 => NewInstance,
            0x23 => NewArray,
            0x27 => Throw,
            0x28 => Goto,
            0x29 => Goto16,
            0x2a => Goto32,
            0x2b => PackedSwitch,
            0x2c => SparseSwitch,
            0x2d => CmplFloat,
            0x2e => CmpgFloat,
            0x2f => CmplDouble,
            0x30 => CmpgDouble,
            0x31 => CmpLong,
            0x32 => IfEq,
            0x33 => IfNe,
            0x34 => IfLt,
            0x35 => IfGe,
            0x36 => IfGt,
            0x37 => IfLe,
            0x38 => IfEqz,
            0x39 => IfNez,
            0x3a => IfLtz,
            0x3b => IfGez,
            0x3c => IfGtz,
            0x3d => IfLez,
            0x44 => Aget,
            0x45 => AgetWide,
            0x46 => AgetObject,
            0x47 => AgetBoolean,
            0x48 => AgetByte,
            0x49 => AgetChar,
            0x4a => AgetShort,
            0x4b => Aput,
            0x4c => AputWide,
            0x4d => AputObject,
            0x4e => AputBoolean,
            0x4f => AputByte,
            0x50 => AputChar,
            0x51 => AputShort,
            0x52 => Iget,
            0x53 => IgetWide,
            0x54 => IgetObject,
            0x59 => Iput,
            0x5a => IputWide,
            0x5b => IputObject,
            0x60 => Sget,
            0x61 => SgetWide,
            0x62 => SgetObject,
            0x67 => Sput,
            0x68 => SputWide,
            0x69 => SputObject,
            0x6e => InvokeVirtual,
            0x6f => InvokeSuper,
            0x70 => InvokeDirect,
            0x71 => InvokeStatic,
            0x72 => InvokeInterface,
            0x7b => NegInt,
            0x7c => NotInt,
            0x7d => NegLong,
            0x81 => IntToLong,
            0x82 => IntToFloat,
            0x84 => LongToInt,
            0x87 => FloatToInt,
            0x90 => AddInt,
            0x91 => SubInt,
            0x92 => MulInt,
            0x93 => DivInt,
            0x94 => RemInt,
            0x95 => AndInt,
            0x96 => OrInt,
            0x97 => XorInt,
            0x98 => ShlInt,
            0x99 => ShrInt,
            0x9a => UshrInt,
            0x9b => AddLong,
            0x9c => SubLong,
            0x9d => MulLong,
            0xa6 => AddFloat,
            0xa7 => SubFloat,
            0xa8 => MulFloat,
            0xb0 => AddInt2addr,
            0xb1 => SubInt2addr,
            0xb2 => MulInt2addr,
            0xb3 => DivInt2addr,
            0xb4 => RemInt2addr,
            0xb5 => AndInt2addr,
            0xd0 => AddIntLit16,
            0xd1 => RsubInt,
            0xd2 => MulIntLit16,
            0xd3 => DivIntLit16,
            0xd8 => AddIntLit8,
            0xd9 => RsubIntLit8,
            0xda => MulIntLit8,
            0xdb => DivIntLit8,
            _ => return None,
        })
    }

    /// Opcode byte value as it appears in the instruction stream.
    #[must_use]
    pub const fn byte(self) -> u8 {
        self as u8
    }

    /// Encoding format of this opcode.
    #[must_use]
    pub const fn format(self) -> Format {
        use Opcode::*;
        match self {
            Nop | ReturnVoid => Format::Fmt10x,
            Move | MoveWide | MoveObject | ArrayLength | NegInt | NotInt | NegLong
            | IntToLong | IntToFloat | LongToInt | FloatToInt | AddInt2addr | SubInt2addr
            | MulInt2addr | DivInt2addr | RemInt2addr | AndInt2addr => Format::Fmt12x,
            MoveFrom16 => Format::Fmt22x,
            Const4 => Format::Fmt11n,
            MoveResult | MoveResultWide | MoveResultObject | MoveException | Return
            | ReturnWide | ReturnObject | MonitorEnter | MonitorExit | Throw => Format::Fmt11x,
            Goto => Format::Fmt10t,
            Goto16 => Format::Fmt20t,
            Goto32 => Format::Fmt30t,
            PackedSwitch | SparseSwitch => Format::Fmt31t,
            Const16 | ConstWide16 => Format::Fmt21s,
            Const | ConstWide32 => Format::Fmt31i,
            ConstHigh16 | ConstWideHigh16 => Format::Fmt21h,
            ConstWide => Format::Fmt51l,
            ConstString | ConstClass | NewInstance | Sget | SgetWide | SgetObject | Sput
            | SputWide | SputObject => Format::Fmt21c,
            NewArray | Iget | IgetWide | IgetObject | Iput | IputWide | IputObject => {
                Format::Fmt22c
            }
            CmplFloat | CmpgFloat | CmplDouble | CmpgDouble | CmpLong | Aget | AgetWide
            | AgetObject | AgetBoolean | AgetByte | AgetChar | AgetShort | Aput | AputWide
            | AputObject | AputBoolean | AputByte | AputChar | AputShort | AddInt | SubInt
            | MulInt | DivInt | RemInt | AndInt | OrInt | XorInt | ShlInt | ShrInt | UshrInt
            | AddLong | SubLong | MulLong | AddFloat | SubFloat | MulFloat => Format::Fmt23x,
            IfEq | IfNe | IfLt | IfGe | IfGt | IfLe => Format::Fmt22t,
            IfEqz | IfNez | IfLtz | IfGez | IfGtz | IfLez => Format::Fmt21t,
            InvokeVirtual | InvokeSuper | InvokeDirect | InvokeStatic | InvokeInterface => {
                Format::Fmt35c
            }
            AddIntLit16 | RsubInt | MulIntLit16 | DivIntLit16 => Format::Fmt22s,
            AddIntLit8 | RsubIntLit8 | MulIntLit8 | DivIntLit8 => Format::Fmt22b,
        }
    }

    /// Behaviour flags of this opcode.
    #[must_use]
    pub fn flags(self) -> InsnFlags {
        use Opcode::*;
        match self {
            Goto | Goto16 | Goto32 => InsnFlags::BRANCH,
            IfEq | IfNe | IfLt | IfGe | IfGt | IfLe | IfEqz | IfNez | IfLtz | IfGez | IfGtz
            | IfLez => InsnFlags::BRANCH | InsnFlags::CONTINUE,
            PackedSwitch | SparseSwitch => InsnFlags::SWITCH | InsnFlags::CONTINUE,
            ReturnVoid | Return | ReturnWide | ReturnObject => InsnFlags::RETURN,
            Throw => InsnFlags::THROW,
            MonitorEnter | MonitorExit | ArrayLength | NewInstance | NewArray | ConstString
            | ConstClass | Aget | AgetWide | AgetObject | AgetBoolean | AgetByte | AgetChar
            | AgetShort | Aput | AputWide | AputObject | AputBoolean | AputByte | AputChar
            | AputShort | Iget | IgetWide | IgetObject | Iput | IputWide | IputObject | Sget
            | SgetWide | SgetObject | Sput | SputWide | SputObject | DivInt | RemInt
            | DivInt2addr | RemInt2addr | DivIntLit16 | DivIntLit8 => {
                InsnFlags::THROW | InsnFlags::CONTINUE
            }
            InvokeVirtual | InvokeSuper | InvokeDirect | InvokeStatic | InvokeInterface => {
                InsnFlags::THROW
                    | InsnFlags::CONTINUE
                    | InsnFlags::SETS_RESULT
                    | InsnFlags::INVOKE
            }
            _ => InsnFlags::CONTINUE,
        }
    }

    /// Instruction width in 16-bit code units.
    #[must_use]
    pub const fn width(self) -> u16 {
        self.format().width()
    }

    /// Human-readable Dalvik mnemonic.
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        use Opcode::*;
        match self {
            Nop => "nop",
            Move => "move",
            MoveFrom16 => "move/from16",
            MoveWide => "move-wide",
            MoveObject => "move-object",
            MoveResult => "move-result",
            MoveResultWide => "move-result-wide",
            MoveResultObject => "move-result-object",
            MoveException => "move-exception",
            ReturnVoid => "return-void",
            Return => "return",
            ReturnWide => "return-wide",
            ReturnObject => "return-object",
            Const4 => "const/4",
            Const16 => "const/16",
            Const => "const",
            ConstHigh16 => "const/high16",
            ConstWide16 => "const-wide/16",
            ConstWide32 => "const-wide/32",
            ConstWide => "const-wide",
            ConstWideHigh16 => "const-wide/high16",
            ConstString => "const-string",
            ConstClass => "const-class",
            MonitorEnter => "monitor-enter",
            MonitorExit => "monitor-exit",
            ArrayLength => "array-length",
            NewInstance => "new-instance",
            NewArray => "new-array",
            Throw => "throw",
            Goto => "goto",
            Goto16 => "goto/16",
            Goto32 => "goto/32",
            PackedSwitch => "packed-switch",
            SparseSwitch => "sparse-switch",
            CmplFloat => "cmpl-float",
            CmpgFloat => "cmpg-float",
            CmplDouble => "cmpl-double",
            CmpgDouble => "cmpg-double",
            CmpLong => "cmp-long",
            IfEq => "if-eq",
            IfNe => "if-ne",
            IfLt => "if-lt",
            IfGe => "if-ge",
            IfGt => "if-gt",
            IfLe => "if-le",
            IfEqz => "if-eqz",
            IfNez => "if-nez",
            IfLtz => "if-ltz",
            IfGez => "if-gez",
            IfGtz => "if-gtz",
            IfLez => "if-lez",
            Aget => "aget",
            AgetWide => "aget-wide",
            AgetObject => "aget-object",
            AgetBoolean => "aget-boolean",
            AgetByte => "aget-byte",
            AgetChar => "aget-char",
            AgetShort => "aget-short",
            Aput => "aput",
            AputWide => "aput-wide",
            AputObject => "aput-object",
            AputBoolean => "aput-boolean",
            AputByte => "aput-byte",
            AputChar => "aput-char",
            AputShort => "aput-short",
            Iget => "iget",
            IgetWide => "iget-wide",
            IgetObject => "iget-object",
            Iput => "iput",
            IputWide => "iput-wide",
            IputObject => "iput-object",
            Sget => "sget",
            SgetWide => "sget-wide",
            SgetObject => "sget-object",
            Sput => "sput",
            SputWide => "sput-wide",
            SputObject => "sput-object",
            InvokeVirtual => "invoke-virtual",
            InvokeSuper => "invoke-super",
            InvokeDirect => "invoke-direct",
            InvokeStatic => "invoke-static",
            InvokeInterface => "invoke-interface",
            NegInt => "neg-int",
            NotInt => "not-int",
            NegLong => "neg-long",
            IntToLong => "int-to-long",
            IntToFloat => "int-to-float",
            LongToInt => "long-to-int",
            FloatToInt => "float-to-int",
            AddInt => "add-int",
            SubInt => "sub-int",
            MulInt => "mul-int",
            DivInt => "div-int",
            RemInt => "rem-int",
            AndInt => "and-int",
            OrInt => "or-int",
            XorInt => "xor-int",
            ShlInt => "shl-int",
            ShrInt => "shr-int",
            UshrInt => "ushr-int",
            AddLong => "add-long",
            SubLong => "sub-long",
            MulLong => "mul-long",
            AddFloat => "add-float",
            SubFloat => "sub-float",
            MulFloat => "mul-float",
            AddInt2addr => "add-int/2addr",
            SubInt2addr => "sub-int/2addr",
            MulInt2addr => "mul-int/2addr",
            DivInt2addr => "div-int/2addr",
            RemInt2addr => "rem-int/2addr",
            AndInt2addr => "and-int/2addr",
            AddIntLit16 => "add-int/lit16",
            RsubInt => "rsub-int",
            MulIntLit16 => "mul-int/lit16",
            DivIntLit16 => "div-int/lit16",
            AddIntLit8 => "add-int/lit8",
            RsubIntLit8 => "rsub-int/lit8",
            MulIntLit8 => "mul-int/lit8",
            DivIntLit8 => "div-int/lit8",
        }
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}
