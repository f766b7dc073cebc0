//! Label-based bytecode assembler for tests, examples, and benchmarks.
//!
//! [`CodeAssembler`] builds a [`MethodBody`] from a fluent sequence of
//! instruction calls with symbolic labels for branch targets, switch
//! payloads, and try/catch ranges. Branch offsets are fixed up when
//! [`finish`](CodeAssembler::finish) resolves all labels.
//!
//! This is the crate's equivalent of hand-writing code units: every emitted
//! instruction round-trips through the real decoder, so the builder and the
//! optimization passes are always exercised against genuine encodings.
//!
//! # Examples
//!
//! ```rust,ignore
//! use dexmir::bytecode::CodeAssembler;
//!
//! let mut asm = CodeAssembler::new(3, 1);
//! asm.const4(0, 0)?
//!     .label("loop")?
//!     .if_ge(0, 2, "done")?
//!     .add_int_lit8(0, 0, 1)?
//!     .goto("loop")?
//!     .label("done")?
//!     .return_void()?;
//! let body = asm.finish()?;
//! ```

use std::collections::HashMap;

use crate::{
    bytecode::{
        method::{CatchHandler, CatchHandlerList, FieldDesc, MethodDesc, TryItem},
        MethodBody, Opcode, PACKED_SWITCH_SIGNATURE, SPARSE_SWITCH_SIGNATURE,
    },
    Result,
};

/// Pending label reference to patch once all labels are placed.
#[derive(Debug)]
enum Fixup {
    /// 16-bit relative offset at `unit`, relative to `base` (21t/22t/20t).
    Rel16 { unit: usize, base: usize, label: String },
    /// 32-bit relative offset at `unit..unit+2`, relative to `base` (31t).
    Rel32 { unit: usize, base: usize, label: String },
    /// Switch payload case target at `unit..unit+2`, relative to the switch
    /// instruction that references `payload_label`.
    Case {
        unit: usize,
        payload_label: String,
        label: String,
    },
}

/// Pending try/catch range to resolve into the body tables.
#[derive(Debug)]
struct PendingTry {
    start_label: String,
    end_label: String,
    handlers: Vec<(u16, String)>,
    catch_all: Option<String>,
}

/// A fluent builder producing a [`MethodBody`] with resolved labels.
#[derive(Debug)]
pub struct CodeAssembler {
    units: Vec<u16>,
    num_vregs: u16,
    num_ins: u16,
    labels: HashMap<String, usize>,
    fixups: Vec<Fixup>,
    /// First switch instruction offset per payload label, for case targets.
    switch_sites: HashMap<String, usize>,
    tries: Vec<PendingTry>,
    fields: Vec<FieldDesc>,
    methods: Vec<MethodDesc>,
    params: Vec<crate::mir::PrimType>,
}

impl CodeAssembler {
    /// Creates an assembler for a method with the given register counts.
    #[must_use]
    pub fn new(num_vregs: u16, num_ins: u16) -> Self {
        Self {
            units: Vec::new(),
            num_vregs,
            num_ins,
            labels: HashMap::new(),
            fixups: Vec::new(),
            switch_sites: HashMap::new(),
            tries: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            params: Vec::new(),
        }
    }

    /// Declares the primitive categories of the argument registers.
    pub fn param_types(&mut self, types: &[crate::mir::PrimType]) -> &mut Self {
        self.params = types.to_vec();
        self
    }

    /// Registers a field descriptor and returns its field index.
    pub fn add_field(&mut self, field: FieldDesc) -> u16 {
        self.fields.push(field);
        (self.fields.len() - 1) as u16
    }

    /// Registers a method descriptor and returns its method index.
    pub fn add_method(&mut self, method: MethodDesc) -> u16 {
        self.methods.push(method);
        (self.methods.len() - 1) as u16
    }

    /// Places a label at the current offset.
    ///
    /// # Errors
    ///
    /// Returns an error if the label was already placed.
    pub fn label(&mut self, name: &str) -> Result<&mut Self> {
        if self
            .labels
            .insert(name.to_string(), self.units.len())
            .is_some()
        {
            return Err(crate::Error::Error(format!("duplicate label: {name}")));
        }
        Ok(self)
    }

    /// Declares a try range with typed handlers and an optional catch-all.
    ///
    /// Labels may be placed before or after this call; resolution happens
    /// in [`finish`](Self::finish).
    pub fn try_range(
        &mut self,
        start: &str,
        end: &str,
        handlers: &[(u16, &str)],
        catch_all: Option<&str>,
    ) -> Result<&mut Self> {
        self.tries.push(PendingTry {
            start_label: start.to_string(),
            end_label: end.to_string(),
            handlers: handlers
                .iter()
                .map(|(t, l)| (*t, (*l).to_string()))
                .collect(),
            catch_all: catch_all.map(str::to_string),
        });
        Ok(self)
    }

    fn emit(&mut self, op: Opcode, a: u16) -> &mut Self {
        self.units.push((a << 8) | u16::from(op.byte()));
        self
    }

    fn emit_nibbles(&mut self, op: Opcode, a: u16, b: u16) -> &mut Self {
        self.units
            .push(((b & 0xf) << 12) | ((a & 0xf) << 8) | u16::from(op.byte()));
        self
    }

    // --- constants and moves -------------------------------------------------

    /// `nop`
    pub fn nop(&mut self) -> Result<&mut Self> {
        Ok(self.emit(Opcode::Nop, 0))
    }

    /// `const/4 vA, #lit` (4-bit signed literal)
    pub fn const4(&mut self, reg: u16, lit: i8) -> Result<&mut Self> {
        Ok(self.emit_nibbles(Opcode::Const4, reg, (lit as u16) & 0xf))
    }

    /// `const/16 vAA, #lit`
    pub fn const16(&mut self, reg: u16, lit: i16) -> Result<&mut Self> {
        self.emit(Opcode::Const16, reg);
        self.units.push(lit as u16);
        Ok(self)
    }

    /// `const vAA, #lit`
    pub fn const32(&mut self, reg: u16, lit: i32) -> Result<&mut Self> {
        self.emit(Opcode::Const, reg);
        self.units.push(lit as u16);
        self.units.push((lit as u32 >> 16) as u16);
        Ok(self)
    }

    /// `const-wide/16 vAA, #lit`
    pub fn const_wide16(&mut self, reg: u16, lit: i16) -> Result<&mut Self> {
        self.emit(Opcode::ConstWide16, reg);
        self.units.push(lit as u16);
        Ok(self)
    }

    /// `const-string vAA, string@idx`
    pub fn const_string(&mut self, reg: u16, string_idx: u16) -> Result<&mut Self> {
        self.emit(Opcode::ConstString, reg);
        self.units.push(string_idx);
        Ok(self)
    }

    /// `move vA, vB`
    pub fn mov(&mut self, dst: u16, src: u16) -> Result<&mut Self> {
        Ok(self.emit_nibbles(Opcode::Move, dst, src))
    }

    /// `move-object vA, vB`
    pub fn move_object(&mut self, dst: u16, src: u16) -> Result<&mut Self> {
        Ok(self.emit_nibbles(Opcode::MoveObject, dst, src))
    }

    /// `move-result vAA`
    pub fn move_result(&mut self, reg: u16) -> Result<&mut Self> {
        Ok(self.emit(Opcode::MoveResult, reg))
    }

    /// `move-result-object vAA`
    pub fn move_result_object(&mut self, reg: u16) -> Result<&mut Self> {
        Ok(self.emit(Opcode::MoveResultObject, reg))
    }

    /// `move-exception vAA`
    pub fn move_exception(&mut self, reg: u16) -> Result<&mut Self> {
        Ok(self.emit(Opcode::MoveException, reg))
    }

    // --- returns and throw ---------------------------------------------------

    /// `return-void`
    pub fn return_void(&mut self) -> Result<&mut Self> {
        Ok(self.emit(Opcode::ReturnVoid, 0))
    }

    /// `return vAA`
    pub fn return_val(&mut self, reg: u16) -> Result<&mut Self> {
        Ok(self.emit(Opcode::Return, reg))
    }

    /// `return-object vAA`
    pub fn return_object(&mut self, reg: u16) -> Result<&mut Self> {
        Ok(self.emit(Opcode::ReturnObject, reg))
    }

    /// `throw vAA`
    pub fn throw(&mut self, reg: u16) -> Result<&mut Self> {
        Ok(self.emit(Opcode::Throw, reg))
    }

    // --- branches ------------------------------------------------------------

    /// `goto/16 +label` (always emitted in the 16-bit form)
    pub fn goto(&mut self, label: &str) -> Result<&mut Self> {
        let base = self.units.len();
        self.emit(Opcode::Goto16, 0);
        self.fixups.push(Fixup::Rel16 {
            unit: self.units.len(),
            base,
            label: label.to_string(),
        });
        self.units.push(0);
        Ok(self)
    }

    fn if_test(&mut self, op: Opcode, a: u16, b: u16, label: &str) -> Result<&mut Self> {
        let base = self.units.len();
        self.emit_nibbles(op, a, b);
        self.fixups.push(Fixup::Rel16 {
            unit: self.units.len(),
            base,
            label: label.to_string(),
        });
        self.units.push(0);
        Ok(self)
    }

    fn if_testz(&mut self, op: Opcode, a: u16, label: &str) -> Result<&mut Self> {
        let base = self.units.len();
        self.emit(op, a);
        self.fixups.push(Fixup::Rel16 {
            unit: self.units.len(),
            base,
            label: label.to_string(),
        });
        self.units.push(0);
        Ok(self)
    }

    /// `if-eq vA, vB, +label`
    pub fn if_eq(&mut self, a: u16, b: u16, label: &str) -> Result<&mut Self> {
        self.if_test(Opcode::IfEq, a, b, label)
    }

    /// `if-ne vA, vB, +label`
    pub fn if_ne(&mut self, a: u16, b: u16, label: &str) -> Result<&mut Self> {
        self.if_test(Opcode::IfNe, a, b, label)
    }

    /// `if-lt vA, vB, +label`
    pub fn if_lt(&mut self, a: u16, b: u16, label: &str) -> Result<&mut Self> {
        self.if_test(Opcode::IfLt, a, b, label)
    }

    /// `if-ge vA, vB, +label`
    pub fn if_ge(&mut self, a: u16, b: u16, label: &str) -> Result<&mut Self> {
        self.if_test(Opcode::IfGe, a, b, label)
    }

    /// `if-gt vA, vB, +label`
    pub fn if_gt(&mut self, a: u16, b: u16, label: &str) -> Result<&mut Self> {
        self.if_test(Opcode::IfGt, a, b, label)
    }

    /// `if-le vA, vB, +label`
    pub fn if_le(&mut self, a: u16, b: u16, label: &str) -> Result<&mut Self> {
        self.if_test(Opcode::IfLe, a, b, label)
    }

    /// `if-eqz vAA, +label`
    pub fn if_eqz(&mut self, a: u16, label: &str) -> Result<&mut Self> {
        self.if_testz(Opcode::IfEqz, a, label)
    }

    /// `if-nez vAA, +label`
    pub fn if_nez(&mut self, a: u16, label: &str) -> Result<&mut Self> {
        self.if_testz(Opcode::IfNez, a, label)
    }

    /// `if-ltz vAA, +label`
    pub fn if_ltz(&mut self, a: u16, label: &str) -> Result<&mut Self> {
        self.if_testz(Opcode::IfLtz, a, label)
    }

    /// `if-gez vAA, +label`
    pub fn if_gez(&mut self, a: u16, label: &str) -> Result<&mut Self> {
        self.if_testz(Opcode::IfGez, a, label)
    }

    /// `if-lez vAA, +label`
    pub fn if_lez(&mut self, a: u16, label: &str) -> Result<&mut Self> {
        self.if_testz(Opcode::IfLez, a, label)
    }

    // --- switches ------------------------------------------------------------

    /// `packed-switch vAA, +payload_label`
    pub fn packed_switch(&mut self, reg: u16, payload_label: &str) -> Result<&mut Self> {
        let base = self.units.len();
        self.switch_sites
            .entry(payload_label.to_string())
            .or_insert(base);
        self.emit(Opcode::PackedSwitch, reg);
        self.fixups.push(Fixup::Rel32 {
            unit: self.units.len(),
            base,
            label: payload_label.to_string(),
        });
        self.units.push(0);
        self.units.push(0);
        Ok(self)
    }

    /// `sparse-switch vAA, +payload_label`
    pub fn sparse_switch(&mut self, reg: u16, payload_label: &str) -> Result<&mut Self> {
        let base = self.units.len();
        self.switch_sites
            .entry(payload_label.to_string())
            .or_insert(base);
        self.emit(Opcode::SparseSwitch, reg);
        self.fixups.push(Fixup::Rel32 {
            unit: self.units.len(),
            base,
            label: payload_label.to_string(),
        });
        self.units.push(0);
        self.units.push(0);
        Ok(self)
    }

    /// Emits a packed-switch payload at the current offset under
    /// `payload_label`, with contiguous keys starting at `first_key`.
    pub fn packed_switch_payload(
        &mut self,
        payload_label: &str,
        first_key: i32,
        targets: &[&str],
    ) -> Result<&mut Self> {
        self.label(payload_label)?;
        self.units.push(PACKED_SWITCH_SIGNATURE);
        self.units.push(targets.len() as u16);
        self.units.push(first_key as u16);
        self.units.push((first_key as u32 >> 16) as u16);
        for target in targets {
            self.fixups.push(Fixup::Case {
                unit: self.units.len(),
                payload_label: payload_label.to_string(),
                label: (*target).to_string(),
            });
            self.units.push(0);
            self.units.push(0);
        }
        Ok(self)
    }

    /// Emits a sparse-switch payload at the current offset under
    /// `payload_label`, with explicit sorted keys.
    pub fn sparse_switch_payload(
        &mut self,
        payload_label: &str,
        cases: &[(i32, &str)],
    ) -> Result<&mut Self> {
        self.label(payload_label)?;
        self.units.push(SPARSE_SWITCH_SIGNATURE);
        self.units.push(cases.len() as u16);
        for (key, _) in cases {
            self.units.push(*key as u16);
            self.units.push((*key as u32 >> 16) as u16);
        }
        for (_, target) in cases {
            self.fixups.push(Fixup::Case {
                unit: self.units.len(),
                payload_label: payload_label.to_string(),
                label: (*target).to_string(),
            });
            self.units.push(0);
            self.units.push(0);
        }
        Ok(self)
    }

    // --- arrays, fields, allocation -----------------------------------------

    /// `new-instance vAA, type@idx`
    pub fn new_instance(&mut self, reg: u16, type_idx: u16) -> Result<&mut Self> {
        self.emit(Opcode::NewInstance, reg);
        self.units.push(type_idx);
        Ok(self)
    }

    /// `new-array vA, vB(size), type@idx`
    pub fn new_array(&mut self, dst: u16, size: u16, type_idx: u16) -> Result<&mut Self> {
        self.emit_nibbles(Opcode::NewArray, dst, size);
        self.units.push(type_idx);
        Ok(self)
    }

    /// `array-length vA, vB`
    pub fn array_length(&mut self, dst: u16, array: u16) -> Result<&mut Self> {
        Ok(self.emit_nibbles(Opcode::ArrayLength, dst, array))
    }

    fn fmt23x(&mut self, op: Opcode, a: u16, b: u16, c: u16) -> Result<&mut Self> {
        self.emit(op, a);
        self.units.push((c << 8) | (b & 0xff));
        Ok(self)
    }

    /// `aget vAA, vBB(array), vCC(index)`
    pub fn aget(&mut self, dst: u16, array: u16, index: u16) -> Result<&mut Self> {
        self.fmt23x(Opcode::Aget, dst, array, index)
    }

    /// `aget-object vAA, vBB, vCC`
    pub fn aget_object(&mut self, dst: u16, array: u16, index: u16) -> Result<&mut Self> {
        self.fmt23x(Opcode::AgetObject, dst, array, index)
    }

    /// `aput vAA(src), vBB(array), vCC(index)`
    pub fn aput(&mut self, src: u16, array: u16, index: u16) -> Result<&mut Self> {
        self.fmt23x(Opcode::Aput, src, array, index)
    }

    /// `aput-object vAA, vBB, vCC`
    pub fn aput_object(&mut self, src: u16, array: u16, index: u16) -> Result<&mut Self> {
        self.fmt23x(Opcode::AputObject, src, array, index)
    }

    /// `iget vA, vB(object), field@idx`
    pub fn iget(&mut self, dst: u16, obj: u16, field_idx: u16) -> Result<&mut Self> {
        self.emit_nibbles(Opcode::Iget, dst, obj);
        self.units.push(field_idx);
        Ok(self)
    }

    /// `iget-object vA, vB, field@idx`
    pub fn iget_object(&mut self, dst: u16, obj: u16, field_idx: u16) -> Result<&mut Self> {
        self.emit_nibbles(Opcode::IgetObject, dst, obj);
        self.units.push(field_idx);
        Ok(self)
    }

    /// `iput vA(src), vB(object), field@idx`
    pub fn iput(&mut self, src: u16, obj: u16, field_idx: u16) -> Result<&mut Self> {
        self.emit_nibbles(Opcode::Iput, src, obj);
        self.units.push(field_idx);
        Ok(self)
    }

    /// `iput-object vA, vB, field@idx`
    pub fn iput_object(&mut self, src: u16, obj: u16, field_idx: u16) -> Result<&mut Self> {
        self.emit_nibbles(Opcode::IputObject, src, obj);
        self.units.push(field_idx);
        Ok(self)
    }

    /// `sget vAA, field@idx`
    pub fn sget(&mut self, dst: u16, field_idx: u16) -> Result<&mut Self> {
        self.emit(Opcode::Sget, dst);
        self.units.push(field_idx);
        Ok(self)
    }

    /// `sput vAA, field@idx`
    pub fn sput(&mut self, src: u16, field_idx: u16) -> Result<&mut Self> {
        self.emit(Opcode::Sput, src);
        self.units.push(field_idx);
        Ok(self)
    }

    // --- monitors ------------------------------------------------------------

    /// `monitor-enter vAA`
    pub fn monitor_enter(&mut self, reg: u16) -> Result<&mut Self> {
        Ok(self.emit(Opcode::MonitorEnter, reg))
    }

    /// `monitor-exit vAA`
    pub fn monitor_exit(&mut self, reg: u16) -> Result<&mut Self> {
        Ok(self.emit(Opcode::MonitorExit, reg))
    }

    // --- invokes -------------------------------------------------------------

    fn invoke(&mut self, op: Opcode, method_idx: u16, args: &[u16]) -> Result<&mut Self> {
        if args.len() > 5 {
            return Err(crate::Error::Error(
                "invoke supports at most 5 argument registers".to_string(),
            ));
        }
        let count = args.len() as u16;
        let g = if count == 5 { args[4] & 0xf } else { 0 };
        self.units
            .push((count << 12) | ((g & 0xf) << 8) | u16::from(op.byte()));
        self.units.push(method_idx);
        let mut regs = 0u16;
        for (i, arg) in args.iter().take(4).enumerate() {
            regs |= (arg & 0xf) << (i * 4);
        }
        self.units.push(regs);
        Ok(self)
    }

    /// `invoke-static {args}, method@idx`
    pub fn invoke_static(&mut self, method_idx: u16, args: &[u16]) -> Result<&mut Self> {
        self.invoke(Opcode::InvokeStatic, method_idx, args)
    }

    /// `invoke-virtual {args}, method@idx`
    pub fn invoke_virtual(&mut self, method_idx: u16, args: &[u16]) -> Result<&mut Self> {
        self.invoke(Opcode::InvokeVirtual, method_idx, args)
    }

    /// `invoke-direct {args}, method@idx`
    pub fn invoke_direct(&mut self, method_idx: u16, args: &[u16]) -> Result<&mut Self> {
        self.invoke(Opcode::InvokeDirect, method_idx, args)
    }

    /// `invoke-interface {args}, method@idx`
    pub fn invoke_interface(&mut self, method_idx: u16, args: &[u16]) -> Result<&mut Self> {
        self.invoke(Opcode::InvokeInterface, method_idx, args)
    }

    // --- arithmetic ----------------------------------------------------------

    /// `add-int vAA, vBB, vCC`
    pub fn add_int(&mut self, dst: u16, a: u16, b: u16) -> Result<&mut Self> {
        self.fmt23x(Opcode::AddInt, dst, a, b)
    }

    /// `sub-int vAA, vBB, vCC`
    pub fn sub_int(&mut self, dst: u16, a: u16, b: u16) -> Result<&mut Self> {
        self.fmt23x(Opcode::SubInt, dst, a, b)
    }

    /// `mul-int vAA, vBB, vCC`
    pub fn mul_int(&mut self, dst: u16, a: u16, b: u16) -> Result<&mut Self> {
        self.fmt23x(Opcode::MulInt, dst, a, b)
    }

    /// `div-int vAA, vBB, vCC`
    pub fn div_int(&mut self, dst: u16, a: u16, b: u16) -> Result<&mut Self> {
        self.fmt23x(Opcode::DivInt, dst, a, b)
    }

    /// `and-int vAA, vBB, vCC`
    pub fn and_int(&mut self, dst: u16, a: u16, b: u16) -> Result<&mut Self> {
        self.fmt23x(Opcode::AndInt, dst, a, b)
    }

    /// `add-int/lit8 vAA, vBB, #lit`
    pub fn add_int_lit8(&mut self, dst: u16, src: u16, lit: i8) -> Result<&mut Self> {
        self.emit(Opcode::AddIntLit8, dst);
        self.units.push(((lit as u8 as u16) << 8) | (src & 0xff));
        Ok(self)
    }

    /// `add-int/lit16 vA, vB, #lit`
    pub fn add_int_lit16(&mut self, dst: u16, src: u16, lit: i16) -> Result<&mut Self> {
        self.emit_nibbles(Opcode::AddIntLit16, dst, src);
        self.units.push(lit as u16);
        Ok(self)
    }

    /// `neg-int vA, vB`
    pub fn neg_int(&mut self, dst: u16, src: u16) -> Result<&mut Self> {
        Ok(self.emit_nibbles(Opcode::NegInt, dst, src))
    }

    // --- resolution ----------------------------------------------------------

    fn resolve(&self, label: &str) -> Result<usize> {
        self.labels
            .get(label)
            .copied()
            .ok_or_else(|| crate::Error::Error(format!("undefined label: {label}")))
    }

    /// Resolves all labels and produces the assembled [`MethodBody`].
    ///
    /// # Errors
    ///
    /// Returns an error if a referenced label was never placed, or a branch
    /// offset does not fit its encoding.
    pub fn finish(mut self) -> Result<MethodBody> {
        // Patch fixups.
        for fixup in std::mem::take(&mut self.fixups) {
            match fixup {
                Fixup::Rel16 { unit, base, label } => {
                    let target = self.resolve(&label)?;
                    let rel = target as i64 - base as i64;
                    let rel16 = i16::try_from(rel)
                        .map_err(|_| crate::Error::Error(format!("branch to {label} too far")))?;
                    self.units[unit] = rel16 as u16;
                }
                Fixup::Rel32 { unit, base, label } => {
                    let target = self.resolve(&label)?;
                    let rel = (target as i64 - base as i64) as i32;
                    self.units[unit] = rel as u16;
                    self.units[unit + 1] = (rel as u32 >> 16) as u16;
                }
                Fixup::Case {
                    unit,
                    payload_label,
                    label,
                } => {
                    let switch_offset =
                        *self.switch_sites.get(&payload_label).ok_or_else(|| {
                            crate::Error::Error(format!(
                                "payload {payload_label} has no switch site"
                            ))
                        })?;
                    let target = self.resolve(&label)?;
                    let rel = (target as i64 - switch_offset as i64) as i32;
                    self.units[unit] = rel as u16;
                    self.units[unit + 1] = (rel as u32 >> 16) as u16;
                }
            }
        }

        let mut body = MethodBody::new(
            std::mem::take(&mut self.units),
            self.num_vregs,
            self.num_ins,
        );
        body.fields = std::mem::take(&mut self.fields);
        body.methods = std::mem::take(&mut self.methods);
        body.param_types = std::mem::take(&mut self.params);

        // Resolve try ranges.
        for pending in &self.tries {
            let start = self.resolve(&pending.start_label)? as u32;
            let end = self.resolve(&pending.end_label)? as u32;
            if end <= start {
                return Err(crate::Error::Error(format!(
                    "empty try range {}..{}",
                    pending.start_label, pending.end_label
                )));
            }
            let mut list = CatchHandlerList::default();
            for (type_idx, handler_label) in &pending.handlers {
                list.handlers.push(CatchHandler {
                    type_idx: *type_idx,
                    address: self.resolve(handler_label)? as u32,
                });
            }
            if let Some(all) = &pending.catch_all {
                list.catch_all = Some(self.resolve(all)? as u32);
            }
            body.handlers.push(list);
            body.tries.push(TryItem {
                start_addr: start,
                insn_count: (end - start) as u16,
                handler_index: (body.handlers.len() - 1) as u16,
            });
        }

        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{decode_at, CodeCursor};

    #[test]
    fn test_assemble_straight_line() {
        let mut asm = CodeAssembler::new(2, 0);
        asm.const4(0, 5)
            .unwrap()
            .const4(1, 7)
            .unwrap()
            .add_int(0, 0, 1)
            .unwrap()
            .return_val(0)
            .unwrap();
        let body = asm.finish().unwrap();

        let mut cursor = CodeCursor::new(&body.insns);
        let mut ops = Vec::new();
        while let Some(step) = cursor.next_insn() {
            ops.push(step.unwrap().1.opcode);
        }
        assert_eq!(
            ops,
            vec![
                Opcode::Const4,
                Opcode::Const4,
                Opcode::AddInt,
                Opcode::Return
            ]
        );
    }

    #[test]
    fn test_assemble_backward_branch() {
        let mut asm = CodeAssembler::new(2, 0);
        asm.const4(0, 0)
            .unwrap()
            .label("loop")
            .unwrap()
            .add_int_lit8(0, 0, 1)
            .unwrap()
            .if_ltz(0, "loop")
            .unwrap()
            .return_void()
            .unwrap();
        let body = asm.finish().unwrap();

        // if-ltz sits at unit 3; the loop label is at unit 1.
        let (insn, _) = decode_at(&body.insns, 3).unwrap();
        assert_eq!(insn.opcode, Opcode::IfLtz);
        assert_eq!(insn.branch_offset(), Some(-2));
    }

    #[test]
    fn test_assemble_undefined_label() {
        let mut asm = CodeAssembler::new(1, 0);
        asm.goto("nowhere").unwrap();
        assert!(asm.finish().is_err());
    }

    #[test]
    fn test_assemble_try_range() {
        let mut asm = CodeAssembler::new(2, 0);
        asm.label("try_start")
            .unwrap()
            .const4(0, 1)
            .unwrap()
            .label("try_end")
            .unwrap()
            .return_void()
            .unwrap()
            .label("handler")
            .unwrap()
            .move_exception(1)
            .unwrap()
            .return_void()
            .unwrap()
            .try_range("try_start", "try_end", &[(9, "handler")], None)
            .unwrap();
        let body = asm.finish().unwrap();

        assert_eq!(body.tries.len(), 1);
        let handlers: Vec<_> = body.catch_handlers_at(0).collect();
        assert_eq!(handlers.len(), 1);
        assert_eq!(handlers[0].0, 9);
    }
}
