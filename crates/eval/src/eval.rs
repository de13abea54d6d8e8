//! The recursive expression walker.
//!
//! One [`Evaluator`] is built per evaluation against a scope, an
//! optional frame base and an [`EvalContext`]. The [`EvalMode`]
//! threads through the recursion: short-circuited subexpressions are
//! walked in `Skip` (no reads, no writes, no calls), and a caller that
//! must not disturb the inferior evaluates in `SideEffectFree`, where
//! reads are fine but writes fail and calls return a zeroed result of
//! the callee's return type.

use crate::context::{CallArg, EvalContext};
use crate::error::EvalError;
use crate::expr::{BinOp, Expr, UnOp};
use crate::ops;
use crate::value::{extract_bits, insert_bits, pack_u64, unpack_u64, Location, Value};
use common::{create_logger, trace, trace_detail, Logger};
use symtab::{AddressClass, BlockId, BlockTable, Dispatch, Namespace, TypeCode, TypeId, TypeTable};

/// How much of the expression's behavior to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMode {
    /// Full evaluation with all side effects.
    Normal,
    /// Untaken branch: produce a placeholder without touching the
    /// inferior at all.
    Skip,
    /// Reads allowed; writes fail and calls yield a zeroed value of
    /// the return type.
    SideEffectFree,
}

/// Walks one expression tree against a live inferior.
pub struct Evaluator<'a> {
    types: &'a mut TypeTable,
    blocks: &'a BlockTable,
    scope: BlockId,
    frame_base: Option<u64>,
    ctx: &'a mut dyn EvalContext,
    log: Logger,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        types: &'a mut TypeTable,
        blocks: &'a BlockTable,
        scope: BlockId,
        frame_base: Option<u64>,
        ctx: &'a mut dyn EvalContext,
    ) -> Self {
        Self {
            types,
            blocks,
            scope,
            frame_base,
            ctx,
            log: create_logger("eval"),
        }
    }

    /// Evaluate `expr` under `mode`.
    pub fn eval(&mut self, expr: &Expr, mode: EvalMode) -> Result<Value, EvalError> {
        if mode == EvalMode::Skip {
            // Walk no further: a placeholder int with no location.
            let int = self.types.builtins().int;
            return Ok(Value::zeroed(self.types, int));
        }
        match expr {
            Expr::IntLit { value, ty } => {
                let ty = ty.unwrap_or(self.types.builtins().int);
                Ok(Value::from_i64(self.types, ty, *value))
            }
            Expr::FloatLit { value } => {
                let double = self.types.builtins().double;
                Ok(Value::from_f64(self.types, double, *value))
            }
            Expr::Ident(name) => self.resolve_ident(name),
            Expr::Register(name) => self.machine_register(name),
            Expr::InternalVar(name) => self.internal_variable(name),
            Expr::Binary { op, lhs, rhs } => {
                let l = self.eval(lhs, mode)?;
                let r = self.eval(rhs, mode)?;
                self.binary(*op, l, r, mode)
            }
            Expr::Unary { op, operand } => {
                let v = self.eval(operand, mode)?;
                let v = ops::coerce_array(self.types, v)?;
                ops::unop(self.types, *op, &v)
            }
            Expr::LogicalAnd { lhs, rhs } => {
                let l = self.eval(lhs, mode)?;
                if l.is_zero() {
                    self.eval(rhs, EvalMode::Skip)?;
                    Ok(self.bool_value(false))
                } else {
                    let r = self.eval(rhs, mode)?;
                    Ok(self.bool_value(!r.is_zero()))
                }
            }
            Expr::LogicalOr { lhs, rhs } => {
                let l = self.eval(lhs, mode)?;
                if !l.is_zero() {
                    self.eval(rhs, EvalMode::Skip)?;
                    Ok(self.bool_value(true))
                } else {
                    let r = self.eval(rhs, mode)?;
                    Ok(self.bool_value(!r.is_zero()))
                }
            }
            Expr::Ternary { cond, then_expr, else_expr } => {
                let c = self.eval(cond, mode)?;
                if !c.is_zero() {
                    let v = self.eval(then_expr, mode)?;
                    self.eval(else_expr, EvalMode::Skip)?;
                    Ok(v)
                } else {
                    self.eval(then_expr, EvalMode::Skip)?;
                    self.eval(else_expr, mode)
                }
            }
            Expr::Assign { target, value } => {
                let t = self.eval(target, mode)?;
                let v = self.eval(value, mode)?;
                self.assign(t, v, mode)
            }
            Expr::AssignOp { op, target, value } => {
                let t = self.eval(target, mode)?;
                let v = self.eval(value, mode)?;
                let combined = self.binary(*op, t.clone(), v, mode)?;
                self.assign(t, combined, mode)
            }
            Expr::Deref(operand) => {
                let v = self.eval(operand, mode)?;
                ops::value_ind(self.types, self.ctx, v)
            }
            Expr::AddrOf(operand) => {
                // No array decay on the operand of unary `&`.
                let v = self.eval(operand, mode)?;
                ops::value_addr(self.types, &v)
            }
            Expr::Member { base, name, through_pointer } => {
                let base = self.member_base(base, *through_pointer, mode)?;
                self.struct_member(base, name)
            }
            Expr::Subscript { base, index } => {
                let b = self.eval(base, mode)?;
                let b = ops::coerce_array(self.types, b)?;
                let i = self.eval(index, mode)?;
                let sum = ops::value_add(self.types, b, i)?;
                ops::value_ind(self.types, self.ctx, sum)
            }
            Expr::Cast { ty, operand } => {
                let v = self.eval(operand, mode)?;
                ops::value_cast(self.types, self.ctx, v, *ty)
            }
            Expr::Call { callee, args } => self.eval_call(callee, args, mode),
            Expr::Repeat { base, count } => {
                let b = self.eval(base, mode)?;
                let n = self.eval(count, mode)?.as_i64(self.types);
                self.repeat(b, n)
            }
        }
    }

    fn bool_value(&self, b: bool) -> Value {
        Value::from_i64(self.types, self.types.builtins().int, b as i64)
    }

    /// Look up an ordinary name in the current scope chain and
    /// materialize its value per address class.
    fn resolve_ident(&mut self, name: &str) -> Result<Value, EvalError> {
        let sid = self
            .blocks
            .lookup_symbol(name, self.scope, Namespace::Var)
            .ok_or_else(|| EvalError::UndefinedSymbol(name.into()))?;
        let sym = self.blocks.symbol(sid).clone();
        trace_detail!(self.log, "resolved {} as {:?}", name, sym.class);
        match sym.class {
            AddressClass::Const(v) => Ok(Value::from_i64(self.types, sym.ty, v)),
            AddressClass::ConstFloat(v) => Ok(Value::from_f64(self.types, sym.ty, v)),
            AddressClass::Static(addr) => {
                if self.types.get(sym.ty).code == TypeCode::Func {
                    let mut v = Value::zeroed(self.types, sym.ty);
                    v.loc = Location::Memory(addr);
                    Ok(v)
                } else {
                    Value::at(self.types, self.ctx, addr, sym.ty)
                }
            }
            AddressClass::Register(reg) => {
                let (raw, loc) = self.read_reg(reg)?;
                let len = self.types.get(sym.ty).length.max(1);
                let mut v = Value::zeroed(self.types, sym.ty);
                v.loc = loc;
                v.contents = pack_u64(raw, len);
                Ok(v)
            }
            AddressClass::Arg(off) | AddressClass::Local(off) => {
                let base = self
                    .frame_base
                    .ok_or_else(|| EvalError::NoFrame(name.into()))?;
                let addr = base.wrapping_add(off as u64);
                Value::at(self.types, self.ctx, addr, sym.ty)
            }
            AddressClass::Function(block) => {
                let addr = self.blocks.block(block).start;
                let mut v = Value::zeroed(self.types, sym.ty);
                v.loc = Location::Memory(addr);
                Ok(v)
            }
            AddressClass::Typedef => Err(EvalError::UndefinedSymbol(name.into())),
        }
    }

    /// `$pc`, `$x0`, ... resolved through the context's register map.
    fn machine_register(&mut self, name: &str) -> Result<Value, EvalError> {
        let reg = self
            .ctx
            .register_by_name(name)
            .ok_or_else(|| EvalError::UndefinedSymbol(format!("${}", name)))?;
        let (raw, loc) = self.read_reg(reg)?;
        let long = self.types.builtins().long;
        let mut v = Value::zeroed(self.types, long);
        v.loc = loc;
        v.contents = pack_u64(raw, 8);
        Ok(v)
    }

    fn read_reg(&mut self, reg: usize) -> Result<(u64, Location), EvalError> {
        match self.frame_base {
            Some(base) => Ok((
                self.ctx.frame_register(base, reg)?,
                Location::FrameRegister { frame_base: base, reg },
            )),
            None => Ok((self.ctx.read_register(reg)?, Location::Register(reg))),
        }
    }

    /// A convenience variable. Unknown names spring into existence as
    /// an assignable zero so `$foo = expr` just works.
    fn internal_variable(&mut self, name: &str) -> Result<Value, EvalError> {
        let mut v = match self.ctx.internal_var(name) {
            Some(v) => v,
            None => Value::zeroed(self.types, self.types.builtins().int),
        };
        v.loc = Location::Internal(name.into());
        Ok(v)
    }

    /// Binary operator dispatch: arrays decay, aggregates redirect to
    /// their `operator<op>` member, pointers get scaled arithmetic,
    /// the rest is numeric.
    fn binary(
        &mut self,
        op: BinOp,
        lhs: Value,
        rhs: Value,
        mode: EvalMode,
    ) -> Result<Value, EvalError> {
        let lhs = ops::coerce_array(self.types, lhs)?;
        let rhs = ops::coerce_array(self.types, rhs)?;
        let l_agg = self.types.get(self.types.strip_refs(lhs.ty)).is_aggregate();
        if l_agg {
            let (addr, mty) = self.resolve_method(&lhs, op.member_operator(), Some(1))?;
            return self.dispatch_call(addr, mty, Some(&lhs), vec![rhs], mode);
        }
        let r_agg = self.types.get(self.types.strip_refs(rhs.ty)).is_aggregate();
        if r_agg {
            return Err(EvalError::InvalidOperands(op.member_operator()));
        }
        match op {
            BinOp::Add => ops::value_add(self.types, lhs, rhs),
            BinOp::Sub => ops::value_sub(self.types, lhs, rhs),
            _ => ops::numeric_binop(self.types, op, &lhs, &rhs),
        }
    }

    /// Store `value` into `target`. Validates the target and converts
    /// the value before any write; a bit-field target becomes a single
    /// read-modify-write of its storage unit.
    fn assign(
        &mut self,
        mut target: Value,
        value: Value,
        mode: EvalMode,
    ) -> Result<Value, EvalError> {
        if mode == EvalMode::SideEffectFree {
            return Err(EvalError::SideEffects);
        }
        if !target.is_lvalue() {
            return Err(EvalError::NotAnLvalue);
        }
        let converted = ops::value_cast(self.types, self.ctx, value, target.ty)?;
        let len = self.types.get(target.ty).length.max(1);
        let mut bytes = converted.contents;
        bytes.resize(len, 0);

        match target.loc.clone() {
            Location::Memory(base) => {
                let addr = base.wrapping_add(target.offset as u64);
                if target.is_bitfield() {
                    let unit = self.ctx.read_memory(addr, len)?;
                    let merged =
                        insert_bits(&unit, target.bitpos, target.bitsize, unpack_u64(&bytes));
                    self.ctx.write_memory(addr, &merged)?;
                    let signed = !self.types.get(target.ty).is_unsigned();
                    target.contents =
                        extract_bits(&merged, target.bitpos, target.bitsize, len, signed);
                } else {
                    self.ctx.write_memory(addr, &bytes)?;
                    target.contents = bytes;
                }
            }
            Location::Register(reg) => {
                self.ctx.write_register(reg, unpack_u64(&bytes))?;
                target.contents = bytes;
            }
            Location::FrameRegister { .. } => {
                return Err(EvalError::Target(
                    "cannot write a register of an outer frame".into(),
                ));
            }
            Location::Internal(name) => {
                target.contents = bytes;
                self.ctx.set_internal_var(&name, &target);
            }
            Location::None => return Err(EvalError::NotAnLvalue),
        }
        trace!(self.log, "assigned {} bytes to {:?}", len, target.loc);
        Ok(target)
    }

    /// Evaluate the base of a member access, dereferencing for `->`
    /// and auto-dereferencing a pointer used with `.`.
    fn member_base(
        &mut self,
        base: &Expr,
        through_pointer: bool,
        mode: EvalMode,
    ) -> Result<Value, EvalError> {
        let v = self.eval(base, mode)?;
        let code = self.types.get(self.types.strip_refs(v.ty)).code;
        if through_pointer || code == TypeCode::Ptr {
            ops::value_ind(self.types, self.ctx, v)
        } else {
            Ok(v)
        }
    }

    /// `base.name`: a data field (walking base classes), else a member
    /// function resolved to its code address.
    fn struct_member(&mut self, base: Value, name: &str) -> Result<Value, EvalError> {
        let stripped = self.types.strip_refs(base.ty);
        let ty = self.types.get(stripped);
        if !ty.is_aggregate() {
            let what = ty.name.clone().unwrap_or_else(|| format!("{:?}", ty.code));
            return Err(EvalError::NotAnAggregate(what));
        }
        let aggregate = ty.name.clone().unwrap_or_else(|| "<anonymous>".into());

        if let Some((bitpos, bitsize, fty)) = self.find_field(stripped, name) {
            return self.field_value(base, bitpos, bitsize, fty);
        }
        if let Ok((addr, mty)) = self.resolve_method(&base, name, None) {
            let mut v = Value::zeroed(self.types, mty);
            v.contents = pack_u64(addr, 8);
            return Ok(v);
        }
        Err(EvalError::MemberNotFound { aggregate, member: name.into() })
    }

    /// Bit position, bit size and type of field `name`, searching the
    /// struct's own fields first and then its base classes.
    fn find_field(&self, struct_ty: TypeId, name: &str) -> Option<(u32, u32, TypeId)> {
        let ty = self.types.get(self.types.strip_refs(struct_ty));
        for f in &ty.fields {
            if f.name == name {
                return Some((f.bitpos, f.bitsize, f.ty));
            }
        }
        for b in &ty.bases {
            if let Some((bp, bs, ft)) = self.find_field(b.ty, name) {
                return Some((b.bitpos + bp, bs, ft));
            }
        }
        None
    }

    /// Carve a field value out of its containing aggregate, keeping
    /// the lvalue chain (location plus byte offset) intact.
    fn field_value(
        &mut self,
        base: Value,
        bitpos: u32,
        bitsize: u32,
        fty: TypeId,
    ) -> Result<Value, EvalError> {
        let byte_start = (bitpos / 8) as usize;
        let flen = self.types.get(fty).length.max(1);

        // Aggregates that did not arrive with full contents (register
        // bases and the like) fall back to a direct memory read.
        if byte_start + flen > base.contents.len() {
            let addr = base.address()?.wrapping_add(byte_start as u64);
            return Value::at(self.types, self.ctx, addr, fty);
        }

        let mut v = Value::zeroed(self.types, fty);
        v.loc = base.loc.clone();
        v.offset = base.offset + byte_start as i64;
        let unit = &base.contents[byte_start..byte_start + flen];
        if bitsize == 0 {
            v.contents = unit.to_vec();
        } else {
            v.bitpos = bitpos % 8;
            v.bitsize = bitsize;
            let signed = !self.types.get(fty).is_unsigned();
            v.contents = extract_bits(unit, bitpos % 8, bitsize, flen, signed);
        }
        Ok(v)
    }

    /// Find a member function on the object's type or its bases and
    /// resolve it to a code address. Virtual methods go through the
    /// object's vtable: the vptr field is read from the object, then
    /// the slot from the table, so the call lands on the dynamic
    /// type's override.
    fn resolve_method(
        &mut self,
        obj: &Value,
        name: &str,
        argc: Option<usize>,
    ) -> Result<(u64, TypeId), EvalError> {
        let mut matches = Vec::new();
        self.collect_methods(self.types.strip_refs(obj.ty), name, &mut matches);
        if matches.is_empty() {
            let ty = self.types.get(self.types.strip_refs(obj.ty));
            return Err(EvalError::MemberNotFound {
                aggregate: ty.name.clone().unwrap_or_else(|| "<anonymous>".into()),
                member: name.into(),
            });
        }
        if matches.len() > 1 {
            if let Some(n) = argc {
                matches.retain(|m| self.types.get(m.ty).params.len() == n);
            }
            if matches.len() != 1 {
                return Err(EvalError::AmbiguousMember(name.into()));
            }
        }
        let m = matches.remove(0);
        let addr = match m.dispatch {
            Dispatch::Direct { addr } => addr,
            Dispatch::Virtual { slot } => {
                let obj_addr = obj.address()?;
                let vptr_off = self.vptr_byte_offset(obj.ty)?;
                let vptr_bytes = self.ctx.read_memory(obj_addr + vptr_off, 8)?;
                let vtable = unpack_u64(&vptr_bytes);
                let slot_bytes = self.ctx.read_memory(vtable + slot as u64 * 8, 8)?;
                let resolved = unpack_u64(&slot_bytes);
                trace!(
                    self.log,
                    "virtual {} slot {} via vtable {:#x} -> {:#x}",
                    name,
                    slot,
                    vtable,
                    resolved
                );
                resolved
            }
        };
        Ok((addr, m.ty))
    }

    fn collect_methods(&self, struct_ty: TypeId, name: &str, out: &mut Vec<symtab::Method>) {
        let ty = self.types.get(self.types.strip_refs(struct_ty));
        for m in &ty.methods {
            if m.name == name {
                out.push(m.clone());
            }
        }
        for b in &ty.bases {
            self.collect_methods(b.ty, name, out);
        }
    }

    /// Byte offset of the vtable pointer within the object, searching
    /// the type itself and then its bases.
    fn vptr_byte_offset(&self, struct_ty: TypeId) -> Result<u64, EvalError> {
        fn walk(types: &TypeTable, id: TypeId, base_off: u64) -> Option<u64> {
            let ty = types.get(types.strip_refs(id));
            if let Some(idx) = ty.vptr_field {
                return Some(base_off + (ty.fields[idx].bitpos / 8) as u64);
            }
            for b in &ty.bases {
                if let Some(off) = walk(types, b.ty, base_off + (b.bitpos / 8) as u64) {
                    return Some(off);
                }
            }
            None
        }
        walk(self.types, struct_ty, 0).ok_or(EvalError::NotCallable)
    }

    /// A function call. Member callees resolve against the object and
    /// pass its address as the hidden first argument; everything else
    /// must evaluate to a function or function pointer.
    fn eval_call(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        mode: EvalMode,
    ) -> Result<Value, EvalError> {
        if let Expr::Member { base, name, through_pointer } = callee {
            let obj = self.member_base(base, *through_pointer, mode)?;
            let stripped = self.types.strip_refs(obj.ty);
            if self.types.get(stripped).is_aggregate()
                && self.find_field(stripped, name).is_none()
            {
                let (addr, mty) = self.resolve_method(&obj, name, Some(args.len()))?;
                let argv = self.eval_args(args, mode)?;
                return self.dispatch_call(addr, mty, Some(&obj), argv, mode);
            }
            // A data field holding a function pointer: fall through to
            // the generic path below.
            let f = self.struct_member(obj, name)?;
            let argv = self.eval_args(args, mode)?;
            return self.call_value(f, argv, mode);
        }
        let f = self.eval(callee, mode)?;
        let argv = self.eval_args(args, mode)?;
        self.call_value(f, argv, mode)
    }

    fn eval_args(&mut self, args: &[Expr], mode: EvalMode) -> Result<Vec<Value>, EvalError> {
        args.iter().map(|a| self.eval(a, mode)).collect()
    }

    fn call_value(
        &mut self,
        f: Value,
        args: Vec<Value>,
        mode: EvalMode,
    ) -> Result<Value, EvalError> {
        let f = ops::coerce_array(self.types, f)?;
        let stripped = self.types.strip_refs(f.ty);
        let fty = match self.types.get(stripped).code {
            TypeCode::Ptr => {
                let target = self.types.get(stripped).target.ok_or(EvalError::NotCallable)?;
                if !matches!(self.types.get(target).code, TypeCode::Func | TypeCode::Method) {
                    return Err(EvalError::NotCallable);
                }
                target
            }
            TypeCode::Func | TypeCode::Method => stripped,
            _ => return Err(EvalError::NotCallable),
        };
        let addr = match self.types.get(stripped).code {
            TypeCode::Ptr => unpack_u64(&f.contents),
            _ => f.address().unwrap_or_else(|_| unpack_u64(&f.contents)),
        };
        self.dispatch_call(addr, fty, None, args, mode)
    }

    /// Common tail of every call: default-promote the arguments, pack
    /// them, and either run the inferior or, side-effect-free, hand
    /// back a zeroed return value.
    fn dispatch_call(
        &mut self,
        addr: u64,
        fty: TypeId,
        this: Option<&Value>,
        args: Vec<Value>,
        mode: EvalMode,
    ) -> Result<Value, EvalError> {
        let ret = self
            .types
            .get(fty)
            .target
            .unwrap_or(self.types.builtins().int);
        let ret_len = self.types.get(ret).length;

        let mut call_args = Vec::with_capacity(args.len() + 1);
        if let Some(obj) = this {
            let this_ptr = obj.address()?;
            call_args.push(CallArg { bytes: pack_u64(this_ptr, 8) });
        }
        for arg in args {
            let arg = self.promote_arg(arg)?;
            call_args.push(CallArg { bytes: arg.contents });
        }

        if mode == EvalMode::SideEffectFree {
            return Ok(Value::zeroed(self.types, ret));
        }

        trace!(self.log, "calling {:#x} with {} args", addr, call_args.len());
        let result = self.ctx.call_function(addr, &call_args, ret_len)?;
        let mut v = Value::zeroed(self.types, ret);
        let len = v.contents.len();
        let mut bytes = result.bytes;
        bytes.resize(len.max(bytes.len()), 0);
        v.contents = bytes[..len].to_vec();
        Ok(v)
    }

    /// C default argument promotion: sub-int integers widen to int,
    /// float widens to double, arrays decay.
    fn promote_arg(&mut self, arg: Value) -> Result<Value, EvalError> {
        let arg = ops::coerce_array(self.types, arg)?;
        let ty = self.types.get(self.types.strip_refs(arg.ty));
        let builtins = *self.types.builtins();
        if ty.is_integral() && ty.length < 4 {
            return ops::value_cast(self.types, self.ctx, arg, builtins.int);
        }
        if ty.code == TypeCode::Float && ty.length == 4 {
            return ops::value_cast(self.types, self.ctx, arg, builtins.double);
        }
        Ok(arg)
    }

    /// `x@n`: treat a memory-resident value as the first of `n` array
    /// elements.
    fn repeat(&mut self, base: Value, n: i64) -> Result<Value, EvalError> {
        if n <= 0 {
            return Err(EvalError::InvalidOperands("@"));
        }
        let addr = base.address()?;
        let arr = self.types.new_array(base.ty, n as usize);
        let mut v = Value::at(self.types, self.ctx, addr, arr)?;
        v.repeat = Some(n as u32);
        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CallResult;
    use crate::expr::Expr;
    use std::collections::HashMap;
    use symtab::{Field, Method, Symbol};

    /// Scriptable context: flat memory, a register file, an internal
    /// variable store and a call recorder.
    struct TestCtx {
        mem: HashMap<u64, u8>,
        regs: [u64; 32],
        writes: Vec<(u64, Vec<u8>)>,
        internal: HashMap<String, Value>,
        calls: Vec<(u64, Vec<Vec<u8>>)>,
        call_result: Vec<u8>,
    }

    impl TestCtx {
        fn new() -> Self {
            Self {
                mem: HashMap::new(),
                regs: [0; 32],
                writes: Vec::new(),
                internal: HashMap::new(),
                calls: Vec::new(),
                call_result: vec![0; 8],
            }
        }

        fn store(&mut self, addr: u64, bytes: &[u8]) {
            for (i, &b) in bytes.iter().enumerate() {
                self.mem.insert(addr + i as u64, b);
            }
        }

        fn load(&self, addr: u64, len: usize) -> Vec<u8> {
            (0..len)
                .map(|i| self.mem.get(&(addr + i as u64)).copied().unwrap_or(0))
                .collect()
        }
    }

    impl EvalContext for TestCtx {
        fn read_memory(&mut self, addr: u64, len: usize) -> Result<Vec<u8>, EvalError> {
            Ok(self.load(addr, len))
        }

        fn write_memory(&mut self, addr: u64, data: &[u8]) -> Result<(), EvalError> {
            self.writes.push((addr, data.to_vec()));
            self.store(addr, data);
            Ok(())
        }

        fn read_register(&mut self, reg: usize) -> Result<u64, EvalError> {
            Ok(self.regs[reg])
        }

        fn write_register(&mut self, reg: usize, value: u64) -> Result<(), EvalError> {
            self.regs[reg] = value;
            Ok(())
        }

        fn frame_register(&mut self, _frame_base: u64, reg: usize) -> Result<u64, EvalError> {
            Ok(self.regs[reg])
        }

        fn register_by_name(&self, name: &str) -> Option<usize> {
            match name {
                "pc" => Some(0),
                "x1" => Some(1),
                _ => None,
            }
        }

        fn internal_var(&mut self, name: &str) -> Option<Value> {
            self.internal.get(name).cloned()
        }

        fn set_internal_var(&mut self, name: &str, value: &Value) {
            self.internal.insert(name.into(), value.clone());
        }

        fn call_function(
            &mut self,
            addr: u64,
            args: &[CallArg],
            _return_len: usize,
        ) -> Result<CallResult, EvalError> {
            self.calls.push((addr, args.iter().map(|a| a.bytes.clone()).collect()));
            Ok(CallResult { bytes: self.call_result.clone(), struct_return: false })
        }
    }

    /// Symbols: static int g at 0x1000, local int x at frame-8,
    /// static struct point* p at 0x1100.
    fn fixture(types: &mut TypeTable) -> (BlockTable, TypeId) {
        let int = types.builtins().int;
        let point = types.new_aggregate(
            TypeCode::Struct,
            "point",
            8,
            vec![
                Field { name: "x".into(), bitpos: 0, bitsize: 0, ty: int },
                Field { name: "y".into(), bitpos: 32, bitsize: 0, ty: int },
            ],
            vec![],
            vec![],
            None,
        );
        let pptr = types.pointer_to(point);

        let mut blocks = BlockTable::new();
        let global = blocks.global_block();
        blocks.add_symbol(global, Symbol::new("g", Namespace::Var, AddressClass::Static(0x1000), int));
        blocks.add_symbol(global, Symbol::new("p", Namespace::Var, AddressClass::Static(0x1100), pptr));
        let func = blocks.add_block(0x4000, 0x4100, None, global);
        blocks.add_symbol(func, Symbol::new("x", Namespace::Var, AddressClass::Local(-8), int));
        (blocks, point)
    }

    fn run(
        types: &mut TypeTable,
        blocks: &BlockTable,
        scope: BlockId,
        frame: Option<u64>,
        ctx: &mut TestCtx,
        expr: &Expr,
        mode: EvalMode,
    ) -> Result<Value, EvalError> {
        Evaluator::new(types, blocks, scope, frame, ctx).eval(expr, mode)
    }

    #[test]
    fn test_static_variable_read() {
        let mut types = TypeTable::new();
        let (blocks, _) = fixture(&mut types);
        let mut ctx = TestCtx::new();
        ctx.store(0x1000, &7i32.to_le_bytes());
        let g = blocks.global_block();
        let v = run(&mut types, &blocks, g, None, &mut ctx, &Expr::ident("g"), EvalMode::Normal)
            .unwrap();
        assert_eq!(v.as_i64(&types), 7);
        assert_eq!(v.loc, Location::Memory(0x1000));
    }

    #[test]
    fn test_local_requires_frame() {
        let mut types = TypeTable::new();
        let (blocks, _) = fixture(&mut types);
        let mut ctx = TestCtx::new();
        let scope = blocks.lookup_block(0x4010);
        let err = run(&mut types, &blocks, scope, None, &mut ctx, &Expr::ident("x"), EvalMode::Normal)
            .unwrap_err();
        assert!(matches!(err, EvalError::NoFrame(_)));

        ctx.store(0x6ff8, &11i32.to_le_bytes());
        let v = run(
            &mut types, &blocks, scope, Some(0x7000), &mut ctx,
            &Expr::ident("x"), EvalMode::Normal,
        )
        .unwrap();
        assert_eq!(v.as_i64(&types), 11);
    }

    #[test]
    fn test_undefined_symbol() {
        let mut types = TypeTable::new();
        let (blocks, _) = fixture(&mut types);
        let mut ctx = TestCtx::new();
        let g = blocks.global_block();
        let err = run(&mut types, &blocks, g, None, &mut ctx, &Expr::ident("nope"), EvalMode::Normal)
            .unwrap_err();
        assert_eq!(err, EvalError::UndefinedSymbol("nope".into()));
    }

    #[test]
    fn test_member_through_pointer() {
        let mut types = TypeTable::new();
        let (blocks, _) = fixture(&mut types);
        let mut ctx = TestCtx::new();
        // p -> 0x2000; point { x: 1, y: 2 } at 0x2000.
        ctx.store(0x1100, &0x2000u64.to_le_bytes());
        ctx.store(0x2000, &1i32.to_le_bytes());
        ctx.store(0x2004, &2i32.to_le_bytes());
        let g = blocks.global_block();
        // y sits at bit offset 32, so byte offset 4 from the object.
        let e = Expr::member(Expr::ident("p"), "y", true);
        let v = run(&mut types, &blocks, g, None, &mut ctx, &e, EvalMode::Normal).unwrap();
        assert_eq!(v.as_i64(&types), 2);
        assert_eq!(v.loc, Location::Memory(0x2000));
        assert_eq!(v.offset, 4);
    }

    #[test]
    fn test_bitfield_extract_and_single_write_assign() {
        let mut types = TypeTable::new();
        let int = types.builtins().int;
        let uint = types.builtins().unsigned_int;
        // struct flags { unsigned mode : 3; int level : 5; }
        let flags = types.new_aggregate(
            TypeCode::Struct,
            "flags",
            4,
            vec![
                Field { name: "mode".into(), bitpos: 0, bitsize: 3, ty: uint },
                Field { name: "level".into(), bitpos: 3, bitsize: 5, ty: int },
            ],
            vec![],
            vec![],
            None,
        );
        let mut blocks = BlockTable::new();
        let g = blocks.global_block();
        blocks.add_symbol(g, Symbol::new("f", Namespace::Var, AddressClass::Static(0x3000), flags));

        let mut ctx = TestCtx::new();
        // mode = 0b101, level = 0b11111 (-1 signed).
        ctx.store(0x3000, &[0b1111_1101, 0, 0, 0]);

        let e = Expr::member(Expr::ident("f"), "mode", false);
        let v = run(&mut types, &blocks, g, None, &mut ctx, &e, EvalMode::Normal).unwrap();
        assert_eq!(v.as_u64(&types), 0b101);
        assert!(v.is_bitfield());

        let e = Expr::member(Expr::ident("f"), "level", false);
        let v = run(&mut types, &blocks, g, None, &mut ctx, &e, EvalMode::Normal).unwrap();
        assert_eq!(v.as_i64(&types), -1);

        // Assigning the bit-field touches memory exactly once and
        // leaves the neighboring field alone.
        ctx.writes.clear();
        let e = Expr::assign(Expr::member(Expr::ident("f"), "level", false), Expr::int(9));
        run(&mut types, &blocks, g, None, &mut ctx, &e, EvalMode::Normal).unwrap();
        assert_eq!(ctx.writes.len(), 1);
        let stored = ctx.load(0x3000, 1)[0];
        assert_eq!(stored & 0b111, 0b101); // mode untouched
        assert_eq!((stored >> 3) & 0b11111, 9);
    }

    #[test]
    fn test_assignment_writes_memory_and_yields_value() {
        let mut types = TypeTable::new();
        let (blocks, _) = fixture(&mut types);
        let mut ctx = TestCtx::new();
        let g = blocks.global_block();
        let e = Expr::assign(Expr::ident("g"), Expr::int(42));
        let v = run(&mut types, &blocks, g, None, &mut ctx, &e, EvalMode::Normal).unwrap();
        assert_eq!(v.as_i64(&types), 42);
        assert_eq!(ctx.load(0x1000, 4), 42i32.to_le_bytes().to_vec());
    }

    #[test]
    fn test_assign_to_rvalue_fails() {
        let mut types = TypeTable::new();
        let (blocks, _) = fixture(&mut types);
        let mut ctx = TestCtx::new();
        let g = blocks.global_block();
        let e = Expr::assign(Expr::int(1), Expr::int(2));
        let err = run(&mut types, &blocks, g, None, &mut ctx, &e, EvalMode::Normal).unwrap_err();
        assert_eq!(err, EvalError::NotAnLvalue);
    }

    #[test]
    fn test_logical_and_skips_untaken_side_effects() {
        let mut types = TypeTable::new();
        let (blocks, _) = fixture(&mut types);
        let mut ctx = TestCtx::new();
        let g = blocks.global_block();
        // 0 && (g = 5): the assignment must not run.
        let e = Expr::LogicalAnd {
            lhs: Box::new(Expr::int(0)),
            rhs: Box::new(Expr::assign(Expr::ident("g"), Expr::int(5))),
        };
        let v = run(&mut types, &blocks, g, None, &mut ctx, &e, EvalMode::Normal).unwrap();
        assert_eq!(v.as_i64(&types), 0);
        assert!(ctx.writes.is_empty());

        // 1 || (g = 5) likewise.
        let e = Expr::LogicalOr {
            lhs: Box::new(Expr::int(1)),
            rhs: Box::new(Expr::assign(Expr::ident("g"), Expr::int(5))),
        };
        let v = run(&mut types, &blocks, g, None, &mut ctx, &e, EvalMode::Normal).unwrap();
        assert_eq!(v.as_i64(&types), 1);
        assert!(ctx.writes.is_empty());
    }

    #[test]
    fn test_ternary_untaken_branch_skipped() {
        let mut types = TypeTable::new();
        let (blocks, _) = fixture(&mut types);
        let mut ctx = TestCtx::new();
        let g = blocks.global_block();
        let e = Expr::Ternary {
            cond: Box::new(Expr::int(1)),
            then_expr: Box::new(Expr::int(10)),
            else_expr: Box::new(Expr::assign(Expr::ident("g"), Expr::int(5))),
        };
        let v = run(&mut types, &blocks, g, None, &mut ctx, &e, EvalMode::Normal).unwrap();
        assert_eq!(v.as_i64(&types), 10);
        assert!(ctx.writes.is_empty());
    }

    #[test]
    fn test_side_effect_free_allows_reads_forbids_writes() {
        let mut types = TypeTable::new();
        let (blocks, _) = fixture(&mut types);
        let mut ctx = TestCtx::new();
        ctx.store(0x1000, &3i32.to_le_bytes());
        let g = blocks.global_block();

        let e = Expr::binary(BinOp::Eq, Expr::ident("g"), Expr::int(3));
        let v = run(&mut types, &blocks, g, None, &mut ctx, &e, EvalMode::SideEffectFree).unwrap();
        assert_eq!(v.as_i64(&types), 1);

        let e = Expr::assign(Expr::ident("g"), Expr::int(9));
        let err =
            run(&mut types, &blocks, g, None, &mut ctx, &e, EvalMode::SideEffectFree).unwrap_err();
        assert_eq!(err, EvalError::SideEffects);
        assert!(ctx.writes.is_empty());
    }

    /// A call fixture: int f(char) at 0x5000.
    fn call_fixture(types: &mut TypeTable) -> BlockTable {
        let int = types.builtins().int;
        let ch = types.builtins().char;
        let fty = types.new_function(int, vec![ch]);
        let mut blocks = BlockTable::new();
        let g = blocks.global_block();
        blocks.add_symbol(g, Symbol::new("f", Namespace::Var, AddressClass::Static(0x5000), fty));
        blocks
    }

    #[test]
    fn test_call_promotes_args_and_unpacks_return() {
        let mut types = TypeTable::new();
        let blocks = call_fixture(&mut types);
        let mut ctx = TestCtx::new();
        ctx.call_result = 99i64.to_le_bytes().to_vec();
        let g = blocks.global_block();
        let ch = types.builtins().char;
        let e = Expr::Call {
            callee: Box::new(Expr::ident("f")),
            args: vec![Expr::Cast { ty: ch, operand: Box::new(Expr::int(7)) }],
        };
        let v = run(&mut types, &blocks, g, None, &mut ctx, &e, EvalMode::Normal).unwrap();
        assert_eq!(v.as_i64(&types), 99);
        assert_eq!(ctx.calls.len(), 1);
        let (addr, args) = &ctx.calls[0];
        assert_eq!(*addr, 0x5000);
        // char argument promoted to int: four bytes.
        assert_eq!(args.len(), 1);
        assert_eq!(args[0], 7i32.to_le_bytes().to_vec());
    }

    #[test]
    fn test_side_effect_free_call_returns_zeroed() {
        let mut types = TypeTable::new();
        let blocks = call_fixture(&mut types);
        let mut ctx = TestCtx::new();
        ctx.call_result = 99i64.to_le_bytes().to_vec();
        let g = blocks.global_block();
        let e = Expr::Call { callee: Box::new(Expr::ident("f")), args: vec![Expr::int(1)] };
        let v = run(&mut types, &blocks, g, None, &mut ctx, &e, EvalMode::SideEffectFree).unwrap();
        assert!(v.is_zero());
        assert_eq!(v.ty, types.builtins().int);
        assert!(ctx.calls.is_empty());
    }

    #[test]
    fn test_virtual_dispatch_goes_through_vtable() {
        let mut types = TypeTable::new();
        let int = types.builtins().int;
        let long = types.builtins().long;
        let mty = types.new_method(int, vec![]);
        let obj_ty = types.new_aggregate(
            TypeCode::Struct,
            "shape",
            16,
            vec![
                Field { name: "_vptr".into(), bitpos: 0, bitsize: 0, ty: long },
                Field { name: "id".into(), bitpos: 64, bitsize: 0, ty: int },
            ],
            vec![Method { name: "area".into(), ty: mty, dispatch: Dispatch::Virtual { slot: 1 } }],
            vec![],
            Some(0),
        );
        let mut blocks = BlockTable::new();
        let g = blocks.global_block();
        blocks.add_symbol(g, Symbol::new("s", Namespace::Var, AddressClass::Static(0x6000), obj_ty));

        let mut ctx = TestCtx::new();
        // Object's vptr -> vtable at 0x7000; slot 1 -> code at 0x8888.
        ctx.store(0x6000, &0x7000u64.to_le_bytes());
        ctx.store(0x7008, &0x8888u64.to_le_bytes());
        ctx.call_result = 5i64.to_le_bytes().to_vec();

        let e = Expr::Call {
            callee: Box::new(Expr::member(Expr::ident("s"), "area", false)),
            args: vec![],
        };
        let v = run(&mut types, &blocks, g, None, &mut ctx, &e, EvalMode::Normal).unwrap();
        assert_eq!(v.as_i64(&types), 5);
        let (addr, args) = &ctx.calls[0];
        assert_eq!(*addr, 0x8888);
        // Hidden this argument.
        assert_eq!(args.len(), 1);
        assert_eq!(args[0], 0x6000u64.to_le_bytes().to_vec());
    }

    #[test]
    fn test_subscript_scales_and_reads() {
        let mut types = TypeTable::new();
        let (blocks, _) = fixture(&mut types);
        let mut ctx = TestCtx::new();
        ctx.store(0x1100, &0x2000u64.to_le_bytes());
        ctx.store(0x2008, &77i32.to_le_bytes());
        let g = blocks.global_block();
        let e = Expr::Subscript {
            base: Box::new(Expr::ident("p")),
            index: Box::new(Expr::int(1)),
        };
        // p[1].x at 0x2000 + 8
        let e = Expr::member(e, "x", false);
        let v = run(&mut types, &blocks, g, None, &mut ctx, &e, EvalMode::Normal).unwrap();
        assert_eq!(v.as_i64(&types), 77);
    }

    #[test]
    fn test_repeat_builds_array_view() {
        let mut types = TypeTable::new();
        let (blocks, _) = fixture(&mut types);
        let mut ctx = TestCtx::new();
        ctx.store(0x1000, &1i32.to_le_bytes());
        ctx.store(0x1004, &2i32.to_le_bytes());
        ctx.store(0x1008, &3i32.to_le_bytes());
        let g = blocks.global_block();
        let e = Expr::Repeat { base: Box::new(Expr::ident("g")), count: Box::new(Expr::int(3)) };
        let v = run(&mut types, &blocks, g, None, &mut ctx, &e, EvalMode::Normal).unwrap();
        assert_eq!(v.repeat, Some(3));
        assert_eq!(v.contents.len(), 12);
        assert_eq!(types.get(v.ty).code, TypeCode::Array);
    }

    #[test]
    fn test_machine_register_and_internal_var() {
        let mut types = TypeTable::new();
        let (blocks, _) = fixture(&mut types);
        let mut ctx = TestCtx::new();
        ctx.regs[1] = 0xabcd;
        let g = blocks.global_block();
        let v = run(
            &mut types, &blocks, g, None, &mut ctx,
            &Expr::Register("x1".into()), EvalMode::Normal,
        )
        .unwrap();
        assert_eq!(v.as_u64(&types), 0xabcd);

        // $tmp springs into existence on assignment.
        let e = Expr::assign(Expr::InternalVar("tmp".into()), Expr::int(6));
        run(&mut types, &blocks, g, None, &mut ctx, &e, EvalMode::Normal).unwrap();
        let v = run(
            &mut types, &blocks, g, None, &mut ctx,
            &Expr::InternalVar("tmp".into()), EvalMode::Normal,
        )
        .unwrap();
        assert_eq!(v.as_i64(&types), 6);
    }

    #[test]
    fn test_compound_assignment() {
        let mut types = TypeTable::new();
        let (blocks, _) = fixture(&mut types);
        let mut ctx = TestCtx::new();
        ctx.store(0x1000, &10i32.to_le_bytes());
        let g = blocks.global_block();
        let e = Expr::AssignOp {
            op: BinOp::Add,
            target: Box::new(Expr::ident("g")),
            value: Box::new(Expr::int(5)),
        };
        let v = run(&mut types, &blocks, g, None, &mut ctx, &e, EvalMode::Normal).unwrap();
        assert_eq!(v.as_i64(&types), 15);
        assert_eq!(ctx.load(0x1000, 4), 15i32.to_le_bytes().to_vec());
    }
}
