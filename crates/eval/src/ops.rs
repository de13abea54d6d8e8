//! Value operations: casts, coercions, pointer arithmetic and the
//! numeric operator core.
//!
//! These follow C semantics: arrays decay to pointers exactly once
//! per arithmetic or coercion context (the evaluator never applies
//! the decay to an assignment target), pointer±integer scales by the
//! pointee size, and mixed-type arithmetic promotes to double,
//! unsigned-widest or signed-widest in that order.

use crate::context::EvalContext;
use crate::error::EvalError;
use crate::expr::{BinOp, UnOp};
use crate::value::{pack_i64, pack_u64, unpack_u64, Location, Value};
use symtab::{TypeCode, TypeId, TypeTable};

fn type_name(types: &TypeTable, id: TypeId) -> String {
    let ty = types.get(id);
    match &ty.name {
        Some(name) => name.clone(),
        None => format!("{:?}", ty.code),
    }
}

/// Decay an array to a pointer to its first element, and a function
/// value to a pointer to the function. Anything else passes through.
pub fn coerce_array(types: &mut TypeTable, v: Value) -> Result<Value, EvalError> {
    let stripped = types.strip_refs(v.ty);
    match types.get(stripped).code {
        TypeCode::Array => {
            let elem = types.get(stripped).target.ok_or(EvalError::NotAddressable)?;
            let addr = v.address()?;
            let ptr_ty = types.pointer_to(elem);
            let mut p = Value::zeroed(types, ptr_ty);
            p.contents = pack_u64(addr, 8);
            Ok(p)
        }
        TypeCode::Func => {
            let addr = match v.address() {
                Ok(a) => a,
                // Function symbols carry their entry address as contents.
                Err(_) => unpack_u64(&v.contents),
            };
            let ptr_ty = types.pointer_to(stripped);
            let mut p = Value::zeroed(types, ptr_ty);
            p.contents = pack_u64(addr, 8);
            Ok(p)
        }
        _ => Ok(v),
    }
}

/// Cast `v` to `to`: numeric conversion between scalars, byte
/// reinterpretation when lengths match, or a re-read from the same
/// address under the new type for memory lvalues.
pub fn value_cast(
    types: &mut TypeTable,
    ctx: &mut dyn EvalContext,
    v: Value,
    to: TypeId,
) -> Result<Value, EvalError> {
    if v.ty == to {
        return Ok(v);
    }
    let to_code = types.get(to).code;
    let from_stripped = types.strip_refs(v.ty);
    let from_code = types.get(from_stripped).code;

    let scalar = |code: TypeCode| {
        matches!(code, TypeCode::Int | TypeCode::Float | TypeCode::Ptr | TypeCode::Enum)
    };

    // Scalar-to-scalar: numeric conversion.
    if scalar(to_code) && (scalar(from_code) || from_code == TypeCode::Array) {
        let v = coerce_array(types, v)?;
        return Ok(match to_code {
            TypeCode::Float => Value::from_f64(types, to, v.as_f64(types)),
            _ => {
                if types.get(v.ty).is_unsigned() {
                    let mut out = Value::zeroed(types, to);
                    let len = types.get(to).length.max(1);
                    out.contents = pack_u64(v.as_u64(types), len);
                    out
                } else {
                    Value::from_i64(types, to, v.as_i64(types))
                }
            }
        });
    }

    // Same length: reinterpret the bytes, keeping the location.
    if types.get(to).length == types.get(from_stripped).length {
        let mut out = v;
        out.ty = to;
        return Ok(out);
    }

    // Memory lvalue: re-read the same address under the new type.
    if let Ok(addr) = v.address() {
        return Value::at(types, ctx, addr, to);
    }

    Err(EvalError::BadCast {
        from: type_name(types, v.ty),
        to: type_name(types, to),
    })
}

/// Dereference: pointers and arrays by type, integers as raw
/// addresses. Anything else is an error.
pub fn value_ind(
    types: &mut TypeTable,
    ctx: &mut dyn EvalContext,
    v: Value,
) -> Result<Value, EvalError> {
    let stripped = types.strip_refs(v.ty);
    let ty = types.get(stripped);
    match ty.code {
        TypeCode::Ptr => {
            let target = ty.target.unwrap_or(types.builtins().void);
            let addr = unpack_u64(&v.contents);
            Value::at(types, ctx, addr, target)
        }
        TypeCode::Array => {
            let elem = ty.target.ok_or_else(|| EvalError::NotAPointer(type_name(types, v.ty)))?;
            let addr = v.address()?;
            Value::at(types, ctx, addr, elem)
        }
        TypeCode::Int => {
            // Historical C-debugger behavior: *int treats the value as
            // an address of int.
            let int = types.builtins().int;
            let addr = v.as_u64(types);
            Value::at(types, ctx, addr, int)
        }
        _ => Err(EvalError::NotAPointer(type_name(types, v.ty))),
    }
}

/// Take the address of a memory-resident value.
pub fn value_addr(types: &mut TypeTable, v: &Value) -> Result<Value, EvalError> {
    let addr = v.address()?;
    let ptr_ty = types.pointer_to(v.ty);
    let mut out = Value::zeroed(types, ptr_ty);
    out.contents = pack_u64(addr, 8);
    Ok(out)
}

fn pointee_size(types: &TypeTable, ptr: TypeId) -> usize {
    let size = types
        .get(ptr)
        .target
        .map(|t| types.get(t).length)
        .unwrap_or(1);
    // void* and incomplete pointees step by one byte.
    if size == 0 {
        1
    } else {
        size
    }
}

fn is_pointer(types: &TypeTable, v: &Value) -> bool {
    types.get(types.strip_refs(v.ty)).code == TypeCode::Ptr
}

/// `a + b` with the pointer+integer special case ahead of numeric
/// dispatch. Operands must already be array-coerced.
pub fn value_add(types: &TypeTable, a: Value, b: Value) -> Result<Value, EvalError> {
    match (is_pointer(types, &a), is_pointer(types, &b)) {
        (true, false) => ptr_offset(types, a, b, 1),
        (false, true) => ptr_offset(types, b, a, 1),
        (true, true) => Err(EvalError::InvalidOperands("+")),
        (false, false) => numeric_binop(types, BinOp::Add, &a, &b),
    }
}

/// `a - b`: pointer−pointer of identical type yields a scaled
/// integer, pointer−integer mirrors pointer+integer.
pub fn value_sub(types: &TypeTable, a: Value, b: Value) -> Result<Value, EvalError> {
    match (is_pointer(types, &a), is_pointer(types, &b)) {
        (true, true) => {
            let ta = types.get(types.strip_refs(a.ty)).target;
            let tb = types.get(types.strip_refs(b.ty)).target;
            if ta != tb {
                return Err(EvalError::InvalidOperands("-"));
            }
            let size = pointee_size(types, types.strip_refs(a.ty)) as i64;
            let diff = unpack_u64(&a.contents) as i64 - unpack_u64(&b.contents) as i64;
            Ok(Value::from_i64(types, types.builtins().long, diff / size))
        }
        (true, false) => ptr_offset(types, a, b, -1),
        (false, true) => Err(EvalError::InvalidOperands("-")),
        (false, false) => numeric_binop(types, BinOp::Sub, &a, &b),
    }
}

/// Pointer ± integer: scale the integer by the pointee size, keep the
/// pointer's type. The result is no longer an lvalue.
fn ptr_offset(types: &TypeTable, ptr: Value, n: Value, sign: i64) -> Result<Value, EvalError> {
    let n_ty = types.get(types.strip_refs(n.ty));
    if !n_ty.is_integral() {
        return Err(EvalError::InvalidOperands("pointer arithmetic"));
    }
    let size = pointee_size(types, types.strip_refs(ptr.ty)) as i64;
    let delta = sign * n.as_i64(types) * size;
    let addr = unpack_u64(&ptr.contents).wrapping_add(delta as u64);
    let mut out = ptr;
    out.loc = Location::None;
    out.offset = 0;
    out.contents = pack_u64(addr, 8);
    Ok(out)
}

/// The promoted arithmetic class of one operand.
enum Arith {
    F(f64),
    U(u64),
    S(i64),
}

fn arith_kind(types: &TypeTable, v: &Value) -> Result<Arith, EvalError> {
    let ty = types.get(types.strip_refs(v.ty));
    match ty.code {
        TypeCode::Float => Ok(Arith::F(v.as_f64(types))),
        TypeCode::Int | TypeCode::Enum => {
            if ty.is_unsigned() {
                Ok(Arith::U(v.as_u64(types)))
            } else {
                Ok(Arith::S(v.as_i64(types)))
            }
        }
        TypeCode::Ptr => Ok(Arith::U(unpack_u64(&v.contents))),
        _ => Err(EvalError::InvalidOperands("arithmetic")),
    }
}

/// Widest-int width of the platform (bytes).
const WIDEST_INT: usize = 8;

/// Numeric binary operation with C promotion: both-float widens to
/// double; else an unsigned operand at least as wide as the widest
/// integer forces unsigned-widest rules; else signed-widest.
/// Comparisons yield a plain int 0 or 1.
pub fn numeric_binop(
    types: &TypeTable,
    op: BinOp,
    a: &Value,
    b: &Value,
) -> Result<Value, EvalError> {
    let ka = arith_kind(types, a)?;
    let kb = arith_kind(types, b)?;
    let b_builtins = types.builtins();

    // Floating path: widen both to double.
    if matches!(ka, Arith::F(_)) || matches!(kb, Arith::F(_)) {
        let x = a.as_f64(types);
        let y = b.as_f64(types);
        if op.is_comparison() {
            return Ok(Value::from_i64(types, b_builtins.int, compare_f64(op, x, y)));
        }
        let r = match op {
            BinOp::Add => x + y,
            BinOp::Sub => x - y,
            BinOp::Mul => x * y,
            BinOp::Div => x / y,
            BinOp::Rem => x % y,
            _ => return Err(EvalError::InvalidOperands("floating operator")),
        };
        return Ok(Value::from_f64(types, b_builtins.double, r));
    }

    let unsigned_wide = |v: &Value, k: &Arith| {
        matches!(k, Arith::U(_)) && types.get(types.strip_refs(v.ty)).length >= WIDEST_INT
    };

    if unsigned_wide(a, &ka) || unsigned_wide(b, &kb) {
        let x = a.as_u64(types);
        let y = b.as_u64(types);
        if op.is_comparison() {
            return Ok(Value::from_i64(types, b_builtins.int, compare_ord(op, x.cmp(&y))));
        }
        let r = match op {
            BinOp::Add => x.wrapping_add(y),
            BinOp::Sub => x.wrapping_sub(y),
            BinOp::Mul => x.wrapping_mul(y),
            BinOp::Div => x / y,
            BinOp::Rem => x % y,
            BinOp::LShift => x << (y & 63),
            BinOp::RShift => x >> (y & 63),
            BinOp::BitAnd => x & y,
            BinOp::BitOr => x | y,
            BinOp::BitXor => x ^ y,
            _ => unreachable!(),
        };
        let mut out = Value::zeroed(types, b_builtins.unsigned_long_long);
        out.contents = pack_u64(r, 8);
        return Ok(out);
    }

    let x = a.as_i64(types);
    let y = b.as_i64(types);
    if op.is_comparison() {
        return Ok(Value::from_i64(types, b_builtins.int, compare_ord(op, x.cmp(&y))));
    }
    let r = match op {
        BinOp::Add => x.wrapping_add(y),
        BinOp::Sub => x.wrapping_sub(y),
        BinOp::Mul => x.wrapping_mul(y),
        // Host-native division: div/rem by zero panics like any Rust
        // integer division.
        BinOp::Div => x / y,
        BinOp::Rem => x % y,
        BinOp::LShift => x << (y & 63),
        BinOp::RShift => x >> (y & 63),
        BinOp::BitAnd => x & y,
        BinOp::BitOr => x | y,
        BinOp::BitXor => x ^ y,
        _ => unreachable!(),
    };
    let mut out = Value::zeroed(types, b_builtins.long_long);
    out.contents = pack_i64(r, 8);
    Ok(out)
}

fn compare_ord(op: BinOp, ord: std::cmp::Ordering) -> i64 {
    use std::cmp::Ordering::*;
    let hit = match op {
        BinOp::Eq => ord == Equal,
        BinOp::NotEq => ord != Equal,
        BinOp::Less => ord == Less,
        BinOp::LessEq => ord != Greater,
        BinOp::Greater => ord == Greater,
        BinOp::GreaterEq => ord != Less,
        _ => unreachable!(),
    };
    hit as i64
}

fn compare_f64(op: BinOp, x: f64, y: f64) -> i64 {
    let hit = match op {
        BinOp::Eq => x == y,
        BinOp::NotEq => x != y,
        BinOp::Less => x < y,
        BinOp::LessEq => x <= y,
        BinOp::Greater => x > y,
        BinOp::GreaterEq => x >= y,
        _ => unreachable!(),
    };
    hit as i64
}

/// Unary operators.
pub fn unop(types: &TypeTable, op: UnOp, v: &Value) -> Result<Value, EvalError> {
    let builtins = types.builtins();
    match op {
        UnOp::LogicalNot => Ok(Value::from_i64(types, builtins.int, v.is_zero() as i64)),
        UnOp::Plus => {
            arith_kind(types, v)?;
            Ok(v.clone())
        }
        UnOp::Neg => match arith_kind(types, v)? {
            Arith::F(x) => Ok(Value::from_f64(types, builtins.double, -x)),
            Arith::U(x) => {
                let mut out = Value::zeroed(types, builtins.unsigned_long_long);
                out.contents = pack_u64(x.wrapping_neg(), 8);
                Ok(out)
            }
            Arith::S(x) => Ok(Value::from_i64(types, builtins.long_long, x.wrapping_neg())),
        },
        UnOp::BitNot => match arith_kind(types, v)? {
            Arith::F(_) => Err(EvalError::InvalidOperands("~")),
            Arith::U(x) => {
                let mut out = Value::zeroed(types, builtins.unsigned_long_long);
                out.contents = pack_u64(!x, 8);
                Ok(out)
            }
            Arith::S(x) => Ok(Value::from_i64(types, builtins.long_long, !x)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{CallArg, CallResult};
    use std::collections::HashMap;

    /// Bare-bones context over a flat memory image.
    pub struct MemCtx {
        pub mem: HashMap<u64, u8>,
    }

    impl MemCtx {
        pub fn new() -> Self {
            Self { mem: HashMap::new() }
        }

        pub fn store(&mut self, addr: u64, bytes: &[u8]) {
            for (i, &b) in bytes.iter().enumerate() {
                self.mem.insert(addr + i as u64, b);
            }
        }
    }

    impl EvalContext for MemCtx {
        fn read_memory(&mut self, addr: u64, len: usize) -> Result<Vec<u8>, EvalError> {
            (0..len)
                .map(|i| {
                    self.mem
                        .get(&(addr + i as u64))
                        .copied()
                        .ok_or(EvalError::Memory { addr })
                })
                .collect()
        }

        fn write_memory(&mut self, addr: u64, data: &[u8]) -> Result<(), EvalError> {
            self.store(addr, data);
            Ok(())
        }

        fn read_register(&mut self, _reg: usize) -> Result<u64, EvalError> {
            Ok(0)
        }

        fn write_register(&mut self, _reg: usize, _value: u64) -> Result<(), EvalError> {
            Ok(())
        }

        fn frame_register(&mut self, _frame_base: u64, _reg: usize) -> Result<u64, EvalError> {
            Ok(0)
        }

        fn register_by_name(&self, _name: &str) -> Option<usize> {
            None
        }

        fn internal_var(&mut self, _name: &str) -> Option<Value> {
            None
        }

        fn set_internal_var(&mut self, _name: &str, _value: &Value) {}

        fn call_function(
            &mut self,
            _addr: u64,
            _args: &[CallArg],
            _return_len: usize,
        ) -> Result<CallResult, EvalError> {
            Err(EvalError::Target("no call support in MemCtx".into()))
        }
    }

    fn ptr_value(types: &mut TypeTable, pointee: TypeId, addr: u64) -> Value {
        let pt = types.pointer_to(pointee);
        let mut v = Value::zeroed(types, pt);
        v.contents = pack_u64(addr, 8);
        v
    }

    #[test]
    fn test_pointer_plus_integer_scales() {
        let mut types = TypeTable::new();
        let int = types.builtins().int;
        let p = ptr_value(&mut types, int, 0x1000);
        let n = Value::from_i64(&types, int, 3);
        let r = value_add(&types, p.clone(), n).unwrap();
        assert_eq!(unpack_u64(&r.contents), 0x1000 + 3 * 4);
        assert_eq!(r.ty, p.ty);
    }

    #[test]
    fn test_integer_plus_pointer_commutes() {
        let mut types = TypeTable::new();
        let int = types.builtins().int;
        let p = ptr_value(&mut types, int, 0x1000);
        let n = Value::from_i64(&types, int, 2);
        let r = value_add(&types, n, p.clone()).unwrap();
        assert_eq!(unpack_u64(&r.contents), 0x1008);
    }

    #[test]
    fn test_pointer_minus_pointer() {
        let mut types = TypeTable::new();
        let int = types.builtins().int;
        let a = ptr_value(&mut types, int, 0x1010);
        let b = ptr_value(&mut types, int, 0x1000);
        let r = value_sub(&types, a, b).unwrap();
        assert_eq!(r.as_i64(&types), 4);
    }

    #[test]
    fn test_pointer_minus_mismatched_pointer_fails() {
        let mut types = TypeTable::new();
        let int = types.builtins().int;
        let ch = types.builtins().char;
        let a = ptr_value(&mut types, int, 0x1010);
        let b = ptr_value(&mut types, ch, 0x1000);
        assert!(value_sub(&types, a, b).is_err());
    }

    #[test]
    fn test_void_pointer_steps_by_one() {
        let mut types = TypeTable::new();
        let void = types.builtins().void;
        let int = types.builtins().int;
        let p = ptr_value(&mut types, void, 0x1000);
        let n = Value::from_i64(&types, int, 5);
        let r = value_add(&types, p, n).unwrap();
        assert_eq!(unpack_u64(&r.contents), 0x1005);
    }

    #[test]
    fn test_comparison_yields_plain_int() {
        let types = TypeTable::new();
        let int = types.builtins().int;
        let a = Value::from_i64(&types, int, 4);
        let b = Value::from_i64(&types, int, 5);
        let r = numeric_binop(&types, BinOp::Less, &a, &b).unwrap();
        assert_eq!(r.ty, int);
        assert_eq!(r.as_i64(&types), 1);
        let r = numeric_binop(&types, BinOp::Eq, &a, &b).unwrap();
        assert_eq!(r.as_i64(&types), 0);
    }

    #[test]
    fn test_float_promotion() {
        let types = TypeTable::new();
        let int = types.builtins().int;
        let double = types.builtins().double;
        let a = Value::from_i64(&types, int, 3);
        let b = Value::from_f64(&types, double, 0.5);
        let r = numeric_binop(&types, BinOp::Add, &a, &b).unwrap();
        assert_eq!(r.ty, double);
        assert_eq!(r.as_f64(&types), 3.5);
    }

    #[test]
    fn test_unsigned_wide_promotion() {
        let types = TypeTable::new();
        let b = types.builtins();
        // unsigned long is as wide as the widest int: unsigned rules.
        let x = Value::from_i64(&types, b.unsigned_long, -1);
        let y = Value::from_i64(&types, b.int, 1);
        let r = numeric_binop(&types, BinOp::Greater, &x, &y).unwrap();
        assert_eq!(r.as_i64(&types), 1); // u64::MAX > 1

        // unsigned int is narrower than the widest int: signed rules.
        let x = Value::from_i64(&types, b.unsigned_int, 7);
        let y = Value::from_i64(&types, b.int, -1);
        let r = numeric_binop(&types, BinOp::Greater, &x, &y).unwrap();
        assert_eq!(r.as_i64(&types), 1); // 7 > -1 under signed rules
    }

    #[test]
    fn test_cast_numeric() {
        let mut types = TypeTable::new();
        let mut ctx = MemCtx::new();
        let b = *types.builtins();
        let v = Value::from_f64(&types, b.double, 3.75);
        let r = value_cast(&mut types, &mut ctx, v, b.int).unwrap();
        assert_eq!(r.as_i64(&types), 3);
        let v = Value::from_i64(&types, b.char, -1);
        let r = value_cast(&mut types, &mut ctx, v, b.unsigned_int).unwrap();
        assert_eq!(r.as_u64(&types), 0xffff_ffff);
    }

    #[test]
    fn test_cast_lvalue_rereads_memory() {
        let mut types = TypeTable::new();
        let mut ctx = MemCtx::new();
        ctx.store(0x100, &[0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88]);
        let agg = types.new_aggregate(TypeCode::Struct, "s2", 2, vec![], vec![], vec![], None);
        let big = types.new_aggregate(TypeCode::Struct, "s8", 8, vec![], vec![], vec![], None);
        let v = Value::at(&types, &mut ctx, 0x100, agg).unwrap();
        assert_eq!(v.contents.len(), 2);
        let r = value_cast(&mut types, &mut ctx, v, big).unwrap();
        assert_eq!(r.contents.len(), 8);
        assert_eq!(unpack_u64(&r.contents), 0x8877_6655_4433_2211);
    }

    #[test]
    fn test_deref_pointer() {
        let mut types = TypeTable::new();
        let mut ctx = MemCtx::new();
        ctx.store(0x2000, &42i32.to_le_bytes());
        let int = types.builtins().int;
        let p = ptr_value(&mut types, int, 0x2000);
        let r = value_ind(&mut types, &mut ctx, p).unwrap();
        assert_eq!(r.as_i64(&types), 42);
        assert_eq!(r.loc, Location::Memory(0x2000));
    }

    #[test]
    fn test_deref_non_pointer_fails() {
        let mut types = TypeTable::new();
        let mut ctx = MemCtx::new();
        let double = types.builtins().double;
        let v = Value::from_f64(&types, double, 1.0);
        assert!(matches!(
            value_ind(&mut types, &mut ctx, v),
            Err(EvalError::NotAPointer(_))
        ));
    }

    #[test]
    fn test_addr_of_requires_memory() {
        let mut types = TypeTable::new();
        let int = types.builtins().int;
        let v = Value::from_i64(&types, int, 1);
        assert!(matches!(
            value_addr(&mut types, &v),
            Err(EvalError::NotAddressable)
        ));

        let mut v = Value::from_i64(&types, int, 1);
        v.loc = Location::Memory(0x40);
        let p = value_addr(&mut types, &v).unwrap();
        assert_eq!(unpack_u64(&p.contents), 0x40);
        assert_eq!(types.get(p.ty).code, TypeCode::Ptr);
    }

    #[test]
    fn test_array_decay_once() {
        let mut types = TypeTable::new();
        let mut ctx = MemCtx::new();
        ctx.store(0x3000, &[1, 0, 0, 0, 2, 0, 0, 0]);
        let int = types.builtins().int;
        let arr_ty = types.new_array(int, 2);
        let arr = Value::at(&types, &mut ctx, 0x3000, arr_ty).unwrap();
        let p = coerce_array(&mut types, arr).unwrap();
        assert_eq!(types.get(p.ty).code, TypeCode::Ptr);
        assert_eq!(types.get(p.ty).target, Some(int));
        assert_eq!(unpack_u64(&p.contents), 0x3000);
        // A second coercion is the identity: already a pointer.
        let p2 = coerce_array(&mut types, p.clone()).unwrap();
        assert_eq!(p2.ty, p.ty);
        assert_eq!(p2.contents, p.contents);
    }

    #[test]
    fn test_unop_neg_and_not() {
        let types = TypeTable::new();
        let int = types.builtins().int;
        let v = Value::from_i64(&types, int, 5);
        assert_eq!(unop(&types, UnOp::Neg, &v).unwrap().as_i64(&types), -5);
        assert_eq!(unop(&types, UnOp::LogicalNot, &v).unwrap().as_i64(&types), 0);
        let z = Value::from_i64(&types, int, 0);
        assert_eq!(unop(&types, UnOp::LogicalNot, &z).unwrap().as_i64(&types), 1);
        assert_eq!(unop(&types, UnOp::BitNot, &v).unwrap().as_i64(&types), !5);
    }
}
