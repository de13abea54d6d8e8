//! The evaluator's universal result: a C value and where it lives.
//!
//! A `Value` always carries its full logical contents in an inline
//! buffer, plus enough location information to write it back when it
//! is an lvalue. Values belong to a single evaluation: the engine
//! discards every outstanding `Value` on resume, since inferior memory
//! and registers may change under it.

use crate::context::EvalContext;
use crate::error::EvalError;
use symtab::{TypeCode, TypeId, TypeTable};

/// Where a value's storage is, if anywhere.
#[derive(Debug, Clone, PartialEq)]
pub enum Location {
    /// Synthesized; not assignable
    None,
    /// Inferior memory at this address
    Memory(u64),
    /// A register of the innermost frame
    Register(usize),
    /// A register as seen by a non-current frame
    FrameRegister { frame_base: u64, reg: usize },
    /// A debugger convenience variable
    Internal(String),
}

/// A C value produced by evaluation.
#[derive(Debug, Clone)]
pub struct Value {
    pub ty: TypeId,
    pub loc: Location,
    /// Byte offset from the location (struct member access)
    pub offset: i64,
    /// For bit-fields: bit offset within the byte at `offset`
    pub bitpos: u32,
    /// For bit-fields: width in bits; 0 means "whole bytes"
    pub bitsize: u32,
    /// The value's logical bytes, little-endian
    pub contents: Vec<u8>,
    /// Set on array-slice results (`x@n`): contents repeat n times
    pub repeat: Option<u32>,
}

impl Value {
    /// A zero-filled, locationless value of `ty`.
    pub fn zeroed(types: &TypeTable, ty: TypeId) -> Self {
        let len = types.get(ty).length;
        Self {
            ty,
            loc: Location::None,
            offset: 0,
            bitpos: 0,
            bitsize: 0,
            contents: vec![0; len],
            repeat: None,
        }
    }

    /// A constant integer value of `ty`.
    pub fn from_i64(types: &TypeTable, ty: TypeId, v: i64) -> Self {
        let len = types.get(ty).length.max(1);
        let mut value = Self::zeroed(types, ty);
        value.contents = pack_i64(v, len);
        value
    }

    /// A constant floating value of `ty` (float or double).
    pub fn from_f64(types: &TypeTable, ty: TypeId, v: f64) -> Self {
        let mut value = Self::zeroed(types, ty);
        value.contents = match types.get(ty).length {
            4 => (v as f32).to_le_bytes().to_vec(),
            _ => v.to_le_bytes().to_vec(),
        };
        value
    }

    /// Wrap inferior memory at `addr` as a value of `ty`, reading its
    /// contents now. A refused read fails with the faulting address.
    pub fn at(
        types: &TypeTable,
        ctx: &mut dyn EvalContext,
        addr: u64,
        ty: TypeId,
    ) -> Result<Self, EvalError> {
        let len = types.get(ty).length;
        let contents = ctx.read_memory(addr, len)?;
        Ok(Self {
            ty,
            loc: Location::Memory(addr),
            offset: 0,
            bitpos: 0,
            bitsize: 0,
            contents,
            repeat: None,
        })
    }

    /// The inferior address of this value, if it has one.
    pub fn address(&self) -> Result<u64, EvalError> {
        match self.loc {
            Location::Memory(addr) => Ok(addr.wrapping_add(self.offset as u64)),
            _ => Err(EvalError::NotAddressable),
        }
    }

    /// True when the value has assignable storage.
    pub fn is_lvalue(&self) -> bool {
        !matches!(self.loc, Location::None)
    }

    pub fn is_bitfield(&self) -> bool {
        self.bitsize != 0
    }

    /// The contents as a signed integer, sign- or zero-extending
    /// according to the type.
    pub fn as_i64(&self, types: &TypeTable) -> i64 {
        let ty = types.get(self.ty);
        match ty.code {
            TypeCode::Float => self.as_f64(types) as i64,
            _ => unpack_i64(&self.contents, ty.is_unsigned()),
        }
    }

    pub fn as_u64(&self, types: &TypeTable) -> u64 {
        let ty = types.get(self.ty);
        match ty.code {
            TypeCode::Float => self.as_f64(types) as u64,
            _ => unpack_u64(&self.contents),
        }
    }

    pub fn as_f64(&self, types: &TypeTable) -> f64 {
        let ty = types.get(self.ty);
        match ty.code {
            TypeCode::Float if ty.length == 4 => {
                let mut b = [0u8; 4];
                b.copy_from_slice(&self.contents[..4]);
                f32::from_le_bytes(b) as f64
            }
            TypeCode::Float => {
                let mut b = [0u8; 8];
                b.copy_from_slice(&self.contents[..8]);
                f64::from_le_bytes(b)
            }
            _ => {
                if ty.is_unsigned() {
                    self.as_u64(types) as f64
                } else {
                    self.as_i64(types) as f64
                }
            }
        }
    }

    /// True when the contents are all-zero (C truth test).
    pub fn is_zero(&self) -> bool {
        self.contents.iter().all(|&b| b == 0)
    }
}

/// Pack a signed integer into `len` little-endian bytes.
pub fn pack_i64(v: i64, len: usize) -> Vec<u8> {
    v.to_le_bytes()[..len.min(8)].to_vec()
}

/// Pack an unsigned integer into `len` little-endian bytes.
pub fn pack_u64(v: u64, len: usize) -> Vec<u8> {
    v.to_le_bytes()[..len.min(8)].to_vec()
}

/// Unpack little-endian bytes into a signed integer, sign-extending
/// unless `unsigned`.
pub fn unpack_i64(bytes: &[u8], unsigned: bool) -> i64 {
    let len = bytes.len().min(8);
    if len == 0 {
        return 0;
    }
    let mut buf = [0u8; 8];
    buf[..len].copy_from_slice(&bytes[..len]);
    let raw = u64::from_le_bytes(buf);
    if unsigned || len == 8 {
        raw as i64
    } else {
        // Sign-extend from the top bit of the value's width.
        let shift = 64 - len * 8;
        ((raw << shift) as i64) >> shift
    }
}

/// Unpack little-endian bytes into an unsigned integer.
pub fn unpack_u64(bytes: &[u8]) -> u64 {
    let len = bytes.len().min(8);
    let mut buf = [0u8; 8];
    buf[..len].copy_from_slice(&bytes[..len]);
    u64::from_le_bytes(buf)
}

/// Extract `bitsize` bits starting `bitpos` bits into `bytes`,
/// producing the field's logical bytes (`out_len` wide), sign-extended
/// when `signed`.
pub fn extract_bits(bytes: &[u8], bitpos: u32, bitsize: u32, out_len: usize, signed: bool) -> Vec<u8> {
    let raw = unpack_u64(bytes);
    let mask = if bitsize >= 64 { u64::MAX } else { (1u64 << bitsize) - 1 };
    let field = (raw >> bitpos) & mask;
    if signed && bitsize < 64 && (field >> (bitsize - 1)) & 1 == 1 {
        pack_i64((field | !mask) as i64, out_len)
    } else {
        pack_u64(field, out_len)
    }
}

/// Splice `bitsize` bits of `value` into `bytes` at `bitpos`,
/// returning the modified bytes (for bit-field read-modify-write).
pub fn insert_bits(bytes: &[u8], bitpos: u32, bitsize: u32, value: u64) -> Vec<u8> {
    let raw = unpack_u64(bytes);
    let mask = if bitsize >= 64 { u64::MAX } else { (1u64 << bitsize) - 1 };
    let merged = (raw & !(mask << bitpos)) | ((value & mask) << bitpos);
    pack_u64(merged, bytes.len())
}
