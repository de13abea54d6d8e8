//! Symbols: named program entities with an address class.

use crate::block::BlockId;
use crate::types::TypeId;

/// Stable handle into the symbol arena owned by [`crate::BlockTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(pub u32);

/// Which name space a symbol lives in. C keeps ordinary names, struct
/// tags and goto labels in separate spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    /// Variables, functions, typedef names
    Var,
    /// struct/union/enum tags
    StructTag,
    /// goto labels
    Label,
}

/// Where a symbol's value lives and how to interpret it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AddressClass {
    /// Integer constant known at symbol-read time (enum values etc.)
    Const(i64),
    /// Floating constant
    ConstFloat(f64),
    /// Fixed address in the inferior
    Static(u64),
    /// Lives in a machine register
    Register(usize),
    /// Argument at a byte offset from the frame base
    Arg(i64),
    /// Local at a byte offset from the frame base
    Local(i64),
    /// Function entry; the block is the function's body scope
    Function(BlockId),
    /// A type name; the symbol's type is the definition
    Typedef,
}

/// A symbol. Immutable after the symbol reader creates it.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub namespace: Namespace,
    pub class: AddressClass,
    pub ty: TypeId,
}

impl Symbol {
    pub fn new(name: &str, namespace: Namespace, class: AddressClass, ty: TypeId) -> Self {
        Self { name: name.into(), namespace, class, ty }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_construction() {
        let sym = Symbol::new("x", Namespace::Var, AddressClass::Static(0x1000), TypeId(3));
        assert_eq!(sym.name, "x");
        assert_eq!(sym.namespace, Namespace::Var);
        assert_eq!(sym.class, AddressClass::Static(0x1000));
        assert_eq!(sym.ty, TypeId(3));
    }

    #[test]
    fn test_address_class_variants() {
        assert_ne!(AddressClass::Const(0), AddressClass::Static(0));
        assert_eq!(AddressClass::Local(-8), AddressClass::Local(-8));
        assert_ne!(AddressClass::Arg(16), AddressClass::Local(16));
    }
}
