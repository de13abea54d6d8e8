//! Symbol and type model for the debugger engine.
//!
//! Passive description of the debuggee: C types, symbols, lexical
//! blocks and line tables. Built externally by an object-file reader
//! and consumed by the evaluator and the control loop. The only
//! mutation after construction is the lazy filling of the
//! pointer-to-type and function-returning-type caches.
//!
//! The main types are:
//! - [`TypeTable`] / [`TypeId`] - arena of C types addressed by handle
//! - [`Symbol`] - a named program entity with an address class
//! - [`BlockTable`] / [`Block`] - lexical scope tree with pc-range lookup
//! - [`LineTable`] - source line to address mapping and step ranges

pub mod block;
pub mod lines;
pub mod symbol;
pub mod types;

pub use block::{Block, BlockId, BlockTable};
pub use lines::{LineEntry, LineRange, LineTable};
pub use symbol::{AddressClass, Namespace, Symbol, SymbolId};
pub use types::{
    BaseClass, Builtins, Dispatch, Field, Method, Type, TypeCode, TypeFlags, TypeId, TypeTable,
};
