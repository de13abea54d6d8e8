//! Expression evaluation against a live inferior.
//!
//! Walks an owned expression tree with C value semantics: promotion
//! and pointer arithmetic, struct and member access (including
//! virtual dispatch), lvalue coercions, assignment and in-inferior
//! function calls. Process access goes through the [`EvalContext`]
//! seam; the symbol and type model comes from `symtab`.
//!
//! The main types are:
//! - [`Value`] - a tagged result denoting a C value and where it lives
//! - [`Expr`] - the parsed expression tree
//! - [`Evaluator`] - the recursive walker, with an [`EvalMode`] for
//!   skip and side-effect-free evaluation

pub mod context;
pub mod error;
pub mod eval;
pub mod expr;
pub mod ops;
pub mod value;

pub use context::{CallArg, CallResult, EvalContext};
pub use error::EvalError;
pub use eval::{EvalMode, Evaluator};
pub use expr::{BinOp, Expr, UnOp};
pub use value::{Location, Value};
