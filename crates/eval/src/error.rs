//! Evaluation errors. Each aborts only the evaluation that raised it.

use std::fmt;

/// Errors raised while evaluating an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    /// Name not found in the current scope
    UndefinedSymbol(String),
    /// A frame-relative symbol was referenced with no frame selected
    NoFrame(String),
    /// Cast between incompatible types
    BadCast { from: String, to: String },
    /// Address-of applied to a value with no memory location
    NotAddressable,
    /// Dereference of something that is not a pointer, array or integer
    NotAPointer(String),
    /// Member access on a non-struct/union value
    NotAnAggregate(String),
    /// Named member does not exist in the aggregate or its bases
    MemberNotFound { aggregate: String, member: String },
    /// Several members match and the arguments do not disambiguate
    AmbiguousMember(String),
    /// Call of a value that is not a function or function pointer
    NotCallable,
    /// Assignment target has no storage
    NotAnLvalue,
    /// A write or call was attempted in side-effect-free evaluation
    SideEffects,
    /// Operand types invalid for the operator
    InvalidOperands(&'static str),
    /// The inferior refused a memory access at this address
    Memory { addr: u64 },
    /// Failure reported by the process-control layer
    Target(String),
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::UndefinedSymbol(name) => {
                write!(f, "no symbol \"{}\" in current context", name)
            }
            EvalError::NoFrame(name) => {
                write!(f, "no frame selected for frame-relative symbol \"{}\"", name)
            }
            EvalError::BadCast { from, to } => {
                write!(f, "invalid cast from {} to {}", from, to)
            }
            EvalError::NotAddressable => {
                write!(f, "attempt to take address of value not located in memory")
            }
            EvalError::NotAPointer(what) => {
                write!(f, "attempt to dereference a value of type {}", what)
            }
            EvalError::NotAnAggregate(what) => {
                write!(f, "member access on non-struct value of type {}", what)
            }
            EvalError::MemberNotFound { aggregate, member } => {
                write!(f, "no member \"{}\" in {}", member, aggregate)
            }
            EvalError::AmbiguousMember(name) => {
                write!(f, "cannot resolve overloaded member \"{}\"", name)
            }
            EvalError::NotCallable => write!(f, "value is not callable"),
            EvalError::NotAnLvalue => {
                write!(f, "left operand of assignment is not an lvalue")
            }
            EvalError::SideEffects => {
                write!(f, "cannot modify the program in this context")
            }
            EvalError::InvalidOperands(op) => {
                write!(f, "invalid operands to {}", op)
            }
            EvalError::Memory { addr } => {
                write!(f, "cannot access memory at address {:#x}", addr)
            }
            EvalError::Target(msg) => write!(f, "target error: {}", msg),
        }
    }
}

impl std::error::Error for EvalError {}
