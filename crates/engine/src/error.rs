//! Engine errors.

use crate::target::TargetError;
use eval::EvalError;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The transport failed
    Target(TargetError),
    /// Expression evaluation failed
    Eval(EvalError),
    /// No live process to operate on
    NotRunning,
    /// Breakpoint number does not exist
    NoSuchBreakpoint(u32),
    /// Requested frame does not exist
    NoSuchFrame(u32),
    /// Source line has no code
    NoSuchLine(u32),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Target(e) => write!(f, "{}", e),
            Error::Eval(e) => write!(f, "{}", e),
            Error::NotRunning => write!(f, "the program is not being run"),
            Error::NoSuchBreakpoint(num) => write!(f, "no breakpoint number {}", num),
            Error::NoSuchFrame(level) => write!(f, "no frame at level {}", level),
            Error::NoSuchLine(line) => write!(f, "no code at line {}", line),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Target(e) => Some(e),
            Error::Eval(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TargetError> for Error {
    fn from(e: TargetError) -> Self {
        Error::Target(e)
    }
}

impl From<EvalError> for Error {
    fn from(e: EvalError) -> Self {
        Error::Eval(e)
    }
}

/// Map transport failures onto the evaluator's error space, keeping
/// the faulting address when there is one.
pub fn target_to_eval(e: TargetError) -> EvalError {
    match e {
        TargetError::Memory { addr } => EvalError::Memory { addr },
        other => EvalError::Target(other.to_string()),
    }
}
