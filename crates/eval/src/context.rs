//! The seam between the evaluator and process control.
//!
//! The evaluator never talks to the transport directly; everything it
//! needs from the inferior comes through [`EvalContext`]. The engine
//! implements this over its session so that a function call evaluated
//! here re-enters the engine's resume/wait cycle with proper state
//! saving.

use crate::error::EvalError;
use crate::value::Value;

/// One argument for a call into the inferior, already coerced and
/// packed to the value's in-memory representation.
#[derive(Debug, Clone)]
pub struct CallArg {
    pub bytes: Vec<u8>,
}

/// What a call into the inferior produced.
#[derive(Debug, Clone)]
pub struct CallResult {
    /// The return value's bytes. When `struct_return` is set the
    /// callee wrote into caller-allocated storage and these bytes were
    /// read back from it.
    pub bytes: Vec<u8>,
    pub struct_return: bool,
}

/// Access to the inferior for the duration of one evaluation.
pub trait EvalContext {
    /// Read `len` bytes. Refusal surfaces as `EvalError::Memory`
    /// naming the address.
    fn read_memory(&mut self, addr: u64, len: usize) -> Result<Vec<u8>, EvalError>;

    fn write_memory(&mut self, addr: u64, data: &[u8]) -> Result<(), EvalError>;

    /// Read a register of the innermost frame.
    fn read_register(&mut self, reg: usize) -> Result<u64, EvalError>;

    fn write_register(&mut self, reg: usize, value: u64) -> Result<(), EvalError>;

    /// Read a register as seen by the frame at `frame_base`.
    fn frame_register(&mut self, frame_base: u64, reg: usize) -> Result<u64, EvalError>;

    /// Map a register name (`pc`, `x0`, ...) to its index.
    fn register_by_name(&self, name: &str) -> Option<usize>;

    /// Look up a debugger convenience variable.
    fn internal_var(&mut self, name: &str) -> Option<Value>;

    fn set_internal_var(&mut self, name: &str, value: &Value);

    /// Run `addr` in the inferior with the given arguments and return
    /// the produced bytes. `return_len` is the byte length of the
    /// callee's return type, so the implementation can decide on a
    /// caller-allocated struct return. The implementation pushes a
    /// synthetic return frame, runs to it, and restores all in-flight
    /// execution state around the nested run.
    fn call_function(
        &mut self,
        addr: u64,
        args: &[CallArg],
        return_len: usize,
    ) -> Result<CallResult, EvalError>;
}
