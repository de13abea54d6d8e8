//! Execution engine: run control, breakpoints and stack unwinding on
//! top of a process-control backend.
//!
//! The [`target::Inferior`] trait abstracts the actual process.
//! [`session::Session`] owns one inferior plus the symbol tables and
//! drives the resume / wait / classify loop, deciding after every trap
//! whether the user should see a stop or the program should quietly
//! keep going.

pub mod breakpoints;
pub mod control;
pub mod error;
pub mod frames;
pub mod session;
pub mod signals;
pub mod target;
pub mod testing;

pub use breakpoints::{Breakpoint, BreakpointTable, BpKind, Disposition};
pub use control::{ExecState, StopReason};
pub use error::Error;
pub use frames::Frame;
pub use session::{Core, Session};
pub use signals::{SignalPolicy, SignalTable};
pub use target::{Arch, Inferior, TargetError, WaitStatus, AARCH64};
