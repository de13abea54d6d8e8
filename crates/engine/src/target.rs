//! The process-control seam and the per-architecture constants.
//!
//! [`Inferior`] is what the engine needs from a transport: memory,
//! registers, resume and wait. A ptrace backend, a remote-protocol
//! client and the scripted test inferior all fit behind it.

use std::fmt;

/// Why a wait returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// Stopped by a signal; the process still exists.
    Stopped(i32),
    /// Exited normally with this code.
    Exited(i32),
    /// Terminated by this signal.
    Signaled(i32),
}

/// Errors out of the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetError {
    /// A memory access the inferior refused
    Memory { addr: u64 },
    /// A register the transport does not have
    Register(usize),
    /// The process is gone or the transport failed
    Lost(String),
}

impl fmt::Display for TargetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetError::Memory { addr } => {
                write!(f, "cannot access memory at address {:#x}", addr)
            }
            TargetError::Register(reg) => write!(f, "no such register: {}", reg),
            TargetError::Lost(msg) => write!(f, "target lost: {}", msg),
        }
    }
}

impl std::error::Error for TargetError {}

/// Low-level control of one stopped-or-running process.
///
/// All calls except `resume` require the process to be stopped; the
/// engine guarantees that ordering.
pub trait Inferior {
    fn read_memory(&mut self, addr: u64, len: usize) -> Result<Vec<u8>, TargetError>;

    fn write_memory(&mut self, addr: u64, data: &[u8]) -> Result<(), TargetError>;

    fn read_register(&mut self, reg: usize) -> Result<u64, TargetError>;

    fn write_register(&mut self, reg: usize, value: u64) -> Result<(), TargetError>;

    /// Set the process running: one instruction when `step`, else
    /// freely. `signal` is delivered to the process on the way out.
    fn resume(&mut self, step: bool, signal: Option<i32>) -> Result<(), TargetError>;

    /// Block until the process stops again.
    fn wait(&mut self) -> Result<WaitStatus, TargetError>;

    fn kill(&mut self) -> Result<(), TargetError>;
}

/// Fixed per-architecture knowledge.
pub struct Arch {
    pub name: &'static str,
    /// The software breakpoint instruction, as written to memory.
    pub trap_insn: &'static [u8],
    /// How far past the trap the pc lands when the trap fires. The
    /// engine subtracts this to recover the breakpoint address.
    pub decr_pc_after_break: u64,
    pub pc_reg: usize,
    pub sp_reg: usize,
    pub fp_reg: usize,
    pub lr_reg: usize,
    /// Integer return value register
    pub ret_reg: usize,
    /// Struct-return address register
    pub struct_ret_reg: usize,
    /// Integer argument registers in order
    pub arg_regs: &'static [usize],
    pub num_regs: usize,
    pub reg_names: &'static [&'static str],
}

impl Arch {
    /// Map a register name to its index.
    pub fn register_named(&self, name: &str) -> Option<usize> {
        self.reg_names.iter().position(|&n| n == name)
    }
}

static AARCH64_REG_NAMES: [&str; 34] = [
    "x0", "x1", "x2", "x3", "x4", "x5", "x6", "x7", "x8", "x9", "x10", "x11", "x12", "x13",
    "x14", "x15", "x16", "x17", "x18", "x19", "x20", "x21", "x22", "x23", "x24", "x25", "x26",
    "x27", "x28", "fp", "lr", "sp", "pc", "cpsr",
];

/// aarch64: `brk #0`, pc stops on the trap itself.
pub static AARCH64: Arch = Arch {
    name: "aarch64",
    trap_insn: &[0x00, 0x00, 0x20, 0xd4],
    decr_pc_after_break: 0,
    pc_reg: 32,
    sp_reg: 31,
    fp_reg: 29,
    lr_reg: 30,
    ret_reg: 0,
    struct_ret_reg: 8,
    arg_regs: &[0, 1, 2, 3, 4, 5, 6, 7],
    num_regs: 34,
    reg_names: &AARCH64_REG_NAMES,
};
