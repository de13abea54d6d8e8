//! A scripted inferior for tests: a tiny fixed-width instruction set
//! over flat memory, enough to exercise breakpoints, stepping, frame
//! chains and in-inferior calls without a real process.
//!
//! Instructions are 4-byte words, opcode in byte 0:
//!
//! | word                | meaning                                    |
//! |---------------------|--------------------------------------------|
//! | `nop()`             | pc += 4                                    |
//! | `movi(r, imm)`      | reg r = imm                                |
//! | `addi(r, imm)`      | reg r += imm                               |
//! | `bl(addr)`          | lr = pc + 4; pc = addr                     |
//! | `ret()`             | pc = lr                                    |
//! | `enter()`           | push fp and lr as a frame record, fp = sp  |
//! | `leave()`           | undo `enter`                               |
//! | `halt(code)`        | process exits with code                    |
//! | `store(r, addr)`    | 8-byte store of reg r                      |
//! | `load(r, addr)`     | 8-byte load into reg r                     |
//! | `stind(rs, rd)`     | 8-byte store of reg rs to [reg rd]         |
//!
//! The architecture's trap instruction stops with SIGTRAP, advancing
//! the pc by `decr_pc_after_break` just like the real thing.

use std::collections::VecDeque;

use crate::signals::{SIGILL, SIGSEGV, SIGTRAP};
use crate::target::{Arch, Inferior, TargetError, WaitStatus};

/// Variant architecture whose trap leaves the pc past the trap, for
/// exercising the pc-correction path.
pub static DECR_ARCH: Arch = Arch {
    name: "fake-decr",
    trap_insn: &[0xcc, 0xcc, 0xcc, 0xcc],
    decr_pc_after_break: 4,
    pc_reg: 32,
    sp_reg: 31,
    fp_reg: 29,
    lr_reg: 30,
    ret_reg: 0,
    struct_ret_reg: 8,
    arg_regs: &[0, 1, 2, 3, 4, 5, 6, 7],
    num_regs: 34,
    reg_names: &[
        "x0", "x1", "x2", "x3", "x4", "x5", "x6", "x7", "x8", "x9", "x10", "x11", "x12", "x13",
        "x14", "x15", "x16", "x17", "x18", "x19", "x20", "x21", "x22", "x23", "x24", "x25",
        "x26", "x27", "x28", "fp", "lr", "sp", "pc", "cpsr",
    ],
};

pub fn nop() -> [u8; 4] {
    [0x00, 0, 0, 0]
}

pub fn movi(reg: u8, imm: u16) -> [u8; 4] {
    let b = imm.to_le_bytes();
    [0x01, reg, b[0], b[1]]
}

pub fn addi(reg: u8, imm: u16) -> [u8; 4] {
    let b = imm.to_le_bytes();
    [0x02, reg, b[0], b[1]]
}

pub fn bl(addr: u16) -> [u8; 4] {
    let b = addr.to_le_bytes();
    [0x03, 0, b[0], b[1]]
}

pub fn ret() -> [u8; 4] {
    [0x04, 0, 0, 0]
}

pub fn enter() -> [u8; 4] {
    [0x05, 0, 0, 0]
}

pub fn leave() -> [u8; 4] {
    [0x06, 0, 0, 0]
}

pub fn halt(code: u8) -> [u8; 4] {
    [0x07, code, 0, 0]
}

pub fn store(reg: u8, addr: u16) -> [u8; 4] {
    let b = addr.to_le_bytes();
    [0x08, reg, b[0], b[1]]
}

pub fn load(reg: u8, addr: u16) -> [u8; 4] {
    let b = addr.to_le_bytes();
    [0x09, reg, b[0], b[1]]
}

pub fn stind(src: u8, dst: u8) -> [u8; 4] {
    [0x0a, src, dst, 0]
}

const MEM_SIZE: usize = 0x10000;
const RUN_LIMIT: usize = 200_000;

/// The scripted process.
pub struct FakeInferior {
    pub arch: &'static Arch,
    pub mem: Vec<u8>,
    pub regs: [u64; 34],
    /// Instructions executed so far.
    pub insn_count: usize,
    /// Debugger-initiated memory writes: (addr, len).
    pub mem_writes: Vec<(u64, usize)>,
    /// Signals the debugger asked to deliver on resume.
    pub delivered: Vec<i32>,
    queued: VecDeque<i32>,
    status: Option<WaitStatus>,
    alive: bool,
}

impl FakeInferior {
    pub fn new(arch: &'static Arch) -> Self {
        let mut fake = Self {
            arch,
            mem: vec![0; MEM_SIZE],
            regs: [0; 34],
            insn_count: 0,
            mem_writes: Vec::new(),
            delivered: Vec::new(),
            queued: VecDeque::new(),
            status: None,
            alive: true,
        };
        fake.regs[arch.sp_reg] = 0xe000;
        fake.regs[arch.fp_reg] = 0xe000;
        fake
    }

    pub fn load_program(&mut self, addr: u64, words: &[[u8; 4]]) {
        for (i, word) in words.iter().enumerate() {
            let a = addr as usize + i * 4;
            self.mem[a..a + 4].copy_from_slice(word);
        }
        self.regs[self.arch.pc_reg] = addr;
    }

    /// Queue a signal that arrives at the next resume.
    pub fn queue_signal(&mut self, sig: i32) {
        self.queued.push_back(sig);
    }

    fn get_u64(&self, addr: u64) -> u64 {
        let a = addr as usize;
        let mut b = [0u8; 8];
        b.copy_from_slice(&self.mem[a..a + 8]);
        u64::from_le_bytes(b)
    }

    fn put_u64(&mut self, addr: u64, v: u64) {
        let a = addr as usize;
        self.mem[a..a + 8].copy_from_slice(&v.to_le_bytes());
    }

    /// Execute one instruction. `None` means "keep running".
    fn exec_one(&mut self) -> Option<WaitStatus> {
        let pc = self.regs[self.arch.pc_reg];
        let a = pc as usize;
        if a + 4 > self.mem.len() {
            return Some(WaitStatus::Stopped(SIGSEGV));
        }
        let insn = [self.mem[a], self.mem[a + 1], self.mem[a + 2], self.mem[a + 3]];
        if insn == *self.arch.trap_insn {
            self.regs[self.arch.pc_reg] = pc + self.arch.decr_pc_after_break;
            return Some(WaitStatus::Stopped(SIGTRAP));
        }
        self.insn_count += 1;
        let imm = u16::from_le_bytes([insn[2], insn[3]]) as u64;
        let reg = insn[1] as usize;
        match insn[0] {
            0x00 => self.regs[self.arch.pc_reg] = pc + 4,
            0x01 => {
                self.regs[reg] = imm;
                self.regs[self.arch.pc_reg] = pc + 4;
            }
            0x02 => {
                self.regs[reg] = self.regs[reg].wrapping_add(imm);
                self.regs[self.arch.pc_reg] = pc + 4;
            }
            0x03 => {
                self.regs[self.arch.lr_reg] = pc + 4;
                self.regs[self.arch.pc_reg] = imm;
            }
            0x04 => self.regs[self.arch.pc_reg] = self.regs[self.arch.lr_reg],
            0x05 => {
                let sp = self.regs[self.arch.sp_reg] - 16;
                self.put_u64(sp, self.regs[self.arch.fp_reg]);
                self.put_u64(sp + 8, self.regs[self.arch.lr_reg]);
                self.regs[self.arch.sp_reg] = sp;
                self.regs[self.arch.fp_reg] = sp;
                self.regs[self.arch.pc_reg] = pc + 4;
            }
            0x06 => {
                let fp = self.regs[self.arch.fp_reg];
                self.regs[self.arch.lr_reg] = self.get_u64(fp + 8);
                self.regs[self.arch.fp_reg] = self.get_u64(fp);
                self.regs[self.arch.sp_reg] = fp + 16;
                self.regs[self.arch.pc_reg] = pc + 4;
            }
            0x07 => {
                self.alive = false;
                return Some(WaitStatus::Exited(insn[1] as i32));
            }
            0x08 => {
                self.put_u64(imm, self.regs[reg]);
                self.regs[self.arch.pc_reg] = pc + 4;
            }
            0x09 => {
                self.regs[reg] = self.get_u64(imm);
                self.regs[self.arch.pc_reg] = pc + 4;
            }
            0x0a => {
                let dst = self.regs[insn[2] as usize];
                let src = self.regs[reg];
                self.put_u64(dst, src);
                self.regs[self.arch.pc_reg] = pc + 4;
            }
            _ => return Some(WaitStatus::Stopped(SIGILL)),
        }
        None
    }
}

impl Inferior for FakeInferior {
    fn read_memory(&mut self, addr: u64, len: usize) -> Result<Vec<u8>, TargetError> {
        let a = addr as usize;
        if a + len > self.mem.len() {
            return Err(TargetError::Memory { addr });
        }
        Ok(self.mem[a..a + len].to_vec())
    }

    fn write_memory(&mut self, addr: u64, data: &[u8]) -> Result<(), TargetError> {
        let a = addr as usize;
        if a + data.len() > self.mem.len() {
            return Err(TargetError::Memory { addr });
        }
        self.mem_writes.push((addr, data.len()));
        self.mem[a..a + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read_register(&mut self, reg: usize) -> Result<u64, TargetError> {
        self.regs.get(reg).copied().ok_or(TargetError::Register(reg))
    }

    fn write_register(&mut self, reg: usize, value: u64) -> Result<(), TargetError> {
        match self.regs.get_mut(reg) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(TargetError::Register(reg)),
        }
    }

    fn resume(&mut self, step: bool, signal: Option<i32>) -> Result<(), TargetError> {
        if !self.alive {
            return Err(TargetError::Lost("process has exited".into()));
        }
        if let Some(sig) = signal {
            self.delivered.push(sig);
        }
        if let Some(sig) = self.queued.pop_front() {
            self.status = Some(WaitStatus::Stopped(sig));
            return Ok(());
        }
        if step {
            self.status = Some(self.exec_one().unwrap_or(WaitStatus::Stopped(SIGTRAP)));
            return Ok(());
        }
        for _ in 0..RUN_LIMIT {
            if let Some(sig) = self.queued.pop_front() {
                self.status = Some(WaitStatus::Stopped(sig));
                return Ok(());
            }
            if let Some(status) = self.exec_one() {
                self.status = Some(status);
                return Ok(());
            }
        }
        Err(TargetError::Lost("runaway program".into()))
    }

    fn wait(&mut self) -> Result<WaitStatus, TargetError> {
        self.status
            .take()
            .ok_or_else(|| TargetError::Lost("nothing to wait for".into()))
    }

    fn kill(&mut self) -> Result<(), TargetError> {
        self.alive = false;
        Ok(())
    }
}
