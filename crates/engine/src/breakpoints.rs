//! Breakpoint bookkeeping: numbering, duplicates at one address,
//! shadow bytes, and the insert/remove passes around each resume.
//!
//! Breakpoints live removed while the program is stopped. The session
//! inserts all of them just before resuming and pulls them at every
//! stop, so user-visible memory always shows the real instruction
//! bytes. Several breakpoints at one address share a single trap: the
//! first enabled one at the address owns the inserted trap and its
//! shadow, the rest are marked duplicates.

use crate::error::Error;
use crate::target::{Arch, Inferior};
use common::{create_logger, trace, Logger};
use eval::Expr;

/// What happens to a breakpoint after it causes a stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Stay armed
    Keep,
    /// Disable after the hit
    Disable,
    /// Delete after the hit (temporary breakpoint)
    Delete,
}

/// Who planted the breakpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BpKind {
    /// Explicitly set by the user
    User,
    /// Internal: return point of a stepped-over call
    StepResume,
    /// Internal: return site of an in-inferior function call
    CallReturn,
}

/// One breakpoint.
#[derive(Debug, Clone)]
pub struct Breakpoint {
    pub num: u32,
    pub address: u64,
    pub kind: BpKind,
    pub enabled: bool,
    pub disposition: Disposition,
    pub condition: Option<Expr>,
    pub ignore_count: u32,
    pub hit_count: u32,
    pub silent: bool,
    /// Commands to run when this breakpoint stops the program. Kept as
    /// opaque lines; the session hands them back with the stop.
    pub commands: Vec<String>,
    /// Only fire in the frame with this base (internal breakpoints).
    pub frame: Option<u64>,
    /// Original instruction bytes while the trap is in memory.
    shadow: Vec<u8>,
    inserted: bool,
    /// Another breakpoint at this address owns the trap.
    duplicate: bool,
    /// A condition error was already reported at this breakpoint; the
    /// flag resets when the condition changes.
    pub condition_error_reported: bool,
}

impl Breakpoint {
    fn new(num: u32, address: u64, kind: BpKind) -> Self {
        Self {
            num,
            address,
            kind,
            enabled: true,
            disposition: Disposition::Keep,
            condition: None,
            ignore_count: 0,
            hit_count: 0,
            silent: false,
            commands: Vec::new(),
            frame: None,
            shadow: Vec::new(),
            inserted: false,
            duplicate: false,
            condition_error_reported: false,
        }
    }

    pub fn is_inserted(&self) -> bool {
        self.inserted
    }

    pub fn is_duplicate(&self) -> bool {
        self.duplicate
    }
}

/// All breakpoints of one session.
pub struct BreakpointTable {
    breakpoints: Vec<Breakpoint>,
    next_number: u32,
    log: Logger,
}

impl BreakpointTable {
    pub fn new() -> Self {
        Self {
            breakpoints: Vec::new(),
            next_number: 1,
            log: create_logger("breakpoints"),
        }
    }

    /// Set a user breakpoint; returns its number.
    pub fn add(&mut self, address: u64) -> u32 {
        self.add_kind(address, BpKind::User)
    }

    /// Set a temporary user breakpoint, deleted after its first stop.
    pub fn add_temporary(&mut self, address: u64) -> u32 {
        let num = self.add_kind(address, BpKind::User);
        if let Some(bp) = self.get_mut(num) {
            bp.disposition = Disposition::Delete;
        }
        num
    }

    /// Plant an internal breakpoint, optionally restricted to the
    /// frame with the given base.
    pub fn add_internal(&mut self, address: u64, kind: BpKind, frame: Option<u64>) -> u32 {
        let num = self.add_kind(address, kind);
        if let Some(bp) = self.get_mut(num) {
            bp.frame = frame;
            bp.disposition = Disposition::Delete;
        }
        num
    }

    fn add_kind(&mut self, address: u64, kind: BpKind) -> u32 {
        let num = self.next_number;
        self.next_number += 1;
        self.breakpoints.push(Breakpoint::new(num, address, kind));
        self.check_duplicates(address);
        trace!(self.log, "breakpoint {} at {:#x} ({:?})", num, address, kind);
        num
    }

    pub fn get(&self, num: u32) -> Option<&Breakpoint> {
        self.breakpoints.iter().find(|b| b.num == num)
    }

    pub fn get_mut(&mut self, num: u32) -> Option<&mut Breakpoint> {
        self.breakpoints.iter_mut().find(|b| b.num == num)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Breakpoint> {
        self.breakpoints.iter()
    }

    /// Delete a breakpoint. If it owns an inserted trap and another
    /// enabled breakpoint remains at the address, ownership (shadow
    /// and inserted state) transfers without touching inferior
    /// memory; otherwise the original bytes go back.
    pub fn delete<T: Inferior>(&mut self, target: &mut T, num: u32) -> Result<(), Error> {
        let idx = self
            .breakpoints
            .iter()
            .position(|b| b.num == num)
            .ok_or(Error::NoSuchBreakpoint(num))?;
        let bp = self.breakpoints.remove(idx);
        if bp.inserted {
            let heir = self
                .breakpoints
                .iter_mut()
                .find(|b| b.address == bp.address && b.enabled);
            match heir {
                Some(h) => {
                    h.shadow = bp.shadow;
                    h.inserted = true;
                    h.duplicate = false;
                    trace!(self.log, "breakpoint {} inherits trap at {:#x}", h.num, bp.address);
                }
                None => {
                    target.write_memory(bp.address, &bp.shadow)?;
                    trace!(self.log, "restored {:#x} on delete of {}", bp.address, num);
                }
            }
        }
        self.check_duplicates(bp.address);
        Ok(())
    }

    pub fn enable(&mut self, num: u32) -> Result<(), Error> {
        let addr = self.set_enabled(num, true)?;
        self.check_duplicates(addr);
        Ok(())
    }

    /// Disabling the owner of an inserted trap is deferred: the trap
    /// stays until the next remove pass pulls it.
    pub fn disable(&mut self, num: u32) -> Result<(), Error> {
        let addr = self.set_enabled(num, false)?;
        self.check_duplicates(addr);
        Ok(())
    }

    fn set_enabled(&mut self, num: u32, enabled: bool) -> Result<u64, Error> {
        let bp = self.get_mut(num).ok_or(Error::NoSuchBreakpoint(num))?;
        bp.enabled = enabled;
        Ok(bp.address)
    }

    /// Replace the condition, clearing the sticky error flag so a
    /// fixed condition reports fresh errors.
    pub fn set_condition(&mut self, num: u32, condition: Option<Expr>) -> Result<(), Error> {
        let bp = self.get_mut(num).ok_or(Error::NoSuchBreakpoint(num))?;
        bp.condition = condition;
        bp.condition_error_reported = false;
        Ok(())
    }

    pub fn set_ignore_count(&mut self, num: u32, count: u32) -> Result<(), Error> {
        let bp = self.get_mut(num).ok_or(Error::NoSuchBreakpoint(num))?;
        bp.ignore_count = count;
        Ok(())
    }

    /// Attach a command list to a breakpoint, replacing any previous
    /// one. An empty list clears the commands.
    pub fn set_commands(&mut self, num: u32, commands: Vec<String>) -> Result<(), Error> {
        let bp = self.get_mut(num).ok_or(Error::NoSuchBreakpoint(num))?;
        bp.commands = commands;
        Ok(())
    }

    /// Recompute trap ownership at one address: the first enabled
    /// breakpoint owns it, later ones are duplicates.
    fn check_duplicates(&mut self, address: u64) {
        let mut seen_owner = false;
        for bp in self.breakpoints.iter_mut().filter(|b| b.address == address) {
            if bp.enabled {
                bp.duplicate = seen_owner;
                seen_owner = true;
            } else {
                bp.duplicate = false;
            }
        }
    }

    /// Any enabled breakpoint at `address`?
    pub fn enabled_at(&self, address: u64) -> bool {
        self.breakpoints.iter().any(|b| b.address == address && b.enabled)
    }

    /// Is a trap currently in inferior memory at `address`?
    pub fn inserted_at(&self, address: u64) -> bool {
        self.breakpoints.iter().any(|b| b.address == address && b.inserted)
    }

    /// Numbers of enabled breakpoints at `address`, owner first.
    pub fn numbers_at(&self, address: u64) -> Vec<u32> {
        self.breakpoints
            .iter()
            .filter(|b| b.address == address && b.enabled)
            .map(|b| b.num)
            .collect()
    }

    /// Write every armed trap into the inferior. All-or-nothing: a
    /// failed write undoes the traps placed earlier in the pass.
    pub fn insert_all<T: Inferior>(&mut self, target: &mut T, arch: &Arch) -> Result<(), Error> {
        let mut placed = Vec::new();
        for i in 0..self.breakpoints.len() {
            let (addr, wanted) = {
                let bp = &self.breakpoints[i];
                (bp.address, bp.enabled && !bp.duplicate && !bp.inserted)
            };
            if !wanted {
                continue;
            }
            let result = target
                .read_memory(addr, arch.trap_insn.len())
                .and_then(|shadow| {
                    target.write_memory(addr, arch.trap_insn)?;
                    Ok(shadow)
                });
            match result {
                Ok(shadow) => {
                    let bp = &mut self.breakpoints[i];
                    bp.shadow = shadow;
                    bp.inserted = true;
                    placed.push(i);
                }
                Err(e) => {
                    trace!(self.log, "insert failed at {:#x}, rolling back", addr);
                    for &j in placed.iter().rev() {
                        let (a, shadow) = {
                            let bp = &mut self.breakpoints[j];
                            bp.inserted = false;
                            (bp.address, std::mem::take(&mut bp.shadow))
                        };
                        // Rollback failures are unrecoverable anyway.
                        let _ = target.write_memory(a, &shadow);
                    }
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    /// Pull every inserted trap, restoring the shadowed bytes.
    pub fn remove_all<T: Inferior>(&mut self, target: &mut T) -> Result<(), Error> {
        for bp in &mut self.breakpoints {
            if bp.inserted {
                target.write_memory(bp.address, &bp.shadow)?;
                bp.inserted = false;
            }
        }
        Ok(())
    }

    /// Overlay shadow bytes onto a raw memory read so inserted traps
    /// never leak into user-visible data.
    pub fn shadow_memory(&self, addr: u64, buf: &mut [u8]) {
        let end = addr + buf.len() as u64;
        for bp in self.breakpoints.iter().filter(|b| b.inserted) {
            let bp_end = bp.address + bp.shadow.len() as u64;
            if bp.address < end && bp_end > addr {
                for (i, &byte) in bp.shadow.iter().enumerate() {
                    let a = bp.address + i as u64;
                    if a >= addr && a < end {
                        buf[(a - addr) as usize] = byte;
                    }
                }
            }
        }
    }

    /// Drop internal breakpoints of a kind (cleanup after aborted
    /// operations). They are never inserted at this point.
    pub fn clear_internal(&mut self, kind: BpKind) {
        self.breakpoints.retain(|b| b.kind != kind || b.inserted);
        // Owners may have vanished.
        let addrs: Vec<u64> = self.breakpoints.iter().map(|b| b.address).collect();
        for addr in addrs {
            self.check_duplicates(addr);
        }
    }
}

impl Default for BreakpointTable {
    fn default() -> Self {
        Self::new()
    }
}
