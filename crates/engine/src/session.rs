//! One debugging session: the resume/wait/classify loop, stepping
//! commands, and in-inferior function calls.
//!
//! The session is split in two. [`Core`] owns the target, the
//! breakpoint and signal tables and the in-flight [`ExecState`]; it
//! is the evaluator's [`EvalContext`], so an expression can read the
//! inferior and even call into it. [`Session`] adds the symbol side
//! (types, blocks, lines) and runs the stop classifier, which needs
//! both halves at once: conditions evaluate against the symbols with
//! the core as context, with the borrow split keeping the two apart.

use std::collections::HashMap;
use std::mem;

use crate::breakpoints::{BpKind, BreakpointTable, Disposition};
use crate::control::{ExecState, StopReason};
use crate::error::{target_to_eval, Error};
use crate::frames::{self, Frame};
use crate::signals::{SignalTable, SIGTRAP};
use crate::target::{Arch, Inferior, WaitStatus};
use common::{create_logger, trace, trace_detail, Logger};
use eval::{
    CallArg, CallResult, EvalContext, EvalError, EvalMode, Evaluator, Expr, Value,
};
use eval::value::{pack_u64, unpack_u64};
use symtab::{BlockTable, LineTable, TypeTable};

const FRAME_LIMIT: usize = 64;

/// The run-control half of a session.
pub struct Core<T: Inferior> {
    pub target: T,
    pub arch: &'static Arch,
    pub breakpoints: BreakpointTable,
    pub signals: SignalTable,
    pub exec: ExecState,
    internal_vars: HashMap<String, Value>,
    running: bool,
    /// The last resume was a single step.
    stepped: bool,
    /// The pc the last single step started from.
    step_from: u64,
    log: Logger,
}

impl<T: Inferior> Core<T> {
    fn new(target: T, arch: &'static Arch) -> Self {
        Self {
            target,
            arch,
            breakpoints: BreakpointTable::new(),
            signals: SignalTable::new(),
            exec: ExecState::default(),
            internal_vars: HashMap::new(),
            running: true,
            stepped: false,
            step_from: 0,
            log: create_logger("control"),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn pc(&mut self) -> Result<u64, Error> {
        Ok(self.target.read_register(self.arch.pc_reg)?)
    }

    pub fn set_pc(&mut self, pc: u64) -> Result<(), Error> {
        Ok(self.target.write_register(self.arch.pc_reg, pc)?)
    }

    pub fn frame_base(&mut self) -> Result<u64, Error> {
        Ok(self.target.read_register(self.arch.fp_reg)?)
    }

    /// Set the inferior running. A breakpoint at the resume pc is
    /// stepped over with every trap pulled; `trap_expected` records
    /// that the continue must be finished after that step.
    pub fn start_resume(&mut self, step: bool, signal: Option<i32>) -> Result<(), Error> {
        let pc = self.pc()?;
        if self.breakpoints.enabled_at(pc) {
            trace_detail!(self.log, "stepping over breakpoint at {:#x}", pc);
            self.exec.trap_expected = !step;
            self.stepped = true;
            self.step_from = pc;
            self.target.resume(true, signal)?;
            return Ok(());
        }
        self.breakpoints.insert_all(&mut self.target, self.arch)?;
        self.stepped = step;
        if step {
            self.step_from = pc;
        }
        self.target.resume(step, signal)?;
        Ok(())
    }

    /// Identify a just-reported trap: was it one of our inserted
    /// breakpoints, and if so at which (pc-corrected) address?
    fn locate_trap(&mut self, pc_raw: u64) -> Result<(u64, bool), Error> {
        let decr = self.arch.decr_pc_after_break;
        // After a single step the pc is exact; the decrement only
        // applies when the trap instruction itself executed.
        if self.stepped && decr != 0 {
            return Ok((pc_raw, false));
        }
        let adjusted = pc_raw.wrapping_sub(decr);
        if self.breakpoints.inserted_at(adjusted) {
            Ok((adjusted, true))
        } else {
            Ok((pc_raw, false))
        }
    }

    fn read_mem_shadowed(&mut self, addr: u64, len: usize) -> Result<Vec<u8>, EvalError> {
        let mut buf = self
            .target
            .read_memory(addr, len)
            .map_err(target_to_eval)?;
        self.breakpoints.shadow_memory(addr, &mut buf);
        Ok(buf)
    }

    /// Run `addr` to completion for an in-inferior call. The caller
    /// has already parked the execution state and register file.
    fn run_call(
        &mut self,
        addr: u64,
        args: &[CallArg],
        return_len: usize,
        ret_site: u64,
    ) -> Result<CallResult, EvalError> {
        let mut sp = self
            .target
            .read_register(self.arch.sp_reg)
            .map_err(target_to_eval)?
            & !0xf;
        let struct_return = return_len > 16;
        let mut sret = 0u64;
        if struct_return {
            sp = sp.wrapping_sub(return_len as u64) & !0xf;
            sret = sp;
            self.target
                .write_register(self.arch.struct_ret_reg, sret)
                .map_err(target_to_eval)?;
        }
        for (i, arg) in args.iter().enumerate() {
            self.target
                .write_register(self.arch.arg_regs[i], unpack_u64(&arg.bytes))
                .map_err(target_to_eval)?;
        }
        self.target
            .write_register(self.arch.sp_reg, sp)
            .map_err(target_to_eval)?;
        self.target
            .write_register(self.arch.lr_reg, ret_site)
            .map_err(target_to_eval)?;
        self.target
            .write_register(self.arch.pc_reg, addr)
            .map_err(target_to_eval)?;
        self.breakpoints
            .add_internal(ret_site, BpKind::CallReturn, None);

        let mut deliver: Option<i32> = None;
        loop {
            self.start_resume(false, deliver.take())
                .map_err(|e| EvalError::Target(e.to_string()))?;
            let status = self.target.wait().map_err(target_to_eval)?;
            match status {
                WaitStatus::Exited(code) => {
                    self.running = false;
                    return Err(EvalError::Target(format!(
                        "the program exited with code {} during the call",
                        code
                    )));
                }
                WaitStatus::Signaled(sig) => {
                    self.running = false;
                    return Err(EvalError::Target(format!(
                        "the program was killed by signal {} during the call",
                        sig
                    )));
                }
                WaitStatus::Stopped(sig) => {
                    let pc_raw = self
                        .target
                        .read_register(self.arch.pc_reg)
                        .map_err(target_to_eval)?;
                    let (pc, from_inserted) =
                        self.locate_trap(pc_raw).map_err(|e| EvalError::Target(e.to_string()))?;
                    self.breakpoints
                        .remove_all(&mut self.target)
                        .map_err(|e| EvalError::Target(e.to_string()))?;
                    if sig == SIGTRAP && from_inserted {
                        self.target
                            .write_register(self.arch.pc_reg, pc)
                            .map_err(target_to_eval)?;
                        if pc == ret_site {
                            let bytes = if struct_return {
                                self.read_mem_shadowed(sret, return_len)?
                            } else {
                                let raw = self
                                    .target
                                    .read_register(self.arch.ret_reg)
                                    .map_err(target_to_eval)?;
                                pack_u64(raw, 8)
                            };
                            return Ok(CallResult { bytes, struct_return });
                        }
                        // Any user breakpoint aborts the call; the
                        // caller restores all state.
                        return Err(EvalError::Target(format!(
                            "breakpoint hit at {:#x} while calling a function",
                            pc
                        )));
                    }
                    if sig == SIGTRAP && self.exec.trap_expected {
                        self.exec.trap_expected = false;
                        continue;
                    }
                    if sig == SIGTRAP {
                        return Err(EvalError::Target(
                            "unexpected trap while calling a function".into(),
                        ));
                    }
                    let policy = self.signals.policy(sig);
                    if policy.stop {
                        return Err(EvalError::Target(format!(
                            "program received signal {} while calling a function",
                            sig
                        )));
                    }
                    if policy.pass {
                        deliver = Some(sig);
                    }
                }
            }
        }
    }
}

impl<T: Inferior> EvalContext for Core<T> {
    fn read_memory(&mut self, addr: u64, len: usize) -> Result<Vec<u8>, EvalError> {
        self.read_mem_shadowed(addr, len)
    }

    fn write_memory(&mut self, addr: u64, data: &[u8]) -> Result<(), EvalError> {
        self.target.write_memory(addr, data).map_err(target_to_eval)
    }

    fn read_register(&mut self, reg: usize) -> Result<u64, EvalError> {
        self.target.read_register(reg).map_err(target_to_eval)
    }

    fn write_register(&mut self, reg: usize, value: u64) -> Result<(), EvalError> {
        self.target.write_register(reg, value).map_err(target_to_eval)
    }

    fn frame_register(&mut self, frame_base: u64, reg: usize) -> Result<u64, EvalError> {
        let chain = frames::unwind(&mut self.target, self.arch, FRAME_LIMIT)
            .map_err(target_to_eval)?;
        frames::register_in_frame(&mut self.target, self.arch, &chain, frame_base, reg)
            .map_err(target_to_eval)
    }

    fn register_by_name(&self, name: &str) -> Option<usize> {
        self.arch.register_named(name)
    }

    fn internal_var(&mut self, name: &str) -> Option<Value> {
        self.internal_vars.get(name).cloned()
    }

    fn set_internal_var(&mut self, name: &str, value: &Value) {
        self.internal_vars.insert(name.into(), value.clone());
    }

    /// Call a function in the inferior. The whole execution state and
    /// register file are parked around the nested run and restored no
    /// matter how it ends, so an aborted call leaves the session
    /// where it was.
    fn call_function(
        &mut self,
        addr: u64,
        args: &[CallArg],
        return_len: usize,
    ) -> Result<CallResult, EvalError> {
        if !self.running {
            return Err(EvalError::Target("the program is not being run".into()));
        }
        if args.len() > self.arch.arg_regs.len() {
            return Err(EvalError::Target(format!(
                "too many arguments in function call ({} max)",
                self.arch.arg_regs.len()
            )));
        }
        let saved_exec = mem::replace(&mut self.exec, ExecState::default());
        let mut saved_regs = Vec::with_capacity(self.arch.num_regs);
        for reg in 0..self.arch.num_regs {
            saved_regs.push(self.target.read_register(reg).map_err(target_to_eval)?);
        }
        let ret_site = saved_regs[self.arch.pc_reg];
        trace!(self.log, "calling {:#x}, return site {:#x}", addr, ret_site);

        let result = self.run_call(addr, args, return_len, ret_site);

        self.breakpoints.clear_internal(BpKind::CallReturn);
        if self.running {
            for (reg, value) in saved_regs.iter().enumerate() {
                self.target
                    .write_register(reg, *value)
                    .map_err(target_to_eval)?;
            }
        }
        self.exec = saved_exec;
        result
    }
}

/// What the breakpoint classifier decided about one stop.
enum BpDecision {
    Stop(StopReason),
    NoStop,
    StepResumeHit,
}

/// A full debugging session over one inferior.
pub struct Session<T: Inferior> {
    pub core: Core<T>,
    pub types: TypeTable,
    pub blocks: BlockTable,
    pub lines: LineTable,
    /// Frame level evaluation happens in; reset to innermost on stop.
    selected: u32,
    log: Logger,
}

impl<T: Inferior> Session<T> {
    /// Wrap an attached, stopped process. Symbol data starts empty;
    /// populate `types`, `blocks` and `lines` from the object reader.
    pub fn new(target: T, arch: &'static Arch) -> Self {
        Self {
            core: Core::new(target, arch),
            types: TypeTable::new(),
            blocks: BlockTable::new(),
            lines: LineTable::default(),
            selected: 0,
            log: create_logger("session"),
        }
    }

    fn ensure_running(&self) -> Result<(), Error> {
        if self.core.running {
            Ok(())
        } else {
            Err(Error::NotRunning)
        }
    }

    /// The reconstructed call chain, innermost first.
    pub fn frames(&mut self) -> Result<Vec<Frame>, Error> {
        self.ensure_running()?;
        Ok(frames::unwind(&mut self.core.target, self.core.arch, FRAME_LIMIT)?)
    }

    /// Set a breakpoint at the first address generated for a line.
    pub fn break_at_line(&mut self, line: u32) -> Result<u32, Error> {
        let addr = self
            .lines
            .line_to_addr(line)
            .ok_or(Error::NoSuchLine(line))?;
        Ok(self.core.breakpoints.add(addr))
    }

    /// Select an outer frame; evaluation happens there until the next
    /// stop resets to the innermost.
    pub fn select_frame(&mut self, level: u32) -> Result<Frame, Error> {
        let chain = self.frames()?;
        let frame = *chain.get(level as usize).ok_or(Error::NoSuchFrame(level))?;
        self.selected = level;
        Ok(frame)
    }

    pub fn selected_frame(&self) -> u32 {
        self.selected
    }

    /// Look a frame up by its base, taking the most-outward frame when
    /// a corrupt chain repeats a base.
    pub fn frame_for_base(&mut self, base: u64) -> Result<Option<Frame>, Error> {
        let chain = self.frames()?;
        Ok(frames::find(&chain, base).copied())
    }

    /// Evaluate in the selected frame (or globally when nothing runs).
    pub fn eval(&mut self, expr: &Expr, mode: EvalMode) -> Result<Value, Error> {
        if self.core.running && self.selected != 0 {
            return self.eval_in_frame(expr, mode, self.selected);
        }
        let (scope, frame_base) = if self.core.running {
            let pc = self.core.pc()?;
            (self.blocks.lookup_block(pc), Some(self.core.frame_base()?))
        } else {
            (self.blocks.global_block(), None)
        };
        Evaluator::new(&mut self.types, &self.blocks, scope, frame_base, &mut self.core)
            .eval(expr, mode)
            .map_err(Error::Eval)
    }

    /// Evaluate in the context of an outer frame. The scope comes
    /// from the frame's pc, backed up one byte for non-innermost
    /// frames: the return address points after the call, which may
    /// already belong to the next scope.
    pub fn eval_in_frame(
        &mut self,
        expr: &Expr,
        mode: EvalMode,
        level: u32,
    ) -> Result<Value, Error> {
        let chain = self.frames()?;
        let frame = *chain
            .get(level as usize)
            .ok_or(Error::NoSuchFrame(level))?;
        let scope_pc = if frame.level == 0 { frame.pc } else { frame.pc - 1 };
        let scope = self.blocks.lookup_block(scope_pc);
        Evaluator::new(&mut self.types, &self.blocks, scope, Some(frame.base), &mut self.core)
            .eval(expr, mode)
            .map_err(Error::Eval)
    }

    /// Continue execution, re-delivering the stopping signal when the
    /// table says it passes.
    pub fn cont(&mut self) -> Result<StopReason, Error> {
        self.ensure_running()?;
        self.core.exec.clear_stepping();
        let sig = self.core.exec.stop_signal;
        let deliver = if sig != 0 && sig != SIGTRAP && self.core.signals.policy(sig).pass {
            Some(sig)
        } else {
            None
        };
        self.core.exec.stop_signal = 0;
        self.core.start_resume(false, deliver)?;
        self.wait_for_stop()
    }

    /// Step one source line, entering calls.
    pub fn step(&mut self) -> Result<StopReason, Error> {
        self.step_command(false)
    }

    /// Step one source line, stepping over calls.
    pub fn next(&mut self) -> Result<StopReason, Error> {
        self.step_command(true)
    }

    fn step_command(&mut self, over_calls: bool) -> Result<StopReason, Error> {
        self.ensure_running()?;
        let pc = self.core.pc()?;
        let fb = self.core.frame_base()?;
        // No line info: a range of one instruction.
        let (start, end) = match self.lines.find_pc_line(pc) {
            Some(range) => (range.start, range.end),
            None => (pc, pc + self.core.arch.trap_insn.len() as u64),
        };
        trace!(self.log, "step range {:#x}..{:#x} frame {:#x}", start, end, fb);
        self.core.exec.step_range_start = start;
        self.core.exec.step_range_end = end;
        self.core.exec.step_frame_base = fb;
        self.core.exec.step_over_calls = over_calls;
        self.core.exec.stop_signal = 0;
        self.core.start_resume(true, None)?;
        self.wait_for_stop()
    }

    /// Step exactly one machine instruction.
    pub fn step_instruction(&mut self) -> Result<StopReason, Error> {
        self.ensure_running()?;
        self.core.exec.stop_after_trap = true;
        self.core.exec.stop_signal = 0;
        self.core.start_resume(true, None)?;
        self.wait_for_stop()
    }

    /// Run until the selected frame returns: a momentary breakpoint at
    /// its caller's resume pc, restricted to the caller's frame.
    pub fn finish(&mut self) -> Result<StopReason, Error> {
        self.ensure_running()?;
        let level = self.selected + 1;
        let chain = self.frames()?;
        let caller = *chain
            .get(level as usize)
            .ok_or(Error::NoSuchFrame(level))?;
        let num = self
            .core
            .breakpoints
            .add_internal(caller.pc, BpKind::StepResume, Some(caller.base));
        self.core.exec.step_resume = Some(num);
        self.core.exec.stop_signal = 0;
        self.core.start_resume(false, None)?;
        self.wait_for_stop()
    }

    pub fn kill(&mut self) -> Result<(), Error> {
        self.ensure_running()?;
        self.core.target.kill()?;
        self.core.running = false;
        Ok(())
    }

    /// The wait/classify loop: block for a stop, decide whether it
    /// belongs to the user, and silently resume everything that does
    /// not.
    fn wait_for_stop(&mut self) -> Result<StopReason, Error> {
        self.selected = 0;
        loop {
            let status = self.core.target.wait()?;
            match status {
                WaitStatus::Exited(code) => {
                    self.core.running = false;
                    self.core.exec.clear_stepping();
                    return Ok(StopReason::Exited(code));
                }
                WaitStatus::Signaled(sig) => {
                    self.core.running = false;
                    self.core.exec.clear_stepping();
                    return Ok(StopReason::Killed(sig));
                }
                WaitStatus::Stopped(sig) => {
                    if let Some(reason) = self.handle_stop(sig)? {
                        return Ok(reason);
                    }
                }
            }
        }
    }

    /// One stop: classify it, return a reason to surface or `None`
    /// after silently resuming.
    fn handle_stop(&mut self, sig: i32) -> Result<Option<StopReason>, Error> {
        let pc_raw = self.core.pc()?;
        let (pc, from_inserted) = self.core.locate_trap(pc_raw)?;
        let was_single_step = self.core.stepped;
        let was_trap_expected = self.core.exec.trap_expected;
        self.core.exec.trap_expected = false;
        self.core
            .breakpoints
            .remove_all(&mut self.core.target)?;
        if from_inserted {
            self.core.set_pc(pc)?;
        }
        self.core.exec.stop_signal = sig;
        trace_detail!(self.log, "stopped, signal {} pc {:#x}", sig, pc);

        // The armed step-resume breakpoint is engine-owned; it cannot
        // have disappeared between the plant and this stop.
        if let Some(num) = self.core.exec.step_resume {
            if self.core.breakpoints.get(num).is_none() {
                panic!("step-resume breakpoint {} vanished while armed", num);
            }
        }

        if sig != SIGTRAP {
            let policy = self.core.signals.policy(sig);
            if policy.stop {
                self.abandon_step()?;
                return Ok(Some(StopReason::SignalReceived(sig)));
            }
            let deliver = if policy.pass { Some(sig) } else { None };
            let step = self.core.exec.stepping() || self.core.exec.stop_after_trap;
            self.core.start_resume(step, deliver)?;
            return Ok(None);
        }

        // A trap at an armed address gets breakpoint treatment whether
        // it fired the trap or a single step landed on it.
        if self.core.breakpoints.enabled_at(pc) && (from_inserted || was_single_step) {
            match self.classify_breakpoint_stop(pc)? {
                BpDecision::Stop(reason) => {
                    self.abandon_step()?;
                    return Ok(Some(reason));
                }
                BpDecision::StepResumeHit => {
                    // Landed back from a stepped-over call; the step
                    // range decides whether this pc is worth showing.
                    if self.core.exec.stepping() {
                        return self.classify_step(pc);
                    }
                    self.core.exec.clear_stepping();
                    return Ok(Some(StopReason::StepDone));
                }
                BpDecision::NoStop => {
                    let step = self.core.exec.stepping();
                    self.core.start_resume(step, None)?;
                    return Ok(None);
                }
            }
        }

        if was_trap_expected {
            // The step over a breakpoint is done; finish the continue.
            self.core.start_resume(false, None)?;
            return Ok(None);
        }

        if self.core.exec.stop_after_trap {
            self.core.exec.stop_after_trap = false;
            self.abandon_step()?;
            return Ok(Some(StopReason::StepDone));
        }

        if self.core.exec.stepping() {
            return self.classify_step(pc);
        }

        // A trap we did not plant and did not expect.
        self.abandon_step()?;
        Ok(Some(StopReason::SignalReceived(sig)))
    }

    /// Clear stepping state on a user-visible stop, deleting a still
    /// pending step-resume breakpoint.
    fn abandon_step(&mut self) -> Result<(), Error> {
        if let Some(num) = self.core.exec.step_resume.take() {
            self.core.breakpoints.delete(&mut self.core.target, num)?;
        }
        self.core.exec.clear_stepping();
        Ok(())
    }

    /// Decide what a trap at a breakpointed address means, walking
    /// every enabled breakpoint at the pc in numbering order.
    fn classify_breakpoint_stop(&mut self, pc: u64) -> Result<BpDecision, Error> {
        let fb = self.core.frame_base()?;
        for num in self.core.breakpoints.numbers_at(pc) {
            let (kind, frame, condition, silent, commands, error_reported) =
                match self.core.breakpoints.get(num) {
                    Some(bp) => (
                        bp.kind,
                        bp.frame,
                        bp.condition.clone(),
                        bp.silent,
                        bp.commands.clone(),
                        bp.condition_error_reported,
                    ),
                    None => continue,
                };
            if let Some(required) = frame {
                if fb != required {
                    continue;
                }
            }
            if let Some(expr) = condition {
                match self.eval_condition(&expr, pc, fb) {
                    Ok(v) if v.is_zero() => continue,
                    Ok(_) => {}
                    Err(e) => {
                        // An unevaluable condition stops the program;
                        // the error surfaces once per breakpoint until
                        // the condition changes.
                        if let Some(bp) = self.core.breakpoints.get_mut(num) {
                            bp.hit_count += 1;
                            bp.condition_error_reported = true;
                        }
                        if error_reported {
                            return Ok(BpDecision::Stop(StopReason::Breakpoint {
                                num,
                                silent,
                                commands,
                            }));
                        }
                        return Ok(BpDecision::Stop(StopReason::BreakpointConditionError {
                            num,
                            message: e.to_string(),
                        }));
                    }
                }
            }
            let should_stop = match self.core.breakpoints.get_mut(num) {
                Some(bp) => {
                    bp.hit_count += 1;
                    if bp.ignore_count > 0 {
                        bp.ignore_count -= 1;
                        false
                    } else {
                        true
                    }
                }
                None => false,
            };
            if !should_stop {
                continue;
            }
            match kind {
                BpKind::StepResume => {
                    self.core.breakpoints.delete(&mut self.core.target, num)?;
                    self.core.exec.step_resume = None;
                    return Ok(BpDecision::StepResumeHit);
                }
                BpKind::CallReturn => continue,
                BpKind::User => {
                    let disposition = self
                        .core
                        .breakpoints
                        .get(num)
                        .map(|bp| bp.disposition)
                        .unwrap_or(Disposition::Keep);
                    match disposition {
                        Disposition::Keep => {}
                        Disposition::Disable => self.core.breakpoints.disable(num)?,
                        Disposition::Delete => {
                            self.core.breakpoints.delete(&mut self.core.target, num)?
                        }
                    }
                    trace!(self.log, "breakpoint {} hit at {:#x}", num, pc);
                    return Ok(BpDecision::Stop(StopReason::Breakpoint {
                        num,
                        silent,
                        commands,
                    }));
                }
            }
        }
        Ok(BpDecision::NoStop)
    }

    /// Conditions evaluate in `Normal` mode: a condition may call a
    /// function in the inferior and compare against its real result.
    fn eval_condition(&mut self, expr: &Expr, pc: u64, fb: u64) -> Result<Value, EvalError> {
        let scope = self.blocks.lookup_block(pc);
        Evaluator::new(&mut self.types, &self.blocks, scope, Some(fb), &mut self.core)
            .eval(expr, EvalMode::Normal)
    }

    /// A single-step trap while a step range is active: stay silent
    /// inside the range, handle entering and leaving functions, stop
    /// at the first pc of a new line.
    fn classify_step(&mut self, pc: u64) -> Result<Option<StopReason>, Error> {
        let fb = self.core.frame_base()?;
        let step_frame = self.core.exec.step_frame_base;

        if self.core.exec.in_step_range(pc) && fb == step_frame {
            self.core.start_resume(true, None)?;
            return Ok(None);
        }

        // The stepped instruction was a call when it linked its own
        // successor into lr yet continued elsewhere. This catches the
        // callee before it sets up a frame; afterwards the frame base
        // sitting below the stepping frame tells the same story.
        let lr = self.core.target.read_register(self.core.arch.lr_reg)?;
        let insn = self.core.arch.trap_insn.len() as u64;
        let succ = self.core.step_from.wrapping_add(insn);
        let entered_call = fb < step_frame || (lr == succ && pc != succ);
        if entered_call {
            if self.core.exec.step_over_calls {
                let num = self
                    .core
                    .breakpoints
                    .add_internal(lr, BpKind::StepResume, Some(step_frame));
                self.core.exec.step_resume = Some(num);
                trace_detail!(self.log, "stepping over call, resume at {:#x}", lr);
                self.core.start_resume(false, None)?;
                return Ok(None);
            }
            // Stepping into: the stop lands at the callee.
            self.abandon_step()?;
            return Ok(Some(StopReason::StepDone));
        }

        // Left the line within the same frame, or returned outward.
        self.abandon_step()?;
        Ok(Some(StopReason::StepDone))
    }
}
