//! Execution state carried across one resume/wait cycle.
//!
//! Everything the stop classifier needs to decide whether a trap
//! finishes the current command lives in one [`ExecState`] value, so
//! an in-inferior function call can park the whole state with a
//! `mem::replace` and put it back afterwards.

/// In-flight state of the current execution command.
#[derive(Debug, Clone, Default)]
pub struct ExecState {
    /// Source-line step range; `start == end == 0` means not stepping.
    pub step_range_start: u64,
    pub step_range_end: u64,
    /// Frame the step started in, for entered/returned decisions.
    pub step_frame_base: u64,
    /// Step over calls (`next`) instead of into them (`step`).
    pub step_over_calls: bool,
    /// Number of the live step-resume breakpoint, if any.
    pub step_resume: Option<u32>,
    /// The next trap is our own single-step over a breakpoint; after
    /// it, re-resume freely.
    pub trap_expected: bool,
    /// One-shot: the next trap stops unconditionally (stepi).
    pub stop_after_trap: bool,
    /// Signal that caused the last stop (0 = none).
    pub stop_signal: i32,
}

impl ExecState {
    /// A step range is active.
    pub fn stepping(&self) -> bool {
        self.step_range_start != 0 || self.step_range_end != 0
    }

    /// The pc is still inside the range being stepped.
    pub fn in_step_range(&self, pc: u64) -> bool {
        self.stepping() && pc >= self.step_range_start && pc < self.step_range_end
    }

    /// Forget any stepping in progress (stop delivered to the user).
    pub fn clear_stepping(&mut self) {
        self.step_range_start = 0;
        self.step_range_end = 0;
        self.step_frame_base = 0;
        self.step_over_calls = false;
        self.step_resume = None;
        self.stop_after_trap = false;
    }
}

/// Why control returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// A user breakpoint stopped the program. `commands` carries the
    /// breakpoint's attached command list for the caller to run.
    Breakpoint {
        num: u32,
        silent: bool,
        commands: Vec<String>,
    },
    /// A breakpoint stopped the program but its condition could not
    /// be evaluated; the error is reported once per breakpoint.
    BreakpointConditionError { num: u32, message: String },
    /// A stepping command (step, next, stepi, finish) completed.
    StepDone,
    /// The program stopped on a signal per the signal table.
    SignalReceived(i32),
    /// The program exited with this code.
    Exited(i32),
    /// The program was terminated by this signal.
    Killed(i32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_range_membership() {
        let mut s = ExecState::default();
        assert!(!s.stepping());
        s.step_range_start = 0x100;
        s.step_range_end = 0x110;
        assert!(s.stepping());
        assert!(s.in_step_range(0x100));
        assert!(s.in_step_range(0x10c));
        assert!(!s.in_step_range(0x110));
        assert!(!s.in_step_range(0xff));
    }

    #[test]
    fn test_clear_stepping_resets_everything() {
        let mut s = ExecState {
            step_range_start: 1,
            step_range_end: 2,
            step_frame_base: 3,
            step_over_calls: true,
            step_resume: Some(7),
            trap_expected: true,
            stop_after_trap: true,
            stop_signal: 5,
        };
        s.clear_stepping();
        assert!(!s.stepping());
        assert_eq!(s.step_resume, None);
        assert!(!s.stop_after_trap);
        // trap_expected and stop_signal survive: they belong to the
        // resume machinery, not the stepping command.
        assert!(s.trap_expected);
        assert_eq!(s.stop_signal, 5);
    }
}
