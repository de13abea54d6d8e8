//! Signal disposition: per-signal stop/print/pass policy.

use std::collections::HashMap;

pub const SIGINT: i32 = 2;
pub const SIGILL: i32 = 4;
pub const SIGTRAP: i32 = 5;
pub const SIGFPE: i32 = 8;
pub const SIGSEGV: i32 = 11;
pub const SIGALRM: i32 = 14;
pub const SIGCHLD: i32 = 17;
pub const SIGURG: i32 = 23;
pub const SIGWINCH: i32 = 28;
pub const SIGIO: i32 = 29;

/// What the debugger does when the inferior gets one signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalPolicy {
    /// Stop and hand control to the user
    pub stop: bool,
    /// Announce the signal even when not stopping
    pub print: bool,
    /// Forward the signal to the program on resume
    pub pass: bool,
}

/// The per-signal policy table.
///
/// Defaults: everything stops, prints and passes, except the signals
/// the debugger itself lives on (trap, interrupt), which are never
/// forwarded, and the noisy ones (alarm, child, window-change, urgent
/// and async-io), which neither stop nor print.
pub struct SignalTable {
    overrides: HashMap<i32, SignalPolicy>,
}

impl SignalTable {
    pub fn new() -> Self {
        let mut overrides = HashMap::new();
        let debugger_own = SignalPolicy { stop: true, print: true, pass: false };
        overrides.insert(SIGTRAP, debugger_own);
        overrides.insert(SIGINT, debugger_own);
        let quiet = SignalPolicy { stop: false, print: false, pass: true };
        for sig in [SIGALRM, SIGCHLD, SIGWINCH, SIGURG, SIGIO] {
            overrides.insert(sig, quiet);
        }
        Self { overrides }
    }

    pub fn policy(&self, sig: i32) -> SignalPolicy {
        self.overrides
            .get(&sig)
            .copied()
            .unwrap_or(SignalPolicy { stop: true, print: true, pass: true })
    }

    pub fn set(&mut self, sig: i32, policy: SignalPolicy) {
        self.overrides.insert(sig, policy);
    }
}

impl Default for SignalTable {
    fn default() -> Self {
        Self::new()
    }
}
