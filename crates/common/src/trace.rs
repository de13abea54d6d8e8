//! Per-module trace loggers.
//!
//! Control via the `DBG_LOG` environment variable:
//! - `DBG_LOG=*` - enable every logger
//! - `DBG_LOG=control` - enable one module
//! - `DBG_LOG=control,breakpoints` - enable several
//!
//! Verbosity via `DBG_LOG_LEVEL` (0-2, default 1). Level 2 adds the
//! per-iteration detail lines.

use std::collections::HashSet;
use std::env;
use std::sync::OnceLock;

enum Enabled {
    All,
    None,
    Set(HashSet<String>),
}

struct Config {
    enabled: Enabled,
    level: u8,
}

static CONFIG: OnceLock<Config> = OnceLock::new();

fn config() -> &'static Config {
    CONFIG.get_or_init(|| {
        let enabled = match env::var("DBG_LOG").ok().as_deref() {
            None | Some("") => Enabled::None,
            Some("*") | Some("1") => Enabled::All,
            Some(value) => {
                let set: HashSet<_> = value
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                if set.is_empty() {
                    Enabled::None
                } else {
                    Enabled::Set(set)
                }
            }
        };
        let level = env::var("DBG_LOG_LEVEL")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(|v: u8| v.min(2))
            .unwrap_or(1);
        Config { enabled, level }
    })
}

fn is_enabled(name: &str) -> bool {
    match &config().enabled {
        Enabled::None => false,
        Enabled::All => true,
        Enabled::Set(set) => set.contains(name),
    }
}

/// A named logger. Cheap to construct and to carry around disabled.
pub struct Logger {
    name: &'static str,
    enabled: bool,
}

impl Logger {
    pub const fn disabled() -> Self {
        Self { name: "", enabled: false }
    }

    #[inline]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    #[inline]
    pub fn log(&self, msg: &str) {
        if self.enabled && config().level >= 1 {
            eprintln!("[{}] {}", self.name, msg);
        }
    }

    #[inline]
    pub fn detail(&self, msg: &str) {
        if self.enabled && config().level >= 2 {
            eprintln!("[{}] {}", self.name, msg);
        }
    }

    #[inline]
    pub fn fail(&self, msg: &str) {
        if self.enabled && config().level >= 1 {
            eprintln!("[{}] FAIL: {}", self.name, msg);
        }
    }
}

/// Create a logger. The name must be a static string.
pub fn create_logger(name: &'static str) -> Logger {
    Logger { name, enabled: is_enabled(name) }
}

// The macros avoid the format! cost when the logger is off.

#[macro_export]
macro_rules! trace {
    ($logger:expr, $($arg:tt)*) => {
        if $logger.enabled() {
            $logger.log(&format!($($arg)*));
        }
    };
}

#[macro_export]
macro_rules! trace_detail {
    ($logger:expr, $($arg:tt)*) => {
        if $logger.enabled() {
            $logger.detail(&format!($($arg)*));
        }
    };
}

#[macro_export]
macro_rules! trace_fail {
    ($logger:expr, $($arg:tt)*) => {
        if $logger.enabled() {
            $logger.fail(&format!($($arg)*));
        }
    };
}
