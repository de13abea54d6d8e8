//! Common utilities for the debugger engine crates.
//!
//! Shared infrastructure used across the workspace:
//!
//! - [`trace`] - Per-module logging controlled via the `DBG_LOG` environment variable

pub mod trace;

pub use trace::{create_logger, Logger};
