//! Logging setup and per-module switchable log macros.
//!
//! Every module that logs through these macros declares its own switch:
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//! use crate::{log_debug, log_error, log_info, log_warn};
//! ```
//! Turning the switch off silences a chatty module (the scheduler at a 500 ms
//! cadence, for example) without touching `RUST_LOG`.

use log::LevelFilter;

/// Initialise `env_logger` from `RUST_LOG`, falling back to `default_level`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging(default_level: LevelFilter) {
    let _ = env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .try_init();
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

/// Errors are the one level a module switch should rarely hide, so callers in
/// the scheduler keep `ENABLE_LOGS` on in release builds.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}
