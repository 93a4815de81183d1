//! Logging setup for the engine, its hosts and test harnesses.
//!
//! Output is JSON lines unless `LEARNSTREAK_LOG_FORMAT=text`; filtering follows
//! `RUST_LOG`.

pub mod tracing;

pub use self::tracing::{LOG_FORMAT_VAR, LogFormat, init_with};

/// Install the process-wide subscriber. Later calls are no-ops.
pub fn init() {
    self::tracing::init();
}
