//! Process-wide tracing setup for binaries hosting the command side.

/// Initialize tracing from the environment (`RUST_LOG`, `KEYWARD_LOG_FORMAT`).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Subscriber configuration (filter, output format).
pub mod tracing;

pub use crate::tracing::{init_with, LogFormat, LogFormatError};
