//! Process-wide logging setup shared by the kasir binaries.

/// Initialize structured logging with the default `info` level.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    logging::init_with_default("info");
}

pub mod logging;
