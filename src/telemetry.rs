//! Tracing subscriber setup.
//!
//! Library code only emits `tracing` events; binaries and tests decide where
//! they go by calling [`init_tracing`] once.

use tracing::Level;

/// Installs a formatting subscriber at the given maximum level.
///
/// Returns `false` when a global subscriber was already installed, which is
/// expected when several tests share a process.
pub fn init_tracing(level: Level) -> bool {
  tracing_subscriber::fmt()
    .with_max_level(level)
    .with_target(true)
    .try_init()
    .is_ok()
}
