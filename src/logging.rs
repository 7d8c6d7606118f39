//! Diagnostic logging setup
//!
//! Logs go to stderr so they never interleave with REPL output on stdout.

use std::io;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber
///
/// `RUST_LOG` takes precedence over `level` when it is set.
pub fn init(level: LevelFilter) -> Result<(), TryInitError> {
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .finish()
        .try_init()
}
