//! Logging setup, copied from the teacher's `logging.rs`: a single
//! `init_logging` entry point over `tracing-subscriber`'s `EnvFilter`.

use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{CoreError, Result};

/// Initializes the global `tracing` subscriber with the given filter
/// directive (e.g. `"info"`, `"aika_core=debug,warn"`). Call once at process
/// startup; a second call returns `Err` rather than silently no-op'ing.
pub fn init_logging(level: &str) -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_new(level)
                .map_err(|e| CoreError::Validation(format!("invalid log level: {e}")))?,
        )
        .with_target(true)
        .with_thread_ids(true)
        .try_init()
        .map_err(|_| CoreError::Validation("logging already initialized".into()))
}
