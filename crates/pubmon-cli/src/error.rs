//! CLI error types.

use thiserror::Error;

/// Session errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Instrumentation error that stops the session.
    #[error("instrumentation error: {0}")]
    Monitor(#[from] pubmon_core::Error),
}
