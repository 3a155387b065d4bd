//! Simulation error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("invariant violated at {time_ns}ns: {message}")]
    InvariantViolation { message: String, time_ns: u64 },

    #[error("unknown node {0}")]
    UnknownNode(u64),

    #[error("trace I/O failed: {0}")]
    TraceIo(#[from] std::io::Error),
}
