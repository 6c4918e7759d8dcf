//! Error types for the relay engine.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors terminating a single relay leg
#[derive(Debug, Error)]
pub enum LegError {
    /// Read or write failure on one of the leg's endpoints
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The destination reported a zero-length write for a non-empty buffer
    #[error("destination accepted a zero-length write")]
    ZeroLengthWrite,

    /// A delayed chunk reached the write side with a capture time earlier
    /// than one already delivered
    #[error("delayed write out of order: capture time regressed by {regressed_by:?}")]
    OutOfOrder {
        /// How far behind the last delivered capture time the chunk was
        regressed_by: Duration,
    },
}

/// Errors terminating a session
#[derive(Debug, Error)]
pub enum SessionError {
    /// The upstream connection could not be established
    #[error("failed to dial upstream {addr}: {source}")]
    Dial {
        /// Address the session tried to reach
        addr: String,
        /// Underlying connect error
        source: io::Error,
    },

    /// One of the session's relay legs failed
    #[error("relay leg failed: {0}")]
    Leg(#[from] LegError),

    /// A relay leg task panicked or was aborted
    #[error("relay leg task failed: {0}")]
    TaskPanic(#[from] tokio::task::JoinError),
}

/// Errors raised by the listening server
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening socket could not be bound
    #[error("failed to bind listener on port {port}: {source}")]
    Bind {
        /// Requested listen port
        port: u16,
        /// Underlying bind error
        source: io::Error,
    },

    /// Listener I/O failure outside the accept loop
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
