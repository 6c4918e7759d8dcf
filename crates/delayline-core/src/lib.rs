//! # delayline core
//!
//! Relay engine for delayline, a transparent TCP proxy that injects
//! configurable, direction-specific latency between a client and an upstream
//! service.
//!
//! This crate provides:
//! - The [`RelayLeg`] contract with two implementations: immediate copy
//!   ([`PassthroughLeg`]) and timed delivery ([`DelayedLeg`])
//! - Per-connection [`Session`]s pairing two legs into a bidirectional proxy
//! - The accepting [`Server`] that resolves delays and supervises sessions
//! - Log-normal delay sampling ([`DelaySampler`])
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Server                                  │
//! │   (accept loop, per-connection delay resolution, drain)         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                         Session                                 │
//! │   (client + upstream connection pair, shared cancellation)      │
//! ├────────────────────────────────┬────────────────────────────────┤
//! │        upstream leg            │         downstream leg         │
//! │   (client -> upstream bytes)   │    (upstream -> client bytes)  │
//! └────────────────────────────────┴────────────────────────────────┘
//! ```
//!
//! Every layer receives a [`tokio_util::sync::CancellationToken`] derived
//! from its parent; cancellation propagates downward only, and either leg of
//! a session finishing cancels its sibling.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod delay;
pub mod delayed;
pub mod error;
pub mod leg;
pub mod passthrough;
pub mod server;
pub mod session;

pub use delay::DelaySampler;
pub use delayed::DelayedLeg;
pub use error::{LegError, ServerError, SessionError};
pub use leg::{RelayLeg, build_leg};
pub use passthrough::PassthroughLeg;
pub use server::{Server, ServerConfig};
pub use session::Session;

use std::time::Duration;

/// Read buffer size per relay leg
pub const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// How long a blocked read waits before re-checking cancellation
pub const READ_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Capacity of the pending-chunk queue in a delayed leg
pub const DELAY_QUEUE_DEPTH: usize = 1024;
