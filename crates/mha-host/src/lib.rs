// SPDX-License-Identifier: MIT OR Apache-2.0
//! mha-host
//!
//! Request-scoped execution of stdio child processes: spawn, feed one input
//! line, collect one output line, and tear everything down on every exit path.
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Cancellation tokens and execution deadlines.
pub mod cancel;
/// Execution error taxonomy.
pub mod error;
/// The process executor.
pub mod executor;

pub use cancel::{CancelGuard, CancelReason, CancelToken, ExecContext};
pub use error::{ErrorKind, ExecError, IoStage};
pub use executor::{
    CANCELLED_DRAIN_GRACE, DEFAULT_DRAIN_GRACE, DEFAULT_STDERR_LIMIT, ExecutionOutput,
    ExecutionRequest, ProcessExecutor,
};
