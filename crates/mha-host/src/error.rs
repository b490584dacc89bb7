// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error types for process execution.

use crate::CancelReason;
use std::fmt;
use thiserror::Error;

/// Which stream operation failed mid-exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IoStage {
    /// Writing the request to the child's stdin.
    WriteStdin,
    /// Reading the response line from the child's stdout.
    ReadStdout,
    /// Waiting for the child to exit.
    Wait,
}

impl fmt::Display for IoStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WriteStdin => f.write_str("write child stdin"),
            Self::ReadStdout => f.write_str("read child stdout"),
            Self::Wait => f.write_str("wait for child"),
        }
    }
}

/// Errors from a single process execution.
#[derive(Debug, Error)]
pub enum ExecError {
    /// Stdio handles could not be acquired; no exchange took place.
    #[error("process setup failed: {0}")]
    Setup(String),

    /// The OS refused to start the process.
    #[error("failed to start `{command}`: {source}")]
    Start {
        /// Command that was launched.
        command: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// A stream operation failed after the process started.
    #[error("failed to {stage}: {source}")]
    Io {
        /// The failing operation.
        stage: IoStage,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The process ran and exited unsuccessfully.
    #[error("process exited unsuccessfully ({})", exit_label(.code))]
    Process {
        /// Exit code, or `None` when terminated by a signal.
        code: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },

    /// The execution context ended first; the process was killed.
    #[error("process execution {reason}")]
    Cancelled {
        /// Why the context ended.
        reason: CancelReason,
        /// Standard error captured before the kill.
        stderr: String,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("code={c}"),
        None => "terminated by signal".to_string(),
    }
}

/// Coarse classification of an [`ExecError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// See [`ExecError::Setup`].
    Setup,
    /// See [`ExecError::Start`].
    Start,
    /// See [`ExecError::Io`].
    Io,
    /// See [`ExecError::Process`].
    Process,
    /// See [`ExecError::Cancelled`].
    Cancelled,
}

impl ErrorKind {
    /// Stable lower-case label, used as a log field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Start => "start",
            Self::Io => "io",
            Self::Process => "process",
            Self::Cancelled => "cancelled",
        }
    }
}

impl ExecError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Setup(_) => ErrorKind::Setup,
            Self::Start { .. } => ErrorKind::Start,
            Self::Io { .. } => ErrorKind::Io,
            Self::Process { .. } => ErrorKind::Process,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// Cancellation with nothing captured yet.
    pub fn cancelled(reason: CancelReason) -> Self {
        Self::Cancelled {
            reason,
            stderr: String::new(),
        }
    }

    /// Captured standard error, when the process ran to a failure exit or
    /// was killed on cancellation.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::Process { stderr, .. } | Self::Cancelled { stderr, .. } => Some(stderr.as_str()),
            _ => None,
        }
    }

    /// Returns `true` if the context ended before the process finished.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
