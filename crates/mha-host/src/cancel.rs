// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cooperative cancellation for process executions.

use std::fmt;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Cooperative cancellation token.
///
/// Cloneable and backed by an `Arc`; calling [`cancel`](CancelToken::cancel)
/// on any clone signals all waiters.
#[derive(Clone, Debug)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelToken {
    /// Create a new, non-cancelled token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Signal cancellation to all waiters.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Returns `true` if cancellation has been signalled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Wait until cancellation is signalled (returns immediately if already cancelled).
    pub async fn cancelled(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent `cancel` cannot
        // slip between the check and the await.
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }

    /// Return a guard that cancels this token when dropped.
    pub fn drop_guard(&self) -> CancelGuard {
        CancelGuard {
            token: Some(self.clone()),
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancels its token on drop unless [`disarm`](CancelGuard::disarm)ed.
#[derive(Debug)]
pub struct CancelGuard {
    token: Option<CancelToken>,
}

impl CancelGuard {
    /// Release the guard without cancelling, returning the token.
    pub fn disarm(mut self) -> CancelToken {
        self.token.take().unwrap_or_default()
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
    }
}

/// Why an execution context finished early.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelReason {
    /// The caller cancelled (e.g. the HTTP client went away).
    Cancelled,
    /// The context deadline elapsed.
    DeadlineExceeded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => f.write_str("cancelled by caller"),
            Self::DeadlineExceeded => f.write_str("deadline exceeded"),
        }
    }
}

/// Cancellation token plus optional deadline bounding one execution.
///
/// An optional parent token ends the context too, so one server-wide token
/// can cancel every execution derived from it.
#[derive(Clone, Debug, Default)]
pub struct ExecContext {
    cancel: CancelToken,
    parent: Option<CancelToken>,
    deadline: Option<Instant>,
}

impl ExecContext {
    /// A context that ends only when `cancel` fires.
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            cancel,
            parent: None,
            deadline: None,
        }
    }

    /// Also end the context when `parent` is cancelled.
    pub fn with_parent(mut self, parent: CancelToken) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Bound the context to `timeout` from now, keeping any earlier deadline.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Bound the context to `deadline`, keeping any earlier deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        self
    }

    /// The cancellation token driving this context.
    pub fn token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Effective deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Non-blocking check; `Err` when the context has already ended.
    pub fn check(&self) -> Result<(), CancelReason> {
        let parent_cancelled = self.parent.as_ref().is_some_and(CancelToken::is_cancelled);
        if self.cancel.is_cancelled() || parent_cancelled {
            return Err(CancelReason::Cancelled);
        }
        match self.deadline {
            Some(d) if Instant::now() >= d => Err(CancelReason::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Resolve once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> CancelReason {
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = self.cancelled() => CancelReason::Cancelled,
                _ = tokio::time::sleep_until(deadline) => CancelReason::DeadlineExceeded,
            },
            None => {
                self.cancelled().await;
                CancelReason::Cancelled
            }
        }
    }

    async fn cancelled(&self) {
        match &self.parent {
            Some(parent) => tokio::select! {
                _ = self.cancel.cancelled() => {}
                _ = parent.cancelled() => {}
            },
            None => self.cancel.cancelled().await,
        }
    }
}
