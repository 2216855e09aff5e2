//! Request scope and cancellation
//!
//! Every public operation takes a [`RequestScope`]: the correlation ids of the
//! request plus its cancellation signal and optional deadline. Operations call
//! [`RequestScope::guard`] before expensive work and [`RequestScope::run`]
//! around anything that may block.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use uuid::Uuid;

use crate::errors::{AppError, ErrorKind};

/// Shared abort flag; clones observe the same cancellation
#[derive(Debug, Clone)]
pub struct CancelSignal {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelSignal {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives as long as `self`, so this only returns on cancel
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Typed per-request state threaded through every call
#[derive(Debug, Clone)]
pub struct RequestScope {
    request_id: String,
    user_id: Option<Uuid>,
    deadline: Option<Instant>,
    signal: CancelSignal,
}

impl RequestScope {
    /// New scope with a generated request id, no deadline and a fresh signal
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            user_id: None,
            deadline: None,
            signal: CancelSignal::new(),
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_signal(mut self, signal: CancelSignal) -> Self {
        self.signal = signal;
        self
    }

    /// Set a deadline; an earlier existing deadline is kept
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        });
        self
    }

    /// Child scope sharing ids and signal, bounded by `timeout` from now
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.clone().with_deadline(Instant::now() + timeout)
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.user_id
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn signal(&self) -> &CancelSignal {
        &self.signal
    }

    /// Cancel this scope and every clone of it
    pub fn cancel(&self) {
        self.signal.cancel();
    }

    /// Why the scope is done, if it is. Explicit cancellation wins over an
    /// elapsed deadline.
    pub fn state(&self) -> Option<ErrorKind> {
        if self.signal.is_cancelled() {
            return Some(ErrorKind::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ErrorKind::Timeout),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.state().is_some()
    }

    /// Fail with a pre-classified error if the scope is already done
    pub fn guard(&self, operation: &str) -> Result<(), AppError> {
        match self.state() {
            Some(kind) => Err(self.done_error(kind, operation)),
            None => Ok(()),
        }
    }

    /// Drive `future` until it completes, the signal fires or the deadline
    /// passes, whichever happens first
    pub async fn run<F>(&self, operation: &str, future: F) -> Result<F::Output, AppError>
    where
        F: Future,
    {
        self.guard(operation)?;

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.signal.cancelled() => Err(self.done_error(ErrorKind::Cancelled, operation)),
            _ = deadline => Err(self.done_error(ErrorKind::Timeout, operation)),
            output = future => Ok(output),
        }
    }

    fn done_error(&self, kind: ErrorKind, operation: &str) -> AppError {
        let err = match kind {
            ErrorKind::Cancelled => AppError::cancellation_error(operation),
            _ => AppError::timeout_error(operation),
        };
        err.with_request_id(self.request_id.as_str())
    }
}

impl Default for RequestScope {
    fn default() -> Self {
        Self::new()
    }
}
