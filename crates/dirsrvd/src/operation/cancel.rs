//! Single-shot cancellation slot shared between a worker and its cancellers.
//!
//! The slot holds at most one request (first writer wins) and at most one
//! published result. Cancellers block on a condition variable until the
//! worker publishes, or until their wait bound expires.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use strum::Display;

use dirsrv_types::ResultCode;

/// Why an operation is being cancelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelRequest {
    reason: String,
}

impl CancelRequest {
    /// Builds a request carrying a human-readable reason.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Reason reported as the cancelled operation's diagnostic message.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Outcome reported to the canceller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum CancelResult {
    /// The operation stopped at a phase boundary.
    Canceled,
    /// The operation had already passed the point of no return.
    TooLate,
    /// No outcome was published within the wait bound.
    CannotCancel,
    /// No in-flight operation matched the request.
    NoSuchOperation,
}

impl CancelResult {
    /// Result code returned to a client issuing a cancel request.
    #[must_use]
    pub const fn result_code(self) -> ResultCode {
        match self {
            Self::Canceled => ResultCode::Canceled,
            Self::TooLate => ResultCode::TooLate,
            Self::CannotCancel => ResultCode::CannotCancel,
            Self::NoSuchOperation => ResultCode::NoSuchOperation,
        }
    }
}

#[derive(Debug, Default)]
struct SlotState {
    request: Option<CancelRequest>,
    result: Option<CancelResult>,
}

#[derive(Debug, Default)]
struct CancelSlot {
    state: Mutex<SlotState>,
    published: Condvar,
}

impl CancelSlot {
    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Shared handle onto an operation's cancellation slot.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    slot: Arc<CancelSlot>,
}

impl CancelHandle {
    /// Creates an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `request` unless another request is already present.
    ///
    /// Returns `true` when this call installed the request.
    pub fn request(&self, request: CancelRequest) -> bool {
        let mut state = self.slot.lock();
        if state.request.is_some() {
            return false;
        }
        state.request = Some(request);
        true
    }

    /// Requests cancellation and waits up to `timeout` for the outcome.
    ///
    /// A result published before the request was installed (for example
    /// `TooLate` once the handler has returned) is reported immediately.
    #[must_use]
    pub fn cancel(&self, request: CancelRequest, timeout: Duration) -> CancelResult {
        self.request(request);
        self.wait(timeout)
    }

    /// Waits up to `timeout` for the worker to publish an outcome.
    #[must_use]
    pub fn wait(&self, timeout: Duration) -> CancelResult {
        let deadline = Instant::now() + timeout;
        let mut state = self.slot.lock();
        loop {
            if let Some(result) = state.result {
                return result;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return CancelResult::CannotCancel;
            }
            state = self
                .slot
                .published
                .wait_timeout(state, remaining)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
    }

    /// Pending request, if any. Read by the worker at phase boundaries.
    #[must_use]
    pub fn pending(&self) -> Option<CancelRequest> {
        self.slot.lock().request.clone()
    }

    /// Published outcome, if any.
    #[must_use]
    pub fn result(&self) -> Option<CancelResult> {
        self.slot.lock().result
    }

    /// Publishes `result` unless an outcome already exists, waking every
    /// waiting canceller. Returns the outcome now in effect.
    pub fn publish(&self, result: CancelResult) -> CancelResult {
        let mut state = self.slot.lock();
        let effective = *state.result.get_or_insert(result);
        drop(state);
        self.slot.published.notify_all();
        effective
    }

    /// Returns `true` when both handles share one slot.
    #[must_use]
    pub fn same_slot(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }

    /// Marks the point of no return.
    pub fn mark_too_late(&self) -> CancelResult {
        self.publish(CancelResult::TooLate)
    }
}
