//! Consumer-side wakeup counter.
//!
//! Each unit of the count corresponds to one empty→non-empty transition
//! reported by [`QueueSender::send`](crate::queue::QueueSender::send); the
//! count starts at zero and is incremented nowhere else. One successful
//! [`Signal::wait`] may therefore cover a whole backlog, and the waiter is
//! expected to drain the queue completely before waiting again.

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Default)]
struct State {
    pending: u64,
    closed: bool,
}

/// Counting wakeup signal with teardown support.
#[derive(Default)]
pub struct Signal {
    state: Mutex<State>,
    cv: Condvar,
}

impl Signal {
    /// A fresh signal with a pending count of zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one pending unit and wake a single waiter.
    pub fn raise(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.pending += 1;
        drop(state);
        self.cv.notify_one();
    }

    /// Block until a pending unit is available and consume it.
    ///
    /// Returns `false` only when the signal has been closed and no pending
    /// units remain, the cue for loops to stop.
    pub fn wait(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if state.pending > 0 {
                state.pending -= 1;
                return true;
            }
            if state.closed {
                return false;
            }
            state = self
                .cv
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`Signal::wait`] but gives up after `timeout`, returning `false`
    /// without consuming anything.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if state.pending > 0 {
                state.pending -= 1;
                return true;
            }
            if state.closed {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .cv
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }

    /// Close the signal and wake every waiter. Pending units can still be
    /// consumed; once drained, `wait` returns `false`.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.closed = true;
        drop(state);
        self.cv.notify_all();
    }

    /// Whether [`Signal::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .closed
    }
}
