//! # Readiness Gate
//!
//! Tracks the handler's connection state and holds the callbacks registered
//! before the handler became ready.
//!
//! Guarantees:
//!
//! - callbacks registered before ready fire exactly once, in registration order,
//!   when ready is first reached;
//! - callbacks registered once ready fire immediately, on the caller's thread;
//! - a second ready signal is rejected, so nothing is ever delivered twice;
//! - once ready can no longer be reached, new callbacks are dropped.
//!
//! Draining happens without holding the lock. While the queue drains the state
//! is still `Connecting`, so a callback registered from inside another callback
//! is appended to the queue and keeps its place in line.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, error, warn};

use super::states::{transition, ConnectionState, LifecycleEvent};

/// Callback fired once the handler is ready
pub type ReadyCallback = Box<dyn FnOnce() + Send>;

struct GateInner {
    state: ConnectionState,
    ready_reached: bool,
    queue: VecDeque<ReadyCallback>,
}

/// Connection state machine with a FIFO queue of ready callbacks
pub struct ReadinessGate {
    inner: Mutex<GateInner>,
}

impl std::fmt::Debug for ReadinessGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ReadinessGate")
            .field("state", &inner.state)
            .field("ready_reached", &inner.ready_reached)
            .field("queued", &inner.queue.len())
            .finish()
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(GateInner {
                state: ConnectionState::Disconnected,
                ready_reached: false,
                queue: VecDeque::new(),
            }),
        }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    /// Whether ready has ever been reached
    pub fn has_been_ready(&self) -> bool {
        self.inner.lock().ready_reached
    }

    /// Number of callbacks waiting for ready
    pub fn pending_callbacks(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Apply a non-ready lifecycle event; returns the new state if the transition was valid
    pub fn apply(&self, event: LifecycleEvent) -> Option<ConnectionState> {
        if event == LifecycleEvent::TopologyReady {
            warn!("TopologyReady must go through mark_ready, ignoring");
            return None;
        }

        let mut inner = self.inner.lock();
        match transition(inner.state, &event) {
            Some(next) => {
                debug!(
                    from = %inner.state,
                    to = %next,
                    event = event.event_type(),
                    "🔄 Connection state transition"
                );
                inner.state = next;
                Some(next)
            }
            None => {
                debug!(
                    state = %inner.state,
                    event = event.event_type(),
                    "Ignoring lifecycle event with no valid transition"
                );
                None
            }
        }
    }

    /// Run `callback` now if ready, otherwise queue it for the first ready signal.
    ///
    /// Returns `false` and drops the callback when ready can no longer be
    /// reached: setup failed, or the connection was lost after ready.
    pub fn on_ready(&self, callback: ReadyCallback) -> bool {
        {
            let mut inner = self.inner.lock();
            if inner.state.is_terminal()
                || (inner.ready_reached && inner.state == ConnectionState::Disconnected)
            {
                warn!(
                    state = %inner.state,
                    "⚠️ Ready callback dropped, the handler will not become ready again"
                );
                return false;
            }
            if !inner.state.is_ready() {
                inner.queue.push_back(callback);
                return true;
            }
        }
        Self::invoke(callback);
        true
    }

    /// Flip to ready and drain the queue.
    ///
    /// Returns `false` without side effects if ready was already reached or the
    /// current state cannot transition to ready.
    pub fn mark_ready(&self) -> bool {
        {
            let mut inner = self.inner.lock();
            if inner.ready_reached
                || transition(inner.state, &LifecycleEvent::TopologyReady).is_none()
            {
                warn!(
                    state = %inner.state,
                    ready_reached = inner.ready_reached,
                    "⚠️ Rejected ready signal"
                );
                return false;
            }
            inner.ready_reached = true;
        }

        let mut drained = 0usize;
        loop {
            let next = {
                let mut inner = self.inner.lock();
                match inner.queue.pop_front() {
                    Some(callback) => callback,
                    None => {
                        // Losing the connection while draining leaves the later state in place
                        if inner.state == ConnectionState::Connecting {
                            inner.state = ConnectionState::Ready;
                        }
                        break;
                    }
                }
            };
            Self::invoke(next);
            drained += 1;
        }

        debug!(drained = drained, "✅ Readiness gate open");
        true
    }

    fn invoke(callback: ReadyCallback) {
        if catch_unwind(AssertUnwindSafe(callback)).is_err() {
            error!("❌ Ready callback panicked");
        }
    }
}
