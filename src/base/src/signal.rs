use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// A manually-reset binary event.
///
/// Once set, every current and future waiter is released until the
/// signal is explicitly reset.
#[derive(Debug, Default)]
pub struct Signal {
    state: Mutex<bool>,
    cond: Condvar,
}

impl Signal {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn set(&self) {
        *self.state.lock() = true;
        self.cond.notify_all();
    }

    pub fn reset(&self) {
        *self.state.lock() = false;
    }

    pub fn is_set(&self) -> bool {
        *self.state.lock()
    }

    pub fn wait(&self) {
        let mut state = self.state.lock();
        while !*state {
            self.cond.wait(&mut state);
        }
    }

    /// Returns whether the signal was set before the timeout elapsed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !*state {
            if self.cond.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        *state
    }
}
