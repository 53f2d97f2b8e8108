use std::time::{Duration, Instant};

use more_asserts::debug_assert_le;
use parking_lot::{Condvar, Mutex};

#[derive(Debug)]
struct State {
    count: u32,
    closed: bool,
}

/// A counting semaphore holding at most `capacity` units.
///
/// Closing the semaphore releases every waiter without handing out
/// units; acquires fail until it is reopened.
#[derive(Debug)]
pub struct Semaphore {
    state: Mutex<State>,
    cond: Condvar,
    capacity: u32,
}

impl Semaphore {
    /// Creates an empty semaphore.
    pub fn new(capacity: u32) -> Self {
        Self::with_count(0, capacity)
    }

    pub fn with_count(count: u32, capacity: u32) -> Self {
        debug_assert_le!(count, capacity);
        Semaphore {
            state: Mutex::new(State { count, closed: false }),
            cond: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of units that could be acquired without blocking.
    pub fn available(&self) -> u32 {
        self.state.lock().count
    }

    /// Blocks until a unit is available, then takes it. Returns false
    /// without taking anything if the semaphore is or becomes closed.
    pub fn acquire(&self) -> bool {
        let mut state = self.state.lock();
        while state.count == 0 && !state.closed {
            self.cond.wait(&mut state);
        }
        take(&mut state)
    }

    pub fn try_acquire(&self) -> bool {
        take(&mut self.state.lock())
    }

    /// Returns false if no unit became available before the timeout.
    pub fn acquire_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.count == 0 && !state.closed {
            if self.cond.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        take(&mut state)
    }

    pub fn release(&self, units: u32) {
        if units == 0 { return; }
        {
            let mut state = self.state.lock();
            debug_assert_le!(state.count + units, self.capacity,
                "semaphore released past its capacity");
            state.count += units;
        }
        if units == 1 {
            self.cond.notify_one();
        } else {
            self.cond.notify_all();
        }
    }

    /// Wakes every waiter; acquires fail until `reopen`. Units already
    /// counted are kept.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.cond.notify_all();
    }

    pub fn reopen(&self) {
        self.state.lock().closed = false;
        self.cond.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

fn take(state: &mut State) -> bool {
    if state.closed || state.count == 0 { return false; }
    state.count -= 1;
    true
}
