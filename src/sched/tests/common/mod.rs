//! Shared setup for the integration tests: a two-backend scheduler and
//! helpers for running worker threads around a test body.
#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use kiln_sched::{Enum, Scheduler, SchedulerConfig, Signal};

#[derive(Clone, Copy, Debug, Enum, Eq, PartialEq)]
pub(crate) enum Kind {
    Main,
    Aux,
}

pub(crate) type Sched = Scheduler<Kind, &'static str>;

pub(crate) const TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub(crate) fn scheduler() -> Sched {
    scheduler_with(SchedulerConfig::default())
}

pub(crate) fn scheduler_with(config: SchedulerConfig) -> Sched {
    init_logging();
    Scheduler::new(config).unwrap()
}

/// Polls `cond` until it holds, failing the test after `TIMEOUT`.
pub(crate) fn wait_for(mut cond: impl FnMut() -> bool) {
    let start = Instant::now();
    while !cond() {
        assert!(start.elapsed() < TIMEOUT, "timed out waiting for condition");
        thread::sleep(Duration::from_millis(1));
    }
}

/// Frees a backend's workers even if the test body panics, so the
/// surrounding thread scope can still join them.
pub(crate) struct FreeOnDrop<'a>(pub(crate) &'a Sched, pub(crate) Kind);

impl Drop for FreeOnDrop<'_> {
    fn drop(&mut self) {
        self.0.free_backend_threads(self.1);
    }
}

/// Sets a signal on drop; used to unblock gated jobs on test failure.
pub(crate) struct SetOnDrop(pub(crate) Arc<Signal>);

impl Drop for SetOnDrop {
    fn drop(&mut self) {
        self.0.set();
    }
}

/// Runs `body` while `workers` threads serve `kind`, then frees them.
/// Every job admitted before the workers leave has finished by the time
/// this returns.
pub(crate) fn with_workers(
    sched: &Sched,
    kind: Kind,
    workers: u32,
    body: impl FnOnce(&Sched),
) {
    thread::scope(|s| {
        for i in 0..workers {
            thread::Builder::new()
                .name(format!("{:?}-worker-{}", kind, i))
                .spawn_scoped(s, move || sched.use_backend_thread(kind))
                .unwrap();
        }
        let _free = FreeOnDrop(sched, kind);
        wait_for(|| sched.backend(kind).active_workers() == workers);
        body(sched);
    });
}
