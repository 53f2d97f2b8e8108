//! The loop run by every thread dedicated to a backend.

use std::panic::{self, AssertUnwindSafe};
use std::thread;

use base::{Task, TaskRunner};
use log::{debug, error, trace};

use crate::backend::{Backend, Claim};
use crate::ResourceId;

/// Runs jobs from `backend` on the calling thread until the backend is
/// shut down.
pub(crate) fn run<R: ResourceId>(backend: &Backend<R>, runner: &dyn TaskRunner)
{
    backend.enter_worker();
    debug!("{}: worker {:?} started", backend.label(), thread::current().name());

    while let Some(mut claim) = next_job(backend) {
        if let Some(handler) = claim.handler.take() {
            execute(backend, claim.name, handler);
        }
        complete(backend, runner, claim);
    }

    debug!("{}: worker {:?} exiting", backend.label(), thread::current().name());
    backend.exit_worker();
}

/// Waits for a submission, then for an admissible job. Returns `None`
/// on shutdown.
fn next_job<R: ResourceId>(backend: &Backend<R>) -> Option<Claim<R>> {
    if !backend.acquire_unit() {
        return None;
    }

    let mut state = backend.lock();
    loop {
        // The unit taken above belongs to a job that is still queued
        if backend.is_shutting_down() {
            std::mem::drop(state);
            backend.return_unit();
            return None;
        }
        if let Some(claim) = state.admit_first() {
            std::mem::drop(state);
            trace!("{}: admitted job {}", backend.label(), claim.name);
            backend.notify();
            return Some(claim);
        }
        // Every queued job conflicts with a running one; wait for a
        // release or a new submission.
        backend.wait(&mut state);
    }
}

/// Runs the handler with no scheduler lock held. A panic is contained
/// here so the job still gets retired and the worker keeps going.
fn execute<R: ResourceId>(backend: &Backend<R>, name: &str, handler: Task) {
    if panic::catch_unwind(AssertUnwindSafe(handler)).is_err() {
        error!("{}: job {} panicked", backend.label(), name);
    }
}

fn complete<R: ResourceId>(
    backend: &Backend<R>,
    runner: &dyn TaskRunner,
    claim: Claim<R>,
) {
    let job = backend.lock().retire(claim.handle);
    backend.notify();
    trace!("{}: retired job {}", backend.label(), claim.name);

    let job = match job {
        Some(job) => job,
        None => {
            error!("{}: job {} vanished from the pool", backend.label(),
                claim.name);
            return;
        },
    };
    if let Some(completion) = job.completion {
        runner.submit(completion);
    }
    if let Some(signal) = job.signal {
        signal.set();
    }
}
