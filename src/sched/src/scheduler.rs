use std::fmt::Debug;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use base::{DeferredRunner, TaskRunner};
use derivative::Derivative;
use enum_map::{EnumArray, EnumMap};
use log::{debug, error, warn};

use crate::worker;
use crate::{
    Backend, Error, JobInfo, ResourceId, ScheduleError, SchedulerConfig,
};

/// Dispatches jobs to caller-supplied worker threads, one independent
/// [`Backend`] per variant of the backend kind `K`.
///
/// The scheduler never spawns workers itself: threads join a backend
/// by calling [`use_backend_thread`](Scheduler::use_backend_thread).
/// Completion handlers run on the scheduler's [`TaskRunner`].
#[derive(Derivative)]
#[derivative(Debug(bound = "K: Debug"))]
pub struct Scheduler<K, R>
where
    K: EnumArray<Backend<R>>,
    R: ResourceId,
{
    config: SchedulerConfig,
    backends: EnumMap<K, Backend<R>>,
    runner: Arc<dyn TaskRunner>,
}

impl<K, R> Scheduler<K, R>
where
    K: EnumArray<Backend<R>> + Copy + Debug,
    R: ResourceId,
{
    /// Creates every backend and starts a background thread for
    /// completion handlers.
    pub fn new(config: SchedulerConfig) -> Result<Self, Error> {
        config.validate()?;
        let runner = DeferredRunner::new(config.runner_thread_name.clone())?;
        Self::with_runner(config, Arc::new(runner))
    }

    pub fn with_runner(config: SchedulerConfig, runner: Arc<dyn TaskRunner>) ->
        Result<Self, Error>
    {
        config.validate()?;
        let backends = EnumMap::from_fn(|kind: K| {
            Backend::new(format!("{:?}", kind), config.max_jobs)
        });
        debug!("Scheduler::new: {} backend(s), max_jobs = {}",
            backends.len(), config.max_jobs);
        Ok(Scheduler { config, backends, runner })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn backend(&self, kind: K) -> &Backend<R> {
        &self.backends[kind]
    }

    /// Queues a job. Never blocks.
    ///
    /// Exceeding `max_jobs` outstanding jobs on one backend is a bug in
    /// the caller: it panics in debug builds, and in release builds the
    /// job is dropped after logging an error. Use
    /// [`try_schedule_job`](Self::try_schedule_job) to handle a full
    /// backend gracefully.
    pub fn schedule_job(&self, kind: K, job: JobInfo<R>) {
        if let Err(job) = self.backends[kind].submit(job) {
            debug_assert!(false, "{:?}: too many outstanding jobs ({} max)",
                kind, self.config.max_jobs);
            error!("{:?}: backend full, dropping job {}", kind, job.name());
        }
    }

    pub fn try_schedule_job(&self, kind: K, job: JobInfo<R>) ->
        Result<(), ScheduleError<R>>
    {
        self.backends[kind].submit(job).map_err(ScheduleError::Full)
    }

    /// Turns the calling thread into a worker for `kind`. Returns once
    /// [`free_backend_threads`](Self::free_backend_threads) is called.
    pub fn use_backend_thread(&self, kind: K) {
        worker::run(&self.backends[kind], &*self.runner);
    }

    /// Asks every worker of `kind` to leave and blocks until they have.
    /// Jobs already running finish normally; jobs not yet admitted stay
    /// queued for whichever workers join next.
    pub fn free_backend_threads(&self, kind: K) {
        self.backends[kind].shut_down_workers();
    }

    /// Blocks until the queue of `kind` is observed empty.
    ///
    /// This is a best-effort barrier: jobs may be scheduled (and the
    /// last admitted jobs may still be running) by the time it returns.
    pub fn finish(&self, kind: K) {
        self.backends[kind].wait_until_drained(None);
    }

    /// Like [`finish`](Self::finish), but gives up after `timeout`.
    /// Returns whether the queue was observed empty.
    pub fn finish_timeout(&self, kind: K, timeout: Duration) -> bool {
        self.backends[kind].wait_until_drained(Some(timeout))
    }

    /// Destroys the scheduler. Equivalent to dropping it.
    pub fn release(self) {}
}

impl<K, R> Drop for Scheduler<K, R>
where
    K: EnumArray<Backend<R>>,
    R: ResourceId,
{
    fn drop(&mut self) {
        for backend in self.backends.values() {
            let workers = backend.active_workers();
            if workers == 0 { continue; }
            warn!("{}: scheduler released with {} active worker(s)",
                backend.label(), workers);
            if !thread::panicking() {
                debug_assert_eq!(workers, 0,
                    "{}: scheduler released with active workers",
                    backend.label());
            }
        }
    }
}
