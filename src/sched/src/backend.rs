use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use base::{Handle, Pool, Semaphore, Task};
use derivative::Derivative;
use log::{debug, trace};
use more_asserts::debug_assert_gt;
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::{JobInfo, LockTable, ResourceId};

pub(crate) type JobHandle<R> = Handle<JobInfo<R>>;

/// Everything guarded by the backend lock.
#[derive(Debug)]
pub(crate) struct BackendState<R: ResourceId> {
    pub(crate) pool: Pool<JobInfo<R>>,
    // Admission queue, in submission order
    pub(crate) queue: Vec<JobHandle<R>>,
    pub(crate) locks: LockTable<R>,
    pub(crate) active_workers: u32,
}

/// A job that has been admitted but not yet retired.
#[derive(Derivative)]
#[derivative(Debug)]
pub(crate) struct Claim<R> {
    pub(crate) handle: JobHandle<R>,
    pub(crate) name: &'static str,
    #[derivative(Debug = "ignore")]
    pub(crate) handler: Option<Task>,
}

impl<R: ResourceId> BackendState<R> {
    /// Admits the first job in the queue whose locks don't conflict
    /// with any running job.
    pub(crate) fn admit_first(&mut self) -> Option<Claim<R>> {
        let BackendState { pool, queue, locks, .. } = self;
        let pos = queue.iter().position(|handle| {
            let job = &pool[handle];
            locks.admits(&job.read_locks, &job.write_locks)
        })?;

        let handle = queue.remove(pos);
        let job = &mut pool[&handle];
        if job.has_locks() {
            locks.acquire(&job.read_locks, &job.write_locks);
        }
        Some(Claim {
            name: job.name(),
            handler: job.handler.take(),
            handle,
        })
    }

    /// Releases a finished job's locks and returns its descriptor to
    /// the pool.
    pub(crate) fn retire(&mut self, handle: JobHandle<R>) -> Option<JobInfo<R>> {
        let job = self.pool.remove(handle)?;
        if job.has_locks() {
            self.locks.release(&job.read_locks, &job.write_locks);
        }
        Some(job)
    }
}

/// An independent scheduling domain: one queue, one lock table, and
/// whatever worker threads the caller dedicates to it.
#[derive(Debug)]
pub struct Backend<R: ResourceId> {
    label: String,
    state: Mutex<BackendState<R>>,
    // Notified whenever the queue, lock table, worker count, or
    // shutdown flag changes.
    changed: Condvar,
    // One unit per queued job not yet claimed by a worker
    sem: Semaphore,
    shutdown: AtomicBool,
}

impl<R: ResourceId> Backend<R> {
    pub(crate) fn new(label: String, max_jobs: u32) -> Self {
        Backend {
            label,
            state: Mutex::new(BackendState {
                pool: Pool::with_capacity(max_jobs),
                queue: Vec::with_capacity(max_jobs as usize),
                locks: LockTable::new(),
                active_workers: 0,
            }),
            changed: Condvar::new(),
            sem: Semaphore::new(max_jobs),
            shutdown: AtomicBool::new(false),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Maximum number of outstanding (queued or running) jobs.
    pub fn capacity(&self) -> u32 {
        self.state.lock().pool.capacity()
    }

    /// Jobs waiting for admission.
    pub fn queued_jobs(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Jobs queued or running.
    pub fn outstanding_jobs(&self) -> u32 {
        self.state.lock().pool.len()
    }

    pub fn active_workers(&self) -> u32 {
        self.state.lock().active_workers
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// True if no running job holds any lock.
    pub fn is_unlocked(&self) -> bool {
        self.state.lock().locks.is_empty()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, BackendState<R>> {
        self.state.lock()
    }

    pub(crate) fn wait(&self, state: &mut MutexGuard<'_, BackendState<R>>) {
        self.changed.wait(state);
    }

    pub(crate) fn notify(&self) {
        self.changed.notify_all();
    }

    /// Returns false once the backend starts shutting down.
    pub(crate) fn acquire_unit(&self) -> bool {
        self.sem.acquire()
    }

    /// Gives back a unit whose job is still queued.
    pub(crate) fn return_unit(&self) {
        self.sem.release(1);
    }

    pub(crate) fn submit(&self, job: JobInfo<R>) -> Result<(), JobInfo<R>> {
        let mut state = self.state.lock();
        let handle = state.pool.insert(job)?;
        trace!("{}: queued job {} ({:?})",
            self.label, state.pool[&handle].name(), handle);
        state.queue.push(handle);
        std::mem::drop(state);

        self.changed.notify_all();
        self.sem.release(1);
        Ok(())
    }

    pub(crate) fn enter_worker(&self) {
        self.state.lock().active_workers += 1;
        self.changed.notify_all();
    }

    pub(crate) fn exit_worker(&self) {
        {
            let mut state = self.state.lock();
            debug_assert_gt!(state.active_workers, 0);
            state.active_workers -= 1;
        }
        self.changed.notify_all();
    }

    /// Tells every worker to leave and waits for them to do so.
    /// Running jobs are allowed to finish; queued jobs stay queued.
    pub(crate) fn shut_down_workers(&self) {
        let workers = {
            let state = self.state.lock();
            self.shutdown.store(true, Ordering::SeqCst);
            state.active_workers
        };
        debug!("{}: shutting down {} worker(s)", self.label, workers);
        self.sem.close();
        self.changed.notify_all();

        let mut state = self.state.lock();
        while state.active_workers > 0 {
            self.changed.wait(&mut state);
        }
        self.shutdown.store(false, Ordering::SeqCst);
        self.sem.reopen();
        debug!("{}: all workers gone, {} job(s) left queued",
            self.label, state.queue.len());
    }

    /// Blocks until the queue is observed empty or the deadline passes.
    /// Returns whether the queue was observed empty.
    pub(crate) fn wait_until_drained(&self, timeout: Option<Duration>) -> bool
    {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let mut state = self.state.lock();
        while !state.queue.is_empty() {
            match deadline {
                Some(deadline) => {
                    let res = self.changed.wait_until(&mut state, deadline);
                    if res.timed_out() {
                        return state.queue.is_empty();
                    }
                },
                None => self.changed.wait(&mut state),
            }
        }
        true
    }
}
