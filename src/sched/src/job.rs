use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use base::{Signal, Task};
use derivative::Derivative;
use smallvec::SmallVec;

/// Names a shared resource for lock-conflict purposes. The scheduler
/// attaches no meaning to it beyond equality.
pub trait ResourceId: Clone + Debug + Eq + Hash + Send + Sync + 'static {}

impl<T> ResourceId for T
    where T: Clone + Debug + Eq + Hash + Send + Sync + 'static
{}

pub type LockSet<R> = SmallVec<[R; 4]>;

/// A unit of work plus the resources it touches.
///
/// Once scheduled, this doubles as the job's descriptor: it lives in
/// the backend's pool until the job completes.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct JobInfo<R> {
    pub(crate) name: Option<&'static str>,
    // Taken at admission
    #[derivative(Debug = "ignore")]
    pub(crate) handler: Option<Task>,
    #[derivative(Debug = "ignore")]
    pub(crate) completion: Option<Task>,
    pub(crate) signal: Option<Arc<Signal>>,
    pub(crate) read_locks: LockSet<R>,
    pub(crate) write_locks: LockSet<R>,
}

impl<R: ResourceId> JobInfo<R> {
    pub fn new(handler: impl FnOnce() + Send + 'static) -> Self {
        JobInfo {
            name: None,
            handler: Some(Box::new(handler)),
            completion: None,
            signal: None,
            read_locks: SmallVec::new(),
            write_locks: SmallVec::new(),
        }
    }

    /// Label used in log output.
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = Some(name);
        self
    }

    /// Declares shared access to `resource`.
    pub fn read(mut self, resource: R) -> Self {
        self.read_locks.push(resource);
        self
    }

    pub fn reads(mut self, resources: impl IntoIterator<Item = R>) -> Self {
        self.read_locks.extend(resources);
        self
    }

    /// Declares exclusive access to `resource`.
    pub fn write(mut self, resource: R) -> Self {
        self.write_locks.push(resource);
        self
    }

    pub fn writes(mut self, resources: impl IntoIterator<Item = R>) -> Self {
        self.write_locks.extend(resources);
        self
    }

    /// Runs `f` on the scheduler's task runner once the job finishes.
    pub fn on_complete(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.completion = Some(Box::new(f));
        self
    }

    /// Sets `signal` once the job finishes, after the completion
    /// handler has been handed off.
    pub fn signal(mut self, signal: Arc<Signal>) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name.unwrap_or("<unnamed>")
    }

    pub fn read_locks(&self) -> &[R] {
        &self.read_locks
    }

    pub fn write_locks(&self) -> &[R] {
        &self.write_locks
    }

    pub fn has_locks(&self) -> bool {
        !(self.read_locks.is_empty() && self.write_locks.is_empty())
    }
}
