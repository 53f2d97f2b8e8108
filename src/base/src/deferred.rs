//! Runs one-shot callbacks "at some point soon" off the caller's
//! thread.

use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam_channel as cc;
use log::{error, trace, warn};

pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Something that accepts tasks for asynchronous execution.
pub trait TaskRunner: fmt::Debug + Send + Sync {
    fn submit(&self, task: Task);
}

/// Runs tasks immediately on the submitting thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineRunner;

impl TaskRunner for InlineRunner {
    fn submit(&self, task: Task) {
        run_task(task);
    }
}

/// Pumps tasks on a dedicated background thread in submission order.
/// Dropping the runner finishes any pending tasks and joins the thread.
#[derive(Debug)]
pub struct DeferredRunner {
    sender: Option<cc::Sender<Task>>,
    thread: Option<JoinHandle<()>>,
}

fn run_task(task: Task) {
    if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
        error!("deferred task panicked");
    }
}

fn pump(receiver: cc::Receiver<Task>) {
    while let Ok(task) = receiver.recv() {
        run_task(task);
    }
    trace!("DeferredRunner: channel closed");
}

impl DeferredRunner {
    pub fn new(thread_name: impl Into<String>) -> io::Result<Self> {
        let (sender, receiver) = cc::unbounded::<Task>();
        let thread = thread::Builder::new()
            .name(thread_name.into())
            .spawn(move || pump(receiver))?;
        Ok(DeferredRunner {
            sender: Some(sender),
            thread: Some(thread),
        })
    }

    /// Number of tasks waiting to run.
    pub fn pending(&self) -> usize {
        self.sender.as_ref().map_or(0, |sender| sender.len())
    }
}

impl TaskRunner for DeferredRunner {
    fn submit(&self, task: Task) {
        let res = match self.sender {
            Some(ref sender) => sender.send(task).map_err(|e| e.into_inner()),
            None => Err(task),
        };
        // Should only happen if the pump thread died
        if let Err(task) = res {
            warn!("DeferredRunner: pump thread is gone; running task inline");
            run_task(task);
        }
    }
}

impl Drop for DeferredRunner {
    fn drop(&mut self) {
        self.sender = None;
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("DeferredRunner: pump thread panicked");
            }
        }
    }
}
