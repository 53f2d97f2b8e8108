//! A job scheduler that admits work onto caller-managed worker threads
//! while keeping jobs that touch the same resources from running at the
//! same time.
//!
//! Every job declares which resources it reads and which it writes. A
//! worker only admits a job if none of its writes overlap a resource
//! that a running job reads or writes, and none of its reads overlap a
//! running job's writes. The declarations are trusted; nothing checks
//! what a handler actually touches.
//!
//! ```
//! use std::sync::Arc;
//! use kiln_sched::{Enum, JobInfo, Scheduler, SchedulerConfig, Signal};
//!
//! #[derive(Clone, Copy, Debug, Enum)]
//! enum Queue {
//!     Compute,
//!     Transfer,
//! }
//!
//! let sched: Scheduler<Queue, &str> =
//!     Scheduler::new(SchedulerConfig::default()).unwrap();
//! let done = Arc::new(Signal::new());
//! sched.schedule_job(Queue::Compute, JobInfo::new(|| {})
//!     .write("particles")
//!     .signal(Arc::clone(&done)));
//!
//! std::thread::scope(|s| {
//!     s.spawn(|| sched.use_backend_thread(Queue::Compute));
//!     done.wait();
//!     sched.free_backend_threads(Queue::Compute);
//! });
//! ```

mod backend;
mod config;
mod error;
mod job;
mod lock_table;
mod scheduler;
mod worker;

pub use backend::Backend;
pub use base::{DeferredRunner, InlineRunner, Signal, Task, TaskRunner};
pub use config::*;
pub use enum_map::Enum;
pub use error::*;
pub use job::*;
pub use lock_table::*;
pub use scheduler::*;
