//! Synchronization and allocation primitives shared by the scheduler.

mod deferred;
mod semaphore;
mod signal;
pub mod pool;

pub use deferred::*;
pub use pool::{Handle, Pool};
pub use semaphore::*;
pub use signal::*;
