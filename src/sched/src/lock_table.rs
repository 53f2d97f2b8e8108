use fnv::FnvHashMap as HashMap;

use crate::ResourceId;

/// Tracks which resources are held by running jobs.
///
/// Both sides are multisets: a resource may be read-locked by any
/// number of jobs, or write-locked by exactly one job. The table is
/// advisory; it only knows what jobs declare.
#[derive(Debug)]
pub struct LockTable<R: ResourceId> {
    reads: HashMap<R, u32>,
    writes: HashMap<R, u32>,
}

impl<R: ResourceId> Default for LockTable<R> {
    fn default() -> Self {
        LockTable {
            reads: Default::default(),
            writes: Default::default(),
        }
    }
}

fn insert<R: ResourceId>(map: &mut HashMap<R, u32>, resource: &R) {
    *map.entry(resource.clone()).or_insert(0) += 1;
}

fn remove_one<R: ResourceId>(map: &mut HashMap<R, u32>, resource: &R) -> bool
{
    let count = match map.get_mut(resource) {
        Some(count) => count,
        None => return false,
    };
    *count -= 1;
    if *count == 0 {
        map.remove(resource);
    }
    true
}

impl<R: ResourceId> LockTable<R> {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn is_empty(&self) -> bool {
        self.reads.is_empty() && self.writes.is_empty()
    }

    pub fn readers(&self, resource: &R) -> u32 {
        self.reads.get(resource).copied().unwrap_or(0)
    }

    pub fn is_write_locked(&self, resource: &R) -> bool {
        self.writes.contains_key(resource)
    }

    /// True if a job declaring these locks could start right now.
    pub fn admits(&self, reads: &[R], writes: &[R]) -> bool {
        if reads.is_empty() && writes.is_empty() {
            return true;
        }
        writes.iter().all(|r| {
            !self.reads.contains_key(r) && !self.writes.contains_key(r)
        }) && reads.iter().all(|r| !self.writes.contains_key(r))
    }

    pub fn acquire(&mut self, reads: &[R], writes: &[R]) {
        debug_assert!(self.admits(reads, writes));
        for r in reads {
            insert(&mut self.reads, r);
        }
        for r in writes {
            insert(&mut self.writes, r);
        }
    }

    /// Removes one occurrence of each lock. A missing entry means
    /// acquire and release got out of step, which is fatal in debug
    /// builds; release builds log it and carry on.
    pub fn release(&mut self, reads: &[R], writes: &[R]) {
        for r in reads {
            if !remove_one(&mut self.reads, r) {
                missing_lock("read", r);
            }
        }
        for r in writes {
            if !remove_one(&mut self.writes, r) {
                missing_lock("write", r);
            }
        }
    }
}

#[cfg(debug_assertions)]
fn missing_lock<R: ResourceId>(kind: &str, resource: &R) {
    panic!("released {} lock on {:?} that was never held", kind, resource);
}

#[cfg(not(debug_assertions))]
fn missing_lock<R: ResourceId>(kind: &str, resource: &R) {
    log::error!("released {} lock on {:?} that was never held", kind, resource);
}
