use std::fmt;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

use derivative::Derivative;

use self::Payload::*;

/// Owning reference to an occupied element of a [`Pool`].
///
/// Handles are deliberately not `Clone`: the only way to free an
/// element is to give its handle back to [`Pool::remove`], after which
/// the element can no longer be named.
#[derive(Derivative)]
#[derivative(Eq(bound=""), Hash(bound=""), PartialEq(bound=""))]
#[must_use]
pub struct Handle<T> {
    idx: u32,
    gen: u32,
    _ph: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Handle")
            .field("idx", &self.idx)
            .field("gen", &self.gen)
            .finish()
    }
}

impl<T> Handle<T> {
    fn new(idx: u32, gen: u32) -> Self {
        Handle { idx, gen, _ph: PhantomData }
    }

    pub fn index(&self) -> u32 {
        self.idx
    }
}

#[derive(Debug)]
enum Payload<T> {
    Occupied(T),
    // Free list pointer
    Vacant(u32),
}

#[derive(Debug)]
struct Slot<T> {
    // Incrementing this invalidates stale handles.
    gen: u32,
    payload: Payload<T>,
}

impl<T> Slot<T> {
    fn value(&self) -> Option<&T> {
        match self.payload {
            Occupied(ref value) => Some(value),
            Vacant(_) => None,
        }
    }

    fn value_mut(&mut self) -> Option<&mut T> {
        match self.payload {
            Occupied(ref mut value) => Some(value),
            Vacant(_) => None,
        }
    }
}

/// A fixed-capacity object pool.
///
/// All storage is allocated up front; inserting and removing elements
/// only threads slots on and off an intrusive free list, so neither
/// operation touches the heap.
#[derive(Debug)]
pub struct Pool<T> {
    slots: Vec<Slot<T>>,
    len: u32,
    // Head of the free list; equal to the capacity when full.
    next: u32,
}

impl<T> Pool<T> {
    pub fn with_capacity(capacity: u32) -> Self {
        let slots = (0..capacity)
            .map(|idx| Slot { gen: 0, payload: Vacant(idx + 1) })
            .collect();
        Pool { slots, len: 0, next: 0 }
    }

    pub fn capacity(&self) -> u32 {
        self.slots.len() as _
    }

    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.next == self.capacity()
    }

    fn get_slot(&self, handle: &Handle<T>) -> Option<&Slot<T>> {
        let slot = self.slots.get(handle.idx as usize)?;
        if slot.gen != handle.gen { return None; }
        Some(slot)
    }

    fn get_slot_mut(&mut self, handle: &Handle<T>) -> Option<&mut Slot<T>> {
        let slot = self.slots.get_mut(handle.idx as usize)?;
        if slot.gen != handle.gen { return None; }
        Some(slot)
    }

    /// Returns `None` only if `handle` came from a different pool.
    pub fn get(&self, handle: &Handle<T>) -> Option<&T> {
        self.get_slot(handle)?.value()
    }

    pub fn get_mut(&mut self, handle: &Handle<T>) -> Option<&mut T> {
        self.get_slot_mut(handle)?.value_mut()
    }

    /// Moves `value` into a free slot. Gives the value back if the pool
    /// has no free slot left.
    pub fn insert(&mut self, value: T) -> Result<Handle<T>, T> {
        if self.is_full() {
            return Err(value);
        }

        let idx = self.next;
        let slot = &mut self.slots[idx as usize];
        self.next = match std::mem::replace(&mut slot.payload, Occupied(value)) {
            Vacant(next) => next,
            Occupied(_) => unreachable!("free list points at occupied slot"),
        };
        self.len += 1;
        Ok(Handle::new(idx, slot.gen))
    }

    /// Frees the slot named by `handle` and returns its value.
    pub fn remove(&mut self, handle: Handle<T>) -> Option<T> {
        let next = self.next;
        let slot = self.get_slot_mut(&handle)?;
        let value = match std::mem::replace(&mut slot.payload, Vacant(next)) {
            Occupied(value) => value,
            Vacant(_) => unreachable!("live handle to vacant slot"),
        };
        slot.gen = slot.gen.wrapping_add(1);
        self.next = handle.idx;
        self.len -= 1;
        Some(value)
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().filter_map(Slot::value)
    }
}

impl<T> Index<&Handle<T>> for Pool<T> {
    type Output = T;
    fn index(&self, handle: &Handle<T>) -> &Self::Output {
        self.get(handle).unwrap()
    }
}

impl<T> IndexMut<&Handle<T>> for Pool<T> {
    fn index_mut(&mut self, handle: &Handle<T>) -> &mut Self::Output {
        self.get_mut(handle).unwrap()
    }
}
