//! Weak-keyed association tables
//!
//! Entries are keyed by the address of a managed object and hold only a
//! `Weak` to it, so an association never keeps its key alive. Holding the
//! `Weak` also pins the allocation, which means an address cannot be reused
//! by a new object while a stale entry for it is still in the table.
//!
//! Values must not strongly reference their key; a value that does keeps
//! its key alive for as long as the entry exists.

use crate::core::object::{object_address, ManagedObject, ManagedRef};
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

struct WeakSlot<V> {
    key: Weak<dyn ManagedObject>,
    value: OnceCell<V>,
}

impl<V> WeakSlot<V> {
    fn new(key: &ManagedRef) -> Self {
        Self {
            key: Arc::downgrade(key),
            value: OnceCell::new(),
        }
    }

    fn is_alive(&self) -> bool {
        self.key.strong_count() > 0
    }
}

pub struct WeakTable<V> {
    slots: DashMap<usize, Arc<WeakSlot<V>>>,
    /// Insertions between automatic sweeps; zero disables them
    sweep_interval: usize,
    insertions: AtomicUsize,
}

impl<V: Clone> WeakTable<V> {
    pub fn new() -> Self {
        Self::with_sweep_interval(0, 0)
    }

    pub fn with_sweep_interval(capacity: usize, sweep_interval: usize) -> Self {
        Self {
            slots: DashMap::with_capacity(capacity),
            sweep_interval,
            insertions: AtomicUsize::new(0),
        }
    }

    /// Value associated with `key`, if one has been published
    pub fn get(&self, key: &ManagedRef) -> Option<V> {
        let slot = self.slots.get(&object_address(key))?.clone();
        if !slot.is_alive() {
            return None;
        }
        slot.value.get().cloned()
    }

    /// Associated value, creating it at most once per key
    ///
    /// `create` runs outside the table's locks; concurrent callers for the
    /// same key block on the slot and observe the winner's value.
    pub fn get_or_create<F>(&self, key: &ManagedRef, create: F) -> V
    where
        F: FnOnce() -> V,
    {
        let slot = self.slot(key);
        slot.value.get_or_init(create).clone()
    }

    /// Like `get_or_create`; a failure publishes nothing
    pub fn get_or_try_create<F, E>(&self, key: &ManagedRef, create: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        let slot = self.slot(key);
        slot.value.get_or_try_init(create).cloned()
    }

    /// Associate `value` with `key`; an existing value is kept
    ///
    /// Returns whether `value` was stored.
    pub fn insert(&self, key: &ManagedRef, value: V) -> bool {
        let slot = self.slot(key);
        slot.value.set(value).is_ok()
    }

    pub fn remove(&self, key: &ManagedRef) -> Option<V> {
        let (_, slot) = self.slots.remove(&object_address(key))?;
        slot.value.get().cloned()
    }

    /// Live entries
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_alive()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every entry whose key has been collected
    ///
    /// Returns the number of entries removed.
    pub fn sweep(&self) -> usize {
        let dead: Vec<usize> = self
            .slots
            .iter()
            .filter(|slot| !slot.is_alive())
            .map(|slot| *slot.key())
            .collect();

        let mut removed = Vec::with_capacity(dead.len());
        for address in dead {
            if let Some(entry) = self.slots.remove_if(&address, |_, slot| !slot.is_alive()) {
                removed.push(entry);
            }
        }
        // Values are dropped here, outside any shard lock.
        let count = removed.len();
        drop(removed);
        count
    }

    fn slot(&self, key: &ManagedRef) -> Arc<WeakSlot<V>> {
        let address = object_address(key);
        if let Some(slot) = self.slots.get(&address) {
            if slot.is_alive() {
                return Arc::clone(slot.value());
            }
        }

        let (slot, replaced) = {
            let mut entry = self
                .slots
                .entry(address)
                .or_insert_with(|| Arc::new(WeakSlot::new(key)));
            if entry.is_alive() {
                (Arc::clone(entry.value()), None)
            } else {
                let stale = std::mem::replace(entry.value_mut(), Arc::new(WeakSlot::new(key)));
                (Arc::clone(entry.value()), Some(stale))
            }
        };
        drop(replaced);

        self.maybe_sweep();
        slot
    }

    fn maybe_sweep(&self) {
        if self.sweep_interval == 0 {
            return;
        }
        let count = self.insertions.fetch_add(1, Ordering::Relaxed) + 1;
        if count % self.sweep_interval == 0 {
            self.sweep();
        }
    }
}

impl<V: Clone> Default for WeakTable<V> {
    fn default() -> Self {
        Self::new()
    }
}
