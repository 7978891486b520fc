//! Identity & Lifetime Registry
//!
//! Keeps object identity stable across the boundary in both directions:
//! one wrapper per managed object, one proxy per native identity. It also
//! retains the native reference behind every boxed value a factory produced,
//! for as long as that value is alive.

use super::weak_table::WeakTable;
use crate::config::CacheSection;
use crate::core::object::{ManagedObject, ManagedRef};
use crate::errors::Result;
use crate::ffi::ObjectReference;
use crate::interop::CallableWrapper;
use crate::logging::log_sweep;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

type ProxySlot = Arc<Mutex<Option<Weak<dyn ManagedObject>>>>;

/// Entries removed by one `sweep`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub wrappers: usize,
    pub native_wrappers: usize,
    pub retained: usize,
    pub proxies: usize,
}

impl SweepStats {
    pub fn total(&self) -> usize {
        self.wrappers + self.native_wrappers + self.retained + self.proxies
    }
}

pub struct IdentityRegistry {
    wrappers: WeakTable<ManagedRef>,
    native_wrappers: WeakTable<Arc<CallableWrapper>>,
    retained: WeakTable<ObjectReference>,
    proxies: DashMap<usize, ProxySlot>,
    sweep_interval: usize,
    proxy_insertions: AtomicUsize,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::with_config(&CacheSection::default())
    }

    pub fn with_config(config: &CacheSection) -> Self {
        Self {
            wrappers: weak_table(config),
            native_wrappers: weak_table(config),
            retained: weak_table(config),
            proxies: DashMap::with_capacity(config.initial_capacity),
            sweep_interval: config.sweep_interval,
            proxy_insertions: AtomicUsize::new(0),
        }
    }

    /// Wrapper object for `owner`, created at most once while `owner` lives
    ///
    /// The created value must not strongly reference `owner`.
    pub fn get_or_create_wrapper<F>(&self, owner: &ManagedRef, create: F) -> ManagedRef
    where
        F: FnOnce() -> ManagedRef,
    {
        self.wrappers.get_or_create(owner, create)
    }

    pub fn find_wrapper(&self, owner: &ManagedRef) -> Option<ManagedRef> {
        self.wrappers.get(owner)
    }

    /// Native-callable wrapper for `owner`, one per managed object
    pub fn get_or_create_native_wrapper<F>(&self, owner: &ManagedRef, create: F) -> Arc<CallableWrapper>
    where
        F: FnOnce() -> Arc<CallableWrapper>,
    {
        self.native_wrappers.get_or_create(owner, create)
    }

    pub fn find_native_wrapper(&self, owner: &ManagedRef) -> Option<Arc<CallableWrapper>> {
        self.native_wrappers.get(owner)
    }

    /// Proxy for the native object whose identity pointer is `identity`
    ///
    /// At most one live proxy exists per identity; the registry itself holds
    /// the proxy weakly. `create` runs under the identity's slot lock and
    /// must not request a proxy for the same identity.
    pub fn get_or_create_proxy<F>(&self, identity: usize, create: F) -> Result<ManagedRef>
    where
        F: FnOnce() -> Result<ManagedRef>,
    {
        let slot = self.proxy_slot(identity);
        let mut current = slot.lock();
        if let Some(existing) = current.as_ref().and_then(Weak::upgrade) {
            return Ok(existing);
        }
        let created = create()?;
        *current = Some(Arc::downgrade(&created));
        Ok(created)
    }

    pub fn find_proxy(&self, identity: usize) -> Option<ManagedRef> {
        let slot = self.proxies.get(&identity).map(|slot| Arc::clone(slot.value()))?;
        let current = slot.lock();
        current.as_ref().and_then(Weak::upgrade)
    }

    /// Keep `reference` alive for as long as `value` is
    pub fn retain_boxed(&self, value: &ManagedRef, reference: ObjectReference) {
        self.retained.insert(value, reference);
    }

    pub fn retained_reference(&self, value: &ManagedRef) -> Option<ObjectReference> {
        self.retained.get(value)
    }

    /// Drop every association whose key has been collected, releasing the
    /// native references retained for dead boxed values
    pub fn sweep(&self) -> SweepStats {
        let stats = SweepStats {
            wrappers: self.wrappers.sweep(),
            native_wrappers: self.native_wrappers.sweep(),
            retained: self.retained.sweep(),
            proxies: self.sweep_proxies(),
        };
        log_sweep(stats.total(), self.live_entries());
        stats
    }

    /// Live associations across all tables
    pub fn live_entries(&self) -> usize {
        self.wrappers.len() + self.native_wrappers.len() + self.retained.len() + self.live_proxies()
    }

    pub fn live_proxies(&self) -> usize {
        self.proxies
            .iter()
            .filter(|slot| {
                // Never block on a slot while holding a shard lock; a locked
                // slot has a creator in flight.
                slot.try_lock()
                    .map_or(true, |current| current.as_ref().map_or(false, |p| p.strong_count() > 0))
            })
            .count()
    }

    fn proxy_slot(&self, identity: usize) -> ProxySlot {
        if let Some(slot) = self.proxies.get(&identity) {
            return Arc::clone(slot.value());
        }
        let slot = match self.proxies.entry(identity) {
            Entry::Occupied(occupied) => return Arc::clone(occupied.get()),
            Entry::Vacant(vacant) => Arc::clone(vacant.insert(Arc::new(Mutex::new(None))).value()),
        };
        // The shard guard is released; the new slot survives the sweep
        // because `slot` holds a second reference.
        self.maybe_sweep_proxies();
        slot
    }

    fn maybe_sweep_proxies(&self) {
        if self.sweep_interval == 0 {
            return;
        }
        let count = self.proxy_insertions.fetch_add(1, Ordering::Relaxed) + 1;
        if count % self.sweep_interval == 0 {
            self.sweep_proxies();
        }
    }

    fn sweep_proxies(&self) -> usize {
        let before = self.proxies.len();
        // A slot only the map still references has no creator in flight.
        self.proxies.retain(|_, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            slot.try_lock()
                .map_or(true, |current| current.as_ref().map_or(false, |p| p.strong_count() > 0))
        });
        before.saturating_sub(self.proxies.len())
    }
}

fn weak_table<V: Clone>(config: &CacheSection) -> WeakTable<V> {
    WeakTable::with_sweep_interval(config.initial_capacity, config.sweep_interval)
}

impl Default for IdentityRegistry {
    fn default() -> Self {
        Self::new()
    }
}
