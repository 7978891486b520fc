//! Process-lifetime function tables
//!
//! Tables are built at most once per interface kind and leaked; the
//! resulting addresses stay valid for as long as any native caller might
//! hold a pointer into a wrapper.

use crate::logging::debug;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::ffi::c_void;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Handle to a leaked, immutable function table
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionTable(*const c_void);

// Safety: tables are immutable after construction and never freed.
unsafe impl Send for FunctionTable {}
unsafe impl Sync for FunctionTable {}

impl FunctionTable {
    pub fn from_static<V: Sync + 'static>(table: &'static V) -> Self {
        Self(table as *const V as *const c_void)
    }

    #[inline]
    pub fn as_ptr(self) -> *const c_void {
        self.0
    }
}

impl fmt::Debug for FunctionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FunctionTable({:p})", self.0)
    }
}

/// Allocates one function table per interface kind
pub struct FunctionTableAllocator {
    tables: DashMap<String, Arc<OnceCell<FunctionTable>>>,
    allocations: AtomicUsize,
}

impl FunctionTableAllocator {
    pub fn new() -> Self {
        Self {
            tables: DashMap::with_capacity(32),
            allocations: AtomicUsize::new(0),
        }
    }

    /// Table for `kind`, building it on first request
    ///
    /// Concurrent first requests run `build` once; every caller observes the
    /// same address.
    pub fn allocate<V, F>(&self, kind: &str, build: F) -> FunctionTable
    where
        V: Send + Sync + 'static,
        F: FnOnce() -> V,
    {
        if let Some(slot) = self.tables.get(kind) {
            if let Some(table) = slot.get() {
                return *table;
            }
        }

        let slot = Arc::clone(
            self.tables
                .entry(kind.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .value(),
        );

        *slot.get_or_init(|| {
            let table: &'static V = Box::leak(Box::new(build()));
            self.allocations.fetch_add(1, Ordering::Relaxed);
            debug!(target: "ffi", kind, size = std::mem::size_of::<V>(), "function table allocated");
            FunctionTable::from_static(table)
        })
    }

    pub fn get(&self, kind: &str) -> Option<FunctionTable> {
        self.tables.get(kind).and_then(|slot| slot.get().copied())
    }

    /// Number of tables built so far
    pub fn allocations(&self) -> usize {
        self.allocations.load(Ordering::Relaxed)
    }
}

impl Default for FunctionTableAllocator {
    fn default() -> Self {
        Self::new()
    }
}
