//! Interface Table Builder
//!
//! Computes, once per managed type, the ordered interface descriptors a
//! native-callable wrapper for that type exposes. Order only matters for
//! duplicates: the first occurrence of an IID wins.

use super::{boxing, wrapper};
use crate::core::guid::{iids, Guid};
use crate::core::metadata::TypeMetadata;
use crate::core::types::TypeDescriptor;
use crate::ffi::{FunctionTable, FunctionTableAllocator};
use crate::logging::{log_table_built, perf};
use crate::performance::{CacheStats, OnceCache};
use smallvec::SmallVec;
use std::collections::HashSet;
use std::sync::Arc;

/// One exposed interface: IID plus its process-lifetime function table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterfaceDescriptor {
    pub iid: Guid,
    pub vtable: FunctionTable,
}

impl InterfaceDescriptor {
    pub fn new(iid: Guid, vtable: FunctionTable) -> Self {
        Self { iid, vtable }
    }
}

#[derive(Debug)]
pub struct InterfaceTable {
    entries: SmallVec<[InterfaceDescriptor; 8]>,
    has_custom_marshal: bool,
}

impl InterfaceTable {
    pub fn entries(&self) -> &[InterfaceDescriptor] {
        &self.entries
    }

    /// The type supplied its own cross-context marshaling interface
    pub fn has_custom_marshal(&self) -> bool {
        self.has_custom_marshal
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First descriptor for `iid`
    pub fn find(&self, iid: &Guid) -> Option<&InterfaceDescriptor> {
        self.entries.iter().find(|entry| entry.iid == *iid)
    }

    pub fn contains(&self, iid: &Guid) -> bool {
        self.find(iid).is_some()
    }

    /// Entries with duplicates removed, first occurrence kept
    pub fn unique_entries(&self) -> impl Iterator<Item = &InterfaceDescriptor> + '_ {
        let mut seen = HashSet::new();
        self.entries.iter().filter(move |entry| seen.insert(entry.iid))
    }

    /// IIDs reported through `IInspectable::GetIids`, fixed tail included
    pub fn published_iids(&self) -> Vec<Guid> {
        self.unique_entries().map(|entry| entry.iid).collect()
    }
}

/// Type information published by a wrapper's IInspectable
#[derive(Debug)]
pub struct NativeTypeInfo {
    iids: Vec<Guid>,
    runtime_class_name: String,
}

impl NativeTypeInfo {
    pub fn iids(&self) -> &[Guid] {
        &self.iids
    }

    pub fn runtime_class_name(&self) -> &str {
        &self.runtime_class_name
    }
}

pub struct InterfaceTableBuilder {
    metadata: Arc<dyn TypeMetadata>,
    allocator: Arc<FunctionTableAllocator>,
    tables: OnceCache<TypeDescriptor, Arc<InterfaceTable>>,
    type_infos: OnceCache<TypeDescriptor, Arc<NativeTypeInfo>>,
    boxable: OnceCache<TypeDescriptor, bool>,
    variance_entries: bool,
}

impl InterfaceTableBuilder {
    pub fn new(metadata: Arc<dyn TypeMetadata>, allocator: Arc<FunctionTableAllocator>) -> Self {
        Self::with_options(metadata, allocator, 0, true)
    }

    pub fn with_options(
        metadata: Arc<dyn TypeMetadata>,
        allocator: Arc<FunctionTableAllocator>,
        capacity: usize,
        variance_entries: bool,
    ) -> Self {
        Self {
            metadata,
            allocator,
            tables: OnceCache::with_capacity(capacity),
            type_infos: OnceCache::with_capacity(capacity),
            boxable: OnceCache::with_capacity(capacity),
            variance_entries,
        }
    }

    /// Cached interface table for `ty`
    pub fn build(&self, ty: &TypeDescriptor) -> Arc<InterfaceTable> {
        self.tables.get_or_init(ty, || Arc::new(self.compute(ty)))
    }

    /// Cached IIDs and runtime class name published for `ty`
    pub fn native_type_info(&self, ty: &TypeDescriptor) -> Arc<NativeTypeInfo> {
        self.type_infos.get_or_init(ty, || {
            let table = self.build(ty);
            Arc::new(NativeTypeInfo {
                iids: table.published_iids(),
                runtime_class_name: self.metadata.class_name_for_type(ty),
            })
        })
    }

    /// Cached answer to "does boxing `ty` expose `IReference<T>`"
    pub fn is_nullable_boxable(&self, ty: &TypeDescriptor) -> bool {
        self.boxable.get_or_init(ty, || self.compute_boxable(ty))
    }

    pub fn stats(&self) -> CacheStats {
        self.tables.stats()
    }

    fn is_projected(&self, ty: &TypeDescriptor) -> bool {
        self.metadata.is_projected_type(ty)
            || self
                .metadata
                .authoring_metadata_type(ty)
                .map_or(false, |authored| self.metadata.is_projected_type(&authored))
    }

    fn compute_boxable(&self, ty: &TypeDescriptor) -> bool {
        if let Some(inner) = ty.nullable_underlying() {
            return self.compute_boxable(inner);
        }
        if ty.is_string() || ty.is_type_name() {
            return true;
        }
        if ty.is_delegate() {
            return self.is_projected(ty);
        }
        if !ty.is_value_type() {
            return false;
        }
        ty.is_primitive() || self.is_projected(ty)
    }

    fn compute(&self, ty: &TypeDescriptor) -> InterfaceTable {
        let _guard = perf::track("interface_table");
        let metadata = &self.metadata;
        let surface = metadata.ccw_substitute(ty).unwrap_or_else(|| ty.clone());

        let mut entries: SmallVec<[InterfaceDescriptor; 8]> = SmallVec::new();
        let mut has_custom_marshal = false;

        for iface in metadata.capability_interfaces(&surface) {
            if let Some(entry) = metadata.interface_entry(&iface) {
                has_custom_marshal |= entry.iid == iids::IID_IMARSHAL;
                entries.push(entry);
            }

            // A generic without its own entry can still reach projected variants.
            if self.variance_entries && iface.is_constructed_generic() {
                entries.extend(
                    metadata
                        .variant_compatible_interfaces(&iface)
                        .iter()
                        .filter_map(|variant| metadata.interface_entry(variant)),
                );
            }
        }

        if ty.is_delegate() {
            if let Some(invoke) = metadata.interface_entry(ty) {
                entries.push(invoke);
            }
        }

        if surface.is_key_value_pair() {
            entries.push(boxing::key_value_pair_descriptor(&surface, metadata.as_ref(), &self.allocator));
        } else if self.is_nullable_boxable(ty) {
            let boxed = ty.nullable_underlying().unwrap_or(ty);
            entries.push(boxing::property_value_descriptor(&self.allocator));
            entries.push(boxing::reference_descriptor(boxed, metadata.as_ref(), &self.allocator));
        } else if let Some(element) = surface.element_type().filter(|_| surface.is_sz_array()) {
            entries.push(boxing::property_value_descriptor(&self.allocator));
            entries.push(boxing::reference_array_descriptor(element, metadata.as_ref(), &self.allocator));
        }

        let allocator = &self.allocator;
        entries.push(InterfaceDescriptor::new(
            iids::IID_ISTRINGABLE,
            wrapper::stringable_table(allocator),
        ));
        entries.push(InterfaceDescriptor::new(
            iids::IID_ICUSTOM_PROPERTY_PROVIDER,
            wrapper::custom_property_provider_table(allocator),
        ));
        entries.push(InterfaceDescriptor::new(
            iids::IID_IWEAK_REFERENCE_SOURCE,
            wrapper::weak_reference_source_table(allocator),
        ));
        if !has_custom_marshal {
            entries.push(InterfaceDescriptor::new(
                iids::IID_IMARSHAL,
                wrapper::free_threaded_marshal_table(allocator),
            ));
        }
        entries.push(InterfaceDescriptor::new(
            iids::IID_IAGILE_OBJECT,
            wrapper::unknown_table(allocator),
        ));

        log_table_built(&ty.to_string(), entries.len(), has_custom_marshal);

        InterfaceTable {
            entries,
            has_custom_marshal,
        }
    }
}
