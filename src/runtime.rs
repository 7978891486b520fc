//! Projection runtime
//!
//! Owns every cache of the projection layer and exposes the two directions
//! of the boundary:
//!
//! - managed → native: `native_for_object` hands out the wrapper's identity
//!   pointer (or the original native object, for proxies)
//! - native → managed: `object_for_native` unwraps our own wrappers and
//!   otherwise constructs (or reuses) the proxy for the native identity

use crate::config::RuntimeConfig;
use crate::core::guid::{iids, Guid};
use crate::core::metadata::TypeMetadata;
use crate::core::object::{downcast_ref, Inspectable, ManagedObject, ManagedRef};
use crate::core::types::TypeDescriptor;
use crate::errors::Result;
use crate::ffi::{FunctionTableAllocator, HResult, ObjectReference, RawPtr};
use crate::gc::{IdentityRegistry, SweepStats};
use crate::interop::{
    invoke_on_target, managed_owner, CallableWrapper, ContextSource, FactoryCache,
    InterfaceTableBuilder, ReferenceClassifier,
};
use crate::logging::{self, debug, LogConfig};
use crate::performance::CacheStats;
use std::path::Path;
use std::sync::Arc;

/// Cache statistics for monitoring
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeStats {
    pub interface_tables: CacheStats,
    pub factories_by_type: CacheStats,
    pub factories_by_class_name: CacheStats,
    pub live_entries: usize,
    pub function_tables: usize,
}

pub struct ProjectionRuntime {
    config: RuntimeConfig,
    metadata: Arc<dyn TypeMetadata>,
    allocator: Arc<FunctionTableAllocator>,
    tables: InterfaceTableBuilder,
    factories: FactoryCache,
    classifier: ReferenceClassifier,
    registry: IdentityRegistry,
}

impl ProjectionRuntime {
    pub fn new(metadata: Arc<dyn TypeMetadata>) -> Self {
        Self::with_config(metadata, RuntimeConfig::default())
    }

    pub fn with_config(metadata: Arc<dyn TypeMetadata>, config: RuntimeConfig) -> Self {
        let allocator = Arc::new(FunctionTableAllocator::new());
        let capacity = config.caches.initial_capacity;
        let tables = InterfaceTableBuilder::with_options(
            Arc::clone(&metadata),
            Arc::clone(&allocator),
            capacity,
            config.interop.variance_entries,
        );
        let factories = FactoryCache::with_capacity(Arc::clone(&metadata), capacity);
        let classifier = ReferenceClassifier::default();
        let classifier = if config.interop.capture_context {
            classifier
        } else {
            classifier.without_context_capture()
        };
        let registry = IdentityRegistry::with_config(&config.caches);

        debug!(
            target: "gc::registry",
            capacity,
            sweep_interval = config.caches.sweep_interval,
            "projection runtime created"
        );

        Self {
            config,
            metadata,
            allocator,
            tables,
            factories,
            classifier,
            registry,
        }
    }

    /// Load configuration from a TOML file and initialize logging from it
    pub fn from_config_file(metadata: Arc<dyn TypeMetadata>, path: &Path) -> Result<Self> {
        let config = RuntimeConfig::load(path)?;
        logging::init_with_config(LogConfig::from(&config.logging));
        Ok(Self::with_config(metadata, config))
    }

    /// Replace the source of captured execution contexts
    pub fn with_context_source(mut self, source: Arc<dyn ContextSource>) -> Self {
        let classifier = ReferenceClassifier::new(source);
        self.classifier = if self.config.interop.capture_context {
            classifier
        } else {
            classifier.without_context_capture()
        };
        self
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn metadata(&self) -> &Arc<dyn TypeMetadata> {
        &self.metadata
    }

    pub fn allocator(&self) -> &FunctionTableAllocator {
        &self.allocator
    }

    pub fn tables(&self) -> &InterfaceTableBuilder {
        &self.tables
    }

    pub fn factories(&self) -> &FactoryCache {
        &self.factories
    }

    pub fn classifier(&self) -> &ReferenceClassifier {
        &self.classifier
    }

    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    /// The single native-callable wrapper for `obj`
    pub fn native_wrapper(&self, obj: &ManagedRef) -> Arc<CallableWrapper> {
        self.registry.get_or_create_native_wrapper(obj, || {
            let ty = obj.type_descriptor();
            CallableWrapper::new(
                obj,
                self.tables.build(&ty),
                self.tables.native_type_info(&ty),
                self.metadata.ccw_substitute_constructor(&ty),
            )
        })
    }

    /// Native identity pointer for a managed object, owning one reference
    ///
    /// Proxies of native objects unwrap to the object they stand for.
    pub fn native_for_object(&self, obj: &ManagedRef) -> Result<ObjectReference> {
        if let Some(inspectable) = downcast_ref::<Inspectable>(obj) {
            return inspectable.reference().identity();
        }
        self.native_wrapper(obj).to_native()
    }

    pub fn native_interface_for_object(&self, obj: &ManagedRef, iid: &Guid) -> Result<ObjectReference> {
        self.native_for_object(obj)?.query(iid)
    }

    /// Managed object for a borrowed native pointer; null yields `None`
    ///
    /// # Safety
    /// `ptr` must be null or a live interface pointer.
    pub unsafe fn object_for_native(
        &self,
        ptr: RawPtr,
        expected: Option<&TypeDescriptor>,
    ) -> Result<Option<ManagedRef>> {
        let Some(reference) = self
            .classifier
            .object_reference_for_interface(ptr, iids::IID_IUNKNOWN)?
        else {
            return Ok(None);
        };
        self.object_for_reference(&reference, expected).map(Some)
    }

    /// Managed object for a native reference
    ///
    /// Our own wrappers unwrap to the managed object they were created for;
    /// anything else yields the one proxy registered for its identity.
    pub fn object_for_reference(
        &self,
        reference: &ObjectReference,
        expected: Option<&TypeDescriptor>,
    ) -> Result<ManagedRef> {
        let identity = reference.identity()?;
        if let Some(owner) = managed_owner(&identity) {
            return Ok(owner);
        }

        let key = identity.as_raw() as usize;
        self.registry.get_or_create_proxy(key, || {
            let class_name = self.factories.resolve_construction_class_name(reference, expected)?;
            self.factories
                .for_class_name(&class_name)?
                .construct(reference, &self.registry)
        })
    }

    /// Managed object already associated with a native reference, if any
    pub fn find_object(&self, reference: &ObjectReference) -> Result<Option<ManagedRef>> {
        let identity = reference.identity()?;
        if let Some(owner) = managed_owner(&identity) {
            return Ok(Some(owner));
        }
        Ok(self.registry.find_proxy(identity.as_raw() as usize))
    }

    /// Delegate proxy for a borrowed native delegate pointer
    ///
    /// # Safety
    /// `ptr` must be null or a live pointer to a delegate of type `ty`.
    pub unsafe fn delegate_for_native(&self, ptr: RawPtr, ty: &TypeDescriptor) -> Result<Option<ManagedRef>> {
        self.factories.delegate_factory(ty)?.construct(ptr)
    }

    /// Body of a generated delegate `Invoke` entry point
    ///
    /// Runs `invoke` against the managed delegate behind `this` and
    /// translates its outcome into a status code.
    ///
    /// # Safety
    /// `this` must be an interface pointer handed out by a wrapper.
    pub unsafe fn marshal_delegate_invoke<F>(this: RawPtr, invoke: F) -> HResult
    where
        F: FnOnce(&ManagedRef) -> Result<()>,
    {
        invoke_on_target(this, "Delegate::Invoke", invoke)
    }

    /// Release associations whose managed side has been collected
    pub fn sweep(&self) -> SweepStats {
        self.registry.sweep()
    }

    pub fn stats(&self) -> RuntimeStats {
        let (factories_by_type, factories_by_class_name) = self.factories.stats();
        RuntimeStats {
            interface_tables: self.tables.stats(),
            factories_by_type,
            factories_by_class_name,
            live_entries: self.registry.live_entries(),
            function_tables: self.allocator.allocations(),
        }
    }
}
