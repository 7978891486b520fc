//! Typed Factory Cache
//!
//! Selects, once per declared type and once per run-time class name, how a
//! native reference becomes a managed proxy. The selection is a tagged
//! `ConstructionStrategy`; nothing is reflected over at construction time.
//!
//! Resolution order for a type (first match wins):
//! 1. custom type mapping
//! 2. key/value pair
//! 3. value type (boxed as `IReference<T>`)
//! 4. nullable-delegate ABI shape
//! 5. reference-array ABI shape
//! 6. class-name-driven construction

use super::boxing;
use crate::core::guid::Guid;
use crate::core::metadata::{EntryPointKind, FromAbi, ProxyConstructor, TypeMetadata};
use crate::core::object::{Inspectable, ManagedRef};
use crate::core::types::{TypeDescriptor, TypeKind};
use crate::errors::{ProjectionError, Result};
use crate::ffi::{ObjectReference, RawPtr};
use crate::gc::IdentityRegistry;
use crate::logging::{debug, log_factory_resolved, log_resolution_fallback};
use crate::performance::{CacheStats, OnceCache};
use std::fmt;
use std::sync::Arc;

/// Class name reported by boxed strings
pub const BOXED_STRING_CLASS_NAME: &str = "Windows.Foundation.IReference`1<String>";
/// Class name reported by boxed type references
pub const BOXED_TYPE_NAME_CLASS_NAME: &str =
    "Windows.Foundation.IReference`1<Windows.UI.Xaml.Interop.TypeName>";

#[derive(Clone)]
pub enum ConstructionStrategy {
    /// The native reference itself, untyped
    Identity,
    CustomMapping { ty: TypeDescriptor, from_abi: FromAbi },
    KeyValuePair { ty: TypeDescriptor, create: ProxyConstructor },
    BoxedValue { ty: TypeDescriptor, read: ProxyConstructor },
    NullableDelegate { ty: TypeDescriptor, read: ProxyConstructor },
    ReferenceArray { element: TypeDescriptor, iid: Guid, read: ProxyConstructor },
    BoxedString,
    BoxedTypeName,
    ClassName { class_name: String, create: ProxyConstructor },
}

impl ConstructionStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Identity => "Identity",
            Self::CustomMapping { .. } => "CustomMapping",
            Self::KeyValuePair { .. } => "KeyValuePair",
            Self::BoxedValue { .. } => "BoxedValue",
            Self::NullableDelegate { .. } => "NullableDelegate",
            Self::ReferenceArray { .. } => "ReferenceArray",
            Self::BoxedString => "BoxedString",
            Self::BoxedTypeName => "BoxedTypeName",
            Self::ClassName { .. } => "ClassName",
        }
    }

    /// Strategies whose product must keep the native reference alive
    fn retains_reference(&self) -> bool {
        !matches!(self, Self::Identity | Self::ClassName { .. })
    }
}

impl fmt::Debug for ConstructionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CustomMapping { ty, .. }
            | Self::KeyValuePair { ty, .. }
            | Self::BoxedValue { ty, .. }
            | Self::NullableDelegate { ty, .. } => write!(f, "{}({})", self.name(), ty),
            Self::ReferenceArray { element, .. } => write!(f, "ReferenceArray({})", element),
            Self::ClassName { class_name, .. } => write!(f, "ClassName({})", class_name),
            _ => f.write_str(self.name()),
        }
    }
}

/// Cached constructor turning a native reference into a managed proxy
#[derive(Debug, Clone)]
pub struct Factory {
    strategy: ConstructionStrategy,
    retains_reference: bool,
}

impl Factory {
    pub fn new(strategy: ConstructionStrategy) -> Self {
        let retains_reference = strategy.retains_reference();
        Self {
            strategy,
            retains_reference,
        }
    }

    pub fn identity() -> Self {
        Self::new(ConstructionStrategy::Identity)
    }

    pub fn strategy(&self) -> &ConstructionStrategy {
        &self.strategy
    }

    pub fn is_identity(&self) -> bool {
        matches!(self.strategy, ConstructionStrategy::Identity)
    }

    /// Product keeps its native reference alive through the registry
    pub fn retains_reference(&self) -> bool {
        self.retains_reference
    }

    pub fn construct(&self, reference: &ObjectReference, registry: &IdentityRegistry) -> Result<ManagedRef> {
        let value: ManagedRef = match &self.strategy {
            ConstructionStrategy::Identity => Arc::new(Inspectable::new(reference.clone())),
            ConstructionStrategy::CustomMapping { from_abi, .. } => from_abi(reference.as_raw())?,
            ConstructionStrategy::KeyValuePair { create, .. } => create(reference)?,
            ConstructionStrategy::BoxedValue { read, .. } => read(reference)?,
            ConstructionStrategy::NullableDelegate { read, .. } => read(reference)?,
            ConstructionStrategy::ReferenceArray { read, .. } => read(reference)?,
            ConstructionStrategy::BoxedString => boxing::read_boxed_string(reference)?,
            ConstructionStrategy::BoxedTypeName => boxing::read_boxed_type_name(reference)?,
            ConstructionStrategy::ClassName { create, .. } => create(reference)?,
        };

        if self.retains_reference {
            registry.retain_boxed(&value, reference.clone());
        }
        Ok(value)
    }
}

/// Constructs delegate proxies from raw native pointers
#[derive(Clone)]
pub struct DelegateFactory {
    ty: TypeDescriptor,
    iid: Guid,
    create: ProxyConstructor,
}

impl DelegateFactory {
    pub fn ty(&self) -> &TypeDescriptor {
        &self.ty
    }

    /// Proxy for a borrowed delegate pointer; null yields `None`
    ///
    /// # Safety
    /// `ptr` must be null or a live pointer to the delegate's interface.
    pub unsafe fn construct(&self, ptr: RawPtr) -> Result<Option<ManagedRef>> {
        match ObjectReference::from_borrowed(ptr, self.iid) {
            Some(reference) => (self.create)(&reference).map(Some),
            None => Ok(None),
        }
    }
}

impl fmt::Debug for DelegateFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegateFactory")
            .field("ty", &self.ty)
            .field("iid", &self.iid)
            .finish()
    }
}

pub struct FactoryCache {
    metadata: Arc<dyn TypeMetadata>,
    identity: Arc<Factory>,
    by_type: OnceCache<TypeDescriptor, Arc<Factory>>,
    by_class_name: OnceCache<String, Arc<Factory>>,
    resolved_types: OnceCache<String, Option<TypeDescriptor>>,
    delegates: OnceCache<TypeDescriptor, Arc<DelegateFactory>>,
}

impl FactoryCache {
    pub fn new(metadata: Arc<dyn TypeMetadata>) -> Self {
        Self::with_capacity(metadata, 0)
    }

    pub fn with_capacity(metadata: Arc<dyn TypeMetadata>, capacity: usize) -> Self {
        Self {
            metadata,
            identity: Arc::new(Factory::identity()),
            by_type: OnceCache::with_capacity(capacity),
            by_class_name: OnceCache::with_capacity(capacity),
            resolved_types: OnceCache::with_capacity(capacity),
            delegates: OnceCache::with_capacity(capacity),
        }
    }

    /// The shared identity factory
    pub fn identity(&self) -> Arc<Factory> {
        Arc::clone(&self.identity)
    }

    /// Contract A: factory for a declared type
    ///
    /// `None` is the absent type and yields the identity factory.
    pub fn for_type(&self, ty: Option<&TypeDescriptor>) -> Result<Arc<Factory>> {
        let Some(ty) = ty else {
            return Ok(self.identity());
        };
        if ty.is_object() {
            return Ok(self.identity());
        }
        self.by_type.get_or_try_init(ty, || -> Result<Arc<Factory>> {
            let factory = Arc::new(Factory::new(self.strategy_for_type(ty)?));
            log_factory_resolved(&ty.to_string(), factory.strategy().name());
            Ok(factory)
        })
    }

    /// Contract B: factory for a run-time class name
    pub fn for_class_name(&self, class_name: &str) -> Result<Arc<Factory>> {
        if class_name.is_empty() || class_name == "Object" {
            return Ok(self.identity());
        }
        self.by_class_name.get_or_try_init(&class_name.to_string(), || -> Result<Arc<Factory>> {
            let factory = match class_name {
                BOXED_STRING_CLASS_NAME => Arc::new(Factory::new(ConstructionStrategy::BoxedString)),
                BOXED_TYPE_NAME_CLASS_NAME => {
                    Arc::new(Factory::new(ConstructionStrategy::BoxedTypeName))
                }
                _ => match self.resolve_type(class_name) {
                    Some(ty) => Self::with_class_name(self.for_type(Some(&ty))?, class_name),
                    None => {
                        log_resolution_fallback(class_name);
                        self.identity()
                    }
                },
            };
            log_factory_resolved(class_name, factory.strategy().name());
            Ok(factory)
        })
    }

    /// Construct under the name the object reported rather than the one
    /// synthesized from its resolved type
    fn with_class_name(factory: Arc<Factory>, class_name: &str) -> Arc<Factory> {
        match factory.strategy() {
            ConstructionStrategy::ClassName {
                class_name: synthesized,
                create,
            } if synthesized != class_name => Arc::new(Factory::new(ConstructionStrategy::ClassName {
                class_name: class_name.to_string(),
                create: Arc::clone(create),
            })),
            _ => factory,
        }
    }

    /// Cached class name → type resolution
    pub fn resolve_type(&self, class_name: &str) -> Option<TypeDescriptor> {
        self.resolved_types.get_or_init(&class_name.to_string(), || {
            self.metadata.find_type_by_class_name(class_name)
        })
    }

    /// Class name to construct a proxy for `reference` under
    ///
    /// The self-reported class wins unless it does not resolve to something
    /// usable as `expected`; then the name synthesized from `expected` is
    /// used, so the proxy can be cast back to the caller's static type.
    pub fn resolve_construction_class_name(
        &self,
        reference: &ObjectReference,
        expected: Option<&TypeDescriptor>,
    ) -> Result<String> {
        let reported = reference.runtime_class_name()?;
        let Some(expected) = expected.filter(|ty| !ty.is_object()) else {
            return Ok(reported.unwrap_or_default());
        };

        if let Some(name) = reported {
            if let Some(resolved) = self.resolve_type(&name) {
                if self.is_compatible(&resolved, expected) {
                    return Ok(name);
                }
            }
            debug!(
                target: "interop::factory",
                reported = %name,
                expected = %expected,
                "reported class not usable as expected type"
            );
        }
        Ok(self.metadata.class_name_for_type(expected))
    }

    fn is_compatible(&self, resolved: &TypeDescriptor, expected: &TypeDescriptor) -> bool {
        if resolved == expected || self.metadata.is_assignable(resolved, expected) {
            return true;
        }
        match expected.generic_definition() {
            Some(definition) => self
                .metadata
                .implemented_interfaces(resolved)
                .iter()
                .any(|iface| iface.generic_definition() == Some(definition)),
            None => false,
        }
    }

    /// Cached constructor for delegates of type `ty`
    pub fn delegate_factory(&self, ty: &TypeDescriptor) -> Result<Arc<DelegateFactory>> {
        self.delegates.get_or_try_init(ty, || -> Result<Arc<DelegateFactory>> {
            let create = self.entry_point(ty, EntryPointKind::CreateProxy)?;
            let iid = self
                .metadata
                .interface_entry(ty)
                .map_or_else(|| ty.parameterized_iid(), |entry| entry.iid);
            Ok(Arc::new(DelegateFactory {
                ty: ty.clone(),
                iid,
                create,
            }))
        })
    }

    /// Lookups through the per-type and per-class-name caches
    pub fn stats(&self) -> (CacheStats, CacheStats) {
        (self.by_type.stats(), self.by_class_name.stats())
    }

    fn entry_point(&self, ty: &TypeDescriptor, kind: EntryPointKind) -> Result<ProxyConstructor> {
        self.metadata
            .entry_point(ty, kind)
            .ok_or_else(|| ProjectionError::missing_entry_point(ty, kind.name()))
    }

    fn strategy_for_type(&self, ty: &TypeDescriptor) -> Result<ConstructionStrategy> {
        if let Some(mapping) = self.metadata.custom_type_mapping(ty) {
            let from_abi = mapping
                .from_abi
                .ok_or_else(|| ProjectionError::missing_entry_point(ty, "FromAbi"))?;
            return Ok(ConstructionStrategy::CustomMapping {
                ty: ty.clone(),
                from_abi,
            });
        }

        if ty.is_key_value_pair() {
            return Ok(ConstructionStrategy::KeyValuePair {
                ty: ty.clone(),
                create: self.entry_point(ty, EntryPointKind::CreateProxy)?,
            });
        }

        match ty.kind() {
            TypeKind::String => return Ok(ConstructionStrategy::BoxedString),
            TypeKind::TypeName => return Ok(ConstructionStrategy::BoxedTypeName),
            _ => {}
        }

        if ty.is_value_type() {
            let value_type = ty.nullable_underlying().unwrap_or(ty);
            return match value_type.kind() {
                TypeKind::String => Ok(ConstructionStrategy::BoxedString),
                TypeKind::TypeName => Ok(ConstructionStrategy::BoxedTypeName),
                TypeKind::Primitive(primitive) => Ok(ConstructionStrategy::BoxedValue {
                    ty: value_type.clone(),
                    read: boxing::primitive_reader(*primitive),
                }),
                _ => Ok(ConstructionStrategy::BoxedValue {
                    ty: value_type.clone(),
                    read: self.entry_point(value_type, EntryPointKind::BoxedValue)?,
                }),
            };
        }

        if let TypeKind::NullableDelegate = ty.kind() {
            return Ok(ConstructionStrategy::NullableDelegate {
                ty: ty.clone(),
                read: self.entry_point(ty, EntryPointKind::NullableDelegateValue)?,
            });
        }

        let array_element = match ty.kind() {
            TypeKind::ReferenceArray => ty.element_type(),
            TypeKind::Array { .. } if ty.is_sz_array() => ty.element_type(),
            _ => None,
        };
        if let Some(element) = array_element {
            let read = match boxing::array_reader(element) {
                Some(read) => read,
                None => self.entry_point(
                    &TypeDescriptor::reference_array(element.clone()),
                    EntryPointKind::ReferenceArrayValue,
                )?,
            };
            return Ok(ConstructionStrategy::ReferenceArray {
                element: element.clone(),
                iid: boxing::reference_array_iid(element),
                read,
            });
        }

        Ok(ConstructionStrategy::ClassName {
            class_name: self.metadata.class_name_for_type(ty),
            create: self.entry_point(ty, EntryPointKind::CreateProxy)?,
        })
    }
}
