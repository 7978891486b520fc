//! Type metadata collaborator
//!
//! The projection layer never reflects over managed types. Everything it
//! needs (capability interfaces, generated function tables, construction
//! entry points, class-name resolution) is asked of a `TypeMetadata`
//! implementation. `MetadataRegistry` is the in-memory one used by
//! embedders that register their projected types up front.

use super::object::ManagedRef;
use super::types::{Primitive, TypeDescriptor};
use crate::errors::Result;
use crate::ffi::{ObjectReference, RawPtr};
use crate::interop::InterfaceDescriptor;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;

/// Builds a managed proxy from a native reference
pub type ProxyConstructor = Arc<dyn Fn(&ObjectReference) -> Result<ManagedRef> + Send + Sync>;

/// Native-to-managed conversion of a custom-mapped type
pub type FromAbi = Arc<dyn Fn(RawPtr) -> Result<ManagedRef> + Send + Sync>;

/// Produces the object exported in place of a managed instance
pub type WrapperConstructor = Arc<dyn Fn(&ManagedRef) -> ManagedRef + Send + Sync>;

/// Construction entry points a projected type may provide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryPointKind {
    /// Wrap a native object of this type in a proxy
    CreateProxy,
    /// Read the payload of an `IReference<T>` box
    BoxedValue,
    /// Read the delegate out of an `IReference<Delegate>` box
    NullableDelegateValue,
    /// Read the payload of an `IReferenceArray<T>` box
    ReferenceArrayValue,
}

impl EntryPointKind {
    pub const fn name(self) -> &'static str {
        match self {
            Self::CreateProxy => "CreateProxy",
            Self::BoxedValue => "BoxedValue",
            Self::NullableDelegateValue => "NullableDelegateValue",
            Self::ReferenceArrayValue => "ReferenceArrayValue",
        }
    }
}

/// Custom mapping between a managed type and its ABI counterpart
#[derive(Clone)]
pub struct TypeMapping {
    pub abi_name: String,
    pub from_abi: Option<FromAbi>,
}

impl fmt::Debug for TypeMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeMapping")
            .field("abi_name", &self.abi_name)
            .field("from_abi", &self.from_abi.is_some())
            .finish()
    }
}

pub trait TypeMetadata: Send + Sync {
    fn find_type_by_class_name(&self, name: &str) -> Option<TypeDescriptor>;

    /// Run-time class name synthesized for a managed type
    fn class_name_for_type(&self, ty: &TypeDescriptor) -> String {
        ty.boxed_name()
    }

    /// Declared capability interfaces, in declaration order
    fn capability_interfaces(&self, _ty: &TypeDescriptor) -> Vec<TypeDescriptor> {
        Vec::new()
    }

    /// Generated descriptor for an interface of the projected object model
    fn interface_entry(&self, _iface: &TypeDescriptor) -> Option<InterfaceDescriptor> {
        None
    }

    /// ABI-compatible instantiations reachable from a generic interface by variance
    fn variant_compatible_interfaces(&self, _iface: &TypeDescriptor) -> Vec<TypeDescriptor> {
        Vec::new()
    }

    /// Shape exported to native code in place of `ty`
    fn ccw_substitute(&self, _ty: &TypeDescriptor) -> Option<TypeDescriptor> {
        None
    }

    fn ccw_substitute_constructor(&self, _ty: &TypeDescriptor) -> Option<WrapperConstructor> {
        None
    }

    /// Metadata type carrying the projection attributes of an authored type
    fn authoring_metadata_type(&self, _ty: &TypeDescriptor) -> Option<TypeDescriptor> {
        None
    }

    fn is_projected_type(&self, ty: &TypeDescriptor) -> bool {
        ty.is_projected()
    }

    fn custom_type_mapping(&self, _ty: &TypeDescriptor) -> Option<TypeMapping> {
        None
    }

    /// Whether a value of `from` can be used where `to` is expected
    fn is_assignable(&self, from: &TypeDescriptor, to: &TypeDescriptor) -> bool {
        from == to || to.is_object()
    }

    fn implemented_interfaces(&self, _ty: &TypeDescriptor) -> Vec<TypeDescriptor> {
        Vec::new()
    }

    fn entry_point(&self, _ty: &TypeDescriptor, _kind: EntryPointKind) -> Option<ProxyConstructor> {
        None
    }
}

const IREFERENCE_PREFIX: &str = "Windows.Foundation.IReference`1<";
const IREFERENCE_ARRAY_PREFIX: &str = "Windows.Foundation.IReferenceArray`1<";

/// In-memory metadata populated by registration
#[derive(Default)]
pub struct MetadataRegistry {
    class_names: DashMap<String, TypeDescriptor>,
    capabilities: DashMap<TypeDescriptor, Vec<TypeDescriptor>>,
    interface_entries: DashMap<TypeDescriptor, InterfaceDescriptor>,
    variance: DashMap<TypeDescriptor, Vec<TypeDescriptor>>,
    substitutes: DashMap<TypeDescriptor, (TypeDescriptor, Option<WrapperConstructor>)>,
    authoring: DashMap<TypeDescriptor, TypeDescriptor>,
    mappings: DashMap<TypeDescriptor, TypeMapping>,
    base_types: DashMap<TypeDescriptor, TypeDescriptor>,
    interfaces: DashMap<TypeDescriptor, Vec<TypeDescriptor>>,
    entry_points: DashMap<(TypeDescriptor, EntryPointKind), ProxyConstructor>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `ty` resolvable by its own name
    pub fn register_type(&self, ty: TypeDescriptor) -> &Self {
        self.class_names.insert(ty.to_string(), ty);
        self
    }

    pub fn register_class_name(&self, name: impl Into<String>, ty: TypeDescriptor) -> &Self {
        self.class_names.insert(name.into(), ty);
        self
    }

    pub fn register_capabilities(&self, ty: TypeDescriptor, interfaces: Vec<TypeDescriptor>) -> &Self {
        self.capabilities.insert(ty, interfaces);
        self
    }

    pub fn register_interface(&self, iface: TypeDescriptor, entry: InterfaceDescriptor) -> &Self {
        self.interface_entries.insert(iface, entry);
        self
    }

    pub fn register_variance(&self, iface: TypeDescriptor, compatible: Vec<TypeDescriptor>) -> &Self {
        self.variance.insert(iface, compatible);
        self
    }

    pub fn register_substitute(
        &self,
        ty: TypeDescriptor,
        substitute: TypeDescriptor,
        constructor: Option<WrapperConstructor>,
    ) -> &Self {
        self.substitutes.insert(ty, (substitute, constructor));
        self
    }

    pub fn register_authoring_type(&self, ty: TypeDescriptor, metadata: TypeDescriptor) -> &Self {
        self.authoring.insert(ty, metadata);
        self
    }

    pub fn register_mapping(&self, ty: TypeDescriptor, mapping: TypeMapping) -> &Self {
        self.mappings.insert(ty, mapping);
        self
    }

    pub fn register_base(&self, ty: TypeDescriptor, base: TypeDescriptor) -> &Self {
        self.base_types.insert(ty, base);
        self
    }

    pub fn register_implements(&self, ty: TypeDescriptor, interfaces: Vec<TypeDescriptor>) -> &Self {
        self.interfaces.insert(ty, interfaces);
        self
    }

    pub fn register_entry_point(
        &self,
        ty: TypeDescriptor,
        kind: EntryPointKind,
        constructor: ProxyConstructor,
    ) -> &Self {
        self.entry_points.insert((ty, kind), constructor);
        self
    }

    fn parse_boxed_name(&self, name: &str) -> Option<TypeDescriptor> {
        if let Some(inner) = strip_generic(name, IREFERENCE_PREFIX) {
            let inner = self.find_type_by_class_name(inner)?;
            return Some(if inner.is_delegate() {
                TypeDescriptor::nullable_delegate(inner)
            } else {
                TypeDescriptor::nullable(inner)
            });
        }
        if let Some(inner) = strip_generic(name, IREFERENCE_ARRAY_PREFIX) {
            let element = self.find_type_by_class_name(inner)?;
            return Some(TypeDescriptor::reference_array(element));
        }
        match name {
            "Object" => Some(TypeDescriptor::object()),
            "String" => Some(TypeDescriptor::string()),
            "Windows.UI.Xaml.Interop.TypeName" => Some(TypeDescriptor::type_name()),
            _ => Primitive::from_class_name(name).map(TypeDescriptor::primitive),
        }
    }

    fn base_chain(&self, ty: &TypeDescriptor) -> Vec<TypeDescriptor> {
        let mut chain = Vec::new();
        let mut current = ty.clone();
        while let Some(base) = self.base_types.get(&current).map(|b| b.clone()) {
            if chain.contains(&base) {
                break;
            }
            chain.push(base.clone());
            current = base;
        }
        chain
    }
}

fn strip_generic<'a>(name: &'a str, prefix: &str) -> Option<&'a str> {
    name.strip_prefix(prefix)?.strip_suffix('>')
}

impl TypeMetadata for MetadataRegistry {
    fn find_type_by_class_name(&self, name: &str) -> Option<TypeDescriptor> {
        if let Some(ty) = self.class_names.get(name) {
            return Some(ty.clone());
        }
        self.parse_boxed_name(name)
    }

    fn capability_interfaces(&self, ty: &TypeDescriptor) -> Vec<TypeDescriptor> {
        self.capabilities.get(ty).map(|c| c.clone()).unwrap_or_default()
    }

    fn interface_entry(&self, iface: &TypeDescriptor) -> Option<InterfaceDescriptor> {
        self.interface_entries.get(iface).map(|e| *e)
    }

    fn variant_compatible_interfaces(&self, iface: &TypeDescriptor) -> Vec<TypeDescriptor> {
        self.variance.get(iface).map(|v| v.clone()).unwrap_or_default()
    }

    fn ccw_substitute(&self, ty: &TypeDescriptor) -> Option<TypeDescriptor> {
        self.substitutes.get(ty).map(|s| s.0.clone())
    }

    fn ccw_substitute_constructor(&self, ty: &TypeDescriptor) -> Option<WrapperConstructor> {
        self.substitutes.get(ty).and_then(|s| s.1.clone())
    }

    fn authoring_metadata_type(&self, ty: &TypeDescriptor) -> Option<TypeDescriptor> {
        self.authoring.get(ty).map(|t| t.clone())
    }

    fn custom_type_mapping(&self, ty: &TypeDescriptor) -> Option<TypeMapping> {
        self.mappings.get(ty).map(|m| m.clone())
    }

    fn is_assignable(&self, from: &TypeDescriptor, to: &TypeDescriptor) -> bool {
        if from == to || to.is_object() {
            return true;
        }
        let mut lineage = vec![from.clone()];
        lineage.extend(self.base_chain(from));
        lineage.iter().any(|ty| {
            ty == to || self.implemented_interfaces(ty).iter().any(|iface| iface == to)
        })
    }

    fn implemented_interfaces(&self, ty: &TypeDescriptor) -> Vec<TypeDescriptor> {
        self.interfaces.get(ty).map(|i| i.clone()).unwrap_or_default()
    }

    fn entry_point(&self, ty: &TypeDescriptor, kind: EntryPointKind) -> Option<ProxyConstructor> {
        self.entry_points.get(&(ty.clone(), kind)).map(|e| e.clone())
    }
}
