//! Managed objects as seen by the projection layer

use super::types::{TypeDescriptor, TypeKind};
use crate::ffi::ObjectReference;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

pub trait AsAny: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A managed instance; "collected" means its last strong `Arc` is gone
pub trait ManagedObject: AsAny {
    fn type_descriptor(&self) -> TypeDescriptor;

    /// Text returned through `IStringable::ToString`
    fn to_display_string(&self) -> String {
        self.type_descriptor().to_string()
    }
}

pub type ManagedRef = Arc<dyn ManagedObject>;

/// Address used as the object's identity key
#[inline]
pub fn object_address(obj: &ManagedRef) -> usize {
    Arc::as_ptr(obj) as *const () as usize
}

pub fn downcast_ref<T: ManagedObject>(obj: &ManagedRef) -> Option<&T> {
    <dyn ManagedObject as AsAny>::as_any(&**obj).downcast_ref::<T>()
}

pub fn downcast<T: ManagedObject>(obj: &ManagedRef) -> Option<Arc<T>> {
    <dyn ManagedObject as AsAny>::into_any(Arc::clone(obj))
        .downcast::<T>()
        .ok()
}

/// Untyped proxy: the native reference used as-is
pub struct Inspectable {
    reference: ObjectReference,
}

impl Inspectable {
    pub fn new(reference: ObjectReference) -> Self {
        Self { reference }
    }

    pub fn reference(&self) -> &ObjectReference {
        &self.reference
    }
}

impl ManagedObject for Inspectable {
    fn type_descriptor(&self) -> TypeDescriptor {
        TypeDescriptor::object()
    }
}

impl fmt::Debug for Inspectable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Inspectable").field(&self.reference).finish()
    }
}

/// How a boxed type reference names its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum TypeNameKind {
    Primitive = 0,
    Metadata = 1,
    Custom = 2,
}

impl TypeNameKind {
    pub fn from_abi(value: i32) -> Self {
        match value {
            0 => Self::Primitive,
            1 => Self::Metadata,
            _ => Self::Custom,
        }
    }

    /// Kind reported for a managed type
    pub fn of(ty: &TypeDescriptor) -> Self {
        match ty.kind() {
            TypeKind::Primitive(_) | TypeKind::String | TypeKind::Object => Self::Primitive,
            _ if ty.is_projected() => Self::Metadata,
            _ => Self::Custom,
        }
    }
}

/// Value of a boxed type reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeNameValue {
    pub name: String,
    pub kind: TypeNameKind,
}

impl TypeNameValue {
    pub fn of(ty: &TypeDescriptor) -> Self {
        Self {
            name: ty.to_string(),
            kind: TypeNameKind::of(ty),
        }
    }
}

/// A value-typed payload boxed as a managed object
#[derive(Debug, Clone)]
pub struct Boxed<T> {
    ty: TypeDescriptor,
    value: T,
}

impl<T> Boxed<T> {
    pub fn new(ty: TypeDescriptor, value: T) -> Self {
        Self { ty, value }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn ty(&self) -> &TypeDescriptor {
        &self.ty
    }
}

impl<T: super::types::AbiPrimitive> Boxed<T> {
    pub fn primitive(value: T) -> Self {
        Self::new(TypeDescriptor::of::<T>(), value)
    }
}

impl Boxed<String> {
    pub fn string(value: impl Into<String>) -> Self {
        Self::new(TypeDescriptor::string(), value.into())
    }
}

impl<T: fmt::Debug + Send + Sync + 'static> ManagedObject for Boxed<T> {
    fn type_descriptor(&self) -> TypeDescriptor {
        self.ty.clone()
    }

    fn to_display_string(&self) -> String {
        match <dyn Any>::downcast_ref::<String>(&self.value) {
            Some(text) => text.clone(),
            None => format!("{:?}", self.value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downcast() {
        let obj: ManagedRef = Arc::new(Boxed::primitive(42i32));
        assert_eq!(downcast_ref::<Boxed<i32>>(&obj).map(|b| *b.value()), Some(42));
        assert!(downcast_ref::<Boxed<u32>>(&obj).is_none());

        let arc = downcast::<Boxed<i32>>(&obj).unwrap();
        assert_eq!(object_address(&obj), Arc::as_ptr(&arc) as *const () as usize);
    }

    #[test]
    fn test_display_string() {
        let text: ManagedRef = Arc::new(Boxed::string("hello"));
        assert_eq!(text.to_display_string(), "hello");

        let number: ManagedRef = Arc::new(Boxed::primitive(7u8));
        assert_eq!(number.to_display_string(), "7");
        assert_eq!(number.type_descriptor(), TypeDescriptor::of::<u8>());
    }
}
