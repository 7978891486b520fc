//! Core data model: identifiers, type descriptors, managed objects and the
//! metadata collaborator.

pub mod guid;
pub mod metadata;
pub mod object;
pub mod types;

pub use guid::{iids, Guid, GuidGenerator};
pub use metadata::{
    EntryPointKind, FromAbi, MetadataRegistry, ProxyConstructor, TypeMapping, TypeMetadata,
    WrapperConstructor,
};
pub use object::{
    downcast, downcast_ref, object_address, Boxed, Inspectable, ManagedObject, ManagedRef,
    TypeNameKind, TypeNameValue,
};
pub use types::{AbiPrimitive, Char16, DateTime, Primitive, TimeSpan, TypeDescriptor, TypeKind};
