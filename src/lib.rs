//! Projection layer between a managed object model and a COM/WinRT-style
//! native ABI.
//!
//! Managed objects are exposed to native code through generated
//! native-callable wrappers; native objects are consumed through cached
//! typed factories. Identity is preserved in both directions.

// Core modules
pub mod config;
pub mod core;
pub mod errors;
pub mod ffi;
pub mod gc;
pub mod interop;
pub mod logging;
pub mod performance;
pub mod runtime;

// Re-export commonly used items
pub use crate::core::{
    iids, Boxed, EntryPointKind, Guid, Inspectable, ManagedObject, ManagedRef, MetadataRegistry,
    Primitive, TypeDescriptor, TypeKind, TypeMetadata,
};
pub use config::RuntimeConfig;
pub use errors::{ProjectionError, Result};
pub use ffi::{HResult, ObjectReference};
pub use gc::{IdentityRegistry, SweepStats};
pub use interop::{
    CallableWrapper, ConstructionStrategy, Factory, FactoryCache, InterfaceDescriptor, InterfaceTable,
    InterfaceTableBuilder, ReferenceClassifier,
};
pub use runtime::{ProjectionRuntime, RuntimeStats};

/// Initialize logging from the environment
pub fn init() {
    logging::init();
}
