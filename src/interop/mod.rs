//! The managed/native boundary: what native code sees of managed objects
//! (interface tables, callable wrappers) and what managed code sees of
//! native objects (factories, reference classification).

pub mod boxing;
pub mod classifier;
pub mod factory;
pub mod interface_table;
pub mod wrapper;

#[cfg(test)]
mod tests;

pub use classifier::{is_free_threaded, ContextSource, ReferenceClassifier, ThreadContextSource};
pub use factory::{
    ConstructionStrategy, DelegateFactory, Factory, FactoryCache, BOXED_STRING_CLASS_NAME,
    BOXED_TYPE_NAME_CLASS_NAME,
};
pub use interface_table::{InterfaceDescriptor, InterfaceTable, InterfaceTableBuilder, NativeTypeInfo};
pub use wrapper::{invoke_on_target, managed_owner, CallableWrapper};
