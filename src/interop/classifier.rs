//! Reference Classifier
//!
//! Decides whether a native reference is free-threaded. Free-threaded
//! references are used as-is from any thread; everything else is bound to
//! the execution context it was obtained in.

use crate::core::guid::{iids, Guid};
use crate::errors::Result;
use crate::ffi::abi::{IMarshalVtbl, MSHCTX_INPROC, MSHLFLAGS_NORMAL};
use crate::ffi::{ExecutionContext, ObjectReference, RawPtr};
use crate::logging::log_classification;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Captures the caller's execution context
pub trait ContextSource: Send + Sync {
    fn capture(&self) -> ExecutionContext;
}

/// Treats each thread as its own context
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadContextSource;

impl ContextSource for ThreadContextSource {
    fn capture(&self) -> ExecutionContext {
        let mut hasher = DefaultHasher::new();
        std::thread::current().id().hash(&mut hasher);
        ExecutionContext::new(hasher.finish())
    }
}

/// Free-threaded when the object is agile, or when its custom marshaler
/// unmarshals in-process through the free-threaded marshaler
///
/// Capability absence is not an error; any other failing status propagates.
pub fn is_free_threaded(reference: &ObjectReference) -> Result<bool> {
    if reference.try_query(&iids::IID_IAGILE_OBJECT)?.is_some() {
        log_classification(&reference.iid(), true);
        return Ok(true);
    }

    let Some(marshal) = reference.try_query(&iids::IID_IMARSHAL)? else {
        log_classification(&reference.iid(), false);
        return Ok(false);
    };

    let mut clsid = Guid::ZERO;
    unsafe {
        let vtbl: &IMarshalVtbl = marshal.vtable_as();
        (vtbl.get_unmarshal_class)(
            marshal.as_raw(),
            &iids::IID_IUNKNOWN,
            std::ptr::null_mut(),
            MSHCTX_INPROC,
            std::ptr::null_mut(),
            MSHLFLAGS_NORMAL,
            &mut clsid,
        )
        .ok()?;
    }

    let free_threaded = clsid == iids::CLSID_INPROC_FREE_THREADED_MARSHALER;
    log_classification(&reference.iid(), free_threaded);
    Ok(free_threaded)
}

pub struct ReferenceClassifier {
    context_source: Arc<dyn ContextSource>,
    capture_context: bool,
}

impl ReferenceClassifier {
    pub fn new(context_source: Arc<dyn ContextSource>) -> Self {
        Self {
            context_source,
            capture_context: true,
        }
    }

    /// Never attach contexts; every reference is treated as agile
    pub fn without_context_capture(mut self) -> Self {
        self.capture_context = false;
        self
    }

    pub fn is_free_threaded(&self, reference: &ObjectReference) -> Result<bool> {
        is_free_threaded(reference)
    }

    /// Owned reference for a borrowed interface pointer
    ///
    /// Null yields `None`. Context-bound objects carry the captured context.
    ///
    /// # Safety
    /// `ptr` must be null or a live interface pointer for `iid`.
    pub unsafe fn object_reference_for_interface(
        &self,
        ptr: RawPtr,
        iid: Guid,
    ) -> Result<Option<ObjectReference>> {
        let Some(reference) = ObjectReference::from_borrowed(ptr, iid) else {
            return Ok(None);
        };
        if !self.capture_context || self.is_free_threaded(&reference)? {
            return Ok(Some(reference));
        }
        Ok(Some(reference.with_context(self.context_source.capture())))
    }
}

impl Default for ReferenceClassifier {
    fn default() -> Self {
        Self::new(Arc::new(ThreadContextSource))
    }
}
