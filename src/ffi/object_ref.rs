//! Owned interface pointers
//!
//! An `ObjectReference` owns exactly one native reference. Cloning duplicates
//! it (AddRef) and dropping releases it, so every acquisition is balanced on
//! every path, `?` early returns included.

use super::abi::{self, HStringAbi, IInspectableVtbl, IUnknownVtbl, RawPtr};
use super::{HResult, HString};
use crate::core::guid::{iids, Guid};
use crate::errors::{ProjectionError, Result};
use crate::logging::trace;
use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

/// Captured execution context of a context-bound reference
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Identifies the context the reference was obtained in
    pub token: u64,
    /// Context callback used to re-enter the original context, when available
    pub callback: Option<ObjectReference>,
}

impl ExecutionContext {
    pub fn new(token: u64) -> Self {
        Self { token, callback: None }
    }
}

pub struct ObjectReference {
    ptr: NonNull<c_void>,
    iid: Guid,
    context: Option<Arc<ExecutionContext>>,
}

// Safety: the pointee is a refcounted native object; thread affinity is
// tracked separately through `context`.
unsafe impl Send for ObjectReference {}
unsafe impl Sync for ObjectReference {}

impl ObjectReference {
    /// Adopt a reference the caller already owns
    ///
    /// # Safety
    /// `ptr` must be null or a live interface pointer for `iid` carrying one
    /// reference that is transferred to the result.
    pub unsafe fn from_raw(ptr: RawPtr, iid: Guid) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| Self {
            ptr,
            iid,
            context: None,
        })
    }

    /// Duplicate a borrowed pointer (AddRef)
    ///
    /// # Safety
    /// `ptr` must be null or a live interface pointer for `iid`.
    pub unsafe fn from_borrowed(ptr: RawPtr, iid: Guid) -> Option<Self> {
        let reference = Self::from_raw(ptr, iid)?;
        (reference.unknown().add_ref)(ptr);
        Some(reference)
    }

    #[inline]
    pub fn as_raw(&self) -> RawPtr {
        self.ptr.as_ptr()
    }

    #[inline]
    pub fn iid(&self) -> Guid {
        self.iid
    }

    /// Give up ownership without releasing
    pub fn into_raw(self) -> RawPtr {
        let ptr = self.as_raw();
        std::mem::forget(self);
        ptr
    }

    pub fn with_context(mut self, context: ExecutionContext) -> Self {
        self.context = Some(Arc::new(context));
        self
    }

    pub fn context(&self) -> Option<&ExecutionContext> {
        self.context.as_deref()
    }

    /// Usable from any thread without re-entering a captured context
    pub fn is_agile(&self) -> bool {
        self.context.is_none()
    }

    #[inline]
    fn unknown(&self) -> &IUnknownVtbl {
        unsafe { abi::vtable(self.as_raw()) }
    }

    /// Function table of this pointer viewed as `V`
    ///
    /// # Safety
    /// The interface this reference was obtained for must use `V`'s layout.
    pub unsafe fn vtable_as<V>(&self) -> &V {
        abi::vtable(self.as_raw())
    }

    /// Query for a capability; absence is `Ok(None)`, other failures propagate
    pub fn try_query(&self, iid: &Guid) -> Result<Option<ObjectReference>> {
        let mut out: RawPtr = std::ptr::null_mut();
        let hr = unsafe { (self.unknown().query_interface)(self.as_raw(), iid, &mut out) };

        if hr == HResult::E_NOINTERFACE {
            trace!(target: "ffi", iid = %iid, "capability absent");
            return Ok(None);
        }
        hr.ok()?;

        let mut queried =
            unsafe { Self::from_raw(out, *iid) }.ok_or(ProjectionError::NullPointer)?;
        queried.context = self.context.clone();
        Ok(Some(queried))
    }

    pub fn query(&self, iid: &Guid) -> Result<ObjectReference> {
        self.try_query(iid)?
            .ok_or(ProjectionError::NoInterface { iid: *iid })
    }

    /// The object's canonical IUnknown pointer
    pub fn identity(&self) -> Result<ObjectReference> {
        self.query(&iids::IID_IUNKNOWN)
    }

    /// Self-reported run-time class; `None` for non-inspectable objects
    pub fn runtime_class_name(&self) -> Result<Option<String>> {
        let Some(inspectable) = self.try_query(&iids::IID_IINSPECTABLE)? else {
            return Ok(None);
        };

        let mut handle: HStringAbi = std::ptr::null_mut();
        unsafe {
            let vtbl: &IInspectableVtbl = inspectable.vtable_as();
            (vtbl.get_runtime_class_name)(inspectable.as_raw(), &mut handle).ok()?;
        }
        let name = unsafe { HString::from_abi(handle) };
        Ok((!name.is_empty()).then(|| name.to_string_lossy()))
    }
}

impl Clone for ObjectReference {
    fn clone(&self) -> Self {
        unsafe { (self.unknown().add_ref)(self.as_raw()) };
        Self {
            ptr: self.ptr,
            iid: self.iid,
            context: self.context.clone(),
        }
    }
}

impl Drop for ObjectReference {
    fn drop(&mut self) {
        unsafe { (self.unknown().release)(self.as_raw()) };
    }
}

impl fmt::Debug for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectReference")
            .field("ptr", &self.ptr)
            .field("iid", &self.iid)
            .field("agile", &self.is_agile())
            .finish()
    }
}
