//! Hand-built native object used by the integration tests
//!
//! Exposes IUnknown/IInspectable plus, depending on its `Marshaling`, the
//! agility marker or a custom IMarshal. Reference counting is real: the
//! object frees itself on its last release.

#![allow(dead_code)]

use std::ffi::c_void;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use winrt_projection::ffi::abi::{HStringAbi, IInspectableVtbl, IMarshalVtbl, IUnknownVtbl, RawPtr};
use winrt_projection::ffi::HString;
use winrt_projection::{iids, Guid, HResult, ObjectReference};

/// How the object answers the free-threading questions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marshaling {
    /// Exposes IAgileObject
    Agile,
    /// IMarshal reporting the in-process free-threaded marshaler
    FreeThreaded,
    /// IMarshal reporting some other unmarshal class
    Standard,
    /// IMarshal whose GetUnmarshalClass fails
    Failing,
    /// Neither capability
    None,
}

pub const STANDARD_MARSHALER: Guid = Guid::from_u128(0x00000017_0000_0000_c000_000000000046);

#[repr(C)]
struct Slot {
    vtable: *const c_void,
    object: *const NativeObject,
}

struct NativeObject {
    identity: Slot,
    agile: Slot,
    marshal: Slot,
    refs: AtomicU32,
    marshaling: Marshaling,
    class_name: Option<String>,
    last_context: AtomicU32,
    destroyed: Arc<AtomicBool>,
}

/// Owns one reference to a `NativeObject`
pub struct NativeHandle {
    object: *const NativeObject,
    destroyed: Arc<AtomicBool>,
}

unsafe impl Send for NativeHandle {}
unsafe impl Sync for NativeHandle {}

impl NativeHandle {
    pub fn new(marshaling: Marshaling) -> Self {
        Self::with_class_name(marshaling, None)
    }

    pub fn with_class_name(marshaling: Marshaling, class_name: Option<&str>) -> Self {
        let destroyed = Arc::new(AtomicBool::new(false));
        let object = Box::into_raw(Box::new(NativeObject {
            identity: Slot {
                vtable: &IDENTITY_VTABLE as *const IInspectableVtbl as *const c_void,
                object: ptr::null(),
            },
            agile: Slot {
                vtable: &AGILE_VTABLE as *const IUnknownVtbl as *const c_void,
                object: ptr::null(),
            },
            marshal: Slot {
                vtable: &MARSHAL_VTABLE as *const IMarshalVtbl as *const c_void,
                object: ptr::null(),
            },
            refs: AtomicU32::new(1),
            marshaling,
            class_name: class_name.map(str::to_string),
            last_context: AtomicU32::new(u32::MAX),
            destroyed: Arc::clone(&destroyed),
        }));
        unsafe {
            (*object).identity.object = object;
            (*object).agile.object = object;
            (*object).marshal.object = object;
        }
        Self { object, destroyed }
    }

    /// Identity pointer (not AddRef'd)
    pub fn as_raw(&self) -> RawPtr {
        unsafe { &(*self.object).identity as *const Slot as RawPtr }
    }

    /// New owned reference to the identity interface
    pub fn reference(&self) -> ObjectReference {
        unsafe { ObjectReference::from_borrowed(self.as_raw(), iids::IID_IUNKNOWN) }
            .expect("identity pointer is never null")
    }

    pub fn ref_count(&self) -> u32 {
        unsafe { (*self.object).refs.load(Ordering::SeqCst) }
    }

    /// Destination context passed to the most recent GetUnmarshalClass
    pub fn last_marshal_context(&self) -> Option<u32> {
        let value = unsafe { (*self.object).last_context.load(Ordering::SeqCst) };
        (value != u32::MAX).then_some(value)
    }

    /// Observer that outlives the handle
    pub fn destroyed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.destroyed)
    }
}

impl Drop for NativeHandle {
    fn drop(&mut self) {
        unsafe { release(self.as_raw()) };
    }
}

unsafe fn object<'a>(this: RawPtr) -> &'a NativeObject {
    &*(*(this as *const Slot)).object
}

unsafe extern "system" fn query_interface(this: RawPtr, iid: *const Guid, out: *mut RawPtr) -> HResult {
    let native = object(this);
    let iid = &*iid;
    let slot = if *iid == iids::IID_IUNKNOWN || *iid == iids::IID_IINSPECTABLE {
        Some(&native.identity)
    } else if *iid == iids::IID_IAGILE_OBJECT && native.marshaling == Marshaling::Agile {
        Some(&native.agile)
    } else if *iid == iids::IID_IMARSHAL
        && !matches!(native.marshaling, Marshaling::Agile | Marshaling::None)
    {
        Some(&native.marshal)
    } else {
        None
    };

    match slot {
        Some(slot) => {
            native.refs.fetch_add(1, Ordering::SeqCst);
            *out = slot as *const Slot as RawPtr;
            HResult::S_OK
        }
        None => {
            *out = ptr::null_mut();
            HResult::E_NOINTERFACE
        }
    }
}

unsafe extern "system" fn add_ref(this: RawPtr) -> u32 {
    object(this).refs.fetch_add(1, Ordering::SeqCst) + 1
}

unsafe extern "system" fn release(this: RawPtr) -> u32 {
    let native = object(this);
    let remaining = native.refs.fetch_sub(1, Ordering::SeqCst) - 1;
    if remaining == 0 {
        native.destroyed.store(true, Ordering::SeqCst);
        drop(Box::from_raw(native as *const NativeObject as *mut NativeObject));
    }
    remaining
}

unsafe extern "system" fn get_iids(_this: RawPtr, count: *mut u32, out: *mut *mut Guid) -> HResult {
    *count = 0;
    *out = ptr::null_mut();
    HResult::S_OK
}

unsafe extern "system" fn get_runtime_class_name(this: RawPtr, name: *mut HStringAbi) -> HResult {
    *name = match &object(this).class_name {
        Some(class_name) => HString::new(class_name).into_abi(),
        None => ptr::null_mut(),
    };
    HResult::S_OK
}

unsafe extern "system" fn get_trust_level(_this: RawPtr, level: *mut i32) -> HResult {
    *level = 0;
    HResult::S_OK
}

unsafe extern "system" fn get_unmarshal_class(
    this: RawPtr,
    _riid: *const Guid,
    _pv: RawPtr,
    dest_context: u32,
    _pv_dest_context: RawPtr,
    _flags: u32,
    clsid: *mut Guid,
) -> HResult {
    let native = object(this);
    native.last_context.store(dest_context, Ordering::SeqCst);
    match native.marshaling {
        Marshaling::FreeThreaded => *clsid = iids::CLSID_INPROC_FREE_THREADED_MARSHALER,
        Marshaling::Standard => *clsid = STANDARD_MARSHALER,
        _ => return HResult::E_FAIL,
    }
    HResult::S_OK
}

unsafe extern "system" fn get_marshal_size_max(
    _this: RawPtr,
    _riid: *const Guid,
    _pv: RawPtr,
    _dest_context: u32,
    _pv_dest_context: RawPtr,
    _flags: u32,
    _size: *mut u32,
) -> HResult {
    HResult::E_NOTIMPL
}

unsafe extern "system" fn marshal_interface(
    _this: RawPtr,
    _stream: RawPtr,
    _riid: *const Guid,
    _pv: RawPtr,
    _dest_context: u32,
    _pv_dest_context: RawPtr,
    _flags: u32,
) -> HResult {
    HResult::E_NOTIMPL
}

unsafe extern "system" fn unmarshal_interface(
    _this: RawPtr,
    _stream: RawPtr,
    _riid: *const Guid,
    _out: *mut RawPtr,
) -> HResult {
    HResult::E_NOTIMPL
}

unsafe extern "system" fn release_marshal_data(_this: RawPtr, _stream: RawPtr) -> HResult {
    HResult::E_NOTIMPL
}

unsafe extern "system" fn disconnect_object(_this: RawPtr, _reserved: u32) -> HResult {
    HResult::S_OK
}

static IDENTITY_VTABLE: IInspectableVtbl = IInspectableVtbl {
    base: IUnknownVtbl {
        query_interface,
        add_ref,
        release,
    },
    get_iids,
    get_runtime_class_name,
    get_trust_level,
};

static AGILE_VTABLE: IUnknownVtbl = IUnknownVtbl {
    query_interface,
    add_ref,
    release,
};

static MARSHAL_VTABLE: IMarshalVtbl = IMarshalVtbl {
    base: IUnknownVtbl {
        query_interface,
        add_ref,
        release,
    },
    get_unmarshal_class,
    get_marshal_size_max,
    marshal_interface,
    unmarshal_interface,
    release_marshal_data,
    disconnect_object,
};
