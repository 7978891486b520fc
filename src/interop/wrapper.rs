//! Native-callable wrappers
//!
//! A `CallableWrapper` is what native code sees when it holds a managed
//! object. Every interface it exposes is an `InterfaceSlot`: a vtable pointer
//! followed by a back-pointer to the wrapper, so each entry point can find
//! its wrapper from `this`.
//!
//! Lifetime: native references are counted separately from the `Arc`. While
//! the count is non-zero the wrapper pins itself and its managed target;
//! when it drops back to zero the pin is released and the managed side is
//! again free to be collected.

use super::interface_table::{InterfaceTable, NativeTypeInfo};
use crate::core::guid::{iids, Guid};
use crate::core::metadata::WrapperConstructor;
use crate::core::object::{ManagedObject, ManagedRef};
use crate::errors::{ProjectionError, Result};
use crate::ffi::abi::{
    alloc_array, HStringAbi, ICustomPropertyProviderVtbl, IInspectableVtbl, IMarshalVtbl,
    IStringableVtbl, IUnknownVtbl, IWeakReferenceSourceVtbl, IWeakReferenceVtbl,
};
use crate::ffi::{FunctionTable, FunctionTableAllocator, HResult, HString, ObjectReference, RawPtr};
use crate::logging::{log_boundary_error, trace};
use parking_lot::Mutex;
use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU32, Ordering};
use std::sync::{Arc, Weak};

/// One exposed interface: the address native code holds
#[repr(C)]
pub struct InterfaceSlot {
    vtable: *const c_void,
    wrapper: AtomicPtr<CallableWrapper>,
    iid: Guid,
}

impl InterfaceSlot {
    fn new(vtable: *const c_void, iid: Guid) -> Self {
        Self {
            vtable,
            wrapper: AtomicPtr::new(ptr::null_mut()),
            iid,
        }
    }

    #[inline]
    fn as_raw(&self) -> RawPtr {
        self as *const Self as RawPtr
    }
}

struct Pinned {
    _owner: ManagedRef,
    target: ManagedRef,
    _this: Arc<CallableWrapper>,
}

#[derive(Default)]
struct PinState {
    pinned: Option<Pinned>,
    exported: Option<Weak<dyn ManagedObject>>,
}

pub struct CallableWrapper {
    identity: Box<InterfaceSlot>,
    slots: Box<[InterfaceSlot]>,
    table: Arc<InterfaceTable>,
    info: Arc<NativeTypeInfo>,
    owner: Weak<dyn ManagedObject>,
    substitute: Option<WrapperConstructor>,
    native_refs: AtomicU32,
    state: Mutex<PinState>,
    this: Weak<CallableWrapper>,
}

// Safety: slots hold immutable vtable addresses and an atomic back-pointer.
unsafe impl Send for CallableWrapper {}
unsafe impl Sync for CallableWrapper {}

impl CallableWrapper {
    pub fn new(
        owner: &ManagedRef,
        table: Arc<InterfaceTable>,
        info: Arc<NativeTypeInfo>,
        substitute: Option<WrapperConstructor>,
    ) -> Arc<Self> {
        let wrapper = Arc::new_cyclic(|this| Self {
            identity: Box::new(InterfaceSlot::new(
                &IDENTITY_VTABLE as *const IInspectableVtbl as *const c_void,
                iids::IID_IINSPECTABLE,
            )),
            slots: table
                .unique_entries()
                .map(|entry| InterfaceSlot::new(entry.vtable.as_ptr(), entry.iid))
                .collect(),
            table,
            info,
            owner: Arc::downgrade(owner),
            substitute,
            native_refs: AtomicU32::new(0),
            state: Mutex::new(PinState::default()),
            this: this.clone(),
        });

        let raw = Arc::as_ptr(&wrapper) as *mut CallableWrapper;
        wrapper.identity.wrapper.store(raw, Ordering::Release);
        for slot in wrapper.slots.iter() {
            slot.wrapper.store(raw, Ordering::Release);
        }
        wrapper
    }

    /// Wrapper behind an interface pointer handed out by this module
    ///
    /// # Safety
    /// `this` must be null or a slot pointer produced by a live wrapper.
    pub unsafe fn from_this<'a>(this: RawPtr) -> Option<&'a CallableWrapper> {
        if this.is_null() {
            return None;
        }
        let slot = &*(this as *const InterfaceSlot);
        slot.wrapper.load(Ordering::Acquire).as_ref()
    }

    /// The canonical IUnknown / IInspectable pointer (not AddRef'd)
    pub fn identity_ptr(&self) -> RawPtr {
        self.identity.as_raw()
    }

    pub fn table(&self) -> &Arc<InterfaceTable> {
        &self.table
    }

    pub fn info(&self) -> &NativeTypeInfo {
        &self.info
    }

    pub fn native_ref_count(&self) -> u32 {
        self.native_refs.load(Ordering::Acquire)
    }

    /// The managed object this wrapper was created for
    pub fn owner(&self) -> Option<ManagedRef> {
        self.owner.upgrade()
    }

    /// Object native calls are dispatched to (the substitute, if any)
    pub fn target(&self) -> Option<ManagedRef> {
        let mut state = self.state.lock();
        if let Some(pinned) = &state.pinned {
            return Some(Arc::clone(&pinned.target));
        }
        self.exported(&mut state)
    }

    fn exported(&self, state: &mut PinState) -> Option<ManagedRef> {
        if let Some(existing) = state.exported.as_ref().and_then(Weak::upgrade) {
            return Some(existing);
        }
        let owner = self.owner.upgrade()?;
        let exported = match &self.substitute {
            Some(construct) => construct(&owner),
            None => owner,
        };
        state.exported = Some(Arc::downgrade(&exported));
        Some(exported)
    }

    /// Hand out one native reference to the identity interface
    pub fn to_native(&self) -> Result<ObjectReference> {
        self.add_native_ref();
        unsafe { ObjectReference::from_raw(self.identity_ptr(), iids::IID_IINSPECTABLE) }
            .ok_or(ProjectionError::NullPointer)
    }

    pub fn add_native_ref(&self) -> u32 {
        let previous = self.native_refs.fetch_add(1, Ordering::AcqRel);
        if previous == 0 {
            self.pin();
        }
        previous + 1
    }

    /// Drop one native reference; the returned pin (if any) must be dropped
    /// after the last use of `self`, since it may own the wrapper
    fn release_native_ref(&self) -> (u32, Option<Pinned>) {
        let remaining = match self
            .native_refs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        {
            Ok(previous) => previous - 1,
            Err(_) => return (0, None),
        };
        if remaining == 0 {
            (remaining, self.unpin())
        } else {
            (remaining, None)
        }
    }

    fn pin(&self) {
        let mut state = self.state.lock();
        if state.pinned.is_some() || self.native_refs.load(Ordering::Acquire) == 0 {
            return;
        }
        let (Some(this), Some(owner)) = (self.this.upgrade(), self.owner.upgrade()) else {
            return;
        };
        if let Some(target) = self.exported(&mut state) {
            state.pinned = Some(Pinned {
                _owner: owner,
                target,
                _this: this,
            });
        }
    }

    fn unpin(&self) -> Option<Pinned> {
        let mut state = self.state.lock();
        if self.native_refs.load(Ordering::Acquire) == 0 {
            state.pinned.take()
        } else {
            None
        }
    }

    /// Interface pointer for `iid`, AddRef'd
    pub fn query_interface(&self, iid: &Guid) -> Option<RawPtr> {
        let slot = if *iid == iids::IID_IUNKNOWN || *iid == iids::IID_IINSPECTABLE {
            &*self.identity
        } else {
            self.slots.iter().find(|slot| slot.iid == *iid)?
        };
        self.add_native_ref();
        Some(slot.as_raw())
    }
}

/// Managed object behind `identity` when it is one of our wrappers
pub fn managed_owner(identity: &ObjectReference) -> Option<ManagedRef> {
    let vtable = unsafe { *(identity.as_raw() as *const *const c_void) };
    if vtable != &IDENTITY_VTABLE as *const IInspectableVtbl as *const c_void {
        return None;
    }
    unsafe { CallableWrapper::from_this(identity.as_raw()) }?.owner()
}

/// Run `f` against the managed target of `this`, translating the outcome
/// into a status code
///
/// # Safety
/// `this` must be a slot pointer produced by a live wrapper.
pub unsafe fn invoke_on_target<F>(this: RawPtr, function: &'static str, f: F) -> HResult
where
    F: FnOnce(&ManagedRef) -> Result<()>,
{
    let Some(wrapper) = CallableWrapper::from_this(this) else {
        return HResult::E_POINTER;
    };
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let target = wrapper.target().ok_or(ProjectionError::Disconnected)?;
        f(&target)
    }));
    let result = match outcome {
        Ok(result) => result,
        Err(_) => Err(ProjectionError::Native(HResult::E_FAIL)),
    };
    if let Err(err) = &result {
        log_boundary_error(function, &err.to_string());
    }
    HResult::from_result(&result)
}

// ============================================================================
// IUnknown / IInspectable
// ============================================================================

unsafe extern "system" fn query_interface(this: RawPtr, iid: *const Guid, out: *mut RawPtr) -> HResult {
    if out.is_null() {
        return HResult::E_POINTER;
    }
    *out = ptr::null_mut();
    let Some(wrapper) = CallableWrapper::from_this(this) else {
        return HResult::E_POINTER;
    };
    let Some(iid) = iid.as_ref() else {
        return HResult::E_POINTER;
    };
    match wrapper.query_interface(iid) {
        Some(found) => {
            *out = found;
            HResult::S_OK
        }
        None => {
            trace!(target: "ffi", iid = %iid, "query for unsupported interface");
            HResult::E_NOINTERFACE
        }
    }
}

unsafe extern "system" fn add_ref(this: RawPtr) -> u32 {
    CallableWrapper::from_this(this).map_or(0, CallableWrapper::add_native_ref)
}

unsafe extern "system" fn release(this: RawPtr) -> u32 {
    let Some(wrapper) = CallableWrapper::from_this(this) else {
        return 0;
    };
    let (remaining, released) = wrapper.release_native_ref();
    // May free the wrapper; `wrapper` is not used past this point.
    drop(released);
    remaining
}

unsafe extern "system" fn get_iids(this: RawPtr, count: *mut u32, out: *mut *mut Guid) -> HResult {
    if count.is_null() || out.is_null() {
        return HResult::E_POINTER;
    }
    let Some(wrapper) = CallableWrapper::from_this(this) else {
        return HResult::E_POINTER;
    };
    let (len, array) = alloc_array(wrapper.info().iids());
    *count = len;
    *out = array;
    HResult::S_OK
}

unsafe extern "system" fn get_runtime_class_name(this: RawPtr, name: *mut HStringAbi) -> HResult {
    if name.is_null() {
        return HResult::E_POINTER;
    }
    let Some(wrapper) = CallableWrapper::from_this(this) else {
        return HResult::E_POINTER;
    };
    *name = HString::new(wrapper.info().runtime_class_name()).into_abi();
    HResult::S_OK
}

unsafe extern "system" fn get_trust_level(_this: RawPtr, level: *mut i32) -> HResult {
    if level.is_null() {
        return HResult::E_POINTER;
    }
    // BaseTrust
    *level = 0;
    HResult::S_OK
}

/// IUnknown methods shared by every wrapper table
pub const UNKNOWN_METHODS: IUnknownVtbl = IUnknownVtbl {
    query_interface,
    add_ref,
    release,
};

/// IInspectable methods shared by every wrapper table
pub const INSPECTABLE_METHODS: IInspectableVtbl = IInspectableVtbl {
    base: UNKNOWN_METHODS,
    get_iids,
    get_runtime_class_name,
    get_trust_level,
};

static IDENTITY_VTABLE: IInspectableVtbl = INSPECTABLE_METHODS;

// ============================================================================
// Fixed capability tables
// ============================================================================

/// Bare IUnknown table (used for the agility marker)
pub fn unknown_table(allocator: &FunctionTableAllocator) -> FunctionTable {
    allocator.allocate("IUnknown", || UNKNOWN_METHODS)
}

unsafe extern "system" fn stringable_to_string(this: RawPtr, value: *mut HStringAbi) -> HResult {
    if value.is_null() {
        return HResult::E_POINTER;
    }
    invoke_on_target(this, "IStringable::ToString", |target| {
        *value = HString::new(&target.to_display_string()).into_abi();
        Ok(())
    })
}

pub fn stringable_table(allocator: &FunctionTableAllocator) -> FunctionTable {
    allocator.allocate("IStringable", || IStringableVtbl {
        base: INSPECTABLE_METHODS,
        to_string: stringable_to_string,
    })
}

unsafe extern "system" fn custom_property(this: RawPtr, _name: HStringAbi, out: *mut RawPtr) -> HResult {
    if out.is_null() {
        return HResult::E_POINTER;
    }
    // No dynamic properties: report "not found"
    *out = ptr::null_mut();
    invoke_on_target(this, "ICustomPropertyProvider::GetCustomProperty", |_| Ok(()))
}

unsafe extern "system" fn indexed_property(
    this: RawPtr,
    _name: HStringAbi,
    _type_name: RawPtr,
    out: *mut RawPtr,
) -> HResult {
    if out.is_null() {
        return HResult::E_POINTER;
    }
    *out = ptr::null_mut();
    invoke_on_target(this, "ICustomPropertyProvider::GetIndexedProperty", |_| Ok(()))
}

unsafe extern "system" fn string_representation(this: RawPtr, value: *mut HStringAbi) -> HResult {
    if value.is_null() {
        return HResult::E_POINTER;
    }
    invoke_on_target(this, "ICustomPropertyProvider::GetStringRepresentation", |target| {
        *value = HString::new(&target.to_display_string()).into_abi();
        Ok(())
    })
}

unsafe extern "system" fn property_provider_type(_this: RawPtr, _value: *mut RawPtr) -> HResult {
    HResult::E_NOTIMPL
}

pub fn custom_property_provider_table(allocator: &FunctionTableAllocator) -> FunctionTable {
    allocator.allocate("ICustomPropertyProvider", || ICustomPropertyProviderVtbl {
        base: INSPECTABLE_METHODS,
        get_custom_property: custom_property,
        get_indexed_property: indexed_property,
        get_string_representation: string_representation,
        get_type: property_provider_type,
    })
}

unsafe extern "system" fn unmarshal_class(
    _this: RawPtr,
    _riid: *const Guid,
    _pv: RawPtr,
    _dest_context: u32,
    _pv_dest_context: RawPtr,
    _flags: u32,
    clsid: *mut Guid,
) -> HResult {
    if clsid.is_null() {
        return HResult::E_POINTER;
    }
    *clsid = iids::CLSID_INPROC_FREE_THREADED_MARSHALER;
    HResult::S_OK
}

unsafe extern "system" fn marshal_size_max(
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
    out: *mut RawPtr,
) -> HResult {
    if !out.is_null() {
        *out = ptr::null_mut();
    }
    HResult::E_NOTIMPL
}

unsafe extern "system" fn release_marshal_data(_this: RawPtr, _stream: RawPtr) -> HResult {
    HResult::E_NOTIMPL
}

unsafe extern "system" fn disconnect_object(_this: RawPtr, _reserved: u32) -> HResult {
    HResult::S_OK
}

/// Default free-threaded marshaler: reports the in-process FTM class
pub fn free_threaded_marshal_table(allocator: &FunctionTableAllocator) -> FunctionTable {
    allocator.allocate("IMarshal", || IMarshalVtbl {
        base: UNKNOWN_METHODS,
        get_unmarshal_class: unmarshal_class,
        get_marshal_size_max: marshal_size_max,
        marshal_interface,
        unmarshal_interface,
        release_marshal_data,
        disconnect_object,
    })
}

// ============================================================================
// Weak references
// ============================================================================

#[repr(C)]
struct WeakReference {
    vtable: *const IWeakReferenceVtbl,
    refs: AtomicU32,
    wrapper: Weak<CallableWrapper>,
}

unsafe extern "system" fn weak_query_interface(this: RawPtr, iid: *const Guid, out: *mut RawPtr) -> HResult {
    if out.is_null() || iid.is_null() || this.is_null() {
        return HResult::E_POINTER;
    }
    if *iid == iids::IID_IUNKNOWN || *iid == iids::IID_IWEAK_REFERENCE {
        weak_add_ref(this);
        *out = this;
        HResult::S_OK
    } else {
        *out = ptr::null_mut();
        HResult::E_NOINTERFACE
    }
}

unsafe extern "system" fn weak_add_ref(this: RawPtr) -> u32 {
    let weak = &*(this as *const WeakReference);
    weak.refs.fetch_add(1, Ordering::AcqRel) + 1
}

unsafe extern "system" fn weak_release(this: RawPtr) -> u32 {
    let weak = &*(this as *const WeakReference);
    let remaining = weak.refs.fetch_sub(1, Ordering::AcqRel) - 1;
    if remaining == 0 {
        drop(Box::from_raw(this as *mut WeakReference));
    }
    remaining
}

unsafe extern "system" fn weak_resolve(this: RawPtr, iid: *const Guid, out: *mut RawPtr) -> HResult {
    if out.is_null() || iid.is_null() || this.is_null() {
        return HResult::E_POINTER;
    }
    *out = ptr::null_mut();
    let weak = &*(this as *const WeakReference);
    if let Some(wrapper) = weak.wrapper.upgrade() {
        if wrapper.owner().is_some() {
            if let Some(found) = wrapper.query_interface(&*iid) {
                *out = found;
            }
        }
    }
    HResult::S_OK
}

static WEAK_REFERENCE_VTABLE: IWeakReferenceVtbl = IWeakReferenceVtbl {
    base: IUnknownVtbl {
        query_interface: weak_query_interface,
        add_ref: weak_add_ref,
        release: weak_release,
    },
    resolve: weak_resolve,
};

unsafe extern "system" fn get_weak_reference(this: RawPtr, out: *mut RawPtr) -> HResult {
    if out.is_null() {
        return HResult::E_POINTER;
    }
    *out = ptr::null_mut();
    let Some(wrapper) = CallableWrapper::from_this(this) else {
        return HResult::E_POINTER;
    };
    let weak = Box::new(WeakReference {
        vtable: &WEAK_REFERENCE_VTABLE,
        refs: AtomicU32::new(1),
        wrapper: wrapper.this.clone(),
    });
    *out = Box::into_raw(weak) as RawPtr;
    HResult::S_OK
}

pub fn weak_reference_source_table(allocator: &FunctionTableAllocator) -> FunctionTable {
    allocator.allocate("IWeakReferenceSource", || IWeakReferenceSourceVtbl {
        base: UNKNOWN_METHODS,
        get_weak_reference,
    })
}
