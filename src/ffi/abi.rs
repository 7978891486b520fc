//! Function-table layouts
//!
//! Every interface pointer points at a slot whose first word is a pointer to
//! one of these tables. Derived interfaces embed their base table first, so a
//! pointer to any of them can be read as an `IUnknownVtbl`.

use crate::core::guid::Guid;
use crate::ffi::HResult;
use std::ffi::c_void;

pub type RawPtr = *mut c_void;

/// Opaque string handle (null = empty string)
pub type HStringAbi = *mut c_void;

/// Destination context for in-process unmarshaling
pub const MSHCTX_INPROC: u32 = 3;
pub const MSHLFLAGS_NORMAL: u32 = 0;

#[repr(C)]
pub struct IUnknownVtbl {
    pub query_interface:
        unsafe extern "system" fn(this: RawPtr, iid: *const Guid, out: *mut RawPtr) -> HResult,
    pub add_ref: unsafe extern "system" fn(this: RawPtr) -> u32,
    pub release: unsafe extern "system" fn(this: RawPtr) -> u32,
}

#[repr(C)]
pub struct IInspectableVtbl {
    pub base: IUnknownVtbl,
    pub get_iids:
        unsafe extern "system" fn(this: RawPtr, count: *mut u32, iids: *mut *mut Guid) -> HResult,
    pub get_runtime_class_name:
        unsafe extern "system" fn(this: RawPtr, name: *mut HStringAbi) -> HResult,
    pub get_trust_level: unsafe extern "system" fn(this: RawPtr, level: *mut i32) -> HResult,
}

#[repr(C)]
pub struct IMarshalVtbl {
    pub base: IUnknownVtbl,
    pub get_unmarshal_class: unsafe extern "system" fn(
        this: RawPtr,
        riid: *const Guid,
        pv: RawPtr,
        dest_context: u32,
        pv_dest_context: RawPtr,
        flags: u32,
        clsid: *mut Guid,
    ) -> HResult,
    pub get_marshal_size_max: unsafe extern "system" fn(
        this: RawPtr,
        riid: *const Guid,
        pv: RawPtr,
        dest_context: u32,
        pv_dest_context: RawPtr,
        flags: u32,
        size: *mut u32,
    ) -> HResult,
    pub marshal_interface: unsafe extern "system" fn(
        this: RawPtr,
        stream: RawPtr,
        riid: *const Guid,
        pv: RawPtr,
        dest_context: u32,
        pv_dest_context: RawPtr,
        flags: u32,
    ) -> HResult,
    pub unmarshal_interface: unsafe extern "system" fn(
        this: RawPtr,
        stream: RawPtr,
        riid: *const Guid,
        out: *mut RawPtr,
    ) -> HResult,
    pub release_marshal_data: unsafe extern "system" fn(this: RawPtr, stream: RawPtr) -> HResult,
    pub disconnect_object: unsafe extern "system" fn(this: RawPtr, reserved: u32) -> HResult,
}

#[repr(C)]
pub struct IStringableVtbl {
    pub base: IInspectableVtbl,
    pub to_string: unsafe extern "system" fn(this: RawPtr, value: *mut HStringAbi) -> HResult,
}

#[repr(C)]
pub struct ICustomPropertyProviderVtbl {
    pub base: IInspectableVtbl,
    pub get_custom_property:
        unsafe extern "system" fn(this: RawPtr, name: HStringAbi, out: *mut RawPtr) -> HResult,
    pub get_indexed_property: unsafe extern "system" fn(
        this: RawPtr,
        name: HStringAbi,
        type_name: RawPtr,
        out: *mut RawPtr,
    ) -> HResult,
    pub get_string_representation:
        unsafe extern "system" fn(this: RawPtr, value: *mut HStringAbi) -> HResult,
    pub get_type: unsafe extern "system" fn(this: RawPtr, value: *mut RawPtr) -> HResult,
}

#[repr(C)]
pub struct IWeakReferenceSourceVtbl {
    pub base: IUnknownVtbl,
    pub get_weak_reference: unsafe extern "system" fn(this: RawPtr, out: *mut RawPtr) -> HResult,
}

#[repr(C)]
pub struct IWeakReferenceVtbl {
    pub base: IUnknownVtbl,
    pub resolve:
        unsafe extern "system" fn(this: RawPtr, iid: *const Guid, out: *mut RawPtr) -> HResult,
}

/// Boxed-value capability (subset: type tag and numeric classification)
#[repr(C)]
pub struct IPropertyValueVtbl {
    pub base: IInspectableVtbl,
    pub get_type: unsafe extern "system" fn(this: RawPtr, value: *mut i32) -> HResult,
    pub get_is_numeric_scalar: unsafe extern "system" fn(this: RawPtr, value: *mut bool) -> HResult,
}

#[repr(C)]
pub struct IReferenceVtbl<T> {
    pub base: IInspectableVtbl,
    pub get_value: unsafe extern "system" fn(this: RawPtr, value: *mut T) -> HResult,
}

#[repr(C)]
pub struct IReferenceArrayVtbl<T> {
    pub base: IInspectableVtbl,
    pub get_value:
        unsafe extern "system" fn(this: RawPtr, length: *mut u32, value: *mut *mut T) -> HResult,
}

/// ABI shape of a boxed type reference
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TypeNameAbi {
    pub name: HStringAbi,
    pub kind: i32,
}

impl Default for TypeNameAbi {
    fn default() -> Self {
        Self {
            name: std::ptr::null_mut(),
            kind: 0,
        }
    }
}

/// Read the function table of an interface pointer
///
/// # Safety
/// `this` must be a live interface pointer whose table starts with `V`'s layout.
#[inline]
pub unsafe fn vtable<'a, V>(this: RawPtr) -> &'a V {
    &**(this as *const *const V)
}

/// Hand an array to a native caller; free it with [`free_array`]
pub fn alloc_array<T: Copy>(items: &[T]) -> (u32, *mut T) {
    if items.is_empty() {
        return (0, std::ptr::null_mut());
    }
    let boxed: Box<[T]> = items.into();
    let len = boxed.len() as u32;
    (len, Box::into_raw(boxed) as *mut T)
}

/// Release an array produced by [`alloc_array`]
///
/// # Safety
/// `ptr`/`len` must come from a single `alloc_array` call and not be freed twice.
pub unsafe fn free_array<T>(ptr: *mut T, len: u32) {
    if ptr.is_null() {
        return;
    }
    let slice = std::ptr::slice_from_raw_parts_mut(ptr, len as usize);
    drop(Box::from_raw(slice));
}
