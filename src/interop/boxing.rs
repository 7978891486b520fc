//! Boxed values: `IReference<T>` / `IReferenceArray<T>` descriptors for
//! wrappers, and the matching readers used when a native box is projected
//! back into a managed value.

use super::interface_table::InterfaceDescriptor;
use super::wrapper::{invoke_on_target, INSPECTABLE_METHODS};
use crate::core::guid::{iids, Guid};
use crate::core::metadata::{ProxyConstructor, TypeMetadata};
use crate::core::object::{downcast_ref, Boxed, ManagedRef, TypeNameKind, TypeNameValue};
use crate::core::types::{AbiPrimitive, Char16, DateTime, Primitive, TimeSpan, TypeDescriptor, TypeKind};
use crate::errors::{ProjectionError, Result};
use crate::ffi::abi::{
    alloc_array, free_array, HStringAbi, IPropertyValueVtbl, IReferenceArrayVtbl, IReferenceVtbl,
    TypeNameAbi,
};
use crate::ffi::{FunctionTable, FunctionTableAllocator, HResult, HString, ObjectReference, RawPtr};
use std::ffi::c_void;
use std::sync::Arc;

/// `IReference<T>` identifiers of the built-in value types
fn well_known_reference_iid(ty: &TypeDescriptor) -> Option<Guid> {
    let value = match ty.kind() {
        TypeKind::String => 0xfd416dfb_2a07_52eb_aae3_dfce14116c05,
        TypeKind::Primitive(primitive) => match primitive {
            Primitive::I32 => 0x548cefbd_bc8a_5fa0_8df2_957440fc8bf4,
            Primitive::U8 => 0xe5198cc8_2873_55f5_b0a1_84ff9e4aad62,
            Primitive::I16 => 0x6ec9e41b_6709_5647_9918_a1270110fc4e,
            Primitive::U16 => 0x5ab7d2c3_6b62_5e71_a4b6_2d49c4f238fd,
            Primitive::U32 => 0x513ef3af_e784_5325_a91e_97c2b8111cf3,
            Primitive::I64 => 0x4dda9e24_e69f_5c6a_a0a6_93427365af2a,
            Primitive::U64 => 0x6755e376_53bb_568b_a11d_17239868309e,
            Primitive::F32 => 0x719cc2ba_3e76_5def_9f1a_38d85a145ea8,
            Primitive::F64 => 0x2f2d6c29_5473_5f3e_92e7_96572bb990e2,
            Primitive::Char16 => 0xfb393ef3_bbac_5bd5_9144_84f23576f415,
            Primitive::Bool => 0x3c00fd60_2950_5939_a21a_2d12c5a01b8a,
            Primitive::Guid => 0x7d50f649_632c_51f9_849a_ee49428933ea,
            Primitive::DateTime => 0x5541d8a7_497c_5aa4_86fc_7713adbf2a2c,
            Primitive::TimeSpan => 0x604d0c4c_91de_5c2a_935f_362f13eaf800,
            Primitive::I8 => return None,
        },
        _ => return None,
    };
    Some(Guid::from_u128(value))
}

/// IID of `IReference<T>` for a boxed `ty`
pub fn reference_iid(ty: &TypeDescriptor) -> Guid {
    well_known_reference_iid(ty).unwrap_or_else(|| {
        let shape = if ty.is_delegate() {
            TypeDescriptor::nullable_delegate(ty.clone())
        } else {
            TypeDescriptor::nullable(ty.clone())
        };
        shape.parameterized_iid()
    })
}

/// IID of `IReferenceArray<T>` for arrays of `element`
pub fn reference_array_iid(element: &TypeDescriptor) -> Guid {
    TypeDescriptor::reference_array(element.clone()).parameterized_iid()
}

/// `PropertyType` tag reported by `IPropertyValue::get_Type`
pub fn property_type(ty: &TypeDescriptor) -> i32 {
    const OTHER_TYPE: i32 = 20;
    const ARRAY_OFFSET: i32 = 1024;

    match ty.kind() {
        TypeKind::Primitive(primitive) => match primitive {
            Primitive::U8 => 1,
            Primitive::I16 => 2,
            Primitive::U16 => 3,
            Primitive::I32 => 4,
            Primitive::U32 => 5,
            Primitive::I64 => 6,
            Primitive::U64 => 7,
            Primitive::F32 => 8,
            Primitive::F64 => 9,
            Primitive::Char16 => 10,
            Primitive::Bool => 11,
            Primitive::DateTime => 14,
            Primitive::TimeSpan => 15,
            Primitive::Guid => 16,
            Primitive::I8 => OTHER_TYPE,
        },
        TypeKind::String => 12,
        TypeKind::Object => 13,
        TypeKind::Nullable => ty.nullable_underlying().map_or(OTHER_TYPE, property_type),
        TypeKind::Array { .. } => match ty.element_type().map(property_type) {
            Some(OTHER_TYPE) | None => OTHER_TYPE + ARRAY_OFFSET,
            Some(element) => element + ARRAY_OFFSET,
        },
        _ => OTHER_TYPE,
    }
}

fn is_numeric_scalar(ty: &TypeDescriptor) -> bool {
    matches!(
        ty.as_primitive(),
        Some(
            Primitive::I8
                | Primitive::U8
                | Primitive::I16
                | Primitive::U16
                | Primitive::I32
                | Primitive::U32
                | Primitive::I64
                | Primitive::U64
                | Primitive::F32
                | Primitive::F64
        )
    )
}

fn type_mismatch(ty: &TypeDescriptor) -> ProjectionError {
    ProjectionError::NoInterface { iid: reference_iid(ty) }
}

// ============================================================================
// Wrapper side: function tables reading the managed box
// ============================================================================

unsafe extern "system" fn property_value_type(this: RawPtr, value: *mut i32) -> HResult {
    if value.is_null() {
        return HResult::E_POINTER;
    }
    invoke_on_target(this, "IPropertyValue::get_Type", |target| {
        *value = property_type(&target.type_descriptor());
        Ok(())
    })
}

unsafe extern "system" fn property_value_is_numeric(this: RawPtr, value: *mut bool) -> HResult {
    if value.is_null() {
        return HResult::E_POINTER;
    }
    invoke_on_target(this, "IPropertyValue::get_IsNumericScalar", |target| {
        *value = is_numeric_scalar(&target.type_descriptor());
        Ok(())
    })
}

/// Boxed-value capability descriptor
pub fn property_value_descriptor(allocator: &FunctionTableAllocator) -> InterfaceDescriptor {
    let table = allocator.allocate("IPropertyValue", || IPropertyValueVtbl {
        base: INSPECTABLE_METHODS,
        get_type: property_value_type,
        get_is_numeric_scalar: property_value_is_numeric,
    });
    InterfaceDescriptor::new(iids::IID_IPROPERTY_VALUE, table)
}

unsafe extern "system" fn primitive_value<T: AbiPrimitive>(this: RawPtr, value: *mut T) -> HResult {
    if value.is_null() {
        return HResult::E_POINTER;
    }
    invoke_on_target(this, "IReference::get_Value", |target| {
        let boxed = downcast_ref::<Boxed<T>>(target)
            .ok_or_else(|| type_mismatch(&TypeDescriptor::of::<T>()))?;
        *value = *boxed.value();
        Ok(())
    })
}

fn primitive_table<T: AbiPrimitive>(allocator: &FunctionTableAllocator) -> FunctionTable {
    let kind = format!("IReference<{}>", T::KIND.class_name());
    allocator.allocate(&kind, || IReferenceVtbl::<T> {
        base: INSPECTABLE_METHODS,
        get_value: primitive_value::<T>,
    })
}

fn primitive_reference_table(primitive: Primitive, allocator: &FunctionTableAllocator) -> FunctionTable {
    match primitive {
        Primitive::I8 => primitive_table::<i8>(allocator),
        Primitive::U8 => primitive_table::<u8>(allocator),
        Primitive::I16 => primitive_table::<i16>(allocator),
        Primitive::U16 => primitive_table::<u16>(allocator),
        Primitive::I32 => primitive_table::<i32>(allocator),
        Primitive::U32 => primitive_table::<u32>(allocator),
        Primitive::I64 => primitive_table::<i64>(allocator),
        Primitive::U64 => primitive_table::<u64>(allocator),
        Primitive::F32 => primitive_table::<f32>(allocator),
        Primitive::F64 => primitive_table::<f64>(allocator),
        Primitive::Bool => primitive_table::<bool>(allocator),
        Primitive::Char16 => primitive_table::<Char16>(allocator),
        Primitive::Guid => primitive_table::<Guid>(allocator),
        Primitive::DateTime => primitive_table::<DateTime>(allocator),
        Primitive::TimeSpan => primitive_table::<TimeSpan>(allocator),
    }
}

unsafe extern "system" fn string_value(this: RawPtr, value: *mut HStringAbi) -> HResult {
    if value.is_null() {
        return HResult::E_POINTER;
    }
    invoke_on_target(this, "IReference<String>::get_Value", |target| {
        let boxed = downcast_ref::<Boxed<String>>(target)
            .ok_or_else(|| type_mismatch(&TypeDescriptor::string()))?;
        *value = HString::new(boxed.value()).into_abi();
        Ok(())
    })
}

unsafe extern "system" fn type_name_value(this: RawPtr, value: *mut TypeNameAbi) -> HResult {
    if value.is_null() {
        return HResult::E_POINTER;
    }
    invoke_on_target(this, "IReference<TypeName>::get_Value", |target| {
        let boxed = downcast_ref::<Boxed<TypeNameValue>>(target)
            .ok_or_else(|| type_mismatch(&TypeDescriptor::type_name()))?;
        *value = TypeNameAbi {
            name: HString::new(&boxed.value().name).into_abi(),
            kind: boxed.value().kind as i32,
        };
        Ok(())
    })
}

unsafe extern "system" fn not_implemented_value(_this: RawPtr, _value: *mut c_void) -> HResult {
    HResult::E_NOTIMPL
}

unsafe extern "system" fn not_implemented_array(
    _this: RawPtr,
    length: *mut u32,
    value: *mut *mut c_void,
) -> HResult {
    if !length.is_null() {
        *length = 0;
    }
    if !value.is_null() {
        *value = std::ptr::null_mut();
    }
    HResult::E_NOTIMPL
}

/// Generic `IReference<T>` shape for payloads without a generated table
fn generic_reference_table(allocator: &FunctionTableAllocator) -> FunctionTable {
    allocator.allocate("IReference<T>", || IReferenceVtbl::<c_void> {
        base: INSPECTABLE_METHODS,
        get_value: not_implemented_value,
    })
}

fn generic_reference_array_table(allocator: &FunctionTableAllocator) -> FunctionTable {
    allocator.allocate("IReferenceArray<T>", || IReferenceArrayVtbl::<c_void> {
        base: INSPECTABLE_METHODS,
        get_value: not_implemented_array,
    })
}

/// Type-specific (or generic) `IReference<T>` descriptor for a boxed `ty`
pub fn reference_descriptor(
    ty: &TypeDescriptor,
    metadata: &dyn TypeMetadata,
    allocator: &FunctionTableAllocator,
) -> InterfaceDescriptor {
    let iid = reference_iid(ty);
    match ty.kind() {
        TypeKind::Primitive(primitive) => {
            InterfaceDescriptor::new(iid, primitive_reference_table(*primitive, allocator))
        }
        TypeKind::String => InterfaceDescriptor::new(
            iid,
            allocator.allocate("IReference<String>", || IReferenceVtbl::<HStringAbi> {
                base: INSPECTABLE_METHODS,
                get_value: string_value,
            }),
        ),
        TypeKind::TypeName => InterfaceDescriptor::new(
            iid,
            allocator.allocate("IReference<TypeName>", || IReferenceVtbl::<TypeNameAbi> {
                base: INSPECTABLE_METHODS,
                get_value: type_name_value,
            }),
        ),
        TypeKind::Delegate => metadata
            .interface_entry(&TypeDescriptor::nullable_delegate(ty.clone()))
            .unwrap_or_else(|| InterfaceDescriptor::new(iid, generic_reference_table(allocator))),
        _ => metadata
            .interface_entry(&TypeDescriptor::nullable(ty.clone()))
            .unwrap_or_else(|| InterfaceDescriptor::new(iid, generic_reference_table(allocator))),
    }
}

unsafe extern "system" fn primitive_array_value<T: AbiPrimitive>(
    this: RawPtr,
    length: *mut u32,
    value: *mut *mut T,
) -> HResult {
    if length.is_null() || value.is_null() {
        return HResult::E_POINTER;
    }
    invoke_on_target(this, "IReferenceArray::get_Value", |target| {
        let boxed = downcast_ref::<Boxed<Vec<T>>>(target)
            .ok_or_else(|| ProjectionError::NoInterface {
                iid: reference_array_iid(&TypeDescriptor::of::<T>()),
            })?;
        let (len, data) = alloc_array(boxed.value());
        *length = len;
        *value = data;
        Ok(())
    })
}

fn primitive_array_table<T: AbiPrimitive>(allocator: &FunctionTableAllocator) -> FunctionTable {
    let kind = format!("IReferenceArray<{}>", T::KIND.class_name());
    allocator.allocate(&kind, || IReferenceArrayVtbl::<T> {
        base: INSPECTABLE_METHODS,
        get_value: primitive_array_value::<T>,
    })
}

unsafe extern "system" fn string_array_value(
    this: RawPtr,
    length: *mut u32,
    value: *mut *mut HStringAbi,
) -> HResult {
    if length.is_null() || value.is_null() {
        return HResult::E_POINTER;
    }
    invoke_on_target(this, "IReferenceArray<String>::get_Value", |target| {
        let boxed = downcast_ref::<Boxed<Vec<String>>>(target).ok_or_else(|| {
            ProjectionError::NoInterface {
                iid: reference_array_iid(&TypeDescriptor::string()),
            }
        })?;
        let handles: Vec<HStringAbi> = boxed.value().iter().map(|s| HString::new(s).into_abi()).collect();
        let (len, data) = alloc_array(&handles);
        *length = len;
        *value = data;
        Ok(())
    })
}

unsafe extern "system" fn object_array_value(
    this: RawPtr,
    length: *mut u32,
    value: *mut *mut RawPtr,
) -> HResult {
    if length.is_null() || value.is_null() {
        return HResult::E_POINTER;
    }
    invoke_on_target(this, "IReferenceArray<Object>::get_Value", |target| {
        let boxed = downcast_ref::<Boxed<Vec<Option<ObjectReference>>>>(target).ok_or_else(|| {
            ProjectionError::NoInterface {
                iid: reference_array_iid(&TypeDescriptor::object()),
            }
        })?;
        // Each element carries its own reference; the caller releases them.
        let pointers: Vec<RawPtr> = boxed
            .value()
            .iter()
            .map(|element| element.clone().map_or(std::ptr::null_mut(), ObjectReference::into_raw))
            .collect();
        let (len, data) = alloc_array(&pointers);
        *length = len;
        *value = data;
        Ok(())
    })
}

unsafe extern "system" fn type_name_array_value(
    this: RawPtr,
    length: *mut u32,
    value: *mut *mut TypeNameAbi,
) -> HResult {
    if length.is_null() || value.is_null() {
        return HResult::E_POINTER;
    }
    invoke_on_target(this, "IReferenceArray<TypeName>::get_Value", |target| {
        let boxed = downcast_ref::<Boxed<Vec<TypeNameValue>>>(target).ok_or_else(|| {
            ProjectionError::NoInterface {
                iid: reference_array_iid(&TypeDescriptor::type_name()),
            }
        })?;
        let names: Vec<TypeNameAbi> = boxed
            .value()
            .iter()
            .map(|type_name| TypeNameAbi {
                name: HString::new(&type_name.name).into_abi(),
                kind: type_name.kind as i32,
            })
            .collect();
        let (len, data) = alloc_array(&names);
        *length = len;
        *value = data;
        Ok(())
    })
}

/// Type-specific (or generic) `IReferenceArray<T>` descriptor
///
/// `Int8` arrays have no dedicated shape and use the generic one. Object
/// arrays box `Vec<Option<ObjectReference>>`, so elements are exported
/// before boxing.
pub fn reference_array_descriptor(
    element: &TypeDescriptor,
    metadata: &dyn TypeMetadata,
    allocator: &FunctionTableAllocator,
) -> InterfaceDescriptor {
    let iid = reference_array_iid(element);
    let table = match element.kind() {
        TypeKind::Primitive(primitive) => match primitive {
            Primitive::I8 => None,
            Primitive::U8 => Some(primitive_array_table::<u8>(allocator)),
            Primitive::I16 => Some(primitive_array_table::<i16>(allocator)),
            Primitive::U16 => Some(primitive_array_table::<u16>(allocator)),
            Primitive::I32 => Some(primitive_array_table::<i32>(allocator)),
            Primitive::U32 => Some(primitive_array_table::<u32>(allocator)),
            Primitive::I64 => Some(primitive_array_table::<i64>(allocator)),
            Primitive::U64 => Some(primitive_array_table::<u64>(allocator)),
            Primitive::F32 => Some(primitive_array_table::<f32>(allocator)),
            Primitive::F64 => Some(primitive_array_table::<f64>(allocator)),
            Primitive::Bool => Some(primitive_array_table::<bool>(allocator)),
            Primitive::Char16 => Some(primitive_array_table::<Char16>(allocator)),
            Primitive::Guid => Some(primitive_array_table::<Guid>(allocator)),
            Primitive::DateTime => Some(primitive_array_table::<DateTime>(allocator)),
            Primitive::TimeSpan => Some(primitive_array_table::<TimeSpan>(allocator)),
        },
        TypeKind::String => Some(allocator.allocate("IReferenceArray<String>", || {
            IReferenceArrayVtbl::<HStringAbi> {
                base: INSPECTABLE_METHODS,
                get_value: string_array_value,
            }
        })),
        TypeKind::Object => Some(allocator.allocate("IReferenceArray<Object>", || {
            IReferenceArrayVtbl::<RawPtr> {
                base: INSPECTABLE_METHODS,
                get_value: object_array_value,
            }
        })),
        TypeKind::TypeName => Some(allocator.allocate("IReferenceArray<TypeName>", || {
            IReferenceArrayVtbl::<TypeNameAbi> {
                base: INSPECTABLE_METHODS,
                get_value: type_name_array_value,
            }
        })),
        _ => None,
    };

    match table {
        Some(table) => InterfaceDescriptor::new(iid, table),
        None => metadata
            .interface_entry(&TypeDescriptor::reference_array(element.clone()))
            .unwrap_or_else(|| InterfaceDescriptor::new(iid, generic_reference_array_table(allocator))),
    }
}

unsafe extern "system" fn not_implemented_pair(_this: RawPtr, _value: *mut c_void) -> HResult {
    HResult::E_NOTIMPL
}

#[repr(C)]
struct KeyValuePairVtbl {
    base: crate::ffi::abi::IInspectableVtbl,
    get_key: unsafe extern "system" fn(this: RawPtr, value: *mut c_void) -> HResult,
    get_value: unsafe extern "system" fn(this: RawPtr, value: *mut c_void) -> HResult,
}

/// Dedicated `IKeyValuePair<K, V>` descriptor
pub fn key_value_pair_descriptor(
    ty: &TypeDescriptor,
    metadata: &dyn TypeMetadata,
    allocator: &FunctionTableAllocator,
) -> InterfaceDescriptor {
    metadata.interface_entry(ty).unwrap_or_else(|| {
        let table = allocator.allocate("IKeyValuePair<K, V>", || KeyValuePairVtbl {
            base: INSPECTABLE_METHODS,
            get_key: not_implemented_pair,
            get_value: not_implemented_pair,
        });
        InterfaceDescriptor::new(ty.parameterized_iid(), table)
    })
}

// ============================================================================
// Proxy side: readers that unbox a native reference
// ============================================================================

fn primitive_reader_of<T: AbiPrimitive>() -> ProxyConstructor {
    Arc::new(|reference: &ObjectReference| -> Result<ManagedRef> {
        let ty = TypeDescriptor::of::<T>();
        let boxed = reference.query(&reference_iid(&ty))?;
        let mut value = T::default();
        unsafe {
            let vtbl: &IReferenceVtbl<T> = boxed.vtable_as();
            (vtbl.get_value)(boxed.as_raw(), &mut value).ok()?;
        }
        Ok(Arc::new(Boxed::new(ty, value)) as ManagedRef)
    })
}

/// Reader for `IReference<P>` of a primitive
pub fn primitive_reader(primitive: Primitive) -> ProxyConstructor {
    match primitive {
        Primitive::I8 => primitive_reader_of::<i8>(),
        Primitive::U8 => primitive_reader_of::<u8>(),
        Primitive::I16 => primitive_reader_of::<i16>(),
        Primitive::U16 => primitive_reader_of::<u16>(),
        Primitive::I32 => primitive_reader_of::<i32>(),
        Primitive::U32 => primitive_reader_of::<u32>(),
        Primitive::I64 => primitive_reader_of::<i64>(),
        Primitive::U64 => primitive_reader_of::<u64>(),
        Primitive::F32 => primitive_reader_of::<f32>(),
        Primitive::F64 => primitive_reader_of::<f64>(),
        Primitive::Bool => primitive_reader_of::<bool>(),
        Primitive::Char16 => primitive_reader_of::<Char16>(),
        Primitive::Guid => primitive_reader_of::<Guid>(),
        Primitive::DateTime => primitive_reader_of::<DateTime>(),
        Primitive::TimeSpan => primitive_reader_of::<TimeSpan>(),
    }
}

/// Unbox `IReference<String>`
pub fn read_boxed_string(reference: &ObjectReference) -> Result<ManagedRef> {
    let boxed = reference.query(&reference_iid(&TypeDescriptor::string()))?;
    let mut handle: HStringAbi = std::ptr::null_mut();
    unsafe {
        let vtbl: &IReferenceVtbl<HStringAbi> = boxed.vtable_as();
        (vtbl.get_value)(boxed.as_raw(), &mut handle).ok()?;
    }
    let text = unsafe { HString::from_abi(handle) };
    Ok(Arc::new(Boxed::string(text.to_string_lossy())))
}

/// Unbox `IReference<TypeName>`
pub fn read_boxed_type_name(reference: &ObjectReference) -> Result<ManagedRef> {
    let ty = TypeDescriptor::type_name();
    let boxed = reference.query(&reference_iid(&ty))?;
    let mut value = TypeNameAbi::default();
    unsafe {
        let vtbl: &IReferenceVtbl<TypeNameAbi> = boxed.vtable_as();
        (vtbl.get_value)(boxed.as_raw(), &mut value).ok()?;
    }
    let name = unsafe { HString::from_abi(value.name) };
    let payload = TypeNameValue {
        name: name.to_string_lossy(),
        kind: TypeNameKind::from_abi(value.kind),
    };
    Ok(Arc::new(Boxed::new(ty, payload)))
}

fn primitive_array_reader_of<T: AbiPrimitive>() -> ProxyConstructor {
    Arc::new(|reference: &ObjectReference| -> Result<ManagedRef> {
        let element = TypeDescriptor::of::<T>();
        let array = reference.query(&reference_array_iid(&element))?;
        let mut len = 0u32;
        let mut data: *mut T = std::ptr::null_mut();
        let values = unsafe {
            let vtbl: &IReferenceArrayVtbl<T> = array.vtable_as();
            (vtbl.get_value)(array.as_raw(), &mut len, &mut data).ok()?;
            let values = if data.is_null() {
                Vec::new()
            } else {
                std::slice::from_raw_parts(data, len as usize).to_vec()
            };
            free_array(data, len);
            values
        };
        Ok(Arc::new(Boxed::new(TypeDescriptor::array(element), values)) as ManagedRef)
    })
}

fn string_array_reader() -> ProxyConstructor {
    Arc::new(|reference: &ObjectReference| -> Result<ManagedRef> {
        let element = TypeDescriptor::string();
        let array = reference.query(&reference_array_iid(&element))?;
        let mut len = 0u32;
        let mut data: *mut HStringAbi = std::ptr::null_mut();
        let values = unsafe {
            let vtbl: &IReferenceArrayVtbl<HStringAbi> = array.vtable_as();
            (vtbl.get_value)(array.as_raw(), &mut len, &mut data).ok()?;
            let values: Vec<String> = if data.is_null() {
                Vec::new()
            } else {
                std::slice::from_raw_parts(data, len as usize)
                    .iter()
                    .map(|&handle| HString::from_abi(handle).to_string_lossy())
                    .collect()
            };
            free_array(data, len);
            values
        };
        Ok(Arc::new(Boxed::new(TypeDescriptor::array(element), values)) as ManagedRef)
    })
}

/// Elements come back as owned references; null slots stay `None`.
fn object_array_reader() -> ProxyConstructor {
    Arc::new(|reference: &ObjectReference| -> Result<ManagedRef> {
        let element = TypeDescriptor::object();
        let array = reference.query(&reference_array_iid(&element))?;
        let mut len = 0u32;
        let mut data: *mut RawPtr = std::ptr::null_mut();
        let values = unsafe {
            let vtbl: &IReferenceArrayVtbl<RawPtr> = array.vtable_as();
            (vtbl.get_value)(array.as_raw(), &mut len, &mut data).ok()?;
            let values: Vec<Option<ObjectReference>> = if data.is_null() {
                Vec::new()
            } else {
                std::slice::from_raw_parts(data, len as usize)
                    .iter()
                    .map(|&ptr| ObjectReference::from_raw(ptr, iids::IID_IINSPECTABLE))
                    .collect()
            };
            free_array(data, len);
            values
        };
        Ok(Arc::new(Boxed::new(TypeDescriptor::array(element), values)) as ManagedRef)
    })
}

fn type_name_array_reader() -> ProxyConstructor {
    Arc::new(|reference: &ObjectReference| -> Result<ManagedRef> {
        let element = TypeDescriptor::type_name();
        let array = reference.query(&reference_array_iid(&element))?;
        let mut len = 0u32;
        let mut data: *mut TypeNameAbi = std::ptr::null_mut();
        let values = unsafe {
            let vtbl: &IReferenceArrayVtbl<TypeNameAbi> = array.vtable_as();
            (vtbl.get_value)(array.as_raw(), &mut len, &mut data).ok()?;
            let values: Vec<TypeNameValue> = if data.is_null() {
                Vec::new()
            } else {
                std::slice::from_raw_parts(data, len as usize)
                    .iter()
                    .map(|abi| TypeNameValue {
                        name: HString::from_abi(abi.name).to_string_lossy(),
                        kind: TypeNameKind::from_abi(abi.kind),
                    })
                    .collect()
            };
            free_array(data, len);
            values
        };
        Ok(Arc::new(Boxed::new(TypeDescriptor::array(element), values)) as ManagedRef)
    })
}

/// Built-in reader for `IReferenceArray<element>`, when one exists
pub fn array_reader(element: &TypeDescriptor) -> Option<ProxyConstructor> {
    let reader = match element.kind() {
        TypeKind::String => string_array_reader(),
        TypeKind::Object => object_array_reader(),
        TypeKind::TypeName => type_name_array_reader(),
        TypeKind::Primitive(primitive) => match primitive {
            Primitive::I8 => return None,
            Primitive::U8 => primitive_array_reader_of::<u8>(),
            Primitive::I16 => primitive_array_reader_of::<i16>(),
            Primitive::U16 => primitive_array_reader_of::<u16>(),
            Primitive::I32 => primitive_array_reader_of::<i32>(),
            Primitive::U32 => primitive_array_reader_of::<u32>(),
            Primitive::I64 => primitive_array_reader_of::<i64>(),
            Primitive::U64 => primitive_array_reader_of::<u64>(),
            Primitive::F32 => primitive_array_reader_of::<f32>(),
            Primitive::F64 => primitive_array_reader_of::<f64>(),
            Primitive::Bool => primitive_array_reader_of::<bool>(),
            Primitive::Char16 => primitive_array_reader_of::<Char16>(),
            Primitive::Guid => primitive_array_reader_of::<Guid>(),
            Primitive::DateTime => primitive_array_reader_of::<DateTime>(),
            Primitive::TimeSpan => primitive_array_reader_of::<TimeSpan>(),
        },
        _ => return None,
    };
    Some(reader)
}
