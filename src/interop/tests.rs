use super::*;
use crate::core::guid::{iids, Guid};
use crate::core::metadata::{EntryPointKind, MetadataRegistry, ProxyConstructor, TypeMetadata};
use crate::core::object::{Boxed, ManagedRef};
use crate::core::types::TypeDescriptor;
use crate::errors::{ProjectionError, Result};
use crate::ffi::{FunctionTable, FunctionTableAllocator, ObjectReference};
use std::sync::{Arc, Barrier};
use std::thread;

static FAKE_TABLE: [usize; 4] = [0; 4];

fn fake_entry(iid: u128) -> InterfaceDescriptor {
    InterfaceDescriptor::new(Guid::from_u128(iid), FunctionTable::from_static(&FAKE_TABLE))
}

fn builder(metadata: Arc<MetadataRegistry>) -> (InterfaceTableBuilder, Arc<FunctionTableAllocator>) {
    let allocator = Arc::new(FunctionTableAllocator::new());
    let builder = InterfaceTableBuilder::new(metadata, Arc::clone(&allocator));
    (builder, allocator)
}

fn count(table: &InterfaceTable, iid: &Guid) -> usize {
    table.entries().iter().filter(|entry| entry.iid == *iid).count()
}

// ============================================================================
// Interface tables
// ============================================================================

#[test]
fn test_boxed_int32_table() {
    let (builder, allocator) = builder(Arc::new(MetadataRegistry::new()));
    let int32 = TypeDescriptor::of::<i32>();
    let table = builder.build(&int32);

    let well_known = Guid::from_u128(0x548cefbd_bc8a_5fa0_8df2_957440fc8bf4);
    assert_eq!(boxing::reference_iid(&int32), well_known);
    assert_eq!(count(&table, &iids::IID_IPROPERTY_VALUE), 1);
    assert_eq!(count(&table, &well_known), 1);

    let generic = TypeDescriptor::nullable(int32.clone()).parameterized_iid();
    assert_ne!(generic, well_known);
    assert_eq!(count(&table, &generic), 0);
    assert!(allocator.get("IReference<T>").is_none());
    assert!(allocator.get("IReference<Int32>").is_some());
}

#[test]
fn test_fixed_tail_order() {
    let (builder, _) = builder(Arc::new(MetadataRegistry::new()));
    let table = builder.build(&TypeDescriptor::class("Demo.Widget"));

    let order: Vec<Guid> = table.entries().iter().map(|entry| entry.iid).collect();
    assert_eq!(
        order,
        vec![
            iids::IID_ISTRINGABLE,
            iids::IID_ICUSTOM_PROPERTY_PROVIDER,
            iids::IID_IWEAK_REFERENCE_SOURCE,
            iids::IID_IMARSHAL,
            iids::IID_IAGILE_OBJECT,
        ]
    );
    assert!(!table.has_custom_marshal());
    assert_eq!(table.published_iids(), order);
}

#[test]
fn test_custom_marshal_suppresses_default() {
    let metadata = Arc::new(MetadataRegistry::new());
    let widget = TypeDescriptor::class("Demo.Widget").projected();
    let marshal = TypeDescriptor::interface("Demo.IMarshal").projected();
    metadata
        .register_capabilities(widget.clone(), vec![marshal.clone()])
        .register_interface(
            marshal,
            InterfaceDescriptor::new(iids::IID_IMARSHAL, FunctionTable::from_static(&FAKE_TABLE)),
        );

    let (builder, _) = builder(metadata);
    let table = builder.build(&widget);
    assert!(table.has_custom_marshal());
    assert_eq!(count(&table, &iids::IID_IMARSHAL), 1);
    assert_eq!(
        table.find(&iids::IID_IMARSHAL).map(|entry| entry.vtable),
        Some(FunctionTable::from_static(&FAKE_TABLE))
    );
}

#[test]
fn test_capabilities_in_declaration_order_then_variants() {
    let metadata = Arc::new(MetadataRegistry::new());
    let widget = TypeDescriptor::class("Demo.Widget").projected();
    let shape = TypeDescriptor::interface("Demo.IShape").projected();
    let source = TypeDescriptor::interface("Demo.ISource`1")
        .projected()
        .with_args(vec![widget.clone()]);
    let variant = TypeDescriptor::interface("Demo.ISource`1")
        .projected()
        .with_args(vec![TypeDescriptor::object()]);
    let unprojected = TypeDescriptor::interface("Demo.IInternal");

    metadata
        .register_capabilities(widget.clone(), vec![shape.clone(), unprojected, source.clone()])
        .register_interface(shape, fake_entry(1))
        .register_interface(source.clone(), fake_entry(2))
        .register_interface(variant.clone(), fake_entry(3))
        .register_variance(source, vec![variant]);

    let (builder, _) = builder(metadata.clone());
    let table = builder.build(&widget);
    let head: Vec<Guid> = table.entries().iter().take(3).map(|entry| entry.iid).collect();
    assert_eq!(head, vec![Guid::from_u128(1), Guid::from_u128(2), Guid::from_u128(3)]);
    assert_eq!(table.published_iids().len(), 8);
    assert_eq!(table.published_iids()[..3], head[..]);

    let allocator = Arc::new(FunctionTableAllocator::new());
    let invariant = InterfaceTableBuilder::with_options(metadata, allocator, 0, false);
    assert!(!invariant.build(&widget).contains(&Guid::from_u128(3)));
}

#[test]
fn test_duplicate_iids_first_wins() {
    let metadata = Arc::new(MetadataRegistry::new());
    let widget = TypeDescriptor::class("Demo.Widget").projected();
    let first = TypeDescriptor::interface("Demo.IFirst").projected();
    let second = TypeDescriptor::interface("Demo.ISecond").projected();
    static OTHER_TABLE: [usize; 4] = [1; 4];
    metadata
        .register_capabilities(widget.clone(), vec![first.clone(), second.clone()])
        .register_interface(first, fake_entry(7))
        .register_interface(
            second,
            InterfaceDescriptor::new(Guid::from_u128(7), FunctionTable::from_static(&OTHER_TABLE)),
        );

    let (builder, _) = builder(metadata);
    let table = builder.build(&widget);
    assert_eq!(count(&table, &Guid::from_u128(7)), 2);

    let unique: Vec<&InterfaceDescriptor> = table
        .unique_entries()
        .filter(|entry| entry.iid == Guid::from_u128(7))
        .collect();
    assert_eq!(unique.len(), 1);
    assert_eq!(unique[0].vtable, FunctionTable::from_static(&FAKE_TABLE));
    let published = table.published_iids();
    assert_eq!(published[0], Guid::from_u128(7));
    assert_eq!(published.iter().filter(|iid| **iid == Guid::from_u128(7)).count(), 1);
    assert!(published.contains(&iids::IID_IAGILE_OBJECT));
}

#[test]
fn test_variants_of_unprojected_generic_capability() {
    let metadata = Arc::new(MetadataRegistry::new());
    let widget = TypeDescriptor::class("Demo.Widget").projected();
    let source = TypeDescriptor::interface("Demo.ISource`1").with_args(vec![widget.clone()]);
    let variant = TypeDescriptor::interface("Demo.ISource`1")
        .projected()
        .with_args(vec![TypeDescriptor::object()]);

    metadata
        .register_capabilities(widget.clone(), vec![source.clone()])
        .register_interface(variant.clone(), fake_entry(3))
        .register_variance(source, vec![variant]);

    let (builder, _) = builder(metadata);
    let table = builder.build(&widget);
    assert_eq!(table.entries()[0].iid, Guid::from_u128(3));
    assert_eq!(count(&table, &Guid::from_u128(3)), 1);
    assert!(table.published_iids().contains(&Guid::from_u128(3)));
}

#[test]
fn test_delegate_and_array_entries() {
    let metadata = Arc::new(MetadataRegistry::new());
    let handler = TypeDescriptor::delegate("Demo.Handler").projected();
    metadata.register_interface(handler.clone(), fake_entry(9));

    let (builder, allocator) = builder(metadata);
    let table = builder.build(&handler);
    assert_eq!(table.entries()[0].iid, Guid::from_u128(9));
    assert!(table.contains(&iids::IID_IPROPERTY_VALUE));
    assert!(table.contains(&boxing::reference_iid(&handler)));

    let doubles = TypeDescriptor::array(TypeDescriptor::of::<f64>());
    let table = builder.build(&doubles);
    assert!(table.contains(&boxing::reference_array_iid(&TypeDescriptor::of::<f64>())));
    assert!(allocator.get("IReferenceArray<Double>").is_some());

    let bytes = TypeDescriptor::array(TypeDescriptor::of::<i8>());
    builder.build(&bytes);
    assert!(allocator.get("IReferenceArray<T>").is_some());

    let jagged = TypeDescriptor::array(doubles);
    assert!(!builder.build(&jagged).contains(&iids::IID_IPROPERTY_VALUE));
}

#[test]
fn test_object_and_type_name_array_entries() {
    let (builder, allocator) = builder(Arc::new(MetadataRegistry::new()));

    for element in [TypeDescriptor::object(), TypeDescriptor::type_name()] {
        let table = builder.build(&TypeDescriptor::array(element.clone()));
        assert!(table.contains(&iids::IID_IPROPERTY_VALUE));
        assert!(table.contains(&boxing::reference_array_iid(&element)));
    }
    assert!(allocator.get("IReferenceArray<Object>").is_some());
    assert!(allocator.get("IReferenceArray<TypeName>").is_some());
    assert!(allocator.get("IReferenceArray<T>").is_none());

    assert!(boxing::array_reader(&TypeDescriptor::object()).is_some());
    assert!(boxing::array_reader(&TypeDescriptor::type_name()).is_some());
    assert!(boxing::array_reader(&TypeDescriptor::of::<i8>()).is_none());
}

#[test]
fn test_nullable_boxable_predicate() {
    let metadata = Arc::new(MetadataRegistry::new());
    let authored = TypeDescriptor::structure("Demo.Authored");
    let projection = TypeDescriptor::structure("Demo.Projection").projected();
    metadata.register_authoring_type(authored.clone(), projection);

    let (builder, _) = builder(metadata);
    assert!(builder.is_nullable_boxable(&TypeDescriptor::string()));
    assert!(builder.is_nullable_boxable(&TypeDescriptor::type_name()));
    assert!(builder.is_nullable_boxable(&TypeDescriptor::of::<u64>()));
    assert!(builder.is_nullable_boxable(&TypeDescriptor::nullable(TypeDescriptor::of::<u64>())));
    assert!(builder.is_nullable_boxable(&authored));
    assert!(!builder.is_nullable_boxable(&TypeDescriptor::structure("Demo.Plain")));
    assert!(!builder.is_nullable_boxable(&TypeDescriptor::class("Demo.Widget").projected()));
    assert!(!builder.is_nullable_boxable(&TypeDescriptor::delegate("Demo.Local")));
}

#[test]
fn test_concurrent_builds_share_one_table() {
    let (builder, allocator) = builder(Arc::new(MetadataRegistry::new()));
    let builder = Arc::new(builder);
    let barrier = Arc::new(Barrier::new(8));
    let ty = TypeDescriptor::of::<i32>();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let builder = Arc::clone(&builder);
            let barrier = Arc::clone(&barrier);
            let ty = ty.clone();
            thread::spawn(move || {
                barrier.wait();
                builder.build(&ty)
            })
        })
        .collect();

    let tables: Vec<Arc<InterfaceTable>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(tables.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));

    let allocated = allocator.allocations();
    builder.build(&ty);
    builder.build(&TypeDescriptor::class("Demo.Other"));
    assert_eq!(allocator.allocations(), allocated);
}

#[test]
fn test_native_type_info() {
    let (builder, _) = builder(Arc::new(MetadataRegistry::new()));
    let info = builder.native_type_info(&TypeDescriptor::of::<i32>());
    assert_eq!(info.runtime_class_name(), "Windows.Foundation.IReference`1<Int32>");
    assert_eq!(
        info.iids(),
        &[
            iids::IID_IPROPERTY_VALUE,
            boxing::reference_iid(&TypeDescriptor::of::<i32>()),
            iids::IID_ISTRINGABLE,
            iids::IID_ICUSTOM_PROPERTY_PROVIDER,
            iids::IID_IWEAK_REFERENCE_SOURCE,
            iids::IID_IMARSHAL,
            iids::IID_IAGILE_OBJECT,
        ][..]
    );
    assert!(Arc::ptr_eq(&info, &builder.native_type_info(&TypeDescriptor::of::<i32>())));
}

// ============================================================================
// Factories
// ============================================================================

fn proxy_constructor(value: i32) -> ProxyConstructor {
    Arc::new(move |_reference: &ObjectReference| -> Result<ManagedRef> {
        Ok(Arc::new(Boxed::primitive(value)))
    })
}

#[test]
fn test_identity_class_names() {
    let factories = FactoryCache::new(Arc::new(MetadataRegistry::new()));
    assert!(factories.for_class_name("").unwrap().is_identity());
    assert!(factories.for_class_name("Object").unwrap().is_identity());
    assert!(factories.for_type(None).unwrap().is_identity());
    assert!(factories.for_type(Some(&TypeDescriptor::object())).unwrap().is_identity());
}

#[test]
fn test_unknown_class_name_falls_back_to_identity() {
    let factories = FactoryCache::new(Arc::new(MetadataRegistry::new()));
    let factory = factories.for_class_name("Demo.NotRegistered").unwrap();
    assert!(factory.is_identity());
    assert!(!factory.retains_reference());
}

#[test]
fn test_boxed_string_special_cases() {
    let factories = FactoryCache::new(Arc::new(MetadataRegistry::new()));
    let factory = factories.for_class_name(BOXED_STRING_CLASS_NAME).unwrap();
    assert!(matches!(factory.strategy(), ConstructionStrategy::BoxedString));
    assert!(factory.retains_reference());

    let factory = factories.for_class_name(BOXED_TYPE_NAME_CLASS_NAME).unwrap();
    assert!(matches!(factory.strategy(), ConstructionStrategy::BoxedTypeName));
}

#[test]
fn test_value_types_resolve_to_boxed_value() {
    let factories = FactoryCache::new(Arc::new(MetadataRegistry::new()));
    let int32 = TypeDescriptor::of::<i32>();

    let plain = factories.for_type(Some(&int32)).unwrap();
    let nullable = factories
        .for_type(Some(&TypeDescriptor::nullable(int32.clone())))
        .unwrap();
    for factory in [&plain, &nullable] {
        match factory.strategy() {
            ConstructionStrategy::BoxedValue { ty, .. } => assert_eq!(ty, &int32),
            other => panic!("unexpected strategy {:?}", other),
        }
        assert!(factory.retains_reference());
    }

    let by_name = factories
        .for_class_name("Windows.Foundation.IReference`1<Int32>")
        .unwrap();
    assert!(matches!(by_name.strategy(), ConstructionStrategy::BoxedValue { .. }));
}

#[test]
fn test_class_name_strategy_and_missing_entry_point() {
    let metadata = Arc::new(MetadataRegistry::new());
    let widget = TypeDescriptor::class("Demo.Widget").projected();
    metadata.register_type(widget.clone());
    let factories = FactoryCache::new(metadata.clone() as Arc<dyn TypeMetadata>);

    let missing = factories.for_class_name("Demo.Widget");
    assert!(matches!(
        missing,
        Err(ProjectionError::MissingEntryPoint { entry_point: "CreateProxy", .. })
    ));

    // Failures are not cached: registering the entry point fixes the type.
    metadata.register_entry_point(widget.clone(), EntryPointKind::CreateProxy, proxy_constructor(1));
    let factory = factories.for_class_name("Demo.Widget").unwrap();
    assert!(matches!(factory.strategy(), ConstructionStrategy::ClassName { .. }));
    assert!(!factory.retains_reference());
}

#[test]
fn test_class_name_strategy_keeps_reported_name() {
    let metadata = Arc::new(MetadataRegistry::new());
    let widget = TypeDescriptor::class("Demo.Widget").projected();
    metadata
        .register_type(widget.clone())
        .register_class_name("Demo.WidgetImpl", widget.clone())
        .register_entry_point(widget.clone(), EntryPointKind::CreateProxy, proxy_constructor(1));
    let factories = FactoryCache::new(metadata as Arc<dyn TypeMetadata>);

    let reported = factories.for_class_name("Demo.WidgetImpl").unwrap();
    match reported.strategy() {
        ConstructionStrategy::ClassName { class_name, .. } => assert_eq!(class_name, "Demo.WidgetImpl"),
        other => panic!("unexpected strategy {:?}", other),
    }

    let declared = factories.for_type(Some(&widget)).unwrap();
    match declared.strategy() {
        ConstructionStrategy::ClassName { class_name, .. } => assert_eq!(class_name, "Demo.Widget"),
        other => panic!("unexpected strategy {:?}", other),
    }
    assert!(Arc::ptr_eq(&declared, &factories.for_class_name("Demo.Widget").unwrap()));
}

#[test]
fn test_struct_requires_boxed_value_entry_point() {
    let metadata = Arc::new(MetadataRegistry::new());
    let point = TypeDescriptor::structure("Demo.Point").projected();
    let factories = FactoryCache::new(metadata.clone() as Arc<dyn TypeMetadata>);

    assert!(matches!(
        factories.for_type(Some(&point)),
        Err(ProjectionError::MissingEntryPoint { entry_point: "BoxedValue", .. })
    ));

    metadata.register_entry_point(point.clone(), EntryPointKind::BoxedValue, proxy_constructor(2));
    assert!(matches!(
        factories.for_type(Some(&point)).unwrap().strategy(),
        ConstructionStrategy::BoxedValue { .. }
    ));
}

#[test]
fn test_custom_mapping_wins_and_requires_from_abi() {
    use crate::core::metadata::TypeMapping;

    let metadata = Arc::new(MetadataRegistry::new());
    let uri = TypeDescriptor::class("System.Uri");
    metadata.register_mapping(
        uri.clone(),
        TypeMapping {
            abi_name: "Windows.Foundation.Uri".to_string(),
            from_abi: None,
        },
    );
    let factories = FactoryCache::new(metadata as Arc<dyn TypeMetadata>);

    assert!(matches!(
        factories.for_type(Some(&uri)),
        Err(ProjectionError::MissingEntryPoint { entry_point: "FromAbi", .. })
    ));
}

#[test]
fn test_reference_array_strategies() {
    let metadata = Arc::new(MetadataRegistry::new());
    let factories = FactoryCache::new(metadata.clone() as Arc<dyn TypeMetadata>);

    let doubles = factories
        .for_class_name("Windows.Foundation.IReferenceArray`1<Double>")
        .unwrap();
    match doubles.strategy() {
        ConstructionStrategy::ReferenceArray { element, iid, .. } => {
            assert_eq!(element, &TypeDescriptor::of::<f64>());
            assert_eq!(*iid, boxing::reference_array_iid(element));
        }
        other => panic!("unexpected strategy {:?}", other),
    }

    let point = TypeDescriptor::structure("Demo.Point").projected();
    assert!(factories
        .for_type(Some(&TypeDescriptor::array(point.clone())))
        .is_err());
    metadata.register_entry_point(
        TypeDescriptor::reference_array(point.clone()),
        EntryPointKind::ReferenceArrayValue,
        proxy_constructor(3),
    );
    assert!(factories.for_type(Some(&TypeDescriptor::array(point))).is_ok());
}

#[test]
fn test_nullable_delegate_strategy() {
    let metadata = Arc::new(MetadataRegistry::new());
    let handler = TypeDescriptor::delegate("Demo.Handler").projected();
    metadata.register_type(handler.clone()).register_entry_point(
        TypeDescriptor::nullable_delegate(handler),
        EntryPointKind::NullableDelegateValue,
        proxy_constructor(4),
    );
    let factories = FactoryCache::new(metadata as Arc<dyn TypeMetadata>);

    let factory = factories
        .for_class_name("Windows.Foundation.IReference`1<Demo.Handler>")
        .unwrap();
    assert!(matches!(factory.strategy(), ConstructionStrategy::NullableDelegate { .. }));
    assert!(factory.retains_reference());
}

#[test]
fn test_concurrent_factory_requests_converge() {
    let metadata = Arc::new(MetadataRegistry::new());
    let factories = Arc::new(FactoryCache::new(metadata as Arc<dyn TypeMetadata>));
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let factories = Arc::clone(&factories);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                factories
                    .for_class_name("Windows.Foundation.IReference`1<Double>")
                    .unwrap()
            })
        })
        .collect();

    let results: Vec<Arc<Factory>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(results.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
    assert_eq!(factories.stats().1.entries, 1);
}
