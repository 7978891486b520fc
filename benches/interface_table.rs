//! Interface table and factory benchmarks
//!
//! Measures first-build cost against cached lookups, and the cost of a
//! managed → native → managed round trip.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use winrt_projection::ffi::FunctionTableAllocator;
use winrt_projection::{
    iids, Boxed, InterfaceTableBuilder, ManagedRef, MetadataRegistry, ProjectionRuntime, TypeDescriptor,
};

fn generate_types(n: usize) -> Vec<TypeDescriptor> {
    (0..n)
        .map(|i| match i % 4 {
            0 => TypeDescriptor::class(format!("Bench.Class{}", i)).projected(),
            1 => TypeDescriptor::structure(format!("Bench.Point{}", i)).projected(),
            2 => TypeDescriptor::array(TypeDescriptor::class(format!("Bench.Item{}", i))),
            _ => TypeDescriptor::delegate(format!("Bench.Handler{}", i)).projected(),
        })
        .collect()
}

fn builder() -> InterfaceTableBuilder {
    InterfaceTableBuilder::new(
        Arc::new(MetadataRegistry::new()),
        Arc::new(FunctionTableAllocator::new()),
    )
}

fn bench_table_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("interface_table");

    for size in [10, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("cold", size), size, |b, &size| {
            let types = generate_types(size);
            b.iter(|| {
                let builder = builder();
                for ty in &types {
                    black_box(builder.build(ty));
                }
            });
        });

        group.bench_with_input(BenchmarkId::new("cached", size), size, |b, &size| {
            let types = generate_types(size);
            let builder = builder();
            for ty in &types {
                builder.build(ty);
            }
            b.iter(|| {
                for ty in &types {
                    black_box(builder.build(ty));
                }
            });
        });
    }

    group.finish();
}

fn bench_table_find(c: &mut Criterion) {
    let builder = builder();
    let table = builder.build(&TypeDescriptor::of::<i32>());

    c.bench_function("interface_table/find", |b| {
        b.iter(|| {
            black_box(table.find(black_box(&iids::IID_IAGILE_OBJECT)));
            black_box(table.find(black_box(&iids::IID_IPROPERTY_VALUE)));
        });
    });
}

fn bench_factories(c: &mut Criterion) {
    let mut group = c.benchmark_group("factory");
    let runtime = ProjectionRuntime::new(Arc::new(MetadataRegistry::new()));
    let names: Vec<String> = (0..100).map(|i| format!("Bench.Unknown{}", i)).collect();

    group.bench_function("for_class_name/cached", |b| {
        for name in &names {
            let _ = runtime.factories().for_class_name(name);
        }
        b.iter(|| {
            for name in &names {
                black_box(runtime.factories().for_class_name(name).ok());
            }
        });
    });

    group.bench_function("for_type/boxed_int", |b| {
        let ty = TypeDescriptor::of::<i32>();
        b.iter(|| black_box(runtime.factories().for_type(Some(&ty)).ok()));
    });

    group.finish();
}

fn bench_roundtrip(c: &mut Criterion) {
    let runtime = ProjectionRuntime::new(Arc::new(MetadataRegistry::new()));
    let value: ManagedRef = Arc::new(Boxed::primitive(42i32));

    c.bench_function("roundtrip/managed_native_managed", |b| {
        b.iter(|| {
            let native = runtime.native_for_object(&value).ok()?;
            black_box(runtime.object_for_reference(&native, None).ok())
        });
    });
}

criterion_group!(
    benches,
    bench_table_build,
    bench_table_find,
    bench_factories,
    bench_roundtrip,
);
criterion_main!(benches);
