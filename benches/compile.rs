use arrow_schema::DataType;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rand::{Rng, SeedableRng, rngs::StdRng};
use sift::{
    AttributeSchema, CompileOptions, EntitySchema, FilterPlanner, InMemoryCatalog, MemoryRecord,
    Predicate, ReferenceSchema, Scope,
};

const COLORS: [&str; 5] = ["red", "green", "blue", "black", "white"];

// ============================================================================
// Helper Functions
// ============================================================================

fn create_catalog(records: u32) -> InMemoryCatalog {
    let mut rng = StdRng::seed_from_u64(42);
    let products = (0..records).map(|pk| {
        MemoryRecord::new(pk)
            .attribute("color", COLORS[rng.gen_range(0..COLORS.len())])
            .attribute("size", rng.gen_range(0i64..50))
            .reference("brand", rng.gen_range(0..32))
            .reference_attribute("order", rng.gen_range(0i64..10))
    });
    let products: Vec<MemoryRecord> = products.collect();

    InMemoryCatalog::new()
        .with_schema(
            EntitySchema::new("product")
                .with_attribute(AttributeSchema::new("color", DataType::Utf8))
                .with_attribute(AttributeSchema::new("size", DataType::Int64))
                .with_reference(
                    ReferenceSchema::new("brand", "brand")
                        .with_attribute(AttributeSchema::new("order", DataType::Int64)),
                ),
        )
        .with_records("product", Scope::Live, products)
}

/// A filter repeating the same constraints in several branches.
fn create_filter() -> Predicate {
    let red = || Predicate::attribute_equals("color", "red");
    let small = || Predicate::attribute_less_than("size", 10i64);
    Predicate::filter_by(vec![
        Predicate::or(vec![
            Predicate::and(vec![red(), small()]),
            Predicate::and(vec![red(), Predicate::attribute_greater_than("size", 40i64)]),
            Predicate::and(vec![Predicate::attribute_equals("color", "blue"), small()]),
        ]),
        Predicate::not(Predicate::attribute_equals("color", "white")),
        Predicate::reference_having(
            "brand",
            vec![Predicate::attribute_less_than("order", 5i64)],
        ),
    ])
}

// ============================================================================
// Benchmarks: Compilation
// ============================================================================

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    let filter = create_filter();

    for records in [1_000u32, 10_000, 100_000] {
        let catalog = create_catalog(records);
        let planner = FilterPlanner::try_new(&catalog, "product").unwrap();

        group.throughput(Throughput::Elements(records as u64));
        group.bench_with_input(BenchmarkId::new("plan", records), &records, |b, _| {
            b.iter(|| planner.plan_default(black_box(&filter)).unwrap());
        });
        group.bench_with_input(
            BenchmarkId::new("plan_and_compute", records),
            &records,
            |b, _| {
                b.iter(|| {
                    let compiled = planner.plan_default(black_box(&filter)).unwrap();
                    compiled.compute().len()
                });
            },
        );
    }

    group.finish();
}

// ============================================================================
// Benchmarks: Deduplication
// ============================================================================

fn bench_deduplication(c: &mut Criterion) {
    let mut group = c.benchmark_group("deduplication");
    let filter = create_filter();
    let catalog = create_catalog(10_000);

    for deduplicate in [false, true] {
        let planner = FilterPlanner::try_new(&catalog, "product")
            .unwrap()
            .with_options(CompileOptions::builder().deduplicate(deduplicate).build());
        group.bench_with_input(
            BenchmarkId::from_parameter(deduplicate),
            &deduplicate,
            |b, _| {
                b.iter(|| {
                    let compiled = planner.plan_default(black_box(&filter)).unwrap();
                    compiled.compute().len()
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_compile, bench_deduplication);
criterion_main!(benches);
