#![allow(dead_code)]

use arrow_schema::DataType;
use sift::{
    AttributeSchema, CompileOptions, CompiledFilter, EntitySchema, FilterPlanner, FilterResult,
    InMemoryCatalog, MemoryPrice, MemoryRecord, Predicate, ReferenceSchema, Scope,
};

// ============================================================================
// Catalog Fixture
// ============================================================================
//
// product (live)
//   1  code=P1 color=red   size=1  name[en]=Shoe name[cs]=Bota  brand=10(order 1)
//      prices basic/EUR 100, vip/EUR 80 valid 10..=20
//   2  code=P2 color=blue  size=2  name[en]=Hat                 brand=11(order 2)
//      prices basic/EUR 50
//   3  code=P3 color=red   size=3                               brand=10(order 3)
//      prices basic/CZK 2000
//   4  code=P4 color=green         name[en]=Sock
// product (archived)
//   5  code=P5 color=red   size=5                               brand=11(order 1)
// brand (live)
//   10 country=CZ, 11 country=DE
// brand (archived)
//   11 country=DE
// category (live): 1 -> {2 -> {4}, 3}, 5

pub fn product_schema() -> EntitySchema {
    EntitySchema::new("product")
        .with_attribute(AttributeSchema::new("code", DataType::Utf8).with_unique(true))
        .with_attribute(AttributeSchema::new("color", DataType::Utf8))
        .with_attribute(AttributeSchema::new("size", DataType::Int64))
        .with_attribute(AttributeSchema::new("name", DataType::Utf8).with_localized(true))
        .with_attribute(AttributeSchema::new("note", DataType::Utf8).with_filterable(false))
        .with_reference(
            ReferenceSchema::new("brand", "brand")
                .with_attribute(AttributeSchema::new("order", DataType::Int64)),
        )
        .with_reference(ReferenceSchema::new("tag", "tag").with_indexed(false))
        .with_price(true)
}

pub fn catalog() -> InMemoryCatalog {
    InMemoryCatalog::new()
        .with_schema(product_schema())
        .with_schema(
            EntitySchema::new("brand")
                .with_attribute(AttributeSchema::new("country", DataType::Utf8)),
        )
        .with_schema(EntitySchema::new("category").with_hierarchy(true))
        .with_records(
            "product",
            Scope::Live,
            vec![
                MemoryRecord::new(1)
                    .attribute("code", "P1")
                    .attribute("color", "red")
                    .attribute("size", 1)
                    .localized("name", "en", "Shoe")
                    .localized("name", "cs", "Bota")
                    .reference("brand", 10)
                    .reference_attribute("order", 1)
                    .price(MemoryPrice::new("basic", "EUR", 100))
                    .price(MemoryPrice::new("vip", "EUR", 80).valid_between(Some(10), Some(20))),
                MemoryRecord::new(2)
                    .attribute("code", "P2")
                    .attribute("color", "blue")
                    .attribute("size", 2)
                    .localized("name", "en", "Hat")
                    .reference("brand", 11)
                    .reference_attribute("order", 2)
                    .price(MemoryPrice::new("basic", "EUR", 50)),
                MemoryRecord::new(3)
                    .attribute("code", "P3")
                    .attribute("color", "red")
                    .attribute("size", 3)
                    .reference("brand", 10)
                    .reference_attribute("order", 3)
                    .price(MemoryPrice::new("basic", "CZK", 2000)),
                MemoryRecord::new(4)
                    .attribute("code", "P4")
                    .attribute("color", "green")
                    .localized("name", "en", "Sock"),
            ],
        )
        .with_records(
            "product",
            Scope::Archived,
            vec![
                MemoryRecord::new(5)
                    .attribute("code", "P5")
                    .attribute("color", "red")
                    .attribute("size", 5)
                    .reference("brand", 11)
                    .reference_attribute("order", 1),
            ],
        )
        .with_records(
            "brand",
            Scope::Live,
            vec![
                MemoryRecord::new(10).attribute("country", "CZ"),
                MemoryRecord::new(11).attribute("country", "DE"),
            ],
        )
        .with_records(
            "brand",
            Scope::Archived,
            vec![MemoryRecord::new(11).attribute("country", "DE")],
        )
        .with_records(
            "category",
            Scope::Live,
            vec![
                MemoryRecord::new(1),
                MemoryRecord::new(2).parent(1),
                MemoryRecord::new(3).parent(1),
                MemoryRecord::new(4).parent(2),
                MemoryRecord::new(5),
            ],
        )
}

// ============================================================================
// Helper Functions
// ============================================================================

pub fn plan(catalog: &InMemoryCatalog, filter: &Predicate) -> FilterResult<CompiledFilter> {
    plan_with(catalog, filter, CompileOptions::default())
}

pub fn plan_with(
    catalog: &InMemoryCatalog,
    filter: &Predicate,
    options: CompileOptions,
) -> FilterResult<CompiledFilter> {
    FilterPlanner::try_new(catalog, "product")?
        .with_options(options)
        .plan_default(filter)
}

pub fn matching(catalog: &InMemoryCatalog, filter: &Predicate) -> Vec<u32> {
    plan(catalog, filter).unwrap().compute().iter().collect()
}
