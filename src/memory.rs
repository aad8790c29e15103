//! In-memory implementation of the index contract.
//!
//! Records are kept whole and every lookup scans them. This is meant for
//! tests, benchmarks and small embedded catalogs, not for large data sets.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
};

use roaring::RoaringBitmap;

use crate::{
    formula::Formula,
    index::{
        AttributeQuery, EntityRecord, HierarchyQuery, IndexCatalog, IndexKey, IndexLookup,
        PriceQuery, RecordSetIndex, Scope,
    },
    schema::EntitySchema,
    value::{AttributeValue, Locale},
};

type AttributeValues = HashMap<(String, Option<Locale>), Vec<AttributeValue>>;

#[derive(Clone, Debug, PartialEq)]
pub struct MemoryPrice {
    pub price_list: String,
    pub currency: String,
    pub amount: i64,
    /// Inclusive validity bounds in microseconds, open when `None`.
    pub valid_from: Option<i64>,
    pub valid_to: Option<i64>,
}

impl MemoryPrice {
    pub fn new(price_list: impl Into<String>, currency: impl Into<String>, amount: i64) -> Self {
        Self {
            price_list: price_list.into(),
            currency: currency.into(),
            amount,
            valid_from: None,
            valid_to: None,
        }
    }

    pub fn valid_between(mut self, from: Option<i64>, to: Option<i64>) -> Self {
        self.valid_from = from;
        self.valid_to = to;
        self
    }

    fn matches(&self, query: &PriceQuery) -> bool {
        query.price_list.as_ref().is_none_or(|list| *list == self.price_list)
            && query.currency.as_ref().is_none_or(|c| *c == self.currency)
            && query.amount_from.is_none_or(|from| self.amount >= from)
            && query.amount_to.is_none_or(|to| self.amount <= to)
    }

    fn is_valid_at(&self, moment: i64) -> bool {
        self.valid_from.is_none_or(|from| moment >= from)
            && self.valid_to.is_none_or(|to| moment <= to)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
struct MemoryReference {
    name: String,
    referenced_id: u32,
    attributes: AttributeValues,
}

/// A stored entity with its attributes, locales, prices, hierarchy placement
/// and references.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MemoryRecord {
    primary_key: u32,
    attributes: AttributeValues,
    locales: BTreeSet<Locale>,
    prices: Vec<MemoryPrice>,
    parent: Option<u32>,
    references: Vec<MemoryReference>,
}

impl MemoryRecord {
    pub fn new(primary_key: u32) -> Self {
        Self {
            primary_key,
            ..Self::default()
        }
    }

    /// Add a value; calling twice with the same name makes the attribute multi-valued.
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes
            .entry((name.into(), None))
            .or_default()
            .push(value.into());
        self
    }

    /// Add a localized value; the record becomes available in `locale`.
    pub fn localized(
        mut self,
        name: impl Into<String>,
        locale: impl Into<Locale>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        let locale = locale.into();
        self.locales.insert(locale.clone());
        self.attributes
            .entry((name.into(), Some(locale)))
            .or_default()
            .push(value.into());
        self
    }

    pub fn locale(mut self, locale: impl Into<Locale>) -> Self {
        self.locales.insert(locale.into());
        self
    }

    pub fn price(mut self, price: MemoryPrice) -> Self {
        self.prices.push(price);
        self
    }

    pub fn parent(mut self, parent: u32) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn reference(mut self, name: impl Into<String>, referenced_id: u32) -> Self {
        self.references.push(MemoryReference {
            name: name.into(),
            referenced_id,
            attributes: HashMap::new(),
        });
        self
    }

    /// Add an attribute to the most recently added reference.
    pub fn reference_attribute(
        mut self,
        name: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        if let Some(reference) = self.references.last_mut() {
            reference
                .attributes
                .entry((name.into(), None))
                .or_default()
                .push(value.into());
        }
        self
    }

    fn has_attribute(&self, name: &str) -> bool {
        self.attributes.keys().any(|(attribute, _)| attribute == name)
    }
}

fn lookup<'r>(
    attributes: &'r AttributeValues,
    attribute: &str,
    locale: Option<&Locale>,
) -> Option<&'r Vec<AttributeValue>> {
    locale
        .and_then(|locale| attributes.get(&(attribute.to_string(), Some(locale.clone()))))
        .or_else(|| attributes.get(&(attribute.to_string(), None)))
}

impl EntityRecord for MemoryRecord {
    fn primary_key(&self) -> u32 {
        self.primary_key
    }

    fn attribute_values(&self, attribute: &str, locale: Option<&Locale>) -> Vec<&AttributeValue> {
        lookup(&self.attributes, attribute, locale)
            .map(|values| values.iter().collect())
            .unwrap_or_default()
    }

    fn reference_attribute_values(
        &self,
        reference: &str,
        attribute: &str,
        locale: Option<&Locale>,
    ) -> Vec<&AttributeValue> {
        self.references
            .iter()
            .filter(|r| r.name == reference)
            .filter_map(|r| lookup(&r.attributes, attribute, locale))
            .flatten()
            .collect()
    }
}

#[derive(Debug)]
pub struct InMemoryIndex {
    key: IndexKey,
    version: u64,
    records: BTreeMap<u32, MemoryRecord>,
    children: HashMap<Option<u32>, Vec<u32>>,
    owners: HashMap<u32, RoaringBitmap>,
    all: Formula,
}

impl InMemoryIndex {
    pub fn builder(key: IndexKey) -> InMemoryIndexBuilder {
        InMemoryIndexBuilder {
            key,
            version: 1,
            records: BTreeMap::new(),
            owners: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn select(&self, predicate: impl Fn(&MemoryRecord) -> bool) -> RoaringBitmap {
        self.records
            .values()
            .filter(|record| predicate(record))
            .map(|record| record.primary_key)
            .collect()
    }

    fn subtree(&self, root: Option<u32>, direct: bool, into: &mut RoaringBitmap) {
        let mut pending = vec![root];
        while let Some(node) = pending.pop() {
            for child in self.children.get(&node).into_iter().flatten() {
                into.insert(*child);
                if !direct {
                    pending.push(Some(*child));
                }
            }
        }
    }
}

impl RecordSetIndex for InMemoryIndex {
    fn key(&self) -> &IndexKey {
        &self.key
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn all_records(&self) -> Formula {
        self.all.clone()
    }

    fn attribute(&self, query: &AttributeQuery) -> IndexLookup {
        if !self
            .records
            .values()
            .any(|record| record.has_attribute(&query.attribute))
        {
            return IndexLookup::Unavailable;
        }
        IndexLookup::Bitmap(self.select(|record| {
            let values = record.attribute_values(&query.attribute, query.locale.as_ref());
            query.op.matches(&values)
        }))
    }

    fn locale_records(&self, locale: &Locale) -> IndexLookup {
        IndexLookup::Bitmap(self.select(|record| record.locales.contains(locale)))
    }

    fn price(&self, query: &PriceQuery) -> IndexLookup {
        IndexLookup::Bitmap(self.select(|record| record.prices.iter().any(|p| p.matches(query))))
    }

    fn price_valid_at(&self, query: &PriceQuery, moment: i64) -> RoaringBitmap {
        self.select(|record| {
            record
                .prices
                .iter()
                .any(|p| p.matches(query) && p.is_valid_at(moment))
        })
    }

    fn hierarchy(&self, query: &HierarchyQuery) -> IndexLookup {
        let mut within = RoaringBitmap::new();
        if let Some(parent) = query.parent {
            if !self.records.contains_key(&parent) {
                return IndexLookup::Bitmap(within);
            }
            within.insert(parent);
        }
        self.subtree(query.parent, query.direct, &mut within);
        for excluded in &query.excluding {
            let mut removed = RoaringBitmap::new();
            removed.insert(*excluded);
            self.subtree(Some(*excluded), false, &mut removed);
            within -= removed;
        }
        IndexLookup::Bitmap(within)
    }

    fn owning_records(&self, referenced_id: u32) -> Option<&RoaringBitmap> {
        self.owners.get(&referenced_id)
    }
}

pub struct InMemoryIndexBuilder {
    key: IndexKey,
    version: u64,
    records: BTreeMap<u32, MemoryRecord>,
    owners: HashMap<u32, RoaringBitmap>,
}

impl InMemoryIndexBuilder {
    pub fn version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Add the record with `primary_key`, or extend it when already present.
    pub fn record(
        mut self,
        primary_key: u32,
        build: impl FnOnce(MemoryRecord) -> MemoryRecord,
    ) -> Self {
        let existing = self
            .records
            .remove(&primary_key)
            .unwrap_or_else(|| MemoryRecord::new(primary_key));
        self.records.insert(primary_key, build(existing));
        self
    }

    /// Declare that `owning_id` references `referenced_id`.
    pub fn owner(mut self, referenced_id: u32, owning_id: u32) -> Self {
        self.owners.entry(referenced_id).or_default().insert(owning_id);
        self
    }

    pub fn build(self) -> InMemoryIndex {
        let mut children: HashMap<Option<u32>, Vec<u32>> = HashMap::new();
        for record in self.records.values() {
            children.entry(record.parent).or_default().push(record.primary_key);
        }
        let all = Formula::constant(self.records.keys().copied().collect());
        InMemoryIndex {
            key: self.key,
            version: self.version,
            records: self.records,
            children,
            owners: self.owners,
            all,
        }
    }
}

/// Catalog of schemas and in-memory indexes.
#[derive(Default)]
pub struct InMemoryCatalog {
    schemas: HashMap<String, Arc<EntitySchema>>,
    indexes: HashMap<IndexKey, Arc<dyn RecordSetIndex>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(mut self, schema: EntitySchema) -> Self {
        self.schemas.insert(schema.name().to_string(), Arc::new(schema));
        self
    }

    pub fn with_index(mut self, index: InMemoryIndex) -> Self {
        self.indexes.insert(index.key.clone(), Arc::new(index));
        self
    }

    /// Index `records` of `entity_type` in `scope`, together with the indexes
    /// of every reference found on the records.
    ///
    /// Each reference name gets one index of its referenced identifiers and,
    /// per referenced identifier, one reduced index of the owning records
    /// carrying the attributes of their own reference.
    pub fn with_records(
        mut self,
        entity_type: &str,
        scope: Scope,
        records: impl IntoIterator<Item = MemoryRecord>,
    ) -> Self {
        let mut entity = InMemoryIndex::builder(IndexKey::entity(entity_type, scope));
        let mut referenced: BTreeMap<String, InMemoryIndexBuilder> = BTreeMap::new();
        let mut reduced: BTreeMap<(String, u32), InMemoryIndexBuilder> = BTreeMap::new();
        for record in records {
            for reference in &record.references {
                let builder = referenced.remove(&reference.name).unwrap_or_else(|| {
                    InMemoryIndex::builder(IndexKey::referenced(
                        entity_type,
                        reference.name.as_str(),
                        scope,
                    ))
                });
                let builder = builder
                    .record(reference.referenced_id, |target| target)
                    .owner(reference.referenced_id, record.primary_key);
                referenced.insert(reference.name.clone(), builder);

                let pair = (reference.name.clone(), reference.referenced_id);
                let owners = reduced.remove(&pair).unwrap_or_else(|| {
                    InMemoryIndex::builder(IndexKey::reduced(
                        entity_type,
                        reference.name.as_str(),
                        reference.referenced_id,
                        scope,
                    ))
                });
                let attributes = reference.attributes.clone();
                let locales = record.locales.clone();
                let owners = owners.record(record.primary_key, |mut owner| {
                    for (key, values) in attributes {
                        owner.attributes.entry(key).or_default().extend(values);
                    }
                    owner.locales.extend(locales);
                    owner
                });
                reduced.insert(pair, owners);
            }
            entity = entity.record(record.primary_key, |_| record);
        }
        self = self.with_index(entity.build());
        for builder in referenced.into_values().chain(reduced.into_values()) {
            self = self.with_index(builder.build());
        }
        self
    }
}

impl IndexCatalog for InMemoryCatalog {
    fn entity_schema(&self, entity_type: &str) -> Option<Arc<EntitySchema>> {
        self.schemas.get(entity_type).cloned()
    }

    fn index(&self, key: &IndexKey) -> Option<Arc<dyn RecordSetIndex>> {
        self.indexes.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::{AttributeOp, Nullness};

    fn ids(lookup: IndexLookup) -> Vec<u32> {
        lookup.into_formula().compute().iter().collect()
    }

    fn tree() -> InMemoryIndex {
        // 1 -> {2 -> {4}, 3}, 5
        InMemoryIndex::builder(IndexKey::entity("category", Scope::Live))
            .record(1, |r| r)
            .record(2, |r| r.parent(1))
            .record(3, |r| r.parent(1))
            .record(4, |r| r.parent(2))
            .record(5, |r| r)
            .build()
    }

    #[test]
    fn hierarchy_lookups() {
        let index = tree();
        let query = |parent, direct, excluding: Vec<u32>| HierarchyQuery {
            parent,
            direct,
            excluding,
        };
        assert_eq!(ids(index.hierarchy(&query(Some(1), false, vec![]))), vec![1, 2, 3, 4]);
        assert_eq!(ids(index.hierarchy(&query(Some(1), true, vec![]))), vec![1, 2, 3]);
        assert_eq!(ids(index.hierarchy(&query(Some(1), false, vec![2]))), vec![1, 3]);
        assert_eq!(ids(index.hierarchy(&query(None, true, vec![]))), vec![1, 5]);
        assert_eq!(ids(index.hierarchy(&query(Some(9), false, vec![]))), Vec::<u32>::new());
    }

    #[test]
    fn attribute_lookup_and_unavailable() {
        let index = InMemoryIndex::builder(IndexKey::entity("product", Scope::Live))
            .record(1, |r| r.attribute("color", "red"))
            .record(2, |r| r.attribute("color", "blue").attribute("color", "red"))
            .record(3, |r| r)
            .build();
        let query = |op| AttributeQuery {
            attribute: "color".to_string(),
            locale: None,
            op,
            unique: false,
        };
        assert_eq!(ids(index.attribute(&query(AttributeOp::Equals("red".into())))), vec![1, 2]);
        assert_eq!(
            ids(index.attribute(&query(AttributeOp::Is(Nullness::NotNull)))),
            vec![1, 2]
        );
        let missing = AttributeQuery {
            attribute: "weight".to_string(),
            locale: None,
            op: AttributeOp::Equals(1i64.into()),
            unique: false,
        };
        assert!(matches!(index.attribute(&missing), IndexLookup::Unavailable));
    }

    #[test]
    fn localized_values_fall_back_to_global() {
        let record = MemoryRecord::new(1)
            .attribute("code", "X1")
            .localized("name", "en", "Shoe")
            .localized("name", "cs", "Bota");
        let cs = Locale::from("cs");
        assert_eq!(record.attribute_values("name", Some(&cs)), vec![&AttributeValue::from("Bota")]);
        assert_eq!(record.attribute_values("code", Some(&cs)), vec![&AttributeValue::from("X1")]);
        assert!(record.attribute_values("name", None).is_empty());
    }

    #[test]
    fn prices_and_validity() {
        let index = InMemoryIndex::builder(IndexKey::entity("product", Scope::Live))
            .record(1, |r| r.price(MemoryPrice::new("basic", "EUR", 100)))
            .record(2, |r| {
                r.price(MemoryPrice::new("vip", "EUR", 80).valid_between(Some(10), Some(20)))
            })
            .build();
        let vip = PriceQuery {
            price_list: Some("vip".to_string()),
            ..PriceQuery::default()
        };
        assert_eq!(ids(index.price(&vip)), vec![2]);
        assert_eq!(index.price_valid_at(&vip, 15).len(), 1);
        assert!(index.price_valid_at(&vip, 25).is_empty());
        let cheap = PriceQuery {
            amount_to: Some(90),
            ..PriceQuery::default()
        };
        assert_eq!(ids(index.price(&cheap)), vec![2]);
    }

    #[test]
    fn catalog_builds_reference_indexes() {
        let catalog = InMemoryCatalog::new().with_records(
            "product",
            Scope::Live,
            vec![
                MemoryRecord::new(1).reference("brand", 10).reference_attribute("order", 1),
                MemoryRecord::new(2).reference("brand", 10),
                MemoryRecord::new(3).reference("brand", 11),
            ],
        );
        let brands = catalog
            .index(&IndexKey::referenced("product", "brand", Scope::Live))
            .unwrap();
        assert_eq!(brands.all_records().compute().iter().collect::<Vec<_>>(), vec![10, 11]);
        assert_eq!(
            brands.owning_records(10).unwrap().iter().collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert!(catalog.index(&IndexKey::entity("product", Scope::Archived)).is_none());

        let owners_of_10 = catalog
            .index(&IndexKey::reduced("product", "brand", 10, Scope::Live))
            .unwrap();
        assert_eq!(owners_of_10.all_records().compute().iter().collect::<Vec<_>>(), vec![1, 2]);
        let order_one = AttributeQuery {
            attribute: "order".to_string(),
            locale: None,
            op: AttributeOp::Equals(1i64.into()),
            unique: false,
        };
        assert_eq!(ids(owners_of_10.attribute(&order_one)), vec![1]);
    }
}
