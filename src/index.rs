//! Contract between the compiler and the record-set indexes it consults.
//!
//! Indexes are external collaborators: the compiler only asks them for the
//! identifiers satisfying a condition and never walks their internals. Every
//! index handed to a compilation must belong to one consistent snapshot.

use std::{fmt, sync::Arc};

use roaring::RoaringBitmap;
use xxhash_rust::xxh3::Xxh3;

use crate::{
    formula::Formula,
    predicate::AttributeOp,
    schema::EntitySchema,
    value::{AttributeValue, Locale},
};

/// Lifecycle scope a record lives in.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum Scope {
    Live,
    Archived,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Live => write!(f, "live"),
            Scope::Archived => write!(f, "archived"),
        }
    }
}

/// Marker of what the record identifiers of an index denote.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum IndexKind {
    /// Identifiers are primary keys of the indexed entity type.
    Entity,
    /// Identifiers are primary keys of the entities a reference points to.
    ReferencedEntityType,
    /// Identifiers are primary keys of the records referencing one target
    /// entity; attributes are those of each (owner, target) reference.
    ReferencedEntity,
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct IndexKey {
    pub entity_type: String,
    pub kind: IndexKind,
    pub scope: Scope,
    /// Reference name for referenced-entity indexes.
    pub reference: Option<String>,
    /// Target primary key for [`IndexKind::ReferencedEntity`] indexes.
    pub referenced_id: Option<u32>,
}

impl IndexKey {
    pub fn entity(entity_type: impl Into<String>, scope: Scope) -> Self {
        Self {
            entity_type: entity_type.into(),
            kind: IndexKind::Entity,
            scope,
            reference: None,
            referenced_id: None,
        }
    }

    pub fn referenced(
        entity_type: impl Into<String>,
        reference: impl Into<String>,
        scope: Scope,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            kind: IndexKind::ReferencedEntityType,
            scope,
            reference: Some(reference.into()),
            referenced_id: None,
        }
    }

    /// Index of the records referencing `referenced_id` through `reference`.
    pub fn reduced(
        entity_type: impl Into<String>,
        reference: impl Into<String>,
        referenced_id: u32,
        scope: Scope,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            kind: IndexKind::ReferencedEntity,
            scope,
            reference: Some(reference.into()),
            referenced_id: Some(referenced_id),
        }
    }

    pub(crate) fn hash_into(&self, hasher: &mut Xxh3) {
        hasher.update(self.entity_type.as_bytes());
        hasher.update(&[self.kind as u8, self.scope as u8]);
        if let Some(reference) = &self.reference {
            hasher.update(reference.as_bytes());
        }
        if let Some(referenced_id) = self.referenced_id {
            hasher.update(&referenced_id.to_le_bytes());
        }
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.reference, self.referenced_id) {
            (Some(reference), Some(id)) => {
                write!(f, "{}.{}[{}]@{}", self.entity_type, reference, id, self.scope)
            }
            (Some(reference), None) => {
                write!(f, "{}.{}@{}", self.entity_type, reference, self.scope)
            }
            _ => write!(f, "{}@{}", self.entity_type, self.scope),
        }
    }
}

/// Answer of an index to a lookup.
#[derive(Clone, Debug)]
pub enum IndexLookup {
    /// A ready-made formula leaf, typically shared by the index across queries.
    Formula(Formula),
    Bitmap(RoaringBitmap),
    /// The index holds no data structure able to answer the lookup.
    Unavailable,
}

impl IndexLookup {
    /// Convert to a formula; unavailable lookups contribute nothing.
    pub fn into_formula(self) -> Formula {
        match self {
            IndexLookup::Formula(formula) => formula,
            IndexLookup::Bitmap(bitmap) => Formula::constant(bitmap),
            IndexLookup::Unavailable => Formula::empty(),
        }
    }
}

/// Attribute lookup resolved against the schema in scope.
#[derive(Clone, Debug, PartialEq)]
pub struct AttributeQuery {
    pub attribute: String,
    /// Set only for localized attributes.
    pub locale: Option<Locale>,
    pub op: AttributeOp,
    /// Answer from the unique index instead of the filter index.
    pub unique: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct PriceQuery {
    pub price_list: Option<String>,
    pub currency: Option<String>,
    /// Inclusive amount bounds in minor currency units.
    pub amount_from: Option<i64>,
    pub amount_to: Option<i64>,
}

impl PriceQuery {
    pub(crate) fn hash_into(&self, hasher: &mut Xxh3) {
        for part in [&self.price_list, &self.currency] {
            match part {
                Some(s) => {
                    hasher.update(&[1]);
                    hasher.update(s.as_bytes());
                }
                None => hasher.update(&[0]),
            }
        }
        for bound in [self.amount_from, self.amount_to] {
            hasher.update(&bound.unwrap_or(i64::MIN).to_le_bytes());
        }
    }
}

impl fmt::Display for PriceQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}",
            self.price_list.as_deref().unwrap_or("*"),
            self.currency.as_deref().unwrap_or("*")
        )?;
        if self.amount_from.is_some() || self.amount_to.is_some() {
            write!(f, " [{:?}..{:?}]", self.amount_from, self.amount_to)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct HierarchyQuery {
    /// `None` starts at the virtual root.
    pub parent: Option<u32>,
    /// Only immediate children of the parent.
    pub direct: bool,
    /// Subtrees removed from the result, including their roots.
    pub excluding: Vec<u32>,
}

/// A record-set index of one entity type (or one reference of it) in one scope.
pub trait RecordSetIndex: Send + Sync + fmt::Debug {
    fn key(&self) -> &IndexKey;

    /// Snapshot version; formulas built against different versions are never equal.
    fn version(&self) -> u64;

    /// Every identifier known to the index.
    fn all_records(&self) -> Formula;

    fn attribute(&self, query: &AttributeQuery) -> IndexLookup;

    fn locale_records(&self, locale: &Locale) -> IndexLookup;

    fn price(&self, query: &PriceQuery) -> IndexLookup;

    /// Records with a price matching `query` valid at `moment`.
    ///
    /// Called lazily when the formula is computed.
    fn price_valid_at(&self, query: &PriceQuery, moment: i64) -> RoaringBitmap;

    fn hierarchy(&self, query: &HierarchyQuery) -> IndexLookup;

    /// Records of the owning entity type holding a reference to `referenced_id`.
    ///
    /// Only meaningful for [`IndexKind::ReferencedEntityType`] indexes.
    fn owning_records(&self, referenced_id: u32) -> Option<&RoaringBitmap>;
}

/// Source of schemas and indexes for one snapshot.
pub trait IndexCatalog: Send + Sync {
    fn entity_schema(&self, entity_type: &str) -> Option<Arc<EntitySchema>>;

    fn index(&self, key: &IndexKey) -> Option<Arc<dyn RecordSetIndex>>;
}

/// A materialized record whose attributes can be read directly.
pub trait EntityRecord: Send + Sync + fmt::Debug {
    fn primary_key(&self) -> u32;

    fn attribute_values(&self, attribute: &str, locale: Option<&Locale>) -> Vec<&AttributeValue>;

    /// Values of a reference attribute across every reference of the given name.
    fn reference_attribute_values(
        &self,
        reference: &str,
        attribute: &str,
        locale: Option<&Locale>,
    ) -> Vec<&AttributeValue>;
}

/// Reads attribute values off a record for the processing scope in effect.
pub trait AttributeValueAccessor: Send + Sync + fmt::Debug {
    fn values<'r>(
        &self,
        record: &'r dyn EntityRecord,
        attribute: &str,
        locale: Option<&Locale>,
    ) -> Vec<&'r AttributeValue>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct EntityAttributeValues;

impl AttributeValueAccessor for EntityAttributeValues {
    fn values<'r>(
        &self,
        record: &'r dyn EntityRecord,
        attribute: &str,
        locale: Option<&Locale>,
    ) -> Vec<&'r AttributeValue> {
        record.attribute_values(attribute, locale)
    }
}

#[derive(Clone, Debug)]
pub struct ReferenceAttributeValues {
    pub reference: String,
}

impl AttributeValueAccessor for ReferenceAttributeValues {
    fn values<'r>(
        &self,
        record: &'r dyn EntityRecord,
        attribute: &str,
        locale: Option<&Locale>,
    ) -> Vec<&'r AttributeValue> {
        record.reference_attribute_values(&self.reference, attribute, locale)
    }
}

/// Records fetched ahead of filtering, shared by every formula that uses them.
pub type PrefetchedRecords = Arc<Vec<Arc<dyn EntityRecord>>>;
