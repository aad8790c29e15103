//! Entity, attribute and reference schema descriptors.
//!
//! The compiler never mutates schemas; they are resolved from the
//! [`IndexCatalog`](crate::IndexCatalog) and shared behind `Arc`.

use std::{collections::HashMap, fmt, sync::Arc};

use arrow_schema::DataType;

use crate::{FilterError, FilterResult};

/// Capability an attribute must declare to be usable by a predicate.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum AttributeTrait {
    Filterable,
    Unique,
    Sortable,
}

impl fmt::Display for AttributeTrait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeTrait::Filterable => write!(f, "filterable"),
            AttributeTrait::Unique => write!(f, "unique"),
            AttributeTrait::Sortable => write!(f, "sortable"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AttributeSchema {
    name: String,
    data_type: DataType,
    filterable: bool,
    unique: bool,
    sortable: bool,
    localized: bool,
}

impl AttributeSchema {
    /// A filterable, non-localized attribute of the given type.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            filterable: true,
            unique: false,
            sortable: false,
            localized: false,
        }
    }

    pub fn with_filterable(mut self, filterable: bool) -> Self {
        self.filterable = filterable;
        self
    }

    /// Unique attributes are always filterable through their unique index.
    pub fn with_unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    pub fn with_sortable(mut self, sortable: bool) -> Self {
        self.sortable = sortable;
        self
    }

    pub fn with_localized(mut self, localized: bool) -> Self {
        self.localized = localized;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub fn is_filterable(&self) -> bool {
        self.filterable || self.unique
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn is_sortable(&self) -> bool {
        self.sortable
    }

    pub fn is_localized(&self) -> bool {
        self.localized
    }

    pub fn has_trait(&self, required: AttributeTrait) -> bool {
        match required {
            AttributeTrait::Filterable => self.is_filterable(),
            AttributeTrait::Unique => self.is_unique(),
            AttributeTrait::Sortable => self.is_sortable(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceSchema {
    name: String,
    referenced_entity_type: String,
    indexed: bool,
    attributes: HashMap<String, AttributeSchema>,
}

impl ReferenceSchema {
    pub fn new(name: impl Into<String>, referenced_entity_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            referenced_entity_type: referenced_entity_type.into(),
            indexed: true,
            attributes: HashMap::new(),
        }
    }

    pub fn with_indexed(mut self, indexed: bool) -> Self {
        self.indexed = indexed;
        self
    }

    pub fn with_attribute(mut self, attribute: AttributeSchema) -> Self {
        self.attributes.insert(attribute.name.clone(), attribute);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn referenced_entity_type(&self) -> &str {
        &self.referenced_entity_type
    }

    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeSchema> {
        self.attributes.get(name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EntitySchema {
    name: String,
    attributes: HashMap<String, AttributeSchema>,
    references: HashMap<String, Arc<ReferenceSchema>>,
    with_hierarchy: bool,
    with_price: bool,
}

impl EntitySchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: HashMap::new(),
            references: HashMap::new(),
            with_hierarchy: false,
            with_price: false,
        }
    }

    pub fn with_attribute(mut self, attribute: AttributeSchema) -> Self {
        self.attributes.insert(attribute.name.clone(), attribute);
        self
    }

    pub fn with_reference(mut self, reference: ReferenceSchema) -> Self {
        self.references
            .insert(reference.name.clone(), Arc::new(reference));
        self
    }

    pub fn with_hierarchy(mut self, with_hierarchy: bool) -> Self {
        self.with_hierarchy = with_hierarchy;
        self
    }

    pub fn with_price(mut self, with_price: bool) -> Self {
        self.with_price = with_price;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeSchema> {
        self.attributes.get(name)
    }

    pub fn reference(&self, name: &str) -> Option<&Arc<ReferenceSchema>> {
        self.references.get(name)
    }

    /// Resolve a reference or fail with [`FilterError::ReferenceNotFound`].
    pub fn require_reference(&self, name: &str) -> FilterResult<Arc<ReferenceSchema>> {
        self.references
            .get(name)
            .cloned()
            .ok_or_else(|| FilterError::ReferenceNotFound {
                reference: name.to_string(),
                entity_type: self.name.clone(),
            })
    }

    pub fn is_with_hierarchy(&self) -> bool {
        self.with_hierarchy
    }

    pub fn is_with_price(&self) -> bool {
        self.with_price
    }
}

/// Resolves attribute definitions for the processing scope in effect.
///
/// At the top level attributes come from the entity schema; inside a
/// `ReferenceHaving` container they come from the reference schema instead.
#[derive(Clone, Debug)]
pub enum AttributeSchemaAccessor {
    Entity(Arc<EntitySchema>),
    Reference {
        entity: Arc<EntitySchema>,
        reference: Arc<ReferenceSchema>,
    },
}

impl AttributeSchemaAccessor {
    /// Look up `attribute` and verify it declares every `required` trait.
    pub fn attribute_schema(
        &self,
        attribute: &str,
        required: &[AttributeTrait],
    ) -> FilterResult<AttributeSchema> {
        let found = match self {
            AttributeSchemaAccessor::Entity(entity) => entity.attribute(attribute),
            AttributeSchemaAccessor::Reference { reference, .. } => reference.attribute(attribute),
        };
        let schema = found.ok_or_else(|| FilterError::AttributeNotFound {
            attribute: attribute.to_string(),
            schema: self.schema_path(),
        })?;
        if let Some(missing) = required.iter().find(|t| !schema.has_trait(**t)) {
            return Err(FilterError::MissingAttributeTrait {
                attribute: attribute.to_string(),
                required: *missing,
            });
        }
        Ok(schema.clone())
    }

    /// Derive an accessor that resolves attributes on the named reference.
    pub fn with_reference(&self, reference: &str) -> FilterResult<AttributeSchemaAccessor> {
        let entity = match self {
            AttributeSchemaAccessor::Entity(entity) => entity.clone(),
            AttributeSchemaAccessor::Reference { entity, .. } => entity.clone(),
        };
        let reference = entity.require_reference(reference)?;
        Ok(AttributeSchemaAccessor::Reference { entity, reference })
    }

    fn schema_path(&self) -> String {
        match self {
            AttributeSchemaAccessor::Entity(entity) => entity.name().to_string(),
            AttributeSchemaAccessor::Reference { entity, reference } => {
                format!("{}.{}", entity.name(), reference.name())
            }
        }
    }
}
