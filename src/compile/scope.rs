use std::{collections::HashSet, sync::Arc};

use tracing::trace;

use crate::{
    formula::Formula,
    index::{AttributeValueAccessor, EntityAttributeValues, IndexKind, RecordSetIndex, Scope},
    predicate::{Predicate, PredicateKind},
    schema::{AttributeSchemaAccessor, EntitySchema, ReferenceSchema},
    value::Locale,
};

/// Context of one part of a compilation: which indexes answer lookups, which
/// schema resolves attributes and which predicate kinds are ignored.
///
/// The compiler keeps a stack of scopes. The root scope covers the whole
/// filter; nested scopes are pushed for sub-compilations against another
/// index set and popped when they finish. Every scope tracks its own chain
/// of parent predicates.
#[derive(Debug)]
pub struct ProcessingScope<'q> {
    index_kind: IndexKind,
    indexes: Vec<Arc<dyn RecordSetIndex>>,
    required_scopes: Vec<Vec<Scope>>,
    suppressed: HashSet<PredicateKind>,
    entity_schema: Arc<EntitySchema>,
    reference_schema: Option<Arc<ReferenceSchema>>,
    attribute_schemas: AttributeSchemaAccessor,
    attribute_values: Arc<dyn AttributeValueAccessor>,
    pub(crate) parent_chain: Vec<&'q Predicate>,
    conjunctive_block: Vec<&'q Predicate>,
    locale: Option<Locale>,
    in_view: bool,
}

impl<'q> ProcessingScope<'q> {
    /// Scope over `indexes` of `entity_schema`, resolving attributes on the entity.
    pub fn new(
        entity_schema: Arc<EntitySchema>,
        index_kind: IndexKind,
        indexes: Vec<Arc<dyn RecordSetIndex>>,
        required_scopes: Vec<Scope>,
    ) -> Self {
        Self {
            index_kind,
            indexes,
            required_scopes: vec![required_scopes],
            suppressed: HashSet::new(),
            attribute_schemas: AttributeSchemaAccessor::Entity(entity_schema.clone()),
            entity_schema,
            reference_schema: None,
            attribute_values: Arc::new(EntityAttributeValues),
            parent_chain: Vec::new(),
            conjunctive_block: Vec::new(),
            locale: None,
            in_view: false,
        }
    }

    /// Resolve attributes on `reference` instead of the entity.
    pub fn with_reference(
        mut self,
        reference: Arc<ReferenceSchema>,
        attribute_schemas: AttributeSchemaAccessor,
        attribute_values: Arc<dyn AttributeValueAccessor>,
    ) -> Self {
        self.reference_schema = Some(reference);
        self.attribute_schemas = attribute_schemas;
        self.attribute_values = attribute_values;
        self
    }

    pub fn with_suppressed(mut self, kinds: impl IntoIterator<Item = PredicateKind>) -> Self {
        self.suppressed.extend(kinds);
        self
    }

    pub fn with_locale(mut self, locale: Option<Locale>) -> Self {
        self.locale = locale;
        self
    }

    pub(crate) fn with_view(mut self, in_view: bool) -> Self {
        self.in_view = in_view;
        self
    }

    /// Predicates translated directly in this scope, treated as one conjunctive block.
    pub(crate) fn with_conjunctive_block(mut self, block: Vec<&'q Predicate>) -> Self {
        self.conjunctive_block = block;
        self
    }

    pub fn index_kind(&self) -> IndexKind {
        self.index_kind
    }

    pub fn indexes(&self) -> &[Arc<dyn RecordSetIndex>] {
        &self.indexes
    }

    pub fn entity_schema(&self) -> &Arc<EntitySchema> {
        &self.entity_schema
    }

    pub fn reference_schema(&self) -> Option<&Arc<ReferenceSchema>> {
        self.reference_schema.as_ref()
    }

    pub fn attribute_schemas(&self) -> &AttributeSchemaAccessor {
        &self.attribute_schemas
    }

    pub fn attribute_values(&self) -> &Arc<dyn AttributeValueAccessor> {
        &self.attribute_values
    }

    pub fn locale(&self) -> Option<&Locale> {
        self.locale.as_ref()
    }

    pub fn is_in_view(&self) -> bool {
        self.in_view
    }

    pub fn is_suppressed(&self, kind: PredicateKind) -> bool {
        self.suppressed.contains(&kind)
    }

    /// Scopes currently allowed, the innermost restriction wins.
    pub fn required_scopes(&self) -> &[Scope] {
        self.required_scopes.last().map_or(&[], Vec::as_slice)
    }

    /// Narrow the allowed scopes to those also present in `scopes`.
    pub fn push_required_scopes(&mut self, scopes: &[Scope]) {
        let narrowed: Vec<Scope> = self
            .required_scopes()
            .iter()
            .copied()
            .filter(|scope| scopes.contains(scope))
            .collect();
        trace!(?narrowed, "narrowing required scopes");
        self.required_scopes.push(narrowed);
    }

    pub fn pop_required_scopes(&mut self) -> Option<Vec<Scope>> {
        if self.required_scopes.len() > 1 {
            self.required_scopes.pop()
        } else {
            None
        }
    }

    pub(crate) fn conjunctive_block(&self) -> &[&'q Predicate] {
        &self.conjunctive_block
    }

    /// Union of every record known to the indexes of this scope.
    pub fn superset_formula(&self) -> Formula {
        join_formulas(self.indexes.iter().map(|index| index.all_records()))
    }

    /// Superset restricted to the indexes of one lifecycle scope.
    pub fn superset_formula_in(&self, scope: Scope) -> Formula {
        join_formulas(
            self.indexes
                .iter()
                .filter(|index| index.key().scope == scope)
                .map(|index| index.all_records()),
        )
    }
}

/// Disjunction of the non-empty formulas: nothing yields `Empty` and a
/// single formula is returned as is.
pub fn join_formulas(formulas: impl IntoIterator<Item = Formula>) -> Formula {
    let mut remaining: Vec<Formula> = formulas
        .into_iter()
        .filter(|formula| !formula.is_empty_formula())
        .collect();
    match remaining.len() {
        0 => Formula::empty(),
        1 => remaining.pop().unwrap_or_else(Formula::empty),
        _ => Formula::or(remaining),
    }
}
