use std::{collections::HashMap, fmt, sync::Arc};

use tracing::{debug, debug_span, trace};

use crate::{
    FilterError, FilterResult,
    compile::{FilterCompiler, ProcessingScope, TranslatorRegistry, join_formulas},
    formula::Formula,
    index::{IndexCatalog, IndexKey, IndexKind, PrefetchedRecords, RecordSetIndex, Scope},
    options::CompileOptions,
    predicate::Predicate,
    result::{AlternativeCost, CompiledFilter},
    schema::EntitySchema,
};

/// One set of indexes able to answer a filter on its own.
#[derive(Clone)]
pub struct TargetIndexes {
    description: String,
    kind: IndexKind,
    indexes: Vec<Arc<dyn RecordSetIndex>>,
}

impl TargetIndexes {
    pub fn new(
        description: impl Into<String>,
        kind: IndexKind,
        indexes: Vec<Arc<dyn RecordSetIndex>>,
    ) -> Self {
        Self {
            description: description.into(),
            kind,
            indexes,
        }
    }

    /// Entity indexes of `entity_type` in every scope the catalog has one for.
    pub fn entity(
        catalog: &dyn IndexCatalog,
        entity_type: &str,
        scopes: &[Scope],
    ) -> Self {
        let indexes = scopes
            .iter()
            .filter_map(|scope| catalog.index(&IndexKey::entity(entity_type, *scope)))
            .collect();
        Self::new(format!("{entity_type} entity index"), IndexKind::Entity, indexes)
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    pub fn indexes(&self) -> &[Arc<dyn RecordSetIndex>] {
        &self.indexes
    }

    fn superset(&self) -> Formula {
        join_formulas(self.indexes.iter().map(|index| index.all_records()))
    }
}

impl fmt::Debug for TargetIndexes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetIndexes")
            .field("description", &self.description)
            .field("kind", &self.kind)
            .field("indexes", &self.indexes.iter().map(|i| i.key()).collect::<Vec<_>>())
            .finish()
    }
}

/// Reusable planning façade for one entity type.
///
/// Holds everything that does not change between filters: the catalog
/// snapshot, the entity schema, the translator registry, options, entity
/// views and prefetched records. Each call to [`FilterPlanner::plan`] uses
/// a fresh [`FilterCompiler`] per alternative.
///
/// # Example
///
/// ```
/// use arrow_schema::DataType;
/// use sift::{
///     AttributeSchema, EntitySchema, FilterPlanner, InMemoryCatalog, MemoryRecord, Predicate,
///     Scope,
/// };
///
/// # fn main() -> Result<(), sift::FilterError> {
/// let catalog = InMemoryCatalog::new()
///     .with_schema(
///         EntitySchema::new("product").with_attribute(AttributeSchema::new("color", DataType::Utf8)),
///     )
///     .with_records(
///         "product",
///         Scope::Live,
///         vec![
///             MemoryRecord::new(1).attribute("color", "red"),
///             MemoryRecord::new(2).attribute("color", "blue"),
///         ],
///     );
///
/// let planner = FilterPlanner::try_new(&catalog, "product")?;
/// let filter = Predicate::filter_by(vec![Predicate::attribute_equals("color", "red")]);
/// let compiled = planner.plan_default(&filter)?;
/// assert_eq!(compiled.compute().iter().collect::<Vec<_>>(), vec![1]);
/// # Ok(())
/// # }
/// ```
pub struct FilterPlanner<'c> {
    catalog: &'c dyn IndexCatalog,
    schema: Arc<EntitySchema>,
    registry: TranslatorRegistry,
    options: CompileOptions,
    views: HashMap<String, Predicate>,
    prefetched: Option<PrefetchedRecords>,
}

impl<'c> FilterPlanner<'c> {
    pub fn try_new(catalog: &'c dyn IndexCatalog, entity_type: &str) -> FilterResult<Self> {
        let schema =
            catalog
                .entity_schema(entity_type)
                .ok_or_else(|| FilterError::EntitySchemaNotFound {
                    entity_type: entity_type.to_string(),
                })?;
        Ok(Self {
            catalog,
            schema,
            registry: TranslatorRegistry::standard(),
            options: CompileOptions::default(),
            views: HashMap::new(),
            prefetched: None,
        })
    }

    pub fn with_options(mut self, options: CompileOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_registry(mut self, registry: TranslatorRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Restrict every `EntityHaving` targeting `entity_type` with `view`.
    pub fn with_view(mut self, entity_type: impl Into<String>, view: Predicate) -> Self {
        self.views.insert(entity_type.into(), view);
        self
    }

    pub fn with_prefetched(mut self, records: PrefetchedRecords) -> Self {
        self.prefetched = Some(records);
        self
    }

    pub fn schema(&self) -> &Arc<EntitySchema> {
        &self.schema
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Compile `filter` against `target` only.
    pub fn compile(&self, filter: &Predicate, target: &TargetIndexes) -> FilterResult<Formula> {
        let _span = debug_span!("alternative", target = %target.description).entered();
        let scope = ProcessingScope::new(
            Arc::clone(&self.schema),
            target.kind,
            target.indexes.clone(),
            self.options.required_scopes().to_vec(),
        )
        .with_locale(self.options.locale().cloned());
        let mut compiler = FilterCompiler::new(self.catalog, &self.registry, &self.options, scope)
            .with_views(&self.views)
            .with_prefetched(self.prefetched.clone());
        compiler.compile(filter)
    }

    /// Compile `filter` against each alternative and keep the cheapest.
    ///
    /// Alternatives without any record are skipped unless all of them are
    /// empty. Equal costs keep the alternative declared first.
    pub fn plan(
        &self,
        filter: &Predicate,
        alternatives: &[TargetIndexes],
    ) -> FilterResult<CompiledFilter> {
        let _span = debug_span!("plan", alternatives = alternatives.len()).entered();
        if alternatives.is_empty() {
            return Err(FilterError::IndexRequired {
                what: format!("filter on '{}'", self.schema.name()),
            });
        }

        let populated: Vec<bool> = alternatives
            .iter()
            .map(|target| target.superset().estimated_cardinality() > 0)
            .collect();
        let consider_all = !populated.iter().any(|p| *p);

        let mut costs = Vec::with_capacity(alternatives.len());
        let mut best: Option<(usize, Formula)> = None;
        for (position, target) in alternatives.iter().enumerate() {
            if !consider_all && !populated[position] {
                trace!(target = %target.description, "skipping empty alternative");
                costs.push(AlternativeCost {
                    description: target.description.clone(),
                    cost: None,
                });
                continue;
            }
            let formula = self.compile(filter, target)?;
            let cost = formula.estimated_cost();
            costs.push(AlternativeCost {
                description: target.description.clone(),
                cost: Some(cost),
            });
            let cheaper = best
                .as_ref()
                .is_none_or(|(_, current)| cost < current.estimated_cost());
            if cheaper {
                best = Some((position, formula));
            }
        }

        let (alternative, formula) = best.ok_or_else(|| FilterError::IndexRequired {
            what: format!("filter on '{}'", self.schema.name()),
        })?;
        debug!(
            chosen = %alternatives[alternative].description,
            cost = formula.estimated_cost(),
            "selected alternative"
        );
        Ok(CompiledFilter::new(formula, alternative, costs))
    }

    /// Plan against the entity indexes of the required scopes.
    pub fn plan_default(&self, filter: &Predicate) -> FilterResult<CompiledFilter> {
        let target = TargetIndexes::entity(
            self.catalog,
            self.schema.name(),
            self.options.required_scopes(),
        );
        self.plan(filter, std::slice::from_ref(&target))
    }
}
