//! Translation of a predicate tree into a [`Formula`].
//!
//! [`FilterCompiler`] walks the tree depth first. It keeps one accumulator
//! frame per nesting level, one post-processor frame per compilation and a
//! stack of [`ProcessingScope`]s. Nested compilations against another index
//! set push all three and pop them before returning their finished formula,
//! so they never see or change what the enclosing level has collected.

use std::{collections::HashMap, sync::Arc};

use roaring::RoaringBitmap;
use tracing::{debug_span, trace};

use crate::{
    FilterError, FilterResult,
    formula::{Formula, deduplicate, optimize},
    index::{
        EntityRecord, IndexCatalog, IndexLookup, PrefetchedRecords, RecordSetIndex, Scope,
    },
    options::CompileOptions,
    predicate::{Predicate, PredicateKind},
    value::Locale,
};

pub(crate) mod postprocess;
pub(crate) mod registry;
pub(crate) mod scope;
pub(crate) mod translate;

pub use postprocess::{PostProcessor, SelectionTagger};
pub use registry::{TranslateFn, Translator, TranslatorRegistry};
pub use scope::{ProcessingScope, join_formulas};

/// Compiles one filter. A compiler is single-use and single-threaded.
pub struct FilterCompiler<'q> {
    catalog: &'q dyn IndexCatalog,
    registry: &'q TranslatorRegistry,
    options: &'q CompileOptions,
    views: Option<&'q HashMap<String, Predicate>>,
    prefetched: Option<PrefetchedRecords>,
    root: Option<&'q Predicate>,
    frames: Vec<Vec<Formula>>,
    scopes: Vec<ProcessingScope<'q>>,
    post_processors: Vec<Vec<Arc<dyn PostProcessor>>>,
    result: Option<Formula>,
}

impl<'q> FilterCompiler<'q> {
    pub fn new(
        catalog: &'q dyn IndexCatalog,
        registry: &'q TranslatorRegistry,
        options: &'q CompileOptions,
        root_scope: ProcessingScope<'q>,
    ) -> Self {
        Self {
            catalog,
            registry,
            options,
            views: None,
            prefetched: None,
            root: None,
            frames: Vec::new(),
            scopes: vec![root_scope],
            post_processors: Vec::new(),
            result: None,
        }
    }

    /// Per entity type predicates AND-ed into every `EntityHaving` targeting that type.
    pub fn with_views(mut self, views: &'q HashMap<String, Predicate>) -> Self {
        self.views = Some(views);
        self
    }

    pub fn with_prefetched(mut self, records: Option<PrefetchedRecords>) -> Self {
        self.prefetched = records;
        self
    }

    pub fn catalog(&self) -> &'q dyn IndexCatalog {
        self.catalog
    }

    pub fn options(&self) -> &'q CompileOptions {
        self.options
    }

    pub(crate) fn view(&self, entity_type: &str) -> Option<&'q Predicate> {
        self.views.and_then(|views| views.get(entity_type))
    }

    /// Prefetched records, provided they hold every primary key the root
    /// conjunction is limited to.
    ///
    /// Without such a bound a matching record may be missing from the
    /// prefetched set, so selection wrappers keep answering from the index.
    pub(crate) fn bounded_prefetch(&self) -> Option<PrefetchedRecords> {
        let records = self.prefetched.as_ref()?;
        let mut found = Vec::new();
        collect_conjunctive(
            std::slice::from_ref(self.root?),
            PredicateKind::EntityPrimaryKeyInSet,
            &mut found,
        );
        let bound = found
            .into_iter()
            .filter_map(|predicate| match predicate {
                Predicate::EntityPrimaryKeyInSet(ids) => {
                    Some(ids.iter().copied().collect::<RoaringBitmap>())
                }
                _ => None,
            })
            .reduce(|current, ids| current & ids)?;
        let fetched: RoaringBitmap = records.iter().map(|record| record.primary_key()).collect();
        if bound.is_subset(&fetched) {
            Some(Arc::clone(records))
        } else {
            trace!(
                bound = bound.len(),
                fetched = fetched.len(),
                "prefetched records do not cover the key bound"
            );
            None
        }
    }

    /// Compile `filter` into its final optimized and deduplicated formula.
    pub fn compile(&mut self, filter: &'q Predicate) -> FilterResult<Formula> {
        let _span = debug_span!("compile", filter = %filter.kind()).entered();
        let depth = (self.frames.len(), self.scopes.len(), self.post_processors.len());
        self.root = Some(filter);
        self.result = None;

        let narrowing = declared_scopes(filter);
        if let Some(scopes) = &narrowing {
            self.scope_mut()?.push_required_scopes(scopes);
        }
        self.frames.push(Vec::new());
        self.post_processors.push(Vec::new());

        self.visit(filter)?;

        let leftover = self.frames.pop().ok_or(FilterError::UnbalancedStack {
            stack: "formula",
            expected: depth.0 + 1,
            found: 0,
        })?;
        self.post_processors.pop();
        if narrowing.is_some() {
            self.scope_mut()?.pop_required_scopes();
        }
        check_depth("formula", depth.0, self.frames.len())?;
        check_depth("scope", depth.1, self.scopes.len())?;
        check_depth("post-processor", depth.2, self.post_processors.len())?;
        if !leftover.is_empty() {
            return Err(FilterError::UnbalancedStack {
                stack: "formula",
                expected: 0,
                found: leftover.len(),
            });
        }

        let mut formula = match self.result.take() {
            Some(formula) => formula,
            None => self.superset_formula()?,
        };
        if self.options.optimize() {
            formula = optimize(&formula);
        }
        if self.options.deduplicate() {
            formula = deduplicate(&formula);
        }
        Ok(formula)
    }

    /// Translate one predicate and append its formula to the current frame.
    pub fn visit(&mut self, predicate: &'q Predicate) -> FilterResult<()> {
        let kind = predicate.kind();
        let translator = self.registry.get(kind)?;
        if self.scope()?.is_suppressed(kind) {
            trace!(%kind, "suppressed predicate");
            return Ok(());
        }

        self.scope_mut()?.parent_chain.push(predicate);
        let translated = self.translate(predicate, translator);
        self.scope_mut()?.parent_chain.pop();
        let formula = translated?;

        if self.root.is_some_and(|root| std::ptr::eq(root, predicate)) {
            let formula = match formula {
                Some(formula) => formula,
                None => self.superset_formula()?,
            };
            self.result = Some(self.construct_final_formula(formula)?);
        } else if let Some(formula) = formula {
            self.frames
                .last_mut()
                .ok_or(FilterError::UnbalancedStack {
                    stack: "formula",
                    expected: 1,
                    found: 0,
                })?
                .push(formula);
        }
        Ok(())
    }

    fn translate(
        &mut self,
        predicate: &'q Predicate,
        translator: Translator,
    ) -> FilterResult<Option<Formula>> {
        trace!(kind = %predicate.kind(), "translating predicate");
        if !predicate.is_container() {
            return (translator.translate)(predicate, Vec::new(), self);
        }
        let depth = self.frames.len();
        self.frames.push(Vec::new());
        let visited = if translator.self_traversing {
            Ok(())
        } else {
            predicate
                .children()
                .iter()
                .try_for_each(|child| self.visit(child))
        };
        let children = self.frames.pop().unwrap_or_default();
        visited?;
        check_depth("formula", depth, self.frames.len())?;
        (translator.translate)(predicate, children, self)
    }

    fn construct_final_formula(&mut self, formula: Formula) -> FilterResult<Formula> {
        let processors = self.post_processors.last().cloned().unwrap_or_default();
        Ok(processors.iter().fold(formula, |formula, processor| {
            trace!(processor = processor.name(), "running post-processor");
            processor.process(formula)
        }))
    }

    /// Run `body` with `scope` pushed on the scope stack.
    pub fn execute_in_context<T>(
        &mut self,
        scope: ProcessingScope<'q>,
        body: impl FnOnce(&mut Self) -> FilterResult<T>,
    ) -> FilterResult<T> {
        let depth = self.scopes.len();
        self.scopes.push(scope);
        let result = body(self);
        self.scopes.pop().ok_or(FilterError::EmptyScopeStack)?;
        check_depth("scope", depth, self.scopes.len())?;
        result
    }

    /// Compile `predicates` as a conjunction in a nested, isolated context.
    ///
    /// The enclosing accumulator frame is left untouched; post-processors
    /// registered inside run on the nested result only. No predicates yield
    /// the superset of the nested scope.
    pub fn compile_isolated(
        &mut self,
        scope: ProcessingScope<'q>,
        predicates: Vec<&'q Predicate>,
    ) -> FilterResult<Formula> {
        let frames = self.frames.len();
        let post_processors = self.post_processors.len();
        let scope = scope.with_conjunctive_block(predicates.clone());
        trace!(
            depth = self.scopes.len(),
            predicates = predicates.len(),
            "entering isolated scope"
        );

        self.frames.push(Vec::new());
        self.post_processors.push(Vec::new());
        let outcome = self.execute_in_context(scope, |compiler| {
            for predicate in predicates.iter().copied() {
                compiler.visit(predicate)?;
            }
            compiler.superset_formula()
        });
        let collected = self.frames.pop().unwrap_or_default();
        let processors = self.post_processors.pop().unwrap_or_default();
        let superset = outcome?;
        check_depth("formula", frames, self.frames.len())?;
        check_depth("post-processor", post_processors, self.post_processors.len())?;

        let formula = match collected.len() {
            0 => superset,
            1 => collected.into_iter().next().unwrap_or(superset),
            _ => Formula::and(collected),
        };
        trace!(depth = self.scopes.len(), "leaving isolated scope");
        Ok(processors
            .iter()
            .fold(formula, |formula, processor| processor.process(formula)))
    }

    pub fn scope(&self) -> FilterResult<&ProcessingScope<'q>> {
        self.scopes.last().ok_or(FilterError::EmptyScopeStack)
    }

    pub fn scope_mut(&mut self) -> FilterResult<&mut ProcessingScope<'q>> {
        self.scopes.last_mut().ok_or(FilterError::EmptyScopeStack)
    }

    /// True while translating directly in the root scope.
    pub fn is_root_scope(&self) -> bool {
        self.scopes.len() == 1
    }

    /// Formulas collected so far on the innermost open nesting level.
    pub fn collected_formulas_on_current_level(&self) -> &[Formula] {
        self.frames.last().map_or(&[], Vec::as_slice)
    }

    pub fn superset_formula(&self) -> FilterResult<Formula> {
        Ok(self.scope()?.superset_formula())
    }

    /// Ask every index of the current scope and union the answers.
    pub fn apply_on_indexes(
        &self,
        mut lookup: impl FnMut(&Arc<dyn RecordSetIndex>) -> IndexLookup,
    ) -> FilterResult<Formula> {
        let scope = self.scope()?;
        Ok(join_formulas(
            scope
                .indexes()
                .iter()
                .map(|index| lookup(index).into_formula()),
        ))
    }

    /// Predicates of `kind` in the conjunctive block of the predicate being translated.
    ///
    /// Walks the parent chain upward while ancestors are conjunctive and
    /// collects matching predicates among their descendants reachable through
    /// conjunctive containers only. The walk stops at the first disjunctive
    /// or negating ancestor.
    pub fn find_in_conjunction_tree(&self, kind: PredicateKind) -> FilterResult<Vec<&'q Predicate>> {
        let scope = self.scope()?;
        let chain = &scope.parent_chain;
        let mut found = Vec::new();
        let ancestors = chain.len().saturating_sub(1);
        let mut unbroken = true;
        for ancestor in chain[..ancestors].iter().rev().copied() {
            if !ancestor.kind().is_conjunctive() {
                unbroken = false;
                break;
            }
            collect_conjunctive(ancestor.children(), kind, &mut found);
        }
        if unbroken {
            collect_conjunctive(scope.conjunctive_block().iter().copied(), kind, &mut found);
        }
        Ok(found)
    }

    /// Locale in effect: the conjunctive block first, then the scope, then the options.
    pub fn locale(&self) -> FilterResult<Option<Locale>> {
        let declared = self
            .find_in_conjunction_tree(PredicateKind::EntityLocaleEquals)?
            .into_iter()
            .find_map(|predicate| match predicate {
                Predicate::EntityLocaleEquals(locale) => Some(locale.clone()),
                _ => None,
            });
        Ok(declared
            .or_else(|| self.scope().ok().and_then(|s| s.locale().cloned()))
            .or_else(|| self.options.locale().cloned()))
    }

    pub fn register_post_processor_if_absent(
        &mut self,
        processor: Arc<dyn PostProcessor>,
    ) -> FilterResult<()> {
        let frame = self
            .post_processors
            .last_mut()
            .ok_or(FilterError::UnbalancedStack {
                stack: "post-processor",
                expected: 1,
                found: 0,
            })?;
        if !frame.iter().any(|p| p.name() == processor.name()) {
            trace!(processor = processor.name(), "registering post-processor");
            frame.push(processor);
        }
        Ok(())
    }
}

fn check_depth(stack: &'static str, expected: usize, found: usize) -> FilterResult<()> {
    if expected == found {
        Ok(())
    } else {
        Err(FilterError::UnbalancedStack {
            stack,
            expected,
            found,
        })
    }
}

fn collect_conjunctive<'q>(
    children: impl IntoIterator<Item = &'q Predicate>,
    kind: PredicateKind,
    found: &mut Vec<&'q Predicate>,
) {
    for child in children {
        if child.kind() == kind {
            if !found.iter().any(|p| std::ptr::eq(*p, child)) {
                found.push(child);
            }
        } else if child.kind().is_conjunctive() {
            collect_conjunctive(child.children(), kind, found);
        }
    }
}

/// Scopes named by `EntityScope` predicates of the top-level conjunction.
fn declared_scopes(filter: &Predicate) -> Option<Vec<Scope>> {
    let mut found = Vec::new();
    let root = std::slice::from_ref(filter);
    collect_conjunctive(root, PredicateKind::EntityScope, &mut found);
    let mut scopes: Option<Vec<Scope>> = None;
    for predicate in found {
        if let Predicate::EntityScope(declared) = predicate {
            scopes = Some(match scopes {
                Some(current) => current.into_iter().filter(|s| declared.contains(s)).collect(),
                None => declared.clone(),
            });
        }
    }
    scopes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        index::IndexKind,
        memory::{InMemoryCatalog, InMemoryIndex, MemoryRecord},
        schema::{AttributeSchema, EntitySchema},
    };
    use arrow_schema::DataType;

    fn catalog() -> InMemoryCatalog {
        let schema = EntitySchema::new("product")
            .with_attribute(AttributeSchema::new("color", DataType::Utf8))
            .with_attribute(AttributeSchema::new("size", DataType::Int64));
        let index = InMemoryIndex::builder(crate::index::IndexKey::entity("product", Scope::Live))
            .record(1, |r| r.attribute("color", "red").attribute("size", 1))
            .record(2, |r| r.attribute("color", "blue").attribute("size", 2))
            .record(3, |r| r.attribute("color", "red").attribute("size", 3))
            .build();
        InMemoryCatalog::new().with_schema(schema).with_index(index)
    }

    fn root_scope(catalog: &InMemoryCatalog) -> ProcessingScope<'static> {
        let schema = catalog.entity_schema("product").unwrap();
        let index = catalog
            .index(&crate::index::IndexKey::entity("product", Scope::Live))
            .unwrap();
        ProcessingScope::new(schema, IndexKind::Entity, vec![index], vec![Scope::Live])
    }

    #[test]
    fn isolated_compilation_leaves_parent_frame_untouched() {
        let catalog = catalog();
        let registry = TranslatorRegistry::standard();
        let options = CompileOptions::default();
        let nested = vec![
            Predicate::attribute_equals("color", "red"),
            Predicate::attribute_greater_than("size", 1i64),
        ];
        let mut compiler = FilterCompiler::new(&catalog, &registry, &options, root_scope(&catalog));

        compiler.frames.push(vec![Formula::empty()]);
        compiler.post_processors.push(Vec::new());
        let before: Vec<u64> = compiler
            .collected_formulas_on_current_level()
            .iter()
            .map(Formula::structural_hash)
            .collect();

        let formula = compiler
            .compile_isolated(root_scope(&catalog), nested.iter().collect())
            .unwrap();

        let after: Vec<u64> = compiler
            .collected_formulas_on_current_level()
            .iter()
            .map(Formula::structural_hash)
            .collect();
        assert_eq!(before, after);
        assert_eq!(compiler.scopes.len(), 1);
        assert_eq!(formula.compute().iter().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn conjunction_tree_lookup_stops_at_disjunction() {
        let catalog = catalog();
        let registry = TranslatorRegistry::standard();
        let options = CompileOptions::default();
        let filter = Predicate::filter_by(vec![
            Predicate::locale_equals("en"),
            Predicate::or(vec![Predicate::attribute_equals("color", "red")]),
            Predicate::and(vec![Predicate::attribute_equals("size", 1i64)]),
        ]);
        let mut compiler = FilterCompiler::new(&catalog, &registry, &options, root_scope(&catalog));

        let Predicate::FilterBy(children) = &filter else {
            unreachable!()
        };
        let in_or = &children[1].children()[0];
        let in_and = &children[2].children()[0];

        let chain = &mut compiler.scope_mut().unwrap().parent_chain;
        chain.extend([&filter, &children[1], in_or]);
        assert!(
            compiler
                .find_in_conjunction_tree(PredicateKind::EntityLocaleEquals)
                .unwrap()
                .is_empty()
        );

        let chain = &mut compiler.scope_mut().unwrap().parent_chain;
        chain.clear();
        chain.extend([&filter, &children[2], in_and]);
        assert_eq!(
            compiler.locale().unwrap(),
            Some(Locale::from("en"))
        );
    }

    #[test]
    fn skipped_root_yields_superset() {
        fn skip<'q>(
            _: &'q Predicate,
            _: Vec<Formula>,
            _: &mut FilterCompiler<'q>,
        ) -> FilterResult<Option<Formula>> {
            Ok(None)
        }

        let catalog = catalog();
        let mut registry = TranslatorRegistry::standard();
        registry.register(PredicateKind::FilterBy, Translator::new(skip));
        let options = CompileOptions::default();
        let filter = Predicate::filter_by(vec![Predicate::attribute_equals("color", "red")]);
        let mut compiler = FilterCompiler::new(&catalog, &registry, &options, root_scope(&catalog));

        let formula = compiler.compile(&filter).unwrap();
        assert_eq!(formula.compute().iter().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn prefetch_is_used_only_within_key_bound() {
        let catalog = catalog();
        let registry = TranslatorRegistry::standard();
        let options = CompileOptions::default();
        let records: PrefetchedRecords = Arc::new(vec![
            Arc::new(MemoryRecord::new(1).attribute("color", "red")) as Arc<dyn EntityRecord>,
        ]);
        let bounded = |filter: &Predicate| {
            let mut compiler =
                FilterCompiler::new(&catalog, &registry, &options, root_scope(&catalog))
                    .with_prefetched(Some(Arc::clone(&records)));
            compiler.compile(filter).unwrap();
            compiler.bounded_prefetch().is_some()
        };

        assert!(!bounded(&Predicate::filter_by(vec![])));
        assert!(bounded(&Predicate::filter_by(vec![
            Predicate::EntityPrimaryKeyInSet(vec![1, 3]),
            Predicate::and(vec![Predicate::EntityPrimaryKeyInSet(vec![1])]),
        ])));
        assert!(!bounded(&Predicate::filter_by(vec![
            Predicate::EntityPrimaryKeyInSet(vec![1, 3]),
        ])));
        assert!(!bounded(&Predicate::filter_by(vec![Predicate::or(vec![
            Predicate::EntityPrimaryKeyInSet(vec![1]),
        ])])));
    }

    #[test]
    fn entity_scope_narrowing_is_detected_in_root_conjunction() {
        let filter = Predicate::filter_by(vec![Predicate::and(vec![Predicate::EntityScope(
            vec![Scope::Archived],
        )])]);
        assert_eq!(declared_scopes(&filter), Some(vec![Scope::Archived]));
        let filter = Predicate::filter_by(vec![Predicate::or(vec![Predicate::EntityScope(
            vec![Scope::Archived],
        )])]);
        assert_eq!(declared_scopes(&filter), None);
    }
}
