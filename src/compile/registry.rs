use std::collections::HashMap;

use crate::{
    FilterError, FilterResult,
    compile::{
        FilterCompiler,
        translate::{attribute, entity, hierarchy, logical, price, reference},
    },
    formula::Formula,
    predicate::{Predicate, PredicateKind},
};

/// Translation function of one predicate kind.
///
/// Receives the predicate, the formulas of its already translated children
/// (empty for leaves and self-traversing containers) and the compiler.
/// `Ok(None)` means the predicate contributes no constraint.
pub type TranslateFn =
    for<'q> fn(&'q Predicate, Vec<Formula>, &mut FilterCompiler<'q>) -> FilterResult<Option<Formula>>;

#[derive(Clone, Copy)]
pub struct Translator {
    pub translate: TranslateFn,
    /// The translator visits the children itself.
    pub self_traversing: bool,
}

impl Translator {
    pub fn new(translate: TranslateFn) -> Self {
        Self {
            translate,
            self_traversing: false,
        }
    }

    pub fn self_traversing(translate: TranslateFn) -> Self {
        Self {
            translate,
            self_traversing: true,
        }
    }
}

/// Mapping from predicate kind to its translator.
#[derive(Clone)]
pub struct TranslatorRegistry {
    translators: HashMap<PredicateKind, Translator>,
}

impl TranslatorRegistry {
    /// Registry without any translator.
    pub fn empty() -> Self {
        Self {
            translators: HashMap::new(),
        }
    }

    /// Registry with a translator for every predicate kind.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        for kind in PredicateKind::ALL {
            registry.register(kind, standard_translator(kind));
        }
        registry
    }

    pub fn register(&mut self, kind: PredicateKind, translator: Translator) -> &mut Self {
        self.translators.insert(kind, translator);
        self
    }

    /// Copy of this registry with the translator of `kind` removed.
    pub fn without(&self, kind: PredicateKind) -> Self {
        let mut registry = self.clone();
        registry.translators.remove(&kind);
        registry
    }

    pub fn get(&self, kind: PredicateKind) -> FilterResult<Translator> {
        self.translators
            .get(&kind)
            .copied()
            .ok_or(FilterError::MissingTranslator { kind })
    }
}

impl Default for TranslatorRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

fn standard_translator(kind: PredicateKind) -> Translator {
    match kind {
        PredicateKind::FilterBy | PredicateKind::And => Translator::new(logical::translate_and),
        PredicateKind::Or => Translator::new(logical::translate_or),
        PredicateKind::Not => Translator::new(logical::translate_not),
        PredicateKind::UserFilter => Translator::new(logical::translate_user_filter),
        PredicateKind::EntityPrimaryKeyInSet => Translator::new(entity::translate_primary_keys),
        PredicateKind::EntityLocaleEquals => Translator::new(entity::translate_locale),
        PredicateKind::EntityScope => Translator::new(entity::translate_scope),
        PredicateKind::EntityHaving => Translator::self_traversing(entity::translate_entity_having),
        PredicateKind::ReferenceHaving => {
            Translator::self_traversing(reference::translate_reference_having)
        }
        PredicateKind::AttributeEquals
        | PredicateKind::AttributeLessThan
        | PredicateKind::AttributeLessThanEquals
        | PredicateKind::AttributeGreaterThan
        | PredicateKind::AttributeGreaterThanEquals
        | PredicateKind::AttributeBetween
        | PredicateKind::AttributeInSet
        | PredicateKind::AttributeIs
        | PredicateKind::AttributeStartsWith
        | PredicateKind::AttributeEndsWith
        | PredicateKind::AttributeContains => Translator::new(attribute::translate_attribute),
        PredicateKind::PriceInCurrency => Translator::new(price::translate_currency),
        PredicateKind::PriceInPriceLists => Translator::new(price::translate_price_lists),
        PredicateKind::PriceValidIn => Translator::new(price::translate_valid_in),
        PredicateKind::PriceBetween => Translator::new(price::translate_between),
        PredicateKind::HierarchyWithin | PredicateKind::HierarchyWithinRoot => {
            Translator::new(hierarchy::translate_hierarchy)
        }
    }
}
