use std::{fmt, sync::Arc};

use crate::{
    formula::{Formula, FormulaKind, SelectionAlternative},
    index::{AttributeValueAccessor, PrefetchedRecords},
    value::Locale,
};

/// A rewrite applied once to the formula of the compilation that registered it.
///
/// Post-processors are identified by name; registering a second one with the
/// same name in the same compilation frame has no effect.
pub trait PostProcessor: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn process(&self, formula: Formula) -> Formula;
}

/// Wraps attribute predicates of the top-level conjunction in
/// [`FormulaKind::SelectionWrapper`] nodes.
///
/// The wrapper keeps the index lookup as its child. When the prefetched
/// records hold every key the filter is limited to, it evaluates the
/// attribute filter on them instead.
#[derive(Debug, Clone)]
pub struct SelectionTagger {
    locale: Option<Locale>,
    values: Arc<dyn AttributeValueAccessor>,
    prefetched: Option<PrefetchedRecords>,
}

impl SelectionTagger {
    pub const NAME: &'static str = "selection-tagger";

    pub fn new(
        locale: Option<Locale>,
        values: Arc<dyn AttributeValueAccessor>,
        prefetched: Option<PrefetchedRecords>,
    ) -> Self {
        Self {
            locale,
            values,
            prefetched,
        }
    }

    fn tag(&self, formula: &Formula) -> Formula {
        match formula.kind() {
            FormulaKind::And | FormulaKind::UserFilterWrapper => {
                let children: Vec<Formula> =
                    formula.children().iter().map(|child| self.tag(child)).collect();
                formula.clone_with_children(children)
            }
            FormulaKind::AttributePredicate(filter) => Formula::selection(
                SelectionAlternative {
                    filter: filter.clone(),
                    locale: self.locale.clone(),
                    values: self.values.clone(),
                    prefetched: self.prefetched.clone(),
                },
                formula.clone(),
            ),
            _ => formula.clone(),
        }
    }
}

impl PostProcessor for SelectionTagger {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn process(&self, formula: Formula) -> Formula {
        self.tag(&formula)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        index::EntityAttributeValues,
        predicate::{AttributeFilter, AttributeOp},
    };

    #[test]
    fn tags_only_top_level_conjunction() {
        let filter = AttributeFilter {
            attribute: "color".to_string(),
            op: AttributeOp::Equals("red".into()),
        };
        let lookup = Formula::constant([1u32, 2].into_iter().collect());
        let tagged_candidate = Formula::attribute_predicate(filter.clone(), lookup.clone());
        let nested = Formula::or(vec![
            Formula::attribute_predicate(filter, lookup.clone()),
            lookup,
        ]);
        let formula = Formula::and(vec![tagged_candidate, nested]);

        let tagger = SelectionTagger::new(None, Arc::new(EntityAttributeValues), None);
        let processed = tagger.process(formula.clone());
        assert!(matches!(
            processed.children()[0].kind(),
            FormulaKind::SelectionWrapper(_)
        ));
        assert!(processed.children()[1].ptr_eq(&formula.children()[1]));
        assert_eq!(processed.compute(), formula.compute());
    }
}
