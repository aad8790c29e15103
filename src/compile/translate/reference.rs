use std::sync::Arc;

use tracing::trace;

use crate::{
    FilterError, FilterResult,
    compile::{FilterCompiler, ProcessingScope, join_formulas},
    formula::Formula,
    index::{IndexKey, IndexKind, ReferenceAttributeValues},
    predicate::{Predicate, PredicateKind},
};

/// Records holding a reference whose target satisfies the children.
///
/// For each required scope the children are compiled in isolation against
/// the reduced indexes of the reference, one per referenced entity. Their
/// identifiers are the owning records, so every reference attribute is
/// matched on its own (owner, target) pair. Attributes resolve on the
/// reference schema and locale predicates are ignored inside; the locale of
/// the enclosing block is inherited instead.
pub(crate) fn translate_reference_having<'q>(
    predicate: &'q Predicate,
    _children: Vec<Formula>,
    compiler: &mut FilterCompiler<'q>,
) -> FilterResult<Option<Formula>> {
    let Predicate::ReferenceHaving {
        reference: name,
        children,
    } = predicate
    else {
        return Err(FilterError::MissingTranslator {
            kind: predicate.kind(),
        });
    };

    let scope = compiler.scope()?;
    let entity = Arc::clone(scope.entity_schema());
    let reference = entity.require_reference(name)?;
    if !reference.is_indexed() {
        return Err(FilterError::ReferenceNotIndexed {
            reference: name.clone(),
            entity_type: entity.name().to_string(),
        });
    }
    let attribute_schemas = scope.attribute_schemas().with_reference(name)?;
    let in_view = scope.is_in_view();
    let required = scope.required_scopes().to_vec();
    let locale = compiler.locale()?;

    let mut per_scope = Vec::with_capacity(required.len());
    for scope in required {
        let Some(targets) = compiler
            .catalog()
            .index(&IndexKey::referenced(entity.name(), name.as_str(), scope))
        else {
            continue;
        };
        let reduced: Vec<_> = targets
            .all_records()
            .compute()
            .iter()
            .filter_map(|referenced_id| {
                compiler.catalog().index(&IndexKey::reduced(
                    entity.name(),
                    name.as_str(),
                    referenced_id,
                    scope,
                ))
            })
            .collect();
        if reduced.is_empty() {
            continue;
        }
        trace!(reference = %name, %scope, indexes = reduced.len(), "reduced reference indexes");
        let nested = ProcessingScope::new(
            Arc::clone(&entity),
            IndexKind::ReferencedEntity,
            reduced,
            vec![scope],
        )
        .with_reference(
            Arc::clone(&reference),
            attribute_schemas.clone(),
            Arc::new(ReferenceAttributeValues {
                reference: name.clone(),
            }),
        )
        .with_suppressed([PredicateKind::EntityLocaleEquals])
        .with_locale(locale.clone())
        .with_view(in_view);
        per_scope.push(compiler.compile_isolated(nested, children.iter().collect())?);
    }
    Ok(Some(join_formulas(per_scope)))
}
