use std::sync::Arc;

use tracing::trace;

use crate::{
    FilterError, FilterResult,
    compile::{FilterCompiler, ProcessingScope, join_formulas},
    formula::Formula,
    index::{IndexKey, IndexKind},
    predicate::Predicate,
};

pub(crate) fn translate_primary_keys<'q>(
    predicate: &'q Predicate,
    _children: Vec<Formula>,
    compiler: &mut FilterCompiler<'q>,
) -> FilterResult<Option<Formula>> {
    let Predicate::EntityPrimaryKeyInSet(ids) = predicate else {
        return Err(FilterError::MissingTranslator {
            kind: predicate.kind(),
        });
    };
    let requested = Formula::constant(ids.iter().copied().collect());
    Ok(Some(Formula::and(vec![
        requested,
        compiler.superset_formula()?,
    ])))
}

pub(crate) fn translate_locale<'q>(
    predicate: &'q Predicate,
    _children: Vec<Formula>,
    compiler: &mut FilterCompiler<'q>,
) -> FilterResult<Option<Formula>> {
    let Predicate::EntityLocaleEquals(locale) = predicate else {
        return Err(FilterError::MissingTranslator {
            kind: predicate.kind(),
        });
    };
    Ok(Some(
        compiler.apply_on_indexes(|index| index.locale_records(locale))?,
    ))
}

/// Records of every declared scope that is also required, each in its own container.
pub(crate) fn translate_scope<'q>(
    predicate: &'q Predicate,
    _children: Vec<Formula>,
    compiler: &mut FilterCompiler<'q>,
) -> FilterResult<Option<Formula>> {
    let Predicate::EntityScope(declared) = predicate else {
        return Err(FilterError::MissingTranslator {
            kind: predicate.kind(),
        });
    };
    let scope = compiler.scope()?;
    let containers: Vec<Formula> = scope
        .required_scopes()
        .iter()
        .filter(|required| declared.contains(required))
        .map(|required| {
            Formula::scope_container(*required, scope.superset_formula_in(*required))
        })
        .collect();
    Ok(Some(match containers.len() {
        0 => Formula::empty(),
        1 => containers.into_iter().next().unwrap_or_else(Formula::empty),
        _ => Formula::or(containers),
    }))
}

/// Constraints on the entity targeted by the enclosing `ReferenceHaving`.
///
/// Compiled in isolation against the entity indexes of the referenced type;
/// the matching referenced keys are then mapped to the records owning a
/// reference to them, the domain of the enclosing reference scope. A view
/// registered for the referenced type is AND-ed with the children; views may
/// not nest.
pub(crate) fn translate_entity_having<'q>(
    predicate: &'q Predicate,
    _children: Vec<Formula>,
    compiler: &mut FilterCompiler<'q>,
) -> FilterResult<Option<Formula>> {
    let scope = compiler.scope()?;
    let reference = scope
        .reference_schema()
        .cloned()
        .ok_or(FilterError::EntityHavingOutsideReference)?;
    let in_view = scope.is_in_view();
    let locale = compiler.locale()?;
    let required = scope.required_scopes().to_vec();

    let target = reference.referenced_entity_type();
    let schema = compiler
        .catalog()
        .entity_schema(target)
        .ok_or_else(|| FilterError::EntitySchemaNotFound {
            entity_type: target.to_string(),
        })?;

    let mut predicates: Vec<&'q Predicate> = predicate.children().iter().collect();
    let view = compiler.view(target);
    if let Some(view) = view {
        if in_view {
            return Err(FilterError::NestedUnderlyingPredicate);
        }
        trace!(entity_type = target, "applying entity view");
        predicates.push(view);
    }

    let owner = Arc::clone(scope.entity_schema());
    let mut per_scope = Vec::with_capacity(required.len());
    for scope in required {
        let Some(index) = compiler.catalog().index(&IndexKey::entity(target, scope)) else {
            continue;
        };
        let Some(owners) = compiler.catalog().index(&IndexKey::referenced(
            owner.name(),
            reference.name(),
            scope,
        )) else {
            continue;
        };
        let nested = ProcessingScope::new(
            Arc::clone(&schema),
            IndexKind::Entity,
            vec![index],
            vec![scope],
        )
        .with_locale(locale.clone())
        .with_view(in_view || view.is_some());
        let targets = compiler.compile_isolated(nested, predicates.clone())?;
        per_scope.push(Formula::reference_translation(reference.name(), owners, targets));
    }
    Ok(Some(join_formulas(per_scope)))
}
