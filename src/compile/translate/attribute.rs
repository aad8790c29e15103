use std::sync::Arc;

use arrow_schema::DataType;

use crate::{
    FilterError, FilterResult,
    compile::{FilterCompiler, SelectionTagger},
    formula::Formula,
    index::AttributeQuery,
    predicate::{AttributeOp, Nullness, Predicate},
    schema::{AttributeSchema, AttributeTrait},
    value::is_assignable,
};

/// All attribute comparison kinds share one translator.
///
/// Equality and set membership on a unique attribute are answered by the
/// unique index; every other use requires the attribute to be filterable.
pub(crate) fn translate_attribute<'q>(
    predicate: &'q Predicate,
    _children: Vec<Formula>,
    compiler: &mut FilterCompiler<'q>,
) -> FilterResult<Option<Formula>> {
    let Predicate::Attribute(filter) = predicate else {
        return Err(FilterError::MissingTranslator {
            kind: predicate.kind(),
        });
    };
    let accessor = compiler.scope()?.attribute_schemas().clone();
    let schema = accessor.attribute_schema(&filter.attribute, &[])?;
    let unique = matches!(filter.op, AttributeOp::Equals(_) | AttributeOp::InSet(_))
        && schema.is_unique();
    if !unique {
        accessor.attribute_schema(&filter.attribute, &[AttributeTrait::Filterable])?;
    }
    check_types(&schema, &filter.op)?;

    let locale = if schema.is_localized() {
        Some(
            compiler
                .locale()?
                .ok_or_else(|| FilterError::LocaleRequired {
                    attribute: filter.attribute.clone(),
                })?,
        )
    } else {
        None
    };

    let formula = match &filter.op {
        AttributeOp::Is(Nullness::Null) => {
            let query = AttributeQuery {
                attribute: filter.attribute.clone(),
                locale: locale.clone(),
                op: AttributeOp::Is(Nullness::NotNull),
                unique: false,
            };
            let present = compiler.apply_on_indexes(|index| index.attribute(&query))?;
            Formula::attribute_predicate(
                filter.clone(),
                Formula::not(present, compiler.superset_formula()?),
            )
        }
        op => {
            let query = AttributeQuery {
                attribute: filter.attribute.clone(),
                locale: locale.clone(),
                op: op.clone(),
                unique,
            };
            let matching = compiler.apply_on_indexes(|index| index.attribute(&query))?;
            Formula::attribute_predicate(filter.clone(), matching)
        }
    };

    if compiler.options().selection_hints() && compiler.is_root_scope() {
        let values = compiler.scope()?.attribute_values().clone();
        let prefetched = compiler.bounded_prefetch();
        let locale = compiler.locale()?;
        compiler.register_post_processor_if_absent(Arc::new(SelectionTagger::new(
            locale, values, prefetched,
        )))?;
    }
    Ok(Some(formula))
}

fn check_types(schema: &AttributeSchema, op: &AttributeOp) -> FilterResult<()> {
    let declared = schema.data_type();
    let textual = matches!(
        op,
        AttributeOp::StartsWith(_) | AttributeOp::EndsWith(_) | AttributeOp::Contains(_)
    );
    if textual && !is_assignable(&DataType::Utf8, declared) {
        return Err(FilterError::TypeMismatch {
            attribute: schema.name().to_string(),
            expected: declared.clone(),
            found: DataType::Utf8,
        });
    }
    for literal in op.literals() {
        let found = literal.data_type();
        if !is_assignable(&found, declared) {
            return Err(FilterError::TypeMismatch {
                attribute: schema.name().to_string(),
                expected: declared.clone(),
                found,
            });
        }
    }
    Ok(())
}
