use crate::{
    FilterError, FilterResult,
    compile::FilterCompiler,
    formula::Formula,
    index::HierarchyQuery,
    predicate::Predicate,
};

pub(crate) fn translate_hierarchy<'q>(
    predicate: &'q Predicate,
    _children: Vec<Formula>,
    compiler: &mut FilterCompiler<'q>,
) -> FilterResult<Option<Formula>> {
    let query = match predicate {
        Predicate::HierarchyWithin {
            parent,
            direct,
            excluding,
        } => HierarchyQuery {
            parent: Some(*parent),
            direct: *direct,
            excluding: excluding.clone(),
        },
        Predicate::HierarchyWithinRoot { direct, excluding } => HierarchyQuery {
            parent: None,
            direct: *direct,
            excluding: excluding.clone(),
        },
        other => {
            return Err(FilterError::MissingTranslator { kind: other.kind() });
        }
    };
    let schema = compiler.scope()?.entity_schema();
    if !schema.is_with_hierarchy() {
        return Err(FilterError::NotHierarchical {
            entity_type: schema.name().to_string(),
        });
    }
    Ok(Some(
        compiler.apply_on_indexes(|index| index.hierarchy(&query))?,
    ))
}
