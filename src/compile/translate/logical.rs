use crate::{
    FilterResult, compile::FilterCompiler, formula::Formula, predicate::Predicate,
};

/// `FilterBy` and `And`: conjunction of the children, the superset when none remain.
pub(crate) fn translate_and<'q>(
    _predicate: &'q Predicate,
    mut children: Vec<Formula>,
    compiler: &mut FilterCompiler<'q>,
) -> FilterResult<Option<Formula>> {
    let formula = match children.len() {
        0 => compiler.superset_formula()?,
        1 => children.remove(0),
        _ => Formula::and(children),
    };
    Ok(Some(formula))
}

/// An `Or` without children stays in the tree and optimizes to `Empty`.
pub(crate) fn translate_or<'q>(
    _predicate: &'q Predicate,
    children: Vec<Formula>,
    _compiler: &mut FilterCompiler<'q>,
) -> FilterResult<Option<Formula>> {
    Ok(Some(Formula::or(children)))
}

pub(crate) fn translate_not<'q>(
    _predicate: &'q Predicate,
    children: Vec<Formula>,
    compiler: &mut FilterCompiler<'q>,
) -> FilterResult<Option<Formula>> {
    let mut children = children.into_iter();
    let Some(negated) = children.next() else {
        return Ok(None);
    };
    Ok(Some(Formula::not(negated, compiler.superset_formula()?)))
}

pub(crate) fn translate_user_filter<'q>(
    _predicate: &'q Predicate,
    children: Vec<Formula>,
    compiler: &mut FilterCompiler<'q>,
) -> FilterResult<Option<Formula>> {
    if children.is_empty() {
        return Ok(Some(compiler.superset_formula()?));
    }
    Ok(Some(Formula::user_filter(children)))
}
