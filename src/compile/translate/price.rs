use crate::{
    FilterError, FilterResult,
    compile::{FilterCompiler, join_formulas},
    formula::Formula,
    index::{IndexLookup, PriceQuery},
    predicate::{Predicate, PredicateKind},
};

fn require_prices(compiler: &FilterCompiler<'_>) -> FilterResult<()> {
    let schema = compiler.scope()?.entity_schema();
    if schema.is_with_price() {
        Ok(())
    } else {
        Err(FilterError::PricesNotEnabled {
            entity_type: schema.name().to_string(),
        })
    }
}

fn sibling_currency(compiler: &FilterCompiler<'_>) -> FilterResult<Option<String>> {
    Ok(compiler
        .find_in_conjunction_tree(PredicateKind::PriceInCurrency)?
        .into_iter()
        .find_map(|predicate| match predicate {
            Predicate::PriceInCurrency(currency) => Some(currency.clone()),
            _ => None,
        }))
}

fn sibling_moment(compiler: &FilterCompiler<'_>) -> FilterResult<Option<i64>> {
    Ok(compiler
        .find_in_conjunction_tree(PredicateKind::PriceValidIn)?
        .into_iter()
        .find_map(|predicate| match predicate {
            Predicate::PriceValidIn(moment) => Some(moment.unwrap_or(compiler.options().now())),
            _ => None,
        }))
}

fn sibling_price_lists(compiler: &FilterCompiler<'_>) -> FilterResult<Option<Vec<String>>> {
    Ok(compiler
        .find_in_conjunction_tree(PredicateKind::PriceInPriceLists)?
        .into_iter()
        .find_map(|predicate| match predicate {
            Predicate::PriceInPriceLists(lists) => Some(lists.clone()),
            _ => None,
        }))
}

/// Prices matching `query`, restricted to those valid at `moment` when given.
fn lookup_prices(
    compiler: &FilterCompiler<'_>,
    query: &PriceQuery,
    moment: Option<i64>,
) -> FilterResult<Formula> {
    compiler.apply_on_indexes(|index| match moment {
        Some(moment) => IndexLookup::Formula(Formula::price_validity(
            index.clone(),
            query.clone(),
            moment,
        )),
        None => index.price(query),
    })
}

/// Records with a price in any of the lists, in the currency and validity of
/// the same conjunctive block.
pub(crate) fn translate_price_lists<'q>(
    predicate: &'q Predicate,
    _children: Vec<Formula>,
    compiler: &mut FilterCompiler<'q>,
) -> FilterResult<Option<Formula>> {
    let Predicate::PriceInPriceLists(lists) = predicate else {
        return Err(FilterError::MissingTranslator {
            kind: predicate.kind(),
        });
    };
    require_prices(compiler)?;
    let currency = sibling_currency(compiler)?;
    let moment = sibling_moment(compiler)?;

    let mut per_list = Vec::with_capacity(lists.len());
    for list in lists {
        let query = PriceQuery {
            price_list: Some(list.clone()),
            currency: currency.clone(),
            ..PriceQuery::default()
        };
        per_list.push(lookup_prices(compiler, &query, moment)?);
    }
    Ok(Some(join_formulas(per_list)))
}

/// Skipped when a price-list predicate of the same block already covers the currency.
pub(crate) fn translate_currency<'q>(
    predicate: &'q Predicate,
    _children: Vec<Formula>,
    compiler: &mut FilterCompiler<'q>,
) -> FilterResult<Option<Formula>> {
    let Predicate::PriceInCurrency(currency) = predicate else {
        return Err(FilterError::MissingTranslator {
            kind: predicate.kind(),
        });
    };
    require_prices(compiler)?;
    if sibling_price_lists(compiler)?.is_some() {
        return Ok(None);
    }
    let query = PriceQuery {
        currency: Some(currency.clone()),
        ..PriceQuery::default()
    };
    Ok(Some(lookup_prices(compiler, &query, None)?))
}

/// Skipped when a price-list predicate of the same block already covers validity.
pub(crate) fn translate_valid_in<'q>(
    predicate: &'q Predicate,
    _children: Vec<Formula>,
    compiler: &mut FilterCompiler<'q>,
) -> FilterResult<Option<Formula>> {
    let Predicate::PriceValidIn(moment) = predicate else {
        return Err(FilterError::MissingTranslator {
            kind: predicate.kind(),
        });
    };
    require_prices(compiler)?;
    if sibling_price_lists(compiler)?.is_some() {
        return Ok(None);
    }
    let query = PriceQuery {
        currency: sibling_currency(compiler)?,
        ..PriceQuery::default()
    };
    let moment = moment.unwrap_or(compiler.options().now());
    Ok(Some(lookup_prices(compiler, &query, Some(moment))?))
}

/// Records with a price inside the range, honouring the currency, price
/// lists and validity of the same conjunctive block.
pub(crate) fn translate_between<'q>(
    predicate: &'q Predicate,
    _children: Vec<Formula>,
    compiler: &mut FilterCompiler<'q>,
) -> FilterResult<Option<Formula>> {
    let Predicate::PriceBetween(from, to) = predicate else {
        return Err(FilterError::MissingTranslator {
            kind: predicate.kind(),
        });
    };
    require_prices(compiler)?;
    let currency = sibling_currency(compiler)?;
    let moment = sibling_moment(compiler)?;
    let lists: Vec<Option<String>> = match sibling_price_lists(compiler)? {
        Some(lists) => lists.into_iter().map(Some).collect(),
        None => vec![None],
    };

    let mut per_list = Vec::with_capacity(lists.len());
    for price_list in lists {
        let query = PriceQuery {
            price_list,
            currency: currency.clone(),
            amount_from: *from,
            amount_to: *to,
        };
        per_list.push(lookup_prices(compiler, &query, moment)?);
    }
    Ok(Some(join_formulas(per_list)))
}
