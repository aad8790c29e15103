mod common;

use arrow_schema::DataType;
use common::{catalog, matching, plan, plan_with};
use sift::{
    AttributeTrait, AttributeValue, CompileOptions, FilterError, FilterPlanner, FormulaKind,
    Predicate, Scope,
};

// ============================================================================
// Attribute Constraints
// ============================================================================

#[test]
fn attribute_comparisons() {
    let catalog = catalog();
    let cases = [
        (Predicate::attribute_equals("color", "red"), vec![1, 3]),
        (Predicate::attribute_less_than("size", 3i64), vec![1, 2]),
        (Predicate::attribute_greater_than("size", 1i64), vec![2, 3]),
        (
            Predicate::attribute_between("size", Some(2i64.into()), None),
            vec![2, 3],
        ),
        (
            Predicate::attribute_in_set(
                "color",
                vec![AttributeValue::from("red"), AttributeValue::from("green")],
            ),
            vec![1, 3, 4],
        ),
        (Predicate::attribute_starts_with("code", "P"), vec![1, 2, 3, 4]),
        (Predicate::attribute_equals("code", "P2"), vec![2]),
    ];
    for (predicate, expected) in cases {
        let filter = Predicate::filter_by(vec![predicate.clone()]);
        assert_eq!(matching(&catalog, &filter), expected, "{predicate}");
    }
}

#[test]
fn null_checks_use_the_superset() {
    let catalog = catalog();
    let is_null = Predicate::filter_by(vec![Predicate::attribute_is_null("size")]);
    assert_eq!(matching(&catalog, &is_null), vec![4]);

    let not_null = Predicate::filter_by(vec![Predicate::attribute_is_not_null("size")]);
    assert_eq!(matching(&catalog, &not_null), vec![1, 2, 3]);
}

#[test]
fn negation_and_disjunction() {
    let catalog = catalog();
    let not = Predicate::filter_by(vec![Predicate::not(Predicate::attribute_equals(
        "color", "red",
    ))]);
    assert_eq!(matching(&catalog, &not), vec![2, 4]);

    let or = Predicate::filter_by(vec![Predicate::or(vec![
        Predicate::attribute_equals("color", "blue"),
        Predicate::attribute_equals("size", 3i64),
    ])]);
    assert_eq!(matching(&catalog, &or), vec![2, 3]);

    let nested = Predicate::filter_by(vec![
        Predicate::attribute_equals("color", "red"),
        Predicate::not(Predicate::or(vec![Predicate::attribute_equals("size", 1i64)])),
    ]);
    assert_eq!(matching(&catalog, &nested), vec![3]);
}

#[test]
fn empty_filter_matches_everything() {
    let catalog = catalog();
    assert_eq!(matching(&catalog, &Predicate::filter_by(vec![])), vec![1, 2, 3, 4]);
    assert_eq!(
        matching(&catalog, &Predicate::filter_by(vec![Predicate::user_filter(vec![])])),
        vec![1, 2, 3, 4]
    );
}

#[test]
fn user_filter_is_conjunctive() {
    let catalog = catalog();
    let filter = Predicate::filter_by(vec![Predicate::user_filter(vec![
        Predicate::attribute_equals("color", "red"),
        Predicate::attribute_greater_than("size", 1i64),
    ])]);
    let compiled = plan(&catalog, &filter).unwrap();
    assert!(matches!(compiled.formula().kind(), FormulaKind::UserFilterWrapper));
    assert_eq!(compiled.compute().iter().collect::<Vec<_>>(), vec![3]);
}

#[test]
fn attribute_errors() {
    let catalog = catalog();
    let compile = |predicate: Predicate| plan(&catalog, &Predicate::filter_by(vec![predicate]));

    assert_eq!(
        compile(Predicate::attribute_equals("weight", 1i64)).unwrap_err(),
        FilterError::AttributeNotFound {
            attribute: "weight".to_string(),
            schema: "product".to_string(),
        }
    );
    assert!(matches!(
        compile(Predicate::attribute_equals("note", "x")).unwrap_err(),
        FilterError::MissingAttributeTrait {
            required: AttributeTrait::Filterable,
            ..
        }
    ));
    assert_eq!(
        compile(Predicate::attribute_equals("size", "big")).unwrap_err(),
        FilterError::TypeMismatch {
            attribute: "size".to_string(),
            expected: DataType::Int64,
            found: DataType::Utf8,
        }
    );
    assert!(matches!(
        compile(Predicate::attribute_starts_with("size", "1")).unwrap_err(),
        FilterError::TypeMismatch { .. }
    ));
    assert!(!compile(Predicate::attribute_equals("weight", 1i64))
        .unwrap_err()
        .is_fatal());
}

// ============================================================================
// Entity Constraints
// ============================================================================

#[test]
fn primary_keys_are_limited_to_indexed_records() {
    let catalog = catalog();
    let filter = Predicate::filter_by(vec![Predicate::EntityPrimaryKeyInSet(vec![2, 3, 9])]);
    assert_eq!(matching(&catalog, &filter), vec![2, 3]);
}

#[test]
fn localized_attributes_need_a_locale() {
    let catalog = catalog();
    let name = Predicate::attribute_equals("name", "Bota");

    let err = plan(&catalog, &Predicate::filter_by(vec![name.clone()])).unwrap_err();
    assert_eq!(
        err,
        FilterError::LocaleRequired {
            attribute: "name".to_string()
        }
    );

    let declared = Predicate::filter_by(vec![Predicate::locale_equals("cs"), name]);
    assert_eq!(matching(&catalog, &declared), vec![1]);

    let from_options = plan_with(
        &catalog,
        &Predicate::filter_by(vec![Predicate::attribute_equals("name", "Hat")]),
        CompileOptions::builder().locale("en").build(),
    )
    .unwrap();
    assert_eq!(from_options.compute().iter().collect::<Vec<_>>(), vec![2]);
}

#[test]
fn locale_restricts_records() {
    let catalog = catalog();
    let filter = Predicate::filter_by(vec![Predicate::locale_equals("en")]);
    assert_eq!(matching(&catalog, &filter), vec![1, 2, 4]);
}

#[test]
fn entity_scope_narrows_required_scopes() {
    let catalog = catalog();
    let both = CompileOptions::builder()
        .required_scopes(vec![Scope::Live, Scope::Archived])
        .build();
    let red = Predicate::attribute_equals("color", "red");

    let everywhere = plan_with(&catalog, &Predicate::filter_by(vec![red.clone()]), both.clone())
        .unwrap();
    assert_eq!(everywhere.compute().iter().collect::<Vec<_>>(), vec![1, 3, 5]);

    let archived = Predicate::filter_by(vec![
        Predicate::EntityScope(vec![Scope::Archived]),
        red.clone(),
    ]);
    let compiled = plan_with(&catalog, &archived, both).unwrap();
    assert_eq!(compiled.compute().iter().collect::<Vec<_>>(), vec![5]);

    // live only by default, so an archived scope declaration leaves nothing
    let compiled = plan(&catalog, &archived).unwrap();
    assert!(compiled.compute().is_empty());
}

// ============================================================================
// Hierarchy Constraints
// ============================================================================

#[test]
fn hierarchy_within() {
    let catalog = catalog();
    let planner = FilterPlanner::try_new(&catalog, "category").unwrap();
    let ids = |predicate: Predicate| -> Vec<u32> {
        planner
            .plan_default(&Predicate::filter_by(vec![predicate]))
            .unwrap()
            .compute()
            .iter()
            .collect()
    };

    assert_eq!(
        ids(Predicate::HierarchyWithin {
            parent: 1,
            direct: false,
            excluding: vec![2],
        }),
        vec![1, 3]
    );
    assert_eq!(
        ids(Predicate::HierarchyWithinRoot {
            direct: true,
            excluding: vec![],
        }),
        vec![1, 5]
    );
}

#[test]
fn hierarchy_on_flat_entity() {
    let catalog = catalog();
    let filter = Predicate::filter_by(vec![Predicate::HierarchyWithinRoot {
        direct: false,
        excluding: vec![],
    }]);
    assert_eq!(
        plan(&catalog, &filter).unwrap_err(),
        FilterError::NotHierarchical {
            entity_type: "product".to_string()
        }
    );
}

// ============================================================================
// Price Constraints
// ============================================================================

#[test]
fn price_lists_pick_up_sibling_currency() {
    let catalog = catalog();
    let basic = Predicate::filter_by(vec![Predicate::price_in_price_lists(["basic"])]);
    assert_eq!(matching(&catalog, &basic), vec![1, 2, 3]);

    let in_eur = Predicate::filter_by(vec![
        Predicate::price_in_price_lists(["basic"]),
        Predicate::price_in_currency("EUR"),
    ]);
    assert_eq!(matching(&catalog, &in_eur), vec![1, 2]);

    let currency_only = Predicate::filter_by(vec![Predicate::price_in_currency("CZK")]);
    assert_eq!(matching(&catalog, &currency_only), vec![3]);
}

#[test]
fn price_validity_is_a_leaf() {
    let catalog = catalog();
    let at = |moment: i64| {
        Predicate::filter_by(vec![
            Predicate::price_in_price_lists(["vip"]),
            Predicate::PriceValidIn(Some(moment)),
        ])
    };
    let compiled = plan(&catalog, &at(15)).unwrap();
    assert!(matches!(
        compiled.formula().kind(),
        FormulaKind::PriceValidityWindow { moment: 15, .. }
    ));
    assert_eq!(compiled.compute().iter().collect::<Vec<_>>(), vec![1]);
    assert!(plan(&catalog, &at(25)).unwrap().compute().is_empty());

    let now = plan_with(
        &catalog,
        &Predicate::filter_by(vec![Predicate::PriceValidIn(None)]),
        CompileOptions::builder().now(12).build(),
    )
    .unwrap();
    assert_eq!(now.compute().iter().collect::<Vec<_>>(), vec![1, 2, 3]);
}

#[test]
fn price_between() {
    let catalog = catalog();
    let any_list = Predicate::filter_by(vec![Predicate::PriceBetween(Some(60), Some(150))]);
    assert_eq!(matching(&catalog, &any_list), vec![1]);

    let basic_eur = Predicate::filter_by(vec![
        Predicate::price_in_price_lists(["basic"]),
        Predicate::price_in_currency("EUR"),
        Predicate::PriceBetween(None, Some(60)),
    ]);
    assert_eq!(matching(&catalog, &basic_eur), vec![2]);
}

#[test]
fn price_between_honours_sibling_validity() {
    let catalog = catalog();
    let at = |moment: i64| {
        Predicate::filter_by(vec![
            Predicate::PriceValidIn(Some(moment)),
            Predicate::PriceBetween(Some(70), Some(90)),
        ])
    };
    // only the vip price of 80 is in range, and it is valid from 10 to 20
    assert_eq!(matching(&catalog, &at(15)), vec![1]);
    assert!(matching(&catalog, &at(25)).is_empty());
}

#[test]
fn prices_require_a_priced_entity() {
    let catalog = catalog();
    let planner = FilterPlanner::try_new(&catalog, "brand").unwrap();
    let err = planner
        .plan_default(&Predicate::filter_by(vec![Predicate::price_in_currency("EUR")]))
        .unwrap_err();
    assert_eq!(
        err,
        FilterError::PricesNotEnabled {
            entity_type: "brand".to_string()
        }
    );
}
