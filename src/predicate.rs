//! Typed filtering predicate tree consumed by the compiler.
//!
//! The tree is expected to be parsed and validated already. Containers own
//! their children; the compiler only ever borrows the tree.

use std::{cmp::Ordering, fmt};

use xxhash_rust::xxh3::Xxh3;

use crate::{
    index::Scope,
    value::{AttributeValue, Locale},
};

/// Discriminant of a [`Predicate`], used to key translators and suppression sets.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum PredicateKind {
    FilterBy,
    And,
    Or,
    Not,
    UserFilter,
    EntityPrimaryKeyInSet,
    EntityLocaleEquals,
    EntityScope,
    EntityHaving,
    ReferenceHaving,
    AttributeEquals,
    AttributeLessThan,
    AttributeLessThanEquals,
    AttributeGreaterThan,
    AttributeGreaterThanEquals,
    AttributeBetween,
    AttributeInSet,
    AttributeIs,
    AttributeStartsWith,
    AttributeEndsWith,
    AttributeContains,
    PriceInCurrency,
    PriceInPriceLists,
    PriceValidIn,
    PriceBetween,
    HierarchyWithin,
    HierarchyWithinRoot,
}

impl PredicateKind {
    pub const ALL: [PredicateKind; 27] = [
        PredicateKind::FilterBy,
        PredicateKind::And,
        PredicateKind::Or,
        PredicateKind::Not,
        PredicateKind::UserFilter,
        PredicateKind::EntityPrimaryKeyInSet,
        PredicateKind::EntityLocaleEquals,
        PredicateKind::EntityScope,
        PredicateKind::EntityHaving,
        PredicateKind::ReferenceHaving,
        PredicateKind::AttributeEquals,
        PredicateKind::AttributeLessThan,
        PredicateKind::AttributeLessThanEquals,
        PredicateKind::AttributeGreaterThan,
        PredicateKind::AttributeGreaterThanEquals,
        PredicateKind::AttributeBetween,
        PredicateKind::AttributeInSet,
        PredicateKind::AttributeIs,
        PredicateKind::AttributeStartsWith,
        PredicateKind::AttributeEndsWith,
        PredicateKind::AttributeContains,
        PredicateKind::PriceInCurrency,
        PredicateKind::PriceInPriceLists,
        PredicateKind::PriceValidIn,
        PredicateKind::PriceBetween,
        PredicateKind::HierarchyWithin,
        PredicateKind::HierarchyWithinRoot,
    ];

    /// Containers whose children combine by conjunction.
    pub fn is_conjunctive(self) -> bool {
        matches!(
            self,
            PredicateKind::FilterBy | PredicateKind::And | PredicateKind::UserFilter
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            PredicateKind::FilterBy => "filterBy",
            PredicateKind::And => "and",
            PredicateKind::Or => "or",
            PredicateKind::Not => "not",
            PredicateKind::UserFilter => "userFilter",
            PredicateKind::EntityPrimaryKeyInSet => "entityPrimaryKeyInSet",
            PredicateKind::EntityLocaleEquals => "entityLocaleEquals",
            PredicateKind::EntityScope => "entityScope",
            PredicateKind::EntityHaving => "entityHaving",
            PredicateKind::ReferenceHaving => "referenceHaving",
            PredicateKind::AttributeEquals => "attributeEquals",
            PredicateKind::AttributeLessThan => "attributeLessThan",
            PredicateKind::AttributeLessThanEquals => "attributeLessThanEquals",
            PredicateKind::AttributeGreaterThan => "attributeGreaterThan",
            PredicateKind::AttributeGreaterThanEquals => "attributeGreaterThanEquals",
            PredicateKind::AttributeBetween => "attributeBetween",
            PredicateKind::AttributeInSet => "attributeInSet",
            PredicateKind::AttributeIs => "attributeIs",
            PredicateKind::AttributeStartsWith => "attributeStartsWith",
            PredicateKind::AttributeEndsWith => "attributeEndsWith",
            PredicateKind::AttributeContains => "attributeContains",
            PredicateKind::PriceInCurrency => "priceInCurrency",
            PredicateKind::PriceInPriceLists => "priceInPriceLists",
            PredicateKind::PriceValidIn => "priceValidIn",
            PredicateKind::PriceBetween => "priceBetween",
            PredicateKind::HierarchyWithin => "hierarchyWithin",
            PredicateKind::HierarchyWithinRoot => "hierarchyWithinRoot",
        }
    }
}

impl fmt::Display for PredicateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Nullness {
    Null,
    NotNull,
}

/// Condition applied to a single attribute.
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeOp {
    Equals(AttributeValue),
    LessThan(AttributeValue),
    LessThanEquals(AttributeValue),
    GreaterThan(AttributeValue),
    GreaterThanEquals(AttributeValue),
    /// Inclusive range, either bound may be open.
    Between(Option<AttributeValue>, Option<AttributeValue>),
    InSet(Vec<AttributeValue>),
    Is(Nullness),
    StartsWith(String),
    EndsWith(String),
    Contains(String),
}

impl AttributeOp {
    pub fn kind(&self) -> PredicateKind {
        match self {
            AttributeOp::Equals(_) => PredicateKind::AttributeEquals,
            AttributeOp::LessThan(_) => PredicateKind::AttributeLessThan,
            AttributeOp::LessThanEquals(_) => PredicateKind::AttributeLessThanEquals,
            AttributeOp::GreaterThan(_) => PredicateKind::AttributeGreaterThan,
            AttributeOp::GreaterThanEquals(_) => PredicateKind::AttributeGreaterThanEquals,
            AttributeOp::Between(_, _) => PredicateKind::AttributeBetween,
            AttributeOp::InSet(_) => PredicateKind::AttributeInSet,
            AttributeOp::Is(_) => PredicateKind::AttributeIs,
            AttributeOp::StartsWith(_) => PredicateKind::AttributeStartsWith,
            AttributeOp::EndsWith(_) => PredicateKind::AttributeEndsWith,
            AttributeOp::Contains(_) => PredicateKind::AttributeContains,
        }
    }

    /// Literals carried by the operation, used for type checking.
    pub fn literals(&self) -> Vec<&AttributeValue> {
        match self {
            AttributeOp::Equals(v)
            | AttributeOp::LessThan(v)
            | AttributeOp::LessThanEquals(v)
            | AttributeOp::GreaterThan(v)
            | AttributeOp::GreaterThanEquals(v) => vec![v],
            AttributeOp::Between(from, to) => from.iter().chain(to.iter()).collect(),
            AttributeOp::InSet(values) => values.iter().collect(),
            AttributeOp::Is(_)
            | AttributeOp::StartsWith(_)
            | AttributeOp::EndsWith(_)
            | AttributeOp::Contains(_) => Vec::new(),
        }
    }

    /// Evaluate the operation against the values an attribute holds on one record.
    ///
    /// Multi-valued attributes (e.g. attributes read through several references)
    /// match when any of their values does.
    pub fn matches(&self, values: &[&AttributeValue]) -> bool {
        match self {
            AttributeOp::Is(Nullness::Null) => values.is_empty(),
            AttributeOp::Is(Nullness::NotNull) => !values.is_empty(),
            _ => values.iter().any(|value| self.matches_value(value)),
        }
    }

    fn matches_value(&self, value: &AttributeValue) -> bool {
        match self {
            AttributeOp::Equals(v) => value.compare(v) == Some(Ordering::Equal),
            AttributeOp::LessThan(v) => value.compare(v) == Some(Ordering::Less),
            AttributeOp::LessThanEquals(v) => {
                matches!(value.compare(v), Some(Ordering::Less | Ordering::Equal))
            }
            AttributeOp::GreaterThan(v) => value.compare(v) == Some(Ordering::Greater),
            AttributeOp::GreaterThanEquals(v) => {
                matches!(value.compare(v), Some(Ordering::Greater | Ordering::Equal))
            }
            AttributeOp::Between(from, to) => {
                let above = from.as_ref().is_none_or(|from| {
                    matches!(value.compare(from), Some(Ordering::Greater | Ordering::Equal))
                });
                let below = to.as_ref().is_none_or(|to| {
                    matches!(value.compare(to), Some(Ordering::Less | Ordering::Equal))
                });
                above && below
            }
            AttributeOp::InSet(set) => set
                .iter()
                .any(|v| value.compare(v) == Some(Ordering::Equal)),
            AttributeOp::Is(Nullness::NotNull) => true,
            AttributeOp::Is(Nullness::Null) => false,
            AttributeOp::StartsWith(prefix) => {
                value.as_str().is_some_and(|s| s.starts_with(prefix.as_str()))
            }
            AttributeOp::EndsWith(suffix) => {
                value.as_str().is_some_and(|s| s.ends_with(suffix.as_str()))
            }
            AttributeOp::Contains(part) => value.as_str().is_some_and(|s| s.contains(part.as_str())),
        }
    }

    pub(crate) fn hash_into(&self, hasher: &mut Xxh3) {
        hasher.update(self.kind().name().as_bytes());
        match self {
            AttributeOp::Between(from, to) => {
                for bound in [from, to] {
                    match bound {
                        Some(value) => value.hash_into(hasher),
                        None => hasher.update(&[0xff]),
                    }
                }
            }
            AttributeOp::Is(nullness) => hasher.update(&[*nullness as u8]),
            AttributeOp::StartsWith(s) | AttributeOp::EndsWith(s) | AttributeOp::Contains(s) => {
                hasher.update(s.as_bytes())
            }
            other => {
                for literal in other.literals() {
                    literal.hash_into(hasher);
                }
            }
        }
    }
}

impl fmt::Display for AttributeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeOp::Equals(v) => write!(f, "= {}", v),
            AttributeOp::LessThan(v) => write!(f, "< {}", v),
            AttributeOp::LessThanEquals(v) => write!(f, "<= {}", v),
            AttributeOp::GreaterThan(v) => write!(f, "> {}", v),
            AttributeOp::GreaterThanEquals(v) => write!(f, ">= {}", v),
            AttributeOp::Between(from, to) => {
                write!(f, "BETWEEN ")?;
                match from {
                    Some(v) => write!(f, "{}", v)?,
                    None => write!(f, "*")?,
                }
                write!(f, " AND ")?;
                match to {
                    Some(v) => write!(f, "{}", v),
                    None => write!(f, "*"),
                }
            }
            AttributeOp::InSet(values) => {
                write!(f, "IN (")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, ")")
            }
            AttributeOp::Is(Nullness::Null) => write!(f, "IS NULL"),
            AttributeOp::Is(Nullness::NotNull) => write!(f, "IS NOT NULL"),
            AttributeOp::StartsWith(s) => write!(f, "LIKE '{}%'", s),
            AttributeOp::EndsWith(s) => write!(f, "LIKE '%{}'", s),
            AttributeOp::Contains(s) => write!(f, "LIKE '%{}%'", s),
        }
    }
}

/// Attribute name paired with the condition applied to it.
#[derive(Clone, Debug, PartialEq)]
pub struct AttributeFilter {
    pub attribute: String,
    pub op: AttributeOp,
}

impl fmt::Display for AttributeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.attribute, self.op)
    }
}

/// A node of the filtering predicate tree.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum Predicate {
    /// Root of the filter; conjunction of its children.
    FilterBy(Vec<Predicate>),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    /// Conjunction of user-controlled constraints (e.g. facet selections).
    UserFilter(Vec<Predicate>),
    EntityPrimaryKeyInSet(Vec<u32>),
    EntityLocaleEquals(Locale),
    EntityScope(Vec<Scope>),
    /// Constraints on the entity a reference points to.
    EntityHaving(Vec<Predicate>),
    ReferenceHaving {
        reference: String,
        children: Vec<Predicate>,
    },
    Attribute(AttributeFilter),
    PriceInCurrency(String),
    PriceInPriceLists(Vec<String>),
    /// Moment in microseconds; `None` means the compilation's `now`.
    PriceValidIn(Option<i64>),
    /// Inclusive amount range in minor currency units.
    PriceBetween(Option<i64>, Option<i64>),
    HierarchyWithin {
        parent: u32,
        direct: bool,
        excluding: Vec<u32>,
    },
    HierarchyWithinRoot {
        direct: bool,
        excluding: Vec<u32>,
    },
}

impl Predicate {
    pub fn kind(&self) -> PredicateKind {
        match self {
            Predicate::FilterBy(_) => PredicateKind::FilterBy,
            Predicate::And(_) => PredicateKind::And,
            Predicate::Or(_) => PredicateKind::Or,
            Predicate::Not(_) => PredicateKind::Not,
            Predicate::UserFilter(_) => PredicateKind::UserFilter,
            Predicate::EntityPrimaryKeyInSet(_) => PredicateKind::EntityPrimaryKeyInSet,
            Predicate::EntityLocaleEquals(_) => PredicateKind::EntityLocaleEquals,
            Predicate::EntityScope(_) => PredicateKind::EntityScope,
            Predicate::EntityHaving(_) => PredicateKind::EntityHaving,
            Predicate::ReferenceHaving { .. } => PredicateKind::ReferenceHaving,
            Predicate::Attribute(filter) => filter.op.kind(),
            Predicate::PriceInCurrency(_) => PredicateKind::PriceInCurrency,
            Predicate::PriceInPriceLists(_) => PredicateKind::PriceInPriceLists,
            Predicate::PriceValidIn(_) => PredicateKind::PriceValidIn,
            Predicate::PriceBetween(_, _) => PredicateKind::PriceBetween,
            Predicate::HierarchyWithin { .. } => PredicateKind::HierarchyWithin,
            Predicate::HierarchyWithinRoot { .. } => PredicateKind::HierarchyWithinRoot,
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(
            self,
            Predicate::FilterBy(_)
                | Predicate::And(_)
                | Predicate::Or(_)
                | Predicate::Not(_)
                | Predicate::UserFilter(_)
                | Predicate::EntityHaving(_)
                | Predicate::ReferenceHaving { .. }
        )
    }

    /// Children of a container, empty for leaves.
    pub fn children(&self) -> &[Predicate] {
        match self {
            Predicate::FilterBy(children)
            | Predicate::And(children)
            | Predicate::Or(children)
            | Predicate::UserFilter(children)
            | Predicate::EntityHaving(children)
            | Predicate::ReferenceHaving { children, .. } => children,
            Predicate::Not(inner) => std::slice::from_ref(inner.as_ref()),
            _ => &[],
        }
    }

    pub fn filter_by(children: Vec<Predicate>) -> Self {
        Predicate::FilterBy(children)
    }

    pub fn and(children: Vec<Predicate>) -> Self {
        Predicate::And(children)
    }

    pub fn or(children: Vec<Predicate>) -> Self {
        Predicate::Or(children)
    }

    pub fn not(inner: Predicate) -> Self {
        Predicate::Not(Box::new(inner))
    }

    pub fn user_filter(children: Vec<Predicate>) -> Self {
        Predicate::UserFilter(children)
    }

    pub fn attribute(attribute: impl Into<String>, op: AttributeOp) -> Self {
        Predicate::Attribute(AttributeFilter {
            attribute: attribute.into(),
            op,
        })
    }

    pub fn attribute_equals(attribute: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self::attribute(attribute, AttributeOp::Equals(value.into()))
    }

    pub fn attribute_less_than(
        attribute: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        Self::attribute(attribute, AttributeOp::LessThan(value.into()))
    }

    pub fn attribute_greater_than(
        attribute: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        Self::attribute(attribute, AttributeOp::GreaterThan(value.into()))
    }

    pub fn attribute_between(
        attribute: impl Into<String>,
        from: Option<AttributeValue>,
        to: Option<AttributeValue>,
    ) -> Self {
        Self::attribute(attribute, AttributeOp::Between(from, to))
    }

    pub fn attribute_in_set(attribute: impl Into<String>, values: Vec<AttributeValue>) -> Self {
        Self::attribute(attribute, AttributeOp::InSet(values))
    }

    pub fn attribute_is_null(attribute: impl Into<String>) -> Self {
        Self::attribute(attribute, AttributeOp::Is(Nullness::Null))
    }

    pub fn attribute_is_not_null(attribute: impl Into<String>) -> Self {
        Self::attribute(attribute, AttributeOp::Is(Nullness::NotNull))
    }

    pub fn attribute_starts_with(attribute: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self::attribute(attribute, AttributeOp::StartsWith(prefix.into()))
    }

    pub fn reference_having(reference: impl Into<String>, children: Vec<Predicate>) -> Self {
        Predicate::ReferenceHaving {
            reference: reference.into(),
            children,
        }
    }

    pub fn entity_having(children: Vec<Predicate>) -> Self {
        Predicate::EntityHaving(children)
    }

    pub fn locale_equals(locale: impl Into<Locale>) -> Self {
        Predicate::EntityLocaleEquals(locale.into())
    }

    pub fn price_in_price_lists<S: Into<String>>(lists: impl IntoIterator<Item = S>) -> Self {
        Predicate::PriceInPriceLists(lists.into_iter().map(Into::into).collect())
    }

    pub fn price_in_currency(currency: impl Into<String>) -> Self {
        Predicate::PriceInCurrency(currency.into())
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Attribute(filter) => write!(f, "{}", filter),
            Predicate::EntityPrimaryKeyInSet(ids) => write!(f, "entityPrimaryKeyInSet({:?})", ids),
            Predicate::EntityLocaleEquals(locale) => write!(f, "entityLocaleEquals({})", locale),
            Predicate::EntityScope(scopes) => write!(f, "entityScope({:?})", scopes),
            Predicate::PriceInCurrency(currency) => write!(f, "priceInCurrency({})", currency),
            Predicate::PriceInPriceLists(lists) => write!(f, "priceInPriceLists({:?})", lists),
            Predicate::PriceValidIn(moment) => match moment {
                Some(moment) => write!(f, "priceValidIn({})", moment),
                None => write!(f, "priceValidInNow()"),
            },
            Predicate::PriceBetween(from, to) => write!(f, "priceBetween({:?}, {:?})", from, to),
            Predicate::HierarchyWithin { parent, direct, .. } => {
                write!(f, "hierarchyWithin({}, direct={})", parent, direct)
            }
            Predicate::HierarchyWithinRoot { direct, .. } => {
                write!(f, "hierarchyWithinRoot(direct={})", direct)
            }
            container => {
                match container {
                    Predicate::ReferenceHaving { reference, .. } => {
                        write!(f, "referenceHaving({}", reference)?;
                        if !container.children().is_empty() {
                            write!(f, ", ")?;
                        }
                    }
                    other => write!(f, "{}(", other.kind())?,
                }
                for (i, child) in container.children().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", child)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_attribute_operation() {
        assert_eq!(
            Predicate::attribute_equals("color", "red").kind(),
            PredicateKind::AttributeEquals
        );
        assert_eq!(
            Predicate::attribute_is_null("color").kind(),
            PredicateKind::AttributeIs
        );
        assert!(!Predicate::attribute_equals("color", "red").is_container());
        assert!(Predicate::not(Predicate::attribute_equals("color", "red")).is_container());
    }

    #[test]
    fn not_exposes_single_child() {
        let inner = Predicate::attribute_equals("color", "red");
        let not = Predicate::not(inner.clone());
        assert_eq!(not.children(), &[inner]);
    }

    #[test]
    fn operation_matching() {
        let red = AttributeValue::from("red");
        let five = AttributeValue::Int64(5);
        assert!(AttributeOp::Equals("red".into()).matches(&[&red]));
        assert!(!AttributeOp::Equals("blue".into()).matches(&[&red]));
        assert!(AttributeOp::Between(Some(1.into()), Some(5.into())).matches(&[&five]));
        assert!(AttributeOp::Between(None, Some(4.into())).matches(&[&five]) == false);
        assert!(AttributeOp::StartsWith("re".into()).matches(&[&red]));
        assert!(AttributeOp::Contains("e".into()).matches(&[&red]));
        assert!(AttributeOp::Is(Nullness::Null).matches(&[]));
        assert!(!AttributeOp::Is(Nullness::NotNull).matches(&[]));
        assert!(AttributeOp::InSet(vec![1.into(), 5.into()]).matches(&[&five]));
    }

    #[test]
    fn display_formatting() {
        let filter = Predicate::filter_by(vec![
            Predicate::attribute_equals("color", "red"),
            Predicate::or(vec![
                Predicate::attribute_greater_than("age", 18i64),
                Predicate::attribute_is_null("age"),
            ]),
        ]);
        assert_eq!(
            filter.to_string(),
            "filterBy(color = 'red', or(age > 18, age IS NULL))"
        );
        assert_eq!(
            Predicate::reference_having("brand", vec![]).to_string(),
            "referenceHaving(brand)"
        );
    }
}
