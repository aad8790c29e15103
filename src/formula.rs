//! Immutable bitmap-algebra tree produced by the compiler.
//!
//! A [`Formula`] is a cheap handle to a shared node. Nodes never change their
//! children after construction, so subtrees may be referenced from several
//! parents once the deduplicator has run. The only interior mutability is the
//! memoized result of [`Formula::compute`].

use std::{
    collections::HashSet,
    fmt,
    sync::{Arc, LazyLock, OnceLock},
};

use roaring::RoaringBitmap;
use xxhash_rust::xxh3::Xxh3;

use crate::{
    index::{AttributeValueAccessor, PrefetchedRecords, PriceQuery, RecordSetIndex, Scope},
    predicate::AttributeFilter,
    value::Locale,
};

pub(crate) mod dedup;
pub(crate) mod optimize;

pub use dedup::{Deduplicator, deduplicate};
pub use optimize::optimize;

/// Per-element cost of combining child bitmaps.
const COMBINE_COST: u64 = 1;
/// Per-referenced-record cost of translating to owning records.
const TRANSLATION_COST: u64 = 8;
/// Per-record cost of evaluating price validity at compute time.
const VALIDITY_COST: u64 = 4;

static EMPTY: LazyLock<Formula> = LazyLock::new(|| Formula::new(FormulaKind::Empty, Vec::new()));

/// Everything a [`FormulaKind::SelectionWrapper`] needs to evaluate its
/// attribute filter directly on records instead of through the index.
#[derive(Clone)]
pub struct SelectionAlternative {
    pub filter: AttributeFilter,
    pub locale: Option<Locale>,
    pub values: Arc<dyn AttributeValueAccessor>,
    pub prefetched: Option<PrefetchedRecords>,
}

impl SelectionAlternative {
    fn evaluate(&self, records: &PrefetchedRecords) -> RoaringBitmap {
        records
            .iter()
            .filter(|record| {
                let values = self
                    .values
                    .values(record.as_ref(), &self.filter.attribute, self.locale.as_ref());
                self.filter.op.matches(&values)
            })
            .map(|record| record.primary_key())
            .collect()
    }
}

impl fmt::Debug for SelectionAlternative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectionAlternative")
            .field("filter", &self.filter)
            .field("locale", &self.locale)
            .field("prefetched", &self.prefetched.as_ref().map(|r| r.len()))
            .finish()
    }
}

/// Kind of a formula node together with its leaf payload.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum FormulaKind {
    /// Matches nothing. Absorbing under conjunction, neutral under disjunction.
    Empty,
    Constant(Arc<RoaringBitmap>),
    And,
    Or,
    /// `children[1] \ children[0]`: the negated formula subtracted from the superset.
    Not,
    /// Result of one attribute predicate; conjunction of its children.
    AttributePredicate(AttributeFilter),
    /// Block of user-controlled constraints; conjunction of its children.
    UserFilterWrapper,
    /// Attribute predicate tagged for evaluation over prefetched records.
    SelectionWrapper(SelectionAlternative),
    /// Records of one lifecycle scope; conjunction of its children.
    ScopeContainer(Scope),
    /// Maps referenced-entity identifiers to the records owning the reference.
    ReferenceRecordTranslation {
        reference: String,
        index: Arc<dyn RecordSetIndex>,
    },
    /// Prices valid at a moment, resolved by the index when computed.
    PriceValidityWindow {
        index: Arc<dyn RecordSetIndex>,
        query: PriceQuery,
        moment: i64,
    },
}

impl FormulaKind {
    fn tag(&self) -> u8 {
        match self {
            FormulaKind::Empty => 0,
            FormulaKind::Constant(_) => 1,
            FormulaKind::And => 2,
            FormulaKind::Or => 3,
            FormulaKind::Not => 4,
            FormulaKind::AttributePredicate(_) => 5,
            FormulaKind::UserFilterWrapper => 6,
            FormulaKind::SelectionWrapper(_) => 7,
            FormulaKind::ScopeContainer(_) => 8,
            FormulaKind::ReferenceRecordTranslation { .. } => 9,
            FormulaKind::PriceValidityWindow { .. } => 10,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(
            self,
            FormulaKind::Empty | FormulaKind::Constant(_) | FormulaKind::PriceValidityWindow { .. }
        )
    }

    /// Containers that are empty as soon as one of their children is.
    pub fn is_conjunctive(&self) -> bool {
        !self.is_leaf() && !matches!(self, FormulaKind::Or | FormulaKind::Not)
    }

    fn hash_payload(&self, hasher: &mut Xxh3) {
        match self {
            FormulaKind::Constant(bitmap) => {
                hasher.update(&bitmap.len().to_le_bytes());
                for bound in [bitmap.min(), bitmap.max()] {
                    hasher.update(&bound.unwrap_or(0).to_le_bytes());
                }
            }
            FormulaKind::AttributePredicate(filter) => {
                hasher.update(filter.attribute.as_bytes());
                filter.op.hash_into(hasher);
            }
            FormulaKind::SelectionWrapper(alternative) => {
                hasher.update(alternative.filter.attribute.as_bytes());
                alternative.filter.op.hash_into(hasher);
            }
            FormulaKind::ScopeContainer(scope) => hasher.update(&[*scope as u8]),
            FormulaKind::ReferenceRecordTranslation { reference, index } => {
                hasher.update(reference.as_bytes());
                index.key().hash_into(hasher);
                hasher.update(&index.version().to_le_bytes());
            }
            FormulaKind::PriceValidityWindow {
                index,
                query,
                moment,
            } => {
                index.key().hash_into(hasher);
                hasher.update(&index.version().to_le_bytes());
                query.hash_into(hasher);
                hasher.update(&moment.to_le_bytes());
            }
            FormulaKind::Empty
            | FormulaKind::And
            | FormulaKind::Or
            | FormulaKind::Not
            | FormulaKind::UserFilterWrapper => {}
        }
    }

    /// Payload equality; children are compared separately.
    fn payload_eq(&self, other: &FormulaKind) -> bool {
        match (self, other) {
            (FormulaKind::Constant(a), FormulaKind::Constant(b)) => Arc::ptr_eq(a, b) || a == b,
            (FormulaKind::AttributePredicate(a), FormulaKind::AttributePredicate(b)) => a == b,
            (FormulaKind::SelectionWrapper(a), FormulaKind::SelectionWrapper(b)) => {
                a.filter == b.filter
                    && a.locale == b.locale
                    && std::ptr::addr_eq(Arc::as_ptr(&a.values), Arc::as_ptr(&b.values))
                    && match (&a.prefetched, &b.prefetched) {
                        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                        (None, None) => true,
                        _ => false,
                    }
            }
            (FormulaKind::ScopeContainer(a), FormulaKind::ScopeContainer(b)) => a == b,
            (
                FormulaKind::ReferenceRecordTranslation {
                    reference: ra,
                    index: ia,
                },
                FormulaKind::ReferenceRecordTranslation {
                    reference: rb,
                    index: ib,
                },
            ) => ra == rb && same_index(ia, ib),
            (
                FormulaKind::PriceValidityWindow {
                    index: ia,
                    query: qa,
                    moment: ma,
                },
                FormulaKind::PriceValidityWindow {
                    index: ib,
                    query: qb,
                    moment: mb,
                },
            ) => same_index(ia, ib) && qa == qb && ma == mb,
            (a, b) => {
                a.tag() == b.tag()
                    && matches!(
                        a,
                        FormulaKind::Empty
                            | FormulaKind::And
                            | FormulaKind::Or
                            | FormulaKind::Not
                            | FormulaKind::UserFilterWrapper
                    )
            }
        }
    }

    fn name(&self) -> &'static str {
        match self {
            FormulaKind::Empty => "empty",
            FormulaKind::Constant(_) => "const",
            FormulaKind::And => "and",
            FormulaKind::Or => "or",
            FormulaKind::Not => "not",
            FormulaKind::AttributePredicate(_) => "attr",
            FormulaKind::UserFilterWrapper => "user",
            FormulaKind::SelectionWrapper(_) => "selection",
            FormulaKind::ScopeContainer(_) => "scope",
            FormulaKind::ReferenceRecordTranslation { .. } => "ref",
            FormulaKind::PriceValidityWindow { .. } => "validity",
        }
    }
}

fn same_index(a: &Arc<dyn RecordSetIndex>, b: &Arc<dyn RecordSetIndex>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
        || (a.key() == b.key() && a.version() == b.version())
}

pub(crate) struct FormulaNode {
    kind: FormulaKind,
    children: Vec<Formula>,
    hash: u64,
    cost: u64,
    cardinality: u64,
    memo: OnceLock<RoaringBitmap>,
}

/// Shared handle to an immutable formula node.
#[derive(Clone)]
pub struct Formula(Arc<FormulaNode>);

impl Formula {
    pub(crate) fn new(kind: FormulaKind, children: Vec<Formula>) -> Self {
        let mut hasher = Xxh3::new();
        hasher.update(&[kind.tag()]);
        kind.hash_payload(&mut hasher);
        hasher.update(&(children.len() as u64).to_le_bytes());
        for child in &children {
            hasher.update(&child.structural_hash().to_le_bytes());
        }
        let (cost, cardinality) = estimate(&kind, &children);
        Formula(Arc::new(FormulaNode {
            kind,
            children,
            hash: hasher.digest(),
            cost,
            cardinality,
            memo: OnceLock::new(),
        }))
    }

    /// The shared empty formula.
    pub fn empty() -> Self {
        EMPTY.clone()
    }

    pub fn constant(bitmap: RoaringBitmap) -> Self {
        Self::constant_shared(Arc::new(bitmap))
    }

    pub fn constant_shared(bitmap: Arc<RoaringBitmap>) -> Self {
        Formula::new(FormulaKind::Constant(bitmap), Vec::new())
    }

    pub fn and(children: Vec<Formula>) -> Self {
        Formula::new(FormulaKind::And, children)
    }

    pub fn or(children: Vec<Formula>) -> Self {
        Formula::new(FormulaKind::Or, children)
    }

    /// Records of `superset` not matched by `negated`.
    pub fn not(negated: Formula, superset: Formula) -> Self {
        Formula::new(FormulaKind::Not, vec![negated, superset])
    }

    pub fn attribute_predicate(filter: AttributeFilter, lookup: Formula) -> Self {
        Formula::new(FormulaKind::AttributePredicate(filter), vec![lookup])
    }

    pub fn user_filter(children: Vec<Formula>) -> Self {
        Formula::new(FormulaKind::UserFilterWrapper, children)
    }

    pub fn selection(alternative: SelectionAlternative, inner: Formula) -> Self {
        Formula::new(FormulaKind::SelectionWrapper(alternative), vec![inner])
    }

    pub fn scope_container(scope: Scope, inner: Formula) -> Self {
        Formula::new(FormulaKind::ScopeContainer(scope), vec![inner])
    }

    pub fn reference_translation(
        reference: impl Into<String>,
        index: Arc<dyn RecordSetIndex>,
        referenced_ids: Formula,
    ) -> Self {
        Formula::new(
            FormulaKind::ReferenceRecordTranslation {
                reference: reference.into(),
                index,
            },
            vec![referenced_ids],
        )
    }

    pub fn price_validity(index: Arc<dyn RecordSetIndex>, query: PriceQuery, moment: i64) -> Self {
        Formula::new(
            FormulaKind::PriceValidityWindow {
                index,
                query,
                moment,
            },
            Vec::new(),
        )
    }

    pub fn kind(&self) -> &FormulaKind {
        &self.0.kind
    }

    pub fn children(&self) -> &[Formula] {
        &self.0.children
    }

    pub fn is_empty_formula(&self) -> bool {
        matches!(self.0.kind, FormulaKind::Empty)
    }

    /// A new node of the same kind and payload over different children.
    pub fn clone_with_children(&self, children: Vec<Formula>) -> Formula {
        Formula::new(self.0.kind.clone(), children)
    }

    pub fn estimated_cost(&self) -> u64 {
        self.0.cost
    }

    pub fn estimated_cardinality(&self) -> u64 {
        self.0.cardinality
    }

    pub fn structural_hash(&self) -> u64 {
        self.0.hash
    }

    /// Same node instance.
    pub fn ptr_eq(&self, other: &Formula) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Same kind, payload and recursively equal children.
    pub fn structurally_eq(&self, other: &Formula) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        self.0.hash == other.0.hash
            && self.0.children.len() == other.0.children.len()
            && self.0.kind.payload_eq(&other.0.kind)
            && self
                .0
                .children
                .iter()
                .zip(other.0.children.iter())
                .all(|(a, b)| a.structurally_eq(b))
    }

    /// Number of distinct node instances in the tree.
    pub fn node_count(&self) -> usize {
        fn walk(formula: &Formula, seen: &mut HashSet<*const FormulaNode>) {
            if seen.insert(Arc::as_ptr(&formula.0)) {
                for child in formula.children() {
                    walk(child, seen);
                }
            }
        }
        let mut seen = HashSet::new();
        walk(self, &mut seen);
        seen.len()
    }

    pub(crate) fn node_ptr(&self) -> *const FormulaNode {
        Arc::as_ptr(&self.0)
    }

    /// Matching record identifiers, computed once and memoized.
    pub fn compute(&self) -> &RoaringBitmap {
        self.0.memo.get_or_init(|| self.evaluate())
    }

    fn evaluate(&self) -> RoaringBitmap {
        let children = &self.0.children;
        match &self.0.kind {
            FormulaKind::Empty => RoaringBitmap::new(),
            FormulaKind::Constant(bitmap) => (**bitmap).clone(),
            FormulaKind::Or => children.iter().fold(RoaringBitmap::new(), |mut acc, child| {
                acc |= child.compute();
                acc
            }),
            FormulaKind::Not => match children.as_slice() {
                [negated, superset] => superset.compute() - negated.compute(),
                _ => RoaringBitmap::new(),
            },
            FormulaKind::SelectionWrapper(alternative) => match &alternative.prefetched {
                Some(records) => alternative.evaluate(records),
                None => intersect(children),
            },
            FormulaKind::ReferenceRecordTranslation { index, .. } => {
                let mut owning = RoaringBitmap::new();
                for referenced in intersect(children) {
                    if let Some(records) = index.owning_records(referenced) {
                        owning |= records;
                    }
                }
                owning
            }
            FormulaKind::PriceValidityWindow {
                index,
                query,
                moment,
            } => index.price_valid_at(query, *moment),
            FormulaKind::And
            | FormulaKind::AttributePredicate(_)
            | FormulaKind::UserFilterWrapper
            | FormulaKind::ScopeContainer(_) => intersect(children),
        }
    }
}

fn intersect(children: &[Formula]) -> RoaringBitmap {
    let mut ordered: Vec<&Formula> = children.iter().collect();
    ordered.sort_by_key(|child| child.estimated_cardinality());
    let Some((first, rest)) = ordered.split_first() else {
        return RoaringBitmap::new();
    };
    let mut acc = first.compute().clone();
    for child in rest {
        if acc.is_empty() {
            break;
        }
        acc &= child.compute();
    }
    acc
}

fn estimate(kind: &FormulaKind, children: &[Formula]) -> (u64, u64) {
    let child_cost = children
        .iter()
        .map(Formula::estimated_cost)
        .fold(0, u64::saturating_add);
    let child_cardinality = children
        .iter()
        .map(Formula::estimated_cardinality)
        .fold(0, u64::saturating_add);
    let combine = child_cardinality.saturating_mul(COMBINE_COST);
    match kind {
        FormulaKind::Empty => (0, 0),
        FormulaKind::Constant(bitmap) => (1, bitmap.len()),
        FormulaKind::Or => (child_cost.saturating_add(combine), child_cardinality),
        FormulaKind::Not => {
            let superset = children.get(1).map_or(0, Formula::estimated_cardinality);
            (child_cost.saturating_add(combine), superset)
        }
        FormulaKind::ReferenceRecordTranslation { index, .. } => {
            let owning = index.all_records().estimated_cardinality().max(child_cardinality);
            let translation = child_cardinality.saturating_mul(TRANSLATION_COST);
            (child_cost.saturating_add(translation), owning)
        }
        FormulaKind::PriceValidityWindow { index, .. } => {
            let records = index.all_records().estimated_cardinality();
            (records.saturating_mul(VALIDITY_COST), records)
        }
        FormulaKind::SelectionWrapper(SelectionAlternative {
            prefetched: Some(records),
            ..
        }) => {
            let records = records.len() as u64;
            (child_cost.min(records.saturating_mul(COMBINE_COST)), records)
        }
        FormulaKind::And
        | FormulaKind::AttributePredicate(_)
        | FormulaKind::UserFilterWrapper
        | FormulaKind::SelectionWrapper(_)
        | FormulaKind::ScopeContainer(_) => {
            let smallest = children
                .iter()
                .map(Formula::estimated_cardinality)
                .min()
                .unwrap_or(0);
            let combine = if children.len() > 1 { combine } else { 0 };
            (child_cost.saturating_add(combine), smallest)
        }
    }
}

impl fmt::Debug for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = self.kind();
        match kind {
            FormulaKind::Constant(bitmap) => return write!(f, "const[{}]", bitmap.len()),
            FormulaKind::Empty => return write!(f, "empty"),
            FormulaKind::PriceValidityWindow { query, moment, .. } => {
                return write!(f, "validity[{} @{}]", query, moment);
            }
            FormulaKind::AttributePredicate(filter) => write!(f, "attr[{}]", filter)?,
            FormulaKind::SelectionWrapper(alternative) => {
                write!(f, "selection[{}]", alternative.filter)?
            }
            FormulaKind::ScopeContainer(scope) => write!(f, "scope[{}]", scope)?,
            FormulaKind::ReferenceRecordTranslation { reference, .. } => {
                write!(f, "ref[{}]", reference)?
            }
            other => write!(f, "{}", other.name())?,
        }
        write!(f, "(")?;
        for (i, child) in self.children().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", child)?;
        }
        write!(f, ")")
    }
}
