use roaring::RoaringBitmap;

use crate::formula::Formula;

/// Estimated cost of one alternative index set considered by the planner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlternativeCost {
    pub description: String,
    /// `None` when the alternative was skipped because it holds no records.
    pub cost: Option<u64>,
}

/// Result of planning a filter
#[derive(Clone, Debug)]
pub struct CompiledFilter {
    formula: Formula,
    alternative: usize,
    costs: Vec<AlternativeCost>,
}

impl CompiledFilter {
    pub(crate) fn new(formula: Formula, alternative: usize, costs: Vec<AlternativeCost>) -> Self {
        Self {
            formula,
            alternative,
            costs,
        }
    }

    /// Get the final formula
    pub fn formula(&self) -> &Formula {
        &self.formula
    }

    /// Position of the chosen alternative among those passed to the planner
    pub fn alternative(&self) -> usize {
        self.alternative
    }

    /// Description of the chosen alternative
    pub fn description(&self) -> &str {
        self.costs
            .get(self.alternative)
            .map_or("", |cost| cost.description.as_str())
    }

    /// Get the estimated cost of every alternative, in declaration order
    pub fn costs(&self) -> &[AlternativeCost] {
        &self.costs
    }

    /// Compute the matching record identifiers
    pub fn compute(&self) -> &RoaringBitmap {
        self.formula.compute()
    }

    /// Consume the result and return the formula
    pub fn into_formula(self) -> Formula {
        self.formula
    }
}
