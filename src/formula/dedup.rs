use std::collections::HashMap;

use tracing::debug;

use super::{Formula, FormulaNode};

/// Replaces structurally equal subtrees with a single shared instance.
///
/// The cache lives for one pass. Candidates sharing a structural hash are
/// verified with [`Formula::structurally_eq`] before being merged, so hash
/// collisions never substitute a different formula.
#[derive(Default)]
pub struct Deduplicator {
    cache: HashMap<u64, Vec<Formula>>,
    processed: HashMap<*const FormulaNode, Formula>,
    substitutions: usize,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes replaced by a cached equal node so far.
    pub fn substitutions(&self) -> usize {
        self.substitutions
    }

    /// Deduplicate `formula`; the original instance is returned when nothing was merged.
    pub fn apply(&mut self, formula: &Formula) -> Formula {
        let before = self.substitutions;
        let result = self.visit(formula);
        if self.substitutions == before {
            formula.clone()
        } else {
            result
        }
    }

    fn visit(&mut self, formula: &Formula) -> Formula {
        if let Some(done) = self.processed.get(&formula.node_ptr()) {
            return done.clone();
        }

        let children: Vec<Formula> = formula
            .children()
            .iter()
            .map(|child| self.visit(child))
            .collect();
        let changed = children
            .iter()
            .zip(formula.children())
            .any(|(new, old)| !new.ptr_eq(old));
        let candidate = if changed {
            formula.clone_with_children(children)
        } else {
            formula.clone()
        };

        let bucket = self.cache.entry(candidate.structural_hash()).or_default();
        let result = match bucket.iter().find(|cached| cached.structurally_eq(&candidate)) {
            Some(cached) => {
                if !cached.ptr_eq(&candidate) {
                    self.substitutions += 1;
                }
                cached.clone()
            }
            None => {
                bucket.push(candidate.clone());
                candidate
            }
        };
        self.processed.insert(formula.node_ptr(), result.clone());
        result
    }
}

/// Run a fresh [`Deduplicator`] over `formula`.
pub fn deduplicate(formula: &Formula) -> Formula {
    let mut deduplicator = Deduplicator::new();
    let result = deduplicator.apply(formula);
    debug!(
        substitutions = deduplicator.substitutions(),
        nodes = result.node_count(),
        "deduplicated formula"
    );
    result
}
