use std::collections::HashMap;

use tracing::trace;

use super::{Formula, FormulaKind, FormulaNode};

/// Bottom-up pass removing unsatisfiable conjunctions and degenerate disjunctions.
///
/// Nodes whose children did not change are returned as the same instance.
/// Running the pass on its own output returns that output unchanged.
pub fn optimize(formula: &Formula) -> Formula {
    let mut visited = HashMap::new();
    let optimized = optimize_node(formula, &mut visited);
    trace!(
        before = formula.node_count(),
        after = optimized.node_count(),
        "optimized formula"
    );
    optimized
}

fn optimize_node(formula: &Formula, visited: &mut HashMap<*const FormulaNode, Formula>) -> Formula {
    if let Some(done) = visited.get(&formula.node_ptr()) {
        return done.clone();
    }
    let result = rewrite(formula, visited);
    visited.insert(formula.node_ptr(), result.clone());
    result
}

fn rewrite(formula: &Formula, visited: &mut HashMap<*const FormulaNode, Formula>) -> Formula {
    let kind = formula.kind();
    if kind.is_leaf() {
        return match kind {
            FormulaKind::Constant(bitmap) if bitmap.is_empty() => Formula::empty(),
            _ => formula.clone(),
        };
    }

    let children: Vec<Formula> = formula
        .children()
        .iter()
        .map(|child| optimize_node(child, visited))
        .collect();
    let unchanged = children
        .iter()
        .zip(formula.children())
        .all(|(new, old)| new.ptr_eq(old));
    let rebuild = |children: Vec<Formula>| {
        if unchanged {
            formula.clone()
        } else {
            formula.clone_with_children(children)
        }
    };

    match kind {
        FormulaKind::Or => {
            let remaining: Vec<Formula> = children
                .iter()
                .filter(|child| !child.is_empty_formula())
                .cloned()
                .collect();
            match remaining.len() {
                0 => Formula::empty(),
                1 => remaining.into_iter().next().unwrap_or_else(Formula::empty),
                n if n == children.len() => rebuild(children),
                _ => formula.clone_with_children(remaining),
            }
        }
        FormulaKind::Not => {
            if children.len() != 2 || children[1].is_empty_formula() {
                Formula::empty()
            } else if children[0].is_empty_formula() {
                children[1].clone()
            } else {
                rebuild(children)
            }
        }
        _ => {
            if children.is_empty() || children.iter().any(Formula::is_empty_formula) {
                Formula::empty()
            } else if matches!(kind, FormulaKind::And) && children.len() == 1 {
                children.into_iter().next().unwrap_or_else(Formula::empty)
            } else {
                rebuild(children)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{index::Scope, predicate::AttributeFilter, predicate::AttributeOp};

    fn bitmap(ids: &[u32]) -> Formula {
        Formula::constant(ids.iter().copied().collect())
    }

    fn color() -> AttributeFilter {
        AttributeFilter {
            attribute: "color".to_string(),
            op: AttributeOp::Equals("red".into()),
        }
    }

    #[test]
    fn conjunction_with_empty_collapses() {
        let formula = Formula::and(vec![bitmap(&[1]), Formula::or(vec![])]);
        assert!(optimize(&formula).is_empty_formula());
    }

    #[test]
    fn singleton_disjunction_unwraps() {
        let inner = Formula::attribute_predicate(color(), bitmap(&[1, 2]));
        let formula = Formula::or(vec![Formula::empty(), inner.clone()]);
        assert!(optimize(&formula).ptr_eq(&inner));
        assert!(optimize(&Formula::or(vec![Formula::empty(), Formula::empty()])).is_empty_formula());
    }

    #[test]
    fn disjunction_drops_empty_children() {
        let formula = Formula::or(vec![bitmap(&[1]), Formula::empty(), bitmap(&[2])]);
        let optimized = optimize(&formula);
        assert!(matches!(optimized.kind(), FormulaKind::Or));
        assert_eq!(optimized.children().len(), 2);
    }

    #[test]
    fn negation_rules() {
        let superset = bitmap(&[1, 2, 3]);
        let not_empty = Formula::not(Formula::empty(), superset.clone());
        assert!(optimize(&not_empty).ptr_eq(&superset));
        let empty_superset = Formula::not(bitmap(&[1]), Formula::empty());
        assert!(optimize(&empty_superset).is_empty_formula());
    }

    #[test]
    fn wrapper_over_empty_lookup_is_empty() {
        let formula = Formula::scope_container(
            Scope::Live,
            Formula::attribute_predicate(color(), Formula::constant(Default::default())),
        );
        assert!(optimize(&formula).is_empty_formula());
    }

    #[test]
    fn unchanged_tree_keeps_identity() {
        let formula = Formula::and(vec![
            bitmap(&[1, 2]),
            Formula::or(vec![bitmap(&[2]), bitmap(&[3])]),
        ]);
        assert!(optimize(&formula).ptr_eq(&formula));
    }

    #[test]
    fn optimization_is_idempotent() {
        let formula = Formula::and(vec![
            Formula::or(vec![Formula::empty(), bitmap(&[1, 2])]),
            Formula::user_filter(vec![Formula::or(vec![bitmap(&[2]), Formula::empty()])]),
        ]);
        let once = optimize(&formula);
        let twice = optimize(&once);
        assert!(twice.ptr_eq(&once));
        assert_eq!(once.compute(), formula.compute());
    }
}
