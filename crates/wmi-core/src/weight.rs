//! Weight decomposition: conditional skeleton plus polynomial leaves
//!
//! A weight term is split into a Boolean skeleton S over fresh condition
//! labels — one per distinct conditional node — and a lazy registry that
//! maps a label polarity vector to the polynomial leaf it selects.
//! Conjoining S to the support stratifies enumeration by active leaf
//! without changing the model set over the original atoms: each clause
//! ℓ ↔ c pins the label to its condition's truth value.
//!
//! Conditionals with identical branches never reach this module — they
//! collapse at construction — so every label that exists can influence
//! the weight's value.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::environment::Environment;
use crate::error::{WmiError, WmiResult};
use crate::formula::types::{
    AtomId, AtomKind, FormulaId, Term, TermId, TruthAssignment,
};
use crate::polynomial::{term_to_polynomial, Polynomial};

/// One decomposition label and the condition it abbreviates
#[derive(Debug, Clone)]
pub struct LabelBinding {
    pub label: AtomId,
    pub condition: FormulaId,
}

/// Decomposed weight: skeleton formula plus the leaf registry
pub struct WeightSkeleton {
    weight: TermId,
    skeleton: FormulaId,
    bindings: Vec<LabelBinding>,
    by_condition: HashMap<FormulaId, AtomId>,
    leaves: Mutex<HashMap<Vec<bool>, Arc<Polynomial>>>,
}

/// Decompose a weight term. Fails with `UnsupportedWeight` when the term
/// is not piecewise polynomial.
pub fn decompose(
    env: &Environment,
    weight: TermId,
) -> WmiResult<WeightSkeleton> {
    let mut conditions = Vec::new();
    let mut seen_conditions = HashSet::new();
    let mut visited = HashSet::new();
    collect_conditions(
        env,
        weight,
        &mut conditions,
        &mut seen_conditions,
        &mut visited,
    )?;

    let mut bindings = Vec::with_capacity(conditions.len());
    let mut by_condition = HashMap::with_capacity(conditions.len());
    let mut clauses = Vec::with_capacity(conditions.len());
    for condition in conditions {
        let label = env.fresh_label();
        clauses.push(env.iff(env.atom(label), condition));
        by_condition.insert(condition, label);
        bindings.push(LabelBinding { label, condition });
    }
    let skeleton = env.and(clauses);
    log::debug!(
        "decomposed weight into {} label(s), skeleton {:?}",
        bindings.len(),
        skeleton
    );

    Ok(WeightSkeleton {
        weight,
        skeleton,
        bindings,
        by_condition,
        leaves: Mutex::new(HashMap::new()),
    })
}

/// Depth-first walk collecting conditions in first-occurrence order and
/// rejecting non-polynomial leaves.
fn collect_conditions(
    env: &Environment,
    term: TermId,
    conditions: &mut Vec<FormulaId>,
    seen: &mut HashSet<FormulaId>,
    visited: &mut HashSet<TermId>,
) -> WmiResult<()> {
    if !visited.insert(term) {
        return Ok(());
    }
    match env.term(term) {
        Term::Const(_) | Term::Var(_) => Ok(()),
        Term::Add(parts) | Term::Mul(parts) => {
            for p in parts {
                collect_conditions(env, p, conditions, seen, visited)?;
            }
            Ok(())
        }
        Term::Sub(a, b) => {
            collect_conditions(env, a, conditions, seen, visited)?;
            collect_conditions(env, b, conditions, seen, visited)
        }
        Term::Neg(a) | Term::Pow(a, _) => {
            collect_conditions(env, a, conditions, seen, visited)
        }
        Term::Div(_, _) => Err(WmiError::unsupported_weight(
            "division by a non-constant or zero divisor",
        )),
        Term::Ite(c, t, e) => {
            if seen.insert(c) {
                conditions.push(c);
            }
            collect_conditions(env, t, conditions, seen, visited)?;
            collect_conditions(env, e, conditions, seen, visited)
        }
    }
}

impl WeightSkeleton {
    pub fn weight(&self) -> TermId {
        self.weight
    }

    /// The skeleton formula S, a conjunction of ℓ ↔ c clauses.
    pub fn skeleton(&self) -> FormulaId {
        self.skeleton
    }

    pub fn bindings(&self) -> &[LabelBinding] {
        &self.bindings
    }

    pub fn label_count(&self) -> usize {
        self.bindings.len()
    }

    pub fn labels(&self) -> impl Iterator<Item = AtomId> + '_ {
        self.bindings.iter().map(|b| b.label)
    }

    /// The label polarity vector selected by an assignment. Every label
    /// must be assigned; the enumerator guarantees this for any emitted
    /// cell because each label is pinned by its skeleton clause.
    pub fn label_vec(
        &self,
        env: &Environment,
        assignment: &TruthAssignment,
    ) -> WmiResult<Vec<bool>> {
        self.bindings
            .iter()
            .map(|b| {
                assignment.value(b.label).ok_or_else(|| {
                    WmiError::LeafUnderdetermined {
                        label: label_name(env, b.label),
                    }
                })
            })
            .collect()
    }

    /// Resolve every conditional in the weight according to the
    /// assignment's label values, yielding an ITE-free term.
    pub fn leaf_of(
        &self,
        env: &Environment,
        assignment: &TruthAssignment,
    ) -> WmiResult<TermId> {
        let mut memo = HashMap::new();
        self.leaf_rec(env, self.weight, assignment, &mut memo)
    }

    fn leaf_rec(
        &self,
        env: &Environment,
        term: TermId,
        assignment: &TruthAssignment,
        memo: &mut HashMap<TermId, TermId>,
    ) -> WmiResult<TermId> {
        if let Some(r) = memo.get(&term) {
            return Ok(*r);
        }
        // Subtrees without conditions contain no atoms at all.
        if env.term_atoms_of(term).is_empty() {
            memo.insert(term, term);
            return Ok(term);
        }
        let result = match env.term(term) {
            Term::Ite(c, t, e) => {
                let label = self.by_condition.get(&c).copied().ok_or_else(
                    || {
                        WmiError::inconsistency(
                            "conditional without a registered label",
                        )
                    },
                )?;
                match assignment.value(label) {
                    Some(true) => self.leaf_rec(env, t, assignment, memo)?,
                    Some(false) => self.leaf_rec(env, e, assignment, memo)?,
                    None => {
                        return Err(WmiError::LeafUnderdetermined {
                            label: label_name(env, label),
                        })
                    }
                }
            }
            Term::Add(parts) => {
                let parts = parts
                    .into_iter()
                    .map(|p| self.leaf_rec(env, p, assignment, memo))
                    .collect::<WmiResult<Vec<_>>>()?;
                env.add(parts)
            }
            Term::Mul(parts) => {
                let parts = parts
                    .into_iter()
                    .map(|p| self.leaf_rec(env, p, assignment, memo))
                    .collect::<WmiResult<Vec<_>>>()?;
                env.mul(parts)
            }
            Term::Sub(a, b) => {
                let a = self.leaf_rec(env, a, assignment, memo)?;
                let b = self.leaf_rec(env, b, assignment, memo)?;
                env.sub(a, b)
            }
            Term::Neg(a) => {
                let a = self.leaf_rec(env, a, assignment, memo)?;
                env.neg(a)
            }
            Term::Pow(a, e) => {
                let a = self.leaf_rec(env, a, assignment, memo)?;
                env.pow(a, e)
            }
            Term::Div(_, _) => {
                return Err(WmiError::unsupported_weight(
                    "division by a non-constant or zero divisor",
                ))
            }
            Term::Const(_) | Term::Var(_) => term,
        };
        memo.insert(term, result);
        Ok(result)
    }

    /// The polynomial leaf active under the assignment, cached per label
    /// polarity vector.
    pub fn polynomial_for(
        &self,
        env: &Environment,
        assignment: &TruthAssignment,
    ) -> WmiResult<Arc<Polynomial>> {
        let key = self.label_vec(env, assignment)?;
        if let Some(p) = self.leaves.lock().unwrap().get(&key) {
            return Ok(p.clone());
        }
        let leaf = self.leaf_of(env, assignment)?;
        let poly = Arc::new(term_to_polynomial(env, leaf)?);
        self.leaves
            .lock()
            .unwrap()
            .entry(key)
            .or_insert_with(|| poly.clone());
        Ok(poly)
    }
}

fn label_name(env: &Environment, label: AtomId) -> String {
    match env.atom_kind(label) {
        AtomKind::Label(n) => format!("k{n}"),
        other => format!("{other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;
    use num_rational::BigRational;
    use std::collections::BTreeMap;

    fn q(n: i64, d: i64) -> BigRational {
        BigRational::new(BigInt::from(n), BigInt::from(d))
    }

    #[test]
    fn test_shared_conditions_share_labels() {
        let env = Environment::new();
        let y = env.var_term(env.real_var("y"));
        let x = env.var_term(env.real_var("x"));
        let cond = env.lt(y, env.int(1)).unwrap();
        // two conditionals over the structurally identical condition
        let w = env.add(vec![
            env.ite_term(cond, x, y),
            env.ite_term(cond, env.int(1), env.int(2)),
        ]);
        let d = decompose(&env, w).unwrap();
        assert_eq!(d.label_count(), 1);
    }

    #[test]
    fn test_identical_branches_allocate_no_label() {
        let env = Environment::new();
        let a = env.atom(env.bool_atom("a"));
        let x = env.var_term(env.real_var("x"));
        let w = env.ite_term(a, x, x);
        let d = decompose(&env, w).unwrap();
        assert_eq!(d.label_count(), 0);
        assert_eq!(d.skeleton(), env.top());
    }

    #[test]
    fn test_leaf_selection_round_trip() {
        let env = Environment::new();
        let xv = env.real_var("x");
        let yv = env.real_var("y");
        let x = env.var_term(xv);
        let y = env.var_term(yv);
        let cond = env.lt(y, env.int(1)).unwrap();
        let w = env.ite_term(
            cond,
            env.add(vec![x, y]),
            env.mul(vec![env.int(2), y]),
        );
        let d = decompose(&env, w).unwrap();
        assert_eq!(d.label_count(), 1);
        let label = d.bindings()[0].label;

        let mut point = BTreeMap::new();
        point.insert(xv, q(3, 1));
        point.insert(yv, q(1, 2));

        // label ⊤ selects x + y
        let mut mu = TruthAssignment::new();
        mu.assign(label, true);
        let leaf = d.polynomial_for(&env, &mu).unwrap();
        assert_eq!(leaf.eval(&point), q(7, 2));

        // label ⊥ selects 2y
        let mut mu = TruthAssignment::new();
        mu.assign(label, false);
        let leaf = d.polynomial_for(&env, &mu).unwrap();
        assert_eq!(leaf.eval(&point), q(1, 1));
    }

    #[test]
    fn test_unassigned_label_is_fatal() {
        let env = Environment::new();
        let x = env.var_term(env.real_var("x"));
        let cond = env.lt(x, env.int(0)).unwrap();
        let w = env.ite_term(cond, x, env.neg(x));
        let d = decompose(&env, w).unwrap();
        let empty = TruthAssignment::new();
        assert!(matches!(
            d.leaf_of(&env, &empty),
            Err(WmiError::LeafUnderdetermined { .. })
        ));
    }

    #[test]
    fn test_nested_conditionals() {
        let env = Environment::new();
        let a = env.atom(env.bool_atom("a"));
        let b = env.atom(env.bool_atom("b"));
        let x = env.var_term(env.real_var("x"));
        let inner = env.ite_term(b, env.int(2), env.int(3));
        let w = env.ite_term(a, x, inner);
        let d = decompose(&env, w).unwrap();
        assert_eq!(d.label_count(), 2);

        let mut mu = TruthAssignment::new();
        mu.assign(d.bindings()[0].label, false);
        mu.assign(d.bindings()[1].label, true);
        let leaf = d.leaf_of(&env, &mu).unwrap();
        assert_eq!(env.term_as_const(leaf), Some(q(2, 1)));
    }

    #[test]
    fn test_symbolic_division_rejected() {
        let env = Environment::new();
        let x = env.var_term(env.real_var("x"));
        let w = env.div(env.int(1), x);
        assert!(matches!(
            decompose(&env, w),
            Err(WmiError::UnsupportedWeight { .. })
        ));
    }
}
