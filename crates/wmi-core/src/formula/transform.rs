//! Pure formula transformations: substitution, simplification, normal forms
//!
//! Every walker is a single function matching exhaustively on the node
//! variant and rebuilding through the environment's constructors, which
//! carry the model-preserving identities. Rewrites that would change the
//! model set are never applied.

use std::collections::HashMap;

use crate::environment::Environment;
use crate::formula::types::{Formula, FormulaId, TruthAssignment};

/// Substitute assigned atoms by their truth values and fold.
pub fn substitute(
    env: &Environment,
    f: FormulaId,
    assignment: &TruthAssignment,
) -> FormulaId {
    if assignment.is_empty() {
        return f;
    }
    let mut memo = HashMap::new();
    substitute_rec(env, f, assignment, &mut memo)
}

fn substitute_rec(
    env: &Environment,
    f: FormulaId,
    assignment: &TruthAssignment,
    memo: &mut HashMap<FormulaId, FormulaId>,
) -> FormulaId {
    if let Some(r) = memo.get(&f) {
        return *r;
    }
    // Untouched subtrees are returned as-is; the cached free-atom set
    // makes this a cheap containment test.
    let atoms = env.atoms_of(f);
    if !assignment.iter().any(|(a, _)| atoms.contains(&a)) {
        memo.insert(f, f);
        return f;
    }
    let result = match env.formula(f) {
        Formula::True | Formula::False => f,
        Formula::Lit(l) => match assignment.value(l.atom) {
            Some(v) => {
                if l.eval(v) {
                    env.top()
                } else {
                    env.bottom()
                }
            }
            None => f,
        },
        Formula::Not(g) => {
            let g = substitute_rec(env, g, assignment, memo);
            env.not(g)
        }
        Formula::And(kids) => {
            let kids = kids
                .into_iter()
                .map(|k| substitute_rec(env, k, assignment, memo))
                .collect();
            env.and(kids)
        }
        Formula::Or(kids) => {
            let kids = kids
                .into_iter()
                .map(|k| substitute_rec(env, k, assignment, memo))
                .collect();
            env.or(kids)
        }
        Formula::Implies(a, b) => {
            let a = substitute_rec(env, a, assignment, memo);
            let b = substitute_rec(env, b, assignment, memo);
            env.implies(a, b)
        }
        Formula::Iff(a, b) => {
            let a = substitute_rec(env, a, assignment, memo);
            let b = substitute_rec(env, b, assignment, memo);
            env.iff(a, b)
        }
        Formula::Xor(a, b) => {
            let a = substitute_rec(env, a, assignment, memo);
            let b = substitute_rec(env, b, assignment, memo);
            env.xor(a, b)
        }
        Formula::Ite(c, t, e) => {
            let c = substitute_rec(env, c, assignment, memo);
            let t = substitute_rec(env, t, assignment, memo);
            let e = substitute_rec(env, e, assignment, memo);
            env.ite(c, t, e)
        }
    };
    memo.insert(f, result);
    result
}

/// Substitute a single atom.
pub fn substitute_atom(
    env: &Environment,
    f: FormulaId,
    atom: crate::formula::types::AtomId,
    value: bool,
) -> FormulaId {
    let mut mu = TruthAssignment::new();
    mu.assign(atom, value);
    substitute(env, f, &mu)
}

/// Constant folding plus the constructor identities, applied bottom-up.
/// Idempotent; formulas built through the environment are already in
/// this form.
pub fn simplify(env: &Environment, f: FormulaId) -> FormulaId {
    let mut memo = HashMap::new();
    simplify_rec(env, f, &mut memo)
}

fn simplify_rec(
    env: &Environment,
    f: FormulaId,
    memo: &mut HashMap<FormulaId, FormulaId>,
) -> FormulaId {
    if let Some(r) = memo.get(&f) {
        return *r;
    }
    let result = match env.formula(f) {
        Formula::True | Formula::False | Formula::Lit(_) => f,
        Formula::Not(g) => {
            let g = simplify_rec(env, g, memo);
            env.not(g)
        }
        Formula::And(kids) => {
            let kids = kids
                .into_iter()
                .map(|k| simplify_rec(env, k, memo))
                .collect();
            env.and(kids)
        }
        Formula::Or(kids) => {
            let kids = kids
                .into_iter()
                .map(|k| simplify_rec(env, k, memo))
                .collect();
            env.or(kids)
        }
        Formula::Implies(a, b) => {
            let a = simplify_rec(env, a, memo);
            let b = simplify_rec(env, b, memo);
            env.implies(a, b)
        }
        Formula::Iff(a, b) => {
            let a = simplify_rec(env, a, memo);
            let b = simplify_rec(env, b, memo);
            env.iff(a, b)
        }
        Formula::Xor(a, b) => {
            let a = simplify_rec(env, a, memo);
            let b = simplify_rec(env, b, memo);
            env.xor(a, b)
        }
        Formula::Ite(c, t, e) => {
            let c = simplify_rec(env, c, memo);
            let t = simplify_rec(env, t, memo);
            let e = simplify_rec(env, e, memo);
            env.ite(c, t, e)
        }
    };
    memo.insert(f, result);
    result
}

/// Truth value of a formula that has folded to a constant.
pub fn truth_value(env: &Environment, f: FormulaId) -> Option<bool> {
    match env.formula(f) {
        Formula::True => Some(true),
        Formula::False => Some(false),
        _ => None,
    }
}

/// Negation normal form: negation pushed onto literals, `Implies`,
/// `Iff`, `Xor` and `Ite` expanded into ∧/∨.
pub fn to_nnf(env: &Environment, f: FormulaId) -> FormulaId {
    let mut memo = HashMap::new();
    nnf_rec(env, f, true, &mut memo)
}

fn nnf_rec(
    env: &Environment,
    f: FormulaId,
    polarity: bool,
    memo: &mut HashMap<(FormulaId, bool), FormulaId>,
) -> FormulaId {
    if let Some(r) = memo.get(&(f, polarity)) {
        return *r;
    }
    let result = match env.formula(f) {
        Formula::True => {
            if polarity {
                env.top()
            } else {
                env.bottom()
            }
        }
        Formula::False => {
            if polarity {
                env.bottom()
            } else {
                env.top()
            }
        }
        Formula::Lit(l) => env.lit(if polarity { l } else { !l }),
        Formula::Not(g) => nnf_rec(env, g, !polarity, memo),
        Formula::And(kids) => {
            let kids: Vec<_> = kids
                .into_iter()
                .map(|k| nnf_rec(env, k, polarity, memo))
                .collect();
            if polarity {
                env.and(kids)
            } else {
                env.or(kids)
            }
        }
        Formula::Or(kids) => {
            let kids: Vec<_> = kids
                .into_iter()
                .map(|k| nnf_rec(env, k, polarity, memo))
                .collect();
            if polarity {
                env.or(kids)
            } else {
                env.and(kids)
            }
        }
        Formula::Implies(a, b) => {
            if polarity {
                let na = nnf_rec(env, a, false, memo);
                let pb = nnf_rec(env, b, true, memo);
                env.or(vec![na, pb])
            } else {
                let pa = nnf_rec(env, a, true, memo);
                let nb = nnf_rec(env, b, false, memo);
                env.and(vec![pa, nb])
            }
        }
        Formula::Iff(a, b) => {
            let pa = nnf_rec(env, a, true, memo);
            let na = nnf_rec(env, a, false, memo);
            let pb = nnf_rec(env, b, true, memo);
            let nb = nnf_rec(env, b, false, memo);
            if polarity {
                let both = env.and(vec![pa, pb]);
                let neither = env.and(vec![na, nb]);
                env.or(vec![both, neither])
            } else {
                let left = env.and(vec![pa, nb]);
                let right = env.and(vec![na, pb]);
                env.or(vec![left, right])
            }
        }
        Formula::Xor(a, b) => {
            // a ⊕ b is ¬(a ↔ b)
            let pa = nnf_rec(env, a, true, memo);
            let na = nnf_rec(env, a, false, memo);
            let pb = nnf_rec(env, b, true, memo);
            let nb = nnf_rec(env, b, false, memo);
            if polarity {
                let left = env.and(vec![pa, nb]);
                let right = env.and(vec![na, pb]);
                env.or(vec![left, right])
            } else {
                let both = env.and(vec![pa, pb]);
                let neither = env.and(vec![na, nb]);
                env.or(vec![both, neither])
            }
        }
        Formula::Ite(c, t, e) => {
            let pc = nnf_rec(env, c, true, memo);
            let nc = nnf_rec(env, c, false, memo);
            let t = nnf_rec(env, t, polarity, memo);
            let e = nnf_rec(env, e, polarity, memo);
            // (c → t) ∧ (¬c → e), or its De Morgan dual when negated
            if polarity {
                let then_part = env.or(vec![nc, t]);
                let else_part = env.or(vec![pc, e]);
                env.and(vec![then_part, else_part])
            } else {
                let then_part = env.and(vec![pc, t]);
                let else_part = env.and(vec![nc, e]);
                env.or(vec![then_part, else_part])
            }
        }
    };
    memo.insert((f, polarity), result);
    result
}

/// Conjunctive normal form by distribution over the NNF. Equivalent
/// (not merely equisatisfiable); exponential in the worst case, intended
/// for the small formulas this pipeline manipulates.
pub fn to_cnf(env: &Environment, f: FormulaId) -> FormulaId {
    let nnf = to_nnf(env, f);
    let clauses = cnf_clauses(env, nnf);
    let parts = clauses.into_iter().map(|c| env.or(c)).collect();
    env.and(parts)
}

fn cnf_clauses(env: &Environment, f: FormulaId) -> Vec<Vec<FormulaId>> {
    match env.formula(f) {
        Formula::True => vec![],
        Formula::And(kids) => {
            kids.into_iter().flat_map(|k| cnf_clauses(env, k)).collect()
        }
        Formula::Or(kids) => {
            let mut acc: Vec<Vec<FormulaId>> = vec![vec![]];
            for k in kids {
                let sub = cnf_clauses(env, k);
                if sub.is_empty() {
                    // child is ⊤, the whole disjunction is ⊤
                    return vec![];
                }
                let mut next = Vec::with_capacity(acc.len() * sub.len());
                for base in &acc {
                    for clause in &sub {
                        let mut merged = base.clone();
                        merged.extend(clause.iter().copied());
                        next.push(merged);
                    }
                }
                acc = next;
            }
            acc
        }
        // ⊥ and literals are unit clauses
        _ => vec![vec![f]],
    }
}
