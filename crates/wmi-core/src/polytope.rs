//! Convex polytopes in half-space representation
//!
//! A polytope is the intersection of finitely many half-spaces
//! `Σ aᵢxᵢ ⋈ b` over a fixed, totally ordered set of real variables. The
//! ordering is fixed when a query starts and shared with the integrator
//! and the cache fingerprint. Strictness of the inequalities is carried
//! as metadata; integration treats boundaries as measure zero.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

use num_rational::BigRational;

use crate::environment::Environment;
use crate::formula::linear::LinearConstraint;
use crate::formula::types::{AtomKind, TruthAssignment, VarId};
use crate::polynomial::rational_to_f64;

/// One half-space `Σ aᵢxᵢ ≤ b` (or `< b` when `strict`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HalfSpace {
    pub coeffs: Vec<(VarId, BigRational)>,
    pub bound: BigRational,
    pub strict: bool,
}

impl From<LinearConstraint> for HalfSpace {
    fn from(c: LinearConstraint) -> Self {
        Self {
            coeffs: c.coeffs,
            bound: c.bound,
            strict: c.strict,
        }
    }
}

impl HalfSpace {
    /// The single constrained variable, if the half-space is axis-aligned.
    pub fn single_variable(&self) -> Option<(VarId, &BigRational)> {
        match self.coeffs.as_slice() {
            [(v, a)] => Some((*v, a)),
            _ => None,
        }
    }

    pub fn holds_at_f64(&self, point: &HashMap<VarId, f64>) -> bool {
        let mut lhs = 0.0;
        for (v, a) in &self.coeffs {
            lhs += rational_to_f64(a) * point.get(v).copied().unwrap_or(0.0);
        }
        // strictness is measure-irrelevant for sampling
        lhs <= rational_to_f64(&self.bound)
    }
}

/// An H-representation polytope over an ordered variable domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Polytope {
    vars: Vec<VarId>,
    half_spaces: Vec<HalfSpace>,
}

impl Polytope {
    /// Build from an explicit half-space list; duplicates and looser
    /// copies of identical coefficient rows are dropped.
    pub fn new(vars: Vec<VarId>, half_spaces: Vec<HalfSpace>) -> Self {
        use std::collections::btree_map::Entry;
        let mut tightest: BTreeMap<Vec<(VarId, BigRational)>, (BigRational, bool)> =
            BTreeMap::new();
        for h in half_spaces {
            match tightest.entry(h.coeffs) {
                Entry::Vacant(slot) => {
                    slot.insert((h.bound, h.strict));
                }
                Entry::Occupied(mut slot) => {
                    let (bound, strict) = slot.get_mut();
                    if h.bound < *bound
                        || (h.bound == *bound && h.strict && !*strict)
                    {
                        *bound = h.bound;
                        *strict = h.strict;
                    }
                }
            }
        }
        let half_spaces = tightest
            .into_iter()
            .map(|(coeffs, (bound, strict))| HalfSpace {
                coeffs,
                bound,
                strict,
            })
            .collect();
        Self { vars, half_spaces }
    }

    /// Build from the LRA literals of a truth assignment: literals
    /// assigned ⊤ contribute their constraint, literals assigned ⊥ the
    /// negated one. Atoms left unassigned contribute nothing — the cell
    /// covers both polarities.
    pub fn from_assignment(
        env: &Environment,
        assignment: &TruthAssignment,
        vars: Vec<VarId>,
    ) -> Self {
        let mut half_spaces = Vec::new();
        for (atom, value) in assignment.iter() {
            if let AtomKind::Linear(c) = env.atom_kind(atom) {
                let constraint = if value { c } else { c.negated() };
                half_spaces.push(HalfSpace::from(constraint));
            }
        }
        Self::new(vars, half_spaces)
    }

    pub fn vars(&self) -> &[VarId] {
        &self.vars
    }

    pub fn dimension(&self) -> usize {
        self.vars.len()
    }

    pub fn half_spaces(&self) -> &[HalfSpace] {
        &self.half_spaces
    }

    /// True when every half-space constrains exactly one variable.
    pub fn is_axis_aligned(&self) -> bool {
        self.half_spaces
            .iter()
            .all(|h| h.single_variable().is_some())
    }

    /// Interval bounds per domain variable for an axis-aligned polytope.
    /// Returns `None` unless every variable has both a lower and an
    /// upper bound from single-variable half-spaces.
    pub fn intervals(
        &self,
    ) -> Option<Vec<(VarId, BigRational, BigRational)>> {
        if !self.is_axis_aligned() {
            return None;
        }
        use num_traits::Signed;
        let mut lower: BTreeMap<VarId, BigRational> = BTreeMap::new();
        let mut upper: BTreeMap<VarId, BigRational> = BTreeMap::new();
        for h in &self.half_spaces {
            let (v, a) = h.single_variable()?;
            let value = h.bound.clone() / a.clone();
            if a.is_positive() {
                // a·x ≤ b  ⇒  x ≤ b/a
                let tighter =
                    upper.get(&v).map(|u| value < *u).unwrap_or(true);
                if tighter {
                    upper.insert(v, value);
                }
            } else {
                // a·x ≤ b with a < 0  ⇒  x ≥ b/a
                let tighter =
                    lower.get(&v).map(|l| value > *l).unwrap_or(true);
                if tighter {
                    lower.insert(v, value);
                }
            }
        }
        let mut out = Vec::with_capacity(self.vars.len());
        for v in &self.vars {
            let lo = lower.get(v)?.clone();
            let hi = upper.get(v)?.clone();
            out.push((*v, lo, hi));
        }
        Some(out)
    }

    /// Positional index of each domain variable, shared by polytope and
    /// polynomial fingerprints.
    pub fn variable_index(&self) -> BTreeMap<VarId, usize> {
        self.vars
            .iter()
            .enumerate()
            .map(|(i, v)| (*v, i))
            .collect()
    }

    /// Stable textual key with variables renamed to domain positions.
    pub fn canonical_key(&self) -> String {
        let index = self.variable_index();
        let mut rows: Vec<String> = self
            .half_spaces
            .iter()
            .map(|h| {
                let mut row = String::new();
                for (v, a) in &h.coeffs {
                    let i = index.get(v).copied().unwrap_or(usize::MAX);
                    let _ = write!(row, "{a}*v{i}+");
                }
                let rel = if h.strict { "<" } else { "<=" };
                let _ = write!(row, "{rel}{}", h.bound);
                row
            })
            .collect();
        rows.sort_unstable();
        rows.join(";")
    }
}
