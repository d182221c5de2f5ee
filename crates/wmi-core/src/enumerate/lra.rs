//! Exact linear-real-arithmetic feasibility by Fourier–Motzkin elimination
//!
//! This is the theory decider behind both enumerators and the geometry
//! probe behind the integrators: feasibility of a literal conjunction,
//! projection onto a variable subset, and per-variable bounds (which
//! double as the bounding box and the unboundedness test). Everything is
//! exact over rationals. Elimination is worst-case exponential in the
//! number of constraints; the conjunctions produced per enumeration cell
//! are small, which is the regime this is built for.

use std::collections::{BTreeMap, BTreeSet};

use num_rational::BigRational;
use num_traits::Signed;

use crate::formula::linear::LinearConstraint;
use crate::formula::types::VarId;
use crate::polytope::HalfSpace;

/// One inequality `Σ aᵢxᵢ ≤ b` (`< b` when `strict`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Row {
    coeffs: BTreeMap<VarId, BigRational>,
    bound: BigRational,
    strict: bool,
}

impl Row {
    pub fn from_constraint(c: &LinearConstraint) -> Self {
        Self {
            coeffs: c.coeffs.iter().cloned().collect(),
            bound: c.bound.clone(),
            strict: c.strict,
        }
    }

    pub fn from_half_space(h: &HalfSpace) -> Self {
        Self {
            coeffs: h.coeffs.iter().cloned().collect(),
            bound: h.bound.clone(),
            strict: h.strict,
        }
    }

    fn is_constant(&self) -> bool {
        self.coeffs.is_empty()
    }

    /// A variable-free row `0 ⋈ b` is violated when b is negative, or
    /// zero under a strict relation.
    fn constant_holds(&self) -> bool {
        if self.strict {
            self.bound.is_positive()
        } else {
            !self.bound.is_negative()
        }
    }

    fn scale(&self, factor: &BigRational) -> Row {
        Row {
            coeffs: self
                .coeffs
                .iter()
                .map(|(v, a)| (*v, a.clone() * factor.clone()))
                .collect(),
            bound: self.bound.clone() * factor.clone(),
            strict: self.strict,
        }
    }

    /// Sum of two rows (valid inequality addition).
    fn combine(&self, other: &Row) -> Row {
        use num_traits::Zero;
        let mut coeffs = self.coeffs.clone();
        for (v, a) in &other.coeffs {
            let merged = coeffs
                .get(v)
                .cloned()
                .unwrap_or_else(BigRational::zero)
                + a.clone();
            if merged.is_zero() {
                coeffs.remove(v);
            } else {
                coeffs.insert(*v, merged);
            }
        }
        Row {
            coeffs,
            bound: self.bound.clone() + other.bound.clone(),
            strict: self.strict || other.strict,
        }
    }
}

/// Lower/upper bounds of a single variable; `None` means unbounded on
/// that side, the flag marks a strict bound.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VariableBounds {
    pub lower: Option<(BigRational, bool)>,
    pub upper: Option<(BigRational, bool)>,
}

/// Eliminate one variable, pairing every upper row with every lower row.
fn eliminate(rows: Vec<Row>, v: VarId) -> Vec<Row> {
    let mut uppers = Vec::new();
    let mut lowers = Vec::new();
    let mut rest = Vec::new();
    for row in rows {
        match row.coeffs.get(&v) {
            Some(a) if a.is_positive() => {
                let norm = a.recip();
                uppers.push(row.scale(&norm));
            }
            Some(a) => {
                let norm = -a.clone().recip();
                lowers.push(row.scale(&norm));
            }
            None => rest.push(row),
        }
    }
    let mut out: BTreeSet<Row> = rest.into_iter().collect();
    for u in &uppers {
        for l in &lowers {
            out.insert(u.combine(l));
        }
    }
    out.into_iter().collect()
}

fn constants_hold(rows: &[Row]) -> bool {
    rows.iter()
        .filter(|r| r.is_constant())
        .all(Row::constant_holds)
}

fn row_variables(rows: &[Row]) -> BTreeSet<VarId> {
    rows.iter()
        .flat_map(|r| r.coeffs.keys().copied())
        .collect()
}

/// Project the system onto `keep`, eliminating every other variable.
/// Returns `None` when a contradiction surfaces along the way.
pub fn project(rows: &[Row], keep: &BTreeSet<VarId>) -> Option<Vec<Row>> {
    let mut current: Vec<Row> = rows.to_vec();
    if !constants_hold(&current) {
        return None;
    }
    let to_drop: Vec<VarId> = row_variables(&current)
        .into_iter()
        .filter(|v| !keep.contains(v))
        .collect();
    for v in to_drop {
        current = eliminate(current, v);
        if !constants_hold(&current) {
            return None;
        }
    }
    Some(current)
}

/// Exact satisfiability of a conjunction of linear inequalities.
pub fn feasible(rows: &[Row]) -> bool {
    project(rows, &BTreeSet::new()).is_some()
}

/// Tightest derivable bounds of `v`, or `None` when the system is
/// infeasible.
pub fn variable_bounds(rows: &[Row], v: VarId) -> Option<VariableBounds> {
    let mut keep = BTreeSet::new();
    keep.insert(v);
    let projected = project(rows, &keep)?;
    let mut bounds = VariableBounds::default();
    for row in &projected {
        let a = match row.coeffs.get(&v) {
            Some(a) => a,
            None => continue,
        };
        let value = row.bound.clone() / a.clone();
        if a.is_positive() {
            let tighter = match &bounds.upper {
                None => true,
                Some((u, strict)) => {
                    value < *u || (value == *u && row.strict && !*strict)
                }
            };
            if tighter {
                bounds.upper = Some((value, row.strict));
            }
        } else {
            let tighter = match &bounds.lower {
                None => true,
                Some((l, strict)) => {
                    value > *l || (value == *l && row.strict && !*strict)
                }
            };
            if tighter {
                bounds.lower = Some((value, row.strict));
            }
        }
    }
    Some(bounds)
}
