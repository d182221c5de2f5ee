//! Linear-real-arithmetic expressions and canonical inequality atoms
//!
//! All LRA atoms are stored in the canonical form `Σ aᵢxᵢ ⋈ b` with
//! ⋈ ∈ {≤, <}, rational coefficients, and a positive scaling chosen so the
//! leading (lowest-variable) coefficient has absolute value one. `≥`/`>`
//! inputs become negated literals over the canonical `<`/`≤` atom, so
//! structurally identical conditions intern to the same atom regardless of
//! how they were written.

use std::collections::BTreeMap;

use num_rational::BigRational;
use num_traits::{One, Signed, Zero};

use crate::environment::Environment;
use crate::error::{WmiError, WmiResult};
use crate::formula::types::{Term, TermId, VarId};

/// An affine expression `Σ aᵢxᵢ + c` under construction
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LinearExpr {
    coeffs: BTreeMap<VarId, BigRational>,
    constant: BigRational,
}

impl LinearExpr {
    pub fn constant(c: BigRational) -> Self {
        Self {
            coeffs: BTreeMap::new(),
            constant: c,
        }
    }

    pub fn variable(v: VarId) -> Self {
        let mut coeffs = BTreeMap::new();
        coeffs.insert(v, BigRational::one());
        Self {
            coeffs,
            constant: BigRational::zero(),
        }
    }

    pub fn add(mut self, other: &LinearExpr) -> Self {
        for (v, a) in &other.coeffs {
            let entry = self
                .coeffs
                .entry(*v)
                .or_insert_with(BigRational::zero);
            *entry += a.clone();
        }
        self.constant += other.constant.clone();
        self.normalized()
    }

    pub fn sub(self, other: &LinearExpr) -> Self {
        self.add(&other.clone().scale(&-BigRational::one()))
    }

    pub fn scale(mut self, factor: &BigRational) -> Self {
        for a in self.coeffs.values_mut() {
            *a *= factor.clone();
        }
        self.constant *= factor.clone();
        self.normalized()
    }

    pub fn neg(self) -> Self {
        self.scale(&-BigRational::one())
    }

    /// Constant value, if the expression has no variable part.
    pub fn as_constant(&self) -> Option<&BigRational> {
        if self.coeffs.is_empty() {
            Some(&self.constant)
        } else {
            None
        }
    }

    fn normalized(mut self) -> Self {
        self.coeffs.retain(|_, a| !a.is_zero());
        self
    }
}

/// Canonical inequality `Σ aᵢxᵢ ⋈ b`, ⋈ = `<` when `strict`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinearConstraint {
    /// Non-zero coefficients, sorted by variable
    pub coeffs: Vec<(VarId, BigRational)>,
    pub bound: BigRational,
    pub strict: bool,
}

/// Result of canonicalizing `expr ⋈ 0`: either a constant truth value
/// (no variable part) or a proper atom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Canonical {
    Truth(bool),
    Atom(LinearConstraint),
}

impl LinearConstraint {
    /// Canonicalize `expr ≤ 0` (or `expr < 0` when `strict`).
    pub fn normalize(expr: LinearExpr, strict: bool) -> Canonical {
        let LinearExpr { coeffs, constant } = expr;
        let coeffs: Vec<(VarId, BigRational)> = coeffs
            .into_iter()
            .filter(|(_, a)| !a.is_zero())
            .collect();
        if coeffs.is_empty() {
            let holds = if strict {
                constant.is_negative()
            } else {
                !constant.is_positive()
            };
            return Canonical::Truth(holds);
        }
        // Positive scaling only, so the relation direction is preserved.
        let lead = coeffs[0].1.abs();
        let coeffs = coeffs
            .into_iter()
            .map(|(v, a)| (v, a / lead.clone()))
            .collect();
        let bound = -constant / lead;
        Canonical::Atom(LinearConstraint {
            coeffs,
            bound,
            strict,
        })
    }

    /// The complement constraint: `¬(Σa·x ≤ b)` is `Σ(−a)·x < −b` and
    /// `¬(Σa·x < b)` is `Σ(−a)·x ≤ −b`.
    pub fn negated(&self) -> LinearConstraint {
        LinearConstraint {
            coeffs: self
                .coeffs
                .iter()
                .map(|(v, a)| (*v, -a.clone()))
                .collect(),
            bound: -self.bound.clone(),
            strict: !self.strict,
        }
    }

    /// Evaluate at a rational point (missing variables read as zero).
    pub fn holds_at(&self, point: &BTreeMap<VarId, BigRational>) -> bool {
        let mut lhs = BigRational::zero();
        for (v, a) in &self.coeffs {
            if let Some(x) = point.get(v) {
                lhs += a.clone() * x.clone();
            }
        }
        if self.strict {
            lhs < self.bound
        } else {
            lhs <= self.bound
        }
    }

    /// Variables mentioned by this constraint, in order.
    pub fn variables(&self) -> impl Iterator<Item = VarId> + '_ {
        self.coeffs.iter().map(|(v, _)| *v)
    }
}

/// Lower a term to an affine expression. Fails on anything outside LRA:
/// products of variables, non-constant divisors or exponents, and
/// conditional terms inside arithmetic atoms.
pub fn linearize(env: &Environment, term: TermId) -> WmiResult<LinearExpr> {
    match env.term(term) {
        Term::Const(c) => Ok(LinearExpr::constant(c)),
        Term::Var(v) => Ok(LinearExpr::variable(v)),
        Term::Add(parts) => {
            let mut acc = LinearExpr::default();
            for p in parts {
                acc = acc.add(&linearize(env, p)?);
            }
            Ok(acc)
        }
        Term::Sub(a, b) => Ok(linearize(env, a)?.sub(&linearize(env, b)?)),
        Term::Neg(a) => Ok(linearize(env, a)?.neg()),
        Term::Mul(parts) => {
            let mut factor = BigRational::one();
            let mut symbolic: Option<LinearExpr> = None;
            for p in parts {
                let e = linearize(env, p)?;
                match e.as_constant() {
                    Some(c) => factor *= c.clone(),
                    None => {
                        if symbolic.is_some() {
                            return Err(WmiError::non_linear(
                                "product of two non-constant terms",
                            ));
                        }
                        symbolic = Some(e);
                    }
                }
            }
            Ok(match symbolic {
                Some(e) => e.scale(&factor),
                None => LinearExpr::constant(factor),
            })
        }
        Term::Div(a, b) => {
            let denom = linearize(env, b)?;
            match denom.as_constant() {
                Some(c) if !c.is_zero() => {
                    Ok(linearize(env, a)?.scale(&c.recip()))
                }
                Some(_) => Err(WmiError::non_linear("division by zero")),
                None => Err(WmiError::non_linear(
                    "division by a non-constant term",
                )),
            }
        }
        Term::Pow(base, exp) => {
            let b = linearize(env, base)?;
            match exp {
                0 => Ok(LinearExpr::constant(BigRational::one())),
                1 => Ok(b),
                _ => match b.as_constant() {
                    Some(c) => {
                        let mut acc = BigRational::one();
                        for _ in 0..exp {
                            acc *= c.clone();
                        }
                        Ok(LinearExpr::constant(acc))
                    }
                    None => Err(WmiError::non_linear(
                        "non-constant base raised to a power above one",
                    )),
                },
            }
        }
        Term::Ite(..) => Err(WmiError::non_linear(
            "conditional term inside an arithmetic atom",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;

    fn q(n: i64, d: i64) -> BigRational {
        BigRational::new(BigInt::from(n), BigInt::from(d))
    }

    #[test]
    fn test_constant_truth_folding() {
        // 0 ≤ 0 holds, 0 < 0 does not
        let zero = LinearExpr::constant(q(0, 1));
        assert_eq!(
            LinearConstraint::normalize(zero.clone(), false),
            Canonical::Truth(true)
        );
        assert_eq!(
            LinearConstraint::normalize(zero, true),
            Canonical::Truth(false)
        );
    }

    #[test]
    fn test_leading_coefficient_scaling() {
        // 2x − 6 ≤ 0 and x − 3 ≤ 0 canonicalize identically
        let x = VarId(0);
        let twice = LinearExpr::variable(x)
            .scale(&q(2, 1))
            .add(&LinearExpr::constant(q(-6, 1)));
        let once = LinearExpr::variable(x).add(&LinearExpr::constant(q(-3, 1)));
        assert_eq!(
            LinearConstraint::normalize(twice, false),
            LinearConstraint::normalize(once, false)
        );
    }

    #[test]
    fn test_negation_round_trip() {
        let x = VarId(0);
        let e = LinearExpr::variable(x).add(&LinearExpr::constant(q(-1, 2)));
        let c = match LinearConstraint::normalize(e, true) {
            Canonical::Atom(c) => c,
            _ => panic!("expected an atom"),
        };
        let n = c.negated();
        assert!(!n.strict);
        assert_eq!(n.negated(), c);

        // x < 1/2 excludes x = 1/2, the complement includes it
        let mut point = BTreeMap::new();
        point.insert(x, q(1, 2));
        assert!(!c.holds_at(&point));
        assert!(n.holds_at(&point));
    }
}
