//! Multivariate polynomials with rational coefficients
//!
//! Stored as a sum of monomials: a map from exponent vectors to
//! coefficients. The representation is canonical (like terms collected,
//! zero coefficients dropped, map ordering fixed), so structural equality
//! is semantic equality and the cache fingerprint can reuse the ordering.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use num_rational::BigRational;
use num_traits::{One, Signed, Zero};

use crate::environment::Environment;
use crate::error::{WmiError, WmiResult};
use crate::formula::types::{Term, TermId, VarId};

/// Exponent vector of a monomial; absent variables have exponent zero
pub type Exponents = BTreeMap<VarId, u32>;

/// A polynomial in monomial form
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Polynomial {
    terms: BTreeMap<Exponents, BigRational>,
}

impl Polynomial {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn constant(c: BigRational) -> Self {
        let mut terms = BTreeMap::new();
        if !c.is_zero() {
            terms.insert(Exponents::new(), c);
        }
        Self { terms }
    }

    pub fn one() -> Self {
        Self::constant(BigRational::one())
    }

    pub fn variable(v: VarId) -> Self {
        let mut exps = Exponents::new();
        exps.insert(v, 1);
        let mut terms = BTreeMap::new();
        terms.insert(exps, BigRational::one());
        Self { terms }
    }

    pub fn is_zero(&self) -> bool {
        self.terms.is_empty()
    }

    /// The constant value, if no monomial has a variable part.
    pub fn as_constant(&self) -> Option<BigRational> {
        match self.terms.len() {
            0 => Some(BigRational::zero()),
            1 => {
                let (exps, c) = self.terms.iter().next().unwrap();
                if exps.is_empty() {
                    Some(c.clone())
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    pub fn monomial_count(&self) -> usize {
        self.terms.len()
    }

    pub fn monomials(
        &self,
    ) -> impl Iterator<Item = (&Exponents, &BigRational)> {
        self.terms.iter()
    }

    pub fn variables(&self) -> BTreeSet<VarId> {
        self.terms
            .keys()
            .flat_map(|e| e.keys().copied())
            .collect()
    }

    pub fn total_degree(&self) -> u32 {
        self.terms
            .keys()
            .map(|e| e.values().sum())
            .max()
            .unwrap_or(0)
    }

    fn insert(&mut self, exps: Exponents, coeff: BigRational) {
        use std::collections::btree_map::Entry;
        if coeff.is_zero() {
            return;
        }
        match self.terms.entry(exps) {
            Entry::Vacant(slot) => {
                slot.insert(coeff);
            }
            Entry::Occupied(mut slot) => {
                *slot.get_mut() += coeff;
                if slot.get().is_zero() {
                    slot.remove();
                }
            }
        }
    }

    pub fn add(&self, other: &Polynomial) -> Polynomial {
        let mut out = self.clone();
        for (e, c) in &other.terms {
            out.insert(e.clone(), c.clone());
        }
        out
    }

    pub fn neg(&self) -> Polynomial {
        Polynomial {
            terms: self
                .terms
                .iter()
                .map(|(e, c)| (e.clone(), -c.clone()))
                .collect(),
        }
    }

    pub fn sub(&self, other: &Polynomial) -> Polynomial {
        self.add(&other.neg())
    }

    pub fn scale(&self, factor: &BigRational) -> Polynomial {
        if factor.is_zero() {
            return Polynomial::zero();
        }
        Polynomial {
            terms: self
                .terms
                .iter()
                .map(|(e, c)| (e.clone(), c.clone() * factor.clone()))
                .collect(),
        }
    }

    pub fn mul(&self, other: &Polynomial) -> Polynomial {
        let mut out = Polynomial::zero();
        for (ea, ca) in &self.terms {
            for (eb, cb) in &other.terms {
                let mut exps = ea.clone();
                for (v, k) in eb {
                    *exps.entry(*v).or_insert(0) += k;
                }
                out.insert(exps, ca.clone() * cb.clone());
            }
        }
        out
    }

    pub fn pow(&self, exp: u32) -> Polynomial {
        let mut out = Polynomial::one();
        for _ in 0..exp {
            out = out.mul(self);
        }
        out
    }

    /// Simultaneous substitution of variables by polynomials; variables
    /// absent from `subs` are left in place.
    pub fn compose(
        &self,
        subs: &BTreeMap<VarId, Polynomial>,
    ) -> Polynomial {
        let mut out = Polynomial::zero();
        for (exps, coeff) in &self.terms {
            let mut mono = Polynomial::constant(coeff.clone());
            for (v, k) in exps {
                let factor = match subs.get(v) {
                    Some(p) => p.pow(*k),
                    None => Polynomial::variable(*v).pow(*k),
                };
                mono = mono.mul(&factor);
            }
            out = out.add(&mono);
        }
        out
    }

    /// Exact evaluation; unassigned variables read as zero.
    pub fn eval(&self, point: &BTreeMap<VarId, BigRational>) -> BigRational {
        let mut total = BigRational::zero();
        for (exps, coeff) in &self.terms {
            let mut value = coeff.clone();
            for (v, k) in exps {
                let x = point.get(v).cloned().unwrap_or_else(BigRational::zero);
                for _ in 0..*k {
                    value *= x.clone();
                }
            }
            total += value;
        }
        total
    }

    /// Float evaluation, for the sampling backend.
    pub fn eval_f64(&self, point: &HashMap<VarId, f64>) -> f64 {
        let mut total = 0.0;
        for (exps, coeff) in &self.terms {
            let mut value = rational_to_f64(coeff);
            for (v, k) in exps {
                let x = point.get(v).copied().unwrap_or(0.0);
                value *= x.powi(*k as i32);
            }
            total += value;
        }
        total
    }

    /// Closed-form integral over an axis-aligned box. Every variable of
    /// the polynomial must be one of the box axes.
    pub fn integrate_box(
        &self,
        axes: &[(VarId, BigRational, BigRational)],
    ) -> WmiResult<BigRational> {
        let axis_vars: BTreeSet<VarId> =
            axes.iter().map(|(v, _, _)| *v).collect();
        let mut total = BigRational::zero();
        for (exps, coeff) in &self.terms {
            if let Some(v) = exps.keys().find(|v| !axis_vars.contains(v)) {
                return Err(WmiError::inconsistency(format!(
                    "monomial variable {v:?} outside the integration box",
                )));
            }
            let mut value = coeff.clone();
            for (v, lo, hi) in axes {
                let e = exps.get(v).copied().unwrap_or(0);
                value *= power_interval(lo, hi, e);
            }
            total += value;
        }
        Ok(total)
    }

    /// Stable textual key with variables renamed to positional indices.
    pub fn canonical_key(&self, index: &BTreeMap<VarId, usize>) -> String {
        use fmt::Write;
        let mut out = String::new();
        for (exps, coeff) in &self.terms {
            let _ = write!(out, "{coeff}");
            for (v, k) in exps {
                let i = index.get(v).copied().unwrap_or(usize::MAX);
                let _ = write!(out, "*v{i}^{k}");
            }
            out.push('+');
        }
        out
    }
}

/// ∫ x^e dx over [lo, hi]
fn power_interval(lo: &BigRational, hi: &BigRational, e: u32) -> BigRational {
    let n = e + 1;
    let mut hi_pow = BigRational::one();
    let mut lo_pow = BigRational::one();
    for _ in 0..n {
        hi_pow *= hi.clone();
        lo_pow *= lo.clone();
    }
    (hi_pow - lo_pow) / BigRational::from_integer(n.into())
}

pub(crate) fn rational_to_f64(q: &BigRational) -> f64 {
    use num_traits::ToPrimitive;
    q.to_f64().unwrap_or_else(|| {
        if q.is_negative() {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        }
    })
}

/// Convert an ITE-free term into monomial form. The caller has already
/// resolved conditional branches; a surviving conditional or symbolic
/// divisor is rejected.
pub fn term_to_polynomial(
    env: &Environment,
    term: TermId,
) -> WmiResult<Polynomial> {
    let mut memo = HashMap::new();
    term_to_polynomial_rec(env, term, &mut memo)
}

fn term_to_polynomial_rec(
    env: &Environment,
    term: TermId,
    memo: &mut HashMap<TermId, Polynomial>,
) -> WmiResult<Polynomial> {
    if let Some(p) = memo.get(&term) {
        return Ok(p.clone());
    }
    let result = match env.term(term) {
        Term::Const(c) => Polynomial::constant(c),
        Term::Var(v) => Polynomial::variable(v),
        Term::Add(parts) => {
            let mut acc = Polynomial::zero();
            for p in parts {
                acc = acc.add(&term_to_polynomial_rec(env, p, memo)?);
            }
            acc
        }
        Term::Sub(a, b) => term_to_polynomial_rec(env, a, memo)?
            .sub(&term_to_polynomial_rec(env, b, memo)?),
        Term::Neg(a) => term_to_polynomial_rec(env, a, memo)?.neg(),
        Term::Mul(parts) => {
            let mut acc = Polynomial::one();
            for p in parts {
                acc = acc.mul(&term_to_polynomial_rec(env, p, memo)?);
            }
            acc
        }
        Term::Div(_, _) => {
            return Err(WmiError::unsupported_weight(
                "division by a non-constant term",
            ))
        }
        Term::Pow(a, e) => term_to_polynomial_rec(env, a, memo)?.pow(e),
        Term::Ite(..) => {
            return Err(WmiError::inconsistency(
                "conditional term survived leaf extraction",
            ))
        }
    };
    memo.insert(term, result.clone());
    Ok(result)
}

impl fmt::Display for Polynomial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.terms.is_empty() {
            return write!(f, "0");
        }
        let mut first = true;
        for (exps, coeff) in &self.terms {
            if !first {
                write!(f, " + ")?;
            }
            first = false;
            write!(f, "{coeff}")?;
            for (v, k) in exps {
                write!(f, "·x{}^{k}", v.index())?;
            }
        }
        Ok(())
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
    fn test_like_terms_collect() {
        let x = Polynomial::variable(VarId(0));
        let sum = x.add(&x);
        assert_eq!(sum, x.scale(&q(2, 1)));
        assert!(x.sub(&x).is_zero());
    }

    #[test]
    fn test_product_expansion() {
        // (x + 1)(x − 1) = x² − 1
        let x = Polynomial::variable(VarId(0));
        let p = x.add(&Polynomial::one());
        let m = x.sub(&Polynomial::one());
        let expanded = p.mul(&m);
        let expected = x.pow(2).sub(&Polynomial::one());
        assert_eq!(expanded, expected);
    }

    #[test]
    fn test_box_integration() {
        // ∫₀¹∫₀¹ (x + y) = 1
        let x = Polynomial::variable(VarId(0));
        let y = Polynomial::variable(VarId(1));
        let p = x.add(&y);
        let axes = vec![
            (VarId(0), q(0, 1), q(1, 1)),
            (VarId(1), q(0, 1), q(1, 1)),
        ];
        assert_eq!(p.integrate_box(&axes).unwrap(), q(1, 1));

        // ∫₀² x² dx with y a slack axis of width 1
        let p2 = x.pow(2);
        let axes = vec![
            (VarId(0), q(0, 1), q(2, 1)),
            (VarId(1), q(3, 1), q(4, 1)),
        ];
        assert_eq!(p2.integrate_box(&axes).unwrap(), q(8, 3));
    }

    #[test]
    fn test_compose_affine() {
        // p(x) = x², x := u + 1  ⇒  u² + 2u + 1
        let x = Polynomial::variable(VarId(0));
        let u = Polynomial::variable(VarId(1));
        let mut subs = BTreeMap::new();
        subs.insert(VarId(0), u.add(&Polynomial::one()));
        let composed = x.pow(2).compose(&subs);
        let expected = u
            .pow(2)
            .add(&u.scale(&q(2, 1)))
            .add(&Polynomial::one());
        assert_eq!(composed, expected);
    }

    #[test]
    fn test_term_conversion() {
        let env = Environment::new();
        let x = env.real_var("x");
        let y = env.real_var("y");
        let xt = env.var_term(x);
        let yt = env.var_term(y);
        // (x + y)² expands to x² + 2xy + y²
        let square = env.pow(env.add(vec![xt, yt]), 2);
        let p = term_to_polynomial(&env, square).unwrap();
        assert_eq!(p.monomial_count(), 3);
        assert_eq!(p.total_degree(), 2);

        let mut point = BTreeMap::new();
        point.insert(x, q(1, 2));
        point.insert(y, q(3, 2));
        assert_eq!(p.eval(&point), q(4, 1));
    }

    #[test]
    fn test_symbolic_divisor_rejected() {
        let env = Environment::new();
        let x = env.var_term(env.real_var("x"));
        let bad = env.div(env.int(1), x);
        assert!(matches!(
            term_to_polynomial(&env, bad),
            Err(WmiError::UnsupportedWeight { .. })
        ));
    }
}
