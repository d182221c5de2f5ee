//! Exact polynomial integration over bounded polytopes
//!
//! Pipeline: Fourier–Motzkin bounds decide emptiness and boundedness;
//! vertices are the feasible solutions of d-subsets of the constraint
//! system; the polytope is triangulated by coning a base vertex over its
//! recursively triangulated opposite facets (faces are identified by
//! tight-constraint sets and affine rank); each simplex is mapped
//! affinely onto the standard simplex, where monomials integrate in
//! closed form. Everything is rational, so results are exact.
//!
//! Axis-aligned products of intervals bypass all of that and integrate
//! coordinate-wise.
//!
//! Vertex enumeration scans all d-subsets, which is exponential in the
//! constraint count; per-cell constraint sets in this pipeline are
//! small. Strictness of half-spaces is ignored: boundaries have measure
//! zero.

use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};

use crate::enumerate::lra::{self, Row};
use crate::error::{WmiError, WmiResult};
use crate::integrate::{IntegralValue, Integrator};
use crate::polynomial::{Exponents, Polynomial};
use crate::polytope::Polytope;

/// The built-in exact backend
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactIntegrator;

impl Integrator for ExactIntegrator {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn integrate(
        &self,
        polytope: &Polytope,
        polynomial: &Polynomial,
    ) -> WmiResult<IntegralValue> {
        if polynomial.is_zero() {
            return Ok(IntegralValue::exact_zero());
        }

        // Product-of-intervals shortcut, any integrand.
        if let Some(axes) = polytope.intervals() {
            if axes.iter().any(|(_, lo, hi)| hi <= lo) {
                return Ok(IntegralValue::exact_zero());
            }
            return Ok(IntegralValue::Exact(polynomial.integrate_box(&axes)?));
        }

        let rows: Vec<Row> = polytope
            .half_spaces()
            .iter()
            .map(Row::from_half_space)
            .collect();

        // Emptiness and boundedness in one pass over the variables.
        for v in polytope.vars() {
            let bounds = match lra::variable_bounds(&rows, *v) {
                None => return Ok(IntegralValue::exact_zero()),
                Some(b) => b,
            };
            if bounds.lower.is_none() || bounds.upper.is_none() {
                return Err(WmiError::UnboundedRegion {
                    variable: format!("v{}", v.index()),
                });
            }
        }

        let vertices = enumerate_vertices(polytope);
        let d = polytope.dimension();
        if vertices.len() < d + 1 || affine_rank(&vertices) < d {
            return Ok(IntegralValue::exact_zero());
        }

        let tight_sets = tight_sets(polytope, &vertices);
        let all: Vec<usize> = (0..vertices.len()).collect();
        let simplices = triangulate_face(&vertices, &all, &tight_sets, d);
        log::debug!(
            "triangulated {}-polytope: {} vertices, {} simplices",
            d,
            vertices.len(),
            simplices.len()
        );

        let mut total = BigRational::zero();
        for simplex in &simplices {
            total += integrate_over_simplex(polytope, polynomial, &vertices, simplex);
        }
        Ok(IntegralValue::Exact(total))
    }
}

/// All feasible intersection points of d-subsets of the constraints.
fn enumerate_vertices(polytope: &Polytope) -> Vec<Vec<BigRational>> {
    let vars = polytope.vars();
    let d = vars.len();
    let half_spaces = polytope.half_spaces();
    let mut seen: BTreeSet<Vec<BigRational>> = BTreeSet::new();

    // dense coefficient rows in domain order
    let dense: Vec<(Vec<BigRational>, BigRational)> = half_spaces
        .iter()
        .map(|h| {
            let mut row = vec![BigRational::zero(); d];
            for (v, a) in &h.coeffs {
                let i = vars.iter().position(|w| w == v).unwrap_or(0);
                row[i] = a.clone();
            }
            (row, h.bound.clone())
        })
        .collect();

    for subset in (0..dense.len()).combinations(d) {
        let a: Vec<Vec<BigRational>> =
            subset.iter().map(|i| dense[*i].0.clone()).collect();
        let b: Vec<BigRational> =
            subset.iter().map(|i| dense[*i].1.clone()).collect();
        let point = match solve_square(&a, &b) {
            Some(p) => p,
            None => continue,
        };
        let feasible = dense.iter().all(|(row, bound)| {
            let lhs: BigRational = row
                .iter()
                .zip(&point)
                .map(|(a, x)| a.clone() * x.clone())
                .sum();
            lhs <= *bound
        });
        if feasible {
            seen.insert(point);
        }
    }
    seen.into_iter().collect()
}

/// For each constraint, the vertices where it holds with equality.
fn tight_sets(
    polytope: &Polytope,
    vertices: &[Vec<BigRational>],
) -> Vec<BTreeSet<usize>> {
    let vars = polytope.vars();
    polytope
        .half_spaces()
        .iter()
        .map(|h| {
            vertices
                .iter()
                .enumerate()
                .filter(|(_, v)| {
                    let lhs: BigRational = h
                        .coeffs
                        .iter()
                        .map(|(var, a)| {
                            let i = vars
                                .iter()
                                .position(|w| w == var)
                                .unwrap_or(0);
                            a.clone() * v[i].clone()
                        })
                        .sum();
                    lhs == h.bound
                })
                .map(|(i, _)| i)
                .collect()
        })
        .collect()
}

/// Triangulate a k-face by coning its first vertex over the facets that
/// do not contain it. Faces are vertex-index sets; facet candidates come
/// from the tight set of each constraint, filtered by affine rank.
fn triangulate_face(
    vertices: &[Vec<BigRational>],
    face: &[usize],
    tight_sets: &[BTreeSet<usize>],
    k: usize,
) -> Vec<Vec<usize>> {
    if k <= 1 {
        // a 1-face is the segment between its two extreme points
        let points: Vec<&Vec<BigRational>> =
            face.iter().map(|i| &vertices[*i]).collect();
        if face.len() == 2 {
            return vec![face.to_vec()];
        }
        let (lo, hi) = segment_extremes(face, &points);
        return vec![vec![lo, hi]];
    }
    let v0 = face[0];
    let face_set: BTreeSet<usize> = face.iter().copied().collect();
    let mut facets: BTreeSet<Vec<usize>> = BTreeSet::new();
    for tight in tight_sets {
        if tight.contains(&v0) {
            continue;
        }
        let w: Vec<usize> =
            face.iter().copied().filter(|i| tight.contains(i)).collect();
        if w.len() < k {
            continue;
        }
        let points: Vec<Vec<BigRational>> =
            w.iter().map(|i| vertices[*i].clone()).collect();
        if affine_rank(&points) == k - 1 {
            facets.insert(w);
        }
    }
    let mut out = Vec::new();
    for facet in facets {
        debug_assert!(facet.iter().all(|i| face_set.contains(i)));
        for mut simplex in
            triangulate_face(vertices, &facet, tight_sets, k - 1)
        {
            simplex.push(v0);
            out.push(simplex);
        }
    }
    out
}

/// Endpoints of a collinear point set, by parameter along the segment.
fn segment_extremes(
    face: &[usize],
    points: &[&Vec<BigRational>],
) -> (usize, usize) {
    let base = points[0];
    let axis = points
        .iter()
        .flat_map(|p| {
            p.iter()
                .zip(base.iter())
                .enumerate()
                .filter(|(_, (a, b))| a != b)
                .map(|(i, _)| i)
        })
        .next()
        .unwrap_or(0);
    let mut lo = 0;
    let mut hi = 0;
    for (j, p) in points.iter().enumerate() {
        if p[axis] < points[lo][axis] {
            lo = j;
        }
        if p[axis] > points[hi][axis] {
            hi = j;
        }
    }
    (face[lo], face[hi])
}

/// ∫ polynomial over one simplex, by affine substitution onto the
/// standard simplex and the Dirichlet closed form.
fn integrate_over_simplex(
    polytope: &Polytope,
    polynomial: &Polynomial,
    vertices: &[Vec<BigRational>],
    simplex: &[usize],
) -> BigRational {
    let vars = polytope.vars();
    let d = vars.len();
    let v0 = &vertices[simplex[0]];

    // edge matrix: column j is v_{j+1} − v_0
    let edges: Vec<Vec<BigRational>> = simplex[1..]
        .iter()
        .map(|i| {
            vertices[*i]
                .iter()
                .zip(v0.iter())
                .map(|(a, b)| a.clone() - b.clone())
                .collect()
        })
        .collect();
    let det = determinant(&edges);
    if det.is_zero() {
        return BigRational::zero();
    }

    // x_i = v0_i + Σ_j edges[j][i]·u_j, with u_j reusing the j-th
    // domain variable id (the substitution is simultaneous)
    let mut subs: BTreeMap<_, Polynomial> = BTreeMap::new();
    for (i, var) in vars.iter().enumerate() {
        let mut p = Polynomial::constant(v0[i].clone());
        for (j, edge) in edges.iter().enumerate() {
            let coeff = edge[i].clone();
            if !coeff.is_zero() {
                p = p.add(&Polynomial::variable(vars[j]).scale(&coeff));
            }
        }
        subs.insert(*var, p);
    }
    let transformed = polynomial.compose(&subs);

    let mut total = BigRational::zero();
    for (exps, coeff) in transformed.monomials() {
        total += coeff.clone() * dirichlet(exps, d);
    }
    total * det.abs()
}

/// ∫ over the standard d-simplex of ∏ u_j^{e_j}: (∏ e_j!)/(d + Σe_j)!
fn dirichlet(exps: &Exponents, d: usize) -> BigRational {
    let mut numer = BigInt::one();
    let mut degree = 0u64;
    for e in exps.values() {
        numer *= factorial(*e as u64);
        degree += *e as u64;
    }
    let denom = factorial(d as u64 + degree);
    BigRational::new(numer, denom)
}

fn factorial(n: u64) -> BigInt {
    let mut acc = BigInt::one();
    for i in 2..=n {
        acc *= BigInt::from(i);
    }
    acc
}

// ----------------------------------------------------------------------
// Rational linear algebra
// ----------------------------------------------------------------------

/// Solve a square system by Gaussian elimination; `None` when singular.
fn solve_square(
    a: &[Vec<BigRational>],
    b: &[BigRational],
) -> Option<Vec<BigRational>> {
    let n = a.len();
    let mut m: Vec<Vec<BigRational>> = a
        .iter()
        .zip(b.iter())
        .map(|(row, rhs)| {
            let mut r = row.clone();
            r.push(rhs.clone());
            r
        })
        .collect();
    for col in 0..n {
        let pivot = (col..n).find(|r| !m[*r][col].is_zero())?;
        m.swap(col, pivot);
        let p = m[col][col].clone();
        for x in m[col].iter_mut() {
            *x /= p.clone();
        }
        for r in 0..n {
            if r != col && !m[r][col].is_zero() {
                let factor = m[r][col].clone();
                for c in col..=n {
                    let delta = factor.clone() * m[col][c].clone();
                    m[r][c] -= delta;
                }
            }
        }
    }
    Some(m.into_iter().map(|row| row[n].clone()).collect())
}

/// Rank of an arbitrary rational matrix.
fn matrix_rank(mut m: Vec<Vec<BigRational>>) -> usize {
    let rows = m.len();
    if rows == 0 {
        return 0;
    }
    let cols = m[0].len();
    let mut rank = 0;
    for col in 0..cols {
        let pivot = match (rank..rows).find(|r| !m[*r][col].is_zero()) {
            Some(p) => p,
            None => continue,
        };
        m.swap(rank, pivot);
        let p = m[rank][col].clone();
        for x in m[rank].iter_mut() {
            *x /= p.clone();
        }
        for r in 0..rows {
            if r != rank && !m[r][col].is_zero() {
                let factor = m[r][col].clone();
                for c in 0..cols {
                    let delta = factor.clone() * m[rank][c].clone();
                    m[r][c] -= delta;
                }
            }
        }
        rank += 1;
        if rank == rows {
            break;
        }
    }
    rank
}

/// Affine rank of a point set: rank of the differences from the first.
fn affine_rank(points: &[Vec<BigRational>]) -> usize {
    if points.len() < 2 {
        return 0;
    }
    let base = &points[0];
    let diffs: Vec<Vec<BigRational>> = points[1..]
        .iter()
        .map(|p| {
            p.iter()
                .zip(base.iter())
                .map(|(a, b)| a.clone() - b.clone())
                .collect()
        })
        .collect();
    matrix_rank(diffs)
}

/// Determinant by fraction-free-ish elimination over rationals.
fn determinant(m: &[Vec<BigRational>]) -> BigRational {
    let n = m.len();
    if n == 0 {
        return BigRational::one();
    }
    let mut m: Vec<Vec<BigRational>> = m.to_vec();
    let mut det = BigRational::one();
    for col in 0..n {
        let pivot = match (col..n).find(|r| !m[*r][col].is_zero()) {
            Some(p) => p,
            None => return BigRational::zero(),
        };
        if pivot != col {
            m.swap(col, pivot);
            det = -det;
        }
        let p = m[col][col].clone();
        det *= p.clone();
        for r in col + 1..n {
            if m[r][col].is_zero() {
                continue;
            }
            let factor = m[r][col].clone() / p.clone();
            for c in col..n {
                let delta = factor.clone() * m[col][c].clone();
                m[r][c] -= delta;
            }
        }
    }
    det
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polytope::HalfSpace;
    use crate::formula::types::VarId;

    fn q(n: i64, d: i64) -> BigRational {
        BigRational::new(BigInt::from(n), BigInt::from(d))
    }

    fn hs(coeffs: &[(u32, i64)], bound: (i64, i64)) -> HalfSpace {
        HalfSpace {
            coeffs: coeffs
                .iter()
                .map(|(v, a)| (VarId(*v), q(*a, 1)))
                .collect(),
            bound: q(bound.0, bound.1),
            strict: false,
        }
    }

    fn triangle() -> Polytope {
        // x ≥ 0, y ≥ 0, x + y ≤ 1
        Polytope::new(
            vec![VarId(0), VarId(1)],
            vec![
                hs(&[(0, -1)], (0, 1)),
                hs(&[(1, -1)], (0, 1)),
                hs(&[(0, 1), (1, 1)], (1, 1)),
            ],
        )
    }

    #[test]
    fn test_triangle_area() {
        let v = ExactIntegrator
            .integrate(&triangle(), &Polynomial::one())
            .unwrap();
        assert_eq!(v, IntegralValue::Exact(q(1, 2)));
    }

    #[test]
    fn test_triangle_linear_integrand() {
        // ∫∫ x over the unit triangle = 1/6
        let p = Polynomial::variable(VarId(0));
        let v = ExactIntegrator.integrate(&triangle(), &p).unwrap();
        assert_eq!(v, IntegralValue::Exact(q(1, 6)));
    }

    #[test]
    fn test_clipped_square() {
        // unit square minus the corner above x + y = 3/2: area 7/8
        let p = Polytope::new(
            vec![VarId(0), VarId(1)],
            vec![
                hs(&[(0, -1)], (0, 1)),
                hs(&[(1, -1)], (0, 1)),
                hs(&[(0, 1)], (1, 1)),
                hs(&[(1, 1)], (1, 1)),
                hs(&[(0, 1), (1, 1)], (3, 2)),
            ],
        );
        let v = ExactIntegrator.integrate(&p, &Polynomial::one()).unwrap();
        assert_eq!(v, IntegralValue::Exact(q(7, 8)));
    }

    #[test]
    fn test_three_dimensional_simplex() {
        // x, y, z ≥ 0, x + y + z ≤ 1: volume 1/6
        let p = Polytope::new(
            vec![VarId(0), VarId(1), VarId(2)],
            vec![
                hs(&[(0, -1)], (0, 1)),
                hs(&[(1, -1)], (0, 1)),
                hs(&[(2, -1)], (0, 1)),
                hs(&[(0, 1), (1, 1), (2, 1)], (1, 1)),
            ],
        );
        let v = ExactIntegrator.integrate(&p, &Polynomial::one()).unwrap();
        assert_eq!(v, IntegralValue::Exact(q(1, 6)));
    }

    #[test]
    fn test_box_shortcut_with_polynomial() {
        // ∫₀¹∫₀¹ xy = 1/4, through the interval path
        let p = Polytope::new(
            vec![VarId(0), VarId(1)],
            vec![
                hs(&[(0, -1)], (0, 1)),
                hs(&[(1, -1)], (0, 1)),
                hs(&[(0, 1)], (1, 1)),
                hs(&[(1, 1)], (1, 1)),
            ],
        );
        let xy = Polynomial::variable(VarId(0))
            .mul(&Polynomial::variable(VarId(1)));
        let v = ExactIntegrator.integrate(&p, &xy).unwrap();
        assert_eq!(v, IntegralValue::Exact(q(1, 4)));
    }

    #[test]
    fn test_empty_polytope_is_zero() {
        let p = Polytope::new(
            vec![VarId(0)],
            vec![hs(&[(0, 1)], (0, 1)), hs(&[(0, -1)], (-1, 1))],
        );
        let v = ExactIntegrator.integrate(&p, &Polynomial::one()).unwrap();
        assert_eq!(v, IntegralValue::exact_zero());
    }

    #[test]
    fn test_degenerate_slab_is_zero() {
        // the segment x + y = 0, y ∈ [0, 1]: measure zero in the plane
        let p = Polytope::new(
            vec![VarId(0), VarId(1)],
            vec![
                hs(&[(0, 1), (1, 1)], (0, 1)),
                hs(&[(0, -1), (1, -1)], (0, 1)),
                hs(&[(1, -1)], (0, 1)),
                hs(&[(1, 1)], (1, 1)),
            ],
        );
        let v = ExactIntegrator.integrate(&p, &Polynomial::one()).unwrap();
        assert_eq!(v, IntegralValue::exact_zero());
    }

    #[test]
    fn test_unbounded_region_rejected() {
        let p = Polytope::new(vec![VarId(0)], vec![hs(&[(0, -1)], (0, 1))]);
        assert!(matches!(
            ExactIntegrator.integrate(&p, &Polynomial::one()),
            Err(WmiError::UnboundedRegion { .. })
        ));
    }

    #[test]
    fn test_solver_helpers() {
        // 2x2 solve
        let a = vec![vec![q(1, 1), q(1, 1)], vec![q(1, 1), q(-1, 1)]];
        let b = vec![q(3, 1), q(1, 1)];
        let x = solve_square(&a, &b).unwrap();
        assert_eq!(x, vec![q(2, 1), q(1, 1)]);

        // singular matrix
        let a = vec![vec![q(1, 1), q(2, 1)], vec![q(2, 1), q(4, 1)]];
        assert!(solve_square(&a, &b).is_none());

        assert_eq!(
            determinant(&[
                vec![q(2, 1), q(0, 1)],
                vec![q(0, 1), q(3, 1)]
            ]),
            q(6, 1)
        );
        assert_eq!(
            matrix_rank(vec![
                vec![q(1, 1), q(2, 1)],
                vec![q(2, 1), q(4, 1)]
            ]),
            1
        );
    }
}
