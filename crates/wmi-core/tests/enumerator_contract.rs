//! Enumerator contract checks: disjointness, completeness, variant
//! equivalence, and the decomposer round-trip property

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use num_bigint::BigInt;
use num_rational::BigRational;
use proptest::prelude::*;

use wmi_core::formula::{substitute, truth_value};
use wmi_core::weight::decompose;
use wmi_core::{
    AtomId, Cell, CellStream, Environment, EnumeratorKind, FormulaId,
    StreamControl, Term, TermId, TruthAssignment,
};

fn collect_cells(
    env: &Arc<Environment>,
    kind: EnumeratorKind,
    delta: FormulaId,
    declared: &[AtomId],
) -> Vec<Cell> {
    CellStream::start(
        kind,
        env.clone(),
        delta,
        declared.iter().copied().collect(),
        None,
        StreamControl::unrestricted(),
    )
    .map(|r| r.expect("enumeration succeeds"))
    .collect()
}

/// Totalizations of a cell over a fixed atom list, as bitmasks.
fn totalizations(cell: &Cell, atoms: &[AtomId]) -> BTreeSet<u32> {
    let mut out = BTreeSet::new();
    for mask in 0..(1u32 << atoms.len()) {
        let consistent = atoms.iter().enumerate().all(|(i, a)| {
            match cell.assignment.value(*a) {
                None => true,
                Some(v) => v == (mask >> i & 1 == 1),
            }
        });
        if consistent {
            out.insert(mask);
        }
    }
    out
}

/// Models of a Boolean-only formula over a fixed atom list.
fn brute_force_models(
    env: &Environment,
    f: FormulaId,
    atoms: &[AtomId],
) -> BTreeSet<u32> {
    let mut out = BTreeSet::new();
    for mask in 0..(1u32 << atoms.len()) {
        let mut mu = TruthAssignment::new();
        for (i, a) in atoms.iter().enumerate() {
            mu.assign(*a, mask >> i & 1 == 1);
        }
        if truth_value(env, substitute(env, f, &mu)) == Some(true) {
            out.insert(mask);
        }
    }
    out
}

// ----------------------------------------------------------------------
// Randomized formula shapes (environment-independent descriptions)
// ----------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Shape {
    Atom(u8),
    Not(Box<Shape>),
    And(Box<Shape>, Box<Shape>),
    Or(Box<Shape>, Box<Shape>),
    Implies(Box<Shape>, Box<Shape>),
    Iff(Box<Shape>, Box<Shape>),
    Xor(Box<Shape>, Box<Shape>),
}

fn shape_strategy() -> impl Strategy<Value = Shape> {
    let leaf = (0u8..3).prop_map(Shape::Atom);
    leaf.prop_recursive(3, 24, 2, |inner| {
        prop_oneof![
            inner.clone().prop_map(|s| Shape::Not(Box::new(s))),
            (inner.clone(), inner.clone())
                .prop_map(|(a, b)| Shape::And(Box::new(a), Box::new(b))),
            (inner.clone(), inner.clone())
                .prop_map(|(a, b)| Shape::Or(Box::new(a), Box::new(b))),
            (inner.clone(), inner.clone())
                .prop_map(|(a, b)| Shape::Implies(Box::new(a), Box::new(b))),
            (inner.clone(), inner.clone())
                .prop_map(|(a, b)| Shape::Iff(Box::new(a), Box::new(b))),
            (inner.clone(), inner.clone())
                .prop_map(|(a, b)| Shape::Xor(Box::new(a), Box::new(b))),
        ]
    })
}

fn build_shape(env: &Environment, atoms: &[AtomId], s: &Shape) -> FormulaId {
    match s {
        Shape::Atom(i) => env.atom(atoms[*i as usize % atoms.len()]),
        Shape::Not(a) => env.not(build_shape(env, atoms, a)),
        Shape::And(a, b) => env.and(vec![
            build_shape(env, atoms, a),
            build_shape(env, atoms, b),
        ]),
        Shape::Or(a, b) => env.or(vec![
            build_shape(env, atoms, a),
            build_shape(env, atoms, b),
        ]),
        Shape::Implies(a, b) => {
            let a = build_shape(env, atoms, a);
            let b = build_shape(env, atoms, b);
            env.implies(a, b)
        }
        Shape::Iff(a, b) => {
            let a = build_shape(env, atoms, a);
            let b = build_shape(env, atoms, b);
            env.iff(a, b)
        }
        Shape::Xor(a, b) => {
            let a = build_shape(env, atoms, a);
            let b = build_shape(env, atoms, b);
            env.xor(a, b)
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Both enumerators cover exactly the model set, disjointly, on
    /// arbitrary Boolean formulas over three atoms.
    #[test]
    fn prop_enumeration_partitions_model_set(shape in shape_strategy()) {
        let env = Arc::new(Environment::new());
        let atoms = [
            env.bool_atom("a"),
            env.bool_atom("b"),
            env.bool_atom("c"),
        ];
        let delta = build_shape(&env, &atoms, &shape);
        let expected = brute_force_models(&env, delta, &atoms);

        for kind in [EnumeratorKind::Total, EnumeratorKind::StructureAware] {
            let cells = collect_cells(&env, kind, delta, &atoms);
            let mut covered: BTreeSet<u32> = BTreeSet::new();
            for cell in &cells {
                let models = totalizations(cell, &atoms);
                prop_assert_eq!(
                    models.len() as u64,
                    1u64 << cell.free_bools,
                    "free-count mismatch under {:?}", kind
                );
                for m in models {
                    // disjointness: no model may be covered twice
                    prop_assert!(
                        covered.insert(m),
                        "model {} covered twice under {:?}", m, kind
                    );
                }
            }
            // completeness
            prop_assert_eq!(&covered, &expected, "under {:?}", kind);
        }
    }
}

// ----------------------------------------------------------------------
// Decomposer round-trip
// ----------------------------------------------------------------------

fn eval_term(
    env: &Environment,
    term: TermId,
    mu: &TruthAssignment,
    point: &BTreeMap<wmi_core::VarId, BigRational>,
) -> BigRational {
    use num_traits::{One, Zero};
    match env.term(term) {
        Term::Const(c) => c,
        Term::Var(v) => point.get(&v).cloned().unwrap_or_else(BigRational::zero),
        Term::Add(parts) => parts
            .into_iter()
            .map(|p| eval_term(env, p, mu, point))
            .fold(BigRational::zero(), |a, b| a + b),
        Term::Sub(a, b) => {
            eval_term(env, a, mu, point) - eval_term(env, b, mu, point)
        }
        Term::Neg(a) => -eval_term(env, a, mu, point),
        Term::Mul(parts) => parts
            .into_iter()
            .map(|p| eval_term(env, p, mu, point))
            .fold(BigRational::one(), |a, b| a * b),
        Term::Div(a, b) => {
            eval_term(env, a, mu, point) / eval_term(env, b, mu, point)
        }
        Term::Pow(a, e) => {
            let base = eval_term(env, a, mu, point);
            let mut acc = BigRational::one();
            for _ in 0..e {
                acc *= base.clone();
            }
            acc
        }
        Term::Ite(c, t, e) => {
            match truth_value(env, substitute(env, c, mu)) {
                Some(true) => eval_term(env, t, mu, point),
                Some(false) => eval_term(env, e, mu, point),
                None => panic!("condition undetermined under a total mu"),
            }
        }
    }
}

fn small_poly_strategy() -> impl Strategy<Value = Vec<i8>> {
    // coefficients of 1, x, x² in [-3, 3]
    proptest::collection::vec(-3i8..=3, 3)
}

fn build_poly(env: &Environment, x: TermId, coeffs: &[i8]) -> TermId {
    let parts = coeffs
        .iter()
        .enumerate()
        .map(|(deg, c)| {
            env.mul(vec![env.int(*c as i64), env.pow(x, deg as u32)])
        })
        .collect();
    env.add(parts)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// For every total assignment ν and point x consistent with it,
    /// the decomposed leaf evaluates exactly like the original weight.
    #[test]
    fn prop_decomposer_round_trip(
        c1 in shape_strategy(),
        c2 in shape_strategy(),
        p1 in small_poly_strategy(),
        p2 in small_poly_strategy(),
        p3 in small_poly_strategy(),
        mask in 0u32..4,
        x_num in -8i64..8,
    ) {
        let env = Environment::new();
        let atoms = [env.bool_atom("a"), env.bool_atom("b")];
        let xv = env.real_var("x");
        let x = env.var_term(xv);

        let cond1 = build_shape(&env, &atoms, &c1);
        let cond2 = build_shape(&env, &atoms, &c2);
        let weight = env.ite_term(
            cond1,
            build_poly(&env, x, &p1),
            env.ite_term(
                cond2,
                build_poly(&env, x, &p2),
                build_poly(&env, x, &p3),
            ),
        );
        let decomposed = decompose(&env, weight).unwrap();

        // a total assignment over the original atoms...
        let mut mu = TruthAssignment::new();
        for (i, a) in atoms.iter().enumerate() {
            mu.assign(*a, mask >> i & 1 == 1);
        }
        // ...extended with the label values its conditions induce
        let mut extended = mu.clone();
        for binding in decomposed.bindings() {
            let v = truth_value(
                &env,
                substitute(&env, binding.condition, &mu),
            )
            .expect("conditions are over the original atoms");
            extended.assign(binding.label, v);
        }

        let leaf = decomposed.leaf_of(&env, &extended).unwrap();
        let mut point = BTreeMap::new();
        point.insert(xv, BigRational::new(BigInt::from(x_num), BigInt::from(2)));

        let direct = eval_term(&env, weight, &mu, &point);
        let via_leaf = eval_term(&env, leaf, &extended, &point);
        prop_assert_eq!(direct, via_leaf);
    }
}

// ----------------------------------------------------------------------
// Streaming behaviour
// ----------------------------------------------------------------------

#[test]
fn test_early_consumer_stop_is_clean() {
    let env = Arc::new(Environment::new());
    let atoms: Vec<AtomId> =
        (0..6).map(|i| env.bool_atom(&format!("a{i}"))).collect();
    let delta = env.or(atoms.iter().map(|a| env.atom(*a)).collect());
    let mut stream = CellStream::start(
        EnumeratorKind::Total,
        env.clone(),
        delta,
        atoms.iter().copied().collect(),
        None,
        StreamControl::unrestricted(),
    );
    // take a single cell and drop the stream mid-enumeration
    let first = stream.next().unwrap().unwrap();
    assert_eq!(first.free_bools, 0);
    drop(stream);
}

#[test]
fn test_mixed_theory_cells_are_disjoint() {
    let env = Arc::new(Environment::new());
    let x = env.var_term(env.real_var("x"));
    let y = env.var_term(env.real_var("y"));
    let sum = env.add(vec![x, y]);
    let delta = env.and(vec![
        env.ge(x, env.int(0)).unwrap(),
        env.le(x, env.int(1)).unwrap(),
        env.ge(y, env.int(0)).unwrap(),
        env.le(y, env.int(1)).unwrap(),
        env.or(vec![
            env.le(sum, env.int(1)).unwrap(),
            env.ge(x, y).unwrap(),
        ]),
    ]);
    let cells = collect_cells(&env, EnumeratorKind::StructureAware, delta, &[]);
    assert!(!cells.is_empty());
    for (i, a) in cells.iter().enumerate() {
        for b in &cells[i + 1..] {
            assert!(
                a.assignment.conflicts_with(&b.assignment),
                "cells {i} and later overlap"
            );
        }
    }
}

#[test]
fn test_variants_agree_on_mixed_problem() {
    // an LRA atom the structure-aware search leaves unassigned covers
    // both of its polarities; the integral must match the total
    // enumeration exactly
    use wmi_core::{SolverOptions, WmiProblem, WmiSolver};

    let mut values = Vec::new();
    let mut cell_counts = Vec::new();
    for kind in [EnumeratorKind::Total, EnumeratorKind::StructureAware] {
        let solver = WmiSolver::new(SolverOptions {
            enumerator: kind,
            ..SolverOptions::default()
        })
        .unwrap();
        let env = solver.environment().clone();
        let a = env.bool_atom("a");
        let x = env.var_term(env.real_var("x"));
        let chi = env.and(vec![
            env.ge(x, env.int(0)).unwrap(),
            env.le(x, env.int(2)).unwrap(),
            env.implies(env.atom(a), env.le(x, env.int(1)).unwrap()),
        ]);
        let problem = WmiProblem::new(chi, env.int(1)).declare_bool(a);
        let outcome = solver.compute(&problem, env.top()).unwrap();
        values.push(outcome.value.as_exact().unwrap().clone());
        cell_counts.push(outcome.stats.cells);
    }
    // a⊤ gives length 1, a⊥ gives length 2
    assert_eq!(values[0], BigRational::from(BigInt::from(3)));
    assert_eq!(values[0], values[1]);
    assert!(cell_counts[1] <= cell_counts[0]);
}
