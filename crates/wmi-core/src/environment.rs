//! The environment: atom and variable tables plus hash-consing pools
//!
//! One `Environment` is constructed per solver and passed explicitly
//! through every API; there are no process-wide singletons. Formula and
//! term nodes are interned in append-only arenas, so node equality is id
//! equality and structurally identical subexpressions are shared. The
//! tables are read-mostly after query setup; a single lock guards the
//! intern-new path.
//!
//! Constructors perform the model-preserving normalizations the rest of
//! the pipeline relies on: constant folding, flattening and deduplication
//! of n-ary connectives, complementary-literal annihilation, negation
//! pushed onto literals, and collapse of conditionals with identical
//! branches. Nothing here changes the model set of a formula.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Zero};

use crate::error::WmiResult;
use crate::formula::linear::{linearize, Canonical, LinearConstraint};
use crate::formula::types::{
    AtomId, AtomKind, Formula, FormulaId, Lit, Term, TermId, VarId,
};

/// Cached free-atom and free-variable sets of an interned node
#[derive(Clone)]
struct NodeMeta {
    atoms: Arc<BTreeSet<AtomId>>,
    reals: Arc<BTreeSet<VarId>>,
}

impl NodeMeta {
    fn empty() -> Self {
        Self {
            atoms: Arc::new(BTreeSet::new()),
            reals: Arc::new(BTreeSet::new()),
        }
    }
}

struct PoolInner {
    atoms: Vec<AtomKind>,
    atom_index: HashMap<AtomKind, AtomId>,
    var_names: Vec<String>,
    var_index: HashMap<String, VarId>,
    formulas: Vec<Formula>,
    formula_meta: Vec<NodeMeta>,
    formula_index: HashMap<Formula, FormulaId>,
    terms: Vec<Term>,
    term_meta: Vec<NodeMeta>,
    term_index: HashMap<Term, TermId>,
    next_label: u32,
}

/// Shared interning environment for one solver
pub struct Environment {
    inner: RwLock<PoolInner>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    pub fn new() -> Self {
        let mut inner = PoolInner {
            atoms: Vec::new(),
            atom_index: HashMap::new(),
            var_names: Vec::new(),
            var_index: HashMap::new(),
            formulas: Vec::new(),
            formula_meta: Vec::new(),
            formula_index: HashMap::new(),
            terms: Vec::new(),
            term_meta: Vec::new(),
            term_index: HashMap::new(),
            next_label: 0,
        };
        // ⊤ and ⊥ occupy the first two slots of every pool.
        for node in [Formula::True, Formula::False] {
            let id = FormulaId(inner.formulas.len() as u32);
            inner.formula_index.insert(node.clone(), id);
            inner.formulas.push(node);
            inner.formula_meta.push(NodeMeta::empty());
        }
        Self {
            inner: RwLock::new(inner),
        }
    }

    // ------------------------------------------------------------------
    // Variables and atoms
    // ------------------------------------------------------------------

    /// Declare (or look up) a real variable by name.
    pub fn real_var(&self, name: &str) -> VarId {
        if let Some(v) = self.inner.read().unwrap().var_index.get(name) {
            return *v;
        }
        let mut inner = self.inner.write().unwrap();
        if let Some(v) = inner.var_index.get(name) {
            return *v;
        }
        let v = VarId(inner.var_names.len() as u32);
        inner.var_names.push(name.to_string());
        inner.var_index.insert(name.to_string(), v);
        v
    }

    pub fn var_name(&self, v: VarId) -> String {
        self.inner.read().unwrap().var_names[v.index()].clone()
    }

    /// Declare (or look up) a named propositional atom.
    pub fn bool_atom(&self, name: &str) -> AtomId {
        self.intern_atom(AtomKind::Bool(name.to_string()))
    }

    /// Allocate a fresh condition label; never unified with anything.
    pub fn fresh_label(&self) -> AtomId {
        let mut inner = self.inner.write().unwrap();
        let ordinal = inner.next_label;
        inner.next_label += 1;
        let kind = AtomKind::Label(ordinal);
        let id = AtomId(inner.atoms.len() as u32);
        inner.atom_index.insert(kind.clone(), id);
        inner.atoms.push(kind);
        id
    }

    /// Intern a canonical linear constraint as an atom.
    pub fn linear_atom(&self, constraint: LinearConstraint) -> AtomId {
        self.intern_atom(AtomKind::Linear(constraint))
    }

    fn intern_atom(&self, kind: AtomKind) -> AtomId {
        if let Some(a) = self.inner.read().unwrap().atom_index.get(&kind) {
            return *a;
        }
        let mut inner = self.inner.write().unwrap();
        if let Some(a) = inner.atom_index.get(&kind) {
            return *a;
        }
        let a = AtomId(inner.atoms.len() as u32);
        inner.atom_index.insert(kind.clone(), a);
        inner.atoms.push(kind);
        a
    }

    pub fn atom_kind(&self, a: AtomId) -> AtomKind {
        self.inner.read().unwrap().atoms[a.index()].clone()
    }

    pub fn linear_constraint_of(&self, a: AtomId) -> Option<LinearConstraint> {
        match self.atom_kind(a) {
            AtomKind::Linear(c) => Some(c),
            _ => None,
        }
    }

    pub fn atom_count(&self) -> usize {
        self.inner.read().unwrap().atoms.len()
    }

    // ------------------------------------------------------------------
    // Formula constructors
    // ------------------------------------------------------------------

    pub fn top(&self) -> FormulaId {
        FormulaId(0)
    }

    pub fn bottom(&self) -> FormulaId {
        FormulaId(1)
    }

    pub fn lit(&self, l: Lit) -> FormulaId {
        self.intern_formula(Formula::Lit(l))
    }

    /// Positive literal over an atom.
    pub fn atom(&self, a: AtomId) -> FormulaId {
        self.lit(Lit::pos(a))
    }

    pub fn not(&self, f: FormulaId) -> FormulaId {
        match self.formula(f) {
            Formula::True => self.bottom(),
            Formula::False => self.top(),
            Formula::Lit(l) => self.lit(!l),
            Formula::Not(g) => g,
            _ => self.intern_formula(Formula::Not(f)),
        }
    }

    pub fn and(&self, children: Vec<FormulaId>) -> FormulaId {
        match self.gather(children, true) {
            Err(absorbed) => absorbed,
            Ok(mut kids) => {
                kids.sort_unstable();
                kids.dedup();
                match kids.len() {
                    0 => self.top(),
                    1 => kids[0],
                    _ => {
                        if self.has_complementary_pair(&kids) {
                            self.bottom()
                        } else {
                            self.intern_formula(Formula::And(kids))
                        }
                    }
                }
            }
        }
    }

    pub fn or(&self, children: Vec<FormulaId>) -> FormulaId {
        match self.gather(children, false) {
            Err(absorbed) => absorbed,
            Ok(mut kids) => {
                kids.sort_unstable();
                kids.dedup();
                match kids.len() {
                    0 => self.bottom(),
                    1 => kids[0],
                    _ => {
                        if self.has_complementary_pair(&kids) {
                            self.top()
                        } else {
                            self.intern_formula(Formula::Or(kids))
                        }
                    }
                }
            }
        }
    }

    /// Flatten same-connective children, drop the neutral constant and
    /// absorb on the dominating one (⊥ for ∧, ⊤ for ∨).
    fn gather(
        &self,
        children: Vec<FormulaId>,
        conjunction: bool,
    ) -> Result<Vec<FormulaId>, FormulaId> {
        let mut out = Vec::with_capacity(children.len());
        let mut stack: Vec<FormulaId> = children.into_iter().rev().collect();
        while let Some(c) = stack.pop() {
            match self.formula(c) {
                Formula::True => {
                    if !conjunction {
                        return Err(self.top());
                    }
                }
                Formula::False => {
                    if conjunction {
                        return Err(self.bottom());
                    }
                }
                Formula::And(kids) if conjunction => {
                    stack.extend(kids.into_iter().rev())
                }
                Formula::Or(kids) if !conjunction => {
                    stack.extend(kids.into_iter().rev())
                }
                _ => out.push(c),
            }
        }
        Ok(out)
    }

    fn has_complementary_pair(&self, kids: &[FormulaId]) -> bool {
        let set: BTreeSet<FormulaId> = kids.iter().copied().collect();
        for &c in kids {
            match self.formula(c) {
                Formula::Lit(l) => {
                    if set.contains(&self.lit(!l)) {
                        return true;
                    }
                }
                Formula::Not(g) => {
                    if set.contains(&g) {
                        return true;
                    }
                }
                _ => {}
            }
        }
        false
    }

    pub fn implies(&self, a: FormulaId, b: FormulaId) -> FormulaId {
        if a == b {
            return self.top();
        }
        match (self.formula(a), self.formula(b)) {
            (Formula::True, _) => b,
            (Formula::False, _) => self.top(),
            (_, Formula::True) => self.top(),
            (_, Formula::False) => self.not(a),
            _ => self.intern_formula(Formula::Implies(a, b)),
        }
    }

    pub fn iff(&self, a: FormulaId, b: FormulaId) -> FormulaId {
        if a == b {
            return self.top();
        }
        if self.complements(a, b) {
            return self.bottom();
        }
        match (self.formula(a), self.formula(b)) {
            (Formula::True, _) => b,
            (_, Formula::True) => a,
            (Formula::False, _) => self.not(b),
            (_, Formula::False) => self.not(a),
            _ => {
                let (lo, hi) = if a < b { (a, b) } else { (b, a) };
                self.intern_formula(Formula::Iff(lo, hi))
            }
        }
    }

    pub fn xor(&self, a: FormulaId, b: FormulaId) -> FormulaId {
        if a == b {
            return self.bottom();
        }
        if self.complements(a, b) {
            return self.top();
        }
        match (self.formula(a), self.formula(b)) {
            (Formula::False, _) => b,
            (_, Formula::False) => a,
            (Formula::True, _) => self.not(b),
            (_, Formula::True) => self.not(a),
            _ => {
                let (lo, hi) = if a < b { (a, b) } else { (b, a) };
                self.intern_formula(Formula::Xor(lo, hi))
            }
        }
    }

    pub fn ite(&self, c: FormulaId, t: FormulaId, e: FormulaId) -> FormulaId {
        if t == e {
            return t;
        }
        match self.formula(c) {
            Formula::True => return t,
            Formula::False => return e,
            _ => {}
        }
        match (self.formula(t), self.formula(e)) {
            (Formula::True, Formula::False) => c,
            (Formula::False, Formula::True) => self.not(c),
            _ => self.intern_formula(Formula::Ite(c, t, e)),
        }
    }

    fn complements(&self, a: FormulaId, b: FormulaId) -> bool {
        match (self.formula(a), self.formula(b)) {
            (Formula::Lit(x), Formula::Lit(y)) => x == !y,
            (Formula::Not(g), _) => g == b,
            (_, Formula::Not(g)) => g == a,
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // Comparison constructors (canonical LRA atoms)
    // ------------------------------------------------------------------

    /// `lhs ≤ rhs`
    pub fn le(&self, lhs: TermId, rhs: TermId) -> WmiResult<FormulaId> {
        self.comparison(lhs, rhs, false)
    }

    /// `lhs < rhs`
    pub fn lt(&self, lhs: TermId, rhs: TermId) -> WmiResult<FormulaId> {
        self.comparison(lhs, rhs, true)
    }

    /// `lhs ≥ rhs`, stored as the negation of `lhs < rhs`
    pub fn ge(&self, lhs: TermId, rhs: TermId) -> WmiResult<FormulaId> {
        Ok(self.not(self.lt(lhs, rhs)?))
    }

    /// `lhs > rhs`, stored as the negation of `lhs ≤ rhs`
    pub fn gt(&self, lhs: TermId, rhs: TermId) -> WmiResult<FormulaId> {
        Ok(self.not(self.le(lhs, rhs)?))
    }

    /// `lhs = rhs`, rewritten as `≤ ∧ ≥`
    pub fn eq(&self, lhs: TermId, rhs: TermId) -> WmiResult<FormulaId> {
        let le = self.le(lhs, rhs)?;
        let ge = self.ge(lhs, rhs)?;
        Ok(self.and(vec![le, ge]))
    }

    fn comparison(
        &self,
        lhs: TermId,
        rhs: TermId,
        strict: bool,
    ) -> WmiResult<FormulaId> {
        let expr = linearize(self, lhs)?.sub(&linearize(self, rhs)?);
        Ok(match LinearConstraint::normalize(expr, strict) {
            Canonical::Truth(true) => self.top(),
            Canonical::Truth(false) => self.bottom(),
            Canonical::Atom(c) => self.atom(self.linear_atom(c)),
        })
    }

    // ------------------------------------------------------------------
    // Term constructors
    // ------------------------------------------------------------------

    pub fn constant(&self, c: BigRational) -> TermId {
        self.intern_term(Term::Const(c))
    }

    /// Integer constant convenience.
    pub fn int(&self, i: i64) -> TermId {
        self.constant(BigRational::from(BigInt::from(i)))
    }

    /// Rational constant convenience.
    pub fn ratio(&self, numer: i64, denom: i64) -> TermId {
        self.constant(BigRational::new(BigInt::from(numer), BigInt::from(denom)))
    }

    pub fn var_term(&self, v: VarId) -> TermId {
        self.intern_term(Term::Var(v))
    }

    pub fn add(&self, parts: Vec<TermId>) -> TermId {
        let mut flat = Vec::with_capacity(parts.len());
        let mut acc = BigRational::zero();
        let mut stack: Vec<TermId> = parts.into_iter().rev().collect();
        while let Some(p) = stack.pop() {
            match self.term(p) {
                Term::Const(c) => acc += c,
                Term::Add(kids) => stack.extend(kids.into_iter().rev()),
                _ => flat.push(p),
            }
        }
        if !acc.is_zero() || flat.is_empty() {
            flat.push(self.constant(acc));
        }
        flat.sort_unstable();
        match flat.len() {
            1 => flat[0],
            _ => self.intern_term(Term::Add(flat)),
        }
    }

    pub fn sub(&self, a: TermId, b: TermId) -> TermId {
        match (self.term(a), self.term(b)) {
            (Term::Const(x), Term::Const(y)) => self.constant(x - y),
            (_, Term::Const(y)) if y.is_zero() => a,
            _ => self.intern_term(Term::Sub(a, b)),
        }
    }

    pub fn neg(&self, a: TermId) -> TermId {
        match self.term(a) {
            Term::Const(c) => self.constant(-c),
            Term::Neg(inner) => inner,
            _ => self.intern_term(Term::Neg(a)),
        }
    }

    pub fn mul(&self, parts: Vec<TermId>) -> TermId {
        let mut flat = Vec::with_capacity(parts.len());
        let mut acc = BigRational::one();
        let mut stack: Vec<TermId> = parts.into_iter().rev().collect();
        while let Some(p) = stack.pop() {
            match self.term(p) {
                Term::Const(c) => acc *= c,
                Term::Mul(kids) => stack.extend(kids.into_iter().rev()),
                _ => flat.push(p),
            }
        }
        if acc.is_zero() {
            return self.constant(BigRational::zero());
        }
        if !acc.is_one() || flat.is_empty() {
            flat.push(self.constant(acc));
        }
        flat.sort_unstable();
        match flat.len() {
            1 => flat[0],
            _ => self.intern_term(Term::Mul(flat)),
        }
    }

    /// Division folds a non-zero constant divisor into a product; any
    /// other divisor survives as a node and is rejected when the weight
    /// is decomposed.
    pub fn div(&self, a: TermId, b: TermId) -> TermId {
        match self.term(b) {
            Term::Const(c) if !c.is_zero() => {
                let recip = self.constant(c.recip());
                self.mul(vec![a, recip])
            }
            _ => self.intern_term(Term::Div(a, b)),
        }
    }

    pub fn pow(&self, a: TermId, exp: u32) -> TermId {
        match exp {
            0 => self.int(1),
            1 => a,
            _ => match self.term(a) {
                Term::Const(c) => {
                    let mut acc = BigRational::one();
                    for _ in 0..exp {
                        acc *= c.clone();
                    }
                    self.constant(acc)
                }
                _ => self.intern_term(Term::Pow(a, exp)),
            },
        }
    }

    /// Conditional term. Identical branches collapse, so conditions that
    /// cannot influence the value never allocate a decomposition label.
    pub fn ite_term(&self, c: FormulaId, t: TermId, e: TermId) -> TermId {
        if t == e {
            return t;
        }
        match self.formula(c) {
            Formula::True => t,
            Formula::False => e,
            _ => self.intern_term(Term::Ite(c, t, e)),
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn formula(&self, f: FormulaId) -> Formula {
        self.inner.read().unwrap().formulas[f.0 as usize].clone()
    }

    pub fn term(&self, t: TermId) -> Term {
        self.inner.read().unwrap().terms[t.0 as usize].clone()
    }

    /// Free atoms of a formula (cached at intern time).
    pub fn atoms_of(&self, f: FormulaId) -> Arc<BTreeSet<AtomId>> {
        self.inner.read().unwrap().formula_meta[f.0 as usize]
            .atoms
            .clone()
    }

    /// Free real variables of a formula.
    pub fn reals_of(&self, f: FormulaId) -> Arc<BTreeSet<VarId>> {
        self.inner.read().unwrap().formula_meta[f.0 as usize]
            .reals
            .clone()
    }

    /// Free atoms of a term (conditions included).
    pub fn term_atoms_of(&self, t: TermId) -> Arc<BTreeSet<AtomId>> {
        self.inner.read().unwrap().term_meta[t.0 as usize].atoms.clone()
    }

    /// Free real variables of a term.
    pub fn term_reals_of(&self, t: TermId) -> Arc<BTreeSet<VarId>> {
        self.inner.read().unwrap().term_meta[t.0 as usize].reals.clone()
    }

    pub fn term_as_const(&self, t: TermId) -> Option<BigRational> {
        match self.term(t) {
            Term::Const(c) => Some(c),
            _ => None,
        }
    }

    pub fn formula_count(&self) -> usize {
        self.inner.read().unwrap().formulas.len()
    }

    pub fn term_count(&self) -> usize {
        self.inner.read().unwrap().terms.len()
    }

    // ------------------------------------------------------------------
    // Interning
    // ------------------------------------------------------------------

    fn intern_formula(&self, node: Formula) -> FormulaId {
        if let Some(id) = self.inner.read().unwrap().formula_index.get(&node) {
            return *id;
        }
        let mut inner = self.inner.write().unwrap();
        if let Some(id) = inner.formula_index.get(&node) {
            return *id;
        }
        let meta = formula_meta(&inner, &node);
        let id = FormulaId(inner.formulas.len() as u32);
        inner.formula_index.insert(node.clone(), id);
        inner.formulas.push(node);
        inner.formula_meta.push(meta);
        id
    }

    fn intern_term(&self, node: Term) -> TermId {
        if let Some(id) = self.inner.read().unwrap().term_index.get(&node) {
            return *id;
        }
        let mut inner = self.inner.write().unwrap();
        if let Some(id) = inner.term_index.get(&node) {
            return *id;
        }
        let meta = term_meta(&inner, &node);
        let id = TermId(inner.terms.len() as u32);
        inner.term_index.insert(node.clone(), id);
        inner.terms.push(node);
        inner.term_meta.push(meta);
        id
    }
}

fn union_meta(children: impl IntoIterator<Item = NodeMeta>) -> NodeMeta {
    let mut atoms = BTreeSet::new();
    let mut reals = BTreeSet::new();
    for m in children {
        atoms.extend(m.atoms.iter().copied());
        reals.extend(m.reals.iter().copied());
    }
    NodeMeta {
        atoms: Arc::new(atoms),
        reals: Arc::new(reals),
    }
}

fn atom_meta(inner: &PoolInner, a: AtomId) -> NodeMeta {
    let mut atoms = BTreeSet::new();
    atoms.insert(a);
    let mut reals = BTreeSet::new();
    if let AtomKind::Linear(c) = &inner.atoms[a.index()] {
        reals.extend(c.variables());
    }
    NodeMeta {
        atoms: Arc::new(atoms),
        reals: Arc::new(reals),
    }
}

fn formula_meta(inner: &PoolInner, node: &Formula) -> NodeMeta {
    let fm = |f: &FormulaId| inner.formula_meta[f.0 as usize].clone();
    match node {
        Formula::True | Formula::False => NodeMeta::empty(),
        Formula::Lit(l) => atom_meta(inner, l.atom),
        Formula::Not(g) => fm(g),
        Formula::And(kids) | Formula::Or(kids) => {
            union_meta(kids.iter().map(fm))
        }
        Formula::Implies(a, b) | Formula::Iff(a, b) | Formula::Xor(a, b) => {
            union_meta([fm(a), fm(b)])
        }
        Formula::Ite(c, t, e) => union_meta([fm(c), fm(t), fm(e)]),
    }
}

fn term_meta(inner: &PoolInner, node: &Term) -> NodeMeta {
    let tm = |t: &TermId| inner.term_meta[t.0 as usize].clone();
    let fm = |f: &FormulaId| inner.formula_meta[f.0 as usize].clone();
    match node {
        Term::Const(_) => NodeMeta::empty(),
        Term::Var(v) => {
            let mut reals = BTreeSet::new();
            reals.insert(*v);
            NodeMeta {
                atoms: Arc::new(BTreeSet::new()),
                reals: Arc::new(reals),
            }
        }
        Term::Add(kids) | Term::Mul(kids) => union_meta(kids.iter().map(tm)),
        Term::Sub(a, b) | Term::Div(a, b) => union_meta([tm(a), tm(b)]),
        Term::Neg(a) => tm(a),
        Term::Pow(a, _) => tm(a),
        Term::Ite(c, t, e) => union_meta([fm(c), tm(t), tm(e)]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning_shares_nodes() {
        let env = Environment::new();
        let a = env.bool_atom("a");
        let b = env.bool_atom("b");
        let f1 = env.and(vec![env.atom(a), env.atom(b)]);
        let f2 = env.and(vec![env.atom(b), env.atom(a)]);
        assert_eq!(f1, f2);
        assert_eq!(env.bool_atom("a"), a);
    }

    #[test]
    fn test_complementary_literals_fold() {
        let env = Environment::new();
        let a = env.bool_atom("a");
        let pos = env.atom(a);
        let neg = env.not(pos);
        assert_eq!(env.or(vec![pos, neg]), env.top());
        assert_eq!(env.and(vec![pos, neg]), env.bottom());
    }

    #[test]
    fn test_nested_connectives_flatten() {
        let env = Environment::new();
        let a = env.atom(env.bool_atom("a"));
        let b = env.atom(env.bool_atom("b"));
        let c = env.atom(env.bool_atom("c"));
        let nested = env.and(vec![a, env.and(vec![b, c])]);
        let flat = env.and(vec![a, b, c]);
        assert_eq!(nested, flat);
    }

    #[test]
    fn test_comparison_canonicalization_shares_atoms() {
        let env = Environment::new();
        let x = env.var_term(env.real_var("x"));
        let two_x = env.mul(vec![env.int(2), x]);
        // 2x ≤ 6 and x ≤ 3 intern to the same atom
        let f1 = env.le(two_x, env.int(6)).unwrap();
        let f2 = env.le(x, env.int(3)).unwrap();
        assert_eq!(f1, f2);
        // x ≥ 3 is the negated strict literal over the same variable
        let f3 = env.ge(x, env.int(3)).unwrap();
        match env.formula(f3) {
            Formula::Lit(l) => assert!(l.negated),
            other => panic!("expected a literal, got {other:?}"),
        }
    }

    #[test]
    fn test_constant_comparisons_fold() {
        let env = Environment::new();
        assert_eq!(env.le(env.int(0), env.int(1)).unwrap(), env.top());
        assert_eq!(env.lt(env.int(1), env.int(1)).unwrap(), env.bottom());
        assert_eq!(env.le(env.int(1), env.int(1)).unwrap(), env.top());
    }

    #[test]
    fn test_ite_identical_branches_collapse() {
        let env = Environment::new();
        let a = env.atom(env.bool_atom("a"));
        let x = env.var_term(env.real_var("x"));
        assert_eq!(env.ite_term(a, x, x), x);
    }

    #[test]
    fn test_term_constant_folding() {
        let env = Environment::new();
        let x = env.var_term(env.real_var("x"));
        assert_eq!(env.add(vec![env.int(2), env.int(3)]), env.int(5));
        assert_eq!(env.mul(vec![env.int(0), x]), env.int(0));
        assert_eq!(env.pow(x, 1), x);
        // division by a constant folds into a scaled product
        let half_x = env.div(x, env.int(2));
        assert_eq!(half_x, env.mul(vec![env.ratio(1, 2), x]));
    }

    #[test]
    fn test_free_sets_cached() {
        let env = Environment::new();
        let a = env.bool_atom("a");
        let x = env.real_var("x");
        let xt = env.var_term(x);
        let cmp = env.le(xt, env.int(1)).unwrap();
        let f = env.and(vec![env.atom(a), cmp]);
        let atoms = env.atoms_of(f);
        assert_eq!(atoms.len(), 2);
        assert!(atoms.contains(&a));
        let reals = env.reals_of(f);
        assert!(reals.contains(&x));
    }
}
