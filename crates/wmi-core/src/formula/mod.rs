//! Formula and term intermediate representation

pub mod linear;
pub mod transform;
pub mod types;

pub use linear::{linearize, Canonical, LinearConstraint, LinearExpr};
pub use transform::{
    simplify, substitute, substitute_atom, to_cnf, to_nnf, truth_value,
};
pub use types::{
    AtomId, AtomKind, Formula, FormulaId, Lit, Term, TermId, TruthAssignment,
    VarId,
};
