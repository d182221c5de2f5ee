//! Error types for weighted model integration

use std::time::Duration;
use thiserror::Error;

/// Main error type for WMI operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WmiError {
    #[error("unsupported weight term: {detail}")]
    UnsupportedWeight { detail: String },

    #[error("non-linear arithmetic atom: {detail}")]
    NonLinearAtom { detail: String },

    #[error("query deadline exceeded after {elapsed:?}")]
    Timeout { elapsed: Duration },

    #[error("no enumerator available: {detail}")]
    NoEnumerator { detail: String },

    #[error("no integrator available: {detail}")]
    NoIntegrator { detail: String },

    #[error("weight leaf underdetermined: label {label} unassigned at integration time")]
    LeafUnderdetermined { label: String },

    #[error("internal inconsistency: {detail}")]
    InternalInconsistency { detail: String },

    #[error("query cancelled")]
    Cancelled,

    #[error("integration region unbounded in variable {variable}")]
    UnboundedRegion { variable: String },
}

impl WmiError {
    /// Create an unsupported-weight error
    pub fn unsupported_weight(detail: impl Into<String>) -> Self {
        Self::UnsupportedWeight {
            detail: detail.into(),
        }
    }

    /// Create a non-linear-atom error
    pub fn non_linear(detail: impl Into<String>) -> Self {
        Self::NonLinearAtom {
            detail: detail.into(),
        }
    }

    /// Create an internal-inconsistency error
    pub fn inconsistency(detail: impl Into<String>) -> Self {
        Self::InternalInconsistency {
            detail: detail.into(),
        }
    }

    /// Fatal errors indicate a solver bug rather than a property of the
    /// input; they propagate without recovery.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::UnsupportedWeight { .. } => false,
            Self::NonLinearAtom { .. } => false,
            Self::Timeout { .. } => false,
            Self::NoEnumerator { .. } => false,
            Self::NoIntegrator { .. } => false,
            Self::LeafUnderdetermined { .. } => true,
            Self::InternalInconsistency { .. } => true,
            Self::Cancelled => false,
            Self::UnboundedRegion { .. } => false,
        }
    }
}

/// Result type for WMI operations
pub type WmiResult<T> = Result<T, WmiError>;
