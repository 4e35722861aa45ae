//! Error types for model construction and use.

use std::error::Error;
use std::fmt;

/// Errors reported by [`crate::model::VbNmtf`] and its collaborators.
///
/// Construction problems (shape mismatches, empty rows/columns, bad
/// hyperparameters) are fatal and surface here. Numerical edge cases
/// during a run are not errors: moment computations clamp to safe
/// values instead of failing.
#[derive(Debug)]
pub enum VbNmtfError {
    /// A matrix did not have the shape required by the model dimensions.
    ShapeMismatch {
        what: &'static str,
        expected: (usize, usize),
        found: (usize, usize),
    },
    /// Row `i` of the mask has no observed entries.
    EmptyRow(usize),
    /// Column `j` of the mask has no observed entries.
    EmptyColumn(usize),
    /// K or L was zero.
    InvalidRank(&'static str),
    /// A hyperparameter that must be strictly positive was not.
    NonPositivePrior(&'static str),
    /// `run`, `predict` or `quality` was called before `initialise`.
    NotInitialised,
    /// The clustering collaborator used for the k-means warm start failed.
    Clustering(String),
}

impl fmt::Display for VbNmtfError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            VbNmtfError::ShapeMismatch {
                what,
                expected,
                found,
            } => write!(
                f,
                "Matrix {} has the wrong shape: {:?} instead of {:?}",
                what, found, expected
            ),
            VbNmtfError::EmptyRow(i) => write!(f, "Fully unobserved row in R, row {}", i),
            VbNmtfError::EmptyColumn(j) => write!(f, "Fully unobserved column in R, column {}", j),
            VbNmtfError::InvalidRank(what) => {
                write!(f, "Rank {} must be at least 1", what)
            }
            VbNmtfError::NonPositivePrior(what) => {
                write!(f, "Prior {} must be strictly positive", what)
            }
            VbNmtfError::NotInitialised => {
                write!(f, "Model has not been initialised; call initialise first")
            }
            VbNmtfError::Clustering(msg) => write!(f, "Clustering failed: {}", msg),
        }
    }
}

impl Error for VbNmtfError {}
