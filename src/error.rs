use thiserror::Error;

/// Failures of the dispatch engine, from model construction through solving.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    /// A time series does not have exactly one value per timestep.
    #[error("Shape mismatch for {what}: expected {expected} timesteps, got {actual}")]
    ShapeMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },

    /// A structural parameter is outside its documented range.
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Problem is infeasible")]
    Infeasible,

    #[error("Problem is unbounded")]
    Unbounded,

    /// The solver failed to run or exceeded its time limit.
    #[error("Solver error: {0}")]
    Solver(String),
}

impl DispatchError {
    pub(crate) fn shape(what: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::ShapeMismatch {
            what: what.into(),
            expected,
            actual,
        }
    }

    pub(crate) fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// True for the outcomes produced by the solver rather than by model construction.
    pub fn is_solve_failure(&self) -> bool {
        matches!(self, Self::Infeasible | Self::Unbounded | Self::Solver(_))
    }
}

pub type Result<T, E = DispatchError> = std::result::Result<T, E>;
