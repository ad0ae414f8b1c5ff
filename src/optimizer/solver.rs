//! Solver seam.
//!
//! The dispatch model only depends on [`LpSolver`]; the concrete backend is
//! chosen at runtime. [`GoodLpSolver`] hands the program to `good_lp`: the
//! pure-Rust simplex `microlp` by default, the Clarabel interior-point method
//! on request, and HiGHS when the `highs` feature is enabled.

use good_lp::solvers::clarabel::clarabel;
use good_lp::solvers::microlp::microlp;
use good_lp::variable::UnsolvedProblem;
use good_lp::{
    constraint, variable, Constraint, Expression, ProblemVariables, ResolutionError, Solution,
    Solver, SolverModel, Variable,
};
use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::debug;

use super::program::{ConstraintKind, LinearProgram};
use crate::error::{DispatchError, Result};

/// Rows without variables are checked locally with this tolerance.
const CONSTANT_ROW_TOLERANCE: f64 = 1e-9;

/// Result of a single solver invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum SolveOutcome {
    /// Variable values indexed by `VarId`, and the objective value.
    Optimal { values: Vec<f64>, objective: f64 },
    Infeasible,
    Unbounded,
    SolverError { message: String },
}

impl SolveOutcome {
    pub fn is_optimal(&self) -> bool {
        matches!(self, SolveOutcome::Optimal { .. })
    }

    /// Values and objective of an optimal solve; every other outcome is an error.
    pub fn into_result(self) -> Result<(Vec<f64>, f64)> {
        match self {
            SolveOutcome::Optimal { values, objective } => Ok((values, objective)),
            SolveOutcome::Infeasible => Err(DispatchError::Infeasible),
            SolveOutcome::Unbounded => Err(DispatchError::Unbounded),
            SolveOutcome::SolverError { message } => Err(DispatchError::Solver(message)),
        }
    }
}

/// Anything that can solve a [`LinearProgram`] to optimality.
///
/// Implementations must be deterministic for a fixed input.
#[cfg_attr(test, mockall::automock)]
pub trait LpSolver: Send + Sync {
    fn name(&self) -> &'static str;

    fn solve(&self, program: &LinearProgram) -> SolveOutcome;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SolverBackend {
    /// Primal/dual simplex, pure Rust. Returns vertex solutions.
    #[default]
    Microlp,
    /// Interior point, pure Rust. Degenerate optima come back as interior
    /// points of the optimal face.
    Clarabel,
    /// Dual simplex, requires the `highs` feature.
    #[cfg(feature = "highs")]
    Highs,
}

/// [`LpSolver`] backed by `good_lp`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoodLpSolver {
    backend: SolverBackend,
}

impl GoodLpSolver {
    pub fn new(backend: SolverBackend) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> SolverBackend {
        self.backend
    }
}

impl LpSolver for GoodLpSolver {
    fn name(&self) -> &'static str {
        match self.backend {
            SolverBackend::Microlp => "microlp",
            SolverBackend::Clarabel => "clarabel",
            #[cfg(feature = "highs")]
            SolverBackend::Highs => "highs",
        }
    }

    fn solve(&self, program: &LinearProgram) -> SolveOutcome {
        if let Some(row) = program.violated_constant_row(CONSTANT_ROW_TOLERANCE) {
            debug!(row, "constant row cannot be satisfied");
            return SolveOutcome::Infeasible;
        }

        if program.num_variables() == 0 {
            return SolveOutcome::Optimal {
                values: Vec::new(),
                objective: program.objective_constant(),
            };
        }

        let mut vars = ProblemVariables::new();
        let handles: Vec<Variable> = program
            .variables()
            .iter()
            .map(|def| {
                let mut v = variable().min(def.lower);
                if let Some(upper) = def.upper {
                    v = v.max(upper);
                }
                vars.add(v)
            })
            .collect();

        let objective: Expression = program
            .objective()
            .iter()
            .map(|(id, coef)| *coef * handles[id.0])
            .sum();

        let rows: Vec<Constraint> = program
            .constraints()
            .iter()
            .filter(|row| !row.terms.is_empty())
            .map(|row| {
                let lhs: Expression = row
                    .terms
                    .iter()
                    .map(|(id, coef)| *coef * handles[id.0])
                    .sum();
                let rhs = row.rhs;
                match row.kind {
                    ConstraintKind::Eq => constraint!(lhs == rhs),
                    ConstraintKind::Le => constraint!(lhs <= rhs),
                    ConstraintKind::Ge => constraint!(lhs >= rhs),
                }
            })
            .collect();

        let problem = vars.minimise(objective);
        let solved = match self.backend {
            SolverBackend::Microlp => solve_with(microlp, problem, rows, &handles),
            // Clarabel reports a dual-infeasible problem as solved, so only
            // programs whose objective is bounded by the variable bounds go there.
            SolverBackend::Clarabel if program.objective_bounded_below() => {
                solve_with(clarabel, problem, rows, &handles)
            }
            SolverBackend::Clarabel => {
                debug!("objective not bounded by variable bounds, solving with microlp");
                solve_with(microlp, problem, rows, &handles)
            }
            #[cfg(feature = "highs")]
            SolverBackend::Highs => {
                solve_with(good_lp::solvers::highs::highs, problem, rows, &handles)
            }
        };

        match solved {
            Ok(values) => {
                let objective = program.evaluate_objective(&values);
                SolveOutcome::Optimal { values, objective }
            }
            Err(ResolutionError::Infeasible) => SolveOutcome::Infeasible,
            Err(ResolutionError::Unbounded) => SolveOutcome::Unbounded,
            Err(other) => SolveOutcome::SolverError {
                message: other.to_string(),
            },
        }
    }
}

fn solve_with<S>(
    solver: S,
    problem: UnsolvedProblem,
    rows: Vec<Constraint>,
    handles: &[Variable],
) -> std::result::Result<Vec<f64>, ResolutionError>
where
    S: Solver,
    S::Model: SolverModel<Error = ResolutionError>,
{
    let mut model = problem.using(solver);
    for row in rows {
        model = model.with(row);
    }
    let solution = model.solve()?;
    Ok(handles.iter().map(|v| solution.value(*v)).collect())
}
