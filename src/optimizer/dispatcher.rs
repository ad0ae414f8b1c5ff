use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tracing::{info, warn};

use super::model::DispatchModel;
use super::results::ResultSet;
use super::solver::{GoodLpSolver, LpSolver, SolverBackend};
use crate::error::{DispatchError, Result};

/// Runs dispatch models against a solver, optionally under a wall-clock budget.
///
/// Each model is solved exactly once and independently; nothing is shared
/// between invocations except the stateless solver handle.
#[derive(Clone)]
pub struct Dispatcher {
    solver: Arc<dyn LpSolver>,
    time_limit: Option<Duration>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(Arc::new(GoodLpSolver::default()))
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("solver", &self.solver.name())
            .field("time_limit", &self.time_limit)
            .finish()
    }
}

impl Dispatcher {
    pub fn new(solver: Arc<dyn LpSolver>) -> Self {
        Self {
            solver,
            time_limit: None,
        }
    }

    pub fn with_backend(backend: SolverBackend) -> Self {
        Self::new(Arc::new(GoodLpSolver::new(backend)))
    }

    /// Budget for [`Dispatcher::dispatch_async`]; expiry is a solver error.
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit
    }

    pub fn solver_name(&self) -> &'static str {
        self.solver.name()
    }

    /// Blocking single-shot solve.
    pub fn dispatch(&self, model: DispatchModel) -> Result<ResultSet> {
        let bus = model.bus().label().to_string();
        let started = Instant::now();
        let result = model.solve(self.solver.as_ref());
        log_outcome(&bus, self.solver.name(), started.elapsed(), &result);
        result
    }

    /// Solve on the blocking pool, bounded by the time limit if one is set.
    ///
    /// On timeout the solve keeps running in the background and its result
    /// is discarded.
    pub async fn dispatch_async(&self, model: DispatchModel) -> Result<ResultSet> {
        let this = self.clone();
        let task = tokio::task::spawn_blocking(move || this.dispatch(model));

        let joined = match self.time_limit {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(
                        solver = self.solver.name(),
                        limit_ms = limit.as_millis() as u64,
                        "solver exceeded time limit"
                    );
                    return Err(DispatchError::Solver(format!(
                        "time limit of {limit:?} exceeded"
                    )));
                }
            },
            None => task.await,
        };

        joined.map_err(|e| DispatchError::Solver(format!("solver task failed: {e}")))?
    }

    /// Solve independent models concurrently. Results keep the input order.
    pub async fn dispatch_many(&self, models: Vec<DispatchModel>) -> Vec<Result<ResultSet>> {
        info!(count = models.len(), "dispatching batch");
        join_all(models.into_iter().map(|model| self.dispatch_async(model))).await
    }
}

fn log_outcome(bus: &str, solver: &str, elapsed: Duration, result: &Result<ResultSet>) {
    let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
    match result {
        Ok(results) => info!(
            bus,
            solver,
            elapsed_ms,
            total_cost = results.total_cost(),
            "dispatch solved to optimality"
        ),
        Err(DispatchError::Infeasible) => {
            warn!(bus, solver, elapsed_ms, "dispatch problem is infeasible")
        }
        Err(DispatchError::Unbounded) => {
            warn!(bus, solver, elapsed_ms, "dispatch problem is unbounded")
        }
        Err(e) => warn!(bus, solver, elapsed_ms, error = %e, "dispatch failed"),
    }
}
