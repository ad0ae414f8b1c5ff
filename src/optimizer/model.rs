//! Dispatch formulation.
//!
//! Compiles a [`Bus`] and its nodes into one static LP:
//! - one variable per free flow and timestep, bounded by the nominal capacity
//! - fixed-profile flows enter as constants, never as variables
//! - one balance row per timestep
//! - one state-of-charge row per storage and timestep
//!
//! There are no integer variables, so a storage may charge and discharge in
//! the same timestep.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::program::{ConstraintKind, LinearProgram, VarId};
use super::results::{FlowSeries, ResultSet, StorageSeries};
use super::solver::LpSolver;
use crate::domain::{Bus, FlowDirection, Storage, TimeGrid};
use crate::error::{DispatchError, Result};

/// Value of a flow at one timestep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FlowValue {
    Variable(VarId),
    Fixed(f64),
}

impl FlowValue {
    fn resolve(self, values: &[f64]) -> f64 {
        match self {
            FlowValue::Variable(id) => values[id.0],
            FlowValue::Fixed(v) => v,
        }
    }
}

/// Initial content of a storage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum InitialLevel {
    Fixed(f64),
    Free(VarId),
}

#[derive(Debug, Clone)]
struct FlowSlot {
    label: String,
    node: String,
    direction: FlowDirection,
    values: Vec<FlowValue>,
}

#[derive(Debug, Clone)]
struct StorageSlot {
    label: String,
    initial: InitialLevel,
    soc: Vec<VarId>,
}

/// The LP of one dispatch instance, built once and consumed by [`DispatchModel::solve`].
#[derive(Debug, Clone)]
pub struct DispatchModel {
    bus: Bus,
    program: LinearProgram,
    flows: Vec<FlowSlot>,
    storages: Vec<StorageSlot>,
}

impl DispatchModel {
    pub fn build(bus: Bus) -> Result<Self> {
        if bus.nodes().is_empty() {
            return Err(DispatchError::invalid(
                "bus",
                format!("bus '{}' has no nodes to dispatch", bus.label()),
            ));
        }

        let grid = bus.grid().clone();
        for node in bus.nodes() {
            node.check_against(&grid)?;
        }
        let mut program = LinearProgram::new();

        let flows = bus
            .flows()
            .into_iter()
            .map(|(label, node, flow)| {
                let values = (0..grid.len())
                    .map(|t| {
                        let energy_cost = flow.spec.cost_at(t) * grid.duration(t);
                        match flow.spec.fixed_value(t) {
                            Some(v) => {
                                program.add_objective_constant(energy_cost * v);
                                FlowValue::Fixed(v)
                            }
                            None => {
                                let id = program.add_variable(
                                    format!("flow[{label}][{t}]"),
                                    0.0,
                                    flow.spec.upper_bound(),
                                );
                                program.add_objective_term(id, energy_cost);
                                FlowValue::Variable(id)
                            }
                        }
                    })
                    .collect();
                FlowSlot {
                    label,
                    node: node.label().to_string(),
                    direction: flow.direction,
                    values,
                }
            })
            .collect::<Vec<_>>();

        add_balance_rows(&mut program, &grid, &flows);

        let storages = bus
            .storages()
            .map(|storage| add_storage_rows(&mut program, &grid, storage, &flows))
            .collect();

        info!(
            bus = bus.label(),
            timesteps = grid.len(),
            variables = program.num_variables(),
            constraints = program.num_constraints(),
            "built dispatch model"
        );

        Ok(Self {
            bus,
            program,
            flows,
            storages,
        })
    }

    pub fn program(&self) -> &LinearProgram {
        &self.program
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn grid(&self) -> &TimeGrid {
        self.bus.grid()
    }

    /// Per-timestep values of a flow, by `from->to` identifier.
    pub fn flow_values(&self, label: &str) -> Option<&[FlowValue]> {
        self.flows
            .iter()
            .find(|f| f.label == label)
            .map(|f| f.values.as_slice())
    }

    pub fn storage_initial(&self, label: &str) -> Option<InitialLevel> {
        self.storages
            .iter()
            .find(|s| s.label == label)
            .map(|s| s.initial)
    }

    /// Solve once and extract the result. The model is consumed.
    pub fn solve(self, solver: &dyn LpSolver) -> Result<ResultSet> {
        debug!(solver = solver.name(), "solving dispatch model");
        let outcome = solver.solve(&self.program);
        let (values, objective) = outcome.into_result()?;
        if values.len() != self.program.num_variables() {
            return Err(DispatchError::Solver(format!(
                "{} returned {} values for {} variables",
                solver.name(),
                values.len(),
                self.program.num_variables()
            )));
        }
        Ok(self.extract(&values, objective))
    }

    /// Read solved variable values (or fixed constants) back into series.
    /// `values` holds one entry per program variable.
    pub(crate) fn extract(&self, values: &[f64], objective: f64) -> ResultSet {
        let flows = self
            .flows
            .iter()
            .map(|slot| FlowSeries {
                label: slot.label.clone(),
                node: slot.node.clone(),
                direction: slot.direction,
                values: slot.values.iter().map(|v| v.resolve(values)).collect(),
            })
            .collect();

        let storages = self
            .storages
            .iter()
            .map(|slot| StorageSeries {
                label: slot.label.clone(),
                initial: match slot.initial {
                    InitialLevel::Fixed(v) => v,
                    InitialLevel::Free(id) => values[id.0],
                },
                soc: slot.soc.iter().map(|id| values[id.0]).collect(),
            })
            .collect();

        ResultSet::new(
            self.bus.label(),
            self.grid().timestamps(),
            flows,
            storages,
            objective,
        )
    }
}

/// `Σ into-bus flows − Σ out-of-bus flows = 0` at every timestep.
fn add_balance_rows(program: &mut LinearProgram, grid: &TimeGrid, flows: &[FlowSlot]) {
    for t in 0..grid.len() {
        let mut terms = Vec::new();
        let mut rhs = 0.0;
        for slot in flows {
            let sign = slot.direction.sign();
            match slot.values[t] {
                FlowValue::Variable(id) => terms.push((id, sign)),
                FlowValue::Fixed(v) => rhs -= sign * v,
            }
        }
        program.add_constraint(format!("balance[{t}]"), terms, ConstraintKind::Eq, rhs);
    }
}

/// SoC variables and the recurrence
/// `soc[t] = soc[t-1] * retention + dt * (charge * ce - discharge / de)`,
/// with the initial level standing in for `soc[-1]`.
fn add_storage_rows(
    program: &mut LinearProgram,
    grid: &TimeGrid,
    storage: &Storage,
    flows: &[FlowSlot],
) -> StorageSlot {
    let p = &storage.params;
    let cap = p.nominal_storage_capacity;
    let charge = slot_values(flows, &storage.label, FlowDirection::FromBus);
    let discharge = slot_values(flows, &storage.label, FlowDirection::IntoBus);

    let initial = match p.initial_content() {
        Some(content) => InitialLevel::Fixed(content),
        None => InitialLevel::Free(program.add_variable(
            format!("soc_init[{}]", storage.label),
            0.0,
            Some(cap),
        )),
    };

    let soc: Vec<VarId> = (0..grid.len())
        .map(|t| program.add_variable(format!("soc[{}][{t}]", storage.label), 0.0, Some(cap)))
        .collect();

    for t in 0..grid.len() {
        let dt = grid.duration(t);
        let retention = p.retention(dt);
        let mut terms = vec![(soc[t], 1.0)];
        let mut rhs = 0.0;

        let previous = if t == 0 {
            initial
        } else {
            InitialLevel::Free(soc[t - 1])
        };
        match previous {
            InitialLevel::Fixed(content) => rhs += retention * content,
            InitialLevel::Free(id) => terms.push((id, -retention)),
        }

        let charge_gain = dt * p.charge_efficiency;
        match charge[t] {
            FlowValue::Variable(id) => terms.push((id, -charge_gain)),
            FlowValue::Fixed(v) => rhs += charge_gain * v,
        }

        let discharge_draw = dt / p.discharge_efficiency;
        match discharge[t] {
            FlowValue::Variable(id) => terms.push((id, discharge_draw)),
            FlowValue::Fixed(v) => rhs -= discharge_draw * v,
        }

        program.add_constraint(
            format!("storage[{}][{t}]", storage.label),
            terms,
            ConstraintKind::Eq,
            rhs,
        );
    }

    if p.balanced {
        let last = soc[grid.len() - 1];
        let (terms, rhs) = match initial {
            InitialLevel::Fixed(content) => (vec![(last, 1.0)], content),
            InitialLevel::Free(id) => (vec![(last, 1.0), (id, -1.0)], 0.0),
        };
        program.add_constraint(
            format!("storage_balanced[{}]", storage.label),
            terms,
            ConstraintKind::Eq,
            rhs,
        );
    }

    StorageSlot {
        label: storage.label.clone(),
        initial,
        soc,
    }
}

fn slot_values<'a>(flows: &'a [FlowSlot], node: &str, direction: FlowDirection) -> &'a [FlowValue] {
    flows
        .iter()
        .find(|f| f.node == node && f.direction == direction)
        .map(|f| f.values.as_slice())
        .unwrap_or_default()
}
