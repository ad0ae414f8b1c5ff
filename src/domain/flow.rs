use serde::{Deserialize, Serialize};
use strum::Display;

use super::TimeGrid;
use crate::error::{DispatchError, Result};

/// Direction of a flow relative to the bus it is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FlowDirection {
    /// Energy injected into the bus (sources, storage discharge).
    IntoBus,
    /// Energy withdrawn from the bus (sinks, storage charge).
    FromBus,
}

impl FlowDirection {
    /// Sign of the flow in the bus balance row.
    pub fn sign(self) -> f64 {
        match self {
            FlowDirection::IntoBus => 1.0,
            FlowDirection::FromBus => -1.0,
        }
    }
}

/// Cost per unit of energy carried by a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableCost {
    Constant(f64),
    PerStep(Vec<f64>),
}

impl Default for VariableCost {
    fn default() -> Self {
        VariableCost::Constant(0.0)
    }
}

impl From<f64> for VariableCost {
    fn from(value: f64) -> Self {
        VariableCost::Constant(value)
    }
}

impl From<Vec<f64>> for VariableCost {
    fn from(values: Vec<f64>) -> Self {
        VariableCost::PerStep(values)
    }
}

impl From<&[f64]> for VariableCost {
    fn from(values: &[f64]) -> Self {
        VariableCost::PerStep(values.to_vec())
    }
}

impl VariableCost {
    /// Cost at step `t`. Per-step costs are validated against the horizon on build.
    pub fn at(&self, t: usize) -> f64 {
        match self {
            VariableCost::Constant(c) => *c,
            VariableCost::PerStep(costs) => costs[t],
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            VariableCost::Constant(c) => *c == 0.0,
            VariableCost::PerStep(costs) => costs.iter().all(|c| *c == 0.0),
        }
    }
}

/// A directed energy flow between a node and the bus.
///
/// Without a fixed profile the flow is a decision variable in
/// `[0, nominal_capacity]` at every step. With one, the flow is pinned to
/// `nominal_capacity * fixed_profile[t]` and never enters the search space.
/// An infinite nominal capacity means the flow has no upper bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSpec {
    nominal_capacity: f64,
    fixed_profile: Option<Vec<f64>>,
    variable_cost: VariableCost,
}

impl FlowSpec {
    pub fn builder(nominal_capacity: f64) -> FlowSpecBuilder {
        FlowSpecBuilder {
            nominal_capacity,
            fixed_profile: None,
            variable_cost: VariableCost::default(),
        }
    }

    pub fn nominal_capacity(&self) -> f64 {
        self.nominal_capacity
    }

    pub fn fixed_profile(&self) -> Option<&[f64]> {
        self.fixed_profile.as_deref()
    }

    pub fn variable_cost(&self) -> &VariableCost {
        &self.variable_cost
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed_profile.is_some()
    }

    /// Upper bound of the decision variable, `None` when uncapped.
    pub fn upper_bound(&self) -> Option<f64> {
        self.nominal_capacity
            .is_finite()
            .then_some(self.nominal_capacity)
    }

    /// Pinned value at step `t` for fixed-profile flows.
    pub fn fixed_value(&self, t: usize) -> Option<f64> {
        self.fixed_profile
            .as_ref()
            .map(|profile| self.nominal_capacity * profile[t])
    }

    pub fn cost_at(&self, t: usize) -> f64 {
        self.variable_cost.at(t)
    }

    /// Check capacity, profile and cost against the horizon.
    ///
    /// Also run by [`Bus::add_node`](super::Bus::add_node), so flows that
    /// arrive through deserialisation are held to the same rules.
    pub fn validate(&self, grid: &TimeGrid) -> Result<()> {
        if self.nominal_capacity.is_nan() || self.nominal_capacity < 0.0 {
            return Err(DispatchError::invalid(
                "nominal_capacity",
                format!("must be non-negative, got {}", self.nominal_capacity),
            ));
        }

        if let Some(profile) = &self.fixed_profile {
            grid.check_len("fixed_profile", profile.len())?;
            if !self.nominal_capacity.is_finite() {
                return Err(DispatchError::invalid(
                    "nominal_capacity",
                    "a fixed profile needs a finite nominal capacity",
                ));
            }
            if let Some((t, v)) = profile
                .iter()
                .enumerate()
                .find(|(_, v)| !v.is_finite() || **v < 0.0)
            {
                return Err(DispatchError::invalid(
                    format!("fixed_profile[{t}]"),
                    format!("must be finite and non-negative, got {v}"),
                ));
            }
        }

        match &self.variable_cost {
            VariableCost::Constant(c) if !c.is_finite() => Err(DispatchError::invalid(
                "variable_cost",
                format!("must be finite, got {c}"),
            )),
            VariableCost::PerStep(costs) => {
                grid.check_len("variable_cost", costs.len())?;
                match costs.iter().enumerate().find(|(_, c)| !c.is_finite()) {
                    Some((t, c)) => Err(DispatchError::invalid(
                        format!("variable_cost[{t}]"),
                        format!("must be finite, got {c}"),
                    )),
                    None => Ok(()),
                }
            }
            VariableCost::Constant(_) => Ok(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FlowSpecBuilder {
    nominal_capacity: f64,
    fixed_profile: Option<Vec<f64>>,
    variable_cost: VariableCost,
}

impl FlowSpecBuilder {
    /// Pin the flow to `nominal_capacity * profile[t]`.
    pub fn fixed(mut self, profile: impl Into<Vec<f64>>) -> Self {
        self.fixed_profile = Some(profile.into());
        self
    }

    pub fn variable_cost(mut self, cost: impl Into<VariableCost>) -> Self {
        self.variable_cost = cost.into();
        self
    }

    /// Validate against the horizon and produce the flow.
    pub fn build(self, grid: &TimeGrid) -> Result<FlowSpec> {
        let spec = FlowSpec {
            nominal_capacity: self.nominal_capacity,
            fixed_profile: self.fixed_profile,
            variable_cost: self.variable_cost,
        };
        spec.validate(grid)?;
        Ok(spec)
    }
}
