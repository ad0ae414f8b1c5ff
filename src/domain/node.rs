use serde::{Deserialize, Serialize};

use super::{FlowDirection, FlowSpec, TimeGrid, VariableCost};
use crate::error::{DispatchError, Result};

/// Producer feeding the bus through one outgoing flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub label: String,
    pub output: FlowSpec,
}

/// Consumer drawing from the bus through one incoming flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sink {
    pub label: String,
    pub input: FlowSpec,
}

/// Scalar parameters of a storage node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageParams {
    /// Usable energy content (kWh).
    pub nominal_storage_capacity: f64,
    /// Fraction of the content lost per hour.
    pub loss_rate: f64,
    /// Share of charged energy that ends up in the store.
    pub charge_efficiency: f64,
    /// Share of withdrawn content that reaches the bus.
    pub discharge_efficiency: f64,
    /// Content before the first step as a fraction of capacity.
    /// `None` leaves it to the optimiser.
    pub initial_storage_level: Option<f64>,
    /// Require the final content to equal the initial content.
    pub balanced: bool,
}

impl StorageParams {
    pub fn new(nominal_storage_capacity: f64) -> Self {
        Self {
            nominal_storage_capacity,
            loss_rate: 0.0,
            charge_efficiency: 1.0,
            discharge_efficiency: 1.0,
            initial_storage_level: Some(1.0),
            balanced: false,
        }
    }

    pub fn with_loss_rate(mut self, loss_rate: f64) -> Self {
        self.loss_rate = loss_rate;
        self
    }

    pub fn with_efficiencies(mut self, charge: f64, discharge: f64) -> Self {
        self.charge_efficiency = charge;
        self.discharge_efficiency = discharge;
        self
    }

    pub fn with_initial_level(mut self, level: Option<f64>) -> Self {
        self.initial_storage_level = level;
        self
    }

    pub fn balanced(mut self, balanced: bool) -> Self {
        self.balanced = balanced;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let cap = self.nominal_storage_capacity;
        if !(cap.is_finite() && cap > 0.0) {
            return Err(DispatchError::invalid(
                "nominal_storage_capacity",
                format!("must be positive and finite, got {cap}"),
            ));
        }
        if !(0.0..1.0).contains(&self.loss_rate) {
            return Err(DispatchError::invalid(
                "loss_rate",
                format!("must be in [0, 1), got {}", self.loss_rate),
            ));
        }
        for (name, eff) in [
            ("charge_efficiency", self.charge_efficiency),
            ("discharge_efficiency", self.discharge_efficiency),
        ] {
            if !(eff > 0.0 && eff <= 1.0) {
                return Err(DispatchError::invalid(
                    name,
                    format!("must be in (0, 1], got {eff}"),
                ));
            }
        }
        if let Some(level) = self.initial_storage_level {
            if !(0.0..=1.0).contains(&level) {
                return Err(DispatchError::invalid(
                    "initial_storage_level",
                    format!("must be a fraction in [0, 1], got {level}"),
                ));
            }
        }
        Ok(())
    }

    /// Share of the content retained over a step of `duration_h` hours.
    pub fn retention(&self, duration_h: f64) -> f64 {
        (1.0 - self.loss_rate).powf(duration_h)
    }

    /// Initial content in energy units, if fixed.
    pub fn initial_content(&self) -> Option<f64> {
        self.initial_storage_level
            .map(|level| level * self.nominal_storage_capacity)
    }
}

/// Battery attached to the bus by a charge flow and a discharge flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Storage {
    pub label: String,
    pub params: StorageParams,
    /// Charge flow, bus -> storage.
    pub inflow: FlowSpec,
    /// Discharge flow, storage -> bus.
    pub outflow: FlowSpec,
}

impl Storage {
    pub fn new(
        label: impl Into<String>,
        params: StorageParams,
        inflow: FlowSpec,
        outflow: FlowSpec,
    ) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            label: label.into(),
            params,
            inflow,
            outflow,
        })
    }

    /// Applies the state-of-charge recurrence to given charge and discharge series.
    ///
    /// `initial` is the content before the first step. Returns the content at
    /// the end of every step.
    pub fn replay_levels(
        &self,
        grid: &TimeGrid,
        initial: f64,
        charge: &[f64],
        discharge: &[f64],
    ) -> Result<Vec<f64>> {
        grid.check_len("charge", charge.len())?;
        grid.check_len("discharge", discharge.len())?;

        let p = &self.params;
        let mut level = initial;
        Ok((0..grid.len())
            .map(|t| {
                let dt = grid.duration(t);
                level = level * p.retention(dt)
                    + dt * (charge[t] * p.charge_efficiency
                        - discharge[t] / p.discharge_efficiency);
                level
            })
            .collect())
    }
}

/// A participant in the bus energy balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Source(Source),
    Sink(Sink),
    Storage(Storage),
}

/// One flow of a node as seen from the bus.
#[derive(Debug, Clone, Copy)]
pub struct NodeFlow<'a> {
    pub spec: &'a FlowSpec,
    pub direction: FlowDirection,
}

impl Node {
    pub fn source(label: impl Into<String>, output: FlowSpec) -> Self {
        Node::Source(Source {
            label: label.into(),
            output,
        })
    }

    pub fn sink(label: impl Into<String>, input: FlowSpec) -> Self {
        Node::Sink(Sink {
            label: label.into(),
            input,
        })
    }

    pub fn storage(
        label: impl Into<String>,
        params: StorageParams,
        inflow: FlowSpec,
        outflow: FlowSpec,
    ) -> Result<Self> {
        Storage::new(label, params, inflow, outflow).map(Node::Storage)
    }

    pub fn label(&self) -> &str {
        match self {
            Node::Source(n) => &n.label,
            Node::Sink(n) => &n.label,
            Node::Storage(n) => &n.label,
        }
    }

    /// Flows of this node; storage yields charge first, then discharge.
    pub fn flows(&self) -> Vec<NodeFlow<'_>> {
        match self {
            Node::Source(n) => vec![NodeFlow {
                spec: &n.output,
                direction: FlowDirection::IntoBus,
            }],
            Node::Sink(n) => vec![NodeFlow {
                spec: &n.input,
                direction: FlowDirection::FromBus,
            }],
            Node::Storage(n) => vec![
                NodeFlow {
                    spec: &n.inflow,
                    direction: FlowDirection::FromBus,
                },
                NodeFlow {
                    spec: &n.outflow,
                    direction: FlowDirection::IntoBus,
                },
            ],
        }
    }

    pub fn as_storage(&self) -> Option<&Storage> {
        match self {
            Node::Storage(s) => Some(s),
            _ => None,
        }
    }

    /// Check every flow of the node against the horizon, and the storage
    /// parameters, however the node was put together.
    pub(crate) fn check_against(&self, grid: &TimeGrid) -> Result<()> {
        for flow in self.flows() {
            if let Some(profile) = flow.spec.fixed_profile() {
                grid.check_len(&format!("{}.fixed_profile", self.label()), profile.len())?;
            }
            if let VariableCost::PerStep(costs) = flow.spec.variable_cost() {
                grid.check_len(&format!("{}.variable_cost", self.label()), costs.len())?;
            }
            flow.spec.validate(grid)?;
        }
        if let Node::Storage(storage) = self {
            storage.params.validate()?;
        }
        Ok(())
    }
}

/// Identifier of a flow in `from->to` form.
pub fn flow_label(node: &str, bus: &str, direction: FlowDirection) -> String {
    match direction {
        FlowDirection::IntoBus => format!("{node}->{bus}"),
        FlowDirection::FromBus => format!("{bus}->{node}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rstest::rstest;

    fn grid(periods: usize) -> TimeGrid {
        TimeGrid::hourly(Utc.with_ymd_and_hms(2016, 1, 1, 0, 0, 0).unwrap(), periods).unwrap()
    }

    fn free(grid: &TimeGrid, cap: f64) -> FlowSpec {
        FlowSpec::builder(cap).build(grid).unwrap()
    }

    #[rstest]
    #[case::zero_capacity(StorageParams::new(0.0))]
    #[case::negative_capacity(StorageParams::new(-2.0))]
    #[case::loss_rate_one(StorageParams::new(10.0).with_loss_rate(1.0))]
    #[case::negative_loss(StorageParams::new(10.0).with_loss_rate(-0.1))]
    #[case::zero_charge_eff(StorageParams::new(10.0).with_efficiencies(0.0, 0.9))]
    #[case::discharge_eff_above_one(StorageParams::new(10.0).with_efficiencies(0.9, 1.1))]
    #[case::initial_level_above_full(StorageParams::new(10.0).with_initial_level(Some(1.5)))]
    fn test_invalid_storage_params(#[case] params: StorageParams) {
        let g = grid(2);
        let err = Storage::new("s_el", params, free(&g, 5.0), free(&g, 5.0)).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidParameter { .. }));
    }

    #[test]
    fn test_default_storage_starts_full() {
        let params = StorageParams::new(10.0);
        assert!(params.validate().is_ok());
        assert_eq!(params.initial_content(), Some(10.0));
        assert!(!params.balanced);
    }

    #[test]
    fn test_replay_levels_applies_losses_and_efficiencies() {
        let g = grid(3);
        let params = StorageParams::new(10.0)
            .with_loss_rate(0.1)
            .with_efficiencies(0.5, 0.5);
        let storage = Storage::new("s", params, free(&g, 5.0), free(&g, 5.0)).unwrap();

        let levels = storage
            .replay_levels(&g, 0.0, &[4.0, 0.0, 0.0], &[0.0, 0.0, 0.5])
            .unwrap();

        // 4 * 0.5 = 2.0, then 10% loss per hour, then 0.5 / 0.5 withdrawn
        assert!((levels[0] - 2.0).abs() < 1e-12);
        assert!((levels[1] - 1.8).abs() < 1e-12);
        assert!((levels[2] - (1.8 * 0.9 - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_storage_flows_charge_then_discharge() {
        let g = grid(1);
        let node = Node::storage("s", StorageParams::new(2.0), free(&g, 1.0), free(&g, 1.0)).unwrap();
        let flows = node.flows();
        assert_eq!(flows.len(), 2);
        assert_eq!(flows[0].direction, FlowDirection::FromBus);
        assert_eq!(flows[1].direction, FlowDirection::IntoBus);
    }

    #[test]
    fn test_flow_labels() {
        assert_eq!(flow_label("t_pv", "b_el", FlowDirection::IntoBus), "t_pv->b_el");
        assert_eq!(flow_label("d_el", "b_el", FlowDirection::FromBus), "b_el->d_el");
    }
}
