use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::domain::FlowDirection;

/// Solved time series of one flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSeries {
    /// `from->to` identifier.
    pub label: String,
    pub node: String,
    pub direction: FlowDirection,
    pub values: Vec<f64>,
}

impl FlowSeries {
    /// Energy moved over the horizon for the given step durations.
    pub fn energy(&self, durations_h: &[f64]) -> f64 {
        self.values.iter().zip(durations_h).map(|(v, d)| v * d).sum()
    }
}

/// Solved state of charge of one storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSeries {
    pub label: String,
    /// Content before the first step.
    pub initial: f64,
    /// Content at the end of every step.
    pub soc: Vec<f64>,
}

/// Immutable outcome of a successful dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    bus: String,
    timestamps: Vec<DateTime<Utc>>,
    flows: BTreeMap<String, FlowSeries>,
    storages: BTreeMap<String, StorageSeries>,
    total_cost: f64,
}

impl ResultSet {
    pub(crate) fn new(
        bus: &str,
        timestamps: Vec<DateTime<Utc>>,
        flows: Vec<FlowSeries>,
        storages: Vec<StorageSeries>,
        total_cost: f64,
    ) -> Self {
        Self {
            bus: bus.to_string(),
            timestamps,
            flows: flows.into_iter().map(|f| (f.label.clone(), f)).collect(),
            storages: storages.into_iter().map(|s| (s.label.clone(), s)).collect(),
            total_cost,
        }
    }

    pub fn bus(&self) -> &str {
        &self.bus
    }

    /// Objective value of the solved LP.
    pub fn total_cost(&self) -> f64 {
        self.total_cost
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Series of a flow by `from->to` identifier.
    pub fn flow(&self, label: &str) -> Option<&[f64]> {
        self.flows.get(label).map(|f| f.values.as_slice())
    }

    pub fn flows(&self) -> impl Iterator<Item = &FlowSeries> {
        self.flows.values()
    }

    /// Flow identifier to series, the shape external consumers expect.
    pub fn flow_series(&self) -> BTreeMap<&str, &[f64]> {
        self.flows
            .iter()
            .map(|(label, f)| (label.as_str(), f.values.as_slice()))
            .collect()
    }

    pub fn storage(&self, label: &str) -> Option<&StorageSeries> {
        self.storages.get(label)
    }

    pub fn storage_soc(&self, label: &str) -> Option<&[f64]> {
        self.storages.get(label).map(|s| s.soc.as_slice())
    }

    pub fn storages(&self) -> impl Iterator<Item = &StorageSeries> {
        self.storages.values()
    }

    /// Charge and discharge series of a storage node.
    pub fn storage_flows(&self, label: &str) -> Option<(&[f64], &[f64])> {
        let charge = self
            .flows()
            .find(|f| f.node == label && f.direction == FlowDirection::FromBus)?;
        let discharge = self
            .flows()
            .find(|f| f.node == label && f.direction == FlowDirection::IntoBus)?;
        Some((charge.values.as_slice(), discharge.values.as_slice()))
    }

    /// Inflow minus outflow at the bus for every timestep.
    pub fn balance_residuals(&self) -> Vec<f64> {
        let mut residuals = vec![0.0; self.len()];
        for flow in self.flows() {
            let sign = flow.direction.sign();
            for (r, v) in residuals.iter_mut().zip_eq(&flow.values) {
                *r += sign * v;
            }
        }
        residuals
    }

    /// Per-timestep sum of all flows in one direction.
    pub fn total_by_direction(&self, direction: FlowDirection) -> Vec<f64> {
        self.flows()
            .filter(|f| f.direction == direction)
            .fold(vec![0.0; self.len()], |mut acc, f| {
                acc.iter_mut().zip(&f.values).for_each(|(a, v)| *a += v);
                acc
            })
    }
}
