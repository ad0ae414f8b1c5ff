use serde::{Deserialize, Serialize};

use super::{flow_label, Node, NodeFlow, Storage, TimeGrid};
use crate::error::{DispatchError, Result};

/// The single balance point of a site.
///
/// At every timestep the flows into the bus must equal the flows out of it.
/// The bus itself holds no energy; buffering happens in storage nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bus {
    label: String,
    grid: TimeGrid,
    nodes: Vec<Node>,
}

impl Bus {
    pub fn new(label: impl Into<String>, grid: TimeGrid) -> Self {
        Self {
            label: label.into(),
            grid,
            nodes: Vec::new(),
        }
    }

    /// Attach a node. Labels must be unique and all series must fit the horizon.
    pub fn add_node(&mut self, node: Node) -> Result<()> {
        if node.label() == self.label || self.node(node.label()).is_some() {
            return Err(DispatchError::invalid(
                "label",
                format!("duplicate label '{}' on bus '{}'", node.label(), self.label),
            ));
        }
        node.check_against(&self.grid)?;
        self.nodes.push(node);
        Ok(())
    }

    pub fn with_node(mut self, node: Node) -> Result<Self> {
        self.add_node(node)?;
        Ok(self)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn grid(&self) -> &TimeGrid {
        &self.grid
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, label: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.label() == label)
    }

    pub fn storages(&self) -> impl Iterator<Item = &Storage> {
        self.nodes.iter().filter_map(Node::as_storage)
    }

    /// Every attached flow with its `from->to` identifier, in node order.
    pub fn flows(&self) -> Vec<(String, &Node, NodeFlow<'_>)> {
        self.nodes
            .iter()
            .flat_map(|node| {
                node.flows().into_iter().map(move |flow| {
                    (
                        flow_label(node.label(), &self.label, flow.direction),
                        node,
                        flow,
                    )
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FlowDirection, FlowSpec, StorageParams};
    use chrono::{TimeZone, Utc};

    fn grid() -> TimeGrid {
        TimeGrid::hourly(Utc.with_ymd_and_hms(2016, 1, 1, 0, 0, 0).unwrap(), 2).unwrap()
    }

    #[test]
    fn test_duplicate_labels_rejected() {
        let g = grid();
        let flow = FlowSpec::builder(1.0).build(&g).unwrap();
        let mut bus = Bus::new("b_el", g);
        bus.add_node(Node::source("grid", flow.clone())).unwrap();

        let err = bus.add_node(Node::sink("grid", flow.clone())).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidParameter { .. }));

        let err = bus.add_node(Node::sink("b_el", flow)).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidParameter { .. }));
    }

    #[test]
    fn test_node_built_for_other_horizon_rejected() {
        let long = TimeGrid::hourly(Utc.with_ymd_and_hms(2016, 1, 1, 0, 0, 0).unwrap(), 3).unwrap();
        let flow = FlowSpec::builder(1.0).fixed(vec![1.0; 3]).build(&long).unwrap();

        let err = Bus::new("b_el", grid())
            .with_node(Node::sink("demand", flow))
            .unwrap_err();
        assert!(matches!(err, DispatchError::ShapeMismatch { expected: 2, actual: 3, .. }));
    }

    #[test]
    fn test_storage_assembled_by_hand_is_validated() {
        let g = grid();
        let flow = FlowSpec::builder(1.0).build(&g).unwrap();
        let mut params = StorageParams::new(2.0);
        params.loss_rate = 1.5;
        params.discharge_efficiency = 0.0;
        let node = Node::Storage(Storage {
            label: "bat".into(),
            params,
            inflow: flow.clone(),
            outflow: flow,
        });

        let err = Bus::new("b_el", g).with_node(node).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::InvalidParameter { ref name, .. } if name == "loss_rate"
        ));
    }

    #[test]
    fn test_deserialized_flow_is_validated() {
        let flow: FlowSpec = serde_json::from_value(serde_json::json!({
            "nominal_capacity": -1.0,
            "fixed_profile": null,
            "variable_cost": 0.0,
        }))
        .unwrap();

        let err = Bus::new("b_el", grid())
            .with_node(Node::source("grid", flow))
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::InvalidParameter { ref name, .. } if name == "nominal_capacity"
        ));
    }

    #[test]
    fn test_flow_identifiers() {
        let g = grid();
        let flow = FlowSpec::builder(1.0).build(&g).unwrap();
        let bus = Bus::new("b_el", g)
            .with_node(Node::source("pv", flow.clone()))
            .unwrap()
            .with_node(
                Node::storage("bat", StorageParams::new(2.0), flow.clone(), flow).unwrap(),
            )
            .unwrap();

        let ids: Vec<_> = bus
            .flows()
            .into_iter()
            .map(|(id, _, f)| (id, f.direction))
            .collect();
        assert_eq!(
            ids,
            vec![
                ("pv->b_el".to_string(), FlowDirection::IntoBus),
                ("b_el->bat".to_string(), FlowDirection::FromBus),
                ("bat->b_el".to_string(), FlowDirection::IntoBus),
            ]
        );
        assert_eq!(bus.storages().count(), 1);
    }
}
