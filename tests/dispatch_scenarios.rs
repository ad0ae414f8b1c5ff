//! End-to-end dispatch of small hand-checkable systems.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use open_energy_dispatch::domain::{Bus, FlowSpec, Node, StorageParams, TimeGrid};
use open_energy_dispatch::optimizer::{DispatchModel, Dispatcher, SolverBackend};
use open_energy_dispatch::DispatchError;

const TOL: f64 = 1e-6;

fn grid(periods: usize) -> TimeGrid {
    TimeGrid::hourly(Utc.with_ymd_and_hms(2016, 1, 1, 0, 0, 0).unwrap(), periods).unwrap()
}

#[derive(Clone)]
struct Site {
    buy_price: Vec<f64>,
    import_kw: f64,
    demand: Vec<f64>,
    pv: Vec<f64>,
    battery: Option<(f64, f64)>,
}

impl Site {
    fn bus(&self) -> Bus {
        let g = grid(self.demand.len());
        let import = FlowSpec::builder(self.import_kw)
            .variable_cost(self.buy_price.clone())
            .build(&g)
            .unwrap();
        let export = FlowSpec::builder(5.0).variable_cost(0.06).build(&g).unwrap();
        let pv = FlowSpec::builder(1.0).fixed(self.pv.clone()).build(&g).unwrap();
        let load = FlowSpec::builder(1.0).fixed(self.demand.clone()).build(&g).unwrap();

        let mut bus = Bus::new("b_el", g.clone())
            .with_node(Node::source("grid_in", import))
            .unwrap()
            .with_node(Node::sink("grid_out", export))
            .unwrap()
            .with_node(Node::source("pv", pv))
            .unwrap();

        if let Some((capacity, power)) = self.battery {
            let params = StorageParams::new(capacity).with_initial_level(Some(0.0));
            let charge = FlowSpec::builder(power).build(&g).unwrap();
            let discharge = FlowSpec::builder(power).build(&g).unwrap();
            bus.add_node(Node::storage("battery", params, charge, discharge).unwrap())
                .unwrap();
        }

        bus.with_node(Node::sink("demand", load)).unwrap()
    }

    fn model(&self) -> DispatchModel {
        DispatchModel::build(self.bus()).unwrap()
    }
}

fn assert_series(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < TOL, "{actual:?} != {expected:?}");
    }
}

#[test]
fn test_grid_only_site_buys_all_demand() {
    let site = Site {
        buy_price: vec![0.05; 3],
        import_kw: 5.0,
        demand: vec![1.0; 3],
        pv: vec![0.0; 3],
        battery: None,
    };

    let results = Dispatcher::default().dispatch(site.model()).unwrap();
    assert!((results.total_cost() - 0.15).abs() < TOL);
    assert_series(results.flow("grid_in->b_el").unwrap(), &[1.0, 1.0, 1.0]);
    assert_series(results.flow("b_el->grid_out").unwrap(), &[0.0, 0.0, 0.0]);
    assert_eq!(results.flow("b_el->demand").unwrap(), &[1.0, 1.0, 1.0]);
}

#[test]
fn test_battery_shifts_pv_to_evening_demand() {
    let site = Site {
        buy_price: vec![0.05; 2],
        import_kw: 5.0,
        demand: vec![0.0, 2.0],
        pv: vec![2.0, 0.0],
        battery: Some((2.0, 2.0)),
    };

    let results = Dispatcher::default().dispatch(site.model()).unwrap();
    assert!(results.total_cost().abs() < TOL);
    assert_series(results.flow("grid_in->b_el").unwrap(), &[0.0, 0.0]);
    assert_series(results.storage_soc("battery").unwrap(), &[2.0, 0.0]);

    let (charge, discharge) = results.storage_flows("battery").unwrap();
    assert_series(charge, &[2.0, 0.0]);
    assert_series(discharge, &[0.0, 2.0]);
}

#[test]
fn test_unservable_demand_is_infeasible() {
    let site = Site {
        buy_price: vec![0.05],
        import_kw: 0.0,
        demand: vec![5.0],
        pv: vec![0.0],
        battery: None,
    };

    let err = Dispatcher::default().dispatch(site.model()).unwrap_err();
    assert_eq!(err, DispatchError::Infeasible);
    assert!(err.is_solve_failure());
}

#[test]
fn test_idle_site_costs_nothing() {
    let site = Site {
        buy_price: vec![0.05; 4],
        import_kw: 5.0,
        demand: vec![0.0; 4],
        pv: vec![0.0; 4],
        battery: None,
    };

    let results = Dispatcher::default().dispatch(site.model()).unwrap();
    assert!(results.total_cost().abs() < TOL);
    for flow in results.flows() {
        assert!(flow.values.iter().all(|v| v.abs() < TOL), "{}", flow.label);
    }
}

#[test]
fn test_repeated_solves_agree_on_cost() {
    let site = Site {
        buy_price: vec![0.30, 0.10, 0.40, 0.20],
        import_kw: 5.0,
        demand: vec![1.0, 2.0, 3.0, 1.0],
        pv: vec![0.0, 2.5, 1.0, 0.0],
        battery: Some((4.0, 2.0)),
    };

    let dispatcher = Dispatcher::default();
    let first = dispatcher.dispatch(site.model()).unwrap();
    let second = dispatcher.dispatch(site.model()).unwrap();
    assert!((first.total_cost() - second.total_cost()).abs() < 1e-7);
}

#[test]
fn test_wrong_profile_length_rejected_before_solving() {
    let g = grid(3);
    let err = FlowSpec::builder(1.0).fixed(vec![1.0; 2]).build(&g).unwrap_err();
    assert!(matches!(
        err,
        DispatchError::ShapeMismatch { expected: 3, actual: 2, .. }
    ));
}

#[test]
fn test_solved_flows_balance_and_respect_bounds() {
    let site = Site {
        buy_price: vec![0.30, 0.10, 0.40, 0.20, 0.35],
        import_kw: 3.0,
        demand: vec![1.0, 2.0, 3.0, 1.0, 2.5],
        pv: vec![0.0, 2.5, 1.0, 4.0, 0.0],
        battery: Some((3.0, 1.5)),
    };

    let results = Dispatcher::default().dispatch(site.model()).unwrap();
    assert!(results.balance_residuals().iter().all(|r| r.abs() < TOL));

    for v in results.flow("grid_in->b_el").unwrap() {
        assert!(*v > -TOL && *v < 3.0 + TOL);
    }
    for v in results.storage_soc("battery").unwrap() {
        assert!(*v > -TOL && *v < 3.0 + TOL);
    }
}

#[test]
fn test_fixed_flow_cost_counts_towards_total() {
    let g = grid(2);
    let import = FlowSpec::builder(5.0).variable_cost(vec![0.1, 0.2]).build(&g).unwrap();
    let load = FlowSpec::builder(1.0)
        .fixed(vec![1.0, 2.0])
        .variable_cost(0.5)
        .build(&g)
        .unwrap();
    let bus = Bus::new("b_el", g)
        .with_node(Node::source("grid_in", import))
        .unwrap()
        .with_node(Node::sink("demand", load))
        .unwrap();

    let results = Dispatcher::default()
        .dispatch(DispatchModel::build(bus).unwrap())
        .unwrap();
    let import_cost = 0.1 * 1.0 + 0.2 * 2.0;
    assert!((results.total_cost() - (import_cost + 0.5 * 3.0)).abs() < TOL);
}

#[rstest::rstest]
#[case(SolverBackend::Microlp)]
#[case(SolverBackend::Clarabel)]
fn test_paid_unlimited_supply_is_unbounded(#[case] backend: SolverBackend) {
    let g = grid(1);
    let supply = FlowSpec::builder(f64::INFINITY)
        .variable_cost(-1.0)
        .build(&g)
        .unwrap();
    let dump = FlowSpec::builder(f64::INFINITY).build(&g).unwrap();
    let bus = Bus::new("b_el", g)
        .with_node(Node::source("supply", supply))
        .unwrap()
        .with_node(Node::sink("dump", dump))
        .unwrap();

    let err = Dispatcher::with_backend(backend)
        .dispatch(DispatchModel::build(bus).unwrap())
        .unwrap_err();
    assert_eq!(err, DispatchError::Unbounded);
}

#[test]
fn test_degenerate_storage_cycle_lands_on_a_vertex() {
    // any charge == discharge in [0, 1] is optimal
    let g = grid(1);
    let pv = FlowSpec::builder(1.0).fixed(vec![1.0]).build(&g).unwrap();
    let load = FlowSpec::builder(1.0).fixed(vec![1.0]).build(&g).unwrap();
    let import = FlowSpec::builder(5.0).variable_cost(0.05).build(&g).unwrap();
    let power = FlowSpec::builder(1.0).build(&g).unwrap();
    let params = StorageParams::new(2.0).with_initial_level(Some(0.5));
    let bus = Bus::new("b_el", g)
        .with_node(Node::source("grid_in", import))
        .unwrap()
        .with_node(Node::source("pv", pv))
        .unwrap()
        .with_node(Node::storage("battery", params, power.clone(), power).unwrap())
        .unwrap()
        .with_node(Node::sink("demand", load))
        .unwrap();

    let results = Dispatcher::default()
        .dispatch(DispatchModel::build(bus).unwrap())
        .unwrap();
    assert!(results.flow("grid_in->b_el").unwrap()[0].abs() < 1e-9);

    let (charge, discharge) = results.storage_flows("battery").unwrap();
    for v in [charge[0], discharge[0]] {
        assert!(v.abs() < 1e-9 || (v - 1.0).abs() < 1e-9, "{v} is not at a bound");
    }
    assert!((charge[0] - discharge[0]).abs() < 1e-9);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_higher_buy_price_never_lowers_cost(
        prices in prop::collection::vec(0.01f64..0.5, 4),
        step in 0usize..4,
        bump in 0.0f64..0.2,
    ) {
        let base = Site {
            buy_price: prices.clone(),
            import_kw: 5.0,
            demand: vec![1.0, 2.0, 0.5, 1.5],
            pv: vec![0.0, 1.5, 2.0, 0.0],
            battery: Some((2.0, 1.0)),
        };
        let mut raised = prices;
        raised[step] += bump;
        let bumped = Site { buy_price: raised, ..base.clone() };

        let dispatcher = Dispatcher::default();
        let before = dispatcher.dispatch(base.model()).unwrap().total_cost();
        let after = dispatcher.dispatch(bumped.model()).unwrap().total_cost();
        prop_assert!(after >= before - 1e-6, "{after} < {before}");
    }
}
