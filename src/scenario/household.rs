//! Household with grid connection, rooftop PV, a battery and a fixed demand.
//!
//! Three days of hourly PV output and day-ahead prices are embedded; the
//! remaining parameters come from [`Config`].

use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::{BatteryConfig, Config, GridConfig};
use crate::domain::{Bus, FlowSpec, Node, StorageParams, TimeGrid};
use crate::error::Result;
use crate::optimizer::{DispatchModel, Dispatcher, ResultSet};

pub const BUS: &str = "b_el";
pub const GRID_IMPORT: &str = "m_el_in";
pub const GRID_EXPORT: &str = "m_el_out";
pub const PV: &str = "t_pv";
pub const BATTERY: &str = "s_el";
pub const DEMAND: &str = "d_el";

pub const HORIZON_HOURS: usize = 72;

/// PV output per kW installed (kW), hourly.
pub const PV_GENERATION: [f64; HORIZON_HOURS] = [
    0.0, 0.0, 0.0, 0.0, 0.0, 0.027480659, 0.294524282, 1.331494976, 1.706408406, 0.064760407,
    3.800581979, 6.237957612, 5.083272487, 3.797069942, 0.658074974, 1.81976262, 0.343014305,
    0.041634414, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.091170394,
    0.096628428, 1.468532199, 1.157308321, 1.919360332, 5.037426632, 4.908060113, 2.819814453,
    5.701970869, 3.65146691, 1.684222347, 0.462257651, 0.080636749, 0.0, 0.0, 0.0, 0.0, 0.0,
    0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.053167691, 0.282335054, 0.88806353, 3.353525588,
    4.23977131, 4.050275376, 1.64465707, 0.014475718, 4.811141123, 2.799112532, 1.870968326,
    0.334504689, 0.075924716, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
];

/// Grid import price per kWh, hourly.
pub const GRID_PRICES: [f64; HORIZON_HOURS] = [
    0.0300, 0.0334, 0.0370, 0.0371, 0.0404, 0.0375, 0.0356, 0.0321, 0.0346, 0.0345, 0.0386,
    0.0422, 0.0446, 0.0397, 0.0384, 0.0401, 0.0401, 0.0425, 0.0390, 0.0369, 0.0330, 0.0332,
    0.0313, 0.0266, 0.0272, 0.0224, 0.0229, 0.0274, 0.0243, 0.0280, 0.0236, 0.0212, 0.0253,
    0.0224, 0.0267, 0.0247, 0.0271, 0.0304, 0.0345, 0.0330, 0.0334, 0.0309, 0.0271, 0.0243,
    0.0247, 0.0251, 0.0204, 0.0239, 0.0218, 0.0220, 0.0262, 0.0222, 0.0244, 0.0214, 0.0254,
    0.0267, 0.0298, 0.0320, 0.0286, 0.0313, 0.0294, 0.0329, 0.0359, 0.0324, 0.0320, 0.0271,
    0.0295, 0.0307, 0.0309, 0.0338, 0.0297, 0.0296,
];

/// Parameters of one household instance; the demand is supplied per call.
#[derive(Debug, Clone)]
pub struct HouseholdScenario {
    start: DateTime<Utc>,
    step_hours: f64,
    grid: GridConfig,
    pv_nominal_kw: f64,
    battery: Option<BatteryConfig>,
    pv_generation: Vec<f64>,
    grid_prices: Vec<f64>,
}

impl Default for HouseholdScenario {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl HouseholdScenario {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            start: cfg.horizon.start,
            step_hours: cfg.horizon.step_hours,
            grid: cfg.grid.clone(),
            pv_nominal_kw: cfg.pv.nominal_kw,
            battery: Some(cfg.battery.clone()),
            pv_generation: PV_GENERATION.to_vec(),
            grid_prices: GRID_PRICES.to_vec(),
        }
    }

    /// Replace the embedded PV and price tables. The PV table sets the horizon.
    pub fn with_profiles(mut self, pv_generation: Vec<f64>, grid_prices: Vec<f64>) -> Self {
        self.pv_generation = pv_generation;
        self.grid_prices = grid_prices;
        self
    }

    pub fn with_grid(mut self, grid: GridConfig) -> Self {
        self.grid = grid;
        self
    }

    pub fn with_battery(mut self, battery: BatteryConfig) -> Self {
        self.battery = Some(battery);
        self
    }

    pub fn without_battery(mut self) -> Self {
        self.battery = None;
        self
    }

    pub fn horizon(&self) -> usize {
        self.pv_generation.len()
    }

    pub fn time_grid(&self) -> Result<TimeGrid> {
        TimeGrid::uniform(self.start, self.horizon(), self.step_hours)
    }

    /// All nodes of the household attached to its bus.
    pub fn bus(&self, demand: &[f64]) -> Result<Bus> {
        let grid = self.time_grid()?;

        let import = FlowSpec::builder(self.grid.import_capacity_kw)
            .variable_cost(self.grid_prices.clone())
            .build(&grid)?;
        let export = FlowSpec::builder(self.grid.export_capacity_kw)
            .variable_cost(self.grid.sell_price)
            .build(&grid)?;
        let pv = FlowSpec::builder(self.pv_nominal_kw)
            .fixed(self.pv_generation.clone())
            .build(&grid)?;
        let load = FlowSpec::builder(1.0).fixed(demand).build(&grid)?;

        let mut bus = Bus::new(BUS, grid.clone())
            .with_node(Node::source(GRID_IMPORT, import))?
            .with_node(Node::sink(GRID_EXPORT, export))?
            .with_node(Node::source(PV, pv))?;

        if let Some(battery) = &self.battery {
            let params = StorageParams::new(battery.capacity_kwh)
                .with_loss_rate(battery.loss_rate)
                .with_efficiencies(battery.charge_efficiency, battery.discharge_efficiency)
                .with_initial_level(battery.initial_level)
                .balanced(battery.balanced);
            let charge = FlowSpec::builder(battery.max_charge_kw).build(&grid)?;
            let discharge = FlowSpec::builder(battery.max_discharge_kw).build(&grid)?;
            bus.add_node(Node::storage(BATTERY, params, charge, discharge)?)?;
        }

        bus.add_node(Node::sink(DEMAND, load))?;
        Ok(bus)
    }

    pub fn build(&self, demand: &[f64]) -> Result<DispatchModel> {
        DispatchModel::build(self.bus(demand)?)
    }

    /// Build and solve the household for one demand profile.
    pub fn calc_energysystem(&self, dispatcher: &Dispatcher, demand: &[f64]) -> Result<ResultSet> {
        let results = dispatcher.dispatch(self.build(demand)?)?;
        info!(
            horizon = self.horizon(),
            demand_kwh = demand.iter().sum::<f64>() * self.step_hours,
            total_cost = results.total_cost(),
            "household dispatch solved"
        );
        Ok(results)
    }

    /// Objective value of the solved household.
    pub fn calc_cost(&self, dispatcher: &Dispatcher, demand: &[f64]) -> Result<f64> {
        self.calc_energysystem(dispatcher, demand)
            .map(|results| results.total_cost())
    }
}

/// Flow identifiers of the household, as used in its [`ResultSet`].
pub mod flows {
    pub const GRID_IMPORT: &str = "m_el_in->b_el";
    pub const GRID_EXPORT: &str = "b_el->m_el_out";
    pub const PV: &str = "t_pv->b_el";
    pub const BATTERY_CHARGE: &str = "b_el->s_el";
    pub const BATTERY_DISCHARGE: &str = "s_el->b_el";
    pub const DEMAND: &str = "b_el->d_el";
}
