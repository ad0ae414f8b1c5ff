use anyhow::{Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::optimizer::SolverBackend;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";
pub const ENV_PREFIX: &str = "DISPATCH__";

/// 2016-01-01T00:00:00Z, the first hour of the built-in household tables.
const DEFAULT_START_DAYS: i64 = 16_801;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Config {
    #[validate(nested)]
    pub horizon: HorizonConfig,
    #[validate(nested)]
    pub grid: GridConfig,
    #[validate(nested)]
    pub pv: PvConfig,
    #[validate(nested)]
    pub battery: BatteryConfig,
    #[validate(nested)]
    pub solver: SolverConfig,
    #[validate(nested)]
    pub demand: DemandConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct HorizonConfig {
    pub start: DateTime<Utc>,
    #[validate(range(min = 0.001, max = 24.0))]
    pub step_hours: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GridConfig {
    #[validate(range(min = 0.0))]
    pub import_capacity_kw: f64,
    #[validate(range(min = 0.0))]
    pub export_capacity_kw: f64,
    /// Cost per kWh fed into the grid; negative values are revenue.
    pub sell_price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PvConfig {
    #[validate(range(min = 0.0))]
    pub nominal_kw: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BatteryConfig {
    #[validate(range(exclusive_min = 0.0))]
    pub capacity_kwh: f64,
    #[validate(range(min = 0.0))]
    pub max_charge_kw: f64,
    #[validate(range(min = 0.0))]
    pub max_discharge_kw: f64,
    #[validate(range(min = 0.0, exclusive_max = 1.0))]
    pub loss_rate: f64,
    #[validate(range(exclusive_min = 0.0, max = 1.0))]
    pub charge_efficiency: f64,
    #[validate(range(exclusive_min = 0.0, max = 1.0))]
    pub discharge_efficiency: f64,
    /// Fraction of capacity before the first step; unset lets the optimiser choose.
    #[validate(range(min = 0.0, max = 1.0))]
    #[serde(default)]
    pub initial_level: Option<f64>,
    #[serde(default)]
    pub balanced: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SolverConfig {
    #[serde(default)]
    pub backend: SolverBackend,
    #[validate(range(min = 1))]
    pub time_limit_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DemandConfig {
    #[validate(range(min = 0.0))]
    pub constant_kw: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            horizon: HorizonConfig {
                start: DateTime::UNIX_EPOCH + TimeDelta::days(DEFAULT_START_DAYS),
                step_hours: 1.0,
            },
            grid: GridConfig {
                import_capacity_kw: 5.0,
                export_capacity_kw: 5.0,
                sell_price: 0.06,
            },
            pv: PvConfig { nominal_kw: 1.0 },
            battery: BatteryConfig {
                capacity_kwh: 10.0,
                max_charge_kw: 5.0,
                max_discharge_kw: 5.0,
                loss_rate: 7e-5,
                charge_efficiency: 0.95,
                discharge_efficiency: 0.95,
                initial_level: None,
                balanced: true,
            },
            solver: SolverConfig {
                backend: SolverBackend::Microlp,
                time_limit_seconds: 30,
            },
            demand: DemandConfig { constant_kw: 1.0 },
        }
    }
}

impl Config {
    /// Built-in defaults, then `config/default.toml`, then `DISPATCH__*` variables.
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(DEFAULT_CONFIG_PATH))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn from_figment(figment: &Figment) -> Result<Self> {
        let cfg: Config = figment.extract().context("reading configuration")?;
        cfg.validate().context("validating configuration")?;
        Ok(cfg)
    }

    pub fn load() -> Result<Self> {
        Self::from_figment(&Self::figment())
    }
}
