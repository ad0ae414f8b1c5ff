//! Least-cost dispatch of a single site: grid connection, PV, battery and a
//! fixed demand, formulated as one linear program over a discrete horizon.

pub mod config;
pub mod domain;
pub mod error;
pub mod optimizer;
pub mod scenario;
pub mod telemetry;

pub use error::{DispatchError, Result};
