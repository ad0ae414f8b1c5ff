use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, Result};

/// Discrete optimisation horizon shared by every node of a system.
///
/// Each timestep has its own duration in hours. Flow values are average rates
/// over a step, so the energy moved in step `t` is `value * duration(t)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeGrid {
    start: DateTime<Utc>,
    durations_h: Vec<f64>,
}

impl TimeGrid {
    pub fn new(start: DateTime<Utc>, durations_h: Vec<f64>) -> Result<Self> {
        if durations_h.is_empty() {
            return Err(DispatchError::invalid(
                "time_grid.periods",
                "horizon must contain at least one timestep",
            ));
        }
        if let Some((t, d)) = durations_h
            .iter()
            .enumerate()
            .find(|(_, d)| !d.is_finite() || **d <= 0.0)
        {
            return Err(DispatchError::invalid(
                format!("time_grid.duration[{t}]"),
                format!("step duration must be positive and finite, got {d}"),
            ));
        }
        Ok(Self { start, durations_h })
    }

    /// Horizon of `periods` steps of one hour each.
    pub fn hourly(start: DateTime<Utc>, periods: usize) -> Result<Self> {
        Self::uniform(start, periods, 1.0)
    }

    pub fn uniform(start: DateTime<Utc>, periods: usize, step_hours: f64) -> Result<Self> {
        Self::new(start, vec![step_hours; periods])
    }

    /// Number of timesteps `T`.
    pub fn len(&self) -> usize {
        self.durations_h.len()
    }

    pub fn is_empty(&self) -> bool {
        self.durations_h.is_empty()
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Duration of step `t` in hours.
    pub fn duration(&self, t: usize) -> f64 {
        self.durations_h[t]
    }

    pub fn durations(&self) -> &[f64] {
        &self.durations_h
    }

    pub fn total_hours(&self) -> f64 {
        self.durations_h.iter().sum()
    }

    /// Start instant of every timestep, in order.
    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        let mut at = self.start;
        self.durations_h
            .iter()
            .map(|d| {
                let current = at;
                at += Duration::milliseconds((d * 3_600_000.0).round() as i64);
                current
            })
            .collect()
    }

    /// Fails with `ShapeMismatch` unless `actual` equals the horizon length.
    pub fn check_len(&self, what: &str, actual: usize) -> Result<()> {
        if actual != self.len() {
            return Err(DispatchError::shape(what, self.len(), actual));
        }
        Ok(())
    }
}
