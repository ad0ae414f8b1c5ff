//! Solver-independent linear program.
//!
//! The dispatch model writes its formulation into a [`LinearProgram`]:
//! bounded continuous variables, sparse linear rows and a sparse objective.
//! Backends translate it into their own representation.

use serde::{Deserialize, Serialize};
use strum::Display;

/// Index of a decision variable inside its program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VarId(pub usize);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDef {
    pub name: String,
    pub lower: f64,
    /// `None` for no upper bound.
    pub upper: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum ConstraintKind {
    #[strum(serialize = "=")]
    Eq,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = ">=")]
    Ge,
}

/// `Σ coef * var  (kind)  rhs`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearConstraint {
    pub name: String,
    pub terms: Vec<(VarId, f64)>,
    pub kind: ConstraintKind,
    pub rhs: f64,
}

impl LinearConstraint {
    pub fn activity(&self, values: &[f64]) -> f64 {
        self.terms.iter().map(|(v, c)| c * values[v.0]).sum()
    }

    /// Violation of the row at `values`; zero when satisfied.
    pub fn violation(&self, values: &[f64]) -> f64 {
        let lhs = self.activity(values);
        match self.kind {
            ConstraintKind::Eq => (lhs - self.rhs).abs(),
            ConstraintKind::Le => (lhs - self.rhs).max(0.0),
            ConstraintKind::Ge => (self.rhs - lhs).max(0.0),
        }
    }
}

/// Minimisation problem `min c·x + c0` subject to linear rows and variable bounds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinearProgram {
    variables: Vec<VariableDef>,
    constraints: Vec<LinearConstraint>,
    objective: Vec<(VarId, f64)>,
    objective_constant: f64,
}

impl LinearProgram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_variable(&mut self, name: impl Into<String>, lower: f64, upper: Option<f64>) -> VarId {
        let id = VarId(self.variables.len());
        self.variables.push(VariableDef {
            name: name.into(),
            lower,
            upper,
        });
        id
    }

    pub fn add_constraint(
        &mut self,
        name: impl Into<String>,
        terms: Vec<(VarId, f64)>,
        kind: ConstraintKind,
        rhs: f64,
    ) {
        self.constraints.push(LinearConstraint {
            name: name.into(),
            terms,
            kind,
            rhs,
        });
    }

    /// Adds `coef * var` to the objective. Zero coefficients are skipped.
    pub fn add_objective_term(&mut self, var: VarId, coef: f64) {
        if coef != 0.0 {
            self.objective.push((var, coef));
        }
    }

    pub fn add_objective_constant(&mut self, value: f64) {
        self.objective_constant += value;
    }

    pub fn variables(&self) -> &[VariableDef] {
        &self.variables
    }

    pub fn constraints(&self) -> &[LinearConstraint] {
        &self.constraints
    }

    pub fn constraint(&self, name: &str) -> Option<&LinearConstraint> {
        self.constraints.iter().find(|c| c.name == name)
    }

    pub fn objective(&self) -> &[(VarId, f64)] {
        &self.objective
    }

    pub fn objective_constant(&self) -> f64 {
        self.objective_constant
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    pub fn evaluate_objective(&self, values: &[f64]) -> f64 {
        self.objective_constant
            + self
                .objective
                .iter()
                .map(|(v, c)| c * values[v.0])
                .sum::<f64>()
    }

    /// Rows without terms can be decided without a solver.
    ///
    /// Returns the name of the first violated constant row, if any.
    pub fn violated_constant_row(&self, tolerance: f64) -> Option<&str> {
        self.constraints
            .iter()
            .filter(|c| c.terms.is_empty())
            .find(|c| c.violation(&[]) > tolerance)
            .map(|c| c.name.as_str())
    }

    /// True when the variable bounds alone keep the objective from falling
    /// without limit: every variable with a negative cost is capped above and
    /// every variable with a positive cost has a finite lower bound.
    pub fn objective_bounded_below(&self) -> bool {
        let mut coef = vec![0.0; self.variables.len()];
        for (var, c) in &self.objective {
            coef[var.0] += c;
        }
        self.variables.iter().zip(coef).all(|(def, c)| {
            if c < 0.0 {
                def.upper.is_some_and(f64::is_finite)
            } else if c > 0.0 {
                def.lower.is_finite()
            } else {
                true
            }
        })
    }

    /// Largest bound or row violation at `values`.
    pub fn max_violation(&self, values: &[f64]) -> f64 {
        let bounds = self.variables.iter().zip(values).map(|(def, x)| {
            let below = (def.lower - x).max(0.0);
            let above = def.upper.map_or(0.0, |u| (x - u).max(0.0));
            below.max(above)
        });
        let rows = self.constraints.iter().map(|c| c.violation(values));
        bounds.chain(rows).fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_objective_includes_constant() {
        let mut lp = LinearProgram::new();
        let x = lp.add_variable("x", 0.0, Some(1.0));
        let y = lp.add_variable("y", 0.0, None);
        lp.add_objective_term(x, 2.0);
        lp.add_objective_term(y, 0.0);
        lp.add_objective_constant(0.5);

        assert_eq!(lp.objective().len(), 1);
        assert_eq!(lp.evaluate_objective(&[1.0, 7.0]), 2.5);
    }

    #[test]
    fn test_violation_by_kind() {
        let mut lp = LinearProgram::new();
        let x = lp.add_variable("x", 0.0, Some(4.0));
        lp.add_constraint("eq", vec![(x, 1.0)], ConstraintKind::Eq, 2.0);
        lp.add_constraint("le", vec![(x, 1.0)], ConstraintKind::Le, 2.0);
        lp.add_constraint("ge", vec![(x, 1.0)], ConstraintKind::Ge, 2.0);

        let at = |name: &str, v: f64| lp.constraint(name).unwrap().violation(&[v]);
        assert_eq!(at("eq", 3.0), 1.0);
        assert_eq!(at("le", 1.0), 0.0);
        assert_eq!(at("le", 3.0), 1.0);
        assert_eq!(at("ge", 3.0), 0.0);
        assert_eq!(lp.max_violation(&[5.0]), 3.0);
    }

    #[test]
    fn test_objective_bound_from_variable_bounds() {
        let mut lp = LinearProgram::new();
        let x = lp.add_variable("x", 0.0, Some(3.0));
        let y = lp.add_variable("y", 0.0, None);
        lp.add_objective_term(x, -1.0);
        lp.add_objective_term(y, 1.0);
        assert!(lp.objective_bounded_below());

        let z = lp.add_variable("z", 0.0, None);
        lp.add_objective_term(z, -0.5);
        assert!(!lp.objective_bounded_below());
    }

    #[test]
    fn test_constant_rows() {
        let mut lp = LinearProgram::new();
        lp.add_constraint("ok", vec![], ConstraintKind::Eq, 0.0);
        assert_eq!(lp.violated_constant_row(1e-9), None);

        lp.add_constraint("balance[0]", vec![], ConstraintKind::Eq, 5.0);
        assert_eq!(lp.violated_constant_row(1e-9), Some("balance[0]"));
    }
}
