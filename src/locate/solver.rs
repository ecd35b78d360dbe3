//! Solver adapters
//!
//! The model is handed to a backend through the [`SolverAdapter`] trait.
//! [`HighsSolver`] wraps the HiGHS MIP solver.

use std::fmt;
use std::time::Duration;

use highs::{Col, HighsModelStatus, RowProblem, Sense};
use serde::{Deserialize, Serialize};

use crate::locate::model::{ModelInstance, RowSense, VarKind};

/// Outcome class of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    Optimal,
    Infeasible,
    Unbounded,
    Timeout,
    /// The backend failed to load or solve the model.
    Error,
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SolveStatus::Optimal => "OPTIMAL",
            SolveStatus::Infeasible => "INFEASIBLE",
            SolveStatus::Unbounded => "UNBOUNDED",
            SolveStatus::Timeout => "TIMEOUT",
            SolveStatus::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Result of solving a model
#[derive(Debug, Clone, PartialEq)]
pub struct SolveResult {
    pub status: SolveStatus,
    /// Objective value reported by the backend, present when optimal
    pub objective: Option<f64>,
    /// Value of every column, indexed by `VarId`; empty unless optimal
    pub values: Vec<f64>,
}

impl SolveResult {
    pub fn optimal(objective: f64, values: Vec<f64>) -> Self {
        Self {
            status: SolveStatus::Optimal,
            objective: Some(objective),
            values,
        }
    }

    /// A result without a solution.
    pub fn failed(status: SolveStatus) -> Self {
        Self {
            status,
            objective: None,
            values: Vec::new(),
        }
    }

    pub fn is_optimal(&self) -> bool {
        self.status == SolveStatus::Optimal
    }
}

/// A MIP backend.
///
/// Implementations receive a shared reference and must not rely on anything
/// beyond the columns and rows of the model.
pub trait SolverAdapter {
    fn solve(&self, model: &ModelInstance<'_>) -> SolveResult;
}

impl<S: SolverAdapter + ?Sized> SolverAdapter for &S {
    fn solve(&self, model: &ModelInstance<'_>) -> SolveResult {
        (**self).solve(model)
    }
}

/// HiGHS backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HighsSolver {
    time_limit: Option<Duration>,
    mip_rel_gap: Option<f64>,
    verbose: bool,
}

impl HighsSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop after `limit`; the point is then reported as [`SolveStatus::Timeout`].
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    pub fn with_mip_rel_gap(mut self, gap: f64) -> Self {
        self.mip_rel_gap = Some(gap);
        self
    }

    /// Let HiGHS print its own log.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

impl SolverAdapter for HighsSolver {
    fn solve(&self, model: &ModelInstance<'_>) -> SolveResult {
        let mut pb = RowProblem::new();

        // Integrality must be set when the column is added
        let cols: Vec<Col> = model
            .columns()
            .iter()
            .map(|c| {
                let is_integer = c.kind == VarKind::Binary;
                pb.add_column_with_integrality(c.cost, c.lower..=c.upper, is_integer)
            })
            .collect();

        for row in model.rows() {
            let terms: Vec<(Col, f64)> = row
                .terms
                .iter()
                .filter(|(_, coef)| coef.abs() > 1e-10)
                .map(|&(var, coef)| (cols[var.0], coef))
                .collect();

            let rhs = row.rhs;
            match row.sense {
                RowSense::LessEq => pb.add_row(..=rhs, terms),
                RowSense::GreaterEq => pb.add_row(rhs.., terms),
                RowSense::Equal => pb.add_row(rhs..=rhs, terms),
            }
        }

        let mut highs_model = pb.optimise(Sense::Minimise);
        if !self.verbose {
            highs_model.make_quiet();
        }
        if let Some(limit) = self.time_limit {
            highs_model.set_option("time_limit", limit.as_secs_f64());
        }
        if let Some(gap) = self.mip_rel_gap {
            highs_model.set_option("mip_rel_gap", gap);
        }

        let solved = highs_model.solve();
        let status = solved.status();

        match status {
            HighsModelStatus::Optimal | HighsModelStatus::ModelEmpty => {
                let sol = solved.get_solution();
                let values: Vec<f64> = sol.columns().to_vec();
                SolveResult::optimal(solved.objective_value(), values)
            }
            _ => {
                log::warn!("HiGHS returned non-optimal status: {:?}", status);
                SolveResult::failed(map_status(status))
            }
        }
    }
}

/// Map a non-optimal HiGHS status onto [`SolveStatus`].
///
/// All objective coefficients are non-negative, so "unbounded or infeasible"
/// can only mean infeasible here.
fn map_status(status: HighsModelStatus) -> SolveStatus {
    match status {
        HighsModelStatus::Optimal | HighsModelStatus::ModelEmpty => SolveStatus::Optimal,
        HighsModelStatus::Infeasible | HighsModelStatus::UnboundedOrInfeasible => {
            SolveStatus::Infeasible
        }
        HighsModelStatus::Unbounded => SolveStatus::Unbounded,
        HighsModelStatus::ReachedTimeLimit | HighsModelStatus::ReachedIterationLimit => {
            SolveStatus::Timeout
        }
        _ => SolveStatus::Error,
    }
}
