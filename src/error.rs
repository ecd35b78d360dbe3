//! Error taxonomy shared by every stage of the pipeline.

use crate::locate::solver::SolveStatus;
use crate::locate::sweep::SweepKey;

/// Errors raised while validating inputs, building, solving or extracting.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Tier brackets are malformed: empty, non-contiguous, overlapping,
    /// or with decreasing fixed cost.
    #[error("invalid tier table: {0}")]
    InvalidTierTable(String),

    /// A volume lies outside every tier bracket.
    #[error("volume {volume} is outside the tier domain [0, {max}]")]
    OutOfDomain { volume: f64, max: f64 },

    /// The solver did not return an optimal solution.
    #[error("{}", unsolvable_message(.status, .key))]
    UnsolvableInstance {
        status: SolveStatus,
        key: Option<SweepKey>,
    },

    /// Extraction found an ambiguity beyond the numeric tolerance.
    #[error("inconsistent solution: {0}")]
    InconsistentSolution(String),

    /// Structural problems in the instance data or the sweep plan.
    #[error("invalid instance: {0}")]
    InvalidInstance(String),

    /// Configuration parsed but describes an unusable sweep.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to parse configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn unsolvable_message(status: &SolveStatus, key: &Option<SweepKey>) -> String {
    match key {
        Some(key) => format!("instance {key} could not be solved: {status}"),
        None => format!("instance could not be solved: {status}"),
    }
}

impl Error {
    /// The solver status carried by an [`Error::UnsolvableInstance`].
    pub fn solve_status(&self) -> Option<SolveStatus> {
        match self {
            Error::UnsolvableInstance { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
