//! Tiered-cost capacitated facility location.
//!
//! Decide which candidate facilities to open, at which cost tier, and which
//! facility serves each demand region, minimising transportation plus tiered
//! fixed and variable facility cost. Models are solved through a
//! [`SolverAdapter`]; [`SweepDriver`] re-solves them across cardinality caps
//! and alternate tier tables for sensitivity analysis.
//!
//! ```no_run
//! use tiered_cflp::{
//!     Facility, HighsSolver, InstanceData, Region, ServiceCost, SweepDriver, SweepPlan,
//!     TierTable, TierVariant,
//! };
//!
//! # fn main() -> tiered_cflp::Result<()> {
//! let instance = InstanceData::new(
//!     vec![Facility::new("F1"), Facility::new("F2")],
//!     vec![Region::new("R1", 100.0), Region::new("R2", 50.0)],
//!     vec![
//!         ServiceCost::new("F1", "R1", 10.0),
//!         ServiceCost::new("F1", "R2", 20.0),
//!         ServiceCost::new("F2", "R1", 30.0),
//!         ServiceCost::new("F2", "R2", 5.0),
//!     ],
//! )?;
//! let base = TierVariant::new("base", TierTable::flat(1000.0, 1000.0, 1.0)?);
//!
//! let driver = SweepDriver::new(&instance, base.clone(), HighsSolver::new());
//! let baseline = driver.baseline()?;
//! println!("best network cost: {}", baseline.total_cost());
//!
//! let results = driver.run(&SweepPlan::new(vec![base]).caps(0..=2))?;
//! for (key, outcome) in results.iter() {
//!     match outcome {
//!         Ok(solution) => println!("{key}: {}", solution.total_cost()),
//!         Err(err) => println!("{key}: {err}"),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod instance;
pub mod locate;
pub mod tier;

pub use config::SweepConfig;
pub use error::{Error, Result};
pub use instance::{Facility, FacilityId, InstanceData, Region, RegionId, ServiceCost};
pub use locate::extract::{extract, CostBreakdown, FacilityOutcome, Solution, EPSILON};
pub use locate::model::{Cardinality, ModelBuilder, ModelInstance};
pub use locate::solver::{HighsSolver, SolveResult, SolveStatus, SolverAdapter};
pub use locate::sweep::{SweepDriver, SweepKey, SweepPlan, SweepResultSet, TierVariant};
pub use tier::{CostTier, TierId, TierQuote, TierTable};
