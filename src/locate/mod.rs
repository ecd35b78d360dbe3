//! Tiered facility location: model building, solving, extraction and sweeps.

pub mod extract;
pub mod model;
pub mod solver;
pub mod sweep;
