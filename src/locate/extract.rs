//! Turn solved column values into a [`Solution`].
//!
//! Every binary is read with the same tolerance [`EPSILON`]: a value within
//! `EPSILON` of one is selected, within `EPSILON` of zero is not, anything in
//! between is rejected. Costs are recomputed from the extracted structure and
//! checked against the objective the backend reported.

use indexmap::IndexMap;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::instance::{FacilityId, RegionId};
use crate::locate::model::{Cardinality, ModelInstance, VarId};
use crate::locate::solver::SolveResult;
use crate::tier::TierId;

/// Tolerance shared by tier matching, assignment matching and cost checks.
pub const EPSILON: f64 = 1e-6;

/// Annual cost split by origin.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct CostBreakdown {
    pub transportation: f64,
    pub fixed: f64,
    pub variable: f64,
}

impl CostBreakdown {
    pub fn total(&self) -> f64 {
        self.transportation + self.fixed + self.variable
    }
}

/// What happened to one candidate facility.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacilityOutcome {
    pub facility: FacilityId,
    /// Operating tier, `None` when closed
    pub tier: Option<TierId>,
    pub volume: f64,
    pub regions: Vec<RegionId>,
}

impl FacilityOutcome {
    pub fn is_open(&self) -> bool {
        self.tier.is_some()
    }
}

/// Extracted result of one solved model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Solution {
    variant: Option<String>,
    cardinality: Option<Cardinality>,
    facilities: Vec<FacilityOutcome>,
    assignments: IndexMap<RegionId, FacilityId>,
    costs: CostBreakdown,
    objective: f64,
}

impl Solution {
    pub fn variant(&self) -> Option<&str> {
        self.variant.as_deref()
    }

    pub fn cardinality(&self) -> Option<Cardinality> {
        self.cardinality
    }

    /// One entry per candidate facility, in instance order.
    pub fn facilities(&self) -> &[FacilityOutcome] {
        &self.facilities
    }

    pub fn facility(&self, id: &FacilityId) -> Option<&FacilityOutcome> {
        self.facilities.iter().find(|f| &f.facility == id)
    }

    pub fn open_facilities(&self) -> impl Iterator<Item = &FacilityOutcome> {
        self.facilities.iter().filter(|f| f.is_open())
    }

    pub fn n_open(&self) -> usize {
        self.open_facilities().count()
    }

    /// Region to serving facility, in region order.
    pub fn assignments(&self) -> &IndexMap<RegionId, FacilityId> {
        &self.assignments
    }

    pub fn assigned_facility(&self, region: &RegionId) -> Option<&FacilityId> {
        self.assignments.get(region)
    }

    pub fn costs(&self) -> &CostBreakdown {
        &self.costs
    }

    pub fn total_cost(&self) -> f64 {
        self.costs.total()
    }

    /// Objective value reported by the solver.
    pub fn objective(&self) -> f64 {
        self.objective
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binary {
    Zero,
    One,
}

fn read_binary(model: &ModelInstance<'_>, values: &[f64], var: VarId) -> Result<Binary> {
    let v = values[var.0];
    if v.abs() <= EPSILON {
        Ok(Binary::Zero)
    } else if (v - 1.0).abs() <= EPSILON {
        Ok(Binary::One)
    } else {
        Err(Error::InconsistentSolution(format!(
            "{} has fractional value {v}",
            model.columns()[var.0].name
        )))
    }
}

fn within(a: f64, b: f64, scale: f64) -> bool {
    (a - b).abs() <= EPSILON * scale.abs().max(1.0)
}

/// Extract the solution of `model` from the backend's `result`.
pub fn extract(model: &ModelInstance<'_>, result: &SolveResult) -> Result<Solution> {
    if !result.is_optimal() {
        return Err(Error::UnsolvableInstance {
            status: result.status,
            key: None,
        });
    }
    let values = &result.values;
    if values.len() != model.n_vars() {
        return Err(Error::InconsistentSolution(format!(
            "solver returned {} values for {} variables",
            values.len(),
            model.n_vars()
        )));
    }

    let instance = model.instance();
    let tiers = model.tiers();
    let facilities = instance.facilities();
    let regions = instance.regions();

    // Tier of every facility
    let mut chosen: Vec<Option<TierId>> = Vec::with_capacity(facilities.len());
    for (i, facility) in facilities.iter().enumerate() {
        let mut selected = None;
        for (t, _) in tiers.iter() {
            if read_binary(model, values, model.open_var(i, t))? == Binary::One {
                if let Some(other) = selected {
                    return Err(Error::InconsistentSolution(format!(
                        "facility {} is open in tiers {other} and {t}",
                        facility.id
                    )));
                }
                selected = Some(t);
            }
        }
        chosen.push(selected);
    }

    // Serving facility of every region
    let mut serving: Vec<Option<usize>> = vec![None; regions.len()];
    for ((i, j), var) in model.assignment_vars() {
        if read_binary(model, values, var)? == Binary::One {
            if let Some(other) = serving[j] {
                return Err(Error::InconsistentSolution(format!(
                    "region {} is assigned to both {} and {}",
                    regions[j].id, facilities[other].id, facilities[i].id
                )));
            }
            serving[j] = Some(i);
        }
    }

    let mut costs = CostBreakdown::default();
    let mut assignments = IndexMap::with_capacity(regions.len());
    let mut served: Vec<Vec<RegionId>> = vec![Vec::new(); facilities.len()];
    let mut volumes = vec![0.0; facilities.len()];
    for (j, region) in regions.iter().enumerate() {
        let i = serving[j].ok_or_else(|| {
            Error::InconsistentSolution(format!("region {} is not assigned", region.id))
        })?;
        if chosen[i].is_none() {
            return Err(Error::InconsistentSolution(format!(
                "region {} is assigned to closed facility {}",
                region.id, facilities[i].id
            )));
        }
        // Assignment variables exist only for pairs with a cost
        costs.transportation += instance.service_cost(i, j).unwrap_or_default();
        volumes[i] += region.demand;
        served[i].push(region.id.clone());
        assignments.insert(region.id.clone(), facilities[i].id.clone());
    }

    let mut outcomes = Vec::with_capacity(facilities.len());
    for (i, facility) in facilities.iter().enumerate() {
        let volume = volumes[i];
        let solved_volume: f64 = tiers
            .iter()
            .map(|(t, _)| values[model.volume_var(i, t).0])
            .sum();
        if !within(solved_volume, volume, volume) {
            return Err(Error::InconsistentSolution(format!(
                "facility {} handles {volume} but its volume variables sum to {solved_volume}",
                facility.id
            )));
        }

        if let Some(t) = chosen[i] {
            let tier = tiers.get(t).ok_or_else(|| {
                Error::InconsistentSolution(format!("tier {t} is not part of the table"))
            })?;
            let in_bracket = (volume >= tier.lower || within(volume, tier.lower, volume))
                && (volume <= tier.upper || within(volume, tier.upper, volume));
            if !in_bracket {
                return Err(Error::InconsistentSolution(format!(
                    "facility {} handles {volume} outside tier {t} [{}, {}]",
                    facility.id, tier.lower, tier.upper
                )));
            }
            costs.fixed += tier.fixed_cost;
            costs.variable += tier.variable_rate * volume;
        }

        outcomes.push(FacilityOutcome {
            facility: facility.id.clone(),
            tier: chosen[i],
            volume,
            regions: std::mem::take(&mut served[i]),
        });
    }

    let objective = result.objective.unwrap_or_else(|| model.evaluate(values));
    if !within(costs.total(), objective, objective) {
        return Err(Error::InconsistentSolution(format!(
            "recomputed cost {} differs from reported objective {objective}",
            costs.total()
        )));
    }

    Ok(Solution {
        variant: model.variant().map(str::to_string),
        cardinality: model.cardinality(),
        facilities: outcomes,
        assignments,
        costs,
        objective,
    })
}
