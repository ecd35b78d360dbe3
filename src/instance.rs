//! Problem instance: candidate facilities, demand regions and service costs.

use std::collections::HashSet;
use std::fmt;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::tier::TierTable;

/// Free-form descriptive attributes (city, zip code, coordinates, ...).
/// The optimisation never looks at them.
pub type Attributes = IndexMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FacilityId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionId(pub String);

impl fmt::Display for FacilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FacilityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for RegionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Candidate facility site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facility {
    pub id: FacilityId,
    #[serde(default)]
    pub attributes: Attributes,
}

impl Facility {
    pub fn new(id: impl Into<FacilityId>) -> Self {
        Self {
            id: id.into(),
            attributes: Attributes::new(),
        }
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<String>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }
}

/// Demand region with the volume it requires per year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: RegionId,
    pub demand: f64,
    #[serde(default)]
    pub attributes: Attributes,
}

impl Region {
    pub fn new(id: impl Into<RegionId>, demand: f64) -> Self {
        Self {
            id: id.into(),
            demand,
            attributes: Attributes::new(),
        }
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<String>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }
}

/// One row of the service-cost table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCost {
    pub facility: FacilityId,
    pub region: RegionId,
    pub cost: f64,
}

impl ServiceCost {
    pub fn new(facility: impl Into<FacilityId>, region: impl Into<RegionId>, cost: f64) -> Self {
        Self {
            facility: facility.into(),
            region: region.into(),
            cost,
        }
    }
}

/// Validated instance data.
///
/// Facilities and regions are addressed by their position; service costs are
/// kept sparse, keyed by `(facility index, region index)` in input order. A
/// pair without an entry cannot be assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceData {
    facilities: Vec<Facility>,
    regions: Vec<Region>,
    facility_ids: IndexSet<FacilityId>,
    service_costs: IndexMap<(usize, usize), f64>,
}

impl InstanceData {
    pub fn new(
        facilities: Vec<Facility>,
        regions: Vec<Region>,
        service_costs: Vec<ServiceCost>,
    ) -> Result<Self> {
        if facilities.is_empty() {
            return Err(Error::InvalidInstance("no candidate facilities".into()));
        }

        let facility_index = index_ids(facilities.iter().map(|f| &f.id), "facility")?;
        let region_index = index_ids(regions.iter().map(|r| &r.id), "region")?;

        for region in &regions {
            if !region.demand.is_finite() || region.demand < 0.0 {
                return Err(Error::InvalidInstance(format!(
                    "region {} has invalid demand {}",
                    region.id, region.demand
                )));
            }
        }

        let mut costs = IndexMap::with_capacity(service_costs.len());
        for entry in service_costs {
            let i = facility_index.get_index_of(&entry.facility).ok_or_else(|| {
                Error::InvalidInstance(format!(
                    "service cost refers to unknown facility {}",
                    entry.facility
                ))
            })?;
            let j = region_index.get_index_of(&entry.region).ok_or_else(|| {
                Error::InvalidInstance(format!(
                    "service cost refers to unknown region {}",
                    entry.region
                ))
            })?;
            if !entry.cost.is_finite() || entry.cost < 0.0 {
                return Err(Error::InvalidInstance(format!(
                    "service cost {} -> {} is invalid: {}",
                    entry.facility, entry.region, entry.cost
                )));
            }
            if costs.insert((i, j), entry.cost).is_some() {
                return Err(Error::InvalidInstance(format!(
                    "duplicate service cost {} -> {}",
                    entry.facility, entry.region
                )));
            }
        }

        let reachable: HashSet<usize> = costs.keys().map(|&(_, j)| j).collect();
        if let Some(region) = regions
            .iter()
            .enumerate()
            .find(|(j, _)| !reachable.contains(j))
            .map(|(_, r)| r)
        {
            return Err(Error::InvalidInstance(format!(
                "region {} has no service cost to any facility",
                region.id
            )));
        }

        Ok(Self {
            facilities,
            regions,
            facility_ids: facility_index,
            service_costs: costs,
        })
    }

    pub fn facilities(&self) -> &[Facility] {
        &self.facilities
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn n_facilities(&self) -> usize {
        self.facilities.len()
    }

    pub fn n_regions(&self) -> usize {
        self.regions.len()
    }

    /// Service cost for facility `i` serving region `j`, if the pair exists.
    pub fn service_cost(&self, i: usize, j: usize) -> Option<f64> {
        self.service_costs.get(&(i, j)).copied()
    }

    /// All candidate pairs `((i, j), cost)` in input order.
    pub fn service_costs(&self) -> impl Iterator<Item = ((usize, usize), f64)> + '_ {
        self.service_costs.iter().map(|(&pair, &cost)| (pair, cost))
    }

    pub fn facility_index(&self, id: &FacilityId) -> Option<usize> {
        self.facility_ids.get_index_of(id)
    }

    pub fn total_demand(&self) -> f64 {
        self.regions.iter().map(|r| r.demand).sum()
    }

    /// Smallest facility count that can carry the total demand when every
    /// open facility runs at the top tier. At least one when there is demand
    /// to serve, never more than the number of candidates.
    pub fn min_feasible_facilities(&self, tiers: &TierTable) -> usize {
        if self.regions.is_empty() {
            return 0;
        }
        let capacity = tiers.max_volume();
        let needed = if capacity > 0.0 {
            (self.total_demand() / capacity).ceil() as usize
        } else {
            self.n_facilities()
        };
        needed.clamp(1, self.n_facilities())
    }
}

fn index_ids<'a, T>(ids: impl Iterator<Item = &'a T>, kind: &str) -> Result<IndexSet<T>>
where
    T: fmt::Display + Clone + Eq + std::hash::Hash + 'a,
{
    let mut seen = IndexSet::new();
    for id in ids {
        if !seen.insert(id.clone()) {
            return Err(Error::InvalidInstance(format!("duplicate {kind} id {id}")));
        }
    }
    Ok(seen)
}
