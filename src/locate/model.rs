//! Tiered Capacitated Facility Location model
//!
//! Minimize transportation cost plus tiered facility cost. Each open facility
//! operates in exactly one volume tier; the tier fixes its annual fixed cost
//! and per-unit variable rate.
//!
//! Variables:
//! - assignment[i,j] binary, for every (facility, region) pair with a service cost
//! - open[i,t] binary, facility i operates at tier t
//! - volume[i,t] continuous, volume handled by facility i under tier t
//!
//! The builder only lays out columns and rows. Solving is left to a
//! [`SolverAdapter`](crate::locate::solver::SolverAdapter).

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::instance::{FacilityId, InstanceData};
use crate::tier::{TierId, TierTable};

/// Index of a column in a [`ModelInstance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Binary,
    Continuous,
}

/// A decision variable with its bounds and objective coefficient.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub kind: VarKind,
    pub lower: f64,
    pub upper: f64,
    pub cost: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowSense {
    LessEq,
    GreaterEq,
    Equal,
}

/// A linear constraint `sum(coef * var) <sense> rhs`.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub name: String,
    pub terms: Vec<(VarId, f64)>,
    pub sense: RowSense,
    pub rhs: f64,
}

/// Bound on the number of open facilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    AtMost(usize),
    Exactly(usize),
}

impl Cardinality {
    pub fn count(&self) -> usize {
        match *self {
            Cardinality::AtMost(n) | Cardinality::Exactly(n) => n,
        }
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cardinality::AtMost(n) => write!(f, "<={n}"),
            Cardinality::Exactly(n) => write!(f, "=={n}"),
        }
    }
}

/// A fully specified optimisation model, ready for a solver.
///
/// Borrows the instance data and the tier table it was built from so the
/// extractor can interpret the solved values. Nothing in here can be changed
/// after [`ModelBuilder::build`].
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInstance<'a> {
    instance: &'a InstanceData,
    tiers: &'a TierTable,
    variant: Option<String>,
    cardinality: Option<Cardinality>,
    forced_open: Vec<usize>,
    columns: Vec<Column>,
    rows: Vec<Row>,
    assignment: IndexMap<(usize, usize), VarId>,
    open: Vec<Vec<VarId>>,
    volume: Vec<Vec<VarId>>,
}

impl<'a> ModelInstance<'a> {
    pub fn instance(&self) -> &'a InstanceData {
        self.instance
    }

    pub fn tiers(&self) -> &'a TierTable {
        self.tiers
    }

    pub fn variant(&self) -> Option<&str> {
        self.variant.as_deref()
    }

    pub fn cardinality(&self) -> Option<Cardinality> {
        self.cardinality
    }

    /// Facility indices that are forced open.
    pub fn forced_open(&self) -> &[usize] {
        &self.forced_open
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn n_vars(&self) -> usize {
        self.columns.len()
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn assignment_var(&self, facility: usize, region: usize) -> Option<VarId> {
        self.assignment.get(&(facility, region)).copied()
    }

    /// Assignment variables as `((facility, region), var)` in column order.
    pub fn assignment_vars(&self) -> impl Iterator<Item = ((usize, usize), VarId)> + '_ {
        self.assignment.iter().map(|(&pair, &var)| (pair, var))
    }

    pub fn open_var(&self, facility: usize, tier: TierId) -> VarId {
        self.open[facility][tier.0]
    }

    pub fn volume_var(&self, facility: usize, tier: TierId) -> VarId {
        self.volume[facility][tier.0]
    }

    /// Objective value of a full assignment of column values.
    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.columns
            .iter()
            .zip(values)
            .map(|(col, v)| col.cost * v)
            .sum()
    }
}

/// Lays out the tiered facility location model for one sweep point.
#[derive(Debug, Clone)]
pub struct ModelBuilder<'a> {
    instance: &'a InstanceData,
    tiers: &'a TierTable,
    variant: Option<String>,
    cardinality: Option<Cardinality>,
    force_open: Vec<FacilityId>,
}

impl<'a> ModelBuilder<'a> {
    pub fn new(instance: &'a InstanceData, tiers: &'a TierTable) -> Self {
        Self {
            instance,
            tiers,
            variant: None,
            cardinality: None,
            force_open: Vec::new(),
        }
    }

    /// Label the model with the tier-table variant it belongs to.
    pub fn variant(mut self, id: impl Into<String>) -> Self {
        self.variant = Some(id.into());
        self
    }

    pub fn cardinality(mut self, cardinality: Option<Cardinality>) -> Self {
        self.cardinality = cardinality;
        self
    }

    /// Allow at most `n` open facilities.
    pub fn cap(self, n: usize) -> Self {
        self.cardinality(Some(Cardinality::AtMost(n)))
    }

    pub fn force_open(mut self, facilities: &[FacilityId]) -> Self {
        self.force_open = facilities.to_vec();
        self
    }

    pub fn build(self) -> Result<ModelInstance<'a>> {
        let instance = self.instance;
        let tiers = self.tiers;
        let facilities = instance.facilities();
        let regions = instance.regions();
        let n_fac = instance.n_facilities();

        let mut forced_open = Vec::with_capacity(self.force_open.len());
        for id in &self.force_open {
            let i = instance.facility_index(id).ok_or_else(|| {
                Error::InvalidInstance(format!("cannot force open unknown facility {id}"))
            })?;
            if !forced_open.contains(&i) {
                forced_open.push(i);
            }
        }

        let mut columns: Vec<Column> = Vec::new();
        let mut add_column = |name: String, kind: VarKind, upper: f64, cost: f64| {
            columns.push(Column {
                name,
                kind,
                lower: 0.0,
                upper,
                cost,
            });
            VarId(columns.len() - 1)
        };

        // assignment[i,j]: only for pairs with a service cost
        let mut assignment = IndexMap::new();
        for ((i, j), cost) in instance.service_costs() {
            let name = format!("assign[{},{}]", facilities[i].id, regions[j].id);
            assignment.insert((i, j), add_column(name, VarKind::Binary, 1.0, cost));
        }

        // open[i,t]: binary, charged the tier's fixed cost
        let open: Vec<Vec<VarId>> = facilities
            .iter()
            .map(|f| {
                tiers
                    .iter()
                    .map(|(t, tier)| {
                        let name = format!("open[{},{t}]", f.id);
                        add_column(name, VarKind::Binary, 1.0, tier.fixed_cost)
                    })
                    .collect()
            })
            .collect();

        // volume[i,t]: continuous, charged the tier's variable rate
        let volume: Vec<Vec<VarId>> = facilities
            .iter()
            .map(|f| {
                tiers
                    .iter()
                    .map(|(t, tier)| {
                        let name = format!("volume[{},{t}]", f.id);
                        add_column(name, VarKind::Continuous, tier.upper, tier.variable_rate)
                    })
                    .collect()
            })
            .collect();

        let mut rows: Vec<Row> = Vec::new();
        let mut add_row = |name: String, terms: Vec<(VarId, f64)>, sense: RowSense, rhs: f64| {
            rows.push(Row {
                name,
                terms,
                sense,
                rhs,
            });
        };

        // Constraint 1: assignment[i,j] <= sum_t open[i,t] (only open facilities serve)
        // Rewritten: assignment[i,j] - sum_t open[i,t] <= 0
        for (&(i, j), &x) in &assignment {
            let mut terms = vec![(x, 1.0)];
            terms.extend(open[i].iter().map(|&y| (y, -1.0)));
            let name = format!("serve_open[{},{}]", facilities[i].id, regions[j].id);
            add_row(name, terms, RowSense::LessEq, 0.0);
        }

        // Constraint 2: sum_i assignment[i,j] = 1 for all j (each region served once)
        for (j, region) in regions.iter().enumerate() {
            let terms: Vec<(VarId, f64)> = (0..n_fac)
                .filter_map(|i| assignment.get(&(i, j)).map(|&x| (x, 1.0)))
                .collect();
            add_row(format!("single[{}]", region.id), terms, RowSense::Equal, 1.0);
        }

        // Constraint 3: sum_t volume[i,t] = sum_j demand[j] * assignment[i,j]
        // Rewritten: sum_t volume[i,t] - sum_j demand[j] * assignment[i,j] = 0
        for (i, facility) in facilities.iter().enumerate() {
            let mut terms: Vec<(VarId, f64)> = volume[i].iter().map(|&z| (z, 1.0)).collect();
            terms.extend(
                regions
                    .iter()
                    .enumerate()
                    .filter_map(|(j, r)| assignment.get(&(i, j)).map(|&x| (x, -r.demand))),
            );
            add_row(format!("balance[{}]", facility.id), terms, RowSense::Equal, 0.0);
        }

        // Constraint 4: lower[t] * open[i,t] <= volume[i,t] <= upper[t] * open[i,t]
        for (i, facility) in facilities.iter().enumerate() {
            for (t, tier) in tiers.iter() {
                let (y, z) = (open[i][t.0], volume[i][t.0]);
                add_row(
                    format!("tier_lo[{},{t}]", facility.id),
                    vec![(z, 1.0), (y, -tier.lower)],
                    RowSense::GreaterEq,
                    0.0,
                );
                add_row(
                    format!("tier_hi[{},{t}]", facility.id),
                    vec![(z, 1.0), (y, -tier.upper)],
                    RowSense::LessEq,
                    0.0,
                );
            }
        }

        // Constraint 5: sum_t open[i,t] <= 1 (a facility runs in one tier at most)
        for (i, facility) in facilities.iter().enumerate() {
            let terms: Vec<(VarId, f64)> = open[i].iter().map(|&y| (y, 1.0)).collect();
            add_row(format!("one_tier[{}]", facility.id), terms, RowSense::LessEq, 1.0);
        }

        // Constraint 6: sum_t open[i,t] = 1 for forced facilities
        for &i in &forced_open {
            let terms: Vec<(VarId, f64)> = open[i].iter().map(|&y| (y, 1.0)).collect();
            add_row(format!("forced[{}]", facilities[i].id), terms, RowSense::Equal, 1.0);
        }

        // Constraint 7: cardinality on sum_i sum_t open[i,t]
        if let Some(cardinality) = self.cardinality {
            let terms: Vec<(VarId, f64)> = open.iter().flatten().map(|&y| (y, 1.0)).collect();
            let sense = match cardinality {
                Cardinality::AtMost(_) => RowSense::LessEq,
                Cardinality::Exactly(_) => RowSense::Equal,
            };
            add_row("cardinality".to_string(), terms, sense, cardinality.count() as f64);
        }

        log::debug!(
            "built model {}: {} columns, {} rows",
            self.variant.as_deref().unwrap_or("-"),
            columns.len(),
            rows.len()
        );

        Ok(ModelInstance {
            instance,
            tiers,
            variant: self.variant,
            cardinality: self.cardinality,
            forced_open,
            columns,
            rows,
            assignment,
            open,
            volume,
        })
    }
}
