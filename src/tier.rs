//! Tiered facility cost functions
//!
//! A tier table is an ordered set of volume brackets. Each bracket carries a
//! fixed annual cost and a per-unit variable rate, so the cost of running a
//! facility is a step function of the volume it handles.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Largest gap allowed between one bracket's upper bound and the next
/// bracket's lower bound. Brackets in the source data are written on whole
/// units (`0..=19348`, `19349..=45415`).
const MAX_BRACKET_GAP: f64 = 1.0;

/// Position of a tier inside its table (zero-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TierId(pub usize);

impl fmt::Display for TierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0 + 1)
    }
}

/// One volume bracket with its cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostTier {
    /// Inclusive lower bound of the bracket
    pub lower: f64,
    /// Inclusive upper bound of the bracket
    pub upper: f64,
    /// Annual fixed cost of operating at this tier
    pub fixed_cost: f64,
    /// Cost per unit of handled volume
    pub variable_rate: f64,
}

impl CostTier {
    pub fn new(lower: f64, upper: f64, fixed_cost: f64, variable_rate: f64) -> Self {
        Self {
            lower,
            upper,
            fixed_cost,
            variable_rate,
        }
    }

    /// Cost of handling `volume` at this tier, ignoring the bracket bounds.
    pub fn cost_at(&self, volume: f64) -> f64 {
        self.fixed_cost + self.variable_rate * volume
    }

    pub fn contains(&self, volume: f64) -> bool {
        volume >= self.lower && volume <= self.upper
    }
}

/// The tier a volume falls into, with the resulting cost.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierQuote {
    pub tier: TierId,
    pub fixed_cost: f64,
    pub variable_rate: f64,
    pub total_cost: f64,
}

/// Validated, ordered set of cost tiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<CostTier>", into = "Vec<CostTier>")]
pub struct TierTable {
    tiers: Vec<CostTier>,
}

impl TierTable {
    /// Build a tier table, rejecting malformed bracket sets.
    pub fn new(tiers: Vec<CostTier>) -> Result<Self> {
        let Some(first) = tiers.first() else {
            return Err(Error::InvalidTierTable("no tiers given".into()));
        };
        if first.lower != 0.0 {
            return Err(Error::InvalidTierTable(format!(
                "first tier must start at 0, starts at {}",
                first.lower
            )));
        }

        for (t, tier) in tiers.iter().enumerate() {
            let id = TierId(t);
            let values = [tier.lower, tier.upper, tier.fixed_cost, tier.variable_rate];
            if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
                return Err(Error::InvalidTierTable(format!(
                    "tier {id} has a negative or non-finite parameter"
                )));
            }
            if tier.lower > tier.upper {
                return Err(Error::InvalidTierTable(format!(
                    "tier {id} has lower bound {} above upper bound {}",
                    tier.lower, tier.upper
                )));
            }
        }

        for (t, pair) in tiers.windows(2).enumerate() {
            let (prev, next) = (&pair[0], &pair[1]);
            let (prev_id, next_id) = (TierId(t), TierId(t + 1));
            if next.lower <= prev.upper {
                return Err(Error::InvalidTierTable(format!(
                    "tiers {prev_id} and {next_id} overlap at {}",
                    next.lower
                )));
            }
            if next.lower - prev.upper > MAX_BRACKET_GAP {
                return Err(Error::InvalidTierTable(format!(
                    "gap between tiers {prev_id} ({}) and {next_id} ({})",
                    prev.upper, next.lower
                )));
            }
            if next.fixed_cost < prev.fixed_cost {
                return Err(Error::InvalidTierTable(format!(
                    "fixed cost decreases from {} ({prev_id}) to {} ({next_id})",
                    prev.fixed_cost, next.fixed_cost
                )));
            }
            // The smallest tiers are allowed to be priced freely.
            if t >= 1 && next.variable_rate > prev.variable_rate {
                log::warn!(
                    "variable rate rises from {} ({prev_id}) to {} ({next_id})",
                    prev.variable_rate,
                    next.variable_rate
                );
            }
        }

        Ok(Self { tiers })
    }

    /// Single-tier table covering `[0, upper]`.
    pub fn flat(upper: f64, fixed_cost: f64, variable_rate: f64) -> Result<Self> {
        Self::new(vec![CostTier::new(0.0, upper, fixed_cost, variable_rate)])
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    pub fn get(&self, id: TierId) -> Option<&CostTier> {
        self.tiers.get(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (TierId, &CostTier)> {
        self.tiers.iter().enumerate().map(|(t, tier)| (TierId(t), tier))
    }

    /// Upper bound of the top tier.
    pub fn max_volume(&self) -> f64 {
        self.tiers.last().map_or(0.0, |tier| tier.upper)
    }

    /// Find the tier whose bracket holds `volume` and price it.
    ///
    /// Bounds are inclusive, so a volume equal to a bound belongs to the tier
    /// declaring that bound. A volume in the gap between two brackets is out
    /// of domain, as no tier can carry it.
    pub fn resolve(&self, volume: f64) -> Result<TierQuote> {
        let max = self.max_volume();
        if !volume.is_finite() || volume < 0.0 || volume > max {
            return Err(Error::OutOfDomain { volume, max });
        }

        let t = self
            .tiers
            .iter()
            .skip(1)
            .take_while(|tier| tier.lower <= volume)
            .count();
        let tier = &self.tiers[t];
        if volume > tier.upper {
            return Err(Error::OutOfDomain { volume, max });
        }

        Ok(TierQuote {
            tier: TierId(t),
            fixed_cost: tier.fixed_cost,
            variable_rate: tier.variable_rate,
            total_cost: tier.cost_at(volume),
        })
    }
}

impl TryFrom<Vec<CostTier>> for TierTable {
    type Error = Error;

    fn try_from(tiers: Vec<CostTier>) -> Result<Self> {
        Self::new(tiers)
    }
}

impl From<TierTable> for Vec<CostTier> {
    fn from(table: TierTable) -> Self {
        table.tiers
    }
}
