//! JSON sweep configuration
//!
//! Describes the tier-table variants to compare, the cardinalities to sweep,
//! facilities that must stay open and the limits handed to HiGHS.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::instance::{FacilityId, InstanceData};
use crate::locate::solver::HighsSolver;
use crate::locate::sweep::{SweepDriver, SweepPlan, TierVariant};
use crate::tier::TierTable;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SweepConfig {
    /// Variant used for the baseline solve; the first variant when absent
    #[serde(default)]
    pub default_variant: Option<String>,
    pub variants: Vec<VariantConfig>,
    #[serde(default)]
    pub caps: CapsConfig,
    #[serde(default)]
    pub force_open: Vec<FacilityId>,
    #[serde(default)]
    pub solver: SolverConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariantConfig {
    pub id: String,
    pub tiers: TierTable,
}

/// Which cardinalities to sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapsConfig {
    /// One unconstrained point per variant
    #[default]
    None,
    /// From the minimum feasible count up to every candidate
    FullRange,
    AtMost(CountRange),
    Exactly(CountRange),
    /// Explicit at-most caps, in order
    List(Vec<usize>),
}

/// Inclusive count range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CountRange {
    pub from: usize,
    pub to: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SolverConfig {
    #[serde(default)]
    pub time_limit_secs: Option<f64>,
    #[serde(default)]
    pub mip_rel_gap: Option<f64>,
    #[serde(default)]
    pub verbose: bool,
}

impl SweepConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: SweepConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        log::info!("loading sweep configuration from {}", path.display());
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    fn validate(&self) -> Result<()> {
        if self.variants.is_empty() {
            return Err(Error::InvalidConfig("no tier variants configured".into()));
        }
        if let Some(id) = &self.default_variant {
            if !self.variants.iter().any(|v| &v.id == id) {
                return Err(Error::InvalidConfig(format!(
                    "default variant {id} is not configured"
                )));
            }
        }
        if let CapsConfig::AtMost(range) | CapsConfig::Exactly(range) = &self.caps {
            if range.from > range.to {
                return Err(Error::InvalidConfig(format!(
                    "cap range {}..={} is empty",
                    range.from, range.to
                )));
            }
        }
        self.solver().map(|_| ())
    }

    pub fn tier_variants(&self) -> Vec<TierVariant> {
        self.variants
            .iter()
            .map(|v| TierVariant::new(v.id.clone(), v.tiers.clone()))
            .collect()
    }

    pub fn default_variant(&self) -> Result<TierVariant> {
        let variant = match &self.default_variant {
            Some(id) => self.variants.iter().find(|v| &v.id == id),
            None => self.variants.first(),
        };
        variant
            .map(|v| TierVariant::new(v.id.clone(), v.tiers.clone()))
            .ok_or_else(|| Error::InvalidConfig("no default tier variant".into()))
    }

    pub fn plan(&self, instance: &InstanceData) -> SweepPlan {
        let variants = self.tier_variants();
        match &self.caps {
            CapsConfig::None => SweepPlan::new(variants),
            CapsConfig::FullRange => SweepPlan::full_range(instance, variants),
            CapsConfig::AtMost(r) => SweepPlan::new(variants).caps(r.from..=r.to),
            CapsConfig::Exactly(r) => SweepPlan::new(variants).exact(r.from..=r.to),
            CapsConfig::List(caps) => SweepPlan::new(variants).caps(caps.iter().copied()),
        }
    }

    /// HiGHS backend with the configured limits.
    pub fn solver(&self) -> Result<HighsSolver> {
        let mut solver = HighsSolver::new().verbose(self.solver.verbose);
        if let Some(secs) = self.solver.time_limit_secs {
            let limit = Duration::try_from_secs_f64(secs)
                .ok()
                .filter(|limit| !limit.is_zero())
                .ok_or_else(|| Error::InvalidConfig(format!("invalid time limit {secs}")))?;
            solver = solver.with_time_limit(limit);
        }
        if let Some(gap) = self.solver.mip_rel_gap {
            if !gap.is_finite() || gap < 0.0 {
                return Err(Error::InvalidConfig(format!("invalid MIP gap {gap}")));
            }
            solver = solver.with_mip_rel_gap(gap);
        }
        Ok(solver)
    }

    /// Driver over `instance` with the configured default variant, forced
    /// facilities and HiGHS limits.
    pub fn driver<'a>(&self, instance: &'a InstanceData) -> Result<SweepDriver<'a, HighsSolver>> {
        SweepDriver::new(instance, self.default_variant()?, self.solver()?)
            .force_open(self.force_open.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{Facility, Region, ServiceCost};
    use crate::locate::model::Cardinality;

    const CONFIG: &str = r#"{
        "default_variant": "lean",
        "variants": [
            { "id": "base", "tiers": [
                { "lower": 0, "upper": 19348, "fixed_cost": 61165, "variable_rate": 4.14 },
                { "lower": 19349, "upper": 99999999, "fixed_cost": 86071, "variable_rate": 2.85 }
            ]},
            { "id": "lean", "tiers": [
                { "lower": 0, "upper": 99999999, "fixed_cost": 50000, "variable_rate": 3.0 }
            ]}
        ],
        "caps": { "at_most": { "from": 1, "to": 3 } },
        "force_open": ["W2"],
        "solver": { "time_limit_secs": 30.0, "mip_rel_gap": 0.001 }
    }"#;

    fn instance() -> InstanceData {
        InstanceData::new(
            vec![Facility::new("W1"), Facility::new("W2"), Facility::new("W3")],
            vec![Region::new("R1", 10.0)],
            vec![ServiceCost::new("W1", "R1", 1.0)],
        )
        .unwrap()
    }

    #[test]
    fn test_parse_full_config() {
        let config = SweepConfig::from_json_str(CONFIG).unwrap();
        assert_eq!(config.variants.len(), 2);
        assert_eq!(config.default_variant().unwrap().id(), "lean");
        assert_eq!(config.force_open, vec![FacilityId::from("W2")]);
        assert_eq!(
            config.solver().unwrap(),
            HighsSolver::new()
                .with_time_limit(Duration::from_secs(30))
                .with_mip_rel_gap(0.001)
        );

        let data = instance();
        let plan = config.plan(&data);
        assert_eq!(plan.len(), 6);
        let first = plan.points().next().unwrap();
        assert_eq!(first.0.id(), "base");
        assert_eq!(first.1, Some(Cardinality::AtMost(1)));

        let driver = config.driver(&data).unwrap();
        assert_eq!(driver.default_variant().id(), "lean");
    }

    #[test]
    fn test_caps_variants() {
        let data = instance();
        let parse = |caps: &str| {
            let json = format!(
                r#"{{ "variants": [{{ "id": "a", "tiers": [
                    {{ "lower": 0, "upper": 100, "fixed_cost": 1, "variable_rate": 1 }}
                ]}}], "caps": {caps} }}"#
            );
            SweepConfig::from_json_str(&json)
        };

        let none = parse(r#""none""#).unwrap();
        assert_eq!(none.plan(&data).len(), 1);

        let full = parse(r#""full_range""#).unwrap();
        assert_eq!(full.plan(&data).len(), 3);

        let list = parse(r#"{ "list": [3, 1] }"#).unwrap();
        let caps: Vec<_> = list.plan(&data).points().map(|(_, c)| c).collect();
        assert_eq!(
            caps,
            vec![Some(Cardinality::AtMost(3)), Some(Cardinality::AtMost(1))]
        );

        let exact = parse(r#"{ "exactly": { "from": 2, "to": 2 } }"#).unwrap();
        let caps: Vec<_> = exact.plan(&data).points().map(|(_, c)| c).collect();
        assert_eq!(caps, vec![Some(Cardinality::Exactly(2))]);

        assert!(matches!(
            parse(r#"{ "at_most": { "from": 3, "to": 1 } }"#),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_bad_configs() {
        assert!(matches!(
            SweepConfig::from_json_str(r#"{ "variants": [] }"#),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            SweepConfig::from_json_str(r#"{ "variants": "nope" }"#),
            Err(Error::Config(_))
        ));

        // Tier validation runs while deserializing
        let gap = r#"{ "variants": [{ "id": "a", "tiers": [
            { "lower": 0, "upper": 100, "fixed_cost": 1, "variable_rate": 1 },
            { "lower": 500, "upper": 900, "fixed_cost": 2, "variable_rate": 1 }
        ]}] }"#;
        assert!(matches!(SweepConfig::from_json_str(gap), Err(Error::Config(_))));

        let missing_default = r#"{ "default_variant": "x", "variants": [{ "id": "a", "tiers": [
            { "lower": 0, "upper": 100, "fixed_cost": 1, "variable_rate": 1 }
        ]}] }"#;
        assert!(matches!(
            SweepConfig::from_json_str(missing_default),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_unrepresentable_time_limits() {
        let with_limit = |secs: &str| {
            let json = format!(
                r#"{{ "variants": [{{ "id": "a", "tiers": [
                    {{ "lower": 0, "upper": 100, "fixed_cost": 1, "variable_rate": 1 }}
                ]}}], "solver": {{ "time_limit_secs": {secs} }} }}"#
            );
            SweepConfig::from_json_str(&json)
        };

        for secs in ["1e20", "0", "-5"] {
            assert!(
                matches!(with_limit(secs), Err(Error::InvalidConfig(_))),
                "time limit {secs} accepted"
            );
        }

        let mut config = with_limit("10").unwrap();
        config.solver.time_limit_secs = Some(f64::MAX);
        assert!(matches!(config.solver(), Err(Error::InvalidConfig(_))));
        assert!(matches!(config.driver(&instance()), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let err = SweepConfig::load("/nonexistent/sweep.json").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
