//! Sensitivity sweeps over cardinality caps and tier-table variants
//!
//! Every sweep point is an independent build, solve and extract cycle.
//! Nothing is carried from one point to the next; a point that cannot be
//! solved is recorded under its key and the sweep moves on.

use std::collections::HashSet;
use std::fmt;
use std::ops::ControlFlow;

use indexmap::IndexMap;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::instance::{FacilityId, InstanceData};
use crate::locate::extract::{extract, Solution};
use crate::locate::model::{Cardinality, ModelBuilder, ModelInstance};
use crate::locate::solver::SolverAdapter;
use crate::tier::TierTable;

/// A named tier table.
#[derive(Debug, Clone, PartialEq)]
pub struct TierVariant {
    id: String,
    table: TierTable,
}

impl TierVariant {
    pub fn new(id: impl Into<String>, table: TierTable) -> Self {
        Self {
            id: id.into(),
            table,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn table(&self) -> &TierTable {
        &self.table
    }
}

/// Identifies one sweep point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SweepKey {
    pub variant: String,
    pub cardinality: Option<Cardinality>,
}

impl SweepKey {
    pub fn new(variant: impl Into<String>, cardinality: Option<Cardinality>) -> Self {
        Self {
            variant: variant.into(),
            cardinality,
        }
    }
}

impl fmt::Display for SweepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cardinality {
            Some(c) => write!(f, "({}, {c})", self.variant),
            None => write!(f, "({}, unconstrained)", self.variant),
        }
    }
}

/// Points to visit: every variant crossed with every cardinality, variant-major.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepPlan {
    variants: Vec<TierVariant>,
    cardinalities: Vec<Option<Cardinality>>,
}

impl SweepPlan {
    /// A plan with one unconstrained point per variant.
    pub fn new(variants: Vec<TierVariant>) -> Self {
        Self {
            variants,
            cardinalities: vec![None],
        }
    }

    /// Replace the cardinalities with the given list.
    pub fn cardinalities(
        mut self,
        cardinalities: impl IntoIterator<Item = Option<Cardinality>>,
    ) -> Self {
        self.cardinalities = cardinalities.into_iter().collect();
        self
    }

    /// Sweep `AtMost(n)` caps, in the given order.
    pub fn caps(self, caps: impl IntoIterator<Item = usize>) -> Self {
        self.cardinalities(caps.into_iter().map(|n| Some(Cardinality::AtMost(n))))
    }

    /// Sweep `Exactly(n)` counts, in the given order.
    pub fn exact(self, counts: impl IntoIterator<Item = usize>) -> Self {
        self.cardinalities(counts.into_iter().map(|n| Some(Cardinality::Exactly(n))))
    }

    /// Caps from the smallest count any variant could be feasible with up
    /// to the number of candidate facilities.
    pub fn full_range(instance: &InstanceData, variants: Vec<TierVariant>) -> Self {
        let from = variants
            .iter()
            .map(|v| instance.min_feasible_facilities(v.table()))
            .min()
            .unwrap_or(1);
        let to = instance.n_facilities();
        Self::new(variants).caps(from..=to)
    }

    pub fn variants(&self) -> &[TierVariant] {
        &self.variants
    }

    pub fn len(&self) -> usize {
        self.variants.len() * self.cardinalities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Points in sweep order.
    pub fn points(&self) -> impl Iterator<Item = (&TierVariant, Option<Cardinality>)> + '_ {
        self.variants
            .iter()
            .flat_map(move |v| self.cardinalities.iter().map(move |&c| (v, c)))
    }

    fn validate(&self) -> Result<()> {
        if self.variants.is_empty() {
            return Err(Error::InvalidInstance("sweep plan has no tier variants".into()));
        }
        if self.cardinalities.is_empty() {
            return Err(Error::InvalidInstance("sweep plan has no cardinalities".into()));
        }
        let mut ids = HashSet::new();
        for variant in &self.variants {
            if !ids.insert(variant.id()) {
                return Err(Error::InvalidInstance(format!(
                    "tier variant {} appears twice in the sweep plan",
                    variant.id()
                )));
            }
        }
        let mut seen = HashSet::new();
        for &cardinality in &self.cardinalities {
            if !seen.insert(cardinality) {
                return Err(Error::InvalidInstance(format!(
                    "cardinality {cardinality:?} appears twice in the sweep plan"
                )));
            }
        }
        Ok(())
    }
}

/// Outcome recorded for one sweep point.
pub type PointOutcome = Result<Solution>;

/// Outcomes keyed by sweep point, in the order the points were solved.
#[derive(Debug, Default)]
pub struct SweepResultSet {
    entries: IndexMap<SweepKey, PointOutcome>,
}

impl SweepResultSet {
    /// Append an outcome and return its position.
    fn record(&mut self, key: SweepKey, outcome: PointOutcome) -> usize {
        self.entries.insert_full(key, outcome).0
    }

    pub fn get(&self, key: &SweepKey) -> Option<&PointOutcome> {
        self.entries.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SweepKey, &PointOutcome)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn solutions(&self) -> impl Iterator<Item = (&SweepKey, &Solution)> {
        self.entries
            .iter()
            .filter_map(|(k, outcome)| outcome.as_ref().ok().map(|s| (k, s)))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&SweepKey, &Error)> {
        self.entries
            .iter()
            .filter_map(|(k, outcome)| outcome.as_ref().err().map(|e| (k, e)))
    }

    /// Cheapest solved point.
    pub fn best(&self) -> Option<(&SweepKey, &Solution)> {
        self.solutions()
            .min_by(|a, b| a.1.total_cost().total_cmp(&b.1.total_cost()))
    }

    /// Total cost by cardinality for one variant, solved points only.
    pub fn cost_curve(&self, variant: &str) -> Vec<(Option<Cardinality>, f64)> {
        self.solutions()
            .filter(|(k, _)| k.variant == variant)
            .map(|(k, s)| (k.cardinality, s.total_cost()))
            .collect()
    }
}

/// Runs build, solve and extract for each sweep point.
pub struct SweepDriver<'a, S> {
    instance: &'a InstanceData,
    default_variant: TierVariant,
    solver: S,
    force_open: Vec<FacilityId>,
}

impl<'a, S: SolverAdapter> SweepDriver<'a, S> {
    pub fn new(instance: &'a InstanceData, default_variant: TierVariant, solver: S) -> Self {
        Self {
            instance,
            default_variant,
            solver,
            force_open: Vec::new(),
        }
    }

    /// Keep these facilities open at every point.
    pub fn force_open(mut self, facilities: Vec<FacilityId>) -> Result<Self> {
        if let Some(id) = facilities
            .iter()
            .find(|id| self.instance.facility_index(id).is_none())
        {
            return Err(Error::InvalidInstance(format!(
                "cannot force open unknown facility {id}"
            )));
        }
        self.force_open = facilities;
        Ok(self)
    }

    pub fn default_variant(&self) -> &TierVariant {
        &self.default_variant
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    /// Best achievable network cost: no cap, default tier table.
    pub fn baseline(&self) -> Result<Solution> {
        self.solve_point(&self.default_variant, None)
    }

    /// Solve a single point, returning any failure directly.
    pub fn solve_point(
        &self,
        variant: &TierVariant,
        cardinality: Option<Cardinality>,
    ) -> Result<Solution> {
        let key = SweepKey::new(variant.id(), cardinality);
        let model = self.build(variant, cardinality)?;
        self.solve_model(&model, &key)
    }

    /// Run every point of `plan`, recording per-point failures.
    pub fn run(&self, plan: &SweepPlan) -> Result<SweepResultSet> {
        self.run_with(plan, |_, _| ControlFlow::Continue(()))
    }

    /// Like [`run`](Self::run), calling `observer` after each recorded point.
    /// Returning `ControlFlow::Break` stops the sweep before the next point.
    ///
    /// Structural errors (bad plan, model that cannot be built) abort the
    /// sweep. Solver and extraction failures are recorded.
    pub fn run_with<F>(&self, plan: &SweepPlan, mut observer: F) -> Result<SweepResultSet>
    where
        F: FnMut(&SweepKey, &PointOutcome) -> ControlFlow<()>,
    {
        plan.validate()?;
        log::info!(
            "sweeping {} points over {} tier variants",
            plan.len(),
            plan.variants().len()
        );

        let mut results = SweepResultSet::default();
        for (variant, cardinality) in plan.points() {
            let key = SweepKey::new(variant.id(), cardinality);
            let model = self.build(variant, cardinality)?;
            let outcome = self.solve_model(&model, &key);

            match &outcome {
                Ok(solution) => log::info!(
                    "{key}: {} open, total cost {:.2}",
                    solution.n_open(),
                    solution.total_cost()
                ),
                Err(err) => log::warn!("{key}: {err}"),
            }

            let index = results.record(key, outcome);
            if let Some((key, outcome)) = results.entries.get_index(index) {
                if observer(key, outcome).is_break() {
                    log::info!("sweep stopped after {key}");
                    break;
                }
            }
        }
        Ok(results)
    }

    fn build<'t>(
        &'t self,
        variant: &'t TierVariant,
        cardinality: Option<Cardinality>,
    ) -> Result<ModelInstance<'t>> {
        ModelBuilder::new(self.instance, variant.table())
            .variant(variant.id())
            .cardinality(cardinality)
            .force_open(&self.force_open)
            .build()
    }

    fn solve_model(&self, model: &ModelInstance<'_>, key: &SweepKey) -> PointOutcome {
        log::debug!(
            "{key}: solving {} columns, {} rows",
            model.n_vars(),
            model.n_rows()
        );
        let result = self.solver.solve(model);
        extract(model, &result).map_err(|err| match err {
            Error::UnsolvableInstance { status, .. } => Error::UnsolvableInstance {
                status,
                key: Some(key.clone()),
            },
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{Facility, Region, ServiceCost};
    use crate::locate::solver::{SolveResult, SolveStatus};
    use crate::tier::TierId;
    use std::cell::RefCell;

    fn instance() -> InstanceData {
        InstanceData::new(
            vec![Facility::new("F1"), Facility::new("F2")],
            vec![Region::new("R1", 100.0), Region::new("R2", 50.0)],
            vec![
                ServiceCost::new("F1", "R1", 10.0),
                ServiceCost::new("F1", "R2", 20.0),
                ServiceCost::new("F2", "R1", 30.0),
                ServiceCost::new("F2", "R2", 5.0),
            ],
        )
        .unwrap()
    }

    fn flat(id: &str) -> TierVariant {
        TierVariant::new(id, TierTable::flat(1000.0, 1000.0, 1.0).unwrap())
    }

    #[derive(Debug, Clone, Copy)]
    enum Reply {
        Status(SolveStatus),
        /// Claims optimality with F1 only half open.
        HalfOpen,
    }

    /// Replies from a script and serves everything from F1 when asked for
    /// an optimal point.
    struct ScriptedSolver {
        script: RefCell<Vec<Reply>>,
        calls: RefCell<usize>,
    }

    impl ScriptedSolver {
        fn new(statuses: Vec<SolveStatus>) -> Self {
            Self::with_replies(statuses.into_iter().map(Reply::Status).collect())
        }

        fn with_replies(script: Vec<Reply>) -> Self {
            Self {
                script: RefCell::new(script),
                calls: RefCell::new(0),
            }
        }
    }

    impl SolverAdapter for ScriptedSolver {
        fn solve(&self, model: &ModelInstance<'_>) -> SolveResult {
            *self.calls.borrow_mut() += 1;
            let reply = self.script.borrow_mut().remove(0);
            let open = match reply {
                Reply::Status(SolveStatus::Optimal) => 1.0,
                Reply::Status(status) => return SolveResult::failed(status),
                Reply::HalfOpen => 0.5,
            };
            let t = TierId(0);
            let mut values = vec![0.0; model.n_vars()];
            values[model.assignment_var(0, 0).unwrap().0] = 1.0;
            values[model.assignment_var(0, 1).unwrap().0] = 1.0;
            values[model.open_var(0, t).0] = open;
            values[model.volume_var(0, t).0] = 150.0;
            let objective = model.evaluate(&values);
            SolveResult::optimal(objective, values)
        }
    }

    #[test]
    fn test_failures_are_recorded_and_sweep_continues() {
        let data = instance();
        let solver = ScriptedSolver::new(vec![
            SolveStatus::Infeasible,
            SolveStatus::Timeout,
            SolveStatus::Optimal,
        ]);
        let driver = SweepDriver::new(&data, flat("base"), &solver);
        let plan = SweepPlan::new(vec![flat("base")]).caps(0..=2);

        let results = driver.run(&plan).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(*solver.calls.borrow(), 3);

        let keys: Vec<&SweepKey> = results.iter().map(|(k, _)| k).collect();
        assert_eq!(keys[0], &SweepKey::new("base", Some(Cardinality::AtMost(0))));
        assert_eq!(keys[2], &SweepKey::new("base", Some(Cardinality::AtMost(2))));

        let zero = SweepKey::new("base", Some(Cardinality::AtMost(0)));
        match results.get(&zero) {
            Some(Err(Error::UnsolvableInstance { status, key })) => {
                assert_eq!(*status, SolveStatus::Infeasible);
                assert_eq!(key.as_ref(), Some(&zero));
            }
            other => panic!("expected unsolvable point, got {other:?}"),
        }

        let one = SweepKey::new("base", Some(Cardinality::AtMost(1)));
        let timeout = results.get(&one).unwrap().as_ref().unwrap_err();
        assert_eq!(timeout.solve_status(), Some(SolveStatus::Timeout));

        assert_eq!(results.failures().count(), 2);
        let (best_key, best) = results.best().unwrap();
        assert_eq!(best_key.cardinality, Some(Cardinality::AtMost(2)));
        assert_eq!(best.total_cost(), 20.0 + 10.0 + 1000.0 + 150.0);
        assert_eq!(
            results.cost_curve("base"),
            vec![(Some(Cardinality::AtMost(2)), 1180.0)]
        );
    }

    #[test]
    fn test_inconsistent_point_is_recorded_and_sweep_continues() {
        let data = instance();
        let solver = ScriptedSolver::with_replies(vec![
            Reply::HalfOpen,
            Reply::Status(SolveStatus::Optimal),
            Reply::Status(SolveStatus::Optimal),
        ]);
        let driver = SweepDriver::new(&data, flat("base"), &solver);
        let plan = SweepPlan::new(vec![flat("base")]).caps(1..=3);

        let results = driver.run(&plan).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(*solver.calls.borrow(), 3);

        let one = SweepKey::new("base", Some(Cardinality::AtMost(1)));
        assert!(matches!(
            results.get(&one),
            Some(Err(Error::InconsistentSolution(_)))
        ));
        assert_eq!(results.failures().count(), 1);

        let solved: Vec<_> = results.solutions().map(|(k, _)| k.cardinality).collect();
        assert_eq!(
            solved,
            vec![Some(Cardinality::AtMost(2)), Some(Cardinality::AtMost(3))]
        );
    }

    #[test]
    fn test_observer_can_stop_between_points() {
        let data = instance();
        let solver = ScriptedSolver::new(vec![SolveStatus::Optimal; 4]);
        let driver = SweepDriver::new(&data, flat("a"), &solver);
        let plan = SweepPlan::new(vec![flat("a"), flat("b")]).caps([1, 2]);

        let mut seen = Vec::new();
        let results = driver
            .run_with(&plan, |key, outcome| {
                assert!(outcome.is_ok());
                seen.push(key.clone());
                if seen.len() == 3 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(*solver.calls.borrow(), 3);
        assert_eq!(seen[2], SweepKey::new("b", Some(Cardinality::AtMost(1))));
        assert!(results
            .get(&SweepKey::new("b", Some(Cardinality::AtMost(2))))
            .is_none());
    }

    #[test]
    fn test_invalid_plans_fail_before_solving() {
        let data = instance();
        let solver = ScriptedSolver::new(Vec::new());
        let driver = SweepDriver::new(&data, flat("a"), &solver);

        let duplicate_variant = SweepPlan::new(vec![flat("a"), flat("a")]);
        assert!(matches!(
            driver.run(&duplicate_variant),
            Err(Error::InvalidInstance(_))
        ));

        let duplicate_cap = SweepPlan::new(vec![flat("a")]).caps([1, 1]);
        assert!(matches!(
            driver.run(&duplicate_cap),
            Err(Error::InvalidInstance(_))
        ));

        let empty = SweepPlan::new(Vec::new());
        assert!(matches!(driver.run(&empty), Err(Error::InvalidInstance(_))));
        assert_eq!(*solver.calls.borrow(), 0);

        let unknown = SweepDriver::new(&data, flat("a"), &solver).force_open(vec!["X".into()]);
        assert!(matches!(unknown, Err(Error::InvalidInstance(_))));
    }

    #[test]
    fn test_baseline_propagates_failure() {
        let data = instance();
        let solver = ScriptedSolver::new(vec![SolveStatus::Error]);
        let driver = SweepDriver::new(&data, flat("base"), &solver);

        let err = driver.baseline().unwrap_err();
        match err {
            Error::UnsolvableInstance { status, key } => {
                assert_eq!(status, SolveStatus::Error);
                assert_eq!(key, Some(SweepKey::new("base", None)));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_full_range_plan() {
        let data = instance();
        let tight = TierVariant::new("tight", TierTable::flat(100.0, 10.0, 1.0).unwrap());
        let plan = SweepPlan::full_range(&data, vec![tight]);
        assert_eq!(plan.len(), 1);
        let points: Vec<_> = plan.points().map(|(v, c)| (v.id().to_string(), c)).collect();
        assert_eq!(points, vec![("tight".to_string(), Some(Cardinality::AtMost(2)))]);

        let plan = SweepPlan::full_range(&data, vec![flat("a"), flat("b")]);
        assert_eq!(plan.len(), 4);
    }
}
