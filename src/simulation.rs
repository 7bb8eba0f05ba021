use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::portfolio::{Portfolio, PortfolioError, Snapshot};
use crate::shocks::{self, UnforeseenEventModel};
use crate::types::{BucketIndex, Month, TrajectoryId};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error("trajectory {trajectory}: starting capital could not be placed: {source}")]
    StartingCapital { trajectory: TrajectoryId, source: PortfolioError },
    #[error("trajectory {trajectory} failed in month {month}: {source}")]
    Trajectory { trajectory: TrajectoryId, month: Month, source: PortfolioError },
    #[error("{param} must be finite and >= 0, got {value}")]
    InvalidParams { param: &'static str, value: f64 },
    #[error("trajectory {trajectory}: expected {expected} {what}, got {actual}")]
    ShapeMismatch { trajectory: TrajectoryId, what: &'static str, expected: usize, actual: usize },
}

/// Cash flows and batch shape for one Monte Carlo run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationParams {
    pub starting_capital: f64,
    /// Deposited at the start of every month.
    pub salary: f64,
    /// Withdrawn every month on top of the sampled shocks.
    pub fixed_expenses: f64,
    pub n_trajectories: u64,
    pub n_months: u32,
    pub seed: u64,
}

impl SimulationParams {
    pub fn validate(&self) -> Result<(), SimulationError> {
        for (param, value) in [
            ("starting_capital", self.starting_capital),
            ("salary", self.salary),
            ("fixed_expenses", self.fixed_expenses),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(SimulationError::InvalidParams { param, value });
            }
        }
        Ok(())
    }
}

/// One simulated future: a snapshot and the deepest bucket touched, per month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trajectory {
    pub id: TrajectoryId,
    pub snapshots: Vec<Snapshot>,
    /// `None` only for months whose total expense was zero.
    pub accessed: Vec<Option<BucketIndex>>,
}

/// Month × trajectory grid of portfolio snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotGrid {
    n_months: usize,
    n_trajectories: usize,
    cells: Vec<Snapshot>,
}

impl SnapshotGrid {
    pub fn n_months(&self) -> usize {
        self.n_months
    }

    pub fn n_trajectories(&self) -> usize {
        self.n_trajectories
    }

    /// `trajectory` is the column position, not the `TrajectoryId`.
    pub fn get(&self, month: usize, trajectory: usize) -> Option<&Snapshot> {
        if month >= self.n_months || trajectory >= self.n_trajectories {
            return None;
        }
        self.cells.get(month * self.n_trajectories + trajectory)
    }

    /// All trajectories' snapshots for one month.
    pub fn month(&self, month: usize) -> Option<&[Snapshot]> {
        if month >= self.n_months {
            return None;
        }
        let start = month * self.n_trajectories;
        self.cells.get(start..start + self.n_trajectories)
    }
}

/// Month × trajectory × bucket record of which bucket absorbed each month's
/// withdrawal. At most one cell per (month, trajectory) is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessGrid {
    n_months: usize,
    n_trajectories: usize,
    n_buckets: usize,
    cells: Vec<bool>,
}

impl AccessGrid {
    pub fn new(n_months: usize, n_trajectories: usize, n_buckets: usize) -> Self {
        AccessGrid {
            n_months,
            n_trajectories,
            n_buckets,
            cells: vec![false; n_months * n_trajectories * n_buckets],
        }
    }

    pub fn n_months(&self) -> usize {
        self.n_months
    }

    pub fn n_trajectories(&self) -> usize {
        self.n_trajectories
    }

    pub fn n_buckets(&self) -> usize {
        self.n_buckets
    }

    fn offset(&self, month: usize, trajectory: usize, bucket: usize) -> Option<usize> {
        (month < self.n_months && trajectory < self.n_trajectories && bucket < self.n_buckets)
            .then(|| (month * self.n_trajectories + trajectory) * self.n_buckets + bucket)
    }

    pub fn get(&self, month: usize, trajectory: usize, bucket: usize) -> bool {
        self.offset(month, trajectory, bucket).is_some_and(|i| self.cells[i])
    }

    /// Mark `bucket` as the one reached in (month, trajectory). Out-of-range
    /// positions are ignored.
    pub fn set(&mut self, month: usize, trajectory: usize, bucket: usize) {
        if let Some(i) = self.offset(month, trajectory, bucket) {
            self.cells[i] = true;
        }
    }

    /// Deepest bucket marked in (month, trajectory).
    pub fn deepest(&self, month: usize, trajectory: usize) -> Option<BucketIndex> {
        (0..self.n_buckets).rev().find(|&b| self.get(month, trajectory, b)).map(BucketIndex)
    }
}

/// Output of a batch: snapshot and access grids plus the bucket names and the
/// id of the trajectory in each column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationOutput {
    pub names: Vec<String>,
    pub trajectory_ids: Vec<TrajectoryId>,
    pub snapshots: SnapshotGrid,
    pub access: AccessGrid,
}

impl SimulationOutput {
    /// Lay completed trajectories out as grid columns, in the order given.
    /// Every trajectory must cover `n_months` months with one balance per name.
    pub fn from_trajectories(
        names: Vec<String>,
        n_months: usize,
        trajectories: Vec<Trajectory>,
    ) -> Result<Self, SimulationError> {
        let n_trajectories = trajectories.len();
        let n_buckets = names.len();
        for t in &trajectories {
            check_shape(t, n_months, n_buckets)?;
        }
        let mut access = AccessGrid::new(n_months, n_trajectories, n_buckets);
        let mut trajectory_ids = Vec::with_capacity(n_trajectories);
        let mut columns = Vec::with_capacity(n_trajectories);

        for (col, t) in trajectories.into_iter().enumerate() {
            for (month, accessed) in t.accessed.iter().enumerate() {
                if let Some(BucketIndex(b)) = accessed {
                    access.set(month, col, *b);
                }
            }
            trajectory_ids.push(t.id);
            columns.push(t.snapshots.into_iter());
        }

        let mut cells = Vec::with_capacity(n_months * n_trajectories);
        for _ in 0..n_months {
            for column in columns.iter_mut() {
                if let Some(s) = column.next() {
                    cells.push(s);
                }
            }
        }

        Ok(SimulationOutput {
            names,
            trajectory_ids,
            snapshots: SnapshotGrid { n_months, n_trajectories, cells },
            access,
        })
    }
}

fn check_shape(t: &Trajectory, n_months: usize, n_buckets: usize) -> Result<(), SimulationError> {
    let mismatch = |what, expected, actual| SimulationError::ShapeMismatch {
        trajectory: t.id,
        what,
        expected,
        actual,
    };
    if t.snapshots.len() != n_months {
        return Err(mismatch("snapshots", n_months, t.snapshots.len()));
    }
    if t.accessed.len() != n_months {
        return Err(mismatch("access records", n_months, t.accessed.len()));
    }
    if let Some(bad) = t.snapshots.iter().find(|s| s.balances.len() != n_buckets) {
        return Err(mismatch("bucket balances", n_buckets, bad.balances.len()));
    }
    Ok(())
}

/// A base portfolio, its cash flows and shock categories, ready to run.
#[derive(Debug, Clone)]
pub struct Simulation {
    pub portfolio: Portfolio,
    pub params: SimulationParams,
    pub models: Vec<UnforeseenEventModel>,
}

impl Simulation {
    pub fn new(
        portfolio: Portfolio,
        params: SimulationParams,
        models: Vec<UnforeseenEventModel>,
    ) -> Self {
        Simulation { portfolio, params, models }
    }

    /// Override the base seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.params.seed = seed;
        self
    }

    /// Run every trajectory in parallel. The first failure aborts the batch.
    pub fn run(&self) -> Result<SimulationOutput, SimulationError> {
        self.params.validate()?;
        info!(
            trajectories = self.params.n_trajectories,
            months = self.params.n_months,
            buckets = self.portfolio.len(),
            shocks = self.models.len(),
            "simulation started"
        );
        let trajectories = (0..self.params.n_trajectories)
            .into_par_iter()
            .map(|i| self.run_trajectory(TrajectoryId(i)))
            .collect::<Result<Vec<_>, _>>()?;
        info!(trajectories = trajectories.len(), "simulation complete");
        SimulationOutput::from_trajectories(
            self.portfolio.names(),
            self.params.n_months as usize,
            trajectories,
        )
    }

    /// Run every trajectory in parallel and hand back each result, so the
    /// caller can decide what to do with failed runs.
    pub fn run_trajectories(&self) -> Result<Vec<Result<Trajectory, SimulationError>>, SimulationError> {
        self.params.validate()?;
        let results: Vec<_> = (0..self.params.n_trajectories)
            .into_par_iter()
            .map(|i| self.run_trajectory(TrajectoryId(i)))
            .collect();
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            warn!(error = %err, "trajectory failed");
        }
        Ok(results)
    }

    /// Run one trajectory on its own copy of the portfolio and its own
    /// generator, seeded `seed + id`.
    pub fn run_trajectory(&self, id: TrajectoryId) -> Result<Trajectory, SimulationError> {
        let mut rng = ChaCha20Rng::seed_from_u64(id.seed(self.params.seed));
        let mut portfolio = self.portfolio.clone();
        let months = self.params.n_months as usize;
        let mut snapshots = Vec::with_capacity(months);
        let mut accessed = Vec::with_capacity(months);

        if self.params.starting_capital > 0.0 {
            portfolio
                .deposit(self.params.starting_capital)
                .map_err(|source| SimulationError::StartingCapital { trajectory: id, source })?;
        }

        for month in (0..self.params.n_months).map(Month) {
            let deepest = self
                .step(&mut portfolio, &mut rng)
                .map_err(|source| SimulationError::Trajectory { trajectory: id, month, source })?;
            accessed.push(deepest);
            snapshots.push(portfolio.snapshot());
        }

        debug!(trajectory = %id, final_total = portfolio.total(), "trajectory complete");
        Ok(Trajectory { id, snapshots, accessed })
    }

    /// One month: salary in, fixed expenses plus shocks out.
    fn step(
        &self,
        portfolio: &mut Portfolio,
        rng: &mut ChaCha20Rng,
    ) -> Result<Option<BucketIndex>, PortfolioError> {
        if self.params.salary > 0.0 {
            portfolio.deposit(self.params.salary)?;
        }
        let expense = self.params.fixed_expenses + shocks::sample_all(&self.models, rng);
        if expense > 0.0 { portfolio.withdraw(expense).map(Some) } else { Ok(None) }
    }
}

/// Run a full batch over `portfolio`. See [`Simulation::run`].
pub fn run_simulation(
    portfolio: &Portfolio,
    params: &SimulationParams,
    models: &[UnforeseenEventModel],
) -> Result<SimulationOutput, SimulationError> {
    Simulation::new(portfolio.clone(), params.clone(), models.to_vec()).run()
}

/// Every trajectory's own result. See [`Simulation::run_trajectories`].
pub fn run_trajectories(
    portfolio: &Portfolio,
    params: &SimulationParams,
    models: &[UnforeseenEventModel],
) -> Result<Vec<Result<Trajectory, SimulationError>>, SimulationError> {
    Simulation::new(portfolio.clone(), params.clone(), models.to_vec()).run_trajectories()
}

/// Replay a single trajectory of a batch.
pub fn run_trajectory(
    portfolio: &Portfolio,
    params: &SimulationParams,
    models: &[UnforeseenEventModel],
    trajectory: TrajectoryId,
) -> Result<Trajectory, SimulationError> {
    params.validate()?;
    Simulation::new(portfolio.clone(), params.clone(), models.to_vec()).run_trajectory(trajectory)
}
