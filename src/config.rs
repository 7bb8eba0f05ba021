use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bucket::Bucket;
use crate::portfolio::{Portfolio, PortfolioError};
use crate::shocks::{CountModel, MagnitudeModel, ShockError, UnforeseenEventModel};
use crate::simulation::{Simulation, SimulationError, SimulationParams};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {}: {source}", path.display())]
    Io { path: PathBuf, source: std::io::Error },
    #[error("parsing config: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Portfolio(#[from] PortfolioError),
    #[error(transparent)]
    Shock(#[from] ShockError),
    #[error(transparent)]
    Simulation(#[from] SimulationError),
}

/// One liquidity tier. `balance` is the funds it holds before starting
/// capital is deposited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BucketConfig {
    Unbounded {
        name: String,
        min_reserve: f64,
        #[serde(default)]
        balance: f64,
    },
    Bounded {
        name: String,
        min_reserve: f64,
        capacity: f64,
        #[serde(default)]
        balance: f64,
    },
    Transactional {
        name: String,
        min_reserve: f64,
        min_transaction: f64,
        capacity: f64,
        #[serde(default)]
        balance: f64,
    },
}

impl BucketConfig {
    pub fn build(&self) -> Bucket {
        match self {
            BucketConfig::Unbounded { name, min_reserve, balance } => {
                Bucket::unbounded(name.as_str(), *min_reserve).with_balance(*balance)
            }
            BucketConfig::Bounded { name, min_reserve, capacity, balance } => {
                Bucket::bounded(name.as_str(), *min_reserve, *capacity).with_balance(*balance)
            }
            BucketConfig::Transactional { name, min_reserve, min_transaction, capacity, balance } => {
                Bucket::transactional(name.as_str(), *min_reserve, *min_transaction, *capacity)
                    .with_balance(*balance)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CountConfig {
    Never,
    Poisson { mean: f64 },
    Binomial { trials: u64, p: f64 },
}

impl CountConfig {
    fn build(&self) -> Result<CountModel, ShockError> {
        match self {
            CountConfig::Never => Ok(CountModel::Never),
            CountConfig::Poisson { mean } => CountModel::poisson(*mean),
            CountConfig::Binomial { trials, p } => CountModel::binomial(*trials, *p),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MagnitudeConfig {
    Constant { value: f64 },
    Gamma { shape: f64, scale: f64 },
    LogNormal { mu: f64, sigma: f64 },
    Pareto { scale: f64, shape: f64 },
}

impl MagnitudeConfig {
    fn build(&self) -> Result<MagnitudeModel, ShockError> {
        match self {
            MagnitudeConfig::Constant { value } => MagnitudeModel::constant(*value),
            MagnitudeConfig::Gamma { shape, scale } => MagnitudeModel::gamma(*shape, *scale),
            MagnitudeConfig::LogNormal { mu, sigma } => MagnitudeModel::log_normal(*mu, *sigma),
            MagnitudeConfig::Pareto { scale, shape } => MagnitudeModel::pareto(*scale, *shape),
        }
    }
}

/// A shock category, either by its moments (Poisson counts, Gamma costs) or
/// by an explicit count/magnitude pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShockConfig {
    Moments {
        name: String,
        mean_frequency: f64,
        mean_value: f64,
        std_value: f64,
    },
    Explicit {
        name: String,
        count: CountConfig,
        magnitude: MagnitudeConfig,
    },
}

impl ShockConfig {
    pub fn name(&self) -> &str {
        match self {
            ShockConfig::Moments { name, .. } | ShockConfig::Explicit { name, .. } => name,
        }
    }

    pub fn build(&self) -> Result<UnforeseenEventModel, ShockError> {
        match self {
            ShockConfig::Moments { name, mean_frequency, mean_value, std_value } => {
                UnforeseenEventModel::from_moments(name.as_str(), *mean_frequency, *mean_value, *std_value)
            }
            ShockConfig::Explicit { name, count, magnitude } => Ok(UnforeseenEventModel::new(
                name.as_str(),
                count.build()?,
                magnitude.build()?,
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Priority order: index 0 is drawn first.
    pub buckets: Vec<BucketConfig>,
    #[serde(default)]
    pub shocks: Vec<ShockConfig>,
    pub params: SimulationParams,
}

impl SimulationConfig {
    pub fn canonical() -> Self {
        // ── Buckets ───────────────────────────────────────────────────────────
        // Cash first, then an emergency fund, a bond ladder traded in 1k lots,
        // and an equity sink for everything else.
        let buckets = vec![
            BucketConfig::Bounded {
                name: "Liquidity".to_string(),
                min_reserve: 2_500.0,
                capacity: 2_500.0,
                balance: 0.0,
            },
            BucketConfig::Unbounded { name: "Savings".to_string(), min_reserve: 1_000.0, balance: 0.0 },
            BucketConfig::Transactional {
                name: "Bonds".to_string(),
                min_reserve: 4_000.0,
                min_transaction: 1_000.0,
                capacity: 5_000.0,
                balance: 0.0,
            },
            BucketConfig::Unbounded { name: "ETF".to_string(), min_reserve: 0.0, balance: 0.0 },
        ];

        // ── Shocks ────────────────────────────────────────────────────────────
        // Mean events per month; costs by mean and standard deviation.
        let shocks = vec![
            ShockConfig::Moments {
                name: "medical".to_string(),
                mean_frequency: 0.05,
                mean_value: 4_000.0,
                std_value: 3_000.0,
            },
            ShockConfig::Moments {
                name: "car".to_string(),
                mean_frequency: 0.1,
                mean_value: 1_500.0,
                std_value: 1_000.0,
            },
            ShockConfig::Moments {
                name: "home".to_string(),
                mean_frequency: 0.04,
                mean_value: 5_000.0,
                std_value: 4_000.0,
            },
        ];

        SimulationConfig {
            buckets,
            shocks,
            params: SimulationParams {
                starting_capital: 3_100.0,
                salary: 3_000.0,
                fixed_expenses: 2_200.0,
                n_trajectories: 1_000,
                n_months: 120,
                seed: 42,
            },
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_json_str(&json)
    }

    pub fn build_portfolio(&self) -> Result<Portfolio, ConfigError> {
        Ok(Portfolio::new(self.buckets.iter().map(BucketConfig::build).collect())?)
    }

    pub fn build_models(&self) -> Result<Vec<UnforeseenEventModel>, ConfigError> {
        Ok(self.shocks.iter().map(ShockConfig::build).collect::<Result<_, _>>()?)
    }

    /// Portfolio, models and validated params, ready to run.
    pub fn build_simulation(&self) -> Result<Simulation, ConfigError> {
        self.params.validate()?;
        Ok(Simulation::new(self.build_portfolio()?, self.params.clone(), self.build_models()?))
    }
}
