use serde::Serialize;
use thiserror::Error;

use crate::simulation::{AccessGrid, SimulationOutput};
use crate::types::Month;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("{names} bucket names given for an access grid with {buckets} buckets")]
    ShapeMismatch { names: usize, buckets: usize },
}

/// Per-trajectory access counts for one bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketUsage {
    pub name: String,
    /// `counts[t]` = months of trajectory `t` in which this bucket or a deeper
    /// one was reached.
    pub counts: Vec<u32>,
}

/// Cumulative access counts for every bucket, in priority order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageStatistics {
    pub buckets: Vec<BucketUsage>,
}

impl UsageStatistics {
    pub fn get(&self, name: &str) -> Option<&[u32]> {
        self.buckets.iter().find(|b| b.name == name).map(|b| b.counts.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u32])> {
        self.buckets.iter().map(|b| (b.name.as_str(), b.counts.as_slice()))
    }

    pub fn n_trajectories(&self) -> usize {
        self.buckets.first().map_or(0, |b| b.counts.len())
    }
}

/// Count, per bucket and trajectory, the months in which that bucket or any
/// deeper bucket was accessed. A withdrawal only reaches bucket `b` after
/// passing through `0..b`, so counts never increase with depth.
pub fn usage_statistics(
    access: &AccessGrid,
    names: &[String],
) -> Result<UsageStatistics, AnalysisError> {
    if names.len() != access.n_buckets() {
        return Err(AnalysisError::ShapeMismatch {
            names: names.len(),
            buckets: access.n_buckets(),
        });
    }
    let n_trajectories = access.n_trajectories();
    let mut counts = vec![vec![0u32; n_trajectories]; names.len()];

    for t in 0..n_trajectories {
        for m in 0..access.n_months() {
            if let Some(deepest) = access.deepest(m, t) {
                for bucket in counts.iter_mut().take(deepest.0 + 1) {
                    bucket[t] += 1;
                }
            }
        }
    }

    let buckets = names
        .iter()
        .cloned()
        .zip(counts)
        .map(|(name, counts)| BucketUsage { name, counts })
        .collect();
    Ok(UsageStatistics { buckets })
}

/// Distribution statistics for a metric across trajectories.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistStats {
    pub n: usize,
    pub min: f64,
    pub p5: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl DistStats {
    /// Linear-interpolated percentile, `p` in [0, 1], over sorted `values`.
    fn interp(values: &[f64], p: f64) -> f64 {
        let n = values.len();
        let h = p * (n - 1) as f64;
        let lo = h.floor() as usize;
        let hi = (lo + 1).min(n - 1);
        let frac = h - lo as f64;
        values[lo] * (1.0 - frac) + values[hi] * frac
    }
}

/// Sorts `values` in place. `None` when empty.
pub fn percentile_stats(values: &mut [f64]) -> Option<DistStats> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let n = values.len();

    let mean = values.iter().sum::<f64>() / n as f64;
    let variance = if n > 1 {
        values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64
    } else {
        0.0
    };

    Some(DistStats {
        n,
        min: values[0],
        p5: DistStats::interp(values, 0.05),
        p25: DistStats::interp(values, 0.25),
        p50: DistStats::interp(values, 0.50),
        p75: DistStats::interp(values, 0.75),
        p95: DistStats::interp(values, 0.95),
        max: values[n - 1],
        mean,
        std_dev: variance.sqrt(),
    })
}

/// Cross-trajectory summary of one bucket's access counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketUsageDist {
    pub name: String,
    pub months_reached: DistStats,
    /// Share of trajectories that reached the bucket at least once.
    pub reach_probability: f64,
}

/// Summarise every bucket's counts. Empty when there are no trajectories.
pub fn usage_distributions(usage: &UsageStatistics) -> Vec<BucketUsageDist> {
    usage
        .buckets
        .iter()
        .filter_map(|b| {
            let mut values: Vec<f64> = b.counts.iter().map(|&c| c as f64).collect();
            let months_reached = percentile_stats(&mut values)?;
            let reached = b.counts.iter().filter(|&&c| c > 0).count();
            Some(BucketUsageDist {
                name: b.name.clone(),
                months_reached,
                reach_probability: reached as f64 / b.counts.len() as f64,
            })
        })
        .collect()
}

/// Cross-trajectory balance distributions at one month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthBalanceDist {
    pub month: Month,
    /// One entry per bucket, in priority order.
    pub buckets: Vec<DistStats>,
    pub total: DistStats,
}

/// Balance distributions for every month of a batch. Empty when the batch has
/// no trajectories.
pub fn balance_distributions(output: &SimulationOutput) -> Vec<MonthBalanceDist> {
    let n_buckets = output.names.len();
    let mut result = Vec::with_capacity(output.snapshots.n_months());

    for m in 0..output.snapshots.n_months() {
        let Some(snapshots) = output.snapshots.month(m) else {
            break;
        };
        let mut totals: Vec<f64> = snapshots.iter().map(|s| s.total()).collect();
        let Some(total) = percentile_stats(&mut totals) else {
            break;
        };
        let buckets = (0..n_buckets)
            .filter_map(|b| {
                let mut values: Vec<f64> = snapshots.iter().map(|s| s.balances[b]).collect();
                percentile_stats(&mut values)
            })
            .collect();
        result.push(MonthBalanceDist { month: Month(m as u32), buckets, total });
    }

    result
}
