use rand::Rng;
use rand_distr::{Binomial, Distribution, Gamma, LogNormal, Pareto, Poisson};
use serde::Serialize;
use thiserror::Error;

use crate::types::Month;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ShockError {
    #[error("{model}: {param} must be finite and >= 0, got {value}")]
    InvalidParameter { model: String, param: &'static str, value: f64 },
    #[error("{model}: invalid {distribution} parameters: {detail}")]
    Distribution { model: String, distribution: &'static str, detail: String },
}

/// How many shock events land in one month.
#[derive(Debug, Clone)]
pub enum CountModel {
    /// No events ever (zero-frequency category).
    Never,
    /// Poisson(mean) events per month.
    Poisson { mean: f64, dist: Poisson<f64> },
    /// At most `trials` events, each happening with probability `p`.
    Binomial { trials: u64, p: f64, dist: Binomial },
}

impl CountModel {
    /// Poisson counts; a zero mean yields `Never` since Poisson(0) is not a
    /// valid distribution.
    pub fn poisson(mean: f64) -> Result<Self, ShockError> {
        check_non_negative("count", "mean_frequency", mean)?;
        if mean == 0.0 {
            return Ok(CountModel::Never);
        }
        let dist = Poisson::new(mean).map_err(|e| ShockError::Distribution {
            model: "count".to_string(),
            distribution: "Poisson",
            detail: e.to_string(),
        })?;
        Ok(CountModel::Poisson { mean, dist })
    }

    pub fn binomial(trials: u64, p: f64) -> Result<Self, ShockError> {
        let dist = Binomial::new(trials, p).map_err(|e| ShockError::Distribution {
            model: "count".to_string(),
            distribution: "Binomial",
            detail: e.to_string(),
        })?;
        Ok(CountModel::Binomial { trials, p, dist })
    }

    pub fn sample(&self, rng: &mut impl Rng) -> u64 {
        match self {
            CountModel::Never => 0,
            CountModel::Poisson { dist, .. } => {
                let n: f64 = dist.sample(rng);
                n as u64
            }
            CountModel::Binomial { dist, .. } => dist.sample(rng),
        }
    }

    pub fn mean(&self) -> f64 {
        match self {
            CountModel::Never => 0.0,
            CountModel::Poisson { mean, .. } => *mean,
            CountModel::Binomial { trials, p, .. } => *trials as f64 * p,
        }
    }
}

/// Cost of a single shock event.
#[derive(Debug, Clone)]
pub enum MagnitudeModel {
    Constant(f64),
    /// E[X] = shape * scale.
    Gamma { shape: f64, scale: f64, dist: Gamma<f64> },
    /// ln-space params. E[X] = exp(mu + sigma²/2).
    LogNormal { mu: f64, sigma: f64, dist: LogNormal<f64> },
    /// `scale` = minimum cost, `shape` = tail index α.
    /// E[X] = scale * shape / (shape − 1)  (infinite for shape ≤ 1).
    Pareto { scale: f64, shape: f64, dist: Pareto<f64> },
}

impl MagnitudeModel {
    pub fn constant(value: f64) -> Result<Self, ShockError> {
        check_non_negative("magnitude", "value", value)?;
        Ok(MagnitudeModel::Constant(value))
    }

    pub fn gamma(shape: f64, scale: f64) -> Result<Self, ShockError> {
        let dist = Gamma::new(shape, scale).map_err(|e| ShockError::Distribution {
            model: "magnitude".to_string(),
            distribution: "Gamma",
            detail: e.to_string(),
        })?;
        Ok(MagnitudeModel::Gamma { shape, scale, dist })
    }

    /// Gamma with the given mean and standard deviation:
    /// shape = mean²/std², scale = std²/mean. Degenerates to a constant when
    /// either moment is zero.
    pub fn gamma_from_moments(mean: f64, std: f64) -> Result<Self, ShockError> {
        check_non_negative("magnitude", "mean_value", mean)?;
        check_non_negative("magnitude", "std_value", std)?;
        if mean == 0.0 {
            return Ok(MagnitudeModel::Constant(0.0));
        }
        if std == 0.0 {
            return Ok(MagnitudeModel::Constant(mean));
        }
        let variance = std * std;
        Self::gamma(mean * mean / variance, variance / mean)
    }

    pub fn log_normal(mu: f64, sigma: f64) -> Result<Self, ShockError> {
        let dist = LogNormal::new(mu, sigma).map_err(|e| ShockError::Distribution {
            model: "magnitude".to_string(),
            distribution: "LogNormal",
            detail: e.to_string(),
        })?;
        Ok(MagnitudeModel::LogNormal { mu, sigma, dist })
    }

    pub fn pareto(scale: f64, shape: f64) -> Result<Self, ShockError> {
        let dist = Pareto::new(scale, shape).map_err(|e| ShockError::Distribution {
            model: "magnitude".to_string(),
            distribution: "Pareto",
            detail: e.to_string(),
        })?;
        Ok(MagnitudeModel::Pareto { scale, shape, dist })
    }

    pub fn sample(&self, rng: &mut impl Rng) -> f64 {
        match self {
            MagnitudeModel::Constant(v) => *v,
            MagnitudeModel::Gamma { dist, .. } => dist.sample(rng),
            MagnitudeModel::LogNormal { dist, .. } => dist.sample(rng),
            MagnitudeModel::Pareto { dist, .. } => dist.sample(rng),
        }
    }

    pub fn mean(&self) -> f64 {
        match self {
            MagnitudeModel::Constant(v) => *v,
            MagnitudeModel::Gamma { shape, scale, .. } => shape * scale,
            MagnitudeModel::LogNormal { mu, sigma, .. } => (mu + sigma * sigma / 2.0).exp(),
            MagnitudeModel::Pareto { scale, shape, .. } => {
                if *shape > 1.0 {
                    scale * shape / (shape - 1.0)
                } else {
                    f64::INFINITY
                }
            }
        }
    }
}

/// One category of unforeseen expense (e.g. "medical"): a random number of
/// events per month, each with an independent random cost.
#[derive(Debug, Clone)]
pub struct UnforeseenEventModel {
    pub name: String,
    pub count: CountModel,
    pub magnitude: MagnitudeModel,
}

impl UnforeseenEventModel {
    pub fn new(name: impl Into<String>, count: CountModel, magnitude: MagnitudeModel) -> Self {
        UnforeseenEventModel { name: name.into(), count, magnitude }
    }

    /// Poisson(`mean_frequency`) events per month, Gamma costs with the given
    /// mean and standard deviation.
    pub fn from_moments(
        name: impl Into<String>,
        mean_frequency: f64,
        mean_value: f64,
        std_value: f64,
    ) -> Result<Self, ShockError> {
        let name = name.into();
        let tag = |e: ShockError| match e {
            ShockError::InvalidParameter { param, value, .. } => {
                ShockError::InvalidParameter { model: name.clone(), param, value }
            }
            ShockError::Distribution { distribution, detail, .. } => {
                ShockError::Distribution { model: name.clone(), distribution, detail }
            }
        };
        let count = CountModel::poisson(mean_frequency).map_err(tag)?;
        let magnitude = MagnitudeModel::gamma_from_moments(mean_value, std_value).map_err(tag)?;
        Ok(UnforeseenEventModel { name, count, magnitude })
    }

    /// Event count and total cost for one month.
    pub fn sample_events(&self, rng: &mut impl Rng) -> (u64, f64) {
        let n = self.count.sample(rng);
        let cost = (0..n).map(|_| self.magnitude.sample(rng)).sum();
        (n, cost)
    }

    /// Total cost for one month; zero when no event occurs.
    pub fn sample(&self, rng: &mut impl Rng) -> f64 {
        self.sample_events(rng).1
    }

    /// Long-run mean monthly cost.
    pub fn expected_cost(&self) -> f64 {
        let events = self.count.mean();
        if events == 0.0 { 0.0 } else { events * self.magnitude.mean() }
    }
}

/// Sum of one independent draw from every model.
pub fn sample_all(models: &[UnforeseenEventModel], rng: &mut impl Rng) -> f64 {
    models.iter().map(|m| m.sample(rng)).sum()
}

/// One category's outcome in one month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShockDraw {
    pub month: Month,
    pub category: String,
    pub events: u64,
    pub cost: f64,
}

/// Draw `months` months of shocks for every model. Months with no events are
/// omitted.
pub fn draw_catalog(
    models: &[UnforeseenEventModel],
    months: u32,
    rng: &mut impl Rng,
) -> Vec<ShockDraw> {
    let mut out = Vec::new();
    for month in (0..months).map(Month) {
        for model in models {
            let (events, cost) = model.sample_events(rng);
            if events > 0 {
                out.push(ShockDraw { month, category: model.name.clone(), events, cost });
            }
        }
    }
    out
}

fn check_non_negative(model: &str, param: &'static str, value: f64) -> Result<(), ShockError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ShockError::InvalidParameter { model: model.to_string(), param, value })
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    fn rng() -> ChaCha20Rng {
        ChaCha20Rng::seed_from_u64(42)
    }

    fn mean_of(n: usize, mut f: impl FnMut() -> f64) -> f64 {
        (0..n).map(|_| f()).sum::<f64>() / n as f64
    }

    /// Gamma(mean=2_000, std=1_500): 20k samples must land within ±5 % of the mean.
    #[test]
    fn gamma_from_moments_matches_mean() {
        let model = MagnitudeModel::gamma_from_moments(2_000.0, 1_500.0).expect("valid");
        let mut rng = rng();
        let mean = mean_of(20_000, || model.sample(&mut rng));
        assert!((mean - 2_000.0).abs() < 100.0, "Gamma mean {mean:.1} outside 2_000 ± 100");
    }

    #[test]
    fn gamma_from_moments_parameterisation() {
        match MagnitudeModel::gamma_from_moments(1_000.0, 500.0).expect("valid") {
            MagnitudeModel::Gamma { shape, scale, .. } => {
                assert!((shape - 4.0).abs() < 1e-12);
                assert!((scale - 250.0).abs() < 1e-12);
            }
            other => panic!("expected Gamma, got {other:?}"),
        }
    }

    #[test]
    fn degenerate_moments_become_constants() {
        assert!(matches!(
            MagnitudeModel::gamma_from_moments(0.0, 10.0),
            Ok(MagnitudeModel::Constant(v)) if v == 0.0
        ));
        assert!(matches!(
            MagnitudeModel::gamma_from_moments(300.0, 0.0),
            Ok(MagnitudeModel::Constant(v)) if v == 300.0
        ));
    }

    #[test]
    fn negative_parameters_rejected_with_category_name() {
        let err = UnforeseenEventModel::from_moments("medical", -1.0, 100.0, 10.0).unwrap_err();
        assert_eq!(
            err,
            ShockError::InvalidParameter {
                model: "medical".to_string(),
                param: "mean_frequency",
                value: -1.0
            }
        );
        assert!(UnforeseenEventModel::from_moments("car", 0.1, f64::NAN, 1.0).is_err());
        assert!(CountModel::binomial(3, 1.5).is_err());
    }

    #[test]
    fn zero_frequency_never_costs_anything() {
        let model = UnforeseenEventModel::from_moments("none", 0.0, 5_000.0, 1_000.0).expect("valid");
        assert!(matches!(model.count, CountModel::Never));
        let mut rng = rng();
        assert!((0..1_000).all(|_| model.sample(&mut rng) == 0.0));
        assert_eq!(model.expected_cost(), 0.0);
    }

    /// With λ=2.0 over 5_000 months the mean monthly event count must lie in [1.9, 2.1].
    #[test]
    fn poisson_count_is_reasonable() {
        let count = CountModel::poisson(2.0).expect("valid");
        let mut rng = rng();
        let mean = mean_of(5_000, || count.sample(&mut rng) as f64);
        assert!((1.9..=2.1).contains(&mean), "mean monthly count {mean:.3} outside [1.9, 2.1]");
    }

    #[test]
    fn binomial_count_never_exceeds_trials() {
        let count = CountModel::binomial(2, 0.5).expect("valid");
        let mut rng = rng();
        assert!((0..1_000).all(|_| count.sample(&mut rng) <= 2));
        assert_eq!(count.mean(), 1.0);
    }

    /// Compound mean = λ · E[X]; 0.5 events × 800 = 400 per month.
    #[test]
    fn compound_cost_mean_matches_expected_cost() {
        let model = UnforeseenEventModel::from_moments("car", 0.5, 800.0, 400.0).expect("valid");
        assert!((model.expected_cost() - 400.0).abs() < 1e-9);
        let mut rng = rng();
        let mean = mean_of(40_000, || model.sample(&mut rng));
        assert!((mean - 400.0).abs() < 20.0, "compound mean {mean:.1} outside 400 ± 20");
    }

    #[test]
    fn constant_magnitude_cost_is_count_times_value() {
        let model = UnforeseenEventModel::new(
            "fee",
            CountModel::binomial(3, 1.0).expect("valid"),
            MagnitudeModel::constant(25.0).expect("valid"),
        );
        assert_eq!(model.sample(&mut rng()), 75.0);
    }

    /// Pareto(scale, 1.5) has a heavier right tail than a LogNormal with the
    /// same median. Compare 99th percentiles from 10k samples each.
    #[test]
    fn pareto_tail_heavier_than_lognormal() {
        let pareto = MagnitudeModel::pareto(1_000.0, 1.5).expect("valid");
        let lognorm = MagnitudeModel::log_normal((1_000.0_f64 * 2f64.powf(1.0 / 1.5)).ln(), 0.5)
            .expect("valid");
        let mut rng = rng();
        let n = 10_000usize;
        let mut p: Vec<f64> = (0..n).map(|_| pareto.sample(&mut rng)).collect();
        let mut l: Vec<f64> = (0..n).map(|_| lognorm.sample(&mut rng)).collect();
        p.sort_by(f64::total_cmp);
        l.sort_by(f64::total_cmp);
        assert!(p[n * 99 / 100] > l[n * 99 / 100]);
    }

    #[test]
    fn sample_all_sums_independent_draws() {
        let models = vec![
            UnforeseenEventModel::new(
                "a",
                CountModel::binomial(1, 1.0).expect("valid"),
                MagnitudeModel::constant(10.0).expect("valid"),
            ),
            UnforeseenEventModel::new(
                "b",
                CountModel::binomial(2, 1.0).expect("valid"),
                MagnitudeModel::constant(5.0).expect("valid"),
            ),
        ];
        assert_eq!(sample_all(&models, &mut rng()), 20.0);
        assert_eq!(sample_all(&[], &mut rng()), 0.0);
    }

    #[test]
    fn catalog_only_lists_months_with_events() {
        let models = vec![
            UnforeseenEventModel::from_moments("medical", 0.3, 1_000.0, 500.0).expect("valid"),
            UnforeseenEventModel::from_moments("none", 0.0, 1_000.0, 500.0).expect("valid"),
        ];
        let draws = draw_catalog(&models, 120, &mut rng());
        assert!(!draws.is_empty(), "expected some events with λ=0.3 over 120 months");
        for d in &draws {
            assert_eq!(d.category, "medical");
            assert!(d.events > 0 && d.cost > 0.0);
            assert!(d.month.0 < 120);
        }
    }
}
