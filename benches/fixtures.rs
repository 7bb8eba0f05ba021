use bucketsim::bucket::Bucket;
use bucketsim::portfolio::Portfolio;
use bucketsim::shocks::UnforeseenEventModel;
use bucketsim::simulation::{Simulation, SimulationParams};

pub struct Scenario {
    pub buckets: usize,
    pub shock_categories: usize,
    pub trajectories: u64,
    pub months: u32,
}

pub const SMALL: Scenario = Scenario { buckets: 4, shock_categories: 3, trajectories: 100, months: 120 };

pub const MEDIUM: Scenario = Scenario { buckets: 8, shock_categories: 6, trajectories: 1_000, months: 120 };

pub const LARGE: Scenario = Scenario { buckets: 16, shock_categories: 12, trajectories: 5_000, months: 360 };

/// A bounded cash bucket followed by alternating transactional and unbounded
/// tiers, ending in an unbounded sink. Every tier keeps a reserve so deposits
/// exercise the full rebalance chain.
pub fn make_portfolio(depth: usize) -> Portfolio {
    let mut buckets = vec![Bucket::bounded("cash", 2_000.0, 2_000.0)];
    for i in 1..depth.saturating_sub(1) {
        let bucket = if i % 2 == 0 {
            Bucket::transactional(format!("tier{i}"), 4_000.0, 500.0, 8_000.0)
        } else {
            Bucket::unbounded(format!("tier{i}"), 1_500.0)
        };
        buckets.push(bucket);
    }
    if depth > 1 {
        buckets.push(Bucket::unbounded("sink", 0.0));
    }
    Portfolio::new(buckets).expect("fixture portfolio")
}

pub fn make_models(n: usize) -> Vec<UnforeseenEventModel> {
    (0..n)
        .map(|i| {
            let mean = 1_000.0 + 500.0 * i as f64;
            UnforeseenEventModel::from_moments(format!("shock{i}"), 0.05, mean, mean * 0.75)
                .expect("fixture model")
        })
        .collect()
}

pub fn build_simulation(scenario: &Scenario, seed: u64) -> Simulation {
    let params = SimulationParams {
        starting_capital: 50_000.0,
        salary: 3_000.0,
        fixed_expenses: 2_200.0,
        n_trajectories: scenario.trajectories,
        n_months: scenario.months,
        seed,
    };
    Simulation::new(
        make_portfolio(scenario.buckets),
        params,
        make_models(scenario.shock_categories),
    )
}
