use std::collections::BTreeMap;
use std::env;
use std::process::ExitCode;

use bucketsim::config::SimulationConfig;
use bucketsim::logging;
use bucketsim::shocks::draw_catalog;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tracing::error;

/// Draw the canonical shock categories for N months (first argument, default
/// the canonical horizon). NDJSON to stdout, per-category summary to stderr.
fn main() -> ExitCode {
    logging::init(false);
    let config = SimulationConfig::canonical();

    let n_months: u32 = env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(config.params.n_months);

    let models = match config.build_models() {
        Ok(m) => m,
        Err(e) => {
            error!(error = %e, "invalid shock models");
            return ExitCode::FAILURE;
        }
    };

    let mut rng = ChaCha20Rng::seed_from_u64(config.params.seed);
    let draws = draw_catalog(&models, n_months, &mut rng);

    for draw in &draws {
        match serde_json::to_string(draw) {
            Ok(line) => println!("{line}"),
            Err(e) => {
                error!(error = %e, "serialisation failed");
                return ExitCode::FAILURE;
            }
        }
    }

    // (events, total cost, largest single month)
    let mut per_category: BTreeMap<&str, (u64, f64, f64)> = BTreeMap::new();
    for d in &draws {
        let entry = per_category.entry(d.category.as_str()).or_insert((0, 0.0, 0.0));
        entry.0 += d.events;
        entry.1 += d.cost;
        entry.2 = entry.2.max(d.cost);
    }

    let total_cost: f64 = draws.iter().map(|d| d.cost).sum();
    let expected: f64 = models.iter().map(|m| m.expected_cost()).sum::<f64>() * n_months as f64;
    eprintln!(
        "shock_catalog: {n_months} months, {} shock months, total cost {total_cost:.0} (expected ~{expected:.0})",
        draws.len()
    );
    for model in &models {
        let (events, cost, max) = per_category.get(model.name.as_str()).copied().unwrap_or_default();
        let mean = if events > 0 { cost / events as f64 } else { 0.0 };
        eprintln!(
            "  category={:<8}  events={events:>4}  mean_cost={mean:>8.1}  max_month={max:>9.1}",
            model.name
        );
    }

    ExitCode::SUCCESS
}
