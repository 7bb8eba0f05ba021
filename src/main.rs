use std::error::Error;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use bucketsim::analysis::{self, BucketUsageDist, DistStats, MonthBalanceDist, UsageStatistics};
use bucketsim::config::SimulationConfig;
use bucketsim::logging;
use bucketsim::simulation::{SimulationError, SimulationOutput, Trajectory};
use bucketsim::types::TrajectoryId;
use clap::Parser;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(
    name = "bucketsim",
    about = "Monte Carlo stress test of a bucket liquidity strategy"
)]
struct Cli {
    #[arg(long, help = "JSON scenario file; the built-in canonical scenario when omitted")]
    config: Option<PathBuf>,
    #[arg(long, help = "Base seed; trajectory i uses seed + i")]
    seed: Option<u64>,
    #[arg(long)]
    trajectories: Option<u64>,
    #[arg(long)]
    months: Option<u32>,
    #[arg(long, help = "Write per-trajectory usage counts to this CSV file")]
    csv: Option<PathBuf>,
    #[arg(long, help = "Suppress tables and info logging")]
    quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.quiet);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "run failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn Error>> {
    let mut config = match &cli.config {
        Some(path) => SimulationConfig::from_path(path)?,
        None => SimulationConfig::canonical(),
    };
    if let Some(seed) = cli.seed {
        config.params.seed = seed;
    }
    if let Some(n) = cli.trajectories {
        config.params.n_trajectories = n;
    }
    if let Some(m) = cli.months {
        config.params.n_months = m;
    }

    let sim = config.build_simulation()?;
    let results = sim.run_trajectories()?;
    let (completed, failed) = split_results(results);
    info!(completed = completed.len(), failed = failed.len(), "batch finished");

    let output = SimulationOutput::from_trajectories(
        sim.portfolio.names(),
        config.params.n_months as usize,
        completed,
    )?;
    let usage = analysis::usage_statistics(&output.access, &output.names)?;

    if let Some(path) = &cli.csv {
        write_usage_csv(&usage, &output.trajectory_ids, path)?;
        info!(path = %path.display(), "usage counts written");
    }

    if !cli.quiet {
        let expected_shocks: f64 = sim.models.iter().map(|m| m.expected_cost()).sum();
        println!(
            "Trajectories: {} ({} ran out of funds) | months: {} | seed: {} | expected shocks/month: {:.2}",
            config.params.n_trajectories,
            failed.len(),
            config.params.n_months,
            config.params.seed,
            expected_shocks,
        );
        for (id, err) in failed.iter().take(5) {
            println!("  trajectory {id}: {err}");
        }
        print_usage(&analysis::usage_distributions(&usage), config.params.n_months);
        if let Some(last) = analysis::balance_distributions(&output).last() {
            print_final_balances(last, &output.names);
        }
    }

    Ok(())
}

fn split_results(
    results: Vec<Result<Trajectory, SimulationError>>,
) -> (Vec<Trajectory>, Vec<(TrajectoryId, SimulationError)>) {
    let mut completed = Vec::with_capacity(results.len());
    let mut failed = Vec::new();
    for (i, r) in results.into_iter().enumerate() {
        match r {
            Ok(t) => completed.push(t),
            Err(e) => failed.push((TrajectoryId(i as u64), e)),
        }
    }
    (completed, failed)
}

fn write_usage_csv(
    usage: &UsageStatistics,
    ids: &[TrajectoryId],
    path: &Path,
) -> Result<(), Box<dyn Error>> {
    let mut w = BufWriter::new(File::create(path)?);
    let header: Vec<&str> = usage.iter().map(|(name, _)| name).collect();
    writeln!(w, "trajectory,{}", header.join(","))?;
    for (col, id) in ids.iter().enumerate() {
        let row: Vec<String> = usage.iter().map(|(_, counts)| counts[col].to_string()).collect();
        writeln!(w, "{},{}", id, row.join(","))?;
    }
    w.flush()?;
    Ok(())
}

fn print_usage(dists: &[BucketUsageDist], n_months: u32) {
    println!("\n=== Months reaching each bucket (of {n_months}) ===");
    println!(
        "{:<12} | {:>7} | {:>7} | {:>7} | {:>7} | {:>7} | {:>7} | {:>7} | {:>7} | {:>7} | {:>7}",
        "Bucket", "reach%", "min", "p5", "p25", "p50", "p75", "p95", "max", "mean", "stddev"
    );
    println!("{}", "-".repeat(12 + 10 * 10));
    for d in dists {
        let s = &d.months_reached;
        println!(
            "{:<12} | {:>6.1}% | {}",
            d.name,
            d.reach_probability * 100.0,
            stats_row(s),
        );
    }
}

fn print_final_balances(dist: &MonthBalanceDist, names: &[String]) {
    println!("\n=== Balances at month {} (year {}) ===", dist.month, dist.month.year());
    println!(
        "{:<12} | {:>9} | {:>9} | {:>9} | {:>9} | {:>9} | {:>9} | {:>9} | {:>9} | {:>9}",
        "Bucket", "min", "p5", "p25", "p50", "p75", "p95", "max", "mean", "stddev"
    );
    println!("{}", "-".repeat(12 + 9 * 12));
    for (name, s) in names.iter().zip(&dist.buckets) {
        println!("{:<12} | {}", name, balance_row(s));
    }
    println!("{:<12} | {}", "Total", balance_row(&dist.total));
}

fn stats_row(s: &DistStats) -> String {
    format!(
        "{:>7.1} | {:>7.1} | {:>7.1} | {:>7.1} | {:>7.1} | {:>7.1} | {:>7.1} | {:>7.1} | {:>7.1}",
        s.min, s.p5, s.p25, s.p50, s.p75, s.p95, s.max, s.mean, s.std_dev
    )
}

fn balance_row(s: &DistStats) -> String {
    format!(
        "{:>9.0} | {:>9.0} | {:>9.0} | {:>9.0} | {:>9.0} | {:>9.0} | {:>9.0} | {:>9.0} | {:>9.0}",
        s.min, s.p5, s.p25, s.p50, s.p75, s.p95, s.max, s.mean, s.std_dev
    )
}
