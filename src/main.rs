// netgrad: an event-driven simulator for distributed gradient algorithms over
// lossy, delayed networks. Agents wake on their own clocks, act on whatever
// stale state last reached them and talk only through the channel.

// Copyright 2025 Servus Altissimi (Pseudonym)

// Permission is hereby granted, free of charge, to any person obtaining a copy of this software and associated documentation files (the "Software"), to deal in the Software without restriction, including without limitation the rights to use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of the Software, and to permit persons to whom the Software is furnished to do so, subject to the following conditions:
// The above copyright notice and this permission notice shall be included in all copies or substantial portions of the Software.
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

use netgrad::metrics::{self, AveragedSummary, RunSummary};
use netgrad::prelude::*;
use netgrad::simulation::save_results;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    Run {
        #[arg(short, long, default_value = "dual-price")]
        algorithm: String,
        #[command(flatten)]
        sim: SimArgs,
        #[arg(short, long, default_value = "results")]
        output: PathBuf,
        #[arg(long)]
        progress: bool,
    },

    Compare {
        #[arg(short, long, default_value = "dual-price,primal-rate,route-split,backpressure")]
        algorithms: String,
        /// Seeds run per algorithm, starting at --seed (or the config's seed).
        #[arg(short, long, default_value_t = 3)]
        repetitions: u64,
        #[command(flatten)]
        sim: SimArgs,
        #[arg(short, long, default_value = "results")]
        output: PathBuf,
    },

    /// Average the run summaries saved under a directory.
    Analyze {
        #[arg(default_value = "results")]
        path: PathBuf,
    },

    List,
}

/// Run parameters. Anything left unset keeps the value from `--config`, or
/// the built-in default when there is no config file.
#[derive(Args, Clone, Debug)]
struct SimArgs {
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Topology JSON; overrides --topology.
    #[arg(short, long)]
    network: Option<PathBuf>,
    /// single, line or parallel
    #[arg(short, long, default_value = "single")]
    topology: String,
    #[arg(long, default_value_t = 10.0)]
    capacity: f64,
    /// Demands for single/parallel, hops for line.
    #[arg(long, default_value_t = 2)]
    size: usize,

    #[arg(short, long)]
    seed: Option<u64>,
    #[arg(short = 'm', long)]
    max_intervals: Option<f64>,
    #[arg(long)]
    sync: bool,
    #[arg(long)]
    interval: Option<f64>,
    #[arg(long)]
    fluctuation: Option<f64>,
    #[arg(long)]
    loss: Option<f64>,
    #[arg(long)]
    delay: Option<f64>,
    #[arg(long)]
    delay_fluctuation: Option<f64>,
    #[arg(long)]
    step: Option<f64>,
    #[arg(long)]
    momentum: Option<f64>,
    #[arg(long)]
    max_change: Option<f64>,
    #[arg(long)]
    noise: Option<f64>,
    /// Algorithm parameter as key=value, repeatable.
    #[arg(short, long = "param", value_parser = parse_param)]
    params: Vec<(String, f64)>,
}

impl SimArgs {
    fn config(&self, algorithm: &str) -> Result<SimConfig> {
        let mut config = match &self.config {
            Some(path) => SimConfig::from_file(path)?,
            None => SimConfig::default(),
        };
        config.algorithm = algorithm.to_string();

        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(n) = self.max_intervals {
            config.max_intervals = n;
        }
        if self.sync {
            config.timing.is_synchronous = true;
        }
        if let Some(v) = self.interval {
            config.timing.mean_interval = v;
        }
        if let Some(v) = self.fluctuation {
            config.timing.max_fluctuation = v;
        }
        if let Some(v) = self.loss {
            config.channel.loss_probability = v;
        }
        if let Some(v) = self.delay {
            config.channel.mean_delay = v;
        }
        if let Some(v) = self.delay_fluctuation {
            config.channel.max_delay_fluctuation = v;
        }
        if let Some(v) = self.step {
            config.step.step_size = v;
        }
        if let Some(v) = self.momentum {
            config.step.heavy_ball_beta = v;
        }
        if let Some(v) = self.max_change {
            config.step.max_coordinate_change = v;
        }
        if let Some(v) = self.noise {
            config.step.noise_half_width = v;
        }
        for (key, value) in &self.params {
            config.params.insert(key.clone(), *value);
        }

        config.validate()?;
        Ok(config)
    }

    fn network(&self) -> Result<Network> {
        if let Some(path) = &self.network {
            return Network::from_file(path);
        }
        let network = match self.topology.to_lowercase().as_str() {
            "single" => Network::single_link(self.capacity, self.size),
            "line" => Network::line(self.size, self.capacity),
            "parallel" => Network::parallel((self.capacity, self.capacity / 2.0), self.size),
            other => bail!("Unknown topology: {}. Use: single, line or parallel", other),
        };
        network.validate()?;
        Ok(network)
    }
}

fn parse_param(s: &str) -> Result<(String, f64), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|e| format!("bad value for {}: {}", key, e))?;
    Ok((key.trim().to_string(), value))
}

fn main() -> Result<()> {
    let program_start = Instant::now();

    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run {
            algorithm,
            sim,
            output,
            progress,
        } => run_single(&algorithm, &sim, &output, progress)?,

        Commands::Compare {
            algorithms,
            repetitions,
            sim,
            output,
        } => compare_algorithms(&algorithms, repetitions, &sim, &output)?,

        Commands::Analyze { path } => analyze_results(&path)?,

        Commands::List => {
            println!("\nAvailable Algorithms");

            for name in AlgorithmRegistry::global().list() {
                println!("  - {}", name);
            }

            println!("\nUsage: netgrad run --algorithm <name>");
            println!("Example: netgrad run --algorithm route-split --topology parallel --size 3\n");
        }
    }

    info!("Total runtime: {:.2}s", program_start.elapsed().as_secs_f64());

    Ok(())
}

fn run_single(algorithm: &str, sim: &SimArgs, output: &Path, progress: bool) -> Result<()> {
    let config = sim.config(algorithm)?;
    let network = sim.network()?;
    info!(
        "netgrad: {} over {} links, {} demands",
        algorithm,
        network.link_count(),
        network.demand_count()
    );

    let mut experiment = AlgorithmRegistry::global().create(&config, &network)?;
    if progress {
        experiment.show_progress();
    }

    // Traces are saved even when the run fails part way.
    let outcome = experiment.run();
    let report = experiment.report();
    save_results(&report, output)?;

    let summary = &report.summary;
    println!("\n{} (seed {})", summary.algorithm, summary.seed);
    println!("  end time      {:.3}", summary.end_time);
    println!("  events        {}", summary.events_dispatched);
    println!("  updates       {}", summary.updates);
    println!("  signals lost  {:.2}%", summary.loss_rate() * 100.0);
    println!("  objective     {:.6}\n", summary.objective);

    outcome?;
    Ok(())
}

fn compare_algorithms(
    algorithms: &str,
    repetitions: u64,
    sim: &SimArgs,
    output: &Path,
) -> Result<()> {
    let names: Vec<&str> = algorithms.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
    let registry = AlgorithmRegistry::global();
    if let Some(unknown) = names.iter().find(|n| !registry.contains(n)) {
        bail!("Unknown algorithm: {}", unknown);
    }

    let network = sim.network()?;
    let base_seed = sim.config(names.first().copied().unwrap_or("dual-price"))?.seed;

    info!("netgrad: Comparison");
    info!("Algorithms: {}", names.join(", "));
    info!("Seeds: {}..{}", base_seed, base_seed + repetitions);

    let mut jobs = Vec::new();
    for &name in &names {
        let config = sim.config(name)?;
        for rep in 0..repetitions {
            let seed = base_seed + rep;
            let job = config.clone().with_seed(seed).with_name(format!("{}_{}", name, seed));
            jobs.push((name, job));
        }
    }

    let summaries: Vec<(&str, RunSummary)> = jobs
        .par_iter()
        .map(|(name, config)| {
            let mut experiment = registry.create(config, &network)?;
            if let Err(e) = experiment.run() {
                warn!("{} failed: {}", config.name, e);
            }
            Ok::<_, anyhow::Error>((*name, experiment.report().summary))
        })
        .collect::<Result<Vec<_>>>()?;

    let averaged: Vec<AveragedSummary> = names
        .iter()
        .map(|&name| {
            let runs: Vec<RunSummary> = summaries
                .iter()
                .filter(|(n, _)| *n == name)
                .map(|(_, s)| s.clone())
                .collect();
            metrics::average(name, &runs)
        })
        .collect();

    comparison_table(&averaged);

    std::fs::create_dir_all(output)?;
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let comparison_path = output.join(format!("comparison_{}.json", timestamp));
    std::fs::write(&comparison_path, serde_json::to_string_pretty(&averaged)?)?;
    info!("Comparison saved to: {}", comparison_path.display());

    Ok(())
}

fn analyze_results(path: &Path) -> Result<()> {
    info!("Analyzing results in: {}", path.display());

    let mut by_algorithm: BTreeMap<String, Vec<RunSummary>> = BTreeMap::new();
    for entry in std::fs::read_dir(path)? {
        let path = entry?.path();
        if path.to_string_lossy().ends_with("_summary.json") {
            let content = std::fs::read_to_string(&path)?;
            let summary: RunSummary = serde_json::from_str(&content)?;
            by_algorithm.entry(summary.algorithm.clone()).or_default().push(summary);
        }
    }

    if by_algorithm.is_empty() {
        info!("No summary files found.");
        return Ok(());
    }

    let averaged: Vec<AveragedSummary> = by_algorithm
        .iter()
        .map(|(name, runs)| metrics::average(name, runs))
        .collect();
    comparison_table(&averaged);

    Ok(())
}

fn comparison_table(rows: &[AveragedSummary]) {
    println!("\n╔══════════════════════════════════════════════════════════════════════════════╗");
    println!("║                            ALGORITHM COMPARISON                              ║");
    println!("╠═══════════════╦══════╦════════════╦════════════╦═══════════╦═════════════════╣");
    println!("║ Algorithm     ║ Runs ║ Objective  ║ End time   ║ Loss (%)  ║ Updates         ║");
    println!("╠═══════════════╬══════╬════════════╬════════════╬═══════════╬═════════════════╣");

    for row in rows {
        println!(
            "║ {:<13} ║ {:>4} ║ {:>10.4} ║ {:>10.2} ║ {:>8.2}% ║ {:>15.1} ║",
            row.algorithm,
            row.runs - row.failed,
            row.avg_objective,
            row.avg_end_time,
            row.avg_loss_rate * 100.0,
            row.avg_updates,
        );
    }

    println!("╚═══════════════╩══════╩════════════╩════════════╩═══════════╩═════════════════╝\n");

    for row in rows.iter().filter(|r| r.failed > 0) {
        println!("{}: {} of {} runs failed", row.algorithm, row.failed, row.runs);
    }

    if let Some(best) = rows.iter().max_by(|a, b| a.avg_objective.total_cmp(&b.avg_objective)) {
        println!("Highest objective: {} ({:.4})", best.algorithm, best.avg_objective);
    }

    println!();
}
