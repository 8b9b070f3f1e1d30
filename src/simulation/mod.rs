pub mod config;
pub mod context;

pub use config::SimConfig;
pub use context::SimContext;

use crate::algorithms::Algorithm;
use crate::error::{ConfigError, SimError};
use crate::metrics::logger::TraceLogger;
use crate::metrics::{RunReport, RunSummary};
use crate::scheduler::StopReason;
use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

const PROGRESS_STEPS: u64 = 1000;

/// Object-safe handle on a configured run, whatever algorithm it drives.
pub trait Experiment {
    fn name(&self) -> &str;
    fn run(&mut self) -> Result<StopReason, SimError>;
    fn show_progress(&mut self);
    /// Summary and traces so far. Valid after a failed run too.
    fn report(&self) -> RunReport;
}

pub struct Simulation<A: Algorithm> {
    config: SimConfig,
    algorithm: A,
    ctx: SimContext<A::Kind, A::Payload>,
    progress: ProgressBar,
    outcome: Option<Result<StopReason, SimError>>,
}

impl<A: Algorithm> Simulation<A> {
    pub fn new(config: SimConfig, algorithm: A) -> Result<Self, ConfigError> {
        config.validate()?;
        let ctx = SimContext::new(config.seed, config.channel, config.horizon());
        Ok(Self {
            config,
            algorithm,
            ctx,
            progress: ProgressBar::hidden(),
            outcome: None,
        })
    }

    /// Show a progress bar over simulated time.
    pub fn with_progress(mut self) -> Self {
        self.show_progress();
        self
    }

    pub fn show_progress(&mut self) {
        let pb = ProgressBar::new(PROGRESS_STEPS);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.orange/yellow} {percent}% {msg}")
        {
            pb.set_style(style.progress_chars("█▓░"));
        }
        self.progress = pb;
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn algorithm(&self) -> &A {
        &self.algorithm
    }

    pub fn context(&self) -> &SimContext<A::Kind, A::Payload> {
        &self.ctx
    }

    pub fn run(&mut self) -> Result<StopReason, SimError> {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }

        info!("Starting simulation: {}", self.config.name);
        info!(
            "Algorithm: {} | seed {} | horizon t={}",
            self.algorithm.name(),
            self.config.seed,
            self.ctx.horizon()
        );

        let outcome = self.drive();
        match &outcome {
            Ok(reason) => {
                self.progress.finish_with_message("Simulation complete");
                info!(
                    "Stopped ({}) at t={:.4} after {} events, {} updates",
                    reason,
                    self.ctx.now(),
                    self.ctx.scheduler().dispatched(),
                    self.ctx.stats().updates
                );
            }
            Err(e) => {
                self.progress.abandon_with_message("Simulation failed");
                error!("Simulation {} failed: {}", self.config.name, e);
            }
        }
        self.outcome = Some(outcome.clone());
        outcome
    }

    fn drive(&mut self) -> Result<StopReason, SimError> {
        self.algorithm.initialize(&mut self.ctx)?;
        debug!("{} events scheduled at start", self.ctx.scheduler().pending());

        let horizon = self.ctx.horizon();
        while let Some(event) = self.ctx.next_event() {
            self.algorithm.handle(event, &mut self.ctx)?;

            let done = (self.ctx.now() / horizon).min(1.0);
            self.progress.set_position((done * PROGRESS_STEPS as f64) as u64);
        }

        Ok(self
            .ctx
            .scheduler()
            .stop_reason()
            .unwrap_or(StopReason::QueueEmpty))
    }

    pub fn summary(&self) -> RunSummary {
        let stats = self.ctx.stats();
        let (stop_reason, error) = match &self.outcome {
            Some(Ok(reason)) => (Some(*reason), None),
            Some(Err(e)) => (None, Some(e.to_string())),
            None => (None, None),
        };

        RunSummary {
            name: self.config.name.clone(),
            algorithm: self.algorithm.name().to_string(),
            seed: self.config.seed,
            stop_reason,
            end_time: self.ctx.now(),
            events_dispatched: self.ctx.scheduler().dispatched(),
            signals_sent: stats.signals_sent,
            signals_delivered: stats.signals_delivered,
            signals_dropped: stats.signals_dropped,
            updates: stats.updates,
            objective: self.algorithm.objective(),
            error,
        }
    }
}

impl<A: Algorithm> Experiment for Simulation<A> {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn run(&mut self) -> Result<StopReason, SimError> {
        Simulation::run(self)
    }

    fn show_progress(&mut self) {
        Simulation::show_progress(self)
    }

    fn report(&self) -> RunReport {
        RunReport {
            summary: self.summary(),
            traces: self.algorithm.traces(),
        }
    }
}

/// Write `<name>_<timestamp>.csv` (traces) and `<name>_<timestamp>_summary.json`
/// under `dir`. Returns both paths.
pub fn save_results(report: &RunReport, dir: impl AsRef<Path>) -> Result<(PathBuf, PathBuf)> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");

    let csv_path = dir.join(format!("{}_{}.csv", report.summary.name, timestamp));
    let mut logger = TraceLogger::new(&csv_path)?;
    logger.log_batch(&report.traces)?;
    info!("Traces saved to: {}", csv_path.display());

    let json_path = dir.join(format!("{}_{}_summary.json", report.summary.name, timestamp));
    std::fs::write(&json_path, serde_json::to_string_pretty(&report.summary)?)?;
    info!("Summary saved to: {}", json_path.display());

    Ok((csv_path, json_path))
}
