pub mod logger;

use crate::scheduler::StopReason;
use crate::trace::NamedTrace;
use serde::{Deserialize, Serialize};

/// Counters kept by the simulation context during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub signals_sent: u64,
    pub signals_delivered: u64,
    pub signals_dropped: u64,
    pub updates: u64,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal_delivered(&mut self) {
        self.signals_sent += 1;
        self.signals_delivered += 1;
    }

    pub fn signal_dropped(&mut self) {
        self.signals_sent += 1;
        self.signals_dropped += 1;
    }

    pub fn update_applied(&mut self) {
        self.updates += 1;
    }

    pub fn loss_rate(&self) -> f64 {
        if self.signals_sent > 0 {
            self.signals_dropped as f64 / self.signals_sent as f64
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub name: String,
    pub algorithm: String,
    pub seed: u64,
    /// `None` when the run failed before stopping on its own.
    pub stop_reason: Option<StopReason>,
    pub end_time: f64,
    pub events_dispatched: u64,
    pub signals_sent: u64,
    pub signals_delivered: u64,
    pub signals_dropped: u64,
    pub updates: u64,
    pub objective: f64,
    pub error: Option<String>,
}

impl RunSummary {
    pub fn loss_rate(&self) -> f64 {
        if self.signals_sent > 0 {
            self.signals_dropped as f64 / self.signals_sent as f64
        } else {
            0.0
        }
    }
}

/// Everything a run leaves behind, complete or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub summary: RunSummary,
    pub traces: Vec<NamedTrace>,
}

/// Mean of several summaries of the same algorithm, e.g. across seeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AveragedSummary {
    pub algorithm: String,
    pub runs: usize,
    pub failed: usize,
    pub avg_objective: f64,
    pub avg_end_time: f64,
    pub avg_events: f64,
    pub avg_loss_rate: f64,
    pub avg_updates: f64,
}

pub fn average(algorithm: &str, summaries: &[RunSummary]) -> AveragedSummary {
    let ok: Vec<&RunSummary> = summaries.iter().filter(|s| s.error.is_none()).collect();
    let n = ok.len().max(1) as f64;

    AveragedSummary {
        algorithm: algorithm.to_string(),
        runs: summaries.len(),
        failed: summaries.len() - ok.len(),
        avg_objective: ok.iter().map(|s| s.objective).sum::<f64>() / n,
        avg_end_time: ok.iter().map(|s| s.end_time).sum::<f64>() / n,
        avg_events: ok.iter().map(|s| s.events_dispatched as f64).sum::<f64>() / n,
        avg_loss_rate: ok.iter().map(|s| s.loss_rate()).sum::<f64>() / n,
        avg_updates: ok.iter().map(|s| s.updates as f64).sum::<f64>() / n,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(objective: f64, sent: u64, dropped: u64, error: Option<&str>) -> RunSummary {
        RunSummary {
            name: "t".into(),
            algorithm: "dual-price".into(),
            seed: 0,
            stop_reason: Some(StopReason::Terminated),
            end_time: 10.0,
            events_dispatched: 100,
            signals_sent: sent,
            signals_delivered: sent - dropped,
            signals_dropped: dropped,
            updates: 20,
            objective,
            error: error.map(str::to_string),
        }
    }

    #[test]
    fn test_stats_counters() {
        let mut stats = RunStats::new();
        stats.signal_delivered();
        stats.signal_dropped();
        stats.signal_dropped();
        stats.update_applied();
        assert_eq!(stats.signals_sent, 3);
        assert!((stats.loss_rate() - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(RunStats::new().loss_rate(), 0.0);
    }

    #[test]
    fn test_average_skips_failed_runs() {
        let avg = average(
            "dual-price",
            &[
                summary(1.0, 10, 5, None),
                summary(3.0, 10, 0, None),
                summary(100.0, 10, 0, Some("boom")),
            ],
        );
        assert_eq!(avg.runs, 3);
        assert_eq!(avg.failed, 1);
        assert!((avg.avg_objective - 2.0).abs() < 1e-12);
        assert!((avg.avg_loss_rate - 0.25).abs() < 1e-12);
    }
}
