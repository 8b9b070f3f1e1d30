//! Error taxonomy for the simulator.
//!
//! - [`ConfigError`]: bad parameters or an infeasible feasible-set, caught
//!   before the first event runs.
//! - [`NumericError`]: a primitive was handed a non-finite value or a
//!   vector of the wrong length. Usually a bad domain gradient.
//! - [`SimError`]: anything that stops a run once it started, with the
//!   event and simulated time it happened at.
//!
//! Message loss and empty queues are normal outcomes and never show up here.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid parameter `{name}` = {value}: must be {expected}")]
    InvalidParameter {
        name: String,
        value: f64,
        expected: &'static str,
    },

    #[error("infeasible projection: {0}")]
    InfeasibleRegion(String),

    #[error("unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("invalid network: {0}")]
    InvalidNetwork(String),
}

impl ConfigError {
    pub fn invalid(name: impl Into<String>, value: f64, expected: &'static str) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            value,
            expected,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NumericError {
    #[error("non-finite {quantity}{}: {value}", coordinate_suffix(.index))]
    NonFinite {
        quantity: &'static str,
        index: Option<usize>,
        value: f64,
    },

    #[error("dimension mismatch for {quantity}: expected {expected}, got {got}")]
    DimensionMismatch {
        quantity: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("feasible region rejected: {0}")]
    Region(#[from] ConfigError),
}

fn coordinate_suffix(index: &Option<usize>) -> String {
    match index {
        Some(i) => format!("[{}]", i),
        None => String::new(),
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error("event {kind} scheduled at t={time} but current time is t={now}")]
    ScheduledInPast { kind: String, time: f64, now: f64 },

    #[error("event {kind} scheduled at non-finite time {time}")]
    NonFiniteTime { kind: String, time: f64 },

    #[error("{agent} failed handling {event} at t={time}: {source}")]
    Numerical {
        agent: String,
        event: String,
        time: f64,
        #[source]
        source: NumericError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SimError {
    /// Attach agent/event/time context to a numeric failure.
    pub fn numerical(
        agent: impl Into<String>,
        event: impl Into<String>,
        time: f64,
        source: NumericError,
    ) -> Self {
        Self::Numerical {
            agent: agent.into(),
            event: event.into(),
            time,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_failing_invariant() {
        let err = ConfigError::invalid("timing.mean_interval", 0.0, "> 0");
        assert_eq!(
            err.to_string(),
            "invalid parameter `timing.mean_interval` = 0: must be > 0"
        );

        let err = SimError::numerical(
            "link 3",
            "LinkWake",
            12.5,
            NumericError::NonFinite {
                quantity: "gradient",
                index: Some(2),
                value: f64::NAN,
            },
        );
        let msg = err.to_string();
        assert!(msg.contains("link 3"));
        assert!(msg.contains("LinkWake"));
        assert!(msg.contains("t=12.5"));
        assert!(msg.contains("gradient[2]"));
    }
}
