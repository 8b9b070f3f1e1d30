//! When an agent next wakes up.
//!
//! Synchronous agents fire every `mean_interval`. Asynchronous agents fire
//! `mean_interval` after their reference time, jittered uniformly by up to
//! `max_fluctuation / 2` either way. Both are floored at `now`.

use crate::error::ConfigError;
use crate::rng::UnitSource;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimingSpec {
    pub is_synchronous: bool,
    pub mean_interval: f64,
    #[serde(default)]
    pub max_fluctuation: f64,
}

impl Default for TimingSpec {
    fn default() -> Self {
        Self {
            is_synchronous: false,
            mean_interval: 1.0,
            max_fluctuation: 0.5,
        }
    }
}

impl TimingSpec {
    pub fn synchronous(mean_interval: f64) -> Self {
        Self {
            is_synchronous: true,
            mean_interval,
            max_fluctuation: 0.0,
        }
    }

    pub fn asynchronous(mean_interval: f64, max_fluctuation: f64) -> Self {
        Self {
            is_synchronous: false,
            mean_interval,
            max_fluctuation,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.mean_interval > 0.0 && self.mean_interval.is_finite()) {
            return Err(ConfigError::invalid(
                "timing.mean_interval",
                self.mean_interval,
                "finite and > 0",
            ));
        }
        if !(self.max_fluctuation >= 0.0 && self.max_fluctuation.is_finite()) {
            return Err(ConfigError::invalid(
                "timing.max_fluctuation",
                self.max_fluctuation,
                "finite and >= 0",
            ));
        }
        Ok(())
    }
}

/// First wake-up, measured from `now`.
pub fn next_time(now: f64, spec: &TimingSpec, rng: &mut impl UnitSource) -> f64 {
    next_time_from(now, now, spec, rng)
}

/// Next wake-up measured from `reference` (the previous firing time), never
/// earlier than `now`. Synchronous timing takes no draw.
pub fn next_time_from(
    now: f64,
    reference: f64,
    spec: &TimingSpec,
    rng: &mut impl UnitSource,
) -> f64 {
    let target = if spec.is_synchronous {
        reference + spec.mean_interval
    } else {
        reference + spec.mean_interval + spec.max_fluctuation * rng.centered()
    };
    target.max(now)
}

/// Per-agent timer remembering its previous firing time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WakeTimer {
    spec: TimingSpec,
    anchor: Option<f64>,
}

impl WakeTimer {
    pub fn new(spec: TimingSpec) -> Self {
        Self { spec, anchor: None }
    }

    pub fn spec(&self) -> &TimingSpec {
        &self.spec
    }

    /// Time the armed wake-up fires at, if armed at least once.
    pub fn anchor(&self) -> Option<f64> {
        self.anchor
    }

    /// Pick the next firing time. The first call measures from `now`,
    /// later calls from the previously armed time.
    pub fn arm(&mut self, now: f64, rng: &mut impl UnitSource) -> f64 {
        let reference = self.anchor.unwrap_or(now);
        let at = next_time_from(now, reference, &self.spec, rng);
        self.anchor = Some(at);
        at
    }
}
