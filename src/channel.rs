//! Lossy, delayed signaling between agents.
//!
//! Each (sender, recipient) pair draws its own loss and delay. A broadcast
//! to `n` peers takes `n` loss draws plus one delay draw per delivery.

use crate::error::ConfigError;
use crate::rng::UnitSource;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelSpec {
    #[serde(default)]
    pub loss_probability: f64,
    #[serde(default)]
    pub mean_delay: f64,
    #[serde(default)]
    pub max_delay_fluctuation: f64,
}

impl Default for ChannelSpec {
    fn default() -> Self {
        Self::perfect()
    }
}

impl ChannelSpec {
    /// No loss, no delay.
    pub fn perfect() -> Self {
        Self {
            loss_probability: 0.0,
            mean_delay: 0.0,
            max_delay_fluctuation: 0.0,
        }
    }

    pub fn with_loss(mut self, loss_probability: f64) -> Self {
        self.loss_probability = loss_probability;
        self
    }

    pub fn with_delay(mut self, mean_delay: f64, max_delay_fluctuation: f64) -> Self {
        self.mean_delay = mean_delay;
        self.max_delay_fluctuation = max_delay_fluctuation;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.loss_probability) {
            return Err(ConfigError::invalid(
                "channel.loss_probability",
                self.loss_probability,
                "in [0, 1]",
            ));
        }
        if !(self.mean_delay >= 0.0 && self.mean_delay.is_finite()) {
            return Err(ConfigError::invalid(
                "channel.mean_delay",
                self.mean_delay,
                "finite and >= 0",
            ));
        }
        if !(self.max_delay_fluctuation >= 0.0 && self.max_delay_fluctuation.is_finite()) {
            return Err(ConfigError::invalid(
                "channel.max_delay_fluctuation",
                self.max_delay_fluctuation,
                "finite and >= 0",
            ));
        }
        Ok(())
    }
}

/// Delivery time for one message sent at `now`, or `None` if it is lost.
pub fn maybe_deliver(now: f64, spec: &ChannelSpec, rng: &mut impl UnitSource) -> Option<f64> {
    if rng.chance(spec.loss_probability) {
        return None;
    }
    let delay = spec.mean_delay + spec.max_delay_fluctuation * rng.centered();
    Some(now + delay.max(0.0))
}

/// Independent delivery draws for each recipient, in recipient order.
pub fn broadcast<R: Copy>(
    now: f64,
    spec: &ChannelSpec,
    recipients: &[R],
    rng: &mut impl UnitSource,
) -> Vec<(R, Option<f64>)> {
    recipients
        .iter()
        .map(|&r| (r, maybe_deliver(now, spec, rng)))
        .collect()
}
