use crate::channel::ChannelSpec;
use crate::error::ConfigError;
use crate::gradient::GradientStepSpec;
use crate::timing::TimingSpec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    pub name: String,
    pub algorithm: String,
    #[serde(default)]
    pub seed: u64,
    /// Run length in units of `timing.mean_interval`.
    pub max_intervals: f64,
    #[serde(default)]
    pub timing: TimingSpec,
    #[serde(default)]
    pub channel: ChannelSpec,
    #[serde(default)]
    pub step: GradientStepSpec,
    /// Named per-algorithm parameters, see each algorithm for the keys it reads.
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            name: "default_sim".to_string(),
            algorithm: "dual-price".to_string(),
            seed: 1,
            max_intervals: 200.0,
            timing: TimingSpec::default(),
            channel: ChannelSpec::default(),
            step: GradientStepSpec::default(),
            params: BTreeMap::new(),
        }
    }
}

impl SimConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SimConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.algorithm = algorithm.into();
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_max_intervals(mut self, max_intervals: f64) -> Self {
        self.max_intervals = max_intervals;
        self
    }

    pub fn with_timing(mut self, timing: TimingSpec) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_channel(mut self, channel: ChannelSpec) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_step(mut self, step: GradientStepSpec) -> Self {
        self.step = step;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: f64) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn param(&self, key: &str, default: f64) -> f64 {
        self.params.get(key).copied().unwrap_or(default)
    }

    /// Simulated time after which agents request termination.
    pub fn horizon(&self) -> f64 {
        self.max_intervals * self.timing.mean_interval
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.timing.validate()?;
        self.channel.validate()?;
        self.step.validate()?;
        if !(self.max_intervals > 0.0 && self.max_intervals.is_finite()) {
            return Err(ConfigError::invalid("max_intervals", self.max_intervals, "finite and > 0"));
        }
        if let Some((key, value)) = self.params.iter().find(|(_, v)| !v.is_finite()) {
            return Err(ConfigError::invalid(format!("params.{}", key), *value, "finite"));
        }
        Ok(())
    }
}
