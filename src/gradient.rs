//! Projected gradient steps with heavy-ball momentum, bounded noise and a
//! per-coordinate move clamp.
//!
//! Sign convention is ascent: `raw = old + step_size * gradient`. Dual price
//! updates pass `traffic - capacity` as is; descent callers negate.
//!
//! Each step runs, in order:
//! 1. `raw = old + step_size * (gradient + noise) + beta * (old - previous)`
//! 2. projection onto the feasible region
//! 3. clamp of the net move `projected - old` to `max_coordinate_change`
//!
//! One noise draw is taken per coordinate, whether or not noise is enabled.

use crate::error::{ConfigError, NumericError};
use crate::project::{self, Projection};
use crate::rng::UnitSource;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradientStepSpec {
    pub step_size: f64,
    #[serde(default)]
    pub heavy_ball_beta: f64,
    /// 0 disables the clamp.
    #[serde(default)]
    pub max_coordinate_change: f64,
    #[serde(default)]
    pub noise_half_width: f64,
}

impl Default for GradientStepSpec {
    fn default() -> Self {
        Self {
            step_size: 0.01,
            heavy_ball_beta: 0.0,
            max_coordinate_change: 0.0,
            noise_half_width: 0.0,
        }
    }
}

impl GradientStepSpec {
    pub fn new(step_size: f64) -> Result<Self, ConfigError> {
        let spec = Self {
            step_size,
            ..Self::default()
        };
        spec.validate()?;
        Ok(spec)
    }

    pub fn with_momentum(mut self, beta: f64) -> Self {
        self.heavy_ball_beta = beta;
        self
    }

    pub fn with_max_change(mut self, max_change: f64) -> Self {
        self.max_coordinate_change = max_change;
        self
    }

    pub fn with_noise(mut self, half_width: f64) -> Self {
        self.noise_half_width = half_width;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.step_size > 0.0 && self.step_size.is_finite()) {
            return Err(ConfigError::invalid("step.step_size", self.step_size, "finite and > 0"));
        }
        if !(0.0..=1.0).contains(&self.heavy_ball_beta) {
            return Err(ConfigError::invalid(
                "step.heavy_ball_beta",
                self.heavy_ball_beta,
                "in [0, 1]",
            ));
        }
        if !(self.max_coordinate_change >= 0.0 && self.max_coordinate_change.is_finite()) {
            return Err(ConfigError::invalid(
                "step.max_coordinate_change",
                self.max_coordinate_change,
                "finite and >= 0",
            ));
        }
        if !(self.noise_half_width >= 0.0 && self.noise_half_width.is_finite()) {
            return Err(ConfigError::invalid(
                "step.noise_half_width",
                self.noise_half_width,
                "finite and >= 0",
            ));
        }
        Ok(())
    }

    fn raw(&self, old: f64, gradient: f64, previous: f64, rng: &mut impl UnitSource) -> f64 {
        let noise = 2.0 * self.noise_half_width * rng.centered();
        old + self.step_size * (gradient + noise) + self.heavy_ball_beta * (old - previous)
    }
}

/// Box bounds for scalar steps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub lo: f64,
    pub hi: f64,
}

impl Bounds {
    pub const UNBOUNDED: Bounds = Bounds {
        lo: f64::NEG_INFINITY,
        hi: f64::INFINITY,
    };

    pub const NON_NEGATIVE: Bounds = Bounds {
        lo: 0.0,
        hi: f64::INFINITY,
    };

    pub fn new(lo: f64, hi: f64) -> Result<Self, ConfigError> {
        Projection::bounded(lo, hi)?;
        Ok(Self { lo, hi })
    }

    pub fn clip(&self, v: f64) -> f64 {
        v.clamp(self.lo, self.hi)
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::UNBOUNDED
    }
}

/// One scalar update. `previous` is the value before `old` (equal to `old`
/// on the first step, which turns momentum off).
pub fn step(
    old: f64,
    gradient: f64,
    spec: &GradientStepSpec,
    previous: f64,
    bounds: Bounds,
    rng: &mut impl UnitSource,
) -> Result<f64, NumericError> {
    ensure_finite("gradient", None, gradient)?;
    ensure_finite("state", None, old)?;

    let raw = spec.raw(old, gradient, previous, rng);
    ensure_finite("raw step", None, raw)?;

    let projected = bounds.clip(raw);
    let next = project::clamp_change(old, projected, spec.max_coordinate_change);
    debug_assert!(
        spec.max_coordinate_change == 0.0
            || (next - old).abs() <= spec.max_coordinate_change + 1e-9
    );
    Ok(next)
}

/// One vector update projected onto `region`. The clamp is applied per
/// coordinate after the projection.
///
/// `region` is checked against `old.len()` before any draw is taken, so a
/// region built from the enum variants directly or loaded from JSON cannot
/// reach the projection with a wrong length or an empty set.
pub fn step_vector(
    old: &[f64],
    gradient: &[f64],
    spec: &GradientStepSpec,
    previous: &[f64],
    region: &Projection,
    rng: &mut impl UnitSource,
) -> Result<Vec<f64>, NumericError> {
    ensure_len("gradient", old.len(), gradient.len())?;
    ensure_len("previous", old.len(), previous.len())?;
    if let Projection::SumInequality { lower, .. } = region {
        ensure_len("region lower bounds", old.len(), lower.len())?;
    }
    region.validate(old.len())?;

    let mut next = Vec::with_capacity(old.len());
    for (i, ((&o, &g), &p)) in old.iter().zip(gradient).zip(previous).enumerate() {
        ensure_finite("gradient", Some(i), g)?;
        ensure_finite("state", Some(i), o)?;
        let raw = spec.raw(o, g, p, rng);
        ensure_finite("raw step", Some(i), raw)?;
        next.push(raw);
    }

    region.apply(&mut next);

    for (v, &o) in next.iter_mut().zip(old) {
        *v = project::clamp_change(o, *v, spec.max_coordinate_change);
    }
    Ok(next)
}

fn ensure_finite(
    quantity: &'static str,
    index: Option<usize>,
    value: f64,
) -> Result<(), NumericError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(NumericError::NonFinite {
            quantity,
            index,
            value,
        })
    }
}

fn ensure_len(quantity: &'static str, expected: usize, got: usize) -> Result<(), NumericError> {
    if expected == got {
        Ok(())
    } else {
        Err(NumericError::DimensionMismatch {
            quantity,
            expected,
            got,
        })
    }
}

/// A scalar coordinate plus the value it held before its last update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalarState {
    pub value: f64,
    pub previous: f64,
}

impl ScalarState {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            previous: value,
        }
    }

    pub fn advance(
        &mut self,
        gradient: f64,
        spec: &GradientStepSpec,
        bounds: Bounds,
        rng: &mut impl UnitSource,
    ) -> Result<f64, NumericError> {
        let next = step(self.value, gradient, spec, self.previous, bounds, rng)?;
        self.previous = self.value;
        self.value = next;
        Ok(next)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorState {
    pub value: Vec<f64>,
    pub previous: Vec<f64>,
}

impl VectorState {
    pub fn new(value: Vec<f64>) -> Self {
        Self {
            previous: value.clone(),
            value,
        }
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn advance(
        &mut self,
        gradient: &[f64],
        spec: &GradientStepSpec,
        region: &Projection,
        rng: &mut impl UnitSource,
    ) -> Result<&[f64], NumericError> {
        let next = step_vector(&self.value, gradient, spec, &self.previous, region, rng)?;
        self.previous = std::mem::replace(&mut self.value, next);
        Ok(&self.value)
    }
}
