//! Euclidean projections onto the feasible sets the algorithms use.
//!
//! The free functions check their region and return [`ConfigError`] when it
//! is empty. [`Projection`] validates once at construction and then applies
//! without checks, which is what the per-event hot path uses.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

const FEASIBILITY_TOL: f64 = 1e-9;

/// Clip every coordinate to `[lo, hi]`.
pub fn clip_box(x: &mut [f64], lo: f64, hi: f64) -> Result<(), ConfigError> {
    check_box(lo, hi)?;
    clip_box_unchecked(x, lo, hi);
    Ok(())
}

/// Project onto `{ y : sum(y) == total, y >= 0 }`.
///
/// With `regularization > 0` this solves
/// `min |y - x|^2 + regularization * |y|^2` over the same set instead, which
/// spreads mass away from a single dominant coordinate.
pub fn sum_equality(x: &mut [f64], total: f64, regularization: f64) -> Result<(), ConfigError> {
    check_sum_equality(x.len(), total, regularization)?;
    sum_equality_unchecked(x, total, regularization);
    Ok(())
}

/// Project onto `{ y : sum(y) <= capacity, y_i >= lower_i }`.
pub fn sum_inequality(x: &mut [f64], capacity: f64, lower: &[f64]) -> Result<(), ConfigError> {
    check_sum_inequality(x.len(), capacity, lower)?;
    sum_inequality_unchecked(x, capacity, lower);
    Ok(())
}

/// Limit the move from `old` to `candidate` to at most `max_change` in
/// magnitude, keeping its sign. `max_change == 0` disables the clamp.
pub fn clamp_change(old: f64, candidate: f64, max_change: f64) -> f64 {
    if max_change > 0.0 {
        old + (candidate - old).clamp(-max_change, max_change)
    } else {
        candidate
    }
}

/// A validated feasible region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Projection {
    Unconstrained,
    Box { lo: f64, hi: f64 },
    SumEquality { total: f64, regularization: f64 },
    SumInequality { capacity: f64, lower: Vec<f64> },
}

impl Projection {
    pub fn unconstrained() -> Self {
        Self::Unconstrained
    }

    pub fn bounded(lo: f64, hi: f64) -> Result<Self, ConfigError> {
        check_box(lo, hi)?;
        Ok(Self::Box { lo, hi })
    }

    pub fn simplex(total: f64, regularization: f64) -> Result<Self, ConfigError> {
        check_sum_equality(1, total, regularization)?;
        Ok(Self::SumEquality {
            total,
            regularization,
        })
    }

    pub fn capacity(capacity: f64, lower: Vec<f64>) -> Result<Self, ConfigError> {
        check_sum_inequality(lower.len(), capacity, &lower)?;
        Ok(Self::SumInequality { capacity, lower })
    }

    /// Check the region is non-empty for vectors of length `dim`.
    pub fn validate(&self, dim: usize) -> Result<(), ConfigError> {
        match self {
            Self::Unconstrained => Ok(()),
            Self::Box { lo, hi } => check_box(*lo, *hi),
            Self::SumEquality {
                total,
                regularization,
            } => check_sum_equality(dim, *total, *regularization),
            Self::SumInequality { capacity, lower } => check_sum_inequality(dim, *capacity, lower),
        }
    }

    /// Exact projections leave feasible points where they are. The
    /// regularized simplex does not.
    pub fn is_exact(&self) -> bool {
        !matches!(self, Self::SumEquality { regularization, .. } if *regularization > 0.0)
    }

    /// Project `x` in place. Expects `validate(x.len())` to have passed;
    /// [`gradient::step_vector`](crate::gradient::step_vector) checks this
    /// on every step.
    pub fn apply(&self, x: &mut [f64]) {
        match self {
            Self::Unconstrained => {}
            Self::Box { lo, hi } => clip_box_unchecked(x, *lo, *hi),
            Self::SumEquality {
                total,
                regularization,
            } => sum_equality_unchecked(x, *total, *regularization),
            Self::SumInequality { capacity, lower } => {
                sum_inequality_unchecked(x, *capacity, lower)
            }
        }
    }

    /// Project only the coordinates in `indices`, leaving the rest alone.
    /// For `SumInequality`, `lower` is indexed like `indices`.
    pub fn apply_subset(&self, x: &mut [f64], indices: &[usize]) {
        let mut gathered: Vec<f64> = indices.iter().map(|&i| x[i]).collect();
        self.apply(&mut gathered);
        for (&i, v) in indices.iter().zip(gathered) {
            x[i] = v;
        }
    }

    pub fn contains(&self, x: &[f64], tol: f64) -> bool {
        match self {
            Self::Unconstrained => true,
            Self::Box { lo, hi } => x.iter().all(|&v| v >= lo - tol && v <= hi + tol),
            Self::SumEquality { total, .. } => {
                x.iter().all(|&v| v >= -tol) && (x.iter().sum::<f64>() - total).abs() <= tol
            }
            Self::SumInequality { capacity, lower } => {
                x.iter().zip(lower).all(|(&v, &l)| v >= l - tol)
                    && x.iter().sum::<f64>() <= capacity + tol
            }
        }
    }
}

fn check_box(lo: f64, hi: f64) -> Result<(), ConfigError> {
    if lo.is_nan() || hi.is_nan() || lo > hi {
        return Err(ConfigError::InfeasibleRegion(format!(
            "box lower bound {} exceeds upper bound {}",
            lo, hi
        )));
    }
    Ok(())
}

fn check_sum_equality(dim: usize, total: f64, regularization: f64) -> Result<(), ConfigError> {
    if !total.is_finite() || total < 0.0 {
        return Err(ConfigError::invalid("sum_equality.total", total, "finite and >= 0"));
    }
    if !regularization.is_finite() || regularization < 0.0 {
        return Err(ConfigError::invalid(
            "sum_equality.regularization",
            regularization,
            "finite and >= 0",
        ));
    }
    if dim == 0 && total > 0.0 {
        return Err(ConfigError::InfeasibleRegion(format!(
            "cannot distribute total {} over zero coordinates",
            total
        )));
    }
    Ok(())
}

fn check_sum_inequality(dim: usize, capacity: f64, lower: &[f64]) -> Result<(), ConfigError> {
    if capacity.is_nan() {
        return Err(ConfigError::invalid("sum_inequality.capacity", capacity, "a number"));
    }
    if lower.len() != dim {
        return Err(ConfigError::InfeasibleRegion(format!(
            "{} lower bounds for {} coordinates",
            lower.len(),
            dim
        )));
    }
    if let Some(bad) = lower.iter().find(|l| !l.is_finite()) {
        return Err(ConfigError::invalid("sum_inequality.lower", *bad, "finite"));
    }
    let floor: f64 = lower.iter().sum();
    if floor > capacity {
        return Err(ConfigError::InfeasibleRegion(format!(
            "lower bounds sum to {} which exceeds capacity {}",
            floor, capacity
        )));
    }
    Ok(())
}

fn clip_box_unchecked(x: &mut [f64], lo: f64, hi: f64) {
    for v in x.iter_mut() {
        *v = v.clamp(lo, hi);
    }
}

fn sum_equality_unchecked(x: &mut [f64], total: f64, regularization: f64) {
    if regularization > 0.0 {
        let shrink = 1.0 / (1.0 + regularization);
        for v in x.iter_mut() {
            *v *= shrink;
        }
    }
    simplex_in_place(x, total);
    debug_assert!(
        x.is_empty() || (x.iter().sum::<f64>() - total).abs() <= FEASIBILITY_TOL * total.max(1.0),
        "simplex projection missed its total"
    );
}

fn sum_inequality_unchecked(x: &mut [f64], capacity: f64, lower: &[f64]) {
    let slack = capacity - lower.iter().sum::<f64>();

    // Shift so the floor is zero: { z >= 0, sum(z) <= slack }.
    let mut z: Vec<f64> = x.iter().zip(lower).map(|(v, l)| v - l).collect();
    let positive: f64 = z.iter().map(|v| v.max(0.0)).sum();
    if positive <= slack {
        for v in z.iter_mut() {
            *v = v.max(0.0);
        }
    } else {
        simplex_in_place(&mut z, slack);
    }

    for ((v, zi), l) in x.iter_mut().zip(z).zip(lower) {
        *v = zi + l;
    }
    debug_assert!(
        x.iter().sum::<f64>() <= capacity + FEASIBILITY_TOL * capacity.abs().max(1.0),
        "capacity projection exceeded capacity"
    );
}

/// Euclidean projection onto `{ y >= 0, sum(y) == total }` by the
/// sort-and-threshold method.
fn simplex_in_place(x: &mut [f64], total: f64) {
    if x.is_empty() {
        return;
    }
    if total <= 0.0 {
        x.iter_mut().for_each(|v| *v = 0.0);
        return;
    }

    let mut sorted = x.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));

    let mut cumulative = 0.0;
    let mut theta = 0.0;
    for (j, &u) in sorted.iter().enumerate() {
        cumulative += u;
        let candidate = (cumulative - total) / (j + 1) as f64;
        if u - candidate > 0.0 {
            theta = candidate;
        }
    }

    for v in x.iter_mut() {
        *v = (*v - theta).max(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_clip_box() {
        let mut x = vec![-1.0, 0.5, 3.0];
        clip_box(&mut x, 0.0, 1.0).unwrap();
        assert_eq!(x, vec![0.0, 0.5, 1.0]);
        assert!(clip_box(&mut x, 2.0, 1.0).is_err());
    }

    #[test]
    fn test_simplex_known_values() {
        let mut x = vec![0.5, 0.5, 0.5];
        sum_equality(&mut x, 1.0, 0.0).unwrap();
        for v in &x {
            assert!(approx(*v, 1.0 / 3.0));
        }

        // One dominant coordinate takes everything.
        let mut x = vec![5.0, 0.0, -1.0];
        sum_equality(&mut x, 2.0, 0.0).unwrap();
        assert_eq!(x, vec![2.0, 0.0, 0.0]);

        let mut x = vec![3.0, 1.0];
        sum_equality(&mut x, 2.0, 0.0).unwrap();
        assert!(approx(x[0], 2.0));
        assert!(approx(x[1], 0.0));
    }

    #[test]
    fn test_simplex_zero_total() {
        let mut x = vec![1.0, 2.0];
        sum_equality(&mut x, 0.0, 0.0).unwrap();
        assert_eq!(x, vec![0.0, 0.0]);
        assert!(sum_equality(&mut x, -1.0, 0.0).is_err());
        assert!(sum_equality(&mut [], 1.0, 0.0).is_err());
    }

    #[test]
    fn test_regularized_simplex_spreads_mass() {
        let mut exact = vec![4.0, 1.0];
        sum_equality(&mut exact, 2.0, 0.0).unwrap();
        let mut reg = vec![4.0, 1.0];
        sum_equality(&mut reg, 2.0, 1.0).unwrap();

        assert!(approx(reg.iter().sum::<f64>(), 2.0));
        assert!(reg[1] > exact[1]);
        assert!(reg[0] < exact[0]);
    }

    #[test]
    fn test_sum_inequality_inactive_capacity() {
        let mut x = vec![1.0, -2.0, 3.0];
        sum_inequality(&mut x, 10.0, &[0.0, 0.5, 0.0]).unwrap();
        assert_eq!(x, vec![1.0, 0.5, 3.0]);
    }

    #[test]
    fn test_sum_inequality_active_capacity() {
        let mut x = vec![6.0, 6.0];
        sum_inequality(&mut x, 10.0, &[1.0, 1.0]).unwrap();
        assert!(approx(x[0], 5.0));
        assert!(approx(x[1], 5.0));

        let mut x = vec![9.0, 1.0, 4.0];
        sum_inequality(&mut x, 6.0, &[1.0, 1.0, 1.0]).unwrap();
        assert!(x.iter().sum::<f64>() <= 6.0 + 1e-9);
        assert!(x.iter().all(|&v| v >= 1.0 - 1e-12));
        assert!(x[0] > x[2]);
    }

    #[test]
    fn test_sum_inequality_infeasible() {
        let mut x = vec![0.0, 0.0];
        let err = sum_inequality(&mut x, 1.0, &[0.75, 0.75]).unwrap_err();
        assert!(matches!(err, ConfigError::InfeasibleRegion(_)));
        assert!(Projection::capacity(1.0, vec![0.75, 0.75]).is_err());
        assert!(sum_inequality(&mut x, 1.0, &[0.0]).is_err());
    }

    #[test]
    fn test_clamp_change() {
        assert_eq!(clamp_change(1.0, 5.0, 0.5), 1.5);
        assert_eq!(clamp_change(1.0, -5.0, 0.5), 0.5);
        assert_eq!(clamp_change(1.0, 1.2, 0.5), 1.2);
        assert_eq!(clamp_change(1.0, 5.0, 0.0), 5.0);
    }

    #[test]
    fn test_apply_subset_leaves_other_coordinates() {
        let mut x = vec![7.0, 3.0, -4.0, 3.0];
        let p = Projection::simplex(1.0, 0.0).unwrap();
        p.apply_subset(&mut x, &[1, 3]);
        assert_eq!(x[0], 7.0);
        assert_eq!(x[2], -4.0);
        assert!(approx(x[1], 0.5));
        assert!(approx(x[3], 0.5));
    }

    #[test]
    fn test_reprojecting_feasible_point_is_noop() {
        let p = Projection::capacity(5.0, vec![0.0, 1.0]).unwrap();
        let mut x = vec![2.0, 2.5];
        assert!(p.contains(&x, 1e-12));
        p.apply(&mut x);
        assert_eq!(x, vec![2.0, 2.5]);

        let p = Projection::simplex(1.0, 0.0).unwrap();
        let mut x = vec![0.25, 0.75];
        p.apply(&mut x);
        assert!(approx(x[0], 0.25) && approx(x[1], 0.75));
        assert!(p.is_exact());
        assert!(!Projection::simplex(1.0, 0.1).unwrap().is_exact());
    }

    #[test]
    fn test_projection_roundtrips_through_json() {
        let p = Projection::capacity(3.0, vec![0.5, 0.5]).unwrap();
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains("\"kind\":\"sum_inequality\""));
        let back: Projection = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
        assert!(back.validate(2).is_ok());
        assert!(back.validate(3).is_err());
    }
}
