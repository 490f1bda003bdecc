//! Small numeric helpers used throughout the pipeline.

use crate::error::{Error, Result};

/// Epsilon for zero tests.
pub const EPS_SMALL: f64 = 1e-30;
/// Epsilon for equality tests.
pub const EPS_MEDIUM: f64 = 1e-6;

/// Returns `true` if `x` is closer to zero than [`EPS_SMALL`].
#[must_use]
pub fn is_zero(x: f64) -> bool {
    x.abs() < EPS_SMALL
}

/// Returns `true` if `lhs` and `rhs` agree to within [`EPS_MEDIUM`],
/// relative to the larger magnitude of the two.
#[must_use]
pub fn is_equal(lhs: f64, rhs: f64) -> bool {
    let scale = lhs.abs().max(rhs.abs());
    if scale < EPS_SMALL {
        return true;
    }
    (lhs - rhs).abs() < EPS_MEDIUM * scale
}

/// Returns `true` if `lhs` exceeds `rhs` beyond the equality tolerance.
#[must_use]
pub fn is_greater(lhs: f64, rhs: f64) -> bool {
    lhs > rhs && !is_equal(lhs, rhs)
}

/// Returns `true` if `lhs` is below `rhs` beyond the equality tolerance.
#[must_use]
pub fn is_less(lhs: f64, rhs: f64) -> bool {
    lhs < rhs && !is_equal(lhs, rhs)
}

/// Returns `true` if `lhs` exceeds `rhs` or equals it within tolerance.
#[must_use]
pub fn is_greater_or_equal(lhs: f64, rhs: f64) -> bool {
    lhs > rhs || is_equal(lhs, rhs)
}

/// Returns `true` if `lhs` is below `rhs` or equals it within tolerance.
#[must_use]
pub fn is_less_or_equal(lhs: f64, rhs: f64) -> bool {
    lhs < rhs || is_equal(lhs, rhs)
}

/// Division that falls back to `default` when the denominator is smaller in
/// magnitude than [`EPS_SMALL`].
#[must_use]
pub fn safe_div(num: f64, denom: f64, default: f64) -> f64 {
    if denom.abs() < EPS_SMALL {
        default
    } else {
        num / denom
    }
}

/// Metal mass fraction of a reservoir, clamped to `[0, 1]`. A reservoir
/// with non-positive mass has no defined metallicity and yields `0`.
#[must_use]
pub fn metallicity(mass: f64, metals: f64) -> f64 {
    if mass > 0.0 {
        (metals / mass).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Gate against NaN propagation. Infinities pass (they are tamed by the
/// clamping rules downstream); a NaN is unrecoverable for the current tree.
pub fn check_finite(value: f64, what: &str) -> Result<f64> {
    if value.is_nan() {
        Err(Error::Numeric(format!("{what} is NaN")))
    } else {
        Ok(value)
    }
}
