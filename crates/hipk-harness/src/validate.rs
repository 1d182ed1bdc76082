//! Elementwise comparison of device output against a host reference.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::{HarnessError, Result};

/// Absolute-or-relative tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerance {
    #[serde(serialize_with = "crate::config::short_f32")]
    pub abs: f32,
    #[serde(serialize_with = "crate::config::short_f32")]
    pub rel: f32,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self { abs: 1e-6, rel: 1e-5 }
    }
}

impl Tolerance {
    pub const fn new(abs: f32, rel: f32) -> Self {
        Self { abs, rel }
    }
}

/// `true` when `|a − b| ≤ abs` or `|a − b| ≤ rel · max(|a|, |b|)`.
///
/// NaN never compares equal; equal infinities do.
pub fn almost_equal(a: f32, b: f32, tol: Tolerance) -> bool {
    if a == b {
        return true;
    }
    let diff = (a - b).abs();
    if diff.is_nan() {
        return false;
    }
    diff <= tol.abs || diff <= tol.rel * a.abs().max(b.abs())
}

/// First element where device output and reference disagree.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("mismatch at index {index}: device {produced} vs reference {expected} (diff {abs_diff})")]
pub struct Mismatch {
    pub index: usize,
    pub produced: f32,
    pub expected: f32,
    pub abs_diff: f32,
}

/// Verdict of one comparison pass.
#[derive(Debug, Clone, Copy, PartialEq)]
#[must_use]
pub enum ValidationOutcome {
    Pass,
    Fail(Mismatch),
}

impl ValidationOutcome {
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    pub fn mismatch(&self) -> Option<&Mismatch> {
        match self {
            Self::Pass => None,
            Self::Fail(m) => Some(m),
        }
    }

    /// Escalate a `Fail` into an error.
    pub fn into_result(self) -> std::result::Result<(), Mismatch> {
        match self {
            Self::Pass => Ok(()),
            Self::Fail(m) => Err(m),
        }
    }
}

/// Compare `produced` against `expected`, stopping at the first mismatch.
pub fn validate(produced: &[f32], expected: &[f32], tol: Tolerance) -> Result<ValidationOutcome> {
    if produced.len() != expected.len() {
        return Err(HarnessError::InvalidArgument(format!(
            "cannot compare {} device values against {} reference values",
            produced.len(),
            expected.len()
        )));
    }
    for (index, (&p, &e)) in produced.iter().zip(expected).enumerate() {
        if !almost_equal(p, e, tol) {
            let mismatch = Mismatch { index, produced: p, expected: e, abs_diff: (p - e).abs() };
            warn!(%mismatch, "device output does not match reference");
            return Ok(ValidationOutcome::Fail(mismatch));
        }
    }
    debug!(elements = produced.len(), "device output matches reference");
    Ok(ValidationOutcome::Pass)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_values_pass() {
        let out = validate(&[1.0, 2.0], &[1.0, 2.0], Tolerance::default()).unwrap();
        assert!(out.is_pass());
    }

    #[test]
    fn relative_tolerance_scales_with_magnitude() {
        let tol = Tolerance::new(0.0, 1e-3);
        assert!(almost_equal(1000.0, 1000.5, tol));
        assert!(!almost_equal(1.0, 1.5, tol));
    }

    #[test]
    fn absolute_tolerance_covers_values_near_zero() {
        let tol = Tolerance::new(1e-6, 0.0);
        assert!(almost_equal(0.0, 5e-7, tol));
        assert!(!almost_equal(0.0, 5e-6, tol));
    }

    #[test]
    fn nan_never_matches() {
        assert!(!almost_equal(f32::NAN, f32::NAN, Tolerance::new(1.0, 1.0)));
        assert!(!almost_equal(1.0, f32::NAN, Tolerance::new(1.0, 1.0)));
        assert!(almost_equal(f32::INFINITY, f32::INFINITY, Tolerance::default()));
    }

    #[test]
    fn reports_first_mismatch_only() {
        let produced = [1.0, 9.0, 7.0];
        let expected = [1.0, 2.0, 3.0];
        let out = validate(&produced, &expected, Tolerance::default()).unwrap();
        let m = out.mismatch().copied().unwrap();
        assert_eq!(m.index, 1);
        assert_eq!(m.produced, 9.0);
        assert_eq!(m.expected, 2.0);
        assert_eq!(m.abs_diff, 7.0);
    }

    #[test]
    fn length_mismatch_is_an_error() {
        assert!(validate(&[1.0], &[1.0, 2.0], Tolerance::default()).is_err());
    }

    #[test]
    fn fail_escalates_into_error() {
        let out = validate(&[0.0], &[1.0], Tolerance::default()).unwrap();
        let err = out.into_result().unwrap_err();
        assert!(err.to_string().contains("index 0"));
    }
}
