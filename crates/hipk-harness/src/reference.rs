//! Host reference computations used as oracles.

use serde::{Deserialize, Serialize};

/// Where the scale factor enters an abs-max reduction.
///
/// The reference kernel receives a scale buffer, but whether it multiplies
/// before reducing is a property of the code object. The convention is always
/// passed explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScaleConvention {
    /// `max |x|`; the scale does not affect the reduced value.
    #[default]
    Unscaled,
    /// `max |x · scale|`.
    PreScaled,
}

impl std::str::FromStr for ScaleConvention {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unscaled" => Ok(Self::Unscaled),
            "pre-scaled" | "prescaled" | "scaled" => Ok(Self::PreScaled),
            other => Err(format!("unknown scale convention {other:?}")),
        }
    }
}

/// Sequential abs-max over `input` in element order, starting from `0.0`.
///
/// NaN elements are skipped, matching `fmaxf`.
pub fn amax_reference(input: &[f32], scale: f32, convention: ScaleConvention) -> f32 {
    let factor = match convention {
        ScaleConvention::Unscaled => 1.0,
        ScaleConvention::PreScaled => scale,
    };
    input.iter().fold(0.0f32, |acc, &x| acc.max((x * factor).abs()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_input_unscaled() {
        let input = vec![0.8f32; 1024];
        assert_eq!(amax_reference(&input, 0.5, ScaleConvention::Unscaled), 0.8);
    }

    #[test]
    fn constant_input_prescaled() {
        let input = vec![0.8f32; 1024];
        let got = amax_reference(&input, 0.5, ScaleConvention::PreScaled);
        assert!((got - 0.4).abs() < 1e-7);
    }

    #[test]
    fn negative_values_use_magnitude() {
        let input = [0.1f32, -3.0, 2.5];
        assert_eq!(amax_reference(&input, 1.0, ScaleConvention::Unscaled), 3.0);
    }

    #[test]
    fn empty_input_is_zero() {
        assert_eq!(amax_reference(&[], 2.0, ScaleConvention::PreScaled), 0.0);
    }

    #[test]
    fn nan_is_ignored() {
        let input = [f32::NAN, 1.0, -2.0];
        assert_eq!(amax_reference(&input, 1.0, ScaleConvention::Unscaled), 2.0);
    }

    #[test]
    fn parses_convention_names() {
        assert_eq!("unscaled".parse::<ScaleConvention>().unwrap(), ScaleConvention::Unscaled);
        assert_eq!("pre-scaled".parse::<ScaleConvention>().unwrap(), ScaleConvention::PreScaled);
        assert!("sideways".parse::<ScaleConvention>().is_err());
    }
}
