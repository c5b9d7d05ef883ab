//! Rescaling of joined numeric variables.

use anyhow::{bail, Error, Result};
use itertools::{Itertools, MinMaxResult};
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Distribution};
use std::str::FromStr;

/// Rescales one column. NaN entries stay NaN.
pub trait Normalizer {
    /// Return the rescaled values, same length as `values`.
    fn normalize(&self, values: &[f64]) -> Vec<f64>;
}

/// Built in rescaling strategies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalize {
    /// Map onto [0, 1]. A constant column maps to 0.5.
    #[default]
    MinMax,
    /// Subtract the mean, divide by the sample standard deviation.
    ZScore,
    /// Divide by the maximum, if it is positive.
    ZeroToMax,
}

impl Normalize {
    /// Offset and divisor such that `(x - offset) / divisor` is the rescaled value.
    /// `None` means every finite value maps to the constant returned as offset.
    fn affine(self, finite: &[f64]) -> Option<(f64, f64)> {
        match self {
            Normalize::MinMax => match finite.iter().copied().minmax() {
                MinMaxResult::NoElements => Some((0.0, 1.0)),
                MinMaxResult::OneElement(_) => None,
                MinMaxResult::MinMax(min_val, max_val) => {
                    if max_val == min_val {
                        None
                    } else {
                        Some((min_val, max_val - min_val))
                    }
                }
            },
            Normalize::ZScore => {
                let data = Data::new(finite.to_vec());
                match (data.mean(), data.std_dev()) {
                    (Some(mean), Some(sd)) if sd.is_finite() && sd > 0.0 => Some((mean, sd)),
                    (Some(mean), _) => Some((mean, f64::INFINITY)),
                    (None, _) => Some((0.0, 1.0)),
                }
            }
            Normalize::ZeroToMax => {
                let mut max_val = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                if max_val <= 0.0 {
                    max_val = 1.0;
                }
                Some((0.0, max_val))
            }
        }
    }
}

impl Normalizer for Normalize {
    fn normalize(&self, values: &[f64]) -> Vec<f64> {
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        match self.affine(&finite) {
            Some((offset, den)) => values.iter().map(|&x| (x - offset) / den).collect(),
            None => values
                .iter()
                .map(|&x| if x.is_nan() { x } else { 0.5 })
                .collect(),
        }
    }
}

impl FromStr for Normalize {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "min_max" => Normalize::MinMax,
            "z_score" => Normalize::ZScore,
            "zero_to_max" => Normalize::ZeroToMax,
            _ => bail!("unknown normalization '{s}', expected min_max, z_score or zero_to_max"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_min_max() {
        let out = Normalize::MinMax.normalize(&[2.0, f64::NAN, 4.0, 6.0]);
        assert_eq!(out[0], 0.0);
        assert!(out[1].is_nan());
        assert_eq!(out[2], 0.5);
        assert_eq!(out[3], 1.0);
    }

    #[test]
    fn test_min_max_constant() {
        let out = Normalize::MinMax.normalize(&[3.0, 3.0, f64::NAN]);
        assert_eq!(&out[..2], &[0.5, 0.5]);
        assert!(out[2].is_nan());
        assert_eq!(Normalize::MinMax.normalize(&[7.0]), vec![0.5]);
        assert!(Normalize::MinMax.normalize(&[f64::NAN])[0].is_nan());
    }

    #[test]
    fn test_z_score() {
        let out = Normalize::ZScore.normalize(&[1.0, 2.0, 3.0]);
        assert_eq!(out, vec![-1.0, 0.0, 1.0]);
        assert_eq!(Normalize::ZScore.normalize(&[4.0, 4.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_zero_to_max() {
        assert_eq!(
            Normalize::ZeroToMax.normalize(&[1.0, 2.0, 4.0]),
            vec![0.25, 0.5, 1.0]
        );
        assert_eq!(Normalize::ZeroToMax.normalize(&[-1.0, 0.0]), vec![-1.0, 0.0]);
    }

    #[test]
    fn test_from_str() {
        assert_eq!("z_score".parse::<Normalize>().unwrap(), Normalize::ZScore);
        assert!("quantile".parse::<Normalize>().is_err());
    }
}
