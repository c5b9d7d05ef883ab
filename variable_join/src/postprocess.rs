//! Smoothing and normalization of the columns produced for one variable class.

use crate::errors::JoinError;
use crate::progress::{smoothing_message, ProgressReporter};
use crate::request::VariableClass;
use crate::scaling::Normalizer;
use crate::smoothing::Smoother;
use anyhow::anyhow;
use log::debug;
use spatial_object::Column;

/// Post processing steps enabled for a join.
#[derive(Clone, Copy, Default)]
pub struct PostProcessor<'a> {
    /// Smoother and its span, if smoothing is enabled.
    pub smoother: Option<(&'a dyn Smoother, f64)>,
    /// Normalizer, if normalization is enabled.
    pub normalizer: Option<&'a dyn Normalizer>,
    /// Receives a message per smoothed column.
    pub reporter: Option<&'a dyn ProgressReporter>,
}

impl PostProcessor<'_> {
    /// Smooth, then normalize, the new `columns` of `class` in place.
    ///
    /// Categorical columns are left alone. Feature columns are smoothed but
    /// never normalized.
    pub fn apply(
        &self,
        class: VariableClass,
        columns: &mut [(String, Column)],
        x: &[f64],
        y: &[f64],
    ) -> Result<(), JoinError> {
        if let Some((smoother, span)) = self.smoother {
            for (name, column) in columns.iter_mut() {
                let Column::Numeric(values) = column else {
                    debug!("not smoothing categorical variable '{name}'");
                    continue;
                };
                if let Some(reporter) = self.reporter {
                    reporter.report(&smoothing_message(name));
                }
                let smoothed = smoother
                    .smooth(x, y, values, span)
                    .map_err(|source| JoinError::Smoothing {
                        variable: name.clone(),
                        source,
                    })?;
                if smoothed.len() != values.len() {
                    return Err(JoinError::Smoothing {
                        variable: name.clone(),
                        source: anyhow!(
                            "smoother returned {} values for {} spots",
                            smoothed.len(),
                            values.len()
                        ),
                    });
                }
                *values = smoothed;
            }
        }

        if class == VariableClass::Features {
            return Ok(());
        }
        if let Some(normalizer) = self.normalizer {
            for (_, column) in columns.iter_mut() {
                if let Column::Numeric(values) = column {
                    *values = normalizer.normalize(values);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scaling::Normalize;
    use crate::testing::Recorder;
    use pretty_assertions::assert_eq;

    /// Replaces every value by the column mean.
    struct Flatten;

    impl Smoother for Flatten {
        fn smooth(
            &self,
            _x: &[f64],
            _y: &[f64],
            values: &[f64],
            _span: f64,
        ) -> anyhow::Result<Vec<f64>> {
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            Ok(vec![mean; values.len()])
        }
    }

    struct Truncate;

    impl Smoother for Truncate {
        fn smooth(
            &self,
            _x: &[f64],
            _y: &[f64],
            values: &[f64],
            _span: f64,
        ) -> anyhow::Result<Vec<f64>> {
            Ok(values[1..].to_vec())
        }
    }

    fn columns() -> Vec<(String, Column)> {
        vec![
            ("nCount".into(), vec![1.0, 3.0].into()),
            ("cluster".into(), Column::Categorical(vec![Some("a".into()), None])),
        ]
    }

    const XY: [f64; 2] = [0.0, 1.0];

    #[test]
    fn test_smooth_then_normalize() {
        let recorder = Recorder::default();
        let flatten: &dyn Smoother = &Flatten;
        let post = PostProcessor {
            smoother: Some((flatten, 0.5)),
            normalizer: Some(&Normalize::MinMax),
            reporter: Some(&recorder),
        };
        let mut cols = columns();
        post.apply(VariableClass::Genes, &mut cols, &XY, &XY).unwrap();
        // Smoothing made the column constant, min-max maps it to 0.5.
        assert_eq!(cols[0].1, Column::Numeric(vec![0.5, 0.5]));
        assert_eq!(cols[1], columns()[1]);
        assert_eq!(recorder.messages(), vec!["Smoothing variable 'nCount'."]);
    }

    #[test]
    fn test_features_are_not_normalized() {
        let post = PostProcessor {
            normalizer: Some(&Normalize::MinMax),
            ..PostProcessor::default()
        };
        let mut cols = columns();
        post.apply(VariableClass::Features, &mut cols, &XY, &XY).unwrap();
        assert_eq!(cols, columns());

        post.apply(VariableClass::GeneSets, &mut cols, &XY, &XY).unwrap();
        assert_eq!(cols[0].1, Column::Numeric(vec![0.0, 1.0]));
    }

    #[test]
    fn test_smoother_shape_is_checked() {
        let truncate: &dyn Smoother = &Truncate;
        let post = PostProcessor {
            smoother: Some((truncate, 0.5)),
            ..PostProcessor::default()
        };
        let err = post
            .apply(VariableClass::Genes, &mut columns(), &XY, &XY)
            .unwrap_err();
        assert!(matches!(err, JoinError::Smoothing { variable, .. } if variable == "nCount"));
    }
}
