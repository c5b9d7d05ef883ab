//! What to join and how.
#![allow(missing_docs)]

use crate::errors::JoinError;
use crate::scaling::Normalize;
use anyhow::{Context, Result};
use log::warn;
use parameters_toml::Parameters;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Kind of variable a name refers to. Declaration order is processing order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableClass {
    Features,
    Genes,
    GeneSets,
}

impl VariableClass {
    pub const ALL: [VariableClass; 3] = [
        VariableClass::Features,
        VariableClass::Genes,
        VariableClass::GeneSets,
    ];

    /// Key of this class in a request bundle.
    pub fn key(self) -> &'static str {
        match self {
            VariableClass::Features => "features",
            VariableClass::Genes => "genes",
            VariableClass::GeneSets => "gene_sets",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        VariableClass::ALL.into_iter().find(|class| class.key() == key)
    }
}

impl fmt::Display for VariableClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VariableClass::Features => "features",
            VariableClass::Genes => "genes",
            VariableClass::GeneSets => "gene sets",
        })
    }
}

fn owned<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Vec<String> {
    names.into_iter().map(Into::into).collect()
}

/// Several classes requested at once.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Bundle {
    pub features: Option<Vec<String>>,
    pub genes: Option<Vec<String>>,
    pub gene_sets: Option<Vec<String>>,
}

impl Bundle {
    /// Build a bundle from `key -> names` pairs. Unknown keys are ignored
    /// with a warning, a repeated key keeps its last value.
    pub fn from_pairs<K, I, S>(pairs: impl IntoIterator<Item = (K, I)>) -> Self
    where
        K: AsRef<str>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut bundle = Bundle::default();
        for (key, names) in pairs {
            let key = key.as_ref();
            match VariableClass::from_key(key) {
                Some(class) => *bundle.slot(class) = Some(owned(names)),
                None => warn!("ignoring unknown variable class '{key}' in the request"),
            }
        }
        bundle
    }

    fn slot(&mut self, class: VariableClass) -> &mut Option<Vec<String>> {
        match class {
            VariableClass::Features => &mut self.features,
            VariableClass::Genes => &mut self.genes,
            VariableClass::GeneSets => &mut self.gene_sets,
        }
    }

    fn get(&self, class: VariableClass) -> Option<&[String]> {
        match class {
            VariableClass::Features => self.features.as_deref(),
            VariableClass::Genes => self.genes.as_deref(),
            VariableClass::GeneSets => self.gene_sets.as_deref(),
        }
    }
}

/// The variables to join onto a coordinates table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VariableRequest {
    Features(Vec<String>),
    Genes(Vec<String>),
    GeneSets(Vec<String>),
    Bundle(Bundle),
}

impl VariableRequest {
    pub fn features<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        VariableRequest::Features(owned(names))
    }

    pub fn genes<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        VariableRequest::Genes(owned(names))
    }

    pub fn gene_sets<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        VariableRequest::GeneSets(owned(names))
    }

    /// Requested classes in processing order (features, genes, gene sets).
    pub fn classes(&self) -> Result<Vec<(VariableClass, &[String])>, JoinError> {
        match self {
            VariableRequest::Features(names) => {
                Ok(vec![(VariableClass::Features, names.as_slice())])
            }
            VariableRequest::Genes(names) => {
                Ok(vec![(VariableClass::Genes, names.as_slice())])
            }
            VariableRequest::GeneSets(names) => {
                Ok(vec![(VariableClass::GeneSets, names.as_slice())])
            }
            VariableRequest::Bundle(bundle) => {
                let classes: Vec<_> = VariableClass::ALL
                    .into_iter()
                    .filter_map(|class| bundle.get(class).map(|names| (class, names)))
                    .collect();
                if classes.is_empty() {
                    return Err(JoinError::InvalidRequest(format!(
                        "the request names none of the variable classes {}, {} or {}",
                        VariableClass::Features.key(),
                        VariableClass::Genes.key(),
                        VariableClass::GeneSets.key()
                    )));
                }
                Ok(classes)
            }
        }
    }
}

impl From<Bundle> for VariableRequest {
    fn from(bundle: Bundle) -> Self {
        VariableRequest::Bundle(bundle)
    }
}

/// Knobs of a join.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JoinOptions {
    /// Collapse requested genes into one `mean_genes` column.
    pub average_genes: bool,
    /// Gene set scoring method.
    pub method_gs: String,
    pub smooth: bool,
    /// Fraction of spots forming the smoothing neighborhood, in (0, inf).
    pub smooth_span: f64,
    /// Rescale new gene and gene set columns. Feature columns are never rescaled.
    pub normalize: bool,
    pub normalization: Normalize,
    /// Emit progress messages.
    pub verbose: bool,
    /// Expression matrix to read instead of the sample's active one.
    pub mtr_name: Option<String>,
}

impl Default for JoinOptions {
    fn default() -> Self {
        JoinOptions {
            average_genes: false,
            method_gs: "mean".to_string(),
            smooth: false,
            smooth_span: 0.02,
            normalize: true,
            normalization: Normalize::MinMax,
            verbose: true,
            mtr_name: None,
        }
    }
}

impl JoinOptions {
    /// Options taken from parameters.toml.
    pub fn from_parameters() -> Result<Self> {
        Ok(JoinOptions {
            average_genes: *parameters_toml::average_genes()?,
            method_gs: parameters_toml::method_gs()?.to_string(),
            smooth: *parameters_toml::smooth()?,
            smooth_span: *parameters_toml::smooth_span()?,
            normalize: *parameters_toml::normalize()?,
            normalization: parameters_toml::normalization()?.parse()?,
            verbose: *parameters_toml::verbose()?,
            mtr_name: None,
        })
    }

    /// Options taken from the parameters file at `path`.
    pub fn from_parameters_file(path: &Path) -> Result<Self> {
        let parameters = parameters_toml::load_parameters(path)?;
        JoinOptions::try_from(&parameters).with_context(|| path.display().to_string())
    }

    pub fn validate(&self) -> Result<(), JoinError> {
        if !(self.smooth_span.is_finite() && self.smooth_span > 0.0) {
            return Err(JoinError::InvalidRequest(format!(
                "smooth_span must be a positive number, got {}",
                self.smooth_span
            )));
        }
        Ok(())
    }
}

impl TryFrom<&Parameters> for JoinOptions {
    type Error = anyhow::Error;

    fn try_from(parameters: &Parameters) -> Result<Self> {
        Ok(JoinOptions {
            average_genes: parameters.average_genes,
            method_gs: parameters.method_gs.to_string(),
            smooth: parameters.smooth,
            smooth_span: parameters.smooth_span,
            normalize: parameters.normalize,
            normalization: parameters.normalization.parse()?,
            verbose: parameters.verbose,
            mtr_name: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn parameters_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{contents}").unwrap();
        file
    }

    #[test]
    fn test_bundle_from_pairs() {
        let bundle = Bundle::from_pairs([
            ("gene_sets", vec!["HM_HYPOXIA"]),
            ("clusters", vec!["seurat"]),
            ("genes", vec!["Gfap", "Mbp"]),
        ]);
        assert_eq!(bundle.features, None);
        assert_eq!(bundle.genes, Some(vec!["Gfap".to_string(), "Mbp".to_string()]));

        let request = VariableRequest::from(bundle);
        let classes: Vec<_> = request
            .classes()
            .unwrap()
            .into_iter()
            .map(|(class, _)| class)
            .collect();
        assert_eq!(classes, vec![VariableClass::Genes, VariableClass::GeneSets]);
    }

    #[test]
    fn test_empty_bundle() {
        let request = VariableRequest::from(Bundle::from_pairs([("clusters", vec!["seurat"])]));
        assert!(matches!(request.classes(), Err(JoinError::InvalidRequest(_))));
    }

    #[test]
    fn test_class_keys() {
        for class in VariableClass::ALL {
            assert_eq!(VariableClass::from_key(class.key()), Some(class));
        }
        assert_eq!(VariableClass::GeneSets.to_string(), "gene sets");
    }

    #[test]
    fn test_options_validate() {
        assert!(JoinOptions::default().validate().is_ok());
        for span in [0.0, -0.1, f64::NAN, f64::INFINITY] {
            let options = JoinOptions {
                smooth_span: span,
                ..JoinOptions::default()
            };
            assert!(matches!(options.validate(), Err(JoinError::InvalidRequest(_))));
        }
    }

    #[test]
    fn test_options_deserialize() {
        let options: JoinOptions =
            toml::from_str("method_gs = \"ssgsea\"\nnormalization = \"z_score\"").unwrap();
        assert_eq!(options.method_gs, "ssgsea");
        assert_eq!(options.normalization, Normalize::ZScore);
        assert!(options.normalize);
    }

    #[test]
    fn test_options_from_parameters_file() {
        let file = parameters_file(
            "method_gs = \"gsva\"\nsmooth = true\nnormalization = \"zero_to_max\"",
        );
        let options = JoinOptions::from_parameters_file(file.path()).unwrap();
        assert_eq!(
            options,
            JoinOptions {
                method_gs: "gsva".to_string(),
                smooth: true,
                normalization: Normalize::ZeroToMax,
                ..JoinOptions::default()
            }
        );
    }

    #[test]
    fn test_bad_normalization_in_parameters_file() {
        let file = parameters_file("normalization = \"log\"");
        let err = JoinOptions::from_parameters_file(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("unknown normalization 'log'"));
    }

    #[test]
    fn test_options_from_global_parameters() {
        // The only test of this crate reading the process wide parameters.
        let file = parameters_file("average_genes = true\nnormalization = \"z_score\"");
        std::env::set_var(parameters_toml::PARAMETERS_ENV, file.path());
        let options = JoinOptions::from_parameters().unwrap();
        assert!(options.average_genes);
        assert_eq!(options.normalization, Normalize::ZScore);
        assert_eq!(options.method_gs, "mean");
        assert_eq!(options.smooth_span, 0.02);
    }
}
