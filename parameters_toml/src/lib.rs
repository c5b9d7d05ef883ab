//! parameters_toml
#![deny(missing_docs)]

use anyhow::{Context, Result};
use log::warn;
use serde::Deserialize;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Environment variable pointing at an explicit parameters.toml.
pub const PARAMETERS_ENV: &str = "SPATIAL_JOIN_PARAMETERS";

/// Contents of a parameters.toml. Keys left out take their default value.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Parameters {
    /// Collapse a multi-gene request into a single `mean_genes` column.
    pub average_genes: bool,
    /// Gene set scoring method, `mean` or a registered enrichment method.
    pub method_gs: Cow<'static, str>,
    /// Spatially smooth joined variables.
    pub smooth: bool,
    /// Fraction of spots used as the neighborhood of the smoother.
    pub smooth_span: f64,
    /// Rescale joined gene and gene set variables.
    pub normalize: bool,
    /// Normalization strategy, one of min_max, z_score, zero_to_max.
    pub normalization: Cow<'static, str>,
    /// Report gene set progress.
    pub verbose: bool,
}

const DEFAULT_PARAMETERS: Parameters = Parameters {
    average_genes: false,
    method_gs: Cow::Borrowed("mean"),
    smooth: false,
    smooth_span: 0.02,
    normalize: true,
    normalization: Cow::Borrowed("min_max"),
    verbose: true,
};

impl Default for Parameters {
    fn default() -> Self {
        DEFAULT_PARAMETERS
    }
}

static PARAMETERS: OnceLock<Result<Parameters>> = OnceLock::new();

/// Where parameters.toml is looked up: `$SPATIAL_JOIN_PARAMETERS`, else next
/// to the running executable.
fn parameters_path() -> Result<PathBuf> {
    if let Some(path) = std::env::var_os(PARAMETERS_ENV) {
        return Ok(PathBuf::from(path));
    }
    Ok(std::env::current_exe()
        .context("Unable to locate the running executable")?
        .with_file_name("parameters.toml"))
}

/// Read a parameters file. A missing file yields the defaults.
pub fn load_parameters(path: &Path) -> Result<Parameters> {
    if !path.exists() {
        warn!(
            "could not find parameters.toml at {}, falling back to defaults",
            path.display()
        );
        return Ok(DEFAULT_PARAMETERS);
    }
    let s = std::fs::read_to_string(path).with_context(|| path.display().to_string())?;
    toml::from_str(&s).with_context(|| path.display().to_string())
}

/// Return a reference to the global parameters.
/// The parameters may need to be loaded; if loading fails, return Err.
fn parameters() -> &'static Result<Parameters> {
    PARAMETERS.get_or_init(|| load_parameters(&parameters_path()?))
}

/// Get a parameter from parameters.toml
macro_rules! parameter_getter {
    ($a:ident, $t:ty) => {
        /// Get this parameter from parameters.toml
        pub fn $a() -> Result<&'static $t> {
            let val = match parameters() {
                Err(e) => return Err(anyhow::anyhow!("{e:#}")),
                Ok(p) => &p.$a,
            };
            if DEFAULT_PARAMETERS.$a != *val {
                warn!("using non-default {} = {:?}", stringify!($a), val);
            }
            Ok(val)
        }
    };
}

parameter_getter!(average_genes, bool);
parameter_getter!(method_gs, str);
parameter_getter!(smooth, bool);
parameter_getter!(smooth_span, f64);
parameter_getter!(normalize, bool);
parameter_getter!(normalization, str);
parameter_getter!(verbose, bool);

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let params = load_parameters(&dir.path().join("parameters.toml")).unwrap();
        assert_eq!(params, DEFAULT_PARAMETERS);
    }

    #[test]
    fn test_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "method_gs = \"gsva\"\nsmooth_span = 0.1").unwrap();
        let params = load_parameters(file.path()).unwrap();
        assert_eq!(params.method_gs, "gsva");
        assert_eq!(params.smooth_span, 0.1);
        assert_eq!(params.normalization, DEFAULT_PARAMETERS.normalization);
        assert!(params.normalize);
    }

    #[test]
    fn test_unknown_key_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "smoothing = true").unwrap();
        let err = load_parameters(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("smoothing"));
    }
}
