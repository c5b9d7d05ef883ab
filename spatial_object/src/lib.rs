//! In-memory spatial transcriptomics object: per-sample expression matrices,
//! feature tables and a shared gene set catalog.
#![deny(missing_docs)]

use itertools::Itertools;
use log::debug;
use std::collections::{BTreeMap, HashSet};

pub mod errors;
pub mod gene_sets;
pub mod matrix;
pub mod table;

pub use crate::errors::ObjectError;
pub use crate::gene_sets::GeneSetCatalog;
pub use crate::matrix::ExpressionMatrix;
pub use crate::table::{Column, CoordinateTable, FeatureTable, Table};

/// Data owned by a single sample.
#[derive(Debug, Clone)]
pub struct SampleData {
    matrices: Vec<(String, ExpressionMatrix)>,
    active: usize,
    features: FeatureTable,
}

impl SampleData {
    /// Create sample data whose active matrix is `matrix`, stored as `matrix_name`.
    pub fn new(matrix_name: &str, matrix: ExpressionMatrix, features: FeatureTable) -> Self {
        SampleData {
            matrices: vec![(matrix_name.to_string(), matrix)],
            active: 0,
            features,
        }
    }

    /// Add (or replace) a named matrix. The active matrix is unchanged.
    pub fn with_matrix(mut self, name: &str, matrix: ExpressionMatrix) -> Self {
        match self.matrices.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = matrix,
            None => self.matrices.push((name.to_string(), matrix)),
        }
        self
    }

    /// Make `name` the matrix returned when no matrix is requested explicitly.
    pub fn set_active_matrix(&mut self, name: &str) -> Result<(), ObjectError> {
        self.active = self
            .matrices
            .iter()
            .position(|(n, _)| n == name)
            .ok_or_else(|| {
                ObjectError::InvalidObject(format!("cannot activate unknown matrix '{name}'"))
            })?;
        Ok(())
    }

    /// Name of the active matrix.
    pub fn active_matrix_name(&self) -> &str {
        &self.matrices[self.active].0
    }

    /// The active matrix.
    pub fn active_matrix(&self) -> &ExpressionMatrix {
        &self.matrices[self.active].1
    }

    /// A matrix by name.
    pub fn matrix(&self, name: &str) -> Option<&ExpressionMatrix> {
        self.matrices
            .iter()
            .find_map(|(n, m)| (n == name).then_some(m))
    }

    /// Names of all stored matrices.
    pub fn matrix_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.matrices.iter().map(|(n, _)| n.as_str())
    }

    /// The feature table.
    pub fn features(&self) -> &FeatureTable {
        &self.features
    }

    /// Every matrix must describe exactly the barcodes of the feature table.
    fn validate(&self, sample: &str) -> Result<(), ObjectError> {
        let feature_barcodes: HashSet<&str> =
            self.features.barcodes().iter().map(String::as_str).collect();
        for (name, matrix) in &self.matrices {
            let matrix_barcodes: HashSet<&str> =
                matrix.barcodes().iter().map(String::as_str).collect();
            if matrix_barcodes != feature_barcodes {
                let only_matrix = matrix_barcodes.difference(&feature_barcodes).count();
                let only_features = feature_barcodes.difference(&matrix_barcodes).count();
                return Err(ObjectError::InvalidObject(format!(
                    "sample '{sample}': matrix '{name}' and the feature table disagree on \
                     barcodes ({only_matrix} only in the matrix, {only_features} only in the \
                     feature table)"
                )));
            }
        }
        Ok(())
    }
}

/// A validated collection of samples plus the gene set catalog they share.
#[derive(Debug, Clone)]
pub struct SpatialObject {
    samples: BTreeMap<String, SampleData>,
    gene_sets: GeneSetCatalog,
}

impl SpatialObject {
    /// Validate and assemble an object.
    pub fn new(
        samples: impl IntoIterator<Item = (String, SampleData)>,
        gene_sets: GeneSetCatalog,
    ) -> Result<Self, ObjectError> {
        let mut by_name = BTreeMap::new();
        for (name, data) in samples {
            data.validate(&name)?;
            if by_name.contains_key(&name) {
                return Err(ObjectError::InvalidObject(format!(
                    "sample '{name}' is defined twice"
                )));
            }
            by_name.insert(name, data);
        }
        if by_name.is_empty() {
            return Err(ObjectError::InvalidObject(
                "the object does not contain any sample".to_string(),
            ));
        }
        debug!(
            "assembled object with samples {} and {} gene sets",
            by_name.keys().join(", "),
            gene_sets.len()
        );
        Ok(SpatialObject {
            samples: by_name,
            gene_sets,
        })
    }

    /// Sample names, sorted.
    pub fn sample_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.samples.keys().map(String::as_str)
    }

    /// Data of one sample.
    pub fn sample(&self, name: &str) -> Option<&SampleData> {
        self.samples.get(name)
    }

    /// The gene set catalog.
    pub fn gene_sets(&self) -> &GeneSetCatalog {
        &self.gene_sets
    }

    /// Expression matrix of `sample`: the one named `mtr_name`, or the active one.
    pub fn matrix_for(
        &self,
        sample: &str,
        mtr_name: Option<&str>,
    ) -> Result<&ExpressionMatrix, ObjectError> {
        let data = self.sample_data(sample)?;
        match mtr_name {
            None => Ok(data.active_matrix()),
            Some(name) => data.matrix(name).ok_or_else(|| ObjectError::UnknownMatrix {
                sample: sample.to_string(),
                name: name.to_string(),
            }),
        }
    }

    /// Feature table of `sample`.
    pub fn features_for(&self, sample: &str) -> Result<&FeatureTable, ObjectError> {
        Ok(self.sample_data(sample)?.features())
    }

    fn sample_data(&self, sample: &str) -> Result<&SampleData, ObjectError> {
        self.samples
            .get(sample)
            .ok_or_else(|| ObjectError::UnknownSample(sample.to_string()))
    }
}
