//! Validation of requested names against the stores of one sample.

use crate::aggregate::MEAN_GENES;
use crate::errors::JoinError;
use crate::request::{VariableClass, VariableRequest};
use itertools::Itertools;
use spatial_object::table::is_reserved;
use spatial_object::{ExpressionMatrix, FeatureTable, GeneSetCatalog};

/// Validated names of one class, in request order without repeats.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedClass {
    /// Class of the names.
    pub class: VariableClass,
    /// Names that exist in the store of the class.
    pub names: Vec<String>,
}

impl ResolvedClass {
    /// Names of the columns this class adds to the table.
    pub fn output_names(&self, average_genes: bool) -> Vec<&str> {
        if self.class == VariableClass::Genes && average_genes {
            vec![MEAN_GENES]
        } else {
            self.names.iter().map(String::as_str).collect()
        }
    }
}

/// Checks names against the matrix, feature table and gene set catalog of a sample.
pub struct VariableResolver<'a> {
    matrix: &'a ExpressionMatrix,
    features: &'a FeatureTable,
    gene_sets: &'a GeneSetCatalog,
}

impl<'a> VariableResolver<'a> {
    /// Resolver over the stores of one sample.
    pub fn new(
        matrix: &'a ExpressionMatrix,
        features: &'a FeatureTable,
        gene_sets: &'a GeneSetCatalog,
    ) -> Self {
        VariableResolver {
            matrix,
            features,
            gene_sets,
        }
    }

    fn exists(&self, class: VariableClass, name: &str) -> bool {
        match class {
            VariableClass::Features => self.features.column(name).is_some(),
            VariableClass::Genes => self.matrix.contains_gene(name),
            VariableClass::GeneSets => self.gene_sets.contains(name),
        }
    }

    /// Validate the names of one class.
    ///
    /// Repeated names are kept once. Fails with `InvalidRequest` if no name
    /// is given and with `UnknownVariable`, listing every missing name, if
    /// any name is not in the store.
    pub fn resolve(
        &self,
        class: VariableClass,
        names: &[String],
    ) -> Result<Vec<String>, JoinError> {
        let names: Vec<String> = names.iter().unique().cloned().collect();
        if names.is_empty() {
            return Err(JoinError::InvalidRequest(format!("no {class} were requested")));
        }
        let missing: Vec<String> = names
            .iter()
            .filter(|name| !self.exists(class, name))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(JoinError::UnknownVariable {
                class,
                names: missing,
            });
        }
        Ok(names)
    }

    /// Validate every class of `request` before anything is computed.
    ///
    /// Besides the checks of [`VariableResolver::resolve`], a class must not
    /// produce a column named like a reserved coordinates column.
    pub fn resolve_request(
        &self,
        request: &VariableRequest,
        average_genes: bool,
    ) -> Result<Vec<ResolvedClass>, JoinError> {
        let mut resolved = Vec::new();
        for (class, names) in request.classes()? {
            let class = ResolvedClass {
                class,
                names: self.resolve(class, names)?,
            };
            if let Some(name) = class
                .output_names(average_genes)
                .into_iter()
                .find(|name| is_reserved(name))
            {
                return Err(JoinError::InvalidRequest(format!(
                    "{} '{name}' cannot be joined, the coordinates table reserves that column name",
                    class.class
                )));
            }
            resolved.push(class);
        }
        Ok(resolved)
    }
}
