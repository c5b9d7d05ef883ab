//! Values of resolved variables, aligned to the rows of the coordinates table.

use crate::errors::JoinError;
use crate::progress::{gene_set_message, ProgressReporter};
use crate::request::VariableClass;
use crate::scoring::{PreparedScoring, ScoringMethod};
use anyhow::anyhow;
use log::{debug, warn};
use spatial_object::{Column, ExpressionMatrix, FeatureTable, GeneSetCatalog};

/// Column holding the average of the requested genes.
pub const MEAN_GENES: &str = "mean_genes";

fn unknown(class: VariableClass, name: &str) -> JoinError {
    JoinError::UnknownVariable {
        class,
        names: vec![name.to_string()],
    }
}

fn scoring_error(method: &str, gene_set: &str, source: anyhow::Error) -> JoinError {
    JoinError::Scoring {
        method: method.to_string(),
        gene_set: gene_set.to_string(),
        source,
    }
}

fn warn_missing(store: &str, rows: &[Option<usize>]) {
    let missing = rows.iter().filter(|row| row.is_none()).count();
    if missing > 0 {
        warn!(
            "{missing} of {} barcodes are not in the {store}, their values are missing",
            rows.len()
        );
    }
}

/// Computes the new columns of each variable class for a list of barcodes.
pub struct ScoreAggregator<'a> {
    matrix: &'a ExpressionMatrix,
    features: &'a FeatureTable,
    gene_sets: &'a GeneSetCatalog,
    barcodes: &'a [String],
}

impl<'a> ScoreAggregator<'a> {
    /// Aggregator producing one value per entry of `barcodes`.
    pub fn new(
        matrix: &'a ExpressionMatrix,
        features: &'a FeatureTable,
        gene_sets: &'a GeneSetCatalog,
        barcodes: &'a [String],
    ) -> Self {
        ScoreAggregator {
            matrix,
            features,
            gene_sets,
            barcodes,
        }
    }

    fn matrix_columns(&self) -> Vec<Option<usize>> {
        let columns = self.matrix.align(self.barcodes);
        warn_missing("expression matrix", &columns);
        columns
    }

    /// Feature columns as stored, numeric or categorical.
    pub fn features(&self, names: &[String]) -> Result<Vec<(String, Column)>, JoinError> {
        let rows = self.features.align(self.barcodes);
        warn_missing("feature table", &rows);
        names
            .iter()
            .map(|name| {
                let column = self
                    .features
                    .column(name)
                    .ok_or_else(|| unknown(VariableClass::Features, name))?;
                Ok((name.clone(), column.take(&rows)))
            })
            .collect()
    }

    /// One column per gene, or a single `mean_genes` column with the
    /// per-barcode average if `average_genes` is set.
    pub fn genes(
        &self,
        names: &[String],
        average_genes: bool,
    ) -> Result<Vec<(String, Column)>, JoinError> {
        let columns = self.matrix_columns();
        let gene_rows = names
            .iter()
            .map(|name| {
                self.matrix
                    .gene_index(name)
                    .ok_or_else(|| unknown(VariableClass::Genes, name))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if average_genes {
            let mean = Column::Numeric(self.matrix.mean_of_rows(&gene_rows));
            return Ok(vec![(MEAN_GENES.to_string(), mean.take(&columns))]);
        }
        let values = self.matrix.values();
        Ok(names
            .iter()
            .zip(gene_rows)
            .map(|(name, row)| {
                let expression = Column::Numeric(values.row(row).to_vec());
                (name.clone(), expression.take(&columns))
            })
            .collect())
    }

    /// One score column per gene set, in the order given.
    ///
    /// Sets are scored one at a time. When a `reporter` is given it is told
    /// about each set before the set is scored. `method` is prepared against
    /// the matrix once, when the first set with a gene in the matrix is
    /// reached. Sets without any gene in the matrix score NaN without calling
    /// `method`.
    pub fn gene_sets(
        &self,
        names: &[String],
        method: &dyn ScoringMethod,
        reporter: Option<&dyn ProgressReporter>,
    ) -> Result<Vec<(String, Column)>, JoinError> {
        let columns = self.matrix_columns();
        let total = names.len();
        let mut state: Option<Box<dyn PreparedScoring + '_>> = None;
        let mut scored = Vec::with_capacity(total);
        for (i, name) in names.iter().enumerate() {
            if let Some(reporter) = reporter {
                reporter.report(&gene_set_message(i + 1, total, name, method.name()));
            }
            let genes = self
                .gene_sets
                .effective_genes(name, self.matrix)
                .ok_or_else(|| unknown(VariableClass::GeneSets, name))?;
            let scores = if genes.is_empty() {
                debug!("no gene of gene set '{name}' is in the expression matrix");
                vec![f64::NAN; self.matrix.barcodes().len()]
            } else {
                let prepared: &dyn PreparedScoring = match state {
                    Some(ref prepared) => &**prepared,
                    None => {
                        let prepared = method
                            .prepare(self.matrix)
                            .map_err(|source| scoring_error(method.name(), name, source))?;
                        &**state.insert(prepared)
                    }
                };
                self.score(prepared, method.name(), name, &genes)?
            };
            scored.push((name.clone(), Column::Numeric(scores).take(&columns)));
        }
        Ok(scored)
    }

    fn score(
        &self,
        prepared: &dyn PreparedScoring,
        method: &str,
        name: &str,
        genes: &[String],
    ) -> Result<Vec<f64>, JoinError> {
        let mut scores = prepared
            .score(&[(name, genes)])
            .map_err(|source| scoring_error(method, name, source))?;
        let n_barcodes = self.matrix.barcodes().len();
        match scores.pop() {
            Some(values) if scores.is_empty() && values.len() == n_barcodes => Ok(values),
            _ => Err(scoring_error(
                method,
                name,
                anyhow!("expected a single vector of {n_barcodes} scores"),
            )),
        }
    }
}
