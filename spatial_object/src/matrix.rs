//! Dense expression matrix, genes in rows and barcodes in columns.
#![allow(missing_docs)]

use crate::errors::ObjectError;
use crate::table::{align_rows, unique_index};
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct ExpressionMatrix {
    values: Array2<f64>,
    genes: Vec<String>,
    barcodes: Vec<String>,
    gene_index: HashMap<String, usize>,
    barcode_index: HashMap<String, usize>,
}

impl ExpressionMatrix {
    pub fn new(
        values: Array2<f64>,
        genes: Vec<String>,
        barcodes: Vec<String>,
    ) -> Result<Self, ObjectError> {
        if values.dim() != (genes.len(), barcodes.len()) {
            return Err(ObjectError::InvalidObject(format!(
                "expression matrix is {:?} but has {} gene and {} barcode names",
                values.dim(),
                genes.len(),
                barcodes.len()
            )));
        }
        let gene_index = unique_index(&genes).map_err(|gene| {
            ObjectError::InvalidObject(format!("gene '{gene}' occurs twice in the matrix"))
        })?;
        let barcode_index = unique_index(&barcodes).map_err(|bc| {
            ObjectError::InvalidObject(format!("barcode '{bc}' occurs twice in the matrix"))
        })?;
        Ok(ExpressionMatrix {
            values,
            genes,
            barcodes,
            gene_index,
            barcode_index,
        })
    }

    /// Build from one `Vec` per gene.
    pub fn from_rows(
        rows: Vec<Vec<f64>>,
        genes: Vec<String>,
        barcodes: Vec<String>,
    ) -> Result<Self, ObjectError> {
        let ncols = barcodes.len();
        if let Some(bad) = rows.iter().position(|row| row.len() != ncols) {
            return Err(ObjectError::InvalidObject(format!(
                "row {bad} has {} values, expected {ncols}",
                rows[bad].len()
            )));
        }
        let nrows = rows.len();
        let values = Array2::from_shape_vec((nrows, ncols), rows.into_iter().flatten().collect())
            .map_err(|e| ObjectError::InvalidObject(e.to_string()))?;
        ExpressionMatrix::new(values, genes, barcodes)
    }

    /// (genes, barcodes)
    pub fn shape(&self) -> (usize, usize) {
        self.values.dim()
    }

    pub fn genes(&self) -> &[String] {
        &self.genes
    }

    pub fn barcodes(&self) -> &[String] {
        &self.barcodes
    }

    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn gene_index(&self, gene: &str) -> Option<usize> {
        self.gene_index.get(gene).copied()
    }

    pub fn contains_gene(&self, gene: &str) -> bool {
        self.gene_index.contains_key(gene)
    }

    pub fn row(&self, gene: &str) -> Option<ArrayView1<'_, f64>> {
        self.gene_index(gene)
            .map(|idx| self.values.index_axis(Axis(0), idx))
    }

    /// Column of each barcode in this matrix, `None` for unknown barcodes.
    pub fn align(&self, barcodes: &[String]) -> Vec<Option<usize>> {
        align_rows(&self.barcode_index, barcodes)
    }

    /// Arithmetic mean of the given gene rows for every barcode.
    ///
    /// An empty selection yields NaN everywhere.
    pub fn mean_of_rows(&self, rows: &[usize]) -> Vec<f64> {
        if rows.is_empty() {
            return vec![f64::NAN; self.barcodes.len()];
        }
        let n = rows.len() as f64;
        self.values
            .select(Axis(0), rows)
            .sum_axis(Axis(0))
            .iter()
            .map(|total| total / n)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{prefix}{i}")).collect()
    }

    #[test]
    fn test_shape_mismatch() {
        let err = ExpressionMatrix::new(Array2::zeros((2, 3)), names("g", 2), names("bc", 2));
        assert!(matches!(err, Err(ObjectError::InvalidObject(_))));
        let err = ExpressionMatrix::from_rows(
            vec![vec![1.0, 2.0], vec![3.0]],
            names("g", 2),
            names("bc", 2),
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_duplicate_names() {
        let dup = vec!["g".to_string(), "g".to_string()];
        assert!(ExpressionMatrix::new(Array2::zeros((2, 1)), dup.clone(), names("bc", 1)).is_err());
        assert!(ExpressionMatrix::new(Array2::zeros((1, 2)), names("g", 1), dup).is_err());
    }

    #[test]
    fn test_row_and_align() {
        let m = ExpressionMatrix::from_rows(
            vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]],
            vec!["Actb".into(), "Gfap".into()],
            names("bc", 3),
        )
        .unwrap();
        assert_eq!(m.shape(), (2, 3));
        assert_eq!(m.row("Gfap").unwrap().to_vec(), vec![4.0, 5.0, 6.0]);
        assert!(m.row("Mbp").is_none());
        assert_eq!(
            m.align(&["bc2".into(), "nope".into(), "bc0".into()]),
            vec![Some(2), None, Some(0)]
        );
    }

    #[test]
    fn test_mean_of_rows() {
        let m = ExpressionMatrix::from_rows(
            vec![vec![1.0, 2.0], vec![3.0, 6.0], vec![5.0, 10.0]],
            names("g", 3),
            names("bc", 2),
        )
        .unwrap();
        assert_eq!(m.mean_of_rows(&[0, 1, 2]), vec![3.0, 6.0]);
        assert_eq!(m.mean_of_rows(&[2]), vec![5.0, 10.0]);
        assert!(m.mean_of_rows(&[]).iter().all(|v| v.is_nan()));
    }
}
