//! Gene set scoring strategies.
//!
//! A strategy is first prepared against the expression matrix, which computes
//! whatever does not depend on the gene sets (kernel densities, per barcode
//! gene rankings). The prepared strategy then scores gene sets, each reduced
//! to the genes present in the matrix, with one score per barcode (matrix
//! column) for every gene set.

use anyhow::{Context, Result};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use spatial_object::ExpressionMatrix;
use statrs::function::erf::erfc;
use statrs::statistics::{Data, Distribution};
use std::f64::consts::SQRT_2;

/// Name of the plain average, the only method that is not an enrichment analysis.
pub const MEAN: &str = "mean";

/// A gene set scoring strategy.
pub trait ScoringMethod {
    /// Name used to select the method.
    fn name(&self) -> &str;

    /// Compute the state shared by every gene set scored against `matrix`.
    fn prepare<'a>(
        &'a self,
        matrix: &'a ExpressionMatrix,
    ) -> Result<Box<dyn PreparedScoring + 'a>>;

    /// Prepare against `matrix`, then score `gene_sets`.
    fn score(
        &self,
        matrix: &ExpressionMatrix,
        gene_sets: &[(&str, &[String])],
    ) -> Result<Vec<Vec<f64>>> {
        self.prepare(matrix)?.score(gene_sets)
    }
}

/// A scoring method bound to one expression matrix.
pub trait PreparedScoring {
    /// Score `gene_sets` against every barcode of the matrix.
    ///
    /// Gene lists are non-empty and name rows of the matrix. Implementations
    /// return one vector of `matrix.barcodes().len()` scores per gene set, in
    /// input order.
    fn score(&self, gene_sets: &[(&str, &[String])]) -> Result<Vec<Vec<f64>>>;
}

/// Matrix row of every gene.
pub fn gene_rows(matrix: &ExpressionMatrix, genes: &[String]) -> Result<Vec<usize>> {
    genes
        .iter()
        .map(|gene| {
            matrix
                .gene_index(gene)
                .with_context(|| format!("gene '{gene}' is not a row of the expression matrix"))
        })
        .collect()
}

/// Gene rows centered and scaled across barcodes. Constant rows become zero.
fn standardized(matrix: &ExpressionMatrix, rows: &[usize]) -> Array2<f64> {
    let mut z = matrix.values().select(Axis(0), rows);
    for mut row in z.rows_mut() {
        let data = Data::new(row.to_vec());
        match (data.mean(), data.std_dev()) {
            (Some(mean), Some(sd)) if sd.is_finite() && sd > 0.0 => {
                row.mapv_inplace(|v| (v - mean) / sd);
            }
            _ => row.fill(0.0),
        }
    }
    z
}

fn normal_cdf(z: f64) -> f64 {
    0.5 * erfc(-z / SQRT_2)
}

/// Genes of one barcode ordered by decreasing `value`, ties by row.
fn decreasing_order(n_genes: u32, value: impl Fn(usize) -> f64) -> Vec<u32> {
    let mut order: Vec<u32> = (0..n_genes).collect();
    order.sort_by(|&a, &b| {
        value(b as usize)
            .total_cmp(&value(a as usize))
            .then(a.cmp(&b))
    });
    order
}

fn membership(n_genes: usize, rows: &[usize]) -> Vec<bool> {
    let mut in_set = vec![false; n_genes];
    for &row in rows {
        in_set[row] = true;
    }
    in_set
}

/// Methods scoring a gene set from its rows of the matrix alone.
trait SetScore {
    fn score_set(&self, matrix: &ExpressionMatrix, rows: &[usize]) -> Vec<f64>;
}

/// Prepared form of a [`SetScore`] method, nothing is shared between sets.
struct PerSet<'a, M> {
    method: &'a M,
    matrix: &'a ExpressionMatrix,
}

impl<M: SetScore> PreparedScoring for PerSet<'_, M> {
    fn score(&self, gene_sets: &[(&str, &[String])]) -> Result<Vec<Vec<f64>>> {
        gene_sets
            .iter()
            .map(|(_, genes)| {
                let rows = gene_rows(self.matrix, genes)?;
                Ok(self.method.score_set(self.matrix, &rows))
            })
            .collect()
    }
}

/// Genes of every barcode ordered by decreasing value.
struct RankedBarcodes {
    n_genes: usize,
    orders: Vec<Vec<u32>>,
}

impl RankedBarcodes {
    fn new(values: ArrayView2<'_, f64>) -> Result<Self> {
        let n_genes = values.nrows();
        let n = u32::try_from(n_genes).context("too many genes to rank")?;
        let orders = values
            .columns()
            .into_iter()
            .map(|column| decreasing_order(n, |gene| column[gene]))
            .collect();
        Ok(RankedBarcodes { n_genes, orders })
    }
}

/// Running sum statistics over the gene ranking of one barcode.
trait RankWalk {
    /// Score of the set `in_set` for one barcode whose genes rank as `order`.
    fn walk(&self, order: &[u32], in_set: &[bool]) -> f64;

    /// Adjust the scores of one set across barcodes.
    fn finish(&self, _scores: &mut [f64]) {}
}

/// Prepared form of a [`RankWalk`] method: the rankings are computed once.
struct Ranked<'a, W> {
    method: &'a W,
    matrix: &'a ExpressionMatrix,
    ranks: RankedBarcodes,
}

impl<W: RankWalk> PreparedScoring for Ranked<'_, W> {
    fn score(&self, gene_sets: &[(&str, &[String])]) -> Result<Vec<Vec<f64>>> {
        gene_sets
            .iter()
            .map(|(_, genes)| {
                let in_set = membership(self.ranks.n_genes, &gene_rows(self.matrix, genes)?);
                let mut scores: Vec<f64> = self
                    .ranks
                    .orders
                    .iter()
                    .map(|order| self.method.walk(order, &in_set))
                    .collect();
                self.method.finish(&mut scores);
                Ok(scores)
            })
            .collect()
    }
}

/// Arithmetic mean of the gene rows.
#[derive(Clone, Copy, Debug, Default)]
pub struct MeanScore;

impl SetScore for MeanScore {
    fn score_set(&self, matrix: &ExpressionMatrix, rows: &[usize]) -> Vec<f64> {
        matrix.mean_of_rows(rows)
    }
}

impl ScoringMethod for MeanScore {
    fn name(&self) -> &str {
        MEAN
    }

    fn prepare<'a>(
        &'a self,
        matrix: &'a ExpressionMatrix,
    ) -> Result<Box<dyn PreparedScoring + 'a>> {
        Ok(Box::new(PerSet {
            method: self,
            matrix,
        }))
    }
}

/// Combined z-score: genes are standardized across barcodes and summed,
/// divided by the square root of the set size.
#[derive(Clone, Copy, Debug, Default)]
pub struct ZScore;

impl SetScore for ZScore {
    fn score_set(&self, matrix: &ExpressionMatrix, rows: &[usize]) -> Vec<f64> {
        let k = (rows.len() as f64).sqrt();
        standardized(matrix, rows)
            .sum_axis(Axis(0))
            .iter()
            .map(|total| total / k)
            .collect()
    }
}

impl ScoringMethod for ZScore {
    fn name(&self) -> &str {
        "zscore"
    }

    fn prepare<'a>(
        &'a self,
        matrix: &'a ExpressionMatrix,
    ) -> Result<Box<dyn PreparedScoring + 'a>> {
        Ok(Box::new(PerSet {
            method: self,
            matrix,
        }))
    }
}

/// Single sample GSEA.
///
/// For each barcode all genes are ranked by expression. The score is the sum
/// over the ranking of the difference between the rank weighted cumulative
/// share of set genes and the cumulative share of the other genes.
#[derive(Clone, Copy, Debug)]
pub struct SsGsea {
    /// Exponent of the rank weights.
    pub alpha: f64,
    /// Divide the scores of a set by their range.
    pub normalize: bool,
}

impl Default for SsGsea {
    fn default() -> Self {
        SsGsea {
            alpha: 0.25,
            normalize: true,
        }
    }
}

impl RankWalk for SsGsea {
    fn walk(&self, order: &[u32], in_set: &[bool]) -> f64 {
        let n = order.len();
        let weight = |position: usize| ((n - position) as f64).powf(self.alpha);
        let total_in: f64 = order
            .iter()
            .enumerate()
            .filter(|&(_, &gene)| in_set[gene as usize])
            .map(|(position, _)| weight(position))
            .sum();
        let n_out = order.iter().filter(|&&gene| !in_set[gene as usize]).count() as f64;

        let (mut cum_in, mut cum_out, mut score) = (0.0, 0.0, 0.0);
        for (position, &gene) in order.iter().enumerate() {
            if in_set[gene as usize] {
                cum_in += weight(position);
            } else {
                cum_out += 1.0;
            }
            let miss = if n_out > 0.0 { cum_out / n_out } else { 0.0 };
            score += cum_in / total_in - miss;
        }
        score
    }

    fn finish(&self, scores: &mut [f64]) {
        if !self.normalize {
            return;
        }
        let (lo, hi) = scores
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        if hi > lo {
            for v in scores.iter_mut() {
                *v /= hi - lo;
            }
        }
    }
}

impl ScoringMethod for SsGsea {
    fn name(&self) -> &str {
        "ssgsea"
    }

    fn prepare<'a>(
        &'a self,
        matrix: &'a ExpressionMatrix,
    ) -> Result<Box<dyn PreparedScoring + 'a>> {
        Ok(Box::new(Ranked {
            method: self,
            matrix,
            ranks: RankedBarcodes::new(matrix.values())?,
        }))
    }
}

/// Gene set variation analysis.
///
/// Expression is first turned into a per gene cumulative density estimated
/// with a Gaussian kernel (bandwidth: standard deviation / 4). Genes of each
/// barcode are ranked by density, ranks are folded around the middle, and the
/// score is the maximum positive plus the maximum negative deviation of the
/// rank weighted random walk.
#[derive(Clone, Copy, Debug)]
pub struct Gsva {
    /// Exponent of the rank weights of set genes.
    pub tau: f64,
}

impl Default for Gsva {
    fn default() -> Self {
        Gsva { tau: 1.0 }
    }
}

impl Gsva {
    fn density(values: ArrayView2<'_, f64>) -> Array2<f64> {
        let mut density = Array2::from_elem(values.dim(), 0.5);
        for (row, mut out) in values.rows().into_iter().zip(density.rows_mut()) {
            let Some(sd) = Data::new(row.to_vec()).std_dev() else {
                continue;
            };
            let bandwidth = sd / 4.0;
            if !(bandwidth.is_finite() && bandwidth > 0.0) {
                continue;
            }
            let n = row.len() as f64;
            for (x, cdf) in row.iter().zip(out.iter_mut()) {
                *cdf = row
                    .iter()
                    .map(|other| normal_cdf((x - other) / bandwidth))
                    .sum::<f64>()
                    / n;
            }
        }
        density
    }
}

impl RankWalk for Gsva {
    fn walk(&self, order: &[u32], in_set: &[bool]) -> f64 {
        let n = order.len();
        let half = n as f64 / 2.0;
        let weight = |position: usize| ((n - position) as f64 - half).abs().powf(self.tau);
        let total_in: f64 = order
            .iter()
            .enumerate()
            .filter(|&(_, &gene)| in_set[gene as usize])
            .map(|(position, _)| weight(position))
            .sum();
        let n_out = order.iter().filter(|&&gene| !in_set[gene as usize]).count() as f64;

        let (mut walk, mut max_pos, mut max_neg) = (0.0_f64, 0.0_f64, 0.0_f64);
        for (position, &gene) in order.iter().enumerate() {
            if in_set[gene as usize] {
                if total_in > 0.0 {
                    walk += weight(position) / total_in;
                }
            } else {
                walk -= 1.0 / n_out;
            }
            max_pos = max_pos.max(walk);
            max_neg = max_neg.min(walk);
        }
        max_pos + max_neg
    }
}

impl ScoringMethod for Gsva {
    fn name(&self) -> &str {
        "gsva"
    }

    fn prepare<'a>(
        &'a self,
        matrix: &'a ExpressionMatrix,
    ) -> Result<Box<dyn PreparedScoring + 'a>> {
        let density = Gsva::density(matrix.values());
        Ok(Box::new(Ranked {
            method: self,
            matrix,
            ranks: RankedBarcodes::new(density.view())?,
        }))
    }
}

/// Pathway level analysis of gene expression: the leading right singular
/// vector of the standardized gene set sub-matrix, signed to agree with the
/// mean z-score of the set.
#[derive(Clone, Copy, Debug)]
pub struct Plage {
    /// Cap on power iterations.
    pub max_iterations: usize,
    /// Stop once the vector moves less than this between iterations.
    pub tolerance: f64,
}

impl Default for Plage {
    fn default() -> Self {
        Plage {
            max_iterations: 1000,
            tolerance: 1e-12,
        }
    }
}

impl Plage {
    fn leading_right_vector(&self, z: &Array2<f64>) -> Array1<f64> {
        let k = z.nrows();
        let gram = z.dot(&z.t());
        let mut u = Array1::from_shape_fn(k, |i| 1.0 + i as f64 / k as f64);
        u /= u.dot(&u).sqrt();
        for _ in 0..self.max_iterations {
            let mut next = gram.dot(&u);
            let norm = next.dot(&next).sqrt();
            if norm == 0.0 {
                return Array1::zeros(z.ncols());
            }
            next /= norm;
            let delta = (&next - &u).fold(0.0_f64, |m, v| m.max(v.abs()));
            u = next;
            if delta < self.tolerance {
                break;
            }
        }
        let sigma = u.dot(&gram.dot(&u)).sqrt();
        if !(sigma.is_finite() && sigma > 0.0) {
            return Array1::zeros(z.ncols());
        }
        let mut right = z.t().dot(&u) / sigma;
        if let Some(mean_z) = z.mean_axis(Axis(0)) {
            if right.dot(&mean_z) < 0.0 {
                right.mapv_inplace(|v| -v);
            }
        }
        right
    }
}

impl SetScore for Plage {
    fn score_set(&self, matrix: &ExpressionMatrix, rows: &[usize]) -> Vec<f64> {
        self.leading_right_vector(&standardized(matrix, rows)).to_vec()
    }
}

impl ScoringMethod for Plage {
    fn name(&self) -> &str {
        "plage"
    }

    fn prepare<'a>(
        &'a self,
        matrix: &'a ExpressionMatrix,
    ) -> Result<Box<dyn PreparedScoring + 'a>> {
        Ok(Box::new(PerSet {
            method: self,
            matrix,
        }))
    }
}

/// Scoring methods selectable by name.
pub struct ScoringRegistry {
    methods: Vec<Box<dyn ScoringMethod>>,
}

impl Default for ScoringRegistry {
    /// `mean`, `zscore`, `ssgsea`, `gsva` and `plage`.
    fn default() -> Self {
        let mut registry = ScoringRegistry::empty();
        registry.register(Box::new(MeanScore));
        registry.register(Box::new(ZScore));
        registry.register(Box::new(SsGsea::default()));
        registry.register(Box::new(Gsva::default()));
        registry.register(Box::new(Plage::default()));
        registry
    }
}

impl ScoringRegistry {
    /// A registry without any method.
    pub fn empty() -> Self {
        ScoringRegistry {
            methods: Vec::new(),
        }
    }

    /// Add a method, replacing a registered method of the same name.
    pub fn register(&mut self, method: Box<dyn ScoringMethod>) {
        match self.methods.iter_mut().find(|m| m.name() == method.name()) {
            Some(existing) => *existing = method,
            None => self.methods.push(method),
        }
    }

    /// Look up a method by name.
    pub fn get(&self, name: &str) -> Option<&dyn ScoringMethod> {
        let method = self.methods.iter().find(|m| m.name() == name)?;
        Some(&**method)
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.methods.iter().map(|m| m.name().to_string()).collect()
    }
}
