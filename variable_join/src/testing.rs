//! Fixtures shared by the unit tests.

use crate::progress::ProgressReporter;
use crate::scoring::{MeanScore, PreparedScoring, ScoringMethod, MEAN};
use anyhow::Result;
use spatial_object::{
    Column, CoordinateTable, ExpressionMatrix, FeatureTable, GeneSetCatalog, SampleData,
    SpatialObject,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

pub(crate) const SAMPLE: &str = "s1";

pub(crate) fn names(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}

pub(crate) fn barcodes(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("bc{i}")).collect()
}

/// One sample of four spots on a 2x2 grid.
///
/// Genes Gfap, Mbp and Plp1 average to [2, 2, 4, 4]. A gene is named `x`
/// like a reserved column. The `counts` matrix lists the barcodes in reverse.
pub(crate) fn object() -> SpatialObject {
    let scaled = ExpressionMatrix::from_rows(
        vec![
            vec![1.0, 2.0, 3.0, 4.0],
            vec![4.0, 3.0, 2.0, 1.0],
            vec![1.0, 1.0, 7.0, 7.0],
            vec![5.0, 5.0, 5.0, 6.0],
            vec![0.0, 1.0, 0.0, 1.0],
        ],
        names(&["Gfap", "Mbp", "Plp1", "Actb", "x"]),
        barcodes(4),
    )
    .unwrap();
    let counts = ExpressionMatrix::from_rows(
        vec![vec![40.0, 30.0, 20.0, 10.0]],
        names(&["Gfap"]),
        names(&["bc4", "bc3", "bc2", "bc1"]),
    )
    .unwrap();
    let features = FeatureTable::new(barcodes(4))
        .unwrap()
        .with_column("nCount", vec![10.0, 20.0, 30.0, 40.0].into())
        .unwrap()
        .with_column(
            "cluster",
            Column::Categorical(["a", "a", "b", "b"].map(|c| Some(c.to_string())).to_vec()),
        )
        .unwrap();
    let gene_sets: GeneSetCatalog = [
        ("HM_HYPOXIA", names(&["Gfap", "Mbp", "Vegfa"])),
        ("BP.GO_MYELINATION", names(&["Mbp", "Plp1"])),
        ("HM_ABSENT", names(&["Vegfa", "Hif1a"])),
    ]
    .into_iter()
    .collect();
    let sample = SampleData::new("scaled", scaled, features).with_matrix("counts", counts);
    SpatialObject::new([(SAMPLE.to_string(), sample)], gene_sets).unwrap()
}

pub(crate) fn coords() -> CoordinateTable {
    CoordinateTable::new(
        barcodes(4),
        vec![SAMPLE.to_string(); 4],
        vec![0.0, 1.0, 0.0, 1.0],
        vec![0.0, 0.0, 1.0, 1.0],
    )
    .unwrap()
}

/// Coordinates of an arbitrary selection of barcodes of the sample.
pub(crate) fn coords_for(barcodes: Vec<String>) -> CoordinateTable {
    let n = barcodes.len();
    let x = (0..n).map(|i| i as f64).collect();
    CoordinateTable::new(barcodes, vec![SAMPLE.to_string(); n], x, vec![0.0; n]).unwrap()
}

/// `side` x `side` spots with a gene alternating between 1 and -1 along x.
pub(crate) fn grid(side: usize) -> (SpatialObject, CoordinateTable) {
    let n = side * side;
    let bcs = barcodes(n);
    let x: Vec<f64> = (0..n).map(|i| (i % side) as f64).collect();
    let y: Vec<f64> = (0..n).map(|i| (i / side) as f64).collect();
    let stripes: Vec<f64> = (0..n).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
    let matrix =
        ExpressionMatrix::from_rows(vec![stripes], names(&["Stripes"]), bcs.clone()).unwrap();
    let features = FeatureTable::new(bcs.clone()).unwrap();
    let object = SpatialObject::new(
        [(SAMPLE.to_string(), SampleData::new("scaled", matrix, features))],
        GeneSetCatalog::new(),
    )
    .unwrap();
    let coords = CoordinateTable::new(bcs, vec![SAMPLE.to_string(); n], x, y).unwrap();
    (object, coords)
}

/// Collects progress messages.
#[derive(Clone, Default)]
pub(crate) struct Recorder(Rc<RefCell<Vec<String>>>);

impl Recorder {
    pub(crate) fn messages(&self) -> Vec<String> {
        self.0.borrow().clone()
    }
}

impl ProgressReporter for Recorder {
    fn report(&self, message: &str) {
        self.0.borrow_mut().push(message.to_string());
    }
}

/// Mean scores that count how often the backend is prepared and invoked.
#[derive(Clone, Default)]
pub(crate) struct CountingMean {
    mean: MeanScore,
    prepared: Rc<Cell<usize>>,
    scored: Rc<Cell<usize>>,
}

impl CountingMean {
    pub(crate) fn prepared(&self) -> usize {
        self.prepared.get()
    }

    pub(crate) fn scored(&self) -> usize {
        self.scored.get()
    }
}

struct CountingScores<'a> {
    scored: &'a Cell<usize>,
    inner: Box<dyn PreparedScoring + 'a>,
}

impl PreparedScoring for CountingScores<'_> {
    fn score(&self, gene_sets: &[(&str, &[String])]) -> Result<Vec<Vec<f64>>> {
        self.scored.set(self.scored.get() + 1);
        self.inner.score(gene_sets)
    }
}

impl ScoringMethod for CountingMean {
    fn name(&self) -> &str {
        MEAN
    }

    fn prepare<'a>(
        &'a self,
        matrix: &'a ExpressionMatrix,
    ) -> Result<Box<dyn PreparedScoring + 'a>> {
        self.prepared.set(self.prepared.get() + 1);
        Ok(Box::new(CountingScores {
            scored: &self.scored,
            inner: self.mean.prepare(matrix)?,
        }))
    }
}

pub(crate) fn numeric<'a>(table: &'a CoordinateTable, name: &str) -> &'a [f64] {
    table
        .column(name)
        .and_then(Column::as_numeric)
        .unwrap_or_else(|| panic!("no numeric column '{name}'"))
}
