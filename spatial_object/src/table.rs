//! Typed, barcode keyed tables.
//!
//! Columns are addressed by name but carry their type, so a missing or
//! mistyped column is detected once when a table is built rather than at
//! every downstream access.
#![allow(missing_docs)]

use crate::errors::ObjectError;
use itertools::Itertools;
use std::collections::HashMap;

pub const BARCODES: &str = "barcodes";
pub const SAMPLE: &str = "sample";
pub const X: &str = "x";
pub const Y: &str = "y";

/// Columns every coordinates table carries. Joined variables never replace them.
pub const RESERVED_COLUMNS: [&str; 4] = [BARCODES, SAMPLE, X, Y];

pub fn is_reserved(name: &str) -> bool {
    RESERVED_COLUMNS.contains(&name)
}

/// Build a name -> position map, failing on the first duplicated name.
pub(crate) fn unique_index(names: &[String]) -> Result<HashMap<String, usize>, String> {
    let mut index = HashMap::with_capacity(names.len());
    for (i, name) in names.iter().enumerate() {
        if index.insert(name.clone(), i).is_some() {
            return Err(name.clone());
        }
    }
    Ok(index)
}

/// Row of each key in `index`, `None` if the key is absent.
pub fn align_rows(index: &HashMap<String, usize>, keys: &[String]) -> Vec<Option<usize>> {
    keys.iter().map(|key| index.get(key).copied()).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Numeric(Vec<f64>),
    Categorical(Vec<Option<String>>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Column::Numeric(_))
    }

    pub fn as_numeric(&self) -> Option<&[f64]> {
        match self {
            Column::Numeric(v) => Some(v),
            Column::Categorical(_) => None,
        }
    }

    pub fn as_categorical(&self) -> Option<&[Option<String>]> {
        match self {
            Column::Numeric(_) => None,
            Column::Categorical(v) => Some(v),
        }
    }

    /// Pick rows by position. Absent rows become NaN or a missing category.
    pub fn take(&self, rows: &[Option<usize>]) -> Column {
        match self {
            Column::Numeric(v) => Column::Numeric(
                rows.iter()
                    .map(|row| row.map_or(f64::NAN, |r| v[r]))
                    .collect(),
            ),
            Column::Categorical(v) => Column::Categorical(
                rows.iter()
                    .map(|row| row.and_then(|r| v[r].clone()))
                    .collect(),
            ),
        }
    }
}

impl From<Vec<f64>> for Column {
    fn from(values: Vec<f64>) -> Self {
        Column::Numeric(values)
    }
}

impl From<Vec<Option<String>>> for Column {
    fn from(values: Vec<Option<String>>) -> Self {
        Column::Categorical(values)
    }
}

/// Ordered list of named columns. Length consistency is the owner's concern.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<(String, Column)>,
}

impl Table {
    pub fn new() -> Self {
        Table::default()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Column)> + '_ {
        self.columns.iter().map(|(name, col)| (name.as_str(), col))
    }

    pub fn get(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find_map(|(n, col)| (n == name).then_some(col))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Replace the column with the same name in place, or append it.
    pub fn upsert(&mut self, name: &str, column: Column) {
        match self.columns.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = column,
            None => self.columns.push((name.to_string(), column)),
        }
    }
}

/// Spot positions of one or more samples, plus arbitrary extra columns.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateTable {
    barcodes: Vec<String>,
    sample: Vec<String>,
    x: Vec<f64>,
    y: Vec<f64>,
    columns: Table,
}

impl CoordinateTable {
    pub fn new(
        barcodes: Vec<String>,
        sample: Vec<String>,
        x: Vec<f64>,
        y: Vec<f64>,
    ) -> Result<Self, ObjectError> {
        let nrows = barcodes.len();
        for (name, len) in [(SAMPLE, sample.len()), (X, x.len()), (Y, y.len())] {
            if len != nrows {
                return Err(ObjectError::InvalidCoordsTable(format!(
                    "column '{name}' has {len} rows, expected {nrows}"
                )));
            }
        }
        if let Some((s, bc)) = sample.iter().zip(&barcodes).duplicates().next() {
            return Err(ObjectError::InvalidCoordsTable(format!(
                "barcode '{bc}' occurs more than once in sample '{s}'"
            )));
        }
        Ok(CoordinateTable {
            barcodes,
            sample,
            x,
            y,
            columns: Table::new(),
        })
    }

    /// Build a table from loosely assembled named columns, checking the schema once.
    ///
    /// `barcodes` and `sample` must be complete categorical columns, `x` and
    /// `y` numeric. Every other column is carried along in the given order.
    pub fn from_columns(columns: Vec<(String, Column)>) -> Result<Self, ObjectError> {
        let mut rest = Table::new();
        let (mut barcodes, mut sample, mut x, mut y) = (None, None, None, None);
        for (name, column) in columns {
            match name.as_str() {
                BARCODES => barcodes = Some(required_text(BARCODES, column)?),
                SAMPLE => sample = Some(required_text(SAMPLE, column)?),
                X => x = Some(required_numeric(X, column)?),
                Y => y = Some(required_numeric(Y, column)?),
                _ => {
                    if rest.contains(&name) {
                        return Err(ObjectError::InvalidCoordsTable(format!(
                            "column '{name}' occurs more than once"
                        )));
                    }
                    rest.upsert(&name, column);
                }
            }
        }
        let missing = |name: &str| {
            ObjectError::InvalidCoordsTable(format!("required column '{name}' is missing"))
        };
        let mut table = CoordinateTable::new(
            barcodes.ok_or_else(|| missing(BARCODES))?,
            sample.ok_or_else(|| missing(SAMPLE))?,
            x.ok_or_else(|| missing(X))?,
            y.ok_or_else(|| missing(Y))?,
        )?;
        for (name, column) in rest.columns {
            table.upsert_column(&name, column)?;
        }
        Ok(table)
    }

    /// Builder flavour of [`CoordinateTable::upsert_column`].
    pub fn with_column(mut self, name: &str, column: Column) -> Result<Self, ObjectError> {
        self.upsert_column(name, column)?;
        Ok(self)
    }

    /// Add a column, replacing any non-reserved column of the same name in place.
    pub fn upsert_column(&mut self, name: &str, column: Column) -> Result<(), ObjectError> {
        if is_reserved(name) {
            return Err(ObjectError::InvalidCoordsTable(format!(
                "column '{name}' is reserved and cannot be replaced"
            )));
        }
        if column.len() != self.nrows() {
            return Err(ObjectError::InvalidCoordsTable(format!(
                "column '{name}' has {} rows, expected {}",
                column.len(),
                self.nrows()
            )));
        }
        self.columns.upsert(name, column);
        Ok(())
    }

    pub fn nrows(&self) -> usize {
        self.barcodes.len()
    }

    pub fn barcodes(&self) -> &[String] {
        &self.barcodes
    }

    pub fn samples(&self) -> &[String] {
        &self.sample
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    /// Columns beyond the reserved ones, in insertion order.
    pub fn columns(&self) -> &Table {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    /// All column names, reserved ones first.
    pub fn column_names(&self) -> Vec<&str> {
        RESERVED_COLUMNS
            .iter()
            .copied()
            .chain(self.columns.names())
            .collect()
    }

    /// Distinct sample names in order of first appearance.
    pub fn distinct_samples(&self) -> Vec<&str> {
        self.sample.iter().map(String::as_str).unique().collect()
    }

    /// The one sample this table covers.
    pub fn single_sample(&self) -> Result<&str, ObjectError> {
        match self.distinct_samples().as_slice() {
            [sample] => Ok(*sample),
            [] => Err(ObjectError::InvalidCoordsTable(
                "the table is empty, no sample to join against".to_string(),
            )),
            many => Err(ObjectError::InvalidCoordsTable(format!(
                "expected a single sample, found {}: {}",
                many.len(),
                many.iter().join(", ")
            ))),
        }
    }
}

fn required_text(name: &str, column: Column) -> Result<Vec<String>, ObjectError> {
    match column {
        Column::Categorical(values) => values
            .into_iter()
            .enumerate()
            .map(|(row, value)| {
                value.ok_or_else(|| {
                    ObjectError::InvalidCoordsTable(format!(
                        "column '{name}' is missing a value in row {row}"
                    ))
                })
            })
            .collect(),
        Column::Numeric(_) => Err(ObjectError::InvalidCoordsTable(format!(
            "column '{name}' must be categorical"
        ))),
    }
}

fn required_numeric(name: &str, column: Column) -> Result<Vec<f64>, ObjectError> {
    match column {
        Column::Numeric(values) => Ok(values),
        Column::Categorical(_) => Err(ObjectError::InvalidCoordsTable(format!(
            "column '{name}' must be numeric"
        ))),
    }
}

/// Per-barcode annotations of one sample.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    barcodes: Vec<String>,
    index: HashMap<String, usize>,
    columns: Table,
}

impl FeatureTable {
    pub fn new(barcodes: Vec<String>) -> Result<Self, ObjectError> {
        let index = unique_index(&barcodes).map_err(|bc| {
            ObjectError::InvalidObject(format!("feature table lists barcode '{bc}' twice"))
        })?;
        Ok(FeatureTable {
            barcodes,
            index,
            columns: Table::new(),
        })
    }

    pub fn with_column(mut self, name: &str, column: Column) -> Result<Self, ObjectError> {
        if name == BARCODES || name == SAMPLE {
            return Err(ObjectError::InvalidObject(format!(
                "'{name}' cannot be used as a feature name"
            )));
        }
        if self.columns.contains(name) {
            return Err(ObjectError::InvalidObject(format!(
                "feature '{name}' is defined twice"
            )));
        }
        if column.len() != self.barcodes.len() {
            return Err(ObjectError::InvalidObject(format!(
                "feature '{name}' has {} values for {} barcodes",
                column.len(),
                self.barcodes.len()
            )));
        }
        self.columns.upsert(name, column);
        Ok(self)
    }

    pub fn nrows(&self) -> usize {
        self.barcodes.len()
    }

    pub fn barcodes(&self) -> &[String] {
        &self.barcodes
    }

    pub fn feature_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.columns.names()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    /// Row of each barcode in this table, `None` for unknown barcodes.
    pub fn align(&self, barcodes: &[String]) -> Vec<Option<usize>> {
        align_rows(&self.index, barcodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn text(values: &[&str]) -> Column {
        Column::Categorical(values.iter().map(|v| Some((*v).to_string())).collect())
    }

    #[test]
    fn test_from_columns_keeps_extra_order() {
        let table = CoordinateTable::from_columns(vec![
            ("cluster".into(), text(&["a", "b"])),
            (BARCODES.into(), text(&["AAA", "CCC"])),
            (SAMPLE.into(), text(&["s1", "s1"])),
            (X.into(), vec![1.0, 2.0].into()),
            (Y.into(), vec![3.0, 4.0].into()),
            ("depth".into(), vec![10.0, 20.0].into()),
        ])
        .unwrap();
        assert_eq!(
            table.column_names(),
            vec!["barcodes", "sample", "x", "y", "cluster", "depth"]
        );
        assert_eq!(table.single_sample().unwrap(), "s1");
    }

    #[test]
    fn test_from_columns_missing_barcodes() {
        let err = CoordinateTable::from_columns(vec![
            (SAMPLE.into(), text(&["s1"])),
            (X.into(), vec![1.0].into()),
            (Y.into(), vec![1.0].into()),
        ])
        .unwrap_err();
        assert!(matches!(err, ObjectError::InvalidCoordsTable(msg) if msg.contains("barcodes")));
    }

    #[test]
    fn test_from_columns_wrong_type() {
        let err = CoordinateTable::from_columns(vec![
            (BARCODES.into(), text(&["AAA"])),
            (SAMPLE.into(), text(&["s1"])),
            (X.into(), text(&["left"])),
            (Y.into(), vec![1.0].into()),
        ])
        .unwrap_err();
        assert!(matches!(err, ObjectError::InvalidCoordsTable(_)));
    }

    #[test]
    fn test_duplicate_barcodes_per_sample() {
        let bcs = vec!["AAA".to_string(), "AAA".to_string()];
        // Same barcode in two samples is fine.
        assert!(CoordinateTable::new(
            bcs.clone(),
            vec!["s1".into(), "s2".into()],
            vec![0.0; 2],
            vec![0.0; 2]
        )
        .is_ok());
        assert!(CoordinateTable::new(
            bcs,
            vec!["s1".into(), "s1".into()],
            vec![0.0; 2],
            vec![0.0; 2]
        )
        .is_err());
    }

    #[test]
    fn test_single_sample() {
        let table = CoordinateTable::new(
            vec!["A".into(), "B".into()],
            vec!["s1".into(), "s2".into()],
            vec![0.0; 2],
            vec![0.0; 2],
        )
        .unwrap();
        assert_eq!(table.distinct_samples(), vec!["s1", "s2"]);
        assert!(table.single_sample().is_err());

        let empty = CoordinateTable::new(vec![], vec![], vec![], vec![]).unwrap();
        assert!(empty.single_sample().is_err());
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let mut table = CoordinateTable::new(
            vec!["A".into()],
            vec!["s1".into()],
            vec![0.0],
            vec![0.0],
        )
        .unwrap()
        .with_column("first", vec![1.0].into())
        .unwrap()
        .with_column("second", vec![2.0].into())
        .unwrap();
        table.upsert_column("first", vec![9.0].into()).unwrap();
        assert_eq!(table.column_names(), vec!["barcodes", "sample", "x", "y", "first", "second"]);
        assert_eq!(table.column("first"), Some(&Column::Numeric(vec![9.0])));

        assert!(table.upsert_column("x", vec![1.0].into()).is_err());
        assert!(table.upsert_column("third", vec![1.0, 2.0].into()).is_err());
    }

    #[test]
    fn test_column_take() {
        let col = Column::Numeric(vec![1.0, 2.0, 3.0]);
        let taken = col.take(&[Some(2), None, Some(0)]);
        let values = taken.as_numeric().unwrap();
        assert_eq!(values[0], 3.0);
        assert!(values[1].is_nan());
        assert_eq!(values[2], 1.0);

        let cat = text(&["a", "b"]).take(&[Some(1), None]);
        assert_eq!(cat, Column::Categorical(vec![Some("b".into()), None]));
    }

    #[test]
    fn test_feature_table_validation() {
        let barcodes = vec!["A".to_string(), "B".to_string()];
        assert!(FeatureTable::new(vec!["A".into(), "A".into()]).is_err());

        let table = FeatureTable::new(barcodes.clone())
            .unwrap()
            .with_column("nCount", vec![1.0, 2.0].into())
            .unwrap();
        assert!(table.clone().with_column("nCount", vec![1.0, 2.0].into()).is_err());
        assert!(table.clone().with_column("sample", text(&["s", "s"])).is_err());
        assert!(table.clone().with_column("short", vec![1.0].into()).is_err());

        assert_eq!(
            table.align(&["B".into(), "Z".into()]),
            vec![Some(1), None]
        );
        assert_eq!(table.feature_names().collect::<Vec<_>>(), vec!["nCount"]);
    }
}
