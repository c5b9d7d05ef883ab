//! Error type of the spatial object model.

use thiserror::Error;

/// Failures raised while building or querying a [`crate::SpatialObject`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObjectError {
    /// The object (or one of its matrices or feature tables) is structurally invalid.
    #[error("Invalid object: {0}")]
    InvalidObject(String),

    /// The coordinates table is missing required columns or is inconsistent.
    #[error("Invalid coordinates table: {0}")]
    InvalidCoordsTable(String),

    /// The requested sample is not part of the object.
    #[error("Sample '{0}' is not known. Make sure the coordinates belong to this object.")]
    UnknownSample(String),

    /// The requested expression matrix does not exist for the sample.
    #[error("Expression matrix '{name}' does not exist for sample '{sample}'")]
    UnknownMatrix {
        /// Sample that was queried.
        sample: String,
        /// Matrix name that was requested.
        name: String,
    },
}
