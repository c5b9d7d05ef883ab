//! Errors surfaced by a join.

use crate::request::VariableClass;
use itertools::Itertools;
use spatial_object::ObjectError;
use thiserror::Error;

fn quoted(names: &[String]) -> String {
    names.iter().map(|name| format!("'{name}'")).join(", ")
}

/// Every way a join can fail. No join returns a partial result.
#[derive(Debug, Error)]
pub enum JoinError {
    /// The object fails structural validation.
    #[error("Invalid object: {0}")]
    InvalidObject(String),

    /// The coordinates table lacks required columns or spans more than one sample.
    #[error("Invalid coordinates table: {0}")]
    InvalidCoordsTable(String),

    /// Requested names that do not exist in their store.
    #[error("Could not find {class} {} in the object", quoted(.names))]
    UnknownVariable {
        /// Class whose store was searched.
        class: VariableClass,
        /// Every missing name, in request order.
        names: Vec<String>,
    },

    /// The gene set method is not registered.
    #[error("Invalid gene set method '{method}'. Please choose one of {}", quoted(.known))]
    InvalidMethod {
        /// Method that was requested.
        method: String,
        /// Registered methods.
        known: Vec<String>,
    },

    /// The request or its options are malformed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// An enrichment backend failed or returned scores of the wrong shape.
    #[error("Scoring gene set '{gene_set}' with method '{method}' failed")]
    Scoring {
        /// Method in use.
        method: String,
        /// Gene set being scored.
        gene_set: String,
        /// Backend failure.
        source: anyhow::Error,
    },

    /// The smoother failed on a column.
    #[error("Smoothing variable '{variable}' failed")]
    Smoothing {
        /// Column being smoothed.
        variable: String,
        /// Smoother failure.
        source: anyhow::Error,
    },
}

impl From<ObjectError> for JoinError {
    fn from(err: ObjectError) -> Self {
        match err {
            ObjectError::InvalidObject(msg) => JoinError::InvalidObject(msg),
            ObjectError::InvalidCoordsTable(msg) => JoinError::InvalidCoordsTable(msg),
            err @ ObjectError::UnknownSample(_) => JoinError::InvalidCoordsTable(err.to_string()),
            err @ ObjectError::UnknownMatrix { .. } => JoinError::InvalidRequest(err.to_string()),
        }
    }
}
