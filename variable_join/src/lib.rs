//! variable_join
//!
//! Joins per-barcode variables of a spatial object (stored features,
//! expression of genes and gene set scores) onto a coordinates table, with
//! optional spatial smoothing and rescaling of the new columns.
#![deny(missing_docs)]

pub mod aggregate;
pub mod engine;
pub mod errors;
pub mod postprocess;
pub mod progress;
pub mod request;
pub mod resolve;
pub mod scaling;
pub mod scoring;
pub mod smoothing;

#[cfg(test)]
mod testing;

pub use aggregate::MEAN_GENES;
pub use engine::{join, JoinedTable, VariableJoiner};
pub use errors::JoinError;
pub use progress::{LogReporter, ProgressReporter};
pub use request::{Bundle, JoinOptions, VariableClass, VariableRequest};
pub use scaling::{Normalize, Normalizer};
pub use scoring::{PreparedScoring, ScoringMethod, ScoringRegistry};
pub use smoothing::{LoessSmoother, Smoother};
