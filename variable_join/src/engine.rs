//! Orchestration of a join: validation, resolution, aggregation, post
//! processing and merging onto a copy of the coordinates table.

use crate::aggregate::ScoreAggregator;
use crate::errors::JoinError;
use crate::postprocess::PostProcessor;
use crate::progress::{LogReporter, ProgressReporter};
use crate::request::{JoinOptions, VariableClass, VariableRequest};
use crate::resolve::{ResolvedClass, VariableResolver};
use crate::scaling::Normalizer;
use crate::scoring::{ScoringMethod, ScoringRegistry};
use crate::smoothing::{LoessSmoother, Smoother};
use log::debug;
use spatial_object::{CoordinateTable, SpatialObject};

/// The coordinates table with the joined variables appended.
pub type JoinedTable = CoordinateTable;

/// A validated class of a request, ready to be computed.
enum Step<'a> {
    Features(Vec<String>),
    Genes(Vec<String>),
    GeneSets(Vec<String>, &'a dyn ScoringMethod),
}

impl Step<'_> {
    fn class(&self) -> VariableClass {
        match self {
            Step::Features(_) => VariableClass::Features,
            Step::Genes(_) => VariableClass::Genes,
            Step::GeneSets(..) => VariableClass::GeneSets,
        }
    }
}

/// Joins variables onto coordinates tables.
///
/// Holds the pluggable pieces of a join: the gene set scoring methods, the
/// smoother, the normalizer and the progress reporter. Without an explicit
/// normalizer, the one named by [`JoinOptions::normalization`] is used.
pub struct VariableJoiner {
    registry: ScoringRegistry,
    smoother: Box<dyn Smoother>,
    normalizer: Option<Box<dyn Normalizer>>,
    reporter: Box<dyn ProgressReporter>,
}

impl Default for VariableJoiner {
    fn default() -> Self {
        VariableJoiner {
            registry: ScoringRegistry::default(),
            smoother: Box::new(LoessSmoother::default()),
            normalizer: None,
            reporter: Box::new(LogReporter),
        }
    }
}

impl VariableJoiner {
    /// Joiner with the built in methods, LOESS smoothing and log output.
    pub fn new() -> Self {
        VariableJoiner::default()
    }

    /// Replace the scoring methods.
    pub fn with_registry(mut self, registry: ScoringRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Add a scoring method, replacing a method of the same name.
    pub fn with_scoring_method(mut self, method: impl ScoringMethod + 'static) -> Self {
        self.registry.register(Box::new(method));
        self
    }

    /// Replace the smoother.
    pub fn with_smoother(mut self, smoother: impl Smoother + 'static) -> Self {
        self.smoother = Box::new(smoother);
        self
    }

    /// Use `normalizer` regardless of [`JoinOptions::normalization`].
    pub fn with_normalizer(mut self, normalizer: impl Normalizer + 'static) -> Self {
        self.normalizer = Some(Box::new(normalizer));
        self
    }

    /// Send progress messages to `reporter`.
    pub fn with_reporter(mut self, reporter: impl ProgressReporter + 'static) -> Self {
        self.reporter = Box::new(reporter);
        self
    }

    /// Registered scoring methods.
    pub fn registry(&self) -> &ScoringRegistry {
        &self.registry
    }

    fn method(&self, name: &str) -> Result<&dyn ScoringMethod, JoinError> {
        self.registry
            .get(name)
            .ok_or_else(|| JoinError::InvalidMethod {
                method: name.to_string(),
                known: self.registry.names(),
            })
    }

    /// Attach what a resolved class needs to be computed. Fails on an unknown
    /// gene set method before anything is computed.
    fn plan<'a>(
        &'a self,
        resolved: ResolvedClass,
        method_gs: &str,
    ) -> Result<Step<'a>, JoinError> {
        let ResolvedClass { class, names } = resolved;
        Ok(match class {
            VariableClass::Features => Step::Features(names),
            VariableClass::Genes => Step::Genes(names),
            VariableClass::GeneSets => Step::GeneSets(names, self.method(method_gs)?),
        })
    }

    /// Join the variables of `request` onto a copy of `coords`.
    ///
    /// The whole request is validated before any value is computed, so a
    /// failing join never reports progress or calls a scoring method. Rows
    /// of the result are the rows of `coords`, in the same order. Barcodes
    /// unknown to the sample get missing values.
    pub fn join(
        &self,
        object: &SpatialObject,
        coords: &CoordinateTable,
        request: &VariableRequest,
        options: &JoinOptions,
    ) -> Result<JoinedTable, JoinError> {
        options.validate()?;
        let sample = coords.single_sample()?;
        let matrix = object.matrix_for(sample, options.mtr_name.as_deref())?;
        let features = object.features_for(sample)?;

        let steps = VariableResolver::new(matrix, features, object.gene_sets())
            .resolve_request(request, options.average_genes)?
            .into_iter()
            .map(|resolved| self.plan(resolved, &options.method_gs))
            .collect::<Result<Vec<_>, _>>()?;

        let reporter = options.verbose.then_some(&*self.reporter);
        let normalizer: &dyn Normalizer = match &self.normalizer {
            Some(normalizer) => &**normalizer,
            None => &options.normalization,
        };
        let post = PostProcessor {
            smoother: options
                .smooth
                .then_some((&*self.smoother, options.smooth_span)),
            normalizer: options.normalize.then_some(normalizer),
            reporter,
        };
        let aggregator =
            ScoreAggregator::new(matrix, features, object.gene_sets(), coords.barcodes());

        let mut joined = coords.clone();
        for step in steps {
            let class = step.class();
            let mut columns = match step {
                Step::Features(names) => aggregator.features(&names)?,
                Step::Genes(names) => aggregator.genes(&names, options.average_genes)?,
                Step::GeneSets(names, method) => {
                    aggregator.gene_sets(&names, method, reporter)?
                }
            };
            post.apply(class, &mut columns, coords.x(), coords.y())?;
            debug!("joining {} {class} onto sample '{sample}'", columns.len());
            for (name, column) in columns {
                joined.upsert_column(&name, column)?;
            }
        }
        Ok(joined)
    }
}

/// Join with a default [`VariableJoiner`].
pub fn join(
    object: &SpatialObject,
    coords: &CoordinateTable,
    request: &VariableRequest,
    options: &JoinOptions,
) -> Result<JoinedTable, JoinError> {
    VariableJoiner::default().join(object, coords, request, options)
}
