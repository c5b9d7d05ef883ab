//! Named gene collections used for aggregate expression scores.
#![allow(missing_docs)]

use crate::matrix::ExpressionMatrix;
use itertools::Itertools;
use std::collections::BTreeMap;

/// Gene set class: the part of the name before the first underscore
/// (`HM` for `HM_HYPOXIA`). Names without an underscore are their own class.
pub fn gene_set_class(name: &str) -> &str {
    name.split_once('_').map_or(name, |(class, _)| class)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneSetCatalog {
    sets: BTreeMap<String, Vec<String>>,
}

impl GeneSetCatalog {
    pub fn new() -> Self {
        GeneSetCatalog::default()
    }

    /// Add or replace a gene set. Repeated members are kept once.
    pub fn insert<S: Into<String>>(
        &mut self,
        name: impl Into<String>,
        genes: impl IntoIterator<Item = S>,
    ) -> Option<Vec<String>> {
        let genes: Vec<String> = genes.into_iter().map(Into::into).unique().collect();
        self.sets.insert(name.into(), genes)
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sets.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.sets.keys().map(String::as_str)
    }

    pub fn members(&self, name: &str) -> Option<&[String]> {
        self.sets.get(name).map(Vec::as_slice)
    }

    /// Members of `name` that are rows of `matrix`, in catalog order.
    ///
    /// Members missing from the matrix are dropped silently. Returns `None`
    /// only when the gene set itself is unknown.
    pub fn effective_genes(&self, name: &str, matrix: &ExpressionMatrix) -> Option<Vec<String>> {
        self.members(name).map(|genes| {
            genes
                .iter()
                .filter(|gene| matrix.contains_gene(gene))
                .cloned()
                .collect()
        })
    }

    /// Distinct gene set classes, sorted.
    pub fn classes(&self) -> Vec<&str> {
        self.names().map(gene_set_class).unique().collect()
    }

    pub fn of_class<'a>(&'a self, class: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.names()
            .filter(move |name| gene_set_class(name) == class)
    }
}

impl<N, G, S> FromIterator<(N, G)> for GeneSetCatalog
where
    N: Into<String>,
    G: IntoIterator<Item = S>,
    S: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (N, G)>>(iter: I) -> Self {
        let mut catalog = GeneSetCatalog::new();
        for (name, genes) in iter {
            catalog.insert(name, genes);
        }
        catalog
    }
}
