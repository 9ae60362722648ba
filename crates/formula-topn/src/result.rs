use crate::value::{DimensionValue, MetricValue};
use std::sync::Arc;

/// One ranked dimension value with its finalized metrics.
#[derive(Clone, Debug, PartialEq)]
pub struct ResultEntry {
    pub dimension: DimensionValue,
    /// Aligned with [`TopNResultSet::columns`].
    pub metrics: Vec<MetricValue>,
}

/// Ranked output of one segment scan or of a cross-segment merge.
#[derive(Clone, Debug, PartialEq)]
pub struct TopNResultSet {
    columns: Arc<[String]>,
    entries: Vec<ResultEntry>,
}

impl TopNResultSet {
    pub(crate) fn new(columns: Arc<[String]>, entries: Vec<ResultEntry>) -> Self {
        Self { columns, entries }
    }

    pub fn empty(columns: Arc<[String]>) -> Self {
        Self::new(columns, Vec::new())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn entries(&self) -> &[ResultEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<ResultEntry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimensions(&self) -> impl Iterator<Item = &DimensionValue> + '_ {
        self.entries.iter().map(|e| &e.dimension)
    }

    /// Value of metric `column` for the entry at `rank` (0-based).
    pub fn metric(&self, rank: usize, column: &str) -> Option<MetricValue> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.entries.get(rank)?.metrics.get(idx).copied()
    }

    /// `(dimension, metric)` pairs for one metric column, in rank order.
    pub fn pairs(&self, column: &str) -> Vec<(DimensionValue, MetricValue)> {
        let Some(idx) = self.columns.iter().position(|c| c == column) else {
            return Vec::new();
        };
        self.entries
            .iter()
            .map(|e| {
                (
                    e.dimension.clone(),
                    e.metrics.get(idx).copied().unwrap_or(MetricValue::Null),
                )
            })
            .collect()
    }
}
