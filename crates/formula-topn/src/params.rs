use crate::query::TopNPlan;
use crate::segment::{Cursor, DimensionSelector, MetricSelector, NullDimensionSelector, Segment};
use std::fmt;
use std::num::NonZeroUsize;

/// Everything one segment scan consumes: the cursor, the bound dimension selector, one input
/// selector per aggregator and the scratch bound.
pub struct TopNParams<'a> {
    pub(crate) dim_selector: Box<dyn DimensionSelector + 'a>,
    pub(crate) cursor: Box<dyn Cursor + 'a>,
    /// Aligned with the plan's aggregators; `None` for count or a missing column.
    pub(crate) metric_inputs: Vec<Option<Box<dyn MetricSelector + 'a>>>,
    cardinality: usize,
    num_values_per_pass: Option<NonZeroUsize>,
}

impl<'a> TopNParams<'a> {
    pub fn new(
        dim_selector: Box<dyn DimensionSelector + 'a>,
        cursor: Box<dyn Cursor + 'a>,
        metric_inputs: Vec<Option<Box<dyn MetricSelector + 'a>>>,
        num_values_per_pass: Option<NonZeroUsize>,
    ) -> Self {
        let cardinality = dim_selector.cardinality();
        Self {
            dim_selector,
            cursor,
            metric_inputs,
            cardinality,
            num_values_per_pass,
        }
    }

    /// Bind the plan's dimension and aggregator inputs against `segment`.
    pub fn from_segment(
        segment: &'a dyn Segment,
        plan: &TopNPlan,
        num_values_per_pass: Option<NonZeroUsize>,
    ) -> Self {
        let dim_selector: Box<dyn DimensionSelector + 'a> =
            match segment.dimension_selector(plan.dimension()) {
                Some(selector) => selector,
                None => Box::new(NullDimensionSelector),
            };
        let metric_inputs = plan
            .aggregators()
            .iter()
            .map(|agg| agg.input_column().and_then(|c| segment.metric_selector(c)))
            .collect();
        Self::new(
            dim_selector,
            segment.make_cursor(),
            metric_inputs,
            num_values_per_pass,
        )
    }

    pub fn cardinality(&self) -> usize {
        self.cardinality
    }

    pub fn num_values_per_pass(&self) -> Option<NonZeroUsize> {
        self.num_values_per_pass
    }
}

impl fmt::Debug for TopNParams<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopNParams")
            .field("cardinality", &self.cardinality)
            .field("num_values_per_pass", &self.num_values_per_pass)
            .field("metric_inputs", &self.metric_inputs.len())
            .finish()
    }
}
