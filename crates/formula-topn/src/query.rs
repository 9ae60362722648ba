use crate::aggregator::{AggregatorFactory, BoundPostAggregator, PostAggregator};
use crate::error::{TopNError, TopNResult};
use crate::value::{DimensionValue, MetricValue};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SortOrder {
    /// Highest metric first.
    #[default]
    Descending,
    Ascending,
}

/// What a top-N query ranks dimension values by.
#[derive(Clone, Debug, PartialEq)]
pub enum TopNMetricSpec {
    /// An aggregator or post-aggregator output.
    Numeric { metric: String, order: SortOrder },
    /// The dimension value itself. `previous_stop` pages through results: only values strictly
    /// after it (in `order`) are returned.
    Lexicographic {
        previous_stop: Option<DimensionValue>,
        order: SortOrder,
    },
}

impl TopNMetricSpec {
    pub fn numeric(metric: impl Into<String>) -> Self {
        Self::Numeric {
            metric: metric.into(),
            order: SortOrder::Descending,
        }
    }

    /// Lowest metric first.
    pub fn inverted(metric: impl Into<String>) -> Self {
        Self::Numeric {
            metric: metric.into(),
            order: SortOrder::Ascending,
        }
    }

    pub fn lexicographic() -> Self {
        Self::Lexicographic {
            previous_stop: None,
            order: SortOrder::Ascending,
        }
    }

    pub fn lexicographic_after(previous_stop: impl Into<DimensionValue>) -> Self {
        Self::Lexicographic {
            previous_stop: Some(previous_stop.into()),
            order: SortOrder::Ascending,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TopNQuery {
    pub dimension: String,
    pub metric: TopNMetricSpec,
    pub threshold: usize,
    pub aggregators: Vec<Arc<dyn AggregatorFactory>>,
    pub post_aggregators: Vec<PostAggregator>,
}

impl TopNQuery {
    pub fn new(dimension: impl Into<String>, metric: TopNMetricSpec, threshold: usize) -> Self {
        Self {
            dimension: dimension.into(),
            metric,
            threshold,
            aggregators: Vec::new(),
            post_aggregators: Vec::new(),
        }
    }

    pub fn with_aggregator(mut self, aggregator: impl AggregatorFactory + 'static) -> Self {
        self.aggregators.push(Arc::new(aggregator));
        self
    }

    pub fn with_post_aggregator(mut self, post_aggregator: PostAggregator) -> Self {
        self.post_aggregators.push(post_aggregator);
        self
    }

    /// Validate the query and resolve names into column positions.
    pub fn plan(&self) -> TopNResult<TopNPlan> {
        if self.threshold == 0 {
            return Err(TopNError::InvalidThreshold(self.threshold));
        }

        let mut seen = HashSet::new();
        let mut columns: Vec<String> = Vec::new();
        for agg in &self.aggregators {
            if !seen.insert(agg.name().to_string()) {
                return Err(TopNError::DuplicateMetric {
                    name: agg.name().to_string(),
                });
            }
            columns.push(agg.name().to_string());
        }

        let mut post_aggregators = Vec::with_capacity(self.post_aggregators.len());
        for post in &self.post_aggregators {
            post_aggregators.push(post.bind(&columns)?);
            if !seen.insert(post.name.clone()) {
                return Err(TopNError::DuplicateMetric {
                    name: post.name.clone(),
                });
            }
            columns.push(post.name.clone());
        }

        let (rank_by, previous_stop) = match &self.metric {
            TopNMetricSpec::Numeric { metric, order } => {
                let index = columns.iter().position(|c| c == metric).ok_or_else(|| {
                    TopNError::UnknownMetric {
                        metric: metric.clone(),
                    }
                })?;
                (
                    RankBy::Metric {
                        index,
                        order: *order,
                    },
                    None,
                )
            }
            TopNMetricSpec::Lexicographic {
                previous_stop,
                order,
            } => (RankBy::Dimension { order: *order }, previous_stop.clone()),
        };

        Ok(TopNPlan {
            dimension: self.dimension.clone(),
            aggregators: self.aggregators.clone(),
            post_aggregators,
            columns: columns.into(),
            rank_by,
            previous_stop,
            threshold: self.threshold,
        })
    }
}

/// How two candidates compare; `Less` means the left one ranks first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RankBy {
    Metric { index: usize, order: SortOrder },
    Dimension { order: SortOrder },
}

impl RankBy {
    /// Null metrics rank last in either order; equal metrics fall back to ascending dimension
    /// value so output never depends on scan or merge order.
    pub(crate) fn compare(
        self,
        a_dim: &DimensionValue,
        a_metrics: &[MetricValue],
        b_dim: &DimensionValue,
        b_metrics: &[MetricValue],
    ) -> Ordering {
        match self {
            Self::Metric { index, order } => {
                let a = a_metrics.get(index).copied().unwrap_or(MetricValue::Null);
                let b = b_metrics.get(index).copied().unwrap_or(MetricValue::Null);
                let primary = match (a.is_null(), b.is_null()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Greater,
                    (false, true) => Ordering::Less,
                    (false, false) => match order {
                        SortOrder::Descending => b.total_cmp(&a),
                        SortOrder::Ascending => a.total_cmp(&b),
                    },
                };
                primary.then_with(|| a_dim.cmp(b_dim))
            }
            Self::Dimension { order } => match order {
                SortOrder::Ascending => a_dim.cmp(b_dim),
                SortOrder::Descending => b_dim.cmp(a_dim),
            },
        }
    }
}

/// A validated query with names resolved to column positions.
///
/// Metric columns are the aggregators in declaration order followed by the post-aggregators.
#[derive(Clone, Debug)]
pub struct TopNPlan {
    dimension: String,
    aggregators: Vec<Arc<dyn AggregatorFactory>>,
    post_aggregators: Vec<BoundPostAggregator>,
    columns: Arc<[String]>,
    rank_by: RankBy,
    previous_stop: Option<DimensionValue>,
    threshold: usize,
}

impl TopNPlan {
    pub fn dimension(&self) -> &str {
        &self.dimension
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn columns(&self) -> &Arc<[String]> {
        &self.columns
    }

    pub fn aggregators(&self) -> &[Arc<dyn AggregatorFactory>] {
        &self.aggregators
    }

    /// Same plan retaining `threshold` candidates; used to widen per-segment results before a
    /// cross-segment merge.
    pub fn with_threshold(&self, threshold: usize) -> TopNResult<Self> {
        if threshold == 0 {
            return Err(TopNError::InvalidThreshold(threshold));
        }
        Ok(Self {
            threshold,
            ..self.clone()
        })
    }

    pub(crate) fn rank_by(&self) -> RankBy {
        self.rank_by
    }

    /// Append post-aggregator outputs to a row holding finalized aggregator values.
    pub(crate) fn compute_post_aggregators(&self, metrics: &mut Vec<MetricValue>) {
        metrics.truncate(self.aggregators.len());
        for post in &self.post_aggregators {
            let value = post.compute(metrics);
            metrics.push(value);
        }
    }

    /// Whether a dimension value lies past the lexicographic `previous_stop`.
    pub(crate) fn admits(&self, dimension: &DimensionValue) -> bool {
        let Some(stop) = &self.previous_stop else {
            return true;
        };
        match self.rank_by {
            RankBy::Dimension {
                order: SortOrder::Ascending,
            } => dimension > stop,
            RankBy::Dimension {
                order: SortOrder::Descending,
            } => dimension < stop,
            RankBy::Metric { .. } => true,
        }
    }
}
