pub type TopNResult<T> = Result<T, TopNError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TopNError {
    #[error("invalid threshold {0}: a top-N query must request at least one value")]
    InvalidThreshold(usize),

    #[error("invalid scratch bound: numValuesPerPass must be positive")]
    InvalidScratchBound,

    #[error("unknown aggregator kind: {kind}")]
    UnknownAggregator { kind: String },

    #[error("aggregator {aggregator} requires an input column")]
    MissingInputColumn { aggregator: String },

    #[error("unknown metric: {metric}")]
    UnknownMetric { metric: String },

    #[error("duplicate metric name: {name}")]
    DuplicateMetric { name: String },

    #[error("schema mismatch for segment {segment}: expected {expected} values, got {actual}")]
    SchemaMismatch {
        segment: String,
        expected: usize,
        actual: usize,
    },

    #[error("dimension column {column} of segment {segment} exceeds the 32-bit id space")]
    DimensionOverflow { segment: String, column: String },

    #[error("dimension value id {id} is outside the dictionary (cardinality {cardinality})")]
    IdOutOfRange { id: u32, cardinality: usize },

    #[error("cursor produced a row after reporting exhaustion")]
    CursorOverrun,

    #[error("query cancelled")]
    Cancelled,

    #[error("query timed out")]
    Timeout,

    #[error("segment {segment} failed: {source}")]
    Segment {
        segment: String,
        #[source]
        source: Box<TopNError>,
    },
}

impl TopNError {
    /// Faults that indicate corrupt segment data rather than a bad query.
    ///
    /// These abort the offending segment's scan; whether they also fail the query depends on
    /// the configured [`crate::FailurePolicy`].
    pub fn is_data_integrity(&self) -> bool {
        match self {
            Self::IdOutOfRange { .. } | Self::CursorOverrun => true,
            Self::Segment { source, .. } => source.is_data_integrity(),
            _ => false,
        }
    }

    pub(crate) fn in_segment(self, segment: &str) -> Self {
        match self {
            Self::Cancelled | Self::Timeout | Self::Segment { .. } => self,
            other => Self::Segment {
                segment: segment.to_string(),
                source: Box::new(other),
            },
        }
    }
}
