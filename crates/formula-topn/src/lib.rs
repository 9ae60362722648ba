//! Top-N query core over dictionary-encoded segments.
//!
//! This crate focuses on:
//! - Choosing between a single-pass and a bounded multi-pass scan per segment, by dimension
//!   cardinality and scratch budget, without changing the answer.
//! - A tight per-row scan loop feeding lazily created accumulators.
//! - Merging per-segment rankings into one global top-N, independent of segment arrival order.

#![forbid(unsafe_code)]

mod aggregator;
mod algorithm;
mod bitmap;
mod builder;
mod cancel;
mod config;
mod error;
mod executor;
mod memory;
mod merge;
mod parallel;
mod params;
mod query;
mod result;
mod runner;
mod segment;
mod value;

pub use crate::aggregator::{
    AccumulatorState, AggregatorFactory, AggregatorKind, AggregatorSpec, ArithmeticOp,
    PostAggregator, PostAggregatorInput,
};
pub use crate::algorithm::{bytes_per_value, select, values_for_budget, AlgorithmKind};
pub use crate::builder::{ResultBuilder, TopNHeap};
pub use crate::cancel::{QueryCancellation, ScanGuard};
pub use crate::config::{FailurePolicy, TopNConfig, DEFAULT_MIN_TOP_N_THRESHOLD};
pub use crate::error::{TopNError, TopNResult};
pub use crate::executor::run_topn;
pub use crate::memory::{
    ColumnSchema, ColumnType, InMemorySegment, InMemorySegmentBuilder, MemoryCursor,
};
pub use crate::merge::{merge_results, TopNMerger};
pub use crate::params::TopNParams;
pub use crate::query::{SortOrder, TopNMetricSpec, TopNPlan, TopNQuery};
pub use crate::result::{ResultEntry, TopNResultSet};
pub use crate::runner::{scan_segment, TopNRunner};
pub use crate::segment::{
    Cursor, DimensionSelector, MetricSelector, NullDimensionSelector, Segment,
};
pub use crate::value::{DimensionValue, DimensionValueId, MetricValue, Value};
