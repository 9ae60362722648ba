use crate::value::{DimensionValue, DimensionValueId, MetricValue};
use std::fmt;
use std::sync::Arc;

/// Row iterator over one immutable segment.
///
/// A fresh (or freshly [`reset`](Cursor::reset)) cursor is positioned *before* the first row;
/// each successful [`advance`](Cursor::advance) makes the next row current. Selectors read the
/// current row through [`offset`](Cursor::offset).
pub trait Cursor {
    /// Move to the next row. Returns `false` once the cursor is exhausted.
    fn advance(&mut self) -> bool;

    fn is_done(&self) -> bool;

    /// Offset of the current row, valid after `advance` returned `true`.
    fn offset(&self) -> usize;

    /// Rewind to before the first row. Only the bounded multi-pass strategy needs this.
    fn reset(&mut self);
}

/// Dictionary-encoded access to a dimension column.
pub trait DimensionSelector {
    /// Number of distinct ids; every id returned by [`value_ids`](Self::value_ids) must be
    /// below this.
    fn cardinality(&self) -> usize;

    /// Ids of the dimension value(s) stored in row `offset`. Multi-value rows return more than
    /// one id; a row may also return none.
    fn value_ids(&self, offset: usize) -> &[DimensionValueId];

    fn lookup_value(&self, id: DimensionValueId) -> DimensionValue;
}

/// Reads one metric input column for a row.
pub trait MetricSelector {
    /// `None` marks a missing (null) value.
    fn value(&self, offset: usize) -> Option<MetricValue>;
}

/// Factory for cursors and selectors over one segment.
///
/// The engine relies on this trait to:
/// - obtain a fresh cursor per scan
/// - bind the queried dimension and every aggregator input column once, before scanning
pub trait Segment: fmt::Debug + Send + Sync {
    fn id(&self) -> &str;

    fn make_cursor(&self) -> Box<dyn Cursor + '_>;

    /// `None` when the segment has no such dimension; the engine then treats every row as
    /// holding a single null value.
    fn dimension_selector(&self, dimension: &str) -> Option<Box<dyn DimensionSelector + '_>>;

    /// `None` when the segment has no such column; aggregators then observe nulls.
    fn metric_selector(&self, column: &str) -> Option<Box<dyn MetricSelector + '_>>;
}

impl<T: Segment + ?Sized> Segment for &T {
    fn id(&self) -> &str {
        (**self).id()
    }

    fn make_cursor(&self) -> Box<dyn Cursor + '_> {
        (**self).make_cursor()
    }

    fn dimension_selector(&self, dimension: &str) -> Option<Box<dyn DimensionSelector + '_>> {
        (**self).dimension_selector(dimension)
    }

    fn metric_selector(&self, column: &str) -> Option<Box<dyn MetricSelector + '_>> {
        (**self).metric_selector(column)
    }
}

impl<T: Segment + ?Sized> Segment for Arc<T> {
    fn id(&self) -> &str {
        (**self).id()
    }

    fn make_cursor(&self) -> Box<dyn Cursor + '_> {
        (**self).make_cursor()
    }

    fn dimension_selector(&self, dimension: &str) -> Option<Box<dyn DimensionSelector + '_>> {
        (**self).dimension_selector(dimension)
    }

    fn metric_selector(&self, column: &str) -> Option<Box<dyn MetricSelector + '_>> {
        (**self).metric_selector(column)
    }
}

/// Selector for a dimension the segment does not store.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullDimensionSelector;

const NULL_ID: [DimensionValueId; 1] = [0];

impl DimensionSelector for NullDimensionSelector {
    fn cardinality(&self) -> usize {
        1
    }

    fn value_ids(&self, _offset: usize) -> &[DimensionValueId] {
        &NULL_ID
    }

    fn lookup_value(&self, _id: DimensionValueId) -> DimensionValue {
        DimensionValue::Null
    }
}
