use ordered_float::OrderedFloat;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Index into one segment's dimension dictionary.
///
/// Ids are only meaningful against the dictionary that produced them and are never compared
/// across segments.
pub type DimensionValueId = u32;

/// A resolved dimension value.
///
/// Ordering is total: `Null` sorts before every string, strings sort lexicographically by
/// their UTF-8 bytes. This is the tie-break order for equal ranking metrics.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DimensionValue {
    Null,
    String(Arc<str>),
}

impl DimensionValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Null => None,
            Self::String(s) => Some(s.as_ref()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<&str> for DimensionValue {
    fn from(value: &str) -> Self {
        Self::String(Arc::from(value))
    }
}

impl From<Arc<str>> for DimensionValue {
    fn from(value: Arc<str>) -> Self {
        Self::String(value)
    }
}

impl From<Option<&str>> for DimensionValue {
    fn from(value: Option<&str>) -> Self {
        value.map(Self::from).unwrap_or(Self::Null)
    }
}

impl fmt::Display for DimensionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("<null>"),
            Self::String(s) => f.write_str(s),
        }
    }
}

/// A finalized metric (or the running state of a built-in aggregator).
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MetricValue {
    Null,
    Long(i64),
    Double(f64),
}

impl MetricValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Null => None,
            Self::Long(v) => Some(v as f64),
            Self::Double(v) => Some(v),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::Null => None,
            Self::Long(v) => Some(v),
            Self::Double(v) => Some(v as i64),
        }
    }

    /// Total order over metric values: `Null` first, then numbers.
    ///
    /// Longs compare exactly against longs. Mixed long/double pairs compare numerically and
    /// fall back to "long before double" when numerically equal so the order stays total.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Null, _) => Ordering::Less,
            (_, Self::Null) => Ordering::Greater,
            (Self::Long(a), Self::Long(b)) => a.cmp(b),
            (Self::Double(a), Self::Double(b)) => OrderedFloat(*a).cmp(&OrderedFloat(*b)),
            (Self::Long(a), Self::Double(b)) => OrderedFloat(*a as f64)
                .cmp(&OrderedFloat(*b))
                .then(Ordering::Less),
            (Self::Double(a), Self::Long(b)) => OrderedFloat(*a)
                .cmp(&OrderedFloat(*b as f64))
                .then(Ordering::Greater),
        }
    }
}

impl From<i64> for MetricValue {
    fn from(value: i64) -> Self {
        Self::Long(value)
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
        }
    }
}

/// A single cell handed to [`crate::InMemorySegmentBuilder::append_row`].
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Long(i64),
    Double(f64),
    String(Arc<str>),
    /// A multi-value dimension cell; the row counts once towards every listed value.
    Multi(Vec<Arc<str>>),
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(Arc::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Long(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<&[&str]> for Value {
    fn from(values: &[&str]) -> Self {
        Self::Multi(values.iter().map(|v| Arc::<str>::from(*v)).collect())
    }
}
