use crate::error::{TopNError, TopNResult};
use crate::value::MetricValue;
use std::fmt;
use std::str::FromStr;

/// Running state of one aggregator for one dimension value.
///
/// The built-in aggregators keep their state as a [`MetricValue`] and finalize to it unchanged.
pub type AccumulatorState = MetricValue;

/// Describes how rows fold into a per-value accumulator and how accumulators from different
/// segments combine.
///
/// `update` must be commutative across rows and `combine` associative and commutative; the
/// engine relies on both to make strategy choice and merge order unobservable.
pub trait AggregatorFactory: fmt::Debug + Send + Sync {
    /// Output column name.
    fn name(&self) -> &str;

    /// Segment column read on every row, if any.
    fn input_column(&self) -> Option<&str>;

    fn new_state(&self) -> AccumulatorState;

    /// Fold one row into `state`. `input` is `None` for null or missing values.
    fn update(&self, state: &mut AccumulatorState, input: Option<MetricValue>);

    fn combine(&self, left: MetricValue, right: MetricValue) -> MetricValue;

    fn finalize(&self, state: &AccumulatorState) -> MetricValue {
        *state
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AggregatorKind {
    Count,
    LongSum,
    DoubleSum,
    LongMin,
    LongMax,
    DoubleMin,
    DoubleMax,
}

impl AggregatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::LongSum => "longSum",
            Self::DoubleSum => "doubleSum",
            Self::LongMin => "longMin",
            Self::LongMax => "longMax",
            Self::DoubleMin => "doubleMin",
            Self::DoubleMax => "doubleMax",
        }
    }

    fn needs_input(&self) -> bool {
        !matches!(self, Self::Count)
    }
}

impl FromStr for AggregatorKind {
    type Err = TopNError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "count" => Self::Count,
            "longSum" => Self::LongSum,
            "doubleSum" => Self::DoubleSum,
            "longMin" => Self::LongMin,
            "longMax" => Self::LongMax,
            "doubleMin" => Self::DoubleMin,
            "doubleMax" => Self::DoubleMax,
            other => {
                return Err(TopNError::UnknownAggregator {
                    kind: other.to_string(),
                })
            }
        })
    }
}

impl fmt::Display for AggregatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the built-in aggregators.
#[derive(Clone, Debug, PartialEq)]
pub struct AggregatorSpec {
    name: String,
    kind: AggregatorKind,
    column: Option<String>,
}

impl AggregatorSpec {
    pub fn new(
        name: impl Into<String>,
        kind: AggregatorKind,
        column: Option<String>,
    ) -> TopNResult<Self> {
        let name = name.into();
        if kind.needs_input() && column.is_none() {
            return Err(TopNError::MissingInputColumn { aggregator: name });
        }
        Ok(Self { name, kind, column })
    }

    /// Build from a textual kind such as `"longSum"`; unknown kinds are rejected.
    pub fn parse(name: impl Into<String>, kind: &str, column: Option<&str>) -> TopNResult<Self> {
        Self::new(name, kind.parse()?, column.map(str::to_string))
    }

    pub fn count(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: AggregatorKind::Count,
            column: None,
        }
    }

    pub fn long_sum(name: impl Into<String>, column: impl Into<String>) -> Self {
        Self::with_column(name, AggregatorKind::LongSum, column)
    }

    pub fn double_sum(name: impl Into<String>, column: impl Into<String>) -> Self {
        Self::with_column(name, AggregatorKind::DoubleSum, column)
    }

    pub fn long_min(name: impl Into<String>, column: impl Into<String>) -> Self {
        Self::with_column(name, AggregatorKind::LongMin, column)
    }

    pub fn long_max(name: impl Into<String>, column: impl Into<String>) -> Self {
        Self::with_column(name, AggregatorKind::LongMax, column)
    }

    pub fn double_min(name: impl Into<String>, column: impl Into<String>) -> Self {
        Self::with_column(name, AggregatorKind::DoubleMin, column)
    }

    pub fn double_max(name: impl Into<String>, column: impl Into<String>) -> Self {
        Self::with_column(name, AggregatorKind::DoubleMax, column)
    }

    fn with_column(
        name: impl Into<String>,
        kind: AggregatorKind,
        column: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            column: Some(column.into()),
        }
    }

    pub fn kind(&self) -> AggregatorKind {
        self.kind
    }
}

fn pick_long(left: MetricValue, right: MetricValue, f: fn(i64, i64) -> i64) -> MetricValue {
    match (left.as_i64(), right.as_i64()) {
        (Some(a), Some(b)) => MetricValue::Long(f(a, b)),
        (Some(a), None) | (None, Some(a)) => MetricValue::Long(a),
        (None, None) => MetricValue::Null,
    }
}

fn pick_double(left: MetricValue, right: MetricValue, f: fn(f64, f64) -> f64) -> MetricValue {
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => MetricValue::Double(f(a, b)),
        (Some(a), None) | (None, Some(a)) => MetricValue::Double(a),
        (None, None) => MetricValue::Null,
    }
}

impl AggregatorFactory for AggregatorSpec {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_column(&self) -> Option<&str> {
        self.column.as_deref()
    }

    fn new_state(&self) -> AccumulatorState {
        match self.kind {
            AggregatorKind::Count | AggregatorKind::LongSum => MetricValue::Long(0),
            AggregatorKind::DoubleSum => MetricValue::Double(0.0),
            AggregatorKind::LongMin
            | AggregatorKind::LongMax
            | AggregatorKind::DoubleMin
            | AggregatorKind::DoubleMax => MetricValue::Null,
        }
    }

    fn update(&self, state: &mut AccumulatorState, input: Option<MetricValue>) {
        if self.kind == AggregatorKind::Count {
            *state = MetricValue::Long(state.as_i64().unwrap_or(0).wrapping_add(1));
            return;
        }
        let Some(input) = input else {
            return;
        };
        *state = self.combine(*state, input);
    }

    fn combine(&self, left: MetricValue, right: MetricValue) -> MetricValue {
        match self.kind {
            AggregatorKind::Count | AggregatorKind::LongSum => {
                pick_long(left, right, i64::wrapping_add)
            }
            AggregatorKind::DoubleSum => pick_double(left, right, |a, b| a + b),
            AggregatorKind::LongMin => pick_long(left, right, i64::min),
            AggregatorKind::LongMax => pick_long(left, right, i64::max),
            AggregatorKind::DoubleMin => pick_double(left, right, f64::min),
            AggregatorKind::DoubleMax => pick_double(left, right, f64::max),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    /// Division by zero yields zero.
    Divide,
}

impl ArithmeticOp {
    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            Self::Add => a + b,
            Self::Subtract => a - b,
            Self::Multiply => a * b,
            Self::Divide if b == 0.0 => 0.0,
            Self::Divide => a / b,
        }
    }
}

impl FromStr for ArithmeticOp {
    type Err = TopNError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "+" => Self::Add,
            "-" => Self::Subtract,
            "*" => Self::Multiply,
            "/" => Self::Divide,
            other => {
                return Err(TopNError::UnknownAggregator {
                    kind: format!("arithmetic {other}"),
                })
            }
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PostAggregatorInput {
    /// An aggregator, or a post-aggregator declared earlier in the query.
    Field(String),
    Constant(f64),
}

impl From<&str> for PostAggregatorInput {
    fn from(name: &str) -> Self {
        Self::Field(name.to_string())
    }
}

impl From<f64> for PostAggregatorInput {
    fn from(value: f64) -> Self {
        Self::Constant(value)
    }
}

/// Arithmetic over finalized metrics, evaluated left to right.
#[derive(Clone, Debug, PartialEq)]
pub struct PostAggregator {
    pub name: String,
    pub op: ArithmeticOp,
    pub inputs: Vec<PostAggregatorInput>,
}

impl PostAggregator {
    pub fn arithmetic(
        name: impl Into<String>,
        op: ArithmeticOp,
        inputs: impl IntoIterator<Item = PostAggregatorInput>,
    ) -> Self {
        Self {
            name: name.into(),
            op,
            inputs: inputs.into_iter().collect(),
        }
    }

    /// Resolve field references against the metric columns computed before this one.
    pub(crate) fn bind(&self, available: &[String]) -> TopNResult<BoundPostAggregator> {
        let inputs = self
            .inputs
            .iter()
            .map(|input| match input {
                PostAggregatorInput::Constant(v) => Ok(BoundInput::Constant(*v)),
                PostAggregatorInput::Field(name) => available
                    .iter()
                    .position(|c| c == name)
                    .map(BoundInput::Metric)
                    .ok_or_else(|| TopNError::UnknownMetric {
                        metric: name.clone(),
                    }),
            })
            .collect::<TopNResult<Vec<_>>>()?;
        Ok(BoundPostAggregator { op: self.op, inputs })
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum BoundInput {
    Metric(usize),
    Constant(f64),
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct BoundPostAggregator {
    op: ArithmeticOp,
    inputs: Vec<BoundInput>,
}

impl BoundPostAggregator {
    /// `metrics` holds every column before this post-aggregator; a null input yields null.
    pub(crate) fn compute(&self, metrics: &[MetricValue]) -> MetricValue {
        let mut acc: Option<f64> = None;
        for input in &self.inputs {
            let value = match *input {
                BoundInput::Constant(v) => v,
                BoundInput::Metric(idx) => match metrics.get(idx).and_then(MetricValue::as_f64) {
                    Some(v) => v,
                    None => return MetricValue::Null,
                },
            };
            acc = Some(match acc {
                None => value,
                Some(a) => self.op.apply(a, value),
            });
        }
        acc.map(MetricValue::Double).unwrap_or(MetricValue::Null)
    }
}
