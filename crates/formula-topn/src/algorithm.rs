use crate::aggregator::AccumulatorState;
use std::num::NonZeroUsize;
use std::ops::Range;

/// Execution strategy for one segment scan, resolved once before the scan starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlgorithmKind {
    /// Every dictionary id gets an accumulator slot; one cursor traversal.
    SinglePass,
    /// At most `values_per_pass` live accumulators; the cursor is rewound once per window of
    /// ids.
    MultiPass {
        values_per_pass: NonZeroUsize,
        passes: usize,
    },
}

impl AlgorithmKind {
    /// The id windows this strategy scans, in order. Windows are disjoint and together cover
    /// `[0, cardinality)` exactly once.
    pub fn windows(&self, cardinality: usize) -> impl Iterator<Item = Range<usize>> {
        let width = match self {
            // A single (possibly empty) window so the scan still validates every row's ids.
            Self::SinglePass => cardinality.max(1),
            Self::MultiPass {
                values_per_pass, ..
            } => values_per_pass.get(),
        };
        let starts = if cardinality == 0 && matches!(self, Self::SinglePass) {
            0..1
        } else {
            0..cardinality
        };
        starts
            .step_by(width)
            .map(move |start| start..(start + width).min(cardinality))
    }

    pub fn passes(&self) -> usize {
        match self {
            Self::SinglePass => 1,
            Self::MultiPass { passes, .. } => *passes,
        }
    }
}

/// Scratch slots one dimension value needs: one accumulator per aggregator plus an occupancy bit
/// (rounded up to a byte).
pub fn bytes_per_value(aggregator_count: usize) -> usize {
    aggregator_count.max(1) * std::mem::size_of::<AccumulatorState>() + 1
}

/// How many values a byte budget can hold for `aggregator_count` aggregators (at least one).
pub fn values_for_budget(scratch_bytes: usize, aggregator_count: usize) -> NonZeroUsize {
    NonZeroUsize::new(scratch_bytes / bytes_per_value(aggregator_count))
        .unwrap_or(NonZeroUsize::MIN)
}

/// Choose a strategy for one scan.
///
/// `values_per_pass` is the scratch bound; `None` means unbounded, which always selects the
/// single-pass strategy. The decision depends on `cardinality` and the bound only;
/// `threshold` and `aggregator_count` are reported in the debug log.
pub fn select(
    cardinality: usize,
    threshold: usize,
    aggregator_count: usize,
    values_per_pass: Option<NonZeroUsize>,
) -> AlgorithmKind {
    let kind = match values_per_pass {
        Some(limit) if cardinality > limit.get() => AlgorithmKind::MultiPass {
            values_per_pass: limit,
            passes: cardinality.div_ceil(limit.get()),
        },
        _ => AlgorithmKind::SinglePass,
    };
    log::debug!(
        "top-n strategy {kind:?} (cardinality={cardinality}, threshold={threshold}, \
         aggregators={aggregator_count})"
    );
    kind
}
