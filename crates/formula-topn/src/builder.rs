//! Per-window accumulator slots and bounded top-N selection.

use crate::aggregator::AccumulatorState;
use crate::bitmap::BitVec;
use crate::query::{RankBy, TopNPlan};
use crate::result::{ResultEntry, TopNResultSet};
use crate::segment::DimensionSelector;
use crate::value::{DimensionValue, DimensionValueId, MetricValue};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::ops::Range;

#[cfg(test)]
use std::cell::Cell;

#[cfg(test)]
thread_local! {
    /// Widest window `ResultBuilder::try_new` reserves on this thread in unit tests.
    pub(crate) static WINDOW_LIMIT: Cell<usize> = const { Cell::new(usize::MAX) };
}

/// Accumulator slots for the dimension ids of one window.
///
/// Slots are laid out id-major (`aggregator_count` states per id) and initialised on the first
/// observation of an id. Memory is bounded by the width of the first window the builder was
/// created for; later windows must not be wider.
pub struct ResultBuilder<'p> {
    plan: &'p TopNPlan,
    stride: usize,
    window: Range<usize>,
    states: Vec<AccumulatorState>,
    occupied: BitVec,
}

impl<'p> ResultBuilder<'p> {
    /// Reserve slots for `window`. Returns `None` when the allocation cannot be reserved.
    pub fn try_new(plan: &'p TopNPlan, window: Range<usize>) -> Option<Self> {
        #[cfg(test)]
        if window.len() > WINDOW_LIMIT.with(|limit| limit.get()) {
            return None;
        }
        let stride = plan.aggregators().len();
        let len = window.len().checked_mul(stride)?;
        let mut states = Vec::new();
        states.try_reserve_exact(len).ok()?;
        states.resize(len, MetricValue::Null);

        Some(Self {
            plan,
            stride,
            occupied: BitVec::with_len_all_false(window.len()),
            window,
            states,
        })
    }

    pub fn window(&self) -> Range<usize> {
        self.window.clone()
    }

    #[inline]
    pub fn contains(&self, id: DimensionValueId) -> bool {
        self.window.contains(&(id as usize))
    }

    /// Number of ids holding live accumulator state.
    pub fn live(&self) -> usize {
        self.occupied.count_ones()
    }

    /// Fold one row into the accumulators of `id`, creating them on first sight.
    ///
    /// `inputs` holds the row's value for each aggregator's input column; `id` must lie inside
    /// the current window.
    #[inline]
    pub fn observe(&mut self, id: DimensionValueId, inputs: &[Option<MetricValue>]) {
        let idx = id as usize - self.window.start;
        let base = idx * self.stride;
        let aggregators = self.plan.aggregators();
        if !self.occupied.replace(idx, true) {
            for (slot, agg) in self.states[base..base + self.stride]
                .iter_mut()
                .zip(aggregators)
            {
                *slot = agg.new_state();
            }
        }
        for ((slot, agg), input) in self.states[base..base + self.stride]
            .iter_mut()
            .zip(aggregators)
            .zip(inputs)
        {
            agg.update(slot, *input);
        }
    }

    /// Finalize every live id into `heap` and release all state.
    pub fn drain_into(&mut self, heap: &mut TopNHeap, selector: &dyn DimensionSelector) {
        let aggregators = self.plan.aggregators();
        let mut metrics: Vec<MetricValue> = Vec::with_capacity(self.plan.columns().len());
        for idx in self.occupied.iter_ones() {
            let id = (self.window.start + idx) as DimensionValueId;
            let dimension = selector.lookup_value(id);
            if !self.plan.admits(&dimension) {
                continue;
            }

            let base = idx * self.stride;
            metrics.clear();
            metrics.extend(
                self.states[base..base + self.stride]
                    .iter()
                    .zip(aggregators)
                    .map(|(state, agg)| agg.finalize(state)),
            );
            self.plan.compute_post_aggregators(&mut metrics);
            heap.offer(dimension, &metrics);
        }
        self.occupied.reset(self.window.len());
    }

    /// Move to the next window, dropping all accumulator state of the current one.
    pub fn reset(&mut self, window: Range<usize>) {
        debug_assert!(
            window.len() * self.stride <= self.states.capacity(),
            "window wider than reserved scratch"
        );
        self.states.clear();
        self.states.resize(window.len() * self.stride, MetricValue::Null);
        self.occupied.reset(window.len());
        self.window = window;
    }
}

struct Ranked {
    rank_by: RankBy,
    entry: ResultEntry,
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank_by.compare(
            &self.entry.dimension,
            &self.entry.metrics,
            &other.entry.dimension,
            &other.entry.metrics,
        )
    }
}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

/// Keeps the best `limit` candidates seen so far.
///
/// The heap's top is the current worst retained candidate, so a candidate that cannot beat it
/// is rejected before its metrics are copied.
pub struct TopNHeap {
    limit: usize,
    rank_by: RankBy,
    heap: BinaryHeap<Ranked>,
}

impl TopNHeap {
    pub fn new(plan: &TopNPlan) -> Self {
        Self::with_limit(plan, plan.threshold())
    }

    pub fn with_limit(plan: &TopNPlan, limit: usize) -> Self {
        Self {
            limit,
            rank_by: plan.rank_by(),
            heap: BinaryHeap::with_capacity(limit.saturating_add(1).min(4096)),
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Whether a candidate would currently be retained.
    pub fn admits(&self, dimension: &DimensionValue, metrics: &[MetricValue]) -> bool {
        if self.limit == 0 {
            return false;
        }
        if self.heap.len() < self.limit {
            return true;
        }
        self.heap.peek().is_some_and(|worst| {
            self.rank_by.compare(
                dimension,
                metrics,
                &worst.entry.dimension,
                &worst.entry.metrics,
            ) == Ordering::Less
        })
    }

    /// Offer a candidate; returns whether it was retained.
    pub fn offer(&mut self, dimension: DimensionValue, metrics: &[MetricValue]) -> bool {
        if !self.admits(&dimension, metrics) {
            return false;
        }
        self.push(ResultEntry {
            dimension,
            metrics: metrics.to_vec(),
        });
        true
    }

    pub fn offer_entry(&mut self, entry: ResultEntry) -> bool {
        if !self.admits(&entry.dimension, &entry.metrics) {
            return false;
        }
        self.push(entry);
        true
    }

    fn push(&mut self, entry: ResultEntry) {
        if self.heap.len() >= self.limit {
            self.heap.pop();
        }
        self.heap.push(Ranked {
            rank_by: self.rank_by,
            entry,
        });
    }

    /// Ranked result, best first.
    pub fn into_result(self, plan: &TopNPlan) -> TopNResultSet {
        let entries = self
            .heap
            .into_sorted_vec()
            .into_iter()
            .map(|r| r.entry)
            .collect();
        TopNResultSet::new(plan.columns().clone(), entries)
    }
}
