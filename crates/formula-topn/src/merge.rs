//! Cross-segment merge of local rankings.

use crate::builder::TopNHeap;
use crate::query::TopNPlan;
use crate::result::{ResultEntry, TopNResultSet};
use crate::value::{DimensionValue, MetricValue};
use ahash::AHashMap;
use std::cmp::Ordering;

/// Folds per-segment results into one global ranking.
///
/// Contributions are collected per dimension value and only combined in [`finish`], in a
/// canonical order, so the final result is identical for any arrival order of segments and for
/// any grouping of partial mergers (see [`absorb`]). Floating point sums included.
///
/// Partial merges travel as `TopNMerger` values. A finished result is truncated to the
/// threshold and is final: feeding it into another merge drops the candidates it cut.
///
/// [`finish`]: TopNMerger::finish
/// [`absorb`]: TopNMerger::absorb
#[derive(Debug)]
pub struct TopNMerger {
    plan: TopNPlan,
    contributions: AHashMap<DimensionValue, Vec<Vec<MetricValue>>>,
}

impl TopNMerger {
    pub fn new(plan: &TopNPlan) -> Self {
        Self {
            plan: plan.clone(),
            contributions: AHashMap::new(),
        }
    }

    /// Number of distinct dimension values seen so far.
    pub fn distinct_values(&self) -> usize {
        self.contributions.len()
    }

    pub fn add(&mut self, result: TopNResultSet) {
        let aggregator_count = self.plan.aggregators().len();
        for mut entry in result.into_entries() {
            entry.metrics.truncate(aggregator_count);
            self.contributions
                .entry(entry.dimension)
                .or_default()
                .push(entry.metrics);
        }
    }

    /// Take over every contribution of another merger built from the same plan.
    pub fn absorb(&mut self, other: TopNMerger) {
        for (dimension, parts) in other.contributions {
            self.contributions.entry(dimension).or_default().extend(parts);
        }
    }

    /// Combine, re-rank and truncate to the plan's threshold.
    ///
    /// The output is the final answer, not an input for further merging; combine partial
    /// mergers with [`absorb`](TopNMerger::absorb) first.
    pub fn finish(self) -> TopNResultSet {
        let aggregators = self.plan.aggregators();
        let mut heap = TopNHeap::new(&self.plan);
        for (dimension, mut parts) in self.contributions {
            parts.sort_by(|a, b| cmp_metrics(a, b));
            let mut parts = parts.into_iter();
            let Some(mut metrics) = parts.next() else {
                continue;
            };
            metrics.resize(aggregators.len(), MetricValue::Null);
            for part in parts {
                for ((slot, agg), value) in metrics.iter_mut().zip(aggregators).zip(part) {
                    *slot = agg.combine(*slot, value);
                }
            }
            self.plan.compute_post_aggregators(&mut metrics);
            heap.offer_entry(ResultEntry { dimension, metrics });
        }
        heap.into_result(&self.plan)
    }
}

fn cmp_metrics(a: &[MetricValue], b: &[MetricValue]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| x.total_cmp(y))
        .find(|o| o.is_ne())
        .unwrap_or_else(|| a.len().cmp(&b.len()))
}

/// Merge any number of per-segment results into the global top-N of `plan`.
///
/// Like [`TopNMerger::finish`], the returned set is final and already truncated.
pub fn merge_results(
    plan: &TopNPlan,
    results: impl IntoIterator<Item = TopNResultSet>,
) -> TopNResultSet {
    let mut merger = TopNMerger::new(plan);
    for result in results {
        merger.add(result);
    }
    merger.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::{AggregatorSpec, ArithmeticOp, PostAggregator, PostAggregatorInput};
    use crate::query::{TopNMetricSpec, TopNQuery};
    use pretty_assertions::assert_eq;

    fn plan() -> TopNPlan {
        TopNQuery::new("page", TopNMetricSpec::numeric("hits"), 2)
            .with_aggregator(AggregatorSpec::long_sum("hits", "hits"))
            .with_aggregator(AggregatorSpec::long_max("peak", "hits"))
            .plan()
            .unwrap()
    }

    fn result(plan: &TopNPlan, rows: &[(&str, i64, i64)]) -> TopNResultSet {
        let entries = rows
            .iter()
            .map(|(dim, hits, peak)| ResultEntry {
                dimension: DimensionValue::from(*dim),
                metrics: vec![MetricValue::Long(*hits), MetricValue::Long(*peak)],
            })
            .collect();
        TopNResultSet::new(plan.columns().clone(), entries)
    }

    #[test]
    fn duplicate_values_are_combined_not_overwritten() {
        let plan = plan();
        let seg1 = result(&plan, &[("X", 5, 5)]);
        let seg2 = result(&plan, &[("X", 7, 4), ("Y", 3, 3)]);

        let merged = merge_results(&plan, [seg1, seg2]);
        assert_eq!(
            merged.pairs("hits"),
            vec![
                (DimensionValue::from("X"), MetricValue::Long(12)),
                (DimensionValue::from("Y"), MetricValue::Long(3)),
            ]
        );
        assert_eq!(merged.metric(0, "peak"), Some(MetricValue::Long(5)));
    }

    #[test]
    fn partial_mergers_absorb_exactly() {
        let plan = plan();
        let parts = [
            result(&plan, &[("a", 1, 1), ("b", 9, 9)]),
            result(&plan, &[("c", 4, 4), ("a", 6, 6)]),
            result(&plan, &[("b", 1, 1), ("d", 8, 8)]),
        ];

        let flat = merge_results(&plan, parts.clone());

        let mut left = TopNMerger::new(&plan);
        left.add(parts[2].clone());
        let mut right = TopNMerger::new(&plan);
        right.add(parts[1].clone());
        right.add(parts[0].clone());
        left.absorb(right);
        assert_eq!(left.distinct_values(), 4);
        assert_eq!(left.finish(), flat);
    }

    #[test]
    fn finished_results_are_final_and_groupings_go_through_absorb() {
        let plan = TopNQuery::new("page", TopNMetricSpec::numeric("hits"), 1)
            .with_aggregator(AggregatorSpec::long_sum("hits", "hits"))
            .with_aggregator(AggregatorSpec::long_max("peak", "hits"))
            .plan()
            .unwrap();
        let a = result(&plan, &[("X", 5, 5)]);
        let b = result(&plan, &[("Y", 6, 6)]);
        let c = result(&plan, &[("X", 2, 2)]);

        let flat = merge_results(&plan, [a.clone(), b.clone(), c.clone()]);
        assert_eq!(
            flat.pairs("hits"),
            vec![(DimensionValue::from("X"), MetricValue::Long(7))]
        );

        let mut first = TopNMerger::new(&plan);
        first.add(a.clone());
        first.add(b.clone());
        let mut second = TopNMerger::new(&plan);
        second.add(c.clone());
        second.absorb(first);
        assert_eq!(second.finish(), flat);

        // A finished partial has already cut X, so re-merging it cannot recover the winner.
        let remerged = merge_results(&plan, [merge_results(&plan, [a, b]), c]);
        assert_eq!(
            remerged.pairs("hits"),
            vec![(DimensionValue::from("Y"), MetricValue::Long(6))]
        );
    }

    #[test]
    fn post_aggregators_are_recomputed_after_combine() {
        let plan = TopNQuery::new("page", TopNMetricSpec::numeric("avg"), 5)
            .with_aggregator(AggregatorSpec::count("rows"))
            .with_aggregator(AggregatorSpec::long_sum("hits", "hits"))
            .with_post_aggregator(PostAggregator::arithmetic(
                "avg",
                ArithmeticOp::Divide,
                [
                    PostAggregatorInput::from("hits"),
                    PostAggregatorInput::from("rows"),
                ],
            ))
            .plan()
            .unwrap();
        let seg = |rows: i64, hits: i64| {
            TopNResultSet::new(
                plan.columns().clone(),
                vec![ResultEntry {
                    dimension: DimensionValue::from("p"),
                    metrics: vec![
                        MetricValue::Long(rows),
                        MetricValue::Long(hits),
                        MetricValue::Double(hits as f64 / rows as f64),
                    ],
                }],
            )
        };

        let merged = merge_results(&plan, [seg(1, 10), seg(3, 2)]);
        assert_eq!(merged.metric(0, "avg"), Some(MetricValue::Double(3.0)));
    }

    #[test]
    fn empty_inputs_merge_to_empty() {
        let plan = plan();
        let merged = merge_results(&plan, [TopNResultSet::empty(plan.columns().clone())]);
        assert!(merged.is_empty());
        assert!(merge_results(&plan, Vec::new()).is_empty());
    }
}
