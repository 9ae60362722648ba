//! Per-segment scan: drives a cursor through the chosen strategy and extracts the local ranking.

use crate::algorithm::{self, AlgorithmKind};
use crate::builder::{ResultBuilder, TopNHeap};
use crate::cancel::{GuardTicker, ScanGuard};
use crate::error::{TopNError, TopNResult};
use crate::params::TopNParams;
use crate::query::TopNPlan;
use crate::result::TopNResultSet;
use crate::value::MetricValue;
use std::num::NonZeroUsize;

/// Compute the local top-N of one segment.
///
/// The strategy is chosen from the dictionary cardinality and the scratch bound in `params`.
/// Both strategies produce the same result; the bound only trades memory for cursor passes.
pub fn run_topn(
    params: &mut TopNParams<'_>,
    plan: &TopNPlan,
    guard: &ScanGuard,
) -> TopNResult<TopNResultSet> {
    let cardinality = params.cardinality();
    let selected = algorithm::select(
        cardinality,
        plan.threshold(),
        plan.aggregators().len(),
        params.num_values_per_pass(),
    );
    let (kind, mut builder) = reserve_builder(plan, selected, cardinality)?;

    guard.check()?;
    let mut ticker = guard.ticker();
    let mut heap = TopNHeap::new(plan);
    let mut inputs: Vec<Option<MetricValue>> = vec![None; plan.aggregators().len()];
    let passes = kind.passes();

    for (pass, window) in kind.windows(cardinality).enumerate() {
        if pass > 0 {
            params.cursor.reset();
            builder.reset(window.clone());
        }
        scan_window(params, &mut builder, &mut inputs, &mut ticker)?;
        log::trace!(
            "top-n pass {}/{passes} over ids {window:?}: {} live values",
            pass + 1,
            builder.live()
        );
        builder.drain_into(&mut heap, params.dim_selector.as_ref());
    }

    Ok(heap.into_result(plan))
}

/// Reserve accumulator slots for the first window of `kind`.
///
/// When the single-pass table cannot be reserved the scan is downgraded to bounded windows,
/// starting at half the cardinality and halving until a reservation succeeds.
fn reserve_builder(
    plan: &TopNPlan,
    kind: AlgorithmKind,
    cardinality: usize,
) -> TopNResult<(AlgorithmKind, ResultBuilder<'_>)> {
    let first = kind.windows(cardinality).next().unwrap_or(0..0);
    if let Some(builder) = ResultBuilder::try_new(plan, first.clone()) {
        return Ok((kind, builder));
    }

    let mut width = match kind {
        AlgorithmKind::SinglePass => cardinality / 2,
        AlgorithmKind::MultiPass {
            values_per_pass, ..
        } => values_per_pass.get() / 2,
    };
    while let Some(values_per_pass) = NonZeroUsize::new(width) {
        if let Some(builder) = ResultBuilder::try_new(plan, 0..width.min(cardinality)) {
            log::warn!(
                "top-n scratch for {} values unavailable; scanning {width} values per pass",
                first.len()
            );
            let fallback = AlgorithmKind::MultiPass {
                values_per_pass,
                passes: cardinality.div_ceil(width),
            };
            return Ok((fallback, builder));
        }
        width /= 2;
    }
    Err(TopNError::InvalidScratchBound)
}

/// One traversal of the cursor, folding rows whose ids fall in the builder's window.
fn scan_window(
    params: &mut TopNParams<'_>,
    builder: &mut ResultBuilder<'_>,
    inputs: &mut [Option<MetricValue>],
    ticker: &mut GuardTicker<'_>,
) -> TopNResult<()> {
    let cardinality = params.cardinality();
    while params.cursor.advance() {
        ticker.tick()?;
        if params.cursor.is_done() {
            return Err(TopNError::CursorOverrun);
        }

        let offset = params.cursor.offset();
        let mut loaded = false;
        for &id in params.dim_selector.value_ids(offset) {
            if id as usize >= cardinality {
                return Err(TopNError::IdOutOfRange { id, cardinality });
            }
            if !builder.contains(id) {
                continue;
            }
            if !loaded {
                for (slot, selector) in inputs.iter_mut().zip(&params.metric_inputs) {
                    *slot = selector.as_ref().and_then(|s| s.value(offset));
                }
                loaded = true;
            }
            builder.observe(id, inputs);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::AggregatorSpec;
    use crate::cancel::QueryCancellation;
    use crate::memory::{ColumnSchema, InMemorySegment, InMemorySegmentBuilder};
    use crate::query::{TopNMetricSpec, TopNQuery};
    use crate::segment::Segment;
    use crate::value::{DimensionValue, Value};

    fn segment(rows: &[(&str, i64)]) -> InMemorySegment {
        let mut builder = InMemorySegmentBuilder::new(
            "seg",
            vec![ColumnSchema::dimension("page"), ColumnSchema::long("hits")],
        );
        for (page, hits) in rows {
            builder
                .append_row(&[Value::from(*page), Value::Long(*hits)])
                .unwrap();
        }
        builder.finalize()
    }

    fn plan(threshold: usize) -> TopNPlan {
        TopNQuery::new("page", TopNMetricSpec::numeric("hits"), threshold)
            .with_aggregator(AggregatorSpec::long_sum("hits", "hits"))
            .plan()
            .unwrap()
    }

    fn run(segment: &dyn Segment, plan: &TopNPlan, per_pass: Option<usize>) -> TopNResultSet {
        let mut params =
            TopNParams::from_segment(segment, plan, per_pass.and_then(NonZeroUsize::new));
        run_topn(&mut params, plan, &ScanGuard::unbounded()).unwrap()
    }

    #[test]
    fn single_pass_ranks_descending() {
        let seg = segment(&[("A", 10), ("B", 30), ("C", 20)]);
        let result = run(&seg, &plan(2), None);
        assert_eq!(
            result.pairs("hits"),
            vec![
                (DimensionValue::from("B"), MetricValue::Long(30)),
                (DimensionValue::from("C"), MetricValue::Long(20)),
            ]
        );
    }

    #[test]
    fn multi_pass_matches_single_pass() {
        let rows: Vec<(String, i64)> = (0..200)
            .map(|i| (format!("v{:03}", i % 37), (i * 7919 % 101) as i64))
            .collect();
        let rows: Vec<(&str, i64)> = rows.iter().map(|(p, h)| (p.as_str(), *h)).collect();
        let seg = segment(&rows);
        let plan = plan(5);

        let single = run(&seg, &plan, None);
        for per_pass in [1, 2, 5, 36, 37, 1000] {
            assert_eq!(run(&seg, &plan, Some(per_pass)), single, "per_pass={per_pass}");
        }
    }

    #[test]
    fn unreservable_single_pass_falls_back_to_bounded_windows() {
        let rows: Vec<(String, i64)> = (0..150)
            .map(|i| (format!("v{:02}", i % 37), (i * 31 % 53) as i64))
            .collect();
        let rows: Vec<(&str, i64)> = rows.iter().map(|(p, h)| (p.as_str(), *h)).collect();
        let seg = segment(&rows);
        let plan = plan(4);
        let expected = run(&seg, &plan, None);

        crate::builder::WINDOW_LIMIT.with(|limit| limit.set(8));
        let (kind, builder) = reserve_builder(&plan, AlgorithmKind::SinglePass, 37).unwrap();
        let fallback = run(&seg, &plan, None);
        crate::builder::WINDOW_LIMIT.with(|limit| limit.set(usize::MAX));

        assert_eq!(
            kind,
            AlgorithmKind::MultiPass {
                values_per_pass: NonZeroUsize::new(4).unwrap(),
                passes: 10,
            }
        );
        assert_eq!(builder.window(), 0..4);
        assert_eq!(fallback, expected);
        assert_eq!(fallback.len(), 4);
    }

    #[test]
    fn fallback_without_any_reservable_window_is_an_error() {
        let plan = plan(1);
        crate::builder::WINDOW_LIMIT.with(|limit| limit.set(0));
        let outcome = reserve_builder(&plan, AlgorithmKind::SinglePass, 5).map(|(kind, _)| kind);
        crate::builder::WINDOW_LIMIT.with(|limit| limit.set(usize::MAX));
        assert_eq!(outcome, Err(TopNError::InvalidScratchBound));
    }

    #[test]
    fn empty_segment_yields_empty_result() {
        let seg = segment(&[]);
        assert!(run(&seg, &plan(3), Some(1)).is_empty());
        assert!(run(&seg, &plan(3), None).is_empty());
    }

    #[test]
    fn cancelled_scan_contributes_nothing() {
        let seg = segment(&[("A", 1), ("B", 2)]);
        let plan = plan(2);
        let cancel = QueryCancellation::new();
        cancel.cancel();
        let mut params = TopNParams::from_segment(&seg, &plan, None);
        let err = run_topn(&mut params, &plan, &ScanGuard::new(cancel, None)).unwrap_err();
        assert_eq!(err, TopNError::Cancelled);
    }
}
