//! Query-level driver: fans a top-N query out over segments and merges the local rankings.

use crate::cancel::{QueryCancellation, ScanGuard};
use crate::config::{FailurePolicy, TopNConfig};
use crate::error::{TopNError, TopNResult};
use crate::executor::run_topn;
use crate::merge::TopNMerger;
use crate::params::TopNParams;
use crate::query::{TopNPlan, TopNQuery};
use crate::result::TopNResultSet;
use crate::segment::Segment;
use std::num::NonZeroUsize;
use std::time::Instant;

/// Scan one segment with `plan` and return its local ranking.
pub fn scan_segment(
    segment: &dyn Segment,
    plan: &TopNPlan,
    values_per_pass: Option<NonZeroUsize>,
    guard: &ScanGuard,
) -> TopNResult<TopNResultSet> {
    let mut params = TopNParams::from_segment(segment, plan, values_per_pass);
    let result = run_topn(&mut params, plan, guard)?;
    log::debug!(
        "top-n segment {} (cardinality {}) kept {} candidates",
        segment.id(),
        params.cardinality(),
        result.len()
    );
    Ok(result)
}

#[derive(Clone, Debug, Default)]
pub struct TopNRunner {
    config: TopNConfig,
}

impl TopNRunner {
    pub fn new(config: TopNConfig) -> TopNResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &TopNConfig {
        &self.config
    }

    /// Answer `query` over `segments`.
    ///
    /// Every segment keeps `max(threshold, minTopNThreshold)` local candidates; the merged
    /// ranking is truncated back to the query's threshold. Cancellation and timeouts always fail
    /// the query. Data integrity faults follow the configured [`FailurePolicy`].
    pub fn run<S: Segment>(
        &self,
        query: &TopNQuery,
        segments: &[S],
        cancellation: &QueryCancellation,
    ) -> TopNResult<TopNResultSet> {
        let plan = query.plan()?;
        let values_per_pass = self.config.values_per_pass(plan.aggregators().len())?;
        let local_plan =
            plan.with_threshold(plan.threshold().max(self.config.min_top_n_threshold))?;
        let deadline = self.config.timeout().map(|timeout| Instant::now() + timeout);
        let guard = ScanGuard::new(cancellation.clone(), deadline);

        let outcomes = match self.scan_parallel(segments, &local_plan, values_per_pass, &guard) {
            Some(outcomes) => outcomes,
            None => segments
                .iter()
                .map(|segment| scan_segment(segment, &local_plan, values_per_pass, &guard))
                .collect(),
        };
        guard.check()?;

        let mut merger = TopNMerger::new(&plan);
        let mut dropped = 0usize;
        for (segment, outcome) in segments.iter().zip(outcomes) {
            match outcome {
                Ok(result) => merger.add(result),
                Err(err) => {
                    self.settle(segment.id(), err)?;
                    dropped += 1;
                }
            }
        }

        guard.check()?;
        let distinct = merger.distinct_values();
        let result = merger.finish();
        log::debug!(
            "top-n over {} segments ({dropped} dropped) merged {distinct} values into {}",
            segments.len(),
            result.len()
        );
        Ok(result)
    }

    /// Decide whether a failed segment fails the whole query.
    fn settle(&self, segment: &str, err: TopNError) -> TopNResult<()> {
        match self.config.failure_policy {
            FailurePolicy::Lenient if err.is_data_integrity() => {
                log::warn!("top-n dropping segment {segment}: {err}");
                Ok(())
            }
            _ => Err(err.in_segment(segment)),
        }
    }

    #[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
    fn scan_parallel<S: Segment>(
        &self,
        segments: &[S],
        plan: &TopNPlan,
        values_per_pass: Option<NonZeroUsize>,
        guard: &ScanGuard,
    ) -> Option<Vec<TopNResult<TopNResultSet>>> {
        use rayon::prelude::*;

        if !self.config.parallel || segments.len() < 2 {
            return None;
        }
        let pool = crate::parallel::scan_pool()?;
        Some(pool.install(|| {
            segments
                .par_iter()
                .map(|segment| scan_segment(segment, plan, values_per_pass, guard))
                .collect()
        }))
    }

    #[cfg(not(all(feature = "parallel", not(target_arch = "wasm32"))))]
    fn scan_parallel<S: Segment>(
        &self,
        _segments: &[S],
        _plan: &TopNPlan,
        _values_per_pass: Option<NonZeroUsize>,
        _guard: &ScanGuard,
    ) -> Option<Vec<TopNResult<TopNResultSet>>> {
        None
    }
}
