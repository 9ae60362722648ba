use crate::algorithm;
use crate::error::{TopNError, TopNResult};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::time::Duration;

/// What a segment-local data integrity fault does to the whole query.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Any faulty segment fails the query.
    #[default]
    Strict,
    /// Faulty segments are logged and contribute nothing; the rest still merge.
    Lenient,
}

/// Engine knobs for running top-N queries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TopNConfig {
    /// Maximum number of dimension values with live accumulators during one scan pass.
    pub num_values_per_pass: Option<usize>,
    /// Byte budget for accumulators, used when `num_values_per_pass` is unset.
    pub scratch_bytes: Option<usize>,
    /// Lower bound on the candidates each segment keeps before the cross-segment merge.
    pub min_top_n_threshold: usize,
    pub failure_policy: FailurePolicy,
    pub parallel: bool,
    pub timeout_ms: Option<u64>,
}

pub const DEFAULT_MIN_TOP_N_THRESHOLD: usize = 1000;

impl Default for TopNConfig {
    fn default() -> Self {
        Self {
            num_values_per_pass: None,
            scratch_bytes: None,
            min_top_n_threshold: DEFAULT_MIN_TOP_N_THRESHOLD,
            failure_policy: FailurePolicy::Strict,
            parallel: true,
            timeout_ms: None,
        }
    }
}

impl TopNConfig {
    pub fn validate(&self) -> TopNResult<()> {
        if self.num_values_per_pass == Some(0) || self.scratch_bytes == Some(0) {
            return Err(TopNError::InvalidScratchBound);
        }
        Ok(())
    }

    /// Scratch bound for a query with `aggregator_count` aggregators; `None` is unbounded.
    pub fn values_per_pass(&self, aggregator_count: usize) -> TopNResult<Option<NonZeroUsize>> {
        self.validate()?;
        if let Some(n) = self.num_values_per_pass {
            return Ok(NonZeroUsize::new(n));
        }
        Ok(self
            .scratch_bytes
            .map(|bytes| algorithm::values_for_budget(bytes, aggregator_count)))
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Apply `FORMULA_TOPN_NUM_VALUES_PER_PASS` and `FORMULA_TOPN_MIN_THRESHOLD` when set.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(n) = env_usize("FORMULA_TOPN_NUM_VALUES_PER_PASS") {
            self.num_values_per_pass = Some(n);
        }
        if let Some(n) = env_usize("FORMULA_TOPN_MIN_THRESHOLD") {
            self.min_top_n_threshold = n;
        }
        self
    }
}

fn env_usize(key: &str) -> Option<usize> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<usize>() {
        Ok(n) => Some(n),
        Err(err) => {
            log::warn!("ignoring {key}={raw:?}: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_unbounded_and_strict() {
        let config = TopNConfig::default();
        assert_eq!(config.values_per_pass(3), Ok(None));
        assert_eq!(config.failure_policy, FailurePolicy::Strict);
        assert_eq!(config.min_top_n_threshold, 1000);
        assert!(config.parallel);
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn zero_scratch_is_rejected() {
        let config = TopNConfig {
            num_values_per_pass: Some(0),
            ..TopNConfig::default()
        };
        assert_eq!(config.validate(), Err(TopNError::InvalidScratchBound));

        let config = TopNConfig {
            scratch_bytes: Some(0),
            ..TopNConfig::default()
        };
        assert_eq!(config.values_per_pass(1), Err(TopNError::InvalidScratchBound));
    }

    #[test]
    fn explicit_bound_wins_over_byte_budget() {
        let config = TopNConfig {
            num_values_per_pass: Some(10),
            scratch_bytes: Some(1 << 20),
            ..TopNConfig::default()
        };
        assert_eq!(config.values_per_pass(2), Ok(NonZeroUsize::new(10)));

        let config = TopNConfig {
            scratch_bytes: Some(algorithm::bytes_per_value(2) * 64),
            ..TopNConfig::default()
        };
        assert_eq!(config.values_per_pass(2), Ok(NonZeroUsize::new(64)));
    }
}
