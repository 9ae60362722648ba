use crate::error::{TopNError, TopNResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Shared cancellation flag for one query. Clones observe the same flag.
#[derive(Clone, Debug, Default)]
pub struct QueryCancellation {
    cancelled: Arc<AtomicBool>,
}

impl QueryCancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Rows between deadline checks; the cancellation flag is checked on every row.
const DEADLINE_CHECK_INTERVAL: u32 = 1024;

/// Cooperative abort check used between rows of a scan.
#[derive(Clone, Debug, Default)]
pub struct ScanGuard {
    cancellation: QueryCancellation,
    deadline: Option<Instant>,
}

impl ScanGuard {
    pub fn new(cancellation: QueryCancellation, deadline: Option<Instant>) -> Self {
        Self {
            cancellation,
            deadline,
        }
    }

    /// A guard that never aborts.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn check(&self) -> TopNResult<()> {
        if self.cancellation.is_cancelled() {
            return Err(TopNError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(TopNError::Timeout);
        }
        Ok(())
    }

    pub(crate) fn ticker(&self) -> GuardTicker<'_> {
        GuardTicker {
            guard: self,
            rows: 0,
        }
    }
}

/// Per-scan row counter that amortizes deadline checks.
pub(crate) struct GuardTicker<'a> {
    guard: &'a ScanGuard,
    rows: u32,
}

impl GuardTicker<'_> {
    #[inline]
    pub(crate) fn tick(&mut self) -> TopNResult<()> {
        if self.guard.cancellation.is_cancelled() {
            return Err(TopNError::Cancelled);
        }
        self.rows += 1;
        if self.rows == DEADLINE_CHECK_INTERVAL {
            self.rows = 0;
            if self.guard.deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(TopNError::Timeout);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn clones_share_the_flag() {
        let cancel = QueryCancellation::new();
        let guard = ScanGuard::new(cancel.clone(), None);
        assert_eq!(guard.check(), Ok(()));
        cancel.cancel();
        assert_eq!(guard.check(), Err(TopNError::Cancelled));
        assert_eq!(guard.ticker().tick(), Err(TopNError::Cancelled));
    }

    #[test]
    fn expired_deadline_times_out() {
        let past = Instant::now() - Duration::from_millis(5);
        let guard = ScanGuard::new(QueryCancellation::new(), Some(past));
        assert_eq!(guard.check(), Err(TopNError::Timeout));

        let mut ticker = guard.ticker();
        let mut result = Ok(());
        for _ in 0..DEADLINE_CHECK_INTERVAL {
            result = ticker.tick();
            if result.is_err() {
                break;
            }
        }
        assert_eq!(result, Err(TopNError::Timeout));
    }
}
