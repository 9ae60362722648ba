#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
use rayon::ThreadPool;
#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
use std::sync::OnceLock;

/// Crate-local Rayon pool that segment scans fan out onto.
///
/// Building the global pool can fail under heavy resource pressure and Rayon then panics on
/// first use. A private pool lets the runner fall back to scanning segments sequentially instead.
#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
static SCAN_POOL: OnceLock<Option<ThreadPool>> = OnceLock::new();

#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
fn desired_scan_threads() -> usize {
    let from_env = std::env::var("RAYON_NUM_THREADS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|&n| n > 0);
    from_env.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    })
}

#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
fn build_scan_pool() -> Option<ThreadPool> {
    let requested = desired_scan_threads().max(1);
    let try_build = |n| {
        rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .thread_name(|i| format!("formula-topn-{i}"))
            .build()
    };

    match try_build(requested) {
        Ok(pool) => Some(pool),
        Err(err) if requested > 1 => {
            log::warn!(
                "top-n scan pool with {requested} threads unavailable ({err}); retrying with 1"
            );
            try_build(1).ok()
        }
        Err(err) => {
            log::warn!("top-n scan pool unavailable ({err}); scanning sequentially");
            None
        }
    }
}

/// Returns the scan pool, if one could be created.
#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
pub(crate) fn scan_pool() -> Option<&'static ThreadPool> {
    SCAN_POOL.get_or_init(build_scan_pool).as_ref()
}
