//! Bounded join-all fan-out shared by both coordinators.
//!
//! [`join_all`] runs `units` independent pieces of work on one scoped OS
//! thread each and returns their results in unit order once *every* unit has
//! finished.  There is no early return and no cancellation: a slow unit holds
//! the whole batch.
//!
//! ```text
//!   caller ──▶ join_all(4, work)
//!                 ├── pi-worker-0: work(0) ─┐
//!                 ├── pi-worker-1: work(1) ─┤
//!                 ├── pi-worker-2: work(2) ─┼──▶ [r0, r1, r2, r3]
//!                 └── pi-worker-3: work(3) ─┘
//! ```

use std::thread;

use thiserror::Error;

/// Hard cap on parallel units per request.
pub const MAX_WORKERS: usize = 8;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker count {0} outside 1..={max}", max = MAX_WORKERS)]
    InvalidSize(usize),
    #[error("failed to spawn worker {unit}: {source}")]
    Spawn {
        unit: usize,
        source: std::io::Error,
    },
    #[error("worker {0} panicked")]
    WorkerPanicked(usize),
}

/// Run `work(i)` for every `i` in `0..units` in parallel and collect the
/// results in order.
///
/// A single unit runs on the calling thread.
pub fn join_all<T, F>(units: usize, work: F) -> Result<Vec<T>, PoolError>
where
    T: Send,
    F: Fn(usize) -> T + Sync,
{
    if units == 0 || units > MAX_WORKERS {
        return Err(PoolError::InvalidSize(units));
    }
    if units == 1 {
        return Ok(vec![work(0)]);
    }

    let work = &work;
    thread::scope(|scope| -> Result<Vec<T>, PoolError> {
        let mut handles = Vec::with_capacity(units);
        for unit in 0..units {
            let handle = thread::Builder::new()
                .name(format!("pi-worker-{unit}"))
                .spawn_scoped(scope, move || work(unit))
                .map_err(|source| PoolError::Spawn { unit, source })?;
            handles.push(handle);
        }

        // Join every handle before reporting, so no unit is left running.
        let joined: Vec<_> = handles.into_iter().map(|h| h.join()).collect();
        joined
            .into_iter()
            .enumerate()
            .map(|(unit, result)| result.map_err(|_| PoolError::WorkerPanicked(unit)))
            .collect()
    })
}
