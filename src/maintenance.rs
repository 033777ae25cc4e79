//! Periodic maintenance sweeps: TTL/obsolete expiry and route GC (spec
//! §4.6 `expire`/`gc`, §10.5).
//!
//! Grounded directly on the teacher's `pool::retain::retain_connections`
//! loop shape (a `tokio::time::interval` driving a sweep over every pool) —
//! the out-of-scope piece here is only *what* interval and *which* sink
//! consumes the closed-server list, not the loop shape itself.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};

use crate::backend::{BackendDriver, IdGenerator, IoScheduler};
use crate::router::{ExpiredServer, Router};

/// Runs `expire` then `gc` on every tick of `interval`, closing and freeing
/// whatever `expire` moved out of the idle set. Never returns; intended to be
/// spawned as its own task by the caller, exactly as the teacher spawns
/// `retain_connections`.
pub async fn run_periodic<B, I, S>(router: Arc<Router<B, I, S>>, interval: Duration)
where
    B: BackendDriver,
    I: IdGenerator,
    S: IoScheduler,
{
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        sweep_once(&router);
    }
}

/// One maintenance tick: expire idle/obsolete servers, close the ones that
/// came out, then garbage-collect routes left empty. Split out from
/// [`run_periodic`] so tests can drive a single tick deterministically
/// without waiting on a real timer.
pub fn sweep_once<B, I, S>(router: &Router<B, I, S>)
where
    B: BackendDriver,
    I: IdGenerator,
    S: IoScheduler,
{
    let expired = router.expire();
    if !expired.is_empty() {
        debug!("maintenance: closing {} expired server(s)", expired.len());
    }
    for ExpiredServer { route_id, record } in expired {
        if let Err(err) = router.close_expired(&record) {
            log::warn!("failed to close expired server {} on {route_id}: {err}", record.id);
        }
    }

    let removed = router.gc();
    if removed > 0 {
        info!("maintenance: garbage-collected {removed} empty route(s)");
    }
}

#[cfg(test)]
mod tests;
