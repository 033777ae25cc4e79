//! Router configuration representation (spec §10.3).
//!
//! Plain, `serde`-derived data in the teacher's `config::Pool`/`config::General`
//! style. Loading it from a file, CLI flags or environment overlays is
//! explicitly out of scope (spec §1, §10.1); something outside this crate is
//! expected to build a `RouterConfig` and hand it to [`crate::router::Router::new`].

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Global cap on concurrently routed clients, enforced across all routes
    /// (spec §4.6 `route`, admission step). Only checked when `client_max_set`.
    pub client_max_set: bool,
    pub client_max: u32,
    /// Chunk size handed to newly allocated [`crate::server::ServerRecord`]s;
    /// purely descriptive bookkeeping the router never interprets itself.
    pub packet_read_size: usize,
    /// Whether `IoScheduler::attach`/`detach` are meaningful (spec §1, §6).
    /// Single-worker deployments may ignore I/O handles entirely.
    pub is_multi_workers: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        RouterConfig {
            client_max_set: false,
            client_max: 0,
            packet_read_size: 8192,
            is_multi_workers: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_no_client_cap() {
        let cfg = RouterConfig::default();
        assert!(!cfg.client_max_set);
    }
}
