use std::sync::Arc;

use bytes::Bytes;

use super::*;
use crate::backend::support::{MockBackend, MockIdGenerator, MockIoScheduler};
use crate::client::Client;
use crate::config::RouterConfig;
use crate::rule::{RuleConfig, StorageHandle};
use crate::types::{ClientKey, Startup};

fn rule_config(ttl: u64) -> RuleConfig {
    RuleConfig {
        database: Bytes::from_static(b"app"),
        user: Bytes::from_static(b"alice"),
        pool_size: 0,
        pool_ttl: ttl,
        client_max_set: false,
        client_max: 0,
        storage: StorageHandle {
            host: "127.0.0.1".into(),
            port: 5432,
            database: "app".into(),
        },
        storage_db: None,
        storage_user: None,
    }
}

fn new_router() -> Router<MockBackend, MockIdGenerator, MockIoScheduler> {
    Router::new(
        Arc::new(MockBackend::default()),
        Arc::new(MockIdGenerator::default()),
        Arc::new(MockIoScheduler::default()),
    )
}

#[test]
fn sweep_once_closes_expired_server_and_collects_empty_route() {
    let router = new_router();
    router.reconfigure(vec![rule_config(0)]);
    let config = RouterConfig::default();

    let client = Client::new(router.next_client_id(), ClientKey(1), None);
    let startup = Startup::new(Bytes::from_static(b"app"), Bytes::from_static(b"alice"));
    router.route(&config, &startup, &client);
    router.attach(&config, &client).unwrap();
    router.detach(&config, &client);
    router.unroute(&client);

    // pool_ttl == 0 disables expiry: the idle server should survive a sweep.
    sweep_once(&router);
    assert_eq!(router.stat()[0].servers_total, 1);

    // Make the route obsolete with no clients, then sweep: `expire` reports
    // the idle server and `sweep_once` closes it through the backend, but
    // (per the pinned obsolete-route semantics, spec §9 / DESIGN.md Open
    // Question 1) the server is never removed from the route's idle set, so
    // `gc` still can't reclaim the route and a later sweep reports the same
    // server again.
    router.reconfigure(vec![RuleConfig {
        pool_ttl: 1,
        ..rule_config(0)
    }]);
    sweep_once(&router);
    assert_eq!(router.route_count(), 1, "route survives: its idle server is re-reported, not removed");
    assert_eq!(router.stat()[0].servers_total, 1);
    assert_eq!(router.expire().len(), 1, "the same server is reported again on the next sweep");
}
