use super::*;
use crate::rule::{RuleConfig, RuleTable, StorageHandle};
use bytes::Bytes;

fn rule() -> Arc<Rule> {
    let mut table = RuleTable::new();
    table.merge(vec![RuleConfig {
        database: Bytes::from_static(b"app"),
        user: Bytes::from_static(b"alice"),
        pool_size: 10,
        pool_ttl: 60,
        client_max_set: false,
        client_max: 0,
        storage: StorageHandle {
            host: "127.0.0.1".into(),
            port: 5432,
            database: "postgres".into(),
        },
        storage_db: None,
        storage_user: None,
    }]);
    table.forward(b"app", b"alice").unwrap()
}

fn route_id() -> RouteId {
    RouteId {
        database: Bytes::from_static(b"app"),
        user: Bytes::from_static(b"alice"),
    }
}

#[test]
fn fresh_route_is_idle() {
    let route = Route::new(route_id(), rule(), true);
    assert!(route.is_idle());
}

#[test]
fn route_not_idle_once_a_client_is_present() {
    let route = Route::new(route_id(), rule(), true);
    let c = crate::client::Client::new(crate::types::ClientId(1), crate::types::ClientKey(1), None);
    route.lock().clients.insert(&c, crate::client::ClientState::Pending);
    assert!(!route.is_idle());
}

#[test]
fn kill_client_removes_from_pool_and_frees_its_server() {
    let route = Route::new(route_id(), rule(), true);
    let c = crate::client::Client::new(crate::types::ClientId(1), crate::types::ClientKey(1), None);
    {
        let mut inner = route.lock();
        inner.clients.insert(&c, crate::client::ClientState::Active);
        let server = crate::server::ServerRecord::new(
            crate::types::ServerId(std::sync::Arc::from("srv-1")),
            route_id(),
            crate::types::ServerKey(1),
            None,
            8192,
        );
        let id = inner.servers.insert(server);
        inner.servers.set(&id, crate::server::ServerState::Active);
        inner.servers.bind_client(&id, c.id, c.key);
    }

    let killed = route.kill_client(c.id).expect("client should have been present");
    assert_eq!(killed.id, c.id);
    assert_eq!(killed.state(), crate::client::ClientState::Undef);

    let inner = route.lock();
    assert_eq!(inner.clients.total(), 0);
    assert_eq!(inner.servers.count(&crate::server::ServerState::Idle), 1);
    assert_eq!(inner.servers.count(&crate::server::ServerState::Active), 0);
}

#[test]
fn kill_client_pool_drains_every_client() {
    let route = Route::new(route_id(), rule(), true);
    let c1 = crate::client::Client::new(crate::types::ClientId(1), crate::types::ClientKey(1), None);
    let c2 = crate::client::Client::new(crate::types::ClientId(2), crate::types::ClientKey(2), None);
    {
        let mut inner = route.lock();
        inner.clients.insert(&c1, crate::client::ClientState::Pending);
        inner.clients.insert(&c2, crate::client::ClientState::Pending);
    }

    let killed = route.kill_client_pool();
    assert_eq!(killed.len(), 2);
    assert!(route.is_idle());
}
