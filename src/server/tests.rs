use super::*;
use std::sync::Arc;

fn server(n: u64) -> ServerRecord {
    ServerRecord::new(
        ServerId(Arc::from(format!("srv-{n}").as_str())),
        RouteId {
            database: bytes::Bytes::from_static(b"app"),
            user: bytes::Bytes::from_static(b"alice"),
        },
        ServerKey(n as i64),
        None,
        8192,
    )
}

#[test]
fn insert_starts_undef_and_set_moves_state() {
    let mut pool = ServerPool::new();
    let id = pool.insert(server(1));
    assert_eq!(pool.total(), 1);
    assert_eq!(pool.count(&ServerState::Undef), 1);

    pool.set(&id, ServerState::Idle);
    assert_eq!(pool.count(&ServerState::Undef), 0);
    assert_eq!(pool.count(&ServerState::Idle), 1);
}

#[test]
fn set_undef_removes_and_returns_record() {
    let mut pool = ServerPool::new();
    let id = pool.insert(server(1));
    pool.set(&id, ServerState::Idle);

    let removed = pool.set(&id, ServerState::Undef);
    assert!(removed.is_some());
    assert_eq!(pool.total(), 0);
    assert!(pool.get(&id).is_none());
}

#[test]
fn find_applies_predicate_within_state() {
    let mut pool = ServerPool::new();
    let a = pool.insert(server(1));
    let b = pool.insert(server(2));
    pool.set(&a, ServerState::Idle);
    pool.set(&b, ServerState::Idle);
    pool.bind_client(&b, ClientId(99), ClientKey(99));

    let found = pool.find(&ServerState::Idle, |r| r.client == Some(ClientId(99)));
    assert_eq!(found, Some(b));
}

#[test]
fn bind_and_unbind_client_tracks_last_client_id() {
    let mut pool = ServerPool::new();
    let id = pool.insert(server(1));
    pool.set(&id, ServerState::Active);
    pool.bind_client(&id, ClientId(7), ClientKey(7));
    pool.unbind_client(&id);

    let record = pool.get(&id).unwrap();
    assert_eq!(record.client, None);
    assert_eq!(record.last_client_id, Some(ClientId(7)));
}
