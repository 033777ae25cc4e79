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

fn id() -> RouteId {
    RouteId {
        database: Bytes::from_static(b"app"),
        user: Bytes::from_static(b"alice"),
    }
}

#[test]
fn insert_new_refs_the_rule_and_is_findable() {
    let mut pool = RoutePool::new();
    let r = rule();
    assert_eq!(r.ref_count(), 0);
    let route = pool.insert_new(id(), r.clone(), true);
    assert_eq!(r.ref_count(), 1);
    assert!(pool.matching(&id()).is_some());
    assert!(Arc::ptr_eq(&pool.matching(&id()).unwrap(), &route));
}

#[test]
fn matching_skips_obsolete_routes_and_finds_the_replacement() {
    let mut pool = RoutePool::new();
    let old_rule = rule();
    let old_route = pool.insert_new(id(), old_rule.clone(), true);

    // Simulate reconfigure: old rule goes obsolete, a fresh route is installed
    // for the same id while the old one is still draining.
    old_rule.mark_obsolete();
    let new_rule = rule();
    let new_route = pool.insert_new(id(), new_rule, true);

    let found = pool.matching(&id()).unwrap();
    assert!(Arc::ptr_eq(&found, &new_route));
    assert_eq!(pool.len(), 2, "old route stays registered until gc removes it");
    assert!(!Arc::ptr_eq(&found, &old_route));
}

#[test]
fn remove_drops_the_id_entry_once_empty() {
    let mut pool = RoutePool::new();
    let route = pool.insert_new(id(), rule(), true);
    assert!(pool.remove(&id(), &route));
    assert!(pool.is_empty());
}
