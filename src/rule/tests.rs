use super::*;

fn storage() -> StorageHandle {
    StorageHandle {
        host: "127.0.0.1".into(),
        port: 5432,
        database: "postgres".into(),
    }
}

fn rule_config(db: &str, user: &str) -> RuleConfig {
    RuleConfig {
        database: Bytes::copy_from_slice(db.as_bytes()),
        user: Bytes::copy_from_slice(user.as_bytes()),
        pool_size: 10,
        pool_ttl: 60,
        client_max_set: false,
        client_max: 0,
        storage: storage(),
        storage_db: None,
        storage_user: None,
    }
}

#[test]
fn forward_matches_exact_db_and_user() {
    let mut table = RuleTable::new();
    table.merge(vec![rule_config("app", "alice"), rule_config("app", "bob")]);

    let rule = table.forward(b"app", b"alice").expect("should match alice");
    assert_eq!(&rule.config.user[..], b"alice");
    assert!(table.forward(b"app", b"carol").is_none());
}

#[test]
fn merge_marks_dropped_rules_obsolete_and_keeps_refcount() {
    let mut table = RuleTable::new();
    table.merge(vec![rule_config("app", "alice")]);
    let r1 = table.forward(b"app", b"alice").unwrap();
    r1.ref_();
    r1.ref_();
    assert_eq!(r1.ref_count(), 2);

    // Same selector reinstalled: the Rule object (and its refcount) survives.
    let updates = table.merge(vec![rule_config("app", "alice"), rule_config("app", "bob")]);
    assert_eq!(updates, 0);
    let r1_again = table.forward(b"app", b"alice").unwrap();
    assert!(Arc::ptr_eq(&r1, &r1_again));
    assert_eq!(r1_again.ref_count(), 2);

    // Dropping alice's selector obsoletes the old rule exactly once.
    let updates = table.merge(vec![rule_config("app", "bob")]);
    assert_eq!(updates, 1);
    assert!(r1.is_obsolete());
    assert!(table.forward(b"app", b"alice").is_none());

    // A second merge that doesn't reintroduce alice must not re-count the obsolescence.
    let updates = table.merge(vec![rule_config("app", "bob")]);
    assert_eq!(updates, 0);
}

#[test]
fn new_rule_starts_at_refcount_zero() {
    let mut table = RuleTable::new();
    table.merge(vec![rule_config("app", "alice")]);
    let rule = table.forward(b"app", b"alice").unwrap();
    assert_eq!(rule.ref_count(), 0);
    assert!(!rule.is_obsolete());
}

#[test]
fn storage_copy_is_independent() {
    let rule_cfg = rule_config("app", "alice");
    let copy = rule_cfg.storage.copy().unwrap();
    assert_eq!(copy, rule_cfg.storage);
}
