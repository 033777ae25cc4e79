//! Rule table: the versioned `(database, user) -> Rule` mapping (spec §4.1).
//!
//! Grounded on the teacher's `config::Pool`/`config::User` shape for the configuration
//! fields, and on `pool::mod::ConnectionPool::from_config`'s hash-equality merge (old
//! pool kept verbatim when its config hasn't changed) for `RuleTable::merge`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Descriptor of an upstream database location. Shared by reference through a
/// [`Rule`] but independently copyable so a `cancel` in flight can outlive a
/// reconfigure that drops the rule (spec §3, §5).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageHandle {
    pub host: String,
    pub port: u16,
    pub database: String,
}

impl StorageHandle {
    /// Produce an independent, owned copy. Never fails in this implementation
    /// (there is no remote resource to exhaust), but returns `Result` so a future
    /// backend with a fallible copy (e.g. one that clones a pooled TLS context)
    /// doesn't need a signature change.
    pub fn copy(&self) -> Result<StorageHandle, crate::errors::Error> {
        Ok(self.clone())
    }
}

/// Configuration for a logical route, as handed in by the (out-of-scope) config
/// loader. Plain, `serde`-derived data — no refcount or obsolescence bookkeeping
/// lives here, that's [`Rule`]'s job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Selector matched against `Startup::database`.
    pub database: Bytes,
    /// Selector matched against `Startup::user`.
    pub user: Bytes,
    /// Cap on concurrent backend servers for the route. `0` means "always open a
    /// new connection, never wait" (and, per this implementation's Non-goal, so
    /// does any value greater than zero once the idle pool is exhausted; see
    /// `DESIGN.md` Open Question 2).
    pub pool_size: u32,
    /// Idle-server TTL in seconds. `0` disables expiry.
    pub pool_ttl: u64,
    pub client_max_set: bool,
    pub client_max: u32,
    pub storage: StorageHandle,
    pub storage_db: Option<Bytes>,
    pub storage_user: Option<Bytes>,
}

/// A configured rule plus the runtime bookkeeping the router layers on top:
/// reference counting and an obsolescence flag set by `reconfigure`.
#[derive(Debug)]
pub struct Rule {
    pub config: RuleConfig,
    refcount: AtomicUsize,
    obsolete: AtomicBool,
}

impl Rule {
    fn new(config: RuleConfig) -> Arc<Rule> {
        Arc::new(Rule {
            config,
            refcount: AtomicUsize::new(0),
            obsolete: AtomicBool::new(false),
        })
    }

    /// Increment the logical holder count. Called once per route that holds this
    /// rule as `route.rule`, and once per client that holds it as `client.rule`.
    pub fn ref_(&self) {
        self.refcount.fetch_add(1, Ordering::AcqRel);
    }

    /// Decrement the logical holder count. The `Rule` object itself is memory-managed
    /// by `Arc` (dropped when the last `Arc<Rule>` clone goes away); this counter is
    /// purely the spec's observable "is anything still using this rule" bookkeeping
    /// (spec §4.1, §8 "Refcount balance").
    pub fn unref(&self) {
        let prev = self.refcount.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "rule refcount underflow");
    }

    pub fn ref_count(&self) -> usize {
        self.refcount.load(Ordering::Acquire)
    }

    pub fn is_obsolete(&self) -> bool {
        self.obsolete.load(Ordering::Acquire)
    }

    pub(crate) fn mark_obsolete(&self) -> bool {
        !self.obsolete.swap(true, Ordering::AcqRel)
    }

    /// The `RouteId` this rule routes `startup` to, applying the
    /// `storage_db`/`storage_user` overrides when present so unrelated
    /// (database, user) pairs can share one backend pool (spec §3, §4.6
    /// `route` step 2; grounded on the teacher's `PoolIdentifier::from`
    /// conversion, per `SPEC_FULL.md` §10.5).
    pub fn effective_id(&self, startup: &crate::types::Startup) -> crate::types::RouteId {
        crate::types::RouteId {
            database: self
                .config
                .storage_db
                .clone()
                .unwrap_or_else(|| startup.database.clone()),
            user: self
                .config
                .storage_user
                .clone()
                .unwrap_or_else(|| startup.user.clone()),
        }
    }
}

/// Versioned `(database, user) -> Rule` mapping. Forward-match is always run under
/// the router lock by the caller (spec §4.1); this type has no locking of its own.
#[derive(Debug, Default)]
pub struct RuleTable {
    rules: Vec<Arc<Rule>>,
}

impl RuleTable {
    pub fn new() -> Self {
        RuleTable { rules: Vec::new() }
    }

    /// First-match against the ordered rule list.
    pub fn forward(&self, database: &[u8], user: &[u8]) -> Option<Arc<Rule>> {
        self.rules
            .iter()
            .find(|rule| rule.config.database == database && rule.config.user == user)
            .cloned()
    }

    /// Replace the installed rule set. A new entry whose `RuleConfig` is
    /// byte-for-byte identical to one already installed keeps that `Rule`
    /// object (and thus its refcount) exactly the way the teacher's
    /// `ConnectionPool::from_config` keeps an unchanged pool's object
    /// instead of rebuilding it; everything else — a rule dropped entirely,
    /// *or* one whose selector survives but whose settings changed — gets a
    /// fresh `Rule` at refcount zero, and the superseded object is marked
    /// obsolete so routes still holding it drain (spec §3, §4.1). Matching
    /// on full config rather than just the `(database, user)` selector is
    /// what makes scenario 4 (§8) work: installing a differently-configured
    /// rule for the same pair must still obsolete the old one.
    ///
    /// Returns the number of rules whose obsolescence state changed to `true` in this
    /// call — the signal `reconfigure` uses to decide whether a client-pool drain is
    /// needed at all.
    pub fn merge(&mut self, new_rules: Vec<RuleConfig>) -> usize {
        let mut next = Vec::with_capacity(new_rules.len());
        let mut updates = 0;

        for config in new_rules {
            let existing = self.rules.iter().find(|rule| rule.config == config).cloned();
            match existing {
                Some(rule) => next.push(rule),
                None => next.push(Rule::new(config)),
            }
        }

        for old in &self.rules {
            let still_present = next.iter().any(|r| Arc::ptr_eq(r, old));
            if !still_present && old.mark_obsolete() {
                updates += 1;
            }
        }

        self.rules = next;
        updates
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests;
