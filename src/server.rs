//! Server pool: the per-route multiset of backend server objects (spec §4.3).
//!
//! Servers are fully owned by the [`crate::route::Route`] that holds them — unlike
//! clients (see `client.rs`), there is no external owner to hand a borrow to, so this
//! pool stores [`ServerRecord`] by value rather than by `Weak` reference. Shaped after
//! `pool::inner::Slots` (a state-keyed container holding the actual pooled objects).

use std::collections::{HashMap, HashSet};

use crate::types::{ClientId, ClientKey, IoHandle, RouteId, ServerId, ServerKey};

/// States the router itself assigns and observes. `Connect`/`Reset`/`Expire` are
/// owned by the (out-of-scope) backend driver — the router never assigns them, but
/// the variant exists so a caller wiring driver-reported states through doesn't need
/// a second enum (spec §3, design note "sum-typed states").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ServerState {
    /// Not a member of any server pool (transient during kill/close).
    Undef,
    /// Idle, available for reuse by `attach`.
    Idle,
    /// Bound to exactly one active client.
    Active,
    /// A backend-driver-owned state the router never transitions into or out of.
    Other(&'static str),
}

/// Everything the router tracks about one backend connection.
#[derive(Debug, Clone)]
pub struct ServerRecord {
    pub id: ServerId,
    pub route_id: RouteId,
    pub client: Option<ClientId>,
    pub key: ServerKey,
    pub key_client: Option<ClientKey>,
    pub last_client_id: Option<ClientId>,
    pub idle_time: u64,
    pub io: Option<IoHandle>,
    pub chunk_size: usize,
    state: ServerState,
}

impl ServerRecord {
    pub fn new(
        id: ServerId,
        route_id: RouteId,
        key: ServerKey,
        io: Option<IoHandle>,
        chunk_size: usize,
    ) -> Self {
        ServerRecord {
            id,
            route_id,
            client: None,
            key,
            key_client: None,
            last_client_id: None,
            idle_time: 0,
            io,
            chunk_size,
            state: ServerState::Undef,
        }
    }

    pub fn state(&self) -> &ServerState {
        &self.state
    }
}

/// Per-route, per-state multiset of servers (spec §4.3).
#[derive(Debug, Default)]
pub struct ServerPool {
    by_state: HashMap<ServerState, HashSet<ServerId>>,
    servers: HashMap<ServerId, ServerRecord>,
}

impl ServerPool {
    pub fn new() -> Self {
        ServerPool {
            by_state: HashMap::new(),
            servers: HashMap::new(),
        }
    }

    pub fn total(&self) -> usize {
        self.servers.len()
    }

    pub fn count(&self, state: &ServerState) -> usize {
        self.by_state.get(state).map(|s| s.len()).unwrap_or(0)
    }

    pub fn get(&self, id: &ServerId) -> Option<&ServerRecord> {
        self.servers.get(id)
    }

    pub fn get_mut(&mut self, id: &ServerId) -> Option<&mut ServerRecord> {
        self.servers.get_mut(id)
    }

    /// Insert a freshly-allocated server into the pool in `Undef` state; the caller
    /// immediately calls `set(&id, Active)` to bind it (spec §4.6 `attach`).
    pub fn insert(&mut self, record: ServerRecord) -> ServerId {
        let id = record.id.clone();
        self.by_state
            .entry(ServerState::Undef)
            .or_default()
            .insert(id.clone());
        self.servers.insert(id.clone(), record);
        id
    }

    /// Move a server between state sets. `Undef` removes it from the pool entirely
    /// and returns the removed record so the caller can close/free it outside the
    /// lock (spec §4.6 `close`, `expire`).
    pub fn set(&mut self, id: &ServerId, new_state: ServerState) -> Option<ServerRecord> {
        let record = self.servers.get_mut(id)?;
        let old_state = std::mem::replace(&mut record.state, new_state.clone());
        if let Some(set) = self.by_state.get_mut(&old_state) {
            set.remove(id);
        }
        if matches!(new_state, ServerState::Undef) {
            self.by_state.entry(ServerState::Undef).or_default().remove(id);
            return self.servers.remove(id);
        }
        self.by_state.entry(new_state).or_default().insert(id.clone());
        None
    }

    /// Returns (without removing) one server in the given state, if any.
    pub fn next(&self, state: &ServerState) -> Option<ServerId> {
        self.by_state.get(state)?.iter().next().cloned()
    }

    pub fn ids_in_state(&self, state: &ServerState) -> Vec<ServerId> {
        self.by_state
            .get(state)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// First server in `state` for which `predicate` holds (spec §4.3).
    pub fn find(&self, state: &ServerState, predicate: impl Fn(&ServerRecord) -> bool) -> Option<ServerId> {
        self.by_state.get(state)?.iter().find_map(|id| {
            let record = self.servers.get(id)?;
            predicate(record).then(|| id.clone())
        })
    }

    pub fn bind_client(&mut self, id: &ServerId, client: ClientId, key: ClientKey) {
        if let Some(record) = self.servers.get_mut(id) {
            record.client = Some(client);
            record.key_client = Some(key);
            record.idle_time = 0;
        }
    }

    pub fn unbind_client(&mut self, id: &ServerId) {
        if let Some(record) = self.servers.get_mut(id) {
            record.last_client_id = record.client.take();
            record.key_client = None;
        }
    }

    pub fn bump_idle_time(&mut self, id: &ServerId) {
        if let Some(record) = self.servers.get_mut(id) {
            record.idle_time += 1;
        }
    }

    pub fn io_of(&self, id: &ServerId) -> Option<IoHandle> {
        self.servers.get(id).and_then(|r| r.io.clone())
    }
}

#[cfg(test)]
mod tests;
