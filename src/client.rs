//! Client pool: the per-route multiset of client borrows (spec §4.2).
//!
//! The router does not own clients — it only holds a borrow for the span
//! `route` → … → `unroute` (spec §2, §3) — so unlike [`crate::server::ServerPool`]
//! this pool stores [`std::sync::Weak`] handles, not `Arc`s. A client that
//! disconnects without calling `unroute` simply becomes a dangling weak entry,
//! swept out lazily by whichever operation next walks the state set it was in.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use crate::rule::Rule;
use crate::types::{ClientId, ClientKey, GlobalHandle, RouteId};

/// Per spec §3 "Design Notes: sum-typed states over integer codes". `Queue` is
/// carried for sum-type completeness (spec §9) but never entered by this
/// implementation, which does not implement fair waiter queueing (see
/// `DESIGN.md` Open Question 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientState {
    Undef,
    Pending,
    Active,
    Queue,
}

/// The router's view of one client for the duration of its route borrow.
///
/// Fields the router mutates after a rule/route reassignment (`rule`, `route`)
/// live behind an interior lock so a caller holding only a `&Client` — handed
/// out by `foreach`, say — can still observe a consistent snapshot without the
/// router handing out `&mut`.
#[derive(Debug)]
pub struct Client {
    pub id: ClientId,
    pub key: ClientKey,
    pub global: Option<GlobalHandle>,
    shadow: parking_lot::Mutex<ClientShadow>,
}

#[derive(Debug)]
struct ClientShadow {
    rule: Option<Arc<Rule>>,
    route: Option<RouteId>,
    state: ClientState,
}

impl Client {
    pub fn new(id: ClientId, key: ClientKey, global: Option<GlobalHandle>) -> Arc<Client> {
        Arc::new(Client {
            id,
            key,
            global,
            shadow: parking_lot::Mutex::new(ClientShadow {
                rule: None,
                route: None,
                state: ClientState::Undef,
            }),
        })
    }

    pub fn state(&self) -> ClientState {
        self.shadow.lock().state
    }

    pub fn route_id(&self) -> Option<RouteId> {
        self.shadow.lock().route.clone()
    }

    pub fn rule(&self) -> Option<Arc<Rule>> {
        self.shadow.lock().rule.clone()
    }

    pub(crate) fn set_routed(&self, rule: Arc<Rule>, route: RouteId) {
        let mut shadow = self.shadow.lock();
        shadow.rule = Some(rule);
        shadow.route = Some(route);
        shadow.state = ClientState::Pending;
    }

    pub(crate) fn set_state(&self, state: ClientState) {
        self.shadow.lock().state = state;
    }

    pub(crate) fn clear_routed(&self) {
        let mut shadow = self.shadow.lock();
        shadow.rule = None;
        shadow.route = None;
        shadow.state = ClientState::Undef;
    }
}

/// Per-route, per-state multiset of client borrows (spec §4.2).
#[derive(Debug, Default)]
pub struct ClientPool {
    by_state: HashMap<ClientState, HashSet<ClientId>>,
    clients: HashMap<ClientId, Weak<Client>>,
}

impl ClientPool {
    pub fn new() -> Self {
        ClientPool {
            by_state: HashMap::new(),
            clients: HashMap::new(),
        }
    }

    pub fn total(&self) -> usize {
        self.clients.len()
    }

    pub fn count(&self, state: ClientState) -> usize {
        self.by_state.get(&state).map(|s| s.len()).unwrap_or(0)
    }

    pub fn insert(&mut self, client: &Arc<Client>, state: ClientState) {
        self.clients.insert(client.id, Arc::downgrade(client));
        self.by_state.entry(state).or_default().insert(client.id);
    }

    pub fn remove(&mut self, id: ClientId) {
        self.clients.remove(&id);
        for set in self.by_state.values_mut() {
            set.remove(&id);
        }
    }

    pub fn set_state(&mut self, id: ClientId, old: ClientState, new: ClientState) {
        if let Some(set) = self.by_state.get_mut(&old) {
            set.remove(&id);
        }
        self.by_state.entry(new).or_default().insert(id);
    }

    /// Upgrade every live weak handle in `state`, silently dropping entries whose
    /// client has already disconnected without calling `unroute`.
    pub fn foreach(&mut self, state: ClientState) -> Vec<Arc<Client>> {
        let ids: Vec<ClientId> = self
            .by_state
            .get(&state)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default();
        let mut live = Vec::with_capacity(ids.len());
        let mut dead = Vec::new();
        for id in ids {
            match self.clients.get(&id).and_then(Weak::upgrade) {
                Some(client) => live.push(client),
                None => dead.push(id),
            }
        }
        for id in dead {
            self.remove(id);
        }
        live
    }

    pub fn get(&self, id: ClientId) -> Option<Arc<Client>> {
        self.clients.get(&id).and_then(Weak::upgrade)
    }
}
