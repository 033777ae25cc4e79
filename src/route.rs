//! Route: one live `(database, user)` binding and the client/server pools
//! attached to it (spec §4.4).
//!
//! A route's own identity (`id`, `rule`, `dynamic`) is set once at creation and
//! never mutated; only its client and server pools change over the route's
//! life, so those two live behind a single `parking_lot::Mutex` per the spec's
//! per-route locking discipline (spec §5) — one lock protects both because
//! `attach`/`detach` move a client and a server in and out together.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::client::{Client, ClientPool, ClientState};
use crate::rule::Rule;
use crate::server::{ServerPool, ServerState};
use crate::types::{ClientId, RouteId};

/// The mutable state guarded by a route's lock.
#[derive(Debug, Default)]
pub struct RouteInner {
    pub clients: ClientPool,
    pub servers: ServerPool,
}

/// A live route. Always reached through an `Arc<Route>` — held by the router's
/// route pool, and borrowed (never owned) by the clients routed to it.
#[derive(Debug)]
pub struct Route {
    pub id: RouteId,
    pub rule: Arc<Rule>,
    /// `true` for a route created on demand by `route()` because no matching
    /// route existed yet; `false` for one pre-declared by configuration. Purely
    /// informational in this implementation — both kinds are garbage collected
    /// by the same `gc()` rule (spec §4.4, §4.7).
    pub dynamic: bool,
    inner: Mutex<RouteInner>,
}

impl Route {
    pub fn new(id: RouteId, rule: Arc<Rule>, dynamic: bool) -> Arc<Route> {
        Arc::new(Route {
            id,
            rule,
            dynamic,
            inner: Mutex::new(RouteInner::default()),
        })
    }

    pub fn lock(&self) -> parking_lot::MutexGuard<'_, RouteInner> {
        self.inner.lock()
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// `true` when the route holds neither a client nor a server — the
    /// condition `gc()` sweeps on (spec §4.7).
    pub fn is_idle(&self) -> bool {
        let inner = self.inner.lock();
        inner.clients.total() == 0 && inner.servers.total() == 0
    }

    /// Close the named client if it is held by this route (spec §4.5
    /// `kill_client`). The router owns the actual connection teardown (the
    /// client socket is the protocol layer's, not this crate's); this only
    /// removes the client's pool membership and, if it was bound to a
    /// server, returns that server to `Idle` so it isn't leaked. Returns the
    /// removed client so the caller can close the real connection.
    pub fn kill_client(&self, id: ClientId) -> Option<Arc<Client>> {
        let mut inner = self.inner.lock();
        let client = inner.clients.get(id)?;
        if let Some(server_id) = inner
            .servers
            .find(&ServerState::Active, |record| record.client == Some(id))
        {
            inner.servers.unbind_client(&server_id);
            inner.servers.set(&server_id, ServerState::Idle);
        }
        inner.clients.remove(id);
        client.set_state(ClientState::Undef);
        Some(client)
    }

    /// Close every client currently held by this route (spec §4.5
    /// `kill_client_pool`, spec §4.6 `reconfigure`). Returns the removed
    /// clients.
    pub fn kill_client_pool(&self) -> Vec<Arc<Client>> {
        let ids: Vec<ClientId> = {
            let mut inner = self.inner.lock();
            inner
                .clients
                .foreach(ClientState::Pending)
                .into_iter()
                .chain(inner.clients.foreach(ClientState::Active))
                .map(|c| c.id)
                .collect()
        };
        ids.into_iter().filter_map(|id| self.kill_client(id)).collect()
    }
}

#[cfg(test)]
mod tests;
