//! Router: the top-level façade coordinating the rule table, the route pool,
//! and the global client counter (spec §4.6).
//!
//! Grounded on the teacher's `pool::mod::ConnectionPool`/`pool::retain` lock
//! discipline (take the outer lock only to mutate the index or a shared
//! counter, hand off to a per-entry lock for everything else) and on
//! `pool::retain::retain_connections` for the sweep shape used by `expire`
//! and `gc`. The two-level `router → route` hierarchy is spec §5's own
//! addition over the teacher's single-level `DashMap`-backed pool index —
//! see `DESIGN.md` for why a concurrent map was not reused here.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::Mutex;

use crate::backend::{BackendDriver, IdGenerator, IoScheduler};
use crate::client::{Client, ClientState};
use crate::config::RouterConfig;
use crate::errors::Status;
use crate::route::Route;
use crate::route_pool::RoutePool;
use crate::rule::RuleConfig;
use crate::rule::RuleTable;
use crate::server::{ServerRecord, ServerState};
use crate::stats::RouteStats;
use crate::types::{ClientId, RouteId, ServerId, ServerKey, Startup};

/// Copied-out routing metadata for an in-flight cancel request (spec §4.6
/// `cancel`). Owns an independent `StorageHandle` so it outlives a
/// reconfigure that drops the rule it was resolved from (spec §5).
#[derive(Debug, Clone)]
pub struct CancelTarget {
    pub server_id: ServerId,
    pub server_key: ServerKey,
    pub storage: crate::rule::StorageHandle,
}

/// A server handed back by `expire`/`close`/`gc`, ready for the caller to
/// close and free outside any router/route lock (spec §4.6 `expire`, §5
/// "Suspension").
#[derive(Debug)]
pub struct ExpiredServer {
    pub route_id: RouteId,
    pub record: ServerRecord,
}

/// The state the router lock itself protects: the rule table, the route
/// pool index, and the global routed-client counter (spec §3, §5).
#[derive(Debug, Default)]
struct RouterState {
    rules: RuleTable,
    routes: RoutePool,
    clients: u64,
}

/// Top-level façade: `{mutex, rules, route_pool, clients}` of spec §3, plus
/// the injected out-of-scope collaborators (backend driver, id generator,
/// I/O scheduler) the eight operations of §4.6 call out to.
pub struct Router<B, I, S>
where
    B: BackendDriver,
    I: IdGenerator,
    S: IoScheduler,
{
    state: Mutex<RouterState>,
    backend: Arc<B>,
    ids: Arc<I>,
    io: Arc<S>,
    next_client_id: AtomicU64,
}

impl<B, I, S> Router<B, I, S>
where
    B: BackendDriver,
    I: IdGenerator,
    S: IoScheduler,
{
    pub fn new(backend: Arc<B>, ids: Arc<I>, io: Arc<S>) -> Self {
        Router {
            state: Mutex::new(RouterState::default()),
            backend,
            ids,
            io,
            next_client_id: AtomicU64::new(1),
        }
    }

    /// Mint a fresh [`ClientId`] for a caller that doesn't already have one
    /// from the protocol layer. Not part of the spec's eight operations, but
    /// every test and demo caller needs a source of ids; kept here rather
    /// than duplicated in every call site.
    pub fn next_client_id(&self) -> ClientId {
        ClientId(self.next_client_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Number of clients currently routed (spec §3 `Router.clients`, §8
    /// "Counter balance").
    pub fn client_count(&self) -> u64 {
        self.state.lock().clients
    }

    pub fn rule_count(&self) -> usize {
        self.state.lock().rules.len()
    }

    pub fn route_count(&self) -> usize {
        self.state.lock().routes.len()
    }

    // ---- §4.6 `route` ---------------------------------------------------

    /// Classify `client` against the rule table and admit it onto a route
    /// (spec §4.6 `route`). Transactional: any failure after the global
    /// counter/rule ref are taken rolls them back before returning.
    pub fn route(&self, config: &RouterConfig, startup: &Startup, client: &Arc<Client>) -> Status {
        let mut state = self.state.lock();

        let Some(rule) = state.rules.forward(&startup.database, &startup.user) else {
            debug!("no rule matches {:?}/{:?}", startup.database, startup.user);
            return Status::ErrorNotFound;
        };

        let id = rule.effective_id(startup);

        if config.client_max_set && state.clients >= config.client_max as u64 {
            warn!("global client cap ({}) reached, rejecting route", config.client_max);
            return Status::ErrorLimit;
        }

        let route = match state.routes.matching(&id) {
            Some(route) if Arc::ptr_eq(&route.rule, &rule) => route,
            _ => state.routes.insert_new(id.clone(), rule.clone(), true),
        };

        state.clients += 1;
        rule.ref_();

        // `route` is transactional (spec §7): every step from here on must
        // roll the counter and the rule ref back on any early return. A
        // `scopeguard`, as the teacher's own `pool::inner::Pool::timeout_get`
        // uses for its in-flight counter, runs the rollback on every exit
        // path — including a panic — without duplicating it at each `return`.
        // Captures its own clone of `rule` so the original stays free to move
        // into `client.set_routed` once the guard is disarmed.
        let rollback_rule = rule.clone();
        let rollback = scopeguard::guard((), move |_| {
            let mut state = self.state.lock();
            state.clients -= 1;
            rollback_rule.unref();
        });

        // Ordered hand-off: take the route lock, then drop the router lock
        // (spec §4.6 step 5, §5 "router → route").
        let mut inner = route.lock();
        drop(state);

        if rule.config.client_max_set && inner.clients.total() >= rule.config.client_max as usize {
            warn!("per-route client cap ({}) reached for {id}", rule.config.client_max);
            return Status::ErrorLimitRoute;
        }

        inner.clients.insert(client, ClientState::Pending);
        client.set_routed(rule, id.clone());
        drop(inner);
        scopeguard::ScopeGuard::into_inner(rollback);

        debug!("routed client {:?} to {id}", client.id);
        Status::Ok
    }

    // ---- §4.6 `unroute` ---------------------------------------------------

    /// Detach `client` from its route (spec §4.6 `unroute`).
    pub fn unroute(&self, client: &Arc<Client>) {
        {
            let mut state = self.state.lock();
            assert!(state.clients > 0, "unroute called with router.clients == 0");
            state.clients -= 1;
        }

        let Some(route_id) = client.route_id() else {
            return;
        };
        if let Some(route) = self.find_route(&route_id) {
            let mut inner = route.lock();
            inner.clients.remove(client.id);
        }
        // The client took its own reference on the rule in `route()` (spec
        // §3 "refcount >= number of routes and clients holding it"); release
        // it here so an obsoleted rule can actually reach zero once every
        // client routed through it has drained (spec §8 "Refcount balance").
        if let Some(rule) = client.rule() {
            rule.unref();
        }
        client.clear_routed();
        debug!("unrouted client {:?} from {route_id}", client.id);
    }

    // ---- §4.6 `attach` ---------------------------------------------------

    /// Bind `client` to a server, reusing an idle one if available and
    /// allocating a fresh one otherwise (spec §4.6 `attach`). The waiter
    /// queue for `pool_size > 0` is an explicit Non-goal (spec §9) — this
    /// always allocates once no idle server is found, irrespective of
    /// `rule.pool_size`.
    pub fn attach(&self, config: &RouterConfig, client: &Arc<Client>) -> Result<Status, crate::errors::Error> {
        let Some(route_id) = client.route_id() else {
            return Ok(Status::Error);
        };
        let Some(route) = self.find_route(&route_id) else {
            return Ok(Status::Error);
        };
        let Some(rule) = client.rule() else {
            return Ok(Status::Error);
        };

        let existing_idle = {
            let inner = route.lock();
            inner.servers.next(&ServerState::Idle)
        };

        let server_id = match existing_idle {
            Some(id) => id,
            None => {
                // Route lock released while allocating: connecting must
                // never happen under the route lock (spec §5 "Suspension").
                let (key, io) = self.backend.connect(&rule.config.storage)?;
                let id = self.ids.next_server_id();
                let record = ServerRecord::new(id.clone(), route_id.clone(), key, io, config.packet_read_size);
                let mut inner = route.lock();
                inner.servers.insert(record);
                id
            }
        };

        let io_handle = {
            let mut inner = route.lock();
            inner.servers.set(&server_id, ServerState::Active);
            inner.clients.set_state(client.id, ClientState::Pending, ClientState::Active);
            inner.servers.bind_client(&server_id, client.id, client.key);
            client.set_state(ClientState::Active);
            inner.servers.io_of(&server_id)
        };

        if config.is_multi_workers {
            if let Some(io) = io_handle {
                self.io.attach(&io);
            }
        }

        debug!("attached client {:?} to server {server_id} on {route_id}", client.id);
        Ok(Status::Ok)
    }

    // ---- §4.6 `detach` ---------------------------------------------------

    /// Return the server `client` is bound to back to the idle set (spec
    /// §4.6 `detach`). Waking a `queue`-waiting client is not implemented —
    /// see the Non-goal note on `attach`.
    pub fn detach(&self, config: &RouterConfig, client: &Arc<Client>) {
        let Some(route_id) = client.route_id() else {
            return;
        };
        let Some(route) = self.find_route(&route_id) else {
            return;
        };

        let server_id = {
            let inner = route.lock();
            inner
                .servers
                .find(&ServerState::Active, |record| record.client == Some(client.id))
        };
        let Some(server_id) = server_id else {
            return;
        };

        if config.is_multi_workers {
            let io = route.lock().servers.io_of(&server_id);
            if let Some(io) = io {
                self.io.detach(&io);
            }
        }

        let mut inner = route.lock();
        inner.servers.unbind_client(&server_id);
        inner.servers.set(&server_id, ServerState::Idle);
        inner.clients.set_state(client.id, ClientState::Active, ClientState::Pending);
        client.set_state(ClientState::Pending);
        drop(inner);

        debug!("detached client {:?} from server {server_id} on {route_id}", client.id);
    }

    // ---- §4.6 `close` ---------------------------------------------------

    /// Terminate the server bound to `client` definitively (spec §4.6
    /// `close`).
    pub fn close(&self, client: &Arc<Client>) -> Result<(), crate::errors::Error> {
        let Some(route_id) = client.route_id() else {
            return Ok(());
        };
        let Some(route) = self.find_route(&route_id) else {
            return Ok(());
        };

        let server_id = {
            let inner = route.lock();
            inner
                .servers
                .find(&ServerState::Active, |record| record.client == Some(client.id))
                .or_else(|| {
                    inner
                        .servers
                        .find(&ServerState::Idle, |record| record.client == Some(client.id))
                })
        };
        // A client reaching `close` with no bound server is an internal
        // invariant violation (spec §7 "attempting to close a client whose
        // server is null"), not a routine miss — assert rather than
        // silently no-op, the same treatment `unroute` gives `clients == 0`.
        let server_id = server_id.expect("close called on a client with no bound server");

        let (server_key, io_handle) = {
            let inner = route.lock();
            let record = inner.servers.get(&server_id).expect("server vanished under route lock");
            (record.key, record.io.clone())
        };

        // Detach from whatever worker owns the I/O before tearing the server
        // down, mirroring `detach` (spec §5 "Suspension"); `IoScheduler::detach`
        // is a documented no-op when there is no multi-worker loop to detach
        // from, so this is safe to call unconditionally.
        if let Some(io) = &io_handle {
            self.io.detach(io);
        }

        // Backend close happens outside the route lock (spec §5 "Suspension").
        self.backend.close_connection(&server_id, server_key)?;

        let mut inner = route.lock();
        inner.clients.set_state(client.id, ClientState::Active, ClientState::Pending);
        client.set_state(ClientState::Pending);
        inner.servers.set(&server_id, ServerState::Undef);
        drop(inner);

        debug!("closed server {server_id} on {route_id}");
        Ok(())
    }

    // ---- §4.6 `cancel` ---------------------------------------------------

    /// Find the server whose wire key matches `client_key` and copy out
    /// routing metadata the backend driver can use to open an independent
    /// cancel connection (spec §4.6 `cancel`).
    pub fn cancel(&self, client_key: crate::types::ClientKey) -> Result<Option<CancelTarget>, crate::errors::Error> {
        for route in self.snapshot_routes() {
            let found = {
                let inner = route.lock();
                inner
                    .servers
                    .find(&ServerState::Active, |record| record.key_client == Some(client_key))
                    .and_then(|id| inner.servers.get(&id).cloned())
            };
            if let Some(record) = found {
                let storage = route.rule.config.storage.copy()?;
                return Ok(Some(CancelTarget {
                    server_id: record.id,
                    server_key: record.key,
                    storage,
                }));
            }
        }
        Ok(None)
    }

    // ---- §4.6 `kill` ---------------------------------------------------

    /// Close any client with id `id`, wherever it currently is (spec §4.6
    /// `kill`).
    pub fn kill(&self, id: ClientId) -> Option<Arc<Client>> {
        for route in self.snapshot_routes() {
            if let Some(client) = route.kill_client(id) {
                self.finalize_killed(&client);
                return Some(client);
            }
        }
        None
    }

    // ---- §4.6 `reconfigure` ---------------------------------------------------

    /// Hot-swap the rule set and drain every client still bound to a rule
    /// that just became obsolete (spec §4.6 `reconfigure`).
    pub fn reconfigure(&self, new_rules: Vec<RuleConfig>) -> usize {
        let updates = {
            let mut state = self.state.lock();
            state.rules.merge(new_rules)
        };
        if updates > 0 {
            for route in self.snapshot_routes() {
                if route.rule.is_obsolete() {
                    for client in route.kill_client_pool() {
                        self.finalize_killed(&client);
                    }
                }
            }
        }
        debug!("reconfigure: {updates} rule(s) changed obsolescence");
        updates
    }

    // ---- §4.6 `expire` ---------------------------------------------------

    /// TTL / obsolete sweep (spec §4.6 `expire`). The obsolete-route branch
    /// deliberately mirrors the source's incomplete semantics: servers are
    /// copied into the returned list but left in the idle set, so a route
    /// that stays obsolete-with-no-clients across repeated sweeps will keep
    /// re-reporting the same idle servers until `gc` removes the route
    /// entirely (see `DESIGN.md` Open Question 1 and spec §9).
    pub fn expire(&self) -> Vec<ExpiredServer> {
        let mut out = Vec::new();
        for route in self.snapshot_routes() {
            let mut inner = route.lock();
            if route.rule.is_obsolete() && inner.clients.total() == 0 {
                for id in inner.servers.ids_in_state(&ServerState::Idle) {
                    if let Some(record) = inner.servers.get(&id).cloned() {
                        out.push(ExpiredServer {
                            route_id: route.id.clone(),
                            record,
                        });
                    }
                }
                continue;
            }
            if route.rule.config.pool_ttl == 0 {
                continue;
            }
            for id in inner.servers.ids_in_state(&ServerState::Idle) {
                let ttl = route.rule.config.pool_ttl;
                let idle_time = inner.servers.get(&id).map(|r| r.idle_time).unwrap_or(0);
                if idle_time < ttl {
                    inner.servers.bump_idle_time(&id);
                } else if let Some(record) = inner.servers.set(&id, ServerState::Undef) {
                    out.push(ExpiredServer {
                        route_id: route.id.clone(),
                        record,
                    });
                }
            }
        }
        if !out.is_empty() {
            debug!("expire: {} server(s) moved out of idle", out.len());
        }
        out
    }

    /// Close the backend connection for a server [`Self::expire`] already
    /// removed from its route's pool. Deliberately takes no route lock — the
    /// record is no longer reachable through the pool, so this is plain
    /// teardown, exactly as the caller of the source's `expire` is expected
    /// to close and free the servers it collected (spec §4.6 `expire`,
    /// "The caller closes and frees them outside the locks").
    pub fn close_expired(&self, record: &ServerRecord) -> Result<(), crate::errors::Error> {
        self.backend.close_connection(&record.id, record.key)
    }

    // ---- §4.6 `gc` ---------------------------------------------------

    /// Reclaim routes that are empty and either dynamic or obsolete (spec
    /// §4.6 `gc`).
    pub fn gc(&self) -> usize {
        let mut removed = 0;
        for route in self.snapshot_routes() {
            let eligible = {
                let inner = route.lock();
                inner.clients.total() == 0
                    && inner.servers.total() == 0
                    && (route.is_dynamic() || route.rule.is_obsolete())
            };
            if !eligible {
                continue;
            }
            let mut state = self.state.lock();
            if state.routes.remove(&route.id, &route) {
                drop(state);
                route.rule.unref();
                removed += 1;
                debug!("gc: removed empty route {}", route.id);
            }
        }
        removed
    }

    // ---- §4.6 `stat` / `foreach` ---------------------------------------------------

    /// Snapshot usage across every route (spec §4.6 `stat`).
    pub fn stat(&self) -> Vec<RouteStats> {
        self.state.lock().routes.stat()
    }

    /// Iterate all routes under the router lock for the entire sweep (spec
    /// §4.6 `foreach`). Idiomatic Rust substitute for the source's
    /// callback-with-argv shape (spec §9): returns a plain snapshot the
    /// caller iterates with ordinary `for`.
    pub fn foreach(&self) -> Vec<Arc<Route>> {
        self.state.lock().routes.snapshot()
    }

    // ---- internals ---------------------------------------------------

    /// Finish tearing down a client removed from its route by `kill`/
    /// `kill_client_pool`: release the global counter and the client's rule
    /// reference, the same bookkeeping `unroute` performs (spec §3, §8
    /// "Refcount balance" / "Counter balance"). `Route::kill_client` only
    /// touches route-local pools since it runs under the route lock and must
    /// not reach for the router lock (spec §5 lock ordering).
    fn finalize_killed(&self, client: &Arc<Client>) {
        {
            let mut state = self.state.lock();
            assert!(state.clients > 0, "kill finalized a client with router.clients == 0");
            state.clients -= 1;
        }
        if let Some(rule) = client.rule() {
            rule.unref();
        }
        client.clear_routed();
    }

    fn find_route(&self, id: &RouteId) -> Option<Arc<Route>> {
        self.state.lock().routes.matching(id)
    }

    fn snapshot_routes(&self) -> Vec<Arc<Route>> {
        self.state.lock().routes.snapshot()
    }
}
