//! Snapshot statistics (spec §10.5).
//!
//! The routing-core analogue of the teacher's `stats::pool::PoolStats`, minus
//! the query/transaction timing fields — those are populated from protocol
//! traffic the router never sees (spec §1 Out of scope).

use bytes::Bytes;

use crate::client::ClientState;
use crate::route::Route;
use crate::server::ServerState;
use crate::types::RouteId;

#[derive(Debug, Clone)]
pub struct RouteStats {
    pub database: Bytes,
    pub user: Bytes,
    pub dynamic: bool,
    pub clients_total: usize,
    pub clients_active: usize,
    pub clients_pending: usize,
    pub servers_total: usize,
    pub servers_idle: usize,
    pub servers_active: usize,
    pub rule_refcount: usize,
    pub rule_obsolete: bool,
}

impl RouteStats {
    pub fn of(route: &Route) -> Self {
        let RouteId { database, user } = route.id.clone();
        let inner = route.lock();
        RouteStats {
            database,
            user,
            dynamic: route.is_dynamic(),
            clients_total: inner.clients.total(),
            clients_active: inner.clients.count(ClientState::Active),
            clients_pending: inner.clients.count(ClientState::Pending),
            servers_total: inner.servers.total(),
            servers_idle: inner.servers.count(&ServerState::Idle),
            servers_active: inner.servers.count(&ServerState::Active),
            rule_refcount: route.rule.ref_count(),
            rule_obsolete: route.rule.is_obsolete(),
        }
    }
}
