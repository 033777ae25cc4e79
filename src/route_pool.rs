//! Route pool: the router-wide `RouteId -> Route` index (spec §4.4, §4.5).
//!
//! A `RouteId` can momentarily map to more than one [`Route`]: when
//! `reconfigure` obsoletes a rule, the old route is left in place (still
//! draining its clients and servers) while a fresh route for the same id is
//! created against the new rule the next time `route()` is called for it
//! (spec §4.6 `reconfigure`, `DESIGN.md` Open Question 1). `matching` always
//! returns the newest non-obsolete route; `gc` is what eventually drops the
//! old one once it empties out.

use std::collections::HashMap;
use std::sync::Arc;

use crate::route::Route;
use crate::rule::Rule;
use crate::stats::RouteStats;
use crate::types::RouteId;

/// Router-wide index from route id to the (possibly several, transiently)
/// live routes for it. Always accessed under the router lock (spec §5).
#[derive(Debug, Default)]
pub struct RoutePool {
    routes: HashMap<RouteId, Vec<Arc<Route>>>,
}

impl RoutePool {
    pub fn new() -> Self {
        RoutePool {
            routes: HashMap::new(),
        }
    }

    /// Newest non-obsolete route for `id`, if any (spec §4.6 `route`, step 2).
    pub fn matching(&self, id: &RouteId) -> Option<Arc<Route>> {
        self.routes
            .get(id)?
            .iter()
            .rev()
            .find(|route| !route.rule.is_obsolete())
            .cloned()
    }

    /// Register a freshly created route under its id, taking one reference
    /// on its rule on the route's behalf (spec §4.1 refcount, `DESIGN.md`
    /// Open Question 5).
    pub fn insert_new(&mut self, id: RouteId, rule: Arc<Rule>, dynamic: bool) -> Arc<Route> {
        let route = Route::new(id.clone(), rule, dynamic);
        route.rule.ref_();
        self.routes.entry(id).or_default().push(route.clone());
        route
    }

    /// All routes currently in the pool, snapshotted up front so the caller
    /// can walk them without holding the router lock for the duration (spec
    /// §4.8 `foreach`: "Rust idiom: collect a snapshot rather than a C-style
    /// callback with a next-before-invoke discipline").
    pub fn snapshot(&self) -> Vec<Arc<Route>> {
        self.routes.values().flatten().cloned().collect()
    }

    /// Drop a specific route (by `Arc` identity) from the pool, unregistering
    /// its id entirely once the last route for it is gone. Returns `true` if
    /// the route was found and removed.
    pub fn remove(&mut self, id: &RouteId, route: &Arc<Route>) -> bool {
        let Some(slot) = self.routes.get_mut(id) else {
            return false;
        };
        let before = slot.len();
        slot.retain(|r| !Arc::ptr_eq(r, route));
        let removed = slot.len() != before;
        if slot.is_empty() {
            self.routes.remove(id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Per-route snapshot statistics (spec §10.5 `RouteStats`).
    pub fn stat(&self) -> Vec<RouteStats> {
        self.snapshot().iter().map(|route| RouteStats::of(route)).collect()
    }
}

#[cfg(test)]
mod tests;
