//! Concurrently readable route matcher rebuilt through change sets.

use super::entry::RouteEntry;
use super::router::RouteTable;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::{debug, warn};

/// Build-side route records: method to routes in insertion order.
#[derive(Debug, Default)]
struct RouteRecords {
    by_method: HashMap<String, Vec<Arc<RouteEntry>>>,
}

/// Route matcher shared between request handlers and the catalog updater.
///
/// Readers look routes up in the live [`RouteTable`], an immutable generation
/// behind an `Arc`. Writers edit the build-side records through a
/// [`ChangeSet`], and the new generation only becomes visible when the change
/// set commits. The read lock is held just long enough to clone or swap the
/// `Arc`, so readers never wait for a build.
#[derive(Debug, Default)]
pub struct SharedRouteMatcher {
    records: Mutex<RouteRecords>,
    live: RwLock<Arc<RouteTable>>,
}

impl SharedRouteMatcher {
    /// Create a matcher with no routes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry for `method` and `path` in the live generation.
    #[must_use]
    pub fn lookup(&self, method: &str, path: &str) -> Option<Arc<RouteEntry>> {
        self.table().lookup(method, path).cloned()
    }

    /// The live generation.
    #[must_use]
    pub fn table(&self) -> Arc<RouteTable> {
        Arc::clone(&self.live.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Number of routes in the live generation.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.table().route_count()
    }

    /// Open a change set. Blocks while another change set is open.
    pub fn start_change_set(&self) -> ChangeSet<'_> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        ChangeSet {
            matcher: self,
            records,
            dirty: false,
            committed: false,
        }
    }

    fn publish(&self, table: RouteTable) {
        *self.live.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(table);
    }
}

/// Exclusive editing session on a [`SharedRouteMatcher`].
///
/// Edits are invisible to readers until [`ChangeSet::commit`]. Dropping a
/// change set without committing keeps its edits in the build-side records,
/// where the next commit picks them up.
#[derive(Debug)]
pub struct ChangeSet<'a> {
    matcher: &'a SharedRouteMatcher,
    records: MutexGuard<'a, RouteRecords>,
    dirty: bool,
    committed: bool,
}

impl ChangeSet<'_> {
    /// Add a route. Returns `false` if the method already has a route with
    /// the same router pattern.
    pub fn add_route(&mut self, method: &str, path: &str) -> bool {
        let entry = RouteEntry::new(method, path);
        let routes = self
            .records
            .by_method
            .entry(entry.method().to_string())
            .or_insert_with(|| Vec::with_capacity(4));
        if routes.iter().any(|r| r.pattern() == entry.pattern()) {
            return false;
        }
        routes.push(Arc::new(entry));
        self.dirty = true;
        true
    }

    /// Remove the route with the same router pattern. Route order is not
    /// preserved. Returns `false` if no such route exists.
    pub fn remove_route(&mut self, method: &str, path: &str) -> bool {
        let entry = RouteEntry::new(method, path);
        let Some(routes) = self.records.by_method.get_mut(entry.method()) else {
            return false;
        };
        let Some(idx) = routes.iter().position(|r| r.pattern() == entry.pattern()) else {
            return false;
        };
        routes.swap_remove(idx);
        self.dirty = true;
        true
    }

    /// Remove every route, keeping allocated capacity.
    pub fn remove_all(&mut self) {
        for routes in self.records.by_method.values_mut() {
            routes.clear();
        }
        self.dirty = true;
    }

    /// Number of routes in the build-side records.
    #[must_use]
    pub fn pending_route_count(&self) -> usize {
        self.records.by_method.values().map(Vec::len).sum()
    }

    /// Compile the records and make them the live generation.
    ///
    /// Returns the number of routes now live.
    pub fn commit(mut self) -> usize {
        let table = RouteTable::build(&self.records.by_method);
        let count = table.route_count();
        self.matcher.publish(table);
        self.committed = true;
        debug!(routes = count, "route table committed");
        count
    }
}

impl Drop for ChangeSet<'_> {
    fn drop(&mut self) {
        if self.dirty && !self.committed {
            warn!("route change set dropped without commit, edits remain pending");
        }
    }
}
