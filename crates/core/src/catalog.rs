//! Known routes for an account and add-only reconciliation against
//! fresh discovery results.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::types::{RouteDescriptor, RouteId};

/// Add-only union of `old` and `new`, keyed by route id.
///
/// - Routes already in `old` keep their position; their name is replaced
///   by the one in `new` when `new` supplies the same id.
/// - Ids only present in `new` are appended in ascending id order.
/// - Ids missing from `new` are kept. A route that is absent from one
///   discovery pass (e.g. a Friday-only run on a Tuesday) never
///   disappears on its own.
pub fn merge(old: &[RouteDescriptor], new: &[RouteDescriptor]) -> Vec<RouteDescriptor> {
    // Last occurrence wins if discovery lists an id twice.
    let newest: BTreeMap<RouteId, &RouteDescriptor> = new.iter().map(|r| (r.id, r)).collect();

    let mut seen = HashSet::with_capacity(old.len());
    let mut merged: Vec<RouteDescriptor> = Vec::with_capacity(old.len() + newest.len());

    for route in old {
        if !seen.insert(route.id) {
            continue;
        }
        match newest.get(&route.id) {
            Some(renamed) => merged.push((*renamed).clone()),
            None => merged.push(route.clone()),
        }
    }

    // BTreeMap iteration gives ascending ids.
    for (id, route) in &newest {
        if seen.insert(*id) {
            merged.push((*route).clone());
        }
    }

    merged
}

/// Ids present in `new` but not in `old`, ascending.
pub fn added_ids(old: &[RouteDescriptor], new: &[RouteDescriptor]) -> Vec<RouteId> {
    let known: HashSet<RouteId> = old.iter().map(|r| r.id).collect();
    let mut added: Vec<RouteId> = new
        .iter()
        .map(|r| r.id)
        .filter(|id| !known.contains(id))
        .collect();
    added.sort_unstable();
    added.dedup();
    added
}

/// The stored set of routes for one account.
///
/// Owned by the orchestration layer; [`merge`] is the only way it grows.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RouteCatalog {
    routes: Vec<RouteDescriptor>,
}

impl RouteCatalog {
    pub fn new(routes: Vec<RouteDescriptor>) -> Self {
        Self {
            routes: merge(&[], &routes),
        }
    }

    pub fn routes(&self) -> &[RouteDescriptor] {
        &self.routes
    }

    pub fn ids(&self) -> Vec<RouteId> {
        self.routes.iter().map(|r| r.id).collect()
    }

    pub fn contains(&self, id: RouteId) -> bool {
        self.routes.iter().any(|r| r.id == id)
    }

    pub fn get(&self, id: RouteId) -> Option<&RouteDescriptor> {
        self.routes.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Merge a discovery result into the catalog and return the ids that
    /// were not known before.
    pub fn apply(&mut self, discovered: &[RouteDescriptor]) -> Vec<RouteId> {
        let added = added_ids(&self.routes, discovered);
        self.routes = merge(&self.routes, discovered);
        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(id: RouteId, name: &str) -> RouteDescriptor {
        RouteDescriptor::new(id, Some(name))
    }

    fn names(routes: &[RouteDescriptor]) -> Vec<(RouteId, &str)> {
        routes.iter().map(|r| (r.id, r.name.as_str())).collect()
    }

    // -----------------------------------------------------------------------
    // merge
    // -----------------------------------------------------------------------

    #[test]
    fn new_ids_appended_in_ascending_order() {
        let old = vec![route(50, "A")];
        let new = vec![route(90, "C"), route(10, "B"), route(50, "A")];

        let merged = merge(&old, &new);
        assert_eq!(names(&merged), vec![(50, "A"), (10, "B"), (90, "C")]);
    }

    #[test]
    fn missing_ids_are_preserved() {
        let old = vec![route(1, "Mon-Thu"), route(2, "Friday")];
        let new = vec![route(1, "Mon-Thu")];

        let merged = merge(&old, &new);
        assert_eq!(names(&merged), vec![(1, "Mon-Thu"), (2, "Friday")]);
    }

    #[test]
    fn newest_name_wins() {
        let old = vec![route(1, "Old name")];
        let new = vec![route(1, "New name")];

        let merged = merge(&old, &new);
        assert_eq!(names(&merged), vec![(1, "New name")]);
    }

    #[test]
    fn merge_is_idempotent() {
        let old = vec![route(3, "C"), route(1, "A")];
        let new = vec![route(2, "B"), route(1, "A2"), route(4, "D")];

        let once = merge(&old, &new);
        let twice = merge(&once, &new);
        assert_eq!(names(&once), names(&twice));
    }

    #[test]
    fn merge_with_empty_new_is_identity() {
        let old = vec![route(3, "C"), route(1, "A")];
        assert_eq!(names(&merge(&old, &[])), names(&old));
    }

    #[test]
    fn duplicate_ids_in_new_collapse_to_last() {
        let new = vec![route(5, "first"), route(5, "second")];
        let merged = merge(&[], &new);
        assert_eq!(names(&merged), vec![(5, "second")]);
    }

    // -----------------------------------------------------------------------
    // RouteCatalog
    // -----------------------------------------------------------------------

    #[test]
    fn apply_reports_only_new_ids() {
        let mut catalog = RouteCatalog::new(vec![route(1, "A")]);

        let added = catalog.apply(&[route(1, "A"), route(7, "G"), route(4, "D")]);
        assert_eq!(added, vec![4, 7]);
        assert_eq!(catalog.ids(), vec![1, 4, 7]);

        let added = catalog.apply(&[route(4, "D")]);
        assert!(added.is_empty());
        assert_eq!(catalog.len(), 3);
    }

    #[test]
    fn apply_renames_without_reporting_addition() {
        let mut catalog = RouteCatalog::new(vec![route(1, "A")]);

        let added = catalog.apply(&[route(1, "A renamed")]);
        assert!(added.is_empty());
        assert_eq!(catalog.get(1).map(|r| r.name.as_str()), Some("A renamed"));
    }

    #[test]
    fn contains_and_empty() {
        let catalog = RouteCatalog::default();
        assert!(catalog.is_empty());
        assert!(!catalog.contains(1));

        let catalog = RouteCatalog::new(vec![route(1, "A")]);
        assert!(catalog.contains(1));
    }
}
