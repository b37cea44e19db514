use std::fmt::Write as _;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};

use lru::LruCache;

use crate::geo::Coordinate;
use crate::route::{LegSnapshot, Route};

/// Per-router store of finished routes.
///
/// Unbounded by default; with a capacity the least recently used entry is
/// evicted. Reads hand out clones, so cached routes are never aliased.
#[derive(Debug)]
pub struct RouteCache {
    entries: Mutex<LruCache<String, Route>>,
}

impl Default for RouteCache {
    fn default() -> Self {
        Self::new(None)
    }
}

impl RouteCache {
    pub fn new(capacity: Option<usize>) -> Self {
        let entries = match capacity.and_then(NonZeroUsize::new) {
            Some(capacity) => LruCache::new(capacity),
            None => LruCache::unbounded(),
        };
        Self {
            entries: Mutex::new(entries),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, Route>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &str) -> Option<Route> {
        self.lock().get(key).cloned()
    }

    pub fn insert(&self, key: String, route: Route) {
        self.lock().put(key, route);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

}

/// Normalized cache key: mode, waypoints rounded to six decimals and a
/// fingerprint of any preserved legs.
pub fn cache_key(mode: &str, waypoints: &[Coordinate], preserved: &[LegSnapshot]) -> String {
    let mut key = String::with_capacity(16 + waypoints.len() * 24);
    key.push_str(mode);
    key.push('|');
    for (index, waypoint) in waypoints.iter().enumerate() {
        if index > 0 {
            key.push(';');
        }
        let _ = write!(key, "{waypoint}");
    }
    for snapshot in preserved {
        let _ = write!(
            key,
            "|{}-{}:{}:",
            snapshot.start_index, snapshot.end_index, snapshot.routing_mode
        );
        for coordinate in &snapshot.coordinates {
            let _ = write!(key, "{coordinate},{:.1};", coordinate.ele);
        }
        for entry in snapshot.metadata.iter().chain(&snapshot.edges) {
            let _ = write!(
                key,
                "{}/{:.6}/{:.3};",
                entry.source, entry.distance_km, entry.cost_multiplier
            );
        }
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoutingConfig;
    use crate::route::RouteBuilder;

    fn route() -> Route {
        RouteBuilder::new(&RoutingConfig::default(), "foot").finish("baseline")
    }

    #[test]
    fn keys_round_coordinates() {
        let a = cache_key("foot", &[Coordinate::new(7.123_456_71, 46.0)], &[]);
        let b = cache_key("foot", &[Coordinate::new(7.123_456_74, 46.0)], &[]);
        let c = cache_key("cycling", &[Coordinate::new(7.123_456_74, 46.0)], &[]);
        assert_eq!(a, b);
        assert_ne!(b, c);
    }

    #[test]
    fn preserved_legs_change_the_key() {
        let waypoints = [Coordinate::new(7.0, 46.0), Coordinate::new(7.01, 46.0)];
        let snapshot = LegSnapshot {
            start_index: 0,
            end_index: 1,
            coordinates: waypoints.to_vec(),
            metadata: Vec::new(),
            edges: Vec::new(),
            routing_mode: "foot".to_string(),
        };
        assert_ne!(
            cache_key("foot", &waypoints, &[]),
            cache_key("foot", &waypoints, &[snapshot])
        );
    }

    #[test]
    fn preserved_interior_geometry_changes_the_key() {
        let waypoints = [Coordinate::new(7.0, 46.0), Coordinate::new(7.01, 46.0)];
        let snapshot = |middle: Coordinate| LegSnapshot {
            start_index: 0,
            end_index: 1,
            coordinates: vec![waypoints[0], middle, waypoints[1]],
            metadata: Vec::new(),
            edges: Vec::new(),
            routing_mode: "foot".to_string(),
        };
        // Mirror images across the straight line have the same length.
        let north = snapshot(Coordinate::new(7.005, 46.001));
        let south = snapshot(Coordinate::new(7.005, 45.999));
        assert_ne!(
            cache_key("foot", &waypoints, &[north]),
            cache_key("foot", &waypoints, &[south])
        );
    }

    #[test]
    fn bounded_cache_evicts_least_recently_used() {
        let cache = RouteCache::new(Some(2));
        cache.insert("a".into(), route());
        cache.insert("b".into(), route());
        assert!(cache.get("a").is_some());
        cache.insert("c".into(), route());
        assert!(cache.get("b").is_none());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn reads_return_independent_clones() {
        let cache = RouteCache::default();
        cache.insert("k".into(), route());
        let mut first = cache.get("k").expect("cached");
        first.properties.warnings.push("edited".into());
        assert!(cache.get("k").expect("cached").warnings().is_empty());
    }
}
