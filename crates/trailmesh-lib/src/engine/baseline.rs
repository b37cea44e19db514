use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use super::{EngineSource, RoutingEngine};
use crate::geo::Coordinate;
use crate::graph::{Edge, GeoGraph, Insertion, NodeId};
use crate::path::{find_path, Path};
use crate::snap::{nearest_node, nearest_point, NodeSnap, Snap};

/// [`GeoGraph`] plus Dijkstra behind a read/write lock.
///
/// Searches and snaps share read access; `insert_node` takes the write lock,
/// so edge splits are serialized against every request on the same graph.
#[derive(Debug)]
pub struct GraphEngine {
    graph: RwLock<GeoGraph>,
    searches: AtomicUsize,
}

impl GraphEngine {
    pub fn new(graph: GeoGraph) -> Self {
        Self {
            graph: RwLock::new(graph),
            searches: AtomicUsize::new(0),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, GeoGraph> {
        self.graph.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, GeoGraph> {
        self.graph.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RoutingEngine for GraphEngine {
    fn source(&self) -> EngineSource {
        EngineSource::Baseline
    }

    fn find_nearest_point(&self, coordinate: &Coordinate, mode: Option<&str>) -> Option<Snap> {
        nearest_point(&self.read(), coordinate, mode)
    }

    fn find_nearest_node(&self, coordinate: &Coordinate, mode: Option<&str>) -> Option<NodeSnap> {
        nearest_node(&self.read(), coordinate, mode)
    }

    fn build_path(&self, start: NodeId, goal: NodeId, mode: Option<&str>) -> Option<Path> {
        self.searches.fetch_add(1, Ordering::Relaxed);
        find_path(&self.read(), start, goal, mode)
    }

    fn coordinate(&self, node: NodeId) -> Option<Coordinate> {
        self.read().coordinate(node)
    }

    fn edge(&self, from: NodeId, to: NodeId) -> Option<Edge> {
        self.read().edge(from, to).cloned()
    }

    fn all_nodes(&self) -> Vec<(NodeId, Coordinate)> {
        self.read()
            .all_nodes()
            .iter()
            .map(|node| (node.id, node.coordinate))
            .collect()
    }

    fn node_count(&self) -> usize {
        self.read().node_count()
    }

    fn edge_count(&self) -> usize {
        self.read().edge_count()
    }

    fn supports_mode(&self, mode: &str) -> bool {
        self.read().supports_mode(mode)
    }

    fn search_count(&self) -> usize {
        self.searches.load(Ordering::Relaxed)
    }

    fn insert_node(&self, coordinate: &Coordinate) -> Option<Insertion> {
        let insertion = self.write().insert_node(coordinate);
        debug!(?insertion, %coordinate, "inserted node");
        Some(insertion)
    }

    fn dispose(&self) {
        let mut graph = self.write();
        graph.load(&[]);
    }
}
