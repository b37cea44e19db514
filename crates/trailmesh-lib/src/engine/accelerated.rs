//! Frozen compressed-adjacency graph with A* search and grid-indexed snapping.

use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::debug;

use super::{EngineInitError, EngineSource, RoutingEngine};
use crate::geo::{haversine_km, project_onto_segment, Coordinate};
use crate::graph::{Edge, GeoGraph, NodeId};
use crate::path::{Path, QueueEntry};
use crate::snap::{NodeSnap, Snap, SnapAccumulator};
use crate::spatial::BucketGrid;

/// Bucket size of the snapping index in degrees (roughly 1.1 km).
const INDEX_BUCKET_DEG: f64 = 0.01;

/// Segments whose bounding box covers more buckets than this are scanned on
/// every query instead of being indexed.
const MAX_SEGMENT_BUCKETS: i64 = 64;

/// Rings examined before falling back to a full scan.
const MAX_RING: i64 = 32;

/// Immutable routing engine built once from a [`GeoGraph`].
#[derive(Debug)]
pub struct AcceleratedEngine {
    coordinates: Vec<Coordinate>,
    /// `edges[offsets[n]..offsets[n + 1]]` are the outgoing edges of node `n`.
    offsets: Vec<u32>,
    edges: Vec<Edge>,
    /// Each undirected edge once as `(lower id, higher id)`.
    segments: Vec<(u32, u32)>,
    node_index: BucketGrid<u32>,
    segment_index: BucketGrid<u32>,
    long_segments: Vec<u32>,
    min_multiplier: f64,
    searches: AtomicUsize,
}

impl AcceleratedEngine {
    pub fn build(graph: &GeoGraph) -> Result<Self, EngineInitError> {
        if graph.is_empty() {
            return Err(EngineInitError::Empty);
        }
        let node_total = graph.node_count();
        let edge_total = graph.edge_count();
        if u32::try_from(node_total).is_err() || u32::try_from(edge_total).is_err() {
            return Err(EngineInitError::TooLarge {
                nodes: node_total,
                edges: edge_total,
            });
        }

        let mut coordinates = Vec::with_capacity(node_total);
        let mut offsets = Vec::with_capacity(node_total + 1);
        let mut edges = Vec::with_capacity(edge_total);
        let mut node_index = BucketGrid::new(INDEX_BUCKET_DEG);
        offsets.push(0u32);
        for node in graph.all_nodes() {
            coordinates.push(node.coordinate);
            edges.extend(node.edges().iter().cloned());
            offsets.push(edges.len() as u32);
            node_index.insert(&node.coordinate, node.id as u32);
        }

        let min_multiplier = edges
            .iter()
            .filter(|edge| edge.distance_km > 0.0)
            .map(Edge::cost_multiplier)
            .fold(f64::INFINITY, f64::min);
        let min_multiplier = if min_multiplier.is_finite() {
            min_multiplier
        } else {
            0.0
        };

        let mut engine = Self {
            coordinates,
            offsets,
            edges,
            segments: Vec::new(),
            node_index,
            segment_index: BucketGrid::new(INDEX_BUCKET_DEG),
            long_segments: Vec::new(),
            min_multiplier,
            searches: AtomicUsize::new(0),
        };
        engine.index_segments(graph);
        debug!(
            nodes = node_total,
            edges = edge_total,
            long_segments = engine.long_segments.len(),
            min_multiplier,
            "built accelerated engine"
        );
        Ok(engine)
    }

    fn index_segments(&mut self, graph: &GeoGraph) {
        for (from, to, _) in graph.undirected_edges() {
            let id = self.segments.len() as u32;
            self.segments.push((from as u32, to as u32));

            let (a, b) = (self.coordinates[from], self.coordinates[to]);
            let (min_col, min_row) = self
                .segment_index
                .key_for(&Coordinate::new(a.lng.min(b.lng), a.lat.min(b.lat)));
            let (max_col, max_row) = self
                .segment_index
                .key_for(&Coordinate::new(a.lng.max(b.lng), a.lat.max(b.lat)));
            if (max_col - min_col + 1) * (max_row - min_row + 1) > MAX_SEGMENT_BUCKETS {
                self.long_segments.push(id);
                continue;
            }
            for column in min_col..=max_col {
                for row in min_row..=max_row {
                    self.segment_index.insert_at((column, row), id);
                }
            }
        }
    }

    fn outgoing(&self, node: NodeId) -> &[Edge] {
        match (self.offsets.get(node), self.offsets.get(node + 1)) {
            (Some(&start), Some(&end)) => &self.edges[start as usize..end as usize],
            _ => &[],
        }
    }

    fn node_usable(&self, node: NodeId, mode: Option<&str>) -> bool {
        mode.is_none() || self.outgoing(node).iter().any(|edge| edge.allows(mode))
    }

    fn segment_usable(&self, segment: u32, mode: Option<&str>) -> bool {
        let (from, to) = self.segments[segment as usize];
        self.outgoing(from as usize)
            .iter()
            .any(|edge| edge.target == to as usize && edge.allows(mode))
    }

    /// Nodes and segments close enough to contain the nearest snap, sorted by id.
    fn snap_candidates(&self, coordinate: &Coordinate, mode: Option<&str>) -> (Vec<u32>, Vec<u32>) {
        let mut nodes = Vec::new();
        let mut segments: Vec<u32> = self
            .long_segments
            .iter()
            .copied()
            .filter(|segment| self.segment_usable(*segment, mode))
            .collect();
        let mut best = f64::INFINITY;
        for &segment in &segments {
            best = best.min(self.segment_distance(coordinate, segment));
        }

        let mut bounded = false;
        for radius in 0..=MAX_RING {
            for node in self.node_index.ring(coordinate, radius) {
                if self.node_usable(node as usize, mode) {
                    best = best.min(haversine_km(coordinate, &self.coordinates[node as usize]));
                    nodes.push(node);
                }
            }
            for segment in self.segment_index.ring(coordinate, radius) {
                if self.segment_usable(segment, mode) {
                    best = best.min(self.segment_distance(coordinate, segment));
                    segments.push(segment);
                }
            }
            if best <= self.node_index.ring_clearance_km(coordinate, radius) {
                bounded = true;
                break;
            }
        }

        if !bounded {
            nodes = (0..self.coordinates.len() as u32)
                .filter(|node| self.node_usable(*node as usize, mode))
                .collect();
            segments = (0..self.segments.len() as u32)
                .filter(|segment| self.segment_usable(*segment, mode))
                .collect();
        }
        nodes.sort_unstable();
        nodes.dedup();
        segments.sort_unstable();
        segments.dedup();
        (nodes, segments)
    }

    fn segment_distance(&self, coordinate: &Coordinate, segment: u32) -> f64 {
        let (from, to) = self.segments[segment as usize];
        project_onto_segment(
            coordinate,
            &self.coordinates[from as usize],
            &self.coordinates[to as usize],
        )
        .distance_km
    }

    fn nearest_node_among(&self, coordinate: &Coordinate, nodes: &[u32]) -> Option<NodeSnap> {
        nodes
            .iter()
            .map(|&node| {
                let node_coordinate = self.coordinates[node as usize];
                NodeSnap {
                    node: node as usize,
                    coordinate: node_coordinate,
                    distance_km: haversine_km(coordinate, &node_coordinate),
                }
            })
            .fold(None, |best: Option<NodeSnap>, candidate| match best {
                Some(current) if current.distance_km <= candidate.distance_km => Some(current),
                _ => Some(candidate),
            })
    }

    fn heuristic(&self, node: NodeId, goal: &Coordinate) -> f64 {
        haversine_km(&self.coordinates[node], goal) * self.min_multiplier
    }
}

impl RoutingEngine for AcceleratedEngine {
    fn source(&self) -> EngineSource {
        EngineSource::Accelerated
    }

    fn find_nearest_point(&self, coordinate: &Coordinate, mode: Option<&str>) -> Option<Snap> {
        let (nodes, segments) = self.snap_candidates(coordinate, mode);
        let mut accumulator = SnapAccumulator::new();
        if let Some(node) = self.nearest_node_among(coordinate, &nodes) {
            accumulator.offer_node(node.node, node.coordinate, node.distance_km);
        }
        for segment in segments {
            let (from, to) = self.segments[segment as usize];
            let (from, to) = (from as usize, to as usize);
            accumulator.offer_edge(
                coordinate,
                (from, &self.coordinates[from]),
                (to, &self.coordinates[to]),
            );
        }
        accumulator.best()
    }

    fn find_nearest_node(&self, coordinate: &Coordinate, mode: Option<&str>) -> Option<NodeSnap> {
        let (nodes, _) = self.snap_candidates(coordinate, mode);
        self.nearest_node_among(coordinate, &nodes)
    }

    fn build_path(&self, start: NodeId, goal: NodeId, mode: Option<&str>) -> Option<Path> {
        self.searches.fetch_add(1, Ordering::Relaxed);
        let start_coordinate = *self.coordinates.get(start)?;
        let goal_coordinate = *self.coordinates.get(goal)?;
        if start == goal {
            return Some(Path::single(start, start_coordinate));
        }

        let node_count = self.coordinates.len();
        let mut costs = vec![f64::INFINITY; node_count];
        let mut parents: Vec<Option<(NodeId, usize)>> = vec![None; node_count];
        let mut closed = vec![false; node_count];
        let mut open = BinaryHeap::new();
        let mut sequence = 0u64;

        costs[start] = 0.0;
        open.push(QueueEntry::new(start, self.heuristic(start, &goal_coordinate), sequence));

        while let Some(entry) = open.pop() {
            let node = entry.node;
            if closed[node] {
                continue;
            }
            closed[node] = true;
            if node == goal {
                break;
            }

            let base = self.offsets[node] as usize;
            for (offset, edge) in self.outgoing(node).iter().enumerate() {
                if closed[edge.target] || !edge.allows(mode) {
                    continue;
                }
                let tentative = costs[node] + edge.weight;
                if tentative < costs[edge.target] {
                    costs[edge.target] = tentative;
                    parents[edge.target] = Some((node, base + offset));
                    sequence += 1;
                    let estimate = tentative + self.heuristic(edge.target, &goal_coordinate);
                    open.push(QueueEntry::new(edge.target, estimate, sequence));
                }
            }
        }

        if !closed[goal] {
            return None;
        }

        let mut chain = Vec::new();
        let mut current = goal;
        while current != start {
            let (from, edge_index) = parents[current]?;
            chain.push((from, edge_index));
            current = from;
        }
        chain.reverse();

        let hops = chain.into_iter().map(|(from, edge_index)| {
            let edge = &self.edges[edge_index];
            (
                from,
                self.coordinates[from],
                edge,
                self.coordinates[edge.target],
            )
        });
        Some(Path::from_hops(start, start_coordinate, hops))
    }

    fn coordinate(&self, node: NodeId) -> Option<Coordinate> {
        self.coordinates.get(node).copied()
    }

    fn edge(&self, from: NodeId, to: NodeId) -> Option<Edge> {
        self.outgoing(from)
            .iter()
            .find(|edge| edge.target == to)
            .cloned()
    }

    fn all_nodes(&self) -> Vec<(NodeId, Coordinate)> {
        self.coordinates.iter().copied().enumerate().collect()
    }

    fn node_count(&self) -> usize {
        self.coordinates.len()
    }

    fn edge_count(&self) -> usize {
        self.edges.len()
    }

    fn supports_mode(&self, mode: &str) -> bool {
        self.edges.iter().any(|edge| edge.allows(Some(mode)))
    }

    fn search_count(&self) -> usize {
        self.searches.load(Ordering::Relaxed)
    }
}
