//! Node/edge model built from line features.
//!
//! Nodes live in an arena and are addressed by stable [`NodeId`] indices. Raw
//! coordinates are merged into existing nodes when they fall within the merge
//! tolerance; candidates come from the 3×3 neighbourhood of a [`BucketGrid`],
//! never from a global scan.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::RoutingConfig;
use crate::geo::{climb, haversine_km, Coordinate};
use crate::network::{mode_allowed, EdgeAttributes, ModeSet, NetworkFeature};
use crate::path::{find_path, Path};
use crate::snap::{self, NodeSnap, Snap, ENDPOINT_EPSILON_KM};
use crate::spatial::BucketGrid;

/// Arena index of a node.
pub type NodeId = usize;

/// Key derived from a coordinate rounded to the configured precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey {
    lng: i64,
    lat: i64,
    precision: u32,
}

impl NodeKey {
    pub fn from_coordinate(coordinate: &Coordinate, precision: u32) -> Self {
        let scale = 10f64.powi(precision as i32);
        Self {
            lng: (coordinate.lng * scale).round() as i64,
            lat: (coordinate.lat * scale).round() as i64,
            precision,
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scale = 10f64.powi(self.precision as i32);
        let digits = self.precision as usize;
        write!(
            f,
            "{:.*},{:.*}",
            digits,
            self.lng as f64 / scale,
            digits,
            self.lat as f64 / scale
        )
    }
}

/// Directed edge within the routing graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub target: NodeId,
    /// Search cost: `distance_km × cost multiplier`.
    pub weight: f64,
    pub distance_km: f64,
    /// Elevation gain in metres in the direction of travel.
    pub ascent: f64,
    /// Elevation loss in metres in the direction of travel.
    pub descent: f64,
    pub modes: Option<ModeSet>,
    pub attributes: Option<Arc<EdgeAttributes>>,
}

impl Edge {
    /// Multiplier recovered from the stored weight and distance.
    pub fn cost_multiplier(&self) -> f64 {
        if self.distance_km > 0.0 {
            self.weight / self.distance_km
        } else {
            1.0
        }
    }

    pub fn allows(&self, mode: Option<&str>) -> bool {
        mode_allowed(self.modes.as_ref(), mode)
    }
}

/// Graph node: coordinate, key and outgoing edges.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub key: NodeKey,
    pub coordinate: Coordinate,
    edges: Vec<Edge>,
}

impl Node {
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }
}

/// Options controlling how the graph merges and splits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphOptions {
    pub merge_tolerance_km: f64,
    pub bucket_size_deg: f64,
    pub key_precision: u32,
    pub split_edges_on_insert: bool,
}

impl Default for GraphOptions {
    fn default() -> Self {
        GraphOptions::from(&RoutingConfig::default())
    }
}

impl From<&RoutingConfig> for GraphOptions {
    fn from(config: &RoutingConfig) -> Self {
        Self {
            merge_tolerance_km: config.merge_tolerance_km(),
            bucket_size_deg: config.bucket_size_deg,
            key_precision: config.key_precision,
            split_edges_on_insert: config.split_edges_on_insert,
        }
    }
}

/// Outcome of [`GeoGraph::insert_node`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Insertion {
    /// An existing node lies within the merge tolerance.
    Existing(NodeId),
    /// A new node was created on an edge, which was split in two.
    Split {
        node: NodeId,
        from: NodeId,
        to: NodeId,
    },
    /// A new node was created without any edges.
    Detached(NodeId),
}

impl Insertion {
    pub fn node(&self) -> NodeId {
        match *self {
            Insertion::Existing(node) | Insertion::Detached(node) => node,
            Insertion::Split { node, .. } => node,
        }
    }
}

/// Directed weighted graph over geographic nodes.
#[derive(Debug, Clone)]
pub struct GeoGraph {
    options: GraphOptions,
    nodes: Vec<Node>,
    grid: BucketGrid<NodeId>,
    keys: HashMap<NodeKey, NodeId>,
}

impl Default for GeoGraph {
    fn default() -> Self {
        Self::new(GraphOptions::default())
    }
}

impl GeoGraph {
    pub fn new(options: GraphOptions) -> Self {
        Self {
            options,
            nodes: Vec::new(),
            grid: BucketGrid::new(options.bucket_size_deg),
            keys: HashMap::new(),
        }
    }

    /// Build a graph from features in one step.
    pub fn from_features(features: &[NetworkFeature], options: GraphOptions) -> Self {
        let mut graph = Self::new(options);
        graph.load(features);
        graph
    }

    pub fn options(&self) -> &GraphOptions {
        &self.options
    }

    /// Clear the graph and rebuild it from `features`. Never fails: unusable
    /// lines and degenerate segments are skipped.
    pub fn load(&mut self, features: &[NetworkFeature]) {
        self.nodes.clear();
        self.grid.clear();
        self.keys.clear();

        let mut skipped_segments = 0usize;
        for feature in features {
            let multiplier = if feature.cost_multiplier.is_finite() && feature.cost_multiplier > 0.0
            {
                feature.cost_multiplier
            } else {
                1.0
            };
            for line in &feature.lines {
                for pair in line.windows(2) {
                    if !(pair[0].is_valid() && pair[1].is_valid()) {
                        skipped_segments += 1;
                        continue;
                    }
                    let from = self.resolve_node(&pair[0]);
                    let to = self.resolve_node(&pair[1]);
                    if from == to {
                        skipped_segments += 1;
                        continue;
                    }
                    self.connect(from, to, multiplier, feature);
                }
            }
        }

        if skipped_segments > 0 {
            debug!(skipped_segments, "skipped degenerate segments during load");
        }
        info!(
            nodes = self.node_count(),
            edges = self.edge_count(),
            features = features.len(),
            "built network graph"
        );
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of directed edges.
    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|node| node.edges.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn all_nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn coordinate(&self, id: NodeId) -> Option<Coordinate> {
        self.nodes.get(id).map(|node| node.coordinate)
    }

    /// Outgoing edges of `id`; empty for unknown nodes.
    pub fn neighbours(&self, id: NodeId) -> &[Edge] {
        self.nodes
            .get(id)
            .map(|node| node.edges.as_slice())
            .unwrap_or(&[])
    }

    /// Directed edge from `from` to `to`, if present.
    pub fn edge(&self, from: NodeId, to: NodeId) -> Option<&Edge> {
        self.neighbours(from).iter().find(|edge| edge.target == to)
    }

    pub fn node_by_key(&self, key: &NodeKey) -> Option<NodeId> {
        self.keys.get(key).copied()
    }

    /// Each undirected edge once, as `(lower id, higher id, forward edge)`.
    pub fn undirected_edges(&self) -> impl Iterator<Item = (NodeId, NodeId, &Edge)> + '_ {
        self.nodes.iter().flat_map(|node| {
            node.edges
                .iter()
                .filter(move |edge| edge.target > node.id)
                .map(move |edge| (node.id, edge.target, edge))
        })
    }

    /// Whether any edge can be travelled in `mode`.
    pub fn supports_mode(&self, mode: &str) -> bool {
        self.nodes
            .iter()
            .flat_map(|node| node.edges.iter())
            .any(|edge| edge.allows(Some(mode)))
    }

    /// Existing node within the merge tolerance of `coordinate`, nearest first.
    pub fn find_mergeable(&self, coordinate: &Coordinate) -> Option<NodeId> {
        let key = NodeKey::from_coordinate(coordinate, self.options.key_precision);
        if let Some(id) = self.keys.get(&key) {
            return Some(*id);
        }
        self.grid
            .neighbourhood(coordinate)
            .map(|id| (id, haversine_km(coordinate, &self.nodes[id].coordinate)))
            .filter(|(_, distance)| *distance <= self.options.merge_tolerance_km)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    pub fn find_nearest_node(&self, coordinate: &Coordinate) -> Option<NodeSnap> {
        snap::nearest_node(self, coordinate, None)
    }

    pub fn find_nearest_point(&self, coordinate: &Coordinate) -> Option<Snap> {
        snap::nearest_point(self, coordinate, None)
    }

    pub fn build_path(&self, start: NodeId, goal: NodeId, mode: Option<&str>) -> Option<Path> {
        find_path(self, start, goal, mode)
    }

    /// Insert a node at `coordinate` after the load phase.
    ///
    /// Reuses a node within the merge tolerance of the coordinate or of its
    /// projection onto the nearest edge. Otherwise, when splitting is enabled
    /// and that projection lies farther than the tolerance from both edge
    /// endpoints, the node is placed on the edge and the edge is split in two.
    pub fn insert_node(&mut self, coordinate: &Coordinate) -> Insertion {
        if let Some(existing) = self.find_mergeable(coordinate) {
            return Insertion::Existing(existing);
        }

        if self.options.split_edges_on_insert {
            if let Some(Snap::Edge {
                from,
                to,
                fraction,
                coordinate: projected,
                distance_km,
            }) = snap::nearest_point(self, coordinate, None)
            {
                if distance_km <= self.options.merge_tolerance_km {
                    if let Some(existing) = self.find_mergeable(&projected) {
                        return Insertion::Existing(existing);
                    }
                }
                let (a, b) = (self.nodes[from].coordinate, self.nodes[to].coordinate);
                let tolerance = self.options.merge_tolerance_km.max(ENDPOINT_EPSILON_KM);
                let interior = haversine_km(&projected, &a) > tolerance
                    && haversine_km(&projected, &b) > tolerance;
                if interior && distance_km <= self.options.merge_tolerance_km {
                    let node = self.split_edge(from, to, fraction, projected);
                    debug!(node, from, to, fraction, "split edge for inserted node");
                    return Insertion::Split { node, from, to };
                }
            }
        }

        Insertion::Detached(self.create_node(coordinate))
    }

    fn resolve_node(&mut self, coordinate: &Coordinate) -> NodeId {
        match self.find_mergeable(coordinate) {
            Some(id) => id,
            None => self.create_node(coordinate),
        }
    }

    fn create_node(&mut self, coordinate: &Coordinate) -> NodeId {
        let id = self.nodes.len();
        let key = NodeKey::from_coordinate(coordinate, self.options.key_precision);
        self.nodes.push(Node {
            id,
            key,
            coordinate: *coordinate,
            edges: Vec::new(),
        });
        self.grid.insert(coordinate, id);
        self.keys.entry(key).or_insert(id);
        id
    }

    fn connect(&mut self, from: NodeId, to: NodeId, multiplier: f64, feature: &NetworkFeature) {
        let a = self.nodes[from].coordinate;
        let b = self.nodes[to].coordinate;
        let distance_km = haversine_km(&a, &b);
        let (ascent, descent) = climb(&a, &b);
        let forward = Edge {
            target: to,
            weight: distance_km * multiplier,
            distance_km,
            ascent,
            descent,
            modes: feature.modes.clone(),
            attributes: feature.attributes.clone(),
        };
        let reverse = Edge {
            target: from,
            ascent: descent,
            descent: ascent,
            ..forward.clone()
        };
        self.add_edge(from, forward);
        self.add_edge(to, reverse);
    }

    /// Add a directed edge, keeping only the cheapest edge per node pair.
    fn add_edge(&mut self, from: NodeId, edge: Edge) {
        let edges = &mut self.nodes[from].edges;
        match edges.iter_mut().find(|existing| existing.target == edge.target) {
            Some(existing) if edge.weight < existing.weight => *existing = edge,
            Some(_) => {}
            None => edges.push(edge),
        }
    }

    fn split_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        fraction: f64,
        projected: Coordinate,
    ) -> NodeId {
        let forward = self.edge(from, to).cloned();
        let reverse = self.edge(to, from).cloned();
        let node = self.create_node(&projected);
        let point = self.nodes[node].coordinate;
        let a = self.nodes[from].coordinate;
        let b = self.nodes[to].coordinate;

        self.nodes[from].edges.retain(|edge| edge.target != to);
        self.nodes[to].edges.retain(|edge| edge.target != from);

        if let Some(edge) = forward {
            let (first, second) = split_parts(&edge, &a, &point, &b, fraction);
            self.add_edge(from, Edge { target: node, ..first });
            self.add_edge(node, Edge { target: to, ..second });
        }
        if let Some(edge) = reverse {
            let (first, second) = split_parts(&edge, &b, &point, &a, 1.0 - fraction);
            self.add_edge(to, Edge { target: node, ..first });
            self.add_edge(node, Edge { target: from, ..second });
        }
        node
    }
}

/// Split `edge` (running `start` → `end`) at `point`, which lies `fraction`
/// of the way along. Both halves keep the original multiplier, modes and
/// attributes; climb is divided proportionally.
fn split_parts(
    edge: &Edge,
    start: &Coordinate,
    point: &Coordinate,
    end: &Coordinate,
    fraction: f64,
) -> (Edge, Edge) {
    let multiplier = edge.cost_multiplier();
    let first_km = haversine_km(start, point);
    let second_km = haversine_km(point, end);
    let first = Edge {
        weight: first_km * multiplier,
        distance_km: first_km,
        ascent: edge.ascent * fraction,
        descent: edge.descent * fraction,
        ..edge.clone()
    };
    let second = Edge {
        weight: second_km * multiplier,
        distance_km: second_km,
        ascent: edge.ascent * (1.0 - fraction),
        descent: edge.descent * (1.0 - fraction),
        ..edge.clone()
    };
    (first, second)
}
