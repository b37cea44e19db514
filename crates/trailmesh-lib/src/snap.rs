//! Point-to-network snapping.
//!
//! The nearest node is found first; edge projections may then replace it, but
//! only when strictly closer by more than [`SNAP_EPSILON_KM`]. A projection
//! that lands within [`ENDPOINT_EPSILON_KM`] of one of its own endpoints is
//! treated as a snap to that endpoint node, so a node and a co-located edge
//! projection never flap between each other.

use serde::Serialize;

use crate::geo::{haversine_km, project_onto_segment, Coordinate, Projection};
use crate::graph::{GeoGraph, NodeId};

/// Minimum improvement an edge projection needs to displace the best result.
pub const SNAP_EPSILON_KM: f64 = 1e-9;

/// Projections this close to an endpoint count as that endpoint (0.1 m).
pub const ENDPOINT_EPSILON_KM: f64 = 0.000_1;

/// Nearest-node result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NodeSnap {
    pub node: NodeId,
    pub coordinate: Coordinate,
    pub distance_km: f64,
}

/// Nearest point on the network: a node or a projection onto an edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Snap {
    Node {
        node: NodeId,
        coordinate: Coordinate,
        distance_km: f64,
    },
    Edge {
        from: NodeId,
        to: NodeId,
        /// Position along `from` → `to` in `[0, 1]`.
        fraction: f64,
        coordinate: Coordinate,
        distance_km: f64,
    },
}

impl Snap {
    pub fn distance_km(&self) -> f64 {
        match *self {
            Snap::Node { distance_km, .. } | Snap::Edge { distance_km, .. } => distance_km,
        }
    }

    /// Snapped position on the network.
    pub fn coordinate(&self) -> Coordinate {
        match *self {
            Snap::Node { coordinate, .. } | Snap::Edge { coordinate, .. } => coordinate,
        }
    }

    /// Bounding nodes of an edge snap, or the node itself.
    pub fn nodes(&self) -> Vec<NodeId> {
        match *self {
            Snap::Node { node, .. } => vec![node],
            Snap::Edge { from, to, .. } => vec![from, to],
        }
    }

    /// Whether this snap lies on the undirected edge `a`–`b` (or on one of its nodes).
    pub fn on_edge(&self, a: NodeId, b: NodeId) -> bool {
        match *self {
            Snap::Edge { from, to, .. } => (from == a && to == b) || (from == b && to == a),
            Snap::Node { .. } => false,
        }
    }
}

impl From<NodeSnap> for Snap {
    fn from(value: NodeSnap) -> Self {
        Snap::Node {
            node: value.node,
            coordinate: value.coordinate,
            distance_km: value.distance_km,
        }
    }
}

/// Running best result shared by every snapping implementation.
#[derive(Debug, Default)]
pub struct SnapAccumulator {
    best: Option<Snap>,
}

impl SnapAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn best(&self) -> Option<Snap> {
        self.best
    }

    pub fn best_distance_km(&self) -> f64 {
        self.best.map_or(f64::INFINITY, |snap| snap.distance_km())
    }

    /// Offer a node; nodes replace the best only when strictly closer.
    pub fn offer_node(&mut self, node: NodeId, coordinate: Coordinate, distance_km: f64) {
        if distance_km < self.best_distance_km() {
            self.best = Some(Snap::Node {
                node,
                coordinate,
                distance_km,
            });
        }
    }

    /// Offer the projection of the query onto the edge `from` → `to`.
    pub fn offer_edge(
        &mut self,
        query: &Coordinate,
        (from, a): (NodeId, &Coordinate),
        (to, b): (NodeId, &Coordinate),
    ) {
        let Projection {
            point,
            fraction,
            distance_km,
        } = project_onto_segment(query, a, b);

        if distance_km + SNAP_EPSILON_KM >= self.best_distance_km() {
            return;
        }

        if haversine_km(&point, a) <= ENDPOINT_EPSILON_KM {
            self.offer_node(from, *a, haversine_km(query, a));
        } else if haversine_km(&point, b) <= ENDPOINT_EPSILON_KM {
            self.offer_node(to, *b, haversine_km(query, b));
        } else {
            self.best = Some(Snap::Edge {
                from,
                to,
                fraction,
                coordinate: point,
                distance_km,
            });
        }
    }
}

/// Whether `node` has at least one edge usable in `mode`.
fn node_usable(graph: &GeoGraph, node: NodeId, mode: Option<&str>) -> bool {
    mode.is_none()
        || graph
            .neighbours(node)
            .iter()
            .any(|edge| edge.allows(mode))
}

/// Nearest node to `coordinate`. With a mode, nodes without any usable edge
/// are ignored.
pub fn nearest_node(graph: &GeoGraph, coordinate: &Coordinate, mode: Option<&str>) -> Option<NodeSnap> {
    graph
        .all_nodes()
        .iter()
        .filter(|node| node_usable(graph, node.id, mode))
        .map(|node| NodeSnap {
            node: node.id,
            coordinate: node.coordinate,
            distance_km: haversine_km(coordinate, &node.coordinate),
        })
        .fold(None, |best: Option<NodeSnap>, candidate| match best {
            Some(current) if current.distance_km <= candidate.distance_km => Some(current),
            _ => Some(candidate),
        })
}

/// Nearest point on any node or edge. With a mode, edges that do not allow
/// it are ignored.
pub fn nearest_point(graph: &GeoGraph, coordinate: &Coordinate, mode: Option<&str>) -> Option<Snap> {
    let mut accumulator = SnapAccumulator::new();
    if let Some(node) = nearest_node(graph, coordinate, mode) {
        accumulator.offer_node(node.node, node.coordinate, node.distance_km);
    }
    for (from, to, edge) in graph.undirected_edges() {
        if !edge.allows(mode) {
            continue;
        }
        let (Some(a), Some(b)) = (graph.coordinate(from), graph.coordinate(to)) else {
            continue;
        };
        accumulator.offer_edge(coordinate, (from, &a), (to, &b));
    }
    accumulator.best()
}
