use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use serde::Serialize;

use crate::geo::{push_dedup, Coordinate};
use crate::graph::{Edge, GeoGraph, NodeId};
use crate::network::EdgeAttributes;

/// One traversed edge of a [`Path`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeStep {
    pub from: NodeId,
    pub to: NodeId,
    pub start: Coordinate,
    pub end: Coordinate,
    pub distance_km: f64,
    pub ascent: f64,
    pub descent: f64,
    pub cost_multiplier: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Arc<EdgeAttributes>>,
}

/// Result of a shortest-path search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Path {
    pub nodes: Vec<NodeId>,
    pub coordinates: Vec<Coordinate>,
    pub distance_km: f64,
    pub ascent: f64,
    pub descent: f64,
    /// Sum of edge weights (the search cost).
    pub weight: f64,
    pub edges: Vec<EdgeStep>,
}

impl Path {
    /// Zero-length path at a single node.
    pub fn single(node: NodeId, coordinate: Coordinate) -> Self {
        Self {
            nodes: vec![node],
            coordinates: vec![coordinate],
            distance_km: 0.0,
            ascent: 0.0,
            descent: 0.0,
            weight: 0.0,
            edges: Vec::new(),
        }
    }

    /// Assemble a path from its start node and the ordered traversed edges.
    ///
    /// `hops` yields `(from, from_coordinate, edge, to_coordinate)` for every
    /// edge in travel order.
    pub fn from_hops<'a, I>(start: NodeId, start_coordinate: Coordinate, hops: I) -> Self
    where
        I: IntoIterator<Item = (NodeId, Coordinate, &'a Edge, Coordinate)>,
    {
        let mut path = Path::single(start, start_coordinate);
        for (from, from_coordinate, edge, to_coordinate) in hops {
            path.nodes.push(edge.target);
            push_dedup(&mut path.coordinates, to_coordinate);
            path.distance_km += edge.distance_km;
            path.ascent += edge.ascent;
            path.descent += edge.descent;
            path.weight += edge.weight;
            path.edges.push(EdgeStep {
                from,
                to: edge.target,
                start: from_coordinate,
                end: to_coordinate,
                distance_km: edge.distance_km,
                ascent: edge.ascent,
                descent: edge.descent,
                cost_multiplier: edge.cost_multiplier(),
                attributes: edge.attributes.clone(),
            });
        }
        path
    }

    pub fn start(&self) -> Option<NodeId> {
        self.nodes.first().copied()
    }

    pub fn end(&self) -> Option<NodeId> {
        self.nodes.last().copied()
    }
}

/// Run Dijkstra's algorithm from `start` to `goal`, skipping edges whose mode
/// set excludes `mode`. Equal tentative costs are expanded in first-seen order.
///
/// Returns `None` when either node is unknown or `goal` is unreachable.
pub fn find_path(graph: &GeoGraph, start: NodeId, goal: NodeId, mode: Option<&str>) -> Option<Path> {
    let start_coordinate = graph.coordinate(start)?;
    graph.coordinate(goal)?;
    if start == goal {
        return Some(Path::single(start, start_coordinate));
    }

    let node_count = graph.node_count();
    let mut distances = vec![f64::INFINITY; node_count];
    let mut parents: Vec<Option<(NodeId, usize)>> = vec![None; node_count];
    let mut settled = vec![false; node_count];
    let mut queue = BinaryHeap::new();
    let mut sequence = 0u64;

    distances[start] = 0.0;
    queue.push(QueueEntry::new(start, 0.0, sequence));

    while let Some(entry) = queue.pop() {
        if settled[entry.node] {
            continue;
        }
        settled[entry.node] = true;

        if entry.node == goal {
            return Some(reconstruct_path(graph, &parents, start, goal));
        }

        let current = distances[entry.node];
        for (index, edge) in graph.neighbours(entry.node).iter().enumerate() {
            if settled[edge.target] || !edge.allows(mode) {
                continue;
            }
            let next_cost = current + edge.weight;
            if next_cost < distances[edge.target] {
                distances[edge.target] = next_cost;
                parents[edge.target] = Some((entry.node, index));
                sequence += 1;
                queue.push(QueueEntry::new(edge.target, next_cost, sequence));
            }
        }
    }

    None
}

fn reconstruct_path(
    graph: &GeoGraph,
    parents: &[Option<(NodeId, usize)>],
    start: NodeId,
    goal: NodeId,
) -> Path {
    let mut chain = Vec::new();
    let mut current = goal;
    while current != start {
        let Some((parent, index)) = parents[current] else {
            break;
        };
        chain.push((parent, index));
        current = parent;
    }
    chain.reverse();

    let hops = chain.into_iter().filter_map(|(from, index)| {
        let edge = graph.neighbours(from).get(index)?;
        Some((
            from,
            graph.coordinate(from)?,
            edge,
            graph.coordinate(edge.target)?,
        ))
    });
    let start_coordinate = graph.coordinate(start).unwrap_or_default();
    Path::from_hops(start, start_coordinate, hops)
}

#[derive(Copy, Clone, Debug, Default)]
pub(crate) struct FloatOrd(pub(crate) f64);

impl PartialEq for FloatOrd {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq(&other.0)
    }
}

impl Eq for FloatOrd {}

impl PartialOrd for FloatOrd {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FloatOrd {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) struct QueueEntry {
    pub(crate) node: NodeId,
    pub(crate) cost: FloatOrd,
    pub(crate) sequence: u64,
}

impl QueueEntry {
    pub(crate) fn new(node: NodeId, cost: f64, sequence: u64) -> Self {
        Self {
            node,
            cost: FloatOrd(cost),
            sequence,
        }
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering so BinaryHeap becomes a min-heap by cost, then by
        // insertion order.
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
