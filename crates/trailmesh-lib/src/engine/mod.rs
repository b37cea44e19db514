//! Routing engines and the selector that picks one per network load.
//!
//! Every engine implements [`RoutingEngine`]. The [`EngineSelector`] walks an
//! ordered list of candidate factories (the accelerated engine first, when
//! enabled) and falls back to the baseline [`GraphEngine`], which can always
//! be constructed. Once selected, all snapping and searching for that load go
//! through the same engine.

mod accelerated;
mod baseline;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::RoutingConfig;
use crate::geo::Coordinate;
use crate::graph::{Edge, GeoGraph, GraphOptions, Insertion, NodeId};
use crate::network::NetworkFeature;
use crate::path::Path;
use crate::snap::{NodeSnap, Snap};

pub use accelerated::AcceleratedEngine;
pub use baseline::GraphEngine;

/// Which implementation serves a loaded network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineSource {
    Accelerated,
    Baseline,
}

impl EngineSource {
    pub fn as_str(self) -> &'static str {
        match self {
            EngineSource::Accelerated => "accelerated",
            EngineSource::Baseline => "baseline",
        }
    }
}

impl fmt::Display for EngineSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability surface shared by every graph/search implementation.
pub trait RoutingEngine: Send + Sync + fmt::Debug {
    fn source(&self) -> EngineSource;

    /// Nearest node or edge projection usable in `mode`.
    fn find_nearest_point(&self, coordinate: &Coordinate, mode: Option<&str>) -> Option<Snap>;

    fn find_nearest_node(&self, coordinate: &Coordinate, mode: Option<&str>) -> Option<NodeSnap>;

    /// Entry/exit nodes to try for a snap: the node itself, or both ends of
    /// the snapped edge.
    fn node_candidates(&self, snap: &Snap) -> Vec<NodeId> {
        snap.nodes()
    }

    fn build_path(&self, start: NodeId, goal: NodeId, mode: Option<&str>) -> Option<Path>;

    fn coordinate(&self, node: NodeId) -> Option<Coordinate>;

    /// Directed edge `from` → `to`.
    fn edge(&self, from: NodeId, to: NodeId) -> Option<Edge>;

    fn all_nodes(&self) -> Vec<(NodeId, Coordinate)>;

    fn node_count(&self) -> usize;

    fn edge_count(&self) -> usize;

    /// Whether at least one edge can be travelled in `mode`.
    fn supports_mode(&self, mode: &str) -> bool;

    /// Number of `build_path` searches run so far.
    fn search_count(&self) -> usize;

    /// Insert a node after loading. Engines with a frozen graph return `None`.
    fn insert_node(&self, _coordinate: &Coordinate) -> Option<Insertion> {
        None
    }

    /// Release the loaded network. Later queries behave as on an empty graph.
    fn dispose(&self) {}
}

/// Why a candidate engine declined to initialize.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineInitError {
    #[error("graph has no nodes")]
    Empty,

    #[error("graph with {nodes} nodes and {edges} edges exceeds the engine's index width")]
    TooLarge { nodes: usize, edges: usize },

    #[error("{0}")]
    Unavailable(String),
}

/// Constructor for a candidate engine.
pub type EngineFactory =
    Arc<dyn Fn(&GeoGraph) -> std::result::Result<Box<dyn RoutingEngine>, EngineInitError> + Send + Sync>;

/// Ordered factory chain ending in the baseline engine.
#[derive(Clone, Default)]
pub struct EngineSelector {
    candidates: Vec<(&'static str, EngineFactory)>,
}

impl fmt::Debug for EngineSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineSelector")
            .field(
                "candidates",
                &self.candidates.iter().map(|(name, _)| *name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl EngineSelector {
    /// Selector with no candidates: always yields the baseline engine.
    pub fn baseline_only() -> Self {
        Self::default()
    }

    /// Accelerated engine first when `prefer_accelerated` is set.
    pub fn from_config(config: &RoutingConfig) -> Self {
        let selector = Self::default();
        if config.prefer_accelerated {
            selector.with_candidate("accelerated", |graph| {
                AcceleratedEngine::build(graph).map(|engine| Box::new(engine) as Box<dyn RoutingEngine>)
            })
        } else {
            selector
        }
    }

    /// Append a candidate tried before the baseline.
    pub fn with_candidate<F>(mut self, name: &'static str, factory: F) -> Self
    where
        F: Fn(&GeoGraph) -> std::result::Result<Box<dyn RoutingEngine>, EngineInitError>
            + Send
            + Sync
            + 'static,
    {
        self.candidates.push((name, Arc::new(factory)));
        self
    }

    /// Candidate names in the order they are tried.
    pub fn candidate_names(&self) -> Vec<&'static str> {
        self.candidates.iter().map(|(name, _)| *name).collect()
    }

    /// Pick the first candidate that initializes, else wrap `graph` in the
    /// baseline engine.
    pub fn select(&self, graph: GeoGraph) -> Arc<dyn RoutingEngine> {
        for (name, factory) in &self.candidates {
            match factory(&graph) {
                Ok(engine) => {
                    info!(
                        engine = name,
                        source = %engine.source(),
                        nodes = engine.node_count(),
                        "selected routing engine"
                    );
                    return Arc::from(engine);
                }
                Err(err) => warn!(engine = name, error = %err, "routing engine unavailable"),
            }
        }
        let engine = GraphEngine::new(graph);
        info!(
            source = %EngineSource::Baseline,
            nodes = engine.node_count(),
            "selected routing engine"
        );
        Arc::new(engine)
    }

    /// Build a graph from `features` and select an engine for it.
    pub fn load(&self, features: &[NetworkFeature], options: GraphOptions) -> Arc<dyn RoutingEngine> {
        self.select(GeoGraph::from_features(features, options))
    }
}
