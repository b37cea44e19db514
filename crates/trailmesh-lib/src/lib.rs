//! Trailmesh library entry points.
//!
//! This crate loads a trail network from GeoJSON line features, builds a
//! merged node graph, snaps arbitrary waypoints onto it and assembles
//! multi-leg routes with per-portion metadata. Remote OSRM and
//! openrouteservice backends share the same [`Router`] contract and can fall
//! back to the offline [`RouteAssembler`]. Higher-level consumers (CLI) should
//! only depend on the items exported here instead of reimplementing behavior.

pub mod assembler;
pub mod config;
pub mod engine;
pub mod error;
pub mod geo;
pub mod graph;
pub mod network;
pub mod path;
pub mod remote;
pub mod route;
pub mod snap;
pub mod spatial;

pub use assembler::{RouteAssembler, RouteOptions};
pub use config::RoutingConfig;
pub use engine::{EngineSelector, EngineSource, RoutingEngine};
pub use error::{Error, Result};
pub use geo::{haversine_km, Coordinate};
pub use graph::{GeoGraph, GraphOptions, NodeId};
pub use network::{load_network, parse_network_str, EdgeAttributes, NetworkFeature};
pub use path::{find_path, Path};
pub use remote::{OrsBackend, OsrmBackend, RemoteConfig, RemoteRouter, Router};
pub use route::{LegSnapshot, PortionSource, Route, SegmentMetadata};
pub use snap::Snap;
