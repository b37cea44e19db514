//! Shared network fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use trailmesh_lib::engine::GraphEngine;
use trailmesh_lib::{
    Coordinate, GeoGraph, GraphOptions, NetworkFeature, RouteAssembler, RoutingConfig,
};

/// Roughly one millidegree of longitude at the equator, in metres.
pub const MILLIDEGREE_M: f64 = 111.195;

/// Straight unrestricted polyline through `points`.
pub fn line(points: &[(f64, f64)]) -> NetworkFeature {
    NetworkFeature::line(
        points
            .iter()
            .map(|&(lng, lat)| Coordinate::new(lng, lat))
            .collect(),
    )
}

/// `size` x `size` lattice of horizontal and vertical lines spaced `step`
/// degrees apart, starting at the origin.
pub fn grid(size: usize, step: f64) -> Vec<NetworkFeature> {
    let span: Vec<f64> = (0..size).map(|i| i as f64 * step).collect();
    let mut features = Vec::with_capacity(size * 2);
    for &fixed in &span {
        features.push(line(&span.iter().map(|&v| (v, fixed)).collect::<Vec<_>>()));
        features.push(line(&span.iter().map(|&v| (fixed, v)).collect::<Vec<_>>()));
    }
    features
}

/// Default configuration without the direct-segment fallback.
pub fn strict_config() -> RoutingConfig {
    RoutingConfig {
        allow_direct_fallback: false,
        ..RoutingConfig::default()
    }
}

/// Assembler over the baseline engine.
pub fn baseline_assembler(features: &[NetworkFeature], config: RoutingConfig) -> RouteAssembler {
    let graph = GeoGraph::from_features(features, GraphOptions::from(&config));
    RouteAssembler::new(Arc::new(GraphEngine::new(graph)), config)
}

/// Minimal OSRM route response for two waypoints along the equator-ish line
/// at latitude 46.
pub fn osrm_body() -> serde_json::Value {
    serde_json::json!({
        "code": "Ok",
        "routes": [{
            "distance": 770.0,
            "duration": 550.0,
            "geometry": {
                "type": "LineString",
                "coordinates": [[7.0, 46.0], [7.005, 46.0], [7.01, 46.0]]
            },
            "legs": [{"distance": 770.0, "duration": 550.0}]
        }],
        "waypoints": [{"location": [7.0, 46.0]}, {"location": [7.01, 46.0]}]
    })
}

pub fn remote_waypoints() -> [Coordinate; 2] {
    [Coordinate::new(7.0, 46.0), Coordinate::new(7.01, 46.0)]
}
