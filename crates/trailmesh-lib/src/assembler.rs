//! Leg-by-leg route assembly over a routing engine.
//!
//! Each leg between consecutive waypoints is served by one strategy: a
//! reused preserved snapshot, a sub-span of a single shared edge, a network
//! search between candidate entry and exit nodes, or a direct segment when
//! the network cannot serve it and the waypoints are close enough to bridge.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::RoutingConfig;
use crate::engine::{EngineSelector, EngineSource, RoutingEngine};
use crate::error::{Error, Result};
use crate::geo::{climb, haversine_km, Coordinate};
use crate::graph::{GraphOptions, NodeId};
use crate::network::{normalize_mode, NetworkFeature};
use crate::path::Path;
use crate::route::{
    LegPlan, LegSnapshot, PortionEdge, PortionSource, Route, RouteBuilder, SegmentMetadata,
};
use crate::snap::Snap;

/// Per-request routing options.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteOptions {
    /// Travel mode used to filter edges; empty means unrestricted.
    pub mode: String,
    /// Legs from an earlier route that may be reused as-is.
    pub preserved_segments: Vec<LegSnapshot>,
}

impl Default for RouteOptions {
    fn default() -> Self {
        Self::new("foot-hiking")
    }
}

impl RouteOptions {
    pub fn new(mode: impl Into<String>) -> Self {
        Self {
            mode: mode.into(),
            preserved_segments: Vec::new(),
        }
    }

    pub fn with_preserved(mut self, segments: Vec<LegSnapshot>) -> Self {
        self.preserved_segments = segments;
        self
    }

    /// Normalized mode for edge filtering; `None` when unrestricted.
    fn mode_filter(&self) -> Option<String> {
        let mode = normalize_mode(&self.mode);
        (!mode.is_empty()).then_some(mode)
    }
}

/// Reject the first waypoint outside the valid lng/lat range.
pub(crate) fn validate_waypoints(waypoints: &[Coordinate]) -> Result<()> {
    match waypoints
        .iter()
        .enumerate()
        .find(|(_, waypoint)| !waypoint.is_valid())
    {
        Some((index, waypoint)) => Err(Error::validation(format!(
            "waypoint {index} ({}, {}) is not a valid coordinate",
            waypoint.lng, waypoint.lat
        ))),
        None => Ok(()),
    }
}

/// Result of planning one leg.
struct PlannedLeg {
    plan: LegPlan,
    warning: Option<String>,
}

/// Candidate search result for one entry/exit pair.
struct Candidate {
    entry: NodeId,
    exit: NodeId,
    path: Path,
    total_km: f64,
}

/// Offline router: snaps waypoints onto the loaded network and stitches legs.
#[derive(Debug, Clone)]
pub struct RouteAssembler {
    engine: Arc<dyn RoutingEngine>,
    config: RoutingConfig,
}

impl RouteAssembler {
    pub fn new(engine: Arc<dyn RoutingEngine>, config: RoutingConfig) -> Self {
        Self { engine, config }
    }

    /// Build the graph, select an engine and wrap it.
    pub fn from_features(features: &[NetworkFeature], config: RoutingConfig) -> Self {
        let engine = EngineSelector::from_config(&config).load(features, GraphOptions::from(&config));
        Self::new(engine, config)
    }

    pub fn engine(&self) -> &Arc<dyn RoutingEngine> {
        &self.engine
    }

    pub fn engine_source(&self) -> EngineSource {
        self.engine.source()
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    /// Whether the loaded network has edges usable in `mode`.
    pub fn supports_mode(&self, mode: &str) -> bool {
        let mode = normalize_mode(mode);
        self.engine.node_count() > 0 && (mode.is_empty() || self.engine.supports_mode(&mode))
    }

    /// Route through `waypoints` in order. Fewer than two waypoints yield
    /// `Ok(None)`.
    pub fn get_route(&self, waypoints: &[Coordinate], options: &RouteOptions) -> Result<Option<Route>> {
        if waypoints.len() < 2 {
            return Ok(None);
        }
        validate_waypoints(waypoints)?;
        if self.engine.node_count() == 0 {
            return Err(Error::NetworkUnavailable {
                message: "no network graph is loaded".to_string(),
            });
        }

        let mode = options.mode_filter();
        let mut builder = RouteBuilder::new(&self.config, options.mode.clone());
        for (index, pair) in waypoints.windows(2).enumerate() {
            let (from, to) = (&pair[0], &pair[1]);
            if let Some(plan) = self.preserved_leg(index, from, to, options) {
                debug!(leg = index, "reusing preserved leg");
                builder.push_leg(plan);
                continue;
            }
            let leg = self.plan_leg(index, from, to, mode.as_deref())?;
            if let Some(warning) = leg.warning {
                builder.warn(warning);
            }
            builder.push_leg(leg.plan);
        }

        let route = builder.finish(self.engine.source().as_str());
        info!(
            legs = route.legs().len(),
            distance_m = route.properties.summary.distance_m,
            engine = %self.engine.source(),
            mode = %options.mode,
            "assembled route"
        );
        Ok(Some(route))
    }

    fn preserved_leg(
        &self,
        index: usize,
        from: &Coordinate,
        to: &Coordinate,
        options: &RouteOptions,
    ) -> Option<LegPlan> {
        let snapshot = options.preserved_segments.iter().find(|snapshot| {
            snapshot.start_index == index
                && snapshot.end_index == index + 1
                && snapshot.routing_mode == options.mode
        })?;
        let (first, last) = (snapshot.coordinates.first()?, snapshot.coordinates.last()?);
        let tolerance_km = self.config.preserved_anchor_tolerance_m / 1000.0;
        if haversine_km(first, from) > tolerance_km || haversine_km(last, to) > tolerance_km {
            debug!(leg = index, "preserved leg no longer matches its waypoints");
            return None;
        }

        let mut coordinates = snapshot.coordinates.clone();
        let end = coordinates.len() - 1;
        coordinates[0] = Coordinate::with_elevation(from.lng, from.lat, first.ele);
        coordinates[end] = Coordinate::with_elevation(to.lng, to.lat, last.ele);

        let preserved = |entries: &[SegmentMetadata]| -> Vec<SegmentMetadata> {
            entries
                .iter()
                .map(|entry| SegmentMetadata {
                    source: PortionSource::Preserved,
                    ..entry.clone()
                })
                .collect()
        };
        Some(LegPlan {
            start_index: index,
            coordinates,
            portions: preserved(&snapshot.metadata),
            edges: preserved(&snapshot.edges),
            duration_s: None,
        })
    }

    fn plan_leg(
        &self,
        index: usize,
        from: &Coordinate,
        to: &Coordinate,
        mode: Option<&str>,
    ) -> Result<PlannedLeg> {
        let max_snap_km = self.config.max_snap_distance_m / 1000.0;
        let bridge_km = self.config.bridge_distance_m / 1000.0;

        let snaps = self
            .engine
            .find_nearest_point(from, mode)
            .zip(self.engine.find_nearest_point(to, mode));
        let Some((start, end)) = snaps else {
            return Err(Error::no_path(format!(
                "leg {index}: no edges allow mode {}",
                mode.unwrap_or("any")
            )));
        };

        let farthest = start.distance_km().max(end.distance_km());
        if farthest > max_snap_km {
            if farthest <= bridge_km {
                let warning = format!(
                    "leg {index}: waypoint is {:.0} m from the network; using a direct segment",
                    farthest * 1000.0
                );
                warn!(leg = index, snap_m = farthest * 1000.0, "bridging leg with direct segment");
                return Ok(PlannedLeg {
                    plan: direct_leg(index, from, to),
                    warning: Some(warning),
                });
            }
            return Err(Error::no_path(format!(
                "leg {index}: waypoint is {:.0} m from the network (limit {:.0} m)",
                farthest * 1000.0,
                self.config.bridge_distance_m
            )));
        }

        let from = anchor(from, &start);
        let to = anchor(to, &end);

        if let Some(plan) = self.same_edge_leg(index, &from, &start, &to, &end) {
            debug!(leg = index, "both waypoints on one edge; no search needed");
            return Ok(PlannedLeg {
                plan,
                warning: None,
            });
        }

        let Some(best) = self.best_candidate(&from, &start, &to, &end, mode) else {
            if mode.is_some() && self.best_candidate(&from, &start, &to, &end, None).is_some() {
                return Err(Error::no_path(format!(
                    "leg {index}: no path allows mode {} between ({from}) and ({to})",
                    mode.unwrap_or("any")
                )));
            }
            return self.unroutable(index, &from, &to, mode, "no connected path");
        };
        debug!(
            leg = index,
            entry = best.entry,
            exit = best.exit,
            distance_km = best.total_km,
            "planned network leg"
        );

        let mut plan = LegPlan::new(index);
        let start_point = start.coordinate();
        let end_point = end.coordinate();
        plan.push_portion(
            PortionSource::Connector,
            &[from, start_point],
            &[PortionEdge::straight(&from, &start_point)],
        );
        if let Some(approach) = self.approach(&start, best.entry, true) {
            let node = best.path.coordinates[0];
            plan.push_portion(PortionSource::Approach, &[start_point, node], &[approach]);
        }
        let network: Vec<PortionEdge> = best.path.edges.iter().map(PortionEdge::from).collect();
        plan.push_portion(PortionSource::Network, &best.path.coordinates, &network);
        if let Some(approach) = self.approach(&end, best.exit, false) {
            let node = best.path.coordinates[best.path.coordinates.len() - 1];
            plan.push_portion(PortionSource::Approach, &[node, end_point], &[approach]);
        }
        plan.push_portion(
            PortionSource::Connector,
            &[end_point, to],
            &[PortionEdge::straight(&end_point, &to)],
        );
        Ok(PlannedLeg {
            plan,
            warning: None,
        })
    }

    /// Both snaps on the same undirected edge: walk the sub-span directly.
    fn same_edge_leg(
        &self,
        index: usize,
        from: &Coordinate,
        start: &Snap,
        to: &Coordinate,
        end: &Snap,
    ) -> Option<LegPlan> {
        let Snap::Edge {
            from: a,
            to: b,
            fraction: start_fraction,
            ..
        } = *start
        else {
            return None;
        };
        let Snap::Edge {
            from: end_from,
            fraction: end_fraction,
            ..
        } = *end
        else {
            return None;
        };
        if !end.on_edge(a, b) {
            return None;
        }
        let end_fraction = if end_from == a {
            end_fraction
        } else {
            1.0 - end_fraction
        };

        let (tail, head) = if start_fraction <= end_fraction {
            (a, b)
        } else {
            (b, a)
        };
        let edge = self.engine.edge(tail, head)?;
        let span = (end_fraction - start_fraction).abs();
        let (start_point, end_point) = (start.coordinate(), end.coordinate());
        let sub_span = PortionEdge {
            distance_km: haversine_km(&start_point, &end_point),
            ascent: edge.ascent * span,
            descent: edge.descent * span,
            cost_multiplier: edge.cost_multiplier(),
            attributes: edge.attributes.clone(),
        };

        let mut plan = LegPlan::new(index);
        plan.push_portion(
            PortionSource::Connector,
            &[*from, start_point],
            &[PortionEdge::straight(from, &start_point)],
        );
        plan.push_portion(PortionSource::Network, &[start_point, end_point], &[sub_span]);
        plan.push_portion(
            PortionSource::Connector,
            &[end_point, *to],
            &[PortionEdge::straight(&end_point, to)],
        );
        Some(plan)
    }

    /// Search every entry/exit pair and keep the shortest total.
    fn best_candidate(
        &self,
        from: &Coordinate,
        start: &Snap,
        to: &Coordinate,
        end: &Snap,
        mode: Option<&str>,
    ) -> Option<Candidate> {
        let connectors_km = haversine_km(from, &start.coordinate()) + haversine_km(&end.coordinate(), to);
        let entries = self.engine.node_candidates(start);
        let exits = self.engine.node_candidates(end);

        let mut best: Option<Candidate> = None;
        for &entry in &entries {
            let entry_km = self.approach_km(start, entry);
            for &exit in &exits {
                let Some(path) = self.engine.build_path(entry, exit, mode) else {
                    continue;
                };
                let total_km = connectors_km + entry_km + path.distance_km + self.approach_km(end, exit);
                if best.as_ref().is_none_or(|current| total_km < current.total_km) {
                    best = Some(Candidate {
                        entry,
                        exit,
                        path,
                        total_km,
                    });
                }
            }
        }
        best
    }

    fn approach_km(&self, snap: &Snap, node: NodeId) -> f64 {
        match (snap, self.engine.coordinate(node)) {
            (Snap::Edge { coordinate, .. }, Some(node_coordinate)) => {
                haversine_km(coordinate, &node_coordinate)
            }
            _ => 0.0,
        }
    }

    /// Approach between an edge snap and one of its end nodes. `leaving` is
    /// true when travelling from the snap point to the node.
    fn approach(&self, snap: &Snap, node: NodeId, leaving: bool) -> Option<PortionEdge> {
        let Snap::Edge {
            from: a,
            to: b,
            coordinate,
            ..
        } = *snap
        else {
            return None;
        };
        let other = if node == a { b } else { a };
        let node_coordinate = self.engine.coordinate(node)?;
        let (tail, head, start, finish) = if leaving {
            (other, node, coordinate, node_coordinate)
        } else {
            (node, other, node_coordinate, coordinate)
        };
        let edge = self.engine.edge(tail, head);
        let (ascent, descent) = climb(&start, &finish);
        Some(PortionEdge {
            distance_km: haversine_km(&start, &finish),
            ascent,
            descent,
            cost_multiplier: edge.as_ref().map_or(1.0, |edge| edge.cost_multiplier()),
            attributes: edge.and_then(|edge| edge.attributes),
        })
    }

    fn unroutable(
        &self,
        index: usize,
        from: &Coordinate,
        to: &Coordinate,
        mode: Option<&str>,
        reason: &str,
    ) -> Result<PlannedLeg> {
        let gap_km = haversine_km(from, to);
        let mode = mode.unwrap_or("any");
        if self.config.allow_direct_fallback && gap_km <= self.config.bridge_distance_m / 1000.0 {
            warn!(leg = index, mode, gap_m = gap_km * 1000.0, reason, "falling back to direct segment");
            return Ok(PlannedLeg {
                plan: direct_leg(index, from, to),
                warning: Some(format!(
                    "leg {index}: {reason} (mode {mode}); using a direct segment"
                )),
            });
        }
        Err(Error::no_path(format!(
            "leg {index}: {reason} (mode {mode}) between ({from}) and ({to})"
        )))
    }
}

/// Waypoints without elevation take the elevation of their snap point.
fn anchor(waypoint: &Coordinate, snap: &Snap) -> Coordinate {
    if waypoint.ele == 0.0 {
        waypoint.at_elevation(snap.coordinate().ele)
    } else {
        *waypoint
    }
}

fn direct_leg(index: usize, from: &Coordinate, to: &Coordinate) -> LegPlan {
    let mut plan = LegPlan::new(index);
    plan.push_portion(
        PortionSource::Direct,
        &[*from, *to],
        &[PortionEdge::straight(from, to)],
    );
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::GraphEngine;
    use crate::graph::GeoGraph;

    fn assembler(features: &[NetworkFeature], config: RoutingConfig) -> RouteAssembler {
        let graph = GeoGraph::from_features(features, GraphOptions::from(&config));
        RouteAssembler::new(Arc::new(GraphEngine::new(graph)), config)
    }

    fn strict() -> RoutingConfig {
        RoutingConfig {
            allow_direct_fallback: false,
            ..RoutingConfig::default()
        }
    }

    #[test]
    fn fewer_than_two_waypoints_is_none() {
        let router = assembler(
            &[NetworkFeature::line(vec![Coordinate::new(0.0, 0.0), Coordinate::new(0.001, 0.0)])],
            RoutingConfig::default(),
        );
        let route = router
            .get_route(&[Coordinate::new(0.0, 0.0)], &RouteOptions::default())
            .expect("no error");
        assert!(route.is_none());
    }

    #[test]
    fn invalid_waypoint_is_rejected() {
        let router = assembler(
            &[NetworkFeature::line(vec![Coordinate::new(0.0, 0.0), Coordinate::new(0.001, 0.0)])],
            RoutingConfig::default(),
        );
        let error = router
            .get_route(
                &[Coordinate::new(0.0, 0.0), Coordinate::new(f64::NAN, 0.0)],
                &RouteOptions::default(),
            )
            .expect_err("nan");
        assert_eq!(error.kind(), "validation");
    }

    #[test]
    fn empty_network_is_unavailable() {
        let router = assembler(&[], RoutingConfig::default());
        let error = router
            .get_route(
                &[Coordinate::new(0.0, 0.0), Coordinate::new(0.001, 0.0)],
                &RouteOptions::default(),
            )
            .expect_err("empty");
        assert_eq!(error.kind(), "network_unavailable");
    }

    #[test]
    fn network_leg_stitches_connectors_and_approaches() {
        let features = [NetworkFeature::line(vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(0.002, 0.0),
            Coordinate::new(0.004, 0.0),
            Coordinate::new(0.006, 0.0),
        ])];
        let router = assembler(&features, strict());
        let route = router
            .get_route(
                &[Coordinate::new(0.0005, 0.0001), Coordinate::new(0.0055, 0.0001)],
                &RouteOptions::default(),
            )
            .expect("routable")
            .expect("route");

        let sources: Vec<_> = route
            .properties
            .segment_metadata
            .iter()
            .map(|entry| entry.source)
            .collect();
        assert_eq!(
            sources,
            vec![
                PortionSource::Connector,
                PortionSource::Approach,
                PortionSource::Network,
                PortionSource::Approach,
                PortionSource::Connector,
            ]
        );
        assert!((route.distance_km() - (0.5560 + 2.0 * 0.0111)).abs() < 1e-3);
        assert_eq!(router.engine().search_count(), 4);
    }

    #[test]
    fn unroutable_leg_without_fallback_is_no_path() {
        let features = [
            NetworkFeature::line(vec![Coordinate::new(0.0, 0.0), Coordinate::new(0.001, 0.0)]),
            NetworkFeature::line(vec![Coordinate::new(0.003, 0.0), Coordinate::new(0.004, 0.0)]),
        ];
        let waypoints = [Coordinate::new(0.0, 0.0), Coordinate::new(0.004, 0.0)];
        let error = assembler(&features, strict())
            .get_route(&waypoints, &RouteOptions::default())
            .expect_err("disconnected");
        assert_eq!(error.kind(), "no_path");

        let route = assembler(&features, RoutingConfig::default())
            .get_route(&waypoints, &RouteOptions::default())
            .expect("fallback")
            .expect("route");
        assert_eq!(route.properties.segment_metadata[0].source, PortionSource::Direct);
        assert_eq!(route.warnings().len(), 1);
    }

    #[test]
    fn far_waypoint_is_bridged_or_rejected() {
        let features = [NetworkFeature::line(vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(0.001, 0.0),
        ])];
        let router = assembler(&features, strict());
        let bridged = router
            .get_route(
                &[Coordinate::new(0.0, 0.0), Coordinate::new(0.001, 0.008)],
                &RouteOptions::default(),
            )
            .expect("bridged")
            .expect("route");
        assert_eq!(bridged.properties.segment_metadata[0].source, PortionSource::Direct);

        let error = router
            .get_route(
                &[Coordinate::new(0.0, 0.0), Coordinate::new(0.001, 0.05)],
                &RouteOptions::default(),
            )
            .expect_err("too far");
        assert_eq!(error.kind(), "no_path");
    }

    #[test]
    fn waypoints_without_elevation_adopt_snap_elevation() {
        let features = [NetworkFeature::line(vec![
            Coordinate::with_elevation(0.0, 0.0, 1000.0),
            Coordinate::with_elevation(0.002, 0.0, 1100.0),
        ])];
        let router = assembler(&features, strict());
        let route = router
            .get_route(
                &[Coordinate::new(0.0, 0.0001), Coordinate::new(0.002, 0.0001)],
                &RouteOptions::default(),
            )
            .expect("routable")
            .expect("route");
        assert_eq!(route.coordinates()[0].ele, 1000.0);
        assert!((route.properties.summary.ascent_m - 100.0).abs() < 1e-6);
    }
}
