//! GeoJSON-shaped route output and the builder that assembles it leg by leg.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::RoutingConfig;
use crate::geo::{climb, haversine_km, push_dedup, Coordinate, DEDUP_TOLERANCE_KM};
use crate::network::EdgeAttributes;
use crate::path::EdgeStep;

/// Origin of one portion of a leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortionSource {
    /// Waypoint to snap point.
    Connector,
    /// Edge snap point to the entry or exit node.
    Approach,
    /// Graph edges between entry and exit nodes.
    Network,
    /// Straight segment used when the network cannot serve the leg.
    Direct,
    /// Reused from a caller-supplied leg snapshot.
    Preserved,
}

impl fmt::Display for PortionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            PortionSource::Connector => "connector",
            PortionSource::Approach => "approach",
            PortionSource::Network => "network",
            PortionSource::Direct => "direct",
            PortionSource::Preserved => "preserved",
        };
        f.write_str(value)
    }
}

/// Metadata for one portion (in `segment_metadata`) or one edge (in
/// `coordinate_metadata`), with cumulative offsets along the route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentMetadata {
    pub leg_index: usize,
    pub source: PortionSource,
    pub distance_km: f64,
    pub start_distance_km: f64,
    pub end_distance_km: f64,
    pub ascent: f64,
    pub descent: f64,
    pub cost_multiplier: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Arc<EdgeAttributes>>,
}

impl SegmentMetadata {
    /// Copy moved by `offset_km` along the route and assigned to `leg_index`.
    pub fn shifted(&self, offset_km: f64, leg_index: usize) -> Self {
        Self {
            leg_index,
            start_distance_km: self.start_distance_km + offset_km,
            end_distance_km: self.end_distance_km + offset_km,
            attributes: self.attributes.clone(),
            ..*self
        }
    }
}

/// One stretch of a portion with uniform properties.
#[derive(Debug, Clone, PartialEq)]
pub struct PortionEdge {
    pub distance_km: f64,
    pub ascent: f64,
    pub descent: f64,
    pub cost_multiplier: f64,
    pub attributes: Option<Arc<EdgeAttributes>>,
}

impl PortionEdge {
    /// Straight line between two points with a unit multiplier.
    pub fn straight(from: &Coordinate, to: &Coordinate) -> Self {
        let (ascent, descent) = climb(from, to);
        Self {
            distance_km: haversine_km(from, to),
            ascent,
            descent,
            cost_multiplier: 1.0,
            attributes: None,
        }
    }
}

impl From<&EdgeStep> for PortionEdge {
    fn from(step: &EdgeStep) -> Self {
        Self {
            distance_km: step.distance_km,
            ascent: step.ascent,
            descent: step.descent,
            cost_multiplier: step.cost_multiplier,
            attributes: step.attributes.clone(),
        }
    }
}

/// One leg under construction. Offsets in its metadata start at zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegPlan {
    /// Index of the leg's first waypoint.
    pub start_index: usize,
    pub coordinates: Vec<Coordinate>,
    pub portions: Vec<SegmentMetadata>,
    pub edges: Vec<SegmentMetadata>,
    /// Duration reported by a remote service; computed from the mode otherwise.
    pub duration_s: Option<f64>,
}

impl LegPlan {
    pub fn new(start_index: usize) -> Self {
        Self {
            start_index,
            ..Self::default()
        }
    }

    pub fn distance_km(&self) -> f64 {
        self.portions.iter().map(|portion| portion.distance_km).sum()
    }

    pub fn ascent(&self) -> f64 {
        self.portions.iter().map(|portion| portion.ascent).sum()
    }

    pub fn descent(&self) -> f64 {
        self.portions.iter().map(|portion| portion.descent).sum()
    }

    /// Append a portion made of `edges`, extending the geometry with
    /// `coordinates`. Zero-length portions contribute geometry only.
    pub fn push_portion(
        &mut self,
        source: PortionSource,
        coordinates: &[Coordinate],
        edges: &[PortionEdge],
    ) {
        for coordinate in coordinates {
            push_dedup(&mut self.coordinates, *coordinate);
        }

        let distance_km: f64 = edges.iter().map(|edge| edge.distance_km).sum();
        if distance_km <= 0.0 {
            return;
        }
        let weight: f64 = edges
            .iter()
            .map(|edge| edge.distance_km * edge.cost_multiplier)
            .sum();
        let start_km = self.distance_km();

        let mut cursor = start_km;
        for edge in edges.iter().filter(|edge| edge.distance_km > 0.0) {
            self.edges.push(SegmentMetadata {
                leg_index: 0,
                source,
                distance_km: edge.distance_km,
                start_distance_km: cursor,
                end_distance_km: cursor + edge.distance_km,
                ascent: edge.ascent,
                descent: edge.descent,
                cost_multiplier: edge.cost_multiplier,
                attributes: edge.attributes.clone(),
            });
            cursor += edge.distance_km;
        }

        let shared_attributes = match edges {
            [single] => single.attributes.clone(),
            _ => None,
        };
        self.portions.push(SegmentMetadata {
            leg_index: 0,
            source,
            distance_km,
            start_distance_km: start_km,
            end_distance_km: start_km + distance_km,
            ascent: edges.iter().map(|edge| edge.ascent).sum(),
            descent: edges.iter().map(|edge| edge.descent).sum(),
            cost_multiplier: weight / distance_km,
            attributes: shared_attributes,
        });
    }
}

/// A previously computed leg a caller can hand back for reuse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegSnapshot {
    pub start_index: usize,
    pub end_index: usize,
    pub coordinates: Vec<Coordinate>,
    /// Portion metadata with offsets relative to the start of the leg.
    pub metadata: Vec<SegmentMetadata>,
    /// Edge metadata with offsets relative to the start of the leg.
    #[serde(default)]
    pub edges: Vec<SegmentMetadata>,
    pub routing_mode: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteSummary {
    pub distance_m: f64,
    pub duration_s: f64,
    pub ascent_m: f64,
    pub descent_m: f64,
}

/// Per-leg totals. Distances in metres, durations in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegMetrics {
    pub distance: f64,
    pub duration: f64,
    pub ascent: f64,
    pub descent: f64,
    /// Waypoint index where the leg starts.
    pub start_index: usize,
    /// Waypoint index where the leg ends.
    pub end_index: usize,
    /// First geometry index belonging to the leg.
    pub coordinate_start: usize,
    /// Last geometry index belonging to the leg.
    pub coordinate_end: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineGeometry {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: Vec<Coordinate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteProperties {
    pub summary: RouteSummary,
    pub segments: Vec<LegMetrics>,
    pub segment_metadata: Vec<SegmentMetadata>,
    pub coordinate_metadata: Vec<SegmentMetadata>,
    pub routing_mode: String,
    /// Engine or service that produced the route.
    pub engine: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_source: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// A complete route as a GeoJSON Feature with a LineString geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    #[serde(rename = "type")]
    pub kind: String,
    pub geometry: LineGeometry,
    pub properties: RouteProperties,
}

impl Route {
    pub fn coordinates(&self) -> &[Coordinate] {
        &self.geometry.coordinates
    }

    pub fn distance_km(&self) -> f64 {
        self.properties.summary.distance_m / 1000.0
    }

    pub fn legs(&self) -> &[LegMetrics] {
        &self.properties.segments
    }

    pub fn warnings(&self) -> &[String] {
        &self.properties.warnings
    }

    /// Split the route back into per-leg snapshots suitable for reuse as
    /// preserved segments on a later request.
    pub fn to_leg_snapshots(&self) -> Vec<LegSnapshot> {
        let coordinates = self.coordinates();
        self.legs()
            .iter()
            .enumerate()
            .map(|(leg_index, leg)| {
                let slice = coordinates
                    .get(leg.coordinate_start..=leg.coordinate_end)
                    .unwrap_or_default();
                let rebase = |entries: &[SegmentMetadata]| -> Vec<SegmentMetadata> {
                    let entries: Vec<_> = entries
                        .iter()
                        .filter(|entry| entry.leg_index == leg_index)
                        .collect();
                    let origin = entries.first().map_or(0.0, |entry| entry.start_distance_km);
                    entries
                        .into_iter()
                        .map(|entry| entry.shifted(-origin, leg_index))
                        .collect()
                };
                LegSnapshot {
                    start_index: leg.start_index,
                    end_index: leg.end_index,
                    coordinates: slice.to_vec(),
                    metadata: rebase(&self.properties.segment_metadata),
                    edges: rebase(&self.properties.coordinate_metadata),
                    routing_mode: self.properties.routing_mode.clone(),
                }
            })
            .collect()
    }
}

/// Accumulates legs into a [`Route`].
#[derive(Debug)]
pub struct RouteBuilder<'a> {
    config: &'a RoutingConfig,
    mode: String,
    coordinates: Vec<Coordinate>,
    legs: Vec<LegMetrics>,
    segment_metadata: Vec<SegmentMetadata>,
    coordinate_metadata: Vec<SegmentMetadata>,
    warnings: Vec<String>,
    offset_km: f64,
    duration_s: f64,
    ascent: f64,
    descent: f64,
}

impl<'a> RouteBuilder<'a> {
    pub fn new(config: &'a RoutingConfig, mode: impl Into<String>) -> Self {
        Self {
            config,
            mode: mode.into(),
            coordinates: Vec::new(),
            legs: Vec::new(),
            segment_metadata: Vec::new(),
            coordinate_metadata: Vec::new(),
            warnings: Vec::new(),
            offset_km: 0.0,
            duration_s: 0.0,
            ascent: 0.0,
            descent: 0.0,
        }
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Append a leg, shifting its metadata by the distance covered so far.
    pub fn push_leg(&mut self, leg: LegPlan) {
        let leg_index = self.legs.len();
        let distance_km = leg.distance_km();
        let ascent = leg.ascent();
        let descent = leg.descent();
        let duration = leg
            .duration_s
            .unwrap_or_else(|| self.config.duration_s(&self.mode, distance_km, ascent));

        let joins_previous = match (self.coordinates.last(), leg.coordinates.first()) {
            (Some(last), Some(first)) => haversine_km(last, first) <= DEDUP_TOLERANCE_KM,
            _ => false,
        };
        let coordinate_start = if joins_previous {
            self.coordinates.len() - 1
        } else {
            self.coordinates.len()
        };
        for coordinate in &leg.coordinates {
            push_dedup(&mut self.coordinates, *coordinate);
        }
        let coordinate_end = self.coordinates.len().saturating_sub(1).max(coordinate_start);

        self.segment_metadata.extend(
            leg.portions
                .iter()
                .map(|portion| portion.shifted(self.offset_km, leg_index)),
        );
        self.coordinate_metadata.extend(
            leg.edges
                .iter()
                .map(|edge| edge.shifted(self.offset_km, leg_index)),
        );

        self.legs.push(LegMetrics {
            distance: distance_km * 1000.0,
            duration,
            ascent,
            descent,
            start_index: leg.start_index,
            end_index: leg.start_index + 1,
            coordinate_start,
            coordinate_end,
        });
        self.offset_km += distance_km;
        self.duration_s += duration;
        self.ascent += ascent;
        self.descent += descent;
    }

    pub fn finish(self, engine: impl Into<String>) -> Route {
        Route {
            kind: "Feature".to_string(),
            geometry: LineGeometry {
                kind: "LineString".to_string(),
                coordinates: self.coordinates,
            },
            properties: RouteProperties {
                summary: RouteSummary {
                    distance_m: self.offset_km * 1000.0,
                    duration_s: self.duration_s,
                    ascent_m: self.ascent,
                    descent_m: self.descent,
                },
                segments: self.legs,
                segment_metadata: self.segment_metadata,
                coordinate_metadata: self.coordinate_metadata,
                routing_mode: self.mode,
                engine: engine.into(),
                fallback_source: None,
                warnings: self.warnings,
            },
        }
    }
}
