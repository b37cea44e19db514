//! openrouteservice Directions client (GeoJSON response format).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{transport_error, RemoteBackend, RemoteConfig};
use crate::config::RoutingConfig;
use crate::error::{Error, Result};
use crate::geo::{climb, haversine_km, Coordinate};
use crate::network::EdgeAttributes;
use crate::route::{LegPlan, PortionEdge, PortionSource, Route, RouteBuilder};

const SERVICE: &str = "ors";

const SURFACES: [&str; 19] = [
    "unknown",
    "paved",
    "unpaved",
    "asphalt",
    "concrete",
    "cobblestone",
    "metal",
    "wood",
    "compacted_gravel",
    "fine_gravel",
    "gravel",
    "dirt",
    "ground",
    "ice",
    "paving_stones",
    "sand",
    "woodchips",
    "grass",
    "grass_paver",
];

const WAY_TYPES: [&str; 11] = [
    "unknown",
    "state_road",
    "road",
    "street",
    "path",
    "track",
    "cycleway",
    "footway",
    "steps",
    "ferry",
    "construction",
];

/// Semantic name for an ORS surface code.
pub fn surface_name(code: i64) -> &'static str {
    lookup(&SURFACES, code)
}

/// Semantic name for an ORS way type code.
pub fn way_type_name(code: i64) -> &'static str {
    lookup(&WAY_TYPES, code)
}

fn lookup(table: &[&'static str], code: i64) -> &'static str {
    usize::try_from(code)
        .ok()
        .and_then(|index| table.get(index).copied())
        .unwrap_or("unknown")
}

#[derive(Debug, Serialize)]
struct DirectionsRequest<'a> {
    coordinates: Vec<[f64; 2]>,
    elevation: bool,
    extra_info: [&'a str; 2],
    instructions: bool,
}

#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    #[serde(default)]
    features: Vec<DirectionsFeature>,
}

#[derive(Debug, Deserialize)]
struct DirectionsFeature {
    geometry: DirectionsGeometry,
    properties: DirectionsProperties,
}

#[derive(Debug, Deserialize)]
struct DirectionsGeometry {
    coordinates: Vec<Coordinate>,
}

#[derive(Debug, Deserialize)]
struct DirectionsProperties {
    #[serde(default)]
    segments: Vec<DirectionsSegment>,
    #[serde(default)]
    way_points: Vec<usize>,
    #[serde(default)]
    extras: HashMap<String, ExtraInfo>,
}

#[derive(Debug, Deserialize)]
struct DirectionsSegment {
    #[serde(default)]
    duration: f64,
}

#[derive(Debug, Deserialize)]
struct ExtraInfo {
    /// `[from_index, to_index, code]` runs over the geometry.
    #[serde(default)]
    values: Vec<[i64; 3]>,
}

impl ExtraInfo {
    /// Code covering the geometry step `index` → `index + 1`.
    fn code_at(&self, index: usize) -> Option<i64> {
        let index = index as i64;
        self.values
            .iter()
            .find(|[from, to, _]| *from <= index && index < *to)
            .map(|[_, _, code]| *code)
    }
}

/// openrouteservice backend: `POST {base}/v2/directions/{profile}/geojson`.
#[derive(Debug, Clone)]
pub struct OrsBackend {
    client: Client,
    config: RemoteConfig,
}

impl OrsBackend {
    pub fn new(config: RemoteConfig) -> Result<Self> {
        Ok(Self {
            client: config.build_client()?,
            config,
        })
    }

    /// ORS profile for a travel mode.
    pub fn profile(mode: &str) -> Option<&'static str> {
        match mode {
            "foot-hiking" | "hiking" => Some("foot-hiking"),
            "foot" | "foot-walking" | "walking" => Some("foot-walking"),
            "cycling" | "cycling-regular" => Some("cycling-regular"),
            "cycling-mountain" => Some("cycling-mountain"),
            "cycling-road" => Some("cycling-road"),
            "cycling-electric" => Some("cycling-electric"),
            "driving" | "driving-car" => Some("driving-car"),
            "driving-hgv" => Some("driving-hgv"),
            _ => None,
        }
    }

    fn directions_url(&self, profile: &str) -> String {
        format!("{}/v2/directions/{}/geojson", self.config.base(), profile)
    }
}

#[async_trait]
impl RemoteBackend for OrsBackend {
    fn name(&self) -> &'static str {
        SERVICE
    }

    fn supports_mode(&self, mode: &str) -> bool {
        Self::profile(mode).is_some()
    }

    async fn fetch(
        &self,
        waypoints: &[Coordinate],
        mode: &str,
        config: &RoutingConfig,
    ) -> Result<Route> {
        let profile = Self::profile(mode)
            .ok_or_else(|| Error::remote(SERVICE, format!("no profile for mode {mode}")))?;
        let url = self.directions_url(profile);
        let payload = DirectionsRequest {
            coordinates: waypoints.iter().map(|w| [w.lng, w.lat]).collect(),
            elevation: true,
            extra_info: ["surface", "waytype"],
            instructions: false,
        };
        debug!(%url, waypoints = waypoints.len(), "requesting ORS directions");

        let mut request = self.client.post(&url).json(&payload);
        if let Some(key) = &self.config.api_key {
            request = request.header(reqwest::header::AUTHORIZATION, key);
        }
        let response = request
            .send()
            .await
            .map_err(|err| transport_error(SERVICE, &url, &err))?
            .error_for_status()
            .map_err(|err| transport_error(SERVICE, &url, &err))?;
        let body: DirectionsResponse = response
            .json()
            .await
            .map_err(|err| Error::remote(SERVICE, format!("unparsable response: {err}")))?;

        convert_response(body, waypoints, mode, config)
    }
}

fn convert_response(
    response: DirectionsResponse,
    waypoints: &[Coordinate],
    mode: &str,
    config: &RoutingConfig,
) -> Result<Route> {
    let feature = response
        .features
        .into_iter()
        .next()
        .ok_or_else(|| Error::remote(SERVICE, "response contains no features"))?;
    let coordinates = feature.geometry.coordinates;
    let properties = feature.properties;
    if coordinates.is_empty() {
        return Err(Error::remote(SERVICE, "route geometry is empty"));
    }

    let leg_count = waypoints.len() - 1;
    let way_points = if properties.way_points.len() == waypoints.len() {
        properties.way_points
    } else {
        return Err(Error::remote(
            SERVICE,
            format!(
                "expected {} way points, got {}",
                waypoints.len(),
                properties.way_points.len()
            ),
        ));
    };
    if way_points.windows(2).any(|pair| pair[0] > pair[1])
        || way_points.last().is_some_and(|last| *last >= coordinates.len())
    {
        return Err(Error::remote(SERVICE, "way point indices do not fit the geometry"));
    }

    let surfaces = properties.extras.get("surface");
    let way_types = properties
        .extras
        .get("waytype")
        .or_else(|| properties.extras.get("waytypes"));

    let mut builder = RouteBuilder::new(config, mode);
    for index in 0..leg_count {
        let (start, end) = (way_points[index], way_points[index + 1]);
        let mut plan = LegPlan::new(index);
        let edges = classified_edges(&coordinates, start, end, surfaces, way_types);
        plan.push_portion(PortionSource::Network, &coordinates[start..=end], &edges);
        plan.duration_s = properties.segments.get(index).map(|segment| segment.duration);
        builder.push_leg(plan);
    }
    Ok(builder.finish(SERVICE))
}

/// Group geometry steps `start..end` into runs sharing surface and way type.
fn classified_edges(
    coordinates: &[Coordinate],
    start: usize,
    end: usize,
    surfaces: Option<&ExtraInfo>,
    way_types: Option<&ExtraInfo>,
) -> Vec<PortionEdge> {
    let mut edges: Vec<PortionEdge> = Vec::new();
    let mut current: Option<(Option<i64>, Option<i64>)> = None;
    for index in start..end {
        let (a, b) = (&coordinates[index], &coordinates[index + 1]);
        let codes = (
            surfaces.and_then(|extra| extra.code_at(index)),
            way_types.and_then(|extra| extra.code_at(index)),
        );
        let distance_km = haversine_km(a, b);
        let (ascent, descent) = climb(a, b);
        match edges.last_mut() {
            Some(edge) if current == Some(codes) => {
                edge.distance_km += distance_km;
                edge.ascent += ascent;
                edge.descent += descent;
            }
            _ => {
                let attributes = EdgeAttributes {
                    surface: codes.0.map(|code| surface_name(code).to_string()),
                    way_type: codes.1.map(|code| way_type_name(code).to_string()),
                    ..EdgeAttributes::default()
                };
                edges.push(PortionEdge {
                    distance_km,
                    ascent,
                    descent,
                    cost_multiplier: 1.0,
                    attributes: (!attributes.is_empty()).then(|| Arc::new(attributes)),
                });
                current = Some(codes);
            }
        }
    }
    edges
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "geometry": {"type": "LineString", "coordinates": [
                [7.0, 46.0, 1000.0], [7.001, 46.0, 1010.0], [7.002, 46.0, 1030.0], [7.003, 46.0, 1020.0]
            ]},
            "properties": {
                "segments": [{"distance": 77.0, "duration": 60.0}, {"distance": 154.0, "duration": 130.0}],
                "way_points": [0, 1, 3],
                "extras": {
                    "surface": {"values": [[0, 2, 11], [2, 3, 3]]},
                    "waytypes": {"values": [[0, 3, 4]]}
                }
            }
        }]
    }"#;

    #[test]
    fn lookup_tables_map_codes() {
        assert_eq!(surface_name(11), "dirt");
        assert_eq!(surface_name(99), "unknown");
        assert_eq!(surface_name(-1), "unknown");
        assert_eq!(way_type_name(4), "path");
    }

    #[test]
    fn profiles_cover_hiking_and_cycling() {
        assert_eq!(OrsBackend::profile("foot-hiking"), Some("foot-hiking"));
        assert_eq!(OrsBackend::profile("cycling-mountain"), Some("cycling-mountain"));
        assert_eq!(OrsBackend::profile("driving"), Some("driving-car"));
        assert_eq!(OrsBackend::profile("rowing"), None);
    }

    #[test]
    fn converts_extras_into_attributed_edges() {
        let body: DirectionsResponse = serde_json::from_str(BODY).expect("valid body");
        let waypoints = [
            Coordinate::new(7.0, 46.0),
            Coordinate::new(7.001, 46.0),
            Coordinate::new(7.003, 46.0),
        ];
        let route = convert_response(body, &waypoints, "foot-hiking", &RoutingConfig::default())
            .expect("route");

        assert_eq!(route.properties.engine, "ors");
        assert_eq!(route.coordinates().len(), 4);
        assert_eq!(route.legs()[1].duration, 130.0);
        assert!((route.properties.summary.ascent_m - 30.0).abs() < 1e-9);
        assert!((route.properties.summary.descent_m - 10.0).abs() < 1e-9);

        let edges = &route.properties.coordinate_metadata;
        assert_eq!(edges.len(), 3);
        let surfaces: Vec<_> = edges
            .iter()
            .map(|edge| edge.attributes.as_ref().and_then(|a| a.surface.clone()))
            .collect();
        assert_eq!(
            surfaces,
            vec![Some("dirt".into()), Some("dirt".into()), Some("asphalt".into())]
        );
        assert_eq!(
            edges[0].attributes.as_ref().and_then(|a| a.way_type.as_deref()),
            Some("path")
        );
    }

    #[test]
    fn mismatched_way_points_are_rejected() {
        let body: DirectionsResponse = serde_json::from_str(BODY).expect("valid body");
        let error = convert_response(
            body,
            &[Coordinate::new(7.0, 46.0), Coordinate::new(7.003, 46.0)],
            "foot-hiking",
            &RoutingConfig::default(),
        )
        .expect_err("three way points for two waypoints");
        assert_eq!(error.kind(), "remote_service");
    }
}
