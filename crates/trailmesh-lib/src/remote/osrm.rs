//! OSRM Route service client.
//!
//! See: <http://project-osrm.org/docs/v5.24.0/api/#route-service>

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{transport_error, RemoteBackend, RemoteConfig};
use crate::config::RoutingConfig;
use crate::error::{Error, Result};
use crate::geo::{haversine_km, Coordinate};
use crate::route::{LegPlan, PortionEdge, PortionSource, Route, RouteBuilder};

const SERVICE: &str = "osrm";

#[derive(Debug, Deserialize)]
struct RouteResponse {
    code: String,
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
    #[serde(default)]
    waypoints: Vec<OsrmWaypoint>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    geometry: OsrmGeometry,
    #[serde(default)]
    legs: Vec<OsrmLeg>,
}

#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    coordinates: Vec<Coordinate>,
}

#[derive(Debug, Deserialize)]
struct OsrmLeg {
    distance: f64,
    duration: f64,
}

#[derive(Debug, Deserialize)]
struct OsrmWaypoint {
    location: Coordinate,
}

/// OSRM-style backend: `GET {base}/route/v1/{profile}/{coordinates}`.
#[derive(Debug, Clone)]
pub struct OsrmBackend {
    client: Client,
    config: RemoteConfig,
}

impl OsrmBackend {
    pub fn new(config: RemoteConfig) -> Result<Self> {
        Ok(Self {
            client: config.build_client()?,
            config,
        })
    }

    /// OSRM profile for a travel mode.
    pub fn profile(mode: &str) -> Option<&'static str> {
        let family = mode.split('-').next().unwrap_or(mode);
        match family {
            "foot" | "hiking" | "walking" => Some("foot"),
            "cycling" | "bike" | "bicycle" => Some("bike"),
            "driving" | "car" => Some("car"),
            _ => None,
        }
    }

    fn route_url(&self, profile: &str, waypoints: &[Coordinate]) -> String {
        let coordinates = waypoints
            .iter()
            .map(|waypoint| format!("{},{}", waypoint.lng, waypoint.lat))
            .collect::<Vec<_>>()
            .join(";");
        format!(
            "{}/route/v1/{}/{}?overview=full&geometries=geojson&steps=false",
            self.config.base(),
            profile,
            coordinates
        )
    }
}

#[async_trait]
impl RemoteBackend for OsrmBackend {
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
        let url = self.route_url(profile, waypoints);
        debug!(%url, "requesting OSRM route");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| transport_error(SERVICE, &url, &err))?
            .error_for_status()
            .map_err(|err| transport_error(SERVICE, &url, &err))?;
        let body: RouteResponse = response
            .json()
            .await
            .map_err(|err| Error::remote(SERVICE, format!("unparsable response: {err}")))?;

        convert_response(body, waypoints, mode, config)
    }
}

fn convert_response(
    response: RouteResponse,
    waypoints: &[Coordinate],
    mode: &str,
    config: &RoutingConfig,
) -> Result<Route> {
    if response.code != "Ok" {
        return Err(Error::remote(
            SERVICE,
            format!(
                "{}: {}",
                response.code,
                response.message.unwrap_or_default()
            ),
        ));
    }
    let route = response
        .routes
        .into_iter()
        .next()
        .ok_or_else(|| Error::remote(SERVICE, "response contains no routes"))?;
    let coordinates = route.geometry.coordinates;
    if coordinates.is_empty() {
        return Err(Error::remote(SERVICE, "route geometry is empty"));
    }
    if route.legs.len() != waypoints.len() - 1 {
        return Err(Error::remote(
            SERVICE,
            format!(
                "expected {} legs, got {}",
                waypoints.len() - 1,
                route.legs.len()
            ),
        ));
    }

    let anchors: Vec<Coordinate> = if response.waypoints.len() == waypoints.len() {
        response.waypoints.iter().map(|waypoint| waypoint.location).collect()
    } else {
        waypoints.to_vec()
    };
    let splits = split_indices(&coordinates, &anchors);

    let mut builder = RouteBuilder::new(config, mode);
    for (index, leg) in route.legs.iter().enumerate() {
        let (start, end) = (splits[index], splits[index + 1]);
        let slice = &coordinates[start..=end];
        let mut plan = LegPlan::new(index);
        let edge = PortionEdge {
            distance_km: leg.distance / 1000.0,
            ascent: 0.0,
            descent: 0.0,
            cost_multiplier: 1.0,
            attributes: None,
        };
        plan.push_portion(PortionSource::Network, slice, &[edge]);
        plan.duration_s = Some(leg.duration);
        builder.push_leg(plan);
    }
    Ok(builder.finish(SERVICE))
}

/// Geometry index closest to each anchor, searching forward so indices never
/// decrease.
fn split_indices(coordinates: &[Coordinate], anchors: &[Coordinate]) -> Vec<usize> {
    let last = coordinates.len() - 1;
    let mut indices = Vec::with_capacity(anchors.len());
    let mut cursor = 0;
    for (position, anchor) in anchors.iter().enumerate() {
        let index = if position == 0 {
            0
        } else if position == anchors.len() - 1 {
            last
        } else {
            (cursor..=last)
                .min_by(|a, b| {
                    haversine_km(&coordinates[*a], anchor)
                        .total_cmp(&haversine_km(&coordinates[*b], anchor))
                })
                .unwrap_or(cursor)
        };
        cursor = index;
        indices.push(index);
    }
    indices
}
