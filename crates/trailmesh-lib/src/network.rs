//! Network ingestion: turning GeoJSON-like feature collections into typed
//! line features the graph builder can consume.
//!
//! Parsing is tolerant. Features without geometry, with unsupported geometry
//! types or without enough valid coordinates are skipped (and logged at debug
//! level); only a payload that is not a feature collection at all is rejected.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::geo::Coordinate;

/// Set of travel modes allowed on an edge.
pub type ModeSet = Arc<BTreeSet<String>>;

/// Hiking-related tags carried through to the route for downstream styling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surface: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sac_scale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trail_visibility: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smoothness: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub way_type: Option<String>,
}

impl EdgeAttributes {
    pub fn is_empty(&self) -> bool {
        self.surface.is_none()
            && self.sac_scale.is_none()
            && self.trail_visibility.is_none()
            && self.smoothness.is_none()
            && self.track_type.is_none()
            && self.way_type.is_none()
    }

    fn from_properties(properties: &Map<String, Value>) -> Self {
        Self {
            surface: tag(properties, &["surface"]),
            sac_scale: tag(properties, &["sacScale", "sac_scale"]),
            trail_visibility: tag(properties, &["trailVisibility", "trail_visibility"]),
            smoothness: tag(properties, &["smoothness"]),
            track_type: tag(properties, &["trackType", "tracktype", "track_type"]),
            way_type: tag(properties, &["wayType", "waytype", "way_type"]),
        }
    }
}

/// One ingested feature: its lines plus the properties that shape its edges.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkFeature {
    /// Each entry is one polyline (a LineString, or one part of a MultiLineString).
    pub lines: Vec<Vec<Coordinate>>,
    /// Multiplier applied to physical length to obtain search weight (> 0).
    pub cost_multiplier: f64,
    /// Allowed modes; `None` means unrestricted.
    pub modes: Option<ModeSet>,
    /// Optional hiking attributes; `None` when no tags were present.
    pub attributes: Option<Arc<EdgeAttributes>>,
}

impl NetworkFeature {
    /// Unrestricted single-line feature with a unit multiplier.
    pub fn line(coordinates: Vec<Coordinate>) -> Self {
        Self {
            lines: vec![coordinates],
            cost_multiplier: 1.0,
            modes: None,
            attributes: None,
        }
    }

    pub fn with_cost_multiplier(mut self, multiplier: f64) -> Self {
        self.cost_multiplier = multiplier;
        self
    }

    pub fn with_modes<I, S>(mut self, modes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = modes
            .into_iter()
            .map(|mode| normalize_mode(&mode.into()))
            .filter(|mode| !mode.is_empty())
            .collect();
        self.modes = (!set.is_empty()).then(|| Arc::new(set));
        self
    }

    pub fn with_attributes(mut self, attributes: EdgeAttributes) -> Self {
        self.attributes = (!attributes.is_empty()).then(|| Arc::new(attributes));
        self
    }
}

/// Canonical spelling of a mode tag: trimmed and lowercase.
pub fn normalize_mode(mode: &str) -> String {
    mode.trim().to_ascii_lowercase()
}

/// Whether an edge restricted to `modes` may be traversed in `mode`.
pub fn mode_allowed(modes: Option<&ModeSet>, mode: Option<&str>) -> bool {
    match (modes, mode) {
        (Some(set), Some(mode)) => set.is_empty() || set.contains(mode),
        _ => true,
    }
}

/// Parse a FeatureCollection (or a bare array of features) from JSON text.
pub fn parse_network_str(text: &str, modes_property: &str) -> Result<Vec<NetworkFeature>> {
    let value: Value = serde_json::from_str(text)
        .map_err(|err| Error::validation(format!("network payload is not valid JSON: {err}")))?;
    parse_network(&value, modes_property)
}

/// Read and parse a network file.
pub fn load_network(path: &Path, modes_property: &str) -> Result<Vec<NetworkFeature>> {
    let text = fs::read_to_string(path).map_err(|err| Error::NetworkLoad {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    let features = parse_network_str(&text, modes_property).map_err(|err| Error::NetworkLoad {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    info!(path = %path.display(), features = features.len(), "loaded network file");
    Ok(features)
}

/// Parse an already-decoded JSON value.
pub fn parse_network(value: &Value, modes_property: &str) -> Result<Vec<NetworkFeature>> {
    let raw_features: &[Value] = match value {
        Value::Array(items) => items,
        Value::Object(object) => match object.get("features") {
            Some(Value::Array(items)) => items,
            _ if object.get("type").and_then(Value::as_str) == Some("Feature") => {
                std::slice::from_ref(value)
            }
            _ => {
                return Err(Error::validation(
                    "network payload must be a FeatureCollection with a features array",
                ))
            }
        },
        _ => {
            return Err(Error::validation(
                "network payload must be a FeatureCollection",
            ))
        }
    };

    let mut features = Vec::with_capacity(raw_features.len());
    let mut skipped = 0usize;
    for (index, raw) in raw_features.iter().enumerate() {
        match parse_feature(raw, modes_property) {
            Some(feature) => features.push(feature),
            None => {
                skipped += 1;
                debug!(index, "skipping feature without usable line geometry");
            }
        }
    }
    if skipped > 0 {
        debug!(skipped, kept = features.len(), "network parse skipped features");
    }
    Ok(features)
}

fn parse_feature(raw: &Value, modes_property: &str) -> Option<NetworkFeature> {
    let geometry = raw.get("geometry")?.as_object()?;
    let coordinates = geometry.get("coordinates")?;
    let lines: Vec<Vec<Coordinate>> = match geometry.get("type")?.as_str()? {
        "LineString" => parse_line(coordinates).into_iter().collect(),
        "MultiLineString" => coordinates
            .as_array()?
            .iter()
            .filter_map(parse_line)
            .collect(),
        _ => return None,
    };
    if lines.is_empty() {
        return None;
    }

    let empty = Map::new();
    let properties = raw
        .get("properties")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let feature = NetworkFeature {
        lines,
        cost_multiplier: cost_multiplier(properties),
        modes: None,
        attributes: None,
    }
    .with_modes(parse_modes(properties.get(modes_property)))
    .with_attributes(EdgeAttributes::from_properties(properties));
    Some(feature)
}

fn parse_line(value: &Value) -> Option<Vec<Coordinate>> {
    let points: Vec<Coordinate> = value
        .as_array()?
        .iter()
        .filter_map(parse_position)
        .collect();
    (points.len() >= 2).then_some(points)
}

fn parse_position(value: &Value) -> Option<Coordinate> {
    let values = value.as_array()?;
    let lng = values.first()?.as_f64()?;
    let lat = values.get(1)?.as_f64()?;
    let ele = values.get(2).and_then(Value::as_f64).unwrap_or(0.0);
    let coordinate = Coordinate::with_elevation(lng, lat, ele);
    coordinate.is_valid().then_some(coordinate)
}

fn parse_modes(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(text)) => text
            .split(',')
            .map(normalize_mode)
            .filter(|mode| !mode.is_empty())
            .collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(normalize_mode)
            .filter(|mode| !mode.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

fn cost_multiplier(properties: &Map<String, Value>) -> f64 {
    let raw = properties
        .get("costMultiplier")
        .or_else(|| properties.get("cost_multiplier"));
    let parsed = match raw {
        None | Some(Value::Null) => return 1.0,
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
        Some(_) => None,
    };
    match parsed {
        Some(value) if value.is_finite() && value > 0.0 => value,
        _ => {
            warn!(value = ?raw, "ignoring invalid cost multiplier; using 1");
            1.0
        }
    }
}

fn tag(properties: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match properties.get(*key)? {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    })
}
