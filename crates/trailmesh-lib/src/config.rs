//! Routing configuration.
//!
//! [`RoutingConfig`] gathers the geometric tolerances, fallback switches and
//! per-mode travel speeds used across the library. It can be deserialized from
//! JSON (missing keys keep their defaults) and overlaid with `TRAILMESH_*`
//! environment variables.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Metres spanned by one degree of latitude.
const METRES_PER_DEGREE: f64 = 111_320.0;

const ENV_MERGE_TOLERANCE: &str = "TRAILMESH_MERGE_TOLERANCE_M";
const ENV_MAX_SNAP: &str = "TRAILMESH_MAX_SNAP_M";
const ENV_BRIDGE: &str = "TRAILMESH_BRIDGE_M";
const ENV_DIRECT_FALLBACK: &str = "TRAILMESH_DIRECT_FALLBACK";
const ENV_PREFER_ACCELERATED: &str = "TRAILMESH_PREFER_ACCELERATED";
const ENV_CACHE_CAPACITY: &str = "TRAILMESH_CACHE_CAPACITY";
const ENV_MODES_PROPERTY: &str = "TRAILMESH_MODES_PROPERTY";

/// Tunables for graph construction, snapping and route assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Raw coordinates closer than this merge into one node.
    pub merge_tolerance_m: f64,
    /// Edge length of a spatial bucket in degrees.
    pub bucket_size_deg: f64,
    /// Decimal places used when deriving node keys.
    pub key_precision: u32,
    /// Waypoints farther than this from the network are not snapped.
    pub max_snap_distance_m: f64,
    /// Waypoints within this distance may be bridged with a direct segment.
    pub bridge_distance_m: f64,
    /// Degrade unroutable legs to direct segments when they are short enough.
    pub allow_direct_fallback: bool,
    /// Split the nearest edge when inserting a node onto it.
    pub split_edges_on_insert: bool,
    /// Try the accelerated engine before the baseline one.
    pub prefer_accelerated: bool,
    /// Preserved legs are reused only if their endpoints moved less than this.
    pub preserved_anchor_tolerance_m: f64,
    /// Feature property holding the allowed travel modes.
    pub modes_property: String,
    /// Travel speed per mode in km/h.
    pub speeds_kmh: BTreeMap<String, f64>,
    /// Speed used for modes missing from `speeds_kmh`.
    pub default_speed_kmh: f64,
    /// Metres of ascent per hour added to foot travel time.
    pub climb_rate_m_per_h: f64,
    /// Maximum cached routes per remote router; `None` keeps everything.
    pub cache_capacity: Option<usize>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        let speeds_kmh = BTreeMap::from([
            ("foot".to_string(), 4.5),
            ("foot-hiking".to_string(), 4.0),
            ("foot-walking".to_string(), 5.0),
            ("cycling".to_string(), 15.0),
            ("cycling-mountain".to_string(), 12.0),
            ("driving".to_string(), 50.0),
        ]);

        Self {
            merge_tolerance_m: 8.0,
            bucket_size_deg: 0.001,
            key_precision: 7,
            max_snap_distance_m: 500.0,
            bridge_distance_m: 2000.0,
            allow_direct_fallback: true,
            split_edges_on_insert: true,
            prefer_accelerated: true,
            preserved_anchor_tolerance_m: 50.0,
            modes_property: "modes".to_string(),
            speeds_kmh,
            default_speed_kmh: 4.5,
            climb_rate_m_per_h: 600.0,
            cache_capacity: None,
        }
    }
}

impl RoutingConfig {
    /// Parse a JSON document, keeping defaults for missing keys.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: RoutingConfig = serde_json::from_str(text).map_err(|err| Error::Config {
            message: err.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON configuration file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|err| Error::Config {
            message: format!("{}: {}", path.display(), err),
        })?;
        Self::from_json_str(&text)
    }

    /// Overlay values from `TRAILMESH_*` environment variables.
    pub fn with_env_overrides(self) -> Result<Self> {
        let vars = [
            ENV_MERGE_TOLERANCE,
            ENV_MAX_SNAP,
            ENV_BRIDGE,
            ENV_DIRECT_FALLBACK,
            ENV_PREFER_ACCELERATED,
            ENV_CACHE_CAPACITY,
            ENV_MODES_PROPERTY,
        ]
        .into_iter()
        .filter_map(|key| env::var(key).ok().map(|value| (key, value)));
        self.apply_overrides(vars)
    }

    /// Apply `(variable, value)` overrides. Unknown variables are ignored.
    pub fn apply_overrides<'a, I>(mut self, overrides: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, String)>,
    {
        for (key, value) in overrides {
            debug!(key, value = %value, "applying configuration override");
            match key {
                ENV_MERGE_TOLERANCE => self.merge_tolerance_m = parse_value(key, &value)?,
                ENV_MAX_SNAP => self.max_snap_distance_m = parse_value(key, &value)?,
                ENV_BRIDGE => self.bridge_distance_m = parse_value(key, &value)?,
                ENV_DIRECT_FALLBACK => self.allow_direct_fallback = parse_bool(key, &value)?,
                ENV_PREFER_ACCELERATED => self.prefer_accelerated = parse_bool(key, &value)?,
                ENV_CACHE_CAPACITY => {
                    self.cache_capacity = match value.trim() {
                        "" | "0" | "unbounded" => None,
                        other => Some(parse_value(key, other)?),
                    }
                }
                ENV_MODES_PROPERTY => self.modes_property = value,
                _ => {}
            }
        }
        self.validate()?;
        Ok(self)
    }

    /// Check tolerances are positive and the bucket grid can cover the merge radius.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("merge_tolerance_m", self.merge_tolerance_m),
            ("bucket_size_deg", self.bucket_size_deg),
            ("max_snap_distance_m", self.max_snap_distance_m),
            ("bridge_distance_m", self.bridge_distance_m),
            ("default_speed_kmh", self.default_speed_kmh),
            ("climb_rate_m_per_h", self.climb_rate_m_per_h),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::Config {
                    message: format!("{name} must be a positive number, got {value}"),
                });
            }
        }
        if self.bridge_distance_m < self.max_snap_distance_m {
            return Err(Error::Config {
                message: "bridge_distance_m must not be smaller than max_snap_distance_m"
                    .to_string(),
            });
        }
        if self.merge_tolerance_m / METRES_PER_DEGREE > self.bucket_size_deg {
            return Err(Error::Config {
                message: format!(
                    "bucket_size_deg {} is too small for a {} m merge tolerance",
                    self.bucket_size_deg, self.merge_tolerance_m
                ),
            });
        }
        if let Some((mode, speed)) = self
            .speeds_kmh
            .iter()
            .find(|(_, speed)| !(speed.is_finite() && **speed > 0.0))
        {
            return Err(Error::Config {
                message: format!("speed for mode {mode} must be positive, got {speed}"),
            });
        }
        Ok(())
    }

    pub fn merge_tolerance_km(&self) -> f64 {
        self.merge_tolerance_m / 1000.0
    }

    /// Travel speed for `mode`: exact match, then the family prefix (`foot`
    /// for `foot-hiking`), then the default.
    pub fn speed_kmh(&self, mode: &str) -> f64 {
        if let Some(speed) = self.speeds_kmh.get(mode) {
            return *speed;
        }
        let family = mode.split('-').next().unwrap_or(mode);
        self.speeds_kmh
            .get(family)
            .copied()
            .unwrap_or(self.default_speed_kmh)
    }

    /// Estimated travel time in seconds.
    pub fn duration_s(&self, mode: &str, distance_km: f64, ascent_m: f64) -> f64 {
        let mut hours = distance_km / self.speed_kmh(mode);
        if is_foot_mode(mode) {
            hours += ascent_m / self.climb_rate_m_per_h;
        }
        hours * 3600.0
    }
}

/// Walking and hiking profiles get the climb allowance.
pub fn is_foot_mode(mode: &str) -> bool {
    mode.starts_with("foot") || mode.starts_with("hiking") || mode.starts_with("walking")
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|err: T::Err| Error::Config {
        message: format!("{key}={value}: {err}"),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config {
            message: format!("{key}={other}: expected a boolean"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        RoutingConfig::default().validate().expect("defaults valid");
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            RoutingConfig::from_json_str(r#"{"merge_tolerance_m": 5.0}"#).expect("parses");
        assert_eq!(config.merge_tolerance_m, 5.0);
        assert_eq!(config.max_snap_distance_m, 500.0);
    }

    #[test]
    fn overrides_are_applied_and_validated() {
        let config = RoutingConfig::default()
            .apply_overrides([
                (ENV_MAX_SNAP, "250".to_string()),
                (ENV_PREFER_ACCELERATED, "false".to_string()),
                (ENV_CACHE_CAPACITY, "32".to_string()),
            ])
            .expect("valid overrides");
        assert_eq!(config.max_snap_distance_m, 250.0);
        assert!(!config.prefer_accelerated);
        assert_eq!(config.cache_capacity, Some(32));

        let error = RoutingConfig::default()
            .apply_overrides([(ENV_MERGE_TOLERANCE, "-1".to_string())])
            .expect_err("negative tolerance");
        assert_eq!(error.kind(), "config");
    }

    #[test]
    fn speed_falls_back_to_mode_family() {
        let config = RoutingConfig::default();
        assert_eq!(config.speed_kmh("foot-hiking"), 4.0);
        assert_eq!(config.speed_kmh("cycling-road"), 15.0);
        assert_eq!(config.speed_kmh("rowing"), 4.5);
    }

    #[test]
    fn foot_duration_includes_climb() {
        let config = RoutingConfig::default();
        let flat = config.duration_s("foot-hiking", 4.0, 0.0);
        let hilly = config.duration_s("foot-hiking", 4.0, 600.0);
        assert!((flat - 3600.0).abs() < 1e-6);
        assert!((hilly - 7200.0).abs() < 1e-6);
        let bike = config.duration_s("cycling", 15.0, 600.0);
        assert!((bike - 3600.0).abs() < 1e-6);
    }
}
