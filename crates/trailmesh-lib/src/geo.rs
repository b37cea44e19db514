//! Geodesy helpers shared by the graph, snapper and route assembler.
//!
//! All distances are great-circle (haversine) distances on a spherical Earth.
//! Projection onto segments uses a local equirectangular approximation, which
//! is accurate enough for the short segments found in trail networks.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Mean Earth radius used for all haversine computations.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Consecutive coordinates closer than this are treated as duplicates (5 cm).
pub const DEDUP_TOLERANCE_KM: f64 = 0.000_05;

/// A `(longitude, latitude, elevation)` triple. Elevation is metres and
/// defaults to zero when the source omits it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "[f64; 3]")]
pub struct Coordinate {
    pub lng: f64,
    pub lat: f64,
    pub ele: f64,
}

impl Coordinate {
    pub const fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat, ele: 0.0 }
    }

    pub const fn with_elevation(lng: f64, lat: f64, ele: f64) -> Self {
        Self { lng, lat, ele }
    }

    /// Whether the coordinate is finite and inside WGS84 bounds.
    pub fn is_valid(&self) -> bool {
        self.lng.is_finite()
            && self.lat.is_finite()
            && self.ele.is_finite()
            && (-180.0..=180.0).contains(&self.lng)
            && (-90.0..=90.0).contains(&self.lat)
    }

    /// Great-circle distance to `other` in kilometres.
    pub fn distance_km(&self, other: &Coordinate) -> f64 {
        haversine_km(self, other)
    }

    /// Linear interpolation (longitude, latitude and elevation) at `t` in `[0, 1]`.
    pub fn interpolate(&self, other: &Coordinate, t: f64) -> Coordinate {
        Coordinate {
            lng: self.lng + (other.lng - self.lng) * t,
            lat: self.lat + (other.lat - self.lat) * t,
            ele: self.ele + (other.ele - self.ele) * t,
        }
    }

    /// Same position with the elevation replaced.
    pub fn at_elevation(self, ele: f64) -> Coordinate {
        Coordinate { ele, ..self }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6},{:.6}", self.lng, self.lat)
    }
}

impl TryFrom<Vec<f64>> for Coordinate {
    type Error = String;

    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        match values.as_slice() {
            [lng, lat] => Ok(Coordinate::new(*lng, *lat)),
            [lng, lat, ele, ..] => Ok(Coordinate::with_elevation(*lng, *lat, *ele)),
            _ => Err(format!(
                "coordinate needs at least 2 values, got {}",
                values.len()
            )),
        }
    }
}

impl From<Coordinate> for [f64; 3] {
    fn from(value: Coordinate) -> Self {
        [value.lng, value.lat, value.ele]
    }
}

/// Haversine distance between two coordinates in kilometres.
pub fn haversine_km(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();

    let sin_dlat = (dlat / 2.0).sin();
    let sin_dlng = (dlng / 2.0).sin();

    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlng * sin_dlng;
    2.0 * EARTH_RADIUS_KM * h.min(1.0).sqrt().asin()
}

/// Elevation gain and loss in metres when travelling from `a` to `b`.
pub fn climb(a: &Coordinate, b: &Coordinate) -> (f64, f64) {
    let delta = b.ele - a.ele;
    if delta >= 0.0 {
        (delta, 0.0)
    } else {
        (0.0, -delta)
    }
}

/// Result of projecting a point onto a segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    /// Closest point on the segment, elevation interpolated.
    pub point: Coordinate,
    /// Fraction along the segment in `[0, 1]`.
    pub fraction: f64,
    /// Haversine distance from the query to `point`.
    pub distance_km: f64,
}

/// Project `point` onto the segment `a`–`b`.
///
/// Longitudes are scaled by `cos(latitude)` at the segment's mean latitude and
/// the fraction is clamped to `[0, 1]`.
pub fn project_onto_segment(point: &Coordinate, a: &Coordinate, b: &Coordinate) -> Projection {
    let scale = ((a.lat + b.lat) / 2.0).to_radians().cos();
    let (ax, ay) = (a.lng * scale, a.lat);
    let (bx, by) = (b.lng * scale, b.lat);
    let (px, py) = (point.lng * scale, point.lat);

    let dx = bx - ax;
    let dy = by - ay;
    let length_sq = dx * dx + dy * dy;
    let fraction = if length_sq <= f64::EPSILON * f64::EPSILON {
        0.0
    } else {
        (((px - ax) * dx + (py - ay) * dy) / length_sq).clamp(0.0, 1.0)
    };

    let projected = a.interpolate(b, fraction);
    Projection {
        point: projected,
        fraction,
        distance_km: haversine_km(point, &projected),
    }
}

/// Append `coordinate` unless it duplicates the last entry within 5 cm.
pub fn push_dedup(coordinates: &mut Vec<Coordinate>, coordinate: Coordinate) {
    if let Some(last) = coordinates.last() {
        if haversine_km(last, &coordinate) <= DEDUP_TOLERANCE_KM {
            return;
        }
    }
    coordinates.push(coordinate);
}

/// Total haversine length of a polyline in kilometres.
pub fn polyline_length_km(coordinates: &[Coordinate]) -> f64 {
    coordinates
        .windows(2)
        .map(|pair| haversine_km(&pair[0], &pair[1]))
        .sum()
}

/// Total ascent and descent in metres along a polyline.
pub fn polyline_climb(coordinates: &[Coordinate]) -> (f64, f64) {
    coordinates
        .windows(2)
        .map(|pair| climb(&pair[0], &pair[1]))
        .fold((0.0, 0.0), |(up, down), (a, d)| (up + a, down + d))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_degree_of_latitude_is_about_111_km() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(0.0, 1.0);
        let distance = haversine_km(&a, &b);
        assert!((distance - 111.19).abs() < 0.01, "got {distance}");
    }

    #[test]
    fn projection_clamps_to_segment() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(0.001, 0.0);
        let before = project_onto_segment(&Coordinate::new(-0.001, 0.0), &a, &b);
        assert_eq!(before.fraction, 0.0);
        let middle = project_onto_segment(&Coordinate::new(0.0005, 0.0001), &a, &b);
        assert!((middle.fraction - 0.5).abs() < 1e-9);
        assert!((middle.distance_km - 0.011_119).abs() < 1e-4);
    }

    #[test]
    fn projection_interpolates_elevation() {
        let a = Coordinate::with_elevation(0.0, 0.0, 100.0);
        let b = Coordinate::with_elevation(0.001, 0.0, 200.0);
        let projection = project_onto_segment(&Coordinate::new(0.00025, 0.0), &a, &b);
        assert!((projection.point.ele - 125.0).abs() < 1e-6);
    }

    #[test]
    fn coordinates_deserialize_from_two_or_three_values() {
        let flat: Coordinate = serde_json::from_str("[7.5, 46.1]").expect("2d");
        assert_eq!(flat, Coordinate::new(7.5, 46.1));
        let high: Coordinate = serde_json::from_str("[7.5, 46.1, 1200]").expect("3d");
        assert_eq!(high.ele, 1200.0);
        assert!(serde_json::from_str::<Coordinate>("[7.5]").is_err());
        assert_eq!(serde_json::to_string(&high).unwrap(), "[7.5,46.1,1200.0]");
    }

    #[test]
    fn push_dedup_skips_near_duplicates() {
        let mut coords = vec![Coordinate::new(0.0, 0.0)];
        push_dedup(&mut coords, Coordinate::new(0.000_000_1, 0.0));
        assert_eq!(coords.len(), 1);
        push_dedup(&mut coords, Coordinate::new(0.001, 0.0));
        assert_eq!(coords.len(), 2);
    }
}
