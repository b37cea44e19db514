//! Trailmesh CLI library.
//!
//! Subcommand handlers, argument parsing helpers, terminal styling and output
//! formatting for the `trailmesh` binary.

pub mod commands;
pub mod output;
pub mod terminal;

use trailmesh_lib::Coordinate;

/// Parse a `lng,lat[,ele]` waypoint argument.
pub fn parse_waypoint(value: &str) -> Result<Coordinate, String> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    if !(2..=3).contains(&parts.len()) {
        return Err(format!("expected lng,lat[,ele], got '{value}'"));
    }
    let mut numbers = [0.0f64; 3];
    for (slot, part) in numbers.iter_mut().zip(&parts) {
        *slot = part
            .parse()
            .map_err(|_| format!("'{part}' is not a number in waypoint '{value}'"))?;
    }
    let coordinate = Coordinate::with_elevation(numbers[0], numbers[1], numbers[2]);
    if !coordinate.is_valid() {
        return Err(format!("waypoint '{value}' is outside the valid lng/lat range"));
    }
    Ok(coordinate)
}
