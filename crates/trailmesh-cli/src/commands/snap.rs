//! Snap command handler: nearest network point for each waypoint.

use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use trailmesh_lib::{Coordinate, Snap};

use super::{load_assembler, load_config};
use crate::output::{render_snap_text, write_json, OutputFormat};

#[derive(Debug, Serialize)]
struct SnapResult {
    waypoint: Coordinate,
    snap: Option<Snap>,
}

/// Handle the snap subcommand.
pub fn handle_snap_command(
    network: &Path,
    config: Option<&Path>,
    waypoints: &[Coordinate],
    mode: &str,
    format: OutputFormat,
) -> Result<()> {
    let config = load_config(config)?;
    let assembler = load_assembler(network, &config)?;
    let filter = (!mode.is_empty()).then_some(mode);

    let results: Vec<SnapResult> = waypoints
        .iter()
        .map(|waypoint| SnapResult {
            waypoint: *waypoint,
            snap: assembler.engine().find_nearest_point(waypoint, filter),
        })
        .collect();

    let mut stdout = io::stdout().lock();
    match format {
        OutputFormat::Json => write_json(&mut stdout, &results)?,
        OutputFormat::Text => {
            for result in &results {
                write!(stdout, "{}: ", result.waypoint)?;
                match &result.snap {
                    Some(snap) => render_snap_text(&mut stdout, snap)?,
                    None => writeln!(stdout, "no edge allows mode {mode}")?,
                }
            }
        }
    }
    stdout.flush().context("failed to write snap results")
}
