//! Output formatting for routes, snaps and network summaries.

use std::io::{self, Write};

use clap::ValueEnum;
use serde::Serialize;
use trailmesh_lib::{Route, Snap};

use crate::terminal::{format_with_separators, ColorPalette};

/// How command results are written to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary.
    #[default]
    Text,
    /// Pretty-printed JSON (GeoJSON Feature for routes).
    Json,
}

/// How log lines are written to stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Loaded network summary printed by `info`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkInfo {
    pub nodes: usize,
    pub edges: usize,
    pub engine: String,
    pub modes: Vec<String>,
}

/// Serialize `value` as pretty JSON followed by a newline.
pub fn write_json<W: Write, T: Serialize>(out: &mut W, value: &T) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)
}

fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

fn metres(value: f64) -> String {
    format!("{} m", format_with_separators(value.max(0.0).round() as u64))
}

/// Render a route as a short text report.
pub fn render_route_text<W: Write>(out: &mut W, route: &Route, palette: &ColorPalette) -> io::Result<()> {
    let props = &route.properties;
    let summary = &props.summary;
    write!(
        out,
        "{}Route{} via {} ({})",
        palette.bold, palette.reset, props.engine, props.routing_mode
    )?;
    if let Some(source) = &props.fallback_source {
        write!(out, " {}[fallback for {source}]{}", palette.orange, palette.reset)?;
    }
    writeln!(out)?;
    writeln!(
        out,
        "  distance {}, duration {}, ascent {}, descent {}",
        metres(summary.distance_m),
        format_duration(summary.duration_s),
        metres(summary.ascent_m),
        metres(summary.descent_m)
    )?;

    for (index, leg) in route.legs().iter().enumerate() {
        writeln!(
            out,
            "  {}leg {}{} waypoint {} -> {}: {}, {}",
            palette.bold,
            index + 1,
            palette.reset,
            leg.start_index,
            leg.end_index,
            metres(leg.distance),
            format_duration(leg.duration)
        )?;
        for portion in props.segment_metadata.iter().filter(|p| p.leg_index == index) {
            let color = palette.source(portion.source);
            let tag = portion.source.to_string();
            write!(
                out,
                "    {color}{tag:<9}{} {:>10}",
                palette.reset,
                metres(portion.distance_km * 1000.0)
            )?;
            if let Some(surface) = portion.attributes.as_ref().and_then(|a| a.surface.as_deref()) {
                write!(out, "  {}{surface}{}", palette.gray, palette.reset)?;
            }
            writeln!(out)?;
        }
    }

    if !props.warnings.is_empty() {
        writeln!(out, "{}Warnings:{}", palette.red, palette.reset)?;
        for warning in &props.warnings {
            writeln!(out, "  - {warning}")?;
        }
    }
    Ok(())
}

/// Render a snap result as one line.
pub fn render_snap_text<W: Write>(out: &mut W, snap: &Snap) -> io::Result<()> {
    let coordinate = snap.coordinate();
    match snap {
        Snap::Node { node, .. } => write!(out, "node {node}")?,
        Snap::Edge {
            from, to, fraction, ..
        } => write!(out, "edge {from}-{to} at {fraction:.3}")?,
    }
    writeln!(
        out,
        " ({:.1} m away) -> {coordinate}",
        snap.distance_km() * 1000.0
    )
}

pub fn render_info_text<W: Write>(out: &mut W, info: &NetworkInfo) -> io::Result<()> {
    writeln!(out, "Nodes:  {}", format_with_separators(info.nodes as u64))?;
    writeln!(out, "Edges:  {}", format_with_separators(info.edges as u64))?;
    writeln!(out, "Engine: {}", info.engine)?;
    if info.modes.is_empty() {
        writeln!(out, "Modes:  (none)")
    } else {
        writeln!(out, "Modes:  {}", info.modes.join(", "))
    }
}
