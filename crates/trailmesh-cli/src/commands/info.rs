//! Info command handler: summary of a loaded network.

use std::io;
use std::path::Path;

use anyhow::Result;

use super::{load_assembler, load_config};
use crate::output::{render_info_text, write_json, NetworkInfo, OutputFormat};

/// Handle the info subcommand.
pub fn handle_info_command(network: &Path, config: Option<&Path>, format: OutputFormat) -> Result<()> {
    let config = load_config(config)?;
    let assembler = load_assembler(network, &config)?;
    let engine = assembler.engine();

    let info = NetworkInfo {
        nodes: engine.node_count(),
        edges: engine.edge_count(),
        engine: engine.source().to_string(),
        modes: config
            .speeds_kmh
            .keys()
            .filter(|mode| engine.supports_mode(mode))
            .cloned()
            .collect(),
    };

    let mut stdout = io::stdout().lock();
    match format {
        OutputFormat::Json => write_json(&mut stdout, &info)?,
        OutputFormat::Text => render_info_text(&mut stdout, &info)?,
    }
    Ok(())
}
