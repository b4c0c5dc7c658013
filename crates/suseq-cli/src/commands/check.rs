//! Check command - validate a scenario and show what would be flashed

use anyhow::{Context, Result};
use std::path::Path;
use suseq_core::{ScenarioConfig, UpdateOverview};

use crate::output::{OutputContext, SubNodeRow};

/// Validate a scenario file and print its devices
pub fn check(scenario_path: &Path, ctx: &OutputContext) -> Result<()> {
    let scenario = ScenarioConfig::from_file(scenario_path)
        .with_context(|| format!("Failed to load scenario: {}", scenario_path.display()))?;
    let overview = UpdateOverview::from_config(&scenario.topology)
        .context("Failed to build update overview")?;

    let estimator = overview.estimator();
    let rows: Vec<SubNodeRow> = overview
        .nodes()
        .flat_map(|node| {
            node.sub_nodes().map(move |sub| {
                let bytes = estimator.node_files_size(sub.node_index()).unwrap_or(0);
                SubNodeRow::new(node.name(), sub, bytes)
            })
        })
        .collect();
    ctx.print(&rows);

    let idle: Vec<String> = rows
        .iter()
        .filter(|r| r.active && r.files == 0)
        .map(|r| r.name.clone())
        .collect();
    if !idle.is_empty() {
        ctx.warn(&format!("Nothing to update for: {}", idle.join(", ")));
    }

    ctx.success(&format!(
        "Scenario valid: {} nodes, {} scripted outcomes, {} bytes",
        overview.node_count(),
        scenario.outcomes.len(),
        estimator.overall_files_size()
    ));
    Ok(())
}
