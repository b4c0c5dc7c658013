//! Replay command - drive a scripted update run and report the tracked state

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use suseq_core::{NodeAggregate, RunResult, ScenarioConfig, SequenceDriver, UpdateOverview};
use tracing::info;

use crate::config::MergedConfig;
use crate::output::{format_duration_s, status_colored, FileRow, NodeRow, OutputContext};

/// Replay a scenario file
pub fn replay(
    scenario_path: &Path,
    show_files: bool,
    config: &MergedConfig,
    ctx: &OutputContext,
) -> Result<()> {
    let mut scenario = ScenarioConfig::from_file(scenario_path)
        .with_context(|| format!("Failed to load scenario: {}", scenario_path.display()))?;
    if let Some(strategy) = config.rate_strategy {
        scenario.topology.estimator.rate_strategy = strategy;
    }

    let mut overview = UpdateOverview::from_config(&scenario.topology)
        .context("Failed to build update overview")?;
    let driver = SequenceDriver::new(scenario.outcomes);

    let pb = if ctx.is_interactive() {
        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
        pb
    } else {
        ProgressBar::hidden()
    };

    info!(scenario = %scenario_path.display(), "Replaying scenario");
    if ctx.is_interactive() {
        ctx.info(&format!(
            "Replaying {} ({} nodes, {} bytes)",
            scenario_path.display(),
            overview.node_count(),
            overview.estimator().overall_files_size()
        ));
    }
    let result = driver
        .run_with(&mut overview, |node| {
            pb.set_message(progress_message(node));
            pb.tick();
        })
        .context("Scenario rejected by the tracker")?;
    pb.finish_and_clear();

    let rows: Vec<NodeRow> = overview.summaries().iter().map(NodeRow::from).collect();
    ctx.print(&rows);

    if show_files {
        let files: Vec<FileRow> = overview
            .nodes()
            .flat_map(|node| node.sub_nodes())
            .filter_map(|sub| Some((sub.node_index(), sub.node_update_states()?)))
            .flat_map(|(index, state)| {
                state
                    .file_entries()
                    .map(move |entry| FileRow::from_entry(index, &entry))
                    .chain(
                        (!state.pem_file.file.file_name.is_empty())
                            .then(|| FileRow::from_pem(index, &state.pem_file)),
                    )
            })
            .collect();
        ctx.print(&files);
    }

    let estimator = overview.estimator();
    let estimate = overview
        .estimated_time_s()
        .map(format_duration_s)
        .unwrap_or_else(|| "unknown".to_string());
    ctx.print_kv(&[
        ("total_bytes", estimator.overall_files_size().to_string()),
        ("remaining_bytes", estimator.remaining_bytes().to_string()),
        ("estimated_time", estimate),
    ]);

    match result {
        RunResult::Completed => {
            ctx.success("Update sequence completed");
            Ok(())
        }
        RunResult::ConnectFailed { node_indices } => {
            ctx.error(&format!(
                "Connect phase failed for node indices {:?}",
                node_indices
            ));
            Err(anyhow::anyhow!("Update not started"))
        }
        RunResult::Aborted {
            node_index,
            failed_application_index,
        } => {
            ctx.error(&format!(
                "Update aborted at node index {} (file {})",
                node_index, failed_application_index
            ));
            Err(anyhow::anyhow!("Update aborted"))
        }
    }
}

fn progress_message(node: &NodeAggregate) -> String {
    let phase = if node.is_update_in_progress() {
        status_colored(node.overall_update_state())
    } else {
        status_colored(node.overall_initial_state())
    };
    format!("{}: {}", node.name(), phase)
}
