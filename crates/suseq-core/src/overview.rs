//! System-wide view over all nodes of an update run

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::TopologyConfig;
use crate::error::{TrackerError, TrackerResult};
use crate::estimator::{EstimatorConfig, FileSizeEstimator};
use crate::node::NodeAggregate;
use crate::status::OverallStatus;
use crate::sub_node::SubNodeAggregate;

/// One row of the node summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSummary {
    pub name: String,
    pub node_indices: Vec<u32>,
    pub active_sub_nodes: usize,
    pub sub_node_count: usize,
    pub initial_status: OverallStatus,
    pub update_status: OverallStatus,
    /// Bytes of all sub-nodes registered with the estimator
    pub file_bytes: u64,
    pub discarded: bool,
}

/// Node aggregates plus the estimator of one run
#[derive(Debug, Clone)]
pub struct UpdateOverview {
    nodes: Vec<NodeAggregate>,
    estimator: FileSizeEstimator,
}

impl UpdateOverview {
    /// Build from ready aggregates.
    ///
    /// Node indices must be unique across all nodes. File sizes of every
    /// active, updatable sub-node are registered with the estimator.
    pub fn new(nodes: Vec<NodeAggregate>, estimator: EstimatorConfig) -> TrackerResult<Self> {
        let mut seen = BTreeSet::new();
        for index in nodes.iter().flat_map(NodeAggregate::node_indices) {
            if !seen.insert(index) {
                return Err(TrackerError::TopologyMismatch(format!(
                    "node index {} used more than once",
                    index
                )));
            }
        }

        let mut estimator = FileSizeEstimator::new(estimator);
        for sub in nodes.iter().flat_map(NodeAggregate::sub_nodes) {
            if !sub.is_active()
                || !sub.has_available_flashloader()
                || sub.check_update_disabled_state()
            {
                continue;
            }
            let info = sub.update_info();
            estimator.append_files(
                sub.node_index(),
                &info.data_file_sizes(),
                &info.parameter_file_sizes(),
            )?;
        }
        info!(
            nodes = nodes.len(),
            bytes = estimator.overall_files_size(),
            "Update overview created"
        );
        Ok(Self { nodes, estimator })
    }

    /// Build aggregates for every node of a topology
    pub fn from_config(config: &TopologyConfig) -> TrackerResult<Self> {
        let mut nodes = Vec::with_capacity(config.nodes.len());
        for node in &config.nodes {
            let sub_nodes = node
                .sub_nodes
                .iter()
                .map(|s| {
                    let mut sub = SubNodeAggregate::new(s.node_index, s.name.as_str(), s.flashloader)
                        .with_update_info(s.package.clone());
                    sub.set_active(s.active);
                    sub
                })
                .collect();
            debug!(node = %node.name, "Node aggregate created");
            nodes.push(NodeAggregate::new(node.name.as_str(), sub_nodes)?);
        }
        Self::new(nodes, config.estimator.clone())
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeAggregate> {
        self.nodes.iter()
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut NodeAggregate> {
        self.nodes.iter_mut()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, position: usize) -> Option<&NodeAggregate> {
        self.nodes.get(position)
    }

    /// Node containing the device with the given node index
    pub fn node_for_node_index(&self, node_index: u32) -> Option<&NodeAggregate> {
        self.nodes.iter().find(|n| n.contains_node_index(node_index))
    }

    pub fn node_for_node_index_mut(&mut self, node_index: u32) -> Option<&mut NodeAggregate> {
        self.nodes
            .iter_mut()
            .find(|n| n.contains_node_index(node_index))
    }

    pub fn sub_node_by_node_index(&self, node_index: u32) -> Option<&SubNodeAggregate> {
        self.node_for_node_index(node_index)?
            .sub_node_by_node_index(node_index)
    }

    pub fn estimator(&self) -> &FileSizeEstimator {
        &self.estimator
    }

    pub fn estimator_mut(&mut self) -> &mut FileSizeEstimator {
        &mut self.estimator
    }

    /// Split borrow used while flashing
    pub fn nodes_and_estimator_mut(&mut self) -> (&mut [NodeAggregate], &mut FileSizeEstimator) {
        (&mut self.nodes, &mut self.estimator)
    }

    /// Seconds left for nodes not yet flashed, `None` without a rate sample
    pub fn estimated_time_s(&self) -> Option<u64> {
        self.estimator.estimated_time_s()
    }

    /// Clear the flash outcome of every node for a retry
    pub fn reset_update_status(&mut self) {
        for node in &mut self.nodes {
            node.reset_update_status();
        }
    }

    pub fn summaries(&self) -> Vec<NodeSummary> {
        self.nodes
            .iter()
            .map(|node| NodeSummary {
                name: node.name().to_string(),
                node_indices: node.node_indices(),
                active_sub_nodes: node.sub_nodes().filter(|s| s.is_active()).count(),
                sub_node_count: node.sub_node_count(),
                initial_status: node.overall_initial_state(),
                update_status: node.overall_update_state(),
                file_bytes: node
                    .node_indices()
                    .into_iter()
                    .filter_map(|i| self.estimator.node_files_size(i))
                    .sum(),
                discarded: node.is_discarded(),
            })
            .collect()
    }
}
