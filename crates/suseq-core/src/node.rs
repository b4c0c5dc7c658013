//! Logical node made of one or more sub-nodes
//!
//! A multi-CPU device shows up as one logical node whose sub-nodes are
//! flashed one after another. The node status is a reduction over the
//! active sub-nodes (see [`OverallStatus::reduce`]).

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{TrackerError, TrackerResult};
use crate::node_states::{NodeConnectState, NodeUpdateState, PreconditionErrors};
use crate::status::OverallStatus;
use crate::sub_node::SubNodeAggregate;

/// Aggregated state of one logical node
#[derive(Debug, Clone, Serialize)]
pub struct NodeAggregate {
    name: String,
    sub_nodes: Vec<SubNodeAggregate>,
    connect_in_progress: bool,
    is_connected: bool,
    update_in_progress: bool,
}

impl NodeAggregate {
    /// Create a node from its sub-nodes (at least one)
    pub fn new(name: impl Into<String>, sub_nodes: Vec<SubNodeAggregate>) -> TrackerResult<Self> {
        let name = name.into();
        if sub_nodes.is_empty() {
            return Err(TrackerError::TopologyMismatch(format!(
                "node '{}' has no sub-nodes",
                name
            )));
        }
        Ok(Self {
            name,
            sub_nodes,
            connect_in_progress: false,
            is_connected: false,
            update_in_progress: false,
        })
    }

    /// Create a node with a single device
    pub fn single(sub_node: SubNodeAggregate) -> Self {
        Self {
            name: sub_node.name().to_string(),
            sub_nodes: vec![sub_node],
            connect_in_progress: false,
            is_connected: false,
            update_in_progress: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // =========================================================================
    // Sub-node access
    // =========================================================================

    pub fn sub_node_count(&self) -> usize {
        self.sub_nodes.len()
    }

    pub fn sub_nodes(&self) -> impl Iterator<Item = &SubNodeAggregate> {
        self.sub_nodes.iter()
    }

    /// Sub-node at position `index`
    pub fn sub_node_by_sub_node_index(&self, index: usize) -> Option<&SubNodeAggregate> {
        self.sub_nodes.get(index)
    }

    pub fn sub_node_by_sub_node_index_mut(&mut self, index: usize) -> Option<&mut SubNodeAggregate> {
        self.sub_nodes.get_mut(index)
    }

    /// Sub-node carrying the system node index
    pub fn sub_node_by_node_index(&self, node_index: u32) -> Option<&SubNodeAggregate> {
        self.sub_nodes.iter().find(|s| s.node_index() == node_index)
    }

    pub fn sub_node_by_node_index_mut(&mut self, node_index: u32) -> Option<&mut SubNodeAggregate> {
        self.sub_nodes
            .iter_mut()
            .find(|s| s.node_index() == node_index)
    }

    pub fn contains_node_index(&self, node_index: u32) -> bool {
        self.sub_node_by_node_index(node_index).is_some()
    }

    /// System node indices in sub-node order
    pub fn node_indices(&self) -> Vec<u32> {
        self.sub_nodes.iter().map(SubNodeAggregate::node_index).collect()
    }

    fn active_sub_nodes(&self) -> impl Iterator<Item = &SubNodeAggregate> {
        self.sub_nodes.iter().filter(|s| s.is_active())
    }

    fn sub_node_mut_checked(&mut self, node_index: u32) -> TrackerResult<&mut SubNodeAggregate> {
        self.sub_node_by_node_index_mut(node_index)
            .ok_or(TrackerError::UnknownNodeIndex(node_index))
    }

    pub fn set_sub_node_active(&mut self, index: usize, active: bool) -> TrackerResult<()> {
        let count = self.sub_nodes.len();
        let sub = self
            .sub_nodes
            .get_mut(index)
            .ok_or(TrackerError::SubNodeIndexOutOfRange { index, count })?;
        sub.set_active(active);
        Ok(())
    }

    pub fn is_sub_node_active(&self, index: usize) -> bool {
        self.sub_nodes.get(index).is_some_and(|s| s.is_active())
    }

    // =========================================================================
    // Node-level flags
    // =========================================================================

    pub fn set_connect_in_progress(&mut self, active: bool) {
        self.connect_in_progress = active;
    }

    pub fn is_connect_in_progress(&self) -> bool {
        self.connect_in_progress
    }

    /// Set the connected flag of the node and every sub-node
    pub fn set_connected(&mut self, active: bool) {
        self.is_connected = active;
        for sub in &mut self.sub_nodes {
            sub.set_connected(active);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.is_connected
    }

    /// Set the updating flag of the node and every sub-node
    pub fn set_updating(&mut self, active: bool) {
        self.update_in_progress = active;
        for sub in &mut self.sub_nodes {
            sub.set_updating(active);
        }
    }

    pub fn is_update_in_progress(&self) -> bool {
        self.update_in_progress
    }

    /// Forward start/end of the flash phase to the addressed sub-node
    pub fn set_node_update_in_progress(
        &mut self,
        node_index: u32,
        active: bool,
        aborted: bool,
        failed_application_index: u32,
    ) -> TrackerResult<()> {
        self.sub_node_mut_checked(node_index)?
            .set_node_update_in_progress(active, aborted, failed_application_index);
        Ok(())
    }

    /// Put the addressed sub-node into error state
    pub fn set_error_state(&mut self, node_index: u32) -> TrackerResult<()> {
        self.sub_node_mut_checked(node_index)?.set_error_state();
        Ok(())
    }

    // =========================================================================
    // Snapshot fan-out
    // =========================================================================

    fn check_len(&self, what: &'static str, actual: usize) -> TrackerResult<()> {
        let expected = self.sub_nodes.len();
        if expected != actual {
            warn!(node = %self.name, what, expected, actual, "Rejected sub-node vector");
            return Err(TrackerError::LengthMismatch {
                what,
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Hand entry `k` of both vectors to sub-node `k`.
    ///
    /// Both vectors must have exactly one entry per sub-node; nothing is
    /// applied otherwise.
    pub fn set_node_connect_states(
        &mut self,
        states: Vec<NodeConnectState>,
        precondition_errors: Vec<PreconditionErrors>,
    ) -> TrackerResult<()> {
        self.check_len("connect states", states.len())?;
        self.check_len("precondition errors", precondition_errors.len())?;
        for ((sub, state), errors) in self
            .sub_nodes
            .iter_mut()
            .zip(states)
            .zip(precondition_errors)
        {
            sub.set_node_connect_states(state, errors);
        }
        debug!(node = %self.name, "Connect states applied");
        Ok(())
    }

    /// Hand entry `k` to sub-node `k`; the vector must match the sub-node count
    pub fn set_node_update_states(&mut self, states: Vec<NodeUpdateState>) -> TrackerResult<()> {
        self.check_len("update states", states.len())?;
        for (sub, state) in self.sub_nodes.iter_mut().zip(states) {
            sub.set_node_update_states(state);
        }
        debug!(node = %self.name, "Update states applied");
        Ok(())
    }

    // =========================================================================
    // Roll-up
    // =========================================================================

    /// Connect phase status over all active sub-nodes
    pub fn overall_initial_state(&self) -> OverallStatus {
        OverallStatus::reduce(self.active_sub_nodes().map(SubNodeAggregate::initial_status))
    }

    /// Flash phase status over all active sub-nodes
    pub fn overall_update_state(&self) -> OverallStatus {
        OverallStatus::reduce(self.active_sub_nodes().map(SubNodeAggregate::update_status))
    }

    pub fn has_available_flashloader(&self) -> bool {
        self.active_sub_nodes()
            .any(SubNodeAggregate::has_available_flashloader)
    }

    pub fn is_there_any_hex_file_information(&self) -> bool {
        self.active_sub_nodes()
            .any(SubNodeAggregate::is_there_any_hex_file_information)
    }

    pub fn check_always_update(&self) -> bool {
        self.active_sub_nodes()
            .any(SubNodeAggregate::check_always_update)
    }

    /// Every active sub-node has nothing to update
    pub fn check_update_disabled_state(&self) -> bool {
        self.active_sub_nodes()
            .all(SubNodeAggregate::check_update_disabled_state)
    }

    // =========================================================================
    // Discard / retry
    // =========================================================================

    pub fn discard_info(&mut self) {
        for sub in &mut self.sub_nodes {
            sub.discard_info();
        }
    }

    /// Any active sub-node was discarded
    pub fn is_discarded(&self) -> bool {
        self.active_sub_nodes().any(SubNodeAggregate::is_discarded)
    }

    /// Clear flash phase results of every sub-node for a retry
    pub fn reset_update_status(&mut self) {
        self.update_in_progress = false;
        for sub in &mut self.sub_nodes {
            sub.reset_update_status();
        }
    }

    // =========================================================================
    // Transplant across a rebuilt model
    // =========================================================================

    fn check_same_topology(&self, target: &NodeAggregate) -> TrackerResult<()> {
        if self.node_indices() != target.node_indices() {
            return Err(TrackerError::TopologyMismatch(format!(
                "node '{}' {:?} vs node '{}' {:?}",
                self.name,
                self.node_indices(),
                target.name,
                target.node_indices()
            )));
        }
        Ok(())
    }

    fn copy_each(
        &self,
        target: &mut NodeAggregate,
        copy: fn(&SubNodeAggregate, &mut SubNodeAggregate),
    ) -> TrackerResult<()> {
        self.check_same_topology(target)?;
        for (source, dest) in self.sub_nodes.iter().zip(target.sub_nodes.iter_mut()) {
            copy(source, dest);
        }
        Ok(())
    }

    /// Copy connect results of every sub-node and the node connect flags
    pub fn copy_initial_status(&self, target: &mut NodeAggregate) -> TrackerResult<()> {
        self.copy_each(target, SubNodeAggregate::copy_initial_status)?;
        target.connect_in_progress = self.connect_in_progress;
        target.is_connected = self.is_connected;
        Ok(())
    }

    /// Copy flash results of every sub-node and the node update flag
    pub fn copy_update_status(&self, target: &mut NodeAggregate) -> TrackerResult<()> {
        self.copy_each(target, SubNodeAggregate::copy_update_status)?;
        target.update_in_progress = self.update_in_progress;
        Ok(())
    }

    pub fn copy_device_info(&self, target: &mut NodeAggregate) -> TrackerResult<()> {
        self.copy_each(target, SubNodeAggregate::copy_device_info)
    }

    pub fn copy_discarded_status(&self, target: &mut NodeAggregate) -> TrackerResult<()> {
        self.copy_each(target, SubNodeAggregate::copy_discarded_status)
    }
}
