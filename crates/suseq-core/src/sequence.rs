//! Reference sequence driver
//!
//! Walks the connect and flash phases of every node in protocol order and
//! pushes snapshots into the aggregates after each step, the way a real
//! update engine reports its progress. The outcome of each device is
//! scripted, so the driver performs no I/O.
//!
//! # Order
//!
//! ```text
//! connect all nodes ──(any connect failure)──▶ stop
//!        │
//!        ▼
//! for each node, for each active sub-node:
//!   openSYDE: hex files → other files → parameter sets → PEM file
//!   STW:      hex files
//!        │
//!        └──(step fails)──▶ abort run, record failed file index
//! ```
//!
//! Within a file, steps run in declaration order and stop at the first
//! error, so transfer steps never succeed ahead of their preconditions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::device_info::{DeviceIdentity, FlashloaderProtocol};
use crate::error::TrackerResult;
use crate::estimator::FileSizeEstimator;
use crate::node::NodeAggregate;
use crate::node_states::{
    BaseNodeFlags, FeatureSet, NodeConnectState, NodeUpdateState, PreconditionErrors,
};
use crate::overview::UpdateOverview;
use crate::package::{PackageFileKind, PemFile, UpdateInfo};
use crate::progress::{
    HexFileState, OtherFileState, PemFileState, ProgressState, PsiFileState, StwFlHexFileState,
};
use crate::status::OverallStatus;
use crate::sub_node::SubNodeAggregate;

/// Step that fails during the flash phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailAt {
    /// File position: hex, other and parameter files in package order, PEM last
    pub file: usize,
    /// Step position within the file record, `file_exists` being 0
    pub step: usize,
}

/// Scripted behaviour of one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptedOutcome {
    /// System node index of the device
    pub node_index: u32,
    #[serde(default)]
    pub timeout: bool,
    #[serde(default)]
    pub authentication_error: bool,
    #[serde(default)]
    pub authentication_required: bool,
    #[serde(default)]
    pub unreachable_due_to_routing_error: bool,
    #[serde(default)]
    pub routing_node_failed: bool,
    /// Device is reached through an Ethernet-to-Ethernet router
    #[serde(default)]
    pub requires_eth_to_eth_routing: bool,
    /// Capabilities reported by an openSYDE device
    #[serde(default = "FeatureSet::all")]
    pub features: FeatureSet,
    /// Identity reported by the device
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceIdentity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_at: Option<FailAt>,
    /// Transfer duration reported to the estimator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
}

impl ScriptedOutcome {
    /// Device that behaves well in every step
    pub fn success(node_index: u32) -> Self {
        Self {
            node_index,
            timeout: false,
            authentication_error: false,
            authentication_required: false,
            unreachable_due_to_routing_error: false,
            routing_node_failed: false,
            requires_eth_to_eth_routing: false,
            features: FeatureSet::all(),
            device: None,
            fail_at: None,
            elapsed_ms: None,
        }
    }

    fn connect_flags(&self) -> BaseNodeFlags {
        BaseNodeFlags {
            timed_out: self.timeout,
            authentication_error: self.authentication_error,
            unreachable_due_to_routing_error: self.unreachable_due_to_routing_error,
            is_routing_node_and_failed: self.routing_node_failed,
        }
    }
}

/// How a driven run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RunResult {
    /// Every flashable sub-node was updated
    Completed,
    /// Connect phase failed, nothing was flashed
    ConnectFailed { node_indices: Vec<u32> },
    /// A file step failed and the run stopped
    Aborted {
        node_index: u32,
        failed_application_index: u32,
    },
}

/// Package requirements the device cannot satisfy
pub fn check_preconditions(
    features: FeatureSet,
    update_info: &UpdateInfo,
    requires_eth_to_eth_routing: bool,
) -> PreconditionErrors {
    let has_parameter_sets = update_info
        .active_files(PackageFileKind::Parameter)
        .next()
        .is_some();
    let pem = update_info.active_pem_file();
    PreconditionErrors {
        nvm_write_error: has_parameter_sets && !features.contains(FeatureSet::CAN_WRITE_TO_NVM),
        pem_write_error: pem.is_some() && !features.contains(FeatureSet::SUPPORTS_SECURITY),
        debugger_enable_error: pem.and_then(|p| p.debugger_enabled) == Some(true)
            && !features.contains(FeatureSet::SUPPORTS_DEBUGGER_ON),
        debugger_disable_error: pem.and_then(|p| p.debugger_enabled) == Some(false)
            && !features.contains(FeatureSet::SUPPORTS_DEBUGGER_OFF),
        eth_to_eth_routing_error: requires_eth_to_eth_routing
            && !features.contains(FeatureSet::ETHERNET_TO_ETHERNET_ROUTING),
    }
}

// =============================================================================
// Step addressing
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileSlot {
    Hex(usize),
    Other(usize),
    Psi(usize),
    StwHex(usize),
    Pem,
}

impl FileSlot {
    fn step_count(&self) -> usize {
        match self {
            FileSlot::Hex(_) => 9,
            FileSlot::Other(_) => 6,
            FileSlot::Psi(_) => 3,
            FileSlot::StwHex(_) => 3,
            FileSlot::Pem => 6,
        }
    }
}

fn step_mut(state: &mut NodeUpdateState, slot: FileSlot, step: usize) -> Option<&mut ProgressState> {
    let value = match slot {
        FileSlot::Hex(i) => {
            let f = state.hex_files.get_mut(i)?;
            match step {
                0 => &mut f.file.file_exists,
                1 => &mut f.file.file_loaded,
                2 => &mut f.signature_block_address_read,
                3 => &mut f.node_name_compared,
                4 => &mut f.data_dump_read,
                5 => &mut f.available_flash_memory_checked,
                6 => &mut f.request_download_sent,
                7 => &mut f.all_transfer_data_sent,
                8 => &mut f.request_transfer_address_exit_sent,
                _ => return None,
            }
        }
        FileSlot::Other(i) => {
            let f = state.other_files.get_mut(i)?;
            match step {
                0 => &mut f.file.file_exists,
                1 => &mut f.file.file_loaded,
                2 => &mut f.request_file_transfer_sent,
                3 => &mut f.all_transfer_data_sent,
                4 => &mut f.request_transfer_file_exit_sent,
                5 => &mut f.request_transfer_file_exit_result_sent,
                _ => return None,
            }
        }
        FileSlot::Psi(i) => {
            let f = state.psi_files.get_mut(i)?;
            match step {
                0 => &mut f.file.file_exists,
                1 => &mut f.file.file_loaded,
                2 => &mut f.psi_file_written,
                _ => return None,
            }
        }
        FileSlot::StwHex(i) => {
            let f = state.stw_fl_hex_files.get_mut(i)?;
            match step {
                0 => &mut f.file.file_exists,
                1 => &mut f.file.file_loaded,
                2 => &mut f.file_sent,
                _ => return None,
            }
        }
        FileSlot::Pem => {
            let f = &mut state.pem_file;
            match step {
                0 => &mut f.file.file_exists,
                1 => &mut f.file.file_loaded,
                2 => &mut f.pem_file_extracted,
                3 => &mut f.security_key_sent,
                4 => &mut f.security_flag_sent,
                5 => &mut f.debugger_flag_sent,
                _ => return None,
            }
        }
    };
    Some(value)
}

/// Value a successful step records
fn planned_value(slot: FileSlot, step: usize, features: FeatureSet, pem: Option<&PemFile>) -> ProgressState {
    match (slot, step) {
        (FileSlot::Other(_), 5) if !features.contains(FeatureSet::FILE_TRANSFER_EXIT_RESULT) => {
            ProgressState::NotNeeded
        }
        (FileSlot::Pem, 4) if pem.and_then(|p| p.security_enabled).is_none() => {
            ProgressState::NotNeeded
        }
        (FileSlot::Pem, 5) if pem.and_then(|p| p.debugger_enabled).is_none() => {
            ProgressState::NotNeeded
        }
        _ => ProgressState::Ok,
    }
}

/// Empty snapshot and file order for the package of a sub-node
fn plan_update(sub: &SubNodeAggregate) -> (NodeUpdateState, Vec<FileSlot>) {
    let info = sub.update_info();
    let mut state = NodeUpdateState {
        pem_file: PemFileState::not_needed(),
        ..Default::default()
    };
    let mut slots = Vec::new();

    match sub.flashloader() {
        Some(FlashloaderProtocol::OpenSyde) => {
            for f in info.active_files(PackageFileKind::Hex) {
                slots.push(FileSlot::Hex(state.hex_files.len()));
                state.hex_files.push(HexFileState::new(f.path.as_str()));
            }
            for f in info.active_files(PackageFileKind::Other) {
                slots.push(FileSlot::Other(state.other_files.len()));
                state.other_files.push(OtherFileState::new(f.path.as_str()));
            }
            for f in info.active_files(PackageFileKind::Parameter) {
                slots.push(FileSlot::Psi(state.psi_files.len()));
                state.psi_files.push(PsiFileState::new(f.path.as_str()));
            }
            if let Some(pem) = info.active_pem_file() {
                state.pem_file = PemFileState::new(pem.path.as_str());
                slots.push(FileSlot::Pem);
            }
        }
        Some(FlashloaderProtocol::StwFlashloader) => {
            for f in info.active_files(PackageFileKind::Hex) {
                slots.push(FileSlot::StwHex(state.stw_fl_hex_files.len()));
                state
                    .stw_fl_hex_files
                    .push(StwFlHexFileState::new(f.path.as_str()));
            }
        }
        None => {}
    }
    (state, slots)
}

// =============================================================================
// Driver
// =============================================================================

/// Drives scripted update runs over node aggregates
#[derive(Debug, Clone, Default)]
pub struct SequenceDriver {
    outcomes: BTreeMap<u32, ScriptedOutcome>,
}

impl SequenceDriver {
    pub fn new(outcomes: impl IntoIterator<Item = ScriptedOutcome>) -> Self {
        Self {
            outcomes: outcomes
                .into_iter()
                .map(|o| (o.node_index, o))
                .collect(),
        }
    }

    /// Scripted outcome of a device, all-success if none was given
    pub fn outcome_for(&self, node_index: u32) -> ScriptedOutcome {
        self.outcomes
            .get(&node_index)
            .cloned()
            .unwrap_or_else(|| ScriptedOutcome::success(node_index))
    }

    /// Run the connect phase of one node
    pub fn connect_node(&self, node: &mut NodeAggregate) -> TrackerResult<()> {
        node.set_connect_in_progress(true);
        node.set_connected(true);

        let mut states = Vec::with_capacity(node.sub_node_count());
        let mut errors = Vec::with_capacity(node.sub_node_count());
        let mut device_infos = Vec::with_capacity(node.sub_node_count());

        for sub in node.sub_nodes() {
            if !sub.is_active() || !sub.has_available_flashloader() {
                states.push(NodeConnectState::default());
                errors.push(PreconditionErrors::default());
                device_infos.push(None);
                continue;
            }
            let outcome = self.outcome_for(sub.node_index());
            let is_osy = sub.flashloader() == Some(FlashloaderProtocol::OpenSyde);
            let flags = outcome.connect_flags();

            let mut state = NodeConnectState {
                flags,
                ..Default::default()
            };
            if is_osy {
                state.authentication_necessary_checked = !outcome.timeout;
                state.authentication_necessary = outcome.authentication_required;
            }
            if flags.any() {
                state.information_read = ProgressState::Error;
                errors.push(PreconditionErrors::default());
                device_infos.push(None);
            } else {
                state.information_read = ProgressState::Ok;
                let precondition_errors = if is_osy {
                    state.available_features = outcome.features;
                    check_preconditions(
                        outcome.features,
                        sub.update_info(),
                        outcome.requires_eth_to_eth_routing,
                    )
                } else {
                    PreconditionErrors::default()
                };
                errors.push(precondition_errors);
                let mut info = sub.update_info().to_device_info();
                info.identity = outcome.device.clone();
                device_infos.push(Some(info));
            }
            debug!(
                node_index = sub.node_index(),
                information_read = %state.information_read,
                "Connect step done"
            );
            states.push(state);
        }

        node.set_node_connect_states(states, errors)?;
        for (index, info) in device_infos.into_iter().enumerate() {
            if let (Some(info), Some(sub)) = (info, node.sub_node_by_sub_node_index_mut(index)) {
                sub.set_device_info(info);
            }
        }
        node.set_connect_in_progress(false);
        Ok(())
    }

    /// Run the flash phase of one node.
    ///
    /// `on_checkpoint` sees the node after every recorded step. Returns the
    /// abort position if a step failed.
    pub fn update_node<F>(
        &self,
        node: &mut NodeAggregate,
        estimator: &mut FileSizeEstimator,
        mut on_checkpoint: F,
    ) -> TrackerResult<Option<(u32, u32)>>
    where
        F: FnMut(&NodeAggregate),
    {
        node.set_updating(true);
        let result = self.flash_sub_nodes(node, estimator, &mut on_checkpoint);
        node.set_updating(false);
        result
    }

    fn flash_sub_nodes<F>(
        &self,
        node: &mut NodeAggregate,
        estimator: &mut FileSizeEstimator,
        on_checkpoint: &mut F,
    ) -> TrackerResult<Option<(u32, u32)>>
    where
        F: FnMut(&NodeAggregate),
    {
        // Snapshots of all sub-nodes; pushed as a whole at each checkpoint
        let mut snapshots: Vec<NodeUpdateState> = node
            .sub_nodes()
            .map(|s| s.node_update_states().cloned().unwrap_or_default())
            .collect();
        let mut aborted = None;

        for index in 0..node.sub_node_count() {
            let Some(sub) = node.sub_node_by_sub_node_index(index) else {
                break;
            };
            if !sub.is_active()
                || !sub.has_available_flashloader()
                || sub.check_update_disabled_state()
            {
                continue;
            }
            let node_index = sub.node_index();
            let outcome = self.outcome_for(node_index);
            let features = sub
                .node_connect_states()
                .map(|s| s.available_features)
                .unwrap_or_default();
            let pem = sub.update_info().active_pem_file().cloned();
            let (plan, slots) = plan_update(sub);

            info!(node_index, files = slots.len(), "Flashing sub-node");
            snapshots[index] = plan;
            node.set_node_update_in_progress(node_index, true, false, 0)?;
            node.set_node_update_states(snapshots.clone())?;
            on_checkpoint(node);

            'files: for (file_position, slot) in slots.iter().enumerate() {
                for step in 0..slot.step_count() {
                    let fails = outcome.fail_at == Some(FailAt {
                        file: file_position,
                        step,
                    });
                    let value = if fails {
                        ProgressState::Error
                    } else {
                        planned_value(*slot, step, features, pem.as_ref())
                    };
                    if let Some(target) = step_mut(&mut snapshots[index], *slot, step) {
                        *target = value;
                    }
                    node.set_node_update_states(snapshots.clone())?;
                    on_checkpoint(node);

                    if fails {
                        aborted = Some((node_index, file_position as u32));
                        break 'files;
                    }
                }
            }

            match aborted {
                Some((node_index, failed_file)) => {
                    warn!(node_index, failed_file, "Update step failed");
                    node.set_node_update_in_progress(node_index, false, true, failed_file)?;
                    on_checkpoint(node);
                    break;
                }
                None => {
                    node.set_node_update_in_progress(node_index, false, false, 0)?;
                    if let Some(elapsed_ms) = outcome.elapsed_ms {
                        if let Err(e) = estimator.set_elapsed_time_for_node(node_index, elapsed_ms) {
                            warn!(node_index, error = %e, "Transfer time not recorded");
                        }
                    }
                    on_checkpoint(node);
                }
            }
        }
        Ok(aborted)
    }

    /// Run connect and flash phases over every node of the overview
    pub fn run(&self, overview: &mut UpdateOverview) -> TrackerResult<RunResult> {
        self.run_with(overview, |_| {})
    }

    /// Like [`SequenceDriver::run`], calling `on_checkpoint` after every step
    pub fn run_with<F>(&self, overview: &mut UpdateOverview, mut on_checkpoint: F) -> TrackerResult<RunResult>
    where
        F: FnMut(&NodeAggregate),
    {
        for node in overview.nodes_mut() {
            self.connect_node(node)?;
            on_checkpoint(node);
        }

        let failed: Vec<u32> = overview
            .nodes()
            .filter(|n| {
                matches!(
                    n.overall_initial_state(),
                    OverallStatus::Failed | OverallStatus::Invalid
                )
            })
            .flat_map(|n| {
                n.sub_nodes()
                    .filter(|s| s.is_active())
                    .filter(|s| {
                        s.node_connect_states().is_some_and(|c| c.has_error())
                            || s.precondition_errors().any()
                            || !s.valid_status()
                    })
                    .map(SubNodeAggregate::node_index)
                    .collect::<Vec<_>>()
            })
            .collect();
        if !failed.is_empty() {
            warn!(?failed, "Connect phase failed, update not started");
            return Ok(RunResult::ConnectFailed {
                node_indices: failed,
            });
        }

        let (nodes, estimator) = overview.nodes_and_estimator_mut();
        for node in nodes {
            if let Some((node_index, failed_application_index)) =
                self.update_node(node, estimator, &mut on_checkpoint)?
            {
                return Ok(RunResult::Aborted {
                    node_index,
                    failed_application_index,
                });
            }
        }
        info!("Update run completed");
        Ok(RunResult::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::PackageFile;

    fn osy_package() -> UpdateInfo {
        UpdateInfo {
            files: vec![
                PackageFile::new("app.hex", PackageFileKind::Hex, 1000),
                PackageFile::new("data.bin", PackageFileKind::Other, 200),
                PackageFile::new("set.psi_syde", PackageFileKind::Parameter, 50),
            ],
            pem_file: Some(PemFile {
                path: "dev.pem".to_string(),
                security_enabled: Some(true),
                debugger_enabled: None,
                skip_update: false,
            }),
        }
    }

    fn osy_node() -> NodeAggregate {
        NodeAggregate::single(
            SubNodeAggregate::new(1, "ESX3CM", Some(FlashloaderProtocol::OpenSyde))
                .with_update_info(osy_package()),
        )
    }

    #[test]
    fn test_check_preconditions() {
        let package = osy_package();
        assert!(!check_preconditions(FeatureSet::all(), &package, true).any());

        let errors = check_preconditions(FeatureSet::empty(), &package, true);
        assert!(errors.nvm_write_error);
        assert!(errors.pem_write_error);
        assert!(!errors.debugger_enable_error);
        assert!(!errors.debugger_disable_error);
        assert!(errors.eth_to_eth_routing_error);
    }

    #[test]
    fn test_connect_success() {
        let driver = SequenceDriver::default();
        let mut node = osy_node();
        driver.connect_node(&mut node).unwrap();

        let sub = node.sub_node_by_sub_node_index(0).unwrap();
        let state = sub.node_connect_states().unwrap();
        assert_eq!(state.information_read, ProgressState::Ok);
        assert!(state.authentication_necessary_checked);
        assert_eq!(state.available_features, FeatureSet::all());
        assert!(sub.is_there_any_hex_file_information());
        assert!(!node.is_connect_in_progress());
        assert_eq!(node.overall_initial_state(), OverallStatus::Success);
    }

    #[test]
    fn test_connect_timeout() {
        let driver = SequenceDriver::new([ScriptedOutcome {
            timeout: true,
            ..ScriptedOutcome::success(1)
        }]);
        let mut node = osy_node();
        driver.connect_node(&mut node).unwrap();

        let sub = node.sub_node_by_node_index(1).unwrap();
        let state = sub.node_connect_states().unwrap();
        assert!(state.flags.timed_out);
        assert_eq!(state.information_read, ProgressState::Error);
        assert!(!state.authentication_necessary_checked);
        assert!(sub.device_info().is_none());
        assert_eq!(node.overall_initial_state(), OverallStatus::Failed);
    }

    #[test]
    fn test_update_all_files() {
        let driver = SequenceDriver::new([ScriptedOutcome {
            elapsed_ms: Some(250),
            ..ScriptedOutcome::success(1)
        }]);
        let mut node = osy_node();
        let mut estimator = FileSizeEstimator::default();
        estimator.append_files(1, &[1000, 200], &[50]).unwrap();

        driver.connect_node(&mut node).unwrap();
        let mut checkpoints = 0;
        let aborted = driver
            .update_node(&mut node, &mut estimator, |_| checkpoints += 1)
            .unwrap();
        assert_eq!(aborted, None);
        // start + 9 + 6 + 3 + 6 steps + finish
        assert_eq!(checkpoints, 26);

        let sub = node.sub_node_by_node_index(1).unwrap();
        let state = sub.node_update_states().unwrap();
        assert!(state.is_terminal());
        assert!(!state.has_error());
        assert_eq!(state.pem_file.security_flag_sent, ProgressState::Ok);
        assert_eq!(state.pem_file.debugger_flag_sent, ProgressState::NotNeeded);
        assert_eq!(node.overall_update_state(), OverallStatus::Success);
        assert!(!node.is_update_in_progress());
        assert_eq!(estimator.rate_for_node(1), Some(5.0));
    }

    #[test]
    fn test_update_abort() {
        let driver = SequenceDriver::new([ScriptedOutcome {
            fail_at: Some(FailAt { file: 1, step: 3 }),
            ..ScriptedOutcome::success(1)
        }]);
        let mut node = osy_node();
        let mut estimator = FileSizeEstimator::default();
        driver.connect_node(&mut node).unwrap();
        let aborted = driver.update_node(&mut node, &mut estimator, |_| {}).unwrap();
        assert_eq!(aborted, Some((1, 1)));

        let sub = node.sub_node_by_node_index(1).unwrap();
        assert_eq!(sub.failed_application_index(), Some(1));
        let state = sub.node_update_states().unwrap();
        assert_eq!(state.other_files[0].all_transfer_data_sent, ProgressState::Error);
        assert_eq!(
            state.other_files[0].request_transfer_file_exit_sent,
            ProgressState::NotExecuted
        );
        assert_eq!(state.psi_files[0].psi_file_written, ProgressState::NotExecuted);
        assert_eq!(node.overall_update_state(), OverallStatus::Failed);
    }

    #[test]
    fn test_stw_flashloader_uses_reduced_model() {
        let mut node = NodeAggregate::single(
            SubNodeAggregate::new(2, "legacy", Some(FlashloaderProtocol::StwFlashloader))
                .with_update_info(osy_package()),
        );
        let driver = SequenceDriver::default();
        let mut estimator = FileSizeEstimator::default();
        driver.connect_node(&mut node).unwrap();
        driver.update_node(&mut node, &mut estimator, |_| {}).unwrap();

        let sub = node.sub_node_by_node_index(2).unwrap();
        let connect = sub.node_connect_states().unwrap();
        assert!(!connect.authentication_necessary_checked);
        assert!(connect.available_features.is_empty());

        let state = sub.node_update_states().unwrap();
        assert_eq!(state.stw_fl_hex_files.len(), 1);
        assert!(state.hex_files.is_empty());
        assert!(state.other_files.is_empty());
        assert_eq!(state.stw_fl_hex_files[0].file_sent, ProgressState::Ok);
    }
}
