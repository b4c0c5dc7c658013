//! State of one physical flashable device
//!
//! A `SubNodeAggregate` is owned by the orchestration driver and mutated only
//! through the setters below. Pollers read it through shared references.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::device_info::{DeviceInfo, FlashloaderProtocol};
use crate::node_states::{NodeConnectState, NodeUpdateState, PreconditionErrors};
use crate::package::{PackageFileKind, UpdateInfo};
use crate::progress::ProgressState;
use crate::status::SubNodeStatus;

/// Connect and update state of one sub-node
#[derive(Debug, Clone, Serialize)]
pub struct SubNodeAggregate {
    /// System-wide node index of the device
    node_index: u32,
    /// Display name of the device
    name: String,
    /// Flashloader of the device, `None` if it cannot be updated
    flashloader: Option<FlashloaderProtocol>,
    /// Sub-node takes part in the current run
    active: bool,

    connected: bool,
    updating: bool,
    update_in_progress: bool,
    update_failed: bool,
    update_success: bool,
    valid_status: bool,
    discarded: bool,
    /// Index of the file that failed, only set after an abort
    failed_application_index: Option<u32>,

    connect_states: Option<NodeConnectState>,
    precondition_errors: PreconditionErrors,
    update_states: Option<NodeUpdateState>,

    device_info: Option<DeviceInfo>,
    update_info: UpdateInfo,
}

impl SubNodeAggregate {
    /// Create an active sub-node with nothing recorded yet
    pub fn new(
        node_index: u32,
        name: impl Into<String>,
        flashloader: Option<FlashloaderProtocol>,
    ) -> Self {
        Self {
            node_index,
            name: name.into(),
            flashloader,
            active: true,
            connected: false,
            updating: false,
            update_in_progress: false,
            update_failed: false,
            update_success: false,
            valid_status: true,
            discarded: false,
            failed_application_index: None,
            connect_states: None,
            precondition_errors: PreconditionErrors::default(),
            update_states: None,
            device_info: None,
            update_info: UpdateInfo::default(),
        }
    }

    /// Attach the planned package files
    pub fn with_update_info(mut self, update_info: UpdateInfo) -> Self {
        self.update_info = update_info;
        self
    }

    pub fn node_index(&self) -> u32 {
        self.node_index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flashloader(&self) -> Option<FlashloaderProtocol> {
        self.flashloader
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Include or exclude the sub-node from status roll-up
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    // =========================================================================
    // Flag setters
    // =========================================================================

    pub fn set_connected(&mut self, active: bool) {
        self.connected = active;
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn set_updating(&mut self, active: bool) {
        self.updating = active;
    }

    pub fn is_updating(&self) -> bool {
        self.updating
    }

    /// Record start or end of the flash phase.
    ///
    /// Starting (`active == true`) begins a new run and resets the outcome of
    /// the previous one. Ending records failure and `failed_application_index`
    /// if `aborted`, success otherwise.
    pub fn set_node_update_in_progress(
        &mut self,
        active: bool,
        aborted: bool,
        failed_application_index: u32,
    ) {
        if active {
            debug!(node_index = self.node_index, "Update started");
            self.update_in_progress = true;
            self.update_failed = false;
            self.update_success = false;
            self.failed_application_index = None;
        } else {
            self.update_in_progress = false;
            if aborted {
                warn!(
                    node_index = self.node_index,
                    failed_application_index, "Update aborted"
                );
                self.update_failed = true;
                self.update_success = false;
                self.failed_application_index = Some(failed_application_index);
            } else {
                info!(node_index = self.node_index, "Update finished");
                self.update_success = true;
                self.update_failed = false;
                self.failed_application_index = None;
            }
        }
    }

    /// Mark the recorded information invalid. Idempotent.
    ///
    /// Per-file states stay as recorded.
    pub fn set_error_state(&mut self) {
        if self.valid_status {
            warn!(node_index = self.node_index, "Sub-node set to error state");
        }
        self.valid_status = false;
        self.update_success = false;
    }

    /// Replace the connect snapshot
    pub fn set_node_connect_states(
        &mut self,
        state: NodeConnectState,
        precondition_errors: PreconditionErrors,
    ) {
        if state.has_error() || precondition_errors.any() {
            debug!(
                node_index = self.node_index,
                flags = ?state.flags,
                ?precondition_errors,
                "Connect states report errors"
            );
        }
        self.connect_states = Some(state);
        self.precondition_errors = precondition_errors;
    }

    /// Replace the update snapshot
    pub fn set_node_update_states(&mut self, state: NodeUpdateState) {
        self.update_states = Some(state);
    }

    pub fn is_node_connect_states_set(&self) -> bool {
        self.connect_states.is_some()
    }

    pub fn is_node_update_states_set(&self) -> bool {
        self.update_states.is_some()
    }

    pub fn node_connect_states(&self) -> Option<&NodeConnectState> {
        self.connect_states.as_ref()
    }

    pub fn precondition_errors(&self) -> PreconditionErrors {
        self.precondition_errors
    }

    pub fn node_update_states(&self) -> Option<&NodeUpdateState> {
        self.update_states.as_ref()
    }

    pub fn set_device_info(&mut self, device_info: DeviceInfo) {
        self.device_info = Some(device_info);
    }

    pub fn device_info(&self) -> Option<&DeviceInfo> {
        self.device_info.as_ref()
    }

    pub fn update_info(&self) -> &UpdateInfo {
        &self.update_info
    }

    pub fn set_update_info(&mut self, update_info: UpdateInfo) {
        self.update_info = update_info;
    }

    pub fn valid_status(&self) -> bool {
        self.valid_status
    }

    pub fn is_update_in_progress(&self) -> bool {
        self.update_in_progress
    }

    pub fn update_failed(&self) -> bool {
        self.update_failed
    }

    pub fn update_success(&self) -> bool {
        self.update_success
    }

    pub fn failed_application_index(&self) -> Option<u32> {
        self.failed_application_index
    }

    // =========================================================================
    // Subset copies
    // =========================================================================

    /// Copy connect phase results onto `target`
    pub fn copy_initial_status(&self, target: &mut SubNodeAggregate) {
        target.connected = self.connected;
        target.connect_states = self.connect_states.clone();
        target.precondition_errors = self.precondition_errors;
        target.valid_status = self.valid_status;
    }

    /// Copy flash phase results onto `target`
    pub fn copy_update_status(&self, target: &mut SubNodeAggregate) {
        target.updating = self.updating;
        target.update_in_progress = self.update_in_progress;
        target.update_failed = self.update_failed;
        target.update_success = self.update_success;
        target.failed_application_index = self.failed_application_index;
        target.update_states = self.update_states.clone();
    }

    /// Copy discovered device info onto `target`
    pub fn copy_device_info(&self, target: &mut SubNodeAggregate) {
        target.device_info = self.device_info.clone();
    }

    /// Copy the discarded flag onto `target`
    pub fn copy_discarded_status(&self, target: &mut SubNodeAggregate) {
        target.discarded = self.discarded;
    }

    // =========================================================================
    // Derived queries
    // =========================================================================

    pub fn has_available_flashloader(&self) -> bool {
        self.flashloader.is_some()
    }

    pub fn is_there_any_hex_file_information(&self) -> bool {
        self.device_info
            .as_ref()
            .is_some_and(|info| !info.hex_files.is_empty())
    }

    /// Package contains openSYDE content whose version cannot be compared
    /// with the device (generic files, parameter sets, PEM file), so the
    /// sub-node is updated regardless of its applications.
    pub fn check_always_update(&self) -> bool {
        if self.flashloader != Some(FlashloaderProtocol::OpenSyde) {
            return false;
        }
        self.update_info
            .active_files(PackageFileKind::Other)
            .next()
            .is_some()
            || self
                .update_info
                .active_files(PackageFileKind::Parameter)
                .next()
                .is_some()
            || self.update_info.active_pem_file().is_some()
    }

    /// No file of the package takes part in this run
    pub fn check_update_disabled_state(&self) -> bool {
        self.update_info.is_empty()
    }

    /// Whether the device needs this package; `None` until its identity is known
    pub fn needs_update(&self) -> Option<bool> {
        let info = self.device_info.as_ref()?;
        info.identity.as_ref()?;
        Some(self.check_always_update() || !info.applications_match())
    }

    /// Mark all recorded information as discarded. Idempotent.
    pub fn discard_info(&mut self) {
        if !self.discarded {
            info!(node_index = self.node_index, "Sub-node information discarded");
        }
        self.discarded = true;
    }

    pub fn is_discarded(&self) -> bool {
        self.discarded
    }

    /// Clear the outcome of the flash phase for a retry
    pub fn reset_update_status(&mut self) {
        self.updating = false;
        self.update_in_progress = false;
        self.update_failed = false;
        self.update_success = false;
        self.failed_application_index = None;
        self.update_states = None;
        self.discarded = false;
    }

    // =========================================================================
    // Classification
    // =========================================================================

    /// Status of the connect phase
    pub fn initial_status(&self) -> SubNodeStatus {
        if self.discarded {
            return SubNodeStatus::Discarded;
        }
        if !self.valid_status {
            return SubNodeStatus::Invalid;
        }
        if !self.has_available_flashloader() {
            return SubNodeStatus::NotApplicable;
        }
        match &self.connect_states {
            Some(state) if state.has_error() || self.precondition_errors.any() => {
                SubNodeStatus::Failed
            }
            Some(state) if state.information_read.is_satisfied() => SubNodeStatus::Success,
            _ if self.connected => SubNodeStatus::InProgress,
            _ => SubNodeStatus::Waiting,
        }
    }

    /// Status of the flash phase
    pub fn update_status(&self) -> SubNodeStatus {
        if self.discarded {
            return SubNodeStatus::Discarded;
        }
        if !self.valid_status {
            return SubNodeStatus::Invalid;
        }
        if !self.has_available_flashloader() || self.check_update_disabled_state() {
            return SubNodeStatus::NotApplicable;
        }
        if self.update_in_progress {
            SubNodeStatus::InProgress
        } else if self.update_failed {
            SubNodeStatus::Failed
        } else if self.update_success {
            SubNodeStatus::Success
        } else {
            SubNodeStatus::Waiting
        }
    }

    /// Information read step of the connect snapshot, if set
    pub fn information_read(&self) -> ProgressState {
        self.connect_states
            .as_ref()
            .map(|s| s.information_read)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_info::{DeviceIdentity, HexFileInfo};
    use crate::node_states::BaseNodeFlags;
    use crate::package::{PackageFile, PemFile};

    fn osy_sub_node() -> SubNodeAggregate {
        SubNodeAggregate::new(3, "ESX3CM", Some(FlashloaderProtocol::OpenSyde)).with_update_info(
            UpdateInfo {
                files: vec![PackageFile::new("app.hex", PackageFileKind::Hex, 1024)],
                pem_file: None,
            },
        )
    }

    #[test]
    fn test_new_sub_node_defaults() {
        let sub = osy_sub_node();
        assert!(sub.is_active());
        assert!(sub.valid_status());
        assert!(!sub.is_connected());
        assert!(!sub.is_updating());
        assert!(!sub.is_discarded());
        assert!(!sub.is_node_connect_states_set());
        assert!(!sub.is_node_update_states_set());
        assert_eq!(sub.failed_application_index(), None);
        assert_eq!(sub.initial_status(), SubNodeStatus::Waiting);
        assert_eq!(sub.update_status(), SubNodeStatus::Waiting);
    }

    #[test]
    fn test_states_set_with_defaults_are_distinguishable() {
        let mut sub = osy_sub_node();
        sub.set_node_connect_states(NodeConnectState::default(), PreconditionErrors::default());
        sub.set_node_update_states(NodeUpdateState::default());
        assert!(sub.is_node_connect_states_set());
        assert!(sub.is_node_update_states_set());
        assert_eq!(sub.node_update_states().map(|s| s.file_count()), Some(0));
    }

    #[test]
    fn test_update_in_progress_lifecycle() {
        let mut sub = osy_sub_node();
        sub.set_node_update_in_progress(true, false, 0);
        assert_eq!(sub.update_status(), SubNodeStatus::InProgress);

        sub.set_node_update_in_progress(false, true, 2);
        assert_eq!(sub.update_status(), SubNodeStatus::Failed);
        assert_eq!(sub.failed_application_index(), Some(2));

        // Retry
        sub.set_node_update_in_progress(true, false, 0);
        assert_eq!(sub.failed_application_index(), None);
        sub.set_node_update_in_progress(false, false, 0);
        assert_eq!(sub.update_status(), SubNodeStatus::Success);
        assert_eq!(sub.failed_application_index(), None);
    }

    #[test]
    fn test_successful_end_clears_earlier_abort() {
        let mut sub = osy_sub_node();
        sub.set_node_update_in_progress(false, true, 1);
        assert_eq!(sub.update_status(), SubNodeStatus::Failed);

        sub.set_node_update_in_progress(false, false, 0);
        assert!(sub.update_success());
        assert!(!sub.update_failed());
        assert_eq!(sub.failed_application_index(), None);
        assert_eq!(sub.update_status(), SubNodeStatus::Success);
    }

    #[test]
    fn test_error_state_is_idempotent_and_keeps_evidence() {
        let mut sub = osy_sub_node();
        let mut state = NodeUpdateState::default();
        state.hex_files.push(crate::progress::HexFileState::new("app.hex"));
        state.hex_files[0].file.file_exists = ProgressState::Error;
        sub.set_node_update_states(state.clone());
        sub.set_node_update_in_progress(true, false, 0);
        sub.set_node_update_in_progress(false, false, 0);
        assert!(sub.update_success());

        sub.set_error_state();
        sub.set_error_state();
        assert!(!sub.valid_status());
        assert!(!sub.update_success());
        assert_eq!(sub.node_update_states(), Some(&state));
        assert_eq!(sub.update_status(), SubNodeStatus::Invalid);
        assert_eq!(sub.initial_status(), SubNodeStatus::Invalid);
    }

    #[test]
    fn test_initial_status_classification() {
        let mut sub = osy_sub_node();
        sub.set_connected(true);
        assert_eq!(sub.initial_status(), SubNodeStatus::InProgress);

        let mut state = NodeConnectState {
            information_read: ProgressState::Ok,
            ..Default::default()
        };
        sub.set_node_connect_states(state.clone(), PreconditionErrors::default());
        assert_eq!(sub.initial_status(), SubNodeStatus::Success);

        sub.set_node_connect_states(
            state.clone(),
            PreconditionErrors {
                nvm_write_error: true,
                ..Default::default()
            },
        );
        assert_eq!(sub.initial_status(), SubNodeStatus::Failed);

        state.flags = BaseNodeFlags {
            timed_out: true,
            ..Default::default()
        };
        sub.set_node_connect_states(state, PreconditionErrors::default());
        assert_eq!(sub.initial_status(), SubNodeStatus::Failed);
    }

    #[test]
    fn test_no_flashloader_is_not_applicable() {
        let sub = SubNodeAggregate::new(0, "IO module", None);
        assert!(!sub.has_available_flashloader());
        assert_eq!(sub.initial_status(), SubNodeStatus::NotApplicable);
        assert_eq!(sub.update_status(), SubNodeStatus::NotApplicable);
    }

    #[test]
    fn test_discard_reports_discarded() {
        let mut sub = osy_sub_node();
        sub.set_node_update_in_progress(true, false, 0);
        sub.set_node_update_in_progress(false, true, 0);
        sub.discard_info();
        assert_eq!(sub.update_status(), SubNodeStatus::Discarded);
        assert_eq!(sub.initial_status(), SubNodeStatus::Discarded);
        // Raw evidence is kept
        assert!(sub.update_failed());

        sub.reset_update_status();
        assert!(!sub.is_discarded());
        assert_eq!(sub.update_status(), SubNodeStatus::Waiting);
    }

    #[test]
    fn test_subset_copies() {
        let mut source = osy_sub_node();
        source.set_connected(true);
        source.set_node_connect_states(
            NodeConnectState {
                information_read: ProgressState::Ok,
                ..Default::default()
            },
            PreconditionErrors::default(),
        );
        source.set_node_update_in_progress(true, false, 0);
        source.set_device_info(DeviceInfo {
            hex_files: vec![HexFileInfo {
                path: "app.hex".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        });
        source.discard_info();

        let mut target = osy_sub_node();
        source.copy_initial_status(&mut target);
        assert!(target.is_connected());
        assert!(target.is_node_connect_states_set());
        assert!(!target.is_update_in_progress());
        assert!(!target.is_there_any_hex_file_information());
        assert!(!target.is_discarded());

        source.copy_update_status(&mut target);
        assert!(target.is_update_in_progress());

        source.copy_device_info(&mut target);
        assert!(target.is_there_any_hex_file_information());

        source.copy_discarded_status(&mut target);
        assert!(target.is_discarded());
    }

    #[test]
    fn test_always_update_and_disabled_checks() {
        let mut sub = osy_sub_node();
        assert!(!sub.check_always_update());
        assert!(!sub.check_update_disabled_state());

        sub.set_update_info(UpdateInfo {
            files: vec![PackageFile::new("app.hex", PackageFileKind::Hex, 10).skipped()],
            pem_file: Some(PemFile {
                path: "dev.pem".to_string(),
                ..Default::default()
            }),
        });
        assert!(sub.check_always_update());
        assert!(!sub.check_update_disabled_state());

        sub.set_update_info(UpdateInfo {
            files: vec![PackageFile::new("app.hex", PackageFileKind::Hex, 10).skipped()],
            pem_file: None,
        });
        assert!(!sub.check_always_update());
        assert!(sub.check_update_disabled_state());
        assert_eq!(sub.update_status(), SubNodeStatus::NotApplicable);

        let stw = SubNodeAggregate::new(1, "legacy", Some(FlashloaderProtocol::StwFlashloader))
            .with_update_info(UpdateInfo {
                files: vec![PackageFile::new("x.bin", PackageFileKind::Other, 1)],
                pem_file: None,
            });
        assert!(!stw.check_always_update());
    }

    #[test]
    fn test_needs_update() {
        let mut sub = osy_sub_node();
        assert_eq!(sub.needs_update(), None);

        let mut info = sub.update_info().to_device_info();
        sub.set_device_info(info.clone());
        assert_eq!(sub.needs_update(), None);

        info.identity = Some(DeviceIdentity {
            device_name: "ESX3CM".to_string(),
            applications: vec![],
        });
        sub.set_device_info(info);
        assert_eq!(sub.needs_update(), Some(true));
    }
}
