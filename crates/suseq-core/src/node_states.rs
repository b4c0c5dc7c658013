//! Per-node snapshots of the "enter update mode" and "flash" phases
//!
//! A snapshot is created empty when its phase starts for a node and is filled
//! in by the sequence driver as sub-steps complete. No ordering rule is
//! enforced here.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::progress::{
    FileEntry, FileSteps, HexFileState, OtherFileState, PemFileState, ProgressState,
    PsiFileState, StwFlHexFileState,
};

bitflags! {
    /// Protocol capabilities negotiated with an openSYDE flashloader
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct FeatureSet: u16 {
        /// Device reports its maximum block length
        const MAX_BLOCK_LENGTH_AVAILABLE = 1 << 0;
        /// Flashloader can write parameter sets to NVM
        const CAN_WRITE_TO_NVM = 1 << 1;
        /// Security (PEM key) handling supported
        const SUPPORTS_SECURITY = 1 << 2;
        /// Debugger can be enabled
        const SUPPORTS_DEBUGGER_ON = 1 << 3;
        /// Debugger can be disabled
        const SUPPORTS_DEBUGGER_OFF = 1 << 4;
        /// Device can route Ethernet to Ethernet
        const ETHERNET_TO_ETHERNET_ROUTING = 1 << 5;
        /// File transfer exit returns a result
        const FILE_TRANSFER_EXIT_RESULT = 1 << 6;
    }
}

impl Default for FeatureSet {
    fn default() -> Self {
        Self::empty()
    }
}

/// Communication flags shared by connect and update snapshots.
///
/// The flags are independent: a router can time out and fail at the same time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseNodeFlags {
    /// Device did not answer in time
    pub timed_out: bool,
    /// Authentication with the device failed
    pub authentication_error: bool,
    /// Device not reachable because a router on the path failed
    pub unreachable_due_to_routing_error: bool,
    /// Device is a router for other nodes and its routing setup failed
    pub is_routing_node_and_failed: bool,
}

impl BaseNodeFlags {
    /// Any communication problem recorded
    pub fn any(&self) -> bool {
        self.timed_out
            || self.authentication_error
            || self.unreachable_due_to_routing_error
            || self.is_routing_node_and_failed
    }
}

/// Snapshot of the "enter update mode" phase of one device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConnectState {
    pub flags: BaseNodeFlags,
    /// Device information read
    pub information_read: ProgressState,
    /// Whether the authentication requirement was queried
    pub authentication_necessary_checked: bool,
    /// Device requires authentication
    pub authentication_necessary: bool,
    /// Capabilities reported by the device
    pub available_features: FeatureSet,
}

impl NodeConnectState {
    /// Connect phase finished without any recorded problem
    pub fn is_ok(&self) -> bool {
        !self.flags.any() && self.information_read == ProgressState::Ok
    }

    /// Connect phase recorded a failure
    pub fn has_error(&self) -> bool {
        self.flags.any() || self.information_read.is_error()
    }
}

/// Checks done before any data is sent to a device.
///
/// Each flag marks a package requirement the device cannot satisfy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreconditionErrors {
    /// Parameter sets in the package but NVM writing not supported
    pub nvm_write_error: bool,
    /// PEM file in the package but security not supported
    pub pem_write_error: bool,
    /// Debugger enable requested but not supported
    pub debugger_enable_error: bool,
    /// Debugger disable requested but not supported
    pub debugger_disable_error: bool,
    /// Ethernet-to-Ethernet routing required but not supported
    pub eth_to_eth_routing_error: bool,
}

impl PreconditionErrors {
    pub fn any(&self) -> bool {
        self.nvm_write_error
            || self.pem_write_error
            || self.debugger_enable_error
            || self.debugger_disable_error
            || self.eth_to_eth_routing_error
    }
}

/// Snapshot of the flash phase of one device.
///
/// A device is either openSYDE (hex, other, psi, pem) or STW flashloader
/// (stw_fl_hex); the type does not prevent mixing both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeUpdateState {
    pub flags: BaseNodeFlags,
    pub hex_files: Vec<HexFileState>,
    pub other_files: Vec<OtherFileState>,
    pub psi_files: Vec<PsiFileState>,
    pub pem_file: PemFileState,
    pub stw_fl_hex_files: Vec<StwFlHexFileState>,
}

impl NodeUpdateState {
    /// All non-PEM files in sequence order
    pub fn file_entries(&self) -> impl Iterator<Item = FileEntry<'_>> {
        self.hex_files
            .iter()
            .map(FileEntry::Hex)
            .chain(self.other_files.iter().map(FileEntry::Other))
            .chain(self.psi_files.iter().map(FileEntry::Psi))
            .chain(self.stw_fl_hex_files.iter().map(FileEntry::StwFlHex))
    }

    /// Every file state and the PEM state reached a terminal value
    pub fn is_terminal(&self) -> bool {
        self.pem_file.is_terminal() && self.file_entries().all(|f| f.is_terminal())
    }

    /// Any file step failed or a communication flag is set
    pub fn has_error(&self) -> bool {
        self.flags.any()
            || self.pem_file.has_error()
            || self.file_entries().any(|f| f.has_error())
    }

    /// Number of tracked files, PEM excluded
    pub fn file_count(&self) -> usize {
        self.hex_files.len()
            + self.other_files.len()
            + self.psi_files.len()
            + self.stw_fl_hex_files.len()
    }

    /// Position of the first failed file in `file_entries` order
    pub fn first_failed_file(&self) -> Option<usize> {
        self.file_entries().position(|f| f.has_error())
    }
}
