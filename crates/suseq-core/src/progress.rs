//! Per-file progress records
//!
//! Every file transferred during an update is tracked by one record. The
//! records are plain data: the sequence driver advances them by direct field
//! assignment, readers only inspect them.
//!
//! ```text
//! FileProgressState ─┬─ HexFileState       (openSYDE hex application)
//!                    ├─ OtherFileState     (openSYDE file-based transfer)
//!                    ├─ PsiFileState       (parameter set image)
//!                    ├─ PemFileState       (security / debugger settings)
//!                    └─ StwFlHexFileState  (STW flashloader hex file)
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Progress of a single sequence step.
///
/// `NotExecuted` is the initial value. `NotNeeded`, `Ok` and `Error` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressState {
    /// Step has not run yet
    #[default]
    NotExecuted,
    /// Step is skipped for this device
    NotNeeded,
    /// Step finished successfully
    Ok,
    /// Step failed
    Error,
}

impl ProgressState {
    /// Check if the step reached a final value
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::NotExecuted)
    }

    /// Check if the step is done or was skipped
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::Ok | Self::NotNeeded)
    }

    /// Check if the step failed
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }
}

impl fmt::Display for ProgressState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProgressState::NotExecuted => "not_executed",
            ProgressState::NotNeeded => "not_needed",
            ProgressState::Ok => "ok",
            ProgressState::Error => "error",
        };
        f.write_str(s)
    }
}

/// State shared by every file kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileProgressState {
    /// Path of the file as given in the update package
    pub file_name: String,
    /// File was found on disk
    pub file_exists: ProgressState,
    /// File content was loaded and parsed
    pub file_loaded: ProgressState,
}

impl FileProgressState {
    /// Create a record for the named file
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            ..Self::default()
        }
    }
}

/// Read-only view over the step fields of a file record.
pub trait FileSteps {
    /// Shared file fields
    fn file(&self) -> &FileProgressState;

    /// Every step of the record in sequence order, shared fields first
    fn steps(&self) -> Vec<ProgressState>;

    /// All steps have a terminal value
    fn is_terminal(&self) -> bool {
        self.steps().iter().all(ProgressState::is_terminal)
    }

    /// At least one step failed
    fn has_error(&self) -> bool {
        self.steps().iter().any(ProgressState::is_error)
    }
}

// =============================================================================
// openSYDE hex application
// =============================================================================

/// Hex application flashed via the openSYDE protocol.
///
/// Transfer steps must not reach `Ok` while any precondition step is still
/// outstanding. The type does not enforce this; the driver does.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HexFileState {
    pub file: FileProgressState,
    // Preconditions
    pub signature_block_address_read: ProgressState,
    pub node_name_compared: ProgressState,
    pub data_dump_read: ProgressState,
    pub available_flash_memory_checked: ProgressState,
    // Transfer
    pub request_download_sent: ProgressState,
    pub all_transfer_data_sent: ProgressState,
    pub request_transfer_address_exit_sent: ProgressState,
}

impl HexFileState {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file: FileProgressState::new(file_name),
            ..Self::default()
        }
    }

    /// Precondition steps in sequence order
    pub fn precondition_steps(&self) -> [ProgressState; 4] {
        [
            self.signature_block_address_read,
            self.node_name_compared,
            self.data_dump_read,
            self.available_flash_memory_checked,
        ]
    }

    /// Transfer steps in sequence order
    pub fn transfer_steps(&self) -> [ProgressState; 3] {
        [
            self.request_download_sent,
            self.all_transfer_data_sent,
            self.request_transfer_address_exit_sent,
        ]
    }

    /// True if a transfer step is `Ok` although a precondition is not satisfied
    pub fn violates_step_order(&self) -> bool {
        let preconditions_done = self
            .precondition_steps()
            .iter()
            .all(ProgressState::is_satisfied);
        let any_transfer_ok = self
            .transfer_steps()
            .iter()
            .any(|s| *s == ProgressState::Ok);
        any_transfer_ok && !preconditions_done
    }
}

impl FileSteps for HexFileState {
    fn file(&self) -> &FileProgressState {
        &self.file
    }

    fn steps(&self) -> Vec<ProgressState> {
        let mut steps = vec![self.file.file_exists, self.file.file_loaded];
        steps.extend(self.precondition_steps());
        steps.extend(self.transfer_steps());
        steps
    }
}

// =============================================================================
// openSYDE file-based transfer
// =============================================================================

/// Generic file transferred with the openSYDE file-based services
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtherFileState {
    pub file: FileProgressState,
    pub request_file_transfer_sent: ProgressState,
    pub all_transfer_data_sent: ProgressState,
    pub request_transfer_file_exit_sent: ProgressState,
    pub request_transfer_file_exit_result_sent: ProgressState,
}

impl OtherFileState {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file: FileProgressState::new(file_name),
            ..Self::default()
        }
    }
}

impl FileSteps for OtherFileState {
    fn file(&self) -> &FileProgressState {
        &self.file
    }

    fn steps(&self) -> Vec<ProgressState> {
        vec![
            self.file.file_exists,
            self.file.file_loaded,
            self.request_file_transfer_sent,
            self.all_transfer_data_sent,
            self.request_transfer_file_exit_sent,
            self.request_transfer_file_exit_result_sent,
        ]
    }
}

// =============================================================================
// Parameter set image
// =============================================================================

/// Parameter set image written to NVM
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PsiFileState {
    pub file: FileProgressState,
    pub psi_file_written: ProgressState,
}

impl PsiFileState {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file: FileProgressState::new(file_name),
            ..Self::default()
        }
    }
}

impl FileSteps for PsiFileState {
    fn file(&self) -> &FileProgressState {
        &self.file
    }

    fn steps(&self) -> Vec<ProgressState> {
        vec![
            self.file.file_exists,
            self.file.file_loaded,
            self.psi_file_written,
        ]
    }
}

// =============================================================================
// PEM file
// =============================================================================

/// PEM file carrying the device security key and the security/debugger flags.
///
/// `security_key_sent` can only be `Ok` once `pem_file_extracted` is `Ok`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PemFileState {
    pub file: FileProgressState,
    pub pem_file_extracted: ProgressState,
    pub security_key_sent: ProgressState,
    pub security_flag_sent: ProgressState,
    pub debugger_flag_sent: ProgressState,
}

impl PemFileState {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file: FileProgressState::new(file_name),
            ..Self::default()
        }
    }

    /// A PEM record that is skipped entirely (no PEM file in the package)
    pub fn not_needed() -> Self {
        Self {
            file: FileProgressState {
                file_name: String::new(),
                file_exists: ProgressState::NotNeeded,
                file_loaded: ProgressState::NotNeeded,
            },
            pem_file_extracted: ProgressState::NotNeeded,
            security_key_sent: ProgressState::NotNeeded,
            security_flag_sent: ProgressState::NotNeeded,
            debugger_flag_sent: ProgressState::NotNeeded,
        }
    }

    /// True if the key was reported sent without an extracted PEM file
    pub fn violates_key_order(&self) -> bool {
        self.security_key_sent == ProgressState::Ok
            && self.pem_file_extracted != ProgressState::Ok
    }
}

impl FileSteps for PemFileState {
    fn file(&self) -> &FileProgressState {
        &self.file
    }

    fn steps(&self) -> Vec<ProgressState> {
        vec![
            self.file.file_exists,
            self.file.file_loaded,
            self.pem_file_extracted,
            self.security_key_sent,
            self.security_flag_sent,
            self.debugger_flag_sent,
        ]
    }
}

// =============================================================================
// STW flashloader hex file
// =============================================================================

/// Hex file sent to an STW flashloader device in one step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StwFlHexFileState {
    pub file: FileProgressState,
    pub file_sent: ProgressState,
}

impl StwFlHexFileState {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file: FileProgressState::new(file_name),
            ..Self::default()
        }
    }
}

impl FileSteps for StwFlHexFileState {
    fn file(&self) -> &FileProgressState {
        &self.file
    }

    fn steps(&self) -> Vec<ProgressState> {
        vec![self.file.file_exists, self.file.file_loaded, self.file_sent]
    }
}

// =============================================================================
// Heterogeneous view
// =============================================================================

/// One transferred file of any kind, as listed by `NodeUpdateState::file_entries`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEntry<'a> {
    Hex(&'a HexFileState),
    Other(&'a OtherFileState),
    Psi(&'a PsiFileState),
    StwFlHex(&'a StwFlHexFileState),
}

impl<'a> FileEntry<'a> {
    fn inner(&self) -> &'a dyn FileSteps {
        match *self {
            FileEntry::Hex(f) => f,
            FileEntry::Other(f) => f,
            FileEntry::Psi(f) => f,
            FileEntry::StwFlHex(f) => f,
        }
    }

    /// Short label of the file kind
    pub fn kind(&self) -> &'static str {
        match self {
            FileEntry::Hex(_) => "hex",
            FileEntry::Other(_) => "other",
            FileEntry::Psi(_) => "psi",
            FileEntry::StwFlHex(_) => "stw_hex",
        }
    }

    pub fn file_name(&self) -> &'a str {
        &self.inner().file().file_name
    }

    pub fn is_terminal(&self) -> bool {
        self.inner().is_terminal()
    }

    pub fn has_error(&self) -> bool {
        self.inner().has_error()
    }
}
