//! Device information discovered while entering update mode
//!
//! Besides what the device reports about itself, this holds the descriptors
//! of the package files that were matched against it.

use serde::{Deserialize, Serialize};

/// Flashloader protocol family of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashloaderProtocol {
    /// openSYDE flashloader (CAN or Ethernet)
    OpenSyde,
    /// Legacy STW flashloader (CAN only)
    StwFlashloader,
}

impl std::fmt::Display for FlashloaderProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlashloaderProtocol::OpenSyde => f.write_str("openSYDE"),
            FlashloaderProtocol::StwFlashloader => f.write_str("STW flashloader"),
        }
    }
}

/// Application block as reported by a device or found in a hex file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationInfo {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub build_date: String,
    #[serde(default)]
    pub build_time: String,
    /// Device reports the application as valid (always true for files)
    #[serde(default = "default_valid")]
    pub valid: bool,
}

fn default_valid() -> bool {
    true
}

impl ApplicationInfo {
    /// Same name, version and build timestamp
    pub fn matches(&self, other: &ApplicationInfo) -> bool {
        self.name == other.name
            && self.version == other.version
            && self.build_date == other.build_date
            && self.build_time == other.build_time
    }
}

/// What the device reported about itself
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Device type name
    pub device_name: String,
    /// Applications currently on the device
    #[serde(default)]
    pub applications: Vec<ApplicationInfo>,
}

/// Descriptor of a hex file of the update package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HexFileInfo {
    /// Path of the hex file
    pub path: String,
    /// Application found in the file (if it could be read)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application: Option<ApplicationInfo>,
    /// More than one application block of the file fits the device
    #[serde(default)]
    pub ambiguous_match: bool,
}

/// Device information of one sub-node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Identity read from the device (absent until read)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<DeviceIdentity>,
    /// Hex file descriptors
    #[serde(default)]
    pub hex_files: Vec<HexFileInfo>,
    /// Parameter set file names
    #[serde(default)]
    pub parameter_files: Vec<String>,
    /// Generic file names
    #[serde(default)]
    pub other_files: Vec<String>,
    /// PEM file name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pem_file: Option<String>,
}

impl DeviceInfo {
    /// Every hex file carries an unambiguous application that the device
    /// already runs as a valid application.
    ///
    /// Returns false while the device identity is unknown.
    pub fn applications_match(&self) -> bool {
        let Some(identity) = &self.identity else {
            return false;
        };
        self.hex_files.iter().all(|hex| {
            !hex.ambiguous_match
                && hex.application.as_ref().is_some_and(|app| {
                    identity
                        .applications
                        .iter()
                        .any(|dev| dev.valid && dev.matches(app))
                })
        })
    }
}
