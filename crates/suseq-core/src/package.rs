//! Update package contents planned for one sub-node

use serde::{Deserialize, Serialize};

use crate::device_info::{ApplicationInfo, DeviceInfo, HexFileInfo};

/// Kind of a package file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageFileKind {
    /// Hex application
    Hex,
    /// Generic file transferred as-is
    Other,
    /// Parameter set image
    Parameter,
}

/// One file of the update package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageFile {
    /// Path of the file
    pub path: String,
    /// File kind
    pub kind: PackageFileKind,
    /// Size in bytes
    #[serde(default)]
    pub size: u64,
    /// User excluded the file from this run
    #[serde(default)]
    pub skip_update: bool,
    /// Application block read from a hex file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application: Option<ApplicationInfo>,
}

impl PackageFile {
    pub fn new(path: impl Into<String>, kind: PackageFileKind, size: u64) -> Self {
        Self {
            path: path.into(),
            kind,
            size,
            skip_update: false,
            application: None,
        }
    }

    pub fn with_application(mut self, application: ApplicationInfo) -> Self {
        self.application = Some(application);
        self
    }

    pub fn skipped(mut self) -> Self {
        self.skip_update = true;
        self
    }
}

/// PEM file with the flags to send alongside it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PemFile {
    pub path: String,
    /// Security state to write (`None`: leave unchanged)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_enabled: Option<bool>,
    /// Debugger state to write (`None`: leave unchanged)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debugger_enabled: Option<bool>,
    #[serde(default)]
    pub skip_update: bool,
}

/// Files planned for one sub-node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateInfo {
    #[serde(default)]
    pub files: Vec<PackageFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pem_file: Option<PemFile>,
}

impl UpdateInfo {
    /// Files of one kind that take part in this run
    pub fn active_files(&self, kind: PackageFileKind) -> impl Iterator<Item = &PackageFile> {
        self.files
            .iter()
            .filter(move |f| f.kind == kind && !f.skip_update)
    }

    /// PEM file taking part in this run
    pub fn active_pem_file(&self) -> Option<&PemFile> {
        self.pem_file.as_ref().filter(|p| !p.skip_update)
    }

    /// Nothing of the package takes part in this run
    pub fn is_empty(&self) -> bool {
        self.files.iter().all(|f| f.skip_update) && self.active_pem_file().is_none()
    }

    /// Sizes of hex and generic files taking part in this run
    pub fn data_file_sizes(&self) -> Vec<u64> {
        self.files
            .iter()
            .filter(|f| !f.skip_update && f.kind != PackageFileKind::Parameter)
            .map(|f| f.size)
            .collect()
    }

    /// Sizes of parameter set files taking part in this run
    pub fn parameter_file_sizes(&self) -> Vec<u64> {
        self.active_files(PackageFileKind::Parameter)
            .map(|f| f.size)
            .collect()
    }

    /// Device info descriptors for the files of this package
    pub fn to_device_info(&self) -> DeviceInfo {
        let names = |kind| {
            self.active_files(kind)
                .map(|f| f.path.clone())
                .collect::<Vec<_>>()
        };
        DeviceInfo {
            identity: None,
            hex_files: self
                .active_files(PackageFileKind::Hex)
                .map(|f| HexFileInfo {
                    path: f.path.clone(),
                    application: f.application.clone(),
                    ambiguous_match: false,
                })
                .collect(),
            parameter_files: names(PackageFileKind::Parameter),
            other_files: names(PackageFileKind::Other),
            pem_file: self.active_pem_file().map(|p| p.path.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn package() -> UpdateInfo {
        UpdateInfo {
            files: vec![
                PackageFile::new("app.hex", PackageFileKind::Hex, 100),
                PackageFile::new("data.bin", PackageFileKind::Other, 20),
                PackageFile::new("old.bin", PackageFileKind::Other, 7).skipped(),
                PackageFile::new("set.psi_syde", PackageFileKind::Parameter, 3),
            ],
            pem_file: None,
        }
    }

    #[test]
    fn test_file_sizes() {
        let info = package();
        assert_eq!(info.data_file_sizes(), vec![100, 20]);
        assert_eq!(info.parameter_file_sizes(), vec![3]);
    }

    #[test]
    fn test_is_empty() {
        let mut info = package();
        assert!(!info.is_empty());

        for f in &mut info.files {
            f.skip_update = true;
        }
        assert!(info.is_empty());

        info.pem_file = Some(PemFile {
            path: "dev.pem".to_string(),
            ..Default::default()
        });
        assert!(!info.is_empty());
        assert!(UpdateInfo::default().is_empty());
    }

    #[test]
    fn test_to_device_info() {
        let info = package().to_device_info();
        assert_eq!(info.hex_files.len(), 1);
        assert_eq!(info.hex_files[0].path, "app.hex");
        assert_eq!(info.other_files, vec!["data.bin".to_string()]);
        assert_eq!(info.parameter_files, vec!["set.psi_syde".to_string()]);
        assert_eq!(info.pem_file, None);
    }
}
