//! Update-sequence state tracker
//!
//! Records the progress of a multi-node firmware update: per-file step
//! progress, connect and flash snapshots per device, the roll-up to one status
//! per node, and a transfer-time estimate. The tracker never talks to a
//! device; a sequence driver (see [`sequence`]) pushes snapshots in and
//! pollers read the aggregates back.
//!
//! # Example
//!
//! ```
//! use suseq_core::{
//!     FlashloaderProtocol, OverallStatus, PackageFile, PackageFileKind, SequenceDriver,
//!     SubNodeConfig, TopologyConfig, UpdateOverview,
//! };
//!
//! let topology = TopologyConfig::builder()
//!     .device(
//!         SubNodeConfig::new(0, "ecu", Some(FlashloaderProtocol::OpenSyde))
//!             .with_file(PackageFile::new("app.hex", PackageFileKind::Hex, 4096)),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let mut overview = UpdateOverview::from_config(&topology).unwrap();
//! SequenceDriver::default().run(&mut overview).unwrap();
//! assert_eq!(overview.summaries()[0].update_status, OverallStatus::Success);
//! ```

pub mod config;
pub mod device_info;
pub mod error;
pub mod estimator;
pub mod node;
pub mod node_states;
pub mod overview;
pub mod package;
pub mod progress;
pub mod sequence;
pub mod status;
pub mod sub_node;

pub use config::{ConfigFormat, NodeConfig, ScenarioConfig, SubNodeConfig, TopologyConfig};
pub use device_info::{ApplicationInfo, DeviceIdentity, DeviceInfo, FlashloaderProtocol, HexFileInfo};
pub use error::{ConfigError, TrackerError, TrackerResult};
pub use estimator::{EstimatorConfig, FileSizeEstimator, RateStrategy};
pub use node::NodeAggregate;
pub use node_states::{
    BaseNodeFlags, FeatureSet, NodeConnectState, NodeUpdateState, PreconditionErrors,
};
pub use overview::{NodeSummary, UpdateOverview};
pub use package::{PackageFile, PackageFileKind, PemFile, UpdateInfo};
pub use progress::{
    FileEntry, FileProgressState, FileSteps, HexFileState, OtherFileState, PemFileState,
    ProgressState, PsiFileState, StwFlHexFileState,
};
pub use sequence::{FailAt, RunResult, ScriptedOutcome, SequenceDriver};
pub use status::{OverallStatus, SubNodeStatus};
pub use sub_node::SubNodeAggregate;
