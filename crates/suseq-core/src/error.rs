//! Common error types for the update-state tracker
//!
//! Progress failures never show up here: they are recorded as data
//! (`ProgressState::Error`, node flags, `valid_status`). These errors only
//! report bookkeeping calls the tracker refuses to apply.

use thiserror::Error;

/// Result type for tracker operations
pub type TrackerResult<T> = Result<T, TrackerError>;

/// Bookkeeping calls the tracker refused to apply
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrackerError {
    /// A per-sub-node vector does not have one entry per sub-node
    #[error("{what}: expected {expected} entries (one per sub-node), got {actual}")]
    LengthMismatch {
        /// Which vector was rejected
        what: &'static str,
        /// Number of sub-nodes of the node
        expected: usize,
        /// Number of entries supplied
        actual: usize,
    },

    /// No sub-node carries this system node index
    #[error("Unknown node index: {0}")]
    UnknownNodeIndex(u32),

    /// Sub-node position outside of the node
    #[error("Sub-node index {index} out of range (node has {count} sub-nodes)")]
    SubNodeIndexOutOfRange {
        /// Requested position
        index: usize,
        /// Number of sub-nodes
        count: usize,
    },

    /// File sizes for this node were already appended
    #[error("Files for node {0} already appended")]
    FilesAlreadyAppended(u32),

    /// Elapsed time reported for a node without appended files
    #[error("No file sizes known for node {0}")]
    NoFilesForNode(u32),

    /// Two aggregates with different topologies were combined
    #[error("Topology mismatch: {0}")]
    TopologyMismatch(String),

    /// Appending the file sizes of a node would overflow a byte counter
    #[error("File sizes of node {0} overflow the byte counter")]
    SizeOverflow(u32),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
