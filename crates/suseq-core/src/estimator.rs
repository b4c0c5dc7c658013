//! Transfer size accounting and remaining time estimate
//!
//! File sizes are appended once per node while the update package is built.
//! When a node finishes, the driver reports how long its transfer took; the
//! resulting bytes/ms samples are used to estimate the time left for the
//! nodes still waiting.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{TrackerError, TrackerResult};

/// How the samples of several nodes are combined into one rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateStrategy {
    /// Total sampled bytes over total sampled time
    #[default]
    Aggregate,
    /// Highest rate of any single node
    Fastest,
}

/// Estimator settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimatorConfig {
    /// Rate combination
    #[serde(default)]
    pub rate_strategy: RateStrategy,
    /// Elapsed times below this are not used as samples
    #[serde(default = "default_min_sample_ms")]
    pub min_sample_ms: u64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            rate_strategy: RateStrategy::default(),
            min_sample_ms: default_min_sample_ms(),
        }
    }
}

fn default_min_sample_ms() -> u64 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct RateSample {
    bytes_per_ms: f64,
    elapsed_ms: u64,
}

/// File size bookkeeping for one update run
#[derive(Debug, Clone, Default)]
pub struct FileSizeEstimator {
    config: EstimatorConfig,
    other_file_sizes: BTreeMap<u32, Vec<u64>>,
    param_file_sizes: BTreeMap<u32, Vec<u64>>,
    node_bytes: BTreeMap<u32, u64>,
    node_rates: BTreeMap<u32, RateSample>,
    overall_bytes: u64,
}

impl FileSizeEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Register the file sizes of a node.
    ///
    /// Each node can be appended once; a second call is rejected so sizes are
    /// never counted twice.
    pub fn append_files(
        &mut self,
        node_index: u32,
        other_file_sizes: &[u64],
        param_file_sizes: &[u64],
    ) -> TrackerResult<()> {
        if self.node_bytes.contains_key(&node_index) {
            warn!(node_index, "File sizes appended twice");
            return Err(TrackerError::FilesAlreadyAppended(node_index));
        }
        let totals = other_file_sizes
            .iter()
            .chain(param_file_sizes)
            .try_fold(0u64, |acc, size| acc.checked_add(*size))
            .and_then(|node_total| {
                Some((node_total, self.overall_bytes.checked_add(node_total)?))
            });
        let Some((node_total, overall_bytes)) = totals else {
            warn!(node_index, "File sizes overflow the byte counter");
            return Err(TrackerError::SizeOverflow(node_index));
        };

        self.other_file_sizes
            .insert(node_index, other_file_sizes.to_vec());
        self.param_file_sizes
            .insert(node_index, param_file_sizes.to_vec());
        self.node_bytes.insert(node_index, node_total);
        self.overall_bytes = overall_bytes;

        debug!(
            node_index,
            node_total,
            overall = self.overall_bytes,
            "File sizes appended"
        );
        Ok(())
    }

    /// Record how long the transfer of a node took.
    ///
    /// Elapsed times below `min_sample_ms` (including zero) and nodes without
    /// any bytes leave the previous sample of the node untouched.
    pub fn set_elapsed_time_for_node(&mut self, node_index: u32, elapsed_ms: u64) -> TrackerResult<()> {
        let bytes = *self
            .node_bytes
            .get(&node_index)
            .ok_or(TrackerError::NoFilesForNode(node_index))?;

        if elapsed_ms == 0 || elapsed_ms < self.config.min_sample_ms || bytes == 0 {
            debug!(node_index, elapsed_ms, bytes, "Elapsed time not usable as sample");
            return Ok(());
        }

        let bytes_per_ms = bytes as f64 / elapsed_ms as f64;
        debug!(node_index, elapsed_ms, bytes_per_ms, "Transfer rate sampled");
        self.node_rates.insert(
            node_index,
            RateSample {
                bytes_per_ms,
                elapsed_ms,
            },
        );
        Ok(())
    }

    /// Sum of all appended file sizes
    pub fn overall_files_size(&self) -> u64 {
        self.overall_bytes
    }

    /// Sum of the file sizes of one node
    pub fn node_files_size(&self, node_index: u32) -> Option<u64> {
        self.node_bytes.get(&node_index).copied()
    }

    pub fn other_file_sizes(&self, node_index: u32) -> Option<&[u64]> {
        self.other_file_sizes.get(&node_index).map(Vec::as_slice)
    }

    pub fn param_file_sizes(&self, node_index: u32) -> Option<&[u64]> {
        self.param_file_sizes.get(&node_index).map(Vec::as_slice)
    }

    /// Observed rate of one node in bytes/ms
    pub fn rate_for_node(&self, node_index: u32) -> Option<f64> {
        self.node_rates.get(&node_index).map(|s| s.bytes_per_ms)
    }

    /// Bytes of all nodes without a rate sample
    pub fn remaining_bytes(&self) -> u64 {
        self.node_bytes
            .iter()
            .filter(|(node, _)| !self.node_rates.contains_key(*node))
            .map(|(_, bytes)| *bytes)
            .sum()
    }

    /// Rate used for estimates, per the configured strategy
    pub fn observed_rate(&self) -> Option<f64> {
        if self.node_rates.is_empty() {
            return None;
        }
        let rate = match self.config.rate_strategy {
            RateStrategy::Aggregate => {
                let (bytes, ms) = self
                    .node_rates
                    .values()
                    .fold((0.0_f64, 0_u64), |(bytes, ms), s| {
                        (bytes + s.bytes_per_ms * s.elapsed_ms as f64, ms + s.elapsed_ms)
                    });
                bytes / ms as f64
            }
            RateStrategy::Fastest => self
                .node_rates
                .values()
                .map(|s| s.bytes_per_ms)
                .fold(0.0_f64, f64::max),
        };
        (rate.is_finite() && rate > 0.0).then_some(rate)
    }

    /// Seconds needed for `bytes` at the observed rate, rounded up
    pub fn estimated_time_for_bytes_s(&self, bytes: u64) -> Option<u64> {
        let rate = self.observed_rate()?;
        let ms = bytes as f64 / rate;
        Some((ms / 1000.0).ceil() as u64)
    }

    /// Seconds left for all nodes without a sample.
    ///
    /// `None` until at least one usable sample exists.
    pub fn estimated_time_s(&self) -> Option<u64> {
        self.estimated_time_for_bytes_s(self.remaining_bytes())
    }
}
