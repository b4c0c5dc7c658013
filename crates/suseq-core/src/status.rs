//! Status classification and roll-up

use std::fmt;

use serde::{Deserialize, Serialize};

/// Status of a single sub-node for one phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubNodeStatus {
    /// Information marked invalid by an error state
    Invalid,
    /// Phase currently running
    InProgress,
    /// Phase ended with an error or abort
    Failed,
    /// Phase ended successfully
    Success,
    /// Phase does not apply (no flashloader, nothing to update)
    NotApplicable,
    /// Information discarded by the user
    Discarded,
    /// Phase not started yet
    Waiting,
}

/// Aggregated status of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Invalid,
    InProgress,
    Failed,
    Success,
    Waiting,
}

impl OverallStatus {
    /// Reduce sub-node statuses to one node status.
    ///
    /// Precedence: invalid, in progress, failed, then success if every entry
    /// succeeded or does not apply. Everything else is waiting, including an
    /// empty input.
    pub fn reduce<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = SubNodeStatus>,
    {
        let statuses: Vec<SubNodeStatus> = statuses.into_iter().collect();
        if statuses.is_empty() {
            return OverallStatus::Waiting;
        }
        if statuses.contains(&SubNodeStatus::Invalid) {
            OverallStatus::Invalid
        } else if statuses.contains(&SubNodeStatus::InProgress) {
            OverallStatus::InProgress
        } else if statuses.contains(&SubNodeStatus::Failed) {
            OverallStatus::Failed
        } else if statuses
            .iter()
            .all(|s| matches!(s, SubNodeStatus::Success | SubNodeStatus::NotApplicable))
        {
            OverallStatus::Success
        } else {
            OverallStatus::Waiting
        }
    }

    /// No further change expected without a new run
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Invalid | Self::Failed | Self::Success)
    }
}

impl fmt::Display for SubNodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SubNodeStatus::Invalid => "invalid",
            SubNodeStatus::InProgress => "in_progress",
            SubNodeStatus::Failed => "failed",
            SubNodeStatus::Success => "success",
            SubNodeStatus::NotApplicable => "not_applicable",
            SubNodeStatus::Discarded => "discarded",
            SubNodeStatus::Waiting => "waiting",
        };
        f.write_str(s)
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OverallStatus::Invalid => "invalid",
            OverallStatus::InProgress => "in_progress",
            OverallStatus::Failed => "failed",
            OverallStatus::Success => "success",
            OverallStatus::Waiting => "waiting",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use SubNodeStatus::*;

    #[rstest]
    #[case(vec![], OverallStatus::Waiting)]
    #[case(vec![Success], OverallStatus::Success)]
    #[case(vec![Success, NotApplicable], OverallStatus::Success)]
    #[case(vec![NotApplicable], OverallStatus::Success)]
    #[case(vec![Success, Invalid, InProgress, Failed], OverallStatus::Invalid)]
    #[case(vec![Failed, InProgress, Success], OverallStatus::InProgress)]
    #[case(vec![Success, Failed], OverallStatus::Failed)]
    #[case(vec![Success, Waiting], OverallStatus::Waiting)]
    #[case(vec![Success, Discarded], OverallStatus::Waiting)]
    fn test_reduce(#[case] input: Vec<SubNodeStatus>, #[case] expected: OverallStatus) {
        assert_eq!(OverallStatus::reduce(input), expected);
    }

    #[test]
    fn test_display() {
        assert_eq!(SubNodeStatus::NotApplicable.to_string(), "not_applicable");
        assert_eq!(OverallStatus::InProgress.to_string(), "in_progress");
    }
}
