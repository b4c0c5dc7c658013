//! Roll-up, assembly and estimator behaviour of the tracker
//!
//! Run with: cargo test -p suseq-core --test rollup_test

use pretty_assertions::assert_eq;
use rstest::rstest;
use suseq_core::{
    FileSizeEstimator, FileSteps, FlashloaderProtocol, HexFileState, NodeAggregate,
    NodeConnectState, NodeUpdateState, OtherFileState, OverallStatus, PackageFile,
    PackageFileKind, PemFileState, PreconditionErrors, ProgressState, PsiFileState,
    StwFlHexFileState, SubNodeAggregate, TrackerError, UpdateInfo,
};

const SUB_NODES: usize = 4;

fn package() -> UpdateInfo {
    UpdateInfo {
        files: vec![PackageFile::new("app.hex", PackageFileKind::Hex, 512)],
        pem_file: None,
    }
}

fn node(count: usize) -> NodeAggregate {
    let subs = (0..count as u32)
        .map(|i| {
            SubNodeAggregate::new(10 + i, format!("cpu{}", i), Some(FlashloaderProtocol::OpenSyde))
                .with_update_info(package())
        })
        .collect();
    NodeAggregate::new("multi", subs).unwrap()
}

fn connected_ok() -> NodeConnectState {
    NodeConnectState {
        information_read: ProgressState::Ok,
        ..Default::default()
    }
}

/// Node whose sub-nodes all finished both phases successfully
fn successful_node(count: usize) -> NodeAggregate {
    let mut node = node(count);
    node.set_node_connect_states(
        vec![connected_ok(); count],
        vec![PreconditionErrors::default(); count],
    )
    .unwrap();
    for index in node.node_indices() {
        node.set_node_update_in_progress(index, true, false, 0).unwrap();
        node.set_node_update_in_progress(index, false, false, 0).unwrap();
    }
    node
}

// =============================================================================
// Defaults
// =============================================================================

#[test]
fn test_default_records_are_not_executed() {
    let hex = HexFileState::default();
    let other = OtherFileState::default();
    let psi = PsiFileState::default();
    let pem = PemFileState::default();
    let stw = StwFlHexFileState::default();

    let steps = hex
        .steps()
        .into_iter()
        .chain(other.steps())
        .chain(psi.steps())
        .chain(pem.steps())
        .chain(stw.steps());
    for step in steps {
        assert_eq!(step, ProgressState::NotExecuted);
    }
    assert_eq!(hex.file().file_name, "");

    let connect = NodeConnectState::default();
    assert!(!connect.flags.any());
    assert_eq!(connect.information_read, ProgressState::NotExecuted);
    assert!(!connect.authentication_necessary_checked);
    assert!(!connect.authentication_necessary);
    assert!(connect.available_features.is_empty());

    let update = NodeUpdateState::default();
    assert!(!update.flags.any());
    assert_eq!(update.file_count(), 0);
    assert!(!update.is_terminal());
    assert!(!PreconditionErrors::default().any());
}

#[test]
fn test_fresh_sub_node_has_no_snapshots() {
    let sub = SubNodeAggregate::new(0, "ecu", Some(FlashloaderProtocol::OpenSyde));
    assert!(!sub.is_node_connect_states_set());
    assert!(!sub.is_node_update_states_set());
    assert!(sub.valid_status());
    assert!(!sub.is_discarded());
    assert_eq!(sub.failed_application_index(), None);
}

// =============================================================================
// Roll-up precedence
// =============================================================================

#[rstest]
#[case(0)]
#[case(1)]
#[case(2)]
#[case(3)]
fn test_invalid_wins_at_every_position(#[case] position: usize) {
    let mut node = successful_node(SUB_NODES);
    assert_eq!(node.overall_initial_state(), OverallStatus::Success);
    assert_eq!(node.overall_update_state(), OverallStatus::Success);

    let index = node.node_indices()[position];
    node.set_error_state(index).unwrap();
    assert_eq!(node.overall_initial_state(), OverallStatus::Invalid);
    assert_eq!(node.overall_update_state(), OverallStatus::Invalid);
}

#[rstest]
#[case(0)]
#[case(3)]
fn test_in_progress_beats_failed(#[case] position: usize) {
    let mut node = successful_node(SUB_NODES);
    let indices = node.node_indices();
    node.set_node_update_in_progress(indices[position], false, true, 0)
        .unwrap();
    assert_eq!(node.overall_update_state(), OverallStatus::Failed);

    let other = indices[(position + 1) % SUB_NODES];
    node.set_node_update_in_progress(other, true, false, 0).unwrap();
    assert_eq!(node.overall_update_state(), OverallStatus::InProgress);
}

#[test]
fn test_new_run_clears_previous_failure() {
    let mut node = successful_node(1);
    node.set_node_update_in_progress(10, false, true, 2).unwrap();
    assert_eq!(
        node.sub_node_by_node_index(10).unwrap().failed_application_index(),
        Some(2)
    );

    node.set_node_update_in_progress(10, true, false, 0).unwrap();
    let sub = node.sub_node_by_node_index(10).unwrap();
    assert!(!sub.update_failed());
    assert_eq!(sub.failed_application_index(), None);
    assert_eq!(node.overall_update_state(), OverallStatus::InProgress);
}

// =============================================================================
// Active set
// =============================================================================

#[test]
fn test_inactive_sub_node_is_ignored() {
    let mut node = successful_node(2);
    node.set_node_update_in_progress(11, false, true, 0).unwrap();
    assert_eq!(node.overall_update_state(), OverallStatus::Failed);

    node.set_sub_node_active(1, false).unwrap();
    assert_eq!(node.overall_update_state(), OverallStatus::Success);

    node.set_error_state(11).unwrap();
    assert_eq!(node.overall_initial_state(), OverallStatus::Success);
}

#[test]
fn test_all_inactive_is_waiting() {
    let mut node = successful_node(2);
    node.set_sub_node_active(0, false).unwrap();
    node.set_sub_node_active(1, false).unwrap();
    assert_eq!(node.overall_initial_state(), OverallStatus::Waiting);
    assert_eq!(node.overall_update_state(), OverallStatus::Waiting);
}

#[test]
fn test_set_active_out_of_range() {
    let mut node = node(2);
    assert_eq!(
        node.set_sub_node_active(2, false),
        Err(TrackerError::SubNodeIndexOutOfRange { index: 2, count: 2 })
    );
    assert!(!node.is_sub_node_active(2));
}

// =============================================================================
// Discard
// =============================================================================

#[test]
fn test_discard_is_idempotent() {
    let mut once = successful_node(2);
    once.discard_info();
    let mut twice = successful_node(2);
    twice.discard_info();
    twice.discard_info();

    assert!(once.is_discarded());
    assert_eq!(once.summary_statuses(), twice.summary_statuses());
    assert_eq!(twice.overall_update_state(), OverallStatus::Waiting);
}

#[test]
fn test_copy_discarded_status_only_copies_flag() {
    let mut source = node(2);
    source.discard_info();
    source.set_error_state(10).unwrap();

    let mut target = successful_node(2);
    source.copy_discarded_status(&mut target).unwrap();

    for sub in target.sub_nodes() {
        assert!(sub.is_discarded());
        assert!(sub.valid_status());
        assert!(sub.update_success());
        assert!(sub.is_node_connect_states_set());
    }

    let mut restored = successful_node(2);
    node(2).copy_discarded_status(&mut restored).unwrap();
    assert!(!restored.is_discarded());
    assert_eq!(restored.overall_update_state(), OverallStatus::Success);
}

#[test]
fn test_copy_between_topologies_rejected() {
    let source = successful_node(2);
    let mut target = node(3);
    assert!(matches!(
        source.copy_update_status(&mut target),
        Err(TrackerError::TopologyMismatch(_))
    ));
}

// =============================================================================
// Positional assembly
// =============================================================================

#[test]
fn test_connect_states_fan_out_by_position() {
    let mut node = node(3);
    let states: Vec<NodeConnectState> = (0..3)
        .map(|k| NodeConnectState {
            information_read: if k == 1 {
                ProgressState::Error
            } else {
                ProgressState::Ok
            },
            authentication_necessary: k == 2,
            ..Default::default()
        })
        .collect();
    let errors: Vec<PreconditionErrors> = (0..3)
        .map(|k| PreconditionErrors {
            nvm_write_error: k == 0,
            ..Default::default()
        })
        .collect();
    node.set_node_connect_states(states.clone(), errors.clone())
        .unwrap();

    for k in 0..3 {
        let sub = node.sub_node_by_sub_node_index(k).unwrap();
        assert_eq!(sub.node_connect_states(), Some(&states[k]));
        assert_eq!(sub.precondition_errors(), errors[k]);
    }
}

#[test]
fn test_update_states_fan_out_by_position() {
    let mut node = node(2);
    let states: Vec<NodeUpdateState> = ["a.hex", "b.hex"]
        .iter()
        .map(|name| NodeUpdateState {
            hex_files: vec![HexFileState::new(*name)],
            ..Default::default()
        })
        .collect();
    node.set_node_update_states(states).unwrap();

    let names: Vec<String> = node
        .sub_nodes()
        .map(|s| s.node_update_states().unwrap().hex_files[0].file.file_name.clone())
        .collect();
    assert_eq!(names, vec!["a.hex".to_string(), "b.hex".to_string()]);
}

#[test]
fn test_length_mismatch_applies_nothing() {
    let mut node = node(3);
    let result = node.set_node_connect_states(
        vec![connected_ok(); 2],
        vec![PreconditionErrors::default(); 3],
    );
    assert_eq!(
        result,
        Err(TrackerError::LengthMismatch {
            what: "connect states",
            expected: 3,
            actual: 2,
        })
    );
    assert!(node.sub_nodes().all(|s| !s.is_node_connect_states_set()));

    assert!(node
        .set_node_update_states(vec![NodeUpdateState::default(); 4])
        .is_err());
    assert!(node.sub_nodes().all(|s| !s.is_node_update_states_set()));
}

// =============================================================================
// Estimator
// =============================================================================

#[test]
fn test_size_accumulation() {
    let mut estimator = FileSizeEstimator::default();
    estimator.append_files(0, &[10, 20], &[]).unwrap();
    estimator.append_files(1, &[5], &[]).unwrap();
    assert_eq!(estimator.overall_files_size(), 35);
}

#[test]
fn test_estimate_boundary() {
    let mut estimator = FileSizeEstimator::default();
    estimator.append_files(0, &[1000], &[]).unwrap();
    estimator.append_files(1, &[2000], &[]).unwrap();
    assert_eq!(estimator.estimated_time_s(), None);

    estimator.set_elapsed_time_for_node(0, 1000).unwrap();
    assert_eq!(estimator.rate_for_node(0), Some(1.0));
    assert_eq!(estimator.remaining_bytes(), 2000);
    assert_eq!(estimator.estimated_time_s(), Some(2));
}

trait SummaryStatuses {
    fn summary_statuses(&self) -> (OverallStatus, OverallStatus, bool);
}

impl SummaryStatuses for NodeAggregate {
    fn summary_statuses(&self) -> (OverallStatus, OverallStatus, bool) {
        (
            self.overall_initial_state(),
            self.overall_update_state(),
            self.is_discarded(),
        )
    }
}
