//! Tests for Role Classification and Topology Validation
//!
//! These tests verify:
//! - Designation parsing from reservation metadata
//! - Role bucket classification
//! - Start-phase minimum count validation
//! - Same-user preconditions

use std::collections::BTreeMap;

use rados_deploy::designation::Topology;
use rados_deploy::reservation::{NodeRecord, Reservation};
use rados_deploy::DeployError;

fn node(id: u64, user: &str, designations: &str) -> NodeRecord {
    let mut extra_info = BTreeMap::new();
    extra_info.insert("user".to_string(), user.to_string());
    if !designations.is_empty() {
        extra_info.insert("designations".to_string(), designations.to_string());
    }
    NodeRecord {
        id,
        hostname: format!("node{}", id),
        ip_public: format!("10.0.0.{}", id + 1),
        ip_local: format!("192.168.1.{}", id + 1),
        extra_info,
    }
}

fn reservation(records: Vec<NodeRecord>) -> Reservation {
    let nodes = records
        .into_iter()
        .map(|r| r.into_node().expect("test node must validate"))
        .collect();
    Reservation::from_nodes(nodes).expect("test reservation must not be empty")
}

// =============================================================================
// End-to-End Classification Scenarios
// =============================================================================

#[test]
fn test_six_node_cluster_validates_for_start() {
    // 6 nodes: 3 monitors, 2 managers, 2 metadata servers, 4 osd-tagged
    // with one node double-tagged, so 5 OSD instances in total.
    let reservation = reservation(vec![
        node(0, "ubuntu", "mon"),
        node(1, "ubuntu", "mon,mds"),
        node(2, "ubuntu", "mon,mgr"),
        node(3, "ubuntu", "mgr,mds,osd"),
        node(4, "ubuntu", "osd,osd"),
        node(5, "ubuntu", "osd"),
    ]);

    let topology = Topology::classify(&reservation);
    assert!(topology.validate_for_start().is_ok());

    assert_eq!(topology.monitors.len(), 3);
    assert_eq!(topology.managers.len(), 2);
    assert_eq!(topology.metadata_servers.len(), 2);
    assert_eq!(topology.osds.len(), 3, "3 nodes hold the osd designation");
    assert_eq!(
        topology.osd_instance_count(),
        4 + 1,
        "double-tagged node contributes two instances"
    );

    // The placement planner must agree with the documented formula for
    // this cluster: 5 * 100 / 3 / 3 = 55.6, rounded up to 64.
    let pg = rados_deploy::placement_groups(topology.osd_instance_count(), 3, None).unwrap();
    assert_eq!(pg, 64);
}

#[test]
fn test_two_monitor_cluster_fails_validation_naming_deficit() {
    let reservation = reservation(vec![
        node(0, "ubuntu", "mon,mgr,mds,osd"),
        node(1, "ubuntu", "mon,mgr,mds,osd"),
        node(2, "ubuntu", "osd"),
    ]);

    let topology = Topology::classify(&reservation);
    let err = topology.validate_for_start().expect_err("2 monitors must fail");
    let msg = err.to_string();
    assert!(msg.contains("\"mon\""), "deficit must name the role: {}", msg);
    assert!(msg.contains("short 1"), "deficit must name the amount: {}", msg);
    // The other roles are satisfied and must not be reported.
    assert!(!msg.contains("\"osd\""), "osd is not under-provisioned: {}", msg);
}

#[test]
fn test_nodes_without_designations_are_skipped() {
    let reservation = reservation(vec![
        node(0, "ubuntu", "mon"),
        node(1, "ubuntu", ""),
    ]);
    let topology = Topology::classify(&reservation);
    assert_eq!(topology.designated.len(), 1);
    assert_eq!(topology.monitors.len(), 1);
    assert_eq!(topology.osd_instance_count(), 0);
}

#[test]
fn test_unknown_designation_is_configuration_error() {
    let record = node(0, "ubuntu", "mon,conductor");
    let err = record.into_node().expect_err("unknown designation must fail");
    assert!(matches!(err, DeployError::Configuration(_)));
    assert!(err.to_string().contains("conductor"));
}

#[test]
fn test_designation_parsing_is_case_insensitive() {
    let record = node(0, "ubuntu", "MON,Osd,mds");
    let parsed = record.into_node().expect("mixed case must parse");
    assert_eq!(parsed.designations.len(), 3);
}

// =============================================================================
// Same-User Precondition
// =============================================================================

#[test]
fn test_uniform_users_accepted() {
    let reservation = reservation(vec![
        node(0, "ubuntu", "mon"),
        node(1, "ubuntu", "mon"),
        node(2, "ubuntu", "mon"),
    ]);
    assert!(reservation.all_same_user());
    assert_eq!(reservation.common_user().unwrap(), "ubuntu");
}

#[test]
fn test_mixed_users_refused_before_any_remote_action() {
    let reservation = reservation(vec![
        node(0, "alice", "mon"),
        node(1, "bob", "mon"),
    ]);
    assert!(!reservation.all_same_user());
    let err = reservation.common_user().expect_err("mixed users must fail");
    assert!(matches!(err, DeployError::Configuration(_)));
}
