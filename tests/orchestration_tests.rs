//! Tests for Orchestration Building Blocks
//!
//! These tests verify:
//! - Deterministic admin picking
//! - Placement-group planning and override handling
//! - Remote action descriptors
//! - Result aggregation preconditions

use std::collections::BTreeMap;

use rados_deploy::reservation::{NodeRecord, Reservation};
use rados_deploy::{placement_groups, DeployError, RemoteAction};

fn node(id: u64, ip_public: &str) -> NodeRecord {
    let mut extra_info = BTreeMap::new();
    extra_info.insert("user".to_string(), "ubuntu".to_string());
    extra_info.insert("designations".to_string(), "mon,osd".to_string());
    NodeRecord {
        id,
        hostname: format!("node{}", id),
        ip_public: ip_public.to_string(),
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
// Admin Picking
// =============================================================================

#[test]
fn test_pick_admin_is_deterministic_across_calls() {
    let reservation = reservation(vec![
        node(0, "10.0.0.40"),
        node(1, "10.0.0.17"),
        node(2, "10.0.0.29"),
    ]);

    let first = reservation.pick_admin(None).unwrap().0.id;
    for _ in 0..10 {
        assert_eq!(reservation.pick_admin(None).unwrap().0.id, first);
    }
    assert_eq!(first, 1, "smallest public address wins");
}

#[test]
fn test_pick_admin_explicit_id_beats_ordering() {
    let reservation = reservation(vec![node(0, "10.0.0.1"), node(1, "10.0.0.2")]);
    let (admin, rest) = reservation.pick_admin(Some(1)).unwrap();
    assert_eq!(admin.id, 1);
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].id, 0);
}

#[test]
fn test_pick_admin_unknown_id_is_not_found() {
    let reservation = reservation(vec![node(0, "10.0.0.1"), node(1, "10.0.0.2")]);
    let err = reservation.pick_admin(Some(42)).expect_err("id 42 does not exist");
    assert!(matches!(err, DeployError::NotFound(_)));
}

#[test]
fn test_pick_admin_ordering_is_lexicographic() {
    // String comparison, as the addresses come from the provider verbatim:
    // "10.0.0.100" sorts before "10.0.0.20".
    let reservation = reservation(vec![node(0, "10.0.0.20"), node(1, "10.0.0.100")]);
    assert_eq!(reservation.pick_admin(None).unwrap().0.id, 1);
}

// =============================================================================
// Placement Planning
// =============================================================================

#[test]
fn test_placement_groups_power_of_two_coverage() {
    for osds in 1..200usize {
        let pg = placement_groups(osds, 3, None).unwrap();
        let raw = (osds as f64) * 100.0 / 3.0 / 3.0;
        assert!(pg.is_power_of_two(), "osds={}: {} not a power of two", osds, pg);
        assert!(
            (pg as f64) >= raw,
            "osds={}: {} does not cover raw target {}",
            osds,
            pg,
            raw
        );
    }
}

#[test]
fn test_placement_groups_override_and_rejection() {
    assert_eq!(placement_groups(5, 3, Some(32)).unwrap(), 32);
    assert!(matches!(
        placement_groups(5, 3, Some(0)),
        Err(DeployError::Configuration(_))
    ));
    assert!(matches!(
        placement_groups(5, 3, Some(-1)),
        Err(DeployError::Configuration(_))
    ));
}

// =============================================================================
// Remote Actions
// =============================================================================

#[test]
fn test_remote_action_elevation_prefixes_sudo() {
    assert_eq!(
        RemoteAction::sudo("systemctl restart ceph-mon.target").command_line(),
        "sudo systemctl restart ceph-mon.target"
    );
    assert_eq!(RemoteAction::shell("id -gn").command_line(), "id -gn");
}
