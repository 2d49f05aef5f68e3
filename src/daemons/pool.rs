//! Storage pool and filesystem namespace control, admin-side.

use crate::reservation::Node;
use crate::runner::{run, RemoteAction, StepResult};
use crate::session::SessionPool;

/// Remove the filesystem namespace and every backing pool.
///
/// Cleanup before a (re)start; pools that do not exist fail their removal
/// command, which the caller treats as best-effort.
pub fn destroy_all(pool: &SessionPool, admin: &Node) -> Vec<StepResult> {
    let commands = [
        "ceph fs fail cephfs",
        "ceph fs rm cephfs --yes-i-really-mean-it",
        "ceph osd pool rm cephfs_data cephfs_data --yes-i-really-really-mean-it",
        "ceph osd pool rm cephfs_metadata cephfs_metadata --yes-i-really-really-mean-it",
        "ceph osd pool rm device_health_metrics device_health_metrics --yes-i-really-really-mean-it",
    ];
    commands
        .iter()
        .map(|cmd| run(pool, admin, &RemoteAction::sudo(*cmd).quiet()))
        .collect()
}

/// Create the data and metadata pools and the filesystem on top of them.
///
/// `placement_groups` sizes both pools; autoscaling is pinned off so the
/// planner's count stays authoritative.
pub fn create_all(pool: &SessionPool, admin: &Node, placement_groups: u32) -> Vec<StepResult> {
    let commands = [
        format!(
            "ceph osd pool create cephfs_data {0} {0}",
            placement_groups
        ),
        format!(
            "ceph osd pool create cephfs_metadata {0} {0}",
            placement_groups
        ),
        "ceph osd pool set cephfs_data pg_autoscale_mode off".to_string(),
        "ceph fs new cephfs cephfs_metadata cephfs_data".to_string(),
    ];
    let mut results = Vec::new();
    for cmd in &commands {
        let result = run(pool, admin, &RemoteAction::sudo(cmd.clone()));
        let failed = !result.success;
        results.push(result);
        if failed {
            break;
        }
    }
    results
}
