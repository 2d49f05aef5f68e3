//! Metadata-server daemon control.

use crate::reservation::Node;
use crate::runner::{run, run_many, RemoteAction, StepResult};
use crate::session::SessionPool;

use super::{deploy_tool, hostnames};

/// Create and start metadata servers on the given nodes.
pub fn create(pool: &SessionPool, admin: &Node, metadata_servers: &[&Node]) -> StepResult {
    let action = RemoteAction::shell(format!(
        "{} mds create {}",
        deploy_tool(),
        hostnames(metadata_servers)
    ));
    run(pool, admin, &action)
}

/// Stop the metadata-server target on every mds node.
pub fn stop_all(pool: &SessionPool, metadata_servers: &[&Node]) -> Vec<StepResult> {
    run_many(pool, metadata_servers, |_| {
        RemoteAction::sudo("systemctl stop ceph-mds.target")
    })
}
