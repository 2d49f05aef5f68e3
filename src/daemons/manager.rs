//! Manager daemon control.

use crate::reservation::Node;
use crate::runner::{run, run_many, RemoteAction, StepResult};
use crate::session::SessionPool;

use super::{deploy_tool, hostnames};

/// Create and start manager daemons on the given nodes.
pub fn create(pool: &SessionPool, admin: &Node, managers: &[&Node]) -> StepResult {
    let action = RemoteAction::shell(format!(
        "{} --overwrite-conf mgr create {}",
        deploy_tool(),
        hostnames(managers)
    ));
    run(pool, admin, &action)
}

/// Stop the manager target on every manager node.
///
/// Managers are halted and recreated so re-running the start phase has no
/// side effects; a manager that was never started stops "successfully".
pub fn stop_all(pool: &SessionPool, managers: &[&Node]) -> Vec<StepResult> {
    run_many(pool, managers, |_| {
        RemoteAction::sudo("systemctl stop ceph-mgr.target")
    })
}
