//! Monitor daemon control.

use crate::reservation::Node;
use crate::runner::{run, run_many, RemoteAction, StepResult};
use crate::session::SessionPool;

use super::{deploy_tool, hostnames};

/// Register the monitor set with the deploy tool (writes the config
/// skeleton on the admin).
pub fn create(pool: &SessionPool, admin: &Node, monitors: &[&Node]) -> StepResult {
    let action = RemoteAction::shell(format!(
        "{} -q new {}",
        deploy_tool(),
        hostnames(monitors)
    ));
    run(pool, admin, &action)
}

/// Boot the initial monitor quorum.
pub fn start_initial(pool: &SessionPool, admin: &Node) -> StepResult {
    let action = RemoteAction::shell(format!(
        "{} -q --overwrite-conf mon create-initial",
        deploy_tool()
    ));
    run(pool, admin, &action)
}

/// Push config plus admin keyring to the given hosts.
pub fn push_admin_credentials(pool: &SessionPool, admin: &Node, nodes: &[&Node]) -> StepResult {
    let action = RemoteAction::shell(format!(
        "{} --overwrite-conf admin {}",
        deploy_tool(),
        hostnames(nodes)
    ));
    run(pool, admin, &action)
}

/// Push config (without keys) to the given hosts.
pub fn push_config(pool: &SessionPool, admin: &Node, nodes: &[&Node]) -> StepResult {
    let action = RemoteAction::shell(format!(
        "{} --overwrite-conf config push {}",
        deploy_tool(),
        hostnames(nodes)
    ));
    run(pool, admin, &action)
}

/// Stop the monitor target on every monitor node.
pub fn stop_all(pool: &SessionPool, monitors: &[&Node]) -> Vec<StepResult> {
    run_many(pool, monitors, |_| {
        RemoteAction::sudo("systemctl stop ceph-mon.target")
    })
}

/// Restart monitors so config changes take effect.
pub fn restart_all(pool: &SessionPool, monitors: &[&Node]) -> Vec<StepResult> {
    run_many(pool, monitors, |_| {
        RemoteAction::sudo("systemctl restart ceph-mon.target")
    })
}
