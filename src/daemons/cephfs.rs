//! Cluster filesystem mount control.

use retry::delay::Fixed;
use retry::retry;

use crate::fanout;
use crate::reservation::Node;
use crate::runner::{run, run_many, RemoteAction, StepResult};
use crate::session::SessionPool;

/// Lazily unmount the filesystem on every node.
///
/// Stale mounts from a previous run are expected; a node without a mount
/// fails the command, which the caller treats as best-effort.
pub fn unmount_all(pool: &SessionPool, nodes: &[&Node], mountpoint: &str) -> Vec<StepResult> {
    run_many(pool, nodes, |_| {
        RemoteAction::sudo(format!("fusermount -uz {}", mountpoint)).quiet()
    })
}

/// Mount the filesystem on every node, with a per-node retry budget.
///
/// Mount availability depends on the monitor quorum settling, which is not
/// separately observable, so each node retries with a fixed 1 s backoff and
/// only reports failure once the budget is exhausted.
pub fn mount_all(
    pool: &SessionPool,
    nodes: &[&Node],
    mountpoint: &str,
    retries: u32,
) -> Vec<StepResult> {
    fanout::run_all(nodes, |node| mount_one(pool, node, mountpoint, retries))
        .into_iter()
        .zip(nodes)
        .map(|(result, node)| {
            result.unwrap_or_else(|| StepResult::aborted(node, "task died".to_string()))
        })
        .collect()
}

fn mount_one(pool: &SessionPool, node: &Node, mountpoint: &str, retries: u32) -> StepResult {
    let prepare = run(
        pool,
        node,
        &RemoteAction::sudo(format!("mkdir -p {}", mountpoint)),
    );
    if !prepare.success {
        return prepare;
    }
    let install = run(
        pool,
        node,
        &RemoteAction::sudo("apt-get install ceph-fuse -y").quiet(),
    );
    if !install.success {
        return install;
    }

    let outcome = retry(Fixed::from_millis(1000).take(retries as usize), || {
        let result = run(
            pool,
            node,
            &RemoteAction::sudo(format!("ceph-fuse {}", mountpoint)).quiet(),
        );
        if result.success {
            Ok(result)
        } else {
            Err(result)
        }
    });
    match outcome {
        Ok(result) => result,
        Err(retry::Error { error, .. }) => error,
    }
}

/// Hand ownership of the pushed config and admin keyring to the login user
/// so the cluster is usable without sudo.
pub fn chown_admin_files(pool: &SessionPool, nodes: &[&Node]) -> Vec<StepResult> {
    fanout::run_all(nodes, |node| chown_one(pool, node))
        .into_iter()
        .zip(nodes)
        .map(|(result, node)| {
            result.unwrap_or_else(|| StepResult::aborted(node, "task died".to_string()))
        })
        .collect()
}

fn chown_one(pool: &SessionPool, node: &Node) -> StepResult {
    let group = run(pool, node, &RemoteAction::shell("id -gn"));
    if !group.success {
        return group;
    }
    let owner = format!("{}:{}", node.user, group.stdout.trim());
    let conf = run(
        pool,
        node,
        &RemoteAction::sudo(format!("chown {} /etc/ceph/ceph.conf", owner)),
    );
    if !conf.success {
        return conf;
    }
    run(
        pool,
        node,
        &RemoteAction::sudo(format!(
            "chown {} /etc/ceph/ceph.client.admin.keyring",
            owner
        )),
    )
}
