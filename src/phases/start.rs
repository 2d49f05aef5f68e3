//! Start phase: boot the full cluster on an installed reservation.
//!
//! The step sequence is identical for both storage backends; everything
//! backend-specific is supplied by the [`StorageBackend`] strategy.

use std::path::Path;

use crate::backend::StorageBackend;
use crate::cluster_config::{self, ConfigRules};
use crate::daemons::{cephfs, manager, mds, monitor, osd, pool as pools};
use crate::designation::Topology;
use crate::error::{DeployError, Result};
use crate::placement::{self, DEFAULT_POOL_COUNT};
use crate::report;
use crate::reservation::{Node, NodeId, Reservation};
use crate::runner::{run, RemoteAction};
use crate::session::{PoolHandle, SessionPool};

use super::CommonOptions;

#[derive(Debug, Clone)]
pub struct StartOptions {
    pub common: CommonOptions,
    pub backend: StorageBackend,
    /// Where cephfs is mounted on every node.
    pub mountpoint: String,
    pub osd_op_threads: u32,
    pub osd_pool_size: u32,
    pub osd_max_obj_size: u64,
    /// Explicit placement-group count; computed when absent.
    pub placement_groups: Option<i64>,
    /// Toggles the cephfs client I/O cache.
    pub use_client_cache: bool,
    /// Retry budget for the mount step.
    pub retries: u32,
}

/// Boot the cluster. Returns the admin node id on success.
///
/// A caller running several phases against one reservation may hand in its
/// own session pool; it then stays open after this phase returns.
pub fn start(
    reservation: &Reservation,
    options: &StartOptions,
    existing_pool: Option<&SessionPool>,
) -> Result<NodeId> {
    let silent = options.common.silent;

    // Preconditions, all checked before any remote action.
    reservation.common_user()?;
    let topology = Topology::classify(reservation);
    topology.validate_for_start()?;
    let placement_groups = placement::placement_groups(
        topology.osd_instance_count(),
        DEFAULT_POOL_COUNT,
        options.placement_groups,
    )?;

    let (admin, _) = reservation.pick_admin(options.common.admin_id)?;
    report::progress(silent, &format!("Picked admin node: {}", admin));

    let credentials = options.common.credentials();
    let handle = PoolHandle::acquire(existing_pool, reservation.nodes(), &credentials)?;
    let pool = handle.pool();

    check_installed(pool, admin)?;

    // Step: monitors.
    report::progress(silent, "Starting monitors...");
    report::require_all("create monitors", &[monitor::create(pool, admin, &topology.monitors)])?;
    report::require_all("start monitors", &[monitor::start_initial(pool, admin)])?;
    let mon_mgr: Vec<&Node> = union(&topology.monitors, &topology.managers);
    report::require_all(
        "push admin credentials",
        &[monitor::push_admin_credentials(pool, admin, &mon_mgr)],
    )?;

    // Step: managers. Stale managers are halted first so re-running this
    // phase has no side effects.
    report::progress(silent, "Starting managers...");
    report::record_failures(
        "stop stale managers",
        &manager::stop_all(pool, &topology.managers),
    );
    report::require_all("create managers", &[manager::create(pool, admin, &topology.managers)])?;

    // Step: config. Merge the managed rules into the skeleton the deploy
    // tool generated on the admin, push it everywhere, restart monitors so
    // the rules take effect.
    report::progress(silent, "Editing configs...");
    push_config(pool, admin, &topology, options)?;

    // Step: OSD bootstrap keys.
    report::progress(silent, "Deploying OSD keys...");
    report::require_all(
        "copy OSD bootstrap keys",
        &osd::copy_bootstrap_keys(pool, admin, &topology.osds),
    )?;
    report::require_all(
        "install OSD bootstrap keys",
        &osd::install_bootstrap_key(pool, &topology.osds),
    )?;

    // Step: clear stale state. Mounts and pools from a previous run would
    // wedge the fresh boot.
    report::progress(silent, "Stopping old OSDs...");
    let all_nodes: Vec<&Node> = reservation.nodes().iter().collect();
    report::record_failures(
        "unmount stale cephfs",
        &cephfs::unmount_all(pool, &all_nodes, &options.mountpoint),
    );
    report::record_failures("destroy stale pools", &pools::destroy_all(pool, admin));
    options.backend.teardown_osds(pool, admin, &topology);

    // Step: boot OSD instances.
    report::progress(silent, "Booting OSDs...");
    report::require_all(
        "boot OSDs",
        &options.backend.boot_osds(pool, admin, &topology),
    )?;

    // Step: metadata servers.
    report::progress(silent, "Starting MDSs...");
    report::record_failures(
        "stop stale MDSs",
        &mds::stop_all(pool, &topology.metadata_servers),
    );
    report::require_all(
        "create MDSs",
        &[mds::create(pool, admin, &topology.metadata_servers)],
    )?;

    // Step: pools and the filesystem namespace.
    report::progress(silent, "Starting cephfs...");
    report::require_all(
        "create pools",
        &pools::create_all(pool, admin, placement_groups),
    )?;

    // Step: mount everywhere. The unmount is cleanup for half-mounted
    // leftovers; the mount itself retries while the quorum settles.
    report::record_failures(
        "unmount cephfs before mount",
        &cephfs::unmount_all(pool, &all_nodes, &options.mountpoint),
    );
    report::require_all(
        "mount cephfs",
        &cephfs::mount_all(pool, &all_nodes, &options.mountpoint, options.retries),
    )?;
    report::require_all(
        "chown admin files",
        &cephfs::chown_admin_files(pool, &all_nodes),
    )?;

    report::progress(silent, "Cluster ready.");
    Ok(admin.id)
}

/// The start phase requires the install phase's artifacts on the admin.
fn check_installed(pool: &SessionPool, admin: &Node) -> Result<()> {
    let tool = run(
        pool,
        admin,
        &RemoteAction::shell(format!("test -x {}", crate::daemons::deploy_tool())).quiet(),
    );
    if !tool.success {
        return Err(DeployError::configuration(format!(
            "deploy tool not found on {}; is this the admin node, and did the install phase run?",
            admin
        )));
    }
    let key = run(
        pool,
        admin,
        &RemoteAction::shell("test -f .ssh/rados_deploy.rsa").quiet(),
    );
    if !key.success {
        return Err(DeployError::configuration(format!(
            "internal cluster key not found on {}; run the install phase first",
            admin
        )));
    }
    Ok(())
}

/// Merge + push the cluster config and mirror the admin credentials into
/// `/etc/ceph` on the admin.
fn push_config(
    pool: &SessionPool,
    admin: &Node,
    topology: &Topology<'_>,
    options: &StartOptions,
) -> Result<()> {
    let existing = run(pool, admin, &RemoteAction::shell("cat ceph.conf").quiet());
    let existing_content = if existing.success { existing.stdout } else { String::new() };

    let rules = ConfigRules {
        osd_op_threads: options.osd_op_threads,
        osd_pool_size: options.osd_pool_size,
        osd_max_obj_size: options.osd_max_obj_size,
        use_client_cache: options.use_client_cache,
    };
    let merged = cluster_config::merge_rules(&existing_content, &rules, &options.backend);

    let session = pool.session(admin)?;
    {
        let guard = match session.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.upload(Path::new("ceph.conf"), merged.as_bytes(), 0o644)?;
    }

    report::require_all(
        "push config",
        &[monitor::push_config(pool, admin, &topology.designated)],
    )?;
    report::require_all("restart monitors", &monitor::restart_all(pool, &topology.monitors))?;

    for command in [
        "mkdir -p /etc/ceph".to_string(),
        "cp ceph.conf /etc/ceph/ceph.conf".to_string(),
        "cp ceph.client.admin.keyring /etc/ceph/ceph.client.admin.keyring".to_string(),
    ] {
        let result = run(pool, admin, &RemoteAction::sudo(command));
        report::require_all("install admin config", &[result])?;
    }
    Ok(())
}

/// Set union of two node-reference buckets, first occurrence wins.
fn union<'a>(left: &[&'a Node], right: &[&'a Node]) -> Vec<&'a Node> {
    let mut out: Vec<&'a Node> = left.to_vec();
    for node in right {
        if !out.iter().any(|n| n.id == node.id) {
            out.push(node);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reservation::test_support::node_with_designations;

    #[test]
    fn test_union_dedupes_by_id() {
        let a = node_with_designations(0, "mon");
        let b = node_with_designations(1, "mon,mgr");
        let c = node_with_designations(2, "mgr");
        let monitors = vec![&a, &b];
        let managers = vec![&b, &c];
        let joined = union(&monitors, &managers);
        let ids: Vec<_> = joined.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }
}
