//! Stop phase: symmetric teardown of a running cluster.
//!
//! Every step is best-effort per node: a daemon that is not running or a
//! mount that is already gone is not an error. Configuration and
//! connectivity problems still fail the run.

use crate::backend::StorageBackend;
use crate::daemons::{cephfs, manager, mds, monitor};
use crate::designation::Topology;
use crate::error::Result;
use crate::report;
use crate::reservation::{Node, Reservation};
use crate::session::{PoolHandle, SessionPool};

use super::CommonOptions;

#[derive(Debug, Clone)]
pub struct StopOptions {
    pub common: CommonOptions,
    pub backend: StorageBackend,
    pub mountpoint: String,
}

/// Tear the cluster down.
pub fn stop(
    reservation: &Reservation,
    options: &StopOptions,
    existing_pool: Option<&SessionPool>,
) -> Result<()> {
    let silent = options.common.silent;
    reservation.common_user()?;
    let topology = Topology::classify(reservation);
    let (admin, _) = reservation.pick_admin(options.common.admin_id)?;
    report::progress(silent, &format!("Picked admin node: {}", admin));

    let credentials = options.common.credentials();
    let handle = PoolHandle::acquire(existing_pool, reservation.nodes(), &credentials)?;
    let pool = handle.pool();

    let all_nodes: Vec<&Node> = reservation.nodes().iter().collect();
    report::progress(silent, "Unmounting cephfs...");
    report::record_failures(
        "unmount cephfs",
        &cephfs::unmount_all(pool, &all_nodes, &options.mountpoint),
    );

    report::progress(silent, "Stopping OSDs...");
    options.backend.stop_osds(pool, &topology);

    report::progress(silent, "Stopping monitors...");
    report::record_failures("stop monitors", &monitor::stop_all(pool, &topology.monitors));

    report::progress(silent, "Stopping managers...");
    report::record_failures("stop managers", &manager::stop_all(pool, &topology.managers));

    report::progress(silent, "Stopping MDSs...");
    report::record_failures(
        "stop MDSs",
        &mds::stop_all(pool, &topology.metadata_servers),
    );

    report::progress(silent, "Cluster stopped.");
    Ok(())
}
