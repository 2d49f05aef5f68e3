//! Uninstall phase: remove daemons, data directories, and the install
//! checkout from every node.

use crate::error::Result;
use crate::report;
use crate::reservation::{Node, Reservation};
use crate::runner::{run_many_seq, RemoteAction};
use crate::session::PoolHandle;

use super::CommonOptions;

#[derive(Debug, Clone)]
pub struct UninstallOptions {
    pub common: CommonOptions,
    /// Remote install directory to delete; left in place when absent.
    pub install_dir: Option<String>,
}

/// Remove the deployment from every node.
///
/// The commands tolerate absence — purging packages that were never
/// installed or deleting directories that are gone exits zero — so a node
/// that is already clean never fails the run. Real failures (a held dpkg
/// lock, a busy mount) still do.
pub fn uninstall(reservation: &Reservation, options: &UninstallOptions) -> Result<()> {
    let silent = options.common.silent;
    reservation.common_user()?;
    let (admin, _) = reservation.pick_admin(options.common.admin_id)?;
    report::progress(silent, &format!("Picked admin node: {}", admin));

    let credentials = options.common.credentials();
    let handle = PoolHandle::acquire(None, reservation.nodes(), &credentials)?;
    let pool = handle.pool();

    let nodes: Vec<&Node> = reservation.nodes().iter().collect();
    report::progress(silent, "Uninstalling from all nodes...");
    let results = run_many_seq(pool, &nodes, |_| {
        let mut actions = vec![
            RemoteAction::sudo(
                "sh -c 'apt-get purge -y ceph-base ceph-common ceph-fuse ceph-mgr ceph-osd \
                 ceph-mon librdmacm1 2>/dev/null; apt-get autoremove -y'",
            ),
            RemoteAction::sudo(
                "sh -c 'for d in /var/lib/ceph/osd/ceph-*; do \
                 [ -e \"$d\" ] && umount -f \"$d\" 2>/dev/null; done; true'",
            ),
            RemoteAction::sudo("rm -rf /var/lib/ceph"),
        ];
        if let Some(dir) = &options.install_dir {
            actions.push(RemoteAction::sudo(format!("rm -rf {}", dir)));
        }
        actions
    });
    report::require_all("uninstall", &results)?;
    report::progress(silent, "Uninstalled from all nodes.");
    Ok(())
}
