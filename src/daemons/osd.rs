//! OSD daemon control.
//!
//! Booting OSDs is the only daemon operation that differs per storage
//! backend: memstore instances are assembled by hand on each node, while
//! bluestore consumes backing devices either through ceph-volume on the
//! node or through the deploy tool on the admin.

use std::path::Path;

use crate::reservation::Node;
use crate::runner::{run, run_many, run_many_seq, RemoteAction, StepResult};
use crate::session::SessionPool;

use super::deploy_tool;

/// Backing devices of a device-backed OSD node.
pub fn devices(node: &Node) -> Vec<String> {
    node.device_path
        .as_deref()
        .unwrap_or("")
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.trim().to_string())
        .collect()
}

/// Read the bootstrap keyring from the admin home and push it into every
/// OSD node's home directory.
pub fn copy_bootstrap_keys(pool: &SessionPool, admin: &Node, osds: &[&Node]) -> Vec<StepResult> {
    let keyring = run(
        pool,
        admin,
        &RemoteAction::shell("cat ceph.bootstrap-osd.keyring").quiet(),
    );
    if !keyring.success {
        return vec![keyring];
    }
    let payload = keyring.stdout.into_bytes();

    crate::fanout::run_all(osds, |node| {
        let outcome = match pool.session(node) {
            Ok(session) => {
                let guard = match session.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                guard.upload(Path::new("ceph.bootstrap-osd.keyring"), &payload, 0o600)
            }
            Err(e) => Err(e),
        };
        match outcome {
            Ok(()) => StepResult {
                node_id: node.id,
                node_name: node.to_string(),
                success: true,
                stdout: String::new(),
                stderr: String::new(),
                exit_code: Some(0),
            },
            Err(e) => StepResult::aborted(node, e.to_string()),
        }
    })
    .into_iter()
    .zip(osds)
    .map(|(result, node)| {
        result.unwrap_or_else(|| StepResult::aborted(node, "task died".to_string()))
    })
    .collect()
}

/// Install the pushed bootstrap keyring into the system locations on each
/// OSD node.
pub fn install_bootstrap_key(pool: &SessionPool, osds: &[&Node]) -> Vec<StepResult> {
    run_many_seq(pool, osds, |_| {
        vec![
            RemoteAction::sudo("cp ceph.bootstrap-osd.keyring /etc/ceph/ceph.keyring"),
            RemoteAction::sudo(
                "cp ceph.bootstrap-osd.keyring /var/lib/ceph/bootstrap-osd/ceph.keyring",
            ),
        ]
    })
}

/// Stop the OSD target on every OSD node.
pub fn stop_target_all(pool: &SessionPool, osds: &[&Node]) -> Vec<StepResult> {
    run_many(pool, osds, |_| {
        RemoteAction::sudo("systemctl stop ceph-osd.target")
    })
}

/// Deregister stale OSD ids from the cluster maps, admin-side.
///
/// Runs down/out/rm/crush-rm/auth-del over the id range; ids that were
/// never registered fail their command, which is expected cleanup noise.
/// `id_slack` widens the range for backends that may have left extra ids
/// behind.
pub fn deregister_stale(
    pool: &SessionPool,
    admin: &Node,
    instance_count: usize,
    id_slack: usize,
) {
    for template in [
        "ceph osd down osd.{}",
        "ceph osd out osd.{}",
        "ceph osd rm osd.{}",
        "ceph osd crush rm osd.{}",
        "ceph auth del osd.{}",
    ] {
        for id in 0..instance_count + id_slack {
            let cmd = template.replace("{}", &id.to_string());
            let _ = run(pool, admin, &RemoteAction::sudo(cmd).quiet());
        }
    }
}

/// Destroy the LVM state on every backing device of every OSD node.
pub fn zap_devices(pool: &SessionPool, osds: &[&Node]) -> Vec<StepResult> {
    run_many_seq(pool, osds, |node| {
        devices(node)
            .into_iter()
            .map(|device| {
                RemoteAction::sudo(format!("ceph-volume lvm zap {} --destroy", device)).quiet()
            })
            .collect()
    })
}

/// Boot every memstore OSD instance hosted on `node`, in sequence.
///
/// Each instance is assembled by hand: generate a cephx secret, register a
/// fresh OSD id, lay out its data directory and keyring, then enable and
/// start the unit. Instances on one node share its session, so they
/// serialize naturally.
pub fn boot_memstore_node(pool: &SessionPool, node: &Node) -> StepResult {
    let mut last = StepResult::aborted(node, "no OSD instances designated".to_string());
    for _ in 0..node.osd_instances() {
        last = boot_memstore_instance(pool, node);
        if !last.success {
            return last;
        }
    }
    last
}

fn boot_memstore_instance(pool: &SessionPool, node: &Node) -> StepResult {
    let secret = run(
        pool,
        node,
        &RemoteAction::sudo("ceph-authtool --gen-print-key").quiet(),
    );
    if !secret.success {
        return secret;
    }
    let secret_key = secret.stdout.trim().to_string();

    let uuid = run(pool, node, &RemoteAction::shell("uuidgen"));
    if !uuid.success {
        return uuid;
    }
    let osd_uuid = uuid.stdout.trim().to_string();

    let registered = run(
        pool,
        node,
        &RemoteAction::sudo(format!(
            "ceph osd new {} -i - -n client.bootstrap-osd -k /var/lib/ceph/bootstrap-osd/ceph.keyring",
            osd_uuid
        ))
        .with_stdin(format!("{{\"cephx_secret\": \"{}\"}}", secret_key))
        .quiet(),
    );
    if !registered.success {
        return registered;
    }
    let osd_id = registered.stdout.trim().to_string();

    // A stale mount under the data dir is fine to miss (exit 32); anything
    // else aborts this instance.
    let unmounted = run(
        pool,
        node,
        &RemoteAction::sudo(format!("umount -f /var/lib/ceph/osd/ceph-{}", osd_id)).quiet(),
    );
    if !unmounted.success && unmounted.exit_code != Some(32) {
        return unmounted;
    }

    let setup = [
        format!("mkdir -p /var/lib/ceph/osd/ceph-{}", osd_id),
        format!("rm -rf /var/lib/ceph/osd/ceph-{}/*", osd_id),
        format!(
            "ceph-authtool --create-keyring /var/lib/ceph/osd/ceph-{0}/keyring --name osd.{0} --add-key {1}",
            osd_id, secret_key
        ),
        format!("ceph-osd -i {} --mkfs --osd-uuid {}", osd_id, osd_uuid),
        format!("chown -R ceph:ceph /var/lib/ceph/osd/ceph-{}", osd_id),
        format!("systemctl enable ceph-osd@{}", osd_id),
        format!("systemctl start ceph-osd@{}", osd_id),
    ];
    let mut last = unmounted;
    for cmd in setup {
        last = run(pool, node, &RemoteAction::sudo(cmd).quiet());
        if !last.success {
            return last;
        }
    }
    last
}

/// Boot the bluestore OSDs of `node` through ceph-volume, one batch per
/// backing device.
pub fn boot_bluestore_volume_node(pool: &SessionPool, node: &Node) -> StepResult {
    let devs = devices(node);
    if devs.is_empty() {
        return StepResult::aborted(
            node,
            "no device_path set for device-backed OSD node".to_string(),
        );
    }
    let per_device = node.osd_instances();
    let mut last = StepResult::aborted(node, "no devices".to_string());
    for device in devs {
        last = run(
            pool,
            node,
            &RemoteAction::sudo(format!(
                "ceph-volume lvm batch --yes --no-auto --osds-per-device {} {}",
                per_device, device
            )),
        );
        if !last.success {
            return last;
        }
    }
    last
}

/// Boot the bluestore OSDs of `node` through the deploy tool on the admin,
/// one instance per backing device entry.
pub fn boot_bluestore_deploy(pool: &SessionPool, admin: &Node, node: &Node) -> Vec<StepResult> {
    let devs = devices(node);
    let instances = node.osd_instances();
    if devs.len() < instances {
        return vec![StepResult::aborted(
            node,
            format!(
                "node lists {} backing device(s) but {} OSD instance(s)",
                devs.len(),
                instances
            ),
        )];
    }
    (0..instances)
        .map(|i| {
            let mut result = run(
                pool,
                admin,
                &RemoteAction::shell(format!(
                    "{} -q osd create --data {} {}",
                    deploy_tool(),
                    devs[i],
                    node.hostname
                )),
            );
            // Attribute the outcome to the OSD node, not the admin.
            result.node_id = node.id;
            result.node_name = node.to_string();
            result
        })
        .collect()
}

/// Restart the OSD target everywhere so redistributed libraries load.
pub fn restart_target_all(pool: &SessionPool, nodes: &[&Node]) -> Vec<StepResult> {
    run_many(pool, nodes, |_| {
        RemoteAction::sudo("systemctl restart ceph-osd.target")
    })
}
