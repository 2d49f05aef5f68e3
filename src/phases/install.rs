//! Install phase: cluster SSH trust, ceph daemons, and the connector
//! library.

use std::fs;
use std::process::Command;

use log::info;

use crate::designation::Topology;
use crate::error::{DeployError, Result};
use crate::fanout;
use crate::report;
use crate::reservation::{Node, NodeId, Reservation};
use crate::runner::{run, RemoteAction, StepResult};
use crate::session::{PoolHandle, SessionPool};

use super::CommonOptions;

/// Name of the internal cluster keypair under `~/.ssh` on every node.
const CLUSTER_KEY: &str = "rados_deploy.rsa";

#[derive(Debug, Clone)]
pub struct InstallOptions {
    pub common: CommonOptions,
    /// Remote checkout/build directory, relative to the remote home.
    pub install_dir: String,
    /// Compile parallelism for the connector build.
    pub cores: u32,
    /// Rebuild the connector even when a previous artifact exists.
    pub force_reinstall: bool,
    /// Also install the generated SSH client config for root.
    pub use_sudo: bool,
    /// Internal (private, public) keypair to install; generated when absent.
    pub cluster_keypair: Option<(String, String)>,
}

/// Install the full stack on the reservation. Returns the admin node id.
pub fn install(reservation: &Reservation, options: &InstallOptions) -> Result<NodeId> {
    reservation.common_user()?;
    let (admin, _) = reservation.pick_admin(options.common.admin_id)?;
    report::progress(options.common.silent, &format!("Picked admin node: {}", admin));

    let credentials = options.common.credentials();
    let handle = PoolHandle::acquire(None, reservation.nodes(), &credentials)?;
    let pool = handle.pool();

    install_ssh_trust(reservation, pool, options)?;
    install_ceph(reservation, pool, admin, options)?;
    install_connector(reservation, pool, admin, options)?;

    Ok(admin.id)
}

/// Step 1: make sure every node trusts every other node over the internal
/// keypair. Skipped entirely when the keypair is already installed
/// everywhere.
pub fn install_ssh_trust(
    reservation: &Reservation,
    pool: &SessionPool,
    options: &InstallOptions,
) -> Result<()> {
    let user = reservation.common_user()?;
    let nodes: Vec<&Node> = reservation.nodes().iter().collect();

    // Probe for the installed fingerprint on every node.
    let expected = options
        .cluster_keypair
        .as_ref()
        .map(|(private, _)| sha256_hex(private.as_bytes()));
    let probes = fanout::run_all(&nodes, |node| {
        run(
            pool,
            node,
            &RemoteAction::shell(format!(
                "sha256sum .ssh/{} | cut -d' ' -f1",
                CLUSTER_KEY
            ))
            .quiet(),
        )
    });
    let installed_everywhere = probes.iter().all(|probe| match probe {
        Some(result) if result.success => match &expected {
            Some(fingerprint) => result.stdout.trim() == fingerprint,
            None => true,
        },
        _ => false,
    });
    if installed_everywhere {
        report::progress(options.common.silent, "SSH keys already installed.");
        return Ok(());
    }

    let (private_key, public_key) = match &options.cluster_keypair {
        Some(pair) => pair.clone(),
        None => generate_keypair()?,
    };

    // Cluster-wide artifacts: /etc/hosts additions and the client config.
    let hosts_block: String = reservation
        .nodes()
        .iter()
        .map(|n| format!("{} {}\n", n.ip_local, n.hostname))
        .collect();
    let config_block: String = reservation
        .nodes()
        .iter()
        .map(|n| {
            format!(
                "\nHost {0}\n    Hostname {0}\n    User {1}\n    IdentityFile ~/.ssh/{2}\n    StrictHostKeyChecking no\n    IdentitiesOnly yes\n",
                n.hostname, user, CLUSTER_KEY
            )
        })
        .collect();

    let results: Vec<StepResult> = fanout::run_all(&nodes, |node| {
        install_trust_one(
            pool,
            node,
            &private_key,
            &public_key,
            &hosts_block,
            &config_block,
            options.use_sudo,
        )
    })
    .into_iter()
    .zip(&nodes)
    .map(|(result, node)| {
        result.unwrap_or_else(|| StepResult::aborted(node, "task died".to_string()))
    })
    .collect();
    report::require_all("install SSH trust", &results)?;
    report::progress(options.common.silent, "Installed SSH keys.");
    Ok(())
}

fn install_trust_one(
    pool: &SessionPool,
    node: &Node,
    private_key: &str,
    public_key: &str,
    hosts_block: &str,
    config_block: &str,
    use_sudo: bool,
) -> StepResult {
    let result = run(pool, node, &RemoteAction::shell("mkdir -p .ssh"));
    if !result.success {
        return result;
    }

    let uploads: [(&str, &str, i32); 4] = [
        (".ssh/rados_deploy.rsa", private_key, 0o600),
        (".ssh/rados_deploy.rsa.pub", public_key, 0o644),
        ("rados_deploy_hosts", hosts_block, 0o644),
        ("rados_deploy_ssh_config", config_block, 0o644),
    ];
    for (dest, content, mode) in uploads {
        let outcome = match pool.session(node) {
            Ok(session) => {
                let guard = match session.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                guard.upload(std::path::Path::new(dest), content.as_bytes(), mode)
            }
            Err(e) => Err(e),
        };
        if let Err(e) = outcome {
            return StepResult::aborted(node, e.to_string());
        }
    }

    let first_host = hosts_block.lines().next().unwrap_or("").to_string();
    let pubkey_line = public_key.trim();
    let commands = vec![
        format!(
            "grep -qxF '{}' /etc/hosts || sudo sh -c 'cat rados_deploy_hosts >> /etc/hosts'",
            first_host
        ),
        format!(
            "grep -qF 'IdentityFile ~/.ssh/{}' .ssh/config 2>/dev/null || cat rados_deploy_ssh_config >> .ssh/config",
            CLUSTER_KEY
        ),
        format!(
            "grep -qxF '{}' .ssh/authorized_keys 2>/dev/null || echo '{}' >> .ssh/authorized_keys",
            pubkey_line, pubkey_line
        ),
        format!("chmod 600 .ssh/{}", CLUSTER_KEY),
    ];
    let mut last = result;
    for command in commands {
        last = run(pool, node, &RemoteAction::shell(command));
        if !last.success {
            return last;
        }
    }
    if use_sudo {
        last = run(
            pool,
            node,
            &RemoteAction::sudo("cp .ssh/config /root/.ssh/"),
        );
    }
    last
}

/// Step 2: deploy tooling and ceph daemons, driven from the admin node.
fn install_ceph(
    reservation: &Reservation,
    pool: &SessionPool,
    admin: &Node,
    options: &InstallOptions,
) -> Result<()> {
    let silent = options.common.silent;
    let deploy_tool = crate::daemons::deploy_tool();

    // Deploy tool, installed once into the admin user's home.
    let present = run(
        pool,
        admin,
        &RemoteAction::shell(format!("test -x {}", deploy_tool)).quiet(),
    );
    if !present.success {
        report::progress(silent, "Installing deploy tool on the admin node...");
        let commands = vec![
            format!("mkdir -p {}", options.install_dir),
            format!(
                "test -d {0}/ceph-deploy || git clone https://github.com/ceph/ceph-deploy {0}/ceph-deploy",
                options.install_dir
            ),
            format!(
                "cd {}/ceph-deploy && pip3 install . --user",
                options.install_dir
            ),
        ];
        for command in commands {
            let result = run(pool, admin, &RemoteAction::shell(command));
            report::require_all("install deploy tool", &[result])?;
        }
    }

    let refreshed = run(pool, admin, &RemoteAction::sudo("apt-get update -y").quiet());
    report::require_all("refresh package index", &[refreshed])?;

    // Daemons per designation; nodes with no designation are skipped.
    let topology = Topology::classify(reservation);
    report::progress(silent, "Installing ceph daemons...");
    let mut results = Vec::new();
    for node in &topology.designated {
        let mut flags: Vec<String> = node
            .designations
            .iter()
            .map(|d| format!("--{}", d))
            .collect();
        flags.sort();
        flags.dedup();
        let result = run(
            pool,
            admin,
            &RemoteAction::shell(format!(
                "{} --overwrite-conf install --release octopus {} {}",
                deploy_tool,
                flags.join(" "),
                node.hostname
            )),
        );
        results.push(StepResult {
            node_id: node.id,
            node_name: node.to_string(),
            ..result
        });
    }
    report::require_all("install ceph daemons", &results)?;
    Ok(())
}

/// Steps 2b+3: build the RADOS-Arrow connector on the admin and distribute
/// the resulting shared libraries to every node.
fn install_connector(
    reservation: &Reservation,
    pool: &SessionPool,
    admin: &Node,
    options: &InstallOptions,
) -> Result<()> {
    let silent = options.common.silent;
    let checkout = format!("{}/arrow", options.install_dir);
    let artifact = format!("{}/cpp/build/latest", checkout);

    let built = run(
        pool,
        admin,
        &RemoteAction::shell(format!("test -e {}", artifact)).quiet(),
    );
    if !built.success || options.force_reinstall {
        report::progress(silent, "Building the connector library (this is slow)...");
        let commands = vec![
            "sudo apt-get install -y libradospp-dev rados-objclass-dev openjdk-11-jdk \
             libboost-all-dev automake bison flex g++ git libevent-dev libssl-dev libtool \
             make pkg-config maven cmake thrift-compiler"
                .to_string(),
            format!(
                "test -d {0} || git clone https://github.com/Sebastiaan-Alvarez-Rodriguez/arrow.git -b merge_bridge_dev {0}",
                checkout
            ),
            format!(
                "cd {}/cpp && cmake . -DARROW_PARQUET=ON -DARROW_DATASET=ON -DARROW_JNI=ON \
                 -DARROW_ORC=ON -DARROW_CSV=ON -DARROW_CLS=ON",
                checkout
            ),
            format!("cd {}/cpp && sudo make install -j{}", checkout, options.cores),
        ];
        for command in commands {
            let result = run(pool, admin, &RemoteAction::shell(command));
            report::require_all("build connector", &[result])?;
        }
    } else {
        report::progress(silent, "Connector build artifact found, skipping build.");
    }

    // Fan the libraries out from the admin over the internal trust keys,
    // then install them into the system paths on each node.
    report::progress(silent, "Distributing connector libraries...");
    let mut results = Vec::new();
    for node in reservation.nodes() {
        for pattern in ["libcls*", "libarrow*", "libparquet*"] {
            let result = run(
                pool,
                admin,
                &RemoteAction::shell(format!(
                    "scp {}/{} {}:~/",
                    artifact, pattern, node.hostname
                )),
            );
            results.push(StepResult {
                node_id: node.id,
                node_name: node.to_string(),
                ..result
            });
        }
    }
    report::require_all("distribute connector libraries", &results)?;

    let nodes: Vec<&Node> = reservation.nodes().iter().collect();
    let installed = crate::runner::run_many_seq(pool, &nodes, |_| {
        vec![
            RemoteAction::sudo("mkdir -p /usr/lib/rados-classes"),
            RemoteAction::sudo("sh -c 'cp libcls* /usr/lib/rados-classes/'"),
            RemoteAction::sudo("sh -c 'cp libarrow* libparquet* /usr/lib/'"),
        ]
    });
    report::require_all("install connector libraries", &installed)?;

    let ld_path = run(
        pool,
        admin,
        &RemoteAction::shell(
            "grep -q 'LD_LIBRARY_PATH=/usr/local/lib' .bashrc || \
             echo 'export LD_LIBRARY_PATH=/usr/local/lib' >> .bashrc",
        ),
    );
    report::require_all("register library path", &[ld_path])?;

    // Fresh installs have no daemons yet, so a restart here is cleanup
    // only.
    let restarted = crate::daemons::osd::restart_target_all(pool, &nodes);
    report::record_failures("restart OSD service surface", &restarted);

    info!("connector libraries distributed to {} node(s)", nodes.len());
    Ok(())
}

/// Generate a fresh 4096-bit RSA keypair in a scratch directory.
fn generate_keypair() -> Result<(String, String)> {
    let dir = tempfile::tempdir()?;
    let key_path = dir.path().join(CLUSTER_KEY);
    let status = Command::new("ssh-keygen")
        .args(["-t", "rsa", "-b", "4096", "-q", "-N", ""])
        .arg("-f")
        .arg(&key_path)
        .status()?;
    if !status.success() {
        return Err(DeployError::configuration(
            "ssh-keygen failed to generate the cluster keypair",
        ));
    }
    let private = fs::read_to_string(&key_path)?;
    let public = fs::read_to_string(key_path.with_extension("rsa.pub"))?;
    Ok((private, public))
}

/// Hex sha-256 of a byte string, matching `sha256sum` output.
fn sha256_hex(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(data))
}
