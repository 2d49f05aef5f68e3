//! Data staging on the cluster filesystem.
//!
//! `deploy` pushes local files into the mounted filesystem via the admin
//! node; every destination file is pre-created and stripe-attributed before
//! any data moves, because the object layout cannot change once data
//! landed. Two multipliers inflate the dataset: the copy multiplier
//! physically replicates each source file (real storage), and the link
//! multiplier adds hardlinks per resulting copy (apparent size only).
//! `clean` removes staged content again.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{DeployError, Result};
use crate::report;
use crate::reservation::{Node, Reservation};
use crate::runner::{run, RemoteAction};
use crate::session::{PoolHandle, SessionPool};

use crate::phases::CommonOptions;

#[derive(Debug, Clone)]
pub struct DeployOptions {
    pub common: CommonOptions,
    pub mountpoint: String,
    /// Stripe (object) size in bytes; no source file may exceed it.
    pub stripe: u64,
    /// Physical copies per source file (>= 1).
    pub copy_multiplier: u32,
    /// Apparent files per copy (>= 1); copy gets `link_multiplier - 1`
    /// hardlinks.
    pub link_multiplier: u32,
}

#[derive(Debug, Clone)]
pub struct CleanOptions {
    pub common: CommonOptions,
    pub mountpoint: String,
}

/// One local file scheduled for transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub local: PathBuf,
    /// Destination path relative to the mountpoint.
    pub dest_rel: String,
    pub size: u64,
}

/// One remote file to pre-create, with the hardlinks attached to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePlan {
    pub dest_rel: String,
    pub links: Vec<String>,
}

/// Stage data onto the cluster.
pub fn deploy(reservation: &Reservation, paths: &[PathBuf], options: &DeployOptions) -> Result<()> {
    let silent = options.common.silent;
    if options.copy_multiplier < 1 || options.link_multiplier < 1 {
        return Err(DeployError::configuration(
            "copy and link multipliers must be at least 1",
        ));
    }
    if options.stripe == 0 || options.stripe % (4 * 1024 * 1024) != 0 {
        return Err(DeployError::configuration(format!(
            "stripe size must be a positive multiple of 4 MiB (got {})",
            options.stripe
        )));
    }
    if paths.is_empty() {
        return Ok(());
    }

    // Everything below the stripe check is a precondition: no transfer may
    // begin while any source file is oversized.
    let sources = resolve_sources(paths)?;
    let files = collect_files(&sources)?;
    check_stripe(&files, options.stripe)?;

    let (admin, _) = reservation.pick_admin(options.common.admin_id)?;
    report::progress(silent, &format!("Picked admin node: {}", admin));

    let credentials = options.common.credentials();
    let handle = PoolHandle::acquire(
        None,
        std::slice::from_ref(admin),
        &credentials,
    )?;
    let pool = handle.pool();

    ensure_setfattr(pool, admin)?;

    // Pre-create and stripe every destination, hardlinks included, before
    // any byte is transferred. rsync later runs --inplace so the layout
    // attribute and the links survive the data landing.
    let plans = plan_remote_files(&files, options.copy_multiplier, options.link_multiplier);
    report::progress(
        silent,
        &format!("Preparing {} remote file(s)...", plans.len()),
    );
    for plan in &plans {
        prepare_remote_file(pool, admin, &options.mountpoint, options.stripe, plan)?;
    }

    report::progress(silent, "Transferring data...");
    let ssh_config = write_ssh_config(admin, &options.common)?;
    if options.copy_multiplier > 1 {
        let staging = stage_copies(&files, options.copy_multiplier)?;
        rsync(
            ssh_config.path(),
            &format!("{}/", staging.path().display()),
            admin,
            &format!("{}/", options.mountpoint),
        )?;
    } else {
        for source in &sources {
            let (from, to) = if source.is_dir() {
                (
                    format!("{}/", source.display()),
                    format!("{}/{}/", options.mountpoint, base_name(source)?),
                )
            } else {
                (
                    source.display().to_string(),
                    format!("{}/{}", options.mountpoint, base_name(source)?),
                )
            };
            rsync(ssh_config.path(), &from, admin, &to)?;
        }
    }

    report::progress(silent, "Data deployed.");
    Ok(())
}

/// Remove staged data from the cluster.
///
/// Without paths the whole mountpoint content is wiped in one action; with
/// paths, each named relative path is removed and all removals must
/// succeed.
pub fn clean(reservation: &Reservation, paths: &[String], options: &CleanOptions) -> Result<()> {
    let silent = options.common.silent;
    let (admin, _) = reservation.pick_admin(options.common.admin_id)?;
    report::progress(silent, &format!("Picked admin node: {}", admin));

    let credentials = options.common.credentials();
    let handle = PoolHandle::acquire(None, std::slice::from_ref(admin), &credentials)?;
    let pool = handle.pool();

    if paths.is_empty() {
        let result = run(
            pool,
            admin,
            &RemoteAction::sudo(format!("sh -c 'rm -rf {}/*'", options.mountpoint)),
        );
        report::require_all("clean mountpoint", &[result])?;
    } else {
        let mut results = Vec::new();
        for path in paths {
            let rel = path.trim_start_matches('/');
            results.push(run(
                pool,
                admin,
                &RemoteAction::sudo(format!("rm -rf {}/{}", options.mountpoint, rel)),
            ));
        }
        report::require_all("clean paths", &results)?;
    }
    report::progress(silent, "Data cleaned.");
    Ok(())
}

/// Resolve the given paths to absolute form, failing on missing sources.
fn resolve_sources(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    paths
        .iter()
        .map(|path| {
            fs::canonicalize(path).map_err(|e| {
                DeployError::configuration(format!(
                    "cannot resolve source path {:?}: {}",
                    path, e
                ))
            })
        })
        .collect()
}

/// Flatten files and directory trees into transfer entries.
///
/// A file lands at `<mountpoint>/<basename>`; a directory's content lands
/// under `<mountpoint>/<basename(dir)>/...`.
pub fn collect_files(sources: &[PathBuf]) -> Result<Vec<StagedFile>> {
    let mut out = Vec::new();
    for source in sources {
        if source.is_file() {
            out.push(StagedFile {
                local: source.clone(),
                dest_rel: base_name(source)?,
                size: fs::metadata(source)?.len(),
            });
        } else if source.is_dir() {
            let prefix = base_name(source)?;
            walk_dir(source, &prefix, &mut out)?;
        } else {
            return Err(DeployError::configuration(format!(
                "source path {:?} is neither a file nor a directory",
                source
            )));
        }
    }
    Ok(out)
}

fn walk_dir(dir: &Path, prefix: &str, out: &mut Vec<StagedFile>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        let rel = format!("{}/{}", prefix, name);
        if path.is_dir() {
            walk_dir(&path, &rel, out)?;
        } else if path.is_file() {
            let size = entry.metadata()?.len();
            out.push(StagedFile {
                local: path,
                dest_rel: rel,
                size,
            });
        }
    }
    Ok(())
}

/// Every source file must fit in one stripe; all offenders are named.
pub fn check_stripe(files: &[StagedFile], stripe: u64) -> Result<()> {
    let offenders: Vec<String> = files
        .iter()
        .filter(|f| f.size > stripe)
        .map(|f| format!("{:?} ({} bytes)", f.local, f.size))
        .collect();
    if offenders.is_empty() {
        Ok(())
    } else {
        Err(DeployError::configuration(format!(
            "{} source file(s) exceed the stripe size of {} bytes: {}",
            offenders.len(),
            stripe,
            offenders.join(", ")
        )))
    }
}

/// Compute the remote file set: `copies` entries per source file, each with
/// `links - 1` hardlink names.
pub fn plan_remote_files(files: &[StagedFile], copies: u32, links: u32) -> Vec<RemotePlan> {
    let mut plans = Vec::new();
    for file in files {
        for copy in 0..copies {
            let dest_rel = copy_name(&file.dest_rel, copy);
            let link_names = (1..links)
                .map(|link| format!("{}.link{}", dest_rel, link))
                .collect();
            plans.push(RemotePlan {
                dest_rel,
                links: link_names,
            });
        }
    }
    plans
}

/// Name of physical copy `index` of a destination path; copy 0 keeps the
/// original name.
fn copy_name(dest_rel: &str, index: u32) -> String {
    if index == 0 {
        dest_rel.to_string()
    } else {
        format!("{}.copy{}", dest_rel, index)
    }
}

/// Pre-create one destination file with its stripe attribute and links.
fn prepare_remote_file(
    pool: &SessionPool,
    admin: &Node,
    mountpoint: &str,
    stripe: u64,
    plan: &RemotePlan,
) -> Result<()> {
    let dest = format!("{}/{}", mountpoint, plan.dest_rel);
    let parent = match dest.rsplit_once('/') {
        Some((parent, _)) => parent.to_string(),
        None => mountpoint.to_string(),
    };
    let mut commands = vec![
        format!("mkdir -p {}", parent),
        format!("touch {}", dest),
        format!(
            "setfattr -n ceph.file.layout.object_size -v {} {}",
            stripe, dest
        ),
    ];
    for link in &plan.links {
        commands.push(format!("ln -f {} {}/{}", dest, mountpoint, link));
    }
    for command in commands {
        let result = run(pool, admin, &RemoteAction::sudo(command).quiet());
        report::require_all("prepare remote files", &[result])?;
    }
    Ok(())
}

/// setfattr ships in `attr`, which minimal images lack.
fn ensure_setfattr(pool: &SessionPool, admin: &Node) -> Result<()> {
    let present = run(pool, admin, &RemoteAction::shell("which setfattr").quiet());
    if present.success {
        return Ok(());
    }
    let installed = run(
        pool,
        admin,
        &RemoteAction::sudo("apt-get install attr -y"),
    );
    report::require_all("install attr", &[installed])
}

/// Physically replicate every file into a staging tree, `copies` copies
/// each, preserving destination-relative layout.
fn stage_copies(files: &[StagedFile], copies: u32) -> Result<tempfile::TempDir> {
    let staging = tempfile::tempdir()?;
    for file in files {
        for copy in 0..copies {
            let rel = copy_name(&file.dest_rel, copy);
            let target = staging.path().join(&rel);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&file.local, &target)?;
        }
    }
    Ok(staging)
}

/// Write a scratch SSH client config so rsync reaches the admin with the
/// same parameters the session pool used.
fn write_ssh_config(admin: &Node, common: &CommonOptions) -> Result<tempfile::NamedTempFile> {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(file, "Host {}", admin.ip_public)?;
    writeln!(file, "    Hostname {}", admin.ip_public)?;
    writeln!(file, "    User {}", admin.user)?;
    if let Some(key) = &common.key_path {
        writeln!(file, "    IdentityFile {}", key.display())?;
        writeln!(file, "    IdentitiesOnly yes")?;
    }
    writeln!(file, "    StrictHostKeyChecking no")?;
    Ok(file)
}

/// Incremental transfer to the admin's mount path.
fn rsync(ssh_config: &Path, from: &str, admin: &Node, to: &str) -> Result<()> {
    let status = Command::new("rsync")
        .arg("-az")
        .arg("--inplace")
        .arg("-e")
        .arg(format!("ssh -F {}", ssh_config.display()))
        .arg(from)
        .arg(format!("{}:{}", admin.ip_public, to))
        .status()?;
    if !status.success() {
        return Err(DeployError::remote_action(format!(
            "rsync of {} to {} failed with {}",
            from, admin, status
        )));
    }
    Ok(())
}

fn base_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            DeployError::configuration(format!("source path {:?} has no file name", path))
        })
}
