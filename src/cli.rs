use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::defaults;

/// rados-deploy - Deploy RADOS-Ceph on reserved cluster nodes
#[derive(Parser)]
#[command(name = "rados-deploy")]
#[command(about = "Install, start, stop and stage data on RADOS-Ceph clusters over SSH")]
#[command(version)]
pub struct Cli {
    /// Reservation document (JSON list of nodes); read from stdin when omitted.
    #[arg(long, global = true, value_name = "path")]
    pub reservation: Option<PathBuf>,

    /// Path to the SSH key used to reach the nodes (agent auth when omitted).
    #[arg(long = "key-path", global = true, value_name = "path")]
    pub key_path: Option<PathBuf>,

    /// ID of the node that is/will be the admin node.
    #[arg(long = "admin", global = true, value_name = "id")]
    pub admin_id: Option<u64>,

    /// Only print errors and critical info.
    #[arg(long, global = true)]
    pub silent: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install SSH trust, ceph daemons and the connector library
    Install {
        /// Remote directory for tool checkouts, relative to the remote home.
        #[arg(long, value_name = "path", default_value_t = defaults::install_dir().to_string())]
        install_dir: String,

        /// Compile parallelism for the connector build.
        #[arg(long, value_name = "amount", default_value_t = defaults::compile_cores())]
        cores: u32,

        /// Rebuild the connector even when a previous build artifact exists.
        #[arg(long)]
        force_reinstall: bool,

        /// Also install the generated SSH client config for the root user.
        #[arg(long)]
        use_sudo: bool,
    },
    /// Start RADOS-Ceph on the cluster
    Start {
        #[command(subcommand)]
        backend: StartBackend,
    },
    /// Stop RADOS-Ceph on the cluster
    Stop {
        #[command(subcommand)]
        backend: StopBackend,
    },
    /// Stop, then start the cluster again
    Restart {
        #[command(subcommand)]
        backend: StartBackend,
    },
    /// Remove the deployment from all nodes
    Uninstall {
        /// Also delete this remote install directory.
        #[arg(long, value_name = "path")]
        install_dir: Option<String>,
    },
    /// Stage data on the running cluster
    Data {
        #[command(subcommand)]
        command: DataCommands,
    },
}

/// Shared tuning knobs of the start (and restart) phase.
#[derive(Args, Clone, Debug)]
pub struct StartTuning {
    /// Mountpoint for cephfs on all nodes.
    #[arg(long, value_name = "path", default_value_t = defaults::mountpoint_path().to_string())]
    pub mountpoint: String,

    /// Retry budget for operations that wait on quorum settling.
    #[arg(long, value_name = "amount", default_value_t = defaults::retries())]
    pub retries: u32,

    /// Explicit placement-group count, bypassing the computed formula.
    #[arg(long, value_name = "amount")]
    pub placement_groups: Option<i64>,

    /// Op threads per OSD daemon.
    #[arg(long, value_name = "amount", default_value_t = defaults::osd_op_threads())]
    pub osd_op_threads: u32,

    /// Pool replication size.
    #[arg(long, value_name = "amount", default_value_t = defaults::osd_pool_size())]
    pub osd_pool_size: u32,

    /// Maximum object size (accepts B/KiB/MiB/GiB/TiB suffixes).
    #[arg(long, value_name = "size", value_parser = parse_size, default_value = "128MiB")]
    pub osd_max_obj_size: u64,

    /// Disable the cephfs client I/O cache.
    #[arg(long)]
    pub disable_client_cache: bool,
}

#[derive(Subcommand, Clone, Debug)]
pub enum StartBackend {
    /// RAM-backed object store
    Memstore {
        /// RAM allocated per OSD (accepts B/KiB/MiB/GiB/TiB suffixes).
        #[arg(long, value_name = "size", value_parser = parse_size, default_value = "10GiB")]
        storage_size: u64,

        #[command(flatten)]
        tuning: StartTuning,
    },
    /// Device-backed object store
    Bluestore {
        /// Uniform backing device path, overriding per-node reservation values.
        #[arg(long, value_name = "path")]
        device_path: Option<String>,

        /// Boot OSDs through ceph-volume on each node instead of the deploy tool.
        #[arg(long)]
        ceph_volume: bool,

        #[command(flatten)]
        tuning: StartTuning,
    },
}

#[derive(Subcommand, Clone, Debug)]
pub enum StopBackend {
    /// Stop a RAM-backed cluster
    Memstore {
        /// Mountpoint for cephfs on all nodes.
        #[arg(long, value_name = "path", default_value_t = defaults::mountpoint_path().to_string())]
        mountpoint: String,
    },
    /// Stop a device-backed cluster
    Bluestore {
        /// Mountpoint for cephfs on all nodes.
        #[arg(long, value_name = "path", default_value_t = defaults::mountpoint_path().to_string())]
        mountpoint: String,
    },
}

#[derive(Subcommand, Clone, Debug)]
pub enum DataCommands {
    /// Deploy data path(s) onto the mounted cluster filesystem
    Deploy {
        /// Data path(s) to deploy on the remote cluster.
        #[arg(required = true, value_name = "paths")]
        paths: Vec<PathBuf>,

        /// Mountpoint for cephfs on all nodes.
        #[arg(long, value_name = "path", default_value_t = defaults::mountpoint_path().to_string())]
        mountpoint: String,

        /// Stripe (object) size; every source file must fit in one stripe.
        #[arg(long, value_name = "size", value_parser = parse_size, default_value = "64MiB")]
        stripe: u64,

        /// Physical copies per file; real storage consumption multiplier.
        #[arg(long, value_name = "amount", default_value_t = 1)]
        copy_multiplier: u32,

        /// Apparent files per copy; each copy gets amount-1 hardlinks.
        #[arg(long, value_name = "amount", default_value_t = 1)]
        link_multiplier: u32,
    },
    /// Remove staged data (all of it when no paths are given)
    Clean {
        /// Relative path(s) to remove; the mountpoint is prepended.
        #[arg(value_name = "paths")]
        paths: Vec<String>,

        /// Mountpoint for cephfs on all nodes.
        #[arg(long, value_name = "path", default_value_t = defaults::mountpoint_path().to_string())]
        mountpoint: String,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }
}

/// Parse a byte size with an optional binary suffix.
///
/// Accepts a plain integer (bytes) or B, KiB, MiB, GiB, TiB.
pub fn parse_size(raw: &str) -> Result<u64, String> {
    let raw = raw.trim();
    let suffixes: [(&str, u64); 5] = [
        ("TiB", 1024u64.pow(4)),
        ("GiB", 1024u64.pow(3)),
        ("MiB", 1024u64.pow(2)),
        ("KiB", 1024),
        ("B", 1),
    ];
    for (suffix, factor) in suffixes {
        if let Some(number) = raw.strip_suffix(suffix) {
            let value: u64 = number
                .trim()
                .parse()
                .map_err(|_| format!("invalid size \"{}\"", raw))?;
            return value
                .checked_mul(factor)
                .ok_or_else(|| format!("size \"{}\" overflows", raw));
        }
    }
    raw.parse()
        .map_err(|_| format!("invalid size \"{}\" (expected bytes or B/KiB/MiB/GiB/TiB)", raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_parse_size_suffixes() {
        assert_eq!(parse_size("1024").unwrap(), 1024);
        assert_eq!(parse_size("64B").unwrap(), 64);
        assert_eq!(parse_size("4KiB").unwrap(), 4096);
        assert_eq!(parse_size("64MiB").unwrap(), 64 * 1024 * 1024);
        assert_eq!(parse_size("10GiB").unwrap(), 10 * 1024 * 1024 * 1024);
        assert_eq!(parse_size("2TiB").unwrap(), 2 * 1024u64.pow(4));
        assert!(parse_size("10 bananas").is_err());
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["rados-deploy"]).is_err());
    }

    #[test]
    fn test_cli_start_memstore_defaults() {
        let cli = Cli::try_parse_from(["rados-deploy", "start", "memstore"]).unwrap();
        match cli.command {
            Commands::Start {
                backend: StartBackend::Memstore { storage_size, tuning },
            } => {
                assert_eq!(storage_size, 10 * 1024 * 1024 * 1024);
                assert_eq!(tuning.mountpoint, "/mnt/cephfs");
                assert_eq!(tuning.retries, 10);
                assert!(tuning.placement_groups.is_none());
            }
            _ => panic!("Expected start memstore"),
        }
    }

    #[test]
    fn test_cli_start_bluestore_flags() {
        let cli = Cli::try_parse_from([
            "rados-deploy",
            "--admin",
            "3",
            "start",
            "bluestore",
            "--device-path",
            "/dev/nvme0n1",
            "--ceph-volume",
            "--placement-groups",
            "128",
        ])
        .unwrap();
        assert_eq!(cli.admin_id, Some(3));
        match cli.command {
            Commands::Start {
                backend:
                    StartBackend::Bluestore {
                        device_path,
                        ceph_volume,
                        tuning,
                    },
            } => {
                assert_eq!(device_path.as_deref(), Some("/dev/nvme0n1"));
                assert!(ceph_volume);
                assert_eq!(tuning.placement_groups, Some(128));
            }
            _ => panic!("Expected start bluestore"),
        }
    }

    #[test]
    fn test_cli_data_deploy_requires_paths() {
        assert!(Cli::try_parse_from(["rados-deploy", "data", "deploy"]).is_err());
        let cli = Cli::try_parse_from([
            "rados-deploy",
            "data",
            "deploy",
            "dataset/",
            "--stripe",
            "32MiB",
            "--link-multiplier",
            "4",
        ])
        .unwrap();
        match cli.command {
            Commands::Data {
                command:
                    DataCommands::Deploy {
                        paths,
                        stripe,
                        link_multiplier,
                        copy_multiplier,
                        ..
                    },
            } => {
                assert_eq!(paths.len(), 1);
                assert_eq!(stripe, 32 * 1024 * 1024);
                assert_eq!(link_multiplier, 4);
                assert_eq!(copy_multiplier, 1);
            }
            _ => panic!("Expected data deploy"),
        }
    }

    #[test]
    fn test_cli_data_clean_allows_no_paths() {
        let cli = Cli::try_parse_from(["rados-deploy", "data", "clean"]).unwrap();
        match cli.command {
            Commands::Data {
                command: DataCommands::Clean { paths, .. },
            } => assert!(paths.is_empty()),
            _ => panic!("Expected data clean"),
        }
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "rados-deploy",
            "stop",
            "memstore",
            "--key-path",
            "/home/me/.ssh/id_rsa",
            "--silent",
        ])
        .unwrap();
        assert!(cli.silent);
        assert_eq!(
            cli.key_path.as_deref(),
            Some(std::path::Path::new("/home/me/.ssh/id_rsa"))
        );
    }
}
