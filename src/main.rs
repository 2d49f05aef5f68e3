//! rados-deploy - Main entry point
//!
//! Parses the CLI, loads the reservation handed over by the provider, and
//! dispatches to the requested lifecycle phase. Boolean phase outcomes map
//! to process exit codes: 0 on success, 1 on failure.

use std::io::Read;
use std::process::ExitCode;

use anyhow::Context;
use log::{debug, info};

use rados_deploy::cli::{Cli, Commands, DataCommands, StartBackend, StopBackend};
use rados_deploy::data;
use rados_deploy::phases::install::{install, InstallOptions};
use rados_deploy::phases::restart::restart;
use rados_deploy::phases::start::{start, StartOptions};
use rados_deploy::phases::stop::{stop, StopOptions};
use rados_deploy::phases::uninstall::{uninstall, UninstallOptions};
use rados_deploy::phases::CommonOptions;
use rados_deploy::report;
use rados_deploy::reservation::Reservation;
use rados_deploy::{DeployError, Result, StorageBackend};

/// Initialize the logger with appropriate settings
fn init_logger() {
    use env_logger::Builder;
    use std::io::Write;

    Builder::from_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}:{}] {}",
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .filter_level(log::LevelFilter::Warn)
        .parse_default_env() // Allows RUST_LOG env var to override
        .init();
}

fn main() -> ExitCode {
    init_logger();

    let cli = Cli::parse_args();
    debug!("CLI arguments parsed");

    match dispatch(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report::failure(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let reservation = load_reservation(&cli).context("failed to load the reservation")?;
    info!("loaded reservation with {} node(s)", reservation.len());

    let common = CommonOptions {
        key_path: cli.key_path.clone(),
        admin_id: cli.admin_id,
        silent: cli.silent,
    };

    match cli.command {
        Commands::Install {
            install_dir,
            cores,
            force_reinstall,
            use_sudo,
        } => {
            let options = InstallOptions {
                common,
                install_dir,
                cores,
                force_reinstall,
                use_sudo,
                cluster_keypair: None,
            };
            let admin = install(&reservation, &options)?;
            report::success(&format!("Installed RADOS-Ceph. Admin node: {}", admin));
            Ok(())
        }
        Commands::Start { backend } => {
            let (reservation, options) = start_setup(reservation, common, backend);
            let admin = start(&reservation, &options, None)?;
            report::success(&format!("Started RADOS-Ceph. Admin node: {}", admin));
            Ok(())
        }
        Commands::Stop { backend } => {
            let options = stop_setup(common, backend);
            stop(&reservation, &options, None)?;
            report::success("Stopped RADOS-Ceph.");
            Ok(())
        }
        Commands::Restart { backend } => {
            let (reservation, start_options) = start_setup(reservation, common, backend);
            let stop_options = StopOptions {
                common: start_options.common.clone(),
                backend: start_options.backend.clone(),
                mountpoint: start_options.mountpoint.clone(),
            };
            let admin = restart(&reservation, &stop_options, &start_options)?;
            report::success(&format!("Restarted RADOS-Ceph. Admin node: {}", admin));
            Ok(())
        }
        Commands::Uninstall { install_dir } => {
            let options = UninstallOptions {
                common,
                install_dir,
            };
            uninstall(&reservation, &options)?;
            report::success("Uninstalled RADOS-Ceph.");
            Ok(())
        }
        Commands::Data { command } => match command {
            DataCommands::Deploy {
                paths,
                mountpoint,
                stripe,
                copy_multiplier,
                link_multiplier,
            } => {
                let options = data::DeployOptions {
                    common,
                    mountpoint,
                    stripe,
                    copy_multiplier,
                    link_multiplier,
                };
                data::deploy(&reservation, &paths, &options)?;
                report::success("Data deployed.");
                Ok(())
            }
            DataCommands::Clean { paths, mountpoint } => {
                let options = data::CleanOptions { common, mountpoint };
                data::clean(&reservation, &paths, &options)?;
                report::success("Data cleaned.");
                Ok(())
            }
        },
    }
}

/// Build the start options from the backend subcommand, applying the
/// uniform device-path override to the reservation where given.
fn start_setup(
    mut reservation: Reservation,
    common: CommonOptions,
    backend: StartBackend,
) -> (Reservation, StartOptions) {
    let (backend, tuning) = match backend {
        StartBackend::Memstore {
            storage_size,
            tuning,
        } => (StorageBackend::Memstore { storage_size }, tuning),
        StartBackend::Bluestore {
            device_path,
            ceph_volume,
            tuning,
        } => {
            if let Some(device_path) = device_path {
                reservation.override_device_path(&device_path);
            }
            (
                StorageBackend::Bluestore {
                    use_ceph_volume: ceph_volume,
                },
                tuning,
            )
        }
    };
    let options = StartOptions {
        common,
        backend,
        mountpoint: tuning.mountpoint,
        osd_op_threads: tuning.osd_op_threads,
        osd_pool_size: tuning.osd_pool_size,
        osd_max_obj_size: tuning.osd_max_obj_size,
        placement_groups: tuning.placement_groups,
        use_client_cache: !tuning.disable_client_cache,
        retries: tuning.retries,
    };
    (reservation, options)
}

fn stop_setup(common: CommonOptions, backend: StopBackend) -> StopOptions {
    match backend {
        StopBackend::Memstore { mountpoint } => StopOptions {
            common,
            backend: StorageBackend::Memstore {
                storage_size: rados_deploy::defaults::memstore_storage_size(),
            },
            mountpoint,
        },
        StopBackend::Bluestore { mountpoint } => StopOptions {
            common,
            backend: StorageBackend::Bluestore {
                use_ceph_volume: false,
            },
            mountpoint,
        },
    }
}

/// Load the provider's reservation document from the given file, falling
/// back to stdin so the provider can be piped straight in.
fn load_reservation(cli: &Cli) -> Result<Reservation> {
    match &cli.reservation {
        Some(path) => Reservation::load_from_file(path),
        None => {
            let mut raw = String::new();
            std::io::stdin()
                .read_to_string(&mut raw)
                .map_err(DeployError::Io)?;
            if raw.trim().is_empty() {
                return Err(DeployError::configuration(
                    "no reservation given: pass --reservation or pipe the document to stdin",
                ));
            }
            Reservation::from_json(&raw)
        }
    }
}
